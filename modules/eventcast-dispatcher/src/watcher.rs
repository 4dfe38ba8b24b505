//! Stream watcher: one per source stream.
//!
//! Insertions are validated inline and each valid one is reacted to in its own
//! task, so a slow lookup or delivery never holds up the next change. Finished
//! tasks are reaped as the feed advances; a panicking reaction is logged and
//! counted and the watcher carries on.

use std::sync::Arc;

use eventcast_common::StreamKind;
use eventcast_store::{ChangeEvent, ChangeStream, ChangeType};
use futures::StreamExt;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn, Instrument};

use crate::pipeline::{BatchOutcome, Pipeline};
use crate::record::ChangeRecord;
use crate::stats::StatsSnapshot;

pub struct StreamWatcher {
    kind: StreamKind,
    pipeline: Arc<Pipeline>,
}

impl StreamWatcher {
    pub fn new(kind: StreamKind, pipeline: Arc<Pipeline>) -> Self {
        Self { kind, pipeline }
    }

    /// Consume the feed until it ends, then wait for in-flight reactions.
    pub async fn run(self, mut changes: ChangeStream) -> StatsSnapshot {
        info!(stream = %self.kind, "Watching stream");
        let mut reactions: JoinSet<BatchOutcome> = JoinSet::new();

        while let Some(change) = changes.next().await {
            if let Some(record) = self.accept(change) {
                let pipeline = self.pipeline.clone();
                let span = tracing::info_span!("reaction", stream = %self.kind);
                reactions.spawn(async move { pipeline.react(record).await }.instrument(span));
            }

            while let Some(done) = reactions.try_join_next() {
                self.reap(done);
            }
        }

        while let Some(done) = reactions.join_next().await {
            self.reap(done);
        }

        let stats = self.pipeline.stats().snapshot();
        info!(stream = %self.kind, "Stream ended. {stats}");
        stats
    }

    /// Filter to insertions and validate them. Anything rejected is counted.
    pub fn accept(&self, change: ChangeEvent) -> Option<ChangeRecord> {
        let stats = self.pipeline.stats();
        stats.record_received();

        if change.change != ChangeType::Added {
            stats.record_ignored();
            return None;
        }

        match ChangeRecord::parse(self.kind, &change.document) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    stream = %self.kind,
                    id = change.document.id.as_str(),
                    error = %e,
                    "Invalid record, skipping"
                );
                stats.record_invalid();
                None
            }
        }
    }

    fn reap(&self, done: Result<BatchOutcome, JoinError>) {
        if let Err(e) = done {
            if e.is_panic() {
                error!(stream = %self.kind, error = %e, "Reaction panicked");
                self.pipeline.stats().record_panic();
            } else {
                warn!(stream = %self.kind, error = %e, "Reaction cancelled");
            }
        }
    }
}
