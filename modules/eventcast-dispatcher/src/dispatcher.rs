//! Composition root: one watcher per configured stream, all sharing the
//! injected store and gateway.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use eventcast_common::{Config, StreamKind, DEFAULT_FANOUT_CONCURRENCY};
use eventcast_store::DocumentStore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::notify::backend::PushGateway;
use crate::pipeline::Pipeline;
use crate::resolver::EntityResolver;
use crate::stats::{DispatchStats, StatsSnapshot};
use crate::watcher::StreamWatcher;

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub streams: Vec<StreamKind>,
    /// Upper bound on concurrent deliveries within one event fan-out.
    pub fanout_concurrency: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            streams: StreamKind::ALL.to_vec(),
            fanout_concurrency: DEFAULT_FANOUT_CONCURRENCY,
        }
    }
}

impl From<&Config> for DispatcherSettings {
    fn from(config: &Config) -> Self {
        Self {
            streams: config.streams.clone(),
            fanout_concurrency: config.fanout_concurrency,
        }
    }
}

pub struct Dispatcher {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PushGateway>,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PushGateway>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            settings,
        }
    }

    /// Subscribe to every configured stream, then start their watchers.
    ///
    /// All subscriptions are established before this returns, so changes made
    /// afterwards are observed. A failed subscription is fatal.
    pub async fn start(&self) -> Result<DispatcherHandle> {
        let resolver = EntityResolver::new(self.store.clone());
        let mut watchers = JoinSet::new();
        let mut stats = Vec::with_capacity(self.settings.streams.len());

        for &kind in &self.settings.streams {
            let changes = self
                .store
                .subscribe(kind.collection())
                .await
                .with_context(|| format!("failed to subscribe to {}", kind.collection()))?;

            let stream_stats = Arc::new(DispatchStats::new());
            let pipeline = Arc::new(Pipeline::new(
                resolver.clone(),
                self.gateway.clone(),
                stream_stats.clone(),
                self.settings.fanout_concurrency,
            ));
            let watcher = StreamWatcher::new(kind, pipeline);

            watchers.spawn(async move { (kind, watcher.run(changes).await) });
            stats.push((kind, stream_stats));
        }

        info!(streams = stats.len(), "Dispatcher started");
        Ok(DispatcherHandle { watchers, stats })
    }
}

/// Running watchers plus live access to their counters.
pub struct DispatcherHandle {
    watchers: JoinSet<(StreamKind, StatsSnapshot)>,
    stats: Vec<(StreamKind, Arc<DispatchStats>)>,
}

impl DispatcherHandle {
    /// Current counters for one stream.
    pub fn stats(&self, kind: StreamKind) -> Option<StatsSnapshot> {
        self.stats
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, s)| s.snapshot())
    }

    /// Wait for every watcher to finish (their feeds ended).
    pub async fn join(&mut self) -> DispatchReport {
        while let Some(done) = self.watchers.join_next().await {
            match done {
                Ok((kind, stats)) => info!(stream = %kind, "Watcher finished. {stats}"),
                Err(e) => error!(error = %e, "Watcher task failed"),
            }
        }
        self.report()
    }

    /// Stop every watcher and its in-flight reactions.
    pub async fn shutdown(&mut self) -> DispatchReport {
        self.watchers.abort_all();
        while self.watchers.join_next().await.is_some() {}
        self.report()
    }

    fn report(&self) -> DispatchReport {
        DispatchReport {
            streams: self
                .stats
                .iter()
                .map(|(kind, stats)| (*kind, stats.snapshot()))
                .collect(),
        }
    }
}

/// Final counters per stream.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub streams: Vec<(StreamKind, StatsSnapshot)>,
}

impl DispatchReport {
    pub fn stream(&self, kind: StreamKind) -> StatsSnapshot {
        self.streams
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, s)| *s)
            .unwrap_or_default()
    }

    pub fn total(&self) -> StatsSnapshot {
        self.streams
            .iter()
            .fold(StatsSnapshot::default(), |acc, (_, s)| acc + *s)
    }
}

impl fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.total())
    }
}
