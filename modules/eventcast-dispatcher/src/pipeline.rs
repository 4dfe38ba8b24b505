//! Per-stream reactions: resolve → build → deliver.
//!
//! Every failure is absorbed here and counted on the stream's stats. A
//! reaction never returns an error to the watcher.

use std::sync::Arc;

use chrono::Utc;
use eventcast_common::{Entity, EntityKind, EventListing, NotificationPayload};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::notify::backend::{DeliveryOutcome, PushGateway};
use crate::payload::{self, Target};
use crate::record::{
    AttendanceRecorded, ChangeRecord, EventPosted, MessageSent, PaymentUpdated, TicketPurchased,
};
use crate::resolver::EntityResolver;
use crate::stats::DispatchStats;

/// Outcome of delivering one batch of payloads.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub delivered: usize,
    pub failed: usize,
}

pub struct Pipeline {
    resolver: EntityResolver,
    gateway: Arc<dyn PushGateway>,
    stats: Arc<DispatchStats>,
    fanout_concurrency: usize,
}

impl Pipeline {
    pub fn new(
        resolver: EntityResolver,
        gateway: Arc<dyn PushGateway>,
        stats: Arc<DispatchStats>,
        fanout_concurrency: usize,
    ) -> Self {
        Self {
            resolver,
            gateway,
            stats,
            fanout_concurrency: fanout_concurrency.max(1),
        }
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// React to one validated insertion.
    pub async fn react(&self, record: ChangeRecord) -> BatchOutcome {
        match record {
            ChangeRecord::EventPosted(r) => self.event_posted(r).await,
            ChangeRecord::PaymentUpdated(r) => self.payment_updated(r).await,
            ChangeRecord::MessageSent(r) => self.message_sent(r).await,
            ChangeRecord::TicketPurchased(r) => self.ticket_purchased(r).await,
            ChangeRecord::AttendanceRecorded(r) => self.attendance_recorded(r).await,
        }
    }

    async fn event_posted(&self, record: EventPosted) -> BatchOutcome {
        let Some(organizer) = self
            .resolve(EntityKind::Organizer, &record.organizer_id)
            .await
        else {
            return BatchOutcome::default();
        };

        let users = self.resolver.users().await;
        let now = Utc::now();
        let payloads: Vec<NotificationPayload> = users
            .iter()
            .filter_map(Target::of)
            .map(|to| payload::event_post(&record, &organizer, to, now))
            .collect();

        let skipped = users.len() - payloads.len();
        if skipped > 0 {
            self.stats.record_no_address(skipped as u64);
        }

        let outcome = self.deliver_all(payloads).await;
        info!(
            event_id = record.event_id.as_str(),
            recipients = outcome.delivered + outcome.failed,
            delivered = outcome.delivered,
            failed = outcome.failed,
            skipped,
            "Event post fan-out complete"
        );
        outcome
    }

    async fn payment_updated(&self, record: PaymentUpdated) -> BatchOutcome {
        let Some(user) = self.resolve(EntityKind::User, &record.user_id).await else {
            return BatchOutcome::default();
        };
        let Some(to) = self.target(&user) else {
            return BatchOutcome::default();
        };
        self.deliver_one(payload::payment_status(&record, to, Utc::now()))
            .await
    }

    async fn message_sent(&self, record: MessageSent) -> BatchOutcome {
        let (sender, receiver) = futures::join!(
            self.resolve(record.sender.kind, &record.sender.id),
            self.resolve(record.receiver.kind, &record.receiver.id),
        );
        let (Some(sender), Some(receiver)) = (sender, receiver) else {
            return BatchOutcome::default();
        };
        let Some(to) = self.target(&receiver) else {
            return BatchOutcome::default();
        };
        self.deliver_one(payload::new_message(&record, &sender, to, Utc::now()))
            .await
    }

    async fn ticket_purchased(&self, record: TicketPurchased) -> BatchOutcome {
        let Some((user, event)) = self.user_and_event(&record.user_id, &record.event_id).await
        else {
            return BatchOutcome::default();
        };
        let Some(to) = self.target(&user) else {
            return BatchOutcome::default();
        };
        self.deliver_one(payload::ticket_purchase(&record, &event, to, Utc::now()))
            .await
    }

    async fn attendance_recorded(&self, record: AttendanceRecorded) -> BatchOutcome {
        let Some((user, event)) = self.user_and_event(&record.user_id, &record.event_id).await
        else {
            return BatchOutcome::default();
        };
        let Some(to) = self.target(&user) else {
            return BatchOutcome::default();
        };
        self.deliver_one(payload::attendance_reminder(&record, &event, to, Utc::now()))
            .await
    }

    // --- Resolution ---

    async fn resolve(&self, kind: EntityKind, id: &str) -> Option<Entity> {
        let entity = self.resolver.resolve(kind, id).await;
        if entity.is_none() {
            warn!(%kind, id, "Referenced entity could not be resolved, skipping");
            self.stats.record_unresolved();
        }
        entity
    }

    /// The user is resolved first; the event is only read for a user who can
    /// actually receive the notification.
    async fn user_and_event(&self, user_id: &str, event_id: &str) -> Option<(Entity, EventListing)> {
        let user = self.resolve(EntityKind::User, user_id).await?;
        if user.push_address().is_none() {
            self.stats.record_no_address(1);
            debug!(user_id, "User has no push address, skipping");
            return None;
        }

        match self.resolver.resolve_event(event_id).await {
            Some(event) => Some((user, event)),
            None => {
                warn!(event_id, "Referenced event could not be resolved, skipping");
                self.stats.record_unresolved();
                None
            }
        }
    }

    fn target<'a>(&self, entity: &'a Entity) -> Option<Target<'a>> {
        let target = Target::of(entity);
        if target.is_none() {
            self.stats.record_no_address(1);
            debug!(kind = %entity.kind, id = entity.id.as_str(), "Recipient has no push address, skipping");
        }
        target
    }

    // --- Delivery ---

    async fn deliver_one(&self, payload: NotificationPayload) -> BatchOutcome {
        self.deliver_all(vec![payload]).await
    }

    /// Deliver each payload independently, at most `fanout_concurrency` at a
    /// time. Resolves once every attempt has finished.
    async fn deliver_all(&self, payloads: Vec<NotificationPayload>) -> BatchOutcome {
        stream::iter(payloads)
            .map(|payload| async move { self.deliver(&payload).await })
            .buffer_unordered(self.fanout_concurrency)
            .fold(BatchOutcome::default(), |mut outcome, delivered| async move {
                if delivered {
                    outcome.delivered += 1;
                } else {
                    outcome.failed += 1;
                }
                outcome
            })
            .await
    }

    async fn deliver(&self, payload: &NotificationPayload) -> bool {
        match self.gateway.send(payload).await {
            DeliveryOutcome::Delivered { message_id } => {
                debug!(
                    notification_type = %payload.notification_type,
                    message_id = message_id.as_str(),
                    "Notification delivered"
                );
                self.stats.record_delivered();
                true
            }
            DeliveryOutcome::Failed { reason } => {
                warn!(
                    notification_type = %payload.notification_type,
                    reason = reason.as_str(),
                    "Notification delivery failed"
                );
                self.stats.record_delivery_failed();
                false
            }
        }
    }
}
