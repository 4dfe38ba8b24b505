use async_trait::async_trait;
use eventcast_common::NotificationPayload;

/// Result of one delivery attempt. Gateways report failure as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { message_id: String },
    Failed { reason: String },
}

/// Pluggable push-delivery backend.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Make exactly one delivery attempt. Must not retry and must not panic.
    async fn send(&self, payload: &NotificationPayload) -> DeliveryOutcome;
}
