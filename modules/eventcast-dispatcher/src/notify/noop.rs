use async_trait::async_trait;
use eventcast_common::NotificationPayload;
use tracing::info;

use super::backend::{DeliveryOutcome, PushGateway};

/// Logs instead of delivering. Used when no push credentials are configured.
pub struct NoopGateway;

#[async_trait]
impl PushGateway for NoopGateway {
    async fn send(&self, payload: &NotificationPayload) -> DeliveryOutcome {
        info!(
            notification_type = %payload.notification_type,
            title = payload.title.as_str(),
            body = payload.body.as_str(),
            "Push delivery disabled, dropping notification"
        );
        DeliveryOutcome::Delivered {
            message_id: "noop".to_string(),
        }
    }
}
