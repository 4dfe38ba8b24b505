use async_trait::async_trait;
use eventcast_common::NotificationPayload;
use fcm_client::{FcmClient, FcmError, FcmOptions, Message, Notification};

use super::backend::{DeliveryOutcome, PushGateway};

/// Firebase Cloud Messaging backend.
pub struct FcmGateway {
    client: FcmClient,
}

impl FcmGateway {
    pub fn new(options: FcmOptions) -> Result<Self, FcmError> {
        Ok(Self {
            client: FcmClient::new(options)?,
        })
    }

    fn message(payload: &NotificationPayload) -> Message {
        Message {
            token: payload.address.clone(),
            notification: Notification {
                title: payload.title.clone(),
                body: payload.body.clone(),
            },
            data: payload.data(),
        }
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn send(&self, payload: &NotificationPayload) -> DeliveryOutcome {
        match self.client.send(&Self::message(payload)).await {
            Ok(message_id) => DeliveryOutcome::Delivered { message_id },
            Err(e) => DeliveryOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use eventcast_common::{Correlation, NotificationType};
    use fcm_client::FcmCredentials;

    #[test]
    fn message_carries_address_text_and_data() {
        let payload = NotificationPayload {
            address: "tok1".into(),
            title: "Notification".into(),
            body: "Thank you for purchasing for Spring Fair!".into(),
            notification_type: NotificationType::TicketPurchase,
            timestamp: DateTime::from_timestamp_millis(5).unwrap(),
            correlation: Correlation {
                user_id: Some("u1".into()),
                event_id: Some("e1".into()),
                ..Default::default()
            },
        };

        let message = FcmGateway::message(&payload);
        assert_eq!(message.token, "tok1");
        assert_eq!(message.notification.body, payload.body);
        assert_eq!(message.data["type"], "ticket_purchase");
        assert_eq!(message.data["timestamp"], "5");
        assert_eq!(message.data["event_id"], "e1");
        assert_eq!(message.data["senderId"], "");
    }

    #[tokio::test]
    async fn transport_error_is_reported_as_failure() {
        // Nothing listens on port 9 of localhost; the request fails to connect.
        let gateway = FcmGateway::new(FcmOptions {
            project_id: "demo".into(),
            credentials: FcmCredentials::AccessToken("token".into()),
            endpoint: Some("http://127.0.0.1:9".into()),
        })
        .unwrap();
        let payload = NotificationPayload {
            address: "tok1".into(),
            title: "Notification".into(),
            body: "hi".into(),
            notification_type: NotificationType::NewMessage,
            timestamp: DateTime::from_timestamp_millis(0).unwrap(),
            correlation: Correlation::default(),
        };

        match gateway.send(&payload).await {
            DeliveryOutcome::Failed { reason } => assert!(reason.contains("transport")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
