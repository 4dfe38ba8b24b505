// Minimal client for the Firebase Cloud Messaging HTTP v1 API.
// https://firebase.google.com/docs/reference/fcm/rest/v1/projects.messages/send

pub mod auth;
pub mod models;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use thiserror::Error;

pub use crate::auth::{ServiceAccountKey, StaticToken, TokenCache, TokenProvider};
use crate::auth::ServiceAccountTokens;
pub use crate::models::{Message, Notification};
use crate::models::{ErrorEnvelope, SendRequest, SendResponse};

const DEFAULT_ENDPOINT: &str = "https://fcm.googleapis.com";

#[derive(Debug, Error)]
pub enum FcmError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("registration token is invalid or unregistered: {0}")]
    InvalidToken(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("FCM rejected the message ({status}): {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Debug, Clone)]
pub enum FcmCredentials {
    /// Exchanged for short-lived access tokens, refreshed as they expire.
    ServiceAccount(ServiceAccountKey),
    /// A fixed bearer token, e.g. for a local emulator.
    AccessToken(String),
}

#[derive(Debug, Clone)]
pub struct FcmOptions {
    pub project_id: String,
    pub credentials: FcmCredentials,
    /// Base URL override, e.g. for a local emulator.
    pub endpoint: Option<String>,
}

#[derive(Clone)]
pub struct FcmClient {
    project_id: String,
    endpoint: Option<String>,
    http: Client,
    tokens: Arc<TokenCache>,
}

impl FcmClient {
    /// Fails only when service-account credentials cannot be loaded.
    pub fn new(options: FcmOptions) -> Result<Self, FcmError> {
        let http = Client::new();
        let provider: Arc<dyn TokenProvider> = match options.credentials {
            FcmCredentials::ServiceAccount(key) => {
                Arc::new(ServiceAccountTokens::new(key, http.clone())?)
            }
            FcmCredentials::AccessToken(token) => Arc::new(StaticToken::new(token)),
        };
        Ok(Self::with_token_provider(
            options.project_id,
            options.endpoint,
            provider,
        ))
    }

    pub fn with_token_provider(
        project_id: impl Into<String>,
        endpoint: Option<String>,
        provider: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            endpoint,
            http: Client::new(),
            tokens: Arc::new(TokenCache::new(provider)),
        }
    }

    fn send_url(&self) -> String {
        let base = self
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/');
        format!(
            "{base}/v1/projects/{project}/messages:send",
            project = self.project_id
        )
    }

    /// Send one message. Returns the FCM message name on success.
    ///
    /// An `Unauthorized` response drops the cached token so the next send
    /// authenticates afresh.
    pub async fn send(&self, message: &Message) -> Result<String, FcmError> {
        let bearer = self.tokens.bearer().await?;
        let response = self
            .http
            .post(self.send_url())
            .bearer_auth(bearer)
            .json(&SendRequest { message })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = classify_error(status, &body);
            if matches!(error, FcmError::Unauthorized(_)) {
                self.tokens.invalidate().await;
            }
            return Err(error);
        }

        let sent = response.json::<SendResponse>().await?;
        Ok(sent.name)
    }
}

/// Map a non-success FCM response onto an error kind.
fn classify_error(status: StatusCode, body: &str) -> FcmError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = parsed
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string());
    let error_code = parsed.as_ref().and_then(|e| {
        e.error
            .details
            .iter()
            .find_map(|d| d.error_code.clone())
            .or_else(|| Some(e.error.status.clone()).filter(|s| !s.is_empty()))
    });

    match error_code.as_deref() {
        Some("UNREGISTERED") => FcmError::InvalidToken(message),
        Some("QUOTA_EXCEEDED") => FcmError::QuotaExceeded(message),
        Some("SENDER_ID_MISMATCH") | Some("THIRD_PARTY_AUTH_ERROR") => {
            FcmError::Unauthorized(message)
        }
        _ => match status {
            StatusCode::TOO_MANY_REQUESTS => FcmError::QuotaExceeded(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FcmError::Unauthorized(message),
            StatusCode::NOT_FOUND => FcmError::InvalidToken(message),
            _ => FcmError::Rejected {
                status: status.as_u16(),
                message,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::test_support::{http_response, serve, SequenceTokens};

    fn message(token: &str) -> Message {
        Message {
            token: token.into(),
            notification: Notification {
                title: "Notification".into(),
                body: "hi".into(),
            },
            data: Default::default(),
        }
    }

    #[test]
    fn unregistered_token_is_invalid_token() {
        let body = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND",
            "details":[{"@type":"type.googleapis.com/google.firebase.fcm.v1.FcmError","errorCode":"UNREGISTERED"}]}}"#;
        match classify_error(StatusCode::NOT_FOUND, body) {
            FcmError::InvalidToken(msg) => assert_eq!(msg, "Requested entity was not found."),
            other => panic!("expected InvalidToken, got {other:?}"),
        }
    }

    #[test]
    fn quota_detected_from_code_or_status() {
        let body = r#"{"error":{"code":429,"message":"quota","status":"RESOURCE_EXHAUSTED",
            "details":[{"errorCode":"QUOTA_EXCEEDED"}]}}"#;
        assert!(matches!(
            classify_error(StatusCode::TOO_MANY_REQUESTS, body),
            FcmError::QuotaExceeded(_)
        ));
        assert!(matches!(
            classify_error(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            FcmError::QuotaExceeded(_)
        ));
    }

    #[test]
    fn unparseable_body_is_kept_as_message() {
        match classify_error(StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded") {
            FcmError::Rejected { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn send_url_honors_endpoint_override() {
        let client = FcmClient::new(FcmOptions {
            project_id: "demo".into(),
            credentials: FcmCredentials::AccessToken("t".into()),
            endpoint: Some("http://localhost:9099/".into()),
        })
        .unwrap();
        assert_eq!(
            client.send_url(),
            "http://localhost:9099/v1/projects/demo/messages:send"
        );
    }

    #[test]
    fn message_serializes_in_v1_shape() {
        let mut data = std::collections::BTreeMap::new();
        data.insert("type".to_string(), "new_message".to_string());
        let message = Message {
            token: "tok".into(),
            notification: Notification {
                title: "Notification".into(),
                body: "hi".into(),
            },
            data,
        };
        let json = serde_json::to_value(SendRequest { message: &message }).unwrap();
        assert_eq!(json["message"]["token"], "tok");
        assert_eq!(json["message"]["notification"]["title"], "Notification");
        assert_eq!(json["message"]["data"]["type"], "new_message");
    }

    #[tokio::test]
    async fn send_posts_message_with_bearer_token() {
        let (url, requests) = serve(vec![http_response(
            "200 OK",
            r#"{"name":"projects/demo/messages/42"}"#,
        )])
        .await;
        let client = FcmClient::new(FcmOptions {
            project_id: "demo".into(),
            credentials: FcmCredentials::AccessToken("emulator-token".into()),
            endpoint: Some(url),
        })
        .unwrap();

        let name = client.send(&message("tok1")).await.unwrap();
        assert_eq!(name, "projects/demo/messages/42");

        let request = requests.await.unwrap().remove(0);
        assert!(request.starts_with("POST /v1/projects/demo/messages:send"));
        assert!(request.to_lowercase().contains("authorization: bearer emulator-token"));
        assert!(request.contains(r#""token":"tok1""#));
    }

    #[tokio::test]
    async fn unauthorized_send_refreshes_token_for_the_next_one() {
        let (url, requests) = serve(vec![
            http_response(
                "401 Unauthorized",
                r#"{"error":{"code":401,"message":"Request had invalid authentication credentials.","status":"UNAUTHENTICATED"}}"#,
            ),
            http_response("200 OK", r#"{"name":"projects/demo/messages/43"}"#),
        ])
        .await;
        let tokens = Arc::new(SequenceTokens::new(Duration::from_secs(3600)));
        let client = FcmClient::with_token_provider("demo", Some(url), tokens.clone());

        assert!(matches!(
            client.send(&message("tok1")).await,
            Err(FcmError::Unauthorized(_))
        ));
        assert_eq!(client.send(&message("tok1")).await.unwrap(), "projects/demo/messages/43");
        assert_eq!(tokens.fetches(), 2);

        let requests = requests.await.unwrap();
        assert!(requests[0].to_lowercase().contains("bearer token-1"));
        assert!(requests[1].to_lowercase().contains("bearer token-2"));
    }

    #[tokio::test]
    async fn token_failure_is_reported_before_any_send() {
        let tokens = Arc::new(SequenceTokens::new(Duration::from_secs(3600)).failing_first());
        // Nothing listens here; an attempted send would be a transport error.
        let client =
            FcmClient::with_token_provider("demo", Some("http://127.0.0.1:9".into()), tokens);

        assert!(matches!(
            client.send(&message("tok1")).await,
            Err(FcmError::Auth(_))
        ));
    }
}
