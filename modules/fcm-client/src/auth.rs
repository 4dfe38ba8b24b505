//! OAuth2 bearer tokens for the FCM v1 API.
//!
//! A service account signs a JWT assertion and exchanges it at Google's token
//! endpoint for an access token that lives about an hour. `TokenCache` holds
//! the current token and fetches a new one once it is within
//! `REFRESH_MARGIN` of expiry.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::FcmError;

pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens closer than this to expiry are replaced before use.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    /// `None` for tokens that never expire.
    pub expires_at: Option<Instant>,
}

impl AccessToken {
    pub fn expiring_in(value: impl Into<String>, ttl: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: Some(Instant::now() + ttl),
        }
    }

    pub fn non_expiring(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        match self.expires_at {
            None => true,
            Some(at) => now + REFRESH_MARGIN < at,
        }
    }
}

/// Source of bearer tokens for FCM requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch(&self) -> Result<AccessToken, FcmError>;
}

/// A fixed token, e.g. for a local emulator.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn fetch(&self) -> Result<AccessToken, FcmError> {
        Ok(AccessToken::non_expiring(self.0.clone()))
    }
}

/// Service account credentials, as found in a Firebase key file.
#[derive(Clone)]
pub struct ServiceAccountKey {
    pub client_email: String,
    /// PEM-encoded RSA private key.
    pub private_key: String,
    /// Token endpoint override. Defaults to `GOOGLE_TOKEN_URI`.
    pub token_uri: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Exchanges signed service-account assertions for access tokens.
pub struct ServiceAccountTokens {
    client_email: String,
    token_uri: String,
    encoding_key: EncodingKey,
    http: Client,
}

impl ServiceAccountTokens {
    pub fn new(key: ServiceAccountKey, http: Client) -> Result<Self, FcmError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| FcmError::Auth(format!("invalid service account private key: {e}")))?;
        Ok(Self {
            client_email: key.client_email,
            token_uri: key.token_uri.unwrap_or_else(|| GOOGLE_TOKEN_URI.to_string()),
            encoding_key,
            http,
        })
    }

    fn assertion(&self, issued_at: i64) -> Result<String, FcmError> {
        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: MESSAGING_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| FcmError::Auth(format!("failed to sign assertion: {e}")))
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokens {
    async fn fetch(&self) -> Result<AccessToken, FcmError> {
        let assertion = self.assertion(chrono::Utc::now().timestamp())?;

        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FcmError::Auth(format!(
                "token exchange failed ({status}): {body}"
            )));
        }

        let token = response.json::<TokenResponse>().await?;
        Ok(AccessToken::expiring_in(
            token.access_token,
            Duration::from_secs(token.expires_in),
        ))
    }
}

/// The current token, refreshed on demand. One refresh at a time.
pub struct TokenCache {
    provider: Arc<dyn TokenProvider>,
    current: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            current: Mutex::new(None),
        }
    }

    /// A token with more than `REFRESH_MARGIN` left, fetching one if needed.
    pub async fn bearer(&self) -> Result<String, FcmError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.value.clone());
        }

        let token = self.provider.fetch().await?;
        let value = token.value.clone();
        *current = Some(token);
        Ok(value)
    }

    /// Forget the cached token; the next `bearer` call fetches a new one.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{http_response, serve, SequenceTokens};
    use jsonwebtoken::{decode, DecodingKey, Validation};

    const TEST_KEY: &str = include_str!("../tests/fixtures/service_account_key.pem");
    const TEST_PUBLIC_KEY: &str = include_str!("../tests/fixtures/service_account_key.pub.pem");

    fn service_account(token_uri: Option<String>) -> ServiceAccountKey {
        ServiceAccountKey {
            client_email: "dispatcher@demo.iam.gserviceaccount.com".into(),
            private_key: TEST_KEY.into(),
            token_uri,
        }
    }

    #[tokio::test]
    async fn cached_token_is_reused_while_fresh() {
        let provider = Arc::new(SequenceTokens::new(Duration::from_secs(3600)));
        let cache = TokenCache::new(provider.clone());

        assert_eq!(cache.bearer().await.unwrap(), "token-1");
        assert_eq!(cache.bearer().await.unwrap(), "token-1");
        assert_eq!(provider.fetches(), 1);
    }

    #[tokio::test]
    async fn token_near_expiry_is_refreshed() {
        // Inside the refresh margin from the moment it is issued.
        let provider = Arc::new(SequenceTokens::new(Duration::from_secs(30)));
        let cache = TokenCache::new(provider.clone());

        assert_eq!(cache.bearer().await.unwrap(), "token-1");
        assert_eq!(cache.bearer().await.unwrap(), "token-2");
        assert_eq!(provider.fetches(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_token() {
        let provider = Arc::new(SequenceTokens::new(Duration::from_secs(3600)));
        let cache = TokenCache::new(provider.clone());

        cache.bearer().await.unwrap();
        cache.invalidate().await;
        assert_eq!(cache.bearer().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn failed_fetch_is_retried_on_next_call() {
        let provider = Arc::new(SequenceTokens::new(Duration::from_secs(3600)).failing_first());
        let cache = TokenCache::new(provider.clone());

        assert!(matches!(cache.bearer().await, Err(FcmError::Auth(_))));
        assert_eq!(cache.bearer().await.unwrap(), "token-2");
    }

    #[test]
    fn assertion_is_signed_for_the_token_endpoint() {
        let tokens = ServiceAccountTokens::new(service_account(None), Client::new()).unwrap();
        let now = chrono::Utc::now().timestamp();
        let jwt = tokens.assertion(now).unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[GOOGLE_TOKEN_URI]);
        let claims = decode::<AssertionClaims>(
            &jwt,
            &DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap()
        .claims;

        assert_eq!(claims.iss, "dispatcher@demo.iam.gserviceaccount.com");
        assert_eq!(claims.scope, MESSAGING_SCOPE);
        assert_eq!(claims.exp - claims.iat, ASSERTION_LIFETIME_SECS);
    }

    #[test]
    fn malformed_private_key_is_rejected() {
        let mut key = service_account(None);
        key.private_key = "not a pem".into();
        assert!(matches!(
            ServiceAccountTokens::new(key, Client::new()),
            Err(FcmError::Auth(_))
        ));
    }

    #[test]
    fn debug_output_hides_private_key() {
        let rendered = format!("{:?}", service_account(None));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("PRIVATE KEY"));
    }

    #[tokio::test]
    async fn service_account_exchanges_assertion_for_access_token() {
        let (url, requests) = serve(vec![http_response(
            "200 OK",
            r#"{"access_token":"ya29.test","expires_in":3599,"token_type":"Bearer"}"#,
        )])
        .await;
        let tokens =
            ServiceAccountTokens::new(service_account(Some(format!("{url}/token"))), Client::new())
                .unwrap();

        let token = tokens.fetch().await.unwrap();
        assert_eq!(token.value, "ya29.test");
        assert!(token.expires_at.is_some());

        let requests = requests.await.unwrap();
        assert!(requests[0].starts_with("POST /token"));
        assert!(requests[0].contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"));
        assert!(requests[0].contains("assertion="));
    }

    #[tokio::test]
    async fn rejected_exchange_is_an_auth_error() {
        let (url, _requests) = serve(vec![http_response(
            "400 Bad Request",
            r#"{"error":"invalid_grant"}"#,
        )])
        .await;
        let tokens =
            ServiceAccountTokens::new(service_account(Some(format!("{url}/token"))), Client::new())
                .unwrap();

        match tokens.fetch().await {
            Err(FcmError::Auth(msg)) => assert!(msg.contains("invalid_grant")),
            other => panic!("expected Auth error, got {other:?}"),
        }
    }
}
