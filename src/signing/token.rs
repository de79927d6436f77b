use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::SignError;
use super::signer::ServiceAccountKey;

pub(crate) const METADATA_FLAVOR: &str = "Metadata-Flavor";
pub(crate) const DEFAULT_ACCOUNT_PATH: &str =
    "/computeMetadata/v1/instance/service-accounts/default";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Read/write on objects, enough for compose and delete
pub const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const ASSERTION_LIFETIME: Duration = Duration::from_secs(3600);
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// OAuth2 bearer tokens for Google APIs
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, SignError>;

    fn kind(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Tokens of the runtime's default service account, from the metadata server
///
/// The metadata server caches and refreshes tokens itself, so every call goes to it.
#[derive(Debug, Clone)]
pub struct MetadataTokenSource {
    http: reqwest::Client,
    metadata_endpoint: String,
}

impl MetadataTokenSource {
    pub fn new(http: reqwest::Client, metadata_endpoint: impl Into<String>) -> Self {
        Self {
            http,
            metadata_endpoint: metadata_endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.metadata_endpoint
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn access_token(&self) -> Result<String, SignError> {
        let url = format!("{}{DEFAULT_ACCOUNT_PATH}/token", self.metadata_endpoint);
        let token: TokenResponse = self
            .http
            .get(&url)
            .header(METADATA_FLAVOR, "Google")
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| SignError::Metadata(e.to_string()))?
            .json()
            .await
            .map_err(|e| SignError::Metadata(e.to_string()))?;
        Ok(token.access_token)
    }

    fn kind(&self) -> &'static str {
        "metadata"
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Tokens minted from a service-account key via the JWT bearer grant
///
/// A token is reused until shortly before the lifetime the token endpoint reported.
pub struct ServiceAccountTokenSource {
    http: reqwest::Client,
    client_email: String,
    key_id: Option<String>,
    token_uri: String,
    scope: String,
    encoding_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for ServiceAccountTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokenSource")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountTokenSource {
    pub fn from_file(http: reqwest::Client, path: &Path) -> Result<Self, SignError> {
        let data = std::fs::read(path)?;
        let key: ServiceAccountKey = serde_json::from_slice(&data)
            .map_err(|e| SignError::InvalidCredentials(e.to_string()))?;
        Self::from_key(http, key)
    }

    pub fn from_key(http: reqwest::Client, key: ServiceAccountKey) -> Result<Self, SignError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| SignError::InvalidCredentials(format!("private_key: {e}")))?;

        Ok(Self {
            http,
            client_email: key.client_email,
            key_id: key.private_key_id,
            token_uri: key
                .token_uri
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            scope: STORAGE_SCOPE.to_string(),
            encoding_key,
            cached: Mutex::new(None),
        })
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    fn assertion(&self) -> Result<String, SignError> {
        let iat = chrono::Utc::now().timestamp().max(0) as u64;
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: &self.scope,
            aud: &self.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME.as_secs(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();

        jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| SignError::Crypto(e.to_string()))
    }

    async fn exchange(&self) -> Result<TokenResponse, SignError> {
        let assertion = self.assertion()?;

        let token = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(token)
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<String, SignError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| Instant::now() < t.refresh_at) {
            return Ok(token.token.clone());
        }

        let response = self.exchange().await?;
        let lifetime = Duration::from_secs(response.expires_in.unwrap_or(3600));
        tracing::debug!(
            client_email = %self.client_email,
            expires_in = lifetime.as_secs(),
            "Minted access token"
        );

        *cached = Some(CachedToken {
            token: response.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN),
        });
        Ok(response.access_token)
    }

    fn kind(&self) -> &'static str {
        "service_account"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Form, Json, Router, http::HeaderMap, http::StatusCode, routing::{get, post}};
    use jsonwebtoken::{DecodingKey, Validation};
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    const KEY_JSON: &[u8] = include_bytes!("../../tests/fixtures/service_account.json");
    const PUBLIC_PEM: &[u8] = include_bytes!("../../tests/fixtures/service_account.pub.pem");

    #[derive(Debug, Deserialize)]
    struct Claims {
        iss: String,
        scope: String,
        aud: String,
        iat: u64,
        exp: u64,
    }

    /// OAuth token endpoint that checks the assertion and counts exchanges
    async fn start_token_endpoint(exchanges: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let audience = format!("http://{addr}/token");

        let app = Router::new().route(
            "/token",
            post(move |Form(form): Form<HashMap<String, String>>| {
                let exchanges = exchanges.clone();
                let audience = audience.clone();
                async move {
                    if form.get("grant_type").map(String::as_str) != Some(JWT_BEARER_GRANT) {
                        return Err(StatusCode::BAD_REQUEST);
                    }
                    let assertion = form.get("assertion").ok_or(StatusCode::BAD_REQUEST)?;

                    let mut validation = Validation::new(Algorithm::RS256);
                    validation.set_audience(&[audience.as_str()]);
                    let key = DecodingKey::from_rsa_pem(PUBLIC_PEM).unwrap();
                    let claims = jsonwebtoken::decode::<Claims>(assertion, &key, &validation)
                        .map_err(|_| StatusCode::UNAUTHORIZED)?
                        .claims;

                    assert_eq!(claims.iss, "signer@test-project.iam.gserviceaccount.com");
                    assert_eq!(claims.scope, STORAGE_SCOPE);
                    assert_eq!(claims.aud, audience);
                    assert_eq!(claims.exp - claims.iat, 3600);

                    let n = exchanges.fetch_add(1, Ordering::SeqCst);
                    Ok(Json(json!({
                        "access_token": format!("ya29.minted-{n}"),
                        "expires_in": 3599,
                        "token_type": "Bearer"
                    })))
                }
            }),
        );

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}/token")
    }

    fn key_with_token_uri(token_uri: &str) -> ServiceAccountKey {
        let mut key: Value = serde_json::from_slice(KEY_JSON).unwrap();
        key["token_uri"] = json!(token_uri);
        serde_json::from_value(key).unwrap()
    }

    #[tokio::test]
    async fn test_service_account_token_is_minted_and_cached() {
        let exchanges = Arc::new(AtomicUsize::new(0));
        let token_uri = start_token_endpoint(exchanges.clone()).await;

        let source =
            ServiceAccountTokenSource::from_key(reqwest::Client::new(), key_with_token_uri(&token_uri))
                .unwrap();

        assert_eq!(source.access_token().await.unwrap(), "ya29.minted-0");
        assert_eq!(source.access_token().await.unwrap(), "ya29.minted-0");
        assert_eq!(exchanges.load(Ordering::SeqCst), 1);
        assert_eq!(source.kind(), "service_account");
    }

    #[tokio::test]
    async fn test_service_account_token_endpoint_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/token", post(|| async { StatusCode::FORBIDDEN }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let source = ServiceAccountTokenSource::from_key(
            reqwest::Client::new(),
            key_with_token_uri(&format!("http://{addr}/token")),
        )
        .unwrap();

        assert!(matches!(
            source.access_token().await,
            Err(SignError::Remote(_))
        ));
    }

    #[tokio::test]
    async fn test_metadata_token_requires_flavor_header() {
        async fn token(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
            match headers.get(METADATA_FLAVOR).and_then(|v| v.to_str().ok()) {
                Some("Google") => Ok(Json(json!({"access_token": "ya29.meta", "expires_in": 3599}))),
                _ => Err(StatusCode::FORBIDDEN),
            }
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(&format!("{DEFAULT_ACCOUNT_PATH}/token"), get(token));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let source = MetadataTokenSource::new(reqwest::Client::new(), format!("http://{addr}/"));
        assert_eq!(source.access_token().await.unwrap(), "ya29.meta");
        assert_eq!(source.kind(), "metadata");
    }
}
