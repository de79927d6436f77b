use async_trait::async_trait;
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use jsonwebtoken::{Algorithm, EncodingKey};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::OnceCell;

use super::SignError;
use super::token::{DEFAULT_ACCOUNT_PATH, METADATA_FLAVOR, MetadataTokenSource, TokenSource};

/// Produces RSA-SHA256 signatures on behalf of a service account
#[async_trait]
pub trait BlobSigner: Send + Sync {
    /// Service account the signature is attributed to (`X-Goog-Credential`)
    async fn client_email(&self) -> Result<String, SignError>;

    /// RSASSA-PKCS1-v1_5 / SHA-256 signature over `payload`
    async fn sign_blob(&self, payload: &[u8]) -> Result<Vec<u8>, SignError>;

    /// Short label for logs
    fn kind(&self) -> &'static str;
}

/// The fields of a service-account JSON key that signing needs
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

/// Signs locally with a service-account private key
pub struct KeyFileSigner {
    client_email: String,
    encoding_key: EncodingKey,
}

impl std::fmt::Debug for KeyFileSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyFileSigner")
            .field("client_email", &self.client_email)
            .finish_non_exhaustive()
    }
}

impl KeyFileSigner {
    pub fn from_file(path: &Path) -> Result<Self, SignError> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, SignError> {
        let key: ServiceAccountKey = serde_json::from_slice(data)
            .map_err(|e| SignError::InvalidCredentials(e.to_string()))?;
        Self::from_key(key)
    }

    pub fn from_key(key: ServiceAccountKey) -> Result<Self, SignError> {
        if key.client_email.is_empty() {
            return Err(SignError::InvalidCredentials("client_email is empty".into()));
        }

        // PKCS#8 (what Google issues) and PKCS#1 PEM both parse here
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| SignError::InvalidCredentials(format!("private_key: {e}")))?;

        Ok(Self {
            client_email: key.client_email,
            encoding_key,
        })
    }
}

#[async_trait]
impl BlobSigner for KeyFileSigner {
    async fn client_email(&self) -> Result<String, SignError> {
        Ok(self.client_email.clone())
    }

    async fn sign_blob(&self, payload: &[u8]) -> Result<Vec<u8>, SignError> {
        // RS256 is RSASSA-PKCS1-v1_5 over SHA-256, returned base64url encoded
        let signature = jsonwebtoken::crypto::sign(payload, &self.encoding_key, Algorithm::RS256)
            .map_err(|e| SignError::Crypto(e.to_string()))?;
        URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| SignError::Crypto(e.to_string()))
    }

    fn kind(&self) -> &'static str {
        "key_file"
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignBlobRequest {
    payload: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignBlobResponse {
    #[serde(default)]
    key_id: Option<String>,
    signed_blob: String,
}

/// Signs through the IAM Credentials API as the ambient service account
///
/// The account email is read from the metadata server on first use and cached. An access
/// token is fetched from the metadata server for every signature.
pub struct IamBlobSigner {
    tokens: MetadataTokenSource,
    iam_endpoint: String,
    email: OnceCell<String>,
}

impl IamBlobSigner {
    pub fn new(
        http: reqwest::Client,
        metadata_endpoint: impl Into<String>,
        iam_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            tokens: MetadataTokenSource::new(http, metadata_endpoint),
            iam_endpoint: iam_endpoint.into().trim_end_matches('/').to_string(),
            email: OnceCell::new(),
        }
    }

    async fn fetch_email(&self) -> Result<String, SignError> {
        let url = format!("{}{DEFAULT_ACCOUNT_PATH}/email", self.tokens.endpoint());
        let email = self
            .tokens
            .http()
            .get(&url)
            .header(METADATA_FLAVOR, "Google")
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| SignError::Metadata(e.to_string()))?
            .text()
            .await
            .map_err(|e| SignError::Metadata(e.to_string()))?;

        let email = email.trim().to_string();
        if email.is_empty() {
            return Err(SignError::Metadata("empty service account email".into()));
        }

        tracing::info!(%email, "Resolved default service account for URL signing");
        Ok(email)
    }
}

#[async_trait]
impl BlobSigner for IamBlobSigner {
    async fn client_email(&self) -> Result<String, SignError> {
        self.email
            .get_or_try_init(|| self.fetch_email())
            .await
            .cloned()
    }

    async fn sign_blob(&self, payload: &[u8]) -> Result<Vec<u8>, SignError> {
        let email = self.client_email().await?;
        let token = self.tokens.access_token().await?;
        let url = format!(
            "{}/v1/projects/-/serviceAccounts/{}:signBlob",
            self.iam_endpoint, email
        );

        let response: SignBlobResponse = self
            .tokens
            .http()
            .post(&url)
            .bearer_auth(token)
            .json(&SignBlobRequest {
                payload: STANDARD.encode(payload),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::debug!(key_id = ?response.key_id, "signBlob succeeded");

        STANDARD
            .decode(response.signed_blob)
            .map_err(|e| SignError::Remote(format!("invalid signedBlob: {e}")))
    }

    fn kind(&self) -> &'static str {
        "iam"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::Path as UrlPath,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    };
    use jsonwebtoken::DecodingKey;
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    const KEY_JSON: &[u8] = include_bytes!("../../tests/fixtures/service_account.json");
    const PUBLIC_PEM: &[u8] = include_bytes!("../../tests/fixtures/service_account.pub.pem");

    #[tokio::test]
    async fn test_key_file_signer_produces_verifiable_signature() {
        let signer = KeyFileSigner::from_json(KEY_JSON).unwrap();

        assert_eq!(
            signer.client_email().await.unwrap(),
            "signer@test-project.iam.gserviceaccount.com"
        );

        let signature = signer.sign_blob(b"GOOG4-RSA-SHA256\npayload").await.unwrap();
        assert_eq!(signature.len(), 256);

        let decoding_key = DecodingKey::from_rsa_pem(PUBLIC_PEM).unwrap();
        let verified = jsonwebtoken::crypto::verify(
            &URL_SAFE_NO_PAD.encode(&signature),
            b"GOOG4-RSA-SHA256\npayload",
            &decoding_key,
            Algorithm::RS256,
        )
        .unwrap();
        assert!(verified);
    }

    #[tokio::test]
    async fn test_key_file_signer_from_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("sa.json");
        std::fs::write(&path, KEY_JSON).unwrap();

        let signer = KeyFileSigner::from_file(&path).unwrap();
        assert_eq!(signer.kind(), "key_file");
    }

    #[test]
    fn test_key_file_signer_rejects_bad_input() {
        assert!(matches!(
            KeyFileSigner::from_json(b"not json"),
            Err(SignError::InvalidCredentials(_))
        ));

        let bad_key = json!({"private_key": "garbage", "client_email": "x@y"});
        assert!(matches!(
            KeyFileSigner::from_json(&serde_json::to_vec(&bad_key).unwrap()),
            Err(SignError::InvalidCredentials(_))
        ));

        let missing = std::path::Path::new("/definitely/not/here.json");
        assert!(matches!(
            KeyFileSigner::from_file(missing),
            Err(SignError::CredentialsFile(_))
        ));
    }

    /// Metadata server + IAM Credentials API stand-in. "Signs" by reversing the payload.
    async fn start_mock_google() -> String {
        async fn email(headers: HeaderMap) -> Result<&'static str, StatusCode> {
            match headers.get("Metadata-Flavor").and_then(|v| v.to_str().ok()) {
                Some("Google") => Ok("runtime@test-project.iam.gserviceaccount.com\n"),
                _ => Err(StatusCode::FORBIDDEN),
            }
        }

        async fn token() -> Json<Value> {
            Json(json!({"access_token": "ya29.test", "expires_in": 3599, "token_type": "Bearer"}))
        }

        async fn sign_blob(
            UrlPath(account): UrlPath<String>,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> Result<Json<Value>, StatusCode> {
            if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer ya29.test") {
                return Err(StatusCode::UNAUTHORIZED);
            }
            if account != "runtime@test-project.iam.gserviceaccount.com:signBlob" {
                return Err(StatusCode::NOT_FOUND);
            }
            let payload = STANDARD
                .decode(body["payload"].as_str().unwrap_or_default())
                .map_err(|_| StatusCode::BAD_REQUEST)?;
            let signed: Vec<u8> = payload.into_iter().rev().collect();
            Ok(Json(json!({"keyId": "k1", "signedBlob": STANDARD.encode(signed)})))
        }

        let app = Router::new()
            .route(
                "/computeMetadata/v1/instance/service-accounts/default/email",
                get(email),
            )
            .route(
                "/computeMetadata/v1/instance/service-accounts/default/token",
                get(token),
            )
            .route("/v1/projects/-/serviceAccounts/{account}", post(sign_blob));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_iam_signer_uses_metadata_identity() {
        let endpoint = start_mock_google().await;
        let signer = IamBlobSigner::new(reqwest::Client::new(), &endpoint, &endpoint);

        assert_eq!(
            signer.client_email().await.unwrap(),
            "runtime@test-project.iam.gserviceaccount.com"
        );

        let signature = signer.sign_blob(b"abc").await.unwrap();
        assert_eq!(signature, b"cba");
        assert_eq!(signer.kind(), "iam");
    }

    #[tokio::test]
    async fn test_iam_signer_reports_metadata_failure() {
        // Nothing listens on this port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = format!("http://{addr}");
        let signer = IamBlobSigner::new(reqwest::Client::new(), &endpoint, &endpoint);

        assert!(matches!(
            signer.sign_blob(b"abc").await,
            Err(SignError::Metadata(_))
        ));
    }
}
