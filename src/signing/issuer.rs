use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::signer::{BlobSigner, IamBlobSigner, KeyFileSigner};
use super::SignError;
use crate::config::{Config, MAX_SIGNED_URL_EXPIRY, SigningMode};
use crate::humanize::HumanDuration;

const SIGNING_ALGORITHM: &str = "GOOG4-RSA-SHA256";
const SIGNED_HEADERS: &str = "host";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// A signed URL and the instant it stops working
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Pick the expiry for one request
///
/// A parseable `requested` value (`"30m"`, `"1h"`, or integer seconds) wins; otherwise the
/// configured default applies, which itself already folds in `SIGNED_URL_EXPIRY` and the
/// 15 minute fallback. Unparseable request values are ignored.
pub fn resolve_expiry(requested: Option<&str>, configured: Duration) -> Duration {
    requested
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| match value.parse::<HumanDuration>() {
            Ok(duration) => Some(duration.as_duration()),
            Err(e) => {
                tracing::debug!(value, error = %e, "Ignoring unparseable expiry parameter");
                None
            }
        })
        .unwrap_or(configured)
}

/// Issues GCS V4 signed GET URLs
#[derive(Clone)]
pub struct SignedUrlIssuer {
    signer: Arc<dyn BlobSigner>,
    storage_host: String,
    default_expiry: Duration,
}

impl SignedUrlIssuer {
    pub fn new(
        signer: Arc<dyn BlobSigner>,
        storage_host: impl Into<String>,
        default_expiry: Duration,
    ) -> Self {
        Self {
            signer,
            storage_host: storage_host.into(),
            default_expiry,
        }
    }

    /// Build the issuer the configuration asks for
    ///
    /// `auto` uses the key file when one is configured and the IAM signBlob API otherwise.
    pub fn from_config(config: &Config) -> Result<Self, SignError> {
        let key_file = config.storage.credentials_file.as_deref();
        let signer: Arc<dyn BlobSigner> = match (config.signing.mode, key_file) {
            (SigningMode::KeyFile | SigningMode::Auto, Some(path)) => {
                Arc::new(KeyFileSigner::from_file(path)?)
            }
            (SigningMode::KeyFile, None) => {
                return Err(SignError::InvalidCredentials(
                    "key_file signing requires a credentials file".into(),
                ));
            }
            (SigningMode::Iam | SigningMode::Auto, _) => Arc::new(IamBlobSigner::new(
                reqwest::Client::new(),
                &config.signing.metadata_endpoint,
                &config.signing.iam_endpoint,
            )),
        };

        info!(signer = signer.kind(), "URL signer selected");

        Ok(Self::new(
            signer,
            &config.signing.storage_host,
            config.signing.default_expiry.as_duration(),
        ))
    }

    pub fn signer_kind(&self) -> &'static str {
        self.signer.kind()
    }

    /// Expiry for a request, see [`resolve_expiry`]
    pub fn resolve_expiry(&self, requested: Option<&str>) -> Duration {
        resolve_expiry(requested, self.default_expiry)
    }

    /// Sign a GET URL for `bucket/object` valid for `expiry` from now
    pub async fn sign(
        &self,
        bucket: &str,
        object: &str,
        expiry: Duration,
    ) -> Result<SignedUrl, SignError> {
        self.sign_at(bucket, object, expiry, Utc::now()).await
    }

    /// Sign as of a fixed instant
    pub async fn sign_at(
        &self,
        bucket: &str,
        object: &str,
        expiry: Duration,
        now: DateTime<Utc>,
    ) -> Result<SignedUrl, SignError> {
        if expiry < Duration::from_secs(1) || expiry > MAX_SIGNED_URL_EXPIRY {
            return Err(SignError::InvalidExpiry(expiry));
        }
        let expires_at = now
            + chrono::Duration::from_std(expiry).map_err(|_| SignError::InvalidExpiry(expiry))?;

        let email = self.signer.client_email().await?;
        let request_time = now.format("%Y%m%dT%H%M%SZ").to_string();
        let scope = format!("{}/auto/storage/goog4_request", now.format("%Y%m%d"));

        let canonical_uri = format!("/{}/{}", uri_encode(bucket, true), uri_encode(object, false));
        let canonical_query = [
            ("X-Goog-Algorithm", SIGNING_ALGORITHM.to_string()),
            ("X-Goog-Credential", format!("{email}/{scope}")),
            ("X-Goog-Date", request_time.clone()),
            ("X-Goog-Expires", expiry.as_secs().to_string()),
            ("X-Goog-SignedHeaders", SIGNED_HEADERS.to_string()),
        ]
        .iter()
        .map(|(key, value)| format!("{}={}", key, uri_encode(value, true)))
        .collect::<Vec<_>>()
        .join("&");

        let canonical_request = [
            "GET",
            canonical_uri.as_str(),
            canonical_query.as_str(),
            format!("host:{}\n", self.storage_host).as_str(),
            SIGNED_HEADERS,
            UNSIGNED_PAYLOAD,
        ]
        .join("\n");

        let string_to_sign = [
            SIGNING_ALGORITHM,
            request_time.as_str(),
            scope.as_str(),
            hex::encode(Sha256::digest(canonical_request.as_bytes())).as_str(),
        ]
        .join("\n");

        let signature = self.signer.sign_blob(string_to_sign.as_bytes()).await?;

        info!(
            bucket,
            object,
            expires_in = expiry.as_secs(),
            signer = self.signer.kind(),
            "Issued signed URL"
        );

        Ok(SignedUrl {
            url: format!(
                "https://{}{}?{}&X-Goog-Signature={}",
                self.storage_host,
                canonical_uri,
                canonical_query,
                hex::encode(signature)
            ),
            expires_at,
        })
    }
}

/// RFC 3986 percent-encoding; `/` is left alone unless `encode_slash`
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            b'/' if !encode_slash => encoded.push('/'),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
