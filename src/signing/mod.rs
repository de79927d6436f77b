//! Time-limited signed URLs for direct object access
//!
//! [`SignedUrlIssuer`] builds GCS V4 (`GOOG4-RSA-SHA256`) query-string signed URLs. The
//! RSA signature itself comes from a [`BlobSigner`], chosen once at startup:
//!
//! - [`KeyFileSigner`] signs locally with the private key of a service-account JSON file
//! - [`IamBlobSigner`] asks the IAM Credentials `signBlob` API to sign as the runtime's
//!   default service account (Cloud Run, GKE, GCE)
//!
//! The same credentials also mint OAuth2 access tokens ([`TokenSource`]) for calls to the
//! GCS JSON API.

mod issuer;
mod signer;
mod token;

pub use issuer::{SignedUrl, SignedUrlIssuer, resolve_expiry};
pub use signer::{BlobSigner, IamBlobSigner, KeyFileSigner, ServiceAccountKey};
pub use token::{MetadataTokenSource, STORAGE_SCOPE, ServiceAccountTokenSource, TokenSource};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("failed to read credential file: {0}")]
    CredentialsFile(#[from] std::io::Error),

    #[error("failed to parse credential file: {0}")]
    InvalidCredentials(String),

    #[error("failed to get default service account email from metadata: {0}")]
    Metadata(String),

    #[error("signBlob request failed: {0}")]
    Remote(String),

    #[error("signing failed: {0}")]
    Crypto(String),

    #[error("expiry must be between 1s and 7 days, got {0:?}")]
    InvalidExpiry(Duration),
}

impl SignError {
    /// True when the caller asked for something unsignable rather than signing breaking
    pub fn is_client_error(&self) -> bool {
        matches!(self, SignError::InvalidExpiry(_))
    }
}

impl From<reqwest::Error> for SignError {
    fn from(value: reqwest::Error) -> Self {
        SignError::Remote(value.to_string())
    }
}
