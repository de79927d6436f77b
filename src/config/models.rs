use crate::humanize::{ByteSize, HumanDuration};
use crate::storage::DEFAULT_MAX_COMPOSE_SOURCES;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub signing: SigningConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Public host name, only used in logs
    pub host: Option<String>,
    /// Largest accepted `POST /merge` body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: ByteSize,
    /// Upper bound on a whole merge request
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    #[serde(default = "default_cors_allow_origins")]
    pub cors_allow_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            host: None,
            max_body_bytes: default_max_body_bytes(),
            request_timeout: default_request_timeout(),
            cors_allow_origins: default_cors_allow_origins(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_body_bytes() -> ByteSize {
    ByteSize(1024 * 1024) // 1 MB
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(5 * 60)
}

fn default_cors_allow_origins() -> Vec<String> {
    vec!["*".to_string()]
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    #[default]
    Memory,
    Local,
    Gcs,
    S3,
}

/// Storage configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    /// Default bucket (`BUCKET_NAME`)
    pub bucket: Option<String>,
    /// Object served by `GET /view-file` (`FILE_NAME`)
    pub object: Option<String>,
    /// Root directory for the local provider; each bucket is a subdirectory
    pub root: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// Service-account JSON key (`GOOGLE_APPLICATION_CREDENTIALS`)
    pub credentials_file: Option<PathBuf>,
    /// On `gcs`, stream sources through the gateway instead of composing server side
    #[serde(default)]
    pub emulate_compose: bool,
}

/// Batch compose configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MergeConfig {
    #[serde(default = "default_max_compose_sources")]
    pub max_compose_sources: usize,
    #[serde(default = "default_compose_concurrency")]
    pub compose_concurrency: usize,
    #[serde(default)]
    pub ignore_final_compose_error: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_compose_sources: default_max_compose_sources(),
            compose_concurrency: default_compose_concurrency(),
            ignore_final_compose_error: false,
        }
    }
}

fn default_max_compose_sources() -> usize {
    DEFAULT_MAX_COMPOSE_SOURCES
}

fn default_compose_concurrency() -> usize {
    1
}

/// Which credential signs URLs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningMode {
    /// Key file when `storage.credentials_file` is set, otherwise IAM
    #[default]
    Auto,
    KeyFile,
    Iam,
}

/// Signed URL configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SigningConfig {
    #[serde(default)]
    pub mode: SigningMode,
    /// Expiry used when the request does not give one (`SIGNED_URL_EXPIRY`)
    #[serde(default = "default_signed_url_expiry")]
    pub default_expiry: HumanDuration,
    #[serde(default = "default_metadata_endpoint")]
    pub metadata_endpoint: String,
    #[serde(default = "default_iam_endpoint")]
    pub iam_endpoint: String,
    #[serde(default = "default_storage_host")]
    pub storage_host: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            mode: SigningMode::Auto,
            default_expiry: default_signed_url_expiry(),
            metadata_endpoint: default_metadata_endpoint(),
            iam_endpoint: default_iam_endpoint(),
            storage_host: default_storage_host(),
        }
    }
}

pub(crate) fn default_signed_url_expiry() -> HumanDuration {
    HumanDuration::from_secs(15 * 60)
}

fn default_metadata_endpoint() -> String {
    "http://metadata.google.internal".to_string()
}

fn default_iam_endpoint() -> String {
    "https://iamcredentials.googleapis.com".to_string()
}

fn default_storage_host() -> String {
    "storage.googleapis.com".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.server.max_body_bytes.as_u64(), 1024 * 1024);
        assert_eq!(config.storage.provider, StorageProvider::Memory);
        assert_eq!(config.merge.max_compose_sources, 32);
        assert_eq!(config.merge.compose_concurrency, 1);
        assert!(!config.merge.ignore_final_compose_error);
        assert_eq!(config.signing.default_expiry.as_duration().as_secs(), 900);
        assert_eq!(config.signing.mode, SigningMode::Auto);
    }

    #[test]
    fn test_deserialize_from_toml() {
        let config: Config = toml::from_str(
            r#"
[server]
request_timeout = "90s"

[storage]
provider = "gcs"
bucket = "reports"

[signing]
mode = "key_file"
default_expiry = "1h"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.request_timeout.as_duration().as_secs(), 90);
        assert_eq!(config.storage.provider, StorageProvider::Gcs);
        assert_eq!(config.storage.bucket.as_deref(), Some("reports"));
        assert_eq!(config.signing.mode, SigningMode::KeyFile);
        assert_eq!(config.signing.default_expiry.as_duration().as_secs(), 3600);
    }
}
