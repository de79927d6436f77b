use super::models::{Config, SigningMode, StorageProvider};
use std::time::Duration;
use thiserror::Error;

/// Longest lifetime a V4 signed URL may have (7 days)
pub const MAX_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("merge.max_compose_sources must be at least 2, got {0}")]
    ComposeLimitTooSmall(usize),

    #[error("merge.compose_concurrency must be positive")]
    InvalidComposeConcurrency,

    #[error("signing.default_expiry must be between 1s and 7 days, got {0:?}")]
    InvalidDefaultExpiry(Duration),

    #[error("server.request_timeout must be positive")]
    InvalidRequestTimeout,

    #[error("signing.mode is key_file but no credentials file is configured")]
    MissingCredentialsFile,

    #[error("storage provider is local but storage.root is not set")]
    MissingLocalRoot,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_merge(config)?;
    validate_server(config)?;
    validate_signing(config)?;
    validate_storage(config)?;
    Ok(())
}

fn validate_merge(config: &Config) -> Result<(), ValidationError> {
    // K = 1 would never shrink the source list
    if config.merge.max_compose_sources < 2 {
        return Err(ValidationError::ComposeLimitTooSmall(
            config.merge.max_compose_sources,
        ));
    }

    if config.merge.compose_concurrency == 0 {
        return Err(ValidationError::InvalidComposeConcurrency);
    }

    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    if config.server.request_timeout.as_duration().is_zero() {
        return Err(ValidationError::InvalidRequestTimeout);
    }
    Ok(())
}

fn validate_signing(config: &Config) -> Result<(), ValidationError> {
    let expiry = config.signing.default_expiry.as_duration();
    if expiry < Duration::from_secs(1) || expiry > MAX_SIGNED_URL_EXPIRY {
        return Err(ValidationError::InvalidDefaultExpiry(expiry));
    }

    if config.signing.mode == SigningMode::KeyFile && config.storage.credentials_file.is_none() {
        return Err(ValidationError::MissingCredentialsFile);
    }

    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.provider == StorageProvider::Local && config.storage.root.is_none() {
        return Err(ValidationError::MissingLocalRoot);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::HumanDuration;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_compose_limit_must_shrink() {
        let mut config = Config::default();
        config.merge.max_compose_sources = 1;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::ComposeLimitTooSmall(1))
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.merge.compose_concurrency = 0;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidComposeConcurrency)
        ));
    }

    #[test]
    fn test_default_expiry_bounds() {
        let mut config = Config::default();
        config.signing.default_expiry = HumanDuration::from_secs(8 * 24 * 60 * 60);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidDefaultExpiry(_))
        ));

        config.signing.default_expiry = HumanDuration::from_secs(0);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidDefaultExpiry(_))
        ));

        config.signing.default_expiry = HumanDuration::from_secs(7 * 24 * 60 * 60);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_key_file_mode_needs_credentials() {
        let mut config = Config::default();
        config.signing.mode = SigningMode::KeyFile;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::MissingCredentialsFile)
        ));

        config.storage.credentials_file = Some(PathBuf::from("/secrets/sa.json"));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_local_provider_needs_root() {
        let mut config = Config::default();
        config.storage.provider = StorageProvider::Local;
        assert!(matches!(validate(&config), Err(ValidationError::MissingLocalRoot)));
    }
}
