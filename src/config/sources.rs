use super::models::Config;
use crate::humanize::HumanDuration;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "COMPOSEBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/composebox.toml";
const ENV_PREFIX: &str = "COMPOSEBOX";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_layered(config_path, |key| env::var(key).ok())
}

/// Same layering as [`load`], with the file given explicitly (`--config`)
pub fn load_with_path(config_path: PathBuf) -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();
    load_layered(config_path, |key| env::var(key).ok())
}

/// File and `COMPOSEBOX__*` layers, then the deployment variables `lookup` resolves
pub fn load_layered<F>(config_path: PathBuf, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = load_from_sources(config_path)?;
    apply_deployment_env(&mut config, lookup);
    Ok(config)
}

/// Apply the plain environment variables older deployments set
///
/// These win over the file and `COMPOSEBOX__*` values. Credentials are only ever read
/// from the environment, never from the TOML file.
pub fn apply_deployment_env<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(bucket) = lookup("BUCKET_NAME") {
        config.storage.bucket = Some(bucket);
    }
    if let Some(object) = lookup("FILE_NAME") {
        config.storage.object = Some(object);
    }
    if let Some(host) = lookup("HOST") {
        config.server.host = Some(host);
    }
    if let Some(path) = lookup("GOOGLE_APPLICATION_CREDENTIALS") {
        config.storage.credentials_file = Some(PathBuf::from(path));
    }
    if let Some(expiry) = lookup("SIGNED_URL_EXPIRY") {
        match expiry.parse::<HumanDuration>() {
            Ok(duration) => config.signing.default_expiry = duration,
            Err(e) => tracing::warn!(
                value = %expiry,
                error = %e,
                "Ignoring unparseable SIGNED_URL_EXPIRY"
            ),
        }
    }
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // COMPOSEBOX__MERGE__MAX_COMPOSE_SOURCES -> merge.max_compose_sources
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("server.cors_allow_origins"),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
