use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "PRIVACY_PROXY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/privacy-proxy.toml";
const ENV_PREFIX: &str = "PRIVACY_PROXY";
const ENV_SEPARATOR: &str = "__";

const PROXY_USERNAME_VAR: &str = "UPSTREAM_PROXY_USERNAME";
const PROXY_PASSWORD_VAR: &str = "UPSTREAM_PROXY_PASSWORD";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);

    Ok(config)
}

/// Upstream proxy credentials are never stored in TOML files
fn load_secrets(config: &mut Config) {
    if let Ok(username) = env::var(PROXY_USERNAME_VAR) {
        config.upstream_proxy.username = Some(username);
    }
    if let Ok(password) = env::var(PROXY_PASSWORD_VAR) {
        config.upstream_proxy.password = Some(password);
    }
}

/// Load configuration from a specific path and environment
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

    // PRIVACY_PROXY__SERVER__BIND_ADDR -> server.bind_addr
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
