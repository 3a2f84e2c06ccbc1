use super::models::{Config, Principal, Role};
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "DOCMIRROR_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/docmirror.toml";
const ENV_PREFIX: &str = "DOCMIRROR";
const ENV_SEPARATOR: &str = "__";

const ADMIN_TOKEN_ENV: &str = "DOCMIRROR_ADMIN_TOKEN";
const DRIVER_TOKEN_ENV: &str = "DOCMIRROR_TOKEN";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // A missing .env is normal outside development
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);

    Ok(config)
}

/// Secrets are never read from TOML files, only from the environment
fn load_secrets(config: &mut Config) {
    config.storage.access_key = env::var("S3_ACCESS_KEY")
        .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
        .ok();
    config.storage.secret_key = env::var("S3_SECRET_KEY")
        .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
        .ok();

    if let Ok(token) = env::var(ADMIN_TOKEN_ENV) {
        apply_admin_token(config, token);
    }

    if let Ok(token) = env::var(DRIVER_TOKEN_ENV) {
        config.driver.token = Some(token);
    }
}

/// Register an environment-provided admin principal and let the local driver use it
fn apply_admin_token(config: &mut Config, token: String) {
    if token.is_empty() || config.auth.principals.iter().any(|p| p.token == token) {
        return;
    }

    config.auth.principals.push(Principal {
        name: "env-admin".to_string(),
        token: token.clone(),
        role: Role::Admin,
    });

    if config.driver.token.is_none() {
        config.driver.token = Some(token);
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

    // DOCMIRROR__WORKER__BATCH_SIZE -> worker.batch_size
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
