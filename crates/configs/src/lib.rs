//! # Settings
//!
//! Layered configuration: built-in defaults, then an optional
//! `config/feed.toml`, then `FEED__`-prefixed environment variables
//! (`FEED__RANKING__REBUILD_INTERVAL_SECS=30`). A `.env` file is loaded first
//! when present.

use std::net::SocketAddr;
use std::time::Duration;

use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use config::builder::DefaultState;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const CONFIG_FILE: &str = "config/feed";
const ENV_PREFIX: &str = "FEED";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub ranking: RankingSettings,
    pub cache: CacheSettings,
    #[serde(default)]
    pub redis: RedisSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub bind_addr: SocketAddr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingSettings {
    /// Sorted-set key of the ranking index.
    pub key: String,
    pub rebuild_page_size: u32,
    pub rebuild_interval_secs: u64,
    pub candidate_multiplier: u32,
    pub store_timeout_ms: u64,
    pub max_page_size: u32,
    /// Highest 0-based feed page served.
    pub max_page: u32,
}

impl RankingSettings {
    pub fn rebuild_interval(&self) -> Duration {
        Duration::from_secs(self.rebuild_interval_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub top_limit: u32,
    pub key_prefix: String,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Without a URL the in-memory index and cache are used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedisSettings {
    pub url: Option<SecretString>,
}

/// Without a URL the in-memory feed store is used.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: Option<SecretString>,
    pub max_connections: u32,
}

/// Without a secret every viewer is anonymous.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: Option<SecretString>,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(Config::builder()
        .set_default("server.bind_addr", "0.0.0.0:8080")?
        .set_default("ranking.key", "feed:ranking")?
        .set_default("ranking.rebuild_page_size", 500)?
        .set_default("ranking.rebuild_interval_secs", 60)?
        .set_default("ranking.candidate_multiplier", 5)?
        .set_default("ranking.store_timeout_ms", 250)?
        .set_default("ranking.max_page_size", 100)?
        .set_default("ranking.max_page", 100)?
        .set_default("cache.ttl_secs", 60)?
        .set_default("cache.top_limit", 20)?
        .set_default("cache.key_prefix", "feed:top")?
        .set_default("database.max_connections", 10)?)
}

impl Settings {
    /// Loads `.env`, the optional config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        let builder = defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        Self::build(builder)
    }

    /// Defaults overlaid with a TOML document.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Self::build(defaults()?.add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_positive("ranking.rebuild_page_size", u64::from(self.ranking.rebuild_page_size))?;
        validate_positive("ranking.rebuild_interval_secs", self.ranking.rebuild_interval_secs)?;
        validate_positive("ranking.candidate_multiplier", u64::from(self.ranking.candidate_multiplier))?;
        validate_positive("ranking.store_timeout_ms", self.ranking.store_timeout_ms)?;
        validate_positive("ranking.max_page_size", u64::from(self.ranking.max_page_size))?;
        validate_positive("cache.ttl_secs", self.cache.ttl_secs)?;
        validate_positive("cache.top_limit", u64::from(self.cache.top_limit))?;
        validate_positive("database.max_connections", u64::from(self.database.max_connections))?;
        validate_not_blank("ranking.key", &self.ranking.key)?;
        validate_not_blank("cache.key_prefix", &self.cache.key_prefix)?;
        if self.cache.top_limit > self.ranking.max_page_size {
            return Err(ConfigError::Invalid(
                "cache.top_limit",
                format!(
                    "{} exceeds ranking.max_page_size {}",
                    self.cache.top_limit, self.ranking.max_page_size
                ),
            ));
        }
        Ok(())
    }
}

fn validate_positive(name: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(name, "must be greater than 0".into()));
    }
    Ok(())
}

fn validate_not_blank(name: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(name, "cannot be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults_are_complete() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.server.bind_addr.port(), 8080);
        assert_eq!(settings.ranking.key, "feed:ranking");
        assert_eq!(settings.ranking.rebuild_page_size, 500);
        assert_eq!(settings.ranking.rebuild_interval(), Duration::from_secs(60));
        assert_eq!(settings.ranking.candidate_multiplier, 5);
        assert_eq!(settings.ranking.store_timeout(), Duration::from_millis(250));
        assert_eq!(settings.ranking.max_page_size, 100);
        assert_eq!(settings.ranking.max_page, 100);
        assert_eq!(settings.cache.ttl(), Duration::from_secs(60));
        assert_eq!(settings.cache.top_limit, 20);
        assert_eq!(settings.cache.key_prefix, "feed:top");
        assert_eq!(settings.database.max_connections, 10);
        assert!(settings.redis.url.is_none());
        assert!(settings.database.url.is_none());
        assert!(settings.auth.jwt_secret.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let settings = Settings::from_toml(
            r#"
            [ranking]
            rebuild_interval_secs = 15
            candidate_multiplier = 3

            [redis]
            url = "redis://cache:6379"

            [auth]
            jwt_secret = "s3cret"
            "#,
        )
        .unwrap();
        assert_eq!(settings.ranking.rebuild_interval_secs, 15);
        assert_eq!(settings.ranking.candidate_multiplier, 3);
        assert_eq!(settings.ranking.rebuild_page_size, 500);
        let url = settings.redis.url.as_ref().map(|u| u.expose_secret().to_string());
        assert_eq!(url.as_deref(), Some("redis://cache:6379"));
    }

    #[test]
    fn zero_multiplier_is_rejected() {
        let err = Settings::from_toml("[ranking]\ncandidate_multiplier = 0").unwrap_err();
        assert!(err.to_string().contains("ranking.candidate_multiplier"));
    }

    #[test]
    fn blank_key_is_rejected() {
        let err = Settings::from_toml("[ranking]\nkey = \"  \"").unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn top_limit_must_fit_a_page() {
        let err = Settings::from_toml("[cache]\ntop_limit = 500").unwrap_err();
        assert!(err.to_string().contains("cache.top_limit"));
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let settings = Settings::from_toml("[auth]\njwt_secret = \"do-not-print\"").unwrap();
        assert!(!format!("{settings:?}").contains("do-not-print"));
    }
}
