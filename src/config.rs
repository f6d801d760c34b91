//! Migrator options and MongoDB connection settings, both readable from the
//! environment.

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mongodb::options::{ClientOptions, ServerApi, ServerApiVersion};
use mongodb::{Client, Database};

use crate::logging::Logger;

pub const DEFAULT_COLLECTION_NAME: &str = "migrations";

#[derive(Clone)]
pub struct MigratorConfig {
    /// Master switch for migrator log lines.
    pub log: bool,
    /// Custom sink; `None` logs through `tracing`.
    pub logger: Option<Arc<dyn Logger>>,
    /// Log "already at version" when a run has nothing to do.
    pub log_if_latest: bool,
    /// Collection holding the control record.
    pub collection_name: String,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            log: true,
            logger: None,
            log_if_latest: true,
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
        }
    }
}

impl fmt::Debug for MigratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigratorConfig")
            .field("log", &self.log)
            .field("logger", &self.logger.as_ref().map(|_| "custom"))
            .field("log_if_latest", &self.log_if_latest)
            .field("collection_name", &self.collection_name)
            .finish()
    }
}

impl MigratorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log: env_flag("MIGRATIONS_LOG").unwrap_or(defaults.log),
            logger: None,
            log_if_latest: env_flag("MIGRATIONS_LOG_IF_LATEST").unwrap_or(defaults.log_if_latest),
            collection_name: env::var("MIGRATIONS_COLLECTION").unwrap_or(defaults.collection_name),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|value| parse_flag(&value))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Connection pool settings for the MongoDB client.
#[derive(Debug, Clone)]
pub struct MongoSettings {
    pub uri: String,
    pub database: String,
    pub max_pool_size: u32,
    pub min_pool_size: u32,
    pub max_idle_time: Duration,
    pub connect_timeout: Duration,
}

impl Default for MongoSettings {
    fn default() -> Self {
        Self {
            uri: "mongodb://mongo:27017".to_string(),
            database: "shortener".to_string(),
            max_pool_size: 20,
            min_pool_size: 0,
            max_idle_time: Duration::from_millis(300_000),
            connect_timeout: Duration::from_millis(10_000),
        }
    }
}

impl MongoSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            uri: env::var("MONGODB_URI").unwrap_or(defaults.uri),
            database: env::var("MONGODB_DATABASE").unwrap_or(defaults.database),
            max_pool_size: env_number("MONGODB_MAX_POOL_SIZE").unwrap_or(defaults.max_pool_size),
            min_pool_size: env_number("MONGODB_MIN_POOL_SIZE").unwrap_or(defaults.min_pool_size),
            max_idle_time: env_number("MONGODB_MAX_IDLE_TIME_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_idle_time),
            connect_timeout: env_number("MONGODB_CONNECT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
        }
    }

    /// Build a pooled client and return the configured database.
    pub async fn connect(&self) -> Result<Database, mongodb::error::Error> {
        let mut client_options = ClientOptions::parse(&self.uri).await?;
        client_options.max_pool_size = Some(self.max_pool_size);
        client_options.min_pool_size = Some(self.min_pool_size);
        client_options.max_idle_time = Some(self.max_idle_time);
        client_options.connect_timeout = Some(self.connect_timeout);
        client_options.server_api = Some(ServerApi::builder().version(ServerApiVersion::V1).build());
        client_options.app_name = Some("mongo-migrator".to_string());
        let client = Client::with_options(client_options)?;
        Ok(client.database(&self.database))
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MigratorConfig::default();
        assert!(config.log);
        assert!(config.log_if_latest);
        assert!(config.logger.is_none());
        assert_eq!(config.collection_name, "migrations");
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_mongo_settings_defaults() {
        let settings = MongoSettings::default();
        assert_eq!(settings.max_pool_size, 20);
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
    }
}
