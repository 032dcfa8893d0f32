use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Errors raised while building the configuration snapshot.
///
/// All of them abort startup before any connection attempt is made.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Invalid {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Offset policy applied by the group coordinator when no committed offset
/// exists for a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    #[default]
    Earliest,
    Latest,
}

impl OffsetReset {
    /// Value for the `auto.offset.reset` client property.
    pub fn as_kafka(self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

// ------------------------------------------------------------
// Consumer configuration
// ------------------------------------------------------------
//
// Loaded once in main from an optional JSON file and frozen for the
// lifetime of the process. Every component receives it by reference;
// nothing mutates it after construction.
//
// Every field has a default so an empty file (or no file at all) yields a
// working local setup.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Kafka coordination address (host:port)
    pub kafka_address: String,

    /// Consumer group id
    pub group_id: String,

    /// Per-process client id; falls back to the group id when unset
    pub client_id: Option<String>,

    /// Offset policy when no committed offset exists
    pub offset_reset: OffsetReset,

    /// Max age in milliseconds for collector heartbeats.
    ///
    /// NOTE:
    /// Passed through to the message handler; the consumer core itself
    /// never reads it.
    pub expected_heartbeat_interval: u64,

    /// Stats interval in seconds; 0 disables periodic stats
    pub stats_interval: u64,

    /// Database endpoint (host:port), probed once at startup
    pub db_host: String,

    /// Database username
    ///
    /// NOTE: consumed by the storage handler, not the core.
    #[allow(dead_code)]
    pub db_user: String,

    /// Database password
    #[allow(dead_code)]
    pub db_pw: String,

    /// Database name
    pub db_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kafka_address: "localhost:2181".to_string(),
            group_id: "openbmp-mysql-consumer".to_string(),
            client_id: None,
            offset_reset: OffsetReset::Earliest,
            expected_heartbeat_interval: 330_000,
            stats_interval: 300,
            db_host: "localhost:3306".to_string(),
            db_user: "openbmp".to_string(),
            db_pw: "openbmp".to_string(),
            db_name: "openBMP".to_string(),
        }
    }
}

impl Config {
    /// Loads the configuration from a JSON file.
    ///
    /// A missing path yields the defaults; an unreadable or malformed file
    /// is a startup error, not something to limp past.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let config = match path {
            None => Config::default(),
            Some(path) => {
                let data = fs::read_to_string(Path::new(path)).map_err(|source| {
                    ConfigError::Unreadable {
                        path: path.to_string(),
                        source,
                    }
                })?;
                serde_json::from_str(&data).map_err(|source| ConfigError::Invalid {
                    path: path.to_string(),
                    source,
                })?
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Effective client id: the configured one, or the group id.
    pub fn client_id(&self) -> &str {
        self.client_id.as_deref().unwrap_or(&self.group_id)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        fn host_port(field: &str, value: &str) -> Result<(), ConfigError> {
            let valid = match value.rsplit_once(':') {
                Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
                None => false,
            };
            if valid {
                Ok(())
            } else {
                Err(ConfigError::Validation(format!(
                    "{} must be host:port, got {:?}",
                    field, value
                )))
            }
        }

        host_port("kafka_address", &self.kafka_address)?;
        host_port("db_host", &self.db_host)?;

        if self.group_id.trim().is_empty() {
            return Err(ConfigError::Validation("group_id must not be empty".into()));
        }
        if let Some(client_id) = &self.client_id {
            if client_id.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "client_id must not be empty when set".into(),
                ));
            }
        }
        if self.db_name.trim().is_empty() {
            return Err(ConfigError::Validation("db_name must not be empty".into()));
        }

        Ok(())
    }
}
