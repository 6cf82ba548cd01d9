//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use blackjack_table::{
    constants::{
        DEFAULT_DECK_COUNT, DEFAULT_MAX_BET, DEFAULT_MAX_SEATS, DEFAULT_MIN_BET,
        DEFAULT_STARTING_CHIPS,
    },
    db::DatabaseConfig,
    table::{TableConfig, TableSpeed},
};
use std::{net::SocketAddr, str::FromStr};

const DEFAULT_BIND: &str = "127.0.0.1:6969";

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration; chips are kept in memory when absent
    pub database: Option<DatabaseConfig>,
    /// Prometheus exporter address; metrics are off when absent
    pub metrics_bind: Option<SocketAddr>,
    /// Table defaults configuration
    pub table_defaults: TableDefaultsConfig,
    /// Number of tables to create on startup
    pub num_tables: usize,
    /// Upper bound on concurrently open tables
    pub max_tables: Option<usize>,
}

/// Default table configuration
#[derive(Debug, Clone)]
pub struct TableDefaultsConfig {
    pub max_seats: usize,
    pub min_bet: i64,
    pub max_bet: i64,
    pub deck_count: usize,
    pub speed: TableSpeed,
    /// Balance for players the chip store has never seen
    pub starting_chips: i64,
}

impl Default for TableDefaultsConfig {
    fn default() -> Self {
        Self {
            max_seats: DEFAULT_MAX_SEATS,
            min_bet: DEFAULT_MIN_BET,
            max_bet: DEFAULT_MAX_BET,
            deck_count: DEFAULT_DECK_COUNT,
            speed: TableSpeed::Normal,
            starting_chips: DEFAULT_STARTING_CHIPS,
        }
    }
}

impl TableDefaultsConfig {
    /// Table configuration for a startup table named `name`
    pub fn table_config(&self, name: String) -> TableConfig {
        TableConfig {
            name,
            max_seats: self.max_seats,
            min_bet: self.min_bet,
            max_bet: self.max_bet,
            deck_count: self.deck_count,
            speed: self.speed,
            starting_chips: self.starting_chips,
            ..TableConfig::default()
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `num_tables_override` - Optional number of tables override (from CLI args)
    ///
    /// # Returns
    ///
    /// * `Result<ServerConfig, ConfigError>` - Loaded configuration or error
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but can't be parsed
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        num_tables_override: Option<usize>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_env("SERVER_BIND")?.unwrap_or_else(default_bind),
        };

        // A URL on the command line beats DATABASE_URL but keeps the pool
        // settings from the environment.
        let database = match database_url_override {
            Some(database_url) => Some(DatabaseConfig {
                database_url,
                ..DatabaseConfig::from_env().unwrap_or_default()
            }),
            None => DatabaseConfig::from_env(),
        };

        let metrics_bind = parse_env("METRICS_BIND")?;

        let defaults = TableDefaultsConfig::default();
        let table_defaults = TableDefaultsConfig {
            max_seats: parse_env("TABLE_MAX_SEATS")?.unwrap_or(defaults.max_seats),
            min_bet: parse_env("TABLE_MIN_BET")?.unwrap_or(defaults.min_bet),
            max_bet: parse_env("TABLE_MAX_BET")?.unwrap_or(defaults.max_bet),
            deck_count: parse_env("TABLE_DECK_COUNT")?.unwrap_or(defaults.deck_count),
            speed: parse_env("TABLE_SPEED")?.unwrap_or(defaults.speed),
            starting_chips: parse_env("STARTING_CHIPS")?.unwrap_or(defaults.starting_chips),
        };

        let num_tables = match num_tables_override {
            Some(num_tables) => num_tables,
            None => parse_env("INITIAL_TABLES")?.unwrap_or(1),
        };

        Ok(ServerConfig {
            bind,
            database,
            metrics_bind,
            table_defaults,
            num_tables,
            max_tables: parse_env("MAX_TABLES")?,
        })
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.table_defaults
            .table_config("Table 1".to_string())
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                var: "TABLE_*".to_string(),
                reason,
            })?;

        if let Some(max_tables) = self.max_tables {
            if max_tables == 0 {
                return Err(ConfigError::Invalid {
                    var: "MAX_TABLES".to_string(),
                    reason: "Must be greater than 0".to_string(),
                });
            }

            if self.num_tables > max_tables {
                return Err(ConfigError::Invalid {
                    var: "INITIAL_TABLES".to_string(),
                    reason: format!("Cannot exceed MAX_TABLES ({max_tables})"),
                });
            }
        }

        Ok(())
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6969))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Parse an environment variable; unset is `None`, unparsable is an error.
fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                var: key.to_string(),
                reason: format!("'{value}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig {
            bind: DEFAULT_BIND.parse().unwrap(),
            database: None,
            metrics_bind: None,
            table_defaults: TableDefaultsConfig::default(),
            num_tables: 1,
            max_tables: None,
        }
    }

    #[test]
    fn test_default_bind_matches_constant() {
        assert_eq!(default_bind(), DEFAULT_BIND.parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Invalid {
            var: "SERVER_BIND".to_string(),
            reason: "bad address".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("SERVER_BIND"));
        assert!(msg.contains("bad address"));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_min_bet_zero() {
        let mut config = config();
        config.table_defaults.min_bet = 0;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_config_validation_max_bet_below_min() {
        let mut config = config();
        config.table_defaults.min_bet = 100;
        config.table_defaults.max_bet = 50;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_too_many_startup_tables() {
        let mut config = config();
        config.num_tables = 3;
        config.max_tables = Some(2);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("INITIAL_TABLES"));
    }

    #[test]
    fn test_table_config_carries_defaults() {
        let defaults = TableDefaultsConfig {
            min_bet: 25,
            speed: TableSpeed::Turbo,
            ..TableDefaultsConfig::default()
        };
        let table = defaults.table_config("Table 2".to_string());
        assert_eq!(table.name, "Table 2");
        assert_eq!(table.min_bet, 25);
        assert_eq!(table.speed, TableSpeed::Turbo);
        assert_eq!(table.max_bet, DEFAULT_MAX_BET);
    }
}
