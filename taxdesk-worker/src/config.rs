/// Configuration management for the worker
///
/// This module loads configuration from environment variables (and a `.env`
/// file when present) into a type-safe struct.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 5)
/// - `SWEEP_INTERVAL_SECS`: Pause between orphan sweeps (default: 300)
/// - `SWEEP_BATCH_SIZE`: Orphans retried per sweep (default: 100)
/// - `REMINDER_INTERVAL_DAYS`: Days between client reminders (default: 3)
/// - `LOG_FORMAT`: `json` for JSON logs, anything else for text
/// - `RUST_LOG`: Log filter (default: `taxdesk_worker=debug,taxdesk_shared=info`)
///
/// # Example
///
/// ```no_run
/// use taxdesk_worker::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Sweeping every {}s", config.sweeper.interval_secs);
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use taxdesk_shared::db::pool::DatabaseConfig;

use crate::reminder::ReminderConfig;
use crate::sweeper::SweeperConfig;

/// Complete worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseSettings,

    pub sweeper: SweeperConfig,

    pub reminder: ReminderConfig,

    /// Emit logs as JSON lines
    pub log_json: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

impl DatabaseSettings {
    /// Pool settings for [`taxdesk_shared::db::pool::create_pool`]
    pub fn pool_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            ..Default::default()
        }
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or a numeric variable
    /// does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5u32)?;
        let interval_secs = parse_or(&lookup, "SWEEP_INTERVAL_SECS", 300u64)?;
        let batch_size = parse_or(&lookup, "SWEEP_BATCH_SIZE", 100usize)?;

        let interval_days = parse_or(&lookup, "REMINDER_INTERVAL_DAYS", 3u64)?;

        if interval_secs == 0 {
            anyhow::bail!("SWEEP_INTERVAL_SECS must be greater than zero");
        }
        if interval_days == 0 {
            anyhow::bail!("REMINDER_INTERVAL_DAYS must be greater than zero");
        }

        let log_json = lookup("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(Self {
            database: DatabaseSettings {
                url,
                max_connections,
            },
            sweeper: SweeperConfig {
                interval_secs,
                batch_size,
            },
            reminder: ReminderConfig { interval_days },
            log_json,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", key, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_lookup(lookup(&[("DATABASE_URL", "postgresql://localhost/taxdesk")]))
                .unwrap();

        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.sweeper.interval_secs, 300);
        assert_eq!(config.sweeper.batch_size, 100);
        assert_eq!(config.reminder.interval_days, 3);
        assert!(!config.log_json);
        assert_eq!(config.database.pool_config().url, "postgresql://localhost/taxdesk");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgresql://localhost/taxdesk"),
            ("DATABASE_MAX_CONNECTIONS", "20"),
            ("SWEEP_INTERVAL_SECS", "60"),
            ("SWEEP_BATCH_SIZE", "10"),
            ("REMINDER_INTERVAL_DAYS", "7"),
            ("LOG_FORMAT", "JSON"),
        ]))
        .unwrap();

        assert_eq!(config.database.pool_config().max_connections, 20);
        assert_eq!(config.sweeper.interval_secs, 60);
        assert_eq!(config.sweeper.batch_size, 10);
        assert_eq!(config.reminder.interval_days, 7);
        assert!(config.log_json);
    }

    #[test]
    fn test_missing_database_url() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgresql://localhost/taxdesk"),
            ("SWEEP_INTERVAL_SECS", "soon"),
        ]));
        assert!(result.is_err());

        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgresql://localhost/taxdesk"),
            ("SWEEP_INTERVAL_SECS", "0"),
        ]));
        assert!(result.is_err());

        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgresql://localhost/taxdesk"),
            ("REMINDER_INTERVAL_DAYS", "0"),
        ]));
        assert!(result.is_err());
    }
}
