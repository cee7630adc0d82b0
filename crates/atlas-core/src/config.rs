// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

/// Saga orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// Maximum pooled database connections
    pub max_db_connections: u32,
    /// Redis URL backing the message bus
    pub redis_url: String,
    /// Deadline for a saga to make progress
    pub saga_timeout: Duration,
    /// How often expired sagas are swept
    pub sweep_interval: Duration,
    /// Longest a single bus poll blocks
    pub bus_poll_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `ATLAS_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `ATLAS_DB_MAX_CONNECTIONS`: pool size (default: 10)
    /// - `ATLAS_REDIS_URL`: bus connection (default: redis://127.0.0.1:6379)
    /// - `ATLAS_SAGA_TIMEOUT_SECS`: saga deadline (default: 300)
    /// - `ATLAS_SAGA_SWEEP_INTERVAL_SECS`: timeout sweep period (default: 5)
    /// - `ATLAS_BUS_POLL_MS`: bus poll block time (default: 500)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("ATLAS_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("ATLAS_DATABASE_URL"))?;

        let redis_url = std::env::var("ATLAS_REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let max_db_connections: u32 = parse_var("ATLAS_DB_MAX_CONNECTIONS", "10")?;
        if max_db_connections == 0 {
            return Err(ConfigError::Invalid(
                "ATLAS_DB_MAX_CONNECTIONS",
                "must be a positive integer",
            ));
        }

        let saga_timeout_secs: u64 = parse_var("ATLAS_SAGA_TIMEOUT_SECS", "300")?;
        if saga_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "ATLAS_SAGA_TIMEOUT_SECS",
                "must be a positive integer",
            ));
        }
        let sweep_interval_secs: u64 = parse_var("ATLAS_SAGA_SWEEP_INTERVAL_SECS", "5")?;
        let bus_poll_ms: u64 = parse_var("ATLAS_BUS_POLL_MS", "500")?;

        Ok(Self {
            database_url,
            max_db_connections,
            redis_url,
            saga_timeout: Duration::from_secs(saga_timeout_secs),
            sweep_interval: Duration::from_secs(sweep_interval_secs.max(1)),
            bus_poll_timeout: Duration::from_millis(bus_poll_ms),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::Invalid(name, "must be a non-negative integer"))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 5] = [
        "ATLAS_DB_MAX_CONNECTIONS",
        "ATLAS_REDIS_URL",
        "ATLAS_SAGA_TIMEOUT_SECS",
        "ATLAS_SAGA_SWEEP_INTERVAL_SECS",
        "ATLAS_BUS_POLL_MS",
    ];

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }

        fn clear_optional(&mut self) {
            for var in VARS {
                self.remove(var);
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("ATLAS_DATABASE_URL", "postgres://localhost/atlas");
        guard.clear_optional();

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "postgres://localhost/atlas");
        assert_eq!(config.max_db_connections, 10);
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.saga_timeout, Duration::from_secs(300));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.bus_poll_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("ATLAS_DATABASE_URL", "sqlite:.data/sagas.db");
        guard.set("ATLAS_DB_MAX_CONNECTIONS", "3");
        guard.set("ATLAS_REDIS_URL", "redis://bus:6380");
        guard.set("ATLAS_SAGA_TIMEOUT_SECS", "60");
        guard.set("ATLAS_SAGA_SWEEP_INTERVAL_SECS", "2");
        guard.set("ATLAS_BUS_POLL_MS", "100");

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "sqlite:.data/sagas.db");
        assert_eq!(config.max_db_connections, 3);
        assert_eq!(config.redis_url, "redis://bus:6380");
        assert_eq!(config.saga_timeout, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_secs(2));
        assert_eq!(config.bus_poll_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_config_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("ATLAS_DATABASE_URL");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ATLAS_DATABASE_URL")));
        assert!(err.to_string().contains("ATLAS_DATABASE_URL"));
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("ATLAS_DATABASE_URL", "postgres://localhost/atlas");
        guard.clear_optional();
        guard.set("ATLAS_SAGA_TIMEOUT_SECS", "0");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("ATLAS_SAGA_TIMEOUT_SECS", _)));
    }

    #[test]
    fn test_config_invalid_number() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("ATLAS_DATABASE_URL", "postgres://localhost/atlas");
        guard.clear_optional();
        guard.set("ATLAS_BUS_POLL_MS", "-5");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("ATLAS_BUS_POLL_MS", _)));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Missing("TEST_VAR");
        assert_eq!(
            err.to_string(),
            "missing required environment variable: TEST_VAR"
        );

        let err = ConfigError::Invalid("TEST_VAR", "must be a number");
        assert_eq!(err.to_string(), "invalid value for TEST_VAR: must be a number");
    }
}
