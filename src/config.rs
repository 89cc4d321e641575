//! Configuration loading
//!
//! Loads database connection configuration from environment variables,
//! optionally reading from a .env file first.

use crate::prelude::PgSummaryError;
use std::{env, path::Path};
use tracing::{debug, error, trace, warn};

/// Database connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl DbConfig {
    /// Load configuration from environment variables
    ///
    /// Expected variables:
    /// - POSTGRES_HOST (default: localhost)
    /// - POSTGRES_PORT (default: 5432)
    /// - POSTGRES_DB (default: postgres)
    /// - POSTGRES_USER (default: postgres)
    /// - POSTGRES_PASSWORD (required)
    pub fn from_env() -> Result<Self, PgSummaryError> {
        debug!("Loading database configuration from environment");
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PgSummaryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let with_default = |key: &str, default: &str| {
            lookup(key).unwrap_or_else(|| {
                trace!(key = ?key, "Variable not set, using default");
                default.to_string()
            })
        };

        let host = with_default("POSTGRES_HOST", "localhost");
        let port_str = with_default("POSTGRES_PORT", "5432");

        let port = port_str.parse::<u16>().map_err(|e| {
            error!(port = ?port_str, error = ?e, "Invalid POSTGRES_PORT value");
            PgSummaryError::Config("POSTGRES_PORT must be a valid port number".to_string())
        })?;

        let database = with_default("POSTGRES_DB", "postgres");
        let user = with_default("POSTGRES_USER", "postgres");

        let password = lookup("POSTGRES_PASSWORD").ok_or_else(|| {
            error!("POSTGRES_PASSWORD environment variable is not set");
            PgSummaryError::Config("POSTGRES_PASSWORD environment variable is required".to_string())
        })?;

        debug!(
            host = ?host,
            port = ?port,
            database = ?database,
            user = ?user,
            "Configuration loaded"
        );

        Ok(Self {
            host,
            port,
            database,
            user,
            password,
        })
    }

    /// Load a .env file and then read configuration from environment
    pub fn load(env_file: &Path) -> Result<Self, PgSummaryError> {
        if env_file.exists() {
            debug!(path = ?env_file, "Loading environment file");
            dotenvy::from_path(env_file).map_err(|e| {
                error!(path = ?env_file, error = ?e, "Failed to load environment file");
                PgSummaryError::Config(format!("Failed to load {}: {}", env_file.display(), e))
            })?;
        } else {
            warn!(path = ?env_file, "Environment file not found, using existing environment");
        }

        Self::from_env()
    }

    /// Driver configuration for opening a session
    pub fn postgres_config(&self) -> postgres::Config {
        let mut config = postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .password(&self.password)
            .application_name("pgsummary");
        config
    }

    /// Build a connection string with password redacted (for logs and error messages)
    pub fn redacted_connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password=***",
            self.host, self.port, self.database, self.user
        )
    }
}
