//! Environment-driven server configuration.

use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

use invoicekit_infra::billing::DEFAULT_MAX_RETRIES;

pub const BIND_ADDR_ENV: &str = "INVOICEKIT_BIND_ADDR";
pub const STORE_ENV: &str = "INVOICEKIT_STORE";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const MAX_RETRIES_ENV: &str = "INVOICEKIT_MAX_RETRIES";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid socket address: {value}")]
    InvalidBindAddr { var: &'static str, value: String },
    #[error("unknown store backend '{0}' (expected memory or postgres)")]
    UnknownStore(String),
    #[error("{0} must be set when the postgres store is selected")]
    MissingDatabaseUrl(&'static str),
    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidMaxRetries { var: &'static str, value: String },
    #[error("the postgres store requires the `postgres` feature")]
    PostgresDisabled,
}

/// Where events are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(ConfigError::UnknownStore(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreBackend,
    /// Required when `store` is `Postgres`.
    pub database_url: Option<String>,
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            store: StoreBackend::Memory,
            database_url: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset and blank values take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_raw = get(BIND_ADDR_ENV).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidBindAddr {
                var: BIND_ADDR_ENV,
                value: bind_raw.clone(),
            })?;

        let store = match get(STORE_ENV) {
            Some(raw) => raw.parse()?,
            None => StoreBackend::Memory,
        };

        let database_url = get(DATABASE_URL_ENV);
        if store == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl(DATABASE_URL_ENV));
        }

        let max_retries = match get(MAX_RETRIES_ENV) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidMaxRetries {
                    var: MAX_RETRIES_ENV,
                    value: raw,
                })?,
            None => DEFAULT_MAX_RETRIES,
        };

        Ok(Self {
            bind_addr,
            store,
            database_url,
            max_retries,
        })
    }
}
