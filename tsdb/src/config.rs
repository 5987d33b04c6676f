//! Server configuration module.
//!
//! This module provides configuration loading for the tsdb server from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `TSDB_DATABASE_DIRECTORY`: Directory where store files live (default: `./data`)
//! - `TSDB_LISTEN_PORT`: Port to listen on (default: `15000`)
//!
//! # Invariants
//!
//! - `database_directory` is always a valid path (may not exist yet)
//! - `listen_port` is always a valid port number

use std::path::PathBuf;

const DATABASE_DIRECTORY_VAR: &str = "TSDB_DATABASE_DIRECTORY";
const LISTEN_PORT_VAR: &str = "TSDB_LISTEN_PORT";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory where store files live.
    /// Each store is at `{database_directory}/{name}.dbdb`.
    pub database_directory: PathBuf,
    /// Port to listen on for WebSocket connections.
    pub listen_port: u16,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl ServerConfig {
    /// Default port for the server.
    pub const DEFAULT_PORT: u16 = 15000;
    /// Default store directory.
    pub const DEFAULT_DATABASE_DIRECTORY: &'static str = "./data";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `TSDB_LISTEN_PORT` is set but not a valid port
    /// number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_directory = lookup(DATABASE_DIRECTORY_VAR)
            .map_or_else(|| PathBuf::from(Self::DEFAULT_DATABASE_DIRECTORY), PathBuf::from);
        let listen_port = match lookup(LISTEN_PORT_VAR) {
            Some(value) => parse_port(&value)?,
            None => Self::DEFAULT_PORT,
        };

        Ok(Self {
            database_directory,
            listen_port,
        })
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    match value.parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::InvalidValue {
            name: LISTEN_PORT_VAR.to_string(),
            message: format!("'{value}' is not a valid port number (must be 1-65535)"),
        }),
    }
}
