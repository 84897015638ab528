//! Error types for configuration, envelope assembly and delivery

use std::fmt;

/// Result type alias for delivery operations
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Errors that prevent the agent from starting
#[derive(Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    Io(std::io::Error),

    /// Configuration file is not valid JSON/TOML for the expected structure
    Parse(String),

    /// Configuration parsed but holds unusable values
    Invalid(String),

    /// No configuration file found in any of the searched locations
    NotFound(Vec<String>),

    /// The orchestrator was started without any monitor
    NoMonitors,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "failed to read configuration: {}", err),
            ConfigError::Parse(msg) => write!(f, "invalid configuration file: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {}", msg),
            ConfigError::NotFound(searched) => {
                write!(f, "config file not found (searched: {})", searched.join(", "))
            }
            ConfigError::NoMonitors => write!(
                f,
                "no monitors registered, register at least one monitor"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

/// Errors while handing an envelope to the ingestion endpoint. Every variant is
/// retried.
#[derive(Debug)]
pub enum DeliveryError {
    /// Network-level failure (connect, timeout, body read)
    Network(String),

    /// Endpoint answered with a non-2xx status
    Status { status: u16, body: String },
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Network(msg) => write!(f, "network error: {}", msg),
            DeliveryError::Status { status, body } if body.is_empty() => {
                write!(f, "HTTP error: {}", status)
            }
            DeliveryError::Status { status, body } => {
                write!(f, "HTTP error: {} ({})", status, body)
            }
        }
    }
}

impl std::error::Error for DeliveryError {}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Network(err.to_string())
    }
}
