//! Shared error types.
//!
//! Every crate keeps its own error enum and converts into [`HarvestError`]
//! where a caller only needs the subsystem and a message.

use thiserror::Error;

/// Subsystem-level error.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Configuration errors (file loading, parsing, validation)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Document store failures
    #[error("storage error: {0}")]
    Storage(String),

    /// Browser or page script failures
    #[error("browser error: {0}")]
    Browser(String),

    /// Broker publish or poll failures
    #[error("queue error: {0}")]
    Queue(String),

    /// Input that breaks a documented constraint, e.g. a malformed id
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to determine config directory path
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    /// Failed to parse TOML
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// I/O error reading/writing config
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for invalidity
        reason: String,
    },
}

/// Result type alias using `HarvestError`.
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
