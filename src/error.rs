//! Error types for the survey bot.

use std::time::Duration;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid response from channel {name}: {reason}")]
    InvalidResponse { name: String, reason: String },
}

/// Discount verification errors.
///
/// Never leaves the discount client: every variant is collapsed into the
/// failure sentinel before the orchestrator sees it.
#[derive(Debug, thiserror::Error)]
pub enum DiscountError {
    #[error("Discount request failed: {0}")]
    Transport(String),

    #[error("Discount request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Discount service returned status {status}")]
    Status { status: u16 },

    #[error("Malformed discount response: {0}")]
    Malformed(String),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
