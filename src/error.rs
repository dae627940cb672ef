// ABOUTME: Defines all error types for the llmstream library using thiserror.
// ABOUTME: Each concern has its own error type, unified under StreamError.

/// Top-level error type for the llmstream library.
///
/// Only construction and transport failures surface here. Everything that
/// goes wrong while parsing a live stream is logged and recorded instead.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Missing required callback: {0}")]
    MissingCallback(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[source] anyhow::Error),
}

/// A bounded append or replace was rejected because it would exceed the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("buffer limit exceeded: {attempted} bytes requested, limit {limit} bytes")]
pub struct BufferOverflow {
    pub attempted: usize,
    pub limit: usize,
}

/// Errors from decoding a single raw stream event.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Malformed event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Event missing field: {0}")]
    MissingField(&'static str),
}

/// Errors from validating or loading stream limits.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid limit '{field}': {reason}")]
    InvalidLimit {
        field: &'static str,
        reason: String,
    },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
