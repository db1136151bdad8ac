//! Error types for the overlay engine.
//!
//! Errors are contained at the smallest scope that detects them: a record,
//! a layer, or (for configuration problems only) the whole map surface.

use thiserror::Error;

/// Result type alias using OverlayError.
pub type OverlayResult<T> = Result<T, OverlayError>;

/// Primary error type for overlay operations.
#[derive(Debug, Error)]
pub enum OverlayError {
    // === Layer-level errors ===
    #[error("Network error fetching '{target}': {message}")]
    Network { target: String, message: String },

    #[error("Invalid response from '{target}': {message}")]
    InvalidResponse { target: String, message: String },

    #[error("Request to '{target}' timed out after {secs}s")]
    Timeout { target: String, secs: u64 },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    // === Record-level errors ===
    #[error("Failed to parse geometry: {0}")]
    Parse(String),

    #[error("No usable coordinates: {0}")]
    Coordinate(String),

    // === Engine-level errors ===
    #[error("Configuration error: {0}")]
    Config(String),
}

/// How far an error is allowed to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Skip the record, keep ingesting.
    Record,
    /// Mark the layer, leave every other layer alone.
    Layer,
    /// Disable the map surface.
    Engine,
}

impl OverlayError {
    pub fn network(target: impl Into<String>, message: impl Into<String>) -> Self {
        OverlayError::Network {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn invalid_response(target: impl Into<String>, message: impl Into<String>) -> Self {
        OverlayError::InvalidResponse {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn scope(&self) -> ErrorScope {
        match self {
            OverlayError::Parse(_) | OverlayError::Coordinate(_) => ErrorScope::Record,
            OverlayError::Config(_) => ErrorScope::Engine,
            _ => ErrorScope::Layer,
        }
    }

    /// Record-level data-quality noise is logged only, never shown.
    pub fn is_user_visible(&self) -> bool {
        self.scope() != ErrorScope::Record
    }
}

impl From<serde_json::Error> for OverlayError {
    fn from(err: serde_json::Error) -> Self {
        OverlayError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for OverlayError {
    fn from(err: std::io::Error) -> Self {
        OverlayError::Config(format!("I/O error: {}", err))
    }
}
