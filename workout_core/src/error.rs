//! Error types for the workout_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for workout_core operations
///
/// Parsing and mutation are total and never produce one of these; only the
/// host-document boundary and configuration IO can fail.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The workout block is no longer where we last saw it
    #[error("Workout block not found: {0}")]
    BlockNotFound(String),

    /// The block at the expected location belongs to another workout
    #[error("Workout block title mismatch: expected {expected:?}, found {found:?}")]
    TitleMismatch {
        expected: Option<String>,
        found: Option<String>,
    },

    /// Other host document failure
    #[error("Host document error: {0}")]
    Host(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
