//! Error handling for the proof-of-work miner
//!
//! Every failure of a mining call is reported to the caller. Validation
//! errors are raised before any hashing happens; stop conditions carry the
//! partial statistics collected up to that point.

use crate::types::SearchStats;
use thiserror::Error;

/// Result type alias for mining operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the miner
#[derive(Error, Debug)]
pub enum Error {
    /// Requested difficulty is outside `[0, max]`
    #[error("Invalid difficulty {difficulty}: must be between 0 and {max}")]
    InvalidDifficulty { difficulty: u64, max: u32 },

    /// Input fields cannot be represented in the candidate encoding
    #[error("Encoding failure: {message}")]
    EncodingFailure { message: String },

    /// The nonce counter would leave its representable range
    #[error("Nonce space exhausted at {limit} after {} hashes", .stats.hashes)]
    NonceExhausted { limit: u64, stats: SearchStats },

    /// The abort signal fired before a qualifying nonce was found
    #[error("Search cancelled after {} hashes ({:?})", .stats.hashes, .stats.elapsed)]
    Cancelled { stats: SearchStats },

    /// The deadline expired before a qualifying nonce was found
    #[error("Search timed out after {} hashes ({:?})", .stats.hashes, .stats.elapsed)]
    TimedOut { stats: SearchStats },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Worker thread failures
    #[error("Worker error: {message}")]
    Worker { message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create an invalid difficulty error
    pub fn invalid_difficulty(difficulty: u64, max: u32) -> Self {
        Self::InvalidDifficulty { difficulty, max }
    }

    /// Create an encoding error
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::EncodingFailure {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a worker error
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }

    /// Whether the error ends the call abnormally.
    ///
    /// Cancellation and timeouts are expected outcomes of a bounded search
    /// and are not treated as crashes.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Cancelled { .. } | Error::TimedOut { .. })
    }

    /// Partial statistics for stop conditions reached mid-search
    pub fn stats(&self) -> Option<&SearchStats> {
        match self {
            Error::NonceExhausted { stats, .. }
            | Error::Cancelled { stats }
            | Error::TimedOut { stats } => Some(stats),
            _ => None,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidDifficulty { .. } => "invalid_difficulty",
            Error::EncodingFailure { .. } => "encoding",
            Error::NonceExhausted { .. } => "nonce_exhausted",
            Error::Cancelled { .. } => "cancelled",
            Error::TimedOut { .. } => "timed_out",
            Error::Config { .. } => "config",
            Error::Worker { .. } => "worker",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
        }
    }
}
