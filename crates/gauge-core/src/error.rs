//! Unified error types for Gauge

use thiserror::Error;

/// Unified error type for all Gauge operations
#[derive(Error, Debug)]
pub enum GaugeError {
    // Pattern store errors
    #[error("Pattern store corrupt: {0}")]
    StoreCorrupt(String),

    #[error("Pattern store write rejected: {0}")]
    StoreWriteError(String),

    // Evaluation errors
    #[error("Oracle batch unreliable: {failed} of {total} artifacts failed (ceiling {pct:.0}%)", pct = .ceiling * 100.0)]
    EvaluationUnreliable {
        failed: usize,
        total: usize,
        ceiling: f64,
    },

    #[error("Mismatched artifact ids: cheap={cheap}, expensive={expensive}")]
    MismatchedArtifact { cheap: String, expensive: String },

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    // Orchestration errors
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Artifact source error: {0}")]
    ArtifactSource(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl GaugeError {
    /// Whether this error must halt the loop rather than be retried
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::EvaluationUnreliable { .. })
    }
}

/// Result type alias using GaugeError
pub type Result<T> = std::result::Result<T, GaugeError>;
