//! Error types for Kino Tracks

use thiserror::Error;

/// Result type alias for track reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Track reconciliation error types
#[derive(Error, Debug)]
pub enum Error {
    // Lifecycle errors
    #[error("Track dispatcher used after dispose")]
    DispatcherDisposed,

    #[error("Shared reference updated after finish")]
    ReferenceFinished,

    // Manifest lookup errors
    #[error("Unknown period: {0}")]
    UnknownPeriod(String),

    #[error("Unknown adaptation: {0}")]
    UnknownAdaptation(String),

    #[error("Unknown representation: {0}")]
    UnknownRepresentation(String),

    #[error("No dispatcher for period {period_id} ({track_type})")]
    UnknownDispatcher { period_id: String, track_type: String },

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if the caller can keep using the component that failed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UnknownPeriod(_)
                | Error::UnknownAdaptation(_)
                | Error::UnknownRepresentation(_)
                | Error::UnknownDispatcher { .. }
        )
    }

    /// Returns the error code used in logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::DispatcherDisposed => "DISPATCHER_DISPOSED",
            Error::ReferenceFinished => "REFERENCE_FINISHED",
            Error::UnknownPeriod(_) => "UNKNOWN_PERIOD",
            Error::UnknownAdaptation(_) => "UNKNOWN_ADAPTATION",
            Error::UnknownRepresentation(_) => "UNKNOWN_REPRESENTATION",
            Error::UnknownDispatcher { .. } => "UNKNOWN_DISPATCHER",
            Error::InvalidManifest(_) => "INVALID_MANIFEST",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Json(_) => "JSON",
        }
    }
}
