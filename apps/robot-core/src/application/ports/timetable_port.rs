//! Timetable Source Port (Driven Port)

use async_trait::async_trait;

use crate::domain::timetable::TimetableDocument;

/// Timetable retrieval error. Any error forces a stand-down.
#[derive(Debug, thiserror::Error)]
pub enum TimetableError {
    /// The document could not be read.
    #[error("Failed to read timetable '{path}': {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The document is not valid timetable JSON.
    #[error("Failed to parse timetable: {0}")]
    Parse(#[from] serde_json::Error),

    /// The source is not available for another reason.
    #[error("Timetable unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },
}

/// Port for the periodically refreshed timetable.
#[async_trait]
pub trait TimetableSource: Send + Sync {
    /// Read and parse the current timetable.
    async fn load(&self) -> Result<TimetableDocument, TimetableError>;
}
