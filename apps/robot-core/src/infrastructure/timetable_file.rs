//! Timetable source reading a JSON file.

use async_trait::async_trait;

use crate::application::ports::{TimetableError, TimetableSource};
use crate::domain::timetable::TimetableDocument;

/// Reads the timetable from a file on every poll.
#[derive(Debug, Clone)]
pub struct FileTimetableSource {
    path: String,
}

impl FileTimetableSource {
    /// Source reading `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TimetableSource for FileTimetableSource {
    async fn load(&self) -> Result<TimetableDocument, TimetableError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| TimetableError::Read {
                path: self.path.clone(),
                source,
            })?;
        Ok(serde_json::from_str(&content)?)
    }
}
