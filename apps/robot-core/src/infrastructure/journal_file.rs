//! Journal reader over `<dir>/<trading_date>_<stream>.json` files.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::application::ports::{JournalError, JournalReader, JournalRecord};
use crate::domain::shared::{StreamId, TradingDate};

/// Reads journal records written by the stream workflow.
#[derive(Debug, Clone)]
pub struct FileJournalReader {
    dir: PathBuf,
}

impl FileJournalReader {
    /// Reader over `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the record for `(trading_date, stream)`.
    #[must_use]
    pub fn path_for(&self, trading_date: TradingDate, stream: &StreamId) -> PathBuf {
        self.dir.join(format!("{trading_date}_{stream}.json"))
    }
}

#[async_trait]
impl JournalReader for FileJournalReader {
    async fn load(
        &self,
        trading_date: TradingDate,
        stream: &StreamId,
    ) -> Result<Option<JournalRecord>, JournalError> {
        let path = self.path_for(trading_date, stream);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(JournalError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| JournalError::Parse {
                path: path.display().to_string(),
                source,
            })
    }
}
