//! Structured event log.
//!
//! ```text
//! engine ──emit()──► bounded queue ──► writer task ──► robot_events.jsonl
//!                         │
//!                         └── full: record dropped, count metric
//! ```
//!
//! `emit` never blocks and never fails the caller. The writer appends one
//! JSON object per line and flushes after each batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{EventSink, RobotEvent};
use crate::infrastructure::metrics;

/// Event log writing JSON lines to a file from a background task.
#[derive(Debug, Clone)]
pub struct JsonlEventLog {
    tx: mpsc::Sender<RobotEvent>,
}

impl JsonlEventLog {
    /// Start the writer task for `path` (parent directories are created).
    ///
    /// The task drains the queue and exits once `cancel` fires or every
    /// sender is dropped.
    pub fn spawn(
        path: impl Into<PathBuf>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(write_loop(path.into(), rx, cancel));
        (Self { tx }, handle)
    }
}

impl EventSink for JsonlEventLog {
    fn emit(&self, event: RobotEvent) {
        if let Err(e) = self.tx.try_send(event) {
            metrics::record_event_log_dropped();
            tracing::warn!(event_type = %e.into_inner().event_type, "Event log queue full or closed; record dropped");
        }
    }
}

async fn write_loop(path: PathBuf, mut rx: mpsc::Receiver<RobotEvent>, cancel: CancellationToken) {
    let mut file = match open_append(&path).await {
        Ok(file) => Some(file),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Cannot open event log; events will be discarded");
            None
        }
    };

    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        write_event(&mut file, &path, &event).await;
        while let Ok(event) = rx.try_recv() {
            write_event(&mut file, &path, &event).await;
        }
        flush(&mut file, &path).await;
    }

    rx.close();
    while let Some(event) = rx.recv().await {
        write_event(&mut file, &path, &event).await;
    }
    flush(&mut file, &path).await;
    tracing::debug!(path = %path.display(), "Event log writer stopped");
}

async fn open_append(path: &Path) -> std::io::Result<tokio::fs::File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}

async fn write_event(file: &mut Option<tokio::fs::File>, path: &Path, event: &RobotEvent) {
    let Some(handle) = file.as_mut() else {
        return;
    };
    let mut line = match serde_json::to_vec(event) {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!(event_type = %event.event_type, error = %e, "Event not serializable");
            return;
        }
    };
    line.push(b'\n');
    if let Err(e) = handle.write_all(&line).await {
        tracing::error!(path = %path.display(), error = %e, "Event log write failed");
    }
}

async fn flush(file: &mut Option<tokio::fs::File>, path: &Path) {
    if let Some(handle) = file.as_mut()
        && let Err(e) = handle.flush().await
    {
        tracing::error!(path = %path.display(), error = %e, "Event log flush failed");
    }
}

// ============================================
// In-memory sink
// ============================================

/// Event sink keeping every event in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<RobotEvent>>>,
}

impl MemoryEventSink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every recorded event.
    #[must_use]
    pub fn events(&self) -> Vec<RobotEvent> {
        self.events.lock().clone()
    }

    /// Recorded events of one type.
    #[must_use]
    pub fn of_type(&self, event_type: &str) -> Vec<RobotEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Number of recorded events of one type.
    #[must_use]
    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: RobotEvent) {
        self.events.lock().push(event);
    }
}
