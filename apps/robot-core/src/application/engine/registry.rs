//! Stream registry of one trading session.

use std::collections::BTreeMap;

use crate::application::ports::StreamWorkflow;
use crate::application::recovery::RecoveryStream;
use crate::domain::shared::{InstrumentId, StreamId};

/// One registered stream.
pub(super) struct StreamEntry {
    pub(super) workflow: Box<dyn StreamWorkflow>,
    pub(super) slot_time: String,
    /// False for streams whose journal already showed a commit.
    pub(super) armed: bool,
}

impl StreamEntry {
    /// Committed according to the workflow or the journal.
    pub(super) fn is_committed(&self) -> bool {
        !self.armed || self.workflow.committed()
    }
}

/// Result of applying a directive to an existing stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum UpdateOutcome {
    Applied,
    Unchanged,
    IgnoredCommitted,
    IgnoredEmptySlot,
}

impl UpdateOutcome {
    pub(super) const fn reason(self) -> Option<&'static str> {
        match self {
            Self::IgnoredCommitted => Some("COMMITTED"),
            Self::IgnoredEmptySlot => Some("EMPTY_SLOT_TIME"),
            Self::Applied | Self::Unchanged => None,
        }
    }
}

/// Streams keyed by id. Iteration order is the id order.
#[derive(Default)]
pub(super) struct StreamRegistry {
    entries: BTreeMap<StreamId, StreamEntry>,
}

impl StreamRegistry {
    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(super) fn contains(&self, stream: &StreamId) -> bool {
        self.entries.contains_key(stream)
    }

    pub(super) fn ids(&self) -> Vec<StreamId> {
        self.entries.keys().cloned().collect()
    }

    pub(super) fn get_mut(&mut self, stream: &StreamId) -> Option<&mut StreamEntry> {
        self.entries.get_mut(stream)
    }

    /// Register a stream. Returns `false` and drops `entry` when the id is
    /// already taken.
    pub(super) fn insert(&mut self, stream: StreamId, entry: StreamEntry) -> bool {
        if self.entries.contains_key(&stream) {
            return false;
        }
        self.entries.insert(stream, entry);
        true
    }

    /// Armed entries, for ticking and bar delivery.
    pub(super) fn armed_mut(&mut self) -> impl Iterator<Item = &mut StreamEntry> {
        self.entries.values_mut().filter(|e| e.armed)
    }

    /// Every stream with its committed flag, for the recovery runner.
    pub(super) fn recovery_streams(&mut self) -> Vec<RecoveryStream<'_>> {
        self.entries
            .values_mut()
            .map(|entry| {
                let committed = entry.is_committed();
                RecoveryStream {
                    workflow: entry.workflow.as_mut(),
                    committed,
                }
            })
            .collect()
    }

    /// Every entry, armed or not.
    pub(super) fn entries_mut(&mut self) -> impl Iterator<Item = &mut StreamEntry> {
        self.entries.values_mut()
    }

    /// Armed streams trading `instrument`.
    pub(super) fn armed_on_instrument(
        &mut self,
        instrument: &InstrumentId,
    ) -> impl Iterator<Item = &mut StreamEntry> {
        self.armed_mut()
            .filter(move |e| e.workflow.instrument() == instrument)
    }

    /// Whether any armed stream is in an active trading state.
    pub(super) fn has_active(&self) -> bool {
        self.entries
            .values()
            .any(|e| e.armed && e.workflow.state().is_active_trading())
    }

    /// Apply a changed slot time to an existing stream.
    pub(super) fn update<F>(&mut self, stream: &StreamId, slot_time: &str, apply: F) -> Option<UpdateOutcome>
    where
        F: FnOnce(&mut dyn StreamWorkflow),
    {
        let entry = self.entries.get_mut(stream)?;
        if entry.is_committed() {
            return Some(UpdateOutcome::IgnoredCommitted);
        }
        if slot_time.is_empty() {
            return Some(UpdateOutcome::IgnoredEmptySlot);
        }
        if entry.slot_time == slot_time {
            return Some(UpdateOutcome::Unchanged);
        }
        apply(entry.workflow.as_mut());
        entry.slot_time = slot_time.to_string();
        Some(UpdateOutcome::Applied)
    }
}
