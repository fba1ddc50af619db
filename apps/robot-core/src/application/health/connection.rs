//! Sustained connection loss tracking shared by every monitor that observes
//! the same physical broker connection.
//!
//! Several engine instances may watch one connection. Each reports status
//! changes here; the first monitor to see the loss cross the threshold claims
//! the alert for the episode and the others see it as already claimed.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::recovery::ConnectionStatus;

/// One claimed sustained-loss alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SustainedLoss {
    /// Episode counter, increasing with every new disconnect.
    pub episode: u64,
    /// When the connection was first seen lost in this episode.
    pub since: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LossState {
    lost_since: Option<DateTime<Utc>>,
    episode: u64,
    alerted: bool,
}

/// Shared connection loss state.
#[derive(Debug, Default)]
pub struct ConnectionLossCoordinator {
    state: Mutex<LossState>,
}

impl ConnectionLossCoordinator {
    /// Create a coordinator with no loss recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection status change.
    ///
    /// The first non-connected status opens an episode; reconnecting closes it
    /// and clears the alert flag without any notification.
    pub fn on_status(&self, status: ConnectionStatus, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        if status.is_connected() {
            if let Some(since) = state.lost_since.take() {
                tracing::info!(
                    episode = state.episode,
                    lost_secs = (now - since).num_seconds(),
                    "Broker connection restored"
                );
            }
            state.alerted = false;
        } else if state.lost_since.is_none() {
            state.lost_since = Some(now);
            state.episode += 1;
            state.alerted = false;
        }
    }

    /// Whether the connection is currently considered lost.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.state.lock().lost_since.is_some()
    }

    /// Claim the sustained-loss alert for the current episode.
    ///
    /// Returns `Some` at most once per episode, and only once the loss has
    /// lasted at least `threshold`.
    pub fn claim_sustained_loss(
        &self,
        now: DateTime<Utc>,
        threshold: chrono::Duration,
    ) -> Option<SustainedLoss> {
        let mut state = self.state.lock();
        let since = state.lost_since?;
        if state.alerted || now - since < threshold {
            return None;
        }
        state.alerted = true;
        Some(SustainedLoss {
            episode: state.episode,
            since,
        })
    }
}
