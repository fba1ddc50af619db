//! Execution Adapter Port (Driven Port)
//!
//! Narrow view of the broker used by disconnect recovery: read the account
//! and cancel the robot's own working orders.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::account::{AccountSnapshot, WorkingOrder};

/// Execution adapter error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The broker could not be reached or returned no data.
    #[error("Broker unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },

    /// The broker refused the request.
    #[error("Broker rejected request: {message}")]
    Rejected {
        /// Error message.
        message: String,
    },

    /// The call did not complete in time.
    #[error("Broker call timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout that elapsed.
        timeout_ms: u64,
    },
}

/// Port for the broker account.
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    /// Snapshot positions and working orders.
    async fn get_account_snapshot(&self, now: DateTime<Utc>)
    -> Result<AccountSnapshot, ExecutionError>;

    /// Cancel the given working orders. The caller passes only orders it has
    /// classified as robot-owned. Returns the number cancelled.
    async fn cancel_robot_owned_working_orders(
        &self,
        orders: &[WorkingOrder],
        now: DateTime<Utc>,
    ) -> Result<usize, ExecutionError>;
}

/// Dry-run adapter: flat account, nothing to cancel.
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutionAdapter;

#[async_trait]
impl ExecutionAdapter for DryRunExecutionAdapter {
    async fn get_account_snapshot(
        &self,
        _now: DateTime<Utc>,
    ) -> Result<AccountSnapshot, ExecutionError> {
        Ok(AccountSnapshot::default())
    }

    async fn cancel_robot_owned_working_orders(
        &self,
        orders: &[WorkingOrder],
        _now: DateTime<Utc>,
    ) -> Result<usize, ExecutionError> {
        for order in orders {
            tracing::info!(order_id = %order.id, instrument = %order.instrument, "DRYRUN cancel");
        }
        Ok(orders.len())
    }
}
