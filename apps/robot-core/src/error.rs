//! Crate-level errors.

use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::mode::ExecutionMode;
use crate::domain::trading_spec::SpecError;

/// Errors that stop the engine from starting.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configured execution mode may not trade.
    #[error("Execution mode {mode} is not authorized")]
    ExecutionModeNotAuthorized {
        /// Configured mode.
        mode: ExecutionMode,
    },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid trading specification.
    #[error(transparent)]
    Spec(#[from] SpecError),
}
