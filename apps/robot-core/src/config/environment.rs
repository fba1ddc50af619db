//! Environment configuration for the execution mode.

use serde::{Deserialize, Serialize};

use crate::domain::mode::ExecutionMode;

/// Environment configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Execution mode.
    #[serde(default)]
    pub mode: ExecutionMode,
}
