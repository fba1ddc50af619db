//! Execution mode the robot runs in.

use serde::{Deserialize, Serialize};

/// Execution mode (DRYRUN, SIM or LIVE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    /// Orders are logged, never sent.
    #[default]
    #[serde(alias = "DRYRUN")]
    DryRun,
    /// Orders go to a simulated account.
    Sim,
    /// Orders go to a funded account.
    Live,
}

impl ExecutionMode {
    /// Whether the engine may start in this mode. Live trading is not yet
    /// authorized.
    #[must_use]
    pub const fn is_authorized(&self) -> bool {
        matches!(self, Self::DryRun | Self::Sim)
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DryRun => write!(f, "DRYRUN"),
            Self::Sim => write!(f, "SIM"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('_', "").as_str() {
            "DRYRUN" => Ok(Self::DryRun),
            "SIM" => Ok(Self::Sim),
            "LIVE" => Ok(Self::Live),
            _ => Err(format!(
                "Invalid execution mode: {s}. Must be DRYRUN, SIM or LIVE."
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_is_not_authorized() {
        assert!(ExecutionMode::DryRun.is_authorized());
        assert!(ExecutionMode::Sim.is_authorized());
        assert!(!ExecutionMode::Live.is_authorized());
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("dry_run".parse::<ExecutionMode>().unwrap(), ExecutionMode::DryRun);
        assert_eq!("SIM".parse::<ExecutionMode>().unwrap(), ExecutionMode::Sim);
        assert_eq!("live".parse::<ExecutionMode>().unwrap(), ExecutionMode::Live);
        assert!("paper".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn deserializes_from_yaml_names() {
        let mode: ExecutionMode = serde_json::from_str("\"DRY_RUN\"").unwrap();
        assert_eq!(mode, ExecutionMode::DryRun);
        let mode: ExecutionMode = serde_json::from_str("\"DRYRUN\"").unwrap();
        assert_eq!(mode, ExecutionMode::DryRun);
    }
}
