// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::items_after_statements,
        clippy::default_trait_access
    )
)]

//! Robot Core - decision and control core of the trading robot
//!
//! Fail-closed orchestration around the per-stream trading workflows:
//!
//! - **Engine orchestrator**: locks the trading date from the timetable,
//!   admits stream directives, filters bars through the session window and
//!   drives every stream's lifecycle.
//! - **Disconnect recovery**: blocks execution from the first disconnect
//!   until the broker account has been reconciled after reconnect.
//! - **Health monitor**: watches engine ticks, data and connectivity on its
//!   own loop and raises deduplicated emergency alerts.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: identifiers, timetable, trading spec, bars, states
//! - **Application**: ports and the three components above
//! - **Infrastructure**: file adapters, calendar, event log, notifications,
//!   telemetry and metrics
//!
//! ```text
//!  timer ──tick──►┐
//!  feed ───bar───►├──► RobotEngine ──► streams
//!  broker ─status►┘        │    ▲
//!                          ▼    │ execution_allowed()
//!                  RecoveryCoordinator
//!                          │
//!  HealthMonitor ◄─────────┴──► AlertDispatcher ──► NotificationService
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Application layer - ports and core components.
pub mod application;

/// Configuration loading and validation.
pub mod config;

/// Domain layer - pure types with no I/O.
pub mod domain;

/// Crate-level errors.
pub mod error;

/// Infrastructure layer - adapters and telemetry.
pub mod infrastructure;

pub use application::{
    AlertDispatcher, BarDisposition, ConnectionLossCoordinator, EngineDeps, HealthMonitor,
    RecoveryCoordinator, RecoveryRunOutcome, RobotEngine, StreamActivity,
};
pub use config::{RobotConfig, load_config};
pub use domain::recovery::{ConnectionStatus, RecoveryState};
pub use error::EngineError;
