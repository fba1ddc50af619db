//! Application Layer
//!
//! The three core components and the ports they consume:
//!
//! - **Ports**: interfaces for every external collaborator
//! - **Engine**: trading-date locking, timetable ingestion, bar admission,
//!   stream registry
//! - **Recovery**: disconnect fail-closed state machine and reconciliation
//! - **Health**: liveness monitoring and deduplicated alerting

pub mod engine;
pub mod health;
pub mod ports;
pub mod recovery;

pub use engine::{BarDisposition, EngineDeps, RobotEngine, StreamActivity};
pub use health::{AlertDispatcher, ConnectionLossCoordinator, HealthMonitor};
pub use recovery::{RecoveryCoordinator, RecoveryRunOutcome};
