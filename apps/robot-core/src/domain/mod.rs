//! Domain Layer
//!
//! Pure types with no I/O. Everything the orchestrator, the recovery state
//! machine and the health monitor reason about is defined here:
//!
//! - [`shared`]: identifiers, trading date, civil time parsing
//! - [`timetable`]: timetable document, validation, directive admission
//! - [`trading_spec`]: sessions, market close, instrument table
//! - [`bar`]: bars, session window, bar rejection reasons
//! - [`stream`]: stream lifecycle states and construction parameters
//! - [`account`]: broker account snapshot
//! - [`recovery`]: recovery states and connection status
//! - [`critical`]: whitelisted critical event kinds
//! - [`mode`]: execution mode

pub mod account;
pub mod bar;
pub mod critical;
pub mod mode;
pub mod recovery;
pub mod shared;
pub mod stream;
pub mod timetable;
pub mod trading_spec;
