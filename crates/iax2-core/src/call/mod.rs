//! Call identity, state, statistics and release reasons

pub mod reason;
pub mod state;
pub mod stats;
pub mod token;

pub use reason::ReleaseReason;
pub use state::{CallMarker, CallState, CallStateSnapshot};
pub use stats::{CallStatistics, StatisticsSnapshot, TrafficClass};
pub use token::{CallRole, CallToken};
