//! Document comment monitoring: reply diffing and per-document poll jobs.

pub mod diff;
pub mod registry;
pub mod scheduler;

pub use diff::diff_snapshots;
pub use registry::{
    MonitorError, MonitorRegistry, MonitorStart, StopOutcome, TickOutcome, TickReport,
};
pub use scheduler::{IntervalScheduler, ManualScheduler, TickScheduler, Ticker};
