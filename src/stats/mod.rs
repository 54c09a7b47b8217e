//! Run statistics

mod atomic;

pub use atomic::{RunStats, RunStatsSnapshot};
