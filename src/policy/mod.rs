//! Watch-session timing and action-decision policy

mod model;
mod watch;

pub use model::{
    target_watch_duration, PauseEvent, ScrollDecision, ScrollDirection, WatchPolicy,
};
pub use watch::{AdOutcome, SkipOutcome, WatchReport, WatchSurface};
