//! Lock-free run statistics using atomic operations

use std::sync::atomic::{AtomicU64, Ordering};

use crate::policy::WatchReport;

/// Counters aggregated over one process run
#[derive(Debug, Default)]
pub struct RunStats {
    pub sessions_completed: AtomicU64,
    pub sessions_failed: AtomicU64,
    pub ads_skipped: AtomicU64,
    pub ad_skip_timeouts: AtomicU64,
    pub scrolls: AtomicU64,
    pub pauses: AtomicU64,
    pub active_watch_ms: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a completed session's report into the run totals
    pub fn record_session(&self, report: &WatchReport) {
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
        self.ads_skipped
            .fetch_add(report.ads_skipped, Ordering::Relaxed);
        self.ad_skip_timeouts
            .fetch_add(report.ad_skip_timeouts, Ordering::Relaxed);
        self.scrolls.fetch_add(report.scrolls, Ordering::Relaxed);
        self.pauses.fetch_add(report.pauses, Ordering::Relaxed);
        self.active_watch_ms
            .fetch_add(report.active_watch_time.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a session that aborted with a fatal error
    pub fn record_failure(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot for logging/serialization
    pub fn snapshot(&self) -> RunStatsSnapshot {
        RunStatsSnapshot {
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            ads_skipped: self.ads_skipped.load(Ordering::Relaxed),
            ad_skip_timeouts: self.ad_skip_timeouts.load(Ordering::Relaxed),
            scrolls: self.scrolls.load(Ordering::Relaxed),
            pauses: self.pauses.load(Ordering::Relaxed),
            active_watch_secs: self.active_watch_ms.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

/// Serializable snapshot of run stats
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatsSnapshot {
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub ads_skipped: u64,
    pub ad_skip_timeouts: u64,
    pub scrolls: u64,
    pub pauses: u64,
    pub active_watch_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_session_reports_accumulate() {
        let stats = RunStats::new();

        let report = WatchReport {
            active_watch_time: Duration::from_secs(42),
            ads_skipped: 2,
            ad_skip_timeouts: 1,
            scrolls: 9,
            pauses: 3,
            ..Default::default()
        };
        stats.record_session(&report);
        stats.record_session(&report);
        stats.record_failure();

        let snap = stats.snapshot();
        assert_eq!(snap.sessions_completed, 2);
        assert_eq!(snap.sessions_failed, 1);
        assert_eq!(snap.ads_skipped, 4);
        assert_eq!(snap.scrolls, 18);
        assert_eq!(snap.pauses, 6);
        assert!((snap.active_watch_secs - 84.0).abs() < f64::EPSILON);
    }
}
