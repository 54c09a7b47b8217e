//! The watch loop
//!
//! Runs one session's worth of randomized viewing actions against a
//! `WatchSurface` until the active (pause-adjusted) watch time reaches the
//! target. The surface abstraction keeps the loop testable without a browser.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::browser::BrowserError;

use super::model::WatchPolicy;
use super::ScrollDecision;

/// Outcome of a single attempt to click the ad skip control.
///
/// "Not skippable yet" is an expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    Skipped,
    TimedOut,
}

/// Outcome of one advertisement check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdOutcome {
    /// No ad overlay present
    NoAd,
    /// Ad was present and the skip control was clicked
    Skipped,
    /// Ad was present but no skip control became clickable in time
    SkipTimedOut,
}

/// The page primitives the watch loop drives.
///
/// Implemented by the video page layer; test doubles implement it directly.
#[allow(async_fn_in_trait)]
pub trait WatchSurface {
    /// Check for an ad overlay and try to skip it if present.
    async fn clear_advertisement(&mut self) -> Result<AdOutcome, BrowserError>;

    /// Shift the viewport. Must not affect playback state.
    async fn scroll(&mut self, decision: &ScrollDecision) -> Result<(), BrowserError>;

    /// Suspend or resume playback.
    async fn set_paused(&mut self, paused: bool) -> Result<(), BrowserError>;
}

/// What happened during one watch loop run
#[derive(Debug, Clone, Default)]
pub struct WatchReport {
    /// Wall-clock time spent watching, excluding simulated pauses
    pub active_watch_time: Duration,
    /// Total time spent in simulated pauses
    pub total_paused: Duration,
    pub iterations: u64,
    pub ads_skipped: u64,
    pub ad_skip_timeouts: u64,
    pub scrolls: u64,
    pub pauses: u64,
}

impl WatchPolicy {
    /// Run the watch loop until the active watch time reaches `target`.
    ///
    /// The session start reference shifts forward by each pause's duration, so
    /// paused time never counts toward the target. Ad-skip timeouts are
    /// tolerated; any other surface error aborts the session.
    pub async fn run<S: WatchSurface>(
        &self,
        surface: &mut S,
        target: Duration,
    ) -> Result<WatchReport, BrowserError> {
        // Pause-adjusted start reference: shifted forward on every pause
        let mut start = Instant::now();
        let mut report = WatchReport::default();

        info!("Watch loop starting (target: {:.1}s)", target.as_secs_f64());

        while start.elapsed() <= target {
            report.iterations += 1;

            match surface.clear_advertisement().await? {
                AdOutcome::NoAd => {}
                AdOutcome::Skipped => {
                    debug!("Advertisement skipped");
                    report.ads_skipped += 1;
                }
                AdOutcome::SkipTimedOut => {
                    // Overlay may not be skippable yet, or the ad has no skip
                    // option; carry on and re-check next iteration
                    debug!("Advertisement skip timed out");
                    report.ad_skip_timeouts += 1;
                }
            }

            // Sample decisions into locals so no RNG is held across awaits
            let (scroll, pause, idle) = {
                let mut rng = rand::thread_rng();
                (
                    self.sample_scroll(&mut rng),
                    self.sample_pause(&mut rng),
                    self.sample_idle(&mut rng),
                )
            };

            if let Some(decision) = scroll {
                debug!(
                    "Scrolling {:?} by {}px",
                    decision.direction, decision.distance_px
                );
                surface.scroll(&decision).await?;
                report.scrolls += 1;
            }

            if let Some(pause) = pause {
                debug!("Pausing playback for {:.1}s", pause.duration.as_secs_f64());
                surface.set_paused(true).await?;
                sleep(pause.duration).await;
                surface.set_paused(false).await?;

                // Exclude the pause from the active watch time
                start += pause.duration;
                report.total_paused += pause.duration;
                report.pauses += 1;
            }

            sleep(idle).await;
        }

        report.active_watch_time = start.elapsed();

        info!(
            "Watch loop finished: active {:.1}s over {} iterations ({} pauses, {} scrolls, {} ads skipped)",
            report.active_watch_time.as_secs_f64(),
            report.iterations,
            report.pauses,
            report.scrolls,
            report.ads_skipped,
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::target_watch_duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Scripted surface for driving the loop without a browser
    struct FakeSurface {
        ad_outcome: AdOutcome,
        fail_scrolls: bool,
        scrolls: u64,
        pause_transitions: Vec<bool>,
    }

    impl FakeSurface {
        fn new(ad_outcome: AdOutcome) -> Self {
            Self {
                ad_outcome,
                fail_scrolls: false,
                scrolls: 0,
                pause_transitions: Vec::new(),
            }
        }
    }

    impl WatchSurface for FakeSurface {
        async fn clear_advertisement(&mut self) -> Result<AdOutcome, BrowserError> {
            Ok(self.ad_outcome)
        }

        async fn scroll(&mut self, _decision: &ScrollDecision) -> Result<(), BrowserError> {
            if self.fail_scrolls {
                return Err(BrowserError::ConnectionLost("browser went away".into()));
            }
            self.scrolls += 1;
            Ok(())
        }

        async fn set_paused(&mut self, paused: bool) -> Result<(), BrowserError> {
            self.pause_transitions.push(paused);
            Ok(())
        }
    }

    fn quiet_policy() -> WatchPolicy {
        WatchPolicy {
            scroll_probability: 0.0,
            pause_probability: 0.0,
            idle_min: Duration::from_secs(1),
            idle_max: Duration::from_secs(1),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_time_excluded_from_active_time() {
        // Every iteration pauses for exactly 3s and idles for 1s, so active
        // time advances 1s per iteration while wall time advances 4s.
        let policy = WatchPolicy {
            pause_probability: 1.0,
            pause_min: Duration::from_secs(3),
            pause_max: Duration::from_secs(3),
            ..quiet_policy()
        };
        let mut surface = FakeSurface::new(AdOutcome::NoAd);

        let wall_start = Instant::now();
        let target = Duration::from_secs(10);
        let report = policy.run(&mut surface, target).await.unwrap();
        let wall = wall_start.elapsed();

        assert!(report.active_watch_time > target);
        assert!(report.active_watch_time <= target + Duration::from_secs(2));
        assert_eq!(report.total_paused, Duration::from_secs(3) * report.pauses as u32);
        // Wall clock accounts for both active time and pauses
        assert_eq!(wall, report.active_watch_time + report.total_paused);
        // Pause/resume always come in matched pairs
        assert_eq!(surface.pause_transitions.len() as u64, report.pauses * 2);
        assert!(surface
            .pause_transitions
            .chunks(2)
            .all(|c| c.len() == 2 && c[0] && !c[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_timeout_is_tolerated() {
        let policy = quiet_policy();
        let mut surface = FakeSurface::new(AdOutcome::SkipTimedOut);

        let report = policy
            .run(&mut surface, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(report.ad_skip_timeouts, report.iterations);
        assert!(report.active_watch_time >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ads_skipped_are_counted() {
        let policy = quiet_policy();
        let mut surface = FakeSurface::new(AdOutcome::Skipped);

        let report = policy
            .run(&mut surface, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(report.ads_skipped, report.iterations);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_surface_error_propagates() {
        let policy = WatchPolicy {
            scroll_probability: 1.0,
            ..quiet_policy()
        };
        let mut surface = FakeSurface::new(AdOutcome::NoAd);
        surface.fail_scrolls = true;

        let err = policy
            .run(&mut surface, Duration::from_secs(30))
            .await
            .unwrap_err();

        assert!(matches!(err, BrowserError::ConnectionLost(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_scroll_reaches_the_surface() {
        let policy = WatchPolicy {
            scroll_probability: 1.0,
            ..quiet_policy()
        };
        let mut surface = FakeSurface::new(AdOutcome::NoAd);

        let report = policy
            .run(&mut surface, Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(surface.scrolls, report.iterations);
        assert_eq!(report.scrolls, report.iterations);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixty_second_video_end_to_end() {
        // Media of 60s yields a target in [30s, 45s]; the loop must terminate
        // with active time within one iteration of the target.
        let mut rng = StdRng::seed_from_u64(4242);
        let target = target_watch_duration(Duration::from_secs(60), &mut rng);
        assert!(target >= Duration::from_secs(30));
        assert!(target <= Duration::from_secs(45));

        let policy = WatchPolicy {
            scroll_probability: 0.9,
            pause_probability: 0.2,
            idle_min: Duration::from_secs(1),
            idle_max: Duration::from_secs(1),
            ..Default::default()
        };
        let mut surface = FakeSurface::new(AdOutcome::NoAd);

        let report = policy.run(&mut surface, target).await.unwrap();

        assert!(report.active_watch_time > target);
        assert!(
            report.active_watch_time <= target + policy.idle_max + Duration::from_millis(100),
            "active time {:?} drifted more than one iteration past target {:?}",
            report.active_watch_time,
            target
        );
    }
}
