//! Watch policy configuration and decision sampling
//!
//! All randomness is injected through `rand::Rng` so the decision model can be
//! tested with seeded generators.

use std::time::Duration;

use rand::Rng;

/// Direction of a viewport scroll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// A sampled decision to scroll the viewport
#[derive(Debug, Clone, Copy)]
pub struct ScrollDecision {
    pub direction: ScrollDirection,
    /// Scroll distance in pixels
    pub distance_px: u32,
}

/// A sampled decision to pause playback for a while
#[derive(Debug, Clone, Copy)]
pub struct PauseEvent {
    pub duration: Duration,
}

/// Immutable per-run decision parameters for the watch loop.
///
/// Constructed once from the application config and passed into the session
/// driver and watch loop; nothing here mutates at runtime.
#[derive(Debug, Clone)]
pub struct WatchPolicy {
    /// Probability of triggering a scroll on a given iteration (0.0 - 1.0)
    pub scroll_probability: f64,
    /// Probability of triggering a pause on a given iteration (0.0 - 1.0)
    pub pause_probability: f64,
    /// Minimum simulated pause duration
    pub pause_min: Duration,
    /// Maximum simulated pause duration
    pub pause_max: Duration,
    /// Minimum scroll distance in pixels
    pub scroll_min_px: u32,
    /// Maximum scroll distance in pixels
    pub scroll_max_px: u32,
    /// Minimum idle delay between loop iterations
    pub idle_min: Duration,
    /// Maximum idle delay between loop iterations
    pub idle_max: Duration,
}

impl Default for WatchPolicy {
    fn default() -> Self {
        Self {
            scroll_probability: 0.9,
            pause_probability: 0.2,
            pause_min: Duration::from_secs(4),
            pause_max: Duration::from_secs(10),
            scroll_min_px: 100,
            scroll_max_px: 200,
            idle_min: Duration::from_millis(500),
            idle_max: Duration::from_millis(1500),
        }
    }
}

impl WatchPolicy {
    /// Randomly decide whether to scroll this iteration, and how.
    pub fn sample_scroll(&self, rng: &mut impl Rng) -> Option<ScrollDecision> {
        if rng.gen::<f64>() >= self.scroll_probability {
            return None;
        }

        let direction = if rng.gen_bool(0.5) {
            ScrollDirection::Up
        } else {
            ScrollDirection::Down
        };

        let (lo, hi) = if self.scroll_min_px <= self.scroll_max_px {
            (self.scroll_min_px, self.scroll_max_px)
        } else {
            (self.scroll_max_px, self.scroll_min_px)
        };

        Some(ScrollDecision {
            direction,
            distance_px: rng.gen_range(lo..=hi),
        })
    }

    /// Randomly decide whether to pause playback this iteration, and for how long.
    pub fn sample_pause(&self, rng: &mut impl Rng) -> Option<PauseEvent> {
        if rng.gen::<f64>() >= self.pause_probability {
            return None;
        }

        Some(PauseEvent {
            duration: sample_uniform(self.pause_min, self.pause_max, rng),
        })
    }

    /// Randomized idle delay between loop iterations
    pub fn sample_idle(&self, rng: &mut impl Rng) -> Duration {
        sample_uniform(self.idle_min, self.idle_max, rng)
    }
}

/// Generate a random target watch duration for a media item.
///
/// The target falls uniformly between 50% and 75% of the media length, so a
/// 60s video yields a target in [30s, 45s]: mostly watched, not always to
/// completion.
pub fn target_watch_duration(media_duration: Duration, rng: &mut impl Rng) -> Duration {
    let total = media_duration.as_secs_f64();
    let middle = total / 2.0;
    let middle_between_middle_and_end = (middle + total) / 2.0;

    Duration::from_secs_f64(rng.gen_range(middle..=middle_between_middle_and_end))
}

// Inverted bounds sample the same interval instead of panicking mid-session
fn sample_uniform(min: Duration, max: Duration, rng: &mut impl Rng) -> Duration {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    Duration::from_secs_f64(rng.gen_range(lo.as_secs_f64()..=hi.as_secs_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_target_duration_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);

        for secs in [1u64, 10, 60, 600, 7200] {
            let media = Duration::from_secs(secs);
            for _ in 0..200 {
                let target = target_watch_duration(media, &mut rng);
                let t = target.as_secs_f64();
                let d = media.as_secs_f64();
                assert!(t >= d / 2.0 - 1e-9, "target {} below half of {}", t, d);
                assert!(t <= d * 0.75 + 1e-9, "target {} above 75% of {}", t, d);
            }
        }
    }

    #[test]
    fn test_target_duration_for_one_minute_video() {
        let mut rng = StdRng::seed_from_u64(42);
        let target = target_watch_duration(Duration::from_secs(60), &mut rng);
        assert!(target >= Duration::from_secs(30));
        assert!(target <= Duration::from_secs(45));
    }

    #[test]
    fn test_pause_duration_within_bounds() {
        let policy = WatchPolicy {
            pause_probability: 1.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..500 {
            let pause = policy.sample_pause(&mut rng).expect("probability 1.0");
            assert!(pause.duration >= policy.pause_min);
            assert!(pause.duration <= policy.pause_max);
        }
    }

    #[test]
    fn test_scroll_distance_within_bounds() {
        let policy = WatchPolicy {
            scroll_probability: 1.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(13);

        for _ in 0..500 {
            let scroll = policy.sample_scroll(&mut rng).expect("probability 1.0");
            assert!(scroll.distance_px >= policy.scroll_min_px);
            assert!(scroll.distance_px <= policy.scroll_max_px);
        }
    }

    #[test]
    fn test_scroll_trigger_rate_tracks_probability() {
        let policy = WatchPolicy {
            scroll_probability: 0.3,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(99);

        let trials = 20_000;
        let triggered = (0..trials)
            .filter(|_| policy.sample_scroll(&mut rng).is_some())
            .count();
        let rate = triggered as f64 / trials as f64;

        assert!(
            (rate - 0.3).abs() < 0.02,
            "observed scroll rate {} too far from 0.3",
            rate
        );
    }

    #[test]
    fn test_inverted_bounds_sample_the_same_interval() {
        let policy = WatchPolicy {
            pause_probability: 1.0,
            pause_min: Duration::from_secs(10),
            pause_max: Duration::from_secs(4),
            scroll_probability: 1.0,
            scroll_min_px: 200,
            scroll_max_px: 100,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(17);

        for _ in 0..500 {
            let pause = policy.sample_pause(&mut rng).expect("probability 1.0");
            assert!(pause.duration >= Duration::from_secs(4));
            assert!(pause.duration <= Duration::from_secs(10));

            let scroll = policy.sample_scroll(&mut rng).expect("probability 1.0");
            assert!((100..=200).contains(&scroll.distance_px));
        }
    }

    #[test]
    fn test_zero_probability_never_triggers() {
        let policy = WatchPolicy {
            scroll_probability: 0.0,
            pause_probability: 0.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(5);

        for _ in 0..1000 {
            assert!(policy.sample_scroll(&mut rng).is_none());
            assert!(policy.sample_pause(&mut rng).is_none());
        }
    }

    #[test]
    fn test_scroll_direction_roughly_even() {
        let policy = WatchPolicy {
            scroll_probability: 1.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(21);

        let trials = 10_000;
        let ups = (0..trials)
            .filter(|_| {
                policy.sample_scroll(&mut rng).expect("probability 1.0").direction
                    == ScrollDirection::Up
            })
            .count();
        let rate = ups as f64 / trials as f64;

        assert!((rate - 0.5).abs() < 0.03, "up rate {} not near 0.5", rate);
    }
}
