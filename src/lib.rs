//! tubewatch
//!
//! Drives a Chrome browser through randomized, human-like video viewing
//! sessions: open a watch page, start playback, scroll and pause at random,
//! skip inserted advertisements, and hold the session for a randomized share
//! of the media length before moving to the next account.

pub mod bot;
pub mod browser;
pub mod page;
pub mod policy;
pub mod stats;

use std::path::PathBuf;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::page::PageTimeouts;
use crate::policy::WatchPolicy;

/// A viewer account
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub email: String,
    pub password: String,
}

/// Application configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// URL of the video to watch
    pub video_url: String,

    /// Accounts to run sessions for, in order. Empty runs one anonymous session.
    pub accounts: Vec<Account>,

    /// Sign accounts in before watching (accounts are otherwise only used to
    /// sequence sessions)
    pub authenticate: bool,

    /// Browser configuration
    pub headless: bool,
    pub chrome_path: Option<String>,

    /// Fixed settle delay after navigating to the watch page, in seconds
    pub settle_secs: u64,
    /// Maximum wait for required page elements, in seconds
    pub element_timeout_secs: u64,
    /// Bound on the ad-overlay presence probe, in seconds
    pub ad_probe_timeout_secs: u64,
    /// Maximum wait for the ad skip control, in seconds
    pub ad_skip_timeout_secs: u64,

    /// Probability of scrolling on a watch-loop iteration (0.0 - 1.0)
    pub scroll_probability: f64,
    /// Probability of pausing on a watch-loop iteration (0.0 - 1.0)
    pub pause_probability: f64,
    /// Simulated pause duration bounds, in seconds
    pub pause_min_secs: f64,
    pub pause_max_secs: f64,
    /// Scroll distance bounds, in pixels
    pub scroll_min_px: u32,
    pub scroll_max_px: u32,
    /// Idle pacing between watch-loop iterations, in milliseconds
    pub idle_min_ms: u64,
    pub idle_max_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            video_url: String::new(),
            accounts: vec![],
            authenticate: false,
            headless: false,
            chrome_path: None,
            settle_secs: 3,
            element_timeout_secs: 10,
            ad_probe_timeout_secs: 5,
            ad_skip_timeout_secs: 20,
            scroll_probability: 0.9,
            pause_probability: 0.2,
            pause_min_secs: 4.0,
            pause_max_secs: 10.0,
            scroll_min_px: 100,
            scroll_max_px: 200,
            idle_min_ms: 500,
            idle_max_ms: 1500,
        }
    }
}

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tubewatch").join("logs"))
}

impl AppConfig {
    /// Get config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tubewatch").join("config.json"))
    }

    /// Load config from file
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => match serde_json::from_str::<Self>(&content) {
                        Ok(config) => {
                            info!("Loaded config from {:?}", path);
                            return config.sanitized();
                        }
                        Err(e) => {
                            warn!("Failed to parse config file: {}", e);
                        }
                    },
                    Err(e) => {
                        warn!("Failed to read config file: {}", e);
                    }
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    error!("Failed to create config directory: {}", e);
                    return;
                }
            }

            match serde_json::to_string_pretty(self) {
                Ok(content) => {
                    if let Err(e) = std::fs::write(&path, content) {
                        error!("Failed to save config: {}", e);
                    } else {
                        info!("Config saved to {:?}", path);
                    }
                }
                Err(e) => {
                    error!("Failed to serialize config: {}", e);
                }
            }
        }
    }

    /// Normalize out-of-range values from a hand-edited config file.
    ///
    /// Inverted min/max pairs are swapped and probabilities clamped to
    /// [0.0, 1.0], with a warning, so a bad value degrades a session instead
    /// of panicking inside the watch loop.
    fn sanitized(mut self) -> Self {
        fn clamp_probability(name: &str, value: &mut f64) {
            if !(0.0..=1.0).contains(value) {
                warn!("{} {} outside [0.0, 1.0], clamping", name, value);
                *value = value.clamp(0.0, 1.0);
            }
        }
        fn order<T: PartialOrd + std::fmt::Display>(name: &str, min: &mut T, max: &mut T) {
            if min > max {
                warn!("{} bounds inverted ({} > {}), swapping", name, min, max);
                std::mem::swap(min, max);
            }
        }

        clamp_probability("scrollProbability", &mut self.scroll_probability);
        clamp_probability("pauseProbability", &mut self.pause_probability);
        order("pause", &mut self.pause_min_secs, &mut self.pause_max_secs);
        order("scroll", &mut self.scroll_min_px, &mut self.scroll_max_px);
        order("idle", &mut self.idle_min_ms, &mut self.idle_max_ms);
        self
    }

    /// Fixed settle delay after navigation
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    /// Build the immutable watch policy handed to the loop
    pub fn watch_policy(&self) -> WatchPolicy {
        WatchPolicy {
            scroll_probability: self.scroll_probability,
            pause_probability: self.pause_probability,
            pause_min: Duration::from_secs_f64(self.pause_min_secs),
            pause_max: Duration::from_secs_f64(self.pause_max_secs),
            scroll_min_px: self.scroll_min_px,
            scroll_max_px: self.scroll_max_px,
            idle_min: Duration::from_millis(self.idle_min_ms),
            idle_max: Duration::from_millis(self.idle_max_ms),
        }
    }

    /// Build the page-layer timeout set
    pub fn page_timeouts(&self) -> PageTimeouts {
        PageTimeouts {
            element: Duration::from_secs(self.element_timeout_secs),
            ad_probe: Duration::from_secs(self.ad_probe_timeout_secs),
            ad_skip: Duration::from_secs(self.ad_skip_timeout_secs),
            settle: self.settle(),
        }
    }
}

/// Initialize logging: console plus a daily rolling log file
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "tubewatch.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_sane() {
        let config = AppConfig::default();

        assert!((0.0..=1.0).contains(&config.scroll_probability));
        assert!((0.0..=1.0).contains(&config.pause_probability));
        assert!(config.pause_min_secs <= config.pause_max_secs);
        assert!(config.scroll_min_px <= config.scroll_max_px);
        assert!(config.idle_min_ms <= config.idle_max_ms);
        assert!(!config.authenticate);
    }

    #[test]
    fn test_watch_policy_mirrors_config() {
        let config = AppConfig {
            pause_min_secs: 2.0,
            pause_max_secs: 6.0,
            scroll_probability: 0.4,
            ..Default::default()
        };
        let policy = config.watch_policy();

        assert_eq!(policy.pause_min, Duration::from_secs(2));
        assert_eq!(policy.pause_max, Duration::from_secs(6));
        assert!((policy.scroll_probability - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sanitized_repairs_bad_values() {
        let config = AppConfig {
            pause_min_secs: 10.0,
            pause_max_secs: 4.0,
            scroll_min_px: 200,
            scroll_max_px: 100,
            idle_min_ms: 1500,
            idle_max_ms: 500,
            scroll_probability: 1.7,
            pause_probability: -0.2,
            ..Default::default()
        }
        .sanitized();

        assert_eq!(config.pause_min_secs, 4.0);
        assert_eq!(config.pause_max_secs, 10.0);
        assert_eq!(config.scroll_min_px, 100);
        assert_eq!(config.scroll_max_px, 200);
        assert_eq!(config.idle_min_ms, 500);
        assert_eq!(config.idle_max_ms, 1500);
        assert_eq!(config.scroll_probability, 1.0);
        assert_eq!(config.pause_probability, 0.0);

        let policy = config.watch_policy();
        assert!(policy.pause_min <= policy.pause_max);
        assert!(policy.idle_min <= policy.idle_max);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"videoUrl": "https://example.com/watch?v=abc"}"#).unwrap();

        assert_eq!(config.video_url, "https://example.com/watch?v=abc");
        assert_eq!(config.settle_secs, 3);
        assert_eq!(config.scroll_min_px, 100);
        assert!(config.accounts.is_empty());
    }
}
