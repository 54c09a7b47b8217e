//! Interaction with a YouTube watch page
//!
//! Wraps a `BrowserSession` with the page-level operations the session driver
//! and watch loop consume: playback control, media duration probing, ad
//! detection and skipping, viewport scrolling, and (optional) sign-in.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::browser::{BrowserError, BrowserSession};
use crate::policy::{AdOutcome, ScrollDecision, ScrollDirection, SkipOutcome, WatchSurface};

/// Watch page selectors
mod selectors {
    pub const MAIN_VIDEO: &str = "video.html5-main-video";
    pub const PLAY_BUTTON: &str = "button.ytp-play-button";
    pub const AD_SKIP_BUTTON: &str =
        ".ytp-ad-skip-button, .ytp-ad-skip-button-modern, .ytp-skip-ad-button";
    pub const EMAIL_INPUT: &str = "input[type='email']";
    pub const PASSWORD_INPUT: &str = "input[type='password']";
}

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Poll a probe until it reports true or the timeout expires.
///
/// Ok(false) means the probe never fired within the window; fatal probe
/// errors propagate immediately.
async fn poll_probe<F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<bool, BrowserError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool, BrowserError>>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if probe().await? {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Bounded-wait settings for page probes
#[derive(Debug, Clone)]
pub struct PageTimeouts {
    /// Maximum wait for required elements (play control, login fields)
    pub element: Duration,
    /// Bound on the ad-overlay presence probe
    pub ad_probe: Duration,
    /// Maximum wait for the ad skip control to become clickable
    pub ad_skip: Duration,
    /// Settle delay after navigation steps during sign-in
    pub settle: Duration,
}

impl Default for PageTimeouts {
    fn default() -> Self {
        Self {
            element: Duration::from_secs(10),
            ad_probe: Duration::from_secs(5),
            ad_skip: Duration::from_secs(20),
            settle: Duration::from_secs(3),
        }
    }
}

/// A YouTube watch page driven through a browser session
pub struct VideoPage {
    session: Arc<BrowserSession>,
    timeouts: PageTimeouts,
}

impl VideoPage {
    pub fn new(session: Arc<BrowserSession>, timeouts: PageTimeouts) -> Self {
        Self { session, timeouts }
    }

    pub fn session(&self) -> &Arc<BrowserSession> {
        &self.session
    }

    /// Retrieve the duration of the current media element.
    ///
    /// Fails if no media element reports a finite, positive duration.
    pub async fn media_duration(&self) -> Result<Duration, BrowserError> {
        let result = self
            .session
            .execute_js(&format!(
                r#"
                (function() {{
                    const video = document.querySelector('{}') ||
                                  document.querySelector('video');
                    if (!video || !isFinite(video.duration) || video.duration <= 0) {{
                        return null;
                    }}
                    return video.duration;
                }})()
                "#,
                selectors::MAIN_VIDEO
            ))
            .await?;

        let seconds = result.as_f64().ok_or_else(|| {
            BrowserError::MediaUnavailable("no media element reported a duration".into())
        })?;

        debug!("Media duration: {:.1}s", seconds);
        Ok(Duration::from_secs_f64(seconds))
    }

    /// Start playback by clicking the play control.
    ///
    /// The play control is required: a session cannot proceed without it.
    pub async fn start_playback(&self) -> Result<(), BrowserError> {
        let found = self
            .session
            .wait_for_element(selectors::PLAY_BUTTON, self.timeouts.element)
            .await?;

        if !found {
            return Err(BrowserError::ElementNotFound(format!(
                "play control '{}' never appeared",
                selectors::PLAY_BUTTON
            )));
        }

        // Only click when actually paused: the control is a toggle, and
        // autoplay may have started the video already
        let needs_click = self
            .session
            .execute_js(&format!(
                r#"
                (function() {{
                    const video = document.querySelector('{}') ||
                                  document.querySelector('video');
                    return !video || video.paused;
                }})()
                "#,
                selectors::MAIN_VIDEO
            ))
            .await?;

        if needs_click.as_bool() == Some(true) {
            self.session.click(selectors::PLAY_BUTTON).await?;
            info!("Playback started");
        } else {
            debug!("Playback already running (autoplay)");
        }

        Ok(())
    }

    /// Toggle play/pause with the player keyboard shortcut.
    ///
    /// Uses "k" rather than Space: Space scrolls the page when player focus
    /// is lost.
    pub async fn toggle_playback(&self) -> Result<(), BrowserError> {
        self.session.press_key("k").await
    }

    /// Check whether an advertisement overlay is currently showing.
    ///
    /// Polls for the overlay up to the ad-probe timeout, since ads can take a
    /// moment to attach after playback starts. "No ad" is reported only once
    /// the window expires.
    pub async fn is_ad_playing(&self) -> Result<bool, BrowserError> {
        poll_probe(self.timeouts.ad_probe, POLL_INTERVAL, || {
            self.probe_ad_overlay()
        })
        .await
    }

    /// One evaluation of the ad-overlay presence check.
    ///
    /// An evaluation timeout means "not observed", never an error.
    async fn probe_ad_overlay(&self) -> Result<bool, BrowserError> {
        let probe = self
            .session
            .execute_js_with_timeout(
                r#"
                (function() {
                    const player = document.querySelector('.html5-video-player');
                    if (player && player.classList.contains('ad-showing')) {
                        return true;
                    }
                    const overlay = document.querySelector(
                        '.ytp-ad-player-overlay, .ytp-ad-player-overlay-layout');
                    return !!(overlay && overlay.offsetParent !== null);
                })()
                "#,
                self.timeouts.ad_probe.as_secs(),
            )
            .await;

        match probe {
            Ok(value) => Ok(value.as_bool().unwrap_or(false)),
            Err(BrowserError::Timeout(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Poll for the ad skip control and click it once clickable.
    ///
    /// Best effort: expiring the timeout is an expected outcome (the overlay
    /// may not be skippable yet, or the ad has no skip option).
    pub async fn try_skip_ad(&self, timeout: Duration) -> Result<SkipOutcome, BrowserError> {
        let clicked = poll_probe(timeout, POLL_INTERVAL, || self.click_skip_control()).await?;

        if clicked {
            Ok(SkipOutcome::Skipped)
        } else {
            debug!(
                "Skip control not clickable within {:.0}s",
                timeout.as_secs_f64()
            );
            Ok(SkipOutcome::TimedOut)
        }
    }

    /// Click the skip control if it is visible and enabled right now.
    async fn click_skip_control(&self) -> Result<bool, BrowserError> {
        let clicked = self
            .session
            .execute_js(&format!(
                r#"
                (function() {{
                    const button = document.querySelector("{}");
                    if (button && button.offsetParent !== null && !button.disabled) {{
                        button.click();
                        return true;
                    }}
                    return false;
                }})()
                "#,
                selectors::AD_SKIP_BUTTON
            ))
            .await?;

        Ok(clicked.as_bool() == Some(true))
    }

    /// Check for an advertisement and skip it if one is playing.
    pub async fn clear_advertisement(&self) -> Result<AdOutcome, BrowserError> {
        if !self.is_ad_playing().await? {
            return Ok(AdOutcome::NoAd);
        }

        debug!("Advertisement is playing");
        match self.try_skip_ad(self.timeouts.ad_skip).await? {
            SkipOutcome::Skipped => Ok(AdOutcome::Skipped),
            SkipOutcome::TimedOut => Ok(AdOutcome::SkipTimedOut),
        }
    }

    /// Scroll the viewport per a sampled decision.
    pub async fn scroll(&self, decision: &ScrollDecision) -> Result<(), BrowserError> {
        let delta = match decision.direction {
            ScrollDirection::Up => -(decision.distance_px as i32),
            ScrollDirection::Down => decision.distance_px as i32,
        };
        self.session.scroll_wheel(delta).await
    }

    /// Sign in to a Google account with humanized typing.
    ///
    /// Optional: the main flow runs fine unauthenticated.
    pub async fn authenticate(&self, email: &str, secret: &str) -> Result<(), BrowserError> {
        info!("Session {} signing in as {}", self.session.id(), email);

        self.session
            .navigate("https://accounts.google.com/signin/v2/identifier")
            .await?;
        tokio::time::sleep(self.timeouts.settle).await;

        if !self
            .session
            .wait_for_element(selectors::EMAIL_INPUT, self.timeouts.element)
            .await?
        {
            return Err(BrowserError::ElementNotFound(
                "sign-in email field never appeared".into(),
            ));
        }
        self.session.click(selectors::EMAIL_INPUT).await?;
        self.session.type_text(email).await?;
        self.session.press_enter().await?;
        tokio::time::sleep(self.timeouts.settle).await;

        if !self
            .session
            .wait_for_element(selectors::PASSWORD_INPUT, self.timeouts.element)
            .await?
        {
            // Different flow (verification challenge, passkey prompt, ...)
            warn!(
                "Session {} password field not found - account may need verification",
                self.session.id()
            );
            return Err(BrowserError::ElementNotFound(
                "sign-in password field never appeared".into(),
            ));
        }
        self.session.click(selectors::PASSWORD_INPUT).await?;
        self.session.type_text(secret).await?;
        self.session.press_enter().await?;
        tokio::time::sleep(self.timeouts.settle).await;

        info!("Session {} sign-in submitted for {}", self.session.id(), email);
        Ok(())
    }
}

impl WatchSurface for VideoPage {
    async fn clear_advertisement(&mut self) -> Result<AdOutcome, BrowserError> {
        VideoPage::clear_advertisement(self).await
    }

    async fn scroll(&mut self, decision: &ScrollDecision) -> Result<(), BrowserError> {
        VideoPage::scroll(self, decision).await
    }

    async fn set_paused(&mut self, paused: bool) -> Result<(), BrowserError> {
        // The player shortcut is a toggle; the watch loop always pairs
        // suspend/resume calls
        self.toggle_playback().await?;
        info!("Playback {}", if paused { "paused" } else { "resumed" });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn test_poll_probe_catches_late_overlay() {
        // The overlay attaches on the fourth probe, well within the window
        let calls = Cell::new(0u32);

        let found = poll_probe(Duration::from_secs(5), Duration::from_millis(500), || {
            calls.set(calls.get() + 1);
            let hit = calls.get() >= 4;
            async move { Ok(hit) }
        })
        .await
        .unwrap();

        assert!(found);
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_probe_keeps_checking_until_the_deadline() {
        let start = tokio::time::Instant::now();
        let calls = Cell::new(0u32);

        let found = poll_probe(Duration::from_secs(5), Duration::from_millis(500), || {
            calls.set(calls.get() + 1);
            async { Ok(false) }
        })
        .await
        .unwrap();

        assert!(!found);
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(calls.get() > 1, "probe must re-check, not report after one look");
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_probe_propagates_fatal_errors() {
        let err = poll_probe(Duration::from_secs(5), Duration::from_millis(500), || async {
            Err(BrowserError::ConnectionLost("browser went away".into()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, BrowserError::ConnectionLost(_)));
    }
}
