//! Session driver
//!
//! Runs one watch session per configured account, strictly sequentially. Each
//! account gets its own browser with a fresh profile, and each session sits
//! behind a failure boundary so one crashed account never stops the batch.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::browser::{BrowserError, BrowserSession, BrowserSessionConfig};
use crate::page::VideoPage;
use crate::policy::{target_watch_duration, AdOutcome, WatchPolicy, WatchReport};
use crate::stats::RunStats;
use crate::{Account, AppConfig};

/// Run one full watch session on an already-open page.
///
/// Navigates to the video, starts playback, clears any pre-roll ad, samples a
/// randomized target from the media length, and hands control to the watch
/// loop.
pub async fn run_session(
    page: &mut VideoPage,
    policy: &WatchPolicy,
    url: &str,
    settle: Duration,
) -> Result<WatchReport, BrowserError> {
    page.session().navigate(url).await?;
    tokio::time::sleep(settle).await;

    page.start_playback().await?;

    // A pre-roll ad hides the real media metadata until cleared
    let preroll = page.clear_advertisement().await?;
    if preroll != AdOutcome::NoAd {
        info!("Pre-roll advertisement handled: {:?}", preroll);
    }

    let media = page.media_duration().await?;
    let target = {
        let mut rng = rand::thread_rng();
        target_watch_duration(media, &mut rng)
    };
    info!(
        "Session {} watching {:.1}s of {:.1}s media",
        page.session().id(),
        target.as_secs_f64(),
        media.as_secs_f64()
    );

    let mut report = policy.run(page, target).await?;
    match preroll {
        AdOutcome::NoAd => {}
        AdOutcome::Skipped => report.ads_skipped += 1,
        AdOutcome::SkipTimedOut => report.ad_skip_timeouts += 1,
    }
    Ok(report)
}

/// Run watch sessions for every configured account, one at a time.
///
/// With no accounts configured, runs a single anonymous session.
pub async fn run_accounts(config: &AppConfig, stats: &RunStats) {
    let policy = config.watch_policy();

    if config.accounts.is_empty() {
        info!("No accounts configured, running one anonymous session");
        run_account(config, &policy, None, stats).await;
        return;
    }

    info!(
        "Running {} account sessions sequentially",
        config.accounts.len()
    );
    for (index, account) in config.accounts.iter().enumerate() {
        info!(
            "Account {}/{}: {}",
            index + 1,
            config.accounts.len(),
            account.email
        );
        run_account(config, &policy, Some(account), stats).await;
    }
}

/// One account's session, isolated behind a failure boundary.
///
/// Any error here is recorded and logged; the caller moves on to the next
/// account regardless.
async fn run_account(
    config: &AppConfig,
    policy: &WatchPolicy,
    account: Option<&Account>,
    stats: &RunStats,
) {
    let session_config = BrowserSessionConfig::fresh_profile()
        .headless(config.headless)
        .chrome_path(config.chrome_path.clone());

    let session = match BrowserSession::new(session_config).await {
        Ok(session) => Arc::new(session),
        Err(e) => {
            error!("Browser launch failed: {}", e);
            stats.record_failure();
            return;
        }
    };

    let mut page = VideoPage::new(session.clone(), config.page_timeouts());

    match drive(&mut page, policy, config, account).await {
        Ok(report) => {
            info!(
                "Session {} completed: active {:.1}s, {} scrolls, {} pauses, {} ads skipped",
                session.id(),
                report.active_watch_time.as_secs_f64(),
                report.scrolls,
                report.pauses,
                report.ads_skipped
            );
            stats.record_session(&report);
        }
        Err(e) => {
            warn!("Session {} aborted: {}", session.id(), e);
            stats.record_failure();
        }
    }

    if let Err(e) = session.close().await {
        warn!("Session {} close failed: {}", session.id(), e);
    }
}

async fn drive(
    page: &mut VideoPage,
    policy: &WatchPolicy,
    config: &AppConfig,
    account: Option<&Account>,
) -> Result<WatchReport, BrowserError> {
    if config.authenticate {
        if let Some(account) = account {
            page.authenticate(&account.email, &account.password).await?;
        }
    }

    run_session(page, policy, &config.video_url, config.settle()).await
}
