//! tubewatch entry point

use anyhow::Context;
use tracing::{info, warn};

use tubewatch::stats::RunStats;
use tubewatch::{bot, init_logging, log_dir, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_logging();

    if let Some(dir) = log_dir() {
        info!("Logs: {:?}", dir);
    }

    let mut config = AppConfig::load();

    if config.video_url.is_empty() {
        // First run: write the defaults out so there is a file to edit
        config.save();
        anyhow::bail!(
            "no video URL configured; set videoUrl in the config file and retry"
        );
    }
    url::Url::parse(&config.video_url)
        .with_context(|| format!("invalid video URL '{}'", config.video_url))?;

    // Headed Chrome cannot start without a display server
    if cfg!(target_os = "linux") && !config.headless && std::env::var("DISPLAY").is_err() {
        warn!("No DISPLAY available, forcing headless mode");
        config.headless = true;
    }

    info!(
        "Starting run: {} ({} accounts, headless: {})",
        config.video_url,
        config.accounts.len(),
        config.headless
    );

    let stats = RunStats::new();
    bot::run_accounts(&config, &stats).await;

    let snapshot = stats.snapshot();
    info!(
        "Run finished: {}",
        serde_json::to_string(&snapshot).unwrap_or_else(|_| format!("{:?}", snapshot))
    );

    Ok(())
}
