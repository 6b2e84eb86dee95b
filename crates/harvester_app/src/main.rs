//! `feed-harvester`: captures posts newer than the last run from a social feed.

mod config;
mod console;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use harvest_logging::{harvest_error, harvest_info, harvest_warn};
use harvester_engine::{
    ensure_output_dir, BrowserOptions, CheckpointError, ChromeDriverProcess, HarvestEngine,
    HarvestError, LoggingSink, ReqwestFetcher, RunSummary, WaitSettings, WebDriverSession,
};

use crate::config::AppConfig;
use crate::console::ConsoleChallenges;

/// Exit code for configuration problems, detected before any browser is started.
const EXIT_CONFIG: u8 = 2;

const DRIVER_START_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("feed-harvester: {err}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    logging::initialize(&config.output_dir);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            harvest_error!("cannot start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(summary) => {
            match summary.saved_checkpoint {
                Some(checkpoint) => harvest_info!(
                    "Captured {} post(s), checkpoint {} -> {checkpoint}",
                    summary.processed.len(),
                    summary.previous_checkpoint
                ),
                None => harvest_info!("No new posts since {}", summary.previous_checkpoint),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            harvest_error!("Harvest failed: {err:#}");
            if is_config_error(&err) {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// A missing or unreadable checkpoint is a setup problem, reported like a bad setting.
fn is_config_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        let checkpoint = match cause.downcast_ref::<HarvestError>() {
            Some(HarvestError::Checkpoint(inner)) => Some(inner),
            _ => cause.downcast_ref::<CheckpointError>(),
        };
        checkpoint.is_some_and(CheckpointError::is_configuration)
    })
}

async fn run(config: AppConfig) -> anyhow::Result<RunSummary> {
    ensure_output_dir(&config.output_dir).context("preparing the output directory")?;

    let engine = HarvestEngine::new(
        config.engine_config(),
        Arc::new(ConsoleChallenges),
        Arc::new(ReqwestFetcher::default()),
        Arc::new(LoggingSink),
    );
    // Fail on a bad checkpoint before a browser is started.
    engine
        .checkpoint_store()
        .load()
        .context("reading the checkpoint")?;

    let driver = ChromeDriverProcess::spawn(
        &config.driver_path,
        config.driver_port,
        WaitSettings::with_timeout(DRIVER_START_TIMEOUT),
    )
    .await
    .context("starting the WebDriver executable")?;

    let mut options =
        BrowserOptions::new(config.browser_profile.clone(), config.output_dir.clone());
    options.headless = config.headless;
    let session = WebDriverSession::start(driver.url(), &options)
        .await
        .context("opening the browser session")?;

    let outcome = engine.run(&session).await;

    if let Err(err) = session.quit().await {
        harvest_warn!("closing the browser: {err}");
    }
    if let Err(err) = driver.shutdown().await {
        harvest_warn!("stopping the driver: {err}");
    }
    Ok(outcome?)
}
