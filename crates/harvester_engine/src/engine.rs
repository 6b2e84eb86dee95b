//! One harvesting run, start to finish.

use std::path::PathBuf;
use std::sync::Arc;

use harvest_logging::{harvest_info, harvest_warn};
use harvester_core::FinishReason;

use crate::auth::{AuthenticationGate, ChallengeResolver, Credentials, GateStatus};
use crate::browser::{BrowserError, BrowserSession};
use crate::checkpoint::{CheckpointStore, MissingCheckpoint};
use crate::fetch::Fetcher;
use crate::harvest::{DecodeFailurePolicy, HarvestSettings, PostCapture, PostHarvester};
use crate::resolver::AttachmentResolver;
use crate::scanner::{FeedScanner, ScanSettings};
use crate::selectors::FeedSelectors;
use crate::types::{EventSink, HarvestError, RunSummary};
use crate::wait::{wait_for_any, WaitSettings};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub output_root: PathBuf,
    pub feed_url: String,
    pub credentials: Credentials,
    pub selectors: FeedSelectors,
    pub wait: WaitSettings,
    pub scan: ScanSettings,
    pub snapshot_width: u32,
    pub on_decode_failure: DecodeFailurePolicy,
    pub on_missing_checkpoint: MissingCheckpoint,
    pub max_challenge_rounds: u32,
}

impl EngineConfig {
    pub fn new(
        output_root: PathBuf,
        feed_url: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            output_root,
            feed_url: feed_url.into(),
            credentials,
            selectors: FeedSelectors::default(),
            wait: WaitSettings::default(),
            scan: ScanSettings::default(),
            snapshot_width: crate::harvest::DEFAULT_SNAPSHOT_WIDTH,
            on_decode_failure: DecodeFailurePolicy::default(),
            on_missing_checkpoint: MissingCheckpoint::default(),
            max_challenge_rounds: crate::auth::DEFAULT_MAX_CHALLENGE_ROUNDS,
        }
    }
}

/// Wires checkpoint store, login gate, scanner and harvester together.
pub struct HarvestEngine {
    feed_url: String,
    selectors: FeedSelectors,
    wait: WaitSettings,
    store: CheckpointStore,
    gate: AuthenticationGate,
    scanner: FeedScanner,
    harvester: PostHarvester,
}

impl HarvestEngine {
    pub fn new(
        config: EngineConfig,
        challenges: Arc<dyn ChallengeResolver>,
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let store = CheckpointStore::new(&config.output_root, config.on_missing_checkpoint);
        let gate = AuthenticationGate::new(
            config.selectors.login.clone(),
            config.credentials,
            challenges,
            config.output_root.clone(),
        )
        .with_wait(config.wait)
        .with_max_challenge_rounds(config.max_challenge_rounds);
        let scanner = FeedScanner::new(config.selectors.clone(), config.scan, sink.clone());
        let harvester = PostHarvester::new(
            config.selectors.clone(),
            AttachmentResolver::new(fetcher, &config.selectors),
            HarvestSettings {
                output_root: config.output_root,
                snapshot_width: config.snapshot_width,
                wait: config.wait,
                on_decode_failure: config.on_decode_failure,
            },
            sink,
        );

        Self {
            feed_url: config.feed_url,
            selectors: config.selectors,
            wait: config.wait,
            store,
            gate,
            scanner,
            harvester,
        }
    }

    pub fn checkpoint_store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Runs once with the built-in post harvester.
    pub async fn run(&self, session: &dyn BrowserSession) -> Result<RunSummary, HarvestError> {
        self.run_with(session, &self.harvester).await
    }

    /// Runs once, capturing posts with `capture`.
    ///
    /// The checkpoint file is written only after the scan finished and only
    /// when at least one post was captured; any error leaves it untouched.
    pub async fn run_with(
        &self,
        session: &dyn BrowserSession,
        capture: &dyn PostCapture,
    ) -> Result<RunSummary, HarvestError> {
        let previous = self.store.load()?;

        self.open_feed(session).await?;
        if let GateStatus::LoggedIn { .. } = self.gate.ensure_authenticated(session).await? {
            self.open_feed(session).await?;
        }

        let summary = self.scanner.scan(session, capture, previous).await?;
        let saved_checkpoint = match summary.next_checkpoint {
            Some(next) => {
                self.store.save(next)?;
                Some(next)
            }
            None => {
                harvest_info!("Nothing to capture, checkpoint stays at {previous}");
                None
            }
        };

        Ok(RunSummary {
            previous_checkpoint: previous,
            saved_checkpoint,
            processed: summary.processed,
            finish: summary.finish.unwrap_or(FinishReason::FeedExhausted),
        })
    }

    /// Navigates to the feed and waits until it shows either the feed or the login form.
    async fn open_feed(&self, session: &dyn BrowserSession) -> Result<(), HarvestError> {
        harvest_info!("Opening {}", self.feed_url);
        session.navigate(&self.feed_url).await?;
        let landmarks = [
            self.selectors.login.profile_link.clone(),
            self.selectors.login.email.clone(),
        ];
        match wait_for_any(session, &landmarks, self.wait).await {
            Ok(_) => Ok(()),
            // The gate decides what an unrecognised page means.
            Err(BrowserError::Timeout(what)) => {
                harvest_warn!("feed page shows no known landmark ({what})");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
