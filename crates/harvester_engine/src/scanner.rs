//! Walks the feed from newest to oldest, handing each new post to a [`PostCapture`].
//!
//! All decisions (harvest, skip, stop, load more) are made by
//! [`harvester_core::update`]; this module only turns its effects into
//! browser calls and feeds the observations back in.

use std::sync::Arc;

use harvest_logging::{harvest_debug, harvest_info, harvest_warn};
use harvester_core::{
    parse_post_id, update, Checkpoint, FinishReason, ScanEffect, ScanMsg, ScanState, ScanSummary,
    DEFAULT_MAX_IDLE_SCROLLS,
};
use tokio::time::sleep;

use crate::browser::{BrowserError, BrowserSession, ElementHandle};
use crate::harvest::{FeedPost, PostCapture};
use crate::selectors::FeedSelectors;
use crate::types::{EventSink, HarvestError, HarvestEvent};
use crate::wait::{wait_for_count_above, WaitSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// Load-more rounds without a new post before the feed counts as exhausted.
    pub max_idle_scrolls: u32,
    /// How long to wait for new posts after scrolling.
    pub load_wait: WaitSettings,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            max_idle_scrolls: DEFAULT_MAX_IDLE_SCROLLS,
            load_wait: WaitSettings::default(),
        }
    }
}

/// How one pass over the visible posts ended.
enum Pass {
    Finished,
    Stale,
    /// Stale too often in a row; scroll past it.
    StaleLoadMore,
    Exhausted,
}

pub struct FeedScanner {
    selectors: FeedSelectors,
    settings: ScanSettings,
    sink: Arc<dyn EventSink>,
}

impl FeedScanner {
    pub fn new(selectors: FeedSelectors, settings: ScanSettings, sink: Arc<dyn EventSink>) -> Self {
        Self {
            selectors,
            settings,
            sink,
        }
    }

    /// Captures every post newer than `checkpoint`, newest first.
    ///
    /// Returns the processed set and the checkpoint it implies; persisting
    /// that checkpoint is left to the caller.
    pub async fn scan(
        &self,
        session: &dyn BrowserSession,
        capture: &dyn PostCapture,
        checkpoint: Checkpoint,
    ) -> Result<ScanSummary, HarvestError> {
        let mut state =
            ScanState::with_max_idle_scrolls(checkpoint, self.settings.max_idle_scrolls);
        harvest_info!("Scanning feed for posts newer than {checkpoint}");

        loop {
            let visible = session.find_all(None, &self.selectors.post).await?;
            state = update(state, ScanMsg::BatchStarted { visible: visible.len() }).0;
            self.sink.emit(HarvestEvent::ScanBatch {
                pass: state.passes(),
                visible: visible.len(),
            });

            let (next, pass) = self.walk(session, capture, state, &visible).await?;
            state = next;
            match pass {
                Pass::Finished => break,
                Pass::Stale => {
                    harvest_debug!("post reference went stale, querying the feed again");
                    sleep(self.settings.load_wait.poll_interval).await;
                }
                Pass::StaleLoadMore => {
                    harvest_warn!("feed keeps going stale, scrolling on");
                    self.load_more(session, state.passes(), visible.len()).await?;
                }
                Pass::Exhausted => {
                    let (next, effects) = update(state, ScanMsg::BatchExhausted);
                    state = next;
                    if state.is_finished() {
                        break;
                    }
                    if effects.contains(&ScanEffect::LoadMore) {
                        self.load_more(session, state.passes(), visible.len()).await?;
                    }
                }
            }
        }

        let summary = state.summary();
        self.sink.emit(HarvestEvent::Finished {
            reason: summary.finish.unwrap_or(FinishReason::FeedExhausted),
            processed: summary.processed.len(),
        });
        Ok(summary)
    }

    async fn walk(
        &self,
        session: &dyn BrowserSession,
        capture: &dyn PostCapture,
        mut state: ScanState,
        visible: &[ElementHandle],
    ) -> Result<(ScanState, Pass), HarvestError> {
        for element in visible {
            let element_id = match session.attribute(element, "id").await {
                Ok(Some(id)) => id,
                Ok(None) => {
                    harvest_warn!("post element without an id, skipping it");
                    continue;
                }
                Err(BrowserError::StaleElement) => {
                    let (next, effects) = update(state, ScanMsg::StaleReference);
                    let pass = if next.is_finished() {
                        Pass::Finished
                    } else if effects.contains(&ScanEffect::LoadMore) {
                        Pass::StaleLoadMore
                    } else {
                        Pass::Stale
                    };
                    return Ok((next, pass));
                }
                Err(err) => return Err(err.into()),
            };
            let post_id = match parse_post_id(&element_id) {
                Ok(post_id) => post_id,
                Err(err) => {
                    harvest_warn!("skipping post element {element_id:?}: {err}");
                    continue;
                }
            };

            let (next, effects) = update(state, ScanMsg::PostSeen(post_id));
            state = next;
            for effect in effects {
                match effect {
                    ScanEffect::Harvest(post_id) => {
                        let post = FeedPost {
                            element: element.clone(),
                            element_id: element_id.clone(),
                            post_id,
                        };
                        capture.capture(session, &post).await?;
                        state = update(state, ScanMsg::PostHarvested(post_id)).0;
                    }
                    ScanEffect::Finish(reason) => harvest_info!("Stopping: {reason}"),
                    ScanEffect::Requery | ScanEffect::LoadMore => {}
                }
            }
            if state.is_finished() {
                return Ok((state, Pass::Finished));
            }
        }
        Ok((state, Pass::Exhausted))
    }

    async fn load_more(
        &self,
        session: &dyn BrowserSession,
        pass: u64,
        previous: usize,
    ) -> Result<(), HarvestError> {
        self.sink.emit(HarvestEvent::LoadMore { pass });
        session.scroll_to_bottom().await?;
        let grew =
            wait_for_count_above(session, &self.selectors.post, previous, self.settings.load_wait)
                .await?;
        if !grew {
            harvest_debug!("no new posts appeared after scrolling");
        }
        Ok(())
    }
}
