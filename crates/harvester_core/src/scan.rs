use std::fmt;

use crate::{Checkpoint, PostId, ProcessedSet};

/// Unproductive load-more rounds tolerated before the feed counts as exhausted.
pub const DEFAULT_MAX_IDLE_SCROLLS: u32 = 3;

/// Consecutive stale restarts of a batch before the scan scrolls past it instead.
pub const MAX_STALE_REQUERIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// A post at or below the checkpoint was reached; everything past it is old.
    ReachedCheckpoint(PostId),
    /// Loading more content stopped producing new posts.
    FeedExhausted,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::ReachedCheckpoint(post) => {
                write!(f, "reached already captured post {post}")
            }
            FinishReason::FeedExhausted => f.write_str("feed exhausted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Scanning,
    Finished(FinishReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanMsg {
    /// A fresh query of the visible posts is about to be walked.
    BatchStarted { visible: usize },
    /// The id of the next visible post was resolved.
    PostSeen(PostId),
    /// A post was captured successfully.
    PostHarvested(PostId),
    /// A visible post handle went stale while its id was read.
    StaleReference,
    /// Every post of the current batch was walked without finishing.
    BatchExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEffect {
    Harvest(PostId),
    /// Abandon the current batch and query the visible posts again.
    Requery,
    LoadMore,
    Finish(FinishReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub processed: Vec<PostId>,
    pub next_checkpoint: Option<Checkpoint>,
    pub finish: Option<FinishReason>,
    pub passes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanState {
    checkpoint: Checkpoint,
    processed: ProcessedSet,
    phase: ScanPhase,
    harvested_since_load: usize,
    idle_rounds: u32,
    max_idle_scrolls: u32,
    stale_streak: u32,
    passes: u64,
}

impl ScanState {
    pub fn new(checkpoint: Checkpoint) -> Self {
        Self::with_max_idle_scrolls(checkpoint, DEFAULT_MAX_IDLE_SCROLLS)
    }

    pub fn with_max_idle_scrolls(checkpoint: Checkpoint, max_idle_scrolls: u32) -> Self {
        Self {
            checkpoint,
            processed: ProcessedSet::new(),
            phase: ScanPhase::Scanning,
            harvested_since_load: 0,
            idle_rounds: 0,
            max_idle_scrolls,
            stale_streak: 0,
            passes: 0,
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, ScanPhase::Finished(_))
    }

    /// Number of feed queries started so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            processed: self.processed.iter().collect(),
            next_checkpoint: self.checkpoint.advance(&self.processed),
            finish: match self.phase {
                ScanPhase::Finished(reason) => Some(reason),
                ScanPhase::Scanning => None,
            },
            passes: self.passes,
        }
    }

    /// Closes the current batch: counts an idle round and either loads more or gives up.
    fn exhaust_batch(&mut self) -> Vec<ScanEffect> {
        if self.harvested_since_load == 0 {
            self.idle_rounds += 1;
        } else {
            self.idle_rounds = 0;
        }
        self.harvested_since_load = 0;
        self.stale_streak = 0;
        if self.idle_rounds > self.max_idle_scrolls {
            self.finish(FinishReason::FeedExhausted)
        } else {
            vec![ScanEffect::LoadMore]
        }
    }

    fn finish(&mut self, reason: FinishReason) -> Vec<ScanEffect> {
        self.phase = ScanPhase::Finished(reason);
        vec![ScanEffect::Finish(reason)]
    }
}

/// Pure update function: applies a scan message to state and returns any effects.
pub fn update(mut state: ScanState, msg: ScanMsg) -> (ScanState, Vec<ScanEffect>) {
    if state.is_finished() {
        return (state, Vec::new());
    }

    let effects = match msg {
        ScanMsg::BatchStarted { .. } => {
            state.passes += 1;
            Vec::new()
        }
        ScanMsg::PostSeen(post) => {
            if state.processed.contains(post) {
                Vec::new()
            } else if state.checkpoint.covers(post) {
                state.finish(FinishReason::ReachedCheckpoint(post))
            } else {
                vec![ScanEffect::Harvest(post)]
            }
        }
        ScanMsg::PostHarvested(post) => {
            // Only posts newer than the checkpoint may enter the processed set.
            if !state.checkpoint.covers(post) && state.processed.insert(post) {
                state.harvested_since_load += 1;
                state.stale_streak = 0;
            }
            Vec::new()
        }
        ScanMsg::StaleReference => {
            state.stale_streak += 1;
            if state.stale_streak > MAX_STALE_REQUERIES {
                state.exhaust_batch()
            } else {
                vec![ScanEffect::Requery]
            }
        }
        ScanMsg::BatchExhausted => state.exhaust_batch(),
    };

    (state, effects)
}
