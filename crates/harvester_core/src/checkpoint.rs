use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::PostId;

/// Highest post id captured by a previous run. Never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Checkpoint(u64);

impl Checkpoint {
    pub const ZERO: Checkpoint = Checkpoint(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// True when `post` was already captured by an earlier run.
    pub fn covers(self, post: PostId) -> bool {
        post.get() <= self.0
    }

    /// The checkpoint to persist after a run, or `None` when nothing was processed.
    pub fn advance(self, processed: &ProcessedSet) -> Option<Checkpoint> {
        processed
            .max()
            .map(|newest| Checkpoint(self.0.max(newest.get())))
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("checkpoint value {raw:?} is not a non-negative integer")]
pub struct CheckpointParseError {
    pub raw: String,
}

impl FromStr for Checkpoint {
    type Err = CheckpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Checkpoint)
            .map_err(|_| CheckpointParseError { raw: s.to_string() })
    }
}

/// Posts harvested during the current run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessedSet {
    ids: BTreeSet<PostId>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, post: PostId) -> bool {
        self.ids.contains(&post)
    }

    /// Returns false if the post was already present.
    pub fn insert(&mut self, post: PostId) -> bool {
        self.ids.insert(post)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn max(&self) -> Option<PostId> {
        self.ids.last().copied()
    }

    /// Ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = PostId> + '_ {
        self.ids.iter().copied()
    }
}
