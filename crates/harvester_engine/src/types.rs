use std::fmt;
use std::path::PathBuf;

use harvester_core::{AttachmentDecodeError, FinishReason, PostId, ResolutionTag};

use crate::auth::AuthError;
use crate::browser::BrowserError;
use crate::checkpoint::CheckpointError;
use crate::persist::PersistError;

/// Body of a successful download, with the `Content-Type` the server sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

/// One downloaded attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedAttachment {
    pub index: usize,
    pub tag: ResolutionTag,
    pub url: String,
    pub content_type: Option<String>,
    pub path: PathBuf,
}

/// An attachment left out of a capture under the skip policy.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SkippedAttachment {
    pub index: usize,
    pub reason: String,
}

/// Everything written for one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub post_id: PostId,
    pub directory: PathBuf,
    pub snapshot: PathBuf,
    pub attachments: Vec<SavedAttachment>,
    pub skipped: Vec<SkippedAttachment>,
}

impl CaptureResult {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub previous_checkpoint: harvester_core::Checkpoint,
    /// Set only when the checkpoint file was rewritten.
    pub saved_checkpoint: Option<harvester_core::Checkpoint>,
    pub processed: Vec<PostId>,
    pub finish: FinishReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestEvent {
    ScanBatch { pass: u64, visible: usize },
    PostStarted { post_id: PostId, element_id: String },
    SnapshotSaved { post_id: PostId, path: PathBuf },
    AttachmentSaved { post_id: PostId, index: usize, path: PathBuf },
    AttachmentSkipped { post_id: PostId, index: usize, reason: String },
    PostCompleted { post_id: PostId, attachments: usize },
    LoadMore { pass: u64 },
    Finished { reason: FinishReason, processed: usize },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: HarvestEvent);
}

/// Run-level failures. Every variant aborts the run without writing the checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),
    #[error("attachment {index} of post {post_id} cannot be decoded: {source}")]
    AttachmentDecode {
        post_id: PostId,
        index: usize,
        #[source]
        source: AttachmentDecodeError,
    },
    #[error("browser session failure: {0}")]
    Transport(#[from] BrowserError),
    #[error("download of {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("post {post_id}: {what} not found")]
    ContentMissing { post_id: PostId, what: String },
    #[error("post {post_id}: link {href:?} cannot be resolved against {base}: {reason}")]
    InvalidLink {
        post_id: PostId,
        href: String,
        base: String,
        reason: String,
    },
    #[error("post {post_id}: feed view not restored ({cleanup}), session is inconsistent")]
    InconsistentSession {
        post_id: PostId,
        cleanup: BrowserError,
        #[source]
        source: Box<HarvestError>,
    },
}
