//! Harvester core: pure scan state machine and capture helpers.
mod attachment;
mod checkpoint;
mod naming;
mod post;
mod scan;

pub use attachment::{
    decode_attachment_handler, AttachmentDecodeError, AttachmentVariants, ResolutionTag,
    SelectedVariant,
};
pub use checkpoint::{Checkpoint, CheckpointParseError, ProcessedSet};
pub use naming::{
    attachment_filename, diagnostic_snapshot_filename, post_dir_name, snapshot_filename,
    CHECKPOINT_FILENAME, PARTIAL_CAPTURE_MARKER,
};
pub use post::{parse_post_id, PostId, PostIdError};
pub use scan::{
    update, FinishReason, ScanEffect, ScanMsg, ScanPhase, ScanState, ScanSummary,
    DEFAULT_MAX_IDLE_SCROLLS, MAX_STALE_REQUERIES,
};
