use harvest_logging::{harvest_debug, harvest_info, harvest_warn};

use crate::types::{EventSink, HarvestEvent};

/// Sends run progress to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl EventSink for LoggingSink {
    fn emit(&self, event: HarvestEvent) {
        match event {
            HarvestEvent::ScanBatch { pass, visible } => {
                harvest_info!("Pass {pass}: found {visible} posts, going through");
            }
            HarvestEvent::PostStarted { element_id, .. } => {
                harvest_info!("Capturing {element_id}");
            }
            HarvestEvent::SnapshotSaved { path, .. } => {
                harvest_debug!("snapshot {}", path.display());
            }
            HarvestEvent::AttachmentSaved { index, path, .. } => {
                harvest_debug!("attachment {index} -> {}", path.display());
            }
            HarvestEvent::AttachmentSkipped { index, reason, .. } => {
                harvest_warn!("attachment {index} skipped: {reason}");
            }
            HarvestEvent::PostCompleted { attachments, .. } => {
                harvest_info!("Done, {attachments} attachment(s)");
            }
            HarvestEvent::LoadMore { pass } => {
                harvest_info!("Scrolling for more posts after pass {pass}");
            }
            HarvestEvent::Finished { reason, processed } => {
                harvest_info!("Scan finished ({reason}), {processed} new post(s)");
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: HarvestEvent) {}
}
