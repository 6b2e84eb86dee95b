//! Deterministic names for everything written under the output root.

/// Checkpoint file, relative to the output root.
pub const CHECKPOINT_FILENAME: &str = "last_post.num";

/// Written into a post directory when some of its attachments were skipped.
pub const PARTIAL_CAPTURE_MARKER: &str = "partial_capture.json";

/// Directory holding one post's capture, keyed by the post's element id.
pub fn post_dir_name(element_id: &str) -> String {
    sanitize(element_id)
}

pub fn snapshot_filename(element_id: &str) -> String {
    format!("_{}.png", sanitize(element_id))
}

/// `img_<tag>_<NN>.jpg`, numbered from 1 in displayed order.
pub fn attachment_filename(tag: &str, index: usize) -> String {
    format!("img_{}_{index:02}.jpg", sanitize(tag))
}

pub fn diagnostic_snapshot_filename(label: &str, timestamp: &str) -> String {
    format!("{}_{}.png", sanitize(label), sanitize(timestamp))
}

fn sanitize(input: &str) -> String {
    let cleaned: String = input
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}
