//! Capture of a single post.
//!
//! The post is opened in a tab of its own so the feed keeps its scroll
//! position and loaded content. Whatever happens inside that tab, the tab is
//! closed and the feed window is active again when [`PostHarvester::capture`]
//! returns.

use std::path::PathBuf;
use std::sync::Arc;

use harvest_logging::{harvest_debug, harvest_warn, post_scope};
use harvester_core::{post_dir_name, snapshot_filename, PostId, PARTIAL_CAPTURE_MARKER};
use serde_json::json;
use url::Url;

use crate::browser::{find_first, BrowserError, BrowserSession, ElementHandle, WindowHandle};
use crate::persist::{ensure_output_dir, AtomicFileWriter, PersistError};
use crate::resolver::{AttachmentResolver, ResolveError};
use crate::selectors::FeedSelectors;
use crate::types::{
    CaptureResult, EventSink, HarvestError, HarvestEvent, SavedAttachment, SkippedAttachment,
};
use crate::wait::{wait_for_elements, wait_for_stable_height, WaitSettings};

/// Width the window is set to before the content is captured.
pub const DEFAULT_SNAPSHOT_WIDTH: u32 = 1920;

/// What to do with an attachment whose control cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeFailurePolicy {
    /// Fail the run; the checkpoint stays where it was.
    #[default]
    Abort,
    /// Leave the attachment out and mark the post as partially captured.
    SkipAttachment,
}

#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub output_root: PathBuf,
    pub snapshot_width: u32,
    pub wait: WaitSettings,
    pub on_decode_failure: DecodeFailurePolicy,
}

impl HarvestSettings {
    pub fn new(output_root: PathBuf) -> Self {
        Self {
            output_root,
            snapshot_width: DEFAULT_SNAPSHOT_WIDTH,
            wait: WaitSettings::default(),
            on_decode_failure: DecodeFailurePolicy::default(),
        }
    }
}

/// A post element found in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPost {
    pub element: ElementHandle,
    pub element_id: String,
    pub post_id: PostId,
}

/// Captures one post. The feed view is active again when this returns.
#[async_trait::async_trait]
pub trait PostCapture: Send + Sync {
    async fn capture(
        &self,
        session: &dyn BrowserSession,
        post: &FeedPost,
    ) -> Result<CaptureResult, HarvestError>;
}

pub struct PostHarvester {
    selectors: FeedSelectors,
    resolver: AttachmentResolver,
    settings: HarvestSettings,
    sink: Arc<dyn EventSink>,
}

impl PostHarvester {
    pub fn new(
        selectors: FeedSelectors,
        resolver: AttachmentResolver,
        settings: HarvestSettings,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            selectors,
            resolver,
            settings,
            sink,
        }
    }

    async fn capture_in_tab(
        &self,
        session: &dyn BrowserSession,
        post: &FeedPost,
        href: &str,
        writer: &AtomicFileWriter,
    ) -> Result<CaptureResult, HarvestError> {
        let post_id = post.post_id;
        session.navigate(href).await?;

        let content = wait_for_elements(session, None, &self.selectors.content, self.settings.wait)
            .await
            .map_err(|err| match err {
                BrowserError::Timeout(_) => content_missing(post_id, "content region"),
                other => HarvestError::Transport(other),
            })?
            .into_iter()
            .next()
            .ok_or_else(|| content_missing(post_id, "content region"))?;

        let height = session.rendered_height(&content).await?;
        session
            .set_window_size(self.settings.snapshot_width, height.max(1))
            .await?;
        wait_for_stable_height(session, &content, self.settings.wait).await?;
        let png = session.screenshot(&content).await?;
        let snapshot = writer.write_bytes(&snapshot_filename(&post.element_id), &png)?;
        self.sink.emit(HarvestEvent::SnapshotSaved {
            post_id,
            path: snapshot.clone(),
        });

        let controls = session
            .find_all(Some(&content), &self.selectors.attachments)
            .await?;
        harvest_debug!("{} attachment control(s)", controls.len());

        let mut attachments: Vec<SavedAttachment> = Vec::with_capacity(controls.len());
        let mut skipped = Vec::new();
        for (offset, control) in controls.iter().enumerate() {
            let index = offset + 1;
            match self.resolver.resolve(session, control, writer, index).await {
                Ok(saved) => {
                    self.sink.emit(HarvestEvent::AttachmentSaved {
                        post_id,
                        index,
                        path: saved.path.clone(),
                    });
                    attachments.push(saved);
                }
                Err(ResolveError::Decode(source))
                    if self.settings.on_decode_failure == DecodeFailurePolicy::SkipAttachment =>
                {
                    let reason = source.to_string();
                    harvest_warn!("skipping attachment {index}: {reason}");
                    self.sink.emit(HarvestEvent::AttachmentSkipped {
                        post_id,
                        index,
                        reason: reason.clone(),
                    });
                    skipped.push(SkippedAttachment { index, reason });
                }
                Err(err) => return Err(resolve_failure(post_id, index, err)),
            }
        }

        if !skipped.is_empty() {
            let marker = json!({ "post_id": post_id.get(), "skipped": skipped });
            let text =
                serde_json::to_string_pretty(&marker).map_err(|err| PersistError::Write {
                    path: writer.dir().join(PARTIAL_CAPTURE_MARKER),
                    source: std::io::Error::other(err),
                })?;
            writer.write(PARTIAL_CAPTURE_MARKER, &text)?;
        }

        self.sink.emit(HarvestEvent::PostCompleted {
            post_id,
            attachments: attachments.len(),
        });
        Ok(CaptureResult {
            post_id,
            directory: writer.dir().to_path_buf(),
            snapshot,
            attachments,
            skipped,
        })
    }
}

#[async_trait::async_trait]
impl PostCapture for PostHarvester {
    async fn capture(
        &self,
        session: &dyn BrowserSession,
        post: &FeedPost,
    ) -> Result<CaptureResult, HarvestError> {
        let _scope = post_scope(post.post_id.get());
        self.sink.emit(HarvestEvent::PostStarted {
            post_id: post.post_id,
            element_id: post.element_id.clone(),
        });

        let directory = self.settings.output_root.join(post_dir_name(&post.element_id));
        ensure_output_dir(&directory)?;
        let writer = AtomicFileWriter::new(directory);

        let link = find_first(session, Some(&post.element), &self.selectors.post_link)
            .await?
            .ok_or_else(|| content_missing(post.post_id, "post link"))?;
        let href = session
            .attribute(&link, "href")
            .await?
            .ok_or_else(|| content_missing(post.post_id, "post link target"))?;

        let feed = FeedView::remember(session).await?;
        let href = resolve_link(post.post_id, &feed.url, &href)?;
        let tab = session.open_tab().await?;
        let outcome = match session.switch_to_window(&tab).await {
            Ok(()) => self.capture_in_tab(session, post, &href, &writer).await,
            Err(err) => Err(err.into()),
        };
        let restored = feed.restore(session, &tab).await;

        match (outcome, restored) {
            (Ok(result), Ok(())) => Ok(result),
            (Ok(_), Err(cleanup)) => Err(HarvestError::Transport(cleanup)),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup)) => Err(HarvestError::InconsistentSession {
                post_id: post.post_id,
                cleanup,
                source: Box::new(err),
            }),
        }
    }
}

/// Window, page and size of the feed view before a post tab was opened.
struct FeedView {
    window: WindowHandle,
    url: String,
    size: (u32, u32),
}

impl FeedView {
    async fn remember(session: &dyn BrowserSession) -> Result<Self, BrowserError> {
        Ok(Self {
            window: session.current_window().await?,
            url: session.current_url().await?,
            size: session.window_size().await?,
        })
    }

    async fn restore(
        &self,
        session: &dyn BrowserSession,
        tab: &WindowHandle,
    ) -> Result<(), BrowserError> {
        session.switch_to_window(tab).await?;
        session.close_window().await?;
        session.switch_to_window(&self.window).await?;
        let (width, height) = self.size;
        session.set_window_size(width, height).await
    }
}

/// Post links may be site-relative; navigation needs an absolute URL.
fn resolve_link(post_id: PostId, base: &str, href: &str) -> Result<String, HarvestError> {
    let invalid = |reason: String| HarvestError::InvalidLink {
        post_id,
        href: href.to_string(),
        base: base.to_string(),
        reason,
    };
    let base = Url::parse(base).map_err(|err| invalid(err.to_string()))?;
    let target = base.join(href.trim()).map_err(|err| invalid(err.to_string()))?;
    match target.scheme() {
        "http" | "https" => Ok(target.into()),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}

fn content_missing(post_id: PostId, what: &str) -> HarvestError {
    HarvestError::ContentMissing {
        post_id,
        what: what.to_string(),
    }
}

fn resolve_failure(post_id: PostId, index: usize, err: ResolveError) -> HarvestError {
    match err {
        ResolveError::Decode(source) => HarvestError::AttachmentDecode {
            post_id,
            index,
            source,
        },
        ResolveError::Browser(err) => HarvestError::Transport(err),
        ResolveError::Fetch { url, source } => HarvestError::Fetch { url, source },
        ResolveError::Persist(err) => HarvestError::Persist(err),
    }
}
