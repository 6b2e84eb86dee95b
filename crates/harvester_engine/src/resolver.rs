use std::sync::Arc;

use harvest_logging::harvest_debug;
use harvester_core::{
    attachment_filename, decode_attachment_handler, AttachmentDecodeError, SelectedVariant,
};
use thiserror::Error;

use crate::browser::{BrowserError, BrowserSession, ElementHandle};
use crate::fetch::Fetcher;
use crate::persist::{AtomicFileWriter, PersistError};
use crate::selectors::FeedSelectors;
use crate::types::{FetchError, SavedAttachment};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Decode(#[from] AttachmentDecodeError),
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("download of {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Turns one attachment control into a file on disk.
#[derive(Clone)]
pub struct AttachmentResolver {
    fetcher: Arc<dyn Fetcher>,
    handler_attribute: String,
    id_attribute: String,
}

impl AttachmentResolver {
    pub fn new(fetcher: Arc<dyn Fetcher>, selectors: &FeedSelectors) -> Self {
        Self {
            fetcher,
            handler_attribute: selectors.attachment_handler_attribute.clone(),
            id_attribute: selectors.attachment_id_attribute.clone(),
        }
    }

    /// Reads the control's click handler and picks the variant to download.
    pub async fn decode(
        &self,
        session: &dyn BrowserSession,
        control: &ElementHandle,
    ) -> Result<SelectedVariant, ResolveError> {
        let Some(handler) = session.attribute(control, &self.handler_attribute).await? else {
            let label = session
                .attribute(control, &self.id_attribute)
                .await?
                .unwrap_or_else(|| control.id().to_string());
            return Err(AttachmentDecodeError::MissingHandler { control: label }.into());
        };
        Ok(decode_attachment_handler(&handler)?.select()?)
    }

    /// Downloads the chosen variant as attachment `index` (1-based) into the writer's directory.
    pub async fn resolve(
        &self,
        session: &dyn BrowserSession,
        control: &ElementHandle,
        writer: &AtomicFileWriter,
        index: usize,
    ) -> Result<SavedAttachment, ResolveError> {
        let selected = self.decode(session, control).await?;
        harvest_debug!("attachment {index}: {} variant {}", selected.tag, selected.url);

        let output = self
            .fetcher
            .fetch(&selected.url)
            .await
            .map_err(|source| ResolveError::Fetch {
                url: selected.url.clone(),
                source,
            })?;
        let path = writer.write_bytes(
            &attachment_filename(selected.tag.as_str(), index),
            &output.bytes,
        )?;

        Ok(SavedAttachment {
            index,
            tag: selected.tag,
            url: selected.url,
            content_type: output.content_type,
            path,
        })
    }
}
