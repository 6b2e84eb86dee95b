//! Decoding of attachment controls.
//!
//! An attachment control does not expose its image URLs directly. They sit in
//! the control's click handler, which looks like
//!
//! ```text
//! return showPhoto('-1_2', 'wall-1_3', {"temp":{"x":"https://…","z":"https://…"},"queue":1}, event)
//! ```
//!
//! The grammar accepted here is: any prefix, a JSON object that starts with
//! `{"temp":{`, then the literal suffix `, event)`. The `temp` member maps
//! resolution tags to URLs; a value may also be an array whose first element
//! is the URL.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

static HANDLER_PAYLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\{"temp":\{.*\}), event\)"#).expect("valid attachment handler pattern")
});

/// Resolution tags the selection policy knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTag {
    High,
    Fallback,
}

impl ResolutionTag {
    pub const PREFERENCE: [ResolutionTag; 2] = [ResolutionTag::High, ResolutionTag::Fallback];

    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionTag::High => "z",
            ResolutionTag::Fallback => "x",
        }
    }
}

impl fmt::Display for ResolutionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachmentDecodeError {
    #[error("attachment control {control:?} has no click handler")]
    MissingHandler { control: String },
    #[error("click handler does not contain an attachment payload")]
    MissingPayload,
    #[error("attachment payload is not valid JSON: {message}")]
    MalformedPayload { message: String },
    #[error("attachment payload has neither a high-resolution nor a fallback url (tags: {available:?})")]
    NoUsableVariant { available: Vec<String> },
}

/// Resolution tag to URL, decoded from one attachment control.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttachmentVariants {
    urls: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedVariant {
    pub tag: ResolutionTag,
    pub url: String,
}

impl AttachmentVariants {
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.urls.get(tag).map(String::as_str)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.urls.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Prefers the high-resolution variant, then the fallback.
    pub fn select(&self) -> Result<SelectedVariant, AttachmentDecodeError> {
        ResolutionTag::PREFERENCE
            .iter()
            .find_map(|tag| {
                self.get(tag.as_str()).map(|url| SelectedVariant {
                    tag: *tag,
                    url: url.to_string(),
                })
            })
            .ok_or_else(|| AttachmentDecodeError::NoUsableVariant {
                available: self.tags().map(str::to_string).collect(),
            })
    }
}

impl FromIterator<(String, String)> for AttachmentVariants {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            urls: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HandlerPayload {
    temp: BTreeMap<String, Value>,
}

/// Decodes the variants embedded in an attachment control's click handler.
pub fn decode_attachment_handler(
    handler: &str,
) -> Result<AttachmentVariants, AttachmentDecodeError> {
    let json = HANDLER_PAYLOAD
        .captures(handler)
        .and_then(|caps| caps.get(1))
        .ok_or(AttachmentDecodeError::MissingPayload)?
        .as_str();

    let payload: HandlerPayload =
        serde_json::from_str(json).map_err(|err| AttachmentDecodeError::MalformedPayload {
            message: err.to_string(),
        })?;

    Ok(payload
        .temp
        .into_iter()
        .filter_map(|(tag, value)| variant_url(&value).map(|url| (tag, url)))
        .collect())
}

fn variant_url(value: &Value) -> Option<String> {
    match value {
        Value::String(url) if !url.trim().is_empty() => Some(url.clone()),
        Value::Array(items) => items.first().and_then(variant_url),
        _ => None,
    }
}
