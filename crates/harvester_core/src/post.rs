use std::fmt;

/// Identifier of a feed post. Higher ids are newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PostId(u64);

impl PostId {
    pub fn new(raw: u64) -> Result<Self, PostIdError> {
        if raw == 0 {
            return Err(PostIdError::Zero);
        }
        Ok(Self(raw))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PostIdError {
    #[error("post element has an empty id")]
    Empty,
    #[error("post element id {element_id:?} does not end in a number")]
    NotNumeric { element_id: String },
    #[error("post id must be positive")]
    Zero,
}

/// Extracts the post number from a structured element id such as `post-123_456`.
///
/// The number is whatever follows the last `_`; ids without one are parsed whole.
pub fn parse_post_id(element_id: &str) -> Result<PostId, PostIdError> {
    let trimmed = element_id.trim();
    if trimmed.is_empty() {
        return Err(PostIdError::Empty);
    }
    let suffix = match trimmed.rfind('_') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    };
    let raw = suffix
        .parse::<u64>()
        .map_err(|_| PostIdError::NotNumeric {
            element_id: trimmed.to_string(),
        })?;
    PostId::new(raw)
}
