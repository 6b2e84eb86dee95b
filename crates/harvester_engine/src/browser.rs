//! Browser capability consumed by the scanner, harvester and authentication gate.
//!
//! The engine never talks to a concrete automation backend directly; every
//! interaction goes through [`BrowserSession`]. [`crate::WebDriverSession`] is
//! the production adapter.

use std::fmt;

/// WebDriver key code for Enter.
pub const ENTER_KEY: &str = "\u{E007}";

/// Opaque reference to an element of the page currently shown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowHandle(String);

impl WindowHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
    TagName(String),
    /// Matches the `id` attribute exactly.
    Id(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Locator::TagName(name.into())
    }

    pub fn id(id: impl Into<String>) -> Self {
        Locator::Id(id.into())
    }

    /// W3C location strategy and value.
    pub(crate) fn strategy(&self) -> (&'static str, String) {
        match self {
            Locator::Css(sel) => ("css selector", sel.clone()),
            Locator::XPath(expr) => ("xpath", expr.clone()),
            Locator::TagName(name) => ("tag name", name.clone()),
            Locator::Id(id) => ("css selector", format!("[id=\"{}\"]", id.replace('"', "\\\""))),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(sel) => write!(f, "css `{sel}`"),
            Locator::XPath(expr) => write!(f, "xpath `{expr}`"),
            Locator::TagName(name) => write!(f, "tag `{name}`"),
            Locator::Id(id) => write!(f, "id `{id}`"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrowserError {
    #[error("element reference is stale")]
    StaleElement,
    #[error("no element matches {0}")]
    NoSuchElement(String),
    #[error("window is gone")]
    NoSuchWindow,
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("webdriver error `{code}`: {message}")]
    Protocol { code: String, message: String },
    #[error("webdriver transport failure: {0}")]
    Transport(String),
    #[error("unexpected webdriver response: {0}")]
    InvalidResponse(String),
    #[error("driver process: {0}")]
    Driver(String),
}

impl BrowserError {
    pub fn is_stale(&self) -> bool {
        matches!(self, BrowserError::StaleElement)
    }
}

/// One live, exclusively owned browser session.
///
/// Calls are made strictly one at a time; the session has a single active
/// window and scroll position that every call may observe or change.
#[async_trait::async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Absolute URL of the page in the current window.
    async fn current_url(&self) -> Result<String, BrowserError>;

    /// All matches in document order. `scope` restricts the search to an element's subtree.
    async fn find_all(
        &self,
        scope: Option<&ElementHandle>,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, BrowserError>;

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BrowserError>;

    async fn text(&self, element: &ElementHandle) -> Result<String, BrowserError>;

    /// Rendered height in CSS pixels.
    async fn rendered_height(&self, element: &ElementHandle) -> Result<u32, BrowserError>;

    /// PNG bytes of the element's rendered box.
    async fn screenshot(&self, element: &ElementHandle) -> Result<Vec<u8>, BrowserError>;

    async fn send_keys(&self, element: &ElementHandle, keys: &str) -> Result<(), BrowserError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError>;

    async fn current_window(&self) -> Result<WindowHandle, BrowserError>;

    async fn window_handles(&self) -> Result<Vec<WindowHandle>, BrowserError>;

    /// Opens a blank tab without switching to it.
    async fn open_tab(&self) -> Result<WindowHandle, BrowserError>;

    async fn switch_to_window(&self, handle: &WindowHandle) -> Result<(), BrowserError>;

    /// Closes the current window.
    async fn close_window(&self) -> Result<(), BrowserError>;

    /// Outer `(width, height)` of the current window.
    async fn window_size(&self) -> Result<(u32, u32), BrowserError>;

    async fn set_window_size(&self, width: u32, height: u32) -> Result<(), BrowserError>;

    /// Scrolls the current page to the bottom so the feed loads more content.
    async fn scroll_to_bottom(&self) -> Result<(), BrowserError>;
}

/// First match, or `None` when nothing matches.
pub async fn find_first(
    session: &dyn BrowserSession,
    scope: Option<&ElementHandle>,
    locator: &Locator,
) -> Result<Option<ElementHandle>, BrowserError> {
    Ok(session.find_all(scope, locator).await?.into_iter().next())
}

/// First match, or [`BrowserError::NoSuchElement`].
pub async fn find_required(
    session: &dyn BrowserSession,
    scope: Option<&ElementHandle>,
    locator: &Locator,
) -> Result<ElementHandle, BrowserError> {
    find_first(session, scope, locator)
        .await?
        .ok_or_else(|| BrowserError::NoSuchElement(locator.to_string()))
}
