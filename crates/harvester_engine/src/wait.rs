//! Bounded polling used instead of fixed sleeps while the remote view renders.

use std::time::Duration;

use harvest_logging::harvest_warn;
use tokio::time::{sleep, Instant};

use crate::browser::{BrowserError, BrowserSession, ElementHandle, Locator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl WaitSettings {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// Polls until `locator` matches at least one element.
pub async fn wait_for_elements(
    session: &dyn BrowserSession,
    scope: Option<&ElementHandle>,
    locator: &Locator,
    settings: WaitSettings,
) -> Result<Vec<ElementHandle>, BrowserError> {
    let deadline = Instant::now() + settings.timeout;
    loop {
        let found = session.find_all(scope, locator).await?;
        if !found.is_empty() {
            return Ok(found);
        }
        if Instant::now() >= deadline {
            return Err(BrowserError::Timeout(locator.to_string()));
        }
        sleep(settings.poll_interval).await;
    }
}

/// Polls until any of `locators` matches; returns the index of the first one that does.
pub async fn wait_for_any(
    session: &dyn BrowserSession,
    locators: &[Locator],
    settings: WaitSettings,
) -> Result<usize, BrowserError> {
    let deadline = Instant::now() + settings.timeout;
    loop {
        for (idx, locator) in locators.iter().enumerate() {
            if !session.find_all(None, locator).await?.is_empty() {
                return Ok(idx);
            }
        }
        if Instant::now() >= deadline {
            let names: Vec<String> = locators.iter().map(ToString::to_string).collect();
            return Err(BrowserError::Timeout(format!("any of {}", names.join(", "))));
        }
        sleep(settings.poll_interval).await;
    }
}

/// Polls the element's height until two consecutive reads agree.
///
/// Content that keeps changing past the timeout is returned at its last height.
pub async fn wait_for_stable_height(
    session: &dyn BrowserSession,
    element: &ElementHandle,
    settings: WaitSettings,
) -> Result<u32, BrowserError> {
    let deadline = Instant::now() + settings.timeout;
    let mut last = session.rendered_height(element).await?;
    loop {
        sleep(settings.poll_interval).await;
        let height = session.rendered_height(element).await?;
        if height == last {
            return Ok(height);
        }
        if Instant::now() >= deadline {
            harvest_warn!("height still changing after {:?}, using {height}px", settings.timeout);
            return Ok(height);
        }
        last = height;
    }
}

/// Polls until more than `previous` elements match. Returns false on timeout.
pub async fn wait_for_count_above(
    session: &dyn BrowserSession,
    locator: &Locator,
    previous: usize,
    settings: WaitSettings,
) -> Result<bool, BrowserError> {
    let deadline = Instant::now() + settings.timeout;
    loop {
        if session.find_all(None, locator).await?.len() > previous {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(settings.poll_interval).await;
    }
}

/// Polls until `locator` no longer matches. Returns false on timeout.
pub async fn wait_for_absence(
    session: &dyn BrowserSession,
    locator: &Locator,
    settings: WaitSettings,
) -> Result<bool, BrowserError> {
    let deadline = Instant::now() + settings.timeout;
    loop {
        if session.find_all(None, locator).await?.is_empty() {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(settings.poll_interval).await;
    }
}
