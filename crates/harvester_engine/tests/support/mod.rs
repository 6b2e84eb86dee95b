//! Scripted in-memory browser and fetcher shared by the engine tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, Once};
use std::time::Duration;

use harvester_engine::{
    BrowserError, BrowserSession, ChallengeKind, ElementHandle, EventSink, FailureKind,
    FeedSelectors, FetchError, FetchOutput, Fetcher, HarvestEvent, Locator,
    WaitSettings, WindowHandle, ENTER_KEY,
};

pub const FEED_URL: &str = "https://social.example/feed";

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(harvest_logging::initialize_for_tests);
}

/// Short waits so timeouts in tests resolve quickly.
pub fn fast_wait() -> WaitSettings {
    WaitSettings {
        timeout: Duration::from_millis(60),
        poll_interval: Duration::from_millis(5),
    }
}

/// Click handler in the shape the feed renders for attachment controls.
pub fn handler(z: Option<&str>, x: Option<&str>) -> String {
    let mut temp = Vec::new();
    if let Some(x) = x {
        temp.push(format!(r#""x":"{x}""#));
    }
    if let Some(z) = z {
        temp.push(format!(r#""z":"{z}""#));
    }
    format!(
        r#"return showPhoto('-1_2', 'wall-1_3', {{"temp":{{{}}},"queue":1}}, event)"#,
        temp.join(",")
    )
}

#[derive(Debug, Clone)]
pub struct FakePost {
    /// `None` renders a post element without an id attribute.
    pub element_id: Option<String>,
    pub href: Option<String>,
}

impl FakePost {
    pub fn new(post_id: u64) -> Self {
        let element_id = format!("post-1_{post_id}");
        Self {
            href: Some(post_url(&element_id)),
            element_id: Some(element_id),
        }
    }

    pub fn with_element_id(element_id: &str) -> Self {
        Self {
            element_id: Some(element_id.to_string()),
            href: Some(post_url(element_id)),
        }
    }
}

pub fn post_url(element_id: &str) -> String {
    format!("https://social.example/wall/{element_id}")
}

#[derive(Debug, Clone)]
pub struct FakePage {
    pub height: u32,
    /// Click handler per attachment control; `None` means the control has none.
    pub attachments: Vec<Option<String>>,
}

impl FakePage {
    pub fn new(attachments: Vec<Option<String>>) -> Self {
        Self {
            height: 800,
            attachments,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginStage {
    LoggedIn,
    Form,
    NoForm,
    Challenge(ChallengeKind),
    Rejected,
}

#[derive(Debug)]
struct Window {
    handle: String,
    url: String,
}

#[derive(Debug)]
struct State {
    windows: Vec<Window>,
    current: Option<String>,
    next_window: u32,
    size: (u32, u32),
    batches: Vec<Vec<FakePost>>,
    scrolls: usize,
    pages: HashMap<String, FakePage>,
    stale_once: HashSet<String>,
    always_stale: HashSet<String>,
    stage: LoginStage,
    password: String,
    pending_challenges: Vec<ChallengeKind>,
    expected_code: String,
    typed: Vec<(String, String)>,
    fail_navigation: HashSet<String>,
    fail_close: bool,
    calls: Vec<String>,
}

/// Scripted browser: a feed revealed batch by batch on scroll, post pages by URL,
/// a login flow and tab bookkeeping.
pub struct FakeBrowser {
    selectors: FeedSelectors,
    state: Mutex<State>,
}

impl FakeBrowser {
    /// Logged-in browser whose feed shows `batches[0]` and one more batch per scroll.
    pub fn new(batches: Vec<Vec<FakePost>>) -> Self {
        Self {
            selectors: FeedSelectors::default(),
            state: Mutex::new(State {
                windows: vec![Window {
                    handle: "main".into(),
                    url: "about:blank".into(),
                }],
                current: Some("main".into()),
                next_window: 1,
                size: (1280, 720),
                batches,
                scrolls: 0,
                pages: HashMap::new(),
                stale_once: HashSet::new(),
                always_stale: HashSet::new(),
                stage: LoginStage::LoggedIn,
                password: "secret".into(),
                pending_challenges: Vec::new(),
                expected_code: "4242".into(),
                typed: Vec::new(),
                fail_navigation: HashSet::new(),
                fail_close: false,
                calls: Vec::new(),
            }),
        }
    }

    /// Opens the feed in the main window, as the run does before scanning.
    pub fn on_feed(self) -> Self {
        self.state().windows[0].url = FEED_URL.into();
        self
    }

    pub fn with_page(self, element_id: &str, page: FakePage) -> Self {
        self.with_page_at(&post_url(element_id), page)
    }

    pub fn with_page_at(self, url: &str, page: FakePage) -> Self {
        self.state().pages.insert(url.to_string(), page);
        self
    }

    pub fn stale_once(self, element_id: &str) -> Self {
        self.state().stale_once.insert(element_id.to_string());
        self
    }

    /// Every read of this post's id fails as stale.
    pub fn always_stale(self, element_id: &str) -> Self {
        self.state().always_stale.insert(element_id.to_string());
        self
    }

    pub fn logged_out(self) -> Self {
        self.state().stage = LoginStage::Form;
        self
    }

    pub fn without_login_form(self) -> Self {
        self.state().stage = LoginStage::NoForm;
        self
    }

    pub fn with_challenges(self, challenges: Vec<ChallengeKind>) -> Self {
        self.state().pending_challenges = challenges;
        self
    }

    pub fn failing_navigation(self, url: &str) -> Self {
        self.state().fail_navigation.insert(url.to_string());
        self
    }

    pub fn failing_close(self) -> Self {
        self.state().fail_close = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Text typed into each element, in order.
    pub fn typed(&self) -> Vec<(String, String)> {
        self.state().typed.clone()
    }

    pub fn active_url(&self) -> Option<String> {
        let state = self.state();
        let current = state.current.clone()?;
        state
            .windows
            .iter()
            .find(|w| w.handle == current)
            .map(|w| w.url.clone())
    }

    pub fn current_handle(&self) -> Option<String> {
        self.state().current.clone()
    }

    pub fn open_windows(&self) -> usize {
        self.state().windows.len()
    }

    pub fn size(&self) -> (u32, u32) {
        self.state().size
    }

    pub fn scrolls(&self) -> usize {
        self.state().scrolls
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl State {
    fn current_url(&self) -> Result<String, BrowserError> {
        let current = self.current.as_ref().ok_or(BrowserError::NoSuchWindow)?;
        self.windows
            .iter()
            .find(|w| &w.handle == current)
            .map(|w| w.url.clone())
            .ok_or(BrowserError::NoSuchWindow)
    }

    fn visible_posts(&self) -> Vec<FakePost> {
        self.batches
            .iter()
            .take(self.scrolls + 1)
            .flatten()
            .cloned()
            .collect()
    }

    fn post(&self, key: &str) -> Option<FakePost> {
        self.visible_posts()
            .into_iter()
            .enumerate()
            .find(|(idx, _)| idx.to_string() == key)
            .map(|(_, post)| post)
    }

    fn next_challenge(&mut self) -> LoginStage {
        if self.pending_challenges.is_empty() {
            LoginStage::LoggedIn
        } else {
            LoginStage::Challenge(self.pending_challenges.remove(0))
        }
    }

    fn page(&self) -> Result<Option<FakePage>, BrowserError> {
        Ok(self.pages.get(&self.current_url()?).cloned())
    }
}

fn handles(ids: impl IntoIterator<Item = String>) -> Vec<ElementHandle> {
    ids.into_iter().map(ElementHandle::new).collect()
}

#[async_trait::async_trait]
impl BrowserSession for FakeBrowser {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let mut state = self.state();
        state.calls.push(format!("navigate {url}"));
        if state.fail_navigation.contains(url) {
            return Err(BrowserError::Transport(format!("cannot reach {url}")));
        }
        let current = state.current.clone().ok_or(BrowserError::NoSuchWindow)?;
        let window = state
            .windows
            .iter_mut()
            .find(|w| w.handle == current)
            .ok_or(BrowserError::NoSuchWindow)?;
        window.url = url.to_string();
        if url == FEED_URL {
            state.scrolls = 0;
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.state().current_url()
    }

    async fn find_all(
        &self,
        scope: Option<&ElementHandle>,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, BrowserError> {
        let state = self.state();
        let url = state.current_url()?;
        let on_feed = url == FEED_URL;
        let login = &self.selectors.login;
        let scope = scope.map(ElementHandle::id);

        if *locator == self.selectors.post {
            if !on_feed || state.stage != LoginStage::LoggedIn {
                return Ok(Vec::new());
            }
            let count = state.visible_posts().len();
            return Ok(handles((0..count).map(|idx| format!("post:{idx}"))));
        }
        if *locator == self.selectors.post_link {
            return Ok(match scope.and_then(|s| s.strip_prefix("post:")) {
                Some(key) => handles([format!("link:{key}")]),
                None => Vec::new(),
            });
        }
        if *locator == self.selectors.content && scope.is_none() {
            return Ok(match state.page()? {
                Some(_) => handles(["content".to_string()]),
                None => Vec::new(),
            });
        }
        if *locator == self.selectors.attachments {
            if scope != Some("content") {
                return Ok(Vec::new());
            }
            let count = state.page()?.map_or(0, |page| page.attachments.len());
            return Ok(handles((0..count).map(|idx| format!("attach:{idx}"))));
        }
        if *locator == login.page_body {
            return Ok(handles(["body".to_string()]));
        }
        if !on_feed {
            return Ok(Vec::new());
        }

        let present = match state.stage {
            LoginStage::LoggedIn => *locator == login.profile_link,
            LoginStage::Form => {
                *locator == login.email || *locator == login.password || *locator == login.submit
            }
            LoginStage::Challenge(ChallengeKind::Captcha) => {
                *locator == login.captcha_marker || *locator == login.captcha_input
            }
            LoginStage::Challenge(ChallengeKind::AuthCode) => *locator == login.auth_code_input,
            LoginStage::NoForm | LoginStage::Rejected => false,
        };
        Ok(if present {
            handles([format!("login:{locator}")])
        } else {
            Vec::new()
        })
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        let mut state = self.state();
        let id = element.id();
        if let Some(key) = id.strip_prefix("post:") {
            let post = state.post(key).ok_or(BrowserError::StaleElement)?;
            if name != "id" {
                return Ok(None);
            }
            if let Some(element_id) = &post.element_id {
                if state.stale_once.remove(element_id) || state.always_stale.contains(element_id)
                {
                    return Err(BrowserError::StaleElement);
                }
            }
            return Ok(post.element_id);
        }
        if let Some(key) = id.strip_prefix("link:") {
            let post = state.post(key).ok_or(BrowserError::StaleElement)?;
            return Ok(if name == "href" { post.href } else { None });
        }
        if let Some(idx) = id.strip_prefix("attach:") {
            let idx: usize = idx.parse().map_err(|_| BrowserError::StaleElement)?;
            let page = state.page()?.ok_or(BrowserError::StaleElement)?;
            if name == self.selectors.attachment_handler_attribute {
                return Ok(page.attachments.get(idx).cloned().flatten());
            }
            if name == self.selectors.attachment_id_attribute {
                return Ok(Some(format!("photo{}", idx + 1)));
            }
        }
        Ok(None)
    }

    async fn text(&self, _element: &ElementHandle) -> Result<String, BrowserError> {
        Ok(String::new())
    }

    async fn rendered_height(&self, element: &ElementHandle) -> Result<u32, BrowserError> {
        let state = self.state();
        match (element.id(), state.page()?) {
            ("content", Some(page)) => Ok(page.height),
            _ => Err(BrowserError::StaleElement),
        }
    }

    async fn screenshot(&self, element: &ElementHandle) -> Result<Vec<u8>, BrowserError> {
        let mut state = self.state();
        let url = state.current_url()?;
        state.calls.push(format!("screenshot {}", element.id()));
        Ok(format!("png:{}:{url}", element.id()).into_bytes())
    }

    async fn send_keys(&self, element: &ElementHandle, keys: &str) -> Result<(), BrowserError> {
        let mut state = self.state();
        state.typed.push((element.id().to_string(), keys.to_string()));
        let login = &self.selectors.login;
        let submitted = keys.ends_with(ENTER_KEY);

        if element.id() == format!("login:{}", login.submit) && submitted {
            let password_ok = state
                .typed
                .iter()
                .any(|(id, text)| {
                    *id == format!("login:{}", login.password) && *text == state.password
                });
            let next = if !password_ok {
                LoginStage::Rejected
            } else {
                state.next_challenge()
            };
            state.stage = next;
            return Ok(());
        }

        if let LoginStage::Challenge(_) = state.stage {
            if submitted {
                let code = keys.trim_end_matches(ENTER_KEY);
                if code == state.expected_code {
                    let next = state.next_challenge();
                    state.stage = next;
                }
            }
        }
        Ok(())
    }

    async fn click(&self, _element: &ElementHandle) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn current_window(&self) -> Result<WindowHandle, BrowserError> {
        let state = self.state();
        state
            .current
            .clone()
            .map(WindowHandle::new)
            .ok_or(BrowserError::NoSuchWindow)
    }

    async fn window_handles(&self) -> Result<Vec<WindowHandle>, BrowserError> {
        let state = self.state();
        Ok(state
            .windows
            .iter()
            .map(|w| WindowHandle::new(w.handle.clone()))
            .collect())
    }

    async fn open_tab(&self) -> Result<WindowHandle, BrowserError> {
        let mut state = self.state();
        let handle = format!("tab{}", state.next_window);
        state.next_window += 1;
        state.windows.push(Window {
            handle: handle.clone(),
            url: "about:blank".into(),
        });
        state.calls.push(format!("open {handle}"));
        Ok(WindowHandle::new(handle))
    }

    async fn switch_to_window(&self, handle: &WindowHandle) -> Result<(), BrowserError> {
        let mut state = self.state();
        if !state.windows.iter().any(|w| w.handle == handle.id()) {
            return Err(BrowserError::NoSuchWindow);
        }
        state.calls.push(format!("switch {}", handle.id()));
        state.current = Some(handle.id().to_string());
        Ok(())
    }

    async fn close_window(&self) -> Result<(), BrowserError> {
        let mut state = self.state();
        let current = state.current.take().ok_or(BrowserError::NoSuchWindow)?;
        if state.fail_close {
            state.current = Some(current);
            return Err(BrowserError::Transport("browser stopped responding".into()));
        }
        state.windows.retain(|w| w.handle != current);
        state.calls.push(format!("close {current}"));
        Ok(())
    }

    async fn window_size(&self) -> Result<(u32, u32), BrowserError> {
        Ok(self.state().size)
    }

    async fn set_window_size(&self, width: u32, height: u32) -> Result<(), BrowserError> {
        let mut state = self.state();
        state.calls.push(format!("resize {width}x{height}"));
        state.size = (width, height);
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        let mut state = self.state();
        state.calls.push("scroll".into());
        if state.current_url()? == FEED_URL {
            state.scrolls += 1;
        }
        Ok(())
    }
}

/// Serves attachment bytes from memory.
#[derive(Default)]
pub struct FakeFetcher {
    files: HashMap<String, Vec<u8>>,
    requested: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn with(mut self, url: &str, bytes: &[u8]) -> Self {
        self.files.insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        self.requested.lock().unwrap().push(url.to_string());
        let bytes = self
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::new(FailureKind::HttpStatus(404), "404 Not Found"))?;
        Ok(FetchOutput {
            bytes,
            content_type: Some("image/jpeg".into()),
        })
    }
}

/// Keeps every event for inspection.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<HarvestEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<HarvestEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: HarvestEvent) {
        self.events.lock().unwrap().push(event);
    }
}
