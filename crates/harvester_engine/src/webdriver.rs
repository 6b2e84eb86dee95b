//! [`BrowserSession`] over the W3C WebDriver HTTP protocol.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use base64::Engine as _;
use harvest_logging::{harvest_debug, harvest_info};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};

use crate::browser::{BrowserError, BrowserSession, ElementHandle, Locator, WindowHandle};
use crate::wait::WaitSettings;

/// Key under which W3C drivers return element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// How the browser is launched for a new session.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub profile_dir: PathBuf,
    pub download_dir: PathBuf,
    pub headless: bool,
}

impl BrowserOptions {
    pub fn new(profile_dir: PathBuf, download_dir: PathBuf) -> Self {
        Self {
            profile_dir,
            download_dir,
            headless: false,
        }
    }

    /// New-session request body.
    pub fn capabilities(&self) -> Value {
        let mut args = vec![
            "--disable-extensions".to_string(),
            format!("--user-data-dir={}", self.profile_dir.display()),
            "--start-maximized".to_string(),
            "--no-sandbox".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": args,
                        "prefs": {
                            "download.default_directory": self.download_dir.display().to_string(),
                            "download.prompt_for_download": false,
                            "download.directory_upgrade": true,
                            "safebrowsing.enabled": true
                        }
                    }
                }
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct WebDriverSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl WebDriverSession {
    /// Creates a new browser session on the driver listening at `driver_url`.
    pub async fn start(driver_url: &str, options: &BrowserOptions) -> Result<Self, BrowserError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| BrowserError::Transport(err.to_string()))?;
        let base_url = driver_url.trim_end_matches('/').to_string();

        let value = send(
            &client,
            Method::POST,
            &format!("{base_url}/session"),
            Some(options.capabilities()),
        )
        .await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::InvalidResponse("new session without sessionId".into()))?
            .to_string();

        harvest_info!("WebDriver session {session_id} started");
        Ok(Self {
            client,
            base_url,
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Ends the session and closes the browser.
    pub async fn quit(self) -> Result<(), BrowserError> {
        self.command(Method::DELETE, "", None).await.map(|_| ())
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, BrowserError> {
        let url = format!("{}/session/{}{}", self.base_url, self.session_id, path);
        send(&self.client, method, &url, body).await
    }

    async fn get(&self, path: &str) -> Result<Value, BrowserError> {
        self.command(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, BrowserError> {
        self.command(Method::POST, path, Some(body)).await
    }
}

#[async_trait::async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        harvest_debug!("navigate {url}");
        self.post("/url", json!({ "url": url })).await.map(|_| ())
    }

    async fn find_all(
        &self,
        scope: Option<&ElementHandle>,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, BrowserError> {
        let (using, value) = locator.strategy();
        let path = match scope {
            Some(element) => format!("/element/{}/elements", element.id()),
            None => "/elements".to_string(),
        };
        let found = self
            .post(&path, json!({ "using": using, "value": value }))
            .await?;
        parse_elements(found)
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        let value = self
            .get(&format!("/element/{}/attribute/{name}", element.id()))
            .await?;
        match value {
            Value::Null => Ok(None),
            Value::String(text) => Ok(Some(text)),
            other => Ok(Some(other.to_string())),
        }
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, BrowserError> {
        let value = self.get(&format!("/element/{}/text", element.id())).await?;
        expect_string(value, "element text")
    }

    async fn rendered_height(&self, element: &ElementHandle) -> Result<u32, BrowserError> {
        let rect = self.get(&format!("/element/{}/rect", element.id())).await?;
        let height = rect
            .get("height")
            .and_then(Value::as_f64)
            .ok_or_else(|| BrowserError::InvalidResponse("element rect without height".into()))?;
        Ok(height.max(0.0).ceil() as u32)
    }

    async fn screenshot(&self, element: &ElementHandle) -> Result<Vec<u8>, BrowserError> {
        let value = self
            .get(&format!("/element/{}/screenshot", element.id()))
            .await?;
        let encoded = expect_string(value, "screenshot")?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|err| {
                BrowserError::InvalidResponse(format!("screenshot is not base64: {err}"))
            })
    }

    async fn send_keys(&self, element: &ElementHandle, keys: &str) -> Result<(), BrowserError> {
        self.post(
            &format!("/element/{}/value", element.id()),
            json!({ "text": keys }),
        )
        .await
        .map(|_| ())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        self.post(&format!("/element/{}/click", element.id()), json!({}))
            .await
            .map(|_| ())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let value = self.get("/url").await?;
        expect_string(value, "current url")
    }

    async fn current_window(&self) -> Result<WindowHandle, BrowserError> {
        let value = self.get("/window").await?;
        expect_string(value, "window handle").map(WindowHandle::new)
    }

    async fn window_handles(&self) -> Result<Vec<WindowHandle>, BrowserError> {
        match self.get("/window/handles").await? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| expect_string(item, "window handle").map(WindowHandle::new))
                .collect(),
            other => Err(BrowserError::InvalidResponse(format!(
                "window handles: {other}"
            ))),
        }
    }

    async fn open_tab(&self) -> Result<WindowHandle, BrowserError> {
        let value = self.post("/window/new", json!({ "type": "tab" })).await?;
        value
            .get("handle")
            .and_then(Value::as_str)
            .map(WindowHandle::new)
            .ok_or_else(|| BrowserError::InvalidResponse("new window without handle".into()))
    }

    async fn switch_to_window(&self, handle: &WindowHandle) -> Result<(), BrowserError> {
        self.post("/window", json!({ "handle": handle.id() }))
            .await
            .map(|_| ())
    }

    async fn close_window(&self) -> Result<(), BrowserError> {
        self.command(Method::DELETE, "/window", None)
            .await
            .map(|_| ())
    }

    async fn window_size(&self) -> Result<(u32, u32), BrowserError> {
        let rect = self.get("/window/rect").await?;
        let dimension = |key: &str| {
            rect.get(key)
                .and_then(Value::as_f64)
                .map(|v| v.max(0.0).round() as u32)
                .ok_or_else(|| BrowserError::InvalidResponse(format!("window rect without {key}")))
        };
        Ok((dimension("width")?, dimension("height")?))
    }

    async fn set_window_size(&self, width: u32, height: u32) -> Result<(), BrowserError> {
        self.post("/window/rect", json!({ "width": width, "height": height }))
            .await
            .map(|_| ())
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.post(
            "/execute/sync",
            json!({ "script": SCROLL_TO_BOTTOM, "args": [] }),
        )
        .await
        .map(|_| ())
    }
}

async fn send(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, BrowserError> {
    let mut request = client.request(method.clone(), url);
    // Drivers reject POSTs without a JSON body.
    if method == Method::POST {
        let payload = serde_json::to_vec(&body.unwrap_or_else(|| json!({})))
            .map_err(|err| BrowserError::InvalidResponse(err.to_string()))?;
        request = request.header(CONTENT_TYPE, "application/json").body(payload);
    }

    let response = request
        .send()
        .await
        .map_err(|err| BrowserError::Transport(err.to_string()))?;
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|err| BrowserError::Transport(err.to_string()))?;

    let envelope: Value = serde_json::from_slice(&bytes).map_err(|err| {
        BrowserError::InvalidResponse(format!("{method} {url} returned {status}: {err}"))
    })?;
    let value = envelope.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() || value.get("error").is_some_and(Value::is_string) {
        return Err(map_protocol_error(&value));
    }
    Ok(value)
}

fn map_protocol_error(value: &Value) -> BrowserError {
    let code = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match code {
        "stale element reference" => BrowserError::StaleElement,
        "no such element" => BrowserError::NoSuchElement(message),
        "no such window" => BrowserError::NoSuchWindow,
        "timeout" | "script timeout" => BrowserError::Timeout(message),
        _ => BrowserError::Protocol {
            code: code.to_string(),
            message,
        },
    }
}

fn parse_elements(value: Value) -> Result<Vec<ElementHandle>, BrowserError> {
    let Value::Array(items) = value else {
        return Err(BrowserError::InvalidResponse(format!(
            "expected element list, got {value}"
        )));
    };
    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(ElementHandle::new)
                .ok_or_else(|| BrowserError::InvalidResponse(format!("not an element: {item}")))
        })
        .collect()
}

fn expect_string(value: Value, what: &str) -> Result<String, BrowserError> {
    match value {
        Value::String(text) => Ok(text),
        other => Err(BrowserError::InvalidResponse(format!("{what}: {other}"))),
    }
}

/// A locally spawned driver executable, killed when dropped.
#[derive(Debug)]
pub struct ChromeDriverProcess {
    child: Child,
    url: String,
}

impl ChromeDriverProcess {
    pub async fn spawn(
        executable: &Path,
        port: u16,
        settings: WaitSettings,
    ) -> Result<Self, BrowserError> {
        let child = Command::new(executable)
            .arg(format!("--port={port}"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                BrowserError::Driver(format!("cannot start {}: {err}", executable.display()))
            })?;
        let url = format!("http://127.0.0.1:{port}");
        wait_until_ready(&url, settings).await?;
        harvest_info!("driver {} ready on port {port}", executable.display());
        Ok(Self { child, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) -> Result<(), BrowserError> {
        self.child
            .kill()
            .await
            .map_err(|err| BrowserError::Driver(err.to_string()))
    }
}

/// Polls the driver's `/status` endpoint until it reports ready.
pub async fn wait_until_ready(
    driver_url: &str,
    settings: WaitSettings,
) -> Result<(), BrowserError> {
    let client = reqwest::Client::builder()
        .timeout(settings.poll_interval.max(Duration::from_millis(500)))
        .build()
        .map_err(|err| BrowserError::Transport(err.to_string()))?;
    let status_url = format!("{}/status", driver_url.trim_end_matches('/'));
    let deadline = Instant::now() + settings.timeout;
    loop {
        if let Ok(value) = send(&client, Method::GET, &status_url, None).await {
            if value.get("ready").and_then(Value::as_bool).unwrap_or(false) {
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            return Err(BrowserError::Timeout(format!("driver at {driver_url}")));
        }
        sleep(settings.poll_interval).await;
    }
}
