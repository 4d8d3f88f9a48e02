//! [`Browser`] over the W3C WebDriver HTTP protocol (chromedriver, Selenium).

use std::{
    path::Path,
    time::Duration,
};

use base64::Engine;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::time::Instant;

use super::browser::{Browser, BrowserError};

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const IDLE_PROBE: &str = "return [document.readyState, document.getElementsByTagName('*').length];";

pub struct WebDriverBrowser {
    http: reqwest::Client,
    session_url: String,
    poll: Duration,
}

impl WebDriverBrowser {
    /// Opens a new Chrome session on the WebDriver server at `webdriver_url`.
    pub async fn start(webdriver_url: &str, headless: bool) -> Result<Self, BrowserError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(transport)?;

        let mut args = vec!["--window-size=1920,1080", "--disable-dev-shm-usage"];
        if headless {
            args.extend(["--headless=new", "--no-sandbox"]);
        }
        let caps = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });

        let base = webdriver_url.trim_end_matches('/');
        let value = send(&http, Method::POST, &format!("{base}/session"), Some(caps)).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Command("session response without sessionId".to_string()))?;

        tracing::info!(session = session_id, headless, "webdriver session started");
        Ok(Self {
            http,
            session_url: format!("{base}/session/{session_id}"),
            poll: Duration::from_millis(250),
        })
    }

    /// Ends the session; the browser process is closed by the driver.
    pub async fn quit(&self) -> Result<(), BrowserError> {
        self.command(Method::DELETE, "", None).await.map(|_| ())
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        send(&self.http, method, &format!("{}{path}", self.session_url), body).await
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<String>, BrowserError> {
        let value = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;

        Ok(value
            .as_array()
            .map(|els| {
                els.iter()
                    .filter_map(|e| e.get(ELEMENT_KEY).and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn nth(&self, selector: &str, index: usize) -> Result<String, BrowserError> {
        self.find_all(selector)
            .await?
            .into_iter()
            .nth(index)
            .ok_or_else(|| BrowserError::NoSuchElement(selector.to_string()))
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        self.command(Method::POST, "/execute/sync", Some(json!({ "script": script, "args": args })))
            .await
    }
}

fn transport(e: reqwest::Error) -> BrowserError {
    BrowserError::Transport(e.to_string())
}

fn element_ref(id: &str) -> Value {
    json!({ ELEMENT_KEY: id })
}

/// Issues one WebDriver call and unwraps its `value` member.
async fn send(http: &reqwest::Client, method: Method, url: &str, body: Option<Value>) -> Result<Value, BrowserError> {
    let mut req = http.request(method, url);
    if let Some(body) = body {
        req = req.json(&body);
    }

    let resp = req.send().await.map_err(transport)?;
    let status = resp.status();
    let mut payload: Value = resp.json().await.map_err(transport)?;
    let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
    Err(BrowserError::Command(format!("{status} {error}: {message}")))
}

#[async_trait::async_trait]
impl Browser for WebDriverBrowser {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        tracing::debug!(url, "navigate");
        self.command(Method::POST, "/url", Some(json!({ "url": url }))).await?;
        Ok(())
    }

    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> Result<bool, BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.find_all(selector).await?.is_empty() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                tracing::debug!(selector, ?timeout, "element wait timed out");
                return Ok(false);
            }
            tokio::time::sleep(self.poll).await;
        }
    }

    async fn read_subtree(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        let Some(id) = self.find_all(selector).await?.into_iter().next() else {
            return Ok(None);
        };
        let html = self
            .execute("return arguments[0].outerHTML;", vec![element_ref(&id)])
            .await?;
        Ok(html.as_str().map(str::to_string))
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<(), BrowserError> {
        let id = self.nth(selector, index).await?;
        let native = self
            .command(Method::POST, &format!("/element/{id}/click"), Some(json!({})))
            .await;

        if let Err(e) = native {
            // Overlays and off-screen anchors reject native clicks.
            tracing::debug!(error = %e, selector, "native click rejected; dispatching from script");
            self.execute("arguments[0].click();", vec![element_ref(&id)]).await?;
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let id = self.nth(selector, 0).await?;
        self.command(Method::POST, &format!("/element/{id}/clear"), Some(json!({})))
            .await?;
        self.command(Method::POST, &format!("/element/{id}/value"), Some(json!({ "text": value })))
            .await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let value = self.command(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Command("url response is not a string".to_string()))
    }

    /// Loaded document whose element count held steady across two polls.
    async fn wait_for_idle(&self, timeout: Duration) -> Result<bool, BrowserError> {
        let deadline = Instant::now() + timeout;
        let mut last_count: Option<u64> = None;

        loop {
            let probe = self.execute(IDLE_PROBE, Vec::new()).await?;
            let complete = probe.get(0).and_then(Value::as_str) == Some("complete");
            let count = probe.get(1).and_then(Value::as_u64);

            if complete && count.is_some() && count == last_count {
                return Ok(true);
            }
            last_count = if complete { count } else { None };

            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.poll).await;
        }
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| BrowserError::Command("screenshot response is not a string".to_string()))?;
        let png = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| BrowserError::Command(format!("invalid screenshot payload: {e}")))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, png).await?;
        Ok(())
    }
}
