//! Minimal W3C WebDriver client
//!
//! Covers the commands the portal session needs: navigation, element lookup
//! and interaction, window switching and script execution. Every request
//! goes to `<webdriver_url>/session/<id>/...` and the driver's `value`
//! payload is returned as JSON.

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::BrowserError;
use crate::{Error, Result};

/// Key under which W3C drivers return element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecc";

/// Interval between polls while waiting on the page
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How to find an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// CSS selector
    Css(String),
    /// XPath expression
    XPath(String),
}

impl Locator {
    /// CSS selector locator
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    /// XPath locator
    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }

    /// Elements of any kind whose normalized text is exactly `text`
    pub fn exact_text(text: &str) -> Self {
        let literal = xpath_literal(text);
        // innermost match only, so clicks land on the element carrying the text
        Locator::XPath(format!(
            "//*[normalize-space(.)={0}][not(*[normalize-space(.)={0}])]",
            literal
        ))
    }

    /// Buttons whose text contains `text`
    pub fn button_containing(text: &str) -> Self {
        Locator::XPath(format!(
            "//button[contains(normalize-space(.), {})]",
            xpath_literal(text)
        ))
    }

    fn strategy(&self) -> &'static str {
        match self {
            Locator::Css(_) => "css selector",
            Locator::XPath(_) => "xpath",
        }
    }

    fn value(&self) -> &str {
        match self {
            Locator::Css(s) | Locator::XPath(s) => s,
        }
    }

    fn to_json(&self) -> Value {
        json!({ "using": self.strategy(), "value": self.value() })
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.value())
    }
}

/// Quote `text` as an XPath string literal
///
/// XPath 1.0 has no escape sequences, so text containing both quote kinds
/// is assembled with `concat()`.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    if !text.contains('"') {
        return format!("\"{}\"", text);
    }
    let parts: Vec<String> = text
        .split('\'')
        .map(|part| format!("'{}'", part))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Reference to an element in the remote page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(String);

impl ElementRef {
    /// Driver-assigned element id
    pub fn id(&self) -> &str {
        &self.0
    }

    fn from_value(value: &Value) -> Option<Self> {
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| ElementRef(id.to_string()))
    }

    fn to_json(&self) -> Value {
        json!({ ELEMENT_KEY: self.0 })
    }
}

#[derive(Debug, Deserialize)]
struct DriverError {
    error: String,
    #[serde(default)]
    message: String,
}

/// Client bound to one WebDriver session
#[derive(Debug, Clone)]
pub struct WebDriverClient {
    http: reqwest::Client,
    base: String,
    session_id: String,
    poll_interval: Duration,
}

impl WebDriverClient {
    /// Create a new session with the given `alwaysMatch` capabilities
    pub async fn new_session(
        http: reqwest::Client,
        webdriver_url: &str,
        capabilities: Value,
    ) -> Result<Self> {
        let base = webdriver_url.trim_end_matches('/').to_string();
        let body = json!({ "capabilities": { "alwaysMatch": capabilities } });

        let response = http
            .post(format!("{}/session", base))
            .json(&body)
            .send()
            .await
            .map_err(|e| BrowserError::SessionStart(format!("{}: {}", base, e)))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| BrowserError::SessionStart(format!("unreadable response: {}", e)))?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if !status.is_success() {
            let message = serde_json::from_value::<DriverError>(value)
                .map(|e| format!("{}: {}", e.error, e.message))
                .unwrap_or_else(|_| format!("HTTP {}", status));
            return Err(BrowserError::SessionStart(message).into());
        }

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::SessionStart("response has no sessionId".to_string()))?
            .to_string();

        tracing::debug!(session_id = %session_id, "webdriver session created");

        Ok(Self {
            http,
            base,
            session_id,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Override the interval used by the polling waits
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Driver-assigned session id
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}/session/{}{}", self.base, self.session_id, path);
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let payload: Value = response.json().await?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(value);
        }

        let message = serde_json::from_value::<DriverError>(value)
            .map(|e| format!("{}: {}", e.error, e.message))
            .unwrap_or_else(|_| format!("HTTP {}", status));
        Err(BrowserError::Command {
            command: path.trim_start_matches('/').to_string(),
            message,
        }
        .into())
    }

    /// Load `url` in the current window
    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    /// URL of the current window
    pub async fn current_url(&self) -> Result<String> {
        let value = self.command(Method::GET, "/url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// HTML of the current page
    pub async fn page_source(&self) -> Result<String> {
        let value = self.command(Method::GET, "/source", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// First element matching `locator`, if any
    pub async fn find(&self, locator: &Locator) -> Result<Option<ElementRef>> {
        Ok(self.find_all(locator).await?.into_iter().next())
    }

    /// Every element matching `locator`
    pub async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>> {
        let value = self
            .command(Method::POST, "/elements", Some(locator.to_json()))
            .await?;
        Ok(elements_from(&value))
    }

    /// Every descendant of `parent` matching `locator`
    ///
    /// XPath locators must be relative (`.//...`) to stay inside the parent.
    pub async fn find_within(&self, parent: &ElementRef, locator: &Locator) -> Result<Vec<ElementRef>> {
        let value = self
            .command(
                Method::POST,
                &format!("/element/{}/elements", parent.id()),
                Some(locator.to_json()),
            )
            .await?;
        Ok(elements_from(&value))
    }

    /// Click an element
    pub async fn click(&self, element: &ElementRef) -> Result<()> {
        self.command(
            Method::POST,
            &format!("/element/{}/click", element.id()),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    /// Clear an input or editable element
    pub async fn clear(&self, element: &ElementRef) -> Result<()> {
        self.command(
            Method::POST,
            &format!("/element/{}/clear", element.id()),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    /// Type text into an element
    pub async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()> {
        self.command(
            Method::POST,
            &format!("/element/{}/value", element.id()),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    /// Replace an element's contents with `text`
    pub async fn fill(&self, element: &ElementRef, text: &str) -> Result<()> {
        self.clear(element).await?;
        self.send_keys(element, text).await
    }

    /// Value of an element attribute
    pub async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        let value = self
            .command(
                Method::GET,
                &format!("/element/{}/attribute/{}", element.id(), name),
                None,
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    /// Rendered text of an element
    pub async fn text(&self, element: &ElementRef) -> Result<String> {
        let value = self
            .command(Method::GET, &format!("/element/{}/text", element.id()), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Whether an element is visible
    pub async fn is_displayed(&self, element: &ElementRef) -> Result<bool> {
        let value = self
            .command(
                Method::GET,
                &format!("/element/{}/displayed", element.id()),
                None,
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Whether a checkbox or radio button is checked
    pub async fn is_selected(&self, element: &ElementRef) -> Result<bool> {
        let value = self
            .command(
                Method::GET,
                &format!("/element/{}/selected", element.id()),
                None,
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Handle of the current window
    pub async fn window_handle(&self) -> Result<String> {
        let value = self.command(Method::GET, "/window", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Handles of every open window
    pub async fn window_handles(&self) -> Result<Vec<String>> {
        let value = self.command(Method::GET, "/window/handles", None).await?;
        Ok(value
            .as_array()
            .map(|handles| {
                handles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Make `handle` the current window
    pub async fn switch_to_window(&self, handle: &str) -> Result<()> {
        self.command(Method::POST, "/window", Some(json!({ "handle": handle })))
            .await?;
        Ok(())
    }

    /// Run a synchronous script in the page
    pub async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    /// End the session and close its windows
    pub async fn delete_session(&self) -> Result<()> {
        let url = format!("{}/session/{}", self.base, self.session_id);
        self.http.delete(&url).send().await?;
        tracing::debug!(session_id = %self.session_id, "webdriver session deleted");
        Ok(())
    }

    /// Poll until a visible element matches `locator`
    pub async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<ElementRef> {
        self.probe(locator, timeout).await?.ok_or_else(|| {
            Error::Browser(BrowserError::ElementNotFound {
                selector: locator.to_string(),
            })
        })
    }

    /// Like [`wait_for`](Self::wait_for), but absence is `None` rather than an error
    pub async fn probe(&self, locator: &Locator, timeout: Duration) -> Result<Option<ElementRef>> {
        let deadline = Instant::now() + timeout;
        loop {
            for element in self.find_all(locator).await? {
                if self.is_displayed(&element).await.unwrap_or(false) {
                    return Ok(Some(element));
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Poll until the current URL contains `fragment`
    pub async fn wait_for_url(&self, fragment: &str, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        loop {
            let url = self.current_url().await?;
            if url.contains(fragment) {
                return Ok(url);
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    what: format!("URL containing {} (at {})", fragment, url),
                    seconds: timeout.as_secs(),
                }
                .into());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Poll until the document has finished parsing
    pub async fn wait_until_loaded(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self
                .execute("return document.readyState;", Vec::new())
                .await?;
            if matches!(state.as_str(), Some("interactive") | Some("complete")) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    what: "page load".to_string(),
                    seconds: timeout.as_secs(),
                }
                .into());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Poll until a window not in `known` appears, returning its handle
    pub async fn wait_for_new_window(&self, known: &[String], timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(handle) = self
                .window_handles()
                .await?
                .into_iter()
                .find(|h| !known.contains(h))
            {
                return Ok(handle);
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    what: "new window".to_string(),
                    seconds: timeout.as_secs(),
                }
                .into());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn elements_from(value: &Value) -> Vec<ElementRef> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(ElementRef::from_value).collect())
        .unwrap_or_default()
}
