//! The portal and database-site flow over WebDriver

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{BrowserConfig, PortalConfig, StepTimeouts};
use crate::error::BrowserError;
use crate::workflow::{
    ExportLimitHints, ExportSession, SessionFactory, StepError, StepResult,
};
use crate::{Error, Result};

use super::client::{DEFAULT_POLL_INTERVAL, ElementRef, Locator, WebDriverClient};
use super::download::{move_into_place, snapshot, wait_for_download};

const EMAIL_INPUT: &str = "#ContentPlaceHolder1_txtEmail";
const EMAIL_SUBMIT: &str = "#ContentPlaceHolder1_btnaaddemail";
const CONTINUE_BUTTON_TEXT: &str = "Continue to site";
const INSECURE_WARNING_TEXT: &str = "doesn't support a secure connection";
const SEARCH_FIELD: &str = "div#searchfield[contenteditable='true']";
const ADVANCED_SEARCH_LINK: &str = "Advanced document search";
const SEARCH_BUTTON: &str = "button#advSearch";
const NO_RESULTS_MARKER: &str = "[data-testid=\"no-results-message\"]";
const NO_RESULTS_TEXTS: [&str; 2] = ["no documents were found", "no results found"];
const SEARCH_ERROR_TEXTS: [&str; 3] = [
    "invalid search query",
    "there was a problem with your search",
    "unable to complete your search",
];
const EXPORT_BUTTON: &str = "button[data-testid=\"export-results-button\"], button#export_results";
const EXPORT_DIALOG: &str = "section[role=\"document\"]";
const RANGE_RADIO: &str = "input#select-range[data-testid=\"radio-button-input\"]";
const RANGE_FROM: &str = "input[data-testid=\"input-range-from\"]";
const RANGE_TO: &str = "input[data-testid=\"input-range-to\"]";
const EXPORT_SUBMIT: &str = "button[data-testid=\"submit-export-button\"]";
const EXPORT_HINT_TEXT: &str = "You can export up to";

/// Chrome capabilities for a harvesting session
pub fn chrome_capabilities(config: &BrowserConfig, download_dir: &Path) -> Value {
    let mut args = vec!["--window-size=1366,900".to_string()];
    if config.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    if let Some(agent) = &config.user_agent {
        args.push(format!("--user-agent={}", agent));
    }

    json!({
        "browserName": "chrome",
        "acceptInsecureCerts": config.accept_insecure_certs,
        "goog:chromeOptions": {
            "args": args,
            "prefs": {
                "download.default_directory": download_dir.display().to_string(),
                "download.prompt_for_download": false,
                "download.directory_upgrade": true,
                "safebrowsing.enabled": true
            }
        }
    })
}

/// Starts Chrome sessions through a WebDriver endpoint
///
/// Each session downloads into its own subdirectory of the configured
/// download directory, which must be visible to both the browser and this
/// process.
pub struct WebDriverSessionFactory {
    http: reqwest::Client,
    browser: BrowserConfig,
    portal: PortalConfig,
}

impl WebDriverSessionFactory {
    /// Create a factory, validating the WebDriver URL
    pub fn new(browser: BrowserConfig, portal: PortalConfig) -> Result<Self> {
        url::Url::parse(&browser.webdriver_url).map_err(|e| Error::Config {
            message: format!("invalid webdriver URL {}: {}", browser.webdriver_url, e),
            key: Some("browser.webdriver_url".to_string()),
        })?;

        let http = reqwest::Client::builder()
            .timeout(browser.timeouts.navigation + browser.timeouts.element)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            browser,
            portal,
        })
    }

    fn session_download_dir(&self) -> Result<PathBuf> {
        let base = std::path::absolute(&self.browser.download_dir)?;
        Ok(base.join(format!(
            "session_{}_{:08x}",
            chrono::Utc::now().timestamp(),
            rand::random::<u32>()
        )))
    }
}

#[async_trait]
impl SessionFactory for WebDriverSessionFactory {
    async fn start(&self) -> Result<Box<dyn ExportSession>> {
        let download_dir = self.session_download_dir()?;
        tokio::fs::create_dir_all(&download_dir).await.map_err(|e| {
            BrowserError::SessionStart(format!(
                "cannot create download directory {}: {}",
                download_dir.display(),
                e
            ))
        })?;

        let capabilities = chrome_capabilities(&self.browser, &download_dir);
        let client = match WebDriverClient::new_session(
            self.http.clone(),
            &self.browser.webdriver_url,
            capabilities,
        )
        .await
        {
            Ok(client) => client,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&download_dir).await;
                return Err(e);
            }
        };

        Ok(Box::new(PortalSession::new(
            client,
            self.portal.clone(),
            self.browser.timeouts.clone(),
            download_dir,
        )))
    }

    fn name(&self) -> &'static str {
        "webdriver-chrome"
    }
}

/// One browser session walking the portal into the database site
pub struct PortalSession {
    client: WebDriverClient,
    portal: PortalConfig,
    timeouts: StepTimeouts,
    download_dir: PathBuf,
    dialog: Option<ElementRef>,
}

impl PortalSession {
    /// Wrap an open WebDriver session
    pub fn new(
        client: WebDriverClient,
        portal: PortalConfig,
        timeouts: StepTimeouts,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            client,
            portal,
            timeouts,
            download_dir,
            dialog: None,
        }
    }

    async fn click(&self, locator: &Locator, timeout: Duration) -> Result<()> {
        let element = self.client.wait_for(locator, timeout).await?;
        self.client.click(&element).await
    }

    /// Click through the "Continue to site" interstitial and wait for `fragment`
    async fn continue_to(&self, fragment: &str) -> Result<()> {
        self.click(
            &Locator::button_containing(CONTINUE_BUTTON_TEXT),
            self.timeouts.element,
        )
        .await?;
        self.client
            .wait_for_url(fragment, self.timeouts.navigation)
            .await?;
        Ok(())
    }

    async fn within(&self, dialog: &ElementRef, selector: &str) -> Result<Option<ElementRef>> {
        Ok(self
            .client
            .find_within(dialog, &Locator::css(selector))
            .await?
            .into_iter()
            .next())
    }

    async fn export_dialog(&self) -> Result<ElementRef> {
        let deadline = tokio::time::Instant::now() + self.timeouts.element;
        loop {
            if let Some(dialog) = self
                .client
                .find_all(&Locator::css(EXPORT_DIALOG))
                .await?
                .pop()
            {
                if self.client.is_displayed(&dialog).await? {
                    return Ok(dialog);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::ElementNotFound {
                    selector: EXPORT_DIALOG.to_string(),
                }
                .into());
            }
            tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
        }
    }

    async fn read_hints(&self, dialog: &ElementRef) -> Result<ExportLimitHints> {
        let title = match self.within(dialog, "h1").await? {
            Some(h1) => Some(self.client.text(&h1).await?),
            None => None,
        };
        let max_attribute = match self.within(dialog, RANGE_TO).await? {
            Some(input) => self.client.attribute(&input, "max").await?,
            None => None,
        };
        let hint_locator = Locator::xpath(format!(
            ".//*[contains(normalize-space(.), '{}')]",
            EXPORT_HINT_TEXT
        ));
        let hint = match self
            .client
            .find_within(dialog, &hint_locator)
            .await?
            .pop()
        {
            Some(element) => Some(self.client.text(&element).await?),
            None => None,
        };

        Ok(ExportLimitHints {
            title,
            max_attribute,
            hint,
        })
    }
}

#[async_trait]
impl ExportSession for PortalSession {
    async fn reach_portal(&mut self) -> StepResult<()> {
        self.client.navigate(&self.portal.entry_url).await.map_err(step_error)?;

        let url = self.client.current_url().await.map_err(step_error)?;
        if !url.contains(&self.portal.email_page_fragment) {
            tracing::debug!(url = %url, "not on the email gate, looking for an interstitial");
            let button = self
                .client
                .probe(
                    &Locator::button_containing(CONTINUE_BUTTON_TEXT),
                    self.timeouts.probe,
                )
                .await
                .map_err(step_error)?;
            if button.is_some() {
                self.continue_to(&self.portal.email_page_fragment)
                    .await
                    .map_err(|e| {
                        tracing::warn!(error = %e, "portal interstitial could not be passed");
                        StepError::Rejected(
                            "Portal entry failed (continue button).".to_string(),
                        )
                    })?;
            }
        }

        self.client
            .wait_for_url(&self.portal.email_page_fragment, self.timeouts.navigation)
            .await
            .map_err(step_error)?;
        Ok(())
    }

    async fn submit_email(&mut self, email: &str) -> StepResult<()> {
        let input = self
            .client
            .wait_for(&Locator::css(EMAIL_INPUT), self.timeouts.element)
            .await
            .map_err(step_error)?;
        self.client.fill(&input, email).await.map_err(step_error)?;
        self.click(&Locator::css(EMAIL_SUBMIT), self.timeouts.element)
            .await
            .map_err(step_error)?;
        self.client
            .wait_until_loaded(self.timeouts.navigation)
            .await
            .map_err(step_error)?;

        let url = self.client.current_url().await.map_err(step_error)?;
        if !url.contains(&self.portal.search_page_fragment) {
            let source = self.client.page_source().await.map_err(step_error)?;
            if source.contains(INSECURE_WARNING_TEXT) && source.contains(CONTINUE_BUTTON_TEXT) {
                tracing::info!("passing the portal's insecure-connection warning");
                self.continue_to(&self.portal.search_page_fragment)
                    .await
                    .map_err(|e| {
                        tracing::warn!(error = %e, "security warning could not be passed");
                        StepError::Rejected(
                            "Portal search page unreachable (continue button).".to_string(),
                        )
                    })?;
            }
        }

        self.client
            .wait_for_url(&self.portal.search_page_fragment, self.timeouts.navigation)
            .await
            .map_err(step_error)?;
        Ok(())
    }

    async fn open_database(&mut self) -> StepResult<()> {
        self.click(
            &Locator::exact_text(&self.portal.citation_section_text),
            self.timeouts.element,
        )
        .await
        .map_err(step_error)?;

        let known = self.client.window_handles().await.map_err(step_error)?;
        self.click(
            &Locator::exact_text(&self.portal.database_link_text),
            self.timeouts.element,
        )
        .await
        .map_err(step_error)?;

        let handle = self
            .client
            .wait_for_new_window(&known, self.timeouts.navigation)
            .await
            .map_err(step_error)?;
        self.client
            .switch_to_window(&handle)
            .await
            .map_err(step_error)?;
        self.client
            .wait_until_loaded(self.timeouts.navigation)
            .await
            .map_err(step_error)?;

        let landed = self.client.current_url().await.unwrap_or_default();
        tracing::debug!(url = %landed, "switched to database window");
        Ok(())
    }

    async fn search(&mut self, query: &str) -> StepResult<()> {
        let field = Locator::css(SEARCH_FIELD);
        if self
            .client
            .probe(&field, self.timeouts.probe)
            .await
            .map_err(step_error)?
            .is_none()
        {
            let link = Locator::exact_text(ADVANCED_SEARCH_LINK);
            match self.click(&link, self.timeouts.element).await {
                Ok(()) => {
                    self.client
                        .wait_until_loaded(self.timeouts.navigation)
                        .await
                        .map_err(step_error)?;
                }
                Err(e) => tracing::warn!(error = %e, "advanced search link not clickable"),
            }
        }

        let input = self
            .client
            .probe(&field, self.timeouts.element)
            .await
            .map_err(step_error)?
            .ok_or_else(|| StepError::Rejected("Scopus search form not available.".into()))?;
        self.client.click(&input).await.map_err(step_error)?;
        self.client.fill(&input, query).await.map_err(step_error)?;

        self.click(&Locator::css(SEARCH_BUTTON), self.timeouts.element)
            .await
            .map_err(step_error)?;
        self.client
            .wait_until_loaded(self.timeouts.search)
            .await
            .map_err(step_error)?;

        let source = self
            .client
            .page_source()
            .await
            .map_err(step_error)?
            .to_lowercase();
        if let Some(text) = SEARCH_ERROR_TEXTS.iter().find(|text| source.contains(*text)) {
            return Err(StepError::Rejected(format!(
                "Scopus refused the search: {}",
                text
            )));
        }
        Ok(())
    }

    async fn has_results(&mut self) -> StepResult<bool> {
        if self
            .client
            .probe(&Locator::css(NO_RESULTS_MARKER), self.timeouts.probe)
            .await
            .map_err(step_error)?
            .is_some()
        {
            return Ok(false);
        }

        let source = self
            .client
            .page_source()
            .await
            .map_err(step_error)?
            .to_lowercase();
        Ok(!NO_RESULTS_TEXTS.iter().any(|text| source.contains(text)))
    }

    async fn open_export_dialog(&mut self) -> StepResult<ExportLimitHints> {
        self.click(&Locator::css(EXPORT_BUTTON), self.timeouts.element)
            .await
            .map_err(step_error)?;
        self.click(&Locator::exact_text("CSV"), self.timeouts.element)
            .await
            .map_err(step_error)?;

        let dialog = self.export_dialog().await.map_err(step_error)?;
        let radio = self
            .within(&dialog, RANGE_RADIO)
            .await
            .map_err(step_error)?
            .ok_or_else(|| StepError::Rejected("Export dialog has no document range option.".into()))?;
        if !self.client.is_selected(&radio).await.map_err(step_error)? {
            self.client.click(&radio).await.map_err(step_error)?;
        }

        let hints = self.read_hints(&dialog).await.map_err(step_error)?;
        self.dialog = Some(dialog);
        Ok(hints)
    }

    async fn configure_export(&mut self, range_end: u32, categories: &[String]) -> StepResult<()> {
        let dialog = self
            .dialog
            .clone()
            .ok_or_else(|| StepError::Unexpected("export dialog is not open".into()))?;

        for (selector, value) in [(RANGE_FROM, "1".to_string()), (RANGE_TO, range_end.to_string())] {
            let input = self
                .within(&dialog, selector)
                .await
                .map_err(step_error)?
                .ok_or_else(|| StepError::Rejected(format!("Export range field {} missing.", selector)))?;
            self.client.fill(&input, &value).await.map_err(step_error)?;
        }

        for category in categories {
            let checkbox = Locator::xpath(format!(
                ".//label[.//span[normalize-space(.)={}]]//input[@type='checkbox']",
                super::client::xpath_literal(category)
            ));
            let Some(input) = self
                .client
                .find_within(&dialog, &checkbox)
                .await
                .map_err(step_error)?
                .into_iter()
                .next()
            else {
                tracing::debug!(category = %category, "export category not offered");
                continue;
            };
            if self.client.is_displayed(&input).await.map_err(step_error)?
                && !self.client.is_selected(&input).await.map_err(step_error)?
            {
                self.client.click(&input).await.map_err(step_error)?;
            }
        }
        Ok(())
    }

    async fn download(&mut self, destination: &Path) -> StepResult<()> {
        let dialog = self
            .dialog
            .clone()
            .ok_or_else(|| StepError::Unexpected("export dialog is not open".into()))?;

        let known = snapshot(&self.download_dir).await?;
        let submit = self
            .within(&dialog, EXPORT_SUBMIT)
            .await
            .map_err(step_error)?
            .ok_or_else(|| StepError::Rejected("Export dialog has no submit button.".into()))?;
        self.client.click(&submit).await.map_err(step_error)?;

        let downloaded = wait_for_download(
            &self.download_dir,
            &known,
            self.timeouts.download,
            DEFAULT_POLL_INTERVAL,
        )
        .await
        .map_err(step_error)?;

        move_into_place(&downloaded, destination)
            .await
            .map_err(|e| StepError::Rejected(format!("Failed to save export: {}", e)))?;
        Ok(())
    }

    async fn current_url(&mut self) -> Option<String> {
        self.client.current_url().await.ok()
    }

    async fn close(&mut self) {
        if let Err(e) = self.client.delete_session().await {
            tracing::warn!(error = %e, "failed to end browser session");
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.download_dir).await {
            tracing::debug!(
                path = %self.download_dir.display(),
                error = %e,
                "download directory not removed"
            );
        }
    }
}

/// Map a client error onto the workflow's step error
fn step_error(e: Error) -> StepError {
    match e {
        Error::Browser(browser) => browser.into(),
        Error::Network(e) if e.is_timeout() => StepError::Timeout(e.to_string()),
        other => StepError::Unexpected(other.to_string()),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IdentifierStatus;
    use crate::workflow::ExportStep;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ELEMENT: &str = "element-6066-11e4-a52e-4f735466cecc";

    fn value(v: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "value": v }))
    }

    /// Session against `server` with short waits; every locator finds `e1`
    /// unless `elements` overrides it
    async fn session_on(server: &MockServer, elements: Value) -> PortalSession {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(value(json!({ "sessionId": "s-1", "capabilities": {} })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s-1/elements"))
            .respond_with(value(elements))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/s-1/element/e1/displayed"))
            .respond_with(value(json!(true)))
            .mount(server)
            .await;
        for action in ["click", "clear", "value"] {
            Mock::given(method("POST"))
                .and(path(format!("/session/s-1/element/e1/{}", action)))
                .respond_with(value(Value::Null))
                .mount(server)
                .await;
        }
        Mock::given(method("POST"))
            .and(path("/session/s-1/execute/sync"))
            .respond_with(value(json!("complete")))
            .mount(server)
            .await;

        let client = WebDriverClient::new_session(reqwest::Client::new(), &server.uri(), json!({}))
            .await
            .unwrap()
            .with_poll_interval(Duration::from_millis(10));
        let timeouts = StepTimeouts {
            navigation: Duration::from_millis(500),
            element: Duration::from_millis(50),
            search: Duration::from_millis(500),
            download: Duration::from_millis(500),
            probe: Duration::from_millis(20),
        };
        PortalSession::new(
            client,
            PortalConfig::default(),
            timeouts,
            std::env::temp_dir().join("portal_session_unused"),
        )
    }

    #[test]
    fn capabilities_carry_download_dir_and_agent() {
        let config = BrowserConfig {
            user_agent: Some("HarvesterAgent/1.0".into()),
            ..BrowserConfig::default()
        };
        let caps = chrome_capabilities(&config, Path::new("/srv/downloads/session_1"));

        assert_eq!(caps["browserName"], "chrome");
        assert_eq!(caps["acceptInsecureCerts"], true);
        let options = &caps["goog:chromeOptions"];
        assert_eq!(
            options["prefs"]["download.default_directory"],
            "/srv/downloads/session_1"
        );
        let args: Vec<&str> = options["args"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a.as_str().unwrap())
            .collect();
        assert!(args.contains(&"--headless=new"));
        assert!(args.contains(&"--user-agent=HarvesterAgent/1.0"));
    }

    #[test]
    fn headful_sessions_skip_headless_flag() {
        let config = BrowserConfig {
            headless: false,
            ..BrowserConfig::default()
        };
        let caps = chrome_capabilities(&config, Path::new("/tmp/d"));
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(!args.iter().any(|a| a == "--headless=new"));
    }

    #[test]
    fn factory_rejects_invalid_url() {
        let config = BrowserConfig {
            webdriver_url: "not a url".into(),
            ..BrowserConfig::default()
        };
        let err = WebDriverSessionFactory::new(config, PortalConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn unreachable_driver_fails_to_start_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let config = BrowserConfig {
            webdriver_url: "http://127.0.0.1:1".into(),
            download_dir: dir.path().to_path_buf(),
            ..BrowserConfig::default()
        };
        let factory = WebDriverSessionFactory::new(config, PortalConfig::default()).unwrap();

        let err = factory.start().await.err().unwrap();
        assert!(matches!(err, Error::Browser(BrowserError::SessionStart(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn started_session_reports_url_and_closes() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "s-9", "capabilities": {} }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/s-9/url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": "https://www.scopus.com/search/form.uri"
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/session/s-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
            .expect(1)
            .mount(&server)
            .await;

        let config = BrowserConfig {
            webdriver_url: server.uri(),
            download_dir: dir.path().to_path_buf(),
            ..BrowserConfig::default()
        };
        let factory = WebDriverSessionFactory::new(config, PortalConfig::default()).unwrap();
        let mut session = factory.start().await.unwrap();

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(
            session.current_url().await.as_deref(),
            Some("https://www.scopus.com/search/form.uri")
        );
        session.close().await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn client_errors_map_onto_step_errors() {
        let timeout = step_error(Error::Browser(BrowserError::Timeout {
            what: "page load".into(),
            seconds: 60,
        }));
        assert!(matches!(timeout, StepError::Timeout(_)));

        let other = step_error(Error::Other("boom".into()));
        assert_eq!(other, StepError::Unexpected("boom".into()));
    }

    #[tokio::test]
    async fn open_database_follows_the_new_window() {
        let server = MockServer::start().await;
        let session = session_on(&server, json!([{ ELEMENT: "e1" }])).await;

        Mock::given(method("GET"))
            .and(path("/session/s-1/window/handles"))
            .respond_with(value(json!(["portal"])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/s-1/window/handles"))
            .respond_with(value(json!(["portal", "scopus"])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s-1/window"))
            .and(body_json(json!({ "handle": "scopus" })))
            .respond_with(value(Value::Null))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/s-1/url"))
            .respond_with(value(json!("https://www.scopus.com/search/form.uri")))
            .mount(&server)
            .await;

        // Sessions are driven from worker tasks
        let mut session: Box<dyn ExportSession> = Box::new(session);
        let result = tokio::spawn(async move { session.open_database().await })
            .await
            .unwrap();
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn search_error_page_is_rejected() {
        let server = MockServer::start().await;
        let mut session = session_on(&server, json!([{ ELEMENT: "e1" }])).await;
        Mock::given(method("GET"))
            .and(path("/session/s-1/source"))
            .respond_with(value(json!(
                "<html><body><h2>There was a problem with your search</h2></body></html>"
            )))
            .mount(&server)
            .await;

        let err = session.search("ISSN(01426001)").await.unwrap_err();
        assert!(matches!(err, StepError::Rejected(ref m) if m.contains("problem with your search")));
        assert_eq!(
            ExportStep::Search.failure_status(),
            IdentifierStatus::ScopusSearchError
        );
    }

    #[tokio::test]
    async fn missing_search_form_is_rejected() {
        let server = MockServer::start().await;
        let mut session = session_on(&server, json!([])).await;

        let err = session.search("ISSN(01426001)").await.unwrap_err();
        assert_eq!(
            err,
            StepError::Rejected("Scopus search form not available.".into())
        );
    }

    #[tokio::test]
    async fn plain_results_page_passes_search() {
        let server = MockServer::start().await;
        let mut session = session_on(&server, json!([{ ELEMENT: "e1" }])).await;
        Mock::given(method("GET"))
            .and(path("/session/s-1/source"))
            .respond_with(value(json!("<html><body>1,204 documents found</body></html>")))
            .mount(&server)
            .await;

        assert_eq!(session.search("ISSN(01426001)").await, Ok(()));
    }
}
