//! Configuration types for scopus-harvester

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Environment variable overriding [`VpnConfig::username`]
pub const ENV_VPN_USERNAME: &str = "SCOPUS_HARVESTER_VPN_USERNAME";
/// Environment variable overriding [`VpnConfig::password`]
pub const ENV_VPN_PASSWORD: &str = "SCOPUS_HARVESTER_VPN_PASSWORD";
/// Environment variable overriding [`PortalConfig::operator_email`]
pub const ENV_OPERATOR_EMAIL: &str = "SCOPUS_HARVESTER_OPERATOR_EMAIL";
/// Environment variable overriding [`BrowserConfig::webdriver_url`]
pub const ENV_WEBDRIVER_URL: &str = "SCOPUS_HARVESTER_WEBDRIVER_URL";
/// Environment variable overriding [`ApiConfig::api_key`]
pub const ENV_API_KEY: &str = "SCOPUS_HARVESTER_API_KEY";

/// Upper bound on [`RetryConfig::max_attempts`]
pub const MAX_RETRY_ATTEMPTS: u32 = 1;

/// Main configuration for the harvester
///
/// Every section has working defaults except the operator email and VPN
/// credentials, which are site-specific and usually supplied through the
/// environment (see [`Config::apply_env_overrides`]).
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// VPN gate settings
    #[serde(default)]
    pub vpn: VpnConfig,

    /// Intermediary portal navigation settings
    #[serde(default)]
    pub portal: PortalConfig,

    /// Advanced search filters
    #[serde(default)]
    pub search: SearchConfig,

    /// Export dialog settings
    #[serde(default)]
    pub export: ExportConfig,

    /// WebDriver browser settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Automatic retry of transient unit-of-work failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Database and result file locations
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })
    }

    /// Overlay secrets and deployment-specific values from the environment
    pub fn apply_env_overrides(&mut self) {
        if let Ok(username) = std::env::var(ENV_VPN_USERNAME) {
            self.vpn.username = username;
        }
        if let Ok(password) = std::env::var(ENV_VPN_PASSWORD) {
            self.vpn.password = password;
        }
        if let Ok(email) = std::env::var(ENV_OPERATOR_EMAIL) {
            self.portal.operator_email = email;
        }
        if let Ok(url) = std::env::var(ENV_WEBDRIVER_URL) {
            self.browser.webdriver_url = url;
        }
        if let Ok(key) = std::env::var(ENV_API_KEY) {
            self.api.api_key = Some(key);
        }
    }

    /// Reject configurations the workflow cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.portal.operator_email.trim().is_empty() {
            return Err(Error::Config {
                message: "operator email must not be empty".to_string(),
                key: Some("portal.operator_email".to_string()),
            });
        }
        if self.export.default_max_documents == 0 {
            return Err(Error::Config {
                message: "default export size must be at least 1".to_string(),
                key: Some("export.default_max_documents".to_string()),
            });
        }
        if self.retry.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(Error::Config {
                message: format!(
                    "at most {} automatic retry is allowed, got {}",
                    MAX_RETRY_ATTEMPTS, self.retry.max_attempts
                ),
                key: Some("retry.max_attempts".to_string()),
            });
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: format!(
                    "backoff multiplier must be a finite number of at least 1.0, got {}",
                    self.retry.backoff_multiplier
                ),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        if self.vpn.strategy == VpnStrategy::Rasdial
            && (self.vpn.username.is_empty() || self.vpn.password.is_empty())
        {
            return Err(Error::Config {
                message: "rasdial needs both a username and a password".to_string(),
                key: Some("vpn.username".to_string()),
            });
        }
        Ok(())
    }
}

/// How the VPN gate is established
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VpnStrategy {
    /// `ppp` on Linux, `rasdial` on Windows, `unsupported` elsewhere
    #[default]
    Auto,
    /// Linux `pon`/`poff` with a ppp peer file
    Ppp,
    /// Windows `rasdial` dial-up entry
    Rasdial,
    /// The tunnel is managed outside the service; the gate always opens
    Disabled,
    /// No dial tool on this host; the gate always refuses
    Unsupported,
}

/// VPN gate configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct VpnConfig {
    /// Strategy selection (default: auto)
    #[serde(default)]
    pub strategy: VpnStrategy,

    /// Peer file name under /etc/ppp/peers (ppp strategy)
    #[serde(default = "default_peer_name")]
    pub peer_name: String,

    /// Phone-book entry name (rasdial strategy)
    #[serde(default = "default_peer_name")]
    pub connection_name: String,

    /// Dial-up username (rasdial strategy)
    #[serde(default)]
    pub username: String,

    /// Dial-up password (rasdial strategy)
    #[serde(default)]
    pub password: String,

    /// Point-to-point interface expected once connected (default: ppp0)
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Treat a missing default route through the interface as failure (default: false)
    #[serde(default)]
    pub require_default_route: bool,

    /// Pause after dialing before the link is verified (default: 10 seconds)
    #[serde(default = "default_settle_delay", with = "duration_serde")]
    pub settle_delay: Duration,

    /// Deadline for the dial command (default: 60 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Deadline for the hang-up command (default: 30 seconds)
    #[serde(default = "default_disconnect_timeout", with = "duration_serde")]
    pub disconnect_timeout: Duration,

    /// Deadline for interface and route probes (default: 10 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,

    /// Log file tailed for diagnostics when the link does not come up
    #[serde(default = "default_syslog_path")]
    pub syslog_path: PathBuf,

    /// Lines of the log file to report (default: 20)
    #[serde(default = "default_syslog_lines")]
    pub syslog_lines: usize,

    /// Path to pon executable (auto-detected if None)
    #[serde(default)]
    pub pon_path: Option<PathBuf>,

    /// Path to poff executable (auto-detected if None)
    #[serde(default)]
    pub poff_path: Option<PathBuf>,

    /// Path to ip executable (auto-detected if None)
    #[serde(default)]
    pub ip_path: Option<PathBuf>,

    /// Path to rasdial executable (auto-detected if None)
    #[serde(default)]
    pub rasdial_path: Option<PathBuf>,

    /// Whether to search PATH for dial tools if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for VpnConfig {
    fn default() -> Self {
        Self {
            strategy: VpnStrategy::default(),
            peer_name: default_peer_name(),
            connection_name: default_peer_name(),
            username: String::new(),
            password: String::new(),
            interface: default_interface(),
            require_default_route: false,
            settle_delay: default_settle_delay(),
            connect_timeout: default_connect_timeout(),
            disconnect_timeout: default_disconnect_timeout(),
            probe_timeout: default_probe_timeout(),
            syslog_path: default_syslog_path(),
            syslog_lines: default_syslog_lines(),
            pon_path: None,
            poff_path: None,
            ip_path: None,
            rasdial_path: None,
            search_path: true,
        }
    }
}

/// Intermediary portal configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PortalConfig {
    /// First page loaded in every session
    #[serde(default = "default_entry_url")]
    pub entry_url: String,

    /// URL fragment identifying the email gate
    #[serde(default = "default_email_page_fragment")]
    pub email_page_fragment: String,

    /// URL fragment identifying the portal search page
    #[serde(default = "default_search_page_fragment")]
    pub search_page_fragment: String,

    /// Address submitted at the email gate
    #[serde(default)]
    pub operator_email: String,

    /// Text of the citation-databases section link
    #[serde(default = "default_citation_section_text")]
    pub citation_section_text: String,

    /// Text of the link that opens the database in a new window
    #[serde(default = "default_database_link_text")]
    pub database_link_text: String,

    /// URL fragment proving the new window reached the database
    #[serde(default = "default_database_host_fragment")]
    pub database_host_fragment: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            entry_url: default_entry_url(),
            email_page_fragment: default_email_page_fragment(),
            search_page_fragment: default_search_page_fragment(),
            operator_email: String::new(),
            citation_section_text: default_citation_section_text(),
            database_link_text: default_database_link_text(),
            database_host_fragment: default_database_host_fragment(),
        }
    }
}

/// Fixed filters appended to every advanced search
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SearchConfig {
    /// DOCTYPE filter (default: "ar")
    #[serde(default = "default_document_type")]
    pub document_type: String,

    /// LANGUAGE filter (default: "English")
    #[serde(default = "default_language")]
    pub language: String,

    /// SRCTYPE filter (default: "j")
    #[serde(default = "default_source_type")]
    pub source_type: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            document_type: default_document_type(),
            language: default_language(),
            source_type: default_source_type(),
        }
    }
}

/// Export dialog configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ExportConfig {
    /// Range end used when the dialog's limit cannot be read (default: 2000)
    #[serde(default = "default_max_documents")]
    pub default_max_documents: u32,

    /// Metadata category checkboxes to enable
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_max_documents: default_max_documents(),
            categories: default_categories(),
        }
    }
}

/// Per-step wait deadlines for the export workflow
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StepTimeouts {
    /// Page navigation and URL waits (default: 60 seconds)
    #[serde(default = "default_navigation_timeout", with = "duration_serde")]
    pub navigation: Duration,

    /// Element lookup and interaction (default: 30 seconds)
    #[serde(default = "default_element_timeout", with = "duration_serde")]
    pub element: Duration,

    /// Search results page load (default: 150 seconds)
    #[serde(default = "default_search_timeout", with = "duration_serde")]
    pub search: Duration,

    /// Export file download (default: 300 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download: Duration,

    /// Optional-element visibility probes (default: 5 seconds)
    #[serde(default = "default_probe_wait", with = "duration_serde")]
    pub probe: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            navigation: default_navigation_timeout(),
            element: default_element_timeout(),
            search: default_search_timeout(),
            download: default_download_timeout(),
            probe: default_probe_wait(),
        }
    }
}

/// WebDriver browser configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BrowserConfig {
    /// Base URL of the WebDriver server (default: http://localhost:9515, chromedriver)
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Run the browser without a window (default: true)
    #[serde(default = "default_true")]
    pub headless: bool,

    /// User agent override
    #[serde(default = "default_user_agent")]
    pub user_agent: Option<String>,

    /// Accept invalid TLS certificates (default: true)
    #[serde(default = "default_true")]
    pub accept_insecure_certs: bool,

    /// Directory the browser saves downloads into (must be visible to the service)
    #[serde(default = "default_browser_download_dir")]
    pub download_dir: PathBuf,

    /// Step deadlines
    #[serde(default)]
    pub timeouts: StepTimeouts,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            headless: true,
            user_agent: default_user_agent(),
            accept_insecure_certs: true,
            download_dir: default_browser_download_dir(),
            timeouts: StepTimeouts::default(),
        }
    }
}

/// Retry configuration for transient unit-of-work failures
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 60 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for backoff between attempts (default: 1.0, a fixed delay)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Database path (default: "./scopus-harvester.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Root directory for saved export files (default: "./media/scraped_data")
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            results_dir: default_results_dir(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6789)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_peer_name() -> String {
    "gigalib-vpn".to_string()
}

fn default_interface() -> String {
    "ppp0".to_string()
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_disconnect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_syslog_path() -> PathBuf {
    PathBuf::from("/var/log/syslog")
}

fn default_syslog_lines() -> usize {
    20
}

fn default_entry_url() -> String {
    "http://gigalib.org/ip/".to_string()
}

fn default_email_page_fragment() -> String {
    "gigalib.org/getemail.aspx".to_string()
}

fn default_search_page_fragment() -> String {
    "pd.gigalib.org/search-basic.aspx".to_string()
}

fn default_citation_section_text() -> String {
    "دسترسی پایگاه های استنادی".to_string()
}

fn default_database_link_text() -> String {
    "سرور1".to_string()
}

fn default_database_host_fragment() -> String {
    "scopus.com".to_string()
}

fn default_document_type() -> String {
    "ar".to_string()
}

fn default_language() -> String {
    "English".to_string()
}

fn default_source_type() -> String {
    "j".to_string()
}

fn default_max_documents() -> u32 {
    2000
}

fn default_categories() -> Vec<String> {
    [
        "Citation information",
        "Bibliographical information",
        "Abstract & keywords",
        "Funding details",
        "Other information",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_navigation_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_element_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_search_timeout() -> Duration {
    Duration::from_secs(150)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_probe_wait() -> Duration {
    Duration::from_secs(5)
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_user_agent() -> Option<String> {
    Some(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
         Chrome/120.0.0.0 Safari/537.36"
            .to_string(),
    )
}

fn default_browser_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./scopus-harvester.db")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("./media/scraped_data")
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6789))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper (as seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
