//! Configuration management with TOML, environment variables, and CLI overrides.

use crate::browser::chrome::DEFAULT_USER_AGENT;
use crate::filters::variant::DEFAULT_MARKERS;
use crate::tcgplayer::models::Condition;
use crate::tcgplayer::selectors::errors;
use crate::tcgplayer::site::{DEFAULT_BASE_URL, DEFAULT_PRODUCT_LINE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Store origin
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Product line searched on the store
    #[serde(default = "default_product_line")]
    pub product_line: String,

    /// Card database API used for legality lookups
    #[serde(default = "default_legality_api_url")]
    pub legality_api_url: String,

    /// Chrome/Chromium executable (auto-detected when unset)
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Run the browser without a window
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Proxy URL (e.g., socks5://host:port)
    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// Page load timeout in seconds
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    /// How long to wait for results or listings to render, in seconds
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,

    /// Initial delay between render checks in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Rate-limit backoff lower bound in milliseconds
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u64,

    /// Rate-limit backoff upper bound in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// URL fragment of the store's error page
    #[serde(default = "default_blocked_url_pattern")]
    pub blocked_url_pattern: String,

    /// Visible text that marks a block or error page (case-insensitive)
    #[serde(default = "default_error_fragments")]
    pub error_fragments: Vec<String>,

    /// Title markers of non-playable variants (case-insensitive)
    #[serde(default = "default_variant_markers")]
    pub variant_markers: Vec<String>,

    /// Conditions priced per card, in order
    #[serde(default = "default_conditions")]
    pub conditions: Vec<Condition>,

    /// Idle seconds after which a browsing session is force-closed
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,

    /// Seconds between stale-session sweeps
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,

    /// Seconds a completed lookup is served from cache
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Seconds after which an unfinished lookup is abandoned
    #[serde(default = "default_in_progress_stale_secs")]
    pub in_progress_stale_secs: u64,

    /// Seconds between cache sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Output format
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_product_line() -> String {
    DEFAULT_PRODUCT_LINE.to_string()
}

fn default_legality_api_url() -> String {
    "https://api.scryfall.com".to_string()
}

fn default_true() -> bool {
    true
}

fn default_viewport_width() -> u32 {
    1366
}

fn default_viewport_height() -> u32 {
    900
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_accept_language() -> String {
    "en-US,en;q=0.9".to_string()
}

fn default_navigation_timeout_secs() -> u64 {
    30
}

fn default_render_timeout_secs() -> u64 {
    15
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_backoff_min_ms() -> u64 {
    10_000
}

fn default_backoff_max_ms() -> u64 {
    15_000
}

fn default_blocked_url_pattern() -> String {
    errors::BLOCKED_URL_PATTERN.to_string()
}

fn default_error_fragments() -> Vec<String> {
    errors::TEXT_FRAGMENTS.iter().map(|s| s.to_string()).collect()
}

fn default_variant_markers() -> Vec<String> {
    DEFAULT_MARKERS.iter().map(|s| s.to_string()).collect()
}

fn default_conditions() -> Vec<Condition> {
    Condition::all().to_vec()
}

fn default_session_idle_secs() -> u64 {
    120
}

fn default_reap_interval_secs() -> u64 {
    30
}

fn default_cache_ttl_secs() -> u64 {
    600
}

fn default_in_progress_stale_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            product_line: default_product_line(),
            legality_api_url: default_legality_api_url(),
            chrome_path: None,
            headless: true,
            proxy: None,
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
            render_timeout_secs: default_render_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            backoff_min_ms: default_backoff_min_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            blocked_url_pattern: default_blocked_url_pattern(),
            error_fragments: default_error_fragments(),
            variant_markers: default_variant_markers(),
            conditions: default_conditions(),
            session_idle_secs: default_session_idle_secs(),
            reap_interval_secs: default_reap_interval_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            in_progress_stale_secs: default_in_progress_stale_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            format: OutputFormat::Table,
        }
    }
}

impl Config {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads configuration with fallback to default locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        // 1. Explicit path takes precedence
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        // 2. Try current directory
        let local_config = Path::new("config.toml");
        if local_config.exists() {
            debug!("Found config.toml in current directory");
            return Self::from_file(local_config);
        }

        // 3. Try XDG config directory
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("tcg-pricer").join("config.toml");
            if xdg_config.exists() {
                debug!("Found config in XDG config directory");
                return Self::from_file(xdg_config);
            }
        }

        // 4. Return default config
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Applies environment variable overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(base_url) = std::env::var("TCGP_BASE_URL") {
            if !base_url.trim().is_empty() {
                self.base_url = base_url;
            }
        }

        if let Ok(chrome) = std::env::var("TCGP_CHROME") {
            self.chrome_path = Some(PathBuf::from(chrome));
        }

        if let Ok(headless) = std::env::var("TCGP_HEADLESS") {
            if let Some(h) = parse_flag(&headless) {
                self.headless = h;
            }
        }

        if let Ok(proxy) = std::env::var("TCGP_PROXY") {
            self.proxy = Some(proxy);
        }

        self
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Backoff bounds, ordered even if configured the wrong way round.
    pub fn backoff_range(&self) -> (Duration, Duration) {
        let lo = self.backoff_min_ms.min(self.backoff_max_ms);
        let hi = self.backoff_min_ms.max(self.backoff_max_ms);
        (Duration::from_millis(lo), Duration::from_millis(hi))
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn in_progress_stale(&self) -> Duration {
        Duration::from_secs(self.in_progress_stale_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!("Unknown format: {}. Use: table, json, markdown", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}
