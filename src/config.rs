use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::browser::BrowserManager;
use crate::error::{Error, Result};

/// Name of the root table every configuration file must carry.
pub const ROOT_SECTION: &str = "test_settings";

/// Prefix of the environment variables that override file settings.
pub const ENV_PREFIX: &str = "PAGEFLOW_";

/// Variable naming the configuration file, set by `pageflow-run --config`.
pub const CONFIG_PATH_VAR: &str = "PAGEFLOW_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "pageflow.toml";

/// The configuration file to use: `$PAGEFLOW_CONFIG`, else `pageflow.toml`.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// The full settings tree for one test run. Loaded once, then shared
/// read-only behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfiguration {
    pub browser: BrowserSettings,
    pub application: ApplicationSettings,
    pub execution: ExecutionSettings,
    pub reporting: ReportingSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// `chromium`, `chrome` or `msedge`.
    pub kind: String,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub executable_path: Option<String>,
    /// Extra Chrome flags, without the leading `--`.
    pub launch_args: Vec<String>,
    /// Default timeout for browser operations (default: 30s).
    pub default_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            kind: "chromium".into(),
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            executable_path: None,
            launch_args: Vec::new(),
            default_timeout_ms: 30_000,
            navigation_timeout_ms: 60_000,
        }
    }
}

impl BrowserSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

/// The application under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub base_url: String,
    pub environment: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            environment: "local".into(),
            username: None,
            password: None,
        }
    }
}

impl ApplicationSettings {
    /// Join `path` onto the base URL with exactly one slash between them.
    pub fn url(&self, path: &str) -> String {
        if path.is_empty() {
            return self.base_url.clone();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Knobs for element interaction: waits, retries, highlighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    pub element_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub highlight_elements: bool,
    pub highlight_duration_ms: u64,
    /// Visibility-aware helpers also require the element to be inside the viewport.
    pub strict_in_viewport: bool,
    pub screenshot_on_failure: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            element_timeout_ms: 10_000,
            poll_interval_ms: 100,
            retry_count: 3,
            retry_delay_ms: 1_000,
            highlight_elements: false,
            highlight_duration_ms: 500,
            strict_in_viewport: false,
            screenshot_on_failure: true,
        }
    }
}

impl ExecutionSettings {
    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero interval would spin the probe loop.
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn highlight_duration(&self) -> Duration {
        Duration::from_millis(self.highlight_duration_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingSettings {
    pub results_dir: String,
    pub allure_enabled: bool,
    pub attach_page_source: bool,
}

impl Default for ReportingSettings {
    fn default() -> Self {
        Self {
            results_dir: "test-results".into(),
            allure_enabled: true,
            attach_page_source: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directive, e.g. `info` or `pageflow=debug`.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    test_settings: Option<TestConfiguration>,
}

impl TestConfiguration {
    /// Read a TOML file, then apply `PAGEFLOW_*` overrides from the process
    /// environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML document. The `[test_settings]` table must be present;
    /// every field inside it is optional.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(raw)?;
        file.test_settings
            .ok_or_else(|| Error::ConfigMissing(ROOT_SECTION.into()))
    }

    /// Apply overrides looked up by full variable name (e.g. `PAGEFLOW_HEADLESS`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = get("BROWSER") {
            self.browser.kind = v;
        }
        if let Some(v) = get("HEADLESS") {
            self.browser.headless = parse_override("HEADLESS", &v)?;
        }
        if let Some(v) = get("TIMEOUT_MS") {
            self.browser.default_timeout_ms = parse_override("TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("ELEMENT_TIMEOUT_MS") {
            self.execution.element_timeout_ms = parse_override("ELEMENT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("BASE_URL") {
            self.application.base_url = v;
        }
        if let Some(v) = get("ENVIRONMENT") {
            self.application.environment = v;
        }
        if let Some(v) = get("USERNAME") {
            self.application.username = Some(v);
        }
        if let Some(v) = get("PASSWORD") {
            self.application.password = Some(v);
        }
        if let Some(v) = get("RETRY_COUNT") {
            self.execution.retry_count = parse_override("RETRY_COUNT", &v)?;
        }
        if let Some(v) = get("HIGHLIGHT") {
            self.execution.highlight_elements = parse_override("HIGHLIGHT", &v)?;
        }
        if let Some(v) = get("RESULTS_DIR") {
            self.reporting.results_dir = v;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
        Ok(())
    }
}

fn parse_override<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!("{ENV_PREFIX}{name}: cannot parse {value:?}"))
    })
}

/// Builder for [`BrowserSettings`], for tests that launch a browser without a
/// configuration file.
pub struct BrowserBuilder {
    settings: BrowserSettings,
}

impl BrowserBuilder {
    pub fn new() -> Self {
        Self {
            settings: BrowserSettings::default(),
        }
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.settings.kind = kind.into();
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.settings.headless = headless;
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.settings.viewport_width = width;
        self.settings.viewport_height = height;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<String>) -> Self {
        self.settings.executable_path = Some(path.into());
        self
    }

    /// Set the default timeout for browser operations.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.default_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Add a Chrome flag, e.g. `"lang=en-US"`.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.settings.launch_args.push(arg.into());
        self
    }

    pub fn build_settings(self) -> BrowserSettings {
        self.settings
    }

    pub async fn launch(self) -> Result<BrowserManager> {
        BrowserManager::launch(&self.build_settings()).await
    }
}

impl Default for BrowserBuilder {
    fn default() -> Self {
        Self::new()
    }
}
