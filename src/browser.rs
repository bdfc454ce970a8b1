use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CrBrowser, BrowserConfig as CrBrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
    DisposeBrowserContextParams,
};
use chromiumoxide::handler::viewport::Viewport;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cdp::CdpDriver;
use crate::config::{BrowserBuilder, BrowserSettings};
use crate::driver::{DriverRef, PageDriver};
use crate::error::{Error, Result};

/// Chrome flags that improve performance without affecting functionality.
const PERF_ARGS: &[&str] = &[
    "disable-gpu",
    "disable-extensions",
    "metrics-recording-only",
    "mute-audio",
    "no-default-browser-check",
    "no-first-run",
    "disable-client-side-phishing-detection",
    "disable-popup-blocking",
    "disable-prompt-on-repost",
];

/// Browser kinds that chromiumoxide can drive.
const SUPPORTED_KINDS: &[&str] = &["chromium", "chrome", "msedge"];

/// Identifier of an isolated browser context (separate cookies and storage).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of isolated pages. [`BrowserManager`] is the real one; tests use
/// [`crate::mock::MockBrowser`].
#[async_trait]
pub trait PageProvider: Send + Sync {
    async fn new_context(&self) -> Result<ContextId>;

    /// Open a page in `context`, navigated to `url`.
    async fn new_page(&self, context: &ContextId, url: &str) -> Result<DriverRef>;

    /// Close every page of `context`, then the context itself.
    async fn close_context(&self, context: &ContextId) -> Result<()>;

    /// Close every context, then the browser.
    async fn close(&self) -> Result<()>;
}

/// Owns one browser process and the contexts and pages opened in it.
pub struct BrowserManager {
    // Taken out on close; commands hold a read guard across their await.
    browser: RwLock<Option<CrBrowser>>,
    contexts: Mutex<HashMap<ContextId, Vec<CdpDriver>>>,
    navigation_timeout: Duration,
    default_timeout: Duration,
    handler_task: tokio::task::JoinHandle<()>,
}

impl BrowserManager {
    /// Create a new BrowserBuilder for configuring and launching a browser.
    pub fn builder() -> BrowserBuilder {
        BrowserBuilder::new()
    }

    /// Launch a browser instance with the given settings.
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        if !SUPPORTED_KINDS.contains(&settings.kind.as_str()) {
            return Err(Error::Config(format!(
                "unsupported browser kind {:?}, expected one of {SUPPORTED_KINDS:?}",
                settings.kind
            )));
        }

        let mut builder = CrBrowserConfig::builder();

        if settings.headless {
            builder = builder.new_headless_mode().no_sandbox();
        } else {
            builder = builder.with_head().no_sandbox();
        }

        for arg in PERF_ARGS {
            builder = builder.arg(*arg);
        }
        // chromiumoxide adds the `--` prefix itself.
        for arg in &settings.launch_args {
            builder = builder.arg(arg.trim_start_matches("--"));
        }

        if let Some(ref path) = settings.executable_path {
            builder = builder.chrome_executable(path);
        }

        builder = builder
            .request_timeout(settings.default_timeout())
            .viewport(Viewport {
                width: settings.viewport_width,
                height: settings.viewport_height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: false,
                has_touch: false,
            });

        let cr_config = builder.build().map_err(Error::LaunchError)?;

        let (browser, mut handler) = CrBrowser::launch(cr_config)
            .await
            .map_err(|e| Error::LaunchError(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(_event) = handler.next().await {}
        });

        info!(
            kind = %settings.kind,
            headless = settings.headless,
            width = settings.viewport_width,
            height = settings.viewport_height,
            "browser launched"
        );

        Ok(Self {
            browser: RwLock::new(Some(browser)),
            contexts: Mutex::new(HashMap::new()),
            navigation_timeout: settings.navigation_timeout(),
            default_timeout: settings.default_timeout(),
            handler_task,
        })
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn context_count(&self) -> usize {
        self.contexts.lock().len()
    }
}

#[async_trait]
impl PageProvider for BrowserManager {
    async fn new_context(&self) -> Result<ContextId> {
        let guard = self.browser.read().await;
        let browser = guard.as_ref().ok_or(Error::SessionClosed)?;
        let created = browser
            .execute(CreateBrowserContextParams::default())
            .await?;
        let id = ContextId::new(created.result.browser_context_id.inner().clone());
        self.contexts.lock().insert(id.clone(), Vec::new());
        debug!(context = %id, "context created");
        Ok(id)
    }

    async fn new_page(&self, context: &ContextId, url: &str) -> Result<DriverRef> {
        if !self.contexts.lock().contains_key(context) {
            return Err(Error::Config(format!("unknown browser context {context}")));
        }
        let params = CreateTargetParams::builder()
            .url(url)
            .browser_context_id(BrowserContextId::new(context.as_str()))
            .build()
            .map_err(Error::LaunchError)?;
        let guard = self.browser.read().await;
        let browser = guard.as_ref().ok_or(Error::SessionClosed)?;
        let cr_page = browser
            .new_page(params)
            .await
            .map_err(|e| Error::NavigationError(e.to_string()))?;

        let driver = CdpDriver::new(cr_page, self.navigation_timeout);
        if let Some(pages) = self.contexts.lock().get_mut(context) {
            pages.push(driver.clone());
        }
        debug!(context = %context, url, "page opened");
        Ok(Arc::new(driver))
    }

    async fn close_context(&self, context: &ContextId) -> Result<()> {
        let pages = self.contexts.lock().remove(context).unwrap_or_default();
        for page in pages {
            if let Err(e) = page.close().await {
                warn!(context = %context, error = %e, "page close failed");
            }
        }
        let guard = self.browser.read().await;
        let browser = guard.as_ref().ok_or(Error::SessionClosed)?;
        browser
            .execute(DisposeBrowserContextParams::new(BrowserContextId::new(
                context.as_str(),
            )))
            .await?;
        debug!(context = %context, "context disposed");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let ids: Vec<ContextId> = self.contexts.lock().keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.close_context(&id).await {
                warn!(context = %id, error = %e, "context dispose failed");
            }
        }
        let Some(mut browser) = self.browser.write().await.take() else {
            return Ok(());
        };
        browser.close().await?;
        browser.wait().await?;
        self.handler_task.abort();
        info!("browser closed");
        Ok(())
    }
}

impl Drop for BrowserManager {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
