//! Suite and test lifecycle.
//!
//! A [`TestSuite`] is set up once: configuration, logging, browser. Each
//! test then gets a [`TestCase`] with its own browser context, page and page
//! factory, and hands back an [`Outcome`] when done so failure artifacts can
//! be captured before the context is closed.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::browser::{BrowserManager, ContextId, PageProvider};
use crate::config::{BrowserSettings, TestConfiguration};
use crate::driver::{DriverRef, PageDriver};
use crate::error::{Error, Result};
use crate::factory::{PageContext, PageFactory, PageObject};
use crate::locator::Locator;
use crate::logging;
use crate::report::{ReportWriter, Status, TestResult};
use crate::retry::{self, RetryPolicy};

/// How a test ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(String),
    Skipped,
}

impl Outcome {
    pub fn from_result<T, E: std::fmt::Display>(result: &std::result::Result<T, E>) -> Self {
        match result {
            Ok(_) => Outcome::Passed,
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

pub struct TestSuite {
    config: Arc<TestConfiguration>,
    provider: Arc<dyn PageProvider>,
    reports: ReportWriter,
    once: OnceCell<()>,
}

impl TestSuite {
    /// Load `config_path`, install logging, launch the configured browser.
    pub async fn setup(config_path: impl AsRef<Path>) -> Result<Self> {
        Self::setup_with(config_path, |settings| async move {
            let browser = BrowserManager::launch(&settings).await?;
            Ok::<_, Error>(Arc::new(browser) as Arc<dyn PageProvider>)
        })
        .await
    }

    /// Like [`TestSuite::setup`] with a custom way of getting pages.
    ///
    /// The configuration is loaded and validated before `launch` is called,
    /// so a broken file never starts a browser.
    pub async fn setup_with<F, Fut>(config_path: impl AsRef<Path>, launch: F) -> Result<Self>
    where
        F: FnOnce(BrowserSettings) -> Fut,
        Fut: Future<Output = Result<Arc<dyn PageProvider>>>,
    {
        let config = TestConfiguration::load(config_path)?;
        logging::init(&config.logging);
        let provider = launch(config.browser.clone()).await?;
        info!(
            environment = %config.application.environment,
            base_url = %config.application.base_url,
            "suite set up"
        );
        Ok(Self::with_provider(config, provider))
    }

    pub fn with_provider(config: TestConfiguration, provider: Arc<dyn PageProvider>) -> Self {
        let reports = ReportWriter::from_settings(&config.reporting);
        Self {
            config: Arc::new(config),
            provider,
            reports,
            once: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &Arc<TestConfiguration> {
        &self.config
    }

    pub fn reports(&self) -> &ReportWriter {
        &self.reports
    }

    /// Run `f` once for this suite, e.g. a login whose session later tests
    /// reuse. Concurrent callers wait for the first run; if it fails, the
    /// next caller tries again.
    pub async fn run_once<F, Fut>(&self, f: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.once.get_or_try_init(f).await.map(|_| ())
    }

    pub fn ran_once(&self) -> bool {
        self.once.initialized()
    }

    pub async fn start_test(&self, name: &str) -> Result<TestCase> {
        TestCase::start(self, name).await
    }

    /// Close every remaining context and the browser.
    pub async fn teardown(self) -> Result<()> {
        self.provider.close().await?;
        info!("suite torn down");
        Ok(())
    }
}

pub struct TestCase {
    name: String,
    context: ContextId,
    driver: DriverRef,
    factory: PageFactory,
    config: Arc<TestConfiguration>,
    provider: Arc<dyn PageProvider>,
    reports: ReportWriter,
    result: TestResult,
}

impl TestCase {
    pub async fn start(suite: &TestSuite, name: &str) -> Result<Self> {
        let provider = Arc::clone(&suite.provider);
        let context = provider.new_context().await?;
        let driver = match provider.new_page(&context, "about:blank").await {
            Ok(driver) => driver,
            Err(e) => {
                if let Err(close) = provider.close_context(&context).await {
                    warn!(test = name, context = %context, error = %close, "context close failed");
                }
                return Err(e);
            }
        };
        let config = Arc::clone(&suite.config);
        let factory = PageFactory::new(Arc::clone(&driver), Arc::clone(&config));

        let mut result = suite.reports.start(name);
        result.parameter("browser", &config.browser.kind);
        result.parameter("environment", &config.application.environment);
        result.label("framework", "pageflow");

        info!(test = name, context = %context, "test started");
        Ok(Self {
            name: name.to_string(),
            context,
            driver,
            factory,
            config,
            provider,
            reports: suite.reports.clone(),
            result,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> &dyn PageDriver {
        self.driver.as_ref()
    }

    pub fn config(&self) -> &TestConfiguration {
        &self.config
    }

    pub fn factory(&self) -> &PageFactory {
        &self.factory
    }

    pub fn page<T: PageObject>(&self) -> Result<Arc<T>> {
        self.factory.page::<T>()
    }

    pub fn locator(&self, selector: impl Into<String>) -> Locator {
        Locator::new(Arc::clone(&self.driver), Arc::clone(&self.config), selector)
    }

    /// Add a parameter to this test's report entry.
    pub fn parameter(&mut self, name: &str, value: &str) {
        self.result.parameter(name, value);
    }

    /// Retry `op` with the suite's configured count and delay.
    pub async fn retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry::retry(RetryPolicy::from_config(&self.config.execution), op).await
    }

    /// Record `outcome`, capture failure artifacts if configured, write the
    /// report entry and close this test's context. Returns the saved
    /// artifacts.
    pub async fn finish(mut self, outcome: Outcome) -> Result<Vec<PathBuf>> {
        let artifacts = if outcome.is_failure() && self.config.execution.screenshot_on_failure {
            self.capture_artifacts().await
        } else {
            Vec::new()
        };

        let (status, message) = match &outcome {
            Outcome::Passed => (Status::Passed, None),
            Outcome::Failed(message) => (Status::Failed, Some(message.clone())),
            Outcome::Skipped => (Status::Skipped, None),
        };
        if let Err(e) = self.reports.finish(&mut self.result, status, message) {
            warn!(test = %self.name, error = %e, "report write failed");
        }

        self.factory.clear();
        self.provider.close_context(&self.context).await?;
        info!(test = %self.name, status = ?status, "test finished");
        Ok(artifacts)
    }

    /// [`TestCase::finish`] with the outcome derived from `result`.
    pub async fn conclude<T, E: std::fmt::Display>(
        self,
        result: &std::result::Result<T, E>,
    ) -> Result<Vec<PathBuf>> {
        self.finish(Outcome::from_result(result)).await
    }

    /// Run `body` as this test and finish it, whatever happens.
    ///
    /// An error from `body` is recorded as a failure and returned. A panic,
    /// such as a failed `assert!`, is recorded as a failure too: artifacts
    /// are captured and the context is closed before the panic resumes.
    pub async fn run<T, F, Fut>(self, body: F) -> Result<T>
    where
        F: FnOnce(PageContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let ctx = self.factory.context();
        let outcome = AssertUnwindSafe(async move { body(ctx).await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(result) => {
                let finished = self.conclude(&result).await;
                let value = result?;
                finished?;
                Ok(value)
            }
            Err(payload) => {
                let name = self.name.clone();
                let message = format!("panicked: {}", panic_message(payload.as_ref()));
                if let Err(e) = self.finish(Outcome::Failed(message)).await {
                    warn!(test = %name, error = %e, "finish after panic failed");
                }
                panic::resume_unwind(payload)
            }
        }
    }

    /// Screenshot and page source, best effort: failures are logged, never
    /// returned.
    async fn capture_artifacts(&mut self) -> Vec<PathBuf> {
        let mut saved = Vec::new();

        match self.driver.screenshot().await {
            Ok(png) => match self.reports.save_artifact(&self.name, "screenshot", "png", &png) {
                Ok(path) => {
                    self.reports.attach(&mut self.result, "screenshot", "image/png", &path);
                    saved.push(path);
                }
                Err(e) => warn!(test = %self.name, error = %e, "screenshot save failed"),
            },
            Err(e) => warn!(test = %self.name, error = %e, "screenshot capture failed"),
        }

        if self.config.reporting.attach_page_source {
            match self.driver.content().await {
                Ok(html) => {
                    match self.reports.save_artifact(&self.name, "page", "html", html.as_bytes()) {
                        Ok(path) => {
                            self.reports.attach(&mut self.result, "page source", "text/html", &path);
                            saved.push(path);
                        }
                        Err(e) => warn!(test = %self.name, error = %e, "page source save failed"),
                    }
                }
                Err(e) => warn!(test = %self.name, error = %e, "page source capture failed"),
            }
        }

        saved
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::mock::{Action, MockBrowser, MockDriver};

    fn suite_in(dir: &Path, browser: Arc<MockBrowser>) -> TestSuite {
        let mut config = TestConfiguration::default();
        config.reporting.results_dir = dir.to_string_lossy().into_owned();
        TestSuite::with_provider(config, browser)
    }

    #[tokio::test]
    async fn missing_root_section_fails_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[browser]\nheadless = true\n").unwrap();

        let launched = AtomicUsize::new(0);
        let result = TestSuite::setup_with(&path, |_| async {
            launched.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(Arc::new(MockBrowser::new()) as Arc<dyn PageProvider>)
        })
        .await;

        assert!(matches!(result, Err(Error::ConfigMissing(_))));
        assert_eq!(launched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn setup_with_reads_config_and_uses_provider() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[test_settings.application]\nbase_url = \"https://staging.example.com\"\n",
        )
        .unwrap();

        let suite = TestSuite::setup_with(&path, |settings| async move {
            assert_eq!(settings.kind, "chromium");
            Ok::<_, Error>(Arc::new(MockBrowser::new()) as Arc<dyn PageProvider>)
        })
        .await
        .unwrap();

        assert_eq!(suite.config().application.base_url, "https://staging.example.com");
    }

    #[tokio::test]
    async fn each_test_gets_its_own_context() {
        let dir = tempfile::tempdir().unwrap();
        let browser = Arc::new(MockBrowser::new());
        let suite = suite_in(dir.path(), browser.clone());

        let first = suite.start_test("a").await.unwrap();
        let second = suite.start_test("b").await.unwrap();
        assert_eq!(browser.open_contexts().len(), 2);

        first.finish(Outcome::Passed).await.unwrap();
        assert_eq!(browser.open_contexts().len(), 1);
        second.finish(Outcome::Passed).await.unwrap();
        assert!(browser.open_contexts().is_empty());
    }

    #[tokio::test]
    async fn passed_test_writes_result_without_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let browser = Arc::new(MockBrowser::new());
        let suite = suite_in(dir.path(), browser.clone());

        let test = suite.start_test("login::accepts_valid_user").await.unwrap();
        let artifacts = test.finish(Outcome::Passed).await.unwrap();

        assert!(artifacts.is_empty());
        assert!(!browser.pages()[0].actions().contains(&Action::Screenshot));
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn failed_test_captures_screenshot_and_source() {
        let dir = tempfile::tempdir().unwrap();
        let browser = Arc::new(
            MockBrowser::new().with_page_setup(|| MockDriver::new().with_html("<p>oops</p>")),
        );
        let suite = suite_in(dir.path(), browser.clone());

        let test = suite.start_test("checkout").await.unwrap();
        let artifacts = test
            .finish(Outcome::Failed("total mismatch".into()))
            .await
            .unwrap();

        assert_eq!(artifacts.len(), 2);
        assert!(artifacts[0].to_string_lossy().ends_with("-screenshot.png"));
        assert_eq!(std::fs::read_to_string(&artifacts[1]).unwrap(), "<p>oops</p>");

        let result_file = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| p.to_string_lossy().ends_with("-result.json"))
            .unwrap();
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(result_file).unwrap()).unwrap();
        assert_eq!(written["status"], "failed");
        assert_eq!(written["statusDetails"]["message"], "total mismatch");
        assert_eq!(written["attachments"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn screenshot_failure_does_not_fail_finish() {
        let dir = tempfile::tempdir().unwrap();
        let browser = Arc::new(MockBrowser::new().with_page_setup(|| {
            let driver = MockDriver::new().with_html("<html/>");
            driver.fail_screenshots();
            driver
        }));
        let suite = suite_in(dir.path(), browser.clone());

        let test = suite.start_test("flaky").await.unwrap();
        let artifacts = test.finish(Outcome::Failed("x".into())).await.unwrap();

        assert_eq!(artifacts.len(), 1);
        assert!(artifacts[0].to_string_lossy().ends_with("-page.html"));
        assert!(browser.open_contexts().is_empty());
    }

    #[tokio::test]
    async fn conclude_maps_errors_to_failures() {
        let dir = tempfile::tempdir().unwrap();
        let browser = Arc::new(MockBrowser::new());
        let suite = suite_in(dir.path(), browser.clone());

        let test = suite.start_test("t").await.unwrap();
        let result: Result<()> = Err(Error::Timeout("#submit".into()));
        let artifacts = test.conclude(&result).await.unwrap();

        assert_eq!(artifacts.len(), 2);
        assert!(browser.pages()[0].actions().contains(&Action::Screenshot));
    }

    #[tokio::test]
    async fn run_once_runs_a_single_time() {
        let dir = tempfile::tempdir().unwrap();
        let suite = suite_in(dir.path(), Arc::new(MockBrowser::new()));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            suite
                .run_once(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(suite.ran_once());
    }

    #[tokio::test]
    async fn failed_run_once_is_retried_by_the_next_caller() {
        let dir = tempfile::tempdir().unwrap();
        let suite = suite_in(dir.path(), Arc::new(MockBrowser::new()));

        let first = suite
            .run_once(|| async { Err(Error::Timeout("login".into())) })
            .await;
        assert!(first.is_err());
        assert!(!suite.ran_once());

        suite.run_once(|| async { Ok(()) }).await.unwrap();
        assert!(suite.ran_once());
    }

    #[tokio::test]
    async fn teardown_closes_the_browser() {
        let dir = tempfile::tempdir().unwrap();
        let browser = Arc::new(MockBrowser::new());
        let suite = suite_in(dir.path(), browser.clone());
        suite.teardown().await.unwrap();
        assert!(browser.is_closed());
    }

    fn result_json(dir: &Path) -> serde_json::Value {
        let path = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| p.to_string_lossy().ends_with("-result.json"))
            .unwrap();
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn panicking_body_still_captures_artifacts_and_closes_context() {
        let dir = tempfile::tempdir().unwrap();
        let browser = Arc::new(
            MockBrowser::new().with_page_setup(|| MockDriver::new().with_html("<h1>cart</h1>")),
        );
        let suite = suite_in(dir.path(), browser.clone());
        let test = suite.start_test("cart::total").await.unwrap();

        let caught = AssertUnwindSafe(test.run(|ctx| async move {
            let title = ctx.driver().title().await?;
            assert_eq!(title, "Checkout", "wrong page");
            Ok::<_, Error>(())
        }))
        .catch_unwind()
        .await;

        let payload = caught.err().unwrap();
        assert!(panic_message(payload.as_ref()).contains("wrong page"));
        assert!(browser.open_contexts().is_empty());
        assert!(browser.pages()[0].actions().contains(&Action::Screenshot));

        let written = result_json(dir.path());
        assert_eq!(written["status"], "failed");
        assert!(written["statusDetails"]["message"]
            .as_str()
            .unwrap()
            .contains("wrong page"));
        assert_eq!(written["attachments"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn run_returns_the_body_value_and_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let browser = Arc::new(
            MockBrowser::new().with_page_setup(|| MockDriver::new().with_title("Home")),
        );
        let suite = suite_in(dir.path(), browser.clone());
        let test = suite.start_test("home::title").await.unwrap();

        let title = test
            .run(|ctx| async move { ctx.driver().title().await })
            .await
            .unwrap();

        assert_eq!(title, "Home");
        assert!(browser.open_contexts().is_empty());
        assert_eq!(result_json(dir.path())["status"], "passed");
    }

    #[tokio::test]
    async fn run_returns_body_errors_as_failures() {
        let dir = tempfile::tempdir().unwrap();
        let browser = Arc::new(MockBrowser::new());
        let suite = suite_in(dir.path(), browser.clone());
        let test = suite.start_test("search").await.unwrap();

        let result: Result<()> = test
            .run(|_| async { Err(Error::ElementNotFound("#results".into())) })
            .await;

        assert!(matches!(result, Err(Error::ElementNotFound(_))));
        assert!(browser.open_contexts().is_empty());
        assert_eq!(result_json(dir.path())["status"], "failed");
    }

    #[tokio::test]
    async fn failed_page_creation_closes_the_new_context() {
        let dir = tempfile::tempdir().unwrap();
        let browser = Arc::new(MockBrowser::new());
        let suite = suite_in(dir.path(), browser.clone());
        browser.fail_next_page();

        assert!(suite.start_test("t").await.is_err());
        assert!(browser.open_contexts().is_empty());
    }
}
