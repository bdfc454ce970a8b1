//! Lazily re-resolved element references.
//!
//! A [`Locator`] is only a selector plus the page and settings it should be
//! resolved against. Each operation probes the DOM again, so a locator kept
//! in a page object stays valid across navigations and re-renders.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::TestConfiguration;
use crate::driver::{DriverRef, PageDriver};
use crate::error::{Error, Result};
use crate::highlight;
use crate::visibility::{self, VisibilityFilter};

enum Interaction<'a> {
    Click,
    Fill(&'a str),
}

impl Interaction<'_> {
    fn name(&self) -> &'static str {
        match self {
            Interaction::Click => "click",
            Interaction::Fill(_) => "fill",
        }
    }
}

#[derive(Clone)]
pub struct Locator {
    selector: String,
    driver: DriverRef,
    config: Arc<TestConfiguration>,
    filter: VisibilityFilter,
    timeout: Duration,
}

impl std::fmt::Debug for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locator")
            .field("selector", &self.selector)
            .field("filter", &self.filter)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Locator {
    /// Timeout and filter default from `config.execution`.
    pub fn new(
        driver: DriverRef,
        config: Arc<TestConfiguration>,
        selector: impl Into<String>,
    ) -> Self {
        let mut filter = VisibilityFilter::visible();
        if config.execution.strict_in_viewport {
            filter = filter.in_viewport();
        }
        let timeout = config.execution.element_timeout();
        Self {
            selector: selector.into(),
            driver,
            config,
            filter,
            timeout,
        }
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn filter(&self) -> VisibilityFilter {
        self.filter
    }

    pub fn driver(&self) -> &dyn PageDriver {
        self.driver.as_ref()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_filter(mut self, filter: VisibilityFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Number of current DOM matches, visible or not.
    pub async fn count(&self) -> Result<usize> {
        visibility::check_selector(&self.selector)?;
        Ok(self.driver.probe(&self.selector).await?.len())
    }

    /// Whether any match is visible right now. Does not wait.
    pub async fn is_visible(&self) -> Result<bool> {
        visibility::check_selector(&self.selector)?;
        let states = self.driver.probe(&self.selector).await?;
        Ok(visibility::first_match(&states, &VisibilityFilter::visible()).is_some())
    }

    /// Wait until at least one element matches, visible or not.
    pub async fn wait_for(&self) -> Result<()> {
        visibility::check_selector(&self.selector)?;
        let started = Instant::now();
        loop {
            if !self.driver.probe(&self.selector).await?.is_empty() {
                return Ok(());
            }
            if !self.pause(started).await {
                return Err(Error::Timeout(format!(
                    "{} to be attached after {:?}",
                    self.selector, self.timeout
                )));
            }
        }
    }

    /// Wait until some match passes the locator's filter; returns its index.
    pub async fn wait_for_visible(&self) -> Result<usize> {
        self.poll_first(&self.filter)
            .await?
            .ok_or_else(|| self.timeout_error(&self.filter))
    }

    /// Click the first match passing the filter.
    ///
    /// `Ok(false)` when nothing qualified within the timeout; other failures
    /// are still returned as errors.
    pub async fn click_only_visible(&self) -> Result<bool> {
        let acted = self
            .act_on_first_visible(&self.filter, Interaction::Click)
            .await?;
        Ok(acted.is_some())
    }

    /// Fill the first visible, editable match. See [`Locator::click_only_visible`].
    pub async fn fill_only_visible(&self, text: &str) -> Result<bool> {
        let filter = self.filter.editable();
        let acted = self
            .act_on_first_visible(&filter, Interaction::Fill(text))
            .await?;
        Ok(acted.is_some())
    }

    /// Like [`Locator::click_only_visible`] but a miss is an [`Error::Timeout`].
    pub async fn click_first_visible(&self) -> Result<()> {
        self.act_on_first_visible(&self.filter, Interaction::Click)
            .await?
            .map(|_| ())
            .ok_or_else(|| self.timeout_error(&self.filter))
    }

    /// Like [`Locator::fill_only_visible`] but a miss is an [`Error::Timeout`].
    pub async fn fill_first_visible(&self, text: &str) -> Result<()> {
        let filter = self.filter.editable();
        self.act_on_first_visible(&filter, Interaction::Fill(text))
            .await?
            .map(|_| ())
            .ok_or_else(|| self.timeout_error(&filter))
    }

    /// Click the first DOM match once one is attached.
    pub async fn click(&self) -> Result<()> {
        self.wait_for().await?;
        self.perform(0, &Interaction::Click).await
    }

    /// Fill the first DOM match once one is attached.
    pub async fn fill(&self, text: &str) -> Result<()> {
        self.wait_for().await?;
        self.perform(0, &Interaction::Fill(text)).await
    }

    /// Text of the first visible match.
    pub async fn text(&self) -> Result<String> {
        let index = self.wait_for_visible().await?;
        self.driver.text_nth(&self.selector, index).await
    }

    async fn act_on_first_visible(
        &self,
        filter: &VisibilityFilter,
        interaction: Interaction<'_>,
    ) -> Result<Option<usize>> {
        let Some(index) = self.poll_first(filter).await? else {
            warn!(
                selector = %self.selector,
                filter = %filter.describe(),
                timeout_ms = self.timeout.as_millis() as u64,
                "no qualifying element for {}",
                interaction.name()
            );
            return Ok(None);
        };
        if !filter.in_viewport {
            self.driver
                .scroll_nth_into_view(&self.selector, index)
                .await?;
        }
        self.perform(index, &interaction).await?;
        Ok(Some(index))
    }

    async fn perform(&self, index: usize, interaction: &Interaction<'_>) -> Result<()> {
        if let Err(e) = highlight::highlight(
            self.driver.as_ref(),
            &self.selector,
            index,
            &self.config.execution,
        )
        .await
        {
            warn!(selector = %self.selector, error = %e, "highlight failed");
        }
        debug!(selector = %self.selector, index, "{}", interaction.name());
        match interaction {
            Interaction::Click => self.driver.click_nth(&self.selector, index).await,
            Interaction::Fill(text) => self.driver.fill_nth(&self.selector, index, text).await,
        }
    }

    async fn poll_first(&self, filter: &VisibilityFilter) -> Result<Option<usize>> {
        visibility::check_selector(&self.selector)?;
        let started = Instant::now();
        loop {
            let states = self.driver.probe(&self.selector).await?;
            if let Some(index) = visibility::first_match(&states, filter) {
                return Ok(Some(index));
            }
            if !self.pause(started).await {
                return Ok(None);
            }
        }
    }

    /// Sleep one poll interval, clipped to the remaining timeout. Returns
    /// false once the timeout has been used up.
    async fn pause(&self, started: Instant) -> bool {
        let remaining = self.timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return false;
        }
        let interval = self.config.execution.poll_interval();
        tokio::time::sleep(interval.min(remaining)).await;
        true
    }

    fn timeout_error(&self, filter: &VisibilityFilter) -> Error {
        Error::Timeout(format!(
            "{} to be {} after {:?}",
            self.selector,
            filter.describe(),
            self.timeout
        ))
    }
}
