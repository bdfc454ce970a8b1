use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::Page as CrPage;
use chromiumoxide::page::ScreenshotParams;
use serde_json::Value;
use tracing::debug;

use crate::driver::PageDriver;
use crate::element::Element;
use crate::error::{Error, Result};

/// [`PageDriver`] over a chromiumoxide page.
#[derive(Clone)]
pub struct CdpDriver {
    inner: CrPage,
    navigation_timeout: Duration,
}

impl CdpDriver {
    pub(crate) fn new(inner: CrPage, navigation_timeout: Duration) -> Self {
        Self {
            inner,
            navigation_timeout,
        }
    }

    /// Returns a reference to the underlying chromiumoxide Page.
    pub fn inner(&self) -> &CrPage {
        &self.inner
    }

    async fn nth(&self, selector: &str, index: usize) -> Result<Element> {
        let elements = self
            .inner
            .find_elements(selector)
            .await
            .map_err(|e| Error::ElementNotFound(format!("{selector}: {e}")))?;
        let count = elements.len();
        elements
            .into_iter()
            .nth(index)
            .map(Element::new)
            .ok_or_else(|| {
                Error::ElementNotFound(format!("{selector}[{index}] (only {count} matches)"))
            })
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        debug!(url, "navigating");
        tokio::time::timeout(self.navigation_timeout, self.inner.goto(url))
            .await
            .map_err(|_| Error::Timeout(format!("navigation to {url}")))?
            .map_err(|e| Error::NavigationError(e.to_string()))?;
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        self.inner
            .url()
            .await
            .map_err(|e| Error::NavigationError(e.to_string()))?
            .ok_or_else(|| Error::NavigationError("No URL found".into()))
    }

    async fn title(&self) -> Result<String> {
        let result = self
            .inner
            .evaluate("document.title")
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        Ok(result.into_value::<String>().unwrap_or_default())
    }

    async fn content(&self) -> Result<String> {
        self.inner
            .content()
            .await
            .map_err(|e| Error::JsError(e.to_string()))
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let result = self
            .inner
            .evaluate(script)
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<()> {
        self.nth(selector, index).await?.click().await
    }

    async fn fill_nth(&self, selector: &str, index: usize, text: &str) -> Result<()> {
        self.nth(selector, index).await?.fill(text).await
    }

    async fn scroll_nth_into_view(&self, selector: &str, index: usize) -> Result<()> {
        self.nth(selector, index).await?.scroll_into_view().await
    }

    async fn text_nth(&self, selector: &str, index: usize) -> Result<String> {
        self.nth(selector, index).await?.inner_text().await
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        // Send to the focused element so focus is not moved to <body>.
        let target = match self.inner.find_element(":focus").await {
            Ok(el) => Element::new(el),
            Err(_) => Element::new(self.inner.find_element("body").await?),
        };
        target.press_key(key).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.inner
            .screenshot(params)
            .await
            .map_err(|e| Error::ScreenshotError(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.inner.clone().close().await?;
        Ok(())
    }
}
