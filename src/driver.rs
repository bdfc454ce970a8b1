//! The seam between interaction policy and the browser library.
//!
//! Everything above this trait (locators, page objects, the factory) talks
//! to a `PageDriver`; [`crate::cdp::CdpDriver`] implements it over
//! chromiumoxide and [`crate::mock::MockDriver`] implements it in memory.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::visibility::{self, ElementState};

/// One browser page (tab), addressed by CSS selectors.
///
/// Element-level methods take the index of a match in document order, the
/// same order [`PageDriver::probe`] reports.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to `url` and wait for the load to finish.
    async fn goto(&self, url: &str) -> Result<()>;

    async fn url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// Full HTML of the current document.
    async fn content(&self) -> Result<String>;

    /// Evaluate a JavaScript expression and return its JSON value
    /// (`Value::Null` for `undefined`).
    async fn evaluate(&self, script: &str) -> Result<Value>;

    /// Visibility state of every match of `selector`.
    async fn probe(&self, selector: &str) -> Result<Vec<ElementState>> {
        let script = visibility::probe_script(selector)?;
        let value = self.evaluate(&script).await?;
        serde_json::from_value(value).map_err(|e| Error::JsError(e.to_string()))
    }

    /// Native click on the `index`-th match.
    async fn click_nth(&self, selector: &str, index: usize) -> Result<()>;

    /// Clear the `index`-th match and type `text` into it.
    async fn fill_nth(&self, selector: &str, index: usize, text: &str) -> Result<()>;

    async fn scroll_nth_into_view(&self, selector: &str, index: usize) -> Result<()>;

    async fn text_nth(&self, selector: &str, index: usize) -> Result<String>;

    /// Press a key (e.g. "Enter", "Tab") on the focused element.
    async fn press_key(&self, key: &str) -> Result<()>;

    /// PNG screenshot of the viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn close(&self) -> Result<()>;
}

/// Shared handle to a page driver.
pub type DriverRef = Arc<dyn PageDriver>;
