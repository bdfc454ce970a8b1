use chromiumoxide::element::Element as CrElement;

use crate::error::Result;

/// Wrapper around a chromiumoxide Element with the handful of native
/// interactions [`crate::cdp::CdpDriver`] needs.
pub struct Element {
    inner: CrElement,
}

impl Element {
    pub(crate) fn new(inner: CrElement) -> Self {
        Self { inner }
    }

    /// Click this element (scrolls into view first).
    pub async fn click(&self) -> Result<()> {
        self.inner.click().await?;
        Ok(())
    }

    /// Focus this element.
    pub async fn focus(&self) -> Result<()> {
        self.inner.focus().await?;
        Ok(())
    }

    /// Empty the element's value without firing key events.
    pub async fn clear(&self) -> Result<()> {
        self.inner
            .call_js_fn(
                "function() { if ('value' in this) { this.value = ''; } else { this.textContent = ''; } }",
                false,
            )
            .await?;
        Ok(())
    }

    /// Focus, clear, then type `text` key by key.
    pub async fn fill(&self, text: &str) -> Result<()> {
        self.focus().await?;
        self.clear().await?;
        self.inner.type_str(text).await?;
        Ok(())
    }

    /// Press a key on this element (e.g. "Enter", "Tab").
    pub async fn press_key(&self, key: &str) -> Result<()> {
        self.inner.press_key(key).await?;
        Ok(())
    }

    /// Scroll this element into view.
    pub async fn scroll_into_view(&self) -> Result<()> {
        self.inner.scroll_into_view().await?;
        Ok(())
    }

    /// Get the inner text of this element; empty when it has none.
    pub async fn inner_text(&self) -> Result<String> {
        Ok(self.inner.inner_text().await?.unwrap_or_default())
    }
}
