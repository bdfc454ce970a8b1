//! Temporary outline around the element about to be acted on, so headed
//! runs and failure screenshots show what the test touched.

use std::time::Duration;

use tracing::debug;

use crate::config::ExecutionSettings;
use crate::driver::PageDriver;
use crate::error::Result;

pub const HIGHLIGHT_STYLE: &str = "3px solid #ff2d55";

/// Script that outlines the `index`-th match of `selector` and restores its
/// original outline after `duration` on the page's own timer.
///
/// The original outline is stored on the element the first time and a
/// pending restore is cancelled, so back-to-back highlights of the same
/// element still end with the original style.
pub fn highlight_script(selector: &str, index: usize, duration: Duration) -> Result<String> {
    let selector_js = serde_json::to_string(selector)?;
    let style_js = serde_json::to_string(HIGHLIGHT_STYLE)?;
    let millis = duration.as_millis();
    Ok(format!(
        r#"
        (() => {{
            const el = document.querySelectorAll({selector_js})[{index}];
            if (!el) return false;
            if (el.dataset.pageflowOutline === undefined) {{
                el.dataset.pageflowOutline = el.style.outline;
            }}
            if (el.pageflowHighlightTimer) clearTimeout(el.pageflowHighlightTimer);
            el.style.outline = {style_js};
            el.pageflowHighlightTimer = setTimeout(() => {{
                el.style.outline = el.dataset.pageflowOutline;
                delete el.dataset.pageflowOutline;
                delete el.pageflowHighlightTimer;
            }}, {millis});
            return true;
        }})()
        "#
    ))
}

/// Outline the element if highlighting is enabled with a non-zero duration.
///
/// Returns whether a highlight was applied. Never sleeps: removal is
/// scheduled in the page, so the action proceeds while the outline shows.
pub async fn highlight(
    driver: &dyn PageDriver,
    selector: &str,
    index: usize,
    settings: &ExecutionSettings,
) -> Result<bool> {
    let duration = settings.highlight_duration();
    if !settings.highlight_elements || duration.is_zero() {
        return Ok(false);
    }
    let script = highlight_script(selector, index, duration)?;
    let applied = driver.evaluate(&script).await?.as_bool().unwrap_or(false);
    debug!(selector, index, applied, "highlight");
    Ok(applied)
}
