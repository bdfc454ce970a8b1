//! Script-injected fallbacks for when native input is unreliable: obscured
//! elements, custom focus handling, inputs that swallow synthetic keys.
//!
//! These act on the first DOM match immediately. They do not wait for the
//! element and do not retry; call [`Locator::wait_for`] first if the element
//! may not be attached yet.

use tracing::debug;

use crate::driver::PageDriver;
use crate::error::Result;
use crate::locator::Locator;
use crate::visibility;

/// Wrap `body` (which may use `el`) in a script that resolves the first match
/// of `selector` and throws if there is none.
fn element_script(selector: &str, body: &str) -> Result<String> {
    let selector_js = serde_json::to_string(selector)?;
    Ok(format!(
        r#"
        (() => {{
            const el = document.querySelector({selector_js});
            if (!el) throw new Error('Element not found: ' + {selector_js});
            {body}
            return true;
        }})()
        "#
    ))
}

pub fn click_script(selector: &str) -> Result<String> {
    element_script(selector, "el.click();")
}

pub fn double_click_script(selector: &str) -> Result<String> {
    element_script(
        selector,
        "el.dispatchEvent(new MouseEvent('dblclick', { bubbles: true, cancelable: true, view: window }));",
    )
}

/// Sets `value`, then fires `input` and `change` once each.
pub fn fill_script(selector: &str, text: &str) -> Result<String> {
    let text_js = serde_json::to_string(text)?;
    element_script(
        selector,
        &format!(
            "el.focus();
            el.value = {text_js};
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));"
        ),
    )
}

pub fn scroll_into_view_script(selector: &str) -> Result<String> {
    element_script(
        selector,
        "el.scrollIntoView({ block: 'center', inline: 'nearest' });",
    )
}

impl Locator {
    pub async fn js_click(&self) -> Result<()> {
        self.run_js("js_click", click_script(self.selector())?).await
    }

    pub async fn js_double_click(&self) -> Result<()> {
        self.run_js("js_double_click", double_click_script(self.selector())?)
            .await
    }

    pub async fn js_fill(&self, text: &str) -> Result<()> {
        self.run_js("js_fill", fill_script(self.selector(), text)?)
            .await
    }

    /// Same as `js_fill("")`: listeners still see `input` and `change`.
    pub async fn js_clear(&self) -> Result<()> {
        self.run_js("js_clear", fill_script(self.selector(), "")?)
            .await
    }

    pub async fn js_scroll_into_view(&self) -> Result<()> {
        self.run_js("js_scroll_into_view", scroll_into_view_script(self.selector())?)
            .await
    }

    async fn run_js(&self, action: &str, script: String) -> Result<()> {
        visibility::check_selector(self.selector())?;
        debug!(selector = self.selector(), action, "script fallback");
        self.driver().evaluate(&script).await?;
        Ok(())
    }
}

/// Scroll the window by `(x, y)` pixels.
pub async fn scroll_by(driver: &dyn PageDriver, x: i64, y: i64) -> Result<()> {
    driver
        .evaluate(&format!("window.scrollBy({x}, {y})"))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::TestConfiguration;
    use crate::driver::DriverRef;
    use crate::error::Error;
    use crate::mock::MockDriver;

    fn locator(driver: &Arc<MockDriver>, selector: &str) -> Locator {
        let driver: DriverRef = driver.clone();
        Locator::new(driver, Arc::new(TestConfiguration::default()), selector)
    }

    #[test]
    fn fill_fires_input_and_change_once_each() {
        let script = fill_script("#email", "a@b.c").unwrap();
        assert_eq!(script.matches("new Event('input'").count(), 1);
        assert_eq!(script.matches("new Event('change'").count(), 1);
        assert!(script.contains(r#"el.value = "a@b.c";"#));
        let input = script.find("'input'").unwrap();
        let change = script.find("'change'").unwrap();
        assert!(input < change);
    }

    #[test]
    fn fill_text_with_quotes_and_newlines_stays_a_literal() {
        let script = fill_script("#note", "it's \"quoted\"\nnext line").unwrap();
        assert!(script.contains(r#"el.value = "it's \"quoted\"\nnext line";"#));
    }

    #[test]
    fn missing_element_throws_in_page() {
        let script = click_script("button.submit").unwrap();
        assert!(script.contains(r#"document.querySelector("button.submit")"#));
        assert!(script.contains("throw new Error('Element not found: '"));
    }

    #[tokio::test]
    async fn js_actions_do_not_probe_first() {
        let driver = Arc::new(MockDriver::new());
        let loc = locator(&driver, "#save");
        loc.js_click().await.unwrap();
        loc.js_double_click().await.unwrap();
        loc.js_scroll_into_view().await.unwrap();
        assert_eq!(driver.probe_count("#save"), 0);

        let scripts = driver.scripts();
        assert_eq!(scripts.len(), 3);
        assert!(scripts[0].contains("el.click();"));
        assert!(scripts[1].contains("'dblclick'"));
        assert!(scripts[2].contains("scrollIntoView"));
    }

    #[tokio::test]
    async fn js_clear_empties_the_value() {
        let driver = Arc::new(MockDriver::new());
        locator(&driver, "#q").js_clear().await.unwrap();
        assert!(driver.scripts()[0].contains(r#"el.value = "";"#));
    }

    #[tokio::test]
    async fn script_error_surfaces_as_js_error() {
        let driver = Arc::new(MockDriver::new());
        driver.push_eval_error("Element not found: #gone");
        let err = locator(&driver, "#gone").js_fill("x").await.unwrap_err();
        assert!(matches!(err, Error::JsError(ref m) if m.contains("#gone")));
    }

    #[tokio::test]
    async fn scroll_by_moves_the_window() {
        let driver = MockDriver::new();
        scroll_by(&driver, 0, -400).await.unwrap();
        assert_eq!(driver.scripts(), vec!["window.scrollBy(0, -400)".to_string()]);
    }
}
