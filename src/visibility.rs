//! Picking one element out of several DOM matches.
//!
//! A selector often matches more than one node: a hidden template copy, a
//! desktop and a mobile variant of the same button, a disabled duplicate.
//! The helpers here probe every match once and choose the first one, in
//! document order, that passes a [`VisibilityFilter`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Observed state of one DOM match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementState {
    /// Non-empty box, not `visibility: hidden`, not `display: none`.
    pub visible: bool,
    /// Box intersects the current viewport.
    pub in_viewport: bool,
    /// Accepts text input: not read-only, not disabled.
    pub editable: bool,
    pub enabled: bool,
}

impl ElementState {
    pub fn visible() -> Self {
        Self {
            visible: true,
            in_viewport: true,
            editable: true,
            enabled: true,
        }
    }

    pub fn hidden() -> Self {
        Self {
            visible: false,
            in_viewport: false,
            editable: true,
            enabled: true,
        }
    }

    pub fn with_in_viewport(mut self, in_viewport: bool) -> Self {
        self.in_viewport = in_viewport;
        self
    }

    pub fn with_editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Predicate applied to each match. Visibility is always required.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibilityFilter {
    pub in_viewport: bool,
    pub editable: bool,
    pub enabled: bool,
}

impl VisibilityFilter {
    pub fn visible() -> Self {
        Self::default()
    }

    pub fn in_viewport(mut self) -> Self {
        self.in_viewport = true;
        self
    }

    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    pub fn accepts(&self, state: &ElementState) -> bool {
        state.visible
            && (!self.in_viewport || state.in_viewport)
            && (!self.editable || state.editable)
            && (!self.enabled || state.enabled)
    }

    pub fn describe(&self) -> String {
        let mut parts = vec!["visible"];
        if self.in_viewport {
            parts.push("in-viewport");
        }
        if self.editable {
            parts.push("editable");
        }
        if self.enabled {
            parts.push("enabled");
        }
        parts.join("+")
    }
}

/// Index of the first state, in document order, accepted by `filter`.
pub fn first_match(states: &[ElementState], filter: &VisibilityFilter) -> Option<usize> {
    states.iter().position(|s| filter.accepts(s))
}

/// Reject selectors that can never match before sending them to the browser.
pub fn check_selector(selector: &str) -> Result<()> {
    if selector.trim().is_empty() {
        return Err(Error::InvalidSelector(selector.to_string()));
    }
    Ok(())
}

/// Script that evaluates to a JSON array of [`ElementState`], one per match of
/// `selector`, in document order.
pub fn probe_script(selector: &str) -> Result<String> {
    let selector_js = serde_json::to_string(selector)?;
    Ok(format!(
        r#"
        (() => {{
            const vw = window.innerWidth || document.documentElement.clientWidth;
            const vh = window.innerHeight || document.documentElement.clientHeight;
            return Array.from(document.querySelectorAll({selector_js})).map(el => {{
                const rect = el.getBoundingClientRect();
                const style = window.getComputedStyle(el);
                const visible = rect.width > 0 && rect.height > 0
                    && style.visibility !== 'hidden'
                    && style.display !== 'none';
                const inViewport = visible
                    && rect.bottom > 0 && rect.right > 0
                    && rect.top < vh && rect.left < vw;
                const enabled = !el.disabled && !el.closest('fieldset[disabled]');
                const tag = el.tagName.toLowerCase();
                const textual = tag === 'textarea' || tag === 'select'
                    || (tag === 'input' && !['button', 'submit', 'reset', 'checkbox', 'radio', 'file', 'image', 'hidden'].includes(el.type))
                    || el.isContentEditable;
                const editable = enabled && textual && !el.readOnly;
                return {{ visible, inViewport, editable, enabled }};
            }});
        }})()
        "#
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_only_visible_match() {
        let states = [ElementState::hidden(), ElementState::visible(), ElementState::hidden()];
        assert_eq!(first_match(&states, &VisibilityFilter::visible()), Some(1));
    }

    #[test]
    fn picks_first_in_document_order() {
        let states = [ElementState::hidden(), ElementState::visible(), ElementState::visible()];
        assert_eq!(first_match(&states, &VisibilityFilter::visible()), Some(1));
    }

    #[test]
    fn none_when_nothing_is_visible() {
        let states = [ElementState::hidden(), ElementState::hidden()];
        assert_eq!(first_match(&states, &VisibilityFilter::visible()), None);
        assert_eq!(first_match(&[], &VisibilityFilter::visible()), None);
    }

    #[test]
    fn viewport_and_editable_narrow_the_choice() {
        let states = [
            ElementState::visible().with_in_viewport(false),
            ElementState::visible().with_editable(false),
            ElementState::visible(),
        ];
        assert_eq!(first_match(&states, &VisibilityFilter::visible()), Some(0));
        assert_eq!(
            first_match(&states, &VisibilityFilter::visible().in_viewport()),
            Some(1)
        );
        assert_eq!(
            first_match(&states, &VisibilityFilter::visible().in_viewport().editable()),
            Some(2)
        );
    }

    #[test]
    fn disabled_elements_are_skipped_when_enabled_is_required() {
        let states = [ElementState::visible().with_enabled(false), ElementState::visible()];
        assert_eq!(first_match(&states, &VisibilityFilter::visible().enabled()), Some(1));
    }

    #[test]
    fn probe_state_deserialises_from_camel_case() {
        let json = r#"[{"visible":true,"inViewport":false,"editable":false,"enabled":true}]"#;
        let states: Vec<ElementState> = serde_json::from_str(json).unwrap();
        assert_eq!(states[0], ElementState::visible().with_in_viewport(false).with_editable(false));
    }

    #[test]
    fn probe_script_quotes_the_selector() {
        let script = probe_script(r#"a[title="it's"]"#).unwrap();
        assert!(script.contains(r#"querySelectorAll("a[title=\"it's\"]")"#));
    }

    #[test]
    fn blank_selector_is_rejected() {
        assert!(matches!(check_selector("  "), Err(Error::InvalidSelector(_))));
        assert!(check_selector("a.btn").is_ok());
    }

    #[test]
    fn filter_description_lists_requirements() {
        assert_eq!(VisibilityFilter::visible().describe(), "visible");
        assert_eq!(
            VisibilityFilter::visible().in_viewport().editable().describe(),
            "visible+in-viewport+editable"
        );
    }
}
