//! In-memory [`PageDriver`] for tests that should not need a browser.
//!
//! Elements are registered per selector with a scripted [`ElementState`];
//! every interaction is recorded as an [`Action`] for later assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::browser::{ContextId, PageProvider};
use crate::driver::{DriverRef, PageDriver};
use crate::error::{Error, Result};
use crate::visibility::ElementState;

/// PNG signature, enough for callers that sniff the format.
const FAKE_PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// A recorded driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Goto(String),
    Evaluate(String),
    Click { selector: String, index: usize },
    Fill { selector: String, index: usize, text: String },
    ScrollIntoView { selector: String, index: usize },
    PressKey(String),
    Screenshot,
    Close,
}

#[derive(Debug, Clone, Default)]
pub struct MockElement {
    pub state: ElementState,
    pub text: String,
    pub value: String,
}

impl MockElement {
    pub fn new(state: ElementState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

/// States that replace a selector's elements once it has been probed
/// `after` times.
#[derive(Debug)]
struct Reveal {
    after: usize,
    states: Vec<ElementState>,
}

#[derive(Debug, Default)]
struct MockState {
    url: String,
    title: String,
    html: String,
    elements: HashMap<String, Vec<MockElement>>,
    reveals: HashMap<String, Reveal>,
    probes: HashMap<String, usize>,
    eval_results: VecDeque<std::result::Result<Value, String>>,
    actions: Vec<Action>,
    fail_screenshot: bool,
}

#[derive(Debug, Default)]
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register matches for `selector`, replacing any previous ones.
    pub fn with_elements(self, selector: &str, states: Vec<ElementState>) -> Self {
        self.set_elements(selector, states);
        self
    }

    pub fn with_element(self, selector: &str, element: MockElement) -> Self {
        self.state
            .lock()
            .elements
            .entry(selector.to_string())
            .or_default()
            .push(element);
        self
    }

    pub fn with_html(self, html: impl Into<String>) -> Self {
        self.state.lock().html = html.into();
        self
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.state.lock().title = title.into();
        self
    }

    pub fn set_elements(&self, selector: &str, states: Vec<ElementState>) {
        let elements = states.into_iter().map(MockElement::new).collect();
        self.state
            .lock()
            .elements
            .insert(selector.to_string(), elements);
    }

    /// After `probes` probes of `selector`, its matches become `states`.
    pub fn reveal_after(&self, selector: &str, probes: usize, states: Vec<ElementState>) {
        self.state.lock().reveals.insert(
            selector.to_string(),
            Reveal {
                after: probes,
                states,
            },
        );
    }

    /// Queue the result of the next `evaluate` call.
    pub fn push_eval_result(&self, value: Value) {
        self.state.lock().eval_results.push_back(Ok(value));
    }

    /// Make the next `evaluate` call fail as a script exception would.
    pub fn push_eval_error(&self, message: impl Into<String>) {
        self.state.lock().eval_results.push_back(Err(message.into()));
    }

    pub fn fail_screenshots(&self) {
        self.state.lock().fail_screenshot = true;
    }

    pub fn actions(&self) -> Vec<Action> {
        self.state.lock().actions.clone()
    }

    /// Every script passed to `evaluate`, in call order.
    pub fn scripts(&self) -> Vec<String> {
        self.state
            .lock()
            .actions
            .iter()
            .filter_map(|a| match a {
                Action::Evaluate(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clicks(&self) -> Vec<(String, usize)> {
        self.state
            .lock()
            .actions
            .iter()
            .filter_map(|a| match a {
                Action::Click { selector, index } => Some((selector.clone(), *index)),
                _ => None,
            })
            .collect()
    }

    pub fn probe_count(&self, selector: &str) -> usize {
        self.state.lock().probes.get(selector).copied().unwrap_or(0)
    }

    /// Current value of the `index`-th match, as left by `fill_nth`.
    pub fn value_of(&self, selector: &str, index: usize) -> Option<String> {
        self.state
            .lock()
            .elements
            .get(selector)
            .and_then(|els| els.get(index))
            .map(|el| el.value.clone())
    }

    fn record(&self, action: Action) {
        self.state.lock().actions.push(action);
    }

    fn check_index(state: &MockState, selector: &str, index: usize) -> Result<()> {
        let count = state.elements.get(selector).map_or(0, Vec::len);
        if index < count {
            Ok(())
        } else {
            Err(Error::ElementNotFound(format!(
                "{selector}[{index}] (only {count} matches)"
            )))
        }
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.url = url.to_string();
        state.actions.push(Action::Goto(url.to_string()));
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.state.lock().url.clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.state.lock().title.clone())
    }

    async fn content(&self) -> Result<String> {
        Ok(self.state.lock().html.clone())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let mut state = self.state.lock();
        state.actions.push(Action::Evaluate(script.to_string()));
        match state.eval_results.pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(Error::JsError(message)),
            None => Ok(Value::Null),
        }
    }

    async fn probe(&self, selector: &str) -> Result<Vec<ElementState>> {
        let mut state = self.state.lock();
        let seen = {
            let count = state.probes.entry(selector.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let due = state
            .reveals
            .get(selector)
            .is_some_and(|r| seen > r.after);
        if due {
            if let Some(reveal) = state.reveals.remove(selector) {
                let elements = reveal.states.into_iter().map(MockElement::new).collect();
                state.elements.insert(selector.to_string(), elements);
            }
        }
        Ok(state
            .elements
            .get(selector)
            .map(|els| els.iter().map(|el| el.state).collect())
            .unwrap_or_default())
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_index(&state, selector, index)?;
        state.actions.push(Action::Click {
            selector: selector.to_string(),
            index,
        });
        Ok(())
    }

    async fn fill_nth(&self, selector: &str, index: usize, text: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_index(&state, selector, index)?;
        if let Some(el) = state
            .elements
            .get_mut(selector)
            .and_then(|els| els.get_mut(index))
        {
            el.value = text.to_string();
        }
        state.actions.push(Action::Fill {
            selector: selector.to_string(),
            index,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn scroll_nth_into_view(&self, selector: &str, index: usize) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_index(&state, selector, index)?;
        state.actions.push(Action::ScrollIntoView {
            selector: selector.to_string(),
            index,
        });
        Ok(())
    }

    async fn text_nth(&self, selector: &str, index: usize) -> Result<String> {
        let state = self.state.lock();
        Self::check_index(&state, selector, index)?;
        Ok(state
            .elements
            .get(selector)
            .and_then(|els| els.get(index))
            .map(|el| el.text.clone())
            .unwrap_or_default())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.record(Action::PressKey(key.to_string()));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        if self.state.lock().fail_screenshot {
            return Err(Error::ScreenshotError("mock screenshot failure".into()));
        }
        self.record(Action::Screenshot);
        Ok(FAKE_PNG.to_vec())
    }

    async fn close(&self) -> Result<()> {
        self.record(Action::Close);
        Ok(())
    }
}

type PageSetup = Box<dyn Fn() -> MockDriver + Send + Sync>;

/// In-memory [`PageProvider`]: every page is a fresh [`MockDriver`].
#[derive(Default)]
pub struct MockBrowser {
    setup: Option<PageSetup>,
    next_context: Mutex<usize>,
    open_contexts: Mutex<Vec<ContextId>>,
    pages: Mutex<Vec<Arc<MockDriver>>>,
    fail_next_page: Mutex<bool>,
    closed: Mutex<bool>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build each new page with `setup` instead of an empty driver.
    pub fn with_page_setup<F>(mut self, setup: F) -> Self
    where
        F: Fn() -> MockDriver + Send + Sync + 'static,
    {
        self.setup = Some(Box::new(setup));
        self
    }

    /// Make the next `new_page` fail as a crashed target would.
    pub fn fail_next_page(&self) {
        *self.fail_next_page.lock() = true;
    }

    /// Every page opened so far, in order.
    pub fn pages(&self) -> Vec<Arc<MockDriver>> {
        self.pages.lock().clone()
    }

    pub fn open_contexts(&self) -> Vec<ContextId> {
        self.open_contexts.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

#[async_trait]
impl PageProvider for MockBrowser {
    async fn new_context(&self) -> Result<ContextId> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let id = {
            let mut next = self.next_context.lock();
            *next += 1;
            ContextId::new(format!("mock-context-{}", *next))
        };
        self.open_contexts.lock().push(id.clone());
        Ok(id)
    }

    async fn new_page(&self, context: &ContextId, url: &str) -> Result<DriverRef> {
        if !self.open_contexts.lock().contains(context) {
            return Err(Error::Config(format!("unknown browser context {context}")));
        }
        if std::mem::take(&mut *self.fail_next_page.lock()) {
            return Err(Error::NavigationError(format!("mock page failure at {url}")));
        }
        let driver = Arc::new(self.setup.as_ref().map_or_else(MockDriver::new, |f| f()));
        driver.goto(url).await?;
        self.pages.lock().push(Arc::clone(&driver));
        Ok(driver)
    }

    async fn close_context(&self, context: &ContextId) -> Result<()> {
        self.open_contexts.lock().retain(|c| c != context);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.open_contexts.lock().clear();
        *self.closed.lock() = true;
        Ok(())
    }
}
