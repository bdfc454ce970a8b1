pub mod blocking;
pub mod browser;
pub mod cdp;
pub mod config;
pub mod driver;
pub mod element;
pub mod error;
pub mod factory;
pub mod highlight;
pub mod js_actions;
pub mod locator;
pub mod logging;
pub mod mock;
pub mod report;
pub mod retry;
pub mod session;
pub mod visibility;

pub use blocking::BlockingRunner;
pub use browser::{BrowserManager, ContextId, PageProvider};
pub use cdp::CdpDriver;
pub use config::{BrowserBuilder, TestConfiguration};
pub use driver::{DriverRef, PageDriver};
pub use error::{Error, Result};
pub use factory::{PageContext, PageFactory, PageObject};
pub use locator::Locator;
pub use mock::{MockBrowser, MockDriver};
pub use report::ReportWriter;
pub use retry::{retry, RetryPolicy};
pub use session::{Outcome, TestCase, TestSuite};
pub use visibility::{ElementState, VisibilityFilter};
