use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Browser launch failed: {0}")]
    LaunchError(String),

    #[error("Navigation failed: {0}")]
    NavigationError(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("JavaScript error: {0}")]
    JsError(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotError(String),

    #[error("Invalid selector: {0:?}")]
    InvalidSelector(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration section missing: [{0}]")]
    ConfigMissing(String),

    #[error("Page object {page} could not be constructed: {reason}")]
    PageConstruction { page: &'static str, reason: String },

    #[error("Test session is closed")]
    SessionClosed,

    #[error("Blocking call made from inside an async runtime")]
    BlockingInAsync,

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// True for the "condition not met in time" family of failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
