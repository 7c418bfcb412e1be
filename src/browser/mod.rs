//! Browser automation capability.
//!
//! Defines the `Browser`, `BrowserSession` and `ElementHandle` traits that
//! abstract over the automation engine (currently Chromium via chromiumoxide).
//! The renderer and extractor only talk to these traits, so tests can swap in
//! a scripted implementation with canned DOM states.

pub mod chromium;

use async_trait::async_trait;
use thiserror::Error;

pub use chromium::{ChromiumBrowser, ChromiumOptions, find_chromium};

/// Errors reported by a browser backend.
#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    /// The browser process or session could not be started.
    #[error("failed to start browser session: {reason}")]
    Launch {
        /// Backend-specific failure description.
        reason: String,
    },

    /// Navigation to a URL failed.
    #[error("navigation to {url} failed: {reason}")]
    Navigation {
        /// The URL that could not be loaded.
        url: String,
        /// Backend-specific failure description.
        reason: String,
    },

    /// Navigation did not finish in time.
    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    Timeout {
        /// The URL that timed out.
        url: String,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// A script could not be evaluated in the page.
    #[error("script execution failed: {reason}")]
    Script {
        /// Backend-specific failure description.
        reason: String,
    },

    /// An element lookup, click or attribute read failed.
    #[error("element interaction failed: {reason}")]
    Element {
        /// Backend-specific failure description.
        reason: String,
    },
}

impl BrowserError {
    /// Creates a launch error.
    pub fn launch(reason: impl ToString) -> Self {
        Self::Launch {
            reason: reason.to_string(),
        }
    }

    /// Creates a navigation error.
    pub fn navigation(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a script error.
    pub fn script(reason: impl ToString) -> Self {
        Self::Script {
            reason: reason.to_string(),
        }
    }

    /// Creates an element error.
    pub fn element(reason: impl ToString) -> Self {
        Self::Element {
            reason: reason.to_string(),
        }
    }
}

/// A browser engine that can open isolated sessions.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Opens a new isolated session (no state shared with other sessions).
    async fn open_session(&self, headless: bool) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// A single browser session showing one page.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigates the session to `url`.
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;
    /// Evaluates a script expression in the page and returns its value.
    ///
    /// Expressions without a JSON-representable result yield `Value::Null`.
    async fn execute(&self, script: &str) -> Result<serde_json::Value, BrowserError>;
    /// Finds all elements matching a CSS selector in document order.
    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, BrowserError>;
    /// Returns the current page markup.
    async fn page_content(&self) -> Result<String, BrowserError>;
    /// Closes the session and releases its resources.
    async fn close(self: Box<Self>) -> Result<(), BrowserError>;
}

/// A handle to one element of a session's page.
#[async_trait]
pub trait ElementHandle: Send + Sync {
    /// Simulates a user click on the element.
    async fn click(&self) -> Result<(), BrowserError>;
    /// Reads an attribute, returning `None` if it is absent.
    async fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError>;
    /// Finds all descendant elements matching a CSS selector.
    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, BrowserError>;
}
