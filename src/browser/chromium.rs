//! Chromium-backed browser using chromiumoxide.
//!
//! Every session launches its own browser process in incognito mode, so no
//! cookies or storage carry over from one search term to the next.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{Browser, BrowserError, BrowserSession, ElementHandle};

/// Environment variable that overrides Chromium discovery.
pub const CHROMIUM_PATH_ENV: &str = "IMAGE_LOADER_CHROMIUM_PATH";

/// Default navigation timeout (30 seconds).
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Window size used for rendering.
const WINDOW_SIZE: (u32, u32) = (1920, 1080);

/// Find the Chromium binary path.
///
/// Checks `IMAGE_LOADER_CHROMIUM_PATH`, then `google-chrome`, `chromium` and
/// `chromium-browser` on `PATH`, then the default macOS install location.
#[must_use]
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
        warn!(path = %p, "{CHROMIUM_PATH_ENV} points to a missing file; falling back to PATH lookup");
    }

    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launch options for [`ChromiumBrowser`].
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    /// Explicit Chromium executable; discovered with [`find_chromium`] when `None`.
    pub executable: Option<PathBuf>,
    /// Maximum time a single navigation may take.
    pub navigation_timeout: Duration,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            executable: None,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
        }
    }
}

/// Chromium-based browser that launches one process per session.
#[derive(Debug, Clone, Default)]
pub struct ChromiumBrowser {
    options: ChromiumOptions,
}

impl ChromiumBrowser {
    /// Creates a browser with the given launch options.
    #[must_use]
    pub fn new(options: ChromiumOptions) -> Self {
        Self { options }
    }

    fn build_config(&self, headless: bool) -> Result<BrowserConfig, BrowserError> {
        let executable = self
            .options
            .executable
            .clone()
            .or_else(find_chromium)
            .ok_or_else(|| {
                BrowserError::launch(format!(
                    "Chromium not found. Install Chrome/Chromium or set {CHROMIUM_PATH_ENV}."
                ))
            })?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .no_sandbox()
            .window_size(WINDOW_SIZE.0, WINDOW_SIZE.1)
            .arg("--incognito")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if !headless {
            builder = builder.with_head();
        }

        builder
            .build()
            .map_err(|e| BrowserError::launch(format!("failed to build browser config: {e}")))
    }
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn open_session(&self, headless: bool) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let config = self.build_config(headless)?;

        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .map_err(|e| BrowserError::launch(format!("failed to launch Chromium: {e}")))?;

        // The CDP connection only makes progress while its handler is polled.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                trace!(?event, "chromium handler event");
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(BrowserError::launch(format!("failed to create page: {e}")));
            }
        };

        debug!(headless, "chromium session opened");

        Ok(Box::new(ChromiumSession {
            browser: Mutex::new(Some(browser)),
            page,
            handler_task,
            navigation_timeout: self.options.navigation_timeout,
        }))
    }
}

/// A single Chromium process showing one page.
pub struct ChromiumSession {
    browser: Mutex<Option<CdpBrowser>>,
    page: Page,
    handler_task: JoinHandle<()>,
    navigation_timeout: Duration,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        let timeout_ms = u64::try_from(self.navigation_timeout.as_millis()).unwrap_or(u64::MAX);
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::navigation(url, e)),
            Err(_) => Err(BrowserError::Timeout {
                url: url.to_string(),
                timeout_ms,
            }),
        }
    }

    async fn execute(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(BrowserError::script)?;

        // `undefined` results carry no value.
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, BrowserError> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(BrowserError::element)?;
        Ok(wrap_elements(elements))
    }

    async fn page_content(&self) -> Result<String, BrowserError> {
        self.page.content().await.map_err(BrowserError::script)
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        let this = *self;
        let browser = this.browser.into_inner();
        let result = match browser {
            Some(mut browser) => {
                let closed = browser.close().await.map(|_| ());
                let _ = browser.wait().await;
                closed.map_err(BrowserError::launch)
            }
            None => Ok(()),
        };
        this.handler_task.abort();
        debug!("chromium session closed");
        result
    }
}

/// Handle to an element of a Chromium page.
pub struct ChromiumElement {
    element: Element,
}

fn wrap_elements(elements: Vec<Element>) -> Vec<Box<dyn ElementHandle>> {
    elements
        .into_iter()
        .map(|element| Box::new(ChromiumElement { element }) as Box<dyn ElementHandle>)
        .collect()
}

#[async_trait]
impl ElementHandle for ChromiumElement {
    async fn click(&self) -> Result<(), BrowserError> {
        self.element
            .click()
            .await
            .map(|_| ())
            .map_err(BrowserError::element)
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError> {
        self.element
            .attribute(name)
            .await
            .map_err(BrowserError::element)
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, BrowserError> {
        let elements = self
            .element
            .find_elements(selector)
            .await
            .map_err(BrowserError::element)?;
        Ok(wrap_elements(elements))
    }
}
