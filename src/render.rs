//! Page rendering: forcing an infinite-scroll results page to materialize.
//!
//! A [`PageRenderer`] opens a fresh browser session per term, loads the
//! search results page, dismisses a consent interstitial when one is shown,
//! and scrolls until the page stops growing and no "load more" control can
//! be activated.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use image_loader::browser::ChromiumBrowser;
//! use image_loader::{PageMarkers, PageRenderer, RenderSettings, SearchTerm};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let renderer = PageRenderer::new(
//!     Arc::new(ChromiumBrowser::default()),
//!     image_loader::render::DEFAULT_QUERY_TEMPLATE,
//!     PageMarkers::default(),
//!     RenderSettings::default(),
//! );
//! let term = SearchTerm::parse("red pandas").ok_or("blank term")?;
//! let page = renderer.render(&term).await?;
//! println!("scrolled {} rounds", page.scroll_rounds());
//! page.close().await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::browser::{Browser, BrowserError, BrowserSession};
use crate::terms::SearchTerm;

/// Query URL template; `{query}` is replaced by the encoded term.
pub const DEFAULT_QUERY_TEMPLATE: &str = "https://www.google.com/search?q={query}&tbm=isch";

/// Placeholder substituted in the query template.
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// Script returning the current document height.
pub const PAGE_HEIGHT_SCRIPT: &str = "document.body.scrollHeight";

/// Script scrolling the viewport to the bottom of the document.
pub const SCROLL_TO_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// Default wait after each scroll or load-more activation.
pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_millis(1000);

/// Default total time allowed for scrolling one term's page.
pub const DEFAULT_RENDER_BUDGET: Duration = Duration::from_secs(120);

/// CSS selectors identifying the parts of the results page the pipeline touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMarkers {
    /// Consent/cookie interstitial accept button.
    pub consent_button: String,
    /// "Show more results" control at the end of the page.
    pub load_more: String,
    /// Result thumbnails, in document order.
    pub thumbnail: String,
    /// Full-resolution image element revealed by activating a thumbnail.
    pub revealed_image: String,
    /// Attribute of the revealed element holding the image locator.
    pub locator_attribute: String,
}

impl Default for PageMarkers {
    fn default() -> Self {
        Self {
            consent_button: "button#L2AGLb".to_string(),
            load_more: "input.mye4qd".to_string(),
            thumbnail: "img.Q4LuWd".to_string(),
            revealed_image: "img.n3VNCb".to_string(),
            locator_attribute: "src".to_string(),
        }
    }
}

/// Timing and mode settings for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    /// Run the browser without a visible window.
    pub headless: bool,
    /// Wait after each scroll or load-more activation before re-measuring.
    pub settle_interval: Duration,
    /// Upper bound on the scroll loop for one term.
    pub render_budget: Duration,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            headless: true,
            settle_interval: DEFAULT_SETTLE_INTERVAL,
            render_budget: DEFAULT_RENDER_BUDGET,
        }
    }
}

/// Errors that prevent a term's page from being rendered.
#[derive(Debug, Error)]
pub enum RenderError {
    /// No browser session could be opened.
    #[error("could not open browser session for '{term}': {source}")]
    SessionUnavailable {
        /// The term being rendered.
        term: String,
        /// The underlying browser error.
        #[source]
        source: BrowserError,
    },

    /// The search results page could not be loaded.
    #[error("could not load results page for '{term}': {source}")]
    Navigation {
        /// The term being rendered.
        term: String,
        /// The underlying browser error.
        #[source]
        source: BrowserError,
    },
}

/// A fully scrolled results page, still live in its browser session.
///
/// Held only until references have been extracted; call [`close`](Self::close)
/// afterwards to release the browser.
pub struct RenderedPage {
    term: SearchTerm,
    url: String,
    session: Box<dyn BrowserSession>,
    progress: ScrollProgress,
    complete: bool,
}

impl fmt::Debug for RenderedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedPage")
            .field("term", &self.term)
            .field("url", &self.url)
            .field("progress", &self.progress)
            .field("complete", &self.complete)
            .finish_non_exhaustive()
    }
}

impl RenderedPage {
    /// Returns the term this page was rendered for.
    #[must_use]
    pub fn term(&self) -> &SearchTerm {
        &self.term
    }

    /// Returns the URL that was loaded.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the live session showing the page.
    #[must_use]
    pub fn session(&self) -> &dyn BrowserSession {
        self.session.as_ref()
    }

    /// Number of scroll-to-bottom steps performed.
    #[must_use]
    pub fn scroll_rounds(&self) -> usize {
        self.progress.rounds
    }

    /// Number of successful load-more activations.
    #[must_use]
    pub fn load_more_clicks(&self) -> usize {
        self.progress.load_more_clicks
    }

    /// Last measured document height.
    #[must_use]
    pub fn height(&self) -> u64 {
        self.progress.height
    }

    /// `false` when the render budget ran out before the end of the page.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Returns the current page markup.
    ///
    /// # Errors
    ///
    /// Returns the browser error if the markup cannot be read.
    pub async fn content(&self) -> Result<String, BrowserError> {
        self.session.page_content().await
    }

    /// Closes the underlying browser session. Close failures are only logged.
    pub async fn close(self) {
        close_quietly(self.session, &self.term).await;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ScrollProgress {
    rounds: usize,
    load_more_clicks: usize,
    height: u64,
}

/// Drives a browser to load and fully materialize one results page per term.
#[derive(Clone)]
pub struct PageRenderer {
    browser: Arc<dyn Browser>,
    query_template: String,
    markers: PageMarkers,
    settings: RenderSettings,
}

impl fmt::Debug for PageRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageRenderer")
            .field("query_template", &self.query_template)
            .field("markers", &self.markers)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl PageRenderer {
    /// Creates a renderer.
    ///
    /// `query_template` must contain `{query}`; if it does not, the encoded
    /// term is appended to the template.
    #[must_use]
    pub fn new(
        browser: Arc<dyn Browser>,
        query_template: impl Into<String>,
        markers: PageMarkers,
        settings: RenderSettings,
    ) -> Self {
        Self {
            browser,
            query_template: query_template.into(),
            markers,
            settings,
        }
    }

    /// Returns the configured settings.
    #[must_use]
    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Builds the results page URL for `term`.
    #[must_use]
    pub fn search_url(&self, term: &SearchTerm) -> String {
        let encoded = term.url_encoded_query();
        if self.query_template.contains(QUERY_PLACEHOLDER) {
            self.query_template.replace(QUERY_PLACEHOLDER, &encoded)
        } else {
            format!("{}{encoded}", self.query_template)
        }
    }

    /// Opens a new session for `term`, loads its results page and scrolls it
    /// to the end.
    ///
    /// Reaching the end of the page is not an error. If the render budget
    /// runs out first, the partially loaded page is returned with
    /// [`RenderedPage::is_complete`] set to `false`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SessionUnavailable`] if no session can be opened
    /// and [`RenderError::Navigation`] if the page cannot be loaded.
    #[instrument(skip(self), fields(term = %term))]
    pub async fn render(&self, term: &SearchTerm) -> Result<RenderedPage, RenderError> {
        let url = self.search_url(term);
        debug!(url = %url, "opening browser session");

        let mut session = self
            .browser
            .open_session(self.settings.headless)
            .await
            .map_err(|source| RenderError::SessionUnavailable {
                term: term.to_string(),
                source,
            })?;

        if let Err(source) = session.navigate(&url).await {
            close_quietly(session, term).await;
            return Err(RenderError::Navigation {
                term: term.to_string(),
                source,
            });
        }

        self.dismiss_consent(session.as_ref()).await;

        let mut progress = ScrollProgress::default();
        let complete = tokio::time::timeout(
            self.settings.render_budget,
            self.scroll_to_end(session.as_ref(), &mut progress),
        )
        .await
        .is_ok();

        if complete {
            info!(
                rounds = progress.rounds,
                load_more_clicks = progress.load_more_clicks,
                height = progress.height,
                "page fully rendered"
            );
        } else {
            warn!(
                budget_secs = self.settings.render_budget.as_secs(),
                rounds = progress.rounds,
                "render budget exhausted; continuing with partially loaded page"
            );
        }

        Ok(RenderedPage {
            term: term.clone(),
            url,
            session,
            progress,
            complete,
        })
    }

    /// Clicks the consent button if the interstitial is shown.
    async fn dismiss_consent(&self, session: &dyn BrowserSession) {
        let buttons = match session.find_all(&self.markers.consent_button).await {
            Ok(buttons) => buttons,
            Err(e) => {
                debug!(error = %e, "consent lookup failed; assuming no interstitial");
                return;
            }
        };
        let Some(button) = buttons.first() else {
            debug!("no consent interstitial");
            return;
        };
        match button.click().await {
            Ok(()) => debug!("dismissed consent interstitial"),
            Err(e) => debug!(error = %e, "could not dismiss consent interstitial"),
        }
    }

    /// Scrolls until the height stops growing and no load-more control responds.
    async fn scroll_to_end(&self, session: &dyn BrowserSession, progress: &mut ScrollProgress) {
        let Some(mut height) = measure_height(session).await else {
            return;
        };
        progress.height = height;

        loop {
            if let Err(e) = session.execute(SCROLL_TO_BOTTOM_SCRIPT).await {
                warn!(error = %e, "scroll failed; treating as end of page");
                return;
            }
            progress.rounds += 1;
            tokio::time::sleep(self.settings.settle_interval).await;

            let Some(new_height) = measure_height(session).await else {
                return;
            };
            if new_height > height {
                debug!(round = progress.rounds, height = new_height, "page grew");
                height = new_height;
                progress.height = height;
                continue;
            }

            if self.trigger_load_more(session).await {
                progress.load_more_clicks += 1;
                tokio::time::sleep(self.settings.settle_interval).await;
                continue;
            }

            debug!(round = progress.rounds, height, "end of page reached");
            return;
        }
    }

    /// Activates the load-more control. Returns `false` if it is absent or
    /// the click fails.
    async fn trigger_load_more(&self, session: &dyn BrowserSession) -> bool {
        let controls = match session.find_all(&self.markers.load_more).await {
            Ok(controls) => controls,
            Err(e) => {
                debug!(error = %e, "load-more lookup failed");
                return false;
            }
        };
        let Some(control) = controls.first() else {
            return false;
        };
        match control.click().await {
            Ok(()) => {
                debug!("activated load-more control");
                true
            }
            Err(e) => {
                debug!(error = %e, "load-more control did not respond");
                false
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
async fn measure_height(session: &dyn BrowserSession) -> Option<u64> {
    match session.execute(PAGE_HEIGHT_SCRIPT).await {
        Ok(value) => {
            let height = value
                .as_u64()
                .or_else(|| value.as_f64().filter(|h| *h >= 0.0).map(|h| h as u64));
            if height.is_none() {
                warn!(value = %value, "page height is not a number; treating as end of page");
            }
            height
        }
        Err(e) => {
            warn!(error = %e, "could not measure page height; treating as end of page");
            None
        }
    }
}

async fn close_quietly(session: Box<dyn BrowserSession>, term: &SearchTerm) {
    if let Err(e) = session.close().await {
        warn!(term = %term, error = %e, "failed to close browser session");
    }
}
