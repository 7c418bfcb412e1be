//! Scripted in-memory browser for pipeline tests.
//!
//! Each results page is described by a [`PageScript`]: the sequence of
//! document heights it reports, how many times a load-more control responds,
//! and its thumbnails. Activating a thumbnail reveals its locator the way the
//! real results page does: the first reveal lands in slot 0 and every later
//! one is inserted at slot 1.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image_loader::render::{PAGE_HEIGHT_SCRIPT, SCROLL_TO_BOTTOM_SCRIPT};
use image_loader::{Browser, BrowserError, BrowserSession, ElementHandle, PageMarkers};
use url::Url;

/// Height added to the page by each load-more activation.
const LOAD_MORE_GROWTH: u64 = 1000;

/// One thumbnail on a scripted page.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    /// Locator revealed when the thumbnail is activated; `None` reveals an
    /// element without the locator attribute.
    pub locator: Option<String>,
    /// Make activation fail.
    pub click_fails: bool,
}

impl Thumbnail {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: Some(locator.into()),
            click_fails: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            locator: None,
            click_fails: true,
        }
    }

    pub fn without_locator() -> Self {
        Self {
            locator: None,
            click_fails: false,
        }
    }
}

/// Behaviour of one results page.
#[derive(Debug, Clone, Default)]
pub struct PageScript {
    /// Successive height readings; the last one repeats.
    pub heights: Vec<u64>,
    /// How many times the load-more control is present and responds.
    pub load_more: usize,
    /// Make the load-more control present but unresponsive.
    pub load_more_fails: bool,
    /// Show a consent interstitial.
    pub consent: bool,
    /// Make thumbnail lookup fail outright.
    pub thumbnail_lookup_fails: bool,
    /// Thumbnails in document order.
    pub thumbnails: Vec<Thumbnail>,
}

impl PageScript {
    /// A static page (no growth) with the given locators.
    pub fn with_locators<I, S>(locators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            heights: vec![1000],
            thumbnails: locators.into_iter().map(Thumbnail::new).collect(),
            ..Self::default()
        }
    }
}

/// What the fake browser observed, shared with the test.
#[derive(Debug, Default)]
pub struct BrowserLog {
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    pub navigations: Vec<String>,
    pub scrolls: usize,
    pub height_reads: usize,
    pub consent_dismissed: usize,
    pub load_more_clicks: usize,
    pub thumbnail_clicks: usize,
    pub headless: Vec<bool>,
}

/// Browser whose pages are looked up by the `q` query parameter.
#[derive(Debug, Clone, Default)]
pub struct FakeBrowser {
    pages: HashMap<String, PageScript>,
    fail_open: bool,
    fail_navigation: HashSet<String>,
    markers: PageMarkers,
    log: Arc<Mutex<BrowserLog>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, query: &str, script: PageScript) -> Self {
        self.pages.insert(query.to_string(), script);
        self
    }

    pub fn failing_to_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_navigation_for(mut self, query: &str) -> Self {
        self.fail_navigation.insert(query.to_string());
        self
    }

    pub fn log(&self) -> Arc<Mutex<BrowserLog>> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn open_session(&self, headless: bool) -> Result<Box<dyn BrowserSession>, BrowserError> {
        if self.fail_open {
            return Err(BrowserError::launch("scripted launch failure"));
        }
        {
            let mut log = self.log.lock().unwrap();
            log.sessions_opened += 1;
            log.headless.push(headless);
        }
        Ok(Box::new(FakeSession {
            browser: self.clone(),
            page: Arc::new(Mutex::new(PageState::default())),
        }))
    }
}

#[derive(Debug, Default)]
struct PageState {
    script: PageScript,
    height_index: usize,
    growth: u64,
    load_more_remaining: usize,
    consent_visible: bool,
    revealed: Vec<Option<String>>,
}

struct FakeSession {
    browser: FakeBrowser,
    page: Arc<Mutex<PageState>>,
}

fn query_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == "q")
        .map(|(_, value)| value.into_owned())
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.browser.log.lock().unwrap().navigations.push(url.to_string());
        let query = query_of(url).unwrap_or_default();
        if self.browser.fail_navigation.contains(&query) {
            return Err(BrowserError::navigation(url, "net::ERR_NAME_NOT_RESOLVED"));
        }
        let script = self.browser.pages.get(&query).cloned().unwrap_or_default();
        let mut page = self.page.lock().unwrap();
        *page = PageState {
            load_more_remaining: script.load_more,
            consent_visible: script.consent,
            script,
            ..PageState::default()
        };
        Ok(())
    }

    async fn execute(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        let mut page = self.page.lock().unwrap();
        if script == PAGE_HEIGHT_SCRIPT {
            self.browser.log.lock().unwrap().height_reads += 1;
            let heights = &page.script.heights;
            let base = heights
                .get(page.height_index.min(heights.len().saturating_sub(1)))
                .copied()
                .unwrap_or(0);
            page.height_index += 1;
            return Ok(serde_json::json!(base + page.growth));
        }
        if script == SCROLL_TO_BOTTOM_SCRIPT {
            self.browser.log.lock().unwrap().scrolls += 1;
            return Ok(serde_json::Value::Null);
        }
        Err(BrowserError::script(format!("unscripted expression: {script}")))
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, BrowserError> {
        let page_guard = self.page.lock().unwrap();
        let markers = &self.browser.markers;
        let kinds: Vec<ElementKind> = if selector == markers.consent_button {
            if page_guard.consent_visible {
                vec![ElementKind::Consent]
            } else {
                Vec::new()
            }
        } else if selector == markers.load_more {
            if page_guard.load_more_remaining > 0 || page_guard.script.load_more_fails {
                vec![ElementKind::LoadMore]
            } else {
                Vec::new()
            }
        } else if selector == markers.thumbnail {
            if page_guard.script.thumbnail_lookup_fails {
                return Err(BrowserError::element("thumbnail query failed"));
            }
            (0..page_guard.script.thumbnails.len())
                .map(ElementKind::Thumbnail)
                .collect()
        } else if selector == markers.revealed_image {
            (0..page_guard.revealed.len())
                .map(ElementKind::Revealed)
                .collect()
        } else {
            Vec::new()
        };
        drop(page_guard);

        Ok(kinds
            .into_iter()
            .map(|kind| {
                Box::new(FakeElement {
                    kind,
                    page: Arc::clone(&self.page),
                    log: Arc::clone(&self.browser.log),
                }) as Box<dyn ElementHandle>
            })
            .collect())
    }

    async fn page_content(&self) -> Result<String, BrowserError> {
        let page = self.page.lock().unwrap();
        Ok(format!(
            "<html><body>{} thumbnails</body></html>",
            page.script.thumbnails.len()
        ))
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.browser.log.lock().unwrap().sessions_closed += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum ElementKind {
    Consent,
    LoadMore,
    Thumbnail(usize),
    Revealed(usize),
}

struct FakeElement {
    kind: ElementKind,
    page: Arc<Mutex<PageState>>,
    log: Arc<Mutex<BrowserLog>>,
}

#[async_trait]
impl ElementHandle for FakeElement {
    async fn click(&self) -> Result<(), BrowserError> {
        let mut page = self.page.lock().unwrap();
        match self.kind {
            ElementKind::Consent => {
                page.consent_visible = false;
                self.log.lock().unwrap().consent_dismissed += 1;
                Ok(())
            }
            ElementKind::LoadMore => {
                if page.load_more_remaining == 0 {
                    return Err(BrowserError::element("load-more control is not clickable"));
                }
                page.load_more_remaining -= 1;
                page.growth += LOAD_MORE_GROWTH;
                self.log.lock().unwrap().load_more_clicks += 1;
                Ok(())
            }
            ElementKind::Thumbnail(index) => {
                let thumbnail = page.script.thumbnails[index].clone();
                if thumbnail.click_fails {
                    return Err(BrowserError::element("thumbnail is not clickable"));
                }
                self.log.lock().unwrap().thumbnail_clicks += 1;
                if page.revealed.is_empty() {
                    page.revealed.push(thumbnail.locator);
                } else {
                    page.revealed.insert(1, thumbnail.locator);
                }
                Ok(())
            }
            ElementKind::Revealed(_) => Ok(()),
        }
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError> {
        let page = self.page.lock().unwrap();
        Ok(match self.kind {
            ElementKind::Revealed(index) if name == "src" => {
                page.revealed.get(index).cloned().flatten()
            }
            ElementKind::Thumbnail(_) if name == "src" => {
                Some("data:image/gif;base64,R0lGODlhAQABAAAAACw=".to_string())
            }
            _ => None,
        })
    }

    async fn find_all(&self, _selector: &str) -> Result<Vec<Box<dyn ElementHandle>>, BrowserError> {
        Ok(Vec::new())
    }
}
