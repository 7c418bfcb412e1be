//! Reference extraction from a rendered results page.
//!
//! Each thumbnail is activated in document order to make the page reveal the
//! full-resolution image element, whose locator attribute is collected as an
//! [`ImageReference`] for the page's term.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::browser::{BrowserError, BrowserSession};
use crate::render::{PageMarkers, RenderedPage};
use crate::terms::{ImageLimit, SearchTerm};

/// Default wait after activating a thumbnail before reading the revealed element.
pub const DEFAULT_REVEAL_DELAY: Duration = Duration::from_millis(500);

/// Maximum locator characters shown in logs and reports.
const LOCATOR_PREVIEW_CHARS: usize = 96;

/// Errors that prevent extraction for a whole page.
///
/// Failures on a single thumbnail are not errors; that thumbnail is skipped.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The thumbnails themselves could not be located.
    #[error("could not locate thumbnails for '{term}': {source}")]
    ThumbnailLookup {
        /// The term whose page was being read.
        term: String,
        /// The underlying browser error.
        #[source]
        source: BrowserError,
    },
}

/// A located pointer to one image, owned by exactly one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReference {
    /// The term whose directory the image belongs in.
    pub term: SearchTerm,
    /// Remote URL or inline `data:` payload.
    pub locator: String,
}

impl ImageReference {
    /// Creates a reference.
    pub fn new(term: SearchTerm, locator: impl Into<String>) -> Self {
        Self {
            term,
            locator: locator.into(),
        }
    }

    /// Returns the locator shortened for display (inline payloads can be huge).
    #[must_use]
    pub fn locator_preview(&self) -> String {
        if self.locator.chars().count() <= LOCATOR_PREVIEW_CHARS {
            return self.locator.clone();
        }
        let head: String = self.locator.chars().take(LOCATOR_PREVIEW_CHARS).collect();
        format!("{head}...")
    }
}

/// Why one thumbnail produced no reference.
#[derive(Debug)]
enum ThumbnailSkip {
    Activation(BrowserError),
    RevealLookup(BrowserError),
    NotRevealed { slot: usize, found: usize },
    AttributeRead(BrowserError),
    MissingLocator,
}

impl std::fmt::Display for ThumbnailSkip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Activation(e) => write!(f, "activation failed: {e}"),
            Self::RevealLookup(e) => write!(f, "revealed element lookup failed: {e}"),
            Self::NotRevealed { slot, found } => {
                write!(f, "no revealed element in slot {slot} ({found} present)")
            }
            Self::AttributeRead(e) => write!(f, "locator attribute read failed: {e}"),
            Self::MissingLocator => f.write_str("revealed element has no locator"),
        }
    }
}

/// Collects full-resolution image references from rendered pages.
#[derive(Debug, Clone)]
pub struct ReferenceExtractor {
    markers: PageMarkers,
    reveal_delay: Duration,
}

impl ReferenceExtractor {
    /// Creates an extractor using the given page markers.
    #[must_use]
    pub fn new(markers: PageMarkers, reveal_delay: Duration) -> Self {
        Self {
            markers,
            reveal_delay,
        }
    }

    /// Extracts up to `limit` references from `page`, in thumbnail order.
    ///
    /// The first `limit` thumbnails are activated one by one. The page keeps
    /// previously revealed elements around: until a thumbnail has been
    /// activated the newly revealed element is the first match of the
    /// revealed-image selector, and from then on it is always the second.
    /// A thumbnail whose activation or locator read fails is skipped; the
    /// result is never padded.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::ThumbnailLookup`] if the thumbnails cannot be
    /// queried at all.
    #[instrument(skip(self, page), fields(term = %page.term(), limit = limit.get()))]
    pub async fn extract(
        &self,
        page: &RenderedPage,
        limit: ImageLimit,
    ) -> Result<Vec<ImageReference>, ExtractError> {
        let term = page.term();
        let session = page.session();

        let thumbnails = session
            .find_all(&self.markers.thumbnail)
            .await
            .map_err(|source| ExtractError::ThumbnailLookup {
                term: term.to_string(),
                source,
            })?;

        let available = thumbnails.len();
        let mut references = Vec::with_capacity(available.min(limit.get()));
        let mut activated_any = false;
        let mut skipped = 0usize;

        for (index, thumbnail) in thumbnails.iter().take(limit.get()).enumerate() {
            if let Err(e) = thumbnail.click().await {
                warn!(index, skip = %ThumbnailSkip::Activation(e), "skipping thumbnail");
                skipped += 1;
                continue;
            }

            let slot = usize::from(activated_any);
            activated_any = true;
            tokio::time::sleep(self.reveal_delay).await;

            match self.read_revealed_locator(session, slot).await {
                Ok(locator) => {
                    debug!(index, slot, "collected image reference");
                    references.push(ImageReference::new(term.clone(), locator));
                }
                Err(skip) => {
                    warn!(index, %skip, "skipping thumbnail");
                    skipped += 1;
                }
            }
        }

        info!(
            available,
            collected = references.len(),
            skipped,
            "extraction complete"
        );
        Ok(references)
    }

    async fn read_revealed_locator(
        &self,
        session: &dyn BrowserSession,
        slot: usize,
    ) -> Result<String, ThumbnailSkip> {
        let revealed = session
            .find_all(&self.markers.revealed_image)
            .await
            .map_err(ThumbnailSkip::RevealLookup)?;
        let element = revealed.get(slot).ok_or(ThumbnailSkip::NotRevealed {
            slot,
            found: revealed.len(),
        })?;
        element
            .attribute(&self.markers.locator_attribute)
            .await
            .map_err(ThumbnailSkip::AttributeRead)?
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ThumbnailSkip::MissingLocator)
    }
}

impl Default for ReferenceExtractor {
    fn default() -> Self {
        Self::new(PageMarkers::default(), DEFAULT_REVEAL_DELAY)
    }
}
