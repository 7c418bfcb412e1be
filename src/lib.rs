//! Image Loader Core Library
//!
//! This library retrieves images for a set of search terms from a dynamic,
//! infinite-scroll image search results page and saves them to disk,
//! organized in one directory per term.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`terms`] - Search term validation and query normalization
//! - [`layout`] - Per-term output directory naming and creation
//! - [`browser`] - Browser automation capability (chromiumoxide backed)
//! - [`render`] - Scroll-to-load page materialization
//! - [`extract`] - Full-resolution image reference extraction
//! - [`download`] - Bounded-concurrency download dispatcher
//! - [`session`] - Acquisition orchestration across all terms
//! - [`config`] - Explicit run configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod browser;
pub mod config;
pub mod download;
pub mod extract;
pub mod layout;
pub mod render;
pub mod session;
pub mod terms;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use browser::{Browser, BrowserError, BrowserSession, ElementHandle};
pub use config::{HttpTimeouts, LoaderConfig};
pub use download::{
    DEFAULT_CONCURRENCY, DispatcherError, DownloadDispatcher, DownloadError, DownloadOutcome,
    DownloadResult, DownloadStats, HttpClient, Locator, default_concurrency,
};
pub use extract::{ExtractError, ImageReference, ReferenceExtractor};
pub use layout::{LayoutError, OutputLayout};
pub use render::{PageMarkers, PageRenderer, RenderError, RenderSettings, RenderedPage};
pub use session::{
    AcquisitionSession, RunReport, SessionError, SessionState, TermOutcome, TermSummary,
};
pub use terms::{ImageLimit, SearchTerm, SearchTerms, ValidationError, normalize};
