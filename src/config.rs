//! Run configuration.
//!
//! Every tunable of an acquisition run is carried explicitly in a
//! [`LoaderConfig`] handed to the session at construction.

use std::path::PathBuf;
use std::time::Duration;

use crate::browser::chromium::DEFAULT_NAVIGATION_TIMEOUT;
use crate::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::download::default_concurrency;
use crate::extract::DEFAULT_REVEAL_DELAY;
use crate::render::{
    DEFAULT_QUERY_TEMPLATE, DEFAULT_RENDER_BUDGET, DEFAULT_SETTLE_INTERVAL, PageMarkers,
    RenderSettings,
};

/// Directory name used under the home directory when no output root is given.
pub const DEFAULT_OUTPUT_DIR_NAME: &str = "image-loads";

/// HTTP timeouts for remote downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// TCP/TLS connect timeout.
    pub connect: Duration,
    /// Whole-request timeout, including the body.
    pub read: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read: Duration::from_secs(READ_TIMEOUT_SECS),
        }
    }
}

/// Configuration for one [`AcquisitionSession`](crate::AcquisitionSession).
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Root under which one directory per term is created.
    pub output_root: PathBuf,
    /// Suffix term directories with the local run date.
    pub date_stamp: bool,
    /// Maximum simultaneous downloads (1-100).
    pub concurrency: usize,
    /// Run the browser without a visible window.
    pub headless: bool,
    /// Explicit Chromium executable; discovered when `None`.
    pub chromium_path: Option<PathBuf>,
    /// Results page URL with a `{query}` placeholder.
    pub query_template: String,
    /// Selectors and attribute names of the results page.
    pub markers: PageMarkers,
    /// Wait after each scroll or load-more activation.
    pub settle_interval: Duration,
    /// Wait after activating a thumbnail.
    pub reveal_delay: Duration,
    /// Maximum time for one navigation.
    pub navigation_timeout: Duration,
    /// Maximum time spent materializing one term's page.
    pub render_budget: Duration,
    /// HTTP timeouts for remote downloads.
    pub http: HttpTimeouts,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            output_root: default_output_root(),
            date_stamp: false,
            concurrency: default_concurrency(),
            headless: true,
            chromium_path: None,
            query_template: DEFAULT_QUERY_TEMPLATE.to_string(),
            markers: PageMarkers::default(),
            settle_interval: DEFAULT_SETTLE_INTERVAL,
            reveal_delay: DEFAULT_REVEAL_DELAY,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            render_budget: DEFAULT_RENDER_BUDGET,
            http: HttpTimeouts::default(),
        }
    }
}

impl LoaderConfig {
    /// Returns the default config with a different output root.
    #[must_use]
    pub fn with_output_root(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            ..Self::default()
        }
    }

    /// Render settings derived from this config.
    #[must_use]
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            headless: self.headless,
            settle_interval: self.settle_interval,
            render_budget: self.render_budget,
        }
    }
}

/// `$HOME/image-loads`, or `./image-loads` when `HOME` is unset.
#[must_use]
pub fn default_output_root() -> PathBuf {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map_or_else(
            || PathBuf::from(DEFAULT_OUTPUT_DIR_NAME),
            |home| PathBuf::from(home).join(DEFAULT_OUTPUT_DIR_NAME),
        )
}
