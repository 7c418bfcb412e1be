//! Download dispatch for extracted image references.
//!
//! This module turns [`ImageReference`](crate::ImageReference)s into files in
//! their terms' directories, with bounded concurrency and per-reference
//! failure isolation.
//!
//! # Features
//!
//! - Remote `http(s)` locators streamed to disk (memory-efficient)
//! - Inline `data:` payloads (base64 or percent-encoded) decoded without a network call
//! - Deterministic `<term>_<n>.jpg` naming that never overwrites existing files
//! - Configurable timeouts (30s connect, 5min read by default)
//! - Structured error types with full context

pub mod constants;

mod client;
mod dispatcher;
mod error;
mod filename;
mod locator;

pub use client::HttpClient;
pub use dispatcher::{
    DEFAULT_CONCURRENCY, DispatcherError, DownloadDispatcher, DownloadOutcome, DownloadResult,
    DownloadStats, default_concurrency,
};
pub use error::DownloadError;
pub use locator::{InlinePayload, Locator};
