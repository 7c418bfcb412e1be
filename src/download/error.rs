//! Error types for the download module.
//!
//! Every variant carries the locator or path it concerns so that a failed
//! reference can be reported and retried by hand.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while turning one reference into a file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success HTTP response.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while writing the image.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The locator is neither an http(s) URL nor a `data:` payload.
    #[error("invalid locator: {locator}")]
    InvalidLocator {
        /// The rejected locator (shortened for display).
        locator: String,
    },

    /// An inline payload could not be decoded.
    #[error("could not decode inline payload: {reason}")]
    Decode {
        /// Why decoding failed.
        reason: String,
    },

    /// The download task ended without producing a result.
    #[error("download task failed: {reason}")]
    TaskFailed {
        /// Panic or cancellation description.
        reason: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid locator error.
    pub fn invalid_locator(locator: impl Into<String>) -> Self {
        Self::InvalidLocator {
            locator: locator.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(reason: impl ToString) -> Self {
        Self::Decode {
            reason: reason.to_string(),
        }
    }

    /// Creates a task failure error.
    pub fn task_failed(reason: impl ToString) -> Self {
        Self::TaskFailed {
            reason: reason.to_string(),
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: the variants need a url or
// path that the source errors don't carry.
