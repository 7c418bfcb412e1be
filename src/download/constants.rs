//! Constants for the download module (timeouts, naming).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Extension given to every saved image.
pub const IMAGE_EXTENSION: &str = "jpg";

/// Attempts at claiming a fresh sequence number before giving up.
pub const MAX_NAME_ATTEMPTS: usize = 64;
