//! Locator classification and inline payload decoding.
//!
//! A reference locator is either a remote `http(s)` URL, fetched over the
//! network, or a `data:` URI whose bytes are embedded in the page markup.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use tracing::trace;
use url::Url;

use super::error::DownloadError;

/// Maximum locator characters kept in an error message.
const MAX_ERROR_LOCATOR_CHARS: usize = 96;

/// Splits a `data:` URI into its media type, parameters and payload.
#[allow(clippy::expect_used)]
static DATA_URI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^data:(?P<mime>[^;,]*)(?P<params>(?:;[^;,]*)*),(?P<payload>.*)$")
        .expect("data URI regex is valid") // Static pattern, safe to panic
});

/// Where the bytes of a reference come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Fetch with an HTTP GET.
    Remote(Url),
    /// Already decoded inline payload.
    Inline(InlinePayload),
}

/// Bytes decoded from a `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinePayload {
    /// Declared media type (`image/jpeg`), empty when absent.
    pub mime: String,
    /// Decoded bytes.
    pub bytes: Vec<u8>,
}

impl Locator {
    /// Classifies and, for inline payloads, decodes a raw locator.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Decode`] for a malformed `data:` payload and
    /// [`DownloadError::InvalidLocator`] for anything that is not an
    /// `http`/`https` URL.
    pub fn parse(raw: &str) -> Result<Self, DownloadError> {
        let raw = raw.trim();

        if let Some(captures) = DATA_URI_PATTERN.captures(raw) {
            let mime = captures
                .name("mime")
                .map_or("", |m| m.as_str())
                .to_ascii_lowercase();
            let is_base64 = captures
                .name("params")
                .is_some_and(|p| p.as_str().to_ascii_lowercase().contains(";base64"));
            let payload = captures.name("payload").map_or("", |m| m.as_str());

            let bytes = if is_base64 {
                decode_base64(payload)?
            } else {
                urlencoding::decode_binary(payload.as_bytes()).into_owned()
            };
            if bytes.is_empty() {
                return Err(DownloadError::decode("payload is empty"));
            }

            trace!(mime = %mime, bytes = bytes.len(), "decoded inline payload");
            return Ok(Self::Inline(InlinePayload { mime, bytes }));
        }

        if raw.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:")) {
            return Err(DownloadError::decode("data URI has no payload separator"));
        }

        let url = Url::parse(raw).map_err(|_| DownloadError::invalid_locator(shorten(raw)))?;
        match url.scheme() {
            "http" | "https" => Ok(Self::Remote(url)),
            _ => Err(DownloadError::invalid_locator(shorten(raw))),
        }
    }

    /// Returns true for inline payloads.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline(_))
    }
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, DownloadError> {
    // Markup sometimes wraps or percent-escapes long payloads.
    let unescaped = urlencoding::decode(payload).map_err(DownloadError::decode)?;
    let compact: String = unescaped.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).map_err(DownloadError::decode)
}

fn shorten(raw: &str) -> String {
    if raw.chars().count() <= MAX_ERROR_LOCATOR_CHARS {
        return raw.to_string();
    }
    let head: String = raw.chars().take(MAX_ERROR_LOCATOR_CHARS).collect();
    format!("{head}...")
}
