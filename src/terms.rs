//! Search term validation and normalization.
//!
//! Terms are validated once, up front, before any browser session or
//! filesystem work happens. A validated [`SearchTerms`] set is never empty
//! and holds no blank or duplicate entries.

use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;

use serde::Serialize;
use thiserror::Error;

/// Separator placed between words of a term in the search query.
pub const QUERY_WORD_SEPARATOR: &str = "+";

/// Errors raised while validating caller input.
///
/// These are the only errors allowed to abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No usable search term remained after trimming and removing blanks.
    #[error("no search term was provided (all entries were empty or blank)")]
    NoTerms,

    /// Requested image count per term is not a positive integer.
    #[error("invalid number of images {value}: must be a positive integer")]
    InvalidImageCount {
        /// The rejected value.
        value: i64,
    },
}

/// Normalizes a raw term into its query form.
///
/// Leading and trailing whitespace is removed and every internal run of
/// whitespace becomes a single `+`. Applying it to an already normalized
/// term returns the term unchanged.
///
/// ```
/// use image_loader::normalize;
///
/// assert_eq!(normalize(" a b "), "a+b");
/// assert_eq!(normalize(&normalize("dogs  big fluffy")), "dogs+big+fluffy");
/// ```
#[must_use]
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(QUERY_WORD_SEPARATOR)
}

/// A single validated search term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SearchTerm {
    /// Term as supplied by the caller, trimmed.
    original: String,
    /// Normalized query form (`dogs big` -> `dogs+big`).
    query: String,
}

impl SearchTerm {
    /// Builds a term from raw input, returning `None` for blank input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let query = normalize(raw);
        if query.is_empty() {
            return None;
        }
        Some(Self {
            original: raw.trim().to_string(),
            query,
        })
    }

    /// Returns the trimmed caller-supplied text.
    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Returns the normalized query form.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Returns the query form with each word percent-encoded for use in a URL.
    ///
    /// The `+` separators are kept as-is so the server reads them as spaces.
    #[must_use]
    pub fn url_encoded_query(&self) -> String {
        self.query
            .split(QUERY_WORD_SEPARATOR)
            .map(|word| urlencoding::encode(word).into_owned())
            .collect::<Vec<_>>()
            .join(QUERY_WORD_SEPARATOR)
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query)
    }
}

/// Validated, duplicate-free, non-empty set of search terms.
///
/// First-seen order of the input is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerms {
    terms: Vec<SearchTerm>,
}

impl SearchTerms {
    /// Validates raw caller input.
    ///
    /// Blank entries are dropped and entries whose normalized query form is
    /// identical are merged.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NoTerms`] if nothing usable remains.
    pub fn new<I, S>(raw: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let terms: Vec<SearchTerm> = raw
            .into_iter()
            .filter_map(|entry| SearchTerm::parse(entry.as_ref()))
            .filter(|term| seen.insert(term.query.clone()))
            .collect();

        if terms.is_empty() {
            return Err(ValidationError::NoTerms);
        }
        Ok(Self { terms })
    }

    /// Returns the number of terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Always `false` for a validated set; provided for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Iterates over the terms in input order.
    pub fn iter(&self) -> std::slice::Iter<'_, SearchTerm> {
        self.terms.iter()
    }

    /// Returns the terms as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[SearchTerm] {
        &self.terms
    }
}

impl<'a> IntoIterator for &'a SearchTerms {
    type Item = &'a SearchTerm;
    type IntoIter = std::slice::Iter<'a, SearchTerm>;

    fn into_iter(self) -> Self::IntoIter {
        self.terms.iter()
    }
}

/// Maximum number of images to fetch per term (always positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLimit(NonZeroUsize);

impl ImageLimit {
    /// Validates a caller-supplied image count.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidImageCount`] for zero or negative values.
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        usize::try_from(value)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(Self)
            .ok_or(ValidationError::InvalidImageCount { value })
    }

    /// Returns the limit as a plain count.
    #[must_use]
    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl TryFrom<i64> for ImageLimit {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
