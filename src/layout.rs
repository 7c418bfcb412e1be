//! Output directory layout.
//!
//! Resolves one directory per search term under a configured root, named
//! deterministically from the term's normalized query form and optionally
//! suffixed with a run date, and creates those directories idempotently.
//!
//! Distinct terms can sanitize to the same name (`a/b` and `a?b`). Terms
//! registered through [`OutputLayout::with_terms`] are given distinct names
//! in input order: the first keeps the plain name, later ones get `-2`, `-3`.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info};

use crate::terms::{SearchTerm, SearchTerms};

/// Maximum characters per term folder name (avoids overly long paths).
pub const MAX_TERM_FOLDER_CHARS: usize = 80;

/// Name used when a term has no usable folder-name characters.
const FALLBACK_FOLDER_NAME: &str = "term";

/// Errors raised while preparing output directories.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// Directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    CreateDirectory {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Per-term output directory layout rooted at a base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
    date_stamp: Option<NaiveDate>,
    // query -> assigned stem
    stems: HashMap<String, String>,
}

impl OutputLayout {
    /// Creates a layout with no date stamp.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            date_stamp: None,
            stems: HashMap::new(),
        }
    }

    /// Assigns every term a folder name no other registered term shares.
    ///
    /// Names are compared case-insensitively. Registering the same terms
    /// again yields the same names.
    #[must_use]
    pub fn with_terms(mut self, terms: &SearchTerms) -> Self {
        self.assign_stems(terms);
        self
    }

    fn assign_stems(&mut self, terms: &SearchTerms) {
        let mut taken: HashSet<String> = self.stems.values().map(|s| s.to_lowercase()).collect();
        for term in terms {
            if self.stems.contains_key(term.query()) {
                continue;
            }
            let base = sanitize_folder_name(term.query());
            let mut stem = base.clone();
            let mut n = 2;
            while !taken.insert(stem.to_lowercase()) {
                stem = suffixed_name(&base, n);
                n += 1;
            }
            if stem != base {
                debug!(term = %term, folder = %stem, "folder name taken by an earlier term");
            }
            self.stems.insert(term.query().to_string(), stem);
        }
    }

    /// Suffixes every term directory with the given date (`cats_2024-03-01`).
    #[must_use]
    pub fn with_date_stamp(mut self, date: NaiveDate) -> Self {
        self.date_stamp = Some(date);
        self
    }

    /// Suffixes every term directory with today's local date.
    #[must_use]
    pub fn with_today(self) -> Self {
        let today = chrono::Local::now().date_naive();
        self.with_date_stamp(today)
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the date stamp, if any.
    #[must_use]
    pub fn date_stamp(&self) -> Option<NaiveDate> {
        self.date_stamp
    }

    /// Returns the filename stem used for images of `term` (`dogs+big`).
    #[must_use]
    pub fn file_stem(&self, term: &SearchTerm) -> String {
        self.stems
            .get(term.query())
            .cloned()
            .unwrap_or_else(|| sanitize_folder_name(term.query()))
    }

    /// Returns the directory name for `term`, including any date stamp.
    #[must_use]
    pub fn directory_name(&self, term: &SearchTerm) -> String {
        let stem = self.file_stem(term);
        match self.date_stamp {
            Some(date) => format!("{stem}_{}", date.format("%Y-%m-%d")),
            None => stem,
        }
    }

    /// Returns the full directory path for `term`.
    #[must_use]
    pub fn directory_for(&self, term: &SearchTerm) -> PathBuf {
        self.root.join(self.directory_name(term))
    }

    /// Creates the directory for `term` if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::CreateDirectory`] if the directory cannot be created.
    pub fn ensure_directory(&self, term: &SearchTerm) -> Result<PathBuf, LayoutError> {
        let path = self.directory_for(term);
        if path.is_dir() {
            debug!(term = %term, dir = %path.display(), "directory already exists");
            return Ok(path);
        }
        fs::create_dir_all(&path).map_err(|source| LayoutError::CreateDirectory {
            path: path.clone(),
            source,
        })?;
        info!(term = %term, dir = %path.display(), "created image directory");
        Ok(path)
    }

    /// Registers `terms` and creates a distinct directory for each.
    /// Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first [`LayoutError`] encountered.
    pub fn create_directories(
        &mut self,
        terms: &SearchTerms,
    ) -> Result<Vec<PathBuf>, LayoutError> {
        self.assign_stems(terms);
        terms.iter().map(|term| self.ensure_directory(term)).collect()
    }
}

/// Sanitizes a normalized term for use as a single path segment.
///
/// Path separators, reserved characters, whitespace and control characters
/// collapse to a single `-`. Leading/trailing dashes and dots are removed so
/// the result can never be `.` or `..`.
#[must_use]
pub fn sanitize_folder_name(name: &str) -> String {
    let mut sanitized = String::new();
    let mut previous_dash = false;

    for ch in name.trim().chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_whitespace() || c.is_control() => '-',
            c => c,
        };

        if mapped == '-' {
            if !previous_dash {
                sanitized.push('-');
                previous_dash = true;
            }
        } else {
            sanitized.push(mapped);
            previous_dash = false;
        }
    }

    let mut sanitized = sanitized.trim_matches(|c| c == '-' || c == '.').to_string();
    if is_windows_reserved_name(&sanitized) {
        sanitized.push_str("-images");
    }
    if sanitized.chars().count() > MAX_TERM_FOLDER_CHARS {
        sanitized = sanitized.chars().take(MAX_TERM_FOLDER_CHARS).collect();
        sanitized = sanitized.trim_matches('-').to_string();
    }
    if sanitized.is_empty() {
        return FALLBACK_FOLDER_NAME.to_string();
    }
    sanitized
}

/// `base` with a `-n` suffix, shortened so the result stays within the cap.
fn suffixed_name(base: &str, n: usize) -> String {
    let suffix = format!("-{n}");
    let head: String = base
        .chars()
        .take(MAX_TERM_FOLDER_CHARS.saturating_sub(suffix.len()))
        .collect();
    format!("{}{suffix}", head.trim_end_matches('-'))
}

fn is_windows_reserved_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
        "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|reserved| name.eq_ignore_ascii_case(reserved))
}
