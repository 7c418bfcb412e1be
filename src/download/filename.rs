//! Sequence-numbered image filenames.
//!
//! Images of one term are saved as `<stem>_<n>.jpg`. Numbers are reserved in
//! submission order before any download starts, so a reference's name depends
//! only on its position, never on which download finishes first. Each output
//! directory gets its own counter, seeded from the highest number already on
//! disk so that re-runs into the same directory append instead of overwriting.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tokio::fs::{File, OpenOptions};
use tracing::{debug, trace};

use super::constants::{IMAGE_EXTENSION, MAX_NAME_ATTEMPTS};
use super::error::DownloadError;

/// Builds the filename for sequence number `n`.
#[must_use]
pub(crate) fn image_filename(stem: &str, n: usize) -> String {
    format!("{stem}_{n}.{IMAGE_EXTENSION}")
}

/// Parses `n` out of `<stem>_<n>.jpg`, ignoring any other file.
fn sequence_number(stem: &str, filename: &str) -> Option<usize> {
    filename
        .strip_prefix(stem)?
        .strip_prefix('_')?
        .strip_suffix(IMAGE_EXTENSION)?
        .strip_suffix('.')?
        .parse()
        .ok()
}

/// Returns the highest sequence number present in `dir`, or 0.
async fn highest_existing(dir: &Path, stem: &str) -> usize {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return 0;
    };
    let mut highest = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Some(n) = entry
            .file_name()
            .to_str()
            .and_then(|name| sequence_number(stem, name))
        {
            highest = highest.max(n);
        }
    }
    highest
}

/// Hands out unique sequence numbers per output directory.
///
/// Workers for different terms touch different map entries, so they never
/// contend on the same counter.
#[derive(Debug, Default)]
pub(crate) struct SequenceAllocator {
    counters: DashMap<PathBuf, usize>,
}

impl SequenceAllocator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reserves the next number in `dir`.
    ///
    /// The first reservation for a directory scans it once; the scan runs
    /// before any map lock is taken.
    pub(crate) async fn reserve(&self, dir: &Path, stem: &str) -> usize {
        if !self.counters.contains_key(dir) {
            let seed = highest_existing(dir, stem).await;
            self.counters.entry(dir.to_path_buf()).or_insert(seed);
        }
        self.bump(dir)
    }

    fn bump(&self, dir: &Path) -> usize {
        let mut counter = self.counters.entry(dir.to_path_buf()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Creates the file for a reserved number with create-new semantics.
    ///
    /// If something else has taken that name since the directory was scanned,
    /// a fresh number past the reserved range is used instead.
    pub(crate) async fn create(
        &self,
        dir: &Path,
        stem: &str,
        reserved: usize,
    ) -> Result<(File, PathBuf), DownloadError> {
        let mut path = dir.join(image_filename(stem, reserved));
        for _ in 0..MAX_NAME_ATTEMPTS {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    trace!(path = %path.display(), "claimed image path");
                    return Ok((file, path));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "image path already taken, skipping");
                    path = dir.join(image_filename(stem, self.bump(dir)));
                }
                Err(e) => return Err(DownloadError::io(path, e)),
            }
        }
        Err(DownloadError::io(
            dir,
            std::io::Error::new(ErrorKind::AlreadyExists, "no free sequence number"),
        ))
    }
}
