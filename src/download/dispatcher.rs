//! Bounded-concurrency dispatcher turning image references into files.
//!
//! The dispatcher owns a long-lived semaphore sized once at construction and
//! reused by every [`DownloadDispatcher::download_all`] call. Each reference
//! runs in its own Tokio task that first acquires a permit; the call returns
//! only after every task has finished.
//!
//! # Example
//!
//! ```no_run
//! use image_loader::download::{DownloadDispatcher, HttpClient};
//! use image_loader::{ImageReference, OutputLayout, SearchTerm};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let layout = OutputLayout::new("./images");
//! let dispatcher = DownloadDispatcher::new(8, HttpClient::new(), layout)?;
//! let term = SearchTerm::parse("cats").ok_or("blank term")?;
//! let results = dispatcher
//!     .download_all(vec![ImageReference::new(term, "https://example.com/cat.jpg")])
//!     .await;
//! println!("saved {}", results.iter().filter(|r| r.is_success()).count());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Serialize, Serializer};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::filename::SequenceAllocator;
use super::locator::Locator;
use super::{DownloadError, HttpClient};
use crate::extract::ImageReference;
use crate::layout::OutputLayout;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Concurrency used when the available parallelism cannot be determined.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Available CPU parallelism clamped to the allowed concurrency range.
#[must_use]
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map_or(DEFAULT_CONCURRENCY, std::num::NonZeroUsize::get)
        .clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

/// Error type for dispatcher construction.
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Running totals across every batch a dispatcher has processed.
///
/// Uses atomic counters so the CLI can poll progress while tasks update them.
#[derive(Debug, Default)]
pub struct DownloadStats {
    submitted: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of references handed to the dispatcher.
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Returns the number of images saved.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns the number of failed references.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the total number of references processed (completed + failed).
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.failed()
    }

    fn add_submitted(&self, count: usize) {
        self.submitted.fetch_add(count, Ordering::SeqCst);
    }

    fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// What happened to one reference.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// The image was written to `path`.
    Saved {
        /// Final file path.
        path: PathBuf,
        /// Bytes written.
        bytes: u64,
    },
    /// The reference could not be turned into a file.
    Failed {
        /// Why it failed.
        #[serde(serialize_with = "serialize_error")]
        error: DownloadError,
    },
}

fn serialize_error<S: Serializer>(error: &DownloadError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Per-reference result of a dispatch.
#[derive(Debug, Serialize)]
pub struct DownloadResult {
    /// The reference that was processed.
    pub reference: ImageReference,
    /// Its outcome.
    pub outcome: DownloadOutcome,
}

impl DownloadResult {
    fn saved(reference: ImageReference, path: PathBuf, bytes: u64) -> Self {
        Self {
            reference,
            outcome: DownloadOutcome::Saved { path, bytes },
        }
    }

    fn failed(reference: ImageReference, error: DownloadError) -> Self {
        Self {
            reference,
            outcome: DownloadOutcome::Failed { error },
        }
    }

    /// Returns true if the image was saved.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DownloadOutcome::Saved { .. })
    }

    /// Returns the saved path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.outcome {
            DownloadOutcome::Saved { path, .. } => Some(path),
            DownloadOutcome::Failed { .. } => None,
        }
    }

    /// Returns the failure cause, if any.
    #[must_use]
    pub fn error(&self) -> Option<&DownloadError> {
        match &self.outcome {
            DownloadOutcome::Saved { .. } => None,
            DownloadOutcome::Failed { error } => Some(error),
        }
    }
}

/// Downloads image references into their terms' directories.
///
/// # Concurrency Model
///
/// - Each reference runs in its own Tokio task
/// - A task acquires a semaphore permit before touching the network or disk
/// - Permits are released automatically when the task ends (RAII)
/// - Sequence numbers are reserved per directory in submission order before
///   any task is spawned, so a file's name never depends on completion order
#[derive(Debug)]
pub struct DownloadDispatcher {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    client: HttpClient,
    layout: OutputLayout,
    names: Arc<SequenceAllocator>,
    stats: Arc<DownloadStats>,
}

impl DownloadDispatcher {
    /// Creates a dispatcher writing below `layout` with at most `concurrency`
    /// simultaneous downloads.
    ///
    /// # Errors
    ///
    /// Returns [`DispatcherError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    #[instrument(level = "debug", skip(client, layout))]
    pub fn new(
        concurrency: usize,
        client: HttpClient,
        layout: OutputLayout,
    ) -> Result<Self, DispatcherError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(DispatcherError::InvalidConcurrency { value: concurrency });
        }

        debug!(concurrency, root = %layout.root().display(), "creating download dispatcher");

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            client,
            layout,
            names: Arc::new(SequenceAllocator::new()),
            stats: Arc::new(DownloadStats::new()),
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the output layout.
    #[must_use]
    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Returns the shared progress counters.
    #[must_use]
    pub fn stats(&self) -> Arc<DownloadStats> {
        Arc::clone(&self.stats)
    }

    /// Downloads every reference and waits for all of them.
    ///
    /// The returned list has one entry per reference, in submission order.
    /// A failing reference never affects the others; its cause is recorded in
    /// its [`DownloadResult`]. The term directories must already exist.
    #[instrument(skip(self, references), fields(count = references.len()))]
    pub async fn download_all(&self, references: Vec<ImageReference>) -> Vec<DownloadResult> {
        self.stats.add_submitted(references.len());
        let mut handles = Vec::with_capacity(references.len());

        for reference in references {
            let dir = self.layout.directory_for(&reference.term);
            let stem = self.layout.file_stem(&reference.term);
            // Numbered by position in the term's list, not by completion.
            let sequence = self.names.reserve(&dir, &stem).await;
            let task = DownloadTask {
                semaphore: Arc::clone(&self.semaphore),
                client: self.client.clone(),
                names: Arc::clone(&self.names),
                stats: Arc::clone(&self.stats),
                dir,
                stem,
                sequence,
                locator: reference.locator.clone(),
            };
            handles.push((reference, tokio::spawn(task.run())));
        }

        debug!(task_count = handles.len(), "waiting for downloads to complete");

        let mut results = Vec::with_capacity(handles.len());
        for (reference, handle) in handles {
            let result = match handle.await {
                Ok(Ok((path, bytes))) => DownloadResult::saved(reference, path, bytes),
                Ok(Err(error)) => DownloadResult::failed(reference, error),
                Err(join_error) => {
                    warn!(error = %join_error, locator = %reference.locator_preview(), "download task panicked");
                    self.stats.increment_failed();
                    DownloadResult::failed(reference, DownloadError::task_failed(join_error))
                }
            };
            results.push(result);
        }

        let saved = results.iter().filter(|r| r.is_success()).count();
        info!(
            saved,
            failed = results.len() - saved,
            total = results.len(),
            "dispatch complete"
        );
        results
    }
}

/// Everything one spawned download needs, owned.
struct DownloadTask {
    semaphore: Arc<Semaphore>,
    client: HttpClient,
    names: Arc<SequenceAllocator>,
    stats: Arc<DownloadStats>,
    dir: PathBuf,
    stem: String,
    sequence: usize,
    locator: String,
}

impl DownloadTask {
    async fn run(self) -> Result<(PathBuf, u64), DownloadError> {
        // Permit is dropped when this function returns (RAII)
        let _permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| DownloadError::task_failed("download pool closed"))?;

        let result = self.download().await;
        match &result {
            Ok((path, bytes)) => {
                info!(path = %path.display(), bytes, "image saved");
                self.stats.increment_completed();
            }
            Err(error) => {
                warn!(dir = %self.dir.display(), %error, "image download failed");
                self.stats.increment_failed();
            }
        }
        result
    }

    async fn download(&self) -> Result<(PathBuf, u64), DownloadError> {
        match Locator::parse(&self.locator)? {
            Locator::Inline(payload) => {
                let (file, path) = self.claim().await?;
                let bytes = write_inline(file, &path, &payload.bytes).await?;
                Ok((path, bytes))
            }
            Locator::Remote(url) => {
                let response = self.client.fetch(&url).await?;
                let (file, path) = self.claim().await?;
                let bytes = self.client.save_response(response, file, &path).await?;
                Ok((path, bytes))
            }
        }
    }

    async fn claim(&self) -> Result<(tokio::fs::File, PathBuf), DownloadError> {
        self.names
            .create(&self.dir, &self.stem, self.sequence)
            .await
    }
}

async fn write_inline(
    mut file: tokio::fs::File,
    path: &Path,
    bytes: &[u8],
) -> Result<u64, DownloadError> {
    let written = async {
        file.write_all(bytes).await?;
        file.flush().await
    }
    .await;
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(path).await;
        return Err(DownloadError::io(path, e));
    }
    Ok(bytes.len() as u64)
}
