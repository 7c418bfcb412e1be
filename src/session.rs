//! Acquisition session: one pass over a fixed term list.
//!
//! A session validates its inputs at construction, then [`run`](AcquisitionSession::run)
//! prepares one directory per term, renders and extracts each term in turn
//! and finally downloads every collected reference in one bounded batch.
//!
//! ```text
//! Created -> Normalized -> DirectoriesReady -> {Rendering -> Extracting}* -> Downloading -> Completed
//! ```
//!
//! Only input validation can fail the session. Render, extraction, directory
//! and download failures are recorded per term or per reference and the run
//! always reaches `Completed`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::browser::Browser;
use crate::config::LoaderConfig;
use crate::download::{DispatcherError, DownloadDispatcher, DownloadResult, DownloadStats, HttpClient};
use crate::extract::{ImageReference, ReferenceExtractor};
use crate::layout::OutputLayout;
use crate::render::PageRenderer;
use crate::terms::{ImageLimit, SearchTerm, SearchTerms, ValidationError};

/// Errors that abort a session before any work is done.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The terms or image count were rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The download concurrency is out of range.
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
}

/// Lifecycle of a session. Only moves forward, except that rendering and
/// extraction alternate once per term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing validated yet.
    Created,
    /// Terms and image count validated.
    Normalized,
    /// Term directories prepared.
    DirectoriesReady,
    /// A term's page is being rendered.
    Rendering,
    /// References are being read from a rendered page.
    Extracting,
    /// The download batch is running.
    Downloading,
    /// The run is over; the report is final.
    Completed,
}

/// How far one term got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TermOutcome {
    /// The term's references were extracted and dispatched.
    Completed,
    /// Its directory could not be created; the term was skipped.
    DirectoryFailed {
        /// Failure description.
        reason: String,
    },
    /// Its page could not be rendered; the term contributed no references.
    RenderFailed {
        /// Failure description.
        reason: String,
    },
    /// Its thumbnails could not be read; the term contributed no references.
    ExtractFailed {
        /// Failure description.
        reason: String,
    },
}

/// Per-term part of a [`RunReport`].
#[derive(Debug, Clone, Serialize)]
pub struct TermSummary {
    /// The term.
    pub term: SearchTerm,
    /// Its output directory, if it was created.
    pub directory: Option<PathBuf>,
    /// How far it got.
    pub outcome: TermOutcome,
    /// References extracted for it.
    pub references: usize,
    /// Images saved.
    pub saved: usize,
    /// References whose download failed.
    pub failed: usize,
}

impl TermSummary {
    fn new(term: SearchTerm) -> Self {
        Self {
            term,
            directory: None,
            outcome: TermOutcome::Completed,
            references: 0,
            saved: 0,
            failed: 0,
        }
    }
}

/// Terminal artifact of a run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// One entry per term, in input order.
    pub terms: Vec<TermSummary>,
    /// One entry per dispatched reference; terms in input order, references
    /// in thumbnail order.
    pub results: Vec<DownloadResult>,
    /// Wall-clock duration of the run.
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

impl RunReport {
    /// Number of images saved across all terms.
    #[must_use]
    pub fn saved(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Downloads that failed.
    pub fn failures(&self) -> impl Iterator<Item = &DownloadResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// Terms that did not complete.
    pub fn failed_terms(&self) -> impl Iterator<Item = &TermSummary> {
        self.terms
            .iter()
            .filter(|t| t.outcome != TermOutcome::Completed)
    }
}

/// One acquisition run over a validated set of terms.
#[derive(Debug)]
pub struct AcquisitionSession {
    terms: SearchTerms,
    limit: ImageLimit,
    layout: OutputLayout,
    renderer: PageRenderer,
    extractor: ReferenceExtractor,
    dispatcher: DownloadDispatcher,
    state: SessionState,
}

impl AcquisitionSession {
    /// Validates the inputs and builds the session's components.
    ///
    /// Nothing touches the filesystem, the network or the browser here.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] for an empty or all-blank term
    /// list or a non-positive `num_images`, and [`SessionError::Dispatcher`]
    /// for an out-of-range concurrency.
    pub fn new<I, S>(
        terms: I,
        num_images: i64,
        config: LoaderConfig,
        browser: Arc<dyn Browser>,
    ) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = SessionState::Created;
        let terms = SearchTerms::new(terms)?;
        let limit = ImageLimit::new(num_images)?;

        let mut layout = OutputLayout::new(config.output_root.clone()).with_terms(&terms);
        if config.date_stamp {
            layout = layout.with_today();
        }

        let dispatcher = DownloadDispatcher::new(
            config.concurrency,
            HttpClient::with_timeouts(config.http),
            layout.clone(),
        )?;
        let renderer = PageRenderer::new(
            browser,
            config.query_template.clone(),
            config.markers.clone(),
            config.render_settings(),
        );
        let extractor = ReferenceExtractor::new(config.markers, config.reveal_delay);

        transition(&mut state, SessionState::Normalized);
        info!(
            terms = terms.len(),
            limit = limit.get(),
            root = %layout.root().display(),
            "acquisition session ready"
        );

        Ok(Self {
            terms,
            limit,
            layout,
            renderer,
            extractor,
            dispatcher,
            state,
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The validated, deduplicated terms.
    #[must_use]
    pub fn terms(&self) -> &SearchTerms {
        &self.terms
    }

    /// Maximum images per term.
    #[must_use]
    pub fn limit(&self) -> ImageLimit {
        self.limit
    }

    /// Output layout.
    #[must_use]
    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Shared download counters, for progress reporting while running.
    #[must_use]
    pub fn stats(&self) -> Arc<DownloadStats> {
        self.dispatcher.stats()
    }

    /// Runs the whole pipeline and returns the report.
    #[instrument(skip(self), fields(terms = self.terms.len()))]
    pub async fn run(mut self) -> RunReport {
        let started = Instant::now();
        let mut summaries: Vec<TermSummary> =
            self.terms.iter().cloned().map(TermSummary::new).collect();

        self.prepare_directories(&mut summaries);

        let mut references: Vec<ImageReference> = Vec::new();
        for summary in &mut summaries {
            if summary.directory.is_none() {
                continue;
            }
            let collected = self.acquire_references(summary).await;
            summary.references = collected.len();
            references.extend(collected);
        }

        transition(&mut self.state, SessionState::Downloading);
        let results = self.dispatcher.download_all(references).await;

        for result in &results {
            if let Some(summary) = summaries
                .iter_mut()
                .find(|s| s.term == result.reference.term)
            {
                if result.is_success() {
                    summary.saved += 1;
                } else {
                    summary.failed += 1;
                }
            }
        }

        transition(&mut self.state, SessionState::Completed);
        let report = RunReport {
            terms: summaries,
            results,
            elapsed: started.elapsed(),
        };
        info!(
            saved = report.saved(),
            failed = report.failures().count(),
            failed_terms = report.failed_terms().count(),
            elapsed_ms = report.elapsed.as_millis(),
            "acquisition complete"
        );
        report
    }

    fn prepare_directories(&mut self, summaries: &mut [TermSummary]) {
        for summary in summaries.iter_mut() {
            match self.layout.ensure_directory(&summary.term) {
                Ok(dir) => summary.directory = Some(dir),
                Err(e) => {
                    warn!(term = %summary.term, error = %e, "skipping term without a directory");
                    summary.outcome = TermOutcome::DirectoryFailed {
                        reason: e.to_string(),
                    };
                }
            }
        }
        transition(&mut self.state, SessionState::DirectoriesReady);
    }

    /// Renders and extracts one term. Failures are recorded on `summary`.
    async fn acquire_references(&mut self, summary: &mut TermSummary) -> Vec<ImageReference> {
        transition(&mut self.state, SessionState::Rendering);
        let page = match self.renderer.render(&summary.term).await {
            Ok(page) => page,
            Err(e) => {
                warn!(term = %summary.term, error = %e, "render failed; term skipped");
                summary.outcome = TermOutcome::RenderFailed {
                    reason: e.to_string(),
                };
                return Vec::new();
            }
        };

        transition(&mut self.state, SessionState::Extracting);
        let extracted = self.extractor.extract(&page, self.limit).await;
        page.close().await;

        match extracted {
            Ok(references) => references,
            Err(e) => {
                warn!(term = %summary.term, error = %e, "extraction failed; term skipped");
                summary.outcome = TermOutcome::ExtractFailed {
                    reason: e.to_string(),
                };
                Vec::new()
            }
        }
    }
}

fn transition(state: &mut SessionState, next: SessionState) {
    debug!(from = ?*state, to = ?next, "session state change");
    *state = next;
}
