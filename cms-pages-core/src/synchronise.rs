//! Batch coordination: runs the per-file pipeline over a whole file collection.
//!
//! [`CmsPlugin`] is built once per site from [`PluginOptions`] and a
//! [`ClientFactory`]. Each call to [`CmsPlugin::run`] is one build pass:
//!   - every file's directive is checked and its query built up front, so a
//!     [`ConfigurationError`] aborts the build before any request is sent
//!   - fetches fan out concurrently (bounded by `concurrency` when set) on the
//!     calling task, with no spawning and no locking of the collection
//!   - each settled fetch is materialised into the collection between polls
//!   - the returned future resolves exactly once, after every file has settled
//!
//! # Error Handling
//! Configuration errors propagate as [`BatchError`]. Fetch failures and
//! malformed entries are contained and surface only in the [`BatchReport`].

use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::config::PluginOptions;
use crate::contract::ClientFactory;
use crate::error::{BatchError, ConfigurationError};
use crate::files::FileCollection;
use crate::processor::FileJob;
pub use crate::processor::{FileOutcome, FileReport, FileState};

/// Result of one build pass, one report per directive-carrying file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
}

impl BatchReport {
    /// Number of files written into the collection.
    pub fn synthesized_count(&self) -> usize {
        self.files.iter().map(|f| f.keys().len()).sum()
    }

    /// Source files whose fetch failed.
    pub fn failed_fetches(&self) -> impl Iterator<Item = &FileReport> {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::FetchFailed { .. }))
    }

    pub fn malformed_count(&self) -> usize {
        self.files.iter().map(|f| f.malformed.len()).sum()
    }
}

/// The CMS plugin for one site.
pub struct CmsPlugin<F> {
    options: PluginOptions,
    access_token: String,
    factory: F,
}

impl<F> CmsPlugin<F>
where
    F: ClientFactory,
{
    /// Validate the global options. Fails when no access token is configured.
    pub fn new(options: PluginOptions, factory: F) -> Result<Self, ConfigurationError> {
        let access_token = match options.require_access_token() {
            Ok(token) => token.to_string(),
            Err(e) => {
                error!(error = %e, "[CMS][ERROR] Plugin options rejected");
                return Err(e);
            }
        };
        options.trace_loaded();
        Ok(Self {
            options,
            access_token,
            factory,
        })
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Fetch and materialise entries for every file in `files`.
    pub async fn run(&self, files: &mut FileCollection) -> Result<BatchReport, BatchError> {
        info!(files = files.len(), "[CMS] Starting CMS fetch for build");

        let mut jobs = Vec::new();
        for (key, record) in files.iter() {
            match FileJob::prepare(key, record) {
                Ok(Some(job)) => jobs.push(job),
                Ok(None) => {}
                Err(e) => {
                    error!(file = %key, error = %e, "[CMS][ERROR] Invalid directive, aborting build");
                    return Err(e.into());
                }
            }
        }

        if jobs.is_empty() {
            info!("[CMS] No files carry a contentful directive, nothing to fetch");
            return Ok(BatchReport::default());
        }

        let limit = self
            .options
            .concurrency
            .filter(|n| *n > 0)
            .unwrap_or(jobs.len());
        info!(sources = jobs.len(), limit, "[CMS] Fanning out entry fetches");

        let factory = &self.factory;
        let access_token = self.access_token.as_str();
        let mut settled = stream::iter(jobs.into_iter().map(|job| async move {
            let fetched = job.fetch(factory, access_token).await;
            (job, fetched)
        }))
        .buffer_unordered(limit);

        let mut reports = Vec::new();
        while let Some((job, fetched)) = settled.next().await {
            reports.push(job.fan_out(fetched, files));
        }
        reports.sort_by(|a, b| a.source.cmp(&b.source));

        let report = BatchReport { files: reports };
        let failed = report.failed_fetches().count();
        if failed > 0 {
            warn!(failed, "[CMS] Some sources could not be fetched; the build continues with fewer pages");
        }
        info!(
            sources = report.files.len(),
            synthesized = report.synthesized_count(),
            malformed = report.malformed_count(),
            failed,
            "[CMS] CMS fetch complete"
        );
        Ok(report)
    }
}
