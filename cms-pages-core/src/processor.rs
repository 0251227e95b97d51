//! Per-file processing: directive check → query → fetch → fan-out.
//!
//! A source file moves through [`FileState`]s. Files without a directive go
//! straight to `Done`. A missing `space_id` is raised from `DirectiveCheck` as a
//! [`ConfigurationError`] for the coordinator to abort on. A failed fetch ends
//! in `Errored` and is contained: the file simply contributes no entries.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::contract::{ClientFactory, CmsEntry};
use crate::error::{ConfigurationError, FetchFailure, MalformedEntryError};
use crate::files::{CmsDirective, FileCollection, FileRecord, DIRECTIVE_KEY};
use crate::mapper::map_entry;
use crate::query::{build_query, Query};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Idle,
    DirectiveCheck,
    QueryBuilt,
    Fetching,
    FanningOut,
    Done,
    Errored,
}

/// What happened to one directive-carrying source file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Entries were fetched; these keys were written to the collection.
    Materialised { keys: Vec<String> },
    /// The fetch failed; no keys were written.
    FetchFailed { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub source: String,
    pub outcome: FileOutcome,
    /// Entries skipped because they lacked required fields.
    pub malformed: Vec<MalformedEntryError>,
}

impl FileReport {
    pub fn state(&self) -> FileState {
        match self.outcome {
            FileOutcome::Materialised { .. } => FileState::Done,
            FileOutcome::FetchFailed { .. } => FileState::Errored,
        }
    }

    pub fn keys(&self) -> &[String] {
        match &self.outcome {
            FileOutcome::Materialised { keys } => keys.as_slice(),
            FileOutcome::FetchFailed { .. } => &[],
        }
    }
}

/// A source file that passed its directive check, with its query built.
#[derive(Debug, Clone)]
pub struct FileJob {
    pub key: String,
    pub directive: CmsDirective,
    pub query: Query,
}

impl FileJob {
    /// Run `DirectiveCheck` and build the query. `Ok(None)` means pass-through.
    pub fn prepare(key: &str, record: &FileRecord) -> Result<Option<FileJob>, ConfigurationError> {
        debug!(
            file = key,
            from = ?FileState::Idle,
            state = ?FileState::DirectiveCheck,
            "[CMS] Checking directive"
        );
        let Some(directive) = record.directive(key)? else {
            debug!(file = key, state = ?FileState::Done, "[CMS] No directive, passing through");
            return Ok(None);
        };

        let query = build_query(&directive);
        debug!(
            file = key,
            state = ?FileState::QueryBuilt,
            space_id = %directive.space_id,
            query = ?query,
            "[CMS] Built entries query"
        );
        Ok(Some(FileJob {
            key: key.to_string(),
            directive,
            query,
        }))
    }

    /// Obtain a client for this file's space and issue its single fetch.
    pub async fn fetch<F>(
        &self,
        factory: &F,
        access_token: &str,
    ) -> Result<Vec<CmsEntry>, FetchFailure>
    where
        F: ClientFactory + ?Sized,
    {
        debug!(file = %self.key, state = ?FileState::Fetching, "[CMS][FETCH] Fetching entries for file");
        let client = factory.connect(&self.directive.space_id, access_token)?;
        client.entries(self.query.clone()).await
    }

    /// Map fetched entries and write them into `files`.
    ///
    /// Each synthesised file lands under its deterministic key, replacing any
    /// earlier file with that key. The source file's directive block receives
    /// `entries` and `contentTypes` listing what was created.
    pub fn fan_out(
        self,
        fetched: Result<Vec<CmsEntry>, FetchFailure>,
        files: &mut FileCollection,
    ) -> FileReport {
        let mut listed = Vec::new();
        let mut by_type = Map::new();
        let mut malformed = Vec::new();

        let outcome = match fetched {
            Err(failure) => {
                warn!(
                    file = %self.key,
                    state = ?FileState::Errored,
                    error = %failure,
                    "[CMS][FETCH] An unexpected error happened while fetching entries, continuing without them"
                );
                FileOutcome::FetchFailed {
                    message: failure.message,
                }
            }
            Ok(entries) => {
                debug!(file = %self.key, state = ?FileState::FanningOut, count = entries.len(), "[CMS] Materialising entries");
                let mut keys = Vec::with_capacity(entries.len());
                for entry in &entries {
                    let synthesized = match map_entry(
                        entry,
                        self.directive.entry_template.as_deref(),
                        self.directive.content_type.as_deref(),
                    ) {
                        Ok(synthesized) => synthesized,
                        Err(e) => {
                            warn!(file = %self.key, error = %e, "[CMS] Skipping malformed entry");
                            malformed.push(e);
                            continue;
                        }
                    };

                    let key = synthesized.key();
                    let listing = synthesized.listing();
                    listed.push(listing.clone());
                    if let Value::Array(of_type) = by_type
                        .entry(synthesized.content_type.clone())
                        .or_insert_with(|| Value::Array(Vec::new()))
                    {
                        of_type.push(listing);
                    }

                    if files.insert(key.clone(), synthesized.into_record()).is_some() {
                        debug!(file = %self.key, key = %key, "[CMS] Replaced existing file");
                    }
                    keys.push(key);
                }
                info!(
                    file = %self.key,
                    state = ?FileState::Done,
                    created = keys.len(),
                    skipped = malformed.len(),
                    "[CMS] Processed file"
                );
                FileOutcome::Materialised { keys }
            }
        };

        if let Some(Value::Object(block)) = files
            .get_mut(&self.key)
            .and_then(|source| source.metadata.get_mut(DIRECTIVE_KEY))
        {
            block.insert("entries".into(), Value::Array(listed));
            block.insert("contentTypes".into(), Value::Object(by_type));
        }

        FileReport {
            source: self.key,
            outcome,
            malformed,
        }
    }
}
