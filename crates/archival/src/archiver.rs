//! The archival stages: fetch, archive, combine and extract.
//!
//! Each stage is safe to re-run from scratch; all state lives in the
//! record store and durable storage.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use dataset_processor::{
    ContainerFilter, DatasetProcessor, FetchOutcome, HttpSettings, NoopFilter, Processor,
    ProcessorContext, ProcessorSummary,
};
use storage::{RecordStore, Storage, TaskQueue};
use storm_common::paths::basename;
use storm_common::{
    ArchiveSettings, FetchLog, FetchTask, ModelRun, NewFetchLog, StoragePath, StormError,
    StormResult, TaskMessage,
};

use crate::discovery::discover;
use crate::selection::select_latest_snapshots;
use crate::snapshot::{create_archive, extract_archive};
use crate::validation::validate_model_output;

/// Result of a fetch stage run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchReport {
    pub outcome: FetchOutcome,
    pub summary: ProcessorSummary,
    pub log: FetchLog,
}

/// Runs the archival stages against storage, records and the task queue.
pub struct Archiver {
    storage: Arc<dyn Storage>,
    records: Arc<dyn RecordStore>,
    queue: Arc<dyn TaskQueue>,
    settings: ArchiveSettings,
    http: HttpSettings,
    filter: Arc<dyn ContainerFilter>,
}

impl Archiver {
    pub fn new(
        storage: Arc<dyn Storage>,
        records: Arc<dyn RecordStore>,
        queue: Arc<dyn TaskQueue>,
        settings: ArchiveSettings,
    ) -> Self {
        Self {
            storage,
            records,
            queue,
            settings,
            http: HttpSettings::default(),
            filter: Arc::new(NoopFilter),
        }
    }

    pub fn with_http(mut self, http: HttpSettings) -> Self {
        self.http = http;
        self
    }

    /// Filter applied to hierarchical-container downloads.
    pub fn with_container_filter(mut self, filter: Arc<dyn ContainerFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn settings(&self) -> &ArchiveSettings {
        &self.settings
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Enqueue one fetch per active provider of every active requirement of
    /// a storm. Providers with a data regex contribute one fetch per
    /// discovered dataset. Returns the number of jobs enqueued.
    #[instrument(skip(self))]
    pub async fn schedule_storm(&self, storm_id: i64) -> StormResult<usize> {
        let storm = self.records.storm(storm_id).await?;
        let client = self.http.client(true)?;
        let mut enqueued = 0;

        for requirement in self.records.active_requirements(storm.id).await? {
            for provider in self.records.active_providers(requirement.id).await? {
                let jobs: Vec<(String, Option<String>)> = match provider.data_regex {
                    Some(_) => discover(&client, &provider)
                        .await?
                        .into_iter()
                        .map(|d| (d.url, Some(d.label)))
                        .collect(),
                    None => vec![(provider.url.clone(), None)],
                };

                for (url, label) in jobs {
                    self.queue
                        .enqueue(TaskMessage::Fetch(FetchTask {
                            storm_id: storm.id,
                            provider_id: provider.id,
                            url,
                            label,
                            group: None,
                            params: Default::default(),
                        }))
                        .await?;
                    enqueued += 1;
                }
            }
        }

        info!(storm = %storm, jobs = enqueued, "Scheduled covered data fetches");
        Ok(enqueued)
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    async fn context(&self, task: &FetchTask) -> StormResult<ProcessorContext> {
        let storm = self.records.storm(task.storm_id).await?;
        let provider = self.records.provider(task.provider_id).await?;
        let requirement = self.records.requirement(provider.requirement_id).await?;

        Ok(ProcessorContext {
            storm,
            requirement,
            provider,
            url: task.url.clone(),
            label: task.label.clone(),
            group: task.group.clone(),
            params: task.params.clone(),
            settings: self.settings.clone(),
            http: self.http,
        })
    }

    /// Run the provider's processor and log a successful attempt. A written
    /// artifact schedules the archive stage; a skipped fetch does not.
    #[instrument(skip(self, task), fields(storm = task.storm_id, provider = task.provider_id, url = %task.url))]
    pub async fn fetch(&self, task: &FetchTask) -> StormResult<FetchReport> {
        let ctx = self.context(task).await?;
        let new_log = NewFetchLog {
            storm_id: ctx.storm.id,
            requirement_id: ctx.requirement.id,
            requirement_name: ctx.requirement.name.clone(),
            provider_id: ctx.provider.id,
            date: Utc::now(),
            success: true,
        };

        let mut processor = Processor::open_with(ctx, Arc::clone(&self.filter)).await?;
        let outcome = processor.fetch().await?;
        let log = self.records.insert_fetch_log(new_log).await?;

        if let FetchOutcome::Written { .. } = outcome {
            self.queue
                .enqueue(TaskMessage::Archive {
                    storm_id: log.storm_id,
                    requirement_id: log.requirement_id,
                    log_id: log.id,
                })
                .await?;
        }

        Ok(FetchReport {
            outcome,
            summary: processor.summary(),
            log,
        })
    }

    /// Log the final failure of a fetch after its retries ran out.
    pub async fn record_failed_fetch(&self, task: &FetchTask) -> StormResult<FetchLog> {
        let provider = self.records.provider(task.provider_id).await?;
        let requirement = self.records.requirement(provider.requirement_id).await?;

        self.records
            .insert_fetch_log(NewFetchLog {
                storm_id: task.storm_id,
                requirement_id: requirement.id,
                requirement_name: requirement.name,
                provider_id: provider.id,
                date: Utc::now(),
                success: false,
            })
            .await
    }

    // =========================================================================
    // Archive
    // =========================================================================

    /// Tar a category's staging directory into its dated snapshot and point
    /// the triggering log at it. Returns the snapshot path.
    #[instrument(skip(self))]
    pub async fn archive(&self, storm_id: i64, requirement_id: i64, log_id: i64) -> StormResult<String> {
        let storm = self.records.storm(storm_id).await?;
        let requirement = self.records.requirement(requirement_id).await?;
        let log = self.records.fetch_log(log_id).await?;

        if log.is_archived() {
            info!(log = log.id, snapshot = %log.snapshot, "Fetch log already archived");
            return Ok(log.snapshot);
        }

        let staging = StoragePath::staging_category(&self.settings, &storm.name, &requirement.name);
        if !staging.is_dir() {
            return Err(StormError::NotFound(format!("staging directory {}", staging.display())));
        }
        let tar_path = archive_temp_path(&staging, &self.settings.archive_extension)?;
        let storage_path = StoragePath::category_snapshot(
            &self.settings,
            &storm.name,
            &requirement.name,
            log.date.date_naive(),
        );

        let (source, archive, arcname) = (staging.clone(), tar_path.to_path_buf(), requirement.name.clone());
        tokio::task::spawn_blocking(move || create_archive(&source, &arcname, &archive))
            .await
            .map_err(|e| StormError::Internal(format!("Archive task failed: {}", e)))??;

        let stored = self.storage.put_file(&tar_path, &storage_path).await;
        tar_path.close()?;
        let bytes = stored?;

        self.records.set_log_snapshot(log.id, &storage_path).await?;
        metrics::counter!("storm_snapshot_bytes_total").increment(bytes);

        info!(
            storm = %storm,
            category = %requirement,
            snapshot = %storage_path,
            bytes,
            "Archived covered data"
        );
        Ok(storage_path)
    }

    // =========================================================================
    // Combine
    // =========================================================================

    /// Copy the latest snapshot of every category into the run's versioned
    /// covered-data directory. Returns its URL, or `None` when the storm has
    /// no archived successful fetches yet.
    #[instrument(skip(self))]
    pub async fn combine(&self, run_id: i64) -> StormResult<Option<String>> {
        let mut run = self.records.model_run(run_id).await?;
        let storm = self.records.storm(run.storm_id).await?;

        let logs = self.records.fetch_logs_for_storm(storm.id).await?;
        let selected = select_latest_snapshots(&logs);
        if selected.is_empty() {
            info!(storm = %storm, run = run.id, "No archived covered data to combine");
            return Ok(None);
        }

        let destination = StoragePath::run_covered_data(&self.settings, &storm.name, &run);
        for log in &selected {
            let target = format!("{}/{}", destination, basename(&log.snapshot));
            self.storage.copy_within_storage(&log.snapshot, &target).await?;
        }

        run.covered_data_snapshot = destination.clone();
        self.records.save_model_run(&run).await?;

        info!(
            storm = %storm,
            run = run.id,
            snapshots = selected.len(),
            path = %destination,
            "Combined covered data"
        );
        Ok(Some(self.storage.storage_url(&destination)))
    }

    // =========================================================================
    // Model output
    // =========================================================================

    /// Validate and record an uploaded model output, then schedule its
    /// extraction. Nothing is written when validation fails.
    #[instrument(skip(self))]
    pub async fn submit_model_output(&self, run_id: i64, submitted: &str) -> StormResult<ModelRun> {
        let mut run = self.records.model_run(run_id).await?;
        let storm = self.records.storm(run.storm_id).await?;

        let path =
            validate_model_output(&self.settings, self.storage.as_ref(), &storm.name, &run, submitted)
                .await?;

        run.model_output_snapshot = path;
        self.records.save_model_run(&run).await?;
        self.queue.enqueue(TaskMessage::Extract { run_id: run.id }).await?;
        Ok(run)
    }

    /// Schedule the combine stage for a run.
    pub async fn request_combine(&self, run_id: i64) -> StormResult<String> {
        self.records.model_run(run_id).await?;
        self.queue.enqueue(TaskMessage::Combine { run_id }).await
    }

    /// Move uploaded model output into the run's versioned location, unpack
    /// it into local working storage and mark the run extracted. A run that
    /// is already extracted is left alone and yields `None`.
    #[instrument(skip(self))]
    pub async fn extract(&self, run_id: i64) -> StormResult<Option<String>> {
        let mut run = self.records.model_run(run_id).await?;
        if run.model_output_snapshot_extracted {
            info!(run = run.id, "Model output already extracted");
            return Ok(None);
        }
        if !run.has_output() {
            return Err(StormError::Validation(format!(
                "Model run {} has no uploaded output",
                run.id
            )));
        }
        let storm = self.records.storm(run.storm_id).await?;

        let upload = run.model_output_snapshot.clone();
        let name = basename(&upload).to_string();
        let versioned = format!(
            "{}/{}",
            StoragePath::run_psa(&self.settings, &storm.name, &run),
            name
        );

        if self.storage.exists(&upload).await? {
            self.storage.copy_within_storage(&upload, &versioned).await?;
            self.storage.delete(&upload).await?;
        } else if self.storage.exists(&versioned).await? {
            warn!(run = run.id, path = %versioned, "Upload already moved, resuming extraction");
        } else {
            return Err(StormError::NotFound(format!("{} doesn't exist in storage", upload)));
        }

        let local_dir = StoragePath::local_run_psa(&self.settings, &storm.name, &run);
        tokio::fs::create_dir_all(&local_dir).await?;
        let local_archive = local_dir.join(&name);
        self.storage.get_file(&versioned, &local_archive).await?;

        let (archive, destination) = (local_archive.clone(), local_dir.clone());
        tokio::task::spawn_blocking(move || extract_archive(&archive, &destination))
            .await
            .map_err(|e| StormError::Internal(format!("Extract task failed: {}", e)))??;
        tokio::fs::remove_file(&local_archive).await?;

        run.model_output_snapshot = versioned.clone();
        run.model_output_snapshot_extracted = true;
        run.date_returned = Some(Utc::now());
        self.records.save_model_run(&run).await?;

        info!(storm = %storm, run = run.id, path = %local_dir.display(), "Extracted model output");
        Ok(Some(self.storage.storage_url(&versioned)))
    }

    // =========================================================================
    // Generic URL fetch
    // =========================================================================

    /// GET a URL. With `write_to_path` the body is streamed to that file and
    /// `None` is returned; otherwise the body text is returned.
    #[instrument(skip(self))]
    pub async fn fetch_url(
        &self,
        url: &str,
        verify_tls: bool,
        write_to_path: Option<&Path>,
    ) -> StormResult<Option<String>> {
        let response = self
            .http
            .client(verify_tls)?
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StormError::Network(format!("Failed to fetch {}: {}", url, e)))?;

        let Some(path) = write_to_path else {
            let body = response
                .text()
                .await
                .map_err(|e| StormError::Network(format!("Failed to read {}: {}", url, e)))?;
            return Ok(Some(body));
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| StormError::Network(format!("Failed to read {}: {}", url, e)))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(None)
    }
}

/// Fresh `<category>.XXXXXX.<ext>` beside the staging dir, e.g.
/// `incomplete/Harvey/Winds.a1b2c3.tgz`. Unique per call; removed on drop.
fn archive_temp_path(staging: &Path, extension: &str) -> std::io::Result<TempPath> {
    let parent = staging.parent().unwrap_or(staging);
    let prefix = staging
        .file_name()
        .map(|n| format!("{}.", n.to_string_lossy()))
        .unwrap_or_default();
    let file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(&format!(".{}", extension))
        .tempfile_in(parent)?;
    Ok(file.into_temp_path())
}
