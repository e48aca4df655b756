//! Conversion job lifecycle.
//!
//! One HTTP request becomes one [`ConversionJob`], which walks this state
//! machine:
//!
//! ```text
//! Received ─▶ Validated ─▶ Converting ─▶ Verifying ─▶ Responding ─▶ Cleaned
//!    │            │             │             │             │
//!    ▼            ▼             ▼             ▼             ▼
//! RejectedInvalid  RejectedInvalid  FailedConversion  FailedMissingOutput  FailedTransfer
//!                                   (all failure states then ─▶ Cleaned)
//! ```
//!
//! The job owns the upload and the derived output path for its whole life
//! and removes both on every terminal state. [`ConversionService::run`]
//! drives the job up to `Responding` and hands back an [`Artifact`]; the
//! transfer responder finishes it once the last byte is sent. If the
//! artifact (or the in-flight job, when the request is cancelled) is dropped
//! early, `Drop` still removes the files.

use crate::config::ServiceConfig;
use crate::error::ConvertError;
use crate::format::{self, FormatMapping};
use crate::invoker::{ConverterInvoker, LibreOfficeInvoker};
use crate::progress::{JobObserverRef, NoopObserver};
use crate::store::{self, FileStore, StoredFile};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Message for a request without a (non-empty) file.
pub const NO_FILE_MESSAGE: &str = "No file uploaded";

/// Message for a request without both format fields.
pub const MISSING_FORMATS_MESSAGE: &str = "sourceFormat and targetFormat are required";

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JobState {
    Received,
    Validated,
    Converting,
    Verifying,
    Responding,
    Cleaned,
    RejectedInvalid,
    FailedConversion,
    FailedMissingOutput,
    FailedTransfer,
}

impl JobState {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            JobState::RejectedInvalid
                | JobState::FailedConversion
                | JobState::FailedMissingOutput
                | JobState::FailedTransfer
        )
    }

    /// The failure exit for a job abandoned while in this state.
    ///
    /// Failure states map to themselves. `Cleaned` has no exit and is
    /// returned unchanged.
    pub fn abandoned_outcome(self) -> JobState {
        match self {
            JobState::Received => JobState::RejectedInvalid,
            JobState::Validated | JobState::Converting => JobState::FailedConversion,
            JobState::Verifying => JobState::FailedMissingOutput,
            JobState::Responding => JobState::FailedTransfer,
            other => other,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What the upload receiver collected for one call.
///
/// Every field is optional here; [`ConversionService::run`] decides whether
/// the request is acceptable.
#[derive(Debug, Default)]
pub struct ConversionRequest {
    /// Informational only; never checked against the upload's content.
    pub source_format: Option<String>,
    pub target_format: Option<String>,
    pub upload: Option<StoredFile>,
}

impl ConversionRequest {
    pub fn new(
        upload: StoredFile,
        source_format: impl Into<String>,
        target_format: impl Into<String>,
    ) -> Self {
        Self {
            source_format: Some(source_format.into()),
            target_format: Some(target_format.into()),
            upload: Some(upload),
        }
    }
}

/// One in-flight conversion, from acceptance to cleanup.
pub struct ConversionJob {
    id: Uuid,
    state: JobState,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    observer: JobObserverRef,
    started: Instant,
    finished: bool,
}

impl ConversionJob {
    fn received(upload: Option<&StoredFile>, observer: JobObserverRef) -> Self {
        let id = upload.map(|u| u.id).unwrap_or_else(Uuid::new_v4);
        debug!(job = %id, "job received");
        Self {
            id,
            state: JobState::Received,
            input: upload.map(|u| u.path.clone()),
            output: None,
            observer,
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn advance(&mut self, to: JobState) {
        let from = self.state;
        if from == to {
            return;
        }
        debug!(job = %self.id, %from, %to, "job transition");
        self.state = to;
        self.observer.on_transition(self.id, from, to);
    }

    /// Enter `outcome`, remove both files, enter `Cleaned`.
    pub(crate) async fn finish(mut self, outcome: JobState) {
        self.advance(outcome);
        for path in self.input.iter().chain(self.output.iter()) {
            store::remove_file_logged(path).await;
        }
        self.complete(outcome);
    }

    fn complete(&mut self, outcome: JobState) {
        self.advance(JobState::Cleaned);
        self.finished = true;
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        if outcome.is_failure() {
            info!(job = %self.id, %outcome, elapsed_ms, "job failed, files cleaned");
        } else {
            info!(job = %self.id, elapsed_ms, "job complete, files cleaned");
        }
        self.observer.on_job_complete(self.id, outcome);
    }

    async fn fail(self, outcome: JobState, err: ConvertError) -> ConvertError {
        debug!(job = %self.id, error = %err, "job failing");
        self.finish(outcome).await;
        err
    }
}

impl Drop for ConversionJob {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Cancelled request or abandoned transfer.
        let outcome = self.state.abandoned_outcome();
        warn!(job = %self.id, state = %self.state, %outcome, "job dropped before completion, cleaning up");
        self.advance(outcome);
        // Only cancellation gets here; two unlinks run inline so the files
        // are gone when drop returns.
        for path in self.input.iter().chain(self.output.iter()) {
            store::remove_file_logged_blocking(path);
        }
        self.complete(outcome);
    }
}

/// A produced artifact, ready to be streamed. Owns the job until the
/// transfer ends.
pub struct Artifact {
    pub(crate) job: ConversionJob,
    pub(crate) path: PathBuf,
    pub(crate) token: String,
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("job_id", &self.job.id())
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Artifact {
    pub fn job_id(&self) -> Uuid {
        self.job.id()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The converter token the artifact was produced with.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The artifact's file name, used in `Content-Disposition`.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.{}", self.job.id(), format::output_extension(&self.token)))
    }

    pub fn content_type(&self) -> &'static str {
        format::content_type_for(&self.token)
    }

    /// Finish the job without transferring, e.g. when the caller only wanted
    /// the bytes on disk for a moment.
    pub async fn discard(self) {
        self.job.finish(JobState::Responding).await;
    }
}

/// The per-process conversion service: file store, invoker, format table
/// and admission control shared by every job.
#[derive(Clone)]
pub struct ConversionService {
    store: FileStore,
    invoker: Arc<dyn ConverterInvoker>,
    mapping: Arc<FormatMapping>,
    permits: Arc<Semaphore>,
    observer: JobObserverRef,
    max_upload_bytes: usize,
}

impl fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionService")
            .field("store", &self.store)
            .field("mapping", &self.mapping)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl ConversionService {
    /// Service using the LibreOffice invoker described by `config`.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::with_invoker(config, Arc::new(LibreOfficeInvoker::from_config(config)))
    }

    /// Service with a caller-supplied invoker.
    pub fn with_invoker(config: &ServiceConfig, invoker: Arc<dyn ConverterInvoker>) -> Self {
        Self {
            store: FileStore::new(&config.upload_dir, &config.output_dir),
            invoker,
            mapping: Arc::new(config.format_mapping.clone()),
            permits: Arc::new(Semaphore::new(config.max_concurrent_conversions.max(1))),
            observer: config
                .observer
                .clone()
                .unwrap_or_else(|| Arc::new(NoopObserver)),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn format_mapping(&self) -> &FormatMapping {
        &self.mapping
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Drive a request from `Received` to `Responding`.
    ///
    /// On success the returned [`Artifact`] owns the job; stream it with
    /// [`crate::transfer::respond`]. On failure the job has already reached
    /// `Cleaned` and the upload (and any output) is gone.
    pub async fn run(&self, request: ConversionRequest) -> Result<Artifact, ConvertError> {
        let mut job = ConversionJob::received(request.upload.as_ref(), Arc::clone(&self.observer));

        // ── Received → Validated ────────────────────────────────────────────
        let (upload, source_format, target_format) = match validate(request) {
            Ok(v) => v,
            Err(e) => return Err(job.fail(JobState::RejectedInvalid, e).await),
        };
        job.advance(JobState::Validated);
        info!(
            job = %job.id(),
            source = %source_format,
            target = %target_format,
            bytes = upload.len,
            "conversion accepted"
        );

        // ── Validated → Converting ──────────────────────────────────────────
        let token = match self.mapping.resolve(&target_format) {
            Ok(t) => t.to_string(),
            Err(e) => return Err(job.fail(JobState::RejectedInvalid, e).await),
        };
        if self.mapping.get(&target_format).is_none() {
            debug!(job = %job.id(), target = %target_format, %token, "unknown target format, using fallback token");
        }

        let output = match self
            .store
            .output_path_for(&upload, format::output_extension(&token))
            .await
        {
            Ok(p) => p,
            Err(e) => return Err(job.fail(JobState::FailedConversion, e).await),
        };
        job.output = Some(output.clone());

        let permit = match self.permits.acquire().await {
            Ok(p) => p,
            Err(_) => {
                let e = ConvertError::Internal("conversion service is shutting down".into());
                return Err(job.fail(JobState::FailedConversion, e).await);
            }
        };
        job.advance(JobState::Converting);
        let converted = self
            .invoker
            .convert(upload.path(), &token, self.store.output_dir())
            .await;
        drop(permit);

        if let Err(e) = converted {
            return Err(job.fail(JobState::FailedConversion, e).await);
        }

        // ── Converting → Verifying ──────────────────────────────────────────
        job.advance(JobState::Verifying);
        if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
            let e = ConvertError::MissingOutput { path: output };
            return Err(job.fail(JobState::FailedMissingOutput, e).await);
        }

        // ── Verifying → Responding ──────────────────────────────────────────
        job.advance(JobState::Responding);
        Ok(Artifact {
            job,
            path: output,
            token,
        })
    }
}

fn validate(request: ConversionRequest) -> Result<(StoredFile, String, String), ConvertError> {
    let upload = match request.upload {
        Some(u) if !u.is_empty() => u,
        _ => return Err(ConvertError::Validation(NO_FILE_MESSAGE.into())),
    };
    let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    match (
        non_blank(request.source_format),
        non_blank(request.target_format),
    ) {
        (Some(source), Some(target)) => Ok((upload, source, target)),
        _ => Err(ConvertError::Validation(MISSING_FORMATS_MESSAGE.into())),
    }
}
