//! Schema validation without record extraction
//!
//! [`Validator`] runs the same forward-only pass as the streaming parser but
//! only collects validation errors. [`BatchValidator`] fans a list of files
//! out over tokio tasks:
//! - **Async orchestration**: file discovery and per-file tasks
//! - **Blocking work**: schema compilation and libxml2 reading on the blocking pool
//! - **Bounded concurrency**: a semaphore caps the files in flight

use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::cancellation::CancellationSignal;
use crate::dispatcher::EventDispatcher;
use crate::engine::{EngineConfig, RunOptions, conclude_run};
use crate::error::{Error, ErrorCause, ReadError, Result};
use crate::events::{ValidationError, ValidationFinishedResult};
use crate::file_discovery::FileDiscovery;
use crate::input;
use crate::libxml2::TextReader;
use crate::read_loop::{self, ValidateOnly};
use crate::schema::SchemaSet;
use crate::session::ParseSession;

/// Validates single documents against a schema set
#[derive(Debug, Clone)]
pub struct Validator {
    config: EngineConfig,
    error_occurred: EventDispatcher<ValidationError>,
    finished: EventDispatcher<ValidationFinishedResult>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            error_occurred: config.dispatcher(),
            finished: config.dispatcher(),
            config,
        }
    }

    pub fn on_error<F, Fut>(&mut self, observer: F) -> &mut Self
    where
        F: Fn(Arc<ValidationError>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.error_occurred.subscribe(observer);
        self
    }

    pub fn on_finished<F, Fut>(&mut self, observer: F) -> &mut Self
    where
        F: Fn(Arc<ValidationFinishedResult>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.finished.subscribe(observer);
        self
    }

    pub async fn validate_bytes(
        &self,
        bytes: impl Into<Vec<u8>>,
        schemas: &SchemaSet,
        options: RunOptions,
    ) -> ValidationFinishedResult {
        let bytes = bytes.into();
        let mut session = self.session(&options);
        if let Err(cause) = input::check_bytes(&bytes) {
            session.fail(cause);
            return self.conclude(session).await;
        }
        self.run(Cursor::new(bytes), None, schemas, session).await
    }

    pub async fn validate_file(
        &self,
        path: impl AsRef<Path>,
        schemas: &SchemaSet,
        options: RunOptions,
    ) -> ValidationFinishedResult {
        let path = path.as_ref();
        let mut session = self.session(&options);
        match input::open_file(path).await {
            Ok(file) => {
                let url = path.to_string_lossy().into_owned();
                self.run(file, Some(url), schemas, session).await
            }
            Err(cause) => {
                session.fail(cause);
                self.conclude(session).await
            }
        }
    }

    pub async fn validate_stream<R>(
        &self,
        stream: R,
        schemas: &SchemaSet,
        options: RunOptions,
    ) -> ValidationFinishedResult
    where
        R: Read + Seek + Send + 'static,
    {
        let session = self.session(&options);
        self.run(stream, None, schemas, session).await
    }

    fn session(&self, options: &RunOptions) -> ParseSession {
        ParseSession::new(
            options.report_errors,
            options.cancellation.clone(),
            self.error_occurred.clone(),
        )
    }

    async fn run<R>(
        &self,
        stream: R,
        document_url: Option<String>,
        schemas: &SchemaSet,
        mut session: ParseSession,
    ) -> ValidationFinishedResult
    where
        R: Read + Seek + Send + 'static,
    {
        if let Err(cause) = input::check_schema_set(schemas) {
            session.fail(cause);
            return self.conclude(session).await;
        }
        let stream = match input::rewind(stream) {
            Ok(stream) => stream,
            Err(cause) => {
                session.fail(cause);
                return self.conclude(session).await;
            }
        };

        let options = session.run_options();
        let schemas = schemas.clone();
        let task = tokio::task::spawn_blocking(move || {
            validate_blocking(&schemas, Box::new(stream), document_url.as_deref(), &mut session);
            session
        });
        match task.await {
            Ok(session) => self.conclude(session).await,
            Err(e) => self.conclude(self.failed_task(&options, e)).await,
        }
    }

    /// Session for a run whose reader task died
    fn failed_task(&self, options: &RunOptions, error: tokio::task::JoinError) -> ParseSession {
        let mut session = self.session(options);
        session.fail(ErrorCause::UnrecoverableRead(ReadError::Task {
            details: error.to_string(),
        }));
        session
    }

    async fn conclude(&self, session: ParseSession) -> ValidationFinishedResult {
        let result = session.finish();
        let pending = vec![self.error_occurred.await_idle().boxed()];
        conclude_run(&self.config, pending, &self.finished, result).await
    }
}

fn validate_blocking(
    schemas: &SchemaSet,
    stream: Box<dyn Read + Send>,
    document_url: Option<&str>,
    session: &mut ParseSession,
) {
    let compiled = match schemas.compile() {
        Ok(compiled) => compiled,
        Err(e) => return session.fail(ErrorCause::SchemaCompilation(e)),
    };
    if session.signal().is_cancelled() {
        return session.fail(ErrorCause::Cancelled);
    }
    let mut reader = match TextReader::new(stream, document_url, Some(compiled)) {
        Ok(reader) => reader,
        Err(e) => return session.fail(ErrorCause::UnrecoverableRead(ReadError::LibXml2(e))),
    };
    read_loop::run(
        &mut reader,
        &schemas.declared_elements(),
        session,
        &mut ValidateOnly,
    );
}

/// Batch validation settings
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Number of files validated at once
    pub max_concurrent_validations: usize,
    /// Stop starting new files after the first file with errors
    pub fail_fast: bool,
    /// List per-item errors in each file report
    pub report_errors: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_validations: num_cpus::get(),
            fail_fast: false,
            report_errors: true,
        }
    }
}

/// Status of a single file validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    /// File validated successfully
    Valid,
    /// File has schema violations
    Invalid { error_count: u64 },
    /// The run could not complete
    Error { message: String },
    /// File was not validated
    Skipped { reason: String },
}

impl FileStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, FileStatus::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, FileStatus::Invalid { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FileStatus::Error { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, FileStatus::Skipped { .. })
    }
}

/// Outcome of validating one file in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub status: FileStatus,
    pub duration: Duration,
    pub error_details: Vec<String>,
}

impl FileReport {
    pub fn from_result(path: PathBuf, result: &ValidationFinishedResult) -> Self {
        let status = match result.terminal_error() {
            Some(error) if matches!(error.cause(), ErrorCause::Cancelled) => FileStatus::Skipped {
                reason: error.message(),
            },
            Some(error) => FileStatus::Error {
                message: error.message(),
            },
            None if result.error_count > 0 => FileStatus::Invalid {
                error_count: result.error_count,
            },
            None => FileStatus::Valid,
        };
        Self {
            path,
            status,
            duration: result.elapsed,
            error_details: result.errors.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn skipped(path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            path,
            status: FileStatus::Skipped {
                reason: reason.into(),
            },
            duration: Duration::ZERO,
            error_details: Vec::new(),
        }
    }
}

/// Aggregated batch outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_files: usize,
    pub valid_files: usize,
    pub invalid_files: usize,
    pub error_files: usize,
    pub skipped_files: usize,
    /// Wall-clock time of the whole batch
    pub total_duration: Duration,
    pub average_duration: Duration,
    pub file_reports: Vec<FileReport>,
}

impl BatchSummary {
    pub fn aggregate(file_reports: Vec<FileReport>, total_duration: Duration) -> Self {
        let mut summary = Self {
            total_files: file_reports.len(),
            total_duration,
            ..Default::default()
        };
        let mut validation_time = Duration::ZERO;
        for report in &file_reports {
            match report.status {
                FileStatus::Valid => summary.valid_files += 1,
                FileStatus::Invalid { .. } => summary.invalid_files += 1,
                FileStatus::Error { .. } => summary.error_files += 1,
                FileStatus::Skipped { .. } => summary.skipped_files += 1,
            }
            validation_time += report.duration;
        }
        if summary.total_files > 0 {
            summary.average_duration = validation_time / summary.total_files as u32;
        }
        summary.file_reports = file_reports;
        summary
    }

    pub fn all_valid(&self) -> bool {
        self.valid_files == self.total_files && self.total_files > 0
    }

    pub fn has_errors(&self) -> bool {
        self.error_files > 0 || self.invalid_files > 0
    }

    /// Percentage of files that validated
    pub fn success_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.valid_files as f64 / self.total_files as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPhase {
    Discovery,
    Compiling,
    Validation,
    Complete,
}

#[derive(Debug, Clone)]
pub struct ValidationProgress {
    pub current_file: Option<PathBuf>,
    pub completed: usize,
    pub total: usize,
    pub phase: ValidationPhase,
}

pub type ProgressCallback = Arc<dyn Fn(ValidationProgress) + Send + Sync>;

/// Validates many files against one schema set
pub struct BatchValidator {
    schemas: SchemaSet,
    engine: EngineConfig,
    config: BatchConfig,
}

impl BatchValidator {
    pub fn new(schemas: SchemaSet, engine: EngineConfig, config: BatchConfig) -> Self {
        Self {
            schemas,
            engine,
            config,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Discover the files under `path` and validate them
    pub async fn validate_path(
        &self,
        path: &Path,
        discovery: &FileDiscovery,
        progress: Option<ProgressCallback>,
    ) -> Result<BatchSummary> {
        let started = Instant::now();
        report(&progress, None, 0, 0, ValidationPhase::Discovery);

        let files = discovery.discover_files(path).await?;
        if files.is_empty() {
            return Ok(BatchSummary::aggregate(Vec::new(), started.elapsed()));
        }

        let mut summary = self.validate_files(files, progress).await?;
        summary.total_duration = started.elapsed();
        Ok(summary)
    }

    /// Validate `files`, compiling the schema set once up front
    ///
    /// Fails only when the schema set cannot be compiled or a task cannot be
    /// joined; per-file problems are reported in the summary.
    pub async fn validate_files(
        &self,
        files: Vec<PathBuf>,
        progress: Option<ProgressCallback>,
    ) -> Result<BatchSummary> {
        let started = Instant::now();
        let total = files.len();
        if total == 0 {
            return Ok(BatchSummary::default());
        }

        report(&progress, None, 0, total, ValidationPhase::Compiling);
        let schemas = self.schemas.clone();
        tokio::task::spawn_blocking(move || schemas.compile())
            .await
            .map_err(|e| Error::Concurrency {
                details: format!("Schema compilation task failed: {}", e),
            })??;

        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            self.config.max_concurrent_validations.max(1),
        ));
        let completed = Arc::new(AtomicUsize::new(0));
        let stop = CancellationSignal::new();

        let tasks: Vec<_> = files
            .into_iter()
            .map(|path| {
                let semaphore = Arc::clone(&semaphore);
                let completed = Arc::clone(&completed);
                let progress = progress.clone();
                let stop = stop.clone();
                let schemas = self.schemas.clone();
                let validator = Validator::with_config(self.engine.clone());
                let fail_fast = self.config.fail_fast;
                let report_errors = self.config.report_errors;

                tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return FileReport::skipped(path, "validation pool closed");
                    };

                    let file_report = if stop.is_cancelled() {
                        FileReport::skipped(path.clone(), "stopped after an earlier failure")
                    } else {
                        let options = RunOptions {
                            report_errors,
                            cancellation: stop.clone(),
                        };
                        let result = validator.validate_file(&path, &schemas, options).await;
                        FileReport::from_result(path.clone(), &result)
                    };

                    if fail_fast && (file_report.status.is_invalid() || file_report.status.is_error())
                    {
                        stop.cancel();
                    }

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    report(&progress, Some(path), done, total, ValidationPhase::Validation);
                    file_report
                })
            })
            .collect();

        let mut file_reports = Vec::with_capacity(total);
        for joined in join_all(tasks).await {
            file_reports.push(joined.map_err(|e| Error::Concurrency {
                details: format!("Task join error: {}", e),
            })?);
        }

        report(&progress, None, total, total, ValidationPhase::Complete);
        Ok(BatchSummary::aggregate(file_reports, started.elapsed()))
    }
}

fn report(
    progress: &Option<ProgressCallback>,
    current_file: Option<PathBuf>,
    completed: usize,
    total: usize,
    phase: ValidationPhase,
) {
    if let Some(callback) = progress {
        callback(ValidationProgress {
            current_file,
            completed,
            total,
            phase,
        });
    }
}
