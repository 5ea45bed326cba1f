//! Per-run bookkeeping

use std::sync::Arc;
use std::time::Instant;

use crate::binding::Record;
use crate::cancellation::CancellationSignal;
use crate::dispatcher::EventDispatcher;
use crate::engine::RunOptions;
use crate::error::ErrorCause;
use crate::events::{ValidationError, ValidationFinishedResult};

/// State of one run, owned by the task driving the reader
pub(crate) struct ParseSession {
    started: Instant,
    node_count: u64,
    error_count: u64,
    errors: Vec<ValidationError>,
    report_errors: bool,
    header: Option<Record>,
    signal: CancellationSignal,
    error_sink: EventDispatcher<ValidationError>,
}

impl ParseSession {
    pub(crate) fn new(
        report_errors: bool,
        signal: CancellationSignal,
        error_sink: EventDispatcher<ValidationError>,
    ) -> Self {
        Self {
            started: Instant::now(),
            node_count: 0,
            error_count: 0,
            errors: Vec::new(),
            report_errors,
            header: None,
            signal,
            error_sink,
        }
    }

    /// Count an error, list it when required, and raise it to error observers
    pub(crate) fn record_error(&mut self, error: ValidationError) {
        self.error_count += 1;
        if self.report_errors || error.is_terminal() {
            self.errors.push(error.clone());
        }
        self.error_sink.dispatch(Arc::new(error), &self.signal);
    }

    pub(crate) fn fail(&mut self, cause: ErrorCause) {
        self.record_error(ValidationError::error(cause));
    }

    pub(crate) fn count_node(&mut self) {
        self.node_count += 1;
    }

    pub(crate) fn set_header(&mut self, header: Option<Record>) {
        self.header = header;
    }

    pub(crate) fn header(&self) -> Option<Record> {
        self.header.clone()
    }

    pub(crate) fn signal(&self) -> &CancellationSignal {
        &self.signal
    }

    /// Options this session was opened with
    pub(crate) fn run_options(&self) -> RunOptions {
        RunOptions {
            report_errors: self.report_errors,
            cancellation: self.signal.clone(),
        }
    }

    pub(crate) fn finish(self) -> ValidationFinishedResult {
        ValidationFinishedResult {
            elapsed: self.started.elapsed(),
            error_count: self.error_count,
            parsed_node_count: self.node_count,
            errors: self.errors,
        }
    }
}
