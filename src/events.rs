//! Events raised during a parse or validation run

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::binding::Record;
use crate::error::{DiagnosticLevel, ErrorCause};

/// The header element was decoded
#[derive(Debug, Clone)]
pub struct HeaderRead {
    /// `None` when the header element is nil
    pub header: Option<Record>,
    pub type_name: String,
    pub tag: String,
}

impl HeaderRead {
    pub fn header_as<T: Any>(&self) -> Option<&T> {
        self.header.as_ref()?.downcast_ref()
    }
}

/// A record element was decoded
#[derive(Debug, Clone)]
pub struct NodeRead {
    /// Most recent header decoded before this record
    pub header: Option<Record>,
    /// `None` when the element is nil
    pub node: Option<Record>,
    pub type_name: String,
    pub tag: String,
}

impl NodeRead {
    pub fn node_as<T: Any>(&self) -> Option<&T> {
        self.node.as_ref()?.downcast_ref()
    }

    pub fn header_as<T: Any>(&self) -> Option<&T> {
        self.header.as_ref()?.downcast_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// One problem found during a run
#[derive(Debug, Clone)]
pub struct ValidationError {
    cause: Arc<ErrorCause>,
    severity: Severity,
}

impl ValidationError {
    pub fn new(cause: ErrorCause, severity: Severity) -> Self {
        Self {
            cause: Arc::new(cause),
            severity,
        }
    }

    pub fn error(cause: ErrorCause) -> Self {
        Self::new(cause, Severity::Error)
    }

    /// Wrap a schema validation diagnostic, keeping warnings as warnings
    pub fn from_diagnostic(diagnostic: crate::error::Diagnostic) -> Self {
        let severity = match diagnostic.level {
            DiagnosticLevel::Warning => Severity::Warning,
            DiagnosticLevel::Error | DiagnosticLevel::Fatal => Severity::Error,
        };
        Self::new(ErrorCause::SchemaValidation(diagnostic), severity)
    }

    pub fn cause(&self) -> &ErrorCause {
        &self.cause
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Human-readable text; empty when the cause carries none
    pub fn message(&self) -> String {
        match self.cause.as_ref() {
            ErrorCause::SchemaValidation(diagnostic) => diagnostic.message.clone(),
            cause => cause.to_string(),
        }
    }

    /// Source line, when the cause is tied to one
    pub fn line(&self) -> Option<u32> {
        match self.cause.as_ref() {
            ErrorCause::SchemaValidation(diagnostic) => diagnostic.line,
            ErrorCause::UnrecoverableRead(crate::error::ReadError::Fatal(diagnostic)) => {
                diagnostic.line
            }
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.cause.is_terminal()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line() {
            Some(line) => write!(f, "line {}: {}", line, self.message()),
            None => f.write_str(&self.message()),
        }
    }
}

/// Outcome of a run, delivered to `finished` observers and returned to the caller
#[derive(Debug, Clone, Default)]
pub struct ValidationFinishedResult {
    /// Time spent between the start of the run and the end of reading
    pub elapsed: Duration,
    pub error_count: u64,
    pub parsed_node_count: u64,
    pub errors: Vec<ValidationError>,
}

impl ValidationFinishedResult {
    pub fn is_valid(&self) -> bool {
        self.error_count == 0
    }

    pub fn was_cancelled(&self) -> bool {
        self.errors
            .iter()
            .any(|error| matches!(error.cause(), ErrorCause::Cancelled))
    }

    /// First error that ended the run early, if any
    pub fn terminal_error(&self) -> Option<&ValidationError> {
        self.errors.iter().find(|error| error.is_terminal())
    }
}
