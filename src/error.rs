use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Library error type for operations that fail outside of a parse run
///
/// Parse and validation runs never return this type: every failure inside a
/// run is folded into the run's `ValidationFinishedResult`. It covers the
/// helpers around a run (schema loading, batch discovery, configuration).
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LibXML2 internal error: {details}")]
    LibXml2Internal { details: String },

    #[error("File system traversal error: {path} - {reason}")]
    FileSystemTraversal { path: PathBuf, reason: String },

    #[error("Concurrent operation error: {details}")]
    Concurrency { details: String },
}

/// Underlying cause of a `ValidationError` raised during a run
#[derive(Error, Debug)]
pub enum ErrorCause {
    #[error("{reason}")]
    InvalidInput { reason: String },

    #[error("The given XML file (\"{}\") could not be opened: {source}", path.display())]
    InputUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("The XML stream is not valid. It could not be rewound: {source}")]
    StreamUnusable {
        #[source]
        source: std::io::Error,
    },

    #[error("The XML schema set could not be compiled: {0}")]
    SchemaCompilation(#[source] SchemaError),

    #[error("There are ambiguities for the given types: {0}")]
    AmbiguousMapping(#[source] AmbiguityError),

    #[error("The given type ({type_name}) is not declared by any element of the schema set.")]
    UnresolvedType { type_name: String },

    #[error("{0}")]
    SchemaValidation(Diagnostic),

    #[error("Could not deserialize <{tag}> as {type_name}: {source}")]
    Deserialization {
        type_name: String,
        tag: String,
        #[source]
        source: DecodeError,
    },

    #[error("Operation has been canceled.")]
    Cancelled,

    #[error("Unrecoverable read error: {0}")]
    UnrecoverableRead(#[source] ReadError),
}

impl ErrorCause {
    /// Terminal causes end the run and are always reported in the error list
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            ErrorCause::SchemaValidation(_) | ErrorCause::Deserialization { .. }
        )
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        ErrorCause::InvalidInput {
            reason: reason.into(),
        }
    }
}

/// Schema loading and compilation errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("The schema source is empty.")]
    Empty,

    #[error("The schema file points to a non-existent file: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Schema IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("The schema is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("The schema is not well-formed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("The document is not an XML Schema: root element is <{root}>")]
    NotASchema { root: String },

    #[error("The given schema set cannot be empty.")]
    EmptySet,

    #[error("Schema compilation failed: {}", messages.join("; "))]
    Compilation { messages: Vec<String> },

    #[error("Could not stage schema for compilation: {details}")]
    Staging { details: String },

    #[error(transparent)]
    LibXml2(#[from] LibXml2Error),
}

/// A requested type shares one of its tags with other types of the schema set
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct AmbiguityError {
    pub type_name: String,
    pub tag: String,
    pub competing_types: BTreeSet<String>,
}

impl fmt::Display for AmbiguityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "The given type ({}) is mapped to an ambiguous tag name.",
            self.type_name
        )?;
        writeln!(
            f,
            "The \"{}\" tag is used by other object types inside the provided schema set:",
            self.tag
        )?;
        for other in &self.competing_types {
            writeln!(f, "  - {}", other)?;
        }
        write!(
            f,
            "Consider requesting a higher-level type that wraps {}.",
            self.type_name
        )
    }
}

/// Failure to turn an element subtree into a record
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error(transparent)]
    Xml(#[from] quick_xml::DeError),

    #[error("element is in namespace {found:?}, expected {expected:?}")]
    NamespaceMismatch {
        expected: String,
        found: Option<String>,
    },

    #[error("element is nil but the binding is not nullable")]
    NilNotAllowed,

    #[error("{0}")]
    Custom(String),
}

/// Failure of the underlying reader that is not a validation diagnostic
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("reading the input failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Fatal(Diagnostic),

    #[error("the reader stopped with status {code}")]
    Reader { code: i32 },

    #[error("the reader task did not complete: {details}")]
    Task { details: String },

    #[error(transparent)]
    LibXml2(#[from] LibXml2Error),
}

/// Severity of a libxml2 diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Warning,
    Error,
    Fatal,
}

/// A structured diagnostic reported by libxml2
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostic {
    pub domain: i32,
    pub code: i32,
    pub level: DiagnosticLevel,
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{}:{}: {}", line, column, self.message),
            (Some(line), None) => write!(f, "{}: {}", line, self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// LibXML2-specific error types
#[derive(Error, Debug)]
pub enum LibXml2Error {
    #[error("Schema parsing failed: null pointer returned")]
    SchemaParseFailed,

    #[error("Text reader creation failed")]
    ReaderCreationFailed,

    #[error("Attaching the schema to the reader failed with code {code}")]
    SchemaAttachFailed { code: i32 },

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,

    #[error("Invalid location for libxml2: {details}")]
    InvalidLocation { details: String },
}

impl From<LibXml2Error> for Error {
    fn from(err: LibXml2Error) -> Self {
        Error::LibXml2Internal {
            details: err.to_string(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

/// Schema result type alias
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;
