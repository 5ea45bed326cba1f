//! # schema-stream
//!
//! Schema-driven streaming XML processing: validate a document against a set
//! of XSD schemas with libxml2 and, in the same forward-only pass, decode the
//! elements of the schema types a caller asks for into typed records.
//! Records, headers, errors, and the final result are pushed to async
//! observers under bounded concurrency.

pub mod binding;
pub mod cancellation;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod error_reporter;
pub mod events;
pub mod file_discovery;
pub mod libxml2;
pub mod output;
pub mod schema;
pub mod validator;

mod input;
mod read_loop;
mod session;

pub use binding::{
    BindingTable, ElementDecoder, ElementFragment, RawElement, Record, RootMetadata,
    TypeDescriptor, TypeTagBinding, check_ambiguity,
};
pub use cancellation::CancellationSignal;
pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use dispatcher::EventDispatcher;
pub use engine::{EngineConfig, ParseRequest, RunOptions, StreamingParser};
pub use error::{
    AmbiguityError, DecodeError, Diagnostic, DiagnosticLevel, Error, ErrorCause, ReadError,
    SchemaError,
};
pub use error_reporter::ErrorReporter;
pub use events::{HeaderRead, NodeRead, Severity, ValidationError, ValidationFinishedResult};
pub use file_discovery::{DiscoveryStats, FileDiscovery};
pub use libxml2::XmlSchemaPtr;
pub use output::Output;
pub use schema::{Schema, SchemaSet, SchemaTagIndex, build_tag_index};
pub use validator::{
    BatchConfig, BatchSummary, BatchValidator, FileReport, FileStatus, ProgressCallback,
    ValidationPhase, ValidationProgress, Validator,
};
