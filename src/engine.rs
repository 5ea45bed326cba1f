//! Streaming parse and validate engine
//!
//! A [`StreamingParser`] validates one XML document against a [`SchemaSet`]
//! and, in the same forward-only pass, decodes every element bound to a
//! requested type. Results are pushed to observers as they are produced:
//!
//! 1. inputs are checked and the schema set is compiled
//! 2. requested types are resolved to tags and checked for ambiguity
//! 3. the document is read; headers and records are decoded and dispatched
//! 4. outstanding observer work is drained
//! 5. the finished result is broadcast and returned
//!
//! Every failure is folded into the returned [`ValidationFinishedResult`];
//! the parse methods themselves never fail.

use std::io::{Cursor, Read, Seek};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::binding::{BindingTable, ElementFragment, TypeDescriptor, check_ambiguity};
use crate::cancellation::CancellationSignal;
use crate::dispatcher::{DEFAULT_CONCURRENCY_MULTIPLIER, EventDispatcher};
use crate::error::{DecodeError, ErrorCause, ReadError};
use crate::events::{HeaderRead, NodeRead, ValidationError, ValidationFinishedResult};
use crate::input;
use crate::libxml2::TextReader;
use crate::read_loop::{self, ElementAction, ElementHandler};
use crate::schema::SchemaSet;
use crate::session::ParseSession;

/// Tuning shared by the parser and the validator
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Concurrent observer invocations per available core, per event kind
    pub concurrency_multiplier: usize,
    /// Upper bound on waiting for observers once reading has ended
    pub drain_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency_multiplier: DEFAULT_CONCURRENCY_MULTIPLIER,
            drain_timeout: None,
        }
    }
}

impl EngineConfig {
    pub(crate) fn max_concurrent(&self) -> usize {
        num_cpus::get() * self.concurrency_multiplier.max(1)
    }

    pub(crate) fn dispatcher<E: Send + Sync + 'static>(&self) -> EventDispatcher<E> {
        EventDispatcher::with_concurrency(self.max_concurrent())
    }
}

/// Options common to every run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// List per-item errors in the result; terminal errors are always listed
    pub report_errors: bool,
    pub cancellation: CancellationSignal,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            report_errors: true,
            cancellation: CancellationSignal::new(),
        }
    }
}

/// What a parse run should extract
#[derive(Debug, Clone, Default)]
pub struct ParseRequest {
    header: Option<TypeDescriptor>,
    records: Vec<TypeDescriptor>,
    options: RunOptions,
}

impl ParseRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract elements of `descriptor`'s type as records
    pub fn record(mut self, descriptor: TypeDescriptor) -> Self {
        self.records.push(descriptor);
        self
    }

    pub fn records(mut self, descriptors: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        self.records.extend(descriptors);
        self
    }

    /// Extract elements of `descriptor`'s type as the current header
    pub fn header(mut self, descriptor: TypeDescriptor) -> Self {
        self.header = Some(descriptor);
        self
    }

    pub fn report_errors(mut self, report_errors: bool) -> Self {
        self.options.report_errors = report_errors;
        self
    }

    pub fn cancellation(mut self, signal: CancellationSignal) -> Self {
        self.options.cancellation = signal;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }
}

#[derive(Debug, Clone)]
pub struct StreamingParser {
    config: EngineConfig,
    header_read: EventDispatcher<HeaderRead>,
    node_read: EventDispatcher<NodeRead>,
    error_occurred: EventDispatcher<ValidationError>,
    finished: EventDispatcher<ValidationFinishedResult>,
}

impl Default for StreamingParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingParser {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            header_read: config.dispatcher(),
            node_read: config.dispatcher(),
            error_occurred: config.dispatcher(),
            finished: config.dispatcher(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn on_header_read<F, Fut>(&mut self, observer: F) -> &mut Self
    where
        F: Fn(Arc<HeaderRead>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.header_read.subscribe(observer);
        self
    }

    pub fn on_node_read<F, Fut>(&mut self, observer: F) -> &mut Self
    where
        F: Fn(Arc<NodeRead>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.node_read.subscribe(observer);
        self
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

    /// Parse an in-memory document
    pub async fn parse_bytes(
        &self,
        bytes: impl Into<Vec<u8>>,
        schemas: &SchemaSet,
        request: ParseRequest,
    ) -> ValidationFinishedResult {
        let bytes = bytes.into();
        let mut session = self.session(&request.options);
        if let Err(cause) = input::check_bytes(&bytes) {
            session.fail(cause);
            return self.conclude(session).await;
        }
        self.run(Cursor::new(bytes), None, schemas, request, session)
            .await
    }

    /// Parse the document at `path`
    pub async fn parse_file(
        &self,
        path: impl AsRef<Path>,
        schemas: &SchemaSet,
        request: ParseRequest,
    ) -> ValidationFinishedResult {
        let path = path.as_ref();
        let mut session = self.session(&request.options);
        let file = match input::open_file(path).await {
            Ok(file) => file,
            Err(cause) => {
                session.fail(cause);
                return self.conclude(session).await;
            }
        };
        let url = path.to_string_lossy().into_owned();
        self.run(file, Some(url), schemas, request, session).await
    }

    /// Parse a seekable stream from its start
    pub async fn parse_stream<R>(
        &self,
        stream: R,
        schemas: &SchemaSet,
        request: ParseRequest,
    ) -> ValidationFinishedResult
    where
        R: Read + Seek + Send + 'static,
    {
        let session = self.session(&request.options);
        self.run(stream, None, schemas, request, session).await
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
        request: ParseRequest,
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

        let job = ParseJob {
            schemas: schemas.clone(),
            header: request.header,
            records: request.records,
            header_read: self.header_read.clone(),
            node_read: self.node_read.clone(),
        };
        let signal = request.options.cancellation.clone();
        let error_sink = self.error_occurred.clone();
        let report_errors = request.options.report_errors;

        let session = match tokio::task::spawn_blocking(move || {
            job.execute(Box::new(stream), document_url.as_deref(), session)
        })
        .await
        {
            Ok(session) => session,
            Err(e) => {
                let mut session = ParseSession::new(report_errors, signal, error_sink);
                session.fail(ErrorCause::UnrecoverableRead(ReadError::Task {
                    details: e.to_string(),
                }));
                session
            }
        };

        self.conclude(session).await
    }

    async fn conclude(&self, session: ParseSession) -> ValidationFinishedResult {
        let result = session.finish();
        let pending = vec![
            self.header_read.await_idle().boxed(),
            self.node_read.await_idle().boxed(),
            self.error_occurred.await_idle().boxed(),
        ];
        conclude_run(&self.config, pending, &self.finished, result).await
    }
}

/// Wait for outstanding observer work, then broadcast `result` and wait for
/// the `finished` observers
///
/// The broadcast uses a fresh signal so a cancelled run still reports.
pub(crate) async fn conclude_run(
    config: &EngineConfig,
    pending: Vec<BoxFuture<'_, ()>>,
    finished: &EventDispatcher<ValidationFinishedResult>,
    result: ValidationFinishedResult,
) -> ValidationFinishedResult {
    bounded(config.drain_timeout, futures::future::join_all(pending)).await;
    finished.dispatch(Arc::new(result.clone()), &CancellationSignal::new());
    bounded(config.drain_timeout, finished.await_idle()).await;
    result
}

async fn bounded<F: Future>(limit: Option<Duration>, work: F) {
    match limit {
        Some(limit) => {
            // Observers still running past the limit are left to finish on their own.
            let _ = tokio::time::timeout(limit, work).await;
        }
        None => {
            work.await;
        }
    }
}

/// Work carried onto the blocking pool for one run
struct ParseJob {
    schemas: SchemaSet,
    header: Option<TypeDescriptor>,
    records: Vec<TypeDescriptor>,
    header_read: EventDispatcher<HeaderRead>,
    node_read: EventDispatcher<NodeRead>,
}

impl ParseJob {
    fn execute(
        self,
        stream: Box<dyn Read + Send>,
        document_url: Option<&str>,
        mut session: ParseSession,
    ) -> ParseSession {
        let compiled = match self.schemas.compile() {
            Ok(compiled) => compiled,
            Err(e) => {
                session.fail(ErrorCause::SchemaCompilation(e));
                return session;
            }
        };

        let index = self.schemas.tag_index();
        let table = match BindingTable::resolve(&index, self.header.as_ref(), &self.records) {
            Ok(table) => table,
            Err(cause) => {
                session.fail(cause);
                return session;
            }
        };
        if let Err(e) = check_ambiguity(&index, table.requested_types()) {
            session.fail(ErrorCause::AmbiguousMapping(e));
            return session;
        }

        if session.signal().is_cancelled() {
            session.fail(ErrorCause::Cancelled);
            return session;
        }

        let mut reader = match TextReader::new(stream, document_url, Some(compiled)) {
            Ok(reader) => reader,
            Err(e) => {
                session.fail(ErrorCause::UnrecoverableRead(ReadError::LibXml2(e)));
                return session;
            }
        };

        let declared = self.schemas.declared_elements();
        let mut handler = BindingHandler {
            table: &table,
            header_read: &self.header_read,
            node_read: &self.node_read,
        };
        read_loop::run(&mut reader, &declared, &mut session, &mut handler);
        session
    }
}

struct BindingHandler<'a> {
    table: &'a BindingTable,
    header_read: &'a EventDispatcher<HeaderRead>,
    node_read: &'a EventDispatcher<NodeRead>,
}

impl ElementHandler for BindingHandler<'_> {
    fn on_element(
        &mut self,
        name: &str,
        reader: &mut TextReader,
        session: &mut ParseSession,
    ) -> ElementAction {
        let (binding, is_header) = match self.table.record_for(name) {
            Some(binding) => (binding, false),
            None => match self.table.header_for(name) {
                Some(binding) => (binding, true),
                None => return ElementAction::Descend,
            },
        };

        let type_name = binding.descriptor.name().to_string();
        let decoded = fragment(name, reader).and_then(|fragment| binding.decode(&fragment));
        let record = match decoded {
            Ok(record) => record,
            Err(source) => {
                session.fail(ErrorCause::Deserialization {
                    type_name,
                    tag: name.to_string(),
                    source,
                });
                return ElementAction::Consumed;
            }
        };

        if is_header {
            session.set_header(record.clone());
            let event = HeaderRead {
                header: record,
                type_name,
                tag: name.to_string(),
            };
            self.header_read.dispatch(Arc::new(event), session.signal());
        } else {
            session.count_node();
            let event = NodeRead {
                header: session.header(),
                node: record,
                type_name,
                tag: name.to_string(),
            };
            self.node_read.dispatch(Arc::new(event), session.signal());
        }
        ElementAction::Consumed
    }
}

fn fragment(name: &str, reader: &mut TextReader) -> Result<ElementFragment, DecodeError> {
    let line = reader.line_number();
    let namespace = reader.namespace_uri();
    let nil = reader.is_nil();
    let outer_xml = reader
        .outer_xml()
        .ok_or_else(|| DecodeError::Custom("the element content could not be read".to_string()))?;
    Ok(ElementFragment {
        local_name: name.to_string(),
        namespace,
        outer_xml,
        nil,
        line,
    })
}
