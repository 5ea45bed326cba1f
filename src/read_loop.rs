//! Single-pass element walk shared by the parser and the validator

use std::collections::BTreeSet;

use crate::error::{Diagnostic, DiagnosticLevel, ErrorCause, ReadError};
use crate::events::ValidationError;
use crate::libxml2::{Advance, TextReader};
use crate::session::ParseSession;

/// What the walk does after an element has been handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ElementAction {
    /// Continue into the element's children
    Descend,
    /// The subtree has been consumed; continue after it
    Consumed,
}

pub(crate) trait ElementHandler {
    fn on_element(
        &mut self,
        name: &str,
        reader: &mut TextReader,
        session: &mut ParseSession,
    ) -> ElementAction;
}

/// Handler that only lets the reader validate
pub(crate) struct ValidateOnly;

impl ElementHandler for ValidateOnly {
    fn on_element(&mut self, _: &str, _: &mut TextReader, _: &mut ParseSession) -> ElementAction {
        ElementAction::Descend
    }
}

/// Walk the document once, handing every declared element to `handler`
///
/// Validation diagnostics are recorded as they surface. Cancellation is
/// checked before each declared element. A fatal parser diagnostic, a reader
/// failure, or a failing byte source ends the walk with an unrecoverable
/// read error.
pub(crate) fn run<H: ElementHandler>(
    reader: &mut TextReader,
    declared: &BTreeSet<String>,
    session: &mut ParseSession,
    handler: &mut H,
) {
    let mut fatal = None;
    let mut step = reader.read();

    loop {
        drain_diagnostics(reader, session, &mut fatal);

        match step {
            Advance::Node => {}
            Advance::EndOfInput => break,
            Advance::Failed(code) => {
                session.fail(unrecoverable(reader, fatal.take(), code));
                return;
            }
        }

        if fatal.is_some() {
            break;
        }

        let name = match reader.local_name() {
            Some(name) if reader.is_element() && declared.contains(&name) => name,
            _ => {
                step = reader.read();
                continue;
            }
        };

        if session.signal().is_cancelled() {
            session.fail(ErrorCause::Cancelled);
            return;
        }

        step = match handler.on_element(&name, reader, session) {
            ElementAction::Descend => reader.read(),
            ElementAction::Consumed => reader.skip_subtree(),
        };
    }

    if let Some(failure) = reader.take_input_failure() {
        session.fail(ErrorCause::UnrecoverableRead(ReadError::Io(failure)));
    } else if let Some(diagnostic) = fatal {
        session.fail(ErrorCause::UnrecoverableRead(ReadError::Fatal(diagnostic)));
    }
}

fn drain_diagnostics(
    reader: &mut TextReader,
    session: &mut ParseSession,
    fatal: &mut Option<Diagnostic>,
) {
    for diagnostic in reader.take_diagnostics() {
        if diagnostic.level == DiagnosticLevel::Fatal {
            fatal.get_or_insert(diagnostic);
        } else {
            session.record_error(ValidationError::from_diagnostic(diagnostic));
        }
    }
}

fn unrecoverable(reader: &mut TextReader, fatal: Option<Diagnostic>, code: i32) -> ErrorCause {
    let error = match (reader.take_input_failure(), fatal) {
        (Some(failure), _) => ReadError::Io(failure),
        (None, Some(diagnostic)) => ReadError::Fatal(diagnostic),
        (None, None) => ReadError::Reader { code },
    };
    ErrorCause::UnrecoverableRead(error)
}
