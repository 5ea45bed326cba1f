//! LibXML2 FFI Wrapper Module
//!
//! Safe wrappers around the libxml2 calls this crate needs:
//!
//! - XML Schema compilation from memory or from a location on disk, with the
//!   parser's structured diagnostics captured instead of printed.
//! - A validating pull reader (`xmlTextReader`) fed from any Rust `Read`
//!   through `xmlReaderForIO`, with the compiled schema attached.
//!
//! ## Thread Safety Strategy
//!
//! - **Schema parsing** is serialized behind `SCHEMA_PARSE_LOCK`; the libxml2
//!   schema parser is not thread-safe.
//! - **Compiled schemas** are read-only after parsing and are shared through
//!   `Arc`-wrapped pointers.
//! - **Readers** are owned by exactly one thread at a time. A `TextReader` is
//!   `Send` but not `Sync`.

use std::ffi::{CStr, CString};
use std::io::Read;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex, Once};

use libc::{c_char, c_int, c_void};

use crate::error::{Diagnostic, DiagnosticLevel, LibXml2Error, LibXml2Result};

/// Global initialization flag for libxml2
///
/// libxml2's initialization functions are not thread-safe and must run once.
static LIBXML2_INIT: Once = Once::new();

/// libxml2 schema parsing must never run concurrently
static SCHEMA_PARSE_LOCK: Mutex<()> = Mutex::new(());

/// XML Schema instance namespace, used for `xsi:nil`
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

const XML_PARSE_NOBLANKS: c_int = 1 << 8;
const XML_PARSE_HUGE: c_int = 1 << 19;

const XML_READER_TYPE_ELEMENT: c_int = 1;

const XML_ERR_WARNING: c_int = 1;
const XML_ERR_ERROR: c_int = 2;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlTextReader {
    _private: [u8; 0],
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;

pub type XmlInputReadCallback =
    Option<unsafe extern "C" fn(context: *mut c_void, buffer: *mut c_char, len: c_int) -> c_int>;

pub type XmlInputCloseCallback = Option<unsafe extern "C" fn(context: *mut c_void) -> c_int>;

pub type XmlFreeFunc = Option<unsafe extern "C" fn(mem: *mut c_void)>;

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub static xmlFree: XmlFreeFunc;

    pub fn xmlInitParser();
    pub fn xmlInitGlobals();

    // Schema parsing functions
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaNewParserCtxt(url: *const c_char) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    // Streaming reader functions
    pub fn xmlReaderForIO(
        ioread: XmlInputReadCallback,
        ioclose: XmlInputCloseCallback,
        ioctx: *mut c_void,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlTextReader;
    pub fn xmlFreeTextReader(reader: *mut XmlTextReader);
    pub fn xmlTextReaderSetSchema(reader: *mut XmlTextReader, schema: *mut XmlSchema) -> c_int;
    pub fn xmlTextReaderSetStructuredErrorHandler(
        reader: *mut XmlTextReader,
        f: XmlStructuredErrorFunc,
        arg: *mut c_void,
    );
    pub fn xmlTextReaderRead(reader: *mut XmlTextReader) -> c_int;
    pub fn xmlTextReaderNext(reader: *mut XmlTextReader) -> c_int;
    pub fn xmlTextReaderNodeType(reader: *mut XmlTextReader) -> c_int;
    pub fn xmlTextReaderDepth(reader: *mut XmlTextReader) -> c_int;
    pub fn xmlTextReaderConstLocalName(reader: *mut XmlTextReader) -> *const c_char;
    pub fn xmlTextReaderConstNamespaceUri(reader: *mut XmlTextReader) -> *const c_char;
    pub fn xmlTextReaderReadOuterXml(reader: *mut XmlTextReader) -> *mut c_char;
    pub fn xmlTextReaderGetAttributeNs(
        reader: *mut XmlTextReader,
        local_name: *const c_char,
        namespace_uri: *const c_char,
    ) -> *mut c_char;
    pub fn xmlTextReaderGetParserLineNumber(reader: *mut XmlTextReader) -> c_int;
}

fn ensure_initialized() {
    LIBXML2_INIT.call_once(|| unsafe {
        xmlInitParser();
        xmlInitGlobals();
    });
}

impl Diagnostic {
    /// Convert a libxml2 structured error
    ///
    /// # Safety
    ///
    /// `error` must point to a live `xmlError` for the duration of the call.
    unsafe fn from_raw(error: *const xmlError) -> Self {
        let error = unsafe { &*error };
        let message = if error.message.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(error.message) }
                .to_string_lossy()
                .trim()
                .to_string()
        };
        let level = match error.level {
            XML_ERR_WARNING => DiagnosticLevel::Warning,
            XML_ERR_ERROR => DiagnosticLevel::Error,
            _ => DiagnosticLevel::Fatal,
        };
        Diagnostic {
            domain: error.domain,
            code: error.code,
            level,
            message,
            line: u32::try_from(error.line).ok().filter(|line| *line > 0),
            column: u32::try_from(error.int2).ok().filter(|column| *column > 0),
        }
    }
}

/// Callback for libxml2 to report structured diagnostics into a `Vec<Diagnostic>`
unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *mut xmlError) {
    if user_data.is_null() || error.is_null() {
        return;
    }
    let diagnostics = unsafe { &mut *(user_data as *mut Vec<Diagnostic>) };
    diagnostics.push(unsafe { Diagnostic::from_raw(error) });
}

/// Thread-safe wrapper for libxml2 schema pointer with proper resource management
#[derive(Debug)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: compiled xmlSchema structures are read-only and thread-safe for validation.
// See: http://xmlsoft.org/threads.html
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    /// # Safety
    ///
    /// `ptr` must come from `xmlSchemaParse` and must not be freed elsewhere.
    pub(crate) unsafe fn from_raw(ptr: *mut XmlSchema) -> LibXml2Result<Self> {
        if ptr.is_null() {
            return Err(LibXml2Error::SchemaParseFailed);
        }

        Ok(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner {
                ptr,
                _phantom: PhantomData,
            }),
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut XmlSchema {
        self.inner.ptr
    }

    pub fn is_valid(&self) -> bool {
        !self.inner.ptr.is_null()
    }
}

impl Clone for XmlSchemaPtr {
    fn clone(&self) -> Self {
        XmlSchemaPtr {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                xmlSchemaFree(self.ptr);
            }
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Outcome of a schema compilation attempt
#[derive(Debug)]
pub enum SchemaCompilation {
    Compiled(XmlSchemaPtr),
    Failed(Vec<Diagnostic>),
}

/// Compile an XML schema held in memory
///
/// Relative `xs:include`/`xs:import` locations resolve against the process's
/// working directory; use [`compile_schema_location`] for schemas on disk.
pub fn compile_schema_from_memory(schema_data: &[u8]) -> LibXml2Result<SchemaCompilation> {
    ensure_initialized();
    let size = c_int::try_from(schema_data.len()).map_err(|_| LibXml2Error::MemoryAllocation)?;

    let _guard = SCHEMA_PARSE_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let parser_ctxt =
        unsafe { xmlSchemaNewMemParserCtxt(schema_data.as_ptr() as *const c_char, size) };
    if parser_ctxt.is_null() {
        return Err(LibXml2Error::MemoryAllocation);
    }
    unsafe { run_schema_parser(parser_ctxt) }
}

/// Compile an XML schema from a file location
pub fn compile_schema_location(location: &Path) -> LibXml2Result<SchemaCompilation> {
    ensure_initialized();
    let location_str = location
        .to_str()
        .ok_or_else(|| LibXml2Error::InvalidLocation {
            details: location.display().to_string(),
        })?;
    let c_location = CString::new(location_str).map_err(|_| LibXml2Error::InvalidLocation {
        details: location_str.to_string(),
    })?;

    let _guard = SCHEMA_PARSE_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let parser_ctxt = unsafe { xmlSchemaNewParserCtxt(c_location.as_ptr()) };
    if parser_ctxt.is_null() {
        return Err(LibXml2Error::MemoryAllocation);
    }
    unsafe { run_schema_parser(parser_ctxt) }
}

/// # Safety
///
/// `parser_ctxt` must be a fresh, non-null parser context. It is freed here.
unsafe fn run_schema_parser(
    parser_ctxt: *mut XmlSchemaParserCtxt,
) -> LibXml2Result<SchemaCompilation> {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let diagnostics_ptr = &mut diagnostics as *mut Vec<Diagnostic> as *mut c_void;

    let schema_ptr = unsafe {
        xmlSchemaSetParserStructuredErrors(
            parser_ctxt,
            Some(structured_error_callback),
            diagnostics_ptr,
        );
        let schema_ptr = xmlSchemaParse(parser_ctxt);
        xmlSchemaFreeParserCtxt(parser_ctxt);
        schema_ptr
    };

    if schema_ptr.is_null() {
        return Ok(SchemaCompilation::Failed(diagnostics));
    }
    Ok(SchemaCompilation::Compiled(unsafe {
        XmlSchemaPtr::from_raw(schema_ptr)?
    }))
}

/// Rust-side state reachable from the libxml2 input callback
struct InputSource {
    reader: Box<dyn Read + Send>,
    failure: Option<std::io::Error>,
}

unsafe extern "C" fn input_read_callback(
    context: *mut c_void,
    buffer: *mut c_char,
    len: c_int,
) -> c_int {
    if context.is_null() || buffer.is_null() || len <= 0 {
        return 0;
    }
    let source = unsafe { &mut *(context as *mut InputSource) };
    let buf = unsafe { std::slice::from_raw_parts_mut(buffer as *mut u8, len as usize) };
    loop {
        match source.reader.read(buf) {
            Ok(n) => return n as c_int,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                source.failure = Some(e);
                return -1;
            }
        }
    }
}

/// Result of advancing a [`TextReader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Node,
    EndOfInput,
    Failed(i32),
}

impl Advance {
    fn from_code(code: c_int) -> Self {
        match code {
            1 => Advance::Node,
            0 => Advance::EndOfInput,
            n => Advance::Failed(n),
        }
    }
}

/// Validating pull reader over a Rust byte source
///
/// Diagnostics raised by the parser and the schema validator accumulate in
/// an internal buffer and are handed out by [`TextReader::take_diagnostics`].
pub struct TextReader {
    ptr: *mut XmlTextReader,
    // Boxed so the addresses handed to libxml2 stay fixed.
    diagnostics: Box<Vec<Diagnostic>>,
    source: Box<InputSource>,
    _schema: Option<XmlSchemaPtr>,
}

// Safety: the reader and its callback state are only touched by the thread that owns it.
unsafe impl Send for TextReader {}

impl TextReader {
    /// Create a reader over `input`, validating against `schema` when given
    pub fn new(
        input: Box<dyn Read + Send>,
        document_url: Option<&str>,
        schema: Option<XmlSchemaPtr>,
    ) -> LibXml2Result<Self> {
        ensure_initialized();
        let c_url = document_url
            .map(CString::new)
            .transpose()
            .map_err(|_| LibXml2Error::InvalidLocation {
                details: document_url.unwrap_or_default().to_string(),
            })?;

        let mut source = Box::new(InputSource {
            reader: input,
            failure: None,
        });

        let ptr = unsafe {
            xmlReaderForIO(
                Some(input_read_callback),
                None,
                source.as_mut() as *mut InputSource as *mut c_void,
                c_url.as_ref().map_or(std::ptr::null(), |url| url.as_ptr()),
                std::ptr::null(),
                XML_PARSE_NOBLANKS | XML_PARSE_HUGE,
            )
        };
        if ptr.is_null() {
            return Err(LibXml2Error::ReaderCreationFailed);
        }

        let mut reader = TextReader {
            ptr,
            diagnostics: Box::default(),
            source,
            _schema: schema.clone(),
        };

        unsafe {
            xmlTextReaderSetStructuredErrorHandler(
                reader.ptr,
                Some(structured_error_callback),
                reader.diagnostics.as_mut() as *mut Vec<Diagnostic> as *mut c_void,
            );
        }

        if let Some(schema) = &schema {
            let code = unsafe { xmlTextReaderSetSchema(reader.ptr, schema.as_ptr()) };
            if code != 0 {
                return Err(LibXml2Error::SchemaAttachFailed { code });
            }
        }

        Ok(reader)
    }

    /// Advance to the next node in document order
    pub fn read(&mut self) -> Advance {
        Advance::from_code(unsafe { xmlTextReaderRead(self.ptr) })
    }

    /// Advance past the current node's subtree
    pub fn skip_subtree(&mut self) -> Advance {
        Advance::from_code(unsafe { xmlTextReaderNext(self.ptr) })
    }

    pub fn is_element(&self) -> bool {
        unsafe { xmlTextReaderNodeType(self.ptr) == XML_READER_TYPE_ELEMENT }
    }

    pub fn depth(&self) -> i32 {
        unsafe { xmlTextReaderDepth(self.ptr) }
    }

    pub fn local_name(&self) -> Option<String> {
        unsafe { borrowed_string(xmlTextReaderConstLocalName(self.ptr)) }
    }

    pub fn namespace_uri(&self) -> Option<String> {
        unsafe { borrowed_string(xmlTextReaderConstNamespaceUri(self.ptr)) }
            .filter(|ns| !ns.is_empty())
    }

    /// Serialized current element including its subtree
    pub fn outer_xml(&mut self) -> Option<String> {
        unsafe { owned_string(xmlTextReaderReadOuterXml(self.ptr)) }
    }

    /// Whether the current element carries `xsi:nil="true"`
    pub fn is_nil(&self) -> bool {
        let local = c"nil";
        let Ok(namespace) = CString::new(XSI_NAMESPACE) else {
            return false;
        };
        let value = unsafe {
            owned_string(xmlTextReaderGetAttributeNs(
                self.ptr,
                local.as_ptr(),
                namespace.as_ptr(),
            ))
        };
        matches!(value.as_deref().map(str::trim), Some("true") | Some("1"))
    }

    pub fn line_number(&self) -> Option<u32> {
        u32::try_from(unsafe { xmlTextReaderGetParserLineNumber(self.ptr) })
            .ok()
            .filter(|line| *line > 0)
    }

    /// Diagnostics reported since the previous call
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(self.diagnostics.as_mut())
    }

    /// I/O failure reported by the byte source, if any
    pub fn take_input_failure(&mut self) -> Option<std::io::Error> {
        self.source.failure.take()
    }
}

impl Drop for TextReader {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                xmlFreeTextReader(self.ptr);
            }
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// # Safety
///
/// `ptr` must be null or a NUL-terminated string owned by libxml2.
unsafe fn borrowed_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// # Safety
///
/// `ptr` must be null or a NUL-terminated string the caller must release with `xmlFree`.
unsafe fn owned_string(ptr: *mut c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let value = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
    unsafe {
        if let Some(free) = xmlFree {
            free(ptr as *mut c_void);
        }
    }
    Some(value)
}
