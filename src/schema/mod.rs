//! XML Schema loading and schema-set compilation
//!
//! A [`Schema`] is one XSD document: its raw bytes (handed to libxml2 for
//! compilation) plus a parsed object model (used for tag indexing). A
//! [`SchemaSet`] groups schemas and caches the compiled libxml2 schema.

pub mod model;
pub mod tag_index;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{SchemaError, SchemaResult};
use crate::libxml2::{self, SchemaCompilation, XmlSchemaPtr};

pub use model::{QualifiedName, SchemaObject, XS_NAMESPACE};
pub use tag_index::{SchemaTagIndex, build_tag_index};

/// Where a schema was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    Path(PathBuf),
    Memory,
}

/// A single XSD document
#[derive(Debug)]
pub struct Schema {
    source: SchemaSource,
    content: Vec<u8>,
    target_namespace: Option<String>,
    items: Vec<SchemaObject>,
    declared_elements: BTreeSet<String>,
}

impl Schema {
    /// Load a schema from an in-memory buffer
    pub fn from_bytes(bytes: &[u8]) -> SchemaResult<Self> {
        Self::parse(SchemaSource::Memory, bytes.to_vec())
    }

    /// Load a schema from a file
    pub async fn from_path(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SchemaError::NotFound {
                path: path.to_path_buf(),
            },
            _ => SchemaError::Io(e),
        })?;
        Self::parse(SchemaSource::Path(path.to_path_buf()), content)
    }

    /// Load a schema from a seekable reader, starting at its beginning
    pub fn from_reader<R: Read + Seek>(mut reader: R) -> SchemaResult<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        Self::parse(SchemaSource::Memory, content)
    }

    fn parse(source: SchemaSource, content: Vec<u8>) -> SchemaResult<Self> {
        if content.iter().all(u8::is_ascii_whitespace) {
            return Err(SchemaError::Empty);
        }
        let text = std::str::from_utf8(&content)?;
        let document = roxmltree::Document::parse(text)?;
        let root = document.root_element();
        if root.tag_name().name() != "schema" || root.tag_name().namespace() != Some(XS_NAMESPACE)
        {
            return Err(SchemaError::NotASchema {
                root: root.tag_name().name().to_string(),
            });
        }

        let target_namespace = root
            .attribute("targetNamespace")
            .filter(|ns| !ns.is_empty())
            .map(str::to_string);
        let items = model::top_level_items(root);
        let declared_elements = root
            .descendants()
            .filter(|node| {
                node.is_element()
                    && node.tag_name().name() == "element"
                    && node.tag_name().namespace() == Some(XS_NAMESPACE)
            })
            .filter_map(|node| node.attribute("name"))
            .map(str::to_string)
            .collect();

        Ok(Self {
            source,
            content,
            target_namespace,
            items,
            declared_elements,
        })
    }

    pub fn source(&self) -> &SchemaSource {
        &self.source
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn target_namespace(&self) -> Option<&str> {
        self.target_namespace.as_deref()
    }

    /// Top-level schema objects
    pub fn items(&self) -> &[SchemaObject] {
        &self.items
    }

    /// Names of every element declared anywhere in this schema
    pub fn declared_elements(&self) -> &BTreeSet<String> {
        &self.declared_elements
    }

    pub fn tag_index(&self) -> SchemaTagIndex {
        build_tag_index(Some(&self.items))
    }
}

/// An ordered collection of schemas compiled together
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    schemas: Vec<Arc<Schema>>,
    compiled: Arc<Mutex<Option<XmlSchemaPtr>>>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a schema; a previously compiled form is discarded
    pub fn add(&mut self, schema: Schema) -> &mut Self {
        self.schemas.push(Arc::new(schema));
        self.compiled = Arc::default();
        self
    }

    pub fn with(mut self, schema: Schema) -> Self {
        self.add(schema);
        self
    }

    /// Load every schema file in order
    pub async fn from_paths<P: AsRef<Path>>(paths: &[P]) -> SchemaResult<Self> {
        let mut set = Self::new();
        for path in paths {
            set.add(Schema::from_path(path).await?);
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.iter().map(Arc::as_ref)
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
            .lock()
            .map(|compiled| compiled.is_some())
            .unwrap_or(false)
    }

    /// Compile the set with libxml2, reusing an earlier compilation
    ///
    /// This blocks on libxml2 and on any `xs:include`/`xs:import` files it
    /// reads; call it from a blocking context.
    pub fn compile(&self) -> SchemaResult<XmlSchemaPtr> {
        let mut compiled = self
            .compiled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(schema) = compiled.as_ref() {
            return Ok(schema.clone());
        }

        let outcome = match self.schemas.as_slice() {
            [] => return Err(SchemaError::EmptySet),
            [single] => match single.source() {
                SchemaSource::Path(path) => libxml2::compile_schema_location(path)?,
                SchemaSource::Memory => libxml2::compile_schema_from_memory(single.content())?,
            },
            many => compile_staged(many)?,
        };

        match outcome {
            SchemaCompilation::Compiled(schema) => {
                *compiled = Some(schema.clone());
                Ok(schema)
            }
            SchemaCompilation::Failed(diagnostics) => {
                let mut messages: Vec<String> =
                    diagnostics.iter().map(ToString::to_string).collect();
                if messages.is_empty() {
                    messages.push("libxml2 did not produce a schema".to_string());
                }
                Err(SchemaError::Compilation { messages })
            }
        }
    }

    /// Tag index over the top-level items of every schema in the set
    pub fn tag_index(&self) -> SchemaTagIndex {
        let mut index = SchemaTagIndex::new();
        for schema in &self.schemas {
            index.merge(schema.tag_index());
        }
        index
    }

    pub fn declares_element(&self, name: &str) -> bool {
        self.schemas
            .iter()
            .any(|schema| schema.declared_elements().contains(name))
    }

    /// Element names declared anywhere in the set
    pub fn declared_elements(&self) -> BTreeSet<String> {
        self.schemas
            .iter()
            .flat_map(|schema| schema.declared_elements().iter().cloned())
            .collect()
    }
}

/// Compile several schemas through a generated driver schema
///
/// No-namespace schemas are included into the driver. Namespaced schemas are
/// imported, through a per-namespace wrapper when a namespace has more than
/// one document. In-memory schemas are written to a temporary directory that
/// lives until libxml2 has finished reading them.
fn compile_staged(schemas: &[Arc<Schema>]) -> SchemaResult<SchemaCompilation> {
    let staging = tempfile::tempdir().map_err(|e| SchemaError::Staging {
        details: e.to_string(),
    })?;

    let mut includes = Vec::new();
    let mut by_namespace: BTreeMap<&str, Vec<PathBuf>> = BTreeMap::new();
    for (position, schema) in schemas.iter().enumerate() {
        let location = match schema.source() {
            SchemaSource::Path(path) => std::path::absolute(path)?,
            SchemaSource::Memory => {
                let staged = staging.path().join(format!("schema-{}.xsd", position));
                std::fs::write(&staged, schema.content())?;
                staged
            }
        };
        match schema.target_namespace() {
            Some(namespace) => by_namespace.entry(namespace).or_default().push(location),
            None => includes.push(location),
        }
    }

    let mut driver = format!("<xs:schema xmlns:xs=\"{}\">\n", XS_NAMESPACE);
    for location in &includes {
        let _ = writeln!(
            driver,
            "  <xs:include schemaLocation=\"{}\"/>",
            escape_attribute(&location.to_string_lossy())
        );
    }
    for (position, (namespace, locations)) in by_namespace.iter().enumerate() {
        let location = match locations.as_slice() {
            [single] => single.clone(),
            several => {
                let wrapper = staging.path().join(format!("namespace-{}.xsd", position));
                let mut content = format!(
                    "<xs:schema xmlns:xs=\"{}\" targetNamespace=\"{}\">\n",
                    XS_NAMESPACE,
                    escape_attribute(namespace)
                );
                for member in several {
                    let _ = writeln!(
                        content,
                        "  <xs:include schemaLocation=\"{}\"/>",
                        escape_attribute(&member.to_string_lossy())
                    );
                }
                content.push_str("</xs:schema>\n");
                std::fs::write(&wrapper, content)?;
                wrapper
            }
        };
        let _ = writeln!(
            driver,
            "  <xs:import namespace=\"{}\" schemaLocation=\"{}\"/>",
            escape_attribute(namespace),
            escape_attribute(&location.to_string_lossy())
        );
    }
    driver.push_str("</xs:schema>\n");

    let driver_path = staging.path().join("driver.xsd");
    std::fs::write(&driver_path, driver)?;
    Ok(libxml2::compile_schema_location(&driver_path)?)
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CUSTOMERS_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="Customers" type="CustomersType"/>
    <xs:complexType name="CustomersType">
        <xs:sequence>
            <xs:element name="Customer" type="CustomerType" maxOccurs="unbounded"/>
        </xs:sequence>
    </xs:complexType>
    <xs:complexType name="CustomerType">
        <xs:sequence>
            <xs:element name="Name" type="xs:string"/>
        </xs:sequence>
    </xs:complexType>
</xs:schema>"#;

    const INVOICES_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
        xmlns:inv="urn:invoices" targetNamespace="urn:invoices" elementFormDefault="qualified">
    <xs:element name="Invoice" type="inv:InvoiceType"/>
    <xs:complexType name="InvoiceType">
        <xs:sequence>
            <xs:element name="Total" type="xs:decimal"/>
        </xs:sequence>
    </xs:complexType>
</xs:schema>"#;

    #[test]
    fn test_from_bytes_rejects_empty_input() {
        assert!(matches!(Schema::from_bytes(b""), Err(SchemaError::Empty)));
        assert!(matches!(Schema::from_bytes(b"  \n"), Err(SchemaError::Empty)));
    }

    #[test]
    fn test_from_bytes_rejects_non_schema_documents() {
        match Schema::from_bytes(b"<root/>") {
            Err(SchemaError::NotASchema { root }) => assert_eq!(root, "root"),
            other => panic!("expected NotASchema, got {:?}", other),
        }
        assert!(matches!(
            Schema::from_bytes(b"<xs:schema"),
            Err(SchemaError::Xml(_))
        ));
    }

    #[test]
    fn test_schema_collects_declarations() {
        let schema = Schema::from_bytes(CUSTOMERS_XSD.as_bytes()).unwrap();
        assert_eq!(schema.source(), &SchemaSource::Memory);
        assert_eq!(schema.target_namespace(), None);
        assert_eq!(schema.items().len(), 3);
        let declared: Vec<&str> = schema
            .declared_elements()
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(declared, vec!["Customer", "Customers", "Name"]);
    }

    #[test]
    fn test_from_reader_rewinds() {
        let mut cursor = std::io::Cursor::new(INVOICES_XSD.as_bytes().to_vec());
        cursor.seek(SeekFrom::End(0)).unwrap();
        let schema = Schema::from_reader(cursor).unwrap();
        assert_eq!(schema.target_namespace(), Some("urn:invoices"));
    }

    #[tokio::test]
    async fn test_from_path_reports_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.xsd");
        match Schema::from_path(&missing).await {
            Err(SchemaError::NotFound { path }) => assert_eq!(path, missing),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_set_does_not_compile() {
        let set = SchemaSet::new();
        assert!(set.is_empty());
        assert!(matches!(set.compile(), Err(SchemaError::EmptySet)));
    }

    #[test]
    fn test_compile_is_cached_until_add() {
        let mut set = SchemaSet::new().with(Schema::from_bytes(CUSTOMERS_XSD.as_bytes()).unwrap());
        assert!(!set.is_compiled());
        let first = set.compile().unwrap();
        assert!(set.is_compiled());
        let second = set.compile().unwrap();
        assert_eq!(first.as_ptr(), second.as_ptr());

        set.add(Schema::from_bytes(INVOICES_XSD.as_bytes()).unwrap());
        assert!(!set.is_compiled());
    }

    #[test]
    fn test_compile_several_schemas() {
        let set = SchemaSet::new()
            .with(Schema::from_bytes(CUSTOMERS_XSD.as_bytes()).unwrap())
            .with(Schema::from_bytes(INVOICES_XSD.as_bytes()).unwrap());
        assert!(set.compile().unwrap().is_valid());

        let index = set.tag_index();
        assert!(index.tags_for("CustomerType").unwrap().contains("Customer"));
        assert!(index.tags_for("InvoiceType").unwrap().contains("Invoice"));
        assert!(set.declared_elements().contains("Total"));
    }

    #[test]
    fn test_compile_failure_is_reported() {
        let broken = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
            <xs:element name="Broken" type="UndefinedType"/>
        </xs:schema>"#;
        let set = SchemaSet::new().with(Schema::from_bytes(broken.as_bytes()).unwrap());
        match set.compile() {
            Err(SchemaError::Compilation { messages }) => {
                assert!(messages.iter().any(|m| m.contains("UndefinedType")));
            }
            other => panic!("expected compilation failure, got {:?}", other),
        }
        assert!(!set.is_compiled());
    }
}
