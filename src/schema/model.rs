//! Schema object model
//!
//! A small, read-only view of the declarations in an XSD document: just
//! enough structure for tag indexing. Built from a `roxmltree` document.

use roxmltree::Node;

pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// Namespace-qualified reference to a schema component
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName {
    pub namespace: Option<String>,
    pub name: String,
}

impl QualifiedName {
    pub fn new(namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.into(),
        }
    }

    /// Resolve a `prefix:local` lexical name against the in-scope namespaces of `node`
    fn resolve<'a>(node: Node<'a, '_>, lexical: &'a str) -> Self {
        let (prefix, local) = match lexical.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, lexical),
        };
        Self::new(node.lookup_namespace_uri(prefix), local.trim())
    }
}

/// Top-level or nested schema item
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaObject {
    Element(SchemaElement),
    ComplexType(SchemaComplexType),
    Group(GroupBase),
    Any,
    Other(String),
}

/// `xs:element` declaration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaElement {
    pub name: Option<String>,
    pub type_name: Option<QualifiedName>,
}

impl SchemaElement {
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            type_name: Some(QualifiedName::new(None, type_name)),
        }
    }
}

/// `xs:complexType` definition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaComplexType {
    pub name: Option<String>,
    pub particle: Option<Particle>,
}

/// Content model of a complex type
#[derive(Debug, Clone, PartialEq)]
pub enum Particle {
    Group(GroupBase),
    GroupRef(QualifiedName),
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compositor {
    Sequence,
    Choice,
    All,
}

impl Compositor {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "sequence" => Some(Compositor::Sequence),
            "choice" => Some(Compositor::Choice),
            "all" => Some(Compositor::All),
            _ => None,
        }
    }
}

/// Sequence, choice or all compositor with its immediate items
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBase {
    pub compositor: Compositor,
    pub items: Option<Vec<SchemaObject>>,
}

fn is_xs(node: &Node<'_, '_>) -> bool {
    node.is_element() && node.tag_name().namespace() == Some(XS_NAMESPACE)
}

fn xs_children<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(is_xs)
}

/// Convert the immediate children of `xs:schema` into schema objects
pub(crate) fn top_level_items(schema: Node<'_, '_>) -> Vec<SchemaObject> {
    xs_children(schema).map(schema_object).collect()
}

fn schema_object(node: Node<'_, '_>) -> SchemaObject {
    let tag = node.tag_name().name();
    match tag {
        "element" => SchemaObject::Element(element(node)),
        "complexType" => SchemaObject::ComplexType(complex_type(node)),
        "any" => SchemaObject::Any,
        _ => match Compositor::from_tag(tag) {
            Some(compositor) => SchemaObject::Group(group(node, compositor)),
            None => SchemaObject::Other(tag.to_string()),
        },
    }
}

fn element(node: Node<'_, '_>) -> SchemaElement {
    SchemaElement {
        name: node.attribute("name").map(str::to_string),
        type_name: node
            .attribute("type")
            .map(|lexical| QualifiedName::resolve(node, lexical)),
    }
}

fn complex_type(node: Node<'_, '_>) -> SchemaComplexType {
    // complexContent and simpleContent derivations carry no direct particle
    let particle = xs_children(node).find_map(|child| {
        let tag = child.tag_name().name();
        match tag {
            "any" => Some(Particle::Any),
            "group" => child
                .attribute("ref")
                .map(|lexical| Particle::GroupRef(QualifiedName::resolve(child, lexical))),
            _ => Compositor::from_tag(tag).map(|compositor| Particle::Group(group(child, compositor))),
        }
    });
    SchemaComplexType {
        name: node.attribute("name").map(str::to_string),
        particle,
    }
}

fn group(node: Node<'_, '_>, compositor: Compositor) -> GroupBase {
    let items: Vec<SchemaObject> = xs_children(node)
        .filter(|child| child.tag_name().name() != "annotation")
        .map(schema_object)
        .collect();
    GroupBase {
        compositor,
        items: Some(items),
    }
}
