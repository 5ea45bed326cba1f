//! Type-tag bindings
//!
//! Callers describe each logical type they want extracted with a
//! [`TypeDescriptor`]: the schema type name, root element metadata, and a
//! decoder that turns one element subtree into a record. Per run, the
//! descriptors are resolved against the schema set's tag index into a
//! [`BindingTable`] keyed by element tag.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::{AmbiguityError, DecodeError, ErrorCause};
use crate::schema::SchemaTagIndex;

/// A decoded element
pub type Record = Arc<dyn Any + Send + Sync>;

/// One element as seen by a decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementFragment {
    pub local_name: String,
    pub namespace: Option<String>,
    /// The element and its subtree, serialized
    pub outer_xml: String,
    /// The element carries `xsi:nil="true"`
    pub nil: bool,
    pub line: Option<u32>,
}

/// Converts an element subtree into a record
pub trait ElementDecoder: Send + Sync {
    fn decode(&self, fragment: &ElementFragment) -> Result<Record, DecodeError>;
}

impl<F> ElementDecoder for F
where
    F: Fn(&ElementFragment) -> Result<Record, DecodeError> + Send + Sync,
{
    fn decode(&self, fragment: &ElementFragment) -> Result<Record, DecodeError> {
        self(fragment)
    }
}

/// Root element metadata used when binding a type to its tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootMetadata {
    /// Required element namespace; `None` accepts any namespace
    pub namespace: Option<String>,
    /// Whether `xsi:nil` elements are accepted (decoded as no record)
    pub nullable: bool,
}

impl Default for RootMetadata {
    fn default() -> Self {
        Self {
            namespace: None,
            nullable: true,
        }
    }
}

/// Record produced by [`TypeDescriptor::raw`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawElement {
    pub tag: String,
    pub namespace: Option<String>,
    pub xml: String,
}

/// A requested logical type
#[derive(Clone)]
pub struct TypeDescriptor {
    name: String,
    root: RootMetadata,
    decoder: Arc<dyn ElementDecoder>,
}

impl TypeDescriptor {
    /// Describe `name` with a custom decoder
    pub fn new(name: impl Into<String>, decoder: impl ElementDecoder + 'static) -> Self {
        Self {
            name: name.into(),
            root: RootMetadata::default(),
            decoder: Arc::new(decoder),
        }
    }

    /// Describe `name` as a serde type decoded with quick-xml
    pub fn serde<T>(name: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        Self::new(name, |fragment: &ElementFragment| -> Result<Record, DecodeError> {
            let value: T = quick_xml::de::from_str(&fragment.outer_xml)?;
            Ok(Arc::new(value))
        })
    }

    /// Describe `name` keeping each element as [`RawElement`]
    pub fn raw(name: impl Into<String>) -> Self {
        Self::new(name, |fragment: &ElementFragment| -> Result<Record, DecodeError> {
            Ok(Arc::new(RawElement {
                tag: fragment.local_name.clone(),
                namespace: fragment.namespace.clone(),
                xml: fragment.outer_xml.clone(),
            }))
        })
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.root.namespace = Some(namespace.into());
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.root.nullable = nullable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &RootMetadata {
        &self.root
    }
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// A requested type resolved against the tag index
#[derive(Debug, Clone)]
pub struct TypeTagBinding {
    pub descriptor: TypeDescriptor,
    pub tags: BTreeSet<String>,
}

impl TypeTagBinding {
    /// Decode one element; `Ok(None)` for an accepted nil element
    pub fn decode(&self, fragment: &ElementFragment) -> Result<Option<Record>, DecodeError> {
        let root = self.descriptor.root();
        if let Some(expected) = &root.namespace
            && fragment.namespace.as_ref() != Some(expected)
        {
            return Err(DecodeError::NamespaceMismatch {
                expected: expected.clone(),
                found: fragment.namespace.clone(),
            });
        }
        if fragment.nil {
            return if root.nullable {
                Ok(None)
            } else {
                Err(DecodeError::NilNotAllowed)
            };
        }
        self.descriptor.decoder.decode(fragment).map(Some)
    }
}

/// Per-run lookup from element tag to binding
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    records: HashMap<String, TypeTagBinding>,
    header: Option<TypeTagBinding>,
    requested: Vec<String>,
}

impl BindingTable {
    /// Resolve the header and record descriptors against `index`
    ///
    /// A tag shared by two record bindings goes to the first one requested.
    pub fn resolve(
        index: &SchemaTagIndex,
        header: Option<&TypeDescriptor>,
        records: &[TypeDescriptor],
    ) -> Result<Self, ErrorCause> {
        let mut table = BindingTable::default();

        for descriptor in records {
            let binding = bind(index, descriptor)?;
            table.requested.push(descriptor.name().to_string());
            for tag in &binding.tags {
                table
                    .records
                    .entry(tag.clone())
                    .or_insert_with(|| binding.clone());
            }
        }

        if let Some(descriptor) = header {
            table.header = Some(bind(index, descriptor)?);
            table.requested.push(descriptor.name().to_string());
        }

        Ok(table)
    }

    pub fn record_for(&self, tag: &str) -> Option<&TypeTagBinding> {
        self.records.get(tag)
    }

    pub fn header_for(&self, tag: &str) -> Option<&TypeTagBinding> {
        self.header
            .as_ref()
            .filter(|binding| binding.tags.contains(tag))
    }

    /// Names of every requested type, records first
    pub fn requested_types(&self) -> &[String] {
        &self.requested
    }
}

fn bind(index: &SchemaTagIndex, descriptor: &TypeDescriptor) -> Result<TypeTagBinding, ErrorCause> {
    let tags = index
        .tags_for(descriptor.name())
        .filter(|tags| !tags.is_empty())
        .ok_or_else(|| ErrorCause::UnresolvedType {
            type_name: descriptor.name().to_string(),
        })?;
    Ok(TypeTagBinding {
        descriptor: descriptor.clone(),
        tags: tags.clone(),
    })
}

/// Fail when a requested type shares a tag with any other type of the index
pub fn check_ambiguity<S: AsRef<str>>(
    index: &SchemaTagIndex,
    requested_types: &[S],
) -> Result<(), AmbiguityError> {
    for type_name in requested_types {
        let type_name = type_name.as_ref();
        let Some(tags) = index.tags_for(type_name) else {
            continue;
        };
        for tag in tags {
            let competing_types: BTreeSet<String> = index
                .types_claiming(tag)
                .filter(|other| *other != type_name)
                .map(str::to_string)
                .collect();
            if !competing_types.is_empty() {
                return Err(AmbiguityError {
                    type_name: type_name.to_string(),
                    tag: tag.clone(),
                    competing_types,
                });
            }
        }
    }
    Ok(())
}
