//! Tag index: which element tags can carry an instance of each declared type

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::model::{GroupBase, Particle, SchemaComplexType, SchemaElement, SchemaObject};

/// Mapping from declared type name to the element tags that carry it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SchemaTagIndex {
    tags_by_type: BTreeMap<String, BTreeSet<String>>,
}

impl SchemaTagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tags_for(&self, type_name: &str) -> Option<&BTreeSet<String>> {
        self.tags_by_type.get(type_name)
    }

    /// Every type whose tag set contains `tag`
    pub fn types_claiming<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags_by_type
            .iter()
            .filter(move |(_, tags)| tags.contains(tag))
            .map(|(type_name, _)| type_name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.tags_by_type
            .iter()
            .map(|(type_name, tags)| (type_name.as_str(), tags))
    }

    pub fn len(&self) -> usize {
        self.tags_by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags_by_type.is_empty()
    }

    fn insert(&mut self, type_name: &str, tag: &str) {
        self.tags_by_type
            .entry(type_name.to_string())
            .or_default()
            .insert(tag.to_string());
    }

    /// Union `other` into this index
    pub fn merge(&mut self, other: SchemaTagIndex) {
        for (type_name, tags) in other.tags_by_type {
            self.tags_by_type.entry(type_name).or_default().extend(tags);
        }
    }
}

/// Build the tag index for a collection of schema objects
///
/// Element declarations need a name and a named type reference; anonymous
/// or inline-typed elements are skipped. Complex types contribute the
/// elements of their sequence, choice or all compositor, indexed recursively.
pub fn build_tag_index(objects: Option<&[SchemaObject]>) -> SchemaTagIndex {
    let mut index = SchemaTagIndex::new();
    let Some(objects) = objects else {
        return index;
    };

    for object in objects {
        if let SchemaObject::Element(element) = object
            && let Some((tag, type_name)) = indexable_element(element)
        {
            index.insert(type_name, tag);
        }
    }

    for object in objects {
        if let SchemaObject::ComplexType(complex_type) = object
            && let Some(items) = indexable_items(complex_type)
        {
            index.merge(build_tag_index(Some(items)));
        }
    }

    index
}

/// `(tag, type name)` of an element that qualifies for the index
pub fn indexable_element(element: &SchemaElement) -> Option<(&str, &str)> {
    let tag = element.name.as_deref().filter(|name| !name.is_empty())?;
    let type_name = element
        .type_name
        .as_ref()
        .map(|type_name| type_name.name.as_str())
        .filter(|name| !name.is_empty())?;
    Some((tag, type_name))
}

/// Immediate items of a complex type whose content model is a non-empty compositor
pub fn indexable_items(complex_type: &SchemaComplexType) -> Option<&[SchemaObject]> {
    match complex_type.particle.as_ref()? {
        Particle::Group(GroupBase {
            items: Some(items), ..
        }) if !items.is_empty() => Some(items.as_slice()),
        _ => None,
    }
}
