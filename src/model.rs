//! Entity metadata the parser resolves fields against.
//!
//! Metadata is built once by the caller and shared read-only (`Arc`) with
//! every request; the per-request [`AllowList`] decides which of the declared
//! properties a given query may touch.

use std::{collections::BTreeSet, sync::Arc};

use crate::value::PrimitiveKind;

/// An enumeration type with its member names in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    /// Qualified name, e.g. `Sales.Color`
    pub name: String,
    pub members: Vec<String>,
    /// Flag enumerations accept member combinations such as `'Red,Blue'`
    pub is_flags: bool,
}

impl EnumType {
    pub fn new(name: &str, members: &[&str]) -> Self {
        EnumType {
            name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
            is_flags: false,
        }
    }

    pub fn flags(mut self) -> Self {
        self.is_flags = true;
        self
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }

    /// Validates member names and returns them deduplicated in declaration
    /// order, `None` when a name is unknown or a non-flag type is given more
    /// than one member.
    pub fn normalize<S: AsRef<str>>(&self, names: &[S]) -> Option<Vec<String>> {
        if names.is_empty() || names.iter().any(|n| !self.has_member(n.as_ref())) {
            return None;
        }
        let normalized: Vec<String> = self
            .members
            .iter()
            .filter(|m| names.iter().any(|n| n.as_ref() == m.as_str()))
            .cloned()
            .collect();
        if normalized.len() > 1 && !self.is_flags {
            return None;
        }
        Some(normalized)
    }
}

/// How a collection navigation property joins its target: rows of the
/// target whose `target_key` equals the parent's `source_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub source_key: String,
    pub target_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyType {
    Primitive(PrimitiveKind),
    Enum(Arc<EnumType>),
    /// A collection navigation property
    Collection { target: Arc<EntityType>, link: Link },
}

/// A declared property. `name` is what expressions use, `source` is the
/// column, document field or record key the backends read.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub source: String,
    pub ty: PropertyType,
    pub nullable: bool,
}

impl Property {
    pub fn primitive(name: &str, kind: PrimitiveKind) -> Self {
        Property {
            name: name.to_string(),
            source: name.to_string(),
            ty: PropertyType::Primitive(kind),
            nullable: true,
        }
    }

    pub fn enumeration(name: &str, ty: Arc<EnumType>) -> Self {
        Property {
            name: name.to_string(),
            source: name.to_string(),
            ty: PropertyType::Enum(ty),
            nullable: true,
        }
    }

    pub fn collection(name: &str, target: Arc<EntityType>, source_key: &str, target_key: &str) -> Self {
        Property {
            name: name.to_string(),
            source: name.to_string(),
            ty: PropertyType::Collection {
                target,
                link: Link {
                    source_key: source_key.to_string(),
                    target_key: target_key.to_string(),
                },
            },
            nullable: false,
        }
    }

    /// Maps the property onto a differently named storage key.
    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// The primitive kind of a scalar property, `None` for navigations.
    pub fn kind(&self) -> Option<PrimitiveKind> {
        match &self.ty {
            PropertyType::Primitive(kind) => Some(*kind),
            PropertyType::Enum(_) => Some(PrimitiveKind::Enum),
            PropertyType::Collection { .. } => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.ty, PropertyType::Collection { .. })
    }
}

/// An entity type together with the table, collection or record shape that
/// stores it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityType {
    /// Qualified name, e.g. `Sales.Order`
    pub name: String,
    /// Table or collection name
    pub source: String,
    pub properties: Vec<Property>,
}

impl EntityType {
    pub fn new(name: &str, source: &str) -> Self {
        EntityType {
            name: name.to_string(),
            source: source.to_string(),
            properties: Vec::new(),
        }
    }

    pub fn property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn find(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// The property paths a single query option may reference.
///
/// Root properties are plain names (`price`); properties reached inside a
/// lambda body are qualified by the navigation path (`items/price`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    paths: BTreeSet<String>,
}

impl AllowList {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AllowList {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Every property of `entity`, following collection navigations.
    pub fn all(entity: &EntityType) -> Self {
        let mut list = AllowList::default();
        list.collect(entity, "");
        list
    }

    fn collect(&mut self, entity: &EntityType, prefix: &str) {
        for property in &entity.properties {
            let path = format!("{prefix}{}", property.name);
            if let PropertyType::Collection { target, .. } = &property.ty {
                self.collect(target, &format!("{path}/"));
            }
            self.paths.insert(path);
        }
    }

    pub fn allows(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn insert(&mut self, path: impl Into<String>) {
        self.paths.insert(path.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}
