use std::{fmt, sync::Arc};

use crate::{
    model::EnumType,
    value::{Primitive, PrimitiveKind},
};

/// The static type of an expression, known once it is parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// The type of the `null` literal; compatible with everything
    Null,
    /// A primitive type. `Primitive(Enum)` is an enumeration literal whose
    /// type could not be matched against metadata yet.
    Primitive(PrimitiveKind),
    Enum(Arc<EnumType>),
}

impl Type {
    pub const BOOLEAN: Type = Type::Primitive(PrimitiveKind::Boolean);
    pub const STRING: Type = Type::Primitive(PrimitiveKind::String);

    pub fn of(value: &Primitive) -> Type {
        match value.kind() {
            None => Type::Null,
            Some(kind) => Type::Primitive(kind),
        }
    }

    pub fn kind(&self) -> Option<PrimitiveKind> {
        match self {
            Type::Null => None,
            Type::Primitive(kind) => Some(*kind),
            Type::Enum(_) => Some(PrimitiveKind::Enum),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Type::Null)
    }

    /// Boolean, or `null` standing in for one.
    pub fn is_boolean(&self) -> bool {
        matches!(self, Type::Null | Type::Primitive(PrimitiveKind::Boolean))
    }

    /// Numeric, or `null` standing in for one.
    pub fn is_numeric(&self) -> bool {
        self.is_null() || self.kind().is_some_and(PrimitiveKind::is_numeric)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Type::Null | Type::Primitive(PrimitiveKind::String))
    }

    /// Whether `eq`/`ne` may compare the two types.
    pub fn is_comparable_with(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Null, _) | (_, Type::Null) => true,
            (Type::Enum(a), Type::Enum(b)) => a.name == b.name,
            (Type::Primitive(PrimitiveKind::Enum), _) | (_, Type::Primitive(PrimitiveKind::Enum)) => false,
            (Type::Primitive(a), Type::Primitive(b)) => a.is_comparable_with(*b),
            _ => false,
        }
    }

    /// Whether `gt`, `ge`, `lt` and `le` may compare the two types.
    pub fn is_orderable_with(&self, other: &Type) -> bool {
        let ordered = |t: &Type| t.is_null() || t.kind().is_some_and(PrimitiveKind::is_ordered);
        self.is_comparable_with(other) && ordered(self) && ordered(other)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Null => f.write_str("null"),
            Type::Primitive(kind) => write!(f, "{kind}"),
            Type::Enum(ty) => f.write_str(&ty.name),
        }
    }
}
