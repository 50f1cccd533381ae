use std::{cmp::Ordering, collections::HashMap, fmt};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, SecondsFormat, TimeDelta};
use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};
use uuid::Uuid;

use crate::codec;

/// The OData primitive types understood by the expression engine.
///
/// `Enum` stands for any enumeration type; the concrete type travels with
/// the value ([`EnumValue::type_name`]) or with the property metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    /// Unsigned 8-bit integer
    Byte,
    /// Signed 8-bit integer
    SByte,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    String,
    Binary,
    Date,
    TimeOfDay,
    DateTimeOffset,
    Duration,
    Guid,
    Enum,
}

impl PrimitiveKind {
    /// The qualified CSDL name, e.g. `Edm.Int32`.
    pub fn edm_name(self) -> &'static str {
        use PrimitiveKind::*;
        match self {
            Boolean => "Edm.Boolean",
            Byte => "Edm.Byte",
            SByte => "Edm.SByte",
            Int16 => "Edm.Int16",
            Int32 => "Edm.Int32",
            Int64 => "Edm.Int64",
            Single => "Edm.Single",
            Double => "Edm.Double",
            Decimal => "Edm.Decimal",
            String => "Edm.String",
            Binary => "Edm.Binary",
            Date => "Edm.Date",
            TimeOfDay => "Edm.TimeOfDay",
            DateTimeOffset => "Edm.DateTimeOffset",
            Duration => "Edm.Duration",
            Guid => "Edm.Guid",
            Enum => "Edm.Enum",
        }
    }

    pub fn from_edm_name(name: &str) -> Option<Self> {
        use PrimitiveKind::*;
        let kind = match name.strip_prefix("Edm.").unwrap_or(name) {
            "Boolean" => Boolean,
            "Byte" => Byte,
            "SByte" => SByte,
            "Int16" => Int16,
            "Int32" => Int32,
            "Int64" => Int64,
            "Single" => Single,
            "Double" => Double,
            "Decimal" => Decimal,
            "String" => String,
            "Binary" => Binary,
            "Date" => Date,
            "TimeOfDay" => TimeOfDay,
            "DateTimeOffset" => DateTimeOffset,
            "Duration" => Duration,
            "Guid" => Guid,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_integer(self) -> bool {
        use PrimitiveKind::*;
        matches!(self, Byte | SByte | Int16 | Int32 | Int64)
    }

    pub fn is_numeric(self) -> bool {
        use PrimitiveKind::*;
        self.is_integer() || matches!(self, Single | Double | Decimal)
    }

    /// Kinds that support `gt`, `ge`, `lt` and `le`.
    pub fn is_ordered(self) -> bool {
        use PrimitiveKind::*;
        self.is_numeric() || matches!(self, String | Date | TimeOfDay | DateTimeOffset | Duration)
    }

    /// Two kinds can meet in a comparison when they are identical or both numeric.
    pub fn is_comparable_with(self, other: PrimitiveKind) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }

    /// Result kind of arithmetic between two numeric kinds.
    ///
    /// Integers widen to `Int64`, anything involving a float becomes `Double`
    /// (or `Single` when both sides are `Single`), otherwise `Decimal`.
    pub fn promote(self, other: PrimitiveKind) -> PrimitiveKind {
        use PrimitiveKind::*;
        match (self, other) {
            (a, b) if a.is_integer() && b.is_integer() => Int64,
            (Single, Single) => Single,
            (Single | Double, _) | (_, Single | Double) => Double,
            _ => Decimal,
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.edm_name())
    }
}

/// A member (or, for flag enumerations, a combination of members) of an
/// enumeration type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    /// Qualified name of the enumeration type, e.g. `Sales.Color`
    pub type_name: String,
    /// Member names in declaration order
    pub members: Vec<String>,
}

/// An immutable, typed OData primitive value.
///
/// # Examples
///
/// ```
/// use odata_expr::Primitive;
///
/// let value = Primitive::String("it's".to_string());
/// assert_eq!(value.to_string(), "'it''s'");
/// assert_eq!(Primitive::Null.to_string(), "null");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Null,
    Boolean(bool),
    Byte(u8),
    SByte(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Binary(Vec<u8>),
    Date(NaiveDate),
    TimeOfDay(NaiveTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Duration(TimeDelta),
    Guid(Uuid),
    Enum(EnumValue),
}

impl Primitive {
    /// The kind of the value, `None` for `null`.
    pub fn kind(&self) -> Option<PrimitiveKind> {
        use Primitive::*;
        let kind = match self {
            Null => return None,
            Boolean(_) => PrimitiveKind::Boolean,
            Byte(_) => PrimitiveKind::Byte,
            SByte(_) => PrimitiveKind::SByte,
            Int16(_) => PrimitiveKind::Int16,
            Int32(_) => PrimitiveKind::Int32,
            Int64(_) => PrimitiveKind::Int64,
            Single(_) => PrimitiveKind::Single,
            Double(_) => PrimitiveKind::Double,
            Decimal(_) => PrimitiveKind::Decimal,
            String(_) => PrimitiveKind::String,
            Binary(_) => PrimitiveKind::Binary,
            Date(_) => PrimitiveKind::Date,
            TimeOfDay(_) => PrimitiveKind::TimeOfDay,
            DateTimeOffset(_) => PrimitiveKind::DateTimeOffset,
            Duration(_) => PrimitiveKind::Duration,
            Guid(_) => PrimitiveKind::Guid,
            Enum(_) => PrimitiveKind::Enum,
        };
        Some(kind)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Primitive::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Primitive::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Primitive::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer kinds widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        use Primitive::*;
        match self {
            Byte(n) => Some(i64::from(*n)),
            SByte(n) => Some(i64::from(*n)),
            Int16(n) => Some(i64::from(*n)),
            Int32(n) => Some(i64::from(*n)),
            Int64(n) => Some(*n),
            _ => None,
        }
    }

    /// Any numeric kind as `f64` (lossy for large decimals).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Primitive::Single(n) => Some(f64::from(*n)),
            Primitive::Double(n) => Some(*n),
            Primitive::Decimal(d) => d.to_f64(),
            other => other.as_i64().map(|n| n as f64),
        }
    }

    /// Integer and decimal kinds as `Decimal`; floats only when finite.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Primitive::Decimal(d) => Some(*d),
            Primitive::Single(n) => Decimal::from_f32(*n),
            Primitive::Double(n) => Decimal::from_f64(*n),
            other => other.as_i64().map(Decimal::from),
        }
    }

    /// Orders two non-null values of comparable kinds.
    ///
    /// Numeric kinds are compared after promotion: integers as `i64`,
    /// anything involving a float as `f64`, otherwise as `Decimal`.
    /// Returns `None` for incomparable kinds, unordered floats and nulls.
    pub fn compare(&self, other: &Primitive) -> Option<Ordering> {
        use Primitive::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (String(a), String(b)) => Some(a.cmp(b)),
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (TimeOfDay(a), TimeOfDay(b)) => Some(a.cmp(b)),
            (DateTimeOffset(a), DateTimeOffset(b)) => Some(a.cmp(b)),
            (Duration(a), Duration(b)) => Some(a.cmp(b)),
            (Guid(a), Guid(b)) => Some(a.cmp(b)),
            (Binary(a), Binary(b)) => Some(a.cmp(b)),
            (Enum(a), Enum(b)) if a.type_name == b.type_name => {
                if a.members == b.members { Some(Ordering::Equal) } else { None }
            }
            (a, b) => {
                let (ka, kb) = (a.kind()?, b.kind()?);
                if !(ka.is_numeric() && kb.is_numeric()) {
                    return None;
                }
                match ka.promote(kb) {
                    PrimitiveKind::Int64 => Some(a.as_i64()?.cmp(&b.as_i64()?)),
                    PrimitiveKind::Decimal => Some(a.as_decimal()?.cmp(&b.as_decimal()?)),
                    _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
                }
            }
        }
    }

    /// OData equality: `null` equals only `null`, never yields null.
    pub fn odata_eq(&self, other: &Primitive) -> bool {
        match (self, other) {
            (Primitive::Null, Primitive::Null) => true,
            (Primitive::Null, _) | (_, Primitive::Null) => false,
            (a, b) => a.compare(b) == Some(Ordering::Equal),
        }
    }
}

impl fmt::Display for Primitive {
    /// Renders the value in OData URL literal form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Primitive::*;
        match self {
            Null => f.write_str("null"),
            Boolean(b) => write!(f, "{b}"),
            Byte(n) => write!(f, "{n}"),
            SByte(n) => write!(f, "{n}"),
            Int16(n) => write!(f, "{n}"),
            Int32(n) => write!(f, "{n}"),
            Int64(n) => write!(f, "{n}"),
            Single(n) => f.write_str(&codec::render_float(f64::from(*n), format!("{n:?}"))),
            Double(n) => f.write_str(&codec::render_float(*n, format!("{n:?}"))),
            Decimal(d) => write!(f, "{d}"),
            String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Binary(bytes) => write!(f, "binary'{}'", codec::encode_binary(bytes)),
            Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            TimeOfDay(t) => write!(f, "{}", codec::render_time(t)),
            DateTimeOffset(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Duration(d) => write!(f, "duration'{}'", codec::render_duration(d)),
            Guid(g) => write!(f, "{}", g.hyphenated()),
            Enum(e) => write!(f, "{}'{}'", e.type_name, e.members.join(",")),
        }
    }
}

/// A field value inside an in-memory [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Primitive(Primitive),
    /// Related records reached through a collection navigation property
    Collection(Vec<Record>),
}

/// An in-memory entity instance keyed by property source key.
///
/// Missing keys read as `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: HashMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of a primitive.
    pub fn with(mut self, key: &str, value: Primitive) -> Self {
        self.fields.insert(key.to_string(), Value::Primitive(value));
        self
    }

    /// Builder-style insertion of related records.
    pub fn with_collection(mut self, key: &str, records: Vec<Record>) -> Self {
        self.fields.insert(key.to_string(), Value::Collection(records));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The primitive stored under `key`, `null` when absent or not a primitive.
    pub fn primitive(&self, key: &str) -> Primitive {
        match self.fields.get(key) {
            Some(Value::Primitive(p)) => p.clone(),
            _ => Primitive::Null,
        }
    }

    /// Related records under `key`; an absent key is an empty collection.
    pub fn collection(&self, key: &str) -> &[Record] {
        match self.fields.get(key) {
            Some(Value::Collection(records)) => records,
            _ => &[],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
}
