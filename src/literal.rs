//! Reads literal tokens into typed values.
//!
//! Literal text is classified by shape in a fixed priority order (`null`,
//! booleans, guids, quoted strings, prefixed literals, dates, instants, times
//! of day, bare durations, numbers) and then validated. The expected type,
//! when the parser knows one, only steers numbers and enumeration members.

use crate::{
    ast::{Token, TokenKind, Type},
    codec::{self, Shape},
    parser::{ParseError, ParseErrorKind},
    value::{EnumValue, Primitive, PrimitiveKind},
};

/// Reads `token` as a literal.
///
/// Returns `Ok(None)` when the token is not a literal at all, and an error
/// when it has a literal's shape but fails validation (`2021-02-29`).
pub fn read(token: &Token, expected: Option<&Type>) -> Result<Option<Primitive>, ParseError> {
    if !token.is(TokenKind::Literal) {
        return Ok(None);
    }
    let text = token.text.as_str();
    let invalid = |what: &'static str| {
        ParseError::new(
            ParseErrorKind::InvalidLiteral { what, text: text.to_string() },
            token.offset,
            text,
        )
    };

    let shape = codec::classify(text).ok_or_else(|| invalid("literal"))?;
    let what = shape.describe();

    let value = match shape {
        Shape::Null => Primitive::Null,
        Shape::Boolean => Primitive::Boolean(text == "true"),
        Shape::Guid => Primitive::Guid(codec::parse_guid(text).ok_or_else(|| invalid(what))?),
        Shape::String => {
            let string = codec::parse_string(text).ok_or_else(|| invalid(what))?;
            match expected {
                Some(Type::Enum(ty)) => {
                    let members = codec::split_members(&string)
                        .and_then(|names| ty.normalize(&names))
                        .ok_or_else(|| invalid("enumeration member"))?;
                    Primitive::Enum(EnumValue { type_name: ty.name.clone(), members })
                }
                _ => Primitive::String(string),
            }
        }
        Shape::Binary | Shape::PrefixedDuration => {
            let (_, body) = codec::split_prefixed(text).ok_or_else(|| invalid(what))?;
            if shape == Shape::Binary {
                Primitive::Binary(codec::decode_binary(&body).ok_or_else(|| invalid(what))?)
            } else {
                Primitive::Duration(codec::parse_duration(&body).ok_or_else(|| invalid(what))?)
            }
        }
        Shape::Enum => {
            let (type_name, body) = codec::split_prefixed(text).ok_or_else(|| invalid(what))?;
            let names = codec::split_members(&body).ok_or_else(|| invalid(what))?;
            match expected {
                Some(Type::Enum(ty)) if ty.name == type_name => {
                    let members = ty.normalize(&names).ok_or_else(|| invalid("enumeration member"))?;
                    Primitive::Enum(EnumValue { type_name: ty.name.clone(), members })
                }
                _ => Primitive::Enum(EnumValue { type_name: type_name.to_string(), members: names }),
            }
        }
        Shape::Date => Primitive::Date(codec::parse_date(text).ok_or_else(|| invalid(what))?),
        Shape::DateTimeOffset => Primitive::DateTimeOffset(
            codec::parse_date_time_offset(text).ok_or_else(|| invalid(what))?,
        ),
        Shape::TimeOfDay => Primitive::TimeOfDay(codec::parse_time(text).ok_or_else(|| invalid(what))?),
        Shape::Duration => Primitive::Duration(codec::parse_duration(text).ok_or_else(|| invalid(what))?),
        Shape::Integer | Shape::Decimal | Shape::Double | Shape::NonFinite => {
            let wanted = expected.and_then(Type::kind).filter(|k| k.is_numeric());
            wanted
                .and_then(|kind| codec::parse_number(text, kind))
                .or_else(|| codec::infer_number(text))
                .ok_or_else(|| invalid(what))?
        }
    };

    Ok(Some(value))
}

/// Re-reads an already parsed literal against a type learned afterwards,
/// as for `'Red' eq color` where the enumeration is only known once the
/// right operand is parsed. Returns `None` when the value cannot take the
/// type; other values are returned unchanged.
pub fn coerce(value: Primitive, expected: &Type) -> Option<Primitive> {
    let Type::Enum(ty) = expected else {
        return Some(value);
    };
    match value {
        Primitive::String(text) => {
            let members = codec::split_members(&text).and_then(|names| ty.normalize(&names))?;
            Some(Primitive::Enum(EnumValue { type_name: ty.name.clone(), members }))
        }
        Primitive::Enum(e) if e.type_name == ty.name => {
            let members = ty.normalize(&e.members)?;
            Some(Primitive::Enum(EnumValue { type_name: e.type_name, members }))
        }
        other => Some(other),
    }
}

/// The static type of a literal once read against `expected`.
pub fn type_of(value: &Primitive, expected: Option<&Type>) -> Type {
    match (value, expected) {
        (Primitive::Enum(e), Some(Type::Enum(ty))) if e.type_name == ty.name => Type::Enum(ty.clone()),
        (Primitive::Enum(_), _) => Type::Primitive(PrimitiveKind::Enum),
        _ => Type::of(value),
    }
}
