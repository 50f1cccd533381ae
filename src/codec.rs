//! Per-primitive codecs: URL literal parsing and rendering, the OData JSON
//! format, and the native forms handed to SQL and document backends.

use std::{str::FromStr, sync::LazyLock};

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, SecondsFormat, TimeDelta, Timelike, Utc};
use regex::Regex;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde_json::{Number, Value as Json, json};
use uuid::Uuid;

use crate::{
    backend::sql::SqlValue,
    value::{EnumValue, Primitive, PrimitiveKind},
};

static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[+-]?[0-9]+$").unwrap());
static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?[0-9]+\.[0-9]+$").unwrap());
static DOUBLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?[0-9]+(\.[0-9]+)?[eE][+-]?[0-9]+$").unwrap());
static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").unwrap());
static DATE_TIME_OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([0-9]{4}-[0-9]{2}-[0-9]{2})[Tt]([0-9]{2}:[0-9]{2})(:[0-9]{2}(\.[0-9]{1,12})?)?([Zz]|[+-][0-9]{2}:[0-9]{2})$",
    )
    .unwrap()
});
static TIME_OF_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{2}:[0-9]{2}(:[0-9]{2}(\.[0-9]{1,12})?)?$").unwrap());
static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(-)?P(?:([0-9]+)D)?(?:T(?:([0-9]+)H)?(?:([0-9]+)M)?(?:([0-9]+)(?:\.([0-9]+))?S)?)?$",
    )
    .unwrap()
});
static GUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}$",
    )
    .unwrap()
});
static PREFIXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)'(.*)'$").unwrap()
});

/// The literal shapes recognised in URL text, in recognition priority order.
///
/// Shapes overlap (a guid can start like a number, a date is a prefix of a
/// date-time-offset), so [`classify`] tests them in exactly this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Null,
    Boolean,
    Guid,
    String,
    Binary,
    PrefixedDuration,
    Enum,
    Date,
    DateTimeOffset,
    TimeOfDay,
    Duration,
    Integer,
    Decimal,
    Double,
    /// `INF`, `-INF`, `NaN`
    NonFinite,
}

impl Shape {
    pub fn describe(self) -> &'static str {
        match self {
            Shape::Null => "null",
            Shape::Boolean => "boolean",
            Shape::Guid => "guid",
            Shape::String => "string",
            Shape::Binary => "binary",
            Shape::PrefixedDuration | Shape::Duration => "duration",
            Shape::Enum => "enumeration",
            Shape::Date => "date",
            Shape::DateTimeOffset => "date-time-offset",
            Shape::TimeOfDay => "time-of-day",
            Shape::Integer => "integer",
            Shape::Decimal => "decimal",
            Shape::Double | Shape::NonFinite => "double",
        }
    }
}

/// Classifies literal text by shape without validating its content.
pub fn classify(text: &str) -> Option<Shape> {
    let shape = match text {
        "null" => Shape::Null,
        "true" | "false" => Shape::Boolean,
        "INF" | "-INF" | "NaN" => Shape::NonFinite,
        t if GUID.is_match(t) => Shape::Guid,
        t if t.starts_with('\'') => Shape::String,
        t => {
            if let Some((prefix, _)) = split_prefixed(t) {
                if prefix.eq_ignore_ascii_case("binary") || prefix == "X" {
                    return Some(Shape::Binary);
                }
                if prefix.eq_ignore_ascii_case("duration") {
                    return Some(Shape::PrefixedDuration);
                }
                if prefix.contains('.') {
                    return Some(Shape::Enum);
                }
                return None;
            }
            if DATE.is_match(t) {
                Shape::Date
            } else if DATE_TIME_OFFSET.is_match(t) {
                Shape::DateTimeOffset
            } else if TIME_OF_DAY.is_match(t) {
                Shape::TimeOfDay
            } else if is_duration(t) {
                Shape::Duration
            } else if INTEGER.is_match(t) {
                Shape::Integer
            } else if DECIMAL.is_match(t) {
                Shape::Decimal
            } else if DOUBLE.is_match(t) {
                Shape::Double
            } else {
                return None;
            }
        }
    };
    Some(shape)
}

pub fn is_guid(text: &str) -> bool {
    GUID.is_match(text)
}

/// A bare ISO 8601 duration such as `PT1H30M` or `-P2D`.
pub fn is_duration(text: &str) -> bool {
    DURATION
        .captures(text)
        .is_some_and(|caps| (2..=5).any(|i| caps.get(i).is_some()) && !text.ends_with('T'))
}

/// Splits `prefix'body'` into prefix and unescaped body.
pub fn split_prefixed(text: &str) -> Option<(&str, String)> {
    let caps = PREFIXED.captures(text)?;
    let prefix = caps.get(1)?.as_str();
    let body = unquote_body(caps.get(2)?.as_str())?;
    Some((prefix, body))
}

/// Parses a quoted string literal, undoubling embedded quotes.
pub fn parse_string(text: &str) -> Option<String> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    unquote_body(inner)
}

fn unquote_body(inner: &str) -> Option<String> {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\'' {
            // a lone quote inside the body terminates the literal early
            if chars.next() != Some('\'') {
                return None;
            }
        }
        out.push(ch);
    }
    Some(out)
}

pub fn encode_binary(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decodes base64url or standard base64, padded or not.
pub fn decode_binary(body: &str) -> Option<Vec<u8>> {
    let normalized: String = body
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();
    URL_SAFE_NO_PAD.decode(normalized).ok()
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    if !DATE.is_match(text) {
        return None;
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

pub fn parse_date_time_offset(text: &str) -> Option<DateTime<FixedOffset>> {
    let caps = DATE_TIME_OFFSET.captures(text)?;
    let seconds = caps.get(3).map_or(":00", |m| m.as_str());
    let offset = match caps.get(5)?.as_str() {
        "Z" | "z" => "+00:00",
        other => other,
    };
    let normalized = format!("{}T{}{}{}", &caps[1], &caps[2], seconds, offset);
    DateTime::parse_from_rfc3339(&normalized).ok()
}

pub fn parse_time(text: &str) -> Option<NaiveTime> {
    if !TIME_OF_DAY.is_match(text) {
        return None;
    }
    NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

/// `HH:MM:SS` followed by the significant fractional digits, if any.
pub fn render_time(time: &NaiveTime) -> String {
    let base = time.format("%H:%M:%S").to_string();
    match time.nanosecond() {
        0 => base,
        nanos => format!("{base}.{}", fraction_digits(nanos)),
    }
}

fn fraction_digits(nanos: u32) -> String {
    format!("{nanos:09}").trim_end_matches('0').to_string()
}

pub fn parse_guid(text: &str) -> Option<Uuid> {
    if !GUID.is_match(text) {
        return None;
    }
    Uuid::parse_str(text).ok()
}

/// Parses a bare ISO 8601 day-time duration.
pub fn parse_duration(text: &str) -> Option<TimeDelta> {
    if !is_duration(text) {
        return None;
    }
    let caps = DURATION.captures(text)?;
    let component = |i: usize| -> Option<i64> {
        caps.get(i).map_or(Some(0), |m| m.as_str().parse::<i64>().ok())
    };
    let seconds = component(2)?
        .checked_mul(86_400)?
        .checked_add(component(3)?.checked_mul(3_600)?)?
        .checked_add(component(4)?.checked_mul(60)?)?
        .checked_add(component(5)?)?;
    let nanos = match caps.get(6) {
        Some(m) => {
            let digits: String = m.as_str().chars().chain(std::iter::repeat('0')).take(9).collect();
            digits.parse::<u32>().ok()?
        }
        None => 0,
    };
    let delta = TimeDelta::new(seconds, nanos)?;
    Some(if caps.get(1).is_some() { -delta } else { delta })
}

/// Canonical ISO 8601 rendering: days, then hours, minutes and seconds;
/// zero renders as `PT0S`.
pub fn render_duration(delta: &TimeDelta) -> String {
    let negative = *delta < TimeDelta::zero();
    let magnitude = if negative { -*delta } else { *delta };
    let total = magnitude.num_seconds();
    let nanos = magnitude.subsec_nanos().unsigned_abs();
    let (days, rest) = (total / 86_400, total % 86_400);
    let (hours, minutes, seconds) = (rest / 3_600, (rest % 3_600) / 60, rest % 60);

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push('P');
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || seconds > 0 || nanos > 0 || days == 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if seconds > 0 || nanos > 0 || (hours == 0 && minutes == 0) {
            out.push_str(&seconds.to_string());
            if nanos > 0 {
                out.push('.');
                out.push_str(&fraction_digits(nanos));
            }
            out.push('S');
        }
    }
    out
}

/// URL rendering of a float given its shortest round-trip representation.
pub fn render_float(value: f64, repr: String) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "INF".to_string()
    } else if value == f64::NEG_INFINITY {
        "-INF".to_string()
    } else {
        repr
    }
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        t if INTEGER.is_match(t) || DECIMAL.is_match(t) || DOUBLE.is_match(t) => {
            let value: f64 = t.parse().ok()?;
            // finite text must not overflow to INF or underflow to zero
            let mantissa = t.split(['e', 'E']).next().unwrap_or(t);
            let underflow = value == 0.0 && mantissa.contains(|c: char| matches!(c, '1'..='9'));
            (value.is_finite() && !underflow).then_some(value)
        }
        _ => None,
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    if INTEGER.is_match(text) || DECIMAL.is_match(text) {
        Decimal::from_str(text.trim_start_matches('+')).ok()
    } else if DOUBLE.is_match(text) {
        Decimal::from_scientific(text.trim_start_matches('+')).ok()
    } else {
        None
    }
}

/// Reads numeric text as the given numeric kind.
///
/// `Byte` and `SByte` wrap modulo 256; wider integers reject out-of-range
/// text; floats accept any numeric shape whose value they can hold.
pub fn parse_number(text: &str, kind: PrimitiveKind) -> Option<Primitive> {
    use PrimitiveKind as K;
    let integer = || -> Option<i128> {
        if INTEGER.is_match(text) { text.trim_start_matches('+').parse::<i128>().ok() } else { None }
    };
    let value = match kind {
        K::Byte => Primitive::Byte(integer()?.rem_euclid(256) as u8),
        K::SByte => Primitive::SByte(integer()?.rem_euclid(256) as u8 as i8),
        K::Int16 => Primitive::Int16(i16::try_from(integer()?).ok()?),
        K::Int32 => Primitive::Int32(i32::try_from(integer()?).ok()?),
        K::Int64 => Primitive::Int64(i64::try_from(integer()?).ok()?),
        K::Single => {
            let value = parse_float(text)?;
            let narrowed = value as f32;
            if (value.is_finite() && !narrowed.is_finite()) || (value != 0.0 && narrowed == 0.0) {
                return None;
            }
            Primitive::Single(narrowed)
        }
        K::Double => Primitive::Double(parse_float(text)?),
        K::Decimal => Primitive::Decimal(parse_decimal(text)?),
        _ => return None,
    };
    Some(value)
}

/// Infers the narrowest OData type for numeric text with no expected type:
/// integers become `Int32`, then `Int64`, then `Decimal`; fractions become
/// `Decimal`; exponents and non-finite names become `Double`.
pub fn infer_number(text: &str) -> Option<Primitive> {
    if INTEGER.is_match(text) {
        parse_number(text, PrimitiveKind::Int32)
            .or_else(|| parse_number(text, PrimitiveKind::Int64))
            .or_else(|| parse_number(text, PrimitiveKind::Decimal))
    } else if DECIMAL.is_match(text) {
        parse_number(text, PrimitiveKind::Decimal)
    } else {
        parse_number(text, PrimitiveKind::Double)
    }
}

/// Parses complete URL literal text as the given kind.
///
/// Enumeration literals must use the qualified `Ns.Type'Member'` form here;
/// validation against declared members happens in the literal reader.
pub fn parse_as(kind: PrimitiveKind, text: &str) -> Option<Primitive> {
    use PrimitiveKind as K;
    if text == "null" {
        return Some(Primitive::Null);
    }
    let value = match kind {
        K::Boolean => match text {
            "true" => Primitive::Boolean(true),
            "false" => Primitive::Boolean(false),
            _ => return None,
        },
        k if k.is_numeric() => return parse_number(text, k),
        K::String => Primitive::String(parse_string(text)?),
        K::Binary => {
            let (prefix, body) = split_prefixed(text)?;
            if !(prefix.eq_ignore_ascii_case("binary") || prefix == "X") {
                return None;
            }
            Primitive::Binary(decode_binary(&body)?)
        }
        K::Date => Primitive::Date(parse_date(text)?),
        K::TimeOfDay => Primitive::TimeOfDay(parse_time(text)?),
        K::DateTimeOffset => Primitive::DateTimeOffset(parse_date_time_offset(text)?),
        K::Duration => match split_prefixed(text) {
            Some((prefix, body)) if prefix.eq_ignore_ascii_case("duration") => {
                Primitive::Duration(parse_duration(&body)?)
            }
            Some(_) => return None,
            None => Primitive::Duration(parse_duration(text)?),
        },
        K::Guid => Primitive::Guid(parse_guid(text)?),
        K::Enum => {
            let (type_name, body) = split_prefixed(text)?;
            if !type_name.contains('.') {
                return None;
            }
            Primitive::Enum(EnumValue {
                type_name: type_name.to_string(),
                members: split_members(&body)?,
            })
        }
        _ => return None,
    };
    Some(value)
}

/// Splits a flag combination `Red,Blue` into trimmed member names.
pub fn split_members(body: &str) -> Option<Vec<String>> {
    let members: Vec<String> = body.split(',').map(|m| m.trim().to_string()).collect();
    if members.iter().any(|m| m.is_empty()) { None } else { Some(members) }
}

/// Options for the OData JSON format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOptions {
    /// Render `Int64` and `Decimal` as strings (`IEEE754Compatible=true`)
    pub ieee754_compatible: bool,
}

impl Primitive {
    /// Renders the value in the OData JSON format.
    pub fn to_json(&self, options: JsonOptions) -> Json {
        use Primitive::*;
        match self {
            Null => Json::Null,
            Boolean(b) => Json::Bool(*b),
            Byte(n) => json!(n),
            SByte(n) => json!(n),
            Int16(n) => json!(n),
            Int32(n) => json!(n),
            Int64(n) if options.ieee754_compatible => Json::String(n.to_string()),
            Int64(n) => json!(n),
            Single(n) => float_json(f64::from(*n)),
            Double(n) => float_json(*n),
            Decimal(d) if options.ieee754_compatible => Json::String(d.to_string()),
            Decimal(d) => d
                .to_f64()
                .and_then(Number::from_f64)
                .map_or_else(|| Json::String(d.to_string()), Json::Number),
            String(s) => Json::String(s.clone()),
            Binary(bytes) => Json::String(encode_binary(bytes)),
            Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            TimeOfDay(t) => Json::String(render_time(t)),
            DateTimeOffset(dt) => Json::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Duration(d) => Json::String(render_duration(d)),
            Guid(g) => Json::String(g.hyphenated().to_string()),
            Enum(e) => Json::String(e.members.join(",")),
        }
    }

    /// Reads a value of the given kind from its OData JSON form.
    ///
    /// Accepts both the plain and the IEEE754Compatible forms. Enumeration
    /// values need their type and are converted by the caller.
    pub fn from_json(kind: PrimitiveKind, json: &Json) -> Option<Primitive> {
        use PrimitiveKind as K;
        if json.is_null() {
            return Some(Primitive::Null);
        }
        let value = match (kind, json) {
            (K::Boolean, Json::Bool(b)) => Primitive::Boolean(*b),
            (k, Json::Number(n)) if k.is_numeric() => parse_number(&n.to_string(), k)?,
            (k, Json::String(s)) if k.is_numeric() => parse_number(s, k)?,
            (K::String, Json::String(s)) => Primitive::String(s.clone()),
            (K::Binary, Json::String(s)) => Primitive::Binary(decode_binary(s)?),
            (K::Date, Json::String(s)) => Primitive::Date(parse_date(s)?),
            (K::TimeOfDay, Json::String(s)) => Primitive::TimeOfDay(parse_time(s)?),
            (K::DateTimeOffset, Json::String(s)) => {
                Primitive::DateTimeOffset(parse_date_time_offset(s)?)
            }
            (K::Duration, Json::String(s)) => Primitive::Duration(parse_duration(s)?),
            (K::Guid, Json::String(s)) => Primitive::Guid(parse_guid(s)?),
            _ => return None,
        };
        Some(value)
    }

    /// The typed SQL parameter for this value, before dialect lowering.
    pub fn to_sql_value(&self) -> SqlValue {
        use Primitive::*;
        match self {
            Null => SqlValue::Null,
            Boolean(b) => SqlValue::Boolean(*b),
            Single(n) => SqlValue::Real(f64::from(*n)),
            Double(n) => SqlValue::Real(*n),
            Decimal(d) => SqlValue::Decimal(*d),
            String(s) => SqlValue::Text(s.clone()),
            Binary(bytes) => SqlValue::Blob(bytes.clone()),
            Date(d) => SqlValue::Date(*d),
            TimeOfDay(t) => SqlValue::Time(*t),
            DateTimeOffset(dt) => SqlValue::Timestamp(*dt),
            Duration(d) => SqlValue::Interval(*d),
            Guid(g) => SqlValue::Uuid(*g),
            Enum(e) => SqlValue::Text(e.members.join(",")),
            other => other.as_i64().map_or(SqlValue::Null, SqlValue::Integer),
        }
    }

    /// The value as stored in a document collection (MongoDB extended JSON).
    ///
    /// Dates and times of day are ISO text (ordered lexically), instants are
    /// `$date` in UTC with millisecond precision, durations are seconds.
    pub fn to_document_value(&self) -> Json {
        use Primitive::*;
        match self {
            Null => Json::Null,
            Boolean(b) => Json::Bool(*b),
            Single(n) => document_float(f64::from(*n)),
            Double(n) => document_float(*n),
            Decimal(d) => json!({ "$numberDecimal": d.to_string() }),
            String(s) => Json::String(s.clone()),
            Binary(bytes) => json!({ "$binary": { "base64": STANDARD.encode(bytes), "subType": "00" } }),
            Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            TimeOfDay(t) => Json::String(render_time(t)),
            DateTimeOffset(dt) => json!({
                "$date": dt.with_timezone(&Utc).format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
            }),
            Duration(d) => document_float(duration_seconds(d)),
            Guid(g) => json!({ "$uuid": g.hyphenated().to_string() }),
            Enum(e) => Json::String(e.members.join(",")),
            other => other.as_i64().map_or(Json::Null, |n| json!(n)),
        }
    }
}

/// Total seconds of a duration, fractional part included.
pub fn duration_seconds(delta: &TimeDelta) -> f64 {
    delta.num_seconds() as f64 + f64::from(delta.subsec_nanos()) / 1e9
}

fn float_json(n: f64) -> Json {
    match Number::from_f64(n) {
        Some(num) => Json::Number(num),
        None => Json::String(render_float(n, String::new())),
    }
}

fn document_float(n: f64) -> Json {
    match Number::from_f64(n) {
        Some(num) => Json::Number(num),
        None if n.is_nan() => json!({ "$numberDouble": "NaN" }),
        None if n > 0.0 => json!({ "$numberDouble": "Infinity" }),
        None => json!({ "$numberDouble": "-Infinity" }),
    }
}
