//! Reference semantics of operators and canonical functions over
//! [`Primitive`] values.
//!
//! The in-memory backend evaluates with these functions directly; the SQL
//! and document backends are expected to select the same records.
//!
//! - Arithmetic propagates `null`. Integers use checked 64-bit math and
//!   overflow yields `null`; decimals use `rust_decimal`; anything with a
//!   float uses `f64`. Division by zero yields `null`.
//! - `eq`/`ne` are null-safe and never `null`; the relational operators and
//!   `in` yield `null` for a `null` operand.
//! - `and`, `or` and `not` follow Kleene logic.
//! - Functions propagate `null`. Date and time parts of a date-time-offset
//!   are taken in UTC.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;

use crate::{
    ast::{BinaryOp, Function},
    value::{Primitive, PrimitiveKind},
};

/// The truth value of a predicate result; `None` for `null`.
pub fn truth(value: &Primitive) -> Option<bool> {
    match value {
        Primitive::Boolean(b) => Some(*b),
        Primitive::Null => None,
        other => {
            warn!(kind = ?other.kind(), "non-boolean value used as a predicate");
            None
        }
    }
}

fn from_truth(value: Option<bool>) -> Primitive {
    value.map_or(Primitive::Null, Primitive::Boolean)
}

pub fn and(left: &Primitive, right: &Primitive) -> Primitive {
    match (truth(left), truth(right)) {
        (Some(false), _) | (_, Some(false)) => Primitive::Boolean(false),
        (Some(true), Some(true)) => Primitive::Boolean(true),
        _ => Primitive::Null,
    }
}

pub fn or(left: &Primitive, right: &Primitive) -> Primitive {
    match (truth(left), truth(right)) {
        (Some(true), _) | (_, Some(true)) => Primitive::Boolean(true),
        (Some(false), Some(false)) => Primitive::Boolean(false),
        _ => Primitive::Null,
    }
}

pub fn not(value: &Primitive) -> Primitive {
    from_truth(truth(value).map(|b| !b))
}

/// Applies any binary operator.
pub fn binary(op: BinaryOp, left: &Primitive, right: &Primitive) -> Primitive {
    match op {
        BinaryOp::And => and(left, right),
        BinaryOp::Or => or(left, right),
        op if op.is_comparison() => compare(op, left, right),
        op => arithmetic(op, left, right),
    }
}

pub fn compare(op: BinaryOp, left: &Primitive, right: &Primitive) -> Primitive {
    match op {
        BinaryOp::Eq => return Primitive::Boolean(left.odata_eq(right)),
        BinaryOp::Ne => return Primitive::Boolean(!left.odata_eq(right)),
        _ => {}
    }
    if left.is_null() || right.is_null() {
        return Primitive::Null;
    }

    let Some(ordering) = left.compare(right) else {
        if !(left.as_f64().is_some() && right.as_f64().is_some()) {
            warn!(left = ?left.kind(), right = ?right.kind(), "incomparable values");
        }
        return Primitive::Null;
    };
    let result = match op {
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        _ => return Primitive::Null,
    };
    Primitive::Boolean(result)
}

pub fn in_list(value: &Primitive, list: &[Primitive]) -> Primitive {
    if value.is_null() {
        return Primitive::Null;
    }
    Primitive::Boolean(list.iter().any(|item| value.odata_eq(item)))
}

pub fn arithmetic(op: BinaryOp, left: &Primitive, right: &Primitive) -> Primitive {
    if left.is_null() || right.is_null() {
        return Primitive::Null;
    }
    let (Some(a), Some(b)) = (left.kind(), right.kind()) else {
        return Primitive::Null;
    };
    if !(a.is_numeric() && b.is_numeric()) {
        warn!(op = op.keyword(), left = %a, right = %b, "arithmetic on non-numeric values");
        return Primitive::Null;
    }

    match a.promote(b) {
        PrimitiveKind::Int64 => match (left.as_i64(), right.as_i64()) {
            (Some(x), Some(y)) => integer_arithmetic(op, x, y),
            _ => Primitive::Null,
        },
        PrimitiveKind::Decimal => match (left.as_decimal(), right.as_decimal()) {
            (Some(x), Some(y)) => decimal_arithmetic(op, x, y),
            _ => Primitive::Null,
        },
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(x), Some(y)) => float_arithmetic(op, x, y),
            _ => Primitive::Null,
        },
    }
}

fn integer_arithmetic(op: BinaryOp, x: i64, y: i64) -> Primitive {
    let result = match op {
        BinaryOp::Add => x.checked_add(y),
        BinaryOp::Sub => x.checked_sub(y),
        BinaryOp::Mul => x.checked_mul(y),
        BinaryOp::Div => x.checked_div(y),
        BinaryOp::Mod => x.checked_rem(y),
        BinaryOp::DivBy => return decimal_arithmetic(op, Decimal::from(x), Decimal::from(y)),
        _ => None,
    };
    result.map_or(Primitive::Null, Primitive::Int64)
}

fn decimal_arithmetic(op: BinaryOp, x: Decimal, y: Decimal) -> Primitive {
    let result = match op {
        BinaryOp::Add => x.checked_add(y),
        BinaryOp::Sub => x.checked_sub(y),
        BinaryOp::Mul => x.checked_mul(y),
        BinaryOp::Div | BinaryOp::DivBy => x.checked_div(y),
        BinaryOp::Mod => x.checked_rem(y),
        _ => None,
    };
    result.map_or(Primitive::Null, |d| Primitive::Decimal(d.normalize()))
}

fn float_arithmetic(op: BinaryOp, x: f64, y: f64) -> Primitive {
    let divides = matches!(op, BinaryOp::Div | BinaryOp::DivBy | BinaryOp::Mod);
    if divides && y == 0.0 {
        return Primitive::Null;
    }
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div | BinaryOp::DivBy => x / y,
        BinaryOp::Mod => x % y,
        _ => return Primitive::Null,
    };
    Primitive::Double(result)
}

pub fn negate(value: &Primitive) -> Primitive {
    match value {
        Primitive::Null => Primitive::Null,
        Primitive::Single(n) => Primitive::Single(-n),
        Primitive::Double(n) => Primitive::Double(-n),
        Primitive::Decimal(d) => Primitive::Decimal(-d),
        other => match other.as_i64() {
            Some(n) => n.checked_neg().map_or(Primitive::Null, Primitive::Int64),
            None => {
                warn!(kind = ?other.kind(), "negation of a non-numeric value");
                Primitive::Null
            }
        },
    }
}

pub fn min_date_time() -> Option<DateTime<FixedOffset>> {
    let date = NaiveDate::from_ymd_opt(1, 1, 1)?;
    Some(NaiveDateTime::new(date, NaiveTime::MIN).and_utc().fixed_offset())
}

pub fn max_date_time() -> Option<DateTime<FixedOffset>> {
    let date = NaiveDate::from_ymd_opt(9999, 12, 31)?;
    let time = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)?;
    Some(NaiveDateTime::new(date, time).and_utc().fixed_offset())
}

fn date_part(value: &Primitive) -> Option<NaiveDate> {
    match value {
        Primitive::Date(d) => Some(*d),
        Primitive::DateTimeOffset(dt) => Some(dt.naive_utc().date()),
        _ => None,
    }
}

fn time_part(value: &Primitive) -> Option<NaiveTime> {
    match value {
        Primitive::TimeOfDay(t) => Some(*t),
        Primitive::DateTimeOffset(dt) => Some(dt.naive_utc().time()),
        _ => None,
    }
}

fn int(n: u32) -> Primitive {
    i32::try_from(n).map_or(Primitive::Null, Primitive::Int32)
}

fn char_count(s: &str) -> i32 {
    i32::try_from(s.chars().count()).unwrap_or(i32::MAX)
}

/// Evaluates a canonical function.
pub fn call(function: Function, args: &[Primitive]) -> Primitive {
    use Function::*;

    match function {
        Now => return Primitive::DateTimeOffset(Utc::now().fixed_offset()),
        MinDateTime => return min_date_time().map_or(Primitive::Null, Primitive::DateTimeOffset),
        MaxDateTime => return max_date_time().map_or(Primitive::Null, Primitive::DateTimeOffset),
        _ => {}
    }
    if args.is_empty() || args.iter().any(Primitive::is_null) {
        return Primitive::Null;
    }

    match function {
        Contains | StartsWith | EndsWith | IndexOf | MatchesPattern => {
            let (Some(s), Some(t)) = (args[0].as_str(), args.get(1).and_then(Primitive::as_str)) else {
                return mistyped(function);
            };
            match function {
                Contains => Primitive::Boolean(s.contains(t)),
                StartsWith => Primitive::Boolean(s.starts_with(t)),
                EndsWith => Primitive::Boolean(s.ends_with(t)),
                IndexOf => Primitive::Int32(s.find(t).map_or(-1, |at| char_count(&s[..at]))),
                _ => match Regex::new(t) {
                    Ok(pattern) => Primitive::Boolean(pattern.is_match(s)),
                    Err(e) => {
                        warn!(error = %e, "invalid matchesPattern expression");
                        Primitive::Null
                    }
                },
            }
        }
        Length | ToLower | ToUpper | Trim => {
            let Some(s) = args[0].as_str() else {
                return mistyped(function);
            };
            match function {
                Length => Primitive::Int32(char_count(s)),
                ToLower => Primitive::String(s.to_lowercase()),
                ToUpper => Primitive::String(s.to_uppercase()),
                _ => Primitive::String(s.trim().to_string()),
            }
        }
        Substring => {
            let (Some(s), Some(start)) = (args[0].as_str(), args.get(1).and_then(Primitive::as_i64)) else {
                return mistyped(function);
            };
            let start = usize::try_from(start.max(0)).unwrap_or(usize::MAX);
            let chars = s.chars().skip(start);
            match args.get(2).map(Primitive::as_i64) {
                None => Primitive::String(chars.collect()),
                Some(Some(len)) => {
                    let len = usize::try_from(len.max(0)).unwrap_or(usize::MAX);
                    Primitive::String(chars.take(len).collect())
                }
                Some(None) => return mistyped(function),
            }
        }
        Concat => {
            let mut out = String::new();
            for arg in args {
                let Some(s) = arg.as_str() else {
                    return mistyped(function);
                };
                out.push_str(s);
            }
            Primitive::String(out)
        }
        Year | Month | Day => {
            let Some(date) = date_part(&args[0]) else {
                return mistyped(function);
            };
            match function {
                Year => Primitive::Int32(date.year()),
                Month => int(date.month()),
                _ => int(date.day()),
            }
        }
        Hour | Minute | Second | FractionalSeconds => {
            let Some(time) = time_part(&args[0]) else {
                return mistyped(function);
            };
            match function {
                Hour => int(time.hour()),
                Minute => int(time.minute()),
                Second => int(time.second()),
                _ => Primitive::Decimal(Decimal::new(i64::from(time.nanosecond()), 9).normalize()),
            }
        }
        Date | Time | TotalOffsetMinutes => {
            let Primitive::DateTimeOffset(dt) = &args[0] else {
                return mistyped(function);
            };
            match function {
                Date => Primitive::Date(dt.naive_utc().date()),
                Time => Primitive::TimeOfDay(dt.naive_utc().time()),
                _ => Primitive::Int32(dt.offset().local_minus_utc() / 60),
            }
        }
        TotalSeconds => {
            let Primitive::Duration(d) = &args[0] else {
                return mistyped(function);
            };
            let seconds = Decimal::from(d.num_seconds()) + Decimal::new(i64::from(d.subsec_nanos()), 9);
            Primitive::Decimal(seconds.normalize())
        }
        Round | Floor | Ceiling => match &args[0] {
            Primitive::Decimal(d) => Primitive::Decimal(match function {
                Round => d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero),
                Floor => d.floor(),
                _ => d.ceil(),
            }),
            Primitive::Double(n) => Primitive::Double(match function {
                Round => n.round(),
                Floor => n.floor(),
                _ => n.ceil(),
            }),
            Primitive::Single(n) => Primitive::Single(match function {
                Round => n.round(),
                Floor => n.floor(),
                _ => n.ceil(),
            }),
            other if other.as_i64().is_some() => other.clone(),
            _ => return mistyped(function),
        },
        Now | MinDateTime | MaxDateTime => Primitive::Null,
    }
}

fn mistyped(function: Function) -> Primitive {
    warn!(function = function.name(), "function applied to mistyped arguments");
    Primitive::Null
}
