use crate::{ast::Type, value::PrimitiveKind};

/// The canonical functions callable from expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    // String
    Contains,
    StartsWith,
    EndsWith,
    Length,
    IndexOf,
    Substring,
    ToLower,
    ToUpper,
    Trim,
    Concat,
    MatchesPattern,

    // Date and time
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    FractionalSeconds,
    Date,
    Time,
    TotalOffsetMinutes,
    TotalSeconds,
    Now,
    MinDateTime,
    MaxDateTime,

    // Arithmetic
    Round,
    Floor,
    Ceiling,
}

/// What an argument position accepts. `null` is accepted everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Param {
    String,
    Integer,
    Numeric,
    /// `Edm.Date` or `Edm.DateTimeOffset`
    DateLike,
    /// `Edm.TimeOfDay` or `Edm.DateTimeOffset`
    TimeLike,
    Instant,
    Duration,
}

impl Param {
    fn accepts(self, ty: &Type) -> bool {
        use PrimitiveKind as K;
        let Some(kind) = ty.kind() else {
            return true;
        };
        match self {
            Param::String => kind == K::String,
            Param::Integer => kind.is_integer(),
            Param::Numeric => kind.is_numeric(),
            Param::DateLike => matches!(kind, K::Date | K::DateTimeOffset),
            Param::TimeLike => matches!(kind, K::TimeOfDay | K::DateTimeOffset),
            Param::Instant => kind == K::DateTimeOffset,
            Param::Duration => kind == K::Duration,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Param::String => "Edm.String",
            Param::Integer => "an integer",
            Param::Numeric => "a number",
            Param::DateLike => "Edm.Date or Edm.DateTimeOffset",
            Param::TimeLike => "Edm.TimeOfDay or Edm.DateTimeOffset",
            Param::Instant => "Edm.DateTimeOffset",
            Param::Duration => "Edm.Duration",
        }
    }
}

/// Why a call does not fit a function's signature.
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureError {
    Arity { expected: String, found: usize },
    Argument { index: usize, expected: &'static str, found: Type },
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        use Function::*;
        let function = match name {
            "contains" => Contains,
            "startswith" => StartsWith,
            "endswith" => EndsWith,
            "length" => Length,
            "indexof" => IndexOf,
            "substring" => Substring,
            "tolower" => ToLower,
            "toupper" => ToUpper,
            "trim" => Trim,
            "concat" => Concat,
            "matchesPattern" => MatchesPattern,
            "year" => Year,
            "month" => Month,
            "day" => Day,
            "hour" => Hour,
            "minute" => Minute,
            "second" => Second,
            "fractionalseconds" => FractionalSeconds,
            "date" => Date,
            "time" => Time,
            "totaloffsetminutes" => TotalOffsetMinutes,
            "totalseconds" => TotalSeconds,
            "now" => Now,
            "mindatetime" => MinDateTime,
            "maxdatetime" => MaxDateTime,
            "round" => Round,
            "floor" => Floor,
            "ceiling" => Ceiling,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(self) -> &'static str {
        use Function::*;
        match self {
            Contains => "contains",
            StartsWith => "startswith",
            EndsWith => "endswith",
            Length => "length",
            IndexOf => "indexof",
            Substring => "substring",
            ToLower => "tolower",
            ToUpper => "toupper",
            Trim => "trim",
            Concat => "concat",
            MatchesPattern => "matchesPattern",
            Year => "year",
            Month => "month",
            Day => "day",
            Hour => "hour",
            Minute => "minute",
            Second => "second",
            FractionalSeconds => "fractionalseconds",
            Date => "date",
            Time => "time",
            TotalOffsetMinutes => "totaloffsetminutes",
            TotalSeconds => "totalseconds",
            Now => "now",
            MinDateTime => "mindatetime",
            MaxDateTime => "maxdatetime",
            Round => "round",
            Floor => "floor",
            Ceiling => "ceiling",
        }
    }

    /// Parameters of the function; `concat` repeats its last one.
    fn params(self) -> &'static [Param] {
        use Function::*;
        match self {
            Contains | StartsWith | EndsWith | IndexOf | MatchesPattern | Concat => {
                &[Param::String, Param::String]
            }
            Length | ToLower | ToUpper | Trim => &[Param::String],
            Substring => &[Param::String, Param::Integer, Param::Integer],
            Year | Month | Day => &[Param::DateLike],
            Hour | Minute | Second | FractionalSeconds => &[Param::TimeLike],
            Date | Time | TotalOffsetMinutes => &[Param::Instant],
            TotalSeconds => &[Param::Duration],
            Now | MinDateTime | MaxDateTime => &[],
            Round | Floor | Ceiling => &[Param::Numeric],
        }
    }

    /// Accepted argument counts as `(min, max)`, `None` meaning unbounded.
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            Function::Concat => (2, None),
            Function::Substring => (2, Some(3)),
            other => {
                let n = other.params().len();
                (n, Some(n))
            }
        }
    }

    /// Checks argument count and types, returning the result type.
    pub fn check(self, args: &[Type]) -> Result<Type, SignatureError> {
        let (min, max) = self.arity();
        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            let expected = match max {
                Some(max) if max == min => min.to_string(),
                Some(max) => format!("{min} to {max}"),
                None => format!("at least {min}"),
            };
            return Err(SignatureError::Arity { expected, found: args.len() });
        }

        let params = self.params();
        for (index, arg) in args.iter().enumerate() {
            let param = params[index.min(params.len() - 1)];
            if !param.accepts(arg) {
                return Err(SignatureError::Argument {
                    index,
                    expected: param.describe(),
                    found: arg.clone(),
                });
            }
        }

        Ok(self.result_type(args))
    }

    fn result_type(self, args: &[Type]) -> Type {
        use Function::*;
        let kind = match self {
            Contains | StartsWith | EndsWith | MatchesPattern => PrimitiveKind::Boolean,
            Length | IndexOf | Year | Month | Day | Hour | Minute | Second | TotalOffsetMinutes => {
                PrimitiveKind::Int32
            }
            Substring | ToLower | ToUpper | Trim | Concat => PrimitiveKind::String,
            FractionalSeconds | TotalSeconds => PrimitiveKind::Decimal,
            Date => PrimitiveKind::Date,
            Time => PrimitiveKind::TimeOfDay,
            Now | MinDateTime | MaxDateTime => PrimitiveKind::DateTimeOffset,
            Round | Floor | Ceiling => return args.first().cloned().unwrap_or(Type::Null),
        };
        Type::Primitive(kind)
    }
}
