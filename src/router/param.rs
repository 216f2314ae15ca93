//! Typed path parameters: the five parameter types, their sub-patterns,
//! and conversion of captured text into typed values.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Maximum number of path parameters before heap allocation.
/// Most routes have ≤4 params (e.g., `/org/{org}/user/{id:int}`).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Synthetic parameter carrying the remainder of a static or webapp path.
pub const FILEPATH_PARAM: &str = "__filepath__";

/// Declared type of a path parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// Any run of non-slash characters (the default)
    Str,
    /// Unsigned decimal digits, converted to `i64`
    Int,
    /// `digits.digits`, converted to `f64`
    Float,
    /// `true|false|True|False|TRUE|FALSE|1|0`
    Bool,
    /// `YYYY-M-D` with an optional `HH:MM:SS` time after `T`, `_` or a space
    Date,
}

impl ParamType {
    /// Look up a type by its template name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "str" => Some(ParamType::Str),
            "int" => Some(ParamType::Int),
            "float" => Some(ParamType::Float),
            "bool" => Some(ParamType::Bool),
            "date" => Some(ParamType::Date),
            _ => None,
        }
    }

    /// Template name of the type
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ParamType::Str => "str",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
            ParamType::Date => "date",
        }
    }

    /// Regex sub-pattern (without the capturing group) matching this type
    #[must_use]
    pub fn pattern(self) -> &'static str {
        match self {
            ParamType::Str => r"[^/]+",
            ParamType::Int => r"\d+",
            ParamType::Float => r"\d+\.\d+",
            ParamType::Bool => r"true|false|True|False|TRUE|FALSE|1|0",
            ParamType::Date => {
                r"\d{4}-(?:1[0-2]|0?[1-9])-(?:3[01]|[12][0-9]|0?[1-9])(?:[T_ ](?:[01][0-9]|2[0-3]):[0-5][0-9]:[0-5][0-9])?"
            }
        }
    }

    /// Convert captured text into a typed value
    ///
    /// The text has already matched [`ParamType::pattern`], but conversion can
    /// still fail: integers may overflow and dates may not exist (`2023-02-31`).
    pub fn convert(self, raw: &str) -> Result<ParamValue, String> {
        match self {
            ParamType::Str => Ok(ParamValue::Str(raw.to_string())),
            ParamType::Int => raw
                .parse::<i64>()
                .map(ParamValue::Int)
                .map_err(|e| e.to_string()),
            ParamType::Float => raw
                .parse::<f64>()
                .map(ParamValue::Float)
                .map_err(|e| e.to_string()),
            ParamType::Bool => parse_bool(raw).map(ParamValue::Bool),
            ParamType::Date => parse_date(raw).map(ParamValue::Date),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw {
        "1" | "t" | "T" | "true" | "True" | "TRUE" => Ok(true),
        "0" | "f" | "F" | "false" | "False" | "FALSE" => Ok(false),
        other => Err(format!("'{other}' is not a boolean")),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDateTime, String> {
    let (date, time) = match raw.find(['T', '_', ' ']) {
        Some(idx) => (&raw[..idx], Some(&raw[idx + 1..])),
        None => (raw, None),
    };

    let mut parts = date.splitn(3, '-');
    let mut next = |what: &str| -> Result<u32, String> {
        parts
            .next()
            .ok_or_else(|| format!("missing {what}"))?
            .parse::<u32>()
            .map_err(|e| format!("bad {what}: {e}"))
    };
    let year = next("year")?;
    let month = next("month")?;
    let day = next("day")?;
    let day = NaiveDate::from_ymd_opt(year as i32, month, day)
        .ok_or_else(|| format!("'{date}' is not a calendar date"))?;

    let Some(time) = time else {
        return day
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| format!("'{date}' has no midnight"));
    };
    let mut hms = time.splitn(3, ':').map(str::parse::<u32>);
    match (hms.next(), hms.next(), hms.next()) {
        (Some(Ok(h)), Some(Ok(m)), Some(Ok(s))) => day
            .and_hms_opt(h, m, s)
            .ok_or_else(|| format!("'{time}' is not a valid time")),
        _ => Err(format!("'{time}' is not a valid time")),
    }
}

/// Typed value of a path parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// `str` parameter
    Str(String),
    /// `int` parameter
    Int(i64),
    /// `float` parameter
    Float(f64),
    /// `bool` parameter
    Bool(bool),
    /// `date` parameter (date-only values land at midnight)
    Date(NaiveDateTime),
}

impl ParamValue {
    /// String content, for `str` values
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, for `int` values
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float content, for `float` values
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean content, for `bool` values
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Timestamp content, for `date` values
    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            ParamValue::Date(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

/// Compiled description of one `{...}` token in a path template
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    /// Parameter name without the `?` marker
    pub key: Arc<str>,
    /// Declared type
    pub kind: ParamType,
    /// Value used when the segment is absent or an optional conversion fails
    pub default: Option<ParamValue>,
    /// Whether the token carried a trailing `?`
    pub optional: bool,
}

/// One extracted parameter on a matched request.
///
/// Names are `Arc<str>` shared with the compiled route, so extraction only
/// allocates for the values themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct PathParam {
    /// Parameter name
    pub key: Arc<str>,
    /// Converted value, `None` when absent and without a default
    pub value: Option<ParamValue>,
}

/// Stack-allocated parameter storage for matched requests.
pub type ParamVec = SmallVec<[PathParam; MAX_INLINE_PARAMS]>;
