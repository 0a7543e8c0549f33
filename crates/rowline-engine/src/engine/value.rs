//! Typed field values.
//!
//! A row stores [`Value`]s keyed by field name. All conversion between the
//! loosely typed input a row may hold (raw text typed by the user, numbers
//! read back from storage) and the type a column declares goes through
//! [`Value::coerce`], so type rules live in exactly one place.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rhai::{Dynamic, FLOAT, INT};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::schema::ColumnType;
use crate::error::{EngineError, Result};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y"];
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// A single field value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Empty for validation purposes: null, or blank text in a textual column.
    pub fn is_empty_for(&self, kind: ColumnType) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) if kind.is_textual() => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Decimal(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Integer view of the value, if it has one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Decimal(n) if n.fract() == 0.0 => Some(*n as i64),
            Value::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Parse raw user input for a column, keeping the raw text when it does
    /// not fit the column type.
    pub fn from_input(input: &str, kind: ColumnType) -> Value {
        if input.trim().is_empty() && !kind.is_textual() {
            return Value::Null;
        }
        let raw = Value::Text(input.to_string());
        raw.coerce(kind).unwrap_or(raw)
    }

    /// Convert the value to the representation a column of `kind` stores.
    ///
    /// Null always coerces to null. Blank text coerces to null for
    /// non-textual columns.
    pub fn coerce(&self, kind: ColumnType) -> Result<Value> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        if let Value::Text(s) = self
            && s.trim().is_empty()
            && !kind.is_textual()
        {
            return Ok(Value::Null);
        }

        let coerced = match kind {
            ColumnType::SectionHeader => Some(Value::Null),
            ColumnType::Text | ColumnType::Dropdown | ColumnType::DropdownEditable => {
                Some(match self {
                    Value::Text(_) => self.clone(),
                    other => Value::Text(other.to_string()),
                })
            }
            ColumnType::Number => match self {
                Value::Integer(_) => Some(self.clone()),
                Value::Boolean(b) => Some(Value::Integer(*b as i64)),
                Value::Decimal(n) => round_to_i64(*n).map(Value::Integer),
                Value::Text(s) => {
                    let s = s.trim();
                    s.parse::<i64>()
                        .ok()
                        .or_else(|| s.parse::<f64>().ok().and_then(round_to_i64))
                        .map(Value::Integer)
                }
                _ => None,
            },
            ColumnType::Currency => match self {
                Value::Decimal(n) if n.is_finite() => Some(self.clone()),
                Value::Integer(n) => Some(Value::Decimal(*n as f64)),
                Value::Boolean(b) => Some(Value::Decimal(if *b { 1.0 } else { 0.0 })),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .map(Value::Decimal),
                _ => None,
            },
            ColumnType::Boolean => match self {
                Value::Boolean(_) => Some(self.clone()),
                Value::Integer(n) => Some(Value::Boolean(*n != 0)),
                Value::Decimal(n) => Some(Value::Boolean(*n != 0.0)),
                Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => Some(Value::Boolean(true)),
                    "false" | "0" | "no" => Some(Value::Boolean(false)),
                    _ => None,
                },
                _ => None,
            },
            ColumnType::Date => match self {
                Value::Date(_) => Some(self.clone()),
                Value::DateTime(dt) => Some(Value::Date(dt.date())),
                Value::Text(s) => parse_date(s.trim()).map(Value::Date),
                _ => None,
            },
            ColumnType::DateTime => match self {
                Value::DateTime(_) => Some(self.clone()),
                Value::Date(d) => d.and_hms_opt(0, 0, 0).map(Value::DateTime),
                Value::Text(s) => parse_date_time(s.trim()).map(Value::DateTime),
                _ => None,
            },
            ColumnType::Time => match self {
                Value::Time(_) => Some(self.clone()),
                Value::DateTime(dt) => Some(Value::Time(dt.time())),
                Value::Text(s) => parse_time(s.trim()).map(Value::Time),
                _ => None,
            },
        };

        coerced.ok_or_else(|| EngineError::Coercion {
            value: format!("{:?}", self),
            target: kind.to_string(),
        })
    }

    /// Value as bound into a formula scope.
    ///
    /// Dates and times are exposed as ISO text so formulas can compare and
    /// concatenate them.
    pub fn to_dynamic(&self) -> Dynamic {
        match self {
            Value::Null => Dynamic::UNIT,
            Value::Boolean(b) => Dynamic::from(*b),
            Value::Integer(n) => Dynamic::from(*n as INT),
            Value::Decimal(n) => Dynamic::from(*n as FLOAT),
            Value::Text(s) => Dynamic::from(s.clone()),
            other => Dynamic::from(other.to_string()),
        }
    }

    /// Convert an evaluation result back into a value.
    ///
    /// Non-finite numbers (for example `x / 0.0`) are treated as errors.
    pub fn from_dynamic(value: Dynamic) -> Result<Value> {
        if value.is_unit() {
            return Ok(Value::Null);
        }
        if let Ok(b) = value.as_bool() {
            return Ok(Value::Boolean(b));
        }
        if let Ok(n) = value.as_int() {
            return Ok(Value::Integer(n as i64));
        }
        if let Ok(n) = value.as_float() {
            if !n.is_finite() {
                return Err(EngineError::Eval(format!("non-finite result {}", n)));
            }
            return Ok(Value::Decimal(n as f64));
        }
        if let Ok(c) = value.as_char() {
            return Ok(Value::Text(c.to_string()));
        }
        let type_name = value.type_name();
        value
            .into_string()
            .map(Value::Text)
            .map_err(|_| EngineError::Eval(format!("unsupported result type {}", type_name)))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Decimal(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Time(t) => {
                if t.nanosecond() == 0 {
                    write!(f, "{}", t.format("%H:%M:%S"))
                } else {
                    write!(f, "{}", t.format("%H:%M:%S%.f"))
                }
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Decimal(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

fn round_to_i64(n: f64) -> Option<i64> {
    let rounded = n.round();
    if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded <= i64::MAX as f64 {
        Some(rounded as i64)
    } else {
        None
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| parse_date_time(s).map(|dt| dt.date()))
}

fn parse_date_time(s: &str) -> Option<NaiveDateTime> {
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
        .or_else(|| parse_date_time(s).map(|dt| dt.time()))
}
