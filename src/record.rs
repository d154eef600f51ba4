use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Cuffdiff's "not available" token.
pub const NA: &str = "-";

pub fn is_na(raw: &str) -> bool {
    raw.trim() == NA
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Real,
}

impl FieldType {
    pub fn sql_type(self) -> &'static str {
        match self {
            FieldType::Text => "TEXT",
            FieldType::Integer => "INTEGER",
            FieldType::Real => "REAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Integer(i64),
    Real(f64),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(value) => Some(*value),
            Value::Integer(value) => Some(*value as f64),
            Value::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(value) => write!(f, "{value}"),
            Value::Integer(value) => write!(f, "{value}"),
            Value::Real(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

/// Parses a raw cell into `ty`. Returns `None` for the NA token, for NaN
/// and for values that do not parse; callers treat all of them as an
/// absent field.
pub fn coerce(ty: FieldType, raw: &str) -> Option<Value> {
    if is_na(raw) {
        return None;
    }
    let trimmed = raw.trim();
    match ty {
        FieldType::Text => Some(Value::Text(trimmed.to_string())),
        FieldType::Integer => match trimmed.parse::<i64>() {
            Ok(value) => Some(Value::Integer(value)),
            Err(_) => match trimmed.parse::<f64>() {
                Ok(value) if value.fract() == 0.0 && value.is_finite() => {
                    Some(Value::Integer(value as i64))
                }
                _ => {
                    tracing::debug!(value = trimmed, "dropping malformed integer");
                    None
                }
            },
        },
        FieldType::Real => match trimmed.parse::<f64>() {
            // SQLite stores NaN as NULL.
            Ok(value) if value.is_nan() => {
                tracing::debug!(value = trimmed, "dropping NaN");
                None
            }
            Ok(value) => Some(Value::Real(value)),
            Err(_) => {
                tracing::debug!(value = trimmed, "dropping malformed number");
                None
            }
        },
    }
}

/// Sparse set of typed fields. Absent fields are simply not present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<&'static str, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: &'static str, value: impl Into<Value>) {
        self.fields.insert(field, value.into());
    }

    pub fn with(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.fields.iter().map(|(name, value)| (*name, value))
    }
}
