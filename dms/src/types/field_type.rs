use super::date::{format_date, parse_date_value, DateInterval};
use super::json_type_name;
use crate::error::{DmsError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Available field types. Each variant owns one validation rule in [`FieldType::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "real")]
    Real,
    #[serde(rename = "char")]
    Char,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "dateInvl")]
    DateInterval,
}

impl FieldType {
    pub const ALL: [FieldType; 6] = [
        FieldType::Integer,
        FieldType::Real,
        FieldType::Char,
        FieldType::String,
        FieldType::Date,
        FieldType::DateInterval,
    ];

    /// Wire name, as used in schema records.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Real => "real",
            FieldType::Char => "char",
            FieldType::String => "string",
            FieldType::Date => "date",
            FieldType::DateInterval => "dateInvl",
        }
    }

    pub fn from_name(name: &str) -> Option<FieldType> {
        FieldType::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Check a raw value against this type and return its canonical form.
    ///
    /// Numbers are never coerced: `3` is not a real and `3.0` is not an integer.
    /// The input is only borrowed.
    pub fn validate(&self, value: &serde_json::Value) -> Result<FieldValue> {
        match self {
            FieldType::Integer => validate_integer(value),
            FieldType::Real => validate_real(value),
            FieldType::Char => validate_char(value),
            FieldType::String => validate_string(value),
            FieldType::Date => parse_date_value(value).map(FieldValue::Date),
            FieldType::DateInterval => DateInterval::from_value(value).map(FieldValue::DateInterval),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn mismatch(expected: FieldType, value: &serde_json::Value) -> DmsError {
    DmsError::InvalidValue(format!(
        "expected {expected}, got {}",
        json_type_name(value)
    ))
}

fn validate_integer(value: &serde_json::Value) -> Result<FieldValue> {
    match value {
        serde_json::Value::Number(n) if !n.is_f64() => n
            .as_i64()
            .map(FieldValue::Integer)
            .ok_or_else(|| DmsError::InvalidValue(format!("integer {n} is out of range"))),
        other => Err(mismatch(FieldType::Integer, other)),
    }
}

fn validate_real(value: &serde_json::Value) -> Result<FieldValue> {
    match value {
        serde_json::Value::Number(n) if n.is_f64() => n
            .as_f64()
            .map(FieldValue::Real)
            .ok_or_else(|| mismatch(FieldType::Real, value)),
        other => Err(mismatch(FieldType::Real, other)),
    }
}

fn validate_char(value: &serde_json::Value) -> Result<FieldValue> {
    let text = value
        .as_str()
        .ok_or_else(|| mismatch(FieldType::Char, value))?;
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(FieldValue::Char(c)),
        _ => Err(DmsError::InvalidValue(format!(
            "expected a single character, got '{text}'"
        ))),
    }
}

fn validate_string(value: &serde_json::Value) -> Result<FieldValue> {
    value
        .as_str()
        .map(|s| FieldValue::String(s.to_string()))
        .ok_or_else(|| mismatch(FieldType::String, value))
}

/// A value that has passed validation for its type.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Real(f64),
    Char(char),
    String(String),
    Date(DateTime<Utc>),
    DateInterval(DateInterval),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Integer(_) => FieldType::Integer,
            FieldValue::Real(_) => FieldType::Real,
            FieldValue::Char(_) => FieldType::Char,
            FieldValue::String(_) => FieldType::String,
            FieldValue::Date(_) => FieldType::Date,
            FieldValue::DateInterval(_) => FieldType::DateInterval,
        }
    }

    /// Canonical JSON form. Dates become RFC 3339 strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Integer(i) => serde_json::Value::from(*i),
            FieldValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Char(c) => serde_json::Value::String(c.to_string()),
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
            FieldValue::Date(d) => serde_json::Value::String(format_date(d)),
            FieldValue::DateInterval(i) => i.to_value(),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
