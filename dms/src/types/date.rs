// Date parsing with a pinned grammar, plus the two-bound interval type

use crate::error::{DmsError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Naive date-time layouts, interpreted as UTC.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Date-only layouts, resolved to midnight UTC.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Parse a textual date into its canonical UTC timestamp.
///
/// Formats are tried in a fixed order: RFC 3339, RFC 2822, the naive
/// date-time layouts and finally the date-only layouts. Calendar-impossible
/// dates (`2024-02-30`) are rejected by every layout.
pub fn parse_date(input: &str) -> Result<DateTime<Utc>> {
    let text = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            if let Some(naive) = date.and_hms_opt(0, 0, 0) {
                return Ok(naive.and_utc());
            }
        }
    }

    Err(DmsError::InvalidValue(format!(
        "'{input}' is not matching any formats of date"
    )))
}

/// Canonical textual form: RFC 3339, `Z` suffix, fractional seconds only when present.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse a raw JSON value as a date. Only strings are date-like.
pub fn parse_date_value(value: &serde_json::Value) -> Result<DateTime<Utc>> {
    match value.as_str() {
        Some(text) => parse_date(text),
        None => Err(DmsError::InvalidValue(format!(
            "expected date string, got {}",
            super::json_type_name(value)
        ))),
    }
}

/// A pair of timestamps. No ordering is imposed between the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateInterval {
    #[serde(serialize_with = "serialize_bound", deserialize_with = "deserialize_bound")]
    pub start_date: DateTime<Utc>,
    #[serde(serialize_with = "serialize_bound", deserialize_with = "deserialize_bound")]
    pub end_date: DateTime<Utc>,
}

impl DateInterval {
    pub fn new(start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        DateInterval {
            start_date,
            end_date,
        }
    }

    /// Build an interval from two textual bounds, each parsed independently.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start_date = parse_date(start)
            .map_err(|e| DmsError::InvalidValue(format!("interval start: {e}")))?;
        let end_date =
            parse_date(end).map_err(|e| DmsError::InvalidValue(format!("interval end: {e}")))?;
        Ok(DateInterval::new(start_date, end_date))
    }

    /// Decompose a raw value into its two bounds.
    ///
    /// Accepts `{"start_date": .., "end_date": ..}` or a two-element array.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let (start, end) = match value {
            serde_json::Value::Object(map) => {
                if map.len() != 2 {
                    return Err(DmsError::InvalidValue(
                        "date interval must have exactly 'start_date' and 'end_date'".into(),
                    ));
                }
                match (map.get("start_date"), map.get("end_date")) {
                    (Some(start), Some(end)) => (start, end),
                    _ => {
                        return Err(DmsError::InvalidValue(
                            "date interval must have exactly 'start_date' and 'end_date'".into(),
                        ))
                    }
                }
            }
            serde_json::Value::Array(bounds) if bounds.len() == 2 => (&bounds[0], &bounds[1]),
            other => {
                return Err(DmsError::InvalidValue(format!(
                    "expected date interval, got {}",
                    super::json_type_name(other)
                )))
            }
        };

        let start_date = parse_date_value(start)
            .map_err(|e| DmsError::InvalidValue(format!("interval start: {e}")))?;
        let end_date = parse_date_value(end)
            .map_err(|e| DmsError::InvalidValue(format!("interval end: {e}")))?;
        Ok(DateInterval::new(start_date, end_date))
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "start_date": format_date(&self.start_date),
            "end_date": format_date(&self.end_date),
        })
    }
}

fn serialize_bound<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_date(date))
}

fn deserialize_bound<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error> {
    let text = String::deserialize(deserializer)?;
    parse_date(&text).map_err(serde::de::Error::custom)
}
