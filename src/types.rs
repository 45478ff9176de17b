use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::tsv;

/// Settings sent as query-string parameters, e.g. `max_execution_time`.
pub type Settings = BTreeMap<String, String>;

/// Values that can be stored in a record field.
///
/// ```rust
/// use clickhouse_middleware::prelude::*;
///
/// let values = vec![
///     FieldValue::Int(1),
///     FieldValue::String("alice".into()),
///     FieldValue::Bool(true),
/// ];
/// # let _ = values;
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    /// NULL, only meaningful for `Nullable` fields
    #[default]
    Null,
    /// Signed integer (`Int8` .. `Int64`)
    Int(i64),
    /// Unsigned integer (`UInt8` .. `UInt64`)
    UInt(u64),
    /// Floating point (`Float32`, `Float64`)
    Float(f64),
    /// Boolean
    Bool(bool),
    /// Text; also carries `FixedString`, `UUID`, `Decimal` and `Enum` values
    String(String),
    /// Calendar date
    Date(NaiveDate),
    /// Point in time, normalized to UTC
    DateTime(DateTime<Utc>),
    /// Array of values of one element type
    Array(Vec<FieldValue>),
}

impl FieldValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(value) => Some(*value),
            FieldValue::UInt(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            FieldValue::UInt(value) => Some(*value),
            FieldValue::Int(value) => u64::try_from(*value).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let FieldValue::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(value) => Some(*value),
            FieldValue::Int(1) | FieldValue::UInt(1) => Some(true),
            FieldValue::Int(0) | FieldValue::UInt(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let FieldValue::String(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(value) => Some(*value),
            FieldValue::DateTime(value) => Some(value.date_naive()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        if let FieldValue::DateTime(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[FieldValue]> {
        if let FieldValue::Array(values) = self {
            Some(values)
        } else {
            None
        }
    }

    /// Render as a SQL literal, e.g. for a `WHERE` clause or a `DEFAULT`.
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            FieldValue::Null => "NULL".to_string(),
            FieldValue::Int(value) => value.to_string(),
            FieldValue::UInt(value) => value.to_string(),
            FieldValue::Float(value) => format_float(*value),
            FieldValue::Bool(value) => value.to_string(),
            FieldValue::String(value) => tsv::quote(value),
            FieldValue::Date(value) => format!("'{}'", value.format("%Y-%m-%d")),
            FieldValue::DateTime(value) => value.timestamp().to_string(),
            FieldValue::Array(values) => {
                let items: Vec<String> = values.iter().map(FieldValue::to_sql_literal).collect();
                format!("[{}]", items.join(","))
            }
        }
    }
}

pub(crate) fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        value.to_string()
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::UInt(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::UInt(u64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::DateTime(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(values: Vec<T>) -> Self {
        FieldValue::Array(values.into_iter().map(Into::into).collect())
    }
}

/// Line format of an insert body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertFormat {
    /// Values in field order, tab separated
    TabSeparated,
    /// `name=value` pairs; fields left out get their server-side default
    Tskv,
}

impl InsertFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            InsertFormat::TabSeparated => "TabSeparated",
            InsertFormat::Tskv => "TSKV",
        }
    }
}
