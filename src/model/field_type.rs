use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::ClickhouseDbError;
use crate::tsv::{self, ArrayElement, NULL_FIELD};
use crate::types::{FieldValue, format_float};

/// A column type as ClickHouse spells it in `DESCRIBE` output and response headers.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
    String,
    FixedString(usize),
    Date,
    /// `DateTime` or `DateTime('Zone/Name')`; without a zone, the server's applies.
    DateTime(Option<Tz>),
    Uuid,
    Decimal { precision: u8, scale: u8 },
    Enum8(Vec<(String, i16)>),
    Enum16(Vec<(String, i16)>),
    Nullable(Box<FieldType>),
    LowCardinality(Box<FieldType>),
    Array(Box<FieldType>),
    /// Any other type; values travel as their raw text.
    Other(String),
}

fn wrapped<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    text.strip_prefix(name)?.strip_prefix('(')?.strip_suffix(')')
}

fn parse_error(what: impl fmt::Display) -> ClickhouseDbError {
    ClickhouseDbError::ParseError(what.to_string())
}

impl FieldType {
    /// Parse a type name such as `Array(Nullable(String))` or `DateTime('UTC')`.
    ///
    /// # Errors
    /// Returns `ParseError` for malformed arguments (bad `FixedString` length, unknown time zone,
    /// broken enum list). Unknown type names are not an error; they become [`FieldType::Other`].
    pub fn parse(text: &str) -> Result<FieldType, ClickhouseDbError> {
        let text = text.trim();
        if let Some(inner) = wrapped(text, "Nullable") {
            return Ok(FieldType::Nullable(Box::new(FieldType::parse(inner)?)));
        }
        if let Some(inner) = wrapped(text, "LowCardinality") {
            return Ok(FieldType::LowCardinality(Box::new(FieldType::parse(inner)?)));
        }
        if let Some(inner) = wrapped(text, "Array") {
            return Ok(FieldType::Array(Box::new(FieldType::parse(inner)?)));
        }
        if let Some(len) = wrapped(text, "FixedString") {
            let len = len
                .trim()
                .parse::<usize>()
                .map_err(|_| parse_error(format!("invalid FixedString length in {text:?}")))?;
            return Ok(FieldType::FixedString(len));
        }
        if let Some(zone) = wrapped(text, "DateTime") {
            let zone = zone.trim().trim_matches('\'');
            let tz = zone
                .parse::<Tz>()
                .map_err(|_| parse_error(format!("unknown time zone {zone:?}")))?;
            return Ok(FieldType::DateTime(Some(tz)));
        }
        if let Some(args) = wrapped(text, "Decimal") {
            let mut parts = args.split(',').map(|part| part.trim().parse::<u8>());
            if let (Some(Ok(precision)), Some(Ok(scale)), None) =
                (parts.next(), parts.next(), parts.next())
            {
                return Ok(FieldType::Decimal { precision, scale });
            }
            return Err(parse_error(format!("invalid Decimal arguments in {text:?}")));
        }
        if let Some(entries) = wrapped(text, "Enum8") {
            return Ok(FieldType::Enum8(parse_enum_entries(entries)?));
        }
        if let Some(entries) = wrapped(text, "Enum16") {
            return Ok(FieldType::Enum16(parse_enum_entries(entries)?));
        }

        Ok(match text {
            "Int8" => FieldType::Int8,
            "Int16" => FieldType::Int16,
            "Int32" => FieldType::Int32,
            "Int64" => FieldType::Int64,
            "UInt8" => FieldType::UInt8,
            "UInt16" => FieldType::UInt16,
            "UInt32" => FieldType::UInt32,
            "UInt64" => FieldType::UInt64,
            "Float32" => FieldType::Float32,
            "Float64" => FieldType::Float64,
            "Bool" | "Boolean" => FieldType::Bool,
            "String" => FieldType::String,
            "Date" => FieldType::Date,
            "DateTime" => FieldType::DateTime(None),
            "UUID" => FieldType::Uuid,
            other => FieldType::Other(other.to_string()),
        })
    }

    /// Type name for DDL. `LowCardinality` is dropped on servers that predate it.
    #[must_use]
    pub fn sql_name(&self, low_cardinality_support: bool) -> String {
        match self {
            FieldType::Int8 => "Int8".into(),
            FieldType::Int16 => "Int16".into(),
            FieldType::Int32 => "Int32".into(),
            FieldType::Int64 => "Int64".into(),
            FieldType::UInt8 => "UInt8".into(),
            FieldType::UInt16 => "UInt16".into(),
            FieldType::UInt32 => "UInt32".into(),
            FieldType::UInt64 => "UInt64".into(),
            FieldType::Float32 => "Float32".into(),
            FieldType::Float64 => "Float64".into(),
            FieldType::Bool => "Bool".into(),
            FieldType::String => "String".into(),
            FieldType::FixedString(len) => format!("FixedString({len})"),
            FieldType::Date => "Date".into(),
            FieldType::DateTime(None) => "DateTime".into(),
            FieldType::DateTime(Some(tz)) => format!("DateTime('{}')", tz.name()),
            FieldType::Uuid => "UUID".into(),
            FieldType::Decimal { precision, scale } => format!("Decimal({precision}, {scale})"),
            FieldType::Enum8(entries) => format!("Enum8({})", render_enum_entries(entries)),
            FieldType::Enum16(entries) => format!("Enum16({})", render_enum_entries(entries)),
            FieldType::Nullable(inner) => {
                format!("Nullable({})", inner.sql_name(low_cardinality_support))
            }
            FieldType::LowCardinality(inner) if low_cardinality_support => {
                format!("LowCardinality({})", inner.sql_name(true))
            }
            FieldType::LowCardinality(inner) => inner.sql_name(false),
            FieldType::Array(inner) => format!("Array({})", inner.sql_name(low_cardinality_support)),
            FieldType::Other(name) => name.clone(),
        }
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        match self {
            FieldType::Nullable(_) => true,
            FieldType::LowCardinality(inner) => inner.is_nullable(),
            _ => false,
        }
    }

    /// Value a field holds when nothing was assigned to it.
    #[must_use]
    pub fn default_value(&self) -> FieldValue {
        match self {
            FieldType::Int8 | FieldType::Int16 | FieldType::Int32 | FieldType::Int64 => {
                FieldValue::Int(0)
            }
            FieldType::UInt8 | FieldType::UInt16 | FieldType::UInt32 | FieldType::UInt64 => {
                FieldValue::UInt(0)
            }
            FieldType::Float32 | FieldType::Float64 => FieldValue::Float(0.0),
            FieldType::Bool => FieldValue::Bool(false),
            FieldType::String | FieldType::FixedString(_) | FieldType::Other(_) => {
                FieldValue::String(String::new())
            }
            FieldType::Uuid => FieldValue::String("00000000-0000-0000-0000-000000000000".into()),
            FieldType::Decimal { .. } => FieldValue::String("0".into()),
            FieldType::Enum8(entries) | FieldType::Enum16(entries) => FieldValue::String(
                entries.first().map(|(name, _)| name.clone()).unwrap_or_default(),
            ),
            FieldType::Date => FieldValue::Date(NaiveDate::default()),
            FieldType::DateTime(_) => FieldValue::DateTime(DateTime::<Utc>::UNIX_EPOCH),
            FieldType::Nullable(_) => FieldValue::Null,
            FieldType::LowCardinality(inner) => inner.default_value(),
            FieldType::Array(_) => FieldValue::Array(Vec::new()),
        }
    }

    /// Decode one raw (still escaped) TabSeparated field.
    ///
    /// `tz` is the server time zone, used for `DateTime` columns without their own zone.
    ///
    /// # Errors
    /// Returns `ParseError` if the text does not fit the type.
    pub fn decode(&self, raw: &str, tz: Tz) -> Result<FieldValue, ClickhouseDbError> {
        match self {
            FieldType::Nullable(_) if raw == NULL_FIELD => Ok(FieldValue::Null),
            FieldType::Nullable(inner) | FieldType::LowCardinality(inner) => inner.decode(raw, tz),
            FieldType::Array(inner) => tsv::parse_array(raw)?
                .iter()
                .map(|element| inner.decode_element(element, tz))
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::Array),
            _ => self.parse_text(&tsv::unescape(raw)?, tz),
        }
    }

    fn decode_element(&self, element: &ArrayElement, tz: Tz) -> Result<FieldValue, ClickhouseDbError> {
        match (self, element) {
            (FieldType::Nullable(_), ArrayElement::Bare(text)) if text == "NULL" => {
                Ok(FieldValue::Null)
            }
            (FieldType::Nullable(inner) | FieldType::LowCardinality(inner), _) => {
                inner.decode_element(element, tz)
            }
            (FieldType::Array(inner), ArrayElement::Bare(text)) => tsv::parse_array(text)?
                .iter()
                .map(|nested| inner.decode_element(nested, tz))
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::Array),
            (FieldType::Array(_), ArrayElement::Quoted(text)) => {
                Err(parse_error(format!("expected nested array, got {text:?}")))
            }
            (_, ArrayElement::Quoted(text) | ArrayElement::Bare(text)) => self.parse_text(text, tz),
        }
    }

    fn parse_text(&self, text: &str, tz: Tz) -> Result<FieldValue, ClickhouseDbError> {
        let mismatch = || parse_error(format!("cannot parse {text:?} as {self}"));
        match self {
            FieldType::Int8
            | FieldType::Int16
            | FieldType::Int32
            | FieldType::Int64
            | FieldType::UInt8
            | FieldType::UInt16
            | FieldType::UInt32
            | FieldType::UInt64 => {
                let value = text.trim().parse::<i128>().map_err(|_| mismatch())?;
                self.checked_int(value)
            }
            FieldType::Float32 | FieldType::Float64 => text
                .trim()
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|_| mismatch()),
            FieldType::Bool => match text.trim() {
                "true" | "1" => Ok(FieldValue::Bool(true)),
                "false" | "0" => Ok(FieldValue::Bool(false)),
                _ => Err(mismatch()),
            },
            FieldType::String | FieldType::Uuid | FieldType::Decimal { .. } | FieldType::Other(_) => {
                Ok(FieldValue::String(text.to_string()))
            }
            FieldType::FixedString(_) => Ok(FieldValue::String(text.trim_end_matches('\0').to_string())),
            FieldType::Enum8(entries) | FieldType::Enum16(entries) => {
                if entries.iter().any(|(name, _)| name == text) {
                    Ok(FieldValue::String(text.to_string()))
                } else {
                    Err(mismatch())
                }
            }
            FieldType::Date => {
                if text == "0000-00-00" {
                    return Ok(FieldValue::Date(NaiveDate::default()));
                }
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .map(FieldValue::Date)
                    .map_err(|_| mismatch())
            }
            FieldType::DateTime(zone) => {
                if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
                    let secs = text.parse::<i64>().map_err(|_| mismatch())?;
                    return DateTime::<Utc>::from_timestamp(secs, 0)
                        .map(FieldValue::DateTime)
                        .ok_or_else(mismatch);
                }
                if text.starts_with("0000-00-00") {
                    return Ok(FieldValue::DateTime(DateTime::<Utc>::UNIX_EPOCH));
                }
                let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                    .map_err(|_| mismatch())?;
                zone.unwrap_or(tz)
                    .from_local_datetime(&naive)
                    .earliest()
                    .map(|local| FieldValue::DateTime(local.with_timezone(&Utc)))
                    .ok_or_else(mismatch)
            }
            FieldType::Nullable(inner) | FieldType::LowCardinality(inner) => inner.parse_text(text, tz),
            FieldType::Array(_) => Err(mismatch()),
        }
    }

    fn int_bounds(&self) -> Option<(i128, i128)> {
        Some(match self {
            FieldType::Int8 => (i128::from(i8::MIN), i128::from(i8::MAX)),
            FieldType::Int16 => (i128::from(i16::MIN), i128::from(i16::MAX)),
            FieldType::Int32 => (i128::from(i32::MIN), i128::from(i32::MAX)),
            FieldType::Int64 => (i128::from(i64::MIN), i128::from(i64::MAX)),
            FieldType::UInt8 => (0, i128::from(u8::MAX)),
            FieldType::UInt16 => (0, i128::from(u16::MAX)),
            FieldType::UInt32 => (0, i128::from(u32::MAX)),
            FieldType::UInt64 => (0, i128::from(u64::MAX)),
            _ => return None,
        })
    }

    fn checked_int(&self, value: i128) -> Result<FieldValue, ClickhouseDbError> {
        let Some((min, max)) = self.int_bounds() else {
            return Err(parse_error(format!("{self} is not an integer type")));
        };
        if value < min || value > max {
            return Err(ClickhouseDbError::ValidationError(format!(
                "{value} is out of range for {self}"
            )));
        }
        let unsigned = matches!(
            self,
            FieldType::UInt8 | FieldType::UInt16 | FieldType::UInt32 | FieldType::UInt64
        );
        if unsigned {
            u64::try_from(value).map(FieldValue::UInt).map_err(|_| parse_error(value))
        } else {
            i64::try_from(value).map(FieldValue::Int).map_err(|_| parse_error(value))
        }
    }

    /// Append the TabSeparated form of `value` to `out`.
    ///
    /// # Errors
    /// Returns `ValidationError` if the value does not fit the type.
    pub fn encode(&self, value: &FieldValue, out: &mut String) -> Result<(), ClickhouseDbError> {
        match (self, value) {
            (FieldType::Nullable(_), FieldValue::Null) => {
                out.push_str(NULL_FIELD);
                Ok(())
            }
            (FieldType::Nullable(inner) | FieldType::LowCardinality(inner), _) => {
                inner.encode(value, out)
            }
            (FieldType::Array(_), FieldValue::Array(_)) => self.encode_element(value, out),
            _ => {
                let text = self.scalar_text(value)?;
                out.push_str(&tsv::escape(&text));
                Ok(())
            }
        }
    }

    fn encode_element(&self, value: &FieldValue, out: &mut String) -> Result<(), ClickhouseDbError> {
        match (self, value) {
            (FieldType::Nullable(_), FieldValue::Null) => {
                out.push_str("NULL");
                Ok(())
            }
            (FieldType::Nullable(inner) | FieldType::LowCardinality(inner), _) => {
                inner.encode_element(value, out)
            }
            (FieldType::Array(inner), FieldValue::Array(items)) => {
                out.push('[');
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        out.push(',');
                    }
                    inner.encode_element(item, out)?;
                }
                out.push(']');
                Ok(())
            }
            _ => {
                let text = self.scalar_text(value)?;
                if self.quoted_in_arrays() {
                    out.push_str(&tsv::quote(&text));
                } else {
                    out.push_str(&text);
                }
                Ok(())
            }
        }
    }

    fn quoted_in_arrays(&self) -> bool {
        matches!(
            self,
            FieldType::String
                | FieldType::FixedString(_)
                | FieldType::Uuid
                | FieldType::Enum8(_)
                | FieldType::Enum16(_)
                | FieldType::Date
                | FieldType::Other(_)
        )
    }

    fn scalar_text(&self, value: &FieldValue) -> Result<String, ClickhouseDbError> {
        let mismatch = || {
            ClickhouseDbError::ValidationError(format!("value {value:?} does not fit {self}"))
        };
        match (self, value) {
            (_, FieldValue::Int(v)) if self.int_bounds().is_some() => {
                self.checked_int(i128::from(*v)).map(|_| v.to_string())
            }
            (_, FieldValue::UInt(v)) if self.int_bounds().is_some() => {
                self.checked_int(i128::from(*v)).map(|_| v.to_string())
            }
            (FieldType::Float32 | FieldType::Float64, FieldValue::Float(v)) => Ok(format_float(*v)),
            (FieldType::Float32 | FieldType::Float64, FieldValue::Int(v)) => Ok(v.to_string()),
            (FieldType::Float32 | FieldType::Float64, FieldValue::UInt(v)) => Ok(v.to_string()),
            (FieldType::Bool, FieldValue::Bool(v)) => Ok(v.to_string()),
            (
                FieldType::String
                | FieldType::FixedString(_)
                | FieldType::Uuid
                | FieldType::Decimal { .. }
                | FieldType::Other(_),
                FieldValue::String(v),
            ) => Ok(v.clone()),
            (FieldType::Enum8(entries) | FieldType::Enum16(entries), FieldValue::String(v)) => {
                if entries.iter().any(|(name, _)| name == v) {
                    Ok(v.clone())
                } else {
                    Err(mismatch())
                }
            }
            (FieldType::Decimal { .. }, FieldValue::Float(v)) => Ok(format_float(*v)),
            (FieldType::Date, FieldValue::Date(d)) => Ok(d.format("%Y-%m-%d").to_string()),
            (FieldType::Date, FieldValue::DateTime(dt)) => {
                Ok(dt.date_naive().format("%Y-%m-%d").to_string())
            }
            (FieldType::DateTime(_), FieldValue::DateTime(dt)) => Ok(dt.timestamp().to_string()),
            (FieldType::DateTime(_), FieldValue::Date(d)) => Ok(d
                .and_hms_opt(0, 0, 0)
                .map(|midnight| midnight.and_utc().timestamp())
                .unwrap_or_default()
                .to_string()),
            _ => Err(mismatch()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql_name(true))
    }
}

fn render_enum_entries(entries: &[(String, i16)]) -> String {
    entries
        .iter()
        .map(|(name, value)| format!("{} = {value}", tsv::quote(name)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_enum_entries(text: &str) -> Result<Vec<(String, i16)>, ClickhouseDbError> {
    let invalid = || parse_error(format!("invalid enum definition: {text:?}"));
    let mut entries = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        let body = rest.strip_prefix('\'').ok_or_else(invalid)?;
        let mut end = None;
        let mut escaped = false;
        for (idx, c) in body.char_indices() {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '\'' => {
                    end = Some(idx);
                    break;
                }
                _ => {}
            }
        }
        let end = end.ok_or_else(invalid)?;
        let name = tsv::unescape(&body[..end])?.into_owned();
        let after = body[end + 1..].trim_start().strip_prefix('=').ok_or_else(invalid)?;
        let (number, remainder) = match after.find(',') {
            Some(comma) => (&after[..comma], &after[comma + 1..]),
            None => (after, ""),
        };
        let value = number.trim().parse::<i16>().map_err(|_| invalid())?;
        entries.push((name, value));
        rest = remainder.trim_start();
    }
    Ok(entries)
}
