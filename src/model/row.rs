use std::borrow::Cow;
use std::sync::Arc;

use chrono_tz::Tz;

use crate::capabilities::ServerCapabilities;
use crate::error::ClickhouseDbError;
use crate::tsv;
use crate::types::{FieldValue, InsertFormat};

use super::schema::{FieldDefault, ModelSchema};

/// A record of a schema known only at runtime.
///
/// Rows are what `select_rows` yields and what ad-hoc inserts consume.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: Arc<ModelSchema>,
    values: Vec<FieldValue>,
}

impl Row {
    /// A row with every field at its initial value.
    #[must_use]
    pub fn new(schema: Arc<ModelSchema>) -> Self {
        let values = schema.fields().iter().map(|field| field.initial_value()).collect();
        Self { schema, values }
    }

    /// # Errors
    /// Returns `ValidationError` if the number of values differs from the number of fields.
    pub fn from_values(
        schema: Arc<ModelSchema>,
        values: Vec<FieldValue>,
    ) -> Result<Self, ClickhouseDbError> {
        if values.len() != schema.fields().len() {
            return Err(ClickhouseDbError::ValidationError(format!(
                "{} expects {} values, got {}",
                schema.table_name(),
                schema.fields().len(),
                values.len()
            )));
        }
        Ok(Self { schema, values })
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    #[must_use]
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<FieldValue> {
        self.values
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.schema.field_index(name).and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&FieldValue> {
        self.values.get(index)
    }

    /// Take a value out of the row, leaving `Null` behind.
    pub fn take(&mut self, name: &str) -> Option<FieldValue> {
        let idx = self.schema.field_index(name)?;
        self.values.get_mut(idx).map(std::mem::take)
    }

    /// # Errors
    /// Returns `ValidationError` for a field the schema does not have.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), ClickhouseDbError> {
        let idx = self.schema.field_index(name).ok_or_else(|| {
            ClickhouseDbError::ValidationError(format!(
                "{} has no field {name}",
                self.schema.table_name()
            ))
        })?;
        self.values[idx] = value.into();
        Ok(())
    }
}

/// Anything that can be written by `insert`.
pub trait Record: Send + 'static {
    /// The record-kind this record belongs to.
    fn record_schema(&self) -> Arc<ModelSchema>;

    /// One value per schema field, in schema order.
    fn field_values(&self) -> Cow<'_, [FieldValue]>;

    /// Append this record as one line of an insert body.
    ///
    /// `caps` describes the connection the line is written for; the default encoding does
    /// not depend on it since `DateTime` values travel as unix timestamps.
    ///
    /// # Errors
    /// Returns `ValidationError` if a value does not fit its field.
    fn write_line(
        &self,
        format: InsertFormat,
        _caps: &ServerCapabilities,
        out: &mut Vec<u8>,
    ) -> Result<(), ClickhouseDbError> {
        encode_line(&self.record_schema(), &self.field_values(), format, out)
    }
}

/// A statically known record-kind mapped onto a Rust type.
pub trait Model: Sized + Send + 'static {
    fn schema() -> Arc<ModelSchema>;

    /// One value per schema field, in schema order.
    fn to_values(&self) -> Vec<FieldValue>;

    /// # Errors
    /// Returns an error if a value is missing or of the wrong kind.
    fn from_row(row: Row) -> Result<Self, ClickhouseDbError>;
}

impl<M: Model> Record for M {
    fn record_schema(&self) -> Arc<ModelSchema> {
        M::schema()
    }

    fn field_values(&self) -> Cow<'_, [FieldValue]> {
        Cow::Owned(self.to_values())
    }
}

impl Record for Row {
    fn record_schema(&self) -> Arc<ModelSchema> {
        Arc::clone(&self.schema)
    }

    fn field_values(&self) -> Cow<'_, [FieldValue]> {
        Cow::Borrowed(&self.values)
    }
}

/// Encode one record as a line of `format`, including the trailing newline.
///
/// # Errors
/// Returns `ValidationError` on a value count mismatch or a value that does not fit its field.
pub fn encode_line(
    schema: &ModelSchema,
    values: &[FieldValue],
    format: InsertFormat,
    out: &mut Vec<u8>,
) -> Result<(), ClickhouseDbError> {
    if values.len() != schema.fields().len() {
        return Err(ClickhouseDbError::ValidationError(format!(
            "{} expects {} values, got {}",
            schema.table_name(),
            schema.fields().len(),
            values.len()
        )));
    }

    let mut line = String::new();
    let mut first = true;
    for (field, value) in schema.fields().iter().zip(values) {
        if !field.is_writable() {
            continue;
        }
        if format == InsertFormat::Tskv
            && value.is_null()
            && !field.field_type.is_nullable()
            && matches!(field.default, FieldDefault::Expression(_))
        {
            // left out so the server evaluates the default expression
            continue;
        }
        if !first {
            line.push('\t');
        }
        first = false;
        if format == InsertFormat::Tskv {
            line.push_str(&tsv::escape_key(&field.name));
            line.push('=');
        }
        field.field_type.encode(value, &mut line)?;
    }
    line.push('\n');
    out.extend_from_slice(line.as_bytes());
    Ok(())
}

/// Turns data lines of a response into rows of one schema.
///
/// Built once from the header; maps each response column onto a schema field.
#[derive(Debug, Clone)]
pub struct LineDecoder {
    schema: Arc<ModelSchema>,
    columns: Vec<usize>,
    timezone: Tz,
}

impl LineDecoder {
    /// # Errors
    /// Returns `ParseError` for a response column the schema has no field for.
    pub fn new(
        schema: Arc<ModelSchema>,
        field_names: &[String],
        timezone: Tz,
    ) -> Result<Self, ClickhouseDbError> {
        let columns = field_names
            .iter()
            .map(|name| {
                schema.field_index(name).ok_or_else(|| {
                    ClickhouseDbError::ParseError(format!(
                        "{} has no field for column {name}",
                        schema.table_name()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            schema,
            columns,
            timezone,
        })
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// # Errors
    /// Returns `ParseError` on a wrong column count or a value that does not parse.
    pub fn decode(&self, line: &str) -> Result<Row, ClickhouseDbError> {
        let raw = tsv::split_line(line);
        if raw.len() != self.columns.len() {
            return Err(ClickhouseDbError::ParseError(format!(
                "expected {} columns, got {} in line {line:?}",
                self.columns.len(),
                raw.len()
            )));
        }
        let mut row = Row::new(Arc::clone(&self.schema));
        let fields = self.schema.fields();
        for (&idx, text) in self.columns.iter().zip(raw) {
            row.values[idx] = fields[idx].field_type.decode(text, self.timezone)?;
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::model::{FieldDef, FieldType};

    fn all_types() -> Arc<ModelSchema> {
        let mut schema = ModelSchema::new("everything");
        for (name, ty) in [
            ("i8", "Int8"),
            ("i16", "Int16"),
            ("i32", "Int32"),
            ("i64", "Int64"),
            ("u8", "UInt8"),
            ("u16", "UInt16"),
            ("u32", "UInt32"),
            ("u64", "UInt64"),
            ("f32", "Float32"),
            ("f64", "Float64"),
            ("flag", "Bool"),
            ("text", "String"),
            ("fixed", "FixedString(4)"),
            ("day", "Date"),
            ("at", "DateTime"),
            ("at_zoned", "DateTime('Europe/Berlin')"),
            ("id", "UUID"),
            ("price", "Decimal(10, 2)"),
            ("color", "Enum8('red' = 1, 'green' = 2)"),
            ("maybe", "Nullable(Int32)"),
            ("maybe_null", "Nullable(String)"),
            ("label", "LowCardinality(String)"),
            ("tags", "Array(String)"),
            ("matrix", "Array(Array(Int64))"),
            ("optional_items", "Array(Nullable(Float64))"),
            ("point", "Tuple(Int32, String)"),
        ] {
            schema = schema.field(FieldDef::new(name, FieldType::parse(ty).unwrap()));
        }
        Arc::new(schema)
    }

    fn sample_values() -> Vec<FieldValue> {
        vec![
            FieldValue::Int(-8),
            FieldValue::Int(-16_000),
            FieldValue::Int(-2_000_000_000),
            FieldValue::Int(i64::MIN),
            FieldValue::UInt(255),
            FieldValue::UInt(65_535),
            FieldValue::UInt(4_000_000_000),
            FieldValue::UInt(u64::MAX),
            FieldValue::Float(1.5),
            FieldValue::Float(-2.25e-10),
            FieldValue::Bool(true),
            FieldValue::String("tab\there\nnewline 'quote' \\ back".into()),
            FieldValue::String("abcd".into()),
            FieldValue::Date(NaiveDate::from_ymd_opt(2021, 12, 31).unwrap()),
            FieldValue::DateTime(Utc.with_ymd_and_hms(2022, 3, 27, 1, 30, 0).unwrap()),
            FieldValue::DateTime(Utc.with_ymd_and_hms(2022, 10, 30, 0, 30, 0).unwrap()),
            FieldValue::String("c3f1a5e2-0d7b-4a8e-9d32-6f3c2b1a0e9f".into()),
            FieldValue::String("12.34".into()),
            FieldValue::String("green".into()),
            FieldValue::Int(42),
            FieldValue::Null,
            FieldValue::String("low".into()),
            FieldValue::from(vec!["a,b", "it's", ""]),
            FieldValue::Array(vec![
                FieldValue::from(vec![1_i64, 2]),
                FieldValue::Array(vec![]),
            ]),
            FieldValue::Array(vec![FieldValue::Float(0.5), FieldValue::Null]),
            FieldValue::String("(1,'x')".into()),
        ]
    }

    #[test]
    fn round_trips_every_supported_type() {
        let schema = all_types();
        let row = Row::from_values(Arc::clone(&schema), sample_values()).unwrap();

        let mut out = Vec::new();
        row.write_line(InsertFormat::TabSeparated, &ServerCapabilities::default(), &mut out)
            .unwrap();
        let line = String::from_utf8(out).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\t').count(), schema.fields().len() - 1);

        let names: Vec<String> = schema.fields().iter().map(|f| f.name.clone()).collect();
        let decoder = LineDecoder::new(Arc::clone(&schema), &names, Tz::UTC).unwrap();
        let decoded = decoder.decode(line.trim_end_matches('\n')).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn tskv_skips_unset_computed_defaults() {
        let schema = Arc::new(
            ModelSchema::new("t")
                .field(FieldDef::new("id", FieldType::UInt32))
                .field(FieldDef::new("at", FieldType::DateTime(None)).with_default_expr("now()"))
                .field(FieldDef::new("alias", FieldType::UInt32).alias("id * 2")),
        );
        let row = Row::from_values(
            Arc::clone(&schema),
            vec![FieldValue::UInt(7), FieldValue::Null, FieldValue::UInt(14)],
        )
        .unwrap();
        let mut out = Vec::new();
        encode_line(&schema, row.values(), InsertFormat::Tskv, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "id=7\n");
    }

    #[test]
    fn decoder_maps_columns_by_name() {
        let schema = all_types();
        let decoder = LineDecoder::new(
            Arc::clone(&schema),
            &["u8".to_string(), "text".to_string()],
            Tz::UTC,
        )
        .unwrap();
        let row = decoder.decode("9\thello").unwrap();
        assert_eq!(row.get("u8"), Some(&FieldValue::UInt(9)));
        assert_eq!(row.get("text"), Some(&FieldValue::String("hello".into())));
        assert_eq!(row.get("i8"), Some(&FieldValue::Int(0)));
        assert!(decoder.decode("9").is_err());
    }

    #[test]
    fn decoder_rejects_unknown_columns() {
        let err = LineDecoder::new(all_types(), &["nope".to_string()], Tz::UTC).unwrap_err();
        assert!(matches!(err, ClickhouseDbError::ParseError(_)));
    }

    #[test]
    fn set_and_take_values() {
        let mut row = Row::new(all_types());
        row.set("text", "x").unwrap();
        assert_eq!(row.take("text"), Some(FieldValue::String("x".into())));
        assert_eq!(row.get("text"), Some(&FieldValue::Null));
        assert!(row.set("missing", 1_i64).is_err());
    }
}
