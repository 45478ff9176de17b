use std::sync::Arc;

use chrono::NaiveDate;

use crate::engines::{MergeTreeSpec, TableEngine};
use crate::error::ClickhouseDbError;
use crate::model::{FieldDef, FieldType, Model, ModelSchema, Row};
use crate::types::FieldValue;

/// Table that records applied migrations.
pub const HISTORY_TABLE: &str = "clickhouse_orm_migrations";

lazy_static::lazy_static! {
    static ref HISTORY_SCHEMA: Arc<ModelSchema> = Arc::new(
        ModelSchema::new(HISTORY_TABLE)
            .field(FieldDef::new("package_name", FieldType::String))
            .field(FieldDef::new("module_name", FieldType::String))
            .field(FieldDef::new("applied", FieldType::Date))
            .engine(TableEngine::MergeTree(
                MergeTreeSpec::new(["package_name", "module_name"])
                    .partition_by(["toYYYYMM(applied)"]),
            )),
    );
}

/// One applied migration of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationHistory {
    pub package_name: String,
    pub module_name: String,
    pub applied: NaiveDate,
}

fn take_text(row: &mut Row, name: &str) -> Result<String, ClickhouseDbError> {
    match row.take(name) {
        Some(FieldValue::String(text)) => Ok(text),
        other => Err(ClickhouseDbError::ParseError(format!(
            "{name}: expected text, got {other:?}"
        ))),
    }
}

impl Model for MigrationHistory {
    fn schema() -> Arc<ModelSchema> {
        Arc::clone(&HISTORY_SCHEMA)
    }

    fn to_values(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::from(self.package_name.as_str()),
            FieldValue::from(self.module_name.as_str()),
            FieldValue::Date(self.applied),
        ]
    }

    fn from_row(mut row: Row) -> Result<Self, ClickhouseDbError> {
        let package_name = take_text(&mut row, "package_name")?;
        let module_name = take_text(&mut row, "module_name")?;
        let applied = row
            .get("applied")
            .and_then(FieldValue::as_date)
            .ok_or_else(|| ClickhouseDbError::ParseError("applied: expected a date".to_string()))?;
        Ok(Self {
            package_name,
            module_name,
            applied,
        })
    }
}
