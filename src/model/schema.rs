use crate::capabilities::ServerCapabilities;
use crate::engines::TableEngine;
use crate::error::ClickhouseDbError;
use crate::types::FieldValue;

use super::field_type::FieldType;

/// Where a field's value comes from when an insert leaves it out.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    /// The type's own zero value
    None,
    /// A constant
    Literal(FieldValue),
    /// `DEFAULT expr`, computed by the server at write time
    Expression(String),
    /// `MATERIALIZED expr`, never written by clients
    Materialized(String),
    /// `ALIAS expr`, not stored at all
    Alias(String),
}

/// One column of a record-kind.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub default: FieldDefault,
    pub codec: Option<String>,
    pub readonly: bool,
}

impl FieldDef {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: FieldDefault::None,
            codec: None,
            readonly: false,
        }
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = FieldDefault::Literal(value.into());
        self
    }

    #[must_use]
    pub fn with_default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = FieldDefault::Expression(expr.into());
        self
    }

    #[must_use]
    pub fn materialized(mut self, expr: impl Into<String>) -> Self {
        self.default = FieldDefault::Materialized(expr.into());
        self
    }

    #[must_use]
    pub fn alias(mut self, expr: impl Into<String>) -> Self {
        self.default = FieldDefault::Alias(expr.into());
        self
    }

    #[must_use]
    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Materialized, alias and read-only fields are never sent on insert.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        !self.readonly
            && !matches!(
                self.default,
                FieldDefault::Materialized(_) | FieldDefault::Alias(_)
            )
    }

    #[must_use]
    pub fn has_computed_default(&self) -> bool {
        matches!(self.default, FieldDefault::Expression(_))
    }

    /// Value of a freshly created record.
    #[must_use]
    pub fn initial_value(&self) -> FieldValue {
        match &self.default {
            FieldDefault::Literal(value) => value.clone(),
            _ => self.field_type.default_value(),
        }
    }

    /// Column definition for `CREATE TABLE` / `ALTER TABLE ADD COLUMN`.
    #[must_use]
    pub fn sql_definition(&self, caps: &ServerCapabilities) -> String {
        let mut sql = format!(
            "`{}` {}",
            self.name,
            self.field_type.sql_name(caps.has_low_cardinality_support)
        );
        match &self.default {
            FieldDefault::None => {}
            FieldDefault::Literal(value) => {
                sql.push_str(&format!(" DEFAULT {}", value.to_sql_literal()));
            }
            FieldDefault::Expression(expr) => sql.push_str(&format!(" DEFAULT {expr}")),
            FieldDefault::Materialized(expr) => sql.push_str(&format!(" MATERIALIZED {expr}")),
            FieldDefault::Alias(expr) => sql.push_str(&format!(" ALIAS {expr}")),
        }
        if let Some(codec) = &self.codec
            && caps.has_codec_support
        {
            sql.push_str(&format!(" CODEC({codec})"));
        }
        sql
    }
}

/// A record-kind: table name, ordered fields, access flags and engine.
///
/// # Examples
/// ```rust
/// use clickhouse_middleware::prelude::*;
///
/// let schema = ModelSchema::new("events")
///     .field(FieldDef::new("id", FieldType::UInt64))
///     .field(FieldDef::new("name", FieldType::String))
///     .engine(TableEngine::MergeTree(MergeTreeSpec::new(["id"])));
/// assert_eq!(schema.writable_fields().count(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSchema {
    table_name: String,
    fields: Vec<FieldDef>,
    engine: Option<TableEngine>,
    system: bool,
    readonly: bool,
    temporary: bool,
}

impl ModelSchema {
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            fields: Vec::new(),
            engine: None,
            system: false,
            readonly: false,
            temporary: false,
        }
    }

    /// Build a schema from `(name, type)` pairs, e.g. from a response header.
    ///
    /// # Errors
    /// Returns `ParseError` if a type name cannot be parsed.
    pub fn ad_hoc<I, N, T>(fields: I, table_name: impl Into<String>) -> Result<Self, ClickhouseDbError>
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: AsRef<str>,
    {
        let mut schema = ModelSchema::new(table_name);
        for (name, type_name) in fields {
            schema
                .fields
                .push(FieldDef::new(name, FieldType::parse(type_name.as_ref())?));
        }
        Ok(schema)
    }

    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn engine(mut self, engine: TableEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Mark as a server-provided `system` table; implies read-only.
    #[must_use]
    pub fn system(mut self) -> Self {
        self.system = true;
        self.readonly = true;
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.readonly = true;
        self
    }

    #[must_use]
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    #[must_use]
    pub fn table_engine(&self) -> Option<&TableEngine> {
        self.engine.as_ref()
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        self.system
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.readonly
    }

    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn writable_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|field| field.is_writable())
    }

    /// Whether inserts must use TSKV so that computed defaults are left to the server.
    #[must_use]
    pub fn has_funcs_as_defaults(&self) -> bool {
        self.fields.iter().any(FieldDef::has_computed_default)
    }

    /// Check that `CREATE TABLE` is possible for this kind, without building it.
    ///
    /// # Errors
    /// `ValidationError` for system kinds, `ConfigError` when no engine is defined.
    pub fn ensure_creatable(&self) -> Result<&TableEngine, ClickhouseDbError> {
        if self.system {
            return Err(ClickhouseDbError::ValidationError(
                "You can't create system table".to_string(),
            ));
        }
        self.engine.as_ref().ok_or_else(|| {
            ClickhouseDbError::ConfigError(format!("{} must define an engine", self.table_name))
        })
    }

    /// # Errors
    /// `ValidationError` for system kinds.
    pub fn ensure_droppable(&self) -> Result<(), ClickhouseDbError> {
        if self.system {
            return Err(ClickhouseDbError::ValidationError(
                "You can't drop system table".to_string(),
            ));
        }
        Ok(())
    }

    /// `CREATE TABLE` statement for this kind inside `db_name`.
    ///
    /// # Errors
    /// See [`ModelSchema::ensure_creatable`].
    pub fn create_table_sql(
        &self,
        db_name: &str,
        caps: &ServerCapabilities,
    ) -> Result<String, ClickhouseDbError> {
        let engine = self.ensure_creatable()?;
        let columns: Vec<String> = self
            .fields
            .iter()
            .map(|field| field.sql_definition(caps))
            .collect();
        let (kind, name) = if self.temporary {
            ("TEMPORARY TABLE", format!("`{}`", self.table_name))
        } else {
            ("TABLE", format!("`{db_name}`.`{}`", self.table_name))
        };
        Ok(format!(
            "CREATE {kind} IF NOT EXISTS {name} ({}) ENGINE = {}",
            columns.join(", "),
            engine.create_table_sql()
        ))
    }

    /// `DROP TABLE` statement for this kind inside `db_name`.
    ///
    /// # Errors
    /// `ValidationError` for system kinds.
    pub fn drop_table_sql(&self, db_name: &str) -> Result<String, ClickhouseDbError> {
        self.ensure_droppable()?;
        if self.temporary {
            Ok(format!("DROP TEMPORARY TABLE IF EXISTS `{}`", self.table_name))
        } else {
            Ok(format!("DROP TABLE IF EXISTS `{db_name}`.`{}`", self.table_name))
        }
    }
}
