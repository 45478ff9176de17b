use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::capabilities::ServerCapabilities;
use crate::database::Database;
use crate::error::ClickhouseDbError;
use crate::model::{FieldDefault, ModelSchema};
use crate::session::QueryOptions;
use crate::tsv;

/// One step of a migration.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Short label used in logs.
    fn describe(&self) -> String;

    /// # Errors
    /// Whatever the step's requests fail with.
    async fn apply(&self, db: &Database) -> Result<(), ClickhouseDbError>;
}

/// Create the kind's table if missing.
#[derive(Debug, Clone)]
pub struct CreateTable(pub Arc<ModelSchema>);

#[async_trait]
impl Operation for CreateTable {
    fn describe(&self) -> String {
        format!("create table {}", self.0.table_name())
    }

    async fn apply(&self, db: &Database) -> Result<(), ClickhouseDbError> {
        db.create_table(&self.0).await
    }
}

#[derive(Debug, Clone)]
pub struct DropTable(pub Arc<ModelSchema>);

#[async_trait]
impl Operation for DropTable {
    fn describe(&self) -> String {
        format!("drop table {}", self.0.table_name())
    }

    async fn apply(&self, db: &Database) -> Result<(), ClickhouseDbError> {
        db.drop_table(&self.0).await
    }
}

/// A live column as reported by `DESCRIBE`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LiveColumn {
    name: String,
    type_name: String,
    default_kind: String,
}

fn default_kind(default: &FieldDefault) -> &'static str {
    match default {
        FieldDefault::None => "",
        FieldDefault::Literal(_) | FieldDefault::Expression(_) => "DEFAULT",
        FieldDefault::Materialized(_) => "MATERIALIZED",
        FieldDefault::Alias(_) => "ALIAS",
    }
}

/// Bring a table in line with its kind: add missing columns after their predecessor,
/// drop columns the kind no longer has, modify columns whose type or default kind changed.
#[derive(Debug, Clone)]
pub struct AlterTable(pub Arc<ModelSchema>);

impl AlterTable {
    async fn live_columns(&self, db: &Database) -> Result<Vec<LiveColumn>, ClickhouseDbError> {
        let query = db
            .substitute("DESCRIBE TABLE $table FORMAT TSV", Some(&self.0))
            .into_owned();
        let text = db.raw(&query, &QueryOptions::default()).await?;
        text.lines()
            .filter(|line| !line.is_empty())
            .map(|line| {
                let mut values = tsv::parse_tsv(line)?.into_iter();
                match (values.next(), values.next()) {
                    (Some(name), Some(type_name)) => Ok(LiveColumn {
                        name,
                        type_name,
                        default_kind: values.next().unwrap_or_default(),
                    }),
                    _ => Err(ClickhouseDbError::ParseError(format!(
                        "unexpected DESCRIBE line {line:?}"
                    ))),
                }
            })
            .collect()
    }

    /// The `ALTER TABLE` statements that turn `live` into the kind's layout.
    fn statements(&self, live: &[LiveColumn], caps: &ServerCapabilities, db: &Database) -> Vec<String> {
        let schema = &self.0;
        let mut statements = Vec::new();
        let mut previous: Option<&str> = None;

        for field in schema.fields() {
            match live.iter().find(|column| column.name == field.name) {
                None => {
                    let position = previous
                        .map_or_else(|| " FIRST".to_string(), |prev| format!(" AFTER `{prev}`"));
                    statements.push(format!(
                        "ALTER TABLE $table ADD COLUMN {}{position}",
                        field.sql_definition(caps)
                    ));
                }
                Some(column) => {
                    let type_name = field.field_type.sql_name(caps.has_low_cardinality_support);
                    if column.type_name != type_name
                        || column.default_kind != default_kind(&field.default)
                    {
                        statements.push(format!(
                            "ALTER TABLE $table MODIFY COLUMN {}",
                            field.sql_definition(caps)
                        ));
                    }
                }
            }
            previous = Some(field.name.as_str());
        }
        for column in live {
            if schema.get_field(&column.name).is_none() {
                statements.push(format!("ALTER TABLE $table DROP COLUMN `{}`", column.name));
            }
        }
        statements
            .into_iter()
            .map(|sql| db.substitute(&sql, Some(schema)).into_owned())
            .collect()
    }
}

#[async_trait]
impl Operation for AlterTable {
    fn describe(&self) -> String {
        format!("alter table {}", self.0.table_name())
    }

    async fn apply(&self, db: &Database) -> Result<(), ClickhouseDbError> {
        self.0.ensure_droppable()?;
        let caps = db.capabilities().await?.clone();
        let live = self.live_columns(db).await?;
        for statement in self.statements(&live, &caps, db) {
            db.raw(&statement, &QueryOptions::default()).await?;
        }
        Ok(())
    }
}

/// Run statements in order. `$db` is substituted.
#[derive(Debug, Clone)]
pub struct RunSql(pub Vec<String>);

impl RunSql {
    #[must_use]
    pub fn new<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(statements.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl Operation for RunSql {
    fn describe(&self) -> String {
        format!("run {} statement(s)", self.0.len())
    }

    async fn apply(&self, db: &Database) -> Result<(), ClickhouseDbError> {
        for statement in &self.0 {
            db.raw(statement, &QueryOptions::default()).await?;
        }
        Ok(())
    }
}

type MigrationFn =
    Box<dyn for<'a> Fn(&'a Database) -> BoxFuture<'a, Result<(), ClickhouseDbError>> + Send + Sync>;

/// Run arbitrary async code against the connection.
///
/// ```rust
/// use clickhouse_middleware::prelude::*;
/// use futures_util::FutureExt;
///
/// let backfill = RunFn::new(|db| {
///     async move {
///         db.raw("INSERT INTO $db.totals SELECT * FROM $db.staging", &QueryOptions::default())
///             .await
///             .map(|_| ())
///     }
///     .boxed()
/// });
/// assert_eq!(backfill.describe(), "run function");
/// ```
pub struct RunFn(MigrationFn);

impl RunFn {
    pub fn new<F>(func: F) -> Self
    where
        F: for<'a> Fn(&'a Database) -> BoxFuture<'a, Result<(), ClickhouseDbError>>
            + Send
            + Sync
            + 'static,
    {
        Self(Box::new(func))
    }
}

impl fmt::Debug for RunFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RunFn").field(&"<fn>").finish()
    }
}

#[async_trait]
impl Operation for RunFn {
    fn describe(&self) -> String {
        "run function".to_string()
    }

    async fn apply(&self, db: &Database) -> Result<(), ClickhouseDbError> {
        (self.0)(db).await
    }
}
