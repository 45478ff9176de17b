//! The connection to one database: probe, dispatch, inserts, selects and DDL.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::OnceCell;

use crate::capabilities::ServerCapabilities;
use crate::conditions::{ToConditionSql, where_clause};
use crate::config::DatabaseConfig;
use crate::error::ClickhouseDbError;
use crate::model::ModelSchema;
use crate::session::QueryOptions;
use crate::transport::{ReqwestTransport, Transport};
use crate::tsv;
use crate::types::Settings;

mod dispatch;
mod insert;
mod paginate;
mod probe;
mod select;
mod substitute;

pub use insert::DEFAULT_BATCH_SIZE;
pub use paginate::Page;
pub use select::{AD_HOC_TABLE, ModelStream, RowStream};
pub use substitute::{substitute, table_reference};

/// A client bound to one database on one ClickHouse server.
///
/// Settings and the readonly flag are changed through `&mut self`, so they are fixed
/// while requests are in flight. Everything else takes `&self` and may run concurrently.
pub struct Database {
    config: DatabaseConfig,
    transport: Arc<dyn Transport>,
    settings: Settings,
    db_exists: AtomicBool,
    /// Effective readonly mode; only set by the probe or `set_readonly`
    readonly: AtomicBool,
    /// The server connection is readonly on its own
    connection_readonly: AtomicBool,
    capabilities: OnceCell<ServerCapabilities>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("db_name", &self.config.db_name)
            .field("db_url", &self.config.db_url)
            .field("settings", &self.settings)
            .field("db_exists", &self.db_exists)
            .field("readonly", &self.readonly)
            .field("capabilities", &self.capabilities.get())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// A client over HTTP. Nothing is sent until the first operation or [`Database::init`].
    ///
    /// # Errors
    /// `ConfigError` if the config does not validate.
    pub fn new(config: DatabaseConfig) -> Result<Self, ClickhouseDbError> {
        config.validate()?;
        let transport = ReqwestTransport::from_config(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// A client over a custom transport.
    ///
    /// # Errors
    /// `ConfigError` if the config does not validate.
    pub fn with_transport(
        config: DatabaseConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClickhouseDbError> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            settings: Settings::new(),
            db_exists: AtomicBool::new(false),
            readonly: AtomicBool::new(false),
            connection_readonly: AtomicBool::new(false),
            capabilities: OnceCell::new(),
        })
    }

    /// [`Database::new`] followed by [`Database::init`].
    ///
    /// # Errors
    /// Any error of either step.
    pub async fn connect(config: DatabaseConfig) -> Result<Self, ClickhouseDbError> {
        let db = Self::new(config)?;
        db.init().await?;
        Ok(db)
    }

    /// Run the capability probe unless it already succeeded.
    ///
    /// # Errors
    /// `ConfigError` for a readonly connection to a missing database, plus any failure of
    /// the existence check or of creating the database. Version and timezone lookups
    /// fall back to defaults instead of failing.
    pub async fn init(&self) -> Result<(), ClickhouseDbError> {
        self.capabilities.get_or_try_init(|| self.probe()).await?;
        Ok(())
    }

    /// The probed server capabilities.
    ///
    /// # Errors
    /// See [`Database::init`].
    pub async fn capabilities(&self) -> Result<&ServerCapabilities, ClickhouseDbError> {
        self.capabilities.get_or_try_init(|| self.probe()).await
    }

    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    #[must_use]
    pub fn db_name(&self) -> &str {
        &self.config.db_name
    }

    #[must_use]
    pub fn db_exists(&self) -> bool {
        self.db_exists.load(Ordering::Acquire)
    }

    /// Whether requests run in readonly mode.
    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.readonly.load(Ordering::Acquire)
    }

    /// Whether the server already treats this connection as readonly.
    #[must_use]
    pub fn is_connection_readonly(&self) -> bool {
        self.connection_readonly.load(Ordering::Acquire)
    }

    pub fn set_readonly(&mut self, readonly: bool) {
        self.readonly.store(readonly, Ordering::Release);
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Add a setting sent with every request; `None` removes it.
    ///
    /// ```rust
    /// use clickhouse_middleware::prelude::*;
    ///
    /// let mut db = Database::new(DatabaseConfig::new("analytics")).unwrap();
    /// db.add_setting("max_execution_time", Some(10));
    /// assert_eq!(db.settings().get("max_execution_time").map(String::as_str), Some("10"));
    /// db.add_setting("max_execution_time", None::<i32>);
    /// assert!(db.settings().is_empty());
    /// ```
    pub fn add_setting<V: ToString>(&mut self, name: impl Into<String>, value: Option<V>) {
        let name = name.into();
        match value {
            Some(value) => {
                self.settings.insert(name, value.to_string());
            }
            None => {
                self.settings.remove(&name);
            }
        }
    }

    /// [`substitute`] with this connection's database name.
    #[must_use]
    pub fn substitute<'a>(
        &self,
        query: &'a str,
        schema: Option<&ModelSchema>,
    ) -> std::borrow::Cow<'a, str> {
        substitute(query, &self.config.db_name, schema)
    }

    /// # Errors
    /// Any request failure.
    pub async fn create_database(&self) -> Result<(), ClickhouseDbError> {
        self.init().await?;
        self.create_database_statement().await
    }

    /// # Errors
    /// Any request failure.
    pub async fn drop_database(&self) -> Result<(), ClickhouseDbError> {
        self.init().await?;
        self.dispatch_text(
            format!("DROP DATABASE `{}`", self.config.db_name),
            &QueryOptions::default(),
        )
        .await?;
        self.db_exists.store(false, Ordering::Release);
        Ok(())
    }

    /// Create the kind's table if it does not exist.
    ///
    /// # Errors
    /// `ValidationError` for system kinds and `ConfigError` without an engine, both before
    /// anything is sent.
    pub async fn create_table(&self, schema: &ModelSchema) -> Result<(), ClickhouseDbError> {
        schema.ensure_creatable()?;
        let caps = self.capabilities().await?;
        let sql = schema.create_table_sql(&self.config.db_name, caps)?;
        self.dispatch_text(sql, &QueryOptions::default()).await?;
        Ok(())
    }

    /// # Errors
    /// `ValidationError` for system kinds, before anything is sent.
    pub async fn drop_table(&self, schema: &ModelSchema) -> Result<(), ClickhouseDbError> {
        let sql = schema.drop_table_sql(&self.config.db_name)?;
        self.init().await?;
        self.dispatch_text(sql, &QueryOptions::default()).await?;
        Ok(())
    }

    /// Whether a table with the kind's name exists in this database.
    ///
    /// # Errors
    /// Any request failure.
    pub async fn does_table_exist(&self, schema: &ModelSchema) -> Result<bool, ClickhouseDbError> {
        self.init().await?;
        let text = self
            .dispatch_text(
                format!(
                    "SELECT count() FROM system.tables WHERE database = {} AND name = {}",
                    tsv::quote(&self.config.db_name),
                    tsv::quote(schema.table_name())
                ),
                &QueryOptions::default(),
            )
            .await?;
        Ok(text.trim() == "1")
    }

    /// Build a record-kind from a live table's `DESCRIBE` output.
    ///
    /// With `system_table` the table is looked up in `system` and the kind is marked
    /// system (and therefore read-only).
    ///
    /// # Errors
    /// Request failures, or `ParseError` for a column type that cannot be parsed.
    pub async fn get_model_for_table(
        &self,
        table_name: &str,
        system_table: bool,
    ) -> Result<Arc<ModelSchema>, ClickhouseDbError> {
        self.init().await?;
        let db_name: &str = if system_table { "system" } else { &self.config.db_name };
        let text = self
            .dispatch_text(
                format!("DESCRIBE `{db_name}`.`{table_name}` FORMAT TSV"),
                &QueryOptions::default(),
            )
            .await?;
        let mut columns = Vec::new();
        for line in text.lines().filter(|line| !line.is_empty()) {
            let mut values = tsv::parse_tsv(line)?.into_iter();
            match (values.next(), values.next()) {
                (Some(name), Some(type_name)) => columns.push((name, type_name)),
                _ => {
                    return Err(ClickhouseDbError::ParseError(format!(
                        "unexpected DESCRIBE line {line:?}"
                    )));
                }
            }
        }
        let schema = ModelSchema::ad_hoc(columns, table_name)?;
        Ok(Arc::new(if system_table { schema.system() } else { schema }))
    }

    /// Number of records in the kind's table, optionally filtered.
    ///
    /// # Errors
    /// Request failures, `ParseError` for a non-numeric reply.
    pub async fn count(
        &self,
        schema: &ModelSchema,
        conditions: Option<&dyn ToConditionSql>,
    ) -> Result<u64, ClickhouseDbError> {
        let query = format!(
            "SELECT count() FROM $table{}",
            where_clause(conditions, schema)?
        );
        let query = self.substitute(&query, Some(schema)).into_owned();
        self.init().await?;
        let text = self.dispatch_text(query, &QueryOptions::default()).await?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(0);
        }
        text.parse()
            .map_err(|_| ClickhouseDbError::ParseError(format!("unexpected count {text:?}")))
    }

    /// Run a statement and return the reply as text. Only `$db` is substituted.
    ///
    /// # Errors
    /// Any request failure.
    pub async fn raw(&self, query: &str, options: &QueryOptions) -> Result<String, ClickhouseDbError> {
        let query = self.substitute(query, None).into_owned();
        self.init().await?;
        self.dispatch_text(query, options).await
    }
}
