use serde::{Deserialize, Serialize};
use url::Url;

use crate::engines::DatabaseEngine;
use crate::error::ClickhouseDbError;

/// Connection settings for one database on one server.
///
/// # Examples
/// ```rust
/// use clickhouse_middleware::prelude::*;
///
/// let config = DatabaseConfig::new("analytics")
///     .with_url("http://db.internal:8123/")
///     .with_credentials("reader", "secret")
///     .with_readonly(true);
/// assert!(config.validate().is_ok());
/// assert!(!config.auto_create);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub db_name: String,
    pub db_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub readonly: bool,
    pub auto_create: bool,
    pub timeout_secs: u64,
    pub verify_ssl_cert: bool,
    pub log_statements: bool,
    pub engine: DatabaseEngine,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_name: "default".to_string(),
            db_url: "http://localhost:8123/".to_string(),
            username: None,
            password: None,
            readonly: false,
            auto_create: true,
            timeout_secs: 60,
            verify_ssl_cert: true,
            log_statements: false,
            engine: DatabaseEngine::default(),
        }
    }
}

impl DatabaseConfig {
    #[must_use]
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_url(mut self, db_url: impl Into<String>) -> Self {
        self.db_url = db_url.into();
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// A readonly connection never creates its database.
    #[must_use]
    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        if readonly {
            self.auto_create = false;
        }
        self
    }

    #[must_use]
    pub fn with_auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = auto_create;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    #[must_use]
    pub fn with_verify_ssl_cert(mut self, verify: bool) -> Self {
        self.verify_ssl_cert = verify;
        self
    }

    #[must_use]
    pub fn with_log_statements(mut self, log_statements: bool) -> Self {
        self.log_statements = log_statements;
        self
    }

    #[must_use]
    pub fn with_engine(mut self, engine: DatabaseEngine) -> Self {
        self.engine = engine;
        self
    }

    /// # Errors
    /// `ConfigError` for an empty database name, an unparsable URL or a zero timeout.
    pub fn validate(&self) -> Result<(), ClickhouseDbError> {
        if self.db_name.trim().is_empty() {
            return Err(ClickhouseDbError::ConfigError(
                "database name must not be empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ClickhouseDbError::ConfigError(
                "timeout must be at least one second".to_string(),
            ));
        }
        self.url()?;
        Ok(())
    }

    /// # Errors
    /// `ConfigError` if `db_url` does not parse.
    pub fn url(&self) -> Result<Url, ClickhouseDbError> {
        Ok(Url::parse(&self.db_url)?)
    }
}
