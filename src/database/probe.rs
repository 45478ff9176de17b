use std::sync::atomic::Ordering;

use chrono_tz::Tz;

use crate::capabilities::{ServerCapabilities, ServerVersion};
use crate::error::ClickhouseDbError;
use crate::session::QueryOptions;
use crate::tsv;

use super::Database;

/// Failures the probe degrades on instead of aborting.
fn is_recoverable(err: &ClickhouseDbError) -> bool {
    err.as_server_error().is_some() || err.is_connectivity()
}

impl Database {
    async fn probe_text(&self, statement: String) -> Result<String, ClickhouseDbError> {
        Ok(self
            .dispatch_text(statement, &QueryOptions::default())
            .await?
            .trim()
            .to_string())
    }

    async fn is_existing_database(&self) -> Result<bool, ClickhouseDbError> {
        let text = self
            .probe_text(format!(
                "SELECT count() FROM system.databases WHERE name = {}",
                tsv::quote(&self.config.db_name)
            ))
            .await?;
        Ok(text == "1")
    }

    async fn query_connection_readonly(&self) -> Result<bool, ClickhouseDbError> {
        let text = self
            .probe_text("SELECT value FROM system.settings WHERE name = 'readonly'".to_string())
            .await?;
        Ok(text != "0")
    }

    pub(super) async fn create_database_statement(&self) -> Result<(), ClickhouseDbError> {
        self.dispatch_text(
            format!(
                "CREATE DATABASE IF NOT EXISTS `{}` ENGINE = {}",
                self.config.db_name,
                self.config.engine.create_database_sql()
            ),
            &QueryOptions::default(),
        )
        .await?;
        self.db_exists.store(true, Ordering::Release);
        Ok(())
    }

    async fn server_version(&self) -> Result<ServerVersion, ClickhouseDbError> {
        match self.probe_text("SELECT version();".to_string()).await {
            Ok(text) => Ok(ServerVersion::parse(&text).unwrap_or_else(|| {
                tracing::warn!(version = %text, "Cannot parse server version, assuming 1.1.0");
                ServerVersion::FALLBACK
            })),
            Err(err) if is_recoverable(&err) => {
                tracing::warn!(error = %err, "Cannot determine server version, assuming 1.1.0");
                Ok(ServerVersion::FALLBACK)
            }
            Err(err) => Err(err),
        }
    }

    async fn server_timezone(&self) -> Result<Tz, ClickhouseDbError> {
        match self.probe_text("SELECT timezone()".to_string()).await {
            Ok(name) => Ok(name.parse::<Tz>().unwrap_or_else(|_| {
                tracing::warn!(timezone = %name, "Unknown server timezone, assuming UTC");
                Tz::UTC
            })),
            Err(err) if is_recoverable(&err) => {
                tracing::warn!(error = %err, "Cannot determine server timezone, assuming UTC");
                Ok(Tz::UTC)
            }
            Err(err) => Err(err),
        }
    }

    /// The one-time connection setup: database existence, readonly mode, version,
    /// timezone and the feature flags derived from the version.
    pub(super) async fn probe(&self) -> Result<ServerCapabilities, ClickhouseDbError> {
        let exists = self.is_existing_database().await?;
        self.db_exists.store(exists, Ordering::Release);

        if self.config.readonly {
            if !exists {
                return Err(ClickhouseDbError::ConfigError(
                    "Database does not exist, and cannot be created under readonly connection"
                        .to_string(),
                ));
            }
            let connection_readonly = self.query_connection_readonly().await?;
            self.connection_readonly
                .store(connection_readonly, Ordering::Release);
            self.readonly.store(true, Ordering::Release);
        } else if self.config.auto_create && !exists {
            self.create_database_statement().await?;
        }

        let version = self.server_version().await?;
        let timezone = if version > ServerVersion::WITHOUT_TIMEZONE {
            self.server_timezone().await?
        } else {
            Tz::UTC
        };
        let caps = ServerCapabilities::for_version(version, timezone);
        tracing::debug!(
            version = %caps.version,
            timezone = %caps.timezone,
            codecs = caps.has_codec_support,
            low_cardinality = caps.has_low_cardinality_support,
            "probed server"
        );
        Ok(caps)
    }
}
