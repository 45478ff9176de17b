use thiserror::Error;

use crate::server_error::ServerError;

#[derive(Debug, Error)]
pub enum ClickhouseDbError {
    #[error(transparent)]
    HttpError(#[from] reqwest::Error),

    #[error(transparent)]
    ServerError(#[from] ServerError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Migration {migration} failed: {source}")]
    MigrationError {
        migration: String,
        #[source]
        source: Box<ClickhouseDbError>,
    },
}

impl ClickhouseDbError {
    /// True for failures below the HTTP status line: refused connections, timeouts,
    /// broken bodies.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            ClickhouseDbError::HttpError(_)
                | ClickhouseDbError::ConnectionError(_)
                | ClickhouseDbError::IoError(_)
        )
    }

    /// The decoded server error, if this is one.
    #[must_use]
    pub fn as_server_error(&self) -> Option<&ServerError> {
        match self {
            ClickhouseDbError::ServerError(err) => Some(err),
            ClickhouseDbError::MigrationError { source, .. } => source.as_server_error(),
            _ => None,
        }
    }
}

impl From<url::ParseError> for ClickhouseDbError {
    fn from(err: url::ParseError) -> Self {
        ClickhouseDbError::ConfigError(format!("invalid database url: {err}"))
    }
}
