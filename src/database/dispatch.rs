use std::sync::atomic::Ordering;

use crate::error::ClickhouseDbError;
use crate::server_error::ServerError;
use crate::session::QueryOptions;
use crate::transport::{HttpRequest, HttpResponse, RequestBody};

use super::Database;

impl Database {
    /// Query-string parameters for one request, lowest precedence first: per-call settings,
    /// connection settings, session, target database, readonly flag.
    #[must_use]
    pub fn build_params(&self, options: &QueryOptions) -> Vec<(String, String)> {
        let mut params = options.settings.clone();
        params.extend(
            self.settings
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        if let Some(session) = &options.session {
            params.insert("session_id".to_string(), session.id.clone());
            params.insert("session_timeout".to_string(), session.timeout_secs.to_string());
        }
        if self.db_exists.load(Ordering::Acquire) {
            params.insert("database".to_string(), self.config.db_name.clone());
        }
        // a server-side readonly connection rejects an explicit readonly=1
        if self.readonly.load(Ordering::Acquire)
            && !self.connection_readonly.load(Ordering::Acquire)
        {
            params.insert("readonly".to_string(), "1".to_string());
        }
        params.into_iter().collect()
    }

    /// POST without running the probe first.
    pub(crate) async fn dispatch(
        &self,
        body: RequestBody,
        options: &QueryOptions,
    ) -> Result<HttpResponse, ClickhouseDbError> {
        if self.config.log_statements
            && let RequestBody::Full(bytes) = &body
        {
            tracing::info!("{}", String::from_utf8_lossy(bytes));
        }
        let request = HttpRequest {
            params: self.build_params(options),
            body,
        };
        let response = self.transport.post(request).await?;
        if !response.is_success() {
            let status = response.status;
            let text = response.text().await?;
            tracing::debug!(status, "server rejected request");
            return Err(ServerError::from_response_text(&text).into());
        }
        Ok(response)
    }

    /// POST a statement and drain the reply as text.
    pub(crate) async fn dispatch_text(
        &self,
        statement: String,
        options: &QueryOptions,
    ) -> Result<String, ClickhouseDbError> {
        self.dispatch(statement.into(), options).await?.text().await
    }

    /// Send a statement or a chunk stream and return the live response.
    ///
    /// The probe runs first if it has not yet. The caller decides whether to read the
    /// body whole ([`HttpResponse::text`]) or line by line ([`HttpResponse::into_lines`]).
    ///
    /// # Errors
    /// `ServerError` for a non-2xx reply, `HttpError` for connectivity failures.
    pub async fn send(
        &self,
        query: impl Into<RequestBody>,
        options: &QueryOptions,
    ) -> Result<HttpResponse, ClickhouseDbError> {
        self.init().await?;
        self.dispatch(query.into(), options).await
    }
}
