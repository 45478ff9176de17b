use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::{Body, Client};
use url::Url;

use super::{HttpRequest, HttpResponse, RequestBody, Transport};
use crate::config::DatabaseConfig;
use crate::error::ClickhouseDbError;

/// `Transport` backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl ReqwestTransport {
    /// # Errors
    /// `ConfigError` for a bad URL, `HttpError` if the client cannot be built.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, ClickhouseDbError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!config.verify_ssl_cert)
            .build()?;
        Ok(Self {
            client,
            url: config.url()?,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, ClickhouseDbError> {
        let body = match request.body {
            RequestBody::Full(bytes) => Body::from(bytes),
            RequestBody::Streamed(chunks) => Body::wrap_stream(chunks),
        };
        let mut builder = self
            .client
            .post(self.url.clone())
            .query(&request.params)
            .body(body);
        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_ref());
        }
        let response = builder.send().await?;
        Ok(HttpResponse {
            status: response.status().as_u16(),
            body: Box::pin(response.bytes_stream().map_err(ClickhouseDbError::from)),
        })
    }
}
