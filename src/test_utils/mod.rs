//! An in-memory [`Transport`] for tests: scripted replies, recorded requests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};

use crate::error::ClickhouseDbError;
use crate::server_error::ServerError;
use crate::transport::{HttpRequest, HttpResponse, RequestBody, Transport};

/// Body bytes per response chunk, small so line reassembly is exercised.
const REPLY_CHUNK: usize = 7;

/// What the mock saw for one POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub params: BTreeMap<String, String>,
    /// Body as it arrived, one entry per chunk
    pub chunks: Vec<Bytes>,
}

impl RecordedRequest {
    #[must_use]
    pub fn body_text(&self) -> String {
        self.chunks
            .iter()
            .map(|chunk| String::from_utf8_lossy(chunk))
            .collect()
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// A scripted reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockReply {
    pub status: u16,
    pub body: String,
}

impl MockReply {
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn error(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Replies to the standard probe statements of a healthy 22.8 server in UTC whose
/// database exists and which is not readonly on its own.
#[must_use]
pub fn probe_reply(statement: &str) -> Option<MockReply> {
    if statement.starts_with("SELECT count() FROM system.databases") {
        Some(MockReply::ok("1\n"))
    } else if statement.starts_with("SELECT version()") {
        Some(MockReply::ok("22.8.1.1\n"))
    } else if statement.starts_with("SELECT timezone()") {
        Some(MockReply::ok("UTC\n"))
    } else if statement.starts_with("SELECT value FROM system.settings WHERE name = 'readonly'") {
        Some(MockReply::ok("0\n"))
    } else {
        None
    }
}

/// A `TabSeparatedWithNamesAndTypes` body.
#[must_use]
pub fn tsv_response(columns: &[(&str, &str)], rows: &[Vec<String>]) -> String {
    let names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
    let types: Vec<&str> = columns.iter().map(|(_, type_name)| *type_name).collect();
    let mut body = format!("{}\n{}\n", names.join("\t"), types.join("\t"));
    for row in rows {
        body.push_str(&row.join("\t"));
        body.push('\n');
    }
    body
}

type Handler = dyn Fn(&RecordedRequest) -> Result<MockReply, ClickhouseDbError> + Send + Sync;

/// A transport that answers through a closure and keeps every request.
#[derive(Clone)]
pub struct MockTransport {
    handler: Arc<Handler>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("requests", &self.requests().len())
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Result<MockReply, ClickhouseDbError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answers probe statements with [`probe_reply`] and everything else with `handler`.
    pub fn with_probe<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Result<MockReply, ClickhouseDbError> + Send + Sync + 'static,
    {
        Self::new(move |request| match probe_reply(&request.body_text()) {
            Some(reply) => Ok(reply),
            None => handler(request),
        })
    }

    /// Everything received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Requests other than the probe statements.
    #[must_use]
    pub fn statements(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| probe_reply(&request.body_text()).is_none())
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, ClickhouseDbError> {
        let chunks = match request.body {
            RequestBody::Full(bytes) => vec![bytes],
            RequestBody::Streamed(mut body) => {
                let mut chunks = Vec::new();
                while let Some(chunk) = body.next().await {
                    chunks.push(chunk?);
                }
                chunks
            }
        };
        let recorded = RecordedRequest {
            params: request.params.into_iter().collect(),
            chunks,
        };
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(recorded.clone());
        }
        let reply = (self.handler)(&recorded)?;
        let body: Vec<Result<Bytes, ClickhouseDbError>> = reply
            .body
            .into_bytes()
            .chunks(REPLY_CHUNK)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(HttpResponse {
            status: reply.status,
            body: stream::iter(body).boxed(),
        })
    }
}

/// A server error reply in the 21+ text format.
#[must_use]
pub fn server_error_reply(code: u32, kind: &str, message: &str) -> MockReply {
    MockReply::error(
        500,
        format!("Code: {code}. DB::Exception: {message}. ({kind}) (version 22.8.1.1 (official build))\n"),
    )
}

/// Decoded form of [`server_error_reply`].
#[must_use]
pub fn expected_server_error(code: u32, message: &str) -> ServerError {
    ServerError::new(code, format!("{message}."))
}
