//! The HTTP seam: one POST per request, query-string parameters, streamed bodies.

use std::fmt;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio_util::io::StreamReader;

use crate::error::ClickhouseDbError;

mod http;

pub use http::ReqwestTransport;

/// A stream of body chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, ClickhouseDbError>>;

/// Body of an outgoing POST.
pub enum RequestBody {
    /// A statement already in memory
    Full(Bytes),
    /// Chunks produced on demand while the request is being sent
    Streamed(ByteStream),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            RequestBody::Streamed(_) => f.debug_tuple("Streamed").field(&"<stream>").finish(),
        }
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Full(Bytes::from(text))
    }
}

impl From<&'static str> for RequestBody {
    fn from(text: &'static str) -> Self {
        RequestBody::Full(Bytes::from_static(text.as_bytes()))
    }
}

#[derive(Debug)]
pub struct HttpRequest {
    /// Query-string parameters, in the order they are sent
    pub params: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A response whose body has not been read yet.
pub struct HttpResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body.
    ///
    /// # Errors
    /// Propagates body read failures.
    pub async fn bytes(self) -> Result<Bytes, ClickhouseDbError> {
        let mut buf = BytesMut::new();
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Drain the body as text. Invalid UTF-8 is replaced rather than rejected.
    ///
    /// # Errors
    /// Propagates body read failures.
    pub async fn text(self) -> Result<String, ClickhouseDbError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read the body line by line as it arrives.
    #[must_use]
    pub fn into_lines(self) -> ResponseLines {
        let reader = StreamReader::new(self.body.map_err(into_io_error));
        ResponseLines {
            lines: (Box::new(reader) as Box<dyn AsyncBufRead + Send + Unpin>).lines(),
        }
    }
}

fn into_io_error(err: ClickhouseDbError) -> std::io::Error {
    match err {
        ClickhouseDbError::IoError(io) => io,
        other => std::io::Error::other(other),
    }
}

/// Lines of a response body, without their terminators.
pub struct ResponseLines {
    lines: Lines<Box<dyn AsyncBufRead + Send + Unpin>>,
}

impl ResponseLines {
    /// The next line, or `None` at the end of the body.
    ///
    /// # Errors
    /// `IoError` when the body breaks off or is not UTF-8.
    pub async fn next_line(&mut self) -> Result<Option<String>, ClickhouseDbError> {
        Ok(self.lines.next_line().await?)
    }
}

/// Sends one request to the server.
///
/// Implementations must be safe for concurrent use; a `Database` shares one transport
/// across all of its calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `request` and return the response without reading its body.
    ///
    /// # Errors
    /// Connectivity failures only. Non-2xx statuses are returned as responses.
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, ClickhouseDbError>;
}
