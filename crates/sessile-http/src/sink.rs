use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use sessile_core::SessionError;

/// Errors produced by response sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The underlying sink does not support the requested operation.
    #[error("operation not supported by the underlying response sink")]
    Unsupported,

    /// An I/O failure while writing to the sink.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SinkError> for SessionError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Io(e) => SessionError::Io(e),
            SinkError::Unsupported => {
                SessionError::Io(std::io::Error::from(std::io::ErrorKind::Unsupported))
            }
        }
    }
}

/// A raw bidirectional connection yielded by [`ResponseSink::take_over`].
pub trait RawConnection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> RawConnection for T {}

/// Optional transport capabilities a sink may advertise.
///
/// Callers query these flags before attempting the corresponding
/// operation; an operation invoked against a sink that does not
/// advertise it fails with [`SinkError::Unsupported`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkCapabilities {
    /// Buffered bytes can be drained to the transport on demand.
    pub flush: bool,
    /// Server-push hints can be issued.
    pub push: bool,
    /// The underlying connection can be taken over.
    pub takeover: bool,
    /// The sink can signal when the peer disconnects.
    pub close_notify: bool,
}

/// Destination for an outbound response: status, headers and body bytes.
///
/// This is the narrow seam between the session middleware and whatever
/// transport ultimately carries the response. The advanced operations
/// default to [`SinkError::Unsupported`]; implementations advertise what
/// they actually support through [`capabilities`](Self::capabilities).
#[async_trait]
pub trait ResponseSink: Send {
    /// Sets the response status code.
    fn set_status(&mut self, status: StatusCode);

    /// The response headers, mutable until the response is finalized.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Appends a chunk of body bytes, returning how many were accepted.
    async fn write(&mut self, chunk: &[u8]) -> Result<usize, SinkError>;

    /// Capabilities advertised by this sink.
    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities::default()
    }

    /// Drains any internally held bytes to the transport.
    async fn flush(&mut self) -> Result<(), SinkError> {
        Err(SinkError::Unsupported)
    }

    /// Issues a server-push hint for the given target.
    async fn push(&mut self, _target: &str) -> Result<(), SinkError> {
        Err(SinkError::Unsupported)
    }

    /// Relinquishes the response and yields the raw connection.
    async fn take_over(&mut self) -> Result<Box<dyn RawConnection>, SinkError> {
        Err(SinkError::Unsupported)
    }

    /// Returns a receiver that flips to `true` when the peer disconnects.
    fn close_notify(&mut self) -> Result<watch::Receiver<bool>, SinkError> {
        Err(SinkError::Unsupported)
    }
}

/// Terminal sink that assembles an axum [`Response`] in memory.
#[derive(Debug, Default)]
pub struct HttpSink {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl HttpSink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink seeded with existing response headers.
    pub fn with_headers(headers: HeaderMap) -> Self {
        Self {
            headers,
            ..Self::default()
        }
    }

    /// Converts the accumulated status, headers and body into a response.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.headers_mut() = self.headers;
        if let Some(status) = self.status {
            *response.status_mut() = status;
        }
        response
    }
}

#[async_trait]
impl ResponseSink for HttpSink {
    fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<usize, SinkError> {
        self.body.extend_from_slice(chunk);
        Ok(chunk.len())
    }

    fn capabilities(&self) -> SinkCapabilities {
        // Everything is already in memory, so draining is trivially
        // supported; the transport-level operations are not.
        SinkCapabilities {
            flush: true,
            ..SinkCapabilities::default()
        }
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn http_sink_assembles_a_response() {
        let mut sink = HttpSink::new();
        sink.set_status(StatusCode::CREATED);
        sink.headers_mut()
            .insert("x-test", HeaderValue::from_static("yes"));
        sink.write(b"hello ").await.unwrap();
        sink.write(b"world").await.unwrap();

        let response = sink.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-test"], "yes");
    }

    #[tokio::test]
    async fn default_advanced_operations_are_unsupported() {
        let mut sink = HttpSink::new();
        assert!(matches!(
            sink.push("/style.css").await,
            Err(SinkError::Unsupported)
        ));
        assert!(matches!(
            sink.take_over().await,
            Err(SinkError::Unsupported)
        ));
        assert!(matches!(sink.close_notify(), Err(SinkError::Unsupported)));
    }
}
