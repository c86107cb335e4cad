use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use tokio::sync::watch;

use crate::sink::{RawConnection, ResponseSink, SinkCapabilities, SinkError};

/// Buffers a handler's response so headers can still be modified after
/// the handler has produced its output.
///
/// Body writes accumulate in memory instead of reaching the inner sink;
/// the first status set is remembered and later calls are no-ops. Header
/// access passes straight through to the inner sink, which is what lets
/// a cookie be injected once the handler has returned.
///
/// An explicit [`flush`](ResponseSink::flush) drains only the bytes
/// written since the previous flush, so streaming handlers never send
/// duplicate data — but once anything has been flushed the status (and,
/// for sent bytes, the headers) can no longer be changed retroactively.
pub struct BufferedResponse<S: ResponseSink> {
    inner: S,
    buf: Vec<u8>,
    // Everything before this index has already reached the inner sink.
    drained: usize,
    status: Option<StatusCode>,
    status_forwarded: bool,
}

impl<S: ResponseSink> BufferedResponse<S> {
    /// Wraps an inner sink.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            drained: 0,
            status: None,
            status_forwarded: false,
        }
    }

    /// The status remembered from the handler, if any was set.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Bytes buffered but not yet drained to the inner sink.
    pub fn pending(&self) -> &[u8] {
        &self.buf[self.drained..]
    }

    async fn drain_pending(&mut self) -> Result<(), SinkError> {
        if !self.status_forwarded {
            if let Some(status) = self.status {
                self.inner.set_status(status);
            }
            self.status_forwarded = true;
        }
        while self.drained < self.buf.len() {
            let written = self.inner.write(&self.buf[self.drained..]).await?;
            if written == 0 {
                return Err(SinkError::Io(std::io::ErrorKind::WriteZero.into()));
            }
            self.drained += written;
        }
        Ok(())
    }

    /// Replays the remembered status and any remaining buffered bytes to
    /// the inner sink and returns it.
    pub async fn finish(mut self) -> Result<S, SinkError> {
        self.drain_pending().await?;
        Ok(self.inner)
    }
}

#[async_trait]
impl<S: ResponseSink> ResponseSink for BufferedResponse<S> {
    fn set_status(&mut self, status: StatusCode) {
        // First call wins; once forwarded the status is committed.
        if self.status.is_none() && !self.status_forwarded {
            self.status = Some(status);
        }
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<usize, SinkError> {
        self.buf.extend_from_slice(chunk);
        Ok(chunk.len())
    }

    fn capabilities(&self) -> SinkCapabilities {
        self.inner.capabilities()
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        if !self.inner.capabilities().flush {
            return Err(SinkError::Unsupported);
        }
        self.drain_pending().await?;
        self.inner.flush().await
    }

    async fn push(&mut self, target: &str) -> Result<(), SinkError> {
        if !self.inner.capabilities().push {
            return Err(SinkError::Unsupported);
        }
        self.inner.push(target).await
    }

    async fn take_over(&mut self) -> Result<Box<dyn RawConnection>, SinkError> {
        if !self.inner.capabilities().takeover {
            return Err(SinkError::Unsupported);
        }
        self.inner.take_over().await
    }

    fn close_notify(&mut self) -> Result<watch::Receiver<bool>, SinkError> {
        if !self.inner.capabilities().close_notify {
            return Err(SinkError::Unsupported);
        }
        self.inner.close_notify()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    /// Inner sink that records everything it receives.
    #[derive(Default)]
    struct RecordingSink {
        caps: SinkCapabilities,
        statuses: Vec<StatusCode>,
        headers: HeaderMap,
        writes: Vec<Vec<u8>>,
        flushes: usize,
        pushes: Vec<String>,
    }

    #[async_trait]
    impl ResponseSink for RecordingSink {
        fn set_status(&mut self, status: StatusCode) {
            self.statuses.push(status);
        }

        fn headers_mut(&mut self) -> &mut HeaderMap {
            &mut self.headers
        }

        async fn write(&mut self, chunk: &[u8]) -> Result<usize, SinkError> {
            self.writes.push(chunk.to_vec());
            Ok(chunk.len())
        }

        fn capabilities(&self) -> SinkCapabilities {
            self.caps
        }

        async fn flush(&mut self) -> Result<(), SinkError> {
            self.flushes += 1;
            Ok(())
        }

        async fn push(&mut self, target: &str) -> Result<(), SinkError> {
            self.pushes.push(target.to_string());
            Ok(())
        }
    }

    fn flushable() -> RecordingSink {
        RecordingSink {
            caps: SinkCapabilities {
                flush: true,
                ..SinkCapabilities::default()
            },
            ..RecordingSink::default()
        }
    }

    #[tokio::test]
    async fn writes_are_held_back_until_finish() {
        let mut buffered = BufferedResponse::new(RecordingSink::default());
        buffered.write(b"hello").await.unwrap();
        assert_eq!(buffered.pending(), b"hello");

        let inner = buffered.finish().await.unwrap();
        assert_eq!(inner.writes, vec![b"hello".to_vec()]);
    }

    #[tokio::test]
    async fn first_status_wins() {
        let mut buffered = BufferedResponse::new(RecordingSink::default());
        buffered.set_status(StatusCode::NOT_FOUND);
        buffered.set_status(StatusCode::OK);
        assert_eq!(buffered.status(), Some(StatusCode::NOT_FOUND));

        let inner = buffered.finish().await.unwrap();
        assert_eq!(inner.statuses, vec![StatusCode::NOT_FOUND]);
    }

    #[tokio::test]
    async fn no_status_set_forwards_none() {
        let buffered = BufferedResponse::new(RecordingSink::default());
        let inner = buffered.finish().await.unwrap();
        assert!(inner.statuses.is_empty());
    }

    #[tokio::test]
    async fn flush_sends_only_the_delta() {
        let mut buffered = BufferedResponse::new(flushable());
        buffered.write(b"ab").await.unwrap();
        buffered.flush().await.unwrap();
        buffered.write(b"cd").await.unwrap();
        buffered.flush().await.unwrap();

        let inner = buffered.finish().await.unwrap();
        assert_eq!(inner.writes, vec![b"ab".to_vec(), b"cd".to_vec()]);
        assert_eq!(inner.flushes, 2);
    }

    #[tokio::test]
    async fn status_cannot_change_after_flush() {
        let mut buffered = BufferedResponse::new(flushable());
        buffered.set_status(StatusCode::OK);
        buffered.flush().await.unwrap();
        buffered.set_status(StatusCode::NOT_FOUND);

        let inner = buffered.finish().await.unwrap();
        assert_eq!(inner.statuses, vec![StatusCode::OK]);
    }

    #[tokio::test]
    async fn flush_without_capability_fails() {
        let mut buffered = BufferedResponse::new(RecordingSink::default());
        buffered.write(b"data").await.unwrap();
        assert!(matches!(buffered.flush().await, Err(SinkError::Unsupported)));
        // The bytes stay buffered for the final replay.
        assert_eq!(buffered.pending(), b"data");
    }

    #[tokio::test]
    async fn push_forwards_only_when_advertised() {
        let mut unsupported = BufferedResponse::new(RecordingSink::default());
        assert!(matches!(
            unsupported.push("/a.css").await,
            Err(SinkError::Unsupported)
        ));

        let pushable = RecordingSink {
            caps: SinkCapabilities {
                push: true,
                ..SinkCapabilities::default()
            },
            ..RecordingSink::default()
        };
        let mut buffered = BufferedResponse::new(pushable);
        buffered.push("/a.css").await.unwrap();
        let inner = buffered.finish().await.unwrap();
        assert_eq!(inner.pushes, vec!["/a.css".to_string()]);
    }

    #[tokio::test]
    async fn take_over_and_close_notify_require_capability() {
        let mut buffered = BufferedResponse::new(RecordingSink::default());
        assert!(matches!(
            buffered.take_over().await,
            Err(SinkError::Unsupported)
        ));
        assert!(matches!(
            buffered.close_notify(),
            Err(SinkError::Unsupported)
        ));
    }

    #[tokio::test]
    async fn headers_pass_through_to_the_inner_sink() {
        use axum::http::HeaderValue;

        let mut buffered = BufferedResponse::new(RecordingSink::default());
        buffered
            .headers_mut()
            .insert("x-late", HeaderValue::from_static("yes"));

        let inner = buffered.finish().await.unwrap();
        assert_eq!(inner.headers["x-late"], "yes");
    }
}
