use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use parking_lot::Mutex;
use std::sync::Arc;

type Cleanup = Box<dyn FnOnce() + Send>;

/// Registry of cleanups to run once the request has been handled.
///
/// The middleware inserts one into every request's extensions and runs
/// the registered closures after the handler returns, whatever the
/// outcome. Most request-scoped resources are released by drop order;
/// this is for artifacts that outlive the values that created them, such
/// as multipart upload spool files.
#[derive(Clone, Default)]
pub struct Deferred {
    inner: Arc<Mutex<Vec<Cleanup>>>,
}

impl Deferred {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cleanup to run when the request completes.
    pub fn defer<F: FnOnce() + Send + 'static>(&self, cleanup: F) {
        self.inner.lock().push(Box::new(cleanup));
    }

    /// Number of cleanups currently registered.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether no cleanups are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Runs every registered cleanup, in registration order, at most
    /// once each.
    pub fn run(&self) {
        let cleanups = std::mem::take(&mut *self.inner.lock());
        for cleanup in cleanups {
            cleanup();
        }
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").field("len", &self.len()).finish()
    }
}

impl<S> FromRequestParts<S> for Deferred
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Deferred>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "session middleware is not installed",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn cleanups_run_in_order_and_only_once() {
        let deferred = Deferred::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let first = counter.clone();
        deferred.defer(move || {
            first.fetch_add(1, Ordering::SeqCst);
        });
        let second = counter.clone();
        deferred.defer(move || {
            second.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(deferred.len(), 2);

        deferred.run();
        assert_eq!(counter.load(Ordering::SeqCst), 11);
        assert!(deferred.is_empty());

        deferred.run();
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }
}
