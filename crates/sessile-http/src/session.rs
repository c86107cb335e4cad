use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use sessile_core::{SessionData, SessionRecord, SessionResult, Status};

/// Cheap-to-clone handle to one request's session data.
///
/// The middleware creates one handle per request and inserts it into the
/// request's extensions; handlers receive it through the axum extractor
/// or an [`Extension`](axum::Extension). All clones share the same
/// underlying [`SessionData`], so a write made deep inside a handler is
/// visible to the middleware when it negotiates the cookie afterwards.
///
/// The internal mutex exists only so the handle can be cloned into
/// extensions; a session is never shared across requests, so the lock is
/// uncontended.
#[derive(Clone, Debug, Default)]
pub struct Session {
    inner: Arc<Mutex<SessionData>>,
}

impl Session {
    /// A fresh, empty, unmodified session with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps existing session data in a handle.
    pub fn from_data(data: SessionData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(data)),
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        self.inner.lock().status()
    }

    /// The token this session was loaded under, if any.
    pub fn token(&self) -> Option<String> {
        self.inner.lock().token().map(str::to_string)
    }

    /// Absolute expiry of the session, if already established.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().deadline()
    }

    /// Deserializes the value stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.inner.lock().get(key)
    }

    /// Returns a clone of the raw value stored under `key`.
    pub fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.lock().get_value(key)
    }

    /// Stores `value` under `key`, marking the session modified.
    pub fn insert<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> SessionResult<()> {
        self.inner.lock().insert(key, value)
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.lock().remove(key)
    }

    /// Removes every value from the bag.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Destroys the session. The middleware deletes the store record and
    /// expires the client cookie once the handler returns.
    pub fn destroy(&self) {
        self.inner.lock().destroy();
    }

    /// Discards the current token so the next commit issues a fresh one.
    /// Call after any privilege change to prevent session fixation.
    pub fn renew_token(&self) {
        self.inner.lock().renew_token();
    }

    /// Whether a value is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// The keys currently present in the bag.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().keys()
    }

    /// Number of values in the bag.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the bag holds no values.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Sets the per-session "remember me" override.
    pub fn set_remember_me(&self, remember: bool) -> SessionResult<()> {
        self.inner.lock().set_remember_me(remember)
    }

    /// Whether "remember me" has been set for this session.
    pub fn remember_me(&self) -> bool {
        self.inner.lock().remember_me()
    }

    /// Binds a freshly committed token to this session.
    pub fn bind_token(&self, token: String) {
        self.inner.lock().bind_token(token);
    }

    /// Sets the absolute expiry.
    pub fn set_deadline(&self, deadline: DateTime<Utc>) {
        self.inner.lock().set_deadline(deadline);
    }

    /// Takes the token whose store record must be deleted, if any.
    pub fn take_stale_token(&self) -> Option<String> {
        self.inner.lock().take_stale_token()
    }

    /// Snapshots the bag into a record ready for encoding.
    pub fn to_record(&self, deadline: DateTime<Utc>) -> SessionRecord {
        self.inner.lock().to_record(deadline)
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "session middleware is not installed",
        ))
    }
}

/// All sessions bound to the current request, keyed by cookie name.
///
/// An application normally runs a single session manager and extracts
/// [`Session`] directly. When several managers are stacked (say, one for
/// login state and one for preferences with different cookies), the
/// plain extension slot only holds the innermost one; this registry
/// gives handlers access to each by its cookie name.
#[derive(Clone, Debug, Default)]
pub struct SessionRegistry {
    by_cookie: std::collections::HashMap<String, Session>,
}

impl SessionRegistry {
    /// The session bound under the given cookie name, if any.
    pub fn get(&self, cookie_name: &str) -> Option<Session> {
        self.by_cookie.get(cookie_name).cloned()
    }

    /// Registers a session under its cookie name.
    pub fn register(&mut self, cookie_name: impl Into<String>, session: Session) {
        self.by_cookie.insert(cookie_name.into(), session);
    }

    /// Cookie names with a bound session.
    pub fn cookie_names(&self) -> Vec<String> {
        self.by_cookie.keys().cloned().collect()
    }
}

impl<S> FromRequestParts<S> for SessionRegistry
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<SessionRegistry>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "session middleware is not installed",
        ))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn clones_share_the_same_data() {
        let session = Session::new();
        let clone = session.clone();

        clone.insert("k", "v").unwrap();

        assert_eq!(session.status(), Status::Modified);
        assert_eq!(session.get::<String>("k").unwrap(), "v");
    }
}
