use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use sessile_core::{
    JsonCodec, MemoryStore, SessionCodec, SessionData, SessionError, SessionResult, SessionStore,
};

use crate::cookie::CookieConfig;
use crate::session::Session;

/// Pluggable hook invoked when session load or commit fails.
///
/// The default logs the error and returns a plain 500 without leaking
/// any internal detail to the client.
pub type ErrorHandler = Arc<dyn Fn(&SessionError) -> Response + Send + Sync>;

fn default_error_handler(err: &SessionError) -> Response {
    error!(error = %err, "session middleware error");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

/// Orchestrates session load and commit and owns all configuration.
///
/// A manager is built once, wrapped in an [`Arc`], and shared across
/// every request; all of its configuration is immutable after
/// construction, so it needs no locking of its own. Per-request mutable
/// state lives entirely in the [`Session`] handle.
pub struct SessionManager {
    lifetime: Duration,
    idle_timeout: Option<Duration>,
    store: Arc<dyn SessionStore>,
    codec: Arc<dyn SessionCodec>,
    cookie: CookieConfig,
    error_handler: ErrorHandler,
}

impl SessionManager {
    /// A manager with the default in-memory store, JSON codec, 24 hour
    /// lifetime, no idle timeout, and default cookie settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts configuring a manager.
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::default()
    }

    /// The cookie configuration.
    pub fn cookie(&self) -> &CookieConfig {
        &self.cookie
    }

    /// The session store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Invokes the configured error handler.
    pub fn handle_error(&self, err: &SessionError) -> Response {
        (self.error_handler)(err)
    }

    /// Loads the session for a request-supplied token.
    ///
    /// A missing or empty token, a store miss, and an expired record all
    /// yield a fresh empty session; only decode failures and genuine
    /// store I/O failures are errors.
    pub async fn load(&self, token: Option<&str>) -> SessionResult<Session> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Ok(Session::new());
        };
        let Some((bytes, _)) = self.store.find(token).await? else {
            debug!(cookie = %self.cookie.name, "no session record for token, starting fresh");
            return Ok(Session::new());
        };
        let record = self.codec.decode(&bytes)?;
        if record.deadline <= Utc::now() {
            return Ok(Session::new());
        }
        Ok(Session::from_data(SessionData::from_record(
            token.to_string(),
            record,
        )))
    }

    /// Persists a modified session, returning its token and the expiry
    /// written to the store.
    ///
    /// A session without a token — fresh, renewed, or recreated after a
    /// destroy — gets a newly generated one, so a token is never reused
    /// for two logically distinct sessions. The absolute deadline bounds
    /// the expiry; a configured idle timeout can only shorten it.
    pub async fn commit(&self, session: &Session) -> SessionResult<(String, DateTime<Utc>)> {
        let token = session
            .token()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let deadline = session
            .deadline()
            .unwrap_or_else(|| Utc::now() + self.lifetime);
        let mut expiry = deadline;
        if let Some(idle) = self.idle_timeout {
            expiry = expiry.min(Utc::now() + idle);
        }

        let bytes = self.codec.encode(&session.to_record(deadline))?;
        self.store.commit(&token, &bytes, expiry).await?;

        session.bind_token(token.clone());
        session.set_deadline(deadline);
        debug!(%expiry, "session committed");
        Ok((token, expiry))
    }

    /// Destroys a session immediately: marks it destroyed and deletes
    /// its store record.
    ///
    /// Handlers running under the middleware can simply call
    /// [`Session::destroy`] and let the middleware delete the record;
    /// this method is for code that manages sessions outside a request.
    pub async fn destroy(&self, session: &Session) -> SessionResult<()> {
        session.destroy();
        if let Some(stale) = session.take_stale_token() {
            self.store.delete(&stale).await?;
        }
        Ok(())
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder {
    lifetime: Duration,
    idle_timeout: Option<Duration>,
    store: Option<Arc<dyn SessionStore>>,
    codec: Option<Arc<dyn SessionCodec>>,
    cookie: CookieConfig,
    error_handler: Option<ErrorHandler>,
}

impl Default for SessionManagerBuilder {
    fn default() -> Self {
        Self {
            lifetime: Duration::hours(24),
            idle_timeout: None,
            store: None,
            codec: None,
            cookie: CookieConfig::default(),
            error_handler: None,
        }
    }
}

impl SessionManagerBuilder {
    /// Absolute expiry, fixed when a session is first created.
    /// Defaults to 24 hours.
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Sliding inactivity expiry, bounded by the lifetime.
    /// Unset by default.
    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    /// The persistence backend. Defaults to [`MemoryStore`].
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The record codec. Defaults to [`JsonCodec`].
    pub fn codec(mut self, codec: Arc<dyn SessionCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// The cookie configuration.
    pub fn cookie(mut self, cookie: CookieConfig) -> Self {
        self.cookie = cookie;
        self
    }

    /// Hook invoked when load or commit fails.
    pub fn error_handler(
        mut self,
        handler: impl Fn(&SessionError) -> Response + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Finalizes the manager.
    pub fn build(self) -> SessionManager {
        SessionManager {
            lifetime: self.lifetime,
            idle_timeout: self.idle_timeout,
            store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            codec: self.codec.unwrap_or_else(|| Arc::new(JsonCodec)),
            cookie: self.cookie,
            error_handler: self
                .error_handler
                .unwrap_or_else(|| Arc::new(default_error_handler)),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use sessile_core::Status;

    #[tokio::test]
    async fn load_without_token_is_fresh() {
        let manager = SessionManager::new();
        let session = manager.load(None).await.unwrap();
        assert_eq!(session.status(), Status::Unmodified);
        assert!(session.token().is_none());
        assert!(session.deadline().is_none());
    }

    #[tokio::test]
    async fn load_with_unknown_token_is_fresh_not_an_error() {
        let manager = SessionManager::new();
        let session = manager.load(Some("no-such-token")).await.unwrap();
        assert_eq!(session.status(), Status::Unmodified);
        assert!(session.token().is_none());
    }

    #[tokio::test]
    async fn commit_generates_a_token_and_round_trips() {
        let manager = SessionManager::new();
        let session = manager.load(None).await.unwrap();
        session.insert("k", "v").unwrap();

        let (token, expiry) = manager.commit(&session).await.unwrap();
        assert!(!token.is_empty());
        assert!(expiry > Utc::now());
        assert_eq!(session.token().as_deref(), Some(token.as_str()));

        let reloaded = manager.load(Some(&token)).await.unwrap();
        assert_eq!(reloaded.get::<String>("k").unwrap(), "v");
        assert_eq!(reloaded.status(), Status::Unmodified);
    }

    #[tokio::test]
    async fn commit_preserves_the_existing_token() {
        let manager = SessionManager::new();
        let session = manager.load(None).await.unwrap();
        session.insert("k", "v").unwrap();
        let (first, _) = manager.commit(&session).await.unwrap();

        let reloaded = manager.load(Some(&first)).await.unwrap();
        reloaded.insert("k2", "v2").unwrap();
        let (second, _) = manager.commit(&reloaded).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn idle_timeout_shortens_the_store_expiry() {
        let manager = SessionManager::builder()
            .lifetime(Duration::hours(24))
            .idle_timeout(Duration::hours(1))
            .build();
        let session = manager.load(None).await.unwrap();
        session.insert("k", "v").unwrap();

        let (_, expiry) = manager.commit(&session).await.unwrap();
        let until = expiry - Utc::now();
        assert!(until <= Duration::hours(1));
        assert!(until > Duration::minutes(59));
        // The absolute deadline keeps the full lifetime.
        assert!(session.deadline().unwrap() - Utc::now() > Duration::hours(23));
    }

    #[tokio::test]
    async fn deadline_is_fixed_at_creation() {
        let manager = SessionManager::builder()
            .lifetime(Duration::hours(1))
            .build();
        let session = manager.load(None).await.unwrap();
        session.insert("k", "v").unwrap();
        let (token, _) = manager.commit(&session).await.unwrap();
        let deadline = session.deadline().unwrap();

        let reloaded = manager.load(Some(&token)).await.unwrap();
        reloaded.insert("k2", "v2").unwrap();
        manager.commit(&reloaded).await.unwrap();
        assert_eq!(reloaded.deadline().unwrap(), deadline);
    }

    #[tokio::test]
    async fn destroy_removes_the_store_record() {
        let manager = SessionManager::new();
        let session = manager.load(None).await.unwrap();
        session.insert("k", "v").unwrap();
        let (token, _) = manager.commit(&session).await.unwrap();

        manager.destroy(&session).await.unwrap();
        assert_eq!(session.status(), Status::Destroyed);
        assert!(manager.store().find(&token).await.unwrap().is_none());

        // Destroying again is harmless.
        manager.destroy(&session).await.unwrap();
    }
}
