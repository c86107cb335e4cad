//! Cookie-session middleware for axum.
//!
//! Associates an opaque client-held cookie token with a server-held
//! key/value bag, tracks whether a handler touched that bag, and decides
//! the cookie lifecycle — issue, renew, expire, delete — only after the
//! handler has finished producing its response. The response is buffered
//! so the Set-Cookie header can still be injected at that point without
//! the handler noticing.
//!
//! # Quick start
//!
//! ```no_run
//! use axum::{middleware, routing::get, Router};
//! use sessile_http::{session_middleware, Session, SessionManager};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = Arc::new(SessionManager::new());
//!     let app = Router::new()
//!         .route("/", get(handler))
//!         .layer(middleware::from_fn_with_state(
//!             manager,
//!             session_middleware,
//!         ));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//!
//! async fn handler(session: Session) -> String {
//!     let name: Option<String> = session.get("name");
//!     let _ = session.insert("name", "alice");
//!     format!("hello, {}", name.as_deref().unwrap_or("stranger"))
//! }
//! ```
//!
//! # Main types
//!
//! - [`SessionManager`] — Configuration plus the load/commit/destroy
//!   orchestration; build one, share it in an `Arc`.
//! - [`Session`] — Per-request handle to the data bag; extract it in
//!   handlers.
//! - [`session_middleware`] — The axum middleware function tying it all
//!   together.
//! - [`ResponseSink`] / [`BufferedResponse`] — The response interception
//!   seam used to defer cookie emission.
//! - [`Deferred`] — Post-request cleanup registry.

/// Response buffering with deferred header mutation.
pub mod buffer;
/// Cookie configuration and Set-Cookie wire formatting.
pub mod cookie;
/// Post-request cleanup registry.
pub mod deferred;
/// The session manager: configuration, load, commit.
pub mod manager;
/// The axum middleware implementing the request protocol.
pub mod middleware;
/// The per-request session handle and its extractor.
pub mod session;
/// The response sink abstraction and its capability negotiation.
pub mod sink;

pub use buffer::BufferedResponse;
pub use cookie::{CookieConfig, CookieExpiry, SameSite};
pub use deferred::Deferred;
pub use manager::{ErrorHandler, SessionManager, SessionManagerBuilder};
pub use middleware::session_middleware;
pub use session::{Session, SessionRegistry};
pub use sink::{HttpSink, RawConnection, ResponseSink, SinkCapabilities, SinkError};

pub use sessile_core::{
    FileStore, JsonCodec, MemoryStore, SessionCodec, SessionData, SessionError, SessionRecord,
    SessionResult, SessionStore, Status, REMEMBER_ME_KEY,
};
