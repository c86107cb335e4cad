use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use tracing::debug;

use sessile_core::{SessionError, SessionResult, Status};

use crate::buffer::BufferedResponse;
use crate::cookie::{self, CookieExpiry};
use crate::deferred::Deferred;
use crate::manager::SessionManager;
use crate::session::{Session, SessionRegistry};
use crate::sink::{HttpSink, ResponseSink};

/// Session middleware for axum, applied with
/// [`middleware::from_fn_with_state`](axum::middleware::from_fn_with_state).
///
/// Per request: reads the session token from the configured cookie,
/// loads the session, exposes [`Session`] and [`Deferred`] as request
/// extensions, runs the downstream handler, and then negotiates the
/// Set-Cookie lifecycle based on what the handler did — nothing for an
/// untouched session, a commit plus cookie for a modified one, an
/// immediately-expired cookie for a destroyed one.
///
/// The handler's response is buffered in full so the cookie header can
/// be injected after the handler has already produced its status and
/// body; endless streaming responses should therefore not sit behind
/// this middleware.
///
/// ```no_run
/// use axum::{middleware, routing::get, Router};
/// use sessile_http::{session_middleware, Session, SessionManager};
/// use std::sync::Arc;
///
/// async fn visits(session: Session) -> String {
///     let count = session.get::<u64>("visits").unwrap_or(0) + 1;
///     let _ = session.insert("visits", &count);
///     format!("visit #{count}")
/// }
///
/// let manager = Arc::new(SessionManager::new());
/// let app: Router = Router::new()
///     .route("/", get(visits))
///     .layer(middleware::from_fn_with_state(manager, session_middleware));
/// ```
pub async fn session_middleware(
    State(manager): State<Arc<SessionManager>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = cookie::token_from_headers(request.headers(), &manager.cookie().name);

    let session = match manager.load(token.as_deref()).await {
        Ok(session) => session,
        Err(err) => return manager.handle_error(&err),
    };

    let deferred = Deferred::new();
    let mut registry = request
        .extensions_mut()
        .get::<SessionRegistry>()
        .cloned()
        .unwrap_or_default();
    registry.register(manager.cookie().name.clone(), session.clone());
    request.extensions_mut().insert(registry);
    request.extensions_mut().insert(session.clone());
    request.extensions_mut().insert(deferred.clone());

    let response = next.run(request).await;

    // Request-scoped artifacts are released whatever the handler did.
    deferred.run();

    match negotiate(&manager, &session, response).await {
        Ok(response) => response,
        Err(err) => manager.handle_error(&err),
    }
}

/// Buffers the handler's response, applies the cookie lifecycle decision
/// for the session's final status, then replays status and body.
async fn negotiate(
    manager: &SessionManager,
    session: &Session,
    response: Response,
) -> SessionResult<Response> {
    let (parts, body) = response.into_parts();
    let body = to_bytes(body, usize::MAX)
        .await
        .map_err(|e| SessionError::Io(std::io::Error::other(e)))?;

    let mut sink = BufferedResponse::new(HttpSink::with_headers(parts.headers));
    sink.set_status(parts.status);
    sink.write(&body).await.map_err(SessionError::from)?;

    match session.status() {
        Status::Unmodified => {}
        Status::Modified => {
            delete_stale_record(manager, session).await?;
            let (token, expiry) = manager.commit(session).await?;

            let persistent = manager.cookie().persist || session.remember_me();
            let expiry = if persistent {
                CookieExpiry::Persistent(expiry)
            } else {
                CookieExpiry::Browser
            };
            let cookie = manager.cookie().header_value(&token, expiry);
            append_set_cookie(sink.headers_mut(), &cookie)?;
            add_negotiation_headers(sink.headers_mut());
            debug!(cookie = %manager.cookie().name, "session cookie issued");
        }
        Status::Destroyed => {
            delete_stale_record(manager, session).await?;
            let cookie = manager.cookie().header_value("", CookieExpiry::Delete);
            append_set_cookie(sink.headers_mut(), &cookie)?;
            add_negotiation_headers(sink.headers_mut());
            debug!(cookie = %manager.cookie().name, "session cookie expired");
        }
    }

    let http = sink.finish().await.map_err(SessionError::from)?;
    Ok(http.into_response())
}

/// Deletes the record staled by a destroy or a token renewal, so the old
/// token can never resolve to a session again.
async fn delete_stale_record(manager: &SessionManager, session: &Session) -> SessionResult<()> {
    if let Some(stale) = session.take_stale_token() {
        manager.store().delete(&stale).await?;
    }
    Ok(())
}

fn append_set_cookie(headers: &mut HeaderMap, cookie: &str) -> SessionResult<()> {
    let value =
        HeaderValue::from_str(cookie).map_err(|e| SessionError::Cookie(e.to_string()))?;
    headers.append(header::SET_COOKIE, value);
    Ok(())
}

/// Headers that keep caches from replaying a Set-Cookie to the wrong
/// client. Added alongside every cookie mutation, but never duplicated.
fn add_negotiation_headers(headers: &mut HeaderMap) {
    add_header_if_missing(
        headers,
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache=\"Set-Cookie\""),
    );
    add_header_if_missing(headers, header::VARY, HeaderValue::from_static("Cookie"));
}

fn add_header_if_missing(headers: &mut HeaderMap, key: HeaderName, value: HeaderValue) {
    if headers.get_all(&key).iter().any(|existing| *existing == value) {
        return;
    }
    headers.append(key, value);
}
