use axum::http::{header, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use std::fmt::Write as _;

/// SameSite policy for the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// `SameSite=Strict`.
    Strict,
    /// `SameSite=Lax`.
    Lax,
    /// `SameSite=None`. Browsers require `Secure` alongside this.
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Static configuration for the session cookie.
///
/// Read at manager construction and immutable afterwards; the only
/// per-session override is "remember me", which can force a persistent
/// cookie when [`persist`](Self::persist) is `false`.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Cookie name. Must be unique per manager when an application runs
    /// several of them. Defaults to `"session"`.
    pub name: String,
    /// `Domain` attribute; omitted when `None`, in which case browsers
    /// scope the cookie to the issuing host.
    pub domain: Option<String>,
    /// `Path` attribute. Defaults to `"/"`.
    pub path: String,
    /// `HttpOnly` attribute. Defaults to `true`.
    pub http_only: bool,
    /// `Secure` attribute. Defaults to `false`; set it in production.
    pub secure: bool,
    /// Whether cookies outlive the browser session by default.
    /// Defaults to `true`.
    pub persist: bool,
    /// `SameSite` attribute; `None` omits it entirely.
    /// Defaults to `Some(SameSite::Lax)`.
    pub same_site: Option<SameSite>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "session".to_string(),
            domain: None,
            path: "/".to_string(),
            http_only: true,
            secure: false,
            persist: true,
            same_site: Some(SameSite::Lax),
        }
    }
}

/// How the Set-Cookie expiry attributes are rendered.
#[derive(Debug, Clone, Copy)]
pub enum CookieExpiry {
    /// Browser-session cookie: no `Expires` or `Max-Age`.
    Browser,
    /// Persistent cookie bounded by the given expiry.
    Persistent(DateTime<Utc>),
    /// Already-expired cookie, forcing client-side deletion.
    Delete,
}

impl CookieConfig {
    /// Renders the Set-Cookie header value for the given token.
    pub fn header_value(&self, token: &str, expiry: CookieExpiry) -> String {
        let mut out = format!("{}={token}", self.name);
        if !self.path.is_empty() {
            let _ = write!(out, "; Path={}", self.path);
        }
        if let Some(domain) = &self.domain {
            let _ = write!(out, "; Domain={domain}");
        }
        match expiry {
            CookieExpiry::Browser => {}
            CookieExpiry::Persistent(expiry) => {
                // Round up to the next whole second so the cookie always
                // outlives the store record.
                let expires = expiry + Duration::seconds(1);
                let _ = write!(out, "; Expires={}", format_http_date(expires));
                let max_age = (expiry - Utc::now()).num_milliseconds() / 1000 + 1;
                let _ = write!(out, "; Max-Age={max_age}");
            }
            CookieExpiry::Delete => {
                out.push_str("; Expires=Thu, 01 Jan 1970 00:00:01 GMT; Max-Age=-1");
            }
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if let Some(same_site) = self.same_site {
            let _ = write!(out, "; SameSite={}", same_site.as_str());
        }
        out
    }
}

/// RFC 7231 IMF-fixdate, the format browsers expect in `Expires`.
fn format_http_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Extracts the named cookie's value from a request's `Cookie` headers.
pub(crate) fn token_from_headers(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(header::COOKIE) {
        let Ok(raw) = header.to_str() else { continue };
        for pair in raw.split(';') {
            if let Some((key, value)) = pair.trim().split_once('=') {
                if key == name && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}
