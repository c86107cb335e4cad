//! Core types for cookie-session management.
//!
//! This crate holds everything that is independent of the HTTP layer: the
//! per-request session data bag and its lifecycle status, the codec that
//! turns a session record into bytes, the store that persists those bytes
//! under an opaque token, and the shared error type.
//!
//! # Main types
//!
//! - [`SessionData`] — The mutable key/value bag bound to one request.
//! - [`Status`] — Closed lifecycle enum (unmodified, modified, destroyed).
//! - [`SessionRecord`] — The encoded form: absolute deadline plus values.
//! - [`SessionCodec`] / [`JsonCodec`] — Record ↔ bytes transform.
//! - [`SessionStore`] / [`MemoryStore`] / [`FileStore`] — Token-keyed
//!   persistence with lazy expiry.
//! - [`SessionError`] / [`SessionResult`] — Unified error handling.

/// Record ↔ bytes codec trait and the default JSON codec.
pub mod codec;
/// The per-request data bag and its lifecycle status.
pub mod data;
/// Error types shared across the session crates.
pub mod error;
/// Token-keyed persistence backends.
pub mod store;

pub use codec::{JsonCodec, SessionCodec};
pub use data::{SessionData, SessionRecord, Status, REMEMBER_ME_KEY};
pub use error::{SessionError, SessionResult};
pub use store::{FileStore, MemoryStore, SessionStore};
