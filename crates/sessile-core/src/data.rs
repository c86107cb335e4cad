use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::SessionResult;

/// Reserved key holding the per-session "remember me" override.
///
/// When set to `true`, the session cookie is made persistent even if the
/// cookie configuration is not, so individual logins can opt into
/// surviving a browser restart.
pub const REMEMBER_ME_KEY: &str = "__remember_me";

/// Lifecycle status of a session within a single request.
///
/// Transitions are monotonic: `Unmodified` becomes `Modified` on the
/// first write and never goes back, and `Destroyed` is terminal — writes
/// against a destroyed session are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Status {
    /// The session has not been written to during this request.
    #[default]
    Unmodified,
    /// At least one value was inserted, removed, or cleared.
    Modified,
    /// The session was explicitly destroyed.
    Destroyed,
}

/// The wire form of a session: the absolute deadline plus the values.
///
/// The deadline is encoded alongside the bag so the absolute lifetime
/// bound set at creation survives across requests, even when a sliding
/// idle timeout keeps refreshing the store record's expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Absolute expiry of the session, fixed when it was first created.
    pub deadline: DateTime<Utc>,
    /// The key/value payload.
    pub values: HashMap<String, serde_json::Value>,
}

/// The mutable key/value bag bound to one in-flight request.
///
/// A `SessionData` is created by loading a store record (or fresh, when
/// the request carried no usable token), mutated by the handler, and
/// discarded at the end of the request unless it was committed.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    token: Option<String>,
    stale_token: Option<String>,
    status: Status,
    deadline: Option<DateTime<Utc>>,
    values: HashMap<String, serde_json::Value>,
}

impl SessionData {
    /// Creates a fresh, empty, unmodified bag with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bag from a decoded store record and the token it was
    /// found under.
    pub fn from_record(token: String, record: SessionRecord) -> Self {
        Self {
            token: Some(token),
            stale_token: None,
            status: Status::Unmodified,
            deadline: Some(record.deadline),
            values: record.values,
        }
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// The token this bag was loaded under, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Binds a freshly committed token to this bag.
    pub fn bind_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Takes the token whose store record must be deleted, if one was
    /// staled by [`destroy`](Self::destroy) or
    /// [`renew_token`](Self::renew_token).
    pub fn take_stale_token(&mut self) -> Option<String> {
        self.stale_token.take()
    }

    /// Absolute expiry of the session, if already established.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Sets the absolute expiry.
    pub fn set_deadline(&mut self, deadline: DateTime<Utc>) {
        self.deadline = Some(deadline);
    }

    /// Returns a clone of the raw value stored under `key`.
    pub fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        self.values.get(key).cloned()
    }

    /// Deserializes the value stored under `key`.
    ///
    /// Returns `None` when the key is absent or the stored value does not
    /// deserialize into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.get(key)?.clone();
        serde_json::from_value(value).ok()
    }

    /// Stores `value` under `key`, marking the session modified.
    ///
    /// Ignored when the session has been destroyed.
    pub fn insert<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> SessionResult<()> {
        if self.status == Status::Destroyed {
            return Ok(());
        }
        let value = serde_json::to_value(value)?;
        self.values.insert(key.to_string(), value);
        self.status = Status::Modified;
        Ok(())
    }

    /// Removes and returns the value stored under `key`.
    ///
    /// Removing an absent key leaves the status untouched, so calling
    /// this twice is equivalent to calling it once.
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        if self.status == Status::Destroyed {
            return None;
        }
        let removed = self.values.remove(key);
        if removed.is_some() {
            self.status = Status::Modified;
        }
        removed
    }

    /// Removes every value from the bag.
    pub fn clear(&mut self) {
        if self.status == Status::Destroyed || self.values.is_empty() {
            return;
        }
        self.values.clear();
        self.status = Status::Modified;
    }

    /// Destroys the session: clears the bag, stales the token so its
    /// store record gets deleted, and makes the status terminal.
    ///
    /// Destroying twice is the same as destroying once.
    pub fn destroy(&mut self) {
        if self.status == Status::Destroyed {
            return;
        }
        self.status = Status::Destroyed;
        self.values.clear();
        if let Some(token) = self.token.take() {
            self.stale_token = Some(token);
        }
    }

    /// Discards the current token so the next commit issues a fresh one,
    /// deleting the old record. Call after any privilege change to
    /// prevent session fixation.
    pub fn renew_token(&mut self) {
        if self.status == Status::Destroyed {
            return;
        }
        if let Some(token) = self.token.take() {
            self.stale_token = Some(token);
        }
        self.status = Status::Modified;
    }

    /// Whether a value is stored under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The keys currently present in the bag.
    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    /// Number of values in the bag.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the bag holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sets the per-session "remember me" override.
    pub fn set_remember_me(&mut self, remember: bool) -> SessionResult<()> {
        self.insert(REMEMBER_ME_KEY, &remember)
    }

    /// Whether "remember me" has been set for this session.
    pub fn remember_me(&self) -> bool {
        self.get::<bool>(REMEMBER_ME_KEY).unwrap_or(false)
    }

    /// Snapshots the bag into a record ready for encoding.
    pub fn to_record(&self, deadline: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            deadline,
            values: self.values.clone(),
        }
    }
}
