use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{SessionError, SessionResult};

/// Token-keyed persistence backend for encoded session records.
///
/// Stores are shared, reentrant collaborators: one instance serves many
/// concurrent requests. Expiry is enforced lazily — an expired record is
/// simply not returned by [`find`](Self::find); no implementation is
/// expected to run background sweepers.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Looks up the record for a token.
    ///
    /// Unknown and expired tokens both yield `Ok(None)`; only genuine
    /// backend failures are errors.
    async fn find(&self, token: &str) -> SessionResult<Option<(Vec<u8>, DateTime<Utc>)>>;

    /// Creates or refreshes the record for a token.
    async fn commit(&self, token: &str, data: &[u8], expiry: DateTime<Utc>) -> SessionResult<()>;

    /// Deletes the record for a token. Unknown tokens are not an error.
    async fn delete(&self, token: &str) -> SessionResult<()>;
}

/// In-memory store, the default backend.
///
/// Suitable for single-process deployments and tests; records do not
/// survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (Vec<u8>, DateTime<Utc>)>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (possibly expired but not yet reaped) records.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find(&self, token: &str) -> SessionResult<Option<(Vec<u8>, DateTime<Utc>)>> {
        let mut entries = self.entries.lock();
        let expired = matches!(entries.get(token), Some((_, expiry)) if *expiry <= Utc::now());
        if expired {
            entries.remove(token);
            return Ok(None);
        }
        Ok(entries.get(token).cloned())
    }

    async fn commit(&self, token: &str, data: &[u8], expiry: DateTime<Utc>) -> SessionResult<()> {
        self.entries
            .lock()
            .insert(token.to_string(), (data.to_vec(), expiry));
        Ok(())
    }

    async fn delete(&self, token: &str) -> SessionResult<()> {
        self.entries.lock().remove(token);
        Ok(())
    }
}

/// On-disk wrapper for one record: the expiry plus the encoded bytes.
#[derive(Serialize, Deserialize)]
struct FileRecord {
    expiry: DateTime<Utc>,
    data: Vec<u8>,
}

/// File-based store: one JSON file per token under a directory.
///
/// Records survive restarts, which makes this handy for development
/// setups without an external backend.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates the store, creating `dir` if needed.
    pub async fn new(dir: PathBuf) -> SessionResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn record_path(&self, token: &str) -> PathBuf {
        self.dir.join(format!("{token}.json"))
    }

    // Tokens are server-generated, but they arrive inside a client-held
    // cookie; anything that could escape the directory is treated as
    // unknown.
    fn valid_token(token: &str) -> bool {
        !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn find(&self, token: &str) -> SessionResult<Option<(Vec<u8>, DateTime<Utc>)>> {
        if !Self::valid_token(token) {
            return Ok(None);
        }
        let path = self.record_path(token);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: FileRecord = serde_json::from_slice(&raw)
            .map_err(|e| SessionError::Store(format!("corrupt session file: {e}")))?;
        if record.expiry <= Utc::now() {
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }
        Ok(Some((record.data, record.expiry)))
    }

    async fn commit(&self, token: &str, data: &[u8], expiry: DateTime<Utc>) -> SessionResult<()> {
        if !Self::valid_token(token) {
            return Err(SessionError::Store(format!(
                "refusing to persist invalid token {token:?}"
            )));
        }
        let record = FileRecord {
            expiry,
            data: data.to_vec(),
        };
        let json = serde_json::to_vec(&record)?;
        tokio::fs::write(self.record_path(token), json).await?;
        Ok(())
    }

    async fn delete(&self, token: &str) -> SessionResult<()> {
        if !Self::valid_token(token) {
            return Ok(());
        }
        match tokio::fs::remove_file(self.record_path(token)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
