use crate::data::SessionRecord;
use crate::error::{SessionError, SessionResult};

/// Bidirectional transform between a [`SessionRecord`] and bytes.
///
/// Codecs must round-trip any value the data bag can hold. They are
/// shared across requests and must be cheap to call concurrently.
pub trait SessionCodec: Send + Sync {
    /// Encodes a record into the bytes handed to the store.
    fn encode(&self, record: &SessionRecord) -> SessionResult<Vec<u8>>;
    /// Decodes store bytes back into a record.
    fn decode(&self, bytes: &[u8]) -> SessionResult<SessionRecord>;
}

/// The default codec: JSON via serde.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl SessionCodec for JsonCodec {
    fn encode(&self, record: &SessionRecord) -> SessionResult<Vec<u8>> {
        serde_json::to_vec(record).map_err(|e| SessionError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> SessionResult<SessionRecord> {
        serde_json::from_slice(bytes).map_err(|e| SessionError::Decode(e.to_string()))
    }
}
