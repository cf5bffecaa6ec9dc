//! Event codec trait definitions.

use historytree_core::{HistoryError, HistoryEvent};

/// Event codec trait.
///
/// Every event batch passes through the codec on its way into and out of
/// node storage. The codec is a pure, swappable dependency: the store only
/// ever sees the bytes it produces.
///
/// # Thread Safety
///
/// Codecs must be `Send + Sync` to allow concurrent encoding/decoding
/// from multiple threads.
pub trait EventCodec: Send + Sync {
    /// Serialize a batch of events into a blob.
    fn encode(&self, events: &[HistoryEvent]) -> Result<Vec<u8>, CodecError>;

    /// Deserialize a blob back into events.
    ///
    /// Returns an error if the data cannot be decoded (corruption, wrong codec).
    fn decode(&self, data: &[u8]) -> Result<Vec<HistoryEvent>, CodecError>;

    /// Unique codec identifier.
    fn codec_id(&self) -> &str;
}

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Encoding failed.
    #[error("Encode error: {0}")]
    EncodeError(String),

    /// Decoding failed (invalid format, truncated blob).
    #[error("Decode error: {0}")]
    DecodeError(String),
}

impl From<CodecError> for HistoryError {
    fn from(e: CodecError) -> Self {
        HistoryError::deserialization(e.to_string())
    }
}
