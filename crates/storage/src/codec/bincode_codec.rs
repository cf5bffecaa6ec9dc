//! Bincode event codec.
//!
//! Default codec. Encodes a batch as a bincode sequence of events.

use super::traits::{CodecError, EventCodec};
use historytree_core::HistoryEvent;

/// Bincode codec for event batches.
///
/// # Example
///
/// ```
/// use historytree_core::HistoryEvent;
/// use historytree_storage::codec::{BincodeEventCodec, EventCodec};
///
/// let codec = BincodeEventCodec;
/// let events = vec![HistoryEvent::new(1, 0, "started", vec![])];
///
/// let blob = codec.encode(&events).unwrap();
/// assert_eq!(codec.decode(&blob).unwrap(), events);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeEventCodec;

impl EventCodec for BincodeEventCodec {
    fn encode(&self, events: &[HistoryEvent]) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(events).map_err(|e| CodecError::EncodeError(e.to_string()))
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<HistoryEvent>, CodecError> {
        bincode::deserialize(data).map_err(|e| CodecError::DecodeError(e.to_string()))
    }

    fn codec_id(&self) -> &str {
        "bincode"
    }
}
