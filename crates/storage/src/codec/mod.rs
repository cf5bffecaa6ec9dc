//! Event codec abstraction.
//!
//! Event batches are serialized through a codec before reaching node
//! storage and deserialized on read. Raw reads and raw appends bypass it.

mod bincode_codec;
mod traits;

pub use bincode_codec::BincodeEventCodec;
pub use traits::{CodecError, EventCodec};
