// Stateful delta-chain decoding.
//
// - `base`: the document held between deltas
// - `sequence`: id tracking and continuity checks
// - `decoder`: unchecked and checked chain decoders
// - `result`: owned views of a reconstructed document
// - `stream`: per-channel routing of full payloads and deltas

pub mod base;
pub mod decoder;
pub mod result;
pub mod sequence;
pub mod stream;

pub use decoder::{BasePayload, CheckedVcdiffDecoder, DeltaPayload, VcdiffDecoder};
pub use result::DeltaResult;
pub use sequence::{ContinuityError, SequenceGuard, SequenceToken};
pub use stream::{ChannelDecoder, ChannelMessage, ChannelStats, RouteOutcome};
