// Crate-wide error type for the delta-chain decoder.

use crate::chain::sequence::ContinuityError;
use crate::vcdiff::DecodeError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A delta was applied before any base was set.
    #[error("uninitialized decoder: a base must be set before applying deltas")]
    Uninitialized,

    /// Absent base, malformed base64, or a payload without the VCDIFF magic.
    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Continuity(#[from] ContinuityError),

    /// The diff engine rejected the delta.
    #[error("delta decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[cfg(feature = "json")]
    #[error("result is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid_delta() -> Self {
        Self::InvalidArgument("the provided delta is not a valid VCDIFF delta".into())
    }

    /// True for errors that leave the chain unusable until a new base
    /// arrives (a missed or reordered delta).
    pub fn needs_resync(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::Continuity(_))
    }
}
