// Diff engine seam.
//
// The chain decoder only needs `apply(dictionary, delta) -> target`. The
// default implementation is the in-crate VCDIFF decoder; anything else
// (a test spy, a foreign binding) plugs in through `DiffEngine`.

use std::sync::Arc;

use crate::vcdiff::decoder::{self, DecodeError};

// ---------------------------------------------------------------------------
// Engine trait
// ---------------------------------------------------------------------------

/// Stateless delta application.
pub trait DiffEngine: Send + Sync {
    /// Reconstruct the target from `dictionary` and a complete `delta`.
    fn apply(&self, dictionary: &[u8], delta: &[u8]) -> Result<Vec<u8>, DecodeError>;
}

impl<E: DiffEngine + ?Sized> DiffEngine for &E {
    fn apply(&self, dictionary: &[u8], delta: &[u8]) -> Result<Vec<u8>, DecodeError> {
        (**self).apply(dictionary, delta)
    }
}

impl<E: DiffEngine + ?Sized> DiffEngine for Arc<E> {
    fn apply(&self, dictionary: &[u8], delta: &[u8]) -> Result<Vec<u8>, DecodeError> {
        (**self).apply(dictionary, delta)
    }
}

// ---------------------------------------------------------------------------
// VCDIFF engine
// ---------------------------------------------------------------------------

/// Configuration for the VCDIFF engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Verify per-window Adler-32 checksums when the delta carries them.
    pub verify_checksum: bool,
    /// Largest document a single delta may reconstruct.
    pub max_output_len: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            verify_checksum: true,
            max_output_len: decoder::DEFAULT_MAX_OUTPUT_LEN,
        }
    }
}

/// RFC 3284 decoder with the default code table.
#[derive(Debug, Clone, Copy, Default)]
pub struct VcdiffEngine {
    options: EngineOptions,
}

impl VcdiffEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }
}

impl DiffEngine for VcdiffEngine {
    fn apply(&self, dictionary: &[u8], delta: &[u8]) -> Result<Vec<u8>, DecodeError> {
        decoder::decode_memory_with(
            delta,
            dictionary,
            self.options.verify_checksum,
            self.options.max_output_len,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
