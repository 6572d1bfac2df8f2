//! Deltachain: stateful decoding of VCDIFF (RFC 3284) delta chains.
//!
//! A publisher sends a full document once, then a stream of deltas, each
//! computed against the previous document. The decoders here hold the
//! latest document, apply each delta against it and hand back an owned copy
//! of the result.
//!
//! The crate provides:
//! - Chain decoders, with and without sequence continuity checks (`chain`)
//! - A pure-Rust, decode-only VCDIFF engine (`vcdiff`, `engine`)
//! - Base64 and UTF-8 helpers for text transports (`codec`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use deltachain::CheckedVcdiffDecoder;
//!
//! let mut decoder = CheckedVcdiffDecoder::new();
//! decoder.set_base64_base("TG9yZW0gaXBzdW0gZG9sb3Igc2l0IGFtZXQ=", "m1")?;
//!
//! let result = decoder.apply_base64_delta(
//!     "1sPEAAABGgAoOAAeBAEsIGNvbnNlY3RldHVyIGFkaXBpc2NpbmcgZWxpdC4TGgEeAA==",
//!     "m2",
//!     "m1",
//! )?;
//! assert_eq!(
//!     result.as_utf8_str(),
//!     "Lorem ipsum dolor sit amet, consectetur adipiscing elit."
//! );
//!
//! // A delta computed against some other message is refused.
//! assert!(decoder.apply_base64_delta("1sPEAAA=", "m4", "m3").is_err());
//! # Ok::<(), deltachain::Error>(())
//! ```

pub mod chain;
pub mod codec;
pub mod engine;
pub mod error;
pub mod vcdiff;

#[cfg(feature = "cli")]
pub mod cli;

pub use chain::{
    BasePayload, ChannelDecoder, ChannelMessage, CheckedVcdiffDecoder, DeltaPayload, DeltaResult,
    SequenceToken, VcdiffDecoder,
};
pub use engine::{DiffEngine, EngineOptions, VcdiffEngine};
pub use error::{Error, Result};

/// True if `payload` looks like a VCDIFF delta (magic plus at least one byte).
pub use vcdiff::header::is_vcdiff as is_delta;
