// VCDIFF format decoding (RFC 3284).
//
// The diff engine behind the delta-chain decoder. Decode-only: deltas are
// produced elsewhere (xdelta3, open-vcdiff, a message broker).
//
// # Modules
//
// - `varint`: Variable-length integer decoding (base-128, big-endian)
// - `address_cache`: NEAR/SAME address cache for COPY instruction addresses
// - `code_table`: Default RFC 3284 code table (256 entries)
// - `header`: File and window header parsing, magic sniffing
// - `decoder`: Instruction execution and window reconstruction

pub mod address_cache;
pub mod code_table;
pub mod decoder;
pub mod header;
pub mod varint;

pub use decoder::{DEFAULT_MAX_OUTPUT_LEN, DecodeError, decode_memory, decode_memory_with};
pub use header::{DeltaHeaders, FileHeader, VCDIFF_MAGIC, WindowHeader, is_vcdiff, read_headers};
