// Byte, base64 and UTF-8 conversions used at the decoder's text boundaries.
//
// Base64 uses the standard alphabet with padding. Text is always UTF-8;
// invalid sequences decode to U+FFFD rather than failing.

use std::borrow::Cow;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Decode standard, padded base64. Malformed input is an error, never a panic.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text)
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// UTF-8 encoding of `text`.
#[inline]
pub fn bytes_from_text(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// UTF-8 decoding of `bytes`, replacing invalid sequences.
///
/// Borrows when the input is already valid UTF-8.
#[inline]
pub fn text_from_bytes(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}
