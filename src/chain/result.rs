// Owned view of a reconstructed document.

use std::borrow::Cow;

use crate::codec;

/// Bytes produced by one successful delta application.
///
/// Always a copy: later changes to the decoder never show through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaResult {
    data: Vec<u8>,
}

impl DeltaResult {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// UTF-8 text, with invalid sequences replaced.
    pub fn as_utf8_str(&self) -> Cow<'_, str> {
        codec::text_from_bytes(&self.data)
    }

    #[cfg(feature = "json")]
    pub fn as_json(&self) -> crate::Result<serde_json::Value> {
        self.deserialize()
    }

    /// Parse the document as JSON into any deserializable type.
    #[cfg(feature = "json")]
    pub fn deserialize<'de, T: serde::Deserialize<'de>>(&'de self) -> crate::Result<T> {
        Ok(serde_json::from_slice(&self.data)?)
    }
}

impl AsRef<[u8]> for DeltaResult {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl From<DeltaResult> for Vec<u8> {
    fn from(result: DeltaResult) -> Self {
        result.data
    }
}
