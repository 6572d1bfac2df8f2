// Stateful delta-chain decoders.
//
// `VcdiffDecoder` holds the latest document and applies each delta against
// it. `CheckedVcdiffDecoder` additionally tags every document state with a
// `SequenceToken` and refuses deltas produced against any other state.
//
// Every operation either fully succeeds (document and token replaced
// together) or leaves the decoder exactly as it was.

use std::borrow::Cow;

use log::{debug, warn};

use super::base::BaseStore;
use super::result::DeltaResult;
use super::sequence::{SequenceGuard, SequenceToken};
use crate::codec;
use crate::engine::{DiffEngine, VcdiffEngine};
use crate::error::{Error, Result};
use crate::vcdiff::is_vcdiff;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A delta as it arrives from a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaPayload<'a> {
    Raw(&'a [u8]),
    /// Standard base64 text. Deltas are never read as plain text.
    Base64(&'a str),
}

impl<'a> DeltaPayload<'a> {
    fn resolve(self) -> Result<Cow<'a, [u8]>> {
        match self {
            Self::Raw(bytes) => Ok(Cow::Borrowed(bytes)),
            Self::Base64(text) => codec::decode_base64(text)
                .map(Cow::Owned)
                .map_err(|_| Error::invalid_delta()),
        }
    }
}

/// A full document as it arrives from a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasePayload<'a> {
    Raw(&'a [u8]),
    /// Text, stored as its UTF-8 encoding.
    Utf8(&'a str),
    Base64(&'a str),
}

impl BasePayload<'_> {
    fn resolve(self) -> Result<Vec<u8>> {
        match self {
            Self::Raw(bytes) => Ok(bytes.to_vec()),
            Self::Utf8(text) => Ok(codec::bytes_from_text(text)),
            Self::Base64(text) => codec::decode_base64(text).map_err(|e| {
                Error::InvalidArgument(format!("base payload is not valid base64: {e}"))
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Unchecked decoder
// ---------------------------------------------------------------------------

/// Applies a chain of VCDIFF deltas, each against the previous result.
#[derive(Debug, Default)]
pub struct VcdiffDecoder<E = VcdiffEngine> {
    engine: E,
    base: BaseStore,
}

impl VcdiffDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: DiffEngine> VcdiffDecoder<E> {
    pub fn with_engine(engine: E) -> Self {
        Self {
            engine,
            base: BaseStore::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn is_initialized(&self) -> bool {
        self.base.is_initialized()
    }

    pub(crate) fn current_document(&self) -> Result<&[u8]> {
        self.base.get()
    }

    pub fn set_base(&mut self, data: &[u8]) -> Result<()> {
        self.set_base_payload(BasePayload::Raw(data))
    }

    /// Set the base from text. The text is UTF-8 encoded, never base64 decoded.
    pub fn set_base_str(&mut self, text: &str) -> Result<()> {
        self.set_base_payload(BasePayload::Utf8(text))
    }

    pub fn set_base64_base(&mut self, text: &str) -> Result<()> {
        self.set_base_payload(BasePayload::Base64(text))
    }

    pub fn set_base_payload(&mut self, payload: BasePayload<'_>) -> Result<()> {
        self.base.set(Some(payload.resolve()?))
    }

    pub fn apply_delta(&mut self, delta: &[u8]) -> Result<DeltaResult> {
        self.apply_delta_payload(DeltaPayload::Raw(delta))
    }

    pub fn apply_base64_delta(&mut self, delta: &str) -> Result<DeltaResult> {
        self.apply_delta_payload(DeltaPayload::Base64(delta))
    }

    pub fn apply_delta_payload(&mut self, payload: DeltaPayload<'_>) -> Result<DeltaResult> {
        let base = self.base.get()?;
        let output = reconstruct(&self.engine, base, payload)?;
        Ok(self.commit(output))
    }

    fn commit(&mut self, output: Vec<u8>) -> DeltaResult {
        let result = DeltaResult::new(output.clone());
        self.base.replace(output);
        result
    }
}

/// Resolve, sniff and apply a delta without touching any decoder state.
fn reconstruct<E: DiffEngine>(
    engine: &E,
    base: &[u8],
    payload: DeltaPayload<'_>,
) -> Result<Vec<u8>> {
    let delta = payload.resolve()?;
    if !is_vcdiff(&delta) {
        return Err(Error::invalid_delta());
    }
    let output = engine.apply(base, &delta)?;
    debug!(
        "delta applied: {} byte delta, {} -> {} bytes",
        delta.len(),
        base.len(),
        output.len()
    );
    Ok(output)
}

// ---------------------------------------------------------------------------
// Checked decoder
// ---------------------------------------------------------------------------

/// A `VcdiffDecoder` that enforces sequence continuity.
///
/// Each delta names the id of the document it was produced against; the
/// check runs before the payload is decoded or the engine is invoked.
#[derive(Debug, Default)]
pub struct CheckedVcdiffDecoder<E = VcdiffEngine> {
    inner: VcdiffDecoder<E>,
    guard: SequenceGuard,
}

impl CheckedVcdiffDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: DiffEngine> CheckedVcdiffDecoder<E> {
    pub fn with_engine(engine: E) -> Self {
        Self {
            inner: VcdiffDecoder::with_engine(engine),
            guard: SequenceGuard::new(),
        }
    }

    pub fn engine(&self) -> &E {
        self.inner.engine()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    /// Id of the document currently held.
    pub fn sequence_token(&self) -> &SequenceToken {
        self.guard.current()
    }

    pub(crate) fn current_document(&self) -> Result<&[u8]> {
        self.inner.current_document()
    }

    pub fn set_base(&mut self, data: &[u8], id: impl Into<SequenceToken>) -> Result<()> {
        self.set_base_payload(BasePayload::Raw(data), id)
    }

    pub fn set_base_str(&mut self, text: &str, id: impl Into<SequenceToken>) -> Result<()> {
        self.set_base_payload(BasePayload::Utf8(text), id)
    }

    pub fn set_base64_base(&mut self, text: &str, id: impl Into<SequenceToken>) -> Result<()> {
        self.set_base_payload(BasePayload::Base64(text), id)
    }

    /// Replace the document and its id. No continuity check applies.
    pub fn set_base_payload(
        &mut self,
        payload: BasePayload<'_>,
        id: impl Into<SequenceToken>,
    ) -> Result<()> {
        self.inner.set_base_payload(payload)?;
        self.guard.advance(id.into());
        debug!("base id: {}", self.guard.current());
        Ok(())
    }

    /// Apply `delta`, produced against the document `previous_id`, and tag
    /// the result as `new_id`.
    pub fn apply_delta(
        &mut self,
        delta: &[u8],
        new_id: impl Into<SequenceToken>,
        previous_id: impl Into<SequenceToken>,
    ) -> Result<DeltaResult> {
        self.apply_delta_payload(DeltaPayload::Raw(delta), new_id, previous_id)
    }

    pub fn apply_base64_delta(
        &mut self,
        delta: &str,
        new_id: impl Into<SequenceToken>,
        previous_id: impl Into<SequenceToken>,
    ) -> Result<DeltaResult> {
        self.apply_delta_payload(DeltaPayload::Base64(delta), new_id, previous_id)
    }

    pub fn apply_delta_payload(
        &mut self,
        payload: DeltaPayload<'_>,
        new_id: impl Into<SequenceToken>,
        previous_id: impl Into<SequenceToken>,
    ) -> Result<DeltaResult> {
        let base = self.inner.base.get()?;
        let previous_id = previous_id.into();
        if let Err(e) = self.guard.check(&previous_id) {
            warn!("{e}");
            return Err(e.into());
        }

        let output = reconstruct(&self.inner.engine, base, payload)?;
        let result = self.inner.commit(output);
        self.guard.advance(new_id.into());
        debug!("chain advanced: {previous_id} -> {}", self.guard.current());
        Ok(result)
    }
}
