// Channel message routing.
//
// A subscriber to a delta-enabled channel receives a mix of full payloads
// and deltas. `ChannelDecoder` decides per message which one it holds and
// feeds it to a `CheckedVcdiffDecoder`:
//
// - a message that names the id it was derived from (`delta_from`) is a
//   delta against that message
// - any other message replaces the document
//
// Binary transports without message metadata (MQTT) use `route_binary`,
// which classifies by the VCDIFF magic instead.

use log::{debug, warn};

use super::decoder::{BasePayload, CheckedVcdiffDecoder, DeltaPayload};
use super::result::DeltaResult;
use super::sequence::SequenceToken;
use crate::engine::{DiffEngine, VcdiffEngine};
use crate::error::{Error, Result};
use crate::vcdiff::is_vcdiff;

/// One message as delivered by a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelMessage<'a> {
    pub id: Option<&'a str>,
    /// Text payloads of delta messages are read as base64.
    pub data: Option<BasePayload<'a>>,
    /// Id of the message this delta was computed against.
    pub delta_from: Option<&'a str>,
}

impl<'a> ChannelMessage<'a> {
    pub fn base(id: Option<&'a str>, data: BasePayload<'a>) -> Self {
        Self {
            id,
            data: Some(data),
            delta_from: None,
        }
    }

    pub fn delta(id: Option<&'a str>, data: BasePayload<'a>, from: &'a str) -> Self {
        Self {
            id,
            data: Some(data),
            delta_from: Some(from),
        }
    }
}

/// What a routed message did to the channel's document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The message replaced the document.
    Base(DeltaResult),
    /// The message was applied as a delta.
    Delta(DeltaResult),
}

impl RouteOutcome {
    pub fn data(&self) -> &DeltaResult {
        match self {
            Self::Base(data) | Self::Delta(data) => data,
        }
    }

    pub fn into_data(self) -> DeltaResult {
        match self {
            Self::Base(data) | Self::Delta(data) => data,
        }
    }

    pub fn is_delta(&self) -> bool {
        matches!(self, Self::Delta(_))
    }
}

/// Running counters for a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub bases_set: u64,
    pub deltas_applied: u64,
    pub failures: u64,
    /// Total size of every document produced, bases included.
    pub bytes_decoded: u64,
}

#[derive(Debug, Default)]
pub struct ChannelDecoder<E = VcdiffEngine> {
    decoder: CheckedVcdiffDecoder<E>,
    stats: ChannelStats,
}

impl ChannelDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: DiffEngine> ChannelDecoder<E> {
    pub fn with_engine(engine: E) -> Self {
        Self {
            decoder: CheckedVcdiffDecoder::with_engine(engine),
            stats: ChannelStats::default(),
        }
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn decoder(&self) -> &CheckedVcdiffDecoder<E> {
        &self.decoder
    }

    /// Route a message by its delta metadata.
    pub fn route(&mut self, message: ChannelMessage<'_>) -> Result<RouteOutcome> {
        let outcome = self.route_inner(message);
        self.record(&outcome);
        outcome
    }

    /// Route a bare binary payload: VCDIFF data is a delta against the
    /// current document, anything else replaces it.
    pub fn route_binary(&mut self, payload: &[u8]) -> Result<RouteOutcome> {
        let outcome = if is_vcdiff(payload) {
            let previous = self.decoder.sequence_token().clone();
            self.decoder
                .apply_delta(payload, SequenceToken::unset(), previous)
                .map(RouteOutcome::Delta)
        } else {
            self.decoder
                .set_base(payload, SequenceToken::unset())
                .map(|()| RouteOutcome::Base(DeltaResult::new(payload.to_vec())))
        };
        self.record(&outcome);
        outcome
    }

    fn route_inner(&mut self, message: ChannelMessage<'_>) -> Result<RouteOutcome> {
        let data = message.data.ok_or_else(|| {
            Error::InvalidArgument(format!(
                "message {} has no payload",
                SequenceToken::from(message.id)
            ))
        })?;

        match message.delta_from {
            Some(from) => {
                let payload = match data {
                    BasePayload::Raw(bytes) => DeltaPayload::Raw(bytes),
                    BasePayload::Utf8(text) | BasePayload::Base64(text) => {
                        DeltaPayload::Base64(text)
                    }
                };
                debug!(
                    "routing delta {} from {from}",
                    SequenceToken::from(message.id)
                );
                self.decoder
                    .apply_delta_payload(payload, message.id, from)
                    .map(RouteOutcome::Delta)
            }
            None => {
                self.decoder.set_base_payload(data, message.id)?;
                self.held_copy().map(RouteOutcome::Base)
            }
        }
    }

    fn held_copy(&self) -> Result<DeltaResult> {
        self.decoder
            .current_document()
            .map(|doc| DeltaResult::new(doc.to_vec()))
    }

    fn record(&mut self, outcome: &Result<RouteOutcome>) {
        match outcome {
            Ok(RouteOutcome::Base(data)) => {
                self.stats.bases_set += 1;
                self.stats.bytes_decoded += data.len() as u64;
            }
            Ok(RouteOutcome::Delta(data)) => {
                self.stats.deltas_applied += 1;
                self.stats.bytes_decoded += data.len() as u64;
            }
            Err(e) => {
                self.stats.failures += 1;
                warn!("channel message rejected: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "Lorem ipsum dolor sit amet";
    const DELTA1: &str = "1sPEAAABGgAoOAAeBAEsIGNvbnNlY3RldHVyIGFkaXBpc2NpbmcgZWxpdC4TGgEeAA==";
    const DELTA2: &str = "1sPEAAABOABFcwA7BAEgRnVzY2UgaWQgbnVsbGEgbGFjaW5pYSwgdm9sdXRwYXQgb2RpbyB1dCwgdWx0cmljZXMgbGlndWxhLhM4ATsA";
    const RESULT1: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.";
    const RESULT2: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. \
                           Fusce id nulla lacinia, volutpat odio ut, ultrices ligula.";

    #[test]
    fn routes_base_then_deltas() {
        let mut channel = ChannelDecoder::new();

        let out = channel
            .route(ChannelMessage::base(Some("m1"), BasePayload::Utf8(BASE)))
            .unwrap();
        assert!(!out.is_delta());
        assert_eq!(out.data().as_utf8_str(), BASE);

        let out = channel
            .route(ChannelMessage::delta(Some("m2"), BasePayload::Base64(DELTA1), "m1"))
            .unwrap();
        assert!(out.is_delta());
        assert_eq!(out.data().as_utf8_str(), RESULT1);

        let out = channel
            .route(ChannelMessage::delta(Some("m3"), BasePayload::Utf8(DELTA2), "m2"))
            .unwrap();
        assert_eq!(out.into_data().as_utf8_str(), RESULT2);

        assert_eq!(
            channel.stats(),
            ChannelStats {
                bases_set: 1,
                deltas_applied: 2,
                failures: 0,
                bytes_decoded: (BASE.len() + RESULT1.len() + RESULT2.len()) as u64,
            }
        );
        assert_eq!(channel.decoder().sequence_token().as_str(), Some("m3"));
    }

    #[test]
    fn skipped_message_breaks_the_chain_until_next_base() {
        let mut channel = ChannelDecoder::new();
        channel
            .route(ChannelMessage::base(Some("m1"), BasePayload::Utf8(BASE)))
            .unwrap();

        // m2 was lost in transit.
        let err = channel
            .route(ChannelMessage::delta(Some("m3"), BasePayload::Base64(DELTA2), "m2"))
            .unwrap_err();
        assert!(err.needs_resync());
        assert_eq!(channel.stats().failures, 1);

        channel
            .route(ChannelMessage::base(Some("m4"), BasePayload::Utf8(RESULT1)))
            .unwrap();
        let out = channel
            .route(ChannelMessage::delta(Some("m5"), BasePayload::Base64(DELTA2), "m4"))
            .unwrap();
        assert_eq!(out.data().as_utf8_str(), RESULT2);
    }

    #[test]
    fn base64_base_reports_decoded_bytes() {
        let mut channel = ChannelDecoder::new();
        let out = channel
            .route(ChannelMessage::base(
                None,
                BasePayload::Base64("TG9yZW0gaXBzdW0gZG9sb3Igc2l0IGFtZXQ="),
            ))
            .unwrap();
        assert_eq!(out.data().as_bytes(), BASE.as_bytes());
    }

    #[test]
    fn message_without_payload_is_rejected() {
        let mut channel = ChannelDecoder::new();
        let err = channel
            .route(ChannelMessage {
                id: Some("m1"),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(msg) if msg.contains("m1")));
    }

    #[test]
    fn binary_routing_sniffs_the_magic() {
        let mut channel = ChannelDecoder::new();
        let delta = crate::codec::decode_base64(DELTA1).unwrap();

        assert!(!channel.route_binary(BASE.as_bytes()).unwrap().is_delta());
        let out = channel.route_binary(&delta).unwrap();
        assert!(out.is_delta());
        assert_eq!(out.data().as_bytes(), RESULT1.as_bytes());
    }

    #[test]
    fn binary_delta_before_any_base_fails() {
        let mut channel = ChannelDecoder::new();
        let delta = crate::codec::decode_base64(DELTA1).unwrap();
        assert!(matches!(channel.route_binary(&delta), Err(Error::Uninitialized)));
        assert_eq!(channel.stats().failures, 1);
    }
}
