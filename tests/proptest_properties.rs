use std::sync::atomic::{AtomicUsize, Ordering};

use deltachain::vcdiff::{DecodeError, VCDIFF_MAGIC};
use deltachain::{CheckedVcdiffDecoder, DiffEngine, Error, SequenceToken, VcdiffDecoder, codec};
use proptest::prelude::*;

/// Counts invocations; returns its input reversed.
#[derive(Default)]
struct SpyEngine {
    calls: AtomicUsize,
}

impl DiffEngine for SpyEngine {
    fn apply(&self, dictionary: &[u8], _delta: &[u8]) -> Result<Vec<u8>, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(dictionary.iter().rev().copied().collect())
    }
}

fn without_magic() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..64)
        .prop_filter("must not carry the VCDIFF magic", |v| {
            v.len() <= VCDIFF_MAGIC.len() || !v.starts_with(&VCDIFF_MAGIC)
        })
}

proptest! {
    #[test]
    fn prop_non_vcdiff_never_reaches_engine(
        base in proptest::collection::vec(any::<u8>(), 0..64),
        delta in without_magic(),
    ) {
        let spy = SpyEngine::default();
        let mut decoder = VcdiffDecoder::with_engine(&spy);
        decoder.set_base(&base).unwrap();

        let is_invalid = matches!(decoder.apply_delta(&delta), Err(Error::InvalidArgument(_)));
        prop_assert!(is_invalid);
        prop_assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn prop_short_magic_prefixes_are_rejected(len in 0usize..=4) {
        let spy = SpyEngine::default();
        let mut decoder = VcdiffDecoder::with_engine(&spy);
        decoder.set_base(b"base").unwrap();
        prop_assert!(decoder.apply_delta(&VCDIFF_MAGIC[..len]).is_err());
        prop_assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn prop_text_representations_are_idempotent(text in ".*") {
        let bytes = codec::bytes_from_text(&text);
        prop_assert_eq!(codec::text_from_bytes(&bytes), text.as_str());

        let encoded = codec::encode_base64(&bytes);
        prop_assert_eq!(codec::decode_base64(&encoded).unwrap(), bytes);
    }

    #[test]
    fn prop_failures_leave_state_untouched(
        base in proptest::collection::vec(any::<u8>(), 0..128),
        garbage in proptest::collection::vec(any::<u8>(), 0..128),
        held in "[a-z0-9]{1,8}",
        claimed in "[a-z0-9]{1,8}",
    ) {
        let mut decoder = CheckedVcdiffDecoder::new();
        decoder.set_base(&base, held.as_str()).unwrap();

        let mut delta = VCDIFF_MAGIC.to_vec();
        delta.push(0);
        delta.extend_from_slice(&garbage);

        let outcome = decoder.apply_delta(&delta, "next", claimed.as_str());
        if claimed != held {
            let is_continuity = matches!(outcome, Err(Error::Continuity(_)));
            prop_assert!(is_continuity);
        }
        if outcome.is_err() {
            prop_assert_eq!(decoder.sequence_token(), &SequenceToken::from(held.as_str()));
            // The held id still chains.
            let empty = decoder
                .apply_delta(&[0xD6, 0xC3, 0xC4, 0x00, 0x00], "probe", held.as_str())
                .unwrap();
            prop_assert!(empty.is_empty());
        }
    }

    #[test]
    fn prop_garbage_after_magic_never_panics(
        base in proptest::collection::vec(any::<u8>(), 0..256),
        body in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut delta = VCDIFF_MAGIC.to_vec();
        delta.extend_from_slice(&body);
        let _ = deltachain::vcdiff::decode_memory(&delta, &base);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_chain_matches_xdelta3_reference(
        versions in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 64..512),
            2..5,
        )
    ) {
        let mut decoder = VcdiffDecoder::new();
        decoder.set_base(&versions[0]).unwrap();

        for pair in versions.windows(2) {
            let delta = xdelta3::encode(&pair[1], &pair[0]).expect("xdelta3 encode failed");
            let result = decoder.apply_delta(&delta).unwrap();
            prop_assert_eq!(result.as_bytes(), pair[1].as_slice());
        }
    }
}
