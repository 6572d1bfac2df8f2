#![no_main]
use deltachain::{CheckedVcdiffDecoder, SequenceToken};
use libfuzzer_sys::fuzz_target;

const MAGIC: [u8; 5] = [0xD6, 0xC3, 0xC4, 0x00, 0x00];

fuzz_target!(|data: &[u8]| {
    // First byte picks the base length, the rest is split into deltas on 0xFF.
    let Some((&base_len, rest)) = data.split_first() else {
        return;
    };
    let (base, rest) = rest.split_at((base_len as usize).min(rest.len()));

    let mut decoder = CheckedVcdiffDecoder::new();
    if decoder.set_base(base, "0").is_err() {
        return;
    }

    for (i, chunk) in rest.split(|&b| b == 0xFF).enumerate() {
        let before = decoder.sequence_token().clone();
        let mut delta = MAGIC.to_vec();
        delta.extend_from_slice(chunk);

        let id = SequenceToken::new((i + 1).to_string());
        match decoder.apply_delta(&delta, id.clone(), before.clone()) {
            Ok(_) => assert_eq!(decoder.sequence_token(), &id),
            Err(_) => assert_eq!(decoder.sequence_token(), &before),
        }
    }
});
