#![no_main]
use deltachain::vcdiff::{decoder, header};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must only ever produce errors, never panics.
    let _ = decoder::decode_memory(data, &[]);
    let _ = header::read_headers(data);

    if data.len() >= 2 {
        let split = data.len() / 2;
        let (source, delta) = data.split_at(split);
        let _ = decoder::decode_memory_with(delta, source, false, 1 << 20);
    }
});
