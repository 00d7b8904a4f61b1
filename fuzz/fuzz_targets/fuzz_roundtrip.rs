#![no_main]

use libfuzzer_sys::fuzz_target;
use rebrotli::{compress, EncoderParams};
use std::io::{Cursor, Read};

fuzz_target!(|data: &[u8]| {
    // First two bytes pick the parameters, the rest is the input
    if data.len() < 2 {
        return;
    }
    let quality = (data[0] % 12) as u32;
    let lgwin = 10 + (data[1] % 15) as u32;

    // Limit data size to avoid slowdowns at the high qualities
    let input = &data[2..];
    let input = if input.len() > 64 * 1024 { &input[..64 * 1024] } else { input };

    let params = EncoderParams::default().with_quality(quality).with_window_bits(lgwin);
    let compressed = compress(input, &params).expect("valid parameters");

    let mut decompressed = Vec::new();
    brotli_decompressor::Decompressor::new(Cursor::new(&compressed), 4096)
        .read_to_end(&mut decompressed)
        .expect("output should decode");
    assert_eq!(decompressed, input, "Round-trip mismatch");
});
