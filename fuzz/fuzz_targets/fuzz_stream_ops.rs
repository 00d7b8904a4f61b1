#![no_main]

use libfuzzer_sys::fuzz_target;
use rebrotli::{Encoder, EncoderParams};
use std::io::{Cursor, Read};

fuzz_target!(|data: &[u8]| {
    // Interprets the input as a script of encoder calls:
    // op byte, length byte, then that many payload bytes
    if data.is_empty() {
        return;
    }
    let params = EncoderParams::default().with_quality((data[0] % 12) as u32).with_window_bits(16);
    let mut encoder = match Encoder::new(params) {
        Ok(e) => e,
        Err(_) => return,
    };

    let mut expected = Vec::new();
    let mut output = Vec::new();
    let mut rest = &data[1..];
    while rest.len() >= 2 {
        let (op, len) = (rest[0] % 4, rest[1] as usize);
        rest = &rest[2..];
        let payload = &rest[..len.min(rest.len())];
        rest = &rest[payload.len()..];

        match op {
            0 | 1 => {
                encoder.process(payload).expect("process");
                expected.extend_from_slice(payload);
            }
            2 => encoder.flush().expect("flush"),
            _ => encoder.emit_metadata(payload).expect("metadata"),
        }
        output.extend(encoder.take_output());
    }
    encoder.finish().expect("finish");
    output.extend(encoder.take_output());

    let mut decompressed = Vec::new();
    brotli_decompressor::Decompressor::new(Cursor::new(&output), 4096)
        .read_to_end(&mut decompressed)
        .expect("output should decode");
    assert_eq!(decompressed, expected, "Round-trip mismatch");
});
