//! End-to-end integration tests for rebrotli.
//!
//! Every stream is decoded with an independent Brotli decoder and compared
//! with the input.

use std::io::{Cursor, Read, Write};
use std::process::Command;

use rebrotli::{compress, BrotliWriter, Encoder, EncoderMode, EncoderParams, Error, StreamState};

// ============================================================================
// Test Data Generators
// ============================================================================

/// Generate random data using a simple PRNG
fn generate_random_data(size: usize, seed: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state = seed;
    for _ in 0..size {
        // Simple xorshift PRNG
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        data.push((state & 0xFF) as u8);
    }
    data
}

/// Generate highly repetitive data (good compression)
fn generate_repetitive_data(size: usize) -> Vec<u8> {
    let pattern = b"ABCDABCDABCDABCD";
    pattern.iter().cycle().take(size).copied().collect()
}

/// Generate English-like text from a small vocabulary
fn generate_text_data(size: usize, seed: u64) -> Vec<u8> {
    const WORDS: &[&str] = &[
        "the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "compression", "window",
        "stream", "block", "of", "and", "a", "with", "information", "between", "people", "world",
        "during", "because", "encoder", "distance", "literal", "system",
    ];
    let mut data = Vec::with_capacity(size + 16);
    let mut state = seed | 1;
    let mut words_in_sentence = 0;
    while data.len() < size {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let word = WORDS[(state % WORDS.len() as u64) as usize];
        if words_in_sentence == 0 {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                data.extend(first.to_uppercase().to_string().bytes());
                data.extend(chars.as_str().bytes());
            }
        } else {
            data.extend_from_slice(word.as_bytes());
        }
        words_in_sentence += 1;
        if words_in_sentence > 4 + (state >> 32) % 8 {
            data.extend_from_slice(b". ");
            words_in_sentence = 0;
        } else {
            data.push(b' ');
        }
    }
    data.truncate(size);
    data
}

fn decompress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    brotli_decompressor::Decompressor::new(Cursor::new(data), 4096)
        .read_to_end(&mut out)
        .expect("stream should decode");
    out
}

fn params(quality: u32) -> EncoderParams {
    EncoderParams::default().with_quality(quality)
}

/// Compress in one call and check the round trip
fn roundtrip(data: &[u8], params: &EncoderParams) -> Vec<u8> {
    let compressed = compress(data, params).unwrap();
    assert_eq!(
        decompress(&compressed),
        data,
        "round trip failed: quality {}, lgwin {}, {} bytes",
        params.quality,
        params.lgwin,
        data.len()
    );
    compressed
}

/// Feed `data` through the streaming writer in `chunk` sized writes
fn compress_chunked(data: &[u8], params: EncoderParams, chunk: usize) -> Vec<u8> {
    let mut writer = BrotliWriter::new(Vec::new(), params).unwrap();
    for piece in data.chunks(chunk) {
        writer.write_all(piece).unwrap();
    }
    writer.finish().unwrap()
}

// ============================================================================
// One-shot Compression
// ============================================================================

#[test]
fn test_empty_input_all_qualities() {
    for quality in 0..=11 {
        let compressed = roundtrip(b"", &params(quality));
        assert!(compressed.len() <= 2, "quality {}: {} bytes", quality, compressed.len());
    }
}

#[test]
fn test_single_byte_all_qualities() {
    for quality in 0..=11 {
        roundtrip(b"x", &params(quality));
    }
}

#[test]
fn test_text_all_qualities() {
    let data = generate_text_data(40_000, 7);
    let mut sizes = Vec::new();
    for quality in 0..=11 {
        let compressed = roundtrip(&data, &params(quality));
        assert!(compressed.len() < data.len() / 2, "quality {}: {} bytes", quality, compressed.len());
        sizes.push(compressed.len());
    }
    // the optimal parser should beat the greedy one and the fastest mode
    assert!(sizes[11] <= sizes[9], "sizes: {:?}", sizes);
    assert!(sizes[11] < sizes[0], "sizes: {:?}", sizes);
}

#[test]
fn test_random_data_all_qualities() {
    let data = generate_random_data(64 * 1024, 42);
    for quality in 0..=11 {
        let compressed = roundtrip(&data, &params(quality));
        // stored meta-blocks keep the expansion to a few header bytes
        assert!(
            compressed.len() < data.len() + 64,
            "quality {}: {} bytes for {} input",
            quality,
            compressed.len(),
            data.len()
        );
    }
}

#[test]
fn test_highly_repetitive_data() {
    let data = generate_repetitive_data(1 << 20);
    for quality in [1, 5, 9] {
        let compressed = roundtrip(&data, &params(quality));
        assert!(compressed.len() < 10_000, "quality {}: {} bytes", quality, compressed.len());
    }
}

#[test]
fn test_single_repeated_byte_at_best_quality() {
    let data = vec![b'z'; 1 << 20];
    let compressed = roundtrip(&data, &params(11));
    assert!(compressed.len() < data.len() / 1000, "{} bytes", compressed.len());
}

#[test]
fn test_random_megabyte_is_stored() {
    let data = generate_random_data(1 << 20, 71);
    for quality in [0, 1, 5] {
        let mut writer = BrotliWriter::new(Vec::new(), params(quality)).unwrap();
        writer.write_all(&data).unwrap();
        writer.try_finish().unwrap();
        assert!(writer.stats().uncompressed_meta_blocks >= 1, "quality {}", quality);
        let compressed = writer.into_inner();
        assert!(compressed.len() < data.len() + 256, "quality {}: {} bytes", quality, compressed.len());
        assert_eq!(decompress(&compressed), data, "quality {}", quality);
    }
}

#[test]
fn test_repeat_through_distance_cache() {
    for quality in [10, 11] {
        roundtrip(b"x the .com/ x the .com/ ", &params(quality));
    }
}

#[test]
fn test_dictionary_heavy_text_all_windows() {
    let phrases: &[&[u8]] = &[
        b" the ", b".com/", b"http://www.", b" of the ", b"information", b" and ", b"<div class=\"",
        b"\">", b" in the ", b"government", b", ", b"international ",
    ];
    let mut data = Vec::new();
    let mut state = 17u64;
    while data.len() < 50_000 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        data.extend_from_slice(phrases[(state % phrases.len() as u64) as usize]);
        if state % 5 == 0 {
            data.extend(generate_random_data(3, state).iter().map(|b| b'a' + b % 26));
        }
    }
    for lgwin in [10, 16, 22, 24] {
        for quality in [9, 10, 11] {
            roundtrip(&data, &params(quality).with_window_bits(lgwin));
        }
    }
}

#[test]
fn test_mixed_text_and_noise() {
    let mut data = generate_text_data(30_000, 3);
    data.extend(generate_random_data(20_000, 9));
    data.extend(generate_text_data(30_000, 3));
    for quality in [0, 2, 4, 7, 10] {
        roundtrip(&data, &params(quality));
    }
}

// ============================================================================
// Window and Block Sizes
// ============================================================================

#[test]
fn test_small_windows() {
    let data = generate_text_data(60_000, 11);
    for lgwin in [10, 12, 16] {
        for quality in [0, 1, 3, 6, 9, 10] {
            roundtrip(&data, &params(quality).with_window_bits(lgwin));
        }
    }
}

#[test]
fn test_input_larger_than_window() {
    // repeats farther apart than the window must not be referenced
    let chunk = generate_random_data(40_000, 5);
    let mut data = chunk.clone();
    data.extend(generate_text_data(50_000, 6));
    data.extend(&chunk);
    for quality in [2, 5, 9] {
        roundtrip(&data, &params(quality).with_window_bits(16));
    }
}

#[test]
fn test_custom_block_bits() {
    let data = generate_text_data(300_000, 13);
    for lgblock in [16, 20, 24] {
        roundtrip(&data, &params(5).with_block_bits(lgblock));
    }
}

#[test]
fn test_maximum_standard_window() {
    let data = generate_text_data(100_000, 17);
    roundtrip(&data, &params(9).with_window_bits(24));
}

// ============================================================================
// Encoder Options
// ============================================================================

#[test]
fn test_modes() {
    let data = generate_text_data(20_000, 19);
    for mode in [EncoderMode::Generic, EncoderMode::Text, EncoderMode::Font] {
        for quality in [1, 4, 6, 10] {
            roundtrip(&data, &params(quality).with_mode(mode));
        }
    }
}

#[test]
fn test_literal_context_modeling_toggle() {
    let data = generate_text_data(50_000, 23);
    for quality in [5, 9, 11] {
        roundtrip(&data, &params(quality).with_literal_context_modeling(false));
    }
}

#[test]
fn test_binary_data_uses_signed_context() {
    // little-endian 16-bit samples of a slow ramp
    let data: Vec<u8> = (0..20_000i32).flat_map(|i| ((i % 700 - 350) as i16).to_le_bytes()).collect();
    for quality in [10, 11] {
        roundtrip(&data, &params(quality));
    }
}

#[test]
fn test_size_hint_does_not_change_output_validity() {
    let data = generate_text_data(30_000, 29);
    roundtrip(&data, &params(10).with_size_hint(1 << 30));
    roundtrip(&data, &params(11).with_size_hint(100));
}

#[test]
fn test_invalid_params_rejected() {
    assert!(matches!(
        Encoder::new(params(12)),
        Err(Error::InvalidParameter { name: "quality", .. })
    ));
    assert!(matches!(
        Encoder::new(params(5).with_window_bits(8)),
        Err(Error::InvalidParameter { name: "lgwin", .. })
    ));
}

// ============================================================================
// Streaming
// ============================================================================

#[test]
fn test_chunked_writes_match_input() {
    let data = generate_text_data(150_000, 31);
    for (quality, chunk) in [(0, 1000), (1, 333), (3, 4096), (5, 65_536), (9, 17), (10, 50_000)] {
        let compressed = compress_chunked(&data, params(quality), chunk);
        assert_eq!(decompress(&compressed), data, "quality {} chunk {}", quality, chunk);
    }
}

#[test]
fn test_one_byte_writes_match_single_write() {
    // with a fixed size hint the block schedule depends only on the data
    let data = generate_text_data(300_000, 61);
    for quality in [1, 5, 9] {
        let params = params(quality).with_size_hint(data.len());
        let whole = compress_chunked(&data, params.clone(), data.len());
        let bytewise = compress_chunked(&data, params, 1);
        assert!(whole == bytewise, "quality {}: outputs differ", quality);
        assert_eq!(decompress(&whole), data);
    }
}

#[test]
fn test_flush_between_writes() {
    let data = generate_text_data(80_000, 37);
    for quality in [0, 1, 2, 4, 8, 11] {
        let mut writer = BrotliWriter::new(Vec::new(), params(quality)).unwrap();
        for (i, piece) in data.chunks(7_000).enumerate() {
            writer.write_all(piece).unwrap();
            if i % 2 == 0 {
                writer.flush().unwrap();
            }
        }
        let compressed = writer.finish().unwrap();
        assert_eq!(decompress(&compressed), data, "quality {}", quality);
    }
}

#[test]
fn test_flushed_prefix_is_decodable() {
    let data = generate_text_data(10_000, 41);
    let mut encoder = Encoder::new(params(6)).unwrap();
    encoder.process(&data).unwrap();
    encoder.flush().unwrap();
    assert_eq!(encoder.state(), StreamState::Processing);
    let mut prefix = encoder.take_output();
    // an empty last meta-block closes the stream
    prefix.push(0x03);
    assert_eq!(decompress(&prefix), data);
}

#[test]
fn test_metadata_is_skipped() {
    let data = generate_text_data(20_000, 43);
    for quality in [0, 1, 5, 11] {
        let mut writer = BrotliWriter::new(Vec::new(), params(quality)).unwrap();
        writer.write_metadata(b"header: generated by the test suite").unwrap();
        writer.write_all(&data[..10_000]).unwrap();
        writer.write_metadata(&generate_random_data(70_000, 1)).unwrap();
        writer.write_all(&data[10_000..]).unwrap();
        writer.write_metadata(b"").unwrap();
        let stats = writer.stats().clone();
        let compressed = writer.finish().unwrap();
        assert_eq!(stats.metadata_bytes, 35 + 70_000);
        assert_eq!(decompress(&compressed), data, "quality {}", quality);
    }
}

#[test]
fn test_metadata_too_large() {
    let mut encoder = Encoder::new(params(5)).unwrap();
    assert!(matches!(encoder.begin_metadata((1 << 24) + 1), Err(Error::MetadataTooLarge { .. })));
    // the stream is still usable
    encoder.process(b"still fine").unwrap();
    encoder.finish().unwrap();
    assert_eq!(decompress(&encoder.take_output()), b"still fine");
}

#[test]
fn test_metadata_in_pieces() {
    let mut encoder = Encoder::new(params(3)).unwrap();
    encoder.process(b"before ").unwrap();
    encoder.begin_metadata(6).unwrap();
    assert_eq!(encoder.state(), StreamState::MetadataBody);
    assert!(matches!(encoder.process(b"x"), Err(Error::MetadataPending { .. })));
    encoder.write_metadata(b"abc").unwrap();
    encoder.write_metadata(b"def").unwrap();
    assert_eq!(encoder.state(), StreamState::Processing);
    encoder.process(b"after").unwrap();
    encoder.finish().unwrap();
    assert_eq!(decompress(&encoder.take_output()), b"before after");
}

#[test]
fn test_finish_is_idempotent() {
    let mut encoder = Encoder::new(params(7)).unwrap();
    encoder.process(b"done once").unwrap();
    encoder.finish().unwrap();
    let first = encoder.take_output();
    encoder.finish().unwrap();
    assert!(encoder.take_output().is_empty());
    assert!(encoder.is_finished());
    assert!(matches!(encoder.process(b"late"), Err(Error::StreamFinished)));
    assert_eq!(decompress(&first), b"done once");
}

#[test]
fn test_stats_account_for_all_bytes() {
    let data = generate_text_data(200_000, 47);
    let mut writer = BrotliWriter::new(Vec::new(), params(5)).unwrap();
    writer.write_all(&data).unwrap();
    writer.try_finish().unwrap();
    let stats = writer.stats().clone();
    let compressed = writer.into_inner();
    assert_eq!(stats.input_bytes, data.len() as u64);
    assert_eq!(stats.output_bytes, compressed.len() as u64);
    assert!(stats.meta_blocks >= 1);
}

// ============================================================================
// Files
// ============================================================================

#[test]
fn test_compress_to_file() {
    let data = generate_text_data(120_000, 53);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("text.br");

    let file = std::fs::File::create(&path).unwrap();
    let mut writer = BrotliWriter::new(std::io::BufWriter::new(file), params(6)).unwrap();
    writer.write_all(&data).unwrap();
    writer.finish().unwrap();

    let compressed = std::fs::read(&path).unwrap();
    assert!(compressed.len() < data.len() / 3);
    assert_eq!(decompress(&compressed), data);
}

#[test]
fn test_cli_roundtrip() {
    let data = generate_text_data(50_000, 59);
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.txt");
    let compressed = dir.path().join("input.txt.br");
    let restored = dir.path().join("restored.txt");
    std::fs::write(&input, &data).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_rebrotli"))
        .args(["-q", "5", "-w", "18", "--mode", "text", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(&compressed)
        .status()
        .expect("Failed to run CLI");
    assert!(status.success());
    assert_eq!(decompress(&std::fs::read(&compressed).unwrap()), data);

    let status = Command::new(env!("CARGO_BIN_EXE_rebrotli"))
        .arg("-d")
        .arg("-i")
        .arg(&compressed)
        .arg("-o")
        .arg(&restored)
        .status()
        .expect("Failed to run CLI");
    assert!(status.success());
    assert_eq!(std::fs::read(&restored).unwrap(), data);
}

#[test]
fn test_cli_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty");
    let output = dir.path().join("empty.br");
    std::fs::write(&input, b"").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_rebrotli"))
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .status()
        .expect("Failed to run CLI");
    assert!(status.success());
    assert!(decompress(&std::fs::read(&output).unwrap()).is_empty());
}

#[test]
fn test_cli_rejects_corrupt_stream() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("garbage.br");
    let output = dir.path().join("garbage.out");
    // window bits escape 0b0001 is only valid in large-window streams
    std::fs::write(&input, [0x11u8; 64]).unwrap();

    let result = Command::new(env!("CARGO_BIN_EXE_rebrotli"))
        .arg("-d")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .output()
        .expect("Failed to run CLI");
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("Corrupt"));
}
