//! Serialization of meta-blocks into the Brotli bitstream.
//!
//! Headers and small shared fields live here; prefix-code storage is in
//! [`huffman`], block switching and context maps in [`block`], and the
//! complete meta-block writers in [`meta_block`].

pub mod block;
pub mod huffman;
pub mod meta_block;

pub use block::{encode_context_map, store_trivial_context_map, BlockEncoder, BlockSplitCode};
pub use huffman::{build_and_store_huffman_tree, build_and_store_huffman_tree_fast, store_huffman_tree};
pub use meta_block::{store_meta_block, store_meta_block_fast, store_meta_block_trivial};

use crate::bits::BitWriter;
use crate::command::{copy_base, copy_extra, copy_length_code, insert_base, insert_extra, insert_length_code, Command};

/// Stream header encoding the window size, as `(bits, bit_count)`
///
/// The large-window escape (`0x11` followed by six window bits) is only
/// understood by decoders with the extension enabled.
pub fn encode_window_bits(lgwin: u32, large_window: bool) -> (u16, u8) {
    if large_window {
        ((((lgwin & 0x3F) << 8) | 0x11) as u16, 14)
    } else if lgwin == 16 {
        (0, 1)
    } else if lgwin == 17 {
        (1, 7)
    } else if lgwin > 17 {
        ((((lgwin - 17) << 1) | 0x01) as u16, 4)
    } else {
        ((((lgwin - 8) << 4) | 0x01) as u16, 7)
    }
}

/// MLEN field of a meta-block header: `(nibbles - 4, bit_count, length - 1)`
fn encode_mlen(length: usize) -> (u64, u32, u64) {
    debug_assert!(length > 0 && length <= 1 << 24);
    let lg = if length == 1 { 1 } else { (usize::BITS - (length - 1).leading_zeros()) as usize };
    let mnibbles = (if lg < 16 { 16 } else { lg + 3 }) / 4;
    ((mnibbles - 4) as u64, (mnibbles * 4) as u32, (length - 1) as u64)
}

/// Numbers 0-255 in the variable-length code used for block type and
/// tree counts
pub fn store_var_len_uint8(n: usize, writer: &mut BitWriter) {
    if n == 0 {
        writer.write_bits(1, 0);
    } else {
        let nbits = usize::BITS - 1 - n.leading_zeros();
        writer.write_bits(1, 1);
        writer.write_bits(3, nbits as u64);
        writer.write_bits(nbits, (n - (1 << nbits)) as u64);
    }
}

/// ISLAST, ISEMPTY, MNIBBLES, MLEN and ISUNCOMPRESSED of a compressed
/// meta-block
pub fn store_compressed_meta_block_header(is_final_block: bool, length: usize, writer: &mut BitWriter) {
    writer.write_bit(is_final_block);
    if is_final_block {
        // ISEMPTY
        writer.write_bits(1, 0);
    }
    let (nibbles, nlenbits, lenbits) = encode_mlen(length);
    writer.write_bits(2, nibbles);
    writer.write_bits(nlenbits, lenbits);
    if !is_final_block {
        // ISUNCOMPRESSED
        writer.write_bits(1, 0);
    }
}

pub fn store_uncompressed_meta_block_header(length: usize, writer: &mut BitWriter) {
    writer.write_bits(1, 0);
    let (nibbles, nlenbits, lenbits) = encode_mlen(length);
    writer.write_bits(2, nibbles);
    writer.write_bits(nlenbits, lenbits);
    writer.write_bits(1, 1);
}

/// A final empty meta-block, byte aligned
pub fn store_empty_last_meta_block(writer: &mut BitWriter) {
    // ISLAST, ISEMPTY
    writer.write_bits(2, 3);
    writer.align_to_byte();
}

/// Empty metadata block that pads the stream to a byte boundary
pub fn store_padding_block(writer: &mut BitWriter) {
    // ISLAST = 0, MNIBBLES = 11 (metadata), reserved, MSKIPBYTES = 0
    writer.write_bits(6, 0x6);
    writer.align_to_byte();
}

/// Header of a metadata block carrying `length` bytes, byte aligned
pub fn store_metadata_header(length: usize, writer: &mut BitWriter) {
    writer.write_bits(1, 0);
    writer.write_bits(2, 3);
    writer.write_bits(1, 0);
    if length == 0 {
        writer.write_bits(2, 0);
    } else {
        let nbits = if length == 1 { 1 } else { usize::BITS - (length - 1).leading_zeros() };
        let nbytes = nbits.div_ceil(8);
        writer.write_bits(2, nbytes as u64);
        writer.write_bits(8 * nbytes, (length - 1) as u64);
    }
    writer.align_to_byte();
}

/// Copy `len` bytes at `position` of the ring buffer as an uncompressed
/// meta-block
pub fn store_uncompressed_meta_block(
    is_final_block: bool,
    ringbuffer: &[u8],
    position: usize,
    mask: usize,
    len: usize,
    writer: &mut BitWriter,
) {
    let mut masked_pos = position & mask;
    let mut len = len;
    store_uncompressed_meta_block_header(len, writer);
    writer.align_to_byte();
    // `usize::MAX` marks a contiguous input that never wraps
    if let Some(size) = mask.checked_add(1).filter(|&size| masked_pos + len > size) {
        let len1 = size - masked_pos;
        writer.write_bytes(&ringbuffer[masked_pos..masked_pos + len1]);
        len -= len1;
        masked_pos = 0;
    }
    writer.write_bytes(&ringbuffer[masked_pos..masked_pos + len]);
    if is_final_block {
        store_empty_last_meta_block(writer);
    }
}

/// Extra bits of the insert and copy lengths of `cmd`
pub(crate) fn store_command_extra(cmd: &Command, writer: &mut BitWriter) {
    let copylen_code = cmd.copy_len_code();
    let inscode = insert_length_code(cmd.insert_len as usize);
    let copycode = copy_length_code(copylen_code as usize);
    let insnumextra = insert_extra(inscode);
    let insextraval = (cmd.insert_len - insert_base(inscode)) as u64;
    let copyextraval = (copylen_code - copy_base(copycode)) as u64;
    let bits = (copyextraval << insnumextra) | insextraval;
    writer.write_bits(insnumextra + copy_extra(copycode), bits);
}


#[cfg(test)]
mod tests {
    use super::test_util::decompress;
    use super::*;

    fn with_header(lgwin: u32) -> BitWriter {
        let (bits, nbits) = encode_window_bits(lgwin, false);
        BitWriter::with_pending(bits, nbits, 64)
    }

    #[test]
    fn test_window_bits() {
        assert_eq!(encode_window_bits(16, false), (0, 1));
        assert_eq!(encode_window_bits(17, false), (1, 7));
        assert_eq!(encode_window_bits(22, false), (0b1011, 4));
        assert_eq!(encode_window_bits(10, false), (0x21, 7));
        assert_eq!(encode_window_bits(30, true), (0x1E11, 14));
    }

    #[test]
    fn test_mlen_nibbles() {
        assert_eq!(encode_mlen(1), (0, 16, 0));
        assert_eq!(encode_mlen(65536), (0, 16, 65535));
        assert_eq!(encode_mlen(65537), (1, 20, 65536));
        assert_eq!(encode_mlen(1 << 24), (2, 24, (1 << 24) - 1));
    }

    #[test]
    fn test_var_len_uint8() {
        let mut writer = BitWriter::new();
        store_var_len_uint8(0, &mut writer);
        assert_eq!(writer.bit_len(), 1);
        store_var_len_uint8(255, &mut writer);
        assert_eq!(writer.bit_len(), 1 + 4 + 7);
    }

    #[test]
    fn test_empty_stream_decodes() {
        for lgwin in [10, 16, 17, 22, 24] {
            let mut writer = with_header(lgwin);
            store_empty_last_meta_block(&mut writer);
            assert_eq!(decompress(&writer.finish()).expect("valid stream"), b"");
        }
    }

    #[test]
    fn test_uncompressed_block_decodes() {
        let data = b"0123456789abcdef".repeat(5);
        // wrapped view: the block starts 16 bytes before the end of the ring
        let mask = 63;
        let mut ring = vec![0u8; 64];
        for (i, &b) in data[..64].iter().enumerate() {
            ring[(48 + i) & mask] = b;
        }
        let mut writer = with_header(16);
        store_uncompressed_meta_block(true, &ring, 48, mask, 64, &mut writer);
        assert_eq!(decompress(&writer.finish()).expect("valid stream"), &data[..64]);
    }

    #[test]
    fn test_uncompressed_block_from_unmasked_input() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i * 7 + i / 251) as u8).collect();
        let mut writer = with_header(22);
        store_uncompressed_meta_block(false, &data, 0, usize::MAX, 1 << 17, &mut writer);
        store_uncompressed_meta_block(true, &data, 1 << 17, usize::MAX, data.len() - (1 << 17), &mut writer);
        assert_eq!(decompress(&writer.finish()).expect("valid stream"), data);
    }

    #[test]
    fn test_metadata_and_padding_are_skipped() {
        let mut writer = with_header(22);
        store_padding_block(&mut writer);
        store_metadata_header(5, &mut writer);
        writer.write_bytes(b"notes");
        store_uncompressed_meta_block(true, b"abc", 0, usize::MAX, 3, &mut writer);
        assert_eq!(decompress(&writer.finish()).expect("valid stream"), b"abc");
    }
}
