//! Complete compressed meta-blocks.

use super::block::{encode_context_map, store_trivial_context_map, BlockEncoder};
use super::huffman::{build_and_store_huffman_tree, build_and_store_huffman_tree_fast};
use super::{store_command_extra, store_compressed_meta_block_header};
use crate::bits::BitWriter;
use crate::command::{Command, DistanceParams};
use crate::constants::{
    DISTANCE_CONTEXT_BITS, LITERAL_CONTEXT_BITS, NUM_COMMAND_SYMBOLS, NUM_HISTOGRAM_DISTANCE_SYMBOLS,
    NUM_LITERAL_SYMBOLS,
};
use crate::context::{ContextLut, ContextMode};
use crate::entropy::{HistogramCommand, HistogramDistance, HistogramLiteral};
use crate::huffman::HuffmanTree;
use crate::metablock::MetaBlockSplit;

/// Distance symbols that get a code; the rest of a large-window alphabet
/// is never produced
fn distance_histogram_length(dist: &DistanceParams) -> usize {
    (dist.alphabet_size as usize).min(NUM_HISTOGRAM_DISTANCE_SYMBOLS)
}

fn huffman_pool() -> Vec<HuffmanTree> {
    Vec::with_capacity(2 * NUM_COMMAND_SYMBOLS + 1)
}

/// Store a meta-block with block splits, context maps and one prefix code
/// per clustered histogram
#[allow(clippy::too_many_arguments)]
pub fn store_meta_block(
    ringbuffer: &[u8],
    start_pos: usize,
    length: usize,
    mask: usize,
    mut prev_byte: u8,
    mut prev_byte2: u8,
    is_last: bool,
    dist: &DistanceParams,
    literal_context_mode: ContextMode,
    commands: &[Command],
    mb: &MetaBlockSplit,
    writer: &mut BitWriter,
) {
    let lut = ContextLut::new(literal_context_mode);
    let num_distance_symbols = distance_histogram_length(dist);
    let mut pool = huffman_pool();

    store_compressed_meta_block_header(is_last, length, writer);

    let mut literal_enc =
        BlockEncoder::new(NUM_LITERAL_SYMBOLS, &mb.literal_split.types, &mb.literal_split.lengths);
    let mut command_enc =
        BlockEncoder::new(NUM_COMMAND_SYMBOLS, &mb.command_split.types, &mb.command_split.lengths);
    let mut distance_enc =
        BlockEncoder::new(num_distance_symbols, &mb.distance_split.types, &mb.distance_split.lengths);

    literal_enc.build_and_store_block_switch_codes(mb.literal_split.num_types, &mut pool, writer);
    command_enc.build_and_store_block_switch_codes(mb.command_split.num_types, &mut pool, writer);
    distance_enc.build_and_store_block_switch_codes(mb.distance_split.num_types, &mut pool, writer);

    writer.write_bits(2, dist.postfix_bits as u64);
    writer.write_bits(4, (dist.num_direct_codes >> dist.postfix_bits) as u64);
    for _ in 0..mb.literal_split.num_types {
        writer.write_bits(2, literal_context_mode as u64);
    }

    if mb.literal_context_map.is_empty() {
        store_trivial_context_map(mb.literal_histograms.len(), LITERAL_CONTEXT_BITS, &mut pool, writer);
    } else {
        encode_context_map(&mb.literal_context_map, mb.literal_histograms.len(), &mut pool, writer);
    }
    if mb.distance_context_map.is_empty() {
        store_trivial_context_map(mb.distance_histograms.len(), DISTANCE_CONTEXT_BITS, &mut pool, writer);
    } else {
        encode_context_map(&mb.distance_context_map, mb.distance_histograms.len(), &mut pool, writer);
    }

    literal_enc.build_and_store_entropy_codes(&mb.literal_histograms, NUM_LITERAL_SYMBOLS, &mut pool, writer);
    command_enc.build_and_store_entropy_codes(&mb.command_histograms, NUM_COMMAND_SYMBOLS, &mut pool, writer);
    distance_enc.build_and_store_entropy_codes(
        &mb.distance_histograms,
        dist.alphabet_size as usize,
        &mut pool,
        writer,
    );

    let mut pos = start_pos;
    for cmd in commands {
        command_enc.store_symbol(cmd.cmd_prefix as usize, writer);
        store_command_extra(cmd, writer);
        if mb.literal_context_map.is_empty() {
            for _ in 0..cmd.insert_len {
                literal_enc.store_symbol(ringbuffer[pos & mask] as usize, writer);
                pos += 1;
            }
        } else {
            for _ in 0..cmd.insert_len {
                let context = lut.context(prev_byte, prev_byte2);
                let literal = ringbuffer[pos & mask];
                literal_enc.store_symbol_with_context(
                    literal as usize,
                    context,
                    &mb.literal_context_map,
                    LITERAL_CONTEXT_BITS,
                    writer,
                );
                prev_byte2 = prev_byte;
                prev_byte = literal;
                pos += 1;
            }
        }
        let copy_len = cmd.copy_len() as usize;
        pos += copy_len;
        if copy_len != 0 {
            prev_byte2 = ringbuffer[(pos - 2) & mask];
            prev_byte = ringbuffer[(pos - 1) & mask];
            if !cmd.uses_implicit_distance() {
                let dist_code = cmd.distance_symbol() as usize;
                let dist_num_extra = (cmd.dist_prefix >> 10) as u32;
                if mb.distance_context_map.is_empty() {
                    distance_enc.store_symbol(dist_code, writer);
                } else {
                    distance_enc.store_symbol_with_context(
                        dist_code,
                        cmd.distance_context() as usize,
                        &mb.distance_context_map,
                        DISTANCE_CONTEXT_BITS,
                        writer,
                    );
                }
                writer.write_bits(dist_num_extra, cmd.dist_extra as u64);
            }
        }
    }
    if is_last {
        writer.align_to_byte();
    }
}

/// Literal, command and distance histograms of a command run
fn build_histograms(
    ringbuffer: &[u8],
    start_pos: usize,
    mask: usize,
    commands: &[Command],
) -> (HistogramLiteral, HistogramCommand, HistogramDistance) {
    let mut lit = HistogramLiteral::new();
    let mut cmd_histo = HistogramCommand::new();
    let mut dist = HistogramDistance::new();
    let mut pos = start_pos;
    for cmd in commands {
        cmd_histo.add(cmd.cmd_prefix as usize);
        for _ in 0..cmd.insert_len {
            lit.add(ringbuffer[pos & mask] as usize);
            pos += 1;
        }
        pos += cmd.copy_len() as usize;
        if cmd.copy_len() != 0 && !cmd.uses_implicit_distance() {
            dist.add(cmd.distance_symbol() as usize);
        }
    }
    (lit, cmd_histo, dist)
}

/// One prefix code per alphabet, written as `(depth, bits)` tables
struct EntropyCodes {
    lit_depth: [u8; NUM_LITERAL_SYMBOLS],
    lit_bits: [u16; NUM_LITERAL_SYMBOLS],
    cmd_depth: [u8; NUM_COMMAND_SYMBOLS],
    cmd_bits: [u16; NUM_COMMAND_SYMBOLS],
    dist_depth: [u8; NUM_HISTOGRAM_DISTANCE_SYMBOLS],
    dist_bits: [u16; NUM_HISTOGRAM_DISTANCE_SYMBOLS],
}

impl EntropyCodes {
    fn new() -> Self {
        Self {
            lit_depth: [0; NUM_LITERAL_SYMBOLS],
            lit_bits: [0; NUM_LITERAL_SYMBOLS],
            cmd_depth: [0; NUM_COMMAND_SYMBOLS],
            cmd_bits: [0; NUM_COMMAND_SYMBOLS],
            dist_depth: [0; NUM_HISTOGRAM_DISTANCE_SYMBOLS],
            dist_bits: [0; NUM_HISTOGRAM_DISTANCE_SYMBOLS],
        }
    }
}

/// Everything between the header and the prefix codes when each category
/// has a single block type and a single histogram
fn store_single_code_preamble(dist: &DistanceParams, writer: &mut BitWriter) {
    // NBLTYPESL, NBLTYPESI, NBLTYPESD
    writer.write_bits(3, 0);
    writer.write_bits(2, dist.postfix_bits as u64);
    writer.write_bits(4, (dist.num_direct_codes >> dist.postfix_bits) as u64);
    // context mode, NTREESL, NTREESD
    writer.write_bits(4, 0);
}

fn store_data_with_huffman_codes(
    ringbuffer: &[u8],
    start_pos: usize,
    mask: usize,
    commands: &[Command],
    codes: &EntropyCodes,
    writer: &mut BitWriter,
) {
    let mut pos = start_pos;
    for cmd in commands {
        let cmd_code = cmd.cmd_prefix as usize;
        writer.write_bits(codes.cmd_depth[cmd_code] as u32, codes.cmd_bits[cmd_code] as u64);
        store_command_extra(cmd, writer);
        for _ in 0..cmd.insert_len {
            let literal = ringbuffer[pos & mask] as usize;
            writer.write_bits(codes.lit_depth[literal] as u32, codes.lit_bits[literal] as u64);
            pos += 1;
        }
        pos += cmd.copy_len() as usize;
        if cmd.copy_len() != 0 && !cmd.uses_implicit_distance() {
            let dist_code = cmd.distance_symbol() as usize;
            writer.write_bits(codes.dist_depth[dist_code] as u32, codes.dist_bits[dist_code] as u64);
            writer.write_bits((cmd.dist_prefix >> 10) as u32, cmd.dist_extra as u64);
        }
    }
}

/// Store a meta-block with one prefix code per alphabet and no block
/// splitting
#[allow(clippy::too_many_arguments)]
pub fn store_meta_block_trivial(
    ringbuffer: &[u8],
    start_pos: usize,
    length: usize,
    mask: usize,
    is_last: bool,
    dist: &DistanceParams,
    commands: &[Command],
    writer: &mut BitWriter,
) {
    let (lit, cmd, distance) = build_histograms(ringbuffer, start_pos, mask, commands);
    let num_distance_symbols = distance_histogram_length(dist);
    let mut codes = EntropyCodes::new();
    let mut pool = huffman_pool();

    store_compressed_meta_block_header(is_last, length, writer);
    store_single_code_preamble(dist, writer);
    build_and_store_huffman_tree(&lit.data, NUM_LITERAL_SYMBOLS, &mut pool, &mut codes.lit_depth, &mut codes.lit_bits, writer);
    build_and_store_huffman_tree(&cmd.data, NUM_COMMAND_SYMBOLS, &mut pool, &mut codes.cmd_depth, &mut codes.cmd_bits, writer);
    build_and_store_huffman_tree(
        &distance.data[..num_distance_symbols],
        dist.alphabet_size as usize,
        &mut pool,
        &mut codes.dist_depth,
        &mut codes.dist_bits,
        writer,
    );
    store_data_with_huffman_codes(ringbuffer, start_pos, mask, commands, &codes, writer);
    if is_last {
        writer.align_to_byte();
    }
}

/// Like [`store_meta_block_trivial`] but with the depth-limited codes of
/// the fastest qualities
#[allow(clippy::too_many_arguments)]
pub fn store_meta_block_fast(
    ringbuffer: &[u8],
    start_pos: usize,
    length: usize,
    mask: usize,
    is_last: bool,
    dist: &DistanceParams,
    commands: &[Command],
    writer: &mut BitWriter,
) {
    let (lit, cmd, distance) = build_histograms(ringbuffer, start_pos, mask, commands);
    let num_distance_symbols = distance_histogram_length(dist);
    let distance_alphabet_bits = u32::BITS - (dist.alphabet_size - 1).leading_zeros();
    let mut codes = EntropyCodes::new();
    let mut pool = huffman_pool();

    store_compressed_meta_block_header(is_last, length, writer);
    store_single_code_preamble(dist, writer);
    build_and_store_huffman_tree_fast(&lit.data, 8, &mut pool, &mut codes.lit_depth, &mut codes.lit_bits, writer);
    build_and_store_huffman_tree_fast(&cmd.data, 10, &mut pool, &mut codes.cmd_depth, &mut codes.cmd_bits, writer);
    build_and_store_huffman_tree_fast(
        &distance.data[..num_distance_symbols],
        distance_alphabet_bits,
        &mut pool,
        &mut codes.dist_depth,
        &mut codes.dist_bits,
        writer,
    );
    store_data_with_huffman_codes(ringbuffer, start_pos, mask, commands, &codes, writer);
    if is_last {
        writer.align_to_byte();
    }
}
