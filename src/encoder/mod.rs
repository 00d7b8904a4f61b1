//! Streaming Brotli encoder.
//!
//! Input is buffered in a [`RingBuffer`] one block at a time. Every full
//! block is parsed into commands; commands of consecutive blocks are merged
//! into one meta-block until a size limit, a flush or the end of the stream
//! forces it out. Output accumulates in an internal [`BitWriter`] and is
//! drained with [`Encoder::take_output`]; [`BrotliWriter`] wraps this in
//! `io::Write`.

pub mod ring_buffer;
pub mod writer;

pub use ring_buffer::RingBuffer;
pub use writer::BrotliWriter;

use log::debug;

use crate::backward::{
    create_backward_references, create_hq_zopfli_backward_references, create_zopfli_backward_references,
    CommandStream,
};
use crate::bit_stream::{
    encode_window_bits, store_empty_last_meta_block, store_meta_block, store_meta_block_fast,
    store_meta_block_trivial, store_metadata_header, store_padding_block, store_uncompressed_meta_block,
};
use crate::bits::BitWriter;
use crate::command::{length_code, Command};
use crate::constants::{INITIAL_DISTANCE_CACHE, NUM_DISTANCE_SHORT_CODES, NUM_HISTOGRAM_DISTANCE_SYMBOLS};
use crate::context::{ContextLut, ContextMode};
use crate::entropy::bits_entropy;
use crate::error::{Error, Result};
use crate::fragment::FragmentCompressor;
use crate::hash::{choose_hasher, Hasher};
use crate::metablock::{
    build_meta_block, build_meta_block_greedy, choose_context_mode, decide_over_literal_context_modeling,
    optimize_histograms, LiteralContextModel,
};
use crate::params::{max_backward_limit, EncoderParams, Quality};

/// Largest metadata block
pub const MAX_METADATA_SIZE: usize = 1 << 24;

/// Below block-splitting qualities, pending commands plus literals that
/// force a meta-block out
const MAX_NUM_DELAYED_SYMBOLS: usize = 0x2FFF;

/// Smallest window the fragment compressors announce in the header
const FRAGMENT_MIN_WINDOW_BITS: u32 = 18;

/// Where the stream is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Accepting input
    Processing,
    /// A flush was requested and the output is being byte-aligned
    FlushRequested,
    /// The last meta-block has been written
    Finished,
    /// Pending input is being flushed ahead of a metadata header
    MetadataHead,
    /// Metadata bytes are expected
    MetadataBody,
}

/// Counters of one compression stream
#[derive(Clone, Debug, Default)]
pub struct EncoderStats {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub meta_blocks: u64,
    /// Meta-blocks stored uncompressed because coding did not pay off
    pub uncompressed_meta_blocks: u64,
    pub metadata_bytes: u64,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Operation {
    Process,
    Flush,
    Finish,
}

/// Maps a 64-bit stream position onto 32 bits
///
/// The first 3 GiB are continuous; after that positions wrap every 2 GiB
/// while keeping bit 30 or 31 set, so a wrapped position is never
/// mistaken for one on the first lap.
pub fn wrap_position(position: u64) -> u32 {
    let mut result = position as u32;
    let gb = position >> 30;
    if gb > 2 {
        result = (result & ((1 << 30) - 1)) | ((((gb - 1) & 1) as u32 + 1) << 30);
    }
    result
}

/// Incremental Brotli encoder
pub struct Encoder {
    params: EncoderParams,
    ringbuffer: RingBuffer,
    hasher: Option<Hasher>,
    fragment: Option<FragmentCompressor>,
    stream: CommandStream,
    input_pos: u64,
    last_processed_pos: u64,
    last_flush_pos: u64,
    /// Last four distances plus the derived near-distance candidates
    dist_cache: [i32; 16],
    /// Distance cache as of the last emitted meta-block
    saved_dist_cache: [i32; 4],
    prev_byte: u8,
    prev_byte2: u8,
    writer: BitWriter,
    state: StreamState,
    is_last_block_emitted: bool,
    remaining_metadata: usize,
    stats: EncoderStats,
}

impl Encoder {
    /// Create an encoder; the stream header is emitted with the first
    /// output
    pub fn new(params: EncoderParams) -> Result<Self> {
        params.validate()?;
        let mut params = params;
        params.sanitize();
        params.compute_lgblock();
        params.choose_distance_params();

        let mut header_lgwin = params.lgwin;
        if params.quality <= Quality::FAST_TWO_PASS {
            header_lgwin = header_lgwin.max(FRAGMENT_MIN_WINDOW_BITS);
        }
        let (bits, nbits) = encode_window_bits(header_lgwin, params.large_window);
        let writer = BitWriter::with_pending(bits, nbits, 1 << 16);
        let ringbuffer = RingBuffer::new(params.ring_buffer_bits(), params.lgblock);
        debug!(
            "encoder: quality {}, lgwin {}, lgblock {}, mode {:?}",
            params.quality, params.lgwin, params.lgblock, params.mode
        );

        let mut dist_cache = [0i32; 16];
        dist_cache[..4].copy_from_slice(&INITIAL_DISTANCE_CACHE);
        Ok(Self {
            params,
            ringbuffer,
            hasher: None,
            fragment: None,
            stream: CommandStream::default(),
            input_pos: 0,
            last_processed_pos: 0,
            last_flush_pos: 0,
            dist_cache,
            saved_dist_cache: INITIAL_DISTANCE_CACHE,
            prev_byte: 0,
            prev_byte2: 0,
            writer,
            state: StreamState::Processing,
            is_last_block_emitted: false,
            remaining_metadata: 0,
            stats: EncoderStats::default(),
        })
    }

    /// Parameters after sanitizing
    pub fn params(&self) -> &EncoderParams {
        &self.params
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == StreamState::Finished
    }

    pub fn stats(&self) -> &EncoderStats {
        &self.stats
    }

    /// Whether complete output bytes are waiting to be taken
    pub fn has_output(&self) -> bool {
        !self.writer.as_bytes().is_empty()
    }

    /// Drain the complete output bytes; a partial last byte stays behind
    /// until more bits follow or the stream is flushed
    pub fn take_output(&mut self) -> Vec<u8> {
        let out = self.writer.take_bytes();
        self.stats.output_bytes += out.len() as u64;
        out
    }

    /// Feed input; output appears only when an input block fills up
    pub fn process(&mut self, input: &[u8]) -> Result<()> {
        self.compress_stream(Operation::Process, input)
    }

    /// Emit everything buffered so far, byte-aligned, without ending the
    /// stream
    pub fn flush(&mut self) -> Result<()> {
        self.compress_stream(Operation::Flush, &[])
    }

    /// Emit everything buffered and the last meta-block; calling it again
    /// has no effect
    pub fn finish(&mut self) -> Result<()> {
        self.compress_stream(Operation::Finish, &[])
    }

    /// Emit a metadata block carrying `data`, which decoders skip
    pub fn emit_metadata(&mut self, data: &[u8]) -> Result<()> {
        self.begin_metadata(data.len())?;
        self.write_metadata(data)
    }

    /// Flush pending input and open a metadata block of `len` bytes; the
    /// body follows through [`Encoder::write_metadata`]
    pub fn begin_metadata(&mut self, len: usize) -> Result<()> {
        if len > MAX_METADATA_SIZE {
            return Err(Error::MetadataTooLarge { size: len, max: MAX_METADATA_SIZE });
        }
        self.check_no_metadata_pending(len)?;
        if self.state == StreamState::Finished {
            return Err(Error::StreamFinished);
        }

        self.update_size_hint(0);
        self.state = StreamState::MetadataHead;
        if self.input_pos != self.last_flush_pos {
            self.encode_data(false, true)?;
        }
        store_metadata_header(len, &mut self.writer);
        self.remaining_metadata = len;
        self.state = if len == 0 { StreamState::Processing } else { StreamState::MetadataBody };
        Ok(())
    }

    /// Append body bytes to the open metadata block
    pub fn write_metadata(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if self.state != StreamState::MetadataBody || data.len() > self.remaining_metadata {
            return Err(Error::MetadataPending { expected: self.remaining_metadata as u32, found: data.len() });
        }
        self.writer.write_bytes(data);
        self.remaining_metadata -= data.len();
        self.stats.metadata_bytes += data.len() as u64;
        if self.remaining_metadata == 0 {
            self.state = StreamState::Processing;
        }
        Ok(())
    }

    fn check_no_metadata_pending(&self, found: usize) -> Result<()> {
        if matches!(self.state, StreamState::MetadataHead | StreamState::MetadataBody) {
            return Err(Error::MetadataPending { expected: self.remaining_metadata as u32, found });
        }
        Ok(())
    }

    #[inline]
    fn input_block_size(&self) -> usize {
        1 << self.params.lgblock
    }

    #[inline]
    fn unprocessed_input_size(&self) -> u64 {
        self.input_pos - self.last_processed_pos
    }

    fn remaining_input_block_size(&self) -> usize {
        let delta = self.unprocessed_input_size();
        let block_size = self.input_block_size();
        if delta >= block_size as u64 {
            0
        } else {
            block_size - delta as usize
        }
    }

    /// Record the expected stream size once, from what is buffered plus
    /// what the caller still holds
    fn update_size_hint(&mut self, available_in: usize) {
        if self.params.size_hint == 0 {
            let limit = 1u64 << 30;
            let total = self.unprocessed_input_size().saturating_add(available_in as u64).min(limit);
            self.params.size_hint = total as usize;
        }
    }

    fn copy_input_to_ring_buffer(&mut self, input: &[u8]) {
        self.ringbuffer.write(input);
        self.input_pos += input.len() as u64;
        self.stats.input_bytes += input.len() as u64;
    }

    /// Mark all input as processed; true when the wrapped position went
    /// backwards
    fn update_last_processed_pos(&mut self) -> bool {
        let wrapped_last_processed_pos = wrap_position(self.last_processed_pos);
        let wrapped_input_pos = wrap_position(self.input_pos);
        self.last_processed_pos = self.input_pos;
        wrapped_input_pos < wrapped_last_processed_pos
    }

    fn compress_stream(&mut self, op: Operation, mut input: &[u8]) -> Result<()> {
        self.check_no_metadata_pending(input.len())?;
        if self.state != StreamState::Processing && !input.is_empty() {
            return Err(Error::StreamFinished);
        }

        loop {
            let remaining_block_size = self.remaining_input_block_size();
            if remaining_block_size != 0 && !input.is_empty() {
                let n = remaining_block_size.min(input.len());
                self.copy_input_to_ring_buffer(&input[..n]);
                input = &input[n..];
                continue;
            }

            if self.state == StreamState::FlushRequested && self.writer.bit_len() % 8 != 0 {
                store_padding_block(&mut self.writer);
                continue;
            }

            if self.state == StreamState::Processing && (remaining_block_size == 0 || op != Operation::Process) {
                let is_last = input.is_empty() && op == Operation::Finish;
                let force_flush = input.is_empty() && op == Operation::Flush;
                self.update_size_hint(input.len());
                self.encode_data(is_last, force_flush)?;
                if force_flush {
                    self.state = StreamState::FlushRequested;
                }
                if is_last {
                    self.state = StreamState::Finished;
                }
                continue;
            }
            break;
        }

        if self.state == StreamState::FlushRequested {
            self.state = StreamState::Processing;
        }
        Ok(())
    }

    /// Create the hasher on first use and let it index the tail of the
    /// previous block
    fn init_or_stitch_to_previous_block(&mut self, position: usize, input_size: usize, is_last: bool) {
        let data = self.ringbuffer.data();
        let mask = self.ringbuffer.mask();
        if self.hasher.is_none() {
            self.params.hasher = choose_hasher(&self.params);
            let one_shot = position == 0 && is_last;
            let mut hasher = Hasher::new(&self.params, one_shot, input_size);
            hasher.prepare(data, input_size);
            self.hasher = Some(hasher);
        }
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.stitch_to_previous_block(input_size, position, data, mask);
        }
    }

    /// Grow the copy of the last command while the new block continues it
    fn extend_last_command(&mut self, bytes: &mut usize, wrapped_last_processed_pos: &mut usize) {
        let data = self.ringbuffer.data();
        let mask = self.ringbuffer.mask();
        let Some(last) = self.stream.commands.last_mut() else {
            return;
        };
        let max_backward_distance = max_backward_limit(self.params.lgwin) as u64;
        let last_processed_pos = self.last_processed_pos - last.copy_len() as u64;
        let max_distance = last_processed_pos.min(max_backward_distance);
        let cmd_dist = self.dist_cache[0] as u64;
        let distance_code = last.restore_distance_code(&self.params.dist);
        let short_codes = NUM_DISTANCE_SHORT_CODES as u32;
        if distance_code < short_codes || (distance_code - (short_codes - 1)) as u64 == cmd_dist {
            if cmd_dist <= max_distance {
                while *bytes != 0
                    && data[*wrapped_last_processed_pos & mask]
                        == data[wrapped_last_processed_pos.wrapping_sub(cmd_dist as usize) & mask]
                {
                    last.copy_len += 1;
                    *bytes -= 1;
                    *wrapped_last_processed_pos += 1;
                }
            }
            // the copy length never exceeds a meta-block and stays codable
            last.cmd_prefix =
                length_code(last.insert_len as usize, last.copy_len_code() as usize, last.distance_symbol() == 0);
        }
    }

    /// Process the buffered input block and emit a meta-block unless it
    /// can be merged with the next block
    fn encode_data(&mut self, is_last: bool, force_flush: bool) -> Result<()> {
        if self.is_last_block_emitted {
            return Err(Error::StreamFinished);
        }
        if is_last {
            self.is_last_block_emitted = true;
        }

        let delta = self.unprocessed_input_size();
        debug_assert!(delta <= self.input_block_size() as u64);
        let mut bytes = delta as usize;
        let mut wrapped_last_processed_pos = wrap_position(self.last_processed_pos) as usize;
        let mask = self.ringbuffer.mask();

        if self.params.quality <= Quality::FAST_TWO_PASS {
            if delta == 0 && !is_last {
                return Ok(());
            }
            let two_pass = self.params.quality == Quality::FAST_TWO_PASS;
            let max_backward = max_backward_limit(self.params.lgwin.max(FRAGMENT_MIN_WINDOW_BITS));
            let start = wrapped_last_processed_pos & mask;
            let block = &self.ringbuffer.data()[start..start + bytes];
            let mark = self.writer.bit_len();
            let blocks = self.fragment.get_or_insert_with(|| FragmentCompressor::new(two_pass)).compress(
                block,
                is_last,
                max_backward,
                &mut self.writer,
            );
            debug!(
                "fragment: {} bytes -> {} bits in {} meta-blocks ({} raw)",
                bytes,
                self.writer.bit_len() - mark,
                blocks.meta_blocks,
                blocks.uncompressed
            );
            self.stats.meta_blocks += blocks.meta_blocks;
            self.stats.uncompressed_meta_blocks += blocks.uncompressed;
            self.update_last_processed_pos();
            self.last_flush_pos = self.input_pos;
            if is_last {
                self.writer.align_to_byte();
            }
            return Ok(());
        }

        self.init_or_stitch_to_previous_block(wrapped_last_processed_pos, bytes, is_last);
        let literal_context_mode = choose_context_mode(
            &self.params,
            self.ringbuffer.data(),
            wrap_position(self.last_flush_pos) as usize,
            mask,
            (self.input_pos - self.last_flush_pos) as usize,
        );

        if !self.stream.commands.is_empty() && self.stream.last_insert_len == 0 {
            self.extend_last_command(&mut bytes, &mut wrapped_last_processed_pos);
        }

        if bytes > 0 {
            self.create_commands(bytes, wrapped_last_processed_pos);
        }

        let max_length = self.params.max_metablock_size();
        let max_literals = max_length / 8;
        let max_commands = max_length / 8;
        let processed_bytes = (self.input_pos - self.last_flush_pos) as usize;
        let next_input_fits_metablock = processed_bytes + self.input_block_size() <= max_length;
        let should_flush = self.params.quality < Quality::MIN_BLOCK_SPLIT
            && self.stream.num_literals + self.stream.commands.len() >= MAX_NUM_DELAYED_SYMBOLS;
        if !is_last
            && !force_flush
            && !should_flush
            && next_input_fits_metablock
            && self.stream.num_literals < max_literals
            && self.stream.commands.len() < max_commands
        {
            // merge with the next input block
            if self.update_last_processed_pos() {
                self.hasher = None;
            }
            return Ok(());
        }

        if self.stream.last_insert_len > 0 {
            self.stream.commands.push(Command::insert_only(self.stream.last_insert_len));
            self.stream.num_literals += self.stream.last_insert_len;
            self.stream.last_insert_len = 0;
        }

        if !is_last && self.input_pos == self.last_flush_pos {
            return Ok(());
        }

        debug_assert!(self.input_pos > self.last_flush_pos || is_last);
        let metablock_size = (self.input_pos - self.last_flush_pos) as usize;
        self.write_meta_block(metablock_size, is_last, literal_context_mode);

        self.last_flush_pos = self.input_pos;
        if self.update_last_processed_pos() {
            self.hasher = None;
        }
        let data = self.ringbuffer.data();
        if self.last_flush_pos > 0 {
            self.prev_byte = data[(self.last_flush_pos - 1) as usize & mask];
        }
        if self.last_flush_pos > 1 {
            self.prev_byte2 = data[(self.last_flush_pos - 2) as usize & mask];
        }
        self.stream.clear();
        self.saved_dist_cache.copy_from_slice(&self.dist_cache[..4]);
        if is_last {
            self.writer.align_to_byte();
        }
        Ok(())
    }

    /// Parse `bytes` new bytes at `position` into commands
    fn create_commands(&mut self, bytes: usize, position: usize) {
        let data = self.ringbuffer.data();
        let mask = self.ringbuffer.mask();
        let Some(hasher) = self.hasher.as_mut() else {
            return;
        };
        let quality = self.params.quality;
        if let Hasher::BinaryTree(tree) = &mut *hasher {
            if quality == Quality::ZOPFLIFICATION {
                create_zopfli_backward_references(
                    bytes,
                    position,
                    data,
                    mask,
                    &self.params,
                    tree,
                    &mut self.dist_cache,
                    &mut self.stream,
                );
                return;
            }
            if quality == Quality::HQ_ZOPFLIFICATION {
                create_hq_zopfli_backward_references(
                    bytes,
                    position,
                    data,
                    mask,
                    &self.params,
                    tree,
                    &mut self.dist_cache,
                    &mut self.stream,
                );
                return;
            }
        }
        create_backward_references(bytes, position, data, mask, &self.params, hasher, &mut self.dist_cache, &mut self.stream);
    }

    /// Write the pending commands as one meta-block covering `bytes` bytes
    /// from the last flush position, falling back to an uncompressed block
    /// when coding does not pay off
    fn write_meta_block(&mut self, bytes: usize, is_last: bool, literal_context_mode: ContextMode) {
        let data = self.ringbuffer.data();
        let mask = self.ringbuffer.mask();
        let start_pos = wrap_position(self.last_flush_pos) as usize;
        let quality = self.params.quality;
        let commands = &mut self.stream.commands;

        if bytes == 0 {
            store_empty_last_meta_block(&mut self.writer);
            return;
        }
        self.stats.meta_blocks += 1;

        if !should_compress(data, mask, self.last_flush_pos, bytes, self.stream.num_literals, commands.len()) {
            // the distances of the parsed commands never reach the decoder
            self.dist_cache[..4].copy_from_slice(&self.saved_dist_cache);
            store_uncompressed_meta_block(is_last, data, start_pos, mask, bytes, &mut self.writer);
            self.stats.uncompressed_meta_blocks += 1;
            debug!("meta-block: {} bytes stored uncompressed (incompressible literals)", bytes);
            return;
        }

        let mark = self.writer.bit_len();
        let encoding;
        if quality <= Quality::MAX_STATIC_ENTROPY_CODES {
            encoding = "fast";
            store_meta_block_fast(data, start_pos, bytes, mask, is_last, &self.params.dist, commands, &mut self.writer);
        } else if quality < Quality::MIN_BLOCK_SPLIT {
            encoding = "trivial";
            store_meta_block_trivial(
                data,
                start_pos,
                bytes,
                mask,
                is_last,
                &self.params.dist,
                commands,
                &mut self.writer,
            );
        } else {
            let (mut mb, dist) = if quality < Quality::MIN_HQ_BLOCK_SPLITTING {
                encoding = "greedy";
                let model = if self.params.disable_literal_context_modeling {
                    LiteralContextModel::default()
                } else {
                    decide_over_literal_context_modeling(data, start_pos, bytes, mask, quality, self.params.size_hint)
                };
                log::trace!("static literal context model: {} contexts", model.num_contexts);
                let lut = ContextLut::new(literal_context_mode);
                let mb = build_meta_block_greedy(
                    data,
                    start_pos,
                    mask,
                    self.prev_byte,
                    self.prev_byte2,
                    &lut,
                    &model,
                    &self.params.dist,
                    commands,
                );
                (mb, self.params.dist)
            } else {
                encoding = "split";
                build_meta_block(
                    data,
                    start_pos,
                    mask,
                    &self.params,
                    self.prev_byte,
                    self.prev_byte2,
                    commands,
                    literal_context_mode,
                )
            };
            if quality >= Quality::MIN_OPTIMIZE_HISTOGRAMS {
                let num_effective_dist_codes = (dist.alphabet_size as usize).min(NUM_HISTOGRAM_DISTANCE_SYMBOLS);
                optimize_histograms(num_effective_dist_codes, &mut mb);
            }
            store_meta_block(
                data,
                start_pos,
                bytes,
                mask,
                self.prev_byte,
                self.prev_byte2,
                is_last,
                &dist,
                literal_context_mode,
                commands,
                &mb,
                &mut self.writer,
            );
        }

        let stored_bytes = (self.writer.bit_len() >> 3) - (mark >> 3);
        if bytes + 4 < stored_bytes {
            self.dist_cache[..4].copy_from_slice(&self.saved_dist_cache);
            self.writer.rewind(mark);
            store_uncompressed_meta_block(is_last, data, start_pos, mask, bytes, &mut self.writer);
            self.stats.uncompressed_meta_blocks += 1;
            debug!("meta-block: {} bytes, {} encoding took {} bytes, stored uncompressed", bytes, encoding, stored_bytes);
        } else {
            debug!(
                "meta-block: {} bytes, {} commands, {} encoding -> {} bytes",
                bytes,
                commands.len(),
                encoding,
                stored_bytes
            );
        }
    }
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("params", &self.params)
            .field("state", &self.state)
            .field("input_pos", &self.input_pos)
            .field("last_flush_pos", &self.last_flush_pos)
            .finish_non_exhaustive()
    }
}

/// False for tiny meta-blocks and for literal-only ones whose sampled
/// literal entropy is close to 8 bits
fn should_compress(
    data: &[u8],
    mask: usize,
    last_flush_pos: u64,
    bytes: usize,
    num_literals: usize,
    num_commands: usize,
) -> bool {
    const SAMPLE_RATE: usize = 13;
    const MIN_ENTROPY: f64 = 7.92;

    if bytes <= 2 {
        return false;
    }
    if num_commands < (bytes >> 8) + 2 && num_literals as f64 > 0.99 * bytes as f64 {
        let mut literal_histo = [0u32; 256];
        let bit_cost_threshold = bytes as f64 * MIN_ENTROPY / SAMPLE_RATE as f64;
        let samples = bytes.div_ceil(SAMPLE_RATE);
        let mut pos = last_flush_pos as u32 as usize;
        for _ in 0..samples {
            literal_histo[data[pos & mask] as usize] += 1;
            pos += SAMPLE_RATE;
        }
        if bits_entropy(&literal_histo) > bit_cost_threshold {
            return false;
        }
    }
    true
}

/// Compress `input` in one call
pub fn compress(input: &[u8], params: &EncoderParams) -> Result<Vec<u8>> {
    let mut params = params.clone();
    if params.size_hint == 0 {
        params.size_hint = input.len();
    }
    let mut encoder = Encoder::new(params)?;
    encoder.process(input)?;
    encoder.finish()?;
    Ok(encoder.take_output())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_stream::test_util::decompress;
    use crate::params::EncoderMode;

    fn text(len: usize) -> Vec<u8> {
        let words = ["the ", "quick ", "brown ", "fox ", "jumps ", "over ", "lazy ", "dog. ", "\n"];
        let mut out = Vec::with_capacity(len);
        let mut seed = 12345u32;
        while out.len() < len {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            out.extend_from_slice(words[(seed >> 16) as usize % words.len()].as_bytes());
        }
        out.truncate(len);
        out
    }

    fn noise(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
                (state >> 33) as u8
            })
            .collect()
    }

    fn roundtrip(input: &[u8], params: EncoderParams) -> Vec<u8> {
        let compressed = compress(input, &params).unwrap();
        let decoded = decompress(&compressed).unwrap();
        assert_eq!(decoded, input, "quality {} lgwin {}", params.quality, params.lgwin);
        compressed
    }

    #[test]
    fn test_wrap_position() {
        assert_eq!(wrap_position(0), 0);
        assert_eq!(wrap_position(12345), 12345);
        assert_eq!(wrap_position((2 << 30) + 7), (2 << 30) + 7);
        // past 3 GiB positions alternate between the second and third GiB
        assert_eq!(wrap_position(3 << 30), 1 << 30);
        assert_eq!(wrap_position((3 << 30) + 7), (1 << 30) + 7);
        assert_eq!(wrap_position((4 << 30) + 7), (1 << 31) + 7);
        assert_eq!(wrap_position((5 << 30) + 7), (1 << 30) + 7);
    }

    #[test]
    fn test_empty_stream_every_quality() {
        for quality in 0..=11 {
            let out = roundtrip(b"", EncoderParams::default().with_quality(quality));
            assert!(out.len() <= 2, "quality {}: {:?}", quality, out);
        }
    }

    #[test]
    fn test_text_every_quality() {
        let input = text(50_000);
        for quality in 0..=11 {
            let out = roundtrip(&input, EncoderParams::default().with_quality(quality));
            assert!(out.len() < input.len() / 3, "quality {}: {} bytes", quality, out.len());
        }
    }

    #[test]
    fn test_small_windows() {
        let input = text(20_000);
        for lgwin in [10, 12, 16] {
            for quality in [0, 1, 2, 5, 9, 11] {
                roundtrip(&input, EncoderParams::default().with_quality(quality).with_window_bits(lgwin));
            }
        }
    }

    #[test]
    fn test_random_input_stored_uncompressed() {
        let input = noise(300_000, 7);
        for quality in [0, 1, 2, 5, 11] {
            let params = EncoderParams::default().with_quality(quality);
            let mut encoder = Encoder::new(params).unwrap();
            encoder.process(&input).unwrap();
            encoder.finish().unwrap();
            let out = encoder.take_output();
            assert_eq!(decompress(&out).unwrap(), input);
            assert!(out.len() <= input.len() + 64, "quality {}: {} bytes", quality, out.len());
            assert!(encoder.stats().uncompressed_meta_blocks > 0);
        }
    }

    #[test]
    fn test_raw_fallback_restores_distance_cache() {
        // a compressible prefix moves the distance cache, then random data
        // forces an uncompressed block that must not disturb it
        let mut input = text(40_000);
        input.extend(noise(70_000, 3));
        input.extend(text(40_000));
        for quality in [3, 6, 10] {
            let params = EncoderParams::default().with_quality(quality).with_window_bits(16);
            let mut encoder = Encoder::new(params).unwrap();
            let mut out = Vec::new();
            for chunk in input.chunks(10_000) {
                encoder.process(chunk).unwrap();
                encoder.flush().unwrap();
                out.extend(encoder.take_output());
            }
            encoder.finish().unwrap();
            out.extend(encoder.take_output());
            assert!(encoder.stats().uncompressed_meta_blocks > 0, "quality {}", quality);
            assert_eq!(decompress(&out).unwrap(), input, "quality {}", quality);
        }
    }

    #[test]
    fn test_one_byte_writes() {
        let input = text(3000);
        for quality in [0, 1, 4, 9, 10] {
            let mut encoder = Encoder::new(EncoderParams::default().with_quality(quality)).unwrap();
            for b in &input {
                encoder.process(std::slice::from_ref(b)).unwrap();
            }
            encoder.finish().unwrap();
            assert_eq!(decompress(&encoder.take_output()).unwrap(), input, "quality {}", quality);
        }
    }

    #[test]
    fn test_flush_makes_prefix_decodable() {
        let input = text(10_000);
        for quality in [1, 5, 11] {
            let mut encoder = Encoder::new(EncoderParams::default().with_quality(quality)).unwrap();
            encoder.process(&input[..4000]).unwrap();
            encoder.flush().unwrap();
            assert_eq!(encoder.state(), StreamState::Processing);
            let flushed = encoder.take_output();
            assert!(!flushed.is_empty());
            // a flushed stream is byte-aligned: closing it with an empty
            // last meta-block yields the prefix
            let mut closed = flushed.clone();
            closed.push(0x03);
            assert_eq!(decompress(&closed).unwrap(), &input[..4000], "quality {}", quality);

            encoder.process(&input[4000..]).unwrap();
            encoder.finish().unwrap();
            let mut out = flushed;
            out.extend(encoder.take_output());
            assert_eq!(decompress(&out).unwrap(), input);
        }
    }

    #[test]
    fn test_merges_blocks_without_flush() {
        let input = text(200_000);
        let params = EncoderParams::default().with_quality(5).with_block_bits(16);
        let mut encoder = Encoder::new(params).unwrap();
        encoder.process(&input).unwrap();
        encoder.finish().unwrap();
        // four input blocks fit in a single meta-block
        assert_eq!(encoder.stats().meta_blocks, 1);
        assert_eq!(decompress(&encoder.take_output()).unwrap(), input);
    }

    #[test]
    fn test_low_quality_flushes_delayed_symbols() {
        let input = noise(1 << 16, 11);
        let mut input2 = input.clone();
        input2.extend_from_slice(&input);
        let params = EncoderParams::default().with_quality(3);
        let mut encoder = Encoder::new(params).unwrap();
        encoder.process(&input2).unwrap();
        encoder.finish().unwrap();
        assert!(encoder.stats().meta_blocks > 1);
        assert_eq!(decompress(&encoder.take_output()).unwrap(), input2);
    }

    #[test]
    fn test_metadata_is_skipped_by_decoder() {
        let input = text(5000);
        for quality in [0, 6, 11] {
            let mut encoder = Encoder::new(EncoderParams::default().with_quality(quality)).unwrap();
            encoder.process(&input[..2000]).unwrap();
            encoder.emit_metadata(b"side channel").unwrap();
            encoder.emit_metadata(b"").unwrap();
            encoder.process(&input[2000..]).unwrap();
            encoder.finish().unwrap();
            assert_eq!(encoder.stats().metadata_bytes, 12);
            assert_eq!(decompress(&encoder.take_output()).unwrap(), input, "quality {}", quality);
        }
    }

    #[test]
    fn test_metadata_errors() {
        let mut encoder = Encoder::new(EncoderParams::default()).unwrap();
        assert!(matches!(
            encoder.begin_metadata(MAX_METADATA_SIZE + 1),
            Err(Error::MetadataTooLarge { size, .. }) if size == MAX_METADATA_SIZE + 1
        ));
        encoder.begin_metadata(4).unwrap();
        assert_eq!(encoder.state(), StreamState::MetadataBody);
        assert!(matches!(encoder.process(b"abc"), Err(Error::MetadataPending { expected: 4, found: 3 })));
        assert!(matches!(encoder.write_metadata(b"12345"), Err(Error::MetadataPending { expected: 4, .. })));
        encoder.write_metadata(b"12").unwrap();
        encoder.write_metadata(b"34").unwrap();
        assert_eq!(encoder.state(), StreamState::Processing);
        encoder.process(b"abc").unwrap();
        encoder.finish().unwrap();
        assert_eq!(decompress(&encoder.take_output()).unwrap(), b"abc");
    }

    #[test]
    fn test_no_input_after_finish() {
        let mut encoder = Encoder::new(EncoderParams::default().with_quality(4)).unwrap();
        encoder.process(b"hello").unwrap();
        encoder.finish().unwrap();
        assert!(encoder.is_finished());
        assert!(matches!(encoder.process(b"more"), Err(Error::StreamFinished)));
        assert!(matches!(encoder.emit_metadata(b"x"), Err(Error::StreamFinished)));
        // finishing twice is harmless
        encoder.finish().unwrap();
        encoder.process(b"").unwrap();
        assert_eq!(decompress(&encoder.take_output()).unwrap(), b"hello");
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(matches!(
            Encoder::new(EncoderParams::default().with_quality(12)),
            Err(Error::InvalidParameter { name: "quality", .. })
        ));
    }

    #[test]
    fn test_font_mode_and_context_modeling_toggle() {
        let input = text(30_000);
        roundtrip(&input, EncoderParams::default().with_quality(5).with_mode(EncoderMode::Font));
        roundtrip(&input, EncoderParams::default().with_quality(11).with_mode(EncoderMode::Font));
        roundtrip(&input, EncoderParams::default().with_quality(6).with_literal_context_modeling(false));
        roundtrip(&input, EncoderParams::default().with_quality(11).with_literal_context_modeling(false));
    }

    #[test]
    fn test_should_compress() {
        let random = noise(100_000, 5);
        assert!(!should_compress(&random, usize::MAX, 0, random.len(), random.len(), 1));
        assert!(should_compress(&random, usize::MAX, 0, random.len(), 100, 200));
        let zeros = vec![0u8; 4096];
        assert!(should_compress(&zeros, usize::MAX, 0, zeros.len(), zeros.len(), 1));
        assert!(!should_compress(&zeros, usize::MAX, 0, 2, 2, 0));
    }
}
