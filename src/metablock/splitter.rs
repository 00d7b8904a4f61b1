//! Iterative entropy-based block splitting used at the highest qualities.

use super::BlockSplit;
use crate::command::Command;
use crate::constants::{
    MAX_NUMBER_OF_BLOCK_TYPES, NUM_COMMAND_SYMBOLS, NUM_HISTOGRAM_DISTANCE_SYMBOLS, NUM_LITERAL_SYMBOLS,
};
use crate::entropy::{fast_log2, histogram_bit_cost_distance, histogram_combine, population_cost, Histogram, PairQueue};
use crate::params::Quality;

const MAX_LITERAL_HISTOGRAMS: usize = 100;
const MAX_COMMAND_HISTOGRAMS: usize = 50;
const LITERAL_BLOCK_SWITCH_COST: f64 = 28.1;
const COMMAND_BLOCK_SWITCH_COST: f64 = 13.5;
const DISTANCE_BLOCK_SWITCH_COST: f64 = 14.6;
const LITERAL_STRIDE_LENGTH: usize = 70;
const COMMAND_STRIDE_LENGTH: usize = 40;
const SYMBOLS_PER_LITERAL_HISTOGRAM: usize = 544;
const SYMBOLS_PER_COMMAND_HISTOGRAM: usize = 530;
const SYMBOLS_PER_DISTANCE_HISTOGRAM: usize = 544;
const MIN_LENGTH_FOR_BLOCK_SPLITTING: usize = 128;
const ITER_MUL_FOR_REFINING: usize = 2;
const MIN_ITERS_FOR_REFINING: usize = 100;

/// Histograms combined per batch when clustering blocks
const BLOCKS_PER_BATCH: usize = 64;

/// Park-Miller step
#[inline]
fn my_rand(seed: &mut u32) -> u32 {
    *seed = seed.wrapping_mul(16807);
    *seed
}

#[inline]
fn bit_cost(count: u32) -> f64 {
    if count == 0 {
        -2.0
    } else {
        fast_log2(count as usize)
    }
}

/// Seed one histogram per evenly spaced (randomly jittered) sample
fn initial_entropy_codes<T: Copy + Into<usize>, const N: usize>(
    data: &[T],
    stride: usize,
    histograms: &mut [Histogram<N>],
) {
    let length = data.len();
    let num_histograms = histograms.len();
    let mut seed = 7u32;
    let block_length = length / num_histograms;
    for (i, h) in histograms.iter_mut().enumerate() {
        h.clear();
        let mut pos = length * i / num_histograms;
        if i != 0 {
            pos += my_rand(&mut seed) as usize % block_length;
        }
        if pos + stride >= length {
            pos = length - stride - 1;
        }
        h.add_vector(&data[pos..pos + stride]);
    }
}

fn random_sample<T: Copy + Into<usize>, const N: usize>(
    seed: &mut u32,
    data: &[T],
    mut stride: usize,
    sample: &mut Histogram<N>,
) {
    let length = data.len();
    let mut pos = 0usize;
    if stride >= length {
        stride = length;
    } else {
        pos = my_rand(seed) as usize % (length - stride + 1);
    }
    sample.add_vector(&data[pos..pos + stride]);
}

fn refine_entropy_codes<T: Copy + Into<usize>, const N: usize>(
    data: &[T],
    stride: usize,
    histograms: &mut [Histogram<N>],
) {
    let num_histograms = histograms.len();
    let mut iters = ITER_MUL_FOR_REFINING * data.len() / stride + MIN_ITERS_FOR_REFINING;
    iters = iters.div_ceil(num_histograms) * num_histograms;
    let mut seed = 7u32;
    let mut sample = Histogram::<N>::new();
    for iter in 0..iters {
        sample.clear();
        random_sample(&mut seed, data, stride, &mut sample);
        histograms[iter % num_histograms].add_histogram(&sample);
    }
}

/// Scratch buffers for [`find_blocks`]
struct FindBlocksScratch {
    insert_cost: Vec<f64>,
    cost: Vec<f64>,
    switch_signal: Vec<u8>,
}

/// Assign each symbol the histogram that codes it best, paying
/// `block_switch_bitcost` for every switch. Returns the number of blocks.
fn find_blocks<T: Copy + Into<usize>, const N: usize>(
    data: &[T],
    block_switch_bitcost: f64,
    histograms: &[Histogram<N>],
    scratch: &mut FindBlocksScratch,
    block_id: &mut [u8],
) -> usize {
    let length = data.len();
    let num_histograms = histograms.len();
    if num_histograms <= 1 {
        block_id[..length].fill(0);
        return 1;
    }
    let bitmaplen = (num_histograms + 7) >> 3;

    let insert_cost = &mut scratch.insert_cost;
    insert_cost.clear();
    insert_cost.resize(N * num_histograms, 0.0);
    for (j, h) in histograms.iter().enumerate() {
        insert_cost[j] = fast_log2(h.total_count);
    }
    for i in (0..N).rev() {
        for (j, h) in histograms.iter().enumerate() {
            insert_cost[i * num_histograms + j] = insert_cost[j] - bit_cost(h.data[i]);
        }
    }

    let cost = &mut scratch.cost;
    cost.clear();
    cost.resize(num_histograms, 0.0);
    let switch_signal = &mut scratch.switch_signal;
    switch_signal.clear();
    switch_signal.resize(length * bitmaplen, 0);

    // After each symbol, cost[k] is the extra cost of being in histogram k
    // rather than the cheapest one; a switch is signalled once that exceeds
    // the block switch cost.
    for (byte_ix, &symbol) in data.iter().enumerate() {
        let ix = byte_ix * bitmaplen;
        let insert_cost_ix = symbol.into() * num_histograms;
        let mut min_cost = 1e99;
        let mut block_switch_cost = block_switch_bitcost;
        for k in 0..num_histograms {
            cost[k] += insert_cost[insert_cost_ix + k];
            if cost[k] < min_cost {
                min_cost = cost[k];
                block_id[byte_ix] = k as u8;
            }
        }
        // More blocks for the beginning.
        if byte_ix < 2000 {
            block_switch_cost *= 0.77 + 0.07 * byte_ix as f64 / 2000.0;
        }
        for k in 0..num_histograms {
            cost[k] -= min_cost;
            if cost[k] >= block_switch_cost {
                cost[k] = block_switch_cost;
                switch_signal[ix + (k >> 3)] |= 1 << (k & 7);
            }
        }
    }

    // Trace back from the last position and switch at the signal bits.
    let mut num_blocks = 1usize;
    let mut byte_ix = length - 1;
    let mut cur_id = block_id[byte_ix];
    while byte_ix > 0 {
        let mask = 1u8 << (cur_id & 7);
        byte_ix -= 1;
        let ix = byte_ix * bitmaplen;
        if switch_signal[ix + (cur_id >> 3) as usize] & mask != 0 && cur_id != block_id[byte_ix] {
            cur_id = block_id[byte_ix];
            num_blocks += 1;
        }
        block_id[byte_ix] = cur_id;
    }
    num_blocks
}

/// Renumber block ids densely in order of appearance
fn remap_block_ids(block_ids: &mut [u8], num_histograms: usize) -> usize {
    const INVALID_ID: u16 = 256;
    let mut new_id = vec![INVALID_ID; num_histograms];
    let mut next_id = 0u16;
    for &id in block_ids.iter() {
        if new_id[id as usize] == INVALID_ID {
            new_id[id as usize] = next_id;
            next_id += 1;
        }
    }
    for id in block_ids.iter_mut() {
        *id = new_id[*id as usize] as u8;
    }
    next_id as usize
}

fn build_block_histograms<T: Copy + Into<usize>, const N: usize>(
    data: &[T],
    block_ids: &[u8],
    histograms: &mut [Histogram<N>],
) {
    histograms.iter_mut().for_each(Histogram::clear);
    for (&symbol, &id) in data.iter().zip(block_ids) {
        histograms[id as usize].add(symbol.into());
    }
}

/// Cluster the per-block histograms and emit the final split
fn cluster_blocks<T: Copy + Into<usize>, const N: usize>(
    data: &[T],
    num_blocks: usize,
    block_ids: &[u8],
    split: &mut BlockSplit,
) {
    let mut block_lengths = vec![0u32; num_blocks];
    {
        let mut block_idx = 0usize;
        for i in 0..data.len() {
            block_lengths[block_idx] += 1;
            if i + 1 == data.len() || block_ids[i] != block_ids[i + 1] {
                block_idx += 1;
            }
        }
        debug_assert_eq!(block_idx, num_blocks);
    }

    let expected_num_clusters = 16 * num_blocks.div_ceil(BLOCKS_PER_BATCH);
    let mut all_histograms: Vec<Histogram<N>> = Vec::with_capacity(expected_num_clusters);
    let mut cluster_size: Vec<u32> = Vec::with_capacity(expected_num_clusters);
    let mut histogram_symbols = vec![0u32; num_blocks];
    let mut histograms: Vec<Histogram<N>> = vec![Histogram::new(); num_blocks.min(BLOCKS_PER_BATCH)];
    let mut queue = PairQueue::new(BLOCKS_PER_BATCH * BLOCKS_PER_BATCH / 2);
    let mut new_clusters = [0u32; BLOCKS_PER_BATCH];
    let mut symbols = [0u32; BLOCKS_PER_BATCH];
    let mut sizes = [0u32; BLOCKS_PER_BATCH];
    let mut remap = [0u32; BLOCKS_PER_BATCH];

    let mut pos = 0usize;
    for i in (0..num_blocks).step_by(BLOCKS_PER_BATCH) {
        let num_to_combine = (num_blocks - i).min(BLOCKS_PER_BATCH);
        for j in 0..num_to_combine {
            let len = block_lengths[i + j] as usize;
            let h = &mut histograms[j];
            h.clear();
            h.add_vector(&data[pos..pos + len]);
            pos += len;
            h.bit_cost = population_cost(h);
            new_clusters[j] = j as u32;
            symbols[j] = j as u32;
            sizes[j] = 1;
        }
        let num_new_clusters = histogram_combine(
            &mut histograms[..num_to_combine],
            &mut sizes,
            &mut symbols[..num_to_combine],
            &mut new_clusters,
            &mut queue,
            num_to_combine,
            BLOCKS_PER_BATCH,
            BLOCKS_PER_BATCH * BLOCKS_PER_BATCH / 2,
        );
        let base = all_histograms.len() as u32;
        for (j, &c) in new_clusters[..num_new_clusters].iter().enumerate() {
            all_histograms.push(histograms[c as usize].clone());
            cluster_size.push(sizes[c as usize]);
            remap[c as usize] = j as u32;
        }
        for j in 0..num_to_combine {
            histogram_symbols[i + j] = base + remap[symbols[j] as usize];
        }
    }

    let num_clusters = all_histograms.len();
    let max_num_pairs = (BLOCKS_PER_BATCH * num_clusters).min((num_clusters / 2) * num_clusters);
    let mut clusters: Vec<u32> = (0..num_clusters as u32).collect();
    let num_final_clusters = histogram_combine(
        &mut all_histograms,
        &mut cluster_size,
        &mut histogram_symbols,
        &mut clusters,
        &mut queue,
        num_clusters,
        MAX_NUMBER_OF_BLOCK_TYPES,
        max_num_pairs,
    );

    // Reassign each block to its cheapest final cluster, preferring the
    // previous block's cluster on ties.
    const INVALID_INDEX: u32 = u32::MAX;
    let mut new_index = vec![INVALID_INDEX; num_clusters];
    let mut next_index = 0u32;
    let mut histo = Histogram::<N>::new();
    pos = 0;
    for i in 0..num_blocks {
        let len = block_lengths[i] as usize;
        histo.clear();
        histo.add_vector(&data[pos..pos + len]);
        pos += len;
        let mut best_out = if i == 0 { histogram_symbols[0] } else { histogram_symbols[i - 1] };
        let mut best_bits = histogram_bit_cost_distance(&histo, &all_histograms[best_out as usize]);
        for &c in &clusters[..num_final_clusters] {
            let cur_bits = histogram_bit_cost_distance(&histo, &all_histograms[c as usize]);
            if cur_bits < best_bits {
                best_bits = cur_bits;
                best_out = c;
            }
        }
        histogram_symbols[i] = best_out;
        if new_index[best_out as usize] == INVALID_INDEX {
            new_index[best_out as usize] = next_index;
            next_index += 1;
        }
    }

    split.types.clear();
    split.lengths.clear();
    let mut cur_length = 0u32;
    let mut max_type = 0u32;
    for i in 0..num_blocks {
        cur_length += block_lengths[i];
        if i + 1 == num_blocks || histogram_symbols[i] != histogram_symbols[i + 1] {
            let id = new_index[histogram_symbols[i] as usize];
            split.types.push(id as u8);
            split.lengths.push(cur_length);
            max_type = max_type.max(id);
            cur_length = 0;
        }
    }
    split.num_types = max_type as usize + 1;
}

/// Split one symbol stream into blocks of similar statistics
fn split_byte_vector<T: Copy + Into<usize>, const N: usize>(
    data: &[T],
    symbols_per_histogram: usize,
    max_histograms: usize,
    sampling_stride_length: usize,
    block_switch_cost: f64,
    quality: u32,
    split: &mut BlockSplit,
) {
    let length = data.len();
    if length == 0 {
        split.clear();
        split.num_types = 1;
        return;
    }
    if length < MIN_LENGTH_FOR_BLOCK_SPLITTING {
        *split = BlockSplit::single(length);
        return;
    }

    let num_histograms = (length / symbols_per_histogram + 1).min(max_histograms);
    let mut histograms: Vec<Histogram<N>> = vec![Histogram::new(); num_histograms];
    initial_entropy_codes(data, sampling_stride_length, &mut histograms);
    refine_entropy_codes(data, sampling_stride_length, &mut histograms);

    let mut block_ids = vec![0u8; length];
    let mut num_blocks = 0usize;
    let mut scratch = FindBlocksScratch { insert_cost: Vec::new(), cost: Vec::new(), switch_signal: Vec::new() };
    let iters = if quality < Quality::HQ_ZOPFLIFICATION { 3 } else { 10 };
    let mut num_histograms = num_histograms;
    for _ in 0..iters {
        num_blocks = find_blocks(data, block_switch_cost, &histograms[..num_histograms], &mut scratch, &mut block_ids);
        num_histograms = remap_block_ids(&mut block_ids, num_histograms);
        build_block_histograms(data, &block_ids, &mut histograms[..num_histograms]);
    }
    cluster_blocks::<T, N>(data, num_blocks, &block_ids, split);
}

/// Split the literal, command and distance streams of `cmds`
///
/// `data`/`mask` is the ring buffer and `pos` the position of the first
/// command.
pub fn split_block(
    cmds: &[Command],
    data: &[u8],
    pos: usize,
    mask: usize,
    quality: u32,
    literal_split: &mut BlockSplit,
    command_split: &mut BlockSplit,
    distance_split: &mut BlockSplit,
) {
    {
        let literals = copy_literals(cmds, data, pos, mask);
        split_byte_vector::<u8, NUM_LITERAL_SYMBOLS>(
            &literals,
            SYMBOLS_PER_LITERAL_HISTOGRAM,
            MAX_LITERAL_HISTOGRAMS,
            LITERAL_STRIDE_LENGTH,
            LITERAL_BLOCK_SWITCH_COST,
            quality,
            literal_split,
        );
    }
    {
        let codes: Vec<u16> = cmds.iter().map(|c| c.cmd_prefix).collect();
        split_byte_vector::<u16, NUM_COMMAND_SYMBOLS>(
            &codes,
            SYMBOLS_PER_COMMAND_HISTOGRAM,
            MAX_COMMAND_HISTOGRAMS,
            COMMAND_STRIDE_LENGTH,
            COMMAND_BLOCK_SWITCH_COST,
            quality,
            command_split,
        );
    }
    {
        let prefixes: Vec<u16> = cmds
            .iter()
            .filter(|c| c.copy_len() != 0 && c.cmd_prefix >= 128)
            .map(|c| c.distance_symbol())
            .collect();
        split_byte_vector::<u16, NUM_HISTOGRAM_DISTANCE_SYMBOLS>(
            &prefixes,
            SYMBOLS_PER_DISTANCE_HISTOGRAM,
            MAX_COMMAND_HISTOGRAMS,
            COMMAND_STRIDE_LENGTH,
            DISTANCE_BLOCK_SWITCH_COST,
            quality,
            distance_split,
        );
    }
}

/// Gather the literal bytes of `cmds` from the ring buffer
pub(crate) fn copy_literals(cmds: &[Command], data: &[u8], mut pos: usize, mask: usize) -> Vec<u8> {
    let total: usize = cmds.iter().map(|c| c.insert_len as usize).sum();
    let mut literals = Vec::with_capacity(total);
    for cmd in cmds {
        let mut insert_len = cmd.insert_len as usize;
        let mut from = pos & mask;
        if from + insert_len > mask {
            let head = mask + 1 - from;
            literals.extend_from_slice(&data[from..from + head]);
            from = 0;
            insert_len -= head;
        }
        literals.extend_from_slice(&data[from..from + insert_len]);
        pos += cmd.insert_len as usize + cmd.copy_len() as usize;
    }
    literals
}
