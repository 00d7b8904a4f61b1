//! Meta-block construction for the highest qualities: distance parameter
//! search, iterative block splitting and context-aware clustering.

use super::{split_block, BlockSplit, BlockSplitIterator, MetaBlockSplit};
use crate::command::{prefix_encode_copy_distance, Command, DistanceParams};
use crate::constants::{
    DISTANCE_CONTEXT_BITS, LITERAL_CONTEXT_BITS, MAX_NPOSTFIX, NUM_COMMAND_SYMBOLS, NUM_HISTOGRAM_DISTANCE_SYMBOLS,
};
use crate::context::{ContextLut, ContextMode};
use crate::entropy::{cluster_histograms, population_cost, HistogramCommand, HistogramDistance, HistogramLiteral};
use crate::huffman::optimize_huffman_counts_for_rle;
use crate::params::EncoderParams;

/// Histogram ids are stored in one byte
const MAX_NUMBER_OF_HISTOGRAMS: usize = 256;

/// Estimated cost of the distance symbols and extra bits of `cmds` when
/// recoded from `orig` to `new`; `None` if some distance does not fit
fn compute_distance_cost(cmds: &[Command], orig: &DistanceParams, new: &DistanceParams) -> Option<f64> {
    let equal_params = orig.postfix_bits == new.postfix_bits && orig.num_direct_codes == new.num_direct_codes;
    let mut histo = HistogramDistance::new();
    let mut extra_bits = 0.0;
    for cmd in cmds.iter().filter(|c| c.copy_len() != 0 && c.cmd_prefix >= 128) {
        let dist_prefix = if equal_params {
            cmd.dist_prefix
        } else {
            let distance = cmd.restore_distance_code(orig);
            if distance as usize > new.max_distance {
                return None;
            }
            prefix_encode_copy_distance(distance as usize, new.num_direct_codes as usize, new.postfix_bits).0
        };
        histo.add((dist_prefix & 0x3FF) as usize);
        extra_bits += (dist_prefix >> 10) as f64;
    }
    Some(population_cost(&histo) + extra_bits)
}

/// Re-encode the explicit distances of `cmds` for new parameters
pub(crate) fn recompute_distance_prefixes(cmds: &mut [Command], orig: &DistanceParams, new: &DistanceParams) {
    if orig == new {
        return;
    }
    for cmd in cmds.iter_mut().filter(|c| c.copy_len() != 0 && c.cmd_prefix >= 128) {
        let distance = cmd.restore_distance_code(orig);
        let (prefix, extra) =
            prefix_encode_copy_distance(distance as usize, new.num_direct_codes as usize, new.postfix_bits);
        cmd.dist_prefix = prefix;
        cmd.dist_extra = extra;
    }
}

/// Search NPOSTFIX / NDIRECT for the cheapest distance coding of `cmds`
///
/// For each postfix the number of direct codes grows while the cost keeps
/// falling; the next postfix resumes from half of the last good value.
fn choose_best_distance_params(cmds: &[Command], params: &EncoderParams) -> DistanceParams {
    let orig = *params.distance_params();
    if params.large_window {
        return orig;
    }
    let mut best = orig;
    let mut best_cost = f64::INFINITY;
    let mut check_orig = true;
    let mut ndirect_msb = 0u32;
    for npostfix in 0..=MAX_NPOSTFIX {
        while ndirect_msb < 16 {
            let ndirect = ndirect_msb << npostfix;
            let candidate = DistanceParams::new(npostfix, ndirect, false);
            if npostfix == orig.postfix_bits && ndirect == orig.num_direct_codes {
                check_orig = false;
            }
            match compute_distance_cost(cmds, &orig, &candidate) {
                Some(cost) if cost <= best_cost => {
                    best_cost = cost;
                    best = candidate;
                }
                _ => break,
            }
            ndirect_msb += 1;
        }
        ndirect_msb = ndirect_msb.saturating_sub(1) / 2;
    }
    if check_orig {
        if let Some(cost) = compute_distance_cost(cmds, &orig, &orig) {
            if cost < best_cost {
                best = orig;
            }
        }
    }
    best
}

/// Histograms of literals per (block type, context), commands per block
/// type and distances per (block type, distance context)
#[allow(clippy::too_many_arguments)]
fn build_histograms_with_context(
    cmds: &[Command],
    literal_split: &BlockSplit,
    command_split: &BlockSplit,
    distance_split: &BlockSplit,
    ringbuffer: &[u8],
    mut pos: usize,
    mask: usize,
    mut prev_byte: u8,
    mut prev_byte2: u8,
    literal_lut: Option<&ContextLut>,
    literal_histograms: &mut [HistogramLiteral],
    command_histograms: &mut [HistogramCommand],
    distance_histograms: &mut [HistogramDistance],
) {
    let mut literal_it = BlockSplitIterator::new(literal_split);
    let mut command_it = BlockSplitIterator::new(command_split);
    let mut distance_it = BlockSplitIterator::new(distance_split);
    for cmd in cmds {
        command_it.next_symbol();
        command_histograms[command_it.block_type].add(cmd.cmd_prefix as usize);
        for _ in 0..cmd.insert_len {
            literal_it.next_symbol();
            let literal = ringbuffer[pos & mask];
            let context = match literal_lut {
                Some(lut) => (literal_it.block_type << LITERAL_CONTEXT_BITS) + lut.context(prev_byte, prev_byte2),
                None => literal_it.block_type,
            };
            literal_histograms[context].add(literal as usize);
            prev_byte2 = prev_byte;
            prev_byte = literal;
            pos += 1;
        }
        let copy_len = cmd.copy_len() as usize;
        pos += copy_len;
        if copy_len != 0 {
            prev_byte2 = ringbuffer[(pos - 2) & mask];
            prev_byte = ringbuffer[(pos - 1) & mask];
            if cmd.cmd_prefix >= 128 {
                distance_it.next_symbol();
                let context = (distance_it.block_type << DISTANCE_CONTEXT_BITS) + cmd.distance_context() as usize;
                distance_histograms[context].add(cmd.distance_symbol() as usize);
            }
        }
    }
}

/// Build a fully split and clustered meta-block
///
/// May re-encode the distances of `cmds`; returns the distance parameters
/// the meta-block must be written with.
#[allow(clippy::too_many_arguments)]
pub fn build_meta_block(
    ringbuffer: &[u8],
    pos: usize,
    mask: usize,
    params: &EncoderParams,
    prev_byte: u8,
    prev_byte2: u8,
    cmds: &mut [Command],
    literal_context_mode: ContextMode,
) -> (MetaBlockSplit, DistanceParams) {
    let dist = choose_best_distance_params(cmds, params);
    recompute_distance_prefixes(cmds, params.distance_params(), &dist);

    let mut mb = MetaBlockSplit::default();
    split_block(
        cmds,
        ringbuffer,
        pos,
        mask,
        params.quality,
        &mut mb.literal_split,
        &mut mb.command_split,
        &mut mb.distance_split,
    );

    let literal_lut = (!params.disable_literal_context_modeling).then(|| ContextLut::new(literal_context_mode));
    let literal_context_multiplier = if literal_lut.is_some() { 1 << LITERAL_CONTEXT_BITS } else { 1 };
    let mut literal_histograms =
        vec![HistogramLiteral::new(); mb.literal_split.num_types * literal_context_multiplier];
    let mut command_histograms = vec![HistogramCommand::new(); mb.command_split.num_types];
    let mut distance_histograms = vec![HistogramDistance::new(); mb.distance_split.num_types << DISTANCE_CONTEXT_BITS];

    build_histograms_with_context(
        cmds,
        &mb.literal_split,
        &mb.command_split,
        &mb.distance_split,
        ringbuffer,
        pos,
        mask,
        prev_byte,
        prev_byte2,
        literal_lut.as_ref(),
        &mut literal_histograms,
        &mut command_histograms,
        &mut distance_histograms,
    );

    let (clustered, mut literal_context_map) = cluster_histograms(&literal_histograms, MAX_NUMBER_OF_HISTOGRAMS);
    if literal_lut.is_none() {
        // one histogram per block type: spread it over all 64 contexts
        literal_context_map = literal_context_map
            .iter()
            .flat_map(|&h| std::iter::repeat(h).take(1 << LITERAL_CONTEXT_BITS))
            .collect();
    }
    mb.literal_histograms = clustered;
    mb.literal_context_map = literal_context_map;

    let (clustered, distance_context_map) = cluster_histograms(&distance_histograms, MAX_NUMBER_OF_HISTOGRAMS);
    mb.distance_histograms = clustered;
    mb.distance_context_map = distance_context_map;
    mb.command_histograms = command_histograms;

    log::trace!(
        "meta-block split: {} literal, {} command, {} distance types; {} literal, {} distance histograms",
        mb.literal_split.num_types,
        mb.command_split.num_types,
        mb.distance_split.num_types,
        mb.literal_histograms.len(),
        mb.distance_histograms.len()
    );
    (mb, dist)
}

/// Smooth every histogram for cheaper code-length transmission
///
/// Distance histograms are only smoothed over the `num_distance_codes`
/// symbols the stream can use.
pub fn optimize_histograms(num_distance_codes: usize, mb: &mut MetaBlockSplit) {
    let mut good_for_rle = [false; NUM_COMMAND_SYMBOLS];
    for h in &mut mb.literal_histograms {
        optimize_huffman_counts_for_rle(&mut h.data, &mut good_for_rle);
    }
    for h in &mut mb.command_histograms {
        optimize_huffman_counts_for_rle(&mut h.data, &mut good_for_rle);
    }
    let num_distance_codes = num_distance_codes.min(NUM_HISTOGRAM_DISTANCE_SYMBOLS);
    for h in &mut mb.distance_histograms {
        optimize_huffman_counts_for_rle(&mut h.data[..num_distance_codes], &mut good_for_rle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NUM_DISTANCE_SHORT_CODES;
    use crate::metablock::test_util::periodic_commands;

    fn covered(split: &BlockSplit) -> usize {
        split.lengths.iter().map(|&l| l as usize).sum()
    }

    fn sample_data(len: usize) -> Vec<u8> {
        "the quick brown fox jumps over the lazy dog; ".bytes().cycle().take(len).collect()
    }

    #[test]
    fn test_build_meta_block_maps_every_context() {
        let data = sample_data(60_000);
        let mut cmds = periodic_commands(data.len(), 45, 90);
        let params = EncoderParams::default();
        let (mb, dist) = build_meta_block(&data, 0, usize::MAX, &params, 0, 0, &mut cmds, ContextMode::Utf8);

        assert_eq!(mb.literal_context_map.len(), mb.literal_split.num_types << LITERAL_CONTEXT_BITS);
        assert_eq!(mb.distance_context_map.len(), mb.distance_split.num_types << DISTANCE_CONTEXT_BITS);
        assert!(mb.literal_context_map.iter().all(|&h| (h as usize) < mb.literal_histograms.len()));
        assert!(mb.distance_context_map.iter().all(|&h| (h as usize) < mb.distance_histograms.len()));
        assert!(mb.literal_histograms.len() <= MAX_NUMBER_OF_HISTOGRAMS);
        assert_eq!(mb.command_histograms.len(), mb.command_split.num_types);
        assert_eq!(covered(&mb.command_split), cmds.len());

        // recoded distances still decode to the same distance codes
        for cmd in cmds.iter().filter(|c| c.copy_len() != 0 && c.cmd_prefix >= 128) {
            assert_eq!(cmd.restore_distance_code(&dist) as usize, 45 + NUM_DISTANCE_SHORT_CODES - 1);
        }
    }

    #[test]
    fn test_disabled_context_modeling_spreads_types() {
        let data = sample_data(20_000);
        let mut cmds = periodic_commands(data.len(), 45, 90);
        let params = EncoderParams::default().with_literal_context_modeling(false);
        let (mb, _) = build_meta_block(&data, 0, usize::MAX, &params, 0, 0, &mut cmds, ContextMode::Utf8);
        for row in mb.literal_context_map.chunks(1 << LITERAL_CONTEXT_BITS) {
            assert!(row.iter().all(|&h| h == row[0]));
        }
    }

    #[test]
    fn test_distance_params_search_never_costs_more() {
        let mut cmds = periodic_commands(100_000, 40, 200);
        let orig = DistanceParams::default();
        let params = EncoderParams::default();
        let best = choose_best_distance_params(&cmds, &params);
        let orig_cost = compute_distance_cost(&cmds, &orig, &orig).unwrap();
        let best_cost = compute_distance_cost(&cmds, &orig, &best).unwrap();
        assert!(best_cost <= orig_cost);
        recompute_distance_prefixes(&mut cmds, &orig, &best);
        for cmd in cmds.iter().filter(|c| c.cmd_prefix >= 128) {
            assert!((cmd.distance_symbol() as u32) < best.alphabet_size);
        }
    }

    #[test]
    fn test_optimize_histograms_keeps_used_symbols() {
        let data = sample_data(30_000);
        let mut cmds = periodic_commands(data.len(), 45, 90);
        let params = EncoderParams::default();
        let (mut mb, dist) = build_meta_block(&data, 0, usize::MAX, &params, 0, 0, &mut cmds, ContextMode::Utf8);
        let before: Vec<Vec<bool>> =
            mb.literal_histograms.iter().map(|h| h.data.iter().map(|&c| c > 0).collect()).collect();
        optimize_histograms(dist.alphabet_size as usize, &mut mb);
        for (h, used) in mb.literal_histograms.iter().zip(&before) {
            for (&c, &u) in h.data.iter().zip(used) {
                assert!(!u || c > 0);
            }
        }
    }
}
