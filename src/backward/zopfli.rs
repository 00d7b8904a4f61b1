//! Zopfli optimal parsing.
//!
//! Every position of the block is a node of a DAG whose edges are the
//! literal runs and copies that can start there. A forward pass relaxes
//! the edges in position order under a bit cost model, keeping for each
//! node the cheapest command that ends at it; the cheapest path is then
//! read back from the end. The distance cache makes edge costs depend on
//! the path, so only the eight most promising start positions
//! ([`StartPosQueue`]) are considered for each node.

use super::{literal_cost::estimate_bit_costs_for_literals, push_distance, CommandStream};
use crate::command::{
    combine_length_codes, copy_extra, copy_length_code, insert_extra, insert_length_code, prefix_encode_copy_distance,
    Command, DistanceParams,
};
use crate::constants::{NUM_COMMAND_SYMBOLS, NUM_DISTANCE_SHORT_CODES, NUM_HISTOGRAM_DISTANCE_SYMBOLS, NUM_LITERAL_SYMBOLS};
use crate::entropy::fast_log2;
use crate::hash::{find_match_length_with_limit, BackwardMatch, BinaryTreeHasher, MatchQuery, MAX_TREE_COMP_LENGTH};
use crate::params::{max_backward_limit, EncoderParams, Quality};

const INFINITY: f32 = 1.7e38;

/// Copies at least this long are taken without evaluating the positions
/// they cover
const LONG_COPY_QUICK_STEP: usize = 16384;

/// Longest match the quality-11 match collection keeps candidates for
const MAX_ZOPFLI_LEN_QUALITY_11: usize = 325;

/// Bytes hashed by the binary-tree hasher
const HASH_TYPE_LENGTH: usize = 4;

/// Cache slot and offset of each of the 16 short distance codes
const DISTANCE_CACHE_INDEX: [usize; NUM_DISTANCE_SHORT_CODES] = [0, 1, 2, 3, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1];
const DISTANCE_CACHE_OFFSET: [i32; NUM_DISTANCE_SHORT_CODES] = [0, 0, 0, 0, -1, 1, -2, 2, -3, 3, -1, 1, -2, 2, -3, 3];

/// Best known command ending at one position
#[derive(Clone, Copy, Debug)]
pub struct ZopfliNode {
    /// Copy length, with `len + 9 - len_code` in the top 7 bits
    length: u32,
    distance: u32,
    /// Short distance code plus one in the top 5 bits, insert length below
    dcode_insert_length: u32,
    /// Cost of the cheapest path reaching this node (forward pass)
    cost: f32,
    /// Closest node on the path whose command pushed a distance
    shortcut: u32,
    /// Length of the next command on the chosen path (backward pass)
    next: u32,
}

impl Default for ZopfliNode {
    fn default() -> Self {
        Self { length: 1, distance: 0, dcode_insert_length: 0, cost: INFINITY, shortcut: 0, next: 0 }
    }
}

impl ZopfliNode {
    #[inline]
    fn copy_length(&self) -> usize {
        (self.length & 0x1FF_FFFF) as usize
    }

    #[inline]
    fn length_code(&self) -> usize {
        let modifier = (self.length >> 25) as usize;
        self.copy_length() + 9 - modifier
    }

    #[inline]
    fn insert_length(&self) -> usize {
        (self.dcode_insert_length & 0x7FF_FFFF) as usize
    }

    #[inline]
    fn distance_code(&self) -> usize {
        match self.dcode_insert_length >> 27 {
            0 => self.distance as usize + NUM_DISTANCE_SHORT_CODES - 1,
            short_code => short_code as usize - 1,
        }
    }

    #[inline]
    fn command_length(&self) -> usize {
        self.copy_length() + self.insert_length()
    }
}

fn init_nodes(nodes: &mut Vec<ZopfliNode>, len: usize) {
    nodes.clear();
    nodes.resize(len, ZopfliNode::default());
}

/// Bit costs of commands, distances and literal runs
struct CostModel {
    cost_cmd: Vec<f32>,
    cost_dist: Vec<f32>,
    /// Prefix sums of per-position literal costs
    literal_costs: Vec<f32>,
    min_cost_cmd: f32,
    num_bytes: usize,
}

/// Cost of every symbol from its frequency; unseen symbols get a
/// penalty above the rarest seen one
fn set_cost(histogram: &[u32], literal_histogram: bool, cost: &mut [f32]) {
    let sum: usize = histogram.iter().map(|&h| h as usize).sum();
    let log2sum = fast_log2(sum);
    let mut missing_symbol_sum = sum;
    if !literal_histogram {
        missing_symbol_sum += histogram.iter().filter(|&&h| h == 0).count();
    }
    let missing_symbol_cost = (fast_log2(missing_symbol_sum) + 2.0) as f32;
    for (c, &h) in cost.iter_mut().zip(histogram) {
        *c = if h == 0 { missing_symbol_cost } else { ((log2sum - fast_log2(h as usize)) as f32).max(1.0) };
    }
}

impl CostModel {
    fn new(dist: &DistanceParams, num_bytes: usize) -> Self {
        let distance_histogram_size = (dist.alphabet_size as usize).min(NUM_HISTOGRAM_DISTANCE_SYMBOLS);
        Self {
            cost_cmd: vec![0.0; NUM_COMMAND_SYMBOLS],
            cost_dist: vec![0.0; distance_histogram_size],
            literal_costs: vec![0.0; num_bytes + 2],
            min_cost_cmd: INFINITY,
            num_bytes,
        }
    }

    /// Turn per-position costs in `literal_costs[1..]` into prefix sums,
    /// carrying rounding errors forward
    fn accumulate_literal_costs(&mut self) {
        let mut literal_carry = 0.0f32;
        self.literal_costs[0] = 0.0;
        for i in 0..self.num_bytes {
            literal_carry += self.literal_costs[i + 1];
            self.literal_costs[i + 1] = self.literal_costs[i] + literal_carry;
            literal_carry -= self.literal_costs[i + 1] - self.literal_costs[i];
        }
    }

    /// First-pass model: literal costs from local byte statistics, command
    /// and distance costs growing slowly with the symbol
    fn set_from_literal_costs(&mut self, position: usize, ringbuffer: &[u8], mask: usize) {
        let num_bytes = self.num_bytes;
        estimate_bit_costs_for_literals(ringbuffer, position, num_bytes, mask, &mut self.literal_costs[1..]);
        self.accumulate_literal_costs();
        for (i, c) in self.cost_cmd.iter_mut().enumerate() {
            *c = fast_log2(11 + i) as f32;
        }
        for (i, c) in self.cost_dist.iter_mut().enumerate() {
            *c = fast_log2(20 + i) as f32;
        }
        self.min_cost_cmd = fast_log2(11) as f32;
    }

    /// Refinement model: symbol costs from the commands of a previous pass
    fn set_from_commands(&mut self, position: usize, ringbuffer: &[u8], mask: usize, commands: &[Command], last_insert_len: usize) {
        let mut histogram_literal = [0u32; NUM_LITERAL_SYMBOLS];
        let mut histogram_cmd = [0u32; NUM_COMMAND_SYMBOLS];
        let mut histogram_dist = vec![0u32; self.cost_dist.len()];
        let mut pos = position - last_insert_len;
        for cmd in commands {
            let insert_len = cmd.insert_len as usize;
            histogram_cmd[cmd.cmd_prefix as usize] += 1;
            if cmd.cmd_prefix >= 128 {
                if let Some(h) = histogram_dist.get_mut(cmd.distance_symbol() as usize) {
                    *h += 1;
                }
            }
            for j in 0..insert_len {
                histogram_literal[ringbuffer[(pos + j) & mask] as usize] += 1;
            }
            pos += insert_len + cmd.copy_len() as usize;
        }

        let mut cost_literal = [0f32; NUM_LITERAL_SYMBOLS];
        set_cost(&histogram_literal, true, &mut cost_literal);
        set_cost(&histogram_cmd, false, &mut self.cost_cmd);
        set_cost(&histogram_dist, false, &mut self.cost_dist);
        self.min_cost_cmd = self.cost_cmd.iter().copied().fold(INFINITY, f32::min);

        for i in 0..self.num_bytes {
            self.literal_costs[i + 1] = cost_literal[ringbuffer[(position + i) & mask] as usize];
        }
        self.accumulate_literal_costs();
    }

    #[inline]
    fn command_cost(&self, cmdcode: u16) -> f32 {
        self.cost_cmd[cmdcode as usize]
    }

    #[inline]
    fn distance_cost(&self, distcode: usize) -> f32 {
        self.cost_dist.get(distcode).copied().unwrap_or(INFINITY)
    }

    #[inline]
    fn literal_costs(&self, from: usize, to: usize) -> f32 {
        self.literal_costs[to] - self.literal_costs[from]
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct PosData {
    pos: usize,
    distance_cache: [i32; 4],
    /// Path cost minus the cost of coding everything before as literals
    costdiff: f32,
    cost: f32,
}

/// The eight best start positions seen so far, ordered by `costdiff`
#[derive(Debug, Default)]
struct StartPosQueue {
    q: [PosData; 8],
    idx: usize,
}

impl StartPosQueue {
    fn len(&self) -> usize {
        self.idx.min(8)
    }

    fn push(&mut self, posdata: PosData) {
        let mut offset = !self.idx & 7;
        self.idx += 1;
        let len = self.len();
        self.q[offset] = posdata;
        // Restore the sorted order; the oldest entry falls off the end.
        for _ in 1..len {
            if self.q[offset & 7].costdiff > self.q[(offset + 1) & 7].costdiff {
                self.q.swap(offset & 7, (offset + 1) & 7);
            }
            offset += 1;
        }
    }

    fn at(&self, k: usize) -> &PosData {
        &self.q[k.wrapping_sub(self.idx) & 7]
    }
}

/// Shortest copy that can still improve on the costs already recorded
/// for the positions it would reach
fn compute_minimum_copy_length(start_cost: f32, nodes: &[ZopfliNode], num_bytes: usize, pos: usize) -> usize {
    let mut min_cost = start_cost;
    let mut len = 2;
    let mut next_len_bucket = 4;
    let mut next_len_offset = 10;
    while pos + len <= num_bytes && nodes[pos + len].cost <= min_cost {
        // every extra length bucket costs at least one more bit
        len += 1;
        if len == next_len_offset {
            min_cost += 1.0;
            next_len_offset += next_len_bucket;
            next_len_bucket *= 2;
        }
    }
    len
}

fn update_zopfli_node(
    nodes: &mut [ZopfliNode],
    pos: usize,
    start_pos: usize,
    len: usize,
    len_code: usize,
    dist: usize,
    short_code: usize,
    cost: f32,
) {
    let next = &mut nodes[pos + len];
    next.length = (len | ((len + 9 - len_code) << 25)) as u32;
    next.distance = dist as u32;
    next.dcode_insert_length = ((short_code << 27) | (pos - start_pos)) as u32;
    next.cost = cost;
}

/// State shared by every node update of one block
struct ShortestPath<'a> {
    ringbuffer: &'a [u8],
    mask: usize,
    params: &'a EncoderParams,
    block_start: usize,
    num_bytes: usize,
    max_backward: usize,
    starting_dist_cache: [i32; 4],
    model: &'a CostModel,
}

impl ShortestPath<'_> {
    /// Position of the closest node on the path to `pos` whose command
    /// updated the distance cache
    fn compute_distance_shortcut(&self, pos: usize, nodes: &[ZopfliNode]) -> u32 {
        if pos == 0 {
            return 0;
        }
        let node = &nodes[pos];
        let clen = node.copy_length();
        let ilen = node.insert_length();
        let dist = node.distance as usize;
        if dist + clen <= self.block_start + pos && dist <= self.max_backward && node.distance_code() > 0 {
            pos as u32
        } else {
            nodes[pos - clen - ilen].shortcut
        }
    }

    /// Distance cache in effect at `pos` along its best path
    fn compute_distance_cache(&self, pos: usize, nodes: &[ZopfliNode]) -> [i32; 4] {
        let mut dist_cache = [0i32; 4];
        let mut idx = 0;
        let mut p = nodes[pos].shortcut as usize;
        while idx < 4 && p > 0 {
            let node = &nodes[p];
            dist_cache[idx] = node.distance as i32;
            idx += 1;
            p = nodes[p - node.copy_length() - node.insert_length()].shortcut as usize;
        }
        dist_cache[idx..].copy_from_slice(&self.starting_dist_cache[..4 - idx]);
        dist_cache
    }

    /// Finalize `pos` and offer it as a command start position
    fn evaluate_node(&self, pos: usize, queue: &mut StartPosQueue, nodes: &mut [ZopfliNode]) {
        let node_cost = nodes[pos].cost;
        nodes[pos].shortcut = self.compute_distance_shortcut(pos, nodes);
        let literal_cost = self.model.literal_costs(0, pos);
        if node_cost <= literal_cost {
            queue.push(PosData {
                pos,
                distance_cache: self.compute_distance_cache(pos, nodes),
                costdiff: node_cost - literal_cost,
                cost: node_cost,
            });
        }
    }

    /// Relax every copy starting at `pos` from the queued start
    /// positions; returns the longest copy that improved a node
    fn update_nodes(&self, pos: usize, matches: &[BackwardMatch], queue: &mut StartPosQueue, nodes: &mut [ZopfliNode]) -> usize {
        let ringbuffer = self.ringbuffer;
        let cur_ix = self.block_start + pos;
        let cur_ix_masked = cur_ix & self.mask;
        let max_distance = cur_ix.min(self.max_backward);
        let dictionary_start = cur_ix.min(self.max_backward);
        let max_len = self.num_bytes - pos;
        let max_zopfli_len = self.params.max_zopfli_len();
        let max_iters = self.params.max_zopfli_candidates();
        let dist = &self.params.dist;
        let mut result = 0;

        self.evaluate_node(pos, queue, nodes);

        let min_len = {
            let posdata = queue.at(0);
            let min_cost = posdata.cost + self.model.min_cost_cmd + self.model.literal_costs(posdata.pos, pos);
            compute_minimum_copy_length(min_cost, nodes, self.num_bytes, pos)
        };

        for k in 0..max_iters.min(queue.len()) {
            let posdata = *queue.at(k);
            let start = posdata.pos;
            let inscode = insert_length_code(pos - start);
            let start_costdiff = posdata.costdiff;
            let base_cost = start_costdiff + insert_extra(inscode) as f32 + self.model.literal_costs(0, pos);

            // Last-distance candidates
            let mut best_len = min_len - 1;
            for j in 0..NUM_DISTANCE_SHORT_CODES {
                if best_len >= max_len {
                    break;
                }
                let backward = (posdata.distance_cache[DISTANCE_CACHE_INDEX[j]] + DISTANCE_CACHE_OFFSET[j]) as isize;
                if cur_ix_masked + best_len > self.mask {
                    break;
                }
                if backward <= 0 || backward as usize > dictionary_start || backward as usize > max_distance {
                    continue;
                }
                let backward = backward as usize;
                let prev_ix = (cur_ix - backward) & self.mask;
                let continuation = ringbuffer[cur_ix_masked + best_len];
                if prev_ix + best_len > self.mask || continuation != ringbuffer[prev_ix + best_len] {
                    continue;
                }
                let len = find_match_length_with_limit(&ringbuffer[prev_ix..], &ringbuffer[cur_ix_masked..], max_len);
                let dist_cost = base_cost + self.model.distance_cost(j);
                for l in best_len + 1..=len {
                    let copycode = copy_length_code(l);
                    let cmdcode = combine_length_codes(inscode, copycode, j == 0);
                    let cost = if cmdcode < 128 { base_cost } else { dist_cost }
                        + copy_extra(copycode) as f32
                        + self.model.command_cost(cmdcode);
                    if cost < nodes[pos + l].cost {
                        update_zopfli_node(nodes, pos, start, l, l, backward, j + 1, cost);
                        result = result.max(l);
                    }
                    best_len = l;
                }
            }

            // New distances are only tried from the two best start
            // positions.
            if k >= 2 {
                continue;
            }

            let mut len = min_len;
            for m in matches {
                let distance = m.distance as usize;
                let is_dictionary_match = distance > dictionary_start;
                let dist_code = distance + NUM_DISTANCE_SHORT_CODES - 1;
                let (dist_symbol, _) =
                    prefix_encode_copy_distance(dist_code, dist.num_direct_codes as usize, dist.postfix_bits);
                let dist_num_extra = (dist_symbol >> 10) as f32;
                let dist_cost = base_cost + dist_num_extra + self.model.distance_cost((dist_symbol & 0x3FF) as usize);

                let max_match_len = m.length();
                if len < max_match_len && (is_dictionary_match || max_match_len > max_zopfli_len) {
                    len = max_match_len;
                }
                while len <= max_match_len {
                    let len_code = if is_dictionary_match { m.len_code() } else { len };
                    let copycode = copy_length_code(len_code);
                    let cmdcode = combine_length_codes(inscode, copycode, false);
                    let cost = dist_cost + copy_extra(copycode) as f32 + self.model.command_cost(cmdcode);
                    if cost < nodes[pos + len].cost {
                        update_zopfli_node(nodes, pos, start, len, len_code, distance, 0, cost);
                        result = result.max(len);
                    }
                    len += 1;
                }
            }
        }
        result
    }
}

/// Mark the cheapest path by storing each command's length in the node
/// where it starts; returns the number of commands
fn compute_shortest_path_from_nodes(num_bytes: usize, nodes: &mut [ZopfliNode]) -> usize {
    let mut index = num_bytes;
    let mut num_commands = 0;
    while nodes[index].insert_length() == 0 && nodes[index].length == 1 {
        index -= 1;
    }
    nodes[index].next = u32::MAX;
    while index != 0 {
        let len = nodes[index].command_length();
        index -= len;
        nodes[index].next = len as u32;
        num_commands += 1;
    }
    num_commands
}

/// Emit the commands along the marked path
fn create_commands(
    num_bytes: usize,
    block_start: usize,
    nodes: &[ZopfliNode],
    dist_cache: &mut [i32; 16],
    params: &EncoderParams,
    out: &mut CommandStream,
) {
    let max_backward = max_backward_limit(params.lgwin);
    let mut pos = 0usize;
    let mut offset = nodes[0].next;
    let mut first = true;
    while offset != u32::MAX {
        let next = &nodes[pos + offset as usize];
        let copy_length = next.copy_length();
        let mut insert_length = next.insert_length();
        pos += insert_length;
        offset = next.next;
        if first {
            insert_length += out.last_insert_len;
            out.last_insert_len = 0;
            first = false;
        }
        let distance = next.distance as usize;
        let len_code = next.length_code();
        let dictionary_start = (block_start + pos).min(max_backward);
        let is_dictionary = distance > dictionary_start;
        let dist_code = next.distance_code();
        out.commands.push(Command::new(
            &params.dist,
            insert_length,
            copy_length,
            len_code as i32 - copy_length as i32,
            dist_code,
        ));
        if !is_dictionary && dist_code > 0 {
            push_distance(dist_cache, distance);
        }
        out.num_literals += insert_length;
        pos += copy_length;
    }
    out.last_insert_len += num_bytes - pos;
}

/// Distances scanned for two- and three-byte matches
fn short_match_max_backward(params: &EncoderParams) -> usize {
    if params.quality != Quality::HQ_ZOPFLIFICATION {
        16
    } else {
        64
    }
}

fn store_end(num_bytes: usize, position: usize) -> usize {
    if num_bytes >= MAX_TREE_COMP_LENGTH {
        position + num_bytes - MAX_TREE_COMP_LENGTH + 1
    } else {
        position
    }
}

fn match_query<'a>(
    ringbuffer: &'a [u8],
    mask: usize,
    params: &EncoderParams,
    pos: usize,
    max_length: usize,
) -> MatchQuery<'a> {
    let max_backward = max_backward_limit(params.lgwin);
    MatchQuery {
        data: ringbuffer,
        mask,
        cur_ix: pos,
        max_length,
        max_backward: pos.min(max_backward),
        dictionary_distance: pos.min(max_backward),
        max_distance: params.dist.max_distance,
    }
}

/// Single-pass optimal parse (quality 10), searching matches as the
/// forward pass reaches each position
#[allow(clippy::too_many_arguments)]
pub fn create_zopfli_backward_references(
    num_bytes: usize,
    position: usize,
    ringbuffer: &[u8],
    mask: usize,
    params: &EncoderParams,
    hasher: &mut BinaryTreeHasher,
    dist_cache: &mut [i32; 16],
    out: &mut CommandStream,
) {
    let mut nodes = Vec::new();
    init_nodes(&mut nodes, num_bytes + 1);
    nodes[0].length = 0;
    nodes[0].cost = 0.0;

    let mut model = CostModel::new(&params.dist, num_bytes);
    model.set_from_literal_costs(position, ringbuffer, mask);
    let search = ShortestPath {
        ringbuffer,
        mask,
        params,
        block_start: position,
        num_bytes,
        max_backward: max_backward_limit(params.lgwin),
        starting_dist_cache: [dist_cache[0], dist_cache[1], dist_cache[2], dist_cache[3]],
        model: &model,
    };
    let max_zopfli_len = params.max_zopfli_len();
    let store_end = store_end(num_bytes, position);
    let short_backward = short_match_max_backward(params);
    let mut queue = StartPosQueue::default();
    let mut matches = Vec::new();

    let mut i = 0;
    while i + HASH_TYPE_LENGTH - 1 < num_bytes {
        let pos = position + i;
        matches.clear();
        hasher.find_all_matches(&match_query(ringbuffer, mask, params, pos, num_bytes - i), short_backward, &mut matches);
        if let Some(&longest) = matches.last() {
            if longest.length() > max_zopfli_len {
                matches.clear();
                matches.push(longest);
            }
        }
        let mut skip = search.update_nodes(i, &matches, &mut queue, &mut nodes);
        if skip < LONG_COPY_QUICK_STEP {
            skip = 0;
        }
        if matches.len() == 1 && matches[0].length() > max_zopfli_len {
            skip = skip.max(matches[0].length());
        }
        if skip > 1 {
            // the tail of a long copy is only stored, not searched
            hasher.store_range(ringbuffer, mask, pos + 1, (pos + skip).min(store_end));
            for _ in 1..skip {
                i += 1;
                if i + HASH_TYPE_LENGTH - 1 >= num_bytes {
                    break;
                }
                search.evaluate_node(i, &mut queue, &mut nodes);
            }
        }
        i += 1;
    }
    let num_commands = compute_shortest_path_from_nodes(num_bytes, &mut nodes);
    log::trace!("zopfli: {} bytes at {} -> {} commands", num_bytes, position, num_commands);
    create_commands(num_bytes, position, &nodes, dist_cache, params, out);
}

/// Forward pass over precomputed matches (`num_matches[i]` entries of
/// `matches` per position)
fn zopfli_iterate(search: &ShortestPath<'_>, num_matches: &[u32], matches: &[BackwardMatch], nodes: &mut [ZopfliNode]) -> usize {
    let num_bytes = search.num_bytes;
    let max_zopfli_len = search.params.max_zopfli_len();
    let mut queue = StartPosQueue::default();
    let mut cur_match_pos = 0;
    nodes[0].length = 0;
    nodes[0].cost = 0.0;

    let mut i = 0;
    while i + 3 < num_bytes {
        let n = num_matches[i] as usize;
        let here = &matches[cur_match_pos..cur_match_pos + n];
        let mut skip = search.update_nodes(i, here, &mut queue, nodes);
        if skip < LONG_COPY_QUICK_STEP {
            skip = 0;
        }
        cur_match_pos += n;
        if n == 1 && here[0].length() > max_zopfli_len {
            skip = skip.max(here[0].length());
        }
        if skip > 1 {
            for _ in 1..skip {
                i += 1;
                if i + 3 >= num_bytes {
                    break;
                }
                search.evaluate_node(i, &mut queue, nodes);
                cur_match_pos += num_matches[i] as usize;
            }
        }
        i += 1;
    }
    compute_shortest_path_from_nodes(num_bytes, nodes)
}

/// Two-pass optimal parse (quality 11)
///
/// Matches for every position are collected once; the first pass prices
/// literals from byte statistics, the second from the commands the first
/// pass chose.
#[allow(clippy::too_many_arguments)]
pub fn create_hq_zopfli_backward_references(
    num_bytes: usize,
    position: usize,
    ringbuffer: &[u8],
    mask: usize,
    params: &EncoderParams,
    hasher: &mut BinaryTreeHasher,
    dist_cache: &mut [i32; 16],
    out: &mut CommandStream,
) {
    let store_end = store_end(num_bytes, position);
    let short_backward = short_match_max_backward(params);
    let mut num_matches = vec![0u32; num_bytes];
    let mut matches: Vec<BackwardMatch> = Vec::with_capacity(4 * num_bytes);
    let mut found = Vec::new();

    let mut i = 0;
    while i + HASH_TYPE_LENGTH - 1 < num_bytes {
        let pos = position + i;
        found.clear();
        hasher.find_all_matches(&match_query(ringbuffer, mask, params, pos, num_bytes - i), short_backward, &mut found);
        num_matches[i] = found.len() as u32;
        if let Some(&longest) = found.last() {
            let match_len = longest.length();
            if match_len > MAX_ZOPFLI_LEN_QUALITY_11 {
                matches.push(longest);
                num_matches[i] = 1;
                hasher.store_range(ringbuffer, mask, pos + 1, (pos + match_len).min(store_end));
                // positions covered by the copy keep zero matches
                i += match_len - 1;
            } else {
                matches.extend_from_slice(&found);
            }
        }
        i += 1;
    }

    let orig_num_commands = out.commands.len();
    let orig_num_literals = out.num_literals;
    let orig_last_insert_len = out.last_insert_len;
    let orig_dist_cache: [i32; 4] = [dist_cache[0], dist_cache[1], dist_cache[2], dist_cache[3]];
    let mut model = CostModel::new(&params.dist, num_bytes);
    let mut nodes = Vec::new();

    for pass in 0..2 {
        init_nodes(&mut nodes, num_bytes + 1);
        if pass == 0 {
            model.set_from_literal_costs(position, ringbuffer, mask);
        } else {
            model.set_from_commands(position, ringbuffer, mask, &out.commands[orig_num_commands..], orig_last_insert_len);
        }
        out.commands.truncate(orig_num_commands);
        out.num_literals = orig_num_literals;
        out.last_insert_len = orig_last_insert_len;
        dist_cache[..4].copy_from_slice(&orig_dist_cache);

        let search = ShortestPath {
            ringbuffer,
            mask,
            params,
            block_start: position,
            num_bytes,
            max_backward: max_backward_limit(params.lgwin),
            starting_dist_cache: orig_dist_cache,
            model: &model,
        };
        let num_commands = zopfli_iterate(&search, &num_matches, &matches, &mut nodes);
        log::trace!("zopfli pass {}: {} bytes at {} -> {} commands", pass, num_bytes, position, num_commands);
        create_commands(num_bytes, position, &nodes, dist_cache, params, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::create_backward_references;
    use crate::backward::test_util::verify_commands;
    use crate::constants::INITIAL_DISTANCE_CACHE;
    use crate::entropy::{population_cost, HistogramCommand, HistogramDistance, HistogramLiteral};
    use crate::hash::{choose_hasher, Hasher};

    fn prepared(quality: u32) -> EncoderParams {
        let mut p = EncoderParams::default().with_quality(quality).with_window_bits(18);
        p.sanitize();
        p.compute_lgblock();
        p.choose_distance_params();
        p.hasher = choose_hasher(&p);
        p
    }

    fn run(quality: u32, input: &[u8]) -> CommandStream {
        let params = prepared(quality);
        let mut ringbuffer = input.to_vec();
        ringbuffer.resize(input.len() + MAX_TREE_COMP_LENGTH + 8, 0);
        let mask = (1usize << 19) - 1;
        let mut hasher = BinaryTreeHasher::new(params.lgwin, true, input.len());
        let mut cache = [0i32; 16];
        cache[..4].copy_from_slice(&INITIAL_DISTANCE_CACHE);
        let mut out = CommandStream::default();
        if quality == Quality::HQ_ZOPFLIFICATION {
            create_hq_zopfli_backward_references(input.len(), 0, &ringbuffer, mask, &params, &mut hasher, &mut cache, &mut out);
        } else {
            create_zopfli_backward_references(input.len(), 0, &ringbuffer, mask, &params, &mut hasher, &mut cache, &mut out);
        }
        verify_commands(input, &out, &params.dist);
        out
    }

    fn run_greedy(quality: u32, input: &[u8]) -> CommandStream {
        let params = prepared(quality);
        let mut ringbuffer = input.to_vec();
        ringbuffer.resize(input.len() + 1024, 0);
        let mask = (1usize << 19) - 1;
        let mut hasher = Hasher::new(&params, true, input.len());
        hasher.prepare(&ringbuffer, input.len());
        let mut cache = [0i32; 16];
        cache[..4].copy_from_slice(&INITIAL_DISTANCE_CACHE);
        let mut out = CommandStream::default();
        create_backward_references(input.len(), 0, &ringbuffer, mask, &params, &mut hasher, &mut cache, &mut out);
        verify_commands(input, &out, &params.dist);
        out
    }

    /// Bits to code `out` with one Huffman code per alphabet, extra bits
    /// included
    fn estimated_bits(input: &[u8], out: &CommandStream) -> f64 {
        let mut literals = HistogramLiteral::new();
        let mut commands = HistogramCommand::new();
        let mut distances = HistogramDistance::new();
        let mut extra_bits = 0u64;
        let mut pos = 0usize;
        for cmd in &out.commands {
            let insert_len = cmd.insert_len as usize;
            commands.add(cmd.cmd_prefix as usize);
            literals.add_vector(&input[pos..pos + insert_len]);
            let inscode = insert_length_code(insert_len);
            let copycode = copy_length_code(cmd.copy_len_code() as usize);
            extra_bits += (insert_extra(inscode) + copy_extra(copycode)) as u64;
            if !cmd.uses_implicit_distance() {
                distances.add(cmd.distance_symbol() as usize);
                extra_bits += (cmd.dist_prefix >> 10) as u64;
            }
            pos += insert_len + cmd.copy_len() as usize;
        }
        literals.add_vector(&input[pos..]);
        population_cost(&literals) + population_cost(&commands) + population_cost(&distances) + extra_bits as f64
    }

    fn word_text(len: usize) -> Vec<u8> {
        let words: [&[u8]; 12] = [
            b"the ", b"river ", b"of ", b"time ", b"flows ", b"into ", b"an ", b"ocean ", b"where ", b"ships ",
            b"sail. ", b"and ",
        ];
        let mut x = 2024u32;
        let mut input = Vec::with_capacity(len + 8);
        while input.len() < len {
            x = x.wrapping_mul(1_103_515_245).wrapping_add(12345);
            input.extend_from_slice(words[((x >> 16) % words.len() as u32) as usize]);
        }
        input.truncate(len);
        input
    }

    #[test]
    fn test_start_pos_queue_keeps_best_eight() {
        let mut queue = StartPosQueue::default();
        for (i, costdiff) in [5.0f32, 1.0, 9.0, 3.0, 7.0, 2.0, 8.0, 4.0, 6.0, 0.5].iter().enumerate() {
            queue.push(PosData { pos: i, costdiff: *costdiff, ..Default::default() });
        }
        assert_eq!(queue.len(), 8);
        let costs: Vec<f32> = (0..queue.len()).map(|k| queue.at(k).costdiff).collect();
        assert!(costs.windows(2).all(|w| w[0] <= w[1]), "{:?}", costs);
        assert_eq!(costs[0], 0.5);
    }

    #[test]
    fn test_minimum_copy_length() {
        let mut nodes = vec![ZopfliNode::default(); 40];
        assert_eq!(compute_minimum_copy_length(0.0, &nodes, 39, 0), 2);
        for node in nodes.iter_mut().take(12) {
            node.cost = 0.0;
        }
        // costs of zero beat the start up to the node that is still unset
        assert_eq!(compute_minimum_copy_length(0.5, &nodes, 39, 0), 12);
    }

    #[test]
    fn test_repetitive_text_compresses() {
        let input = b"the quick brown fox jumps over the lazy dog. ".repeat(40);
        for quality in [10, 11] {
            let out = run(quality, &input);
            assert!(out.num_literals < 100, "quality {}: {} literals", quality, out.num_literals);
        }
    }

    #[test]
    fn test_long_runs_use_quick_step() {
        let mut input = vec![b'z'; 40000];
        input.extend_from_slice(b"tail bytes");
        for quality in [10, 11] {
            let out = run(quality, &input);
            assert!(out.commands.len() < 40, "quality {}: {} commands", quality, out.commands.len());
        }
    }

    #[test]
    fn test_common_words_use_the_dictionary() {
        let input = b"Information about the history of the world is available at www.example.com/ \
                      and other international organizations, including government departments.";
        for quality in [10, 11] {
            let out = run(quality, input);
            let refs = verify_commands(input, &out, &prepared(quality).dist);
            assert!(refs > 0, "quality {}: no dictionary references", quality);
        }
    }

    #[test]
    fn test_optimal_parse_costs_no_more_than_greedy() {
        let input = word_text(30_000);
        let greedy = estimated_bits(&input, &run_greedy(9, &input));
        for quality in [10, 11] {
            let optimal = estimated_bits(&input, &run(quality, &input));
            assert!(optimal <= greedy, "quality {}: {:.0} bits vs greedy {:.0}", quality, optimal, greedy);
        }
    }

    #[test]
    fn test_short_distance_codes_resolve_to_cached_distances() {
        // the repeat is a copy whose distance is coded against the cache
        let input = b"x the .com/ x the .com/ ";
        for quality in [10, 11] {
            let out = run(quality, input);
            assert!(out.num_literals < input.len(), "quality {}", quality);
        }
    }

    #[test]
    fn test_mixed_input_round_trips() {
        let mut x = 99u32;
        let mut input = Vec::new();
        for block in 0..20 {
            for _ in 0..300 {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12345);
                input.push(b'a' + ((x >> 16) % (4 + block as u32)) as u8);
            }
            input.extend_from_slice(b" the year 2024 in review .com/index.html ");
        }
        run(10, &input);
        run(11, &input);
    }
}
