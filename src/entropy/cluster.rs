//! Greedy pairwise histogram clustering.

use super::bit_cost::{fast_log2, population_cost};
use super::histogram::Histogram;

/// Largest number of histograms combined in one batch
const MAX_INPUT_HISTOGRAMS: usize = 64;

/// Candidate merge of clusters `idx1 < idx2`
#[derive(Clone, Copy, Debug, Default)]
pub struct HistogramPair {
    pub idx1: u32,
    pub idx2: u32,
    pub cost_combo: f64,
    pub cost_diff: f64,
}

/// Pair ordering: smaller cost difference first, then closer indices
#[inline]
fn pair_is_less(p1: &HistogramPair, p2: &HistogramPair) -> bool {
    if p1.cost_diff != p2.cost_diff {
        return p1.cost_diff > p2.cost_diff;
    }
    (p1.idx2 - p1.idx1) > (p2.idx2 - p2.idx1)
}

fn cluster_cost_diff(size_a: usize, size_b: usize) -> f64 {
    let size_c = size_a + size_b;
    size_a as f64 * fast_log2(size_a) + size_b as f64 * fast_log2(size_b) - size_c as f64 * fast_log2(size_c)
}

/// Bounded set of merge candidates whose first element is always the best
#[derive(Debug, Default)]
pub struct PairQueue {
    pairs: Vec<HistogramPair>,
    max_pairs: usize,
}

impl PairQueue {
    pub fn new(max_pairs: usize) -> Self {
        Self { pairs: Vec::with_capacity(max_pairs), max_pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn best(&self) -> Option<&HistogramPair> {
        self.pairs.first()
    }

    /// Reset and change the capacity bound
    pub fn reset(&mut self, max_pairs: usize) {
        self.pairs.clear();
        self.max_pairs = max_pairs;
    }

    fn push(&mut self, p: HistogramPair) {
        if !self.pairs.is_empty() && pair_is_less(&self.pairs[0], &p) {
            if self.pairs.len() < self.max_pairs {
                let front = self.pairs[0];
                self.pairs.push(front);
            }
            self.pairs[0] = p;
        } else if self.pairs.len() < self.max_pairs {
            self.pairs.push(p);
        }
    }

    /// Drop every pair touching `a` or `b`, keeping the best pair in front
    fn remove_touching(&mut self, a: u32, b: u32) {
        let mut kept = 0usize;
        for i in 0..self.pairs.len() {
            let p = self.pairs[i];
            if p.idx1 == a || p.idx2 == a || p.idx1 == b || p.idx2 == b {
                continue;
            }
            if pair_is_less(&self.pairs[0], &p) {
                let front = self.pairs[0];
                self.pairs[0] = p;
                self.pairs[kept] = front;
            } else {
                self.pairs[kept] = p;
            }
            kept += 1;
        }
        self.pairs.truncate(kept);
    }
}

/// Price the merge of two clusters and queue it when worthwhile
fn compare_and_push<const N: usize>(
    out: &[Histogram<N>],
    cluster_size: &[u32],
    idx1: u32,
    idx2: u32,
    queue: &mut PairQueue,
) {
    if idx1 == idx2 {
        return;
    }
    let (idx1, idx2) = if idx2 < idx1 { (idx2, idx1) } else { (idx1, idx2) };
    let (h1, h2) = (&out[idx1 as usize], &out[idx2 as usize]);

    let mut p = HistogramPair { idx1, idx2, cost_combo: 0.0, cost_diff: 0.0 };
    p.cost_diff = 0.5 * cluster_cost_diff(cluster_size[idx1 as usize] as usize, cluster_size[idx2 as usize] as usize);
    p.cost_diff -= h1.bit_cost;
    p.cost_diff -= h2.bit_cost;

    let is_good_pair = if h1.total_count == 0 {
        p.cost_combo = h2.bit_cost;
        true
    } else if h2.total_count == 0 {
        p.cost_combo = h1.bit_cost;
        true
    } else {
        let threshold = match queue.best() {
            None => 1e99,
            Some(best) => best.cost_diff.max(0.0),
        };
        let mut combo = h1.clone();
        combo.add_histogram(h2);
        let cost_combo = population_cost(&combo);
        if cost_combo < threshold - p.cost_diff {
            p.cost_combo = cost_combo;
            true
        } else {
            false
        }
    };

    if is_good_pair {
        p.cost_diff += p.cost_combo;
        queue.push(p);
    }
}

/// Merge the clusters listed in `clusters` until no merge saves bits and at
/// most `max_clusters` remain
///
/// `symbols` maps inputs to clusters and is rewritten as clusters merge;
/// `clusters` is compacted in place. Returns the remaining cluster count.
pub fn histogram_combine<const N: usize>(
    out: &mut [Histogram<N>],
    cluster_size: &mut [u32],
    symbols: &mut [u32],
    clusters: &mut [u32],
    queue: &mut PairQueue,
    mut num_clusters: usize,
    max_clusters: usize,
    max_num_pairs: usize,
) -> usize {
    let mut cost_diff_threshold = 0.0;
    let mut min_cluster_size = 1usize;
    queue.reset(max_num_pairs);

    for idx1 in 0..num_clusters {
        for idx2 in idx1 + 1..num_clusters {
            compare_and_push(out, cluster_size, clusters[idx1], clusters[idx2], queue);
        }
    }

    while num_clusters > min_cluster_size {
        let best = match queue.best() {
            Some(best) => *best,
            None => break,
        };
        if best.cost_diff >= cost_diff_threshold {
            cost_diff_threshold = 1e99;
            min_cluster_size = max_clusters;
            continue;
        }

        let (best_idx1, best_idx2) = (best.idx1, best.idx2);
        let merged = out[best_idx2 as usize].clone();
        out[best_idx1 as usize].add_histogram(&merged);
        out[best_idx1 as usize].bit_cost = best.cost_combo;
        cluster_size[best_idx1 as usize] += cluster_size[best_idx2 as usize];
        for s in symbols.iter_mut() {
            if *s == best_idx2 {
                *s = best_idx1;
            }
        }
        if let Some(pos) = clusters[..num_clusters].iter().position(|&c| c == best_idx2) {
            clusters.copy_within(pos + 1..num_clusters, pos);
        }
        num_clusters -= 1;

        queue.remove_touching(best_idx1, best_idx2);
        for i in 0..num_clusters {
            compare_and_push(out, cluster_size, best_idx1, clusters[i], queue);
        }
    }
    num_clusters
}

/// Extra bits needed to code `histogram` with `candidate`'s statistics
pub fn histogram_bit_cost_distance<const N: usize>(histogram: &Histogram<N>, candidate: &Histogram<N>) -> f64 {
    if histogram.total_count == 0 {
        return 0.0;
    }
    let mut tmp = histogram.clone();
    tmp.add_histogram(candidate);
    population_cost(&tmp) - candidate.bit_cost
}

/// Reassign every input to its cheapest cluster and rebuild the clusters
fn histogram_remap<const N: usize>(
    input: &[Histogram<N>],
    clusters: &[u32],
    out: &mut [Histogram<N>],
    symbols: &mut [u32],
) {
    for i in 0..input.len() {
        let mut best_out = if i == 0 { symbols[0] } else { symbols[i - 1] };
        let mut best_bits = histogram_bit_cost_distance(&input[i], &out[best_out as usize]);
        for &c in clusters {
            let cur_bits = histogram_bit_cost_distance(&input[i], &out[c as usize]);
            if cur_bits < best_bits {
                best_bits = cur_bits;
                best_out = c;
            }
        }
        symbols[i] = best_out;
    }

    for &c in clusters {
        out[c as usize].clear();
    }
    for (h, &s) in input.iter().zip(symbols.iter()) {
        out[s as usize].add_histogram(h);
    }
}

/// Renumber clusters densely in order of first use
fn histogram_reindex<const N: usize>(out: &mut Vec<Histogram<N>>, symbols: &mut [u32]) -> usize {
    const INVALID: u32 = u32::MAX;
    let mut new_index = vec![INVALID; out.len()];
    let mut next_index = 0u32;
    for &s in symbols.iter() {
        if new_index[s as usize] == INVALID {
            new_index[s as usize] = next_index;
            next_index += 1;
        }
    }

    let mut reindexed = Vec::with_capacity(next_index as usize);
    for s in symbols.iter_mut() {
        if new_index[*s as usize] as usize == reindexed.len() {
            reindexed.push(out[*s as usize].clone());
        }
        *s = new_index[*s as usize];
    }
    *out = reindexed;
    next_index as usize
}

/// Cluster `input` into at most `max_histograms` histograms
///
/// Returns the clustered histograms and, for every input, the index of the
/// cluster it maps to. Inputs are first combined in batches of 64, then the
/// survivors are combined globally.
pub fn cluster_histograms<const N: usize>(input: &[Histogram<N>], max_histograms: usize) -> (Vec<Histogram<N>>, Vec<u32>) {
    let in_size = input.len();
    let mut cluster_size = vec![1u32; in_size];
    let mut clusters = vec![0u32; in_size];
    let mut symbols: Vec<u32> = (0..in_size as u32).collect();
    let mut out: Vec<Histogram<N>> = input
        .iter()
        .map(|h| {
            let mut h = h.clone();
            h.bit_cost = population_cost(&h);
            h
        })
        .collect();

    let pairs_capacity = MAX_INPUT_HISTOGRAMS * MAX_INPUT_HISTOGRAMS / 2;
    let mut queue = PairQueue::new(pairs_capacity);
    let mut num_clusters = 0usize;
    for i in (0..in_size).step_by(MAX_INPUT_HISTOGRAMS) {
        let num_to_combine = (in_size - i).min(MAX_INPUT_HISTOGRAMS);
        for j in 0..num_to_combine {
            clusters[num_clusters + j] = (i + j) as u32;
        }
        let num_new_clusters = histogram_combine(
            &mut out,
            &mut cluster_size,
            &mut symbols[i..i + num_to_combine],
            &mut clusters[num_clusters..],
            &mut queue,
            num_to_combine,
            max_histograms,
            pairs_capacity,
        );
        num_clusters += num_new_clusters;
    }

    let max_num_pairs = (MAX_INPUT_HISTOGRAMS * num_clusters).min((num_clusters / 2) * num_clusters);
    num_clusters = histogram_combine(
        &mut out,
        &mut cluster_size,
        &mut symbols,
        &mut clusters,
        &mut queue,
        num_clusters,
        max_histograms,
        max_num_pairs,
    );

    histogram_remap(input, &clusters[..num_clusters], &mut out, &mut symbols);
    histogram_reindex(&mut out, &mut symbols);
    (out, symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::histogram::HistogramLiteral;

    fn histogram_of(bytes: &[u8]) -> HistogramLiteral {
        let mut h = HistogramLiteral::new();
        h.add_vector(bytes);
        h
    }

    #[test]
    fn test_identical_histograms_merge() {
        let text = b"the quick brown fox jumps over the lazy dog";
        let input: Vec<_> = (0..10).map(|_| histogram_of(text)).collect();
        let (out, symbols) = cluster_histograms(&input, 256);
        assert_eq!(out.len(), 1);
        assert!(symbols.iter().all(|&s| s == 0));
        assert_eq!(out[0].total_count, 10 * text.len());
    }

    #[test]
    fn test_disjoint_histograms_stay_apart() {
        let a: Vec<u8> = (0..2000).map(|i| b'a' + (i % 4) as u8).collect();
        let b: Vec<u8> = (0..2000).map(|i| 0x80 + (i % 50) as u8).collect();
        let input = vec![histogram_of(&a), histogram_of(&b), histogram_of(&a), histogram_of(&b)];
        let (out, symbols) = cluster_histograms(&input, 256);
        assert_eq!(out.len(), 2);
        assert_eq!(symbols, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_max_histograms_respected() {
        let input: Vec<_> = (0..100u32)
            .map(|i| {
                let bytes: Vec<u8> = (0..500u32).map(|k| ((k * (i + 1)) % 251) as u8).collect();
                histogram_of(&bytes)
            })
            .collect();
        let (out, symbols) = cluster_histograms(&input, 8);
        assert!(out.len() <= 8);
        assert!(symbols.iter().all(|&s| (s as usize) < out.len()));
        let total: usize = out.iter().map(|h| h.total_count).sum();
        assert_eq!(total, 100 * 500);
    }

    #[test]
    fn test_pair_queue_keeps_best_in_front() {
        let mut q = PairQueue::new(3);
        for (i, diff) in [5.0, -1.0, 2.0, -7.0].iter().enumerate() {
            q.push(HistogramPair { idx1: 0, idx2: i as u32 + 1, cost_combo: 0.0, cost_diff: *diff });
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.best().map(|p| p.cost_diff), Some(-7.0));
        // -1.0 was evicted by the full queue
        q.remove_touching(4, 9);
        assert_eq!(q.len(), 2);
        assert_eq!(q.best().map(|p| p.cost_diff), Some(2.0));
    }
}
