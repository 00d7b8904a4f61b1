//! Entropy and population cost estimates, in bits.

use super::histogram::Histogram;
use crate::constants::CODE_LENGTH_CODES;

/// log2 of `v`, with log2(0) taken as 0
#[inline]
pub fn fast_log2(v: usize) -> f64 {
    if v == 0 {
        0.0
    } else {
        (v as f64).log2()
    }
}

/// Shannon entropy of a population in bits, plus the population total
pub fn shannon_entropy(population: &[u32]) -> (f64, usize) {
    let mut sum = 0usize;
    let mut retval = 0.0;
    for &p in population {
        let p = p as usize;
        sum += p;
        retval -= p as f64 * fast_log2(p);
    }
    if sum != 0 {
        retval += sum as f64 * fast_log2(sum);
    }
    (retval, sum)
}

/// Shannon entropy with a floor of one bit per symbol
pub fn bits_entropy(population: &[u32]) -> f64 {
    let (retval, sum) = shannon_entropy(population);
    retval.max(sum as f64)
}

const ONE_SYMBOL_HISTOGRAM_COST: f64 = 12.0;
const TWO_SYMBOL_HISTOGRAM_COST: f64 = 20.0;
const THREE_SYMBOL_HISTOGRAM_COST: f64 = 28.0;
const FOUR_SYMBOL_HISTOGRAM_COST: f64 = 37.0;

/// Estimated bits to store the histogram's code and every symbol it counts
///
/// Histograms with up to four symbols are priced as simple prefix codes;
/// larger ones add the estimated cost of the code-length sequence.
pub fn population_cost<const N: usize>(histogram: &Histogram<N>) -> f64 {
    let data = &histogram.data;
    let total_count = histogram.total_count;
    if total_count == 0 {
        return ONE_SYMBOL_HISTOGRAM_COST;
    }

    let mut symbols = [0usize; 5];
    let mut count = 0usize;
    for (i, &c) in data.iter().enumerate() {
        if c > 0 {
            symbols[count] = i;
            count += 1;
            if count > 4 {
                break;
            }
        }
    }

    match count {
        1 => return ONE_SYMBOL_HISTOGRAM_COST,
        2 => return TWO_SYMBOL_HISTOGRAM_COST + total_count as f64,
        3 => {
            let h0 = data[symbols[0]] as f64;
            let h1 = data[symbols[1]] as f64;
            let h2 = data[symbols[2]] as f64;
            let hmax = h0.max(h1).max(h2);
            return THREE_SYMBOL_HISTOGRAM_COST + 2.0 * (h0 + h1 + h2) - hmax;
        }
        4 => {
            let mut histo = [0u32; 4];
            for (h, &s) in histo.iter_mut().zip(&symbols) {
                *h = data[s];
            }
            histo.sort_unstable_by(|a, b| b.cmp(a));
            let h23 = (histo[2] + histo[3]) as f64;
            let hmax = h23.max(histo[0] as f64);
            return FOUR_SYMBOL_HISTOGRAM_COST + 3.0 * h23 + 2.0 * (histo[0] + histo[1]) as f64 - hmax;
        }
        _ => {}
    }

    // Approximate the depths and the RLE of the code lengths.
    let mut bits = 0.0;
    let mut max_depth = 1usize;
    let mut depth_histo = [0u32; CODE_LENGTH_CODES];
    let log2_total = fast_log2(total_count);
    let mut i = 0usize;
    while i < N {
        if data[i] > 0 {
            let log2p = log2_total - fast_log2(data[i] as usize);
            let depth = ((log2p + 0.5) as usize).min(15);
            bits += data[i] as f64 * log2p;
            max_depth = max_depth.max(depth);
            depth_histo[depth] += 1;
            i += 1;
        } else {
            let mut reps = data[i..].iter().take_while(|&&c| c == 0).count() as u32;
            i += reps as usize;
            if i == N {
                // Trailing zeros are implicit.
                break;
            }
            if reps < 3 {
                depth_histo[0] += reps;
            } else {
                reps -= 2;
                while reps > 0 {
                    depth_histo[17] += 1;
                    bits += 3.0;
                    reps >>= 3;
                }
            }
        }
    }
    bits += (18 + 2 * max_depth) as f64;
    bits += bits_entropy(&depth_histo);
    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::histogram::HistogramLiteral;

    #[test]
    fn test_shannon_entropy_uniform() {
        let (bits, total) = shannon_entropy(&[4, 4, 4, 4]);
        assert_eq!(total, 16);
        assert!((bits - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_bits_entropy_floor() {
        // a single symbol has zero entropy but costs at least a bit each
        assert_eq!(bits_entropy(&[0, 10, 0]), 10.0);
        assert_eq!(bits_entropy(&[]), 0.0);
    }

    #[test]
    fn test_population_cost_small_alphabets() {
        let mut h = HistogramLiteral::new();
        assert_eq!(population_cost(&h), ONE_SYMBOL_HISTOGRAM_COST);
        h.add(b'a' as usize);
        assert_eq!(population_cost(&h), ONE_SYMBOL_HISTOGRAM_COST);
        h.add(b'b' as usize);
        assert_eq!(population_cost(&h), TWO_SYMBOL_HISTOGRAM_COST + 2.0);
    }

    #[test]
    fn test_population_cost_grows_with_spread() {
        let mut narrow = HistogramLiteral::new();
        let mut wide = HistogramLiteral::new();
        for i in 0..1000usize {
            narrow.add(b'a' as usize + i % 8);
            wide.add(i % 200);
        }
        assert!(population_cost(&narrow) < population_cost(&wide));
        // never below the raw entropy of the symbols
        assert!(population_cost(&wide) >= shannon_entropy(&wide.data).0);
    }
}
