//! Symbol histograms for the three Brotli alphabets.

use crate::constants::{NUM_COMMAND_SYMBOLS, NUM_HISTOGRAM_DISTANCE_SYMBOLS, NUM_LITERAL_SYMBOLS};

/// Population counts over an alphabet of `N` symbols
///
/// `bit_cost` caches the population cost while clustering; it is reset to
/// infinity on [`clear`](Self::clear).
#[derive(Clone, Debug)]
pub struct Histogram<const N: usize> {
    pub data: [u32; N],
    pub total_count: usize,
    pub bit_cost: f64,
}

pub type HistogramLiteral = Histogram<NUM_LITERAL_SYMBOLS>;
pub type HistogramCommand = Histogram<NUM_COMMAND_SYMBOLS>;
pub type HistogramDistance = Histogram<NUM_HISTOGRAM_DISTANCE_SYMBOLS>;

impl<const N: usize> Histogram<N> {
    pub fn new() -> Self {
        Self { data: [0; N], total_count: 0, bit_cost: f64::INFINITY }
    }

    /// Number of symbols in the alphabet
    pub const fn data_size() -> usize {
        N
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
        self.total_count = 0;
        self.bit_cost = f64::INFINITY;
    }

    #[inline]
    pub fn add(&mut self, symbol: usize) {
        self.data[symbol] += 1;
        self.total_count += 1;
    }

    /// Count every symbol of `symbols`
    pub fn add_vector<T: Copy + Into<usize>>(&mut self, symbols: &[T]) {
        self.total_count += symbols.len();
        for &s in symbols {
            self.data[s.into()] += 1;
        }
    }

    pub fn add_histogram(&mut self, other: &Self) {
        self.total_count += other.total_count;
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }
}

impl<const N: usize> Default for Histogram<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_clear() {
        let mut h = HistogramCommand::new();
        h.add(3);
        h.add(3);
        h.add_vector(&[1u16, 703]);
        assert_eq!(h.total_count, 4);
        assert_eq!(h.data[3], 2);
        assert_eq!(h.data[703], 1);
        h.clear();
        assert!(h.is_empty());
        assert!(h.data.iter().all(|&c| c == 0));
        assert!(h.bit_cost.is_infinite());
    }

    #[test]
    fn test_add_histogram() {
        let mut a = HistogramLiteral::new();
        let mut b = HistogramLiteral::new();
        a.add_vector(b"abc");
        b.add_vector(b"cc");
        a.add_histogram(&b);
        assert_eq!(a.total_count, 5);
        assert_eq!(a.data[b'c' as usize], 3);
        assert_eq!(HistogramDistance::data_size(), 544);
    }
}
