//! Histograms, entropy estimates and histogram clustering.

pub mod bit_cost;
pub mod cluster;
pub mod histogram;

pub use bit_cost::{bits_entropy, fast_log2, population_cost, shannon_entropy};
pub use cluster::{cluster_histograms, histogram_bit_cost_distance, histogram_combine, HistogramPair, PairQueue};
pub use histogram::{Histogram, HistogramCommand, HistogramDistance, HistogramLiteral};
