//! Gridded statistics over Monte Carlo trajectories

pub mod ensemble;
pub mod histogram;

pub use ensemble::{Aggregator, EnsembleStatistics};
pub use histogram::{histogram, normalize_by_peak, peak};
