//! Geographic grid shared by the transport engine and the aggregator

pub mod boundary;
pub mod domain;

// Re-export main types
pub use boundary::BoundaryPolicy;
pub use domain::Grid;
