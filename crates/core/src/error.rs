//! Error taxonomy for the plume engine
//!
//! Only fatal conditions are represented here. Coverage gaps and numerical
//! anomalies inside the step loop are recovered locally (zero wind fallback)
//! and reported through `tracing::warn!` instead.

use std::path::PathBuf;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, PlumeError>;

/// Fatal errors raised before or while preparing a simulation
#[derive(Debug)]
pub enum PlumeError {
    /// Configuration violates an invariant (grid bounds, time step, phase table...)
    InvalidConfig(String),
    /// Configuration file could not be read
    ConfigLoad(String),
    /// Configuration file could not be parsed
    ConfigParse(String),
    /// Reanalysis dataset file does not exist
    DatasetNotFound(PathBuf),
    /// Reanalysis dataset file could not be read or decoded
    DatasetParse(String),
    /// Neither `u`/`v` nor `u_component_of_wind`/`v_component_of_wind` are present
    UnknownWindComponents {
        /// Variable names found in the dataset
        available: Vec<String>,
    },
    /// Dataset coordinates or variable shapes are inconsistent
    InvalidDataset(String),
    /// Parallel run arrays do not share the expected shape
    ShapeMismatch {
        /// Element count implied by the declared shape
        expected: usize,
        /// Element count actually supplied
        actual: usize,
    },
}

impl std::fmt::Display for PlumeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlumeError::InvalidConfig(msg) => write!(f, "Invalid configuration: {msg}"),
            PlumeError::ConfigLoad(msg) => write!(f, "Failed to load configuration: {msg}"),
            PlumeError::ConfigParse(msg) => write!(f, "Failed to parse configuration: {msg}"),
            PlumeError::DatasetNotFound(path) => {
                write!(f, "Reanalysis dataset not found: {}", path.display())
            }
            PlumeError::DatasetParse(msg) => write!(f, "Failed to read reanalysis dataset: {msg}"),
            PlumeError::UnknownWindComponents { available } => write!(
                f,
                "Wind components u/v not found in dataset. Available: [{}]",
                available.join(", ")
            ),
            PlumeError::InvalidDataset(msg) => write!(f, "Invalid reanalysis dataset: {msg}"),
            PlumeError::ShapeMismatch { expected, actual } => write!(
                f,
                "Run arrays have mismatched shape: expected {expected} values, got {actual}"
            ),
        }
    }
}

impl std::error::Error for PlumeError {}
