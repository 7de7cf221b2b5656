//! Plume Simulation Core Library
//!
//! Lagrangian Monte Carlo transport of an aerosol plume released from a point
//! source. Particles are advected by a wind field, spread by turbulent
//! diffusion and tracked on a lon/lat grid; an ensemble of independently
//! seeded runs is reduced into presence-probability, mean-concentration and
//! threshold-exceedance maps.
//!
//! ## Pipeline
//!
//! 1. [`SimulationConfig`] describes the source, wind, grid and run sizes
//! 2. [`create_wind_field`] picks the wind model ([`PhaseWind`] or [`ReanalysisWind`])
//! 3. [`TransportEngine`] steps one run; [`MonteCarloRunner`] runs the ensemble on rayon
//! 4. [`Aggregator`] turns the trajectories into gridded maps
//!
//! All randomness flows through a seeded [`SimRng`], so a fixed seed reproduces
//! a run bit for bit regardless of thread scheduling.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod grid;
pub mod rng;
pub mod wind;

// Re-export configuration
pub use config::{
    AggregationConfig, DiffusionConfig, GridConfig, RunConfig, SimulationConfig, SourceConfig, WindConfig,
    WindMode, WindPhase,
};

// Re-export core types
pub use aggregate::{Aggregator, EnsembleStatistics};
pub use engine::{EmissionSchedule, MonteCarloRunner, RunResult, TransportEngine};
pub use error::{PlumeError, Result};
pub use grid::{BoundaryPolicy, Grid};
pub use rng::{sim_rng, SimRng};
pub use wind::{create_wind_field, LazyDataset, PhaseWind, ReanalysisDataset, ReanalysisWind, WindField, WindSample};
