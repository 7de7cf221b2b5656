//! Particle transport and ensemble execution

pub mod emission;
pub mod monte_carlo;
pub mod transport;

pub use emission::EmissionSchedule;
pub use monte_carlo::MonteCarloRunner;
pub use transport::{RunResult, TransportEngine};
