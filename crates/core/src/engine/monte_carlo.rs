//! Ensemble execution across the rayon thread pool

use super::transport::{RunResult, TransportEngine};
use crate::error::Result;
use rayon::prelude::*;
use std::time::Instant;
use tracing::info;

/// Runs independent ensemble members over a shared engine
///
/// Run `i` is seeded with `base_seed + i`, so the ensemble does not depend on
/// how rayon schedules the runs and matches a sequential execution exactly.
pub struct MonteCarloRunner {
    engine: TransportEngine,
}

impl MonteCarloRunner {
    pub fn new(engine: TransportEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &TransportEngine {
        &self.engine
    }

    /// Seed for run `index`
    pub fn run_seed(base_seed: Option<u64>, index: usize) -> Option<u64> {
        base_seed.map(|seed| seed.wrapping_add(index as u64))
    }

    /// Execute `n_runs` runs in parallel, returning results in run order
    ///
    /// # Errors
    /// Returns the first fatal error raised by any run
    pub fn run_all(&self, n_runs: usize, base_seed: Option<u64>) -> Result<Vec<RunResult>> {
        info!(
            "Monte Carlo: {} runs x {} particles x {} steps (base seed {:?})",
            n_runs,
            self.engine.config().simulation.n_particles,
            self.engine.config().simulation.n_steps,
            base_seed
        );
        let start = Instant::now();

        let runs = (0..n_runs)
            .into_par_iter()
            .map(|index| self.engine.run(Self::run_seed(base_seed, index)))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Monte Carlo finished: {} runs in {:.2?}",
            runs.len(),
            start.elapsed()
        );
        Ok(runs)
    }

    /// Execute the ensemble described by the engine's configuration
    ///
    /// # Errors
    /// Returns the first fatal error raised by any run
    pub fn run_configured(&self) -> Result<Vec<RunResult>> {
        let run = &self.engine.config().simulation;
        self.run_all(run.n_runs, run.seed)
    }
}
