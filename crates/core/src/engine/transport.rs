//! Single-run Lagrangian transport
//!
//! A run releases particles from the source according to the
//! [`EmissionSchedule`], then advances every active particle by
//! `wind * dt + diffusion` each step. Particles that leave a bounded domain
//! are deactivated and their position is frozen from then on.

use super::emission::EmissionSchedule;
use crate::config::SimulationConfig;
use crate::error::{PlumeError, Result};
use crate::grid::{BoundaryPolicy, Grid};
use crate::rng::{fill_gaussian, sim_rng, SimRng};
use crate::wind::WindField;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Trajectories of one completed run
///
/// Three row-major `n_records x n_particles` arrays, where record `s` holds
/// the state at the start of step `s` (`n_records = n_steps + 1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRunResult")]
pub struct RunResult {
    n_records: usize,
    n_particles: usize,
    lon: Vec<f64>,
    lat: Vec<f64>,
    active: Vec<bool>,
}

/// Unchecked serialized form; shape is validated on the way in
#[derive(Deserialize)]
struct RawRunResult {
    n_records: usize,
    n_particles: usize,
    lon: Vec<f64>,
    lat: Vec<f64>,
    active: Vec<bool>,
}

impl TryFrom<RawRunResult> for RunResult {
    type Error = PlumeError;

    fn try_from(raw: RawRunResult) -> Result<Self> {
        Self::from_parts(raw.n_records, raw.n_particles, raw.lon, raw.lat, raw.active)
    }
}

impl RunResult {
    /// Wrap externally produced arrays
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if any array does not hold `n_records * n_particles` values
    pub fn from_parts(
        n_records: usize,
        n_particles: usize,
        lon: Vec<f64>,
        lat: Vec<f64>,
        active: Vec<bool>,
    ) -> Result<Self> {
        let expected = n_records.saturating_mul(n_particles);
        for actual in [lon.len(), lat.len(), active.len()] {
            if actual != expected {
                return Err(PlumeError::ShapeMismatch { expected, actual });
            }
        }
        Ok(Self {
            n_records,
            n_particles,
            lon,
            lat,
            active,
        })
    }

    fn zeroed(n_records: usize, n_particles: usize) -> Self {
        let len = n_records * n_particles;
        Self {
            n_records,
            n_particles,
            lon: vec![0.0; len],
            lat: vec![0.0; len],
            active: vec![false; len],
        }
    }

    /// Number of stored time records (`n_steps + 1`)
    pub fn n_records(&self) -> usize {
        self.n_records
    }

    /// Number of simulated steps
    pub fn n_steps(&self) -> usize {
        self.n_records.saturating_sub(1)
    }

    pub fn n_particles(&self) -> usize {
        self.n_particles
    }

    fn row(&self, record: usize) -> std::ops::Range<usize> {
        record * self.n_particles..(record + 1) * self.n_particles
    }

    /// Longitudes at `record`
    pub fn lon(&self, record: usize) -> &[f64] {
        &self.lon[self.row(record)]
    }

    /// Latitudes at `record`
    pub fn lat(&self, record: usize) -> &[f64] {
        &self.lat[self.row(record)]
    }

    /// Active flags at `record`
    pub fn active(&self, record: usize) -> &[bool] {
        &self.active[self.row(record)]
    }

    /// Active particles at `record`
    pub fn active_count(&self, record: usize) -> usize {
        self.active(record).iter().filter(|&&a| a).count()
    }

    /// `(lon, lat)` of every active particle at `record`
    pub fn active_positions(&self, record: usize) -> impl Iterator<Item = (f64, f64)> + '_ {
        let range = self.row(record);
        self.active_positions_in(range)
    }

    /// `(lon, lat)` of every active particle over the whole run
    pub fn all_active_positions(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.active_positions_in(0..self.active.len())
    }

    fn active_positions_in(&self, range: std::ops::Range<usize>) -> impl Iterator<Item = (f64, f64)> + '_ {
        range
            .filter(|&i| self.active[i])
            .map(|i| (self.lon[i], self.lat[i]))
    }

    /// Raw row-major arrays `(lon, lat, active)`
    pub fn as_parts(&self) -> (&[f64], &[f64], &[bool]) {
        (&self.lon, &self.lat, &self.active)
    }
}

/// Advances one ensemble member from release to the final step
pub struct TransportEngine {
    config: SimulationConfig,
    grid: Grid,
    policy: BoundaryPolicy,
    schedule: EmissionSchedule,
    wind: Arc<dyn WindField>,
}

impl TransportEngine {
    /// # Errors
    /// Returns `InvalidConfig` if the configuration fails validation
    pub fn new(config: &SimulationConfig, wind: Arc<dyn WindField>) -> Result<Self> {
        config.validate()?;
        let grid = Grid::new(config.grid)?;
        let policy = grid.boundary_policy();
        let run = &config.simulation;
        let schedule = EmissionSchedule::new(
            run.n_particles,
            run.n_steps,
            run.dt,
            config.source.emission_duration_h,
        );

        debug!(
            "Transport engine: {} particles over {} emission steps, {:?} boundary, wind={}",
            run.n_particles,
            schedule.emission_steps(),
            policy,
            wind.name()
        );

        Ok(Self {
            config: config.clone(),
            grid,
            policy,
            schedule,
            wind,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn boundary_policy(&self) -> BoundaryPolicy {
        self.policy
    }

    pub fn schedule(&self) -> &EmissionSchedule {
        &self.schedule
    }

    pub fn wind(&self) -> &Arc<dyn WindField> {
        &self.wind
    }

    /// Execute one run
    ///
    /// The same `seed` always reproduces the same trajectories; `None` draws
    /// a fresh seed from the OS.
    ///
    /// # Errors
    /// Propagates fatal wind initialization errors (e.g. an unreadable dataset)
    pub fn run(&self, seed: Option<u64>) -> Result<RunResult> {
        self.wind.prepare()?;

        let mut rng = sim_rng(seed);
        let n = self.config.simulation.n_particles;
        let n_steps = self.config.simulation.n_steps;
        let mut result = RunResult::zeroed(n_steps + 1, n);

        debug!("Run start: seed={:?}, {} particles, {} steps", seed, n, n_steps);

        let source = &self.config.source;
        fill_gaussian(&mut rng, source.lon, source.jitter_lon_std, &mut result.lon[..n]);
        fill_gaussian(&mut rng, source.lat, source.jitter_lat_std, &mut result.lat[..n]);

        for step in 0..n_steps {
            self.step(&mut result, step, &mut rng);
        }

        debug!(
            "Run finished: seed={:?}, {}/{} particles active at the end",
            seed,
            result.active_count(n_steps),
            n
        );
        Ok(result)
    }

    /// Advance record `step` into record `step + 1`
    fn step(&self, result: &mut RunResult, step: usize, rng: &mut SimRng) {
        let n = result.n_particles;
        let dt = self.config.simulation.dt;
        let t_hours = step as f64 * dt;

        let row = step * n;
        for i in self.schedule.range(step) {
            result.active[row + i] = true;
        }

        let (past_lon, next_lon) = result.lon.split_at_mut(row + n);
        let (past_lat, next_lat) = result.lat.split_at_mut(row + n);
        let (past_active, next_active) = result.active.split_at_mut(row + n);
        let (cur_lon, cur_lat, cur_active) = (&past_lon[row..], &past_lat[row..], &past_active[row..]);
        let (next_lon, next_lat, next_active) = (&mut next_lon[..n], &mut next_lat[..n], &mut next_active[..n]);

        // Inactive particles carry over unchanged
        next_lon.copy_from_slice(cur_lon);
        next_lat.copy_from_slice(cur_lat);
        next_active.copy_from_slice(cur_active);

        let alive: Vec<usize> = (0..n).filter(|&i| cur_active[i]).collect();
        if alive.is_empty() {
            return;
        }

        let alive_lon: Vec<f64> = alive.iter().map(|&i| cur_lon[i]).collect();
        let alive_lat: Vec<f64> = alive.iter().map(|&i| cur_lat[i]).collect();
        let wind = self.wind.sample(&alive_lon, &alive_lat, t_hours, rng);

        let mut noise_lon = vec![0.0; alive.len()];
        let mut noise_lat = vec![0.0; alive.len()];
        if self.config.wind.apply_diffusion {
            let diffusion = &self.config.diffusion;
            fill_gaussian(rng, 0.0, (2.0 * diffusion.k_lon * dt).sqrt(), &mut noise_lon);
            fill_gaussian(rng, 0.0, (2.0 * diffusion.k_lat * dt).sqrt(), &mut noise_lat);
        }

        for (k, &i) in alive.iter().enumerate() {
            let lon = alive_lon[k] + wind.u[k] * dt + noise_lon[k];
            let lat = alive_lat[k] + wind.v[k] * dt + noise_lat[k];
            let (lon, lat) = self.policy.fold(&self.grid, lon, lat);
            next_lon[i] = lon;
            next_lat[i] = lat;
            next_active[i] = self.policy.keeps_active(&self.grid, lon, lat);
        }
    }
}
