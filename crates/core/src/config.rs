//! Simulation configuration
//!
//! A single serde tree covers the emission source, wind model, diffusion,
//! domain grid, run sizing and aggregation. Every section falls back to the
//! reference scenario (the April 1986 release over Eurasia) so partial JSON
//! files only need to override what differs.

use crate::error::{PlumeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

/// Hours-since-reference origin of the reference scenario (1986-04-26T01:00:00Z)
const REFERENCE_EPOCH_SECONDS: i64 = 514_861_200;

/// Complete configuration consumed by the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub source: SourceConfig,
    pub wind: WindConfig,
    pub diffusion: DiffusionConfig,
    pub grid: GridConfig,
    pub simulation: RunConfig,
    pub aggregation: AggregationConfig,
}

/// Point source of the release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Display name, used in logs only
    pub name: String,
    /// Source longitude (°E)
    pub lon: f64,
    /// Source latitude (°N)
    pub lat: f64,
    /// Duration of the progressive release (h); `None` releases everything at step 0
    pub emission_duration_h: Option<f64>,
    /// Std of the initial longitude jitter around the source (°)
    pub jitter_lon_std: f64,
    /// Std of the initial latitude jitter around the source (°)
    pub jitter_lat_std: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: "Chernobyl".to_string(),
            lon: 30.0996,
            lat: 51.3917,
            emission_duration_h: Some(240.0),
            jitter_lon_std: 0.05,
            jitter_lat_std: 0.03,
        }
    }
}

/// Wind model selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindMode {
    /// Spatially uniform wind from the phase table
    Simplified,
    /// Gridded reanalysis interpolated at each particle
    #[serde(alias = "era5")]
    Reanalysis,
}

/// One time-bounded phase of the simplified wind model
///
/// Velocities are in degrees/hour: `u` positive eastward, `v` positive northward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindPhase {
    pub t_start: f64,
    pub t_end: f64,
    pub u: f64,
    pub v: f64,
    pub u_std: f64,
    pub v_std: f64,
}

impl WindPhase {
    pub const fn new(t_start: f64, t_end: f64, u: f64, v: f64, u_std: f64, v_std: f64) -> Self {
        Self {
            t_start,
            t_end,
            u,
            v,
            u_std,
            v_std,
        }
    }

    /// Whether `t_hours` falls in `[t_start, t_end)`
    #[inline]
    pub fn contains(&self, t_hours: f64) -> bool {
        self.t_start <= t_hours && t_hours < self.t_end
    }
}

/// Post-accident wind phases, rotating over roughly three weeks
fn reference_phases() -> Vec<WindPhase> {
    vec![
        // N-NW toward Belarus and Scandinavia
        WindPhase::new(0.0, 48.0, -0.04, 0.18, 0.06, 0.04),
        // Westward toward Poland and the Baltic
        WindPhase::new(48.0, 96.0, -0.15, 0.06, 0.05, 0.05),
        // S-SW toward Ukraine, Romania, Turkey
        WindPhase::new(96.0, 168.0, -0.06, -0.12, 0.06, 0.05),
        // Westward across central Europe
        WindPhase::new(168.0, 264.0, -0.18, 0.02, 0.07, 0.06),
        // Weak variable winds, broad dispersion
        WindPhase::new(264.0, 480.0, -0.05, 0.03, 0.10, 0.08),
    ]
}

/// Wind model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindConfig {
    pub mode: WindMode,
    /// Phase table for `WindMode::Simplified`
    pub phases: Vec<WindPhase>,
    /// Reanalysis dataset file for `WindMode::Reanalysis`
    pub dataset_path: PathBuf,
    /// Turbulent noise as a fraction of the local wind speed (reanalysis only)
    pub turbulence: f64,
    /// Add explicit diffusion on top of advection
    pub apply_diffusion: bool,
    /// Origin of the simulation clock; dataset timestamps are converted to hours since this instant
    pub reference_time: DateTime<Utc>,
    /// Interpolators kept before the cache is flushed
    pub interpolator_cache_capacity: usize,
}

impl Default for WindConfig {
    fn default() -> Self {
        Self {
            mode: WindMode::Simplified,
            phases: reference_phases(),
            dataset_path: PathBuf::from("data/era5_chernobyl_1986.json"),
            turbulence: 0.25,
            apply_diffusion: true,
            reference_time: DateTime::<Utc>::from_timestamp(REFERENCE_EPOCH_SECONDS, 0)
                .unwrap_or_default(),
            interpolator_cache_capacity: 30,
        }
    }
}

/// Turbulent diffusion coefficients (degrees²/hour)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffusionConfig {
    pub k_lon: f64,
    pub k_lat: f64,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            k_lon: 0.008,
            k_lat: 0.006,
        }
    }
}

/// Geographic domain and its cell counts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
    pub n_lon: usize,
    pub n_lat: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        // Ireland/Portugal to the Urals, North Africa to the Arctic
        Self {
            lon_min: -12.0,
            lon_max: 75.0,
            lat_min: 33.0,
            lat_max: 72.0,
            n_lon: 350,
            n_lat: 200,
        }
    }
}

/// Run sizing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub n_particles: usize,
    /// Time step (h)
    pub dt: f64,
    pub n_steps: usize,
    pub n_runs: usize,
    /// Base seed; run `i` uses `seed + i`. `None` makes runs non-reproducible.
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            n_particles: 8000,
            dt: 1.0,
            n_steps: 480,
            n_runs: 12,
            seed: Some(1986),
        }
    }
}

/// Aggregation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Exceedance threshold on run-normalized density
    pub threshold: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self { threshold: 0.05 }
    }
}

impl SimulationConfig {
    /// Parse a configuration from JSON and validate it
    ///
    /// # Errors
    /// Returns `ConfigParse` for malformed JSON and `InvalidConfig` if validation fails
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PlumeError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    ///
    /// # Errors
    /// Returns `ConfigLoad` if the file cannot be read, otherwise as [`Self::from_json_str`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| PlumeError::ConfigLoad(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&contents)
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    /// Returns `ConfigParse` if serialization fails
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PlumeError::ConfigParse(e.to_string()))
    }

    /// Check every invariant the engine relies on
    ///
    /// # Errors
    /// Returns `InvalidConfig` describing the first violated invariant
    pub fn validate(&self) -> Result<()> {
        let grid = &self.grid;
        if !is_ordered(grid.lon_min, grid.lon_max) {
            return invalid(format!("lon_min ({}) must be < lon_max ({})", grid.lon_min, grid.lon_max));
        }
        if !is_ordered(grid.lat_min, grid.lat_max) {
            return invalid(format!("lat_min ({}) must be < lat_max ({})", grid.lat_min, grid.lat_max));
        }
        if grid.n_lon == 0 || grid.n_lat == 0 {
            return invalid("grid cell counts must be > 0".to_string());
        }

        let run = &self.simulation;
        if run.dt <= 0.0 || !run.dt.is_finite() {
            return invalid(format!("dt must be positive, got {}", run.dt));
        }
        if run.n_steps == 0 {
            return invalid("n_steps must be > 0".to_string());
        }

        if !(self.source.lon.is_finite() && self.source.lat.is_finite()) {
            return invalid("source coordinates must be finite".to_string());
        }
        if !(is_non_negative(self.source.jitter_lon_std) && is_non_negative(self.source.jitter_lat_std)) {
            return invalid("source jitter std must be finite and >= 0".to_string());
        }
        if !(is_non_negative(self.diffusion.k_lon) && is_non_negative(self.diffusion.k_lat)) {
            return invalid("diffusion coefficients must be finite and >= 0".to_string());
        }

        let wind = &self.wind;
        if wind.turbulence < 0.0 || wind.turbulence.is_nan() {
            return invalid(format!("turbulence must be >= 0, got {}", wind.turbulence));
        }
        if wind.mode == WindMode::Simplified {
            if wind.phases.is_empty() {
                return invalid("simplified wind requires at least one phase".to_string());
            }
            for (index, phase) in wind.phases.iter().enumerate() {
                if !is_ordered(phase.t_start, phase.t_end) {
                    return invalid(format!("phase {index}: t_start must be < t_end"));
                }
                if phase.u_std < 0.0 || phase.v_std < 0.0 {
                    return invalid(format!("phase {index}: std must be >= 0"));
                }
            }
        }

        let threshold = self.aggregation.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return invalid(format!("threshold must lie in [0, 1], got {threshold}"));
        }
        Ok(())
    }
}

/// Strict `a < b`, false when either side is NaN
fn is_ordered(a: f64, b: f64) -> bool {
    matches!(a.partial_cmp(&b), Some(Ordering::Less))
}

/// Finite and `>= 0`
fn is_non_negative(x: f64) -> bool {
    x.is_finite() && x >= 0.0
}

fn invalid(msg: String) -> Result<()> {
    Err(PlumeError::InvalidConfig(msg))
}
