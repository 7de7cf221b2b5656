//! Wind models driving particle advection
//!
//! The transport engine only sees the [`WindField`] capability. Two models
//! implement it:
//!
//! - [`PhaseWind`]: spatially uniform wind from a table of time phases, with a
//!   smooth blend across phase boundaries
//! - [`ReanalysisWind`]: gridded reanalysis data, bilinear in space and linear
//!   in time, converted from m/s to degrees/hour
//!
//! The model is chosen once from configuration by [`create_wind_field`] and
//! injected into the engine.

pub mod dataset;
pub mod interpolation;
pub mod phase;
pub mod reanalysis;

pub use dataset::{DatasetSource, DatasetState, JsonDatasetFile, LazyDataset, RawDataset, ReanalysisDataset, TimeAxis};
pub use interpolation::{BilinearInterpolator, InterpolatorCache, WindComponent};
pub use phase::PhaseWind;
pub use reanalysis::ReanalysisWind;

use crate::config::{WindConfig, WindMode};
use crate::error::Result;
use crate::grid::Grid;
use crate::rng::SimRng;
use std::sync::Arc;
use tracing::info;

/// Unit conversion and model constants
pub mod constants {
    /// Meters per degree of latitude
    pub const METERS_PER_DEGREE: f64 = 111_000.0;

    pub const SECONDS_PER_HOUR: f64 = 3600.0;

    /// Floor on `cos(lat)` in the zonal conversion, bounds the blow-up near the poles
    pub const MIN_COS_LAT: f64 = 0.1;

    /// Floor on the wind speed scaling turbulent noise (°/h)
    pub const MIN_TURBULENT_SPEED: f64 = 0.005;

    /// Width of the blend window at the start of a wind phase (h)
    pub const PHASE_BLEND_HOURS: f64 = 6.0;

    /// Smallest time separation used when blending dataset snapshots (h)
    pub const MIN_SNAPSHOT_SPACING: f64 = 1e-10;
}

/// Wind components for a batch of particles, in degrees/hour
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindSample {
    /// Longitudinal component, positive eastward
    pub u: Vec<f64>,
    /// Latitudinal component, positive northward
    pub v: Vec<f64>,
}

impl WindSample {
    pub fn zeros(n: usize) -> Self {
        Self {
            u: vec![0.0; n],
            v: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.u.len()
    }

    pub fn is_empty(&self) -> bool {
        self.u.is_empty()
    }
}

/// Queryable wind service
///
/// Implementations must be deterministic given the state of `rng`: all
/// randomness comes from the run's injected source.
pub trait WindField: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &'static str;

    /// Perform fallible one-time initialization before any run steps
    ///
    /// # Errors
    /// Returns the fatal configuration/input error that prevents sampling
    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Wind at each `(lons[i], lats[i])` at absolute time `t_hours`
    fn sample(&self, lons: &[f64], lats: &[f64], t_hours: f64, rng: &mut SimRng) -> WindSample;
}

/// Build the wind model selected by configuration
///
/// The reanalysis dataset is not read here; it loads on the first
/// [`WindField::prepare`] call.
///
/// # Errors
/// Returns `InvalidConfig` if the simplified phase table is unusable
pub fn create_wind_field(config: &WindConfig, grid: &Grid) -> Result<Arc<dyn WindField>> {
    match config.mode {
        WindMode::Simplified => {
            info!(
                "Wind: simplified phase model ({} phases)",
                config.phases.len()
            );
            Ok(Arc::new(PhaseWind::new(config.phases.clone())?))
        }
        WindMode::Reanalysis => {
            info!(
                "Wind: reanalysis from {} (turbulence={:.2})",
                config.dataset_path.display(),
                config.turbulence
            );
            let source = JsonDatasetFile::new(&config.dataset_path);
            let dataset = Arc::new(LazyDataset::new(Box::new(source), config.reference_time));
            Ok(Arc::new(ReanalysisWind::new(
                dataset,
                grid.clone(),
                config.turbulence,
                config.interpolator_cache_capacity,
            )))
        }
    }
}
