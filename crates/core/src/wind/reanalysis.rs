//! Reanalysis wind interpolated at each particle
//!
//! Sampling pipeline for a batch of particles at time `t`:
//!
//! 1. bracket `t` between two dataset snapshots (clamped at the series edges)
//! 2. bilinear interpolation of `u`/`v` at both snapshots (0 outside coverage)
//! 3. linear blend in time
//! 4. NaN replaced by 0
//! 5. m/s converted to degrees/hour, with the `cos(lat)` metric on `u`
//! 6. turbulent noise proportional to the local wind speed

use super::constants::{
    METERS_PER_DEGREE, MIN_COS_LAT, MIN_SNAPSHOT_SPACING, MIN_TURBULENT_SPEED, SECONDS_PER_HOUR,
};
use super::dataset::{LazyDataset, ReanalysisDataset};
use super::interpolation::{InterpolatorCache, WindComponent};
use super::{WindField, WindSample};
use crate::error::Result;
use crate::grid::Grid;
use crate::rng::{gaussian, SimRng};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Once};
use tracing::warn;

/// Convert a wind vector from m/s to degrees/hour at latitude `lat` (°)
///
/// ```text
/// v_deg = v · 3600 / 111000
/// u_deg = u · 3600 / (111000 · max(cos(lat), 0.1))
/// ```
#[inline]
pub fn to_degrees_per_hour(u_ms: f64, v_ms: f64, lat: f64) -> (f64, f64) {
    let cos_lat = lat.to_radians().cos().max(MIN_COS_LAT);
    let u = u_ms * SECONDS_PER_HOUR / (METERS_PER_DEGREE * cos_lat);
    let v = v_ms * SECONDS_PER_HOUR / METERS_PER_DEGREE;
    (u, v)
}

/// Snapshot indices bracketing `t` and the blend weight toward the later one
pub fn time_bracket(t_axis: &[f64], t: f64) -> (usize, usize, f64) {
    if t_axis.len() < 2 {
        return (0, 0, 0.0);
    }
    let last = t_axis.len() - 2;
    let i0 = t_axis.partition_point(|&x| x < t).saturating_sub(1).min(last);
    let (t0, t1) = (t_axis[i0], t_axis[i0 + 1]);
    let alpha = ((t - t0) / (t1 - t0).max(MIN_SNAPSHOT_SPACING)).clamp(0.0, 1.0);
    (i0, i0 + 1, alpha)
}

/// Wind model backed by a gridded reanalysis dataset
pub struct ReanalysisWind {
    dataset: Arc<LazyDataset>,
    grid: Grid,
    turbulence: f64,
    cache: InterpolatorCache,
    coverage_check: Once,
}

impl ReanalysisWind {
    /// `dataset` may be shared with other wind instances; it loads on the first `prepare`
    pub fn new(dataset: Arc<LazyDataset>, grid: Grid, turbulence: f64, cache_capacity: usize) -> Self {
        Self {
            dataset,
            grid,
            turbulence,
            cache: InterpolatorCache::new(cache_capacity),
            coverage_check: Once::new(),
        }
    }

    /// Build directly from a normalized dataset
    pub fn from_dataset(dataset: ReanalysisDataset, grid: Grid, turbulence: f64) -> Self {
        let lazy = LazyDataset::preloaded(dataset, DateTime::<Utc>::default());
        Self::new(Arc::new(lazy), grid, turbulence, 30)
    }

    pub fn dataset(&self) -> &Arc<LazyDataset> {
        &self.dataset
    }

    pub fn cache(&self) -> &InterpolatorCache {
        &self.cache
    }

    pub fn turbulence(&self) -> f64 {
        self.turbulence
    }
}

impl WindField for ReanalysisWind {
    fn name(&self) -> &'static str {
        "reanalysis"
    }

    fn prepare(&self) -> Result<()> {
        let dataset = self.dataset.get_or_load()?;
        self.coverage_check.call_once(|| {
            if !dataset.covers(&self.grid) {
                warn!(
                    "Reanalysis coverage is smaller than the simulation grid; \
                     particles outside it will see zero wind"
                );
            }
        });
        Ok(())
    }

    fn sample(&self, lons: &[f64], lats: &[f64], t_hours: f64, rng: &mut SimRng) -> WindSample {
        let n = lons.len();
        let Some(dataset) = self.dataset.get() else {
            warn!("Reanalysis dataset sampled before prepare(); returning calm wind");
            return WindSample::zeros(n);
        };

        let outside = lons
            .iter()
            .zip(lats)
            .filter(|(&lon, &lat)| !dataset.in_coverage(lon, lat))
            .count();
        if outside > 0 {
            warn!("{outside} particle(s) outside reanalysis coverage at t={t_hours:.1}h; using zero wind");
        }

        let (i0, i1, alpha) = time_bracket(dataset.t_hours(), t_hours);
        let u0 = self.cache.get_or_build(&dataset, i0, WindComponent::U);
        let u1 = self.cache.get_or_build(&dataset, i1, WindComponent::U);
        let v0 = self.cache.get_or_build(&dataset, i0, WindComponent::V);
        let v1 = self.cache.get_or_build(&dataset, i1, WindComponent::V);

        let mut sample = WindSample::zeros(n);
        let mut nan_count = 0usize;
        for k in 0..n {
            let (lon, lat) = (lons[k], lats[k]);
            let mut u_ms = (1.0 - alpha) * u0.evaluate(lat, lon) + alpha * u1.evaluate(lat, lon);
            let mut v_ms = (1.0 - alpha) * v0.evaluate(lat, lon) + alpha * v1.evaluate(lat, lon);
            if u_ms.is_nan() || v_ms.is_nan() {
                nan_count += 1;
                if u_ms.is_nan() {
                    u_ms = 0.0;
                }
                if v_ms.is_nan() {
                    v_ms = 0.0;
                }
            }
            let (u, v) = to_degrees_per_hour(u_ms, v_ms, lat);
            sample.u[k] = u;
            sample.v[k] = v;
        }
        if nan_count > 0 {
            warn!("NaN in interpolated reanalysis wind for {nan_count} particle(s); replaced by 0");
        }

        if self.turbulence > 0.0 {
            let sigma: Vec<f64> = sample
                .u
                .iter()
                .zip(&sample.v)
                .map(|(u, v)| self.turbulence * u.hypot(*v).max(MIN_TURBULENT_SPEED))
                .collect();
            for (u, s) in sample.u.iter_mut().zip(&sigma) {
                *u += gaussian(rng, *s);
            }
            for (v, s) in sample.v.iter_mut().zip(&sigma) {
                *v += gaussian(rng, *s);
            }
        }

        sample
    }
}
