//! Bilinear interpolation over a regular lat/lon mesh, with a bounded cache
//!
//! One interpolator covers one wind component at one dataset snapshot.
//! Queries outside the mesh return 0 instead of failing; NaN in the data
//! propagates to the result and is dealt with by the caller.

use super::dataset::ReanalysisDataset;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Which wind component an interpolator serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindComponent {
    /// Zonal, positive eastward
    U,
    /// Meridional, positive northward
    V,
}

/// Bilinear interpolator over one `(lat, lon)` field
#[derive(Debug, Clone, PartialEq)]
pub struct BilinearInterpolator {
    lats: Vec<f64>,
    lons: Vec<f64>,
    /// Row-major `(lat, lon)`
    values: Vec<f64>,
}

impl BilinearInterpolator {
    /// `lats`/`lons` must be strictly increasing with at least two entries;
    /// `values` holds `lats.len() * lons.len()` entries.
    pub fn new(lats: &[f64], lons: &[f64], values: &[f64]) -> Self {
        debug_assert!(lats.len() >= 2 && lons.len() >= 2);
        debug_assert_eq!(values.len(), lats.len() * lons.len());
        Self {
            lats: lats.to_vec(),
            lons: lons.to_vec(),
            values: values.to_vec(),
        }
    }

    /// Interpolator for `component` at snapshot `t_idx`
    pub fn from_dataset(dataset: &ReanalysisDataset, t_idx: usize, component: WindComponent) -> Self {
        let values = match component {
            WindComponent::U => dataset.u_slice(t_idx),
            WindComponent::V => dataset.v_slice(t_idx),
        };
        Self::new(dataset.lats(), dataset.lons(), values)
    }

    /// Value at `(lat, lon)`; 0 outside the mesh
    pub fn evaluate(&self, lat: f64, lon: f64) -> f64 {
        let Some((i, wy)) = bracket(&self.lats, lat) else {
            return 0.0;
        };
        let Some((j, wx)) = bracket(&self.lons, lon) else {
            return 0.0;
        };

        let n_lon = self.lons.len();
        let v00 = self.values[i * n_lon + j];
        let v01 = self.values[i * n_lon + j + 1];
        let v10 = self.values[(i + 1) * n_lon + j];
        let v11 = self.values[(i + 1) * n_lon + j + 1];

        v00 * (1.0 - wy) * (1.0 - wx) + v01 * (1.0 - wy) * wx + v10 * wy * (1.0 - wx) + v11 * wy * wx
    }

    /// Evaluate at many points
    pub fn evaluate_many(&self, lats: &[f64], lons: &[f64]) -> Vec<f64> {
        lats.iter()
            .zip(lons)
            .map(|(&lat, &lon)| self.evaluate(lat, lon))
            .collect()
    }
}

/// Lower cell index and fractional weight of `x` on a sorted axis
///
/// `None` outside `[axis[0], axis[last]]` or for NaN.
#[inline]
fn bracket(axis: &[f64], x: f64) -> Option<(usize, f64)> {
    let n = axis.len();
    if x.is_nan() || x < axis[0] || x > axis[n - 1] {
        return None;
    }
    let i = axis.partition_point(|&g| g < x).saturating_sub(1).min(n - 2);
    let w = (x - axis[i]) / (axis[i + 1] - axis[i]);
    Some((i, w))
}

/// Interpolators keyed by `(snapshot, component)`
///
/// When an insert finds more than `capacity` entries, the whole cache is
/// flushed first. Misses always rebuild from the dataset, so eviction never
/// changes results.
#[derive(Debug)]
pub struct InterpolatorCache {
    capacity: usize,
    entries: Mutex<FxHashMap<(usize, WindComponent), Arc<BilinearInterpolator>>>,
}

impl InterpolatorCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached interpolator, building and inserting it on a miss
    pub fn get_or_build(
        &self,
        dataset: &ReanalysisDataset,
        t_idx: usize,
        component: WindComponent,
    ) -> Arc<BilinearInterpolator> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(interp) = entries.get(&(t_idx, component)) {
            return Arc::clone(interp);
        }

        let interp = Arc::new(BilinearInterpolator::from_dataset(dataset, t_idx, component));
        if entries.len() > self.capacity {
            debug!("Interpolator cache full ({} entries), flushing", entries.len());
            entries.clear();
        }
        entries.insert((t_idx, component), Arc::clone(&interp));
        interp
    }
}
