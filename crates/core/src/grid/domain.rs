//! Rectangular lon/lat discretization
//!
//! Edges are uniformly spaced between the configured bounds; the last edge is
//! pinned to the maximum so accumulated rounding never shrinks the domain.
//! Binning follows the usual 2-D histogram convention: half-open cells
//! `[e_k, e_{k+1})`, except the last cell on each axis which also takes the
//! upper bound.

use crate::config::GridConfig;
use crate::error::{PlumeError, Result};
use crate::grid::BoundaryPolicy;
use serde::{Deserialize, Serialize};

/// Minimum longitude span (°) for a domain to wrap periodically
pub const GLOBAL_LON_SPAN: f64 = 359.0;

/// Immutable simulation domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    config: GridConfig,
    lon_edges: Vec<f64>,
    lat_edges: Vec<f64>,
    lon_centers: Vec<f64>,
    lat_centers: Vec<f64>,
}

impl Grid {
    /// Build a grid, validating bounds and cell counts
    ///
    /// # Errors
    /// Returns `InvalidConfig` if a bound pair is not strictly increasing or a cell count is zero
    pub fn new(config: GridConfig) -> Result<Self> {
        let ordered = |a: f64, b: f64| a < b && a.is_finite() && b.is_finite();
        if !ordered(config.lon_min, config.lon_max) || !ordered(config.lat_min, config.lat_max) {
            return Err(PlumeError::InvalidConfig(format!(
                "grid bounds must satisfy min < max, got lon [{}, {}] lat [{}, {}]",
                config.lon_min, config.lon_max, config.lat_min, config.lat_max
            )));
        }
        if config.n_lon == 0 || config.n_lat == 0 {
            return Err(PlumeError::InvalidConfig(
                "grid cell counts must be > 0".to_string(),
            ));
        }

        let lon_edges = linspace(config.lon_min, config.lon_max, config.n_lon + 1);
        let lat_edges = linspace(config.lat_min, config.lat_max, config.n_lat + 1);
        let lon_centers = midpoints(&lon_edges);
        let lat_centers = midpoints(&lat_edges);

        Ok(Self {
            config,
            lon_edges,
            lat_edges,
            lon_centers,
            lat_centers,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn lon_min(&self) -> f64 {
        self.config.lon_min
    }

    pub fn lon_max(&self) -> f64 {
        self.config.lon_max
    }

    pub fn lat_min(&self) -> f64 {
        self.config.lat_min
    }

    pub fn lat_max(&self) -> f64 {
        self.config.lat_max
    }

    /// Number of longitude cells (matrix columns)
    pub fn n_lon(&self) -> usize {
        self.config.n_lon
    }

    /// Number of latitude cells (matrix rows)
    pub fn n_lat(&self) -> usize {
        self.config.n_lat
    }

    /// `n_lon + 1` increasing longitude edges
    pub fn lon_edges(&self) -> &[f64] {
        &self.lon_edges
    }

    /// `n_lat + 1` increasing latitude edges
    pub fn lat_edges(&self) -> &[f64] {
        &self.lat_edges
    }

    pub fn lon_centers(&self) -> &[f64] {
        &self.lon_centers
    }

    pub fn lat_centers(&self) -> &[f64] {
        &self.lat_centers
    }

    pub fn lon_span(&self) -> f64 {
        self.config.lon_max - self.config.lon_min
    }

    /// Longitude span covers the whole circle
    pub fn is_global_longitude(&self) -> bool {
        self.lon_span() >= GLOBAL_LON_SPAN
    }

    /// Longitude wraps and both poles are inside the domain
    pub fn is_global(&self) -> bool {
        self.is_global_longitude() && self.config.lat_min <= -90.0 && self.config.lat_max >= 90.0
    }

    pub fn boundary_policy(&self) -> BoundaryPolicy {
        BoundaryPolicy::for_grid(self)
    }

    /// Fold a longitude into `[lon_min, lon_max)`
    #[inline]
    pub fn wrap_longitude(&self, lon: f64) -> f64 {
        (lon - self.config.lon_min).rem_euclid(self.lon_span()) + self.config.lon_min
    }

    /// Inclusive bounds check
    #[inline]
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.config.lon_min
            && lon <= self.config.lon_max
            && lat >= self.config.lat_min
            && lat <= self.config.lat_max
    }

    /// Keep only the points inside the (inclusive) extent, preserving order
    pub fn filter_points_in_extent(&self, lons: &[f64], lats: &[f64]) -> (Vec<f64>, Vec<f64>) {
        lons.iter()
            .zip(lats)
            .filter(|(&lon, &lat)| self.contains(lon, lat))
            .map(|(&lon, &lat)| (lon, lat))
            .unzip()
    }

    /// Histogram cell `(row, col)` = `(lat index, lon index)` holding a position
    ///
    /// Returns `None` outside the domain or for NaN coordinates.
    #[inline]
    pub fn cell_of(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        let col = bin_index(&self.lon_edges, lon)?;
        let row = bin_index(&self.lat_edges, lat)?;
        Some((row, col))
    }
}

/// `n` evenly spaced values from `start` to `stop` inclusive
fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    let intervals = (n - 1) as f64;
    let step = (stop - start) / intervals;
    let mut values: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
    if let Some(last) = values.last_mut() {
        *last = stop;
    }
    values
}

fn midpoints(edges: &[f64]) -> Vec<f64> {
    edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
}

fn bin_index(edges: &[f64], x: f64) -> Option<usize> {
    let first = *edges.first()?;
    let last = *edges.last()?;
    if x.is_nan() || x < first || x > last {
        return None;
    }
    let n_bins = edges.len() - 1;
    if x == last {
        return Some(n_bins - 1);
    }
    Some(edges.partition_point(|&e| e <= x) - 1)
}
