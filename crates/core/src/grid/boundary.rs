//! Boundary handling for particles leaving the domain
//!
//! | policy | longitude | latitude | deactivation |
//! |---|---|---|---|
//! | `Regional` | untouched | untouched | outside the bounds |
//! | `PeriodicLongitude` | wrapped | clamped inside | outside the bounds |
//! | `Global` | wrapped | clamped inside | never |
//!
//! Latitude is clamped a hair inside the configured range so positions never
//! sit exactly on a pole, where `cos(lat)` and the longitude metric vanish.

use crate::grid::Grid;
use serde::{Deserialize, Serialize};

/// Distance kept from `lat_min`/`lat_max` when clamping (°)
pub const POLE_EPSILON: f64 = 1e-6;

/// How a grid treats particles stepping across its edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryPolicy {
    /// Bounded domain: leaving it deactivates the particle
    Regional,
    /// Longitude wraps; latitude still bounded
    PeriodicLongitude,
    /// Whole globe: position never deactivates a particle
    Global,
}

impl BoundaryPolicy {
    pub fn for_grid(grid: &Grid) -> Self {
        if grid.is_global() {
            BoundaryPolicy::Global
        } else if grid.is_global_longitude() {
            BoundaryPolicy::PeriodicLongitude
        } else {
            BoundaryPolicy::Regional
        }
    }

    /// Fold an advected position back into the domain where the policy allows it
    #[inline]
    pub fn fold(self, grid: &Grid, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            BoundaryPolicy::Regional => (lon, lat),
            BoundaryPolicy::PeriodicLongitude | BoundaryPolicy::Global => {
                let (lo, hi) = clamp_bounds(grid);
                (grid.wrap_longitude(lon), lat.clamp(lo, hi))
            }
        }
    }

    /// Whether a particle at the (already folded) position stays active
    #[inline]
    pub fn keeps_active(self, grid: &Grid, lon: f64, lat: f64) -> bool {
        match self {
            BoundaryPolicy::Global => true,
            BoundaryPolicy::Regional | BoundaryPolicy::PeriodicLongitude => grid.contains(lon, lat),
        }
    }
}

/// Latitude clamp range; bands thinner than two epsilons collapse to their midpoint
fn clamp_bounds(grid: &Grid) -> (f64, f64) {
    let lo = grid.lat_min() + POLE_EPSILON;
    let hi = grid.lat_max() - POLE_EPSILON;
    if lo <= hi {
        (lo, hi)
    } else {
        let mid = 0.5 * (grid.lat_min() + grid.lat_max());
        (mid, mid)
    }
}
