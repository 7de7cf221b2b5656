//! 2-D histogramming of particle positions onto the grid

use crate::grid::Grid;
use nalgebra::DMatrix;

/// Zero map shaped `(n_lat, n_lon)`
pub fn empty_map(grid: &Grid) -> DMatrix<f64> {
    DMatrix::zeros(grid.n_lat(), grid.n_lon())
}

/// Particle counts per cell; row = latitude cell, column = longitude cell
///
/// Positions outside the grid (or NaN) are dropped.
pub fn histogram<I>(grid: &Grid, positions: I) -> DMatrix<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut counts = empty_map(grid);
    for (lon, lat) in positions {
        if let Some((row, col)) = grid.cell_of(lon, lat) {
            counts[(row, col)] += 1.0;
        }
    }
    counts
}

/// Largest cell value, 0 for an empty or all-zero map
pub fn peak(map: &DMatrix<f64>) -> f64 {
    map.iter().copied().fold(0.0, f64::max)
}

/// Scale so the peak becomes exactly 1; all-zero maps are left untouched
pub fn normalize_by_peak(map: &mut DMatrix<f64>) {
    let max = peak(map);
    if max > 0.0 {
        map.apply(|v| *v /= max);
    }
}

/// 1 where the cell holds anything, 0 elsewhere
pub fn presence_mask(map: &DMatrix<f64>) -> DMatrix<f64> {
    map.map(|v| if v > 0.0 { 1.0 } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridConfig;

    fn unit_grid() -> Grid {
        Grid::new(GridConfig {
            lon_min: 0.0,
            lon_max: 4.0,
            lat_min: 0.0,
            lat_max: 2.0,
            n_lon: 4,
            n_lat: 2,
        })
        .unwrap()
    }

    #[test]
    fn test_counts_land_in_lat_lon_cells() {
        let grid = unit_grid();
        let h = histogram(&grid, [(0.5, 0.5), (0.7, 0.2), (3.5, 1.5), (4.0, 2.0), (9.0, 1.0)]);
        assert_eq!(h.shape(), (2, 4));
        assert_eq!(h[(0, 0)], 2.0);
        // Upper edge falls into the last cell
        assert_eq!(h[(1, 3)], 2.0);
        assert_eq!(h.sum(), 4.0);
    }

    #[test]
    fn test_normalize_sets_peak_to_one() {
        let grid = unit_grid();
        let mut h = histogram(&grid, [(0.5, 0.5), (0.5, 0.5), (2.5, 1.5)]);
        normalize_by_peak(&mut h);
        assert_eq!(peak(&h), 1.0);
        assert_eq!(h[(1, 2)], 0.5);
    }

    #[test]
    fn test_all_zero_map_stays_zero() {
        let grid = unit_grid();
        let mut h = histogram(&grid, std::iter::empty());
        normalize_by_peak(&mut h);
        assert!(h.iter().all(|&v| v == 0.0));
        assert_eq!(peak(&h), 0.0);
    }

    #[test]
    fn test_presence_mask() {
        let grid = unit_grid();
        let h = histogram(&grid, [(0.5, 0.5), (0.5, 0.5)]);
        let mask = presence_mask(&h);
        assert_eq!(mask[(0, 0)], 1.0);
        assert_eq!(mask.sum(), 1.0);
    }
}
