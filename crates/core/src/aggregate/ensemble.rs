//! Reductions over single runs and whole ensembles
//!
//! Every map is a `(n_lat, n_lon)` matrix. Per-run histograms are built in
//! parallel; they hold exact integer counts, so the parallel sums do not
//! depend on reduction order.

use super::histogram::{empty_map, histogram, normalize_by_peak, presence_mask};
use crate::engine::RunResult;
use crate::grid::Grid;
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Exportable bundle of the standard ensemble products
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleStatistics {
    /// Number of runs reduced
    pub n_runs: usize,
    /// Normalized-density cutoff used for `threshold_exceedance`
    pub threshold: f64,
    /// Per-step particle counts of the first run (empty for no runs)
    pub time_density: Vec<DMatrix<f64>>,
    /// Fraction of runs visiting each cell
    pub probability: DMatrix<f64>,
    /// Mean per-cell count, normalized by the ensemble peak
    pub mean_concentration: DMatrix<f64>,
    /// Fraction of runs whose normalized density exceeds `threshold`
    pub threshold_exceedance: DMatrix<f64>,
}

/// Turns raw trajectories into gridded products
#[derive(Debug, Clone)]
pub struct Aggregator {
    grid: Grid,
}

impl Aggregator {
    pub fn new(grid: Grid) -> Self {
        Self { grid }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Active-particle counts at every record of one run
    pub fn time_density_maps(&self, run: &RunResult) -> Vec<DMatrix<f64>> {
        (0..run.n_records())
            .into_par_iter()
            .map(|record| histogram(&self.grid, run.active_positions(record)))
            .collect()
    }

    /// Cumulative histogram of every active position in one run
    fn cumulative_counts(&self, run: &RunResult) -> DMatrix<f64> {
        histogram(&self.grid, run.all_active_positions())
    }

    /// Cumulative density of one run, normalized to a peak of 1
    pub fn density_map(&self, run: &RunResult) -> DMatrix<f64> {
        let mut density = self.cumulative_counts(run);
        normalize_by_peak(&mut density);
        density
    }

    /// Sum a per-run map over the ensemble, then divide by the run count
    fn ensemble_mean<F>(&self, runs: &[RunResult], per_run: F) -> DMatrix<f64>
    where
        F: Fn(&RunResult) -> DMatrix<f64> + Send + Sync,
    {
        if runs.is_empty() {
            return empty_map(&self.grid);
        }
        let total = runs
            .par_iter()
            .map(per_run)
            .reduce(|| empty_map(&self.grid), |a, b| a + b);
        total / runs.len() as f64
    }

    /// Presence probability: fraction of runs in which each cell was visited
    pub fn probability_map(&self, runs: &[RunResult]) -> DMatrix<f64> {
        self.ensemble_mean(runs, |run| presence_mask(&self.cumulative_counts(run)))
    }

    /// Mean integrated count per cell, normalized by its ensemble peak
    pub fn mean_concentration(&self, runs: &[RunResult]) -> DMatrix<f64> {
        let mut mean = self.ensemble_mean(runs, |run| self.cumulative_counts(run));
        normalize_by_peak(&mut mean);
        mean
    }

    /// Fraction of runs whose normalized density exceeds `threshold` in each cell
    pub fn threshold_map(&self, runs: &[RunResult], threshold: f64) -> DMatrix<f64> {
        self.ensemble_mean(runs, |run| {
            self.density_map(run)
                .map(|v| if v > threshold { 1.0 } else { 0.0 })
        })
    }

    /// Presence probability at each record
    ///
    /// The record count comes from the first run; empty ensembles give an
    /// empty series.
    pub fn time_probability_maps(&self, runs: &[RunResult]) -> Vec<DMatrix<f64>> {
        let Some(first) = runs.first() else {
            return Vec::new();
        };
        let n_records = first.n_records();
        let n_runs = runs.len() as f64;

        (0..n_records)
            .into_par_iter()
            .map(|record| {
                let mut visits = empty_map(&self.grid);
                for run in runs.iter().filter(|run| record < run.n_records()) {
                    if run.active_count(record) == 0 {
                        continue;
                    }
                    visits += presence_mask(&histogram(&self.grid, run.active_positions(record)));
                }
                visits / n_runs
            })
            .collect()
    }

    /// Standard products of an ensemble in one exportable value
    pub fn summarize(&self, runs: &[RunResult], threshold: f64) -> EnsembleStatistics {
        debug!(
            "Aggregating {} runs onto {}x{} grid (threshold {})",
            runs.len(),
            self.grid.n_lat(),
            self.grid.n_lon(),
            threshold
        );
        EnsembleStatistics {
            n_runs: runs.len(),
            threshold,
            time_density: runs
                .first()
                .map_or_else(Vec::new, |run| self.time_density_maps(run)),
            probability: self.probability_map(runs),
            mean_concentration: self.mean_concentration(runs),
            threshold_exceedance: self.threshold_map(runs, threshold),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::histogram::peak;
    use crate::config::GridConfig;
    use approx::assert_relative_eq;

    fn europe() -> Aggregator {
        Aggregator::new(
            Grid::new(GridConfig {
                lon_min: -12.0,
                lon_max: 75.0,
                lat_min: 33.0,
                lat_max: 72.0,
                n_lon: 87,
                n_lat: 39,
            })
            .unwrap(),
        )
    }

    /// Two records, two particles
    fn run(lon: [f64; 4], lat: [f64; 4], active: [bool; 4]) -> RunResult {
        RunResult::from_parts(2, 2, lon.to_vec(), lat.to_vec(), active.to_vec()).unwrap()
    }

    fn in_unit_range(map: &DMatrix<f64>) -> bool {
        map.iter().all(|&v| (0.0..=1.0).contains(&v))
    }

    #[test]
    fn test_probability_map_in_unit_range() {
        let agg = europe();
        let r = run([0.0, 1.0, 0.0, 1.0], [50.0, 51.0, 50.0, 51.0], [true, true, true, false]);
        let prob = agg.probability_map(&[r]);
        assert!(in_unit_range(&prob));
        assert_eq!(prob.sum(), 2.0);
    }

    #[test]
    fn test_density_map_peak_is_exactly_one() {
        let agg = europe();
        let r = run([0.0; 4], [50.0; 4], [true; 4]);
        let density = agg.density_map(&r);
        assert_eq!(peak(&density), 1.0);
        assert_eq!(density.sum(), 1.0);
    }

    #[test]
    fn test_nothing_active_gives_zero_maps() {
        let agg = europe();
        let r = run([0.0; 4], [50.0; 4], [false; 4]);
        assert_eq!(peak(&agg.density_map(&r)), 0.0);
        let runs = [r];
        assert_eq!(peak(&agg.mean_concentration(&runs)), 0.0);
        assert_eq!(peak(&agg.threshold_map(&runs, 0.05)), 0.0);
        assert!(agg.time_probability_maps(&runs).iter().all(|m| peak(m) == 0.0));
    }

    #[test]
    fn test_empty_ensemble() {
        let agg = europe();
        let prob = agg.probability_map(&[]);
        assert_eq!(prob.shape(), (39, 87));
        assert!(prob.iter().all(|&v| v == 0.0));
        assert!(agg.time_probability_maps(&[]).is_empty());

        let stats = agg.summarize(&[], 0.05);
        assert_eq!(stats.n_runs, 0);
        assert!(stats.time_density.is_empty());
        assert!(stats.mean_concentration.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_probability_averages_over_runs() {
        let agg = europe();
        let here = run([10.5; 4], [50.5; 4], [true; 4]);
        let elsewhere = run([40.5; 4], [60.5; 4], [true; 4]);
        let prob = agg.probability_map(&[here.clone(), elsewhere.clone(), here]);
        let (row, col) = agg.grid().cell_of(10.5, 50.5).unwrap();
        assert_relative_eq!(prob[(row, col)], 2.0 / 3.0);
        let (row, col) = agg.grid().cell_of(40.5, 60.5).unwrap();
        assert_relative_eq!(prob[(row, col)], 1.0 / 3.0);
    }

    #[test]
    fn test_mean_concentration_and_threshold() {
        let agg = europe();
        // Three hits in one cell, one in another
        let r = run([10.5, 10.5, 10.5, 20.5], [50.5, 50.5, 50.5, 55.5], [true; 4]);
        let conc = agg.mean_concentration(std::slice::from_ref(&r));
        let (hot_row, hot_col) = agg.grid().cell_of(10.5, 50.5).unwrap();
        let (cold_row, cold_col) = agg.grid().cell_of(20.5, 55.5).unwrap();
        assert_eq!(conc[(hot_row, hot_col)], 1.0);
        assert_relative_eq!(conc[(cold_row, cold_col)], 1.0 / 3.0);

        let exceed = agg.threshold_map(std::slice::from_ref(&r), 0.5);
        assert_eq!(exceed[(hot_row, hot_col)], 1.0);
        assert_eq!(exceed[(cold_row, cold_col)], 0.0);
    }

    #[test]
    fn test_time_maps_follow_records() {
        let agg = europe();
        let r = run([10.5, 11.5, 10.5, 11.5], [50.5, 50.5, 50.5, 50.5], [true, false, true, true]);
        let density = agg.time_density_maps(&r);
        assert_eq!(density.len(), 2);
        assert_eq!(density[0].sum(), 1.0);
        assert_eq!(density[1].sum(), 2.0);

        let prob = agg.time_probability_maps(&[r.clone(), r]);
        assert_eq!(prob.len(), 2);
        assert!(prob.iter().all(in_unit_range));
        assert_eq!(prob[1].sum(), 2.0);
    }

    #[test]
    fn test_summary_serializes() {
        let agg = europe();
        let r = run([10.5; 4], [50.5; 4], [true; 4]);
        let stats = agg.summarize(&[r], 0.05);
        assert_eq!(stats.time_density.len(), 2);
        let json = serde_json::to_string(&stats).unwrap();
        let back: EnsembleStatistics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.n_runs, 1);
        assert_eq!(back.probability.shape(), (39, 87));
    }
}
