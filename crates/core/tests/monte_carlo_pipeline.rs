mod common;

use plume_sim_core::aggregate::peak;
use plume_sim_core::{
    create_wind_field, Aggregator, Grid, MonteCarloRunner, RunResult, SimulationConfig, TransportEngine,
};

fn scenario() -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.simulation.n_particles = 400;
    config.simulation.n_steps = 72;
    config.simulation.n_runs = 6;
    config.source.emission_duration_h = Some(24.0);
    config.grid.n_lon = 87;
    config.grid.n_lat = 39;
    config
}

fn run_ensemble(config: &SimulationConfig) -> Vec<RunResult> {
    let grid = Grid::new(config.grid).unwrap();
    let wind = create_wind_field(&config.wind, &grid).unwrap();
    let engine = TransportEngine::new(config, wind).unwrap();
    MonteCarloRunner::new(engine).run_configured().unwrap()
}

#[test]
fn test_ensemble_products_are_well_formed() {
    let config = scenario();
    let runs = run_ensemble(&config);
    assert_eq!(runs.len(), 6);

    let aggregator = Aggregator::new(Grid::new(config.grid).unwrap());
    let stats = aggregator.summarize(&runs, config.aggregation.threshold);

    let unit = |v: &f64| (0.0..=1.0).contains(v);
    assert!(stats.probability.iter().all(unit));
    assert!(stats.threshold_exceedance.iter().all(unit));
    assert!(stats.mean_concentration.iter().all(unit));
    assert_eq!(peak(&stats.mean_concentration), 1.0);

    // The source cell is visited by every run
    let (row, col) = aggregator.grid().cell_of(config.source.lon, config.source.lat).unwrap();
    assert_eq!(stats.probability[(row, col)], 1.0);

    assert_eq!(stats.time_density.len(), 73);
    let time_prob = aggregator.time_probability_maps(&runs);
    assert_eq!(time_prob.len(), 73);
    assert!(time_prob.iter().all(|m| m.iter().all(unit)));
}

#[test]
fn test_ensemble_is_reproducible() {
    let config = scenario();
    let a = run_ensemble(&config);
    let b = run_ensemble(&config);
    assert_eq!(a, b);
    // Runs within an ensemble differ
    assert_ne!(a[0], a[1]);
}

#[test]
fn test_plume_drifts_north_in_first_phase() {
    let mut config = scenario();
    config.simulation.n_steps = 36;
    config.source.emission_duration_h = None;
    let runs = run_ensemble(&config);

    let mean_lat = |run: &RunResult, record: usize| {
        let positions: Vec<(f64, f64)> = run.active_positions(record).collect();
        positions.iter().map(|p| p.1).sum::<f64>() / positions.len() as f64
    };
    for run in &runs {
        // v ~ 0.18 deg/h for the first 48 h
        let drift = mean_lat(run, 36) - mean_lat(run, 0);
        assert!(drift > 5.0 && drift < 8.0, "unexpected drift {drift}");
    }
}

#[test]
fn test_config_file_drives_the_run() {
    let mut config = scenario();
    config.simulation.n_runs = 2;
    config.simulation.n_steps = 10;
    let path = common::temp_path("config.json");
    std::fs::write(&path, config.to_json_string().unwrap()).unwrap();

    let loaded = SimulationConfig::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let runs = run_ensemble(&loaded);
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].n_records(), 11);
    assert_eq!(runs[0].n_particles(), 400);
}
