//! Reanalysis wind dataset: raw hand-off format, normalization and lazy loading
//!
//! Collaborators hand the engine a [`RawDataset`]: coordinate vectors, a time
//! axis and named wind variables in m/s, laid out `(time, [level], lat, lon)`.
//! [`ReanalysisDataset::from_raw`] turns it into the form the interpolators
//! expect (ascending latitude, hours since the reference time, a single
//! level). [`LazyDataset`] performs that load exactly once, on first use, no
//! matter how many runs ask for it concurrently.

use crate::error::{PlumeError, Result};
use crate::grid::Grid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::info;

/// Accepted `(u, v)` variable name pairs, in lookup order
const COMPONENT_NAMES: [(&str, &str); 2] = [("u", "v"), ("u_component_of_wind", "v_component_of_wind")];

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Time coordinate of a raw dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeAxis {
    /// Already expressed as hours since the reference time
    Hours(Vec<f64>),
    /// Absolute UTC instants
    Timestamps(Vec<DateTime<Utc>>),
}

impl TimeAxis {
    pub fn len(&self) -> usize {
        match self {
            TimeAxis::Hours(h) => h.len(),
            TimeAxis::Timestamps(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hours elapsed since `reference` for every entry
    pub fn hours_since(&self, reference: DateTime<Utc>) -> Vec<f64> {
        match self {
            TimeAxis::Hours(h) => h.clone(),
            TimeAxis::Timestamps(ts) => ts
                .iter()
                .map(|t| (*t - reference).num_milliseconds() as f64 / MILLIS_PER_HOUR)
                .collect(),
        }
    }
}

/// Gridded wind data as delivered by the fetch/convert collaborator
///
/// Variables are flat arrays in `(time, [level], latitude, longitude)` order.
/// JSON `null` entries stand for missing values and load as NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDataset {
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    pub time: TimeAxis,
    /// Pressure level axis; must hold a single level when present
    #[serde(default, alias = "pressure_level", skip_serializing_if = "Option::is_none")]
    pub level: Option<Vec<f64>>,
    #[serde(deserialize_with = "nullable_variables")]
    pub variables: BTreeMap<String, Vec<f64>>,
}

fn nullable_variables<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, Vec<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Vec<Option<f64>>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, values)| (name, values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect()))
        .collect())
}

/// Normalized dataset ready for interpolation
///
/// Latitude, longitude and time are strictly increasing. `u`/`v` hold
/// `n_times × n_lat × n_lon` values in m/s.
#[derive(Debug, Clone, PartialEq)]
pub struct ReanalysisDataset {
    lats: Vec<f64>,
    lons: Vec<f64>,
    t_hours: Vec<f64>,
    u: Vec<f64>,
    v: Vec<f64>,
}

impl ReanalysisDataset {
    /// Normalize a raw dataset
    ///
    /// # Errors
    /// - `UnknownWindComponents` if no known `(u, v)` naming is present
    /// - `InvalidDataset` for multi-level data, too-small axes, unordered
    ///   coordinates or variables whose length does not match the axes
    pub fn from_raw(raw: RawDataset, reference: DateTime<Utc>) -> Result<Self> {
        let &(u_name, v_name) = COMPONENT_NAMES
            .iter()
            .find(|(u, v)| raw.variables.contains_key(*u) && raw.variables.contains_key(*v))
            .ok_or_else(|| PlumeError::UnknownWindComponents {
                available: raw.variables.keys().cloned().collect(),
            })?;

        if let Some(levels) = &raw.level {
            if levels.len() != 1 {
                return Err(PlumeError::InvalidDataset(format!(
                    "expected a single pressure level, found {}",
                    levels.len()
                )));
            }
        }

        let n_lat = raw.latitude.len();
        let n_lon = raw.longitude.len();
        let n_times = raw.time.len();
        if n_lat < 2 || n_lon < 2 {
            return Err(PlumeError::InvalidDataset(format!(
                "need at least 2 latitudes and 2 longitudes, got {n_lat}x{n_lon}"
            )));
        }
        if n_times == 0 {
            return Err(PlumeError::InvalidDataset("time axis is empty".to_string()));
        }

        let mut variables = raw.variables;
        let mut take = |name: &str| -> Result<Vec<f64>> {
            let values = variables.remove(name).unwrap_or_default();
            let expected = n_times * n_lat * n_lon;
            if values.len() != expected {
                return Err(PlumeError::InvalidDataset(format!(
                    "variable '{name}' has {} values, expected {expected} ({n_times} times x {n_lat} lats x {n_lon} lons)",
                    values.len()
                )));
            }
            Ok(values)
        };
        let mut u = take(u_name)?;
        let mut v = take(v_name)?;

        let mut lats = raw.latitude;
        let lons = raw.longitude;
        let t_hours = raw.time.hours_since(reference);

        // Reanalysis products commonly store latitude north to south
        if lats[0] > lats[n_lat - 1] {
            lats.reverse();
            flip_rows(&mut u, n_lat, n_lon);
            flip_rows(&mut v, n_lat, n_lon);
        }

        ensure_increasing("latitude", &lats)?;
        ensure_increasing("longitude", &lons)?;
        ensure_increasing("time", &t_hours)?;

        Ok(Self {
            lats,
            lons,
            t_hours,
            u,
            v,
        })
    }

    pub fn lats(&self) -> &[f64] {
        &self.lats
    }

    pub fn lons(&self) -> &[f64] {
        &self.lons
    }

    /// Snapshot times, hours since the reference time
    pub fn t_hours(&self) -> &[f64] {
        &self.t_hours
    }

    pub fn n_times(&self) -> usize {
        self.t_hours.len()
    }

    /// Zonal wind (m/s) at snapshot `t_idx`, row-major `(lat, lon)`
    pub fn u_slice(&self, t_idx: usize) -> &[f64] {
        self.slice(&self.u, t_idx)
    }

    /// Meridional wind (m/s) at snapshot `t_idx`, row-major `(lat, lon)`
    pub fn v_slice(&self, t_idx: usize) -> &[f64] {
        self.slice(&self.v, t_idx)
    }

    fn slice<'a>(&self, data: &'a [f64], t_idx: usize) -> &'a [f64] {
        let size = self.lats.len() * self.lons.len();
        &data[t_idx * size..(t_idx + 1) * size]
    }

    /// Whether the spatial coverage includes the whole grid extent
    pub fn covers(&self, grid: &Grid) -> bool {
        let (lat_lo, lat_hi) = (self.lats[0], self.lats[self.lats.len() - 1]);
        let (lon_lo, lon_hi) = (self.lons[0], self.lons[self.lons.len() - 1]);
        lat_lo <= grid.lat_min()
            && lat_hi >= grid.lat_max()
            && lon_lo <= grid.lon_min()
            && lon_hi >= grid.lon_max()
    }

    /// Whether a position lies inside the spatial coverage (inclusive)
    #[inline]
    pub fn in_coverage(&self, lon: f64, lat: f64) -> bool {
        lat >= self.lats[0]
            && lat <= self.lats[self.lats.len() - 1]
            && lon >= self.lons[0]
            && lon <= self.lons[self.lons.len() - 1]
    }
}

/// Reverse the latitude rows of every time slice
fn flip_rows(data: &mut [f64], n_lat: usize, n_lon: usize) {
    for slice in data.chunks_exact_mut(n_lat * n_lon) {
        for row in 0..n_lat / 2 {
            let mirror = n_lat - 1 - row;
            for col in 0..n_lon {
                slice.swap(row * n_lon + col, mirror * n_lon + col);
            }
        }
    }
}

fn ensure_increasing(axis: &str, values: &[f64]) -> Result<()> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(PlumeError::InvalidDataset(format!("{axis} axis contains non-finite values")));
    }
    if values.windows(2).any(|w| w[0] >= w[1]) {
        return Err(PlumeError::InvalidDataset(format!("{axis} axis is not strictly monotonic")));
    }
    Ok(())
}

/// Something that can produce the raw dataset on demand
pub trait DatasetSource: Send + Sync {
    /// Human-readable origin, for logs
    fn describe(&self) -> String;

    /// Produce the raw dataset
    ///
    /// # Errors
    /// Returns the fatal input error that prevents loading
    fn load(&self) -> Result<RawDataset>;
}

impl DatasetSource for RawDataset {
    fn describe(&self) -> String {
        "in-memory dataset".to_string()
    }

    fn load(&self) -> Result<RawDataset> {
        Ok(self.clone())
    }
}

/// JSON file holding a [`RawDataset`]
#[derive(Debug, Clone)]
pub struct JsonDatasetFile {
    path: PathBuf,
}

impl JsonDatasetFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DatasetSource for JsonDatasetFile {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<RawDataset> {
        if !self.path.is_file() {
            return Err(PlumeError::DatasetNotFound(self.path.clone()));
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| PlumeError::DatasetParse(format!("{}: {e}", self.path.display())))?;
        serde_json::from_str(&contents)
            .map_err(|e| PlumeError::DatasetParse(format!("{}: {e}", self.path.display())))
    }
}

/// Load state of a [`LazyDataset`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetState {
    NotLoaded,
    Loaded,
}

/// Dataset loaded once on first use and shared read-only afterwards
///
/// Concurrent first calls serialize on an init lock; the loser of the race
/// finds the dataset already present and returns it without loading again.
/// Reads after initialization take no lock.
pub struct LazyDataset {
    source: Box<dyn DatasetSource>,
    reference_time: DateTime<Utc>,
    loaded: OnceLock<Arc<ReanalysisDataset>>,
    init_lock: Mutex<()>,
}

impl LazyDataset {
    pub fn new(source: Box<dyn DatasetSource>, reference_time: DateTime<Utc>) -> Self {
        Self {
            source,
            reference_time,
            loaded: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Wrap an already-normalized dataset
    pub fn preloaded(dataset: ReanalysisDataset, reference_time: DateTime<Utc>) -> Self {
        let lazy = Self::new(Box::new(EmptySource), reference_time);
        let _ = lazy.loaded.set(Arc::new(dataset));
        lazy
    }

    pub fn state(&self) -> DatasetState {
        if self.loaded.get().is_some() {
            DatasetState::Loaded
        } else {
            DatasetState::NotLoaded
        }
    }

    /// The dataset, if it has been loaded
    pub fn get(&self) -> Option<Arc<ReanalysisDataset>> {
        self.loaded.get().cloned()
    }

    /// Load and normalize on first call; later calls return the cached dataset
    ///
    /// A failed load leaves the state `NotLoaded`, so a later call retries.
    ///
    /// # Errors
    /// Propagates source and normalization errors
    pub fn get_or_load(&self) -> Result<Arc<ReanalysisDataset>> {
        if let Some(dataset) = self.loaded.get() {
            return Ok(Arc::clone(dataset));
        }

        let _guard = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(dataset) = self.loaded.get() {
            return Ok(Arc::clone(dataset));
        }

        info!("Loading reanalysis dataset from {}", self.source.describe());
        let raw = self.source.load()?;
        let dataset = ReanalysisDataset::from_raw(raw, self.reference_time)?;
        let (t, lats, lons) = (dataset.t_hours(), dataset.lats(), dataset.lons());
        info!(
            "Reanalysis dataset loaded: {} snapshots, lat [{:.1} -> {:.1}], lon [{:.1} -> {:.1}], t [{:.0} -> {:.0}]h",
            t.len(),
            lats[0],
            lats[lats.len() - 1],
            lons[0],
            lons[lons.len() - 1],
            t[0],
            t[t.len() - 1]
        );

        Ok(Arc::clone(self.loaded.get_or_init(|| Arc::new(dataset))))
    }
}

/// Source behind a preloaded dataset; never consulted
struct EmptySource;

impl DatasetSource for EmptySource {
    fn describe(&self) -> String {
        "preloaded dataset".to_string()
    }

    fn load(&self) -> Result<RawDataset> {
        Err(PlumeError::InvalidDataset(
            "preloaded dataset has no backing source".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn reference() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(0, 0).unwrap()
    }

    /// 2 times x 3 lats x 2 lons, u encodes the latitude row
    fn descending_raw() -> RawDataset {
        let mut variables = BTreeMap::new();
        variables.insert("u".to_string(), vec![30.0, 30.0, 20.0, 20.0, 10.0, 10.0, 31.0, 31.0, 21.0, 21.0, 11.0, 11.0]);
        variables.insert("v".to_string(), vec![0.0; 12]);
        RawDataset {
            latitude: vec![60.0, 50.0, 40.0],
            longitude: vec![0.0, 2.0],
            time: TimeAxis::Hours(vec![0.0, 1.0]),
            level: None,
            variables,
        }
    }

    #[test]
    fn test_descending_latitude_is_flipped() {
        let ds = ReanalysisDataset::from_raw(descending_raw(), reference()).unwrap();
        assert_eq!(ds.lats(), &[40.0, 50.0, 60.0]);
        assert_eq!(ds.u_slice(0), &[10.0, 10.0, 20.0, 20.0, 30.0, 30.0]);
        assert_eq!(ds.u_slice(1), &[11.0, 11.0, 21.0, 21.0, 31.0, 31.0]);
    }

    #[test]
    fn test_long_component_names_accepted() {
        let mut raw = descending_raw();
        let u = raw.variables.remove("u").unwrap();
        let v = raw.variables.remove("v").unwrap();
        raw.variables.insert("u_component_of_wind".to_string(), u);
        raw.variables.insert("v_component_of_wind".to_string(), v);
        assert!(ReanalysisDataset::from_raw(raw, reference()).is_ok());
    }

    #[test]
    fn test_unknown_component_names_are_fatal() {
        let mut raw = descending_raw();
        raw.variables = BTreeMap::from([("t".to_string(), vec![0.0; 12])]);
        let err = ReanalysisDataset::from_raw(raw, reference()).unwrap_err();
        match err {
            PlumeError::UnknownWindComponents { available } => assert_eq!(available, vec!["t"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_singleton_level_squeezed_multi_level_rejected() {
        let mut raw = descending_raw();
        raw.level = Some(vec![850.0]);
        assert!(ReanalysisDataset::from_raw(raw.clone(), reference()).is_ok());
        raw.level = Some(vec![850.0, 500.0]);
        assert!(matches!(
            ReanalysisDataset::from_raw(raw, reference()),
            Err(PlumeError::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut raw = descending_raw();
        raw.variables.get_mut("v").unwrap().pop();
        assert!(matches!(
            ReanalysisDataset::from_raw(raw, reference()),
            Err(PlumeError::InvalidDataset(_))
        ));
    }

    #[test]
    fn test_timestamps_converted_to_hours() {
        let mut raw = descending_raw();
        let t0 = DateTime::<Utc>::from_timestamp(3 * 3600, 0).unwrap();
        let t1 = DateTime::<Utc>::from_timestamp(9 * 3600, 0).unwrap();
        raw.time = TimeAxis::Timestamps(vec![t0, t1]);
        let ds = ReanalysisDataset::from_raw(raw, reference()).unwrap();
        assert_eq!(ds.t_hours(), &[3.0, 9.0]);
    }

    #[test]
    fn test_json_nulls_load_as_nan() {
        let json = r#"{
            "latitude": [40.0, 50.0], "longitude": [0.0, 1.0],
            "time": ["1986-04-26T01:00:00Z"],
            "variables": { "u": [1.0, null, 3.0, 4.0], "v": [0.0, 0.0, 0.0, 0.0] }
        }"#;
        let raw: RawDataset = serde_json::from_str(json).unwrap();
        assert!(raw.variables["u"][1].is_nan());
        assert!(matches!(raw.time, TimeAxis::Timestamps(_)));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let source = JsonDatasetFile::new("nowhere/era5.json");
        assert!(matches!(source.load(), Err(PlumeError::DatasetNotFound(_))));
    }

    struct CountingSource {
        calls: Arc<AtomicUsize>,
    }

    impl DatasetSource for CountingSource {
        fn describe(&self) -> String {
            "counting".to_string()
        }

        fn load(&self) -> Result<RawDataset> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(descending_raw())
        }
    }

    #[test]
    fn test_concurrent_first_access_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let lazy = Arc::new(LazyDataset::new(
            Box::new(CountingSource {
                calls: Arc::clone(&calls),
            }),
            reference(),
        ));
        assert_eq!(lazy.state(), DatasetState::NotLoaded);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lazy = Arc::clone(&lazy);
                std::thread::spawn(move || lazy.get_or_load().map(|d| d.n_times()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 2);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.state(), DatasetState::Loaded);
        assert!(lazy.get().is_some());
    }

    #[test]
    fn test_failed_load_stays_not_loaded() {
        let lazy = LazyDataset::new(Box::new(JsonDatasetFile::new("nowhere.json")), reference());
        assert!(lazy.get_or_load().is_err());
        assert_eq!(lazy.state(), DatasetState::NotLoaded);
    }
}
