//! Scan parameters shared by every strategy.

use std::path::PathBuf;

/// Step distance between adjacent cell centers when scanning for spawns (km).
pub const STEP_DISTANCE_KM: f64 = 0.070;

/// Widened step distance when scanning fixed points of interest only (km).
pub const POI_STEP_DISTANCE_KM: f64 = 0.900;

/// Parameters for building a scheduler.
#[derive(Debug, Clone)]
pub struct ScanParams {
    /// Minimum seconds between scans per worker.
    pub scan_delay: u64,
    /// Ring count of the hex coverage set (>= 1).
    pub step_limit: u32,
    /// Worker maximum ground speed in km/h.
    pub kph: f64,
    /// Safety margin in seconds around a predicted spawn appearance.
    pub spawn_delay: u64,
    /// Parallel worker count; used by statistics only.
    pub workers: usize,
    /// Minutes between `SpeedScan` queue refreshes. Should stay below 10 so
    /// new bands open during the initial scan.
    pub refresh_minutes: u64,
    /// Fallback altitude in metres when no elevation source is available.
    pub altitude: f64,
    /// Altitude jitter amplitude in metres (0 disables whole-metre jitter;
    /// a sub-metre random fraction is always applied).
    pub altitude_range: i32,
    /// Elevation API key; only used when the `google-elevation` feature is on.
    pub gmaps_key: Option<String>,
    /// Scanning fixed points of interest only; widens the step distance.
    pub poi_only: bool,
    /// Sidecar JSON file with spawn points for `SpawnScan`; `None` falls
    /// back to storage.
    pub spawnpoint_file: Option<PathBuf>,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            scan_delay: 10,
            step_limit: 5,
            kph: 35.0,
            spawn_delay: 10,
            workers: 1,
            refresh_minutes: 5,
            altitude: 0.0,
            altitude_range: 0,
            gmaps_key: None,
            poi_only: false,
            spawnpoint_file: None,
        }
    }
}

impl ScanParams {
    /// Distance between adjacent cell centers for these parameters.
    pub fn step_distance_km(&self) -> f64 {
        if self.poi_only {
            POI_STEP_DISTANCE_KM
        } else {
            STEP_DISTANCE_KM
        }
    }

    pub fn with_step_limit(mut self, step_limit: u32) -> Self {
        self.step_limit = step_limit;
        self
    }

    pub fn with_kph(mut self, kph: f64) -> Self {
        self.kph = kph;
        self
    }

    pub fn with_scan_delay(mut self, scan_delay: u64) -> Self {
        self.scan_delay = scan_delay;
        self
    }

    pub fn with_spawn_delay(mut self, spawn_delay: u64) -> Self {
        self.spawn_delay = spawn_delay;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_altitude(mut self, altitude: f64, altitude_range: i32) -> Self {
        self.altitude = altitude;
        self.altitude_range = altitude_range;
        self
    }

    pub fn with_spawnpoint_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.spawnpoint_file = Some(path.into());
        self
    }
}
