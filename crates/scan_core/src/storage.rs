//! Storage seam: the record reads and writes the schedulers depend on.
//!
//! The scheduler never talks to a database directly. Reads and record-level
//! learning writes go through the [`ScanStorage`] trait; bulk inserts
//! produced by `location_changed` (new scan rows, cell-to-spawn links) are
//! pushed onto the [`DbUpdateQueue`] write-back channel and applied by
//! whoever owns the backend. [`MemoryStorage`] is a complete in-process
//! implementation backing tests and single-process deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use h3o::CellIndex;
use serde::{Deserialize, Serialize};

use crate::model::{Location, ScanSpawnPoint, ScannedLocation, SpawnPoint, SpawnPointId};
use crate::spatial::{cell_id, hex_bounds};

/// One spawn point row as consumed by `SpawnScan`: appearance time as
/// seconds within the hour. Also the sidecar JSON file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnTimeEntry {
    pub lat: f64,
    pub lng: f64,
    pub spawnpoint_id: SpawnPointId,
    /// Appearance time, seconds after the top of the hour.
    pub time: u32,
}

/// A batch destined for the storage backend.
#[derive(Debug, Clone)]
pub enum DbWrite {
    ScannedLocations(Vec<ScannedLocation>),
    ScanSpawnPoints(Vec<ScanSpawnPoint>),
}

/// Write-back channel handed to schedulers for bulk inserts.
#[derive(Debug, Clone)]
pub struct DbUpdateQueue {
    tx: Sender<DbWrite>,
}

impl DbUpdateQueue {
    pub fn put(&self, write: DbWrite) {
        // The receiver dropping (shutdown) is not an error worth surfacing
        // to the scheduling path.
        let _ = self.tx.send(write);
    }
}

/// Create the write-back channel. The receiver side belongs to the storage
/// backend owner.
pub fn db_update_channel() -> (DbUpdateQueue, Receiver<DbWrite>) {
    let (tx, rx) = mpsc::channel();
    (DbUpdateQueue { tx }, rx)
}

/// Reads and record-level writes the schedulers need. Implementations own
/// their own locking; every method is a single transactional touch.
pub trait ScanStorage: Send + Sync {
    /// Scan rows whose cell lies within the hex around `origin`.
    fn scanned_in_hex(
        &self,
        origin: Location,
        ring_limit: u32,
        step_distance_km: f64,
    ) -> Vec<ScannedLocation>;

    /// The scan row for one cell, if it exists.
    fn scanned(&self, cell: CellIndex) -> Option<ScannedLocation>;

    /// Total bands filled across the given cells.
    fn bands_filled(&self, cells: &[CellIndex]) -> usize;

    /// Spawn points within the hex around `origin`.
    fn spawnpoints_in_hex(
        &self,
        origin: Location,
        ring_limit: u32,
        step_distance_km: f64,
    ) -> Vec<SpawnPoint>;

    /// Spawn-point coordinates within a `(south, west, north, east)` box.
    fn spawnpoints_in_bounds(&self, s: f64, w: f64, n: f64, e: f64) -> Vec<Location>;

    /// Spawn points with appearance times, for `SpawnScan`.
    fn spawnpoint_times_in_hex(
        &self,
        origin: Location,
        ring_limit: u32,
        step_distance_km: f64,
    ) -> Vec<SpawnTimeEntry>;

    /// Spawn points linked to a scan cell.
    fn linked_spawnpoints(&self, cell: CellIndex) -> Vec<SpawnPoint>;

    /// Record a successful band scan for a cell.
    fn fill_band(&self, cell: CellIndex, now_secs: u32);

    /// A spawn point was observed present at `now_secs`.
    fn record_seen(&self, sp_id: &str, now_secs: u32);

    /// A targeted spawn point was observed absent at `now_secs`.
    fn record_unseen(&self, sp_id: &str, now_secs: u32);

    /// A targeted spawn point was expected but missing.
    fn add_missed(&self, sp_id: &str);

    /// Apply a bulk write from the [`DbUpdateQueue`].
    fn apply(&self, write: DbWrite);
}

#[derive(Debug, Default)]
struct MemoryInner {
    scans: HashMap<u64, ScannedLocation>,
    spawnpoints: BTreeMap<SpawnPointId, SpawnPoint>,
    links: HashMap<u64, Vec<SpawnPointId>>,
}

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_spawnpoint(&self, sp: SpawnPoint) {
        let mut inner = self.lock();
        inner.spawnpoints.insert(sp.id.clone(), sp);
    }

    pub fn insert_scanned(&self, row: ScannedLocation) {
        let mut inner = self.lock();
        inner.scans.insert(row.cellid, row);
    }

    pub fn spawnpoint(&self, sp_id: &str) -> Option<SpawnPoint> {
        self.lock().spawnpoints.get(sp_id).cloned()
    }

    /// Drain every pending write from the channel into this backend.
    pub fn drain(&self, rx: &Receiver<DbWrite>) {
        while let Ok(write) = rx.try_recv() {
            self.apply(write);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("storage lock poisoned")
    }

    fn in_box(loc: Location, s: f64, w: f64, n: f64, e: f64) -> bool {
        loc.lat >= s && loc.lat <= n && loc.lng >= w && loc.lng <= e
    }
}

impl ScanStorage for MemoryStorage {
    fn scanned_in_hex(
        &self,
        origin: Location,
        ring_limit: u32,
        step_distance_km: f64,
    ) -> Vec<ScannedLocation> {
        let (n, e, s, w) = hex_bounds(origin, ring_limit, step_distance_km);
        let inner = self.lock();
        inner
            .scans
            .values()
            .filter(|row| Self::in_box(row.loc, s, w, n, e))
            .cloned()
            .collect()
    }

    fn scanned(&self, cell: CellIndex) -> Option<ScannedLocation> {
        self.lock().scans.get(&u64::from(cell)).cloned()
    }

    fn bands_filled(&self, cells: &[CellIndex]) -> usize {
        let inner = self.lock();
        cells
            .iter()
            .filter_map(|cell| inner.scans.get(&u64::from(*cell)))
            .map(ScannedLocation::bands_filled)
            .sum()
    }

    fn spawnpoints_in_hex(
        &self,
        origin: Location,
        ring_limit: u32,
        step_distance_km: f64,
    ) -> Vec<SpawnPoint> {
        let (n, e, s, w) = hex_bounds(origin, ring_limit, step_distance_km);
        let inner = self.lock();
        inner
            .spawnpoints
            .values()
            .filter(|sp| Self::in_box(sp.loc, s, w, n, e))
            .cloned()
            .collect()
    }

    fn spawnpoints_in_bounds(&self, s: f64, w: f64, n: f64, e: f64) -> Vec<Location> {
        let inner = self.lock();
        inner
            .spawnpoints
            .values()
            .filter(|sp| Self::in_box(sp.loc, s, w, n, e))
            .map(|sp| sp.loc)
            .collect()
    }

    fn spawnpoint_times_in_hex(
        &self,
        origin: Location,
        ring_limit: u32,
        step_distance_km: f64,
    ) -> Vec<SpawnTimeEntry> {
        self.spawnpoints_in_hex(origin, ring_limit, step_distance_km)
            .into_iter()
            .map(|sp| SpawnTimeEntry {
                lat: sp.loc.lat,
                lng: sp.loc.lng,
                time: sp.appearance_secs(),
                spawnpoint_id: sp.id,
            })
            .collect()
    }

    fn linked_spawnpoints(&self, cell: CellIndex) -> Vec<SpawnPoint> {
        let inner = self.lock();
        inner
            .links
            .get(&u64::from(cell))
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.spawnpoints.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn fill_band(&self, cell: CellIndex, now_secs: u32) {
        let mut inner = self.lock();
        if let Some(row) = inner.scans.get_mut(&u64::from(cell)) {
            row.fill_band(now_secs);
        }
    }

    fn record_seen(&self, sp_id: &str, now_secs: u32) {
        let mut inner = self.lock();
        if let Some(sp) = inner.spawnpoints.get_mut(sp_id) {
            sp.record_seen(now_secs);
        }
    }

    fn record_unseen(&self, sp_id: &str, now_secs: u32) {
        let mut inner = self.lock();
        if let Some(sp) = inner.spawnpoints.get_mut(sp_id) {
            sp.record_unseen(now_secs);
        }
    }

    fn add_missed(&self, sp_id: &str) {
        let mut inner = self.lock();
        if let Some(sp) = inner.spawnpoints.get_mut(sp_id) {
            sp.missed_count += 1;
        }
    }

    fn apply(&self, write: DbWrite) {
        let mut inner = self.lock();
        match write {
            DbWrite::ScannedLocations(rows) => {
                for row in rows {
                    // Never clobber band progress with a fresh row.
                    inner.scans.entry(row.cellid).or_insert(row);
                }
            }
            DbWrite::ScanSpawnPoints(links) => {
                for link in links {
                    let ids = inner.links.entry(link.cellid).or_default();
                    if !ids.contains(&link.sp_id) {
                        ids.push(link.sp_id);
                    }
                }
            }
        }
    }
}

/// Convenience for tests: the cell id of a location as used by the link map.
pub fn cell_key(loc: Location) -> CellIndex {
    cell_id(loc)
}
