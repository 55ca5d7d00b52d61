//! Shared setup for integration tests.

#![allow(dead_code)]

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use scan_core::clock::ManualClock;
use scan_core::config::ScanParams;
use scan_core::model::{Location, ScannedLocation, SpawnPoint};
use scan_core::scheduler::{Scheduler, SpeedScan};
use scan_core::storage::{db_update_channel, DbWrite, MemoryStorage, ScanStorage};
use scan_core::test_helpers::{test_clock, test_origin};

pub struct SpeedScanSetup {
    pub scheduler: SpeedScan,
    pub storage: Arc<MemoryStorage>,
    pub clock: Arc<ManualClock>,
    pub rx: Receiver<DbWrite>,
}

/// A `SpeedScan` over seeded storage, with the location already set and the
/// write-back channel drained so links and rows are visible.
pub fn speed_scan_setup(params: ScanParams, spawnpoints: Vec<SpawnPoint>) -> SpeedScanSetup {
    speed_scan_setup_at(params, spawnpoints, Vec::new(), test_origin())
}

pub fn speed_scan_setup_at(
    params: ScanParams,
    spawnpoints: Vec<SpawnPoint>,
    scanned_rows: Vec<ScannedLocation>,
    origin: Location,
) -> SpeedScanSetup {
    let clock = test_clock();
    let storage = Arc::new(MemoryStorage::new());
    for sp in spawnpoints {
        storage.insert_spawnpoint(sp);
    }
    for row in scanned_rows {
        storage.insert_scanned(row);
    }

    let (dbq, rx) = db_update_channel();
    let storage_dyn: Arc<dyn ScanStorage> = storage.clone();
    let mut scheduler = SpeedScan::new(params, clock.clone(), storage_dyn, dbq);
    scheduler.location_changed(origin);
    storage.drain(&rx);

    SpeedScanSetup {
        scheduler,
        storage,
        clock,
        rx,
    }
}

/// A scan row with all five bands already filled, so the cell contributes
/// no band items and targeted items stand alone.
pub fn completed_row(loc: Location) -> ScannedLocation {
    let mut row = ScannedLocation::new_loc(loc);
    row.bands = [10, 730, 1450, 2170, 2890];
    row
}
