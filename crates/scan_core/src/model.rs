//! Persistent record types: scan locations with hour bands, spawn points
//! with their transition windows, and the cell-to-spawn link table.
//!
//! The scheduler treats storage engines as opaque, but the time algebra on
//! the records lives here:
//!
//! - **Bands**: each cell samples five ~12-minute bands per hour. The first
//!   successful scan anchors the cell's phase; the remaining bands open at
//!   `base + k*720` seconds with a ±120 s claim radius.
//! - **TTH windows**: a spawn point's hidden transition time lies in
//!   `(latest_seen, earliest_unseen]` modulo the hour. Sightings and
//!   absences inside the window shrink it monotonically until both ends
//!   meet and the exact second is known.
//!
//! Window `start`/`end` values returned from `get_times`-style methods are
//! on the refresh-epoch timeline (seconds since the top of the refresh
//! hour) and roll into the next hour when already past.

use serde::{Deserialize, Serialize};

use crate::items::{ItemKind, QueueItem};
use crate::spatial::cell_id;

/// Number of sampling bands per hour.
pub const BAND_COUNT: usize = 5;

/// Seconds between band centers (3600 / 5).
pub const BAND_SPACING_SECS: i64 = 720;

/// Claim radius around a band center, seconds.
pub const BAND_RADIUS_SECS: i64 = 120;

/// Seconds a spawn stays visible after appearing.
pub const SPAWN_DURATION_SECS: i64 = 900;

/// Misses after which a spawn point is considered inactive.
pub const MAX_MISSED: u32 = 5;

/// Identifier a storage backend assigns to a spawn point.
pub type SpawnPointId = String;

/// A latitude/longitude pair with an optional altitude in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub alt: Option<f64>,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            alt: None,
        }
    }

    pub fn with_alt(lat: f64, lng: f64, alt: f64) -> Self {
        Self {
            lat,
            lng,
            alt: Some(alt),
        }
    }
}

/// A cell of the coverage set paired with its stable step index.
#[derive(Debug, Clone, Copy)]
pub struct CellScan {
    pub loc: Location,
    pub step: usize,
}

/// Per-cell band record. `bands[k]` holds the second-within-hour at which
/// band `k` was filled, or -1 while unfilled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannedLocation {
    pub cellid: u64,
    pub loc: Location,
    pub bands: [i32; BAND_COUNT],
}

impl ScannedLocation {
    /// Fresh record with no bands filled.
    pub fn new_loc(loc: Location) -> Self {
        Self {
            cellid: u64::from(cell_id(loc)),
            loc,
            bands: [-1; BAND_COUNT],
        }
    }

    pub fn bands_filled(&self) -> usize {
        self.bands.iter().filter(|b| **b >= 0).count()
    }

    /// All five bands sampled; the cell needs no more initial coverage.
    pub fn initial_complete(&self) -> bool {
        self.bands_filled() == BAND_COUNT
    }

    /// Record a successful band scan at `now_secs` (seconds within the hour).
    ///
    /// The first fill anchors the cell's phase in band 0; later fills land in
    /// the nearest band slot relative to that anchor. Filling an
    /// already-filled slot is a no-op.
    pub fn fill_band(&mut self, now_secs: u32) {
        let now = now_secs as i64;
        if self.bands[0] < 0 {
            self.bands[0] = now as i32;
            return;
        }
        let base = self.bands[0] as i64;
        let offset = (now - base).rem_euclid(3600);
        let slot = (((offset + BAND_SPACING_SECS / 2) / BAND_SPACING_SECS) as usize) % BAND_COUNT;
        if self.bands[slot] < 0 {
            self.bands[slot] = now as i32;
        }
    }

    /// Band queue items still due for this cell within the current refresh
    /// epoch. `now_secs` is the refresh time as seconds within the hour.
    pub fn get_times(&self, step: usize, now_secs: u32) -> Vec<QueueItem> {
        if self.initial_complete() {
            return Vec::new();
        }

        let now = now_secs as i64;
        if self.bands[0] < 0 {
            // Unanchored cell: the first band can be sampled at any time
            // during the hour. The wide window also drives band pacing.
            return vec![QueueItem::new(
                step,
                ItemKind::Band,
                self.loc,
                now as u32,
                (now + 3599) as u32,
                None,
            )];
        }

        let base = self.bands[0] as i64;
        let mut items = Vec::new();
        for (slot, filled) in self.bands.iter().enumerate().skip(1) {
            if *filled >= 0 {
                continue;
            }
            let center = (base + slot as i64 * BAND_SPACING_SECS).rem_euclid(3600);
            let mut start = center - BAND_RADIUS_SECS;
            let mut end = center + BAND_RADIUS_SECS;
            if start < 0 {
                start += 3600;
                end += 3600;
            }
            // Window already past: next occurrence is an hour later.
            while end < now + 10 {
                start += 3600;
                end += 3600;
            }
            items.push(QueueItem::new(
                step,
                ItemKind::Band,
                self.loc,
                start as u32,
                end as u32,
                None,
            ));
        }
        items
    }
}

/// A learned spawn point and the evidence about its transition time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub id: SpawnPointId,
    pub loc: Location,
    /// Earliest second-within-hour at which the spawn was observed absent.
    pub earliest_unseen: u32,
    /// Latest second-within-hour at which the spawn was observed present.
    pub latest_seen: u32,
    /// Duration-pattern classification assigned by the storage layer.
    pub kind: String,
    /// Consecutive times the spawn was expected but not observed.
    pub missed_count: u32,
}

impl SpawnPoint {
    /// Spawn point with an open transition window `(latest_seen, earliest_unseen]`.
    pub fn with_window(
        id: impl Into<SpawnPointId>,
        loc: Location,
        latest_seen: u32,
        earliest_unseen: u32,
    ) -> Self {
        Self {
            id: id.into(),
            loc,
            earliest_unseen,
            latest_seen,
            kind: "standard".to_string(),
            missed_count: 0,
        }
    }

    /// Spawn point whose transition second is fully determined.
    pub fn with_tth(id: impl Into<SpawnPointId>, loc: Location, tth: u32) -> Self {
        Self::with_window(id, loc, tth, tth)
    }

    /// Both window ends met; the transition second is known exactly.
    pub fn tth_known(&self) -> bool {
        self.earliest_unseen == self.latest_seen
    }

    /// Width of the remaining transition window in seconds (0 when known).
    pub fn tth_window_secs(&self) -> u32 {
        (self.earliest_unseen + 3600 - self.latest_seen) % 3600
    }

    /// Predicted second-within-hour at which the spawn becomes visible.
    pub fn appearance_secs(&self) -> u32 {
        ((self.earliest_unseen as i64 - SPAWN_DURATION_SECS).rem_euclid(3600)) as u32
    }

    /// Spawn points missed too often are excluded from scheduling.
    pub fn active(&self) -> bool {
        self.missed_count <= MAX_MISSED
    }

    fn in_window(&self, secs: u32) -> bool {
        let width = self.tth_window_secs();
        if width == 0 {
            return false;
        }
        let offset = (secs + 3600 - self.latest_seen) % 3600;
        offset > 0 && offset <= width
    }

    /// The spawn was observed present at `secs`; the window can only shrink.
    pub fn record_seen(&mut self, secs: u32) {
        if self.in_window(secs) {
            self.latest_seen = secs;
        }
        self.missed_count = 0;
    }

    /// The spawn was observed absent at `secs` while inside the window.
    pub fn record_unseen(&mut self, secs: u32) {
        if self.in_window(secs) {
            self.earliest_unseen = secs;
        }
    }

    /// The queue item targeting this spawn point for the current refresh
    /// epoch, aimed at the given cell. `now_secs` is the refresh time as
    /// seconds within the hour.
    pub fn queue_item(
        &self,
        step: usize,
        cell_loc: Location,
        now_secs: u32,
        spawn_delay: u64,
    ) -> Option<QueueItem> {
        if !self.active() {
            return None;
        }

        let now = now_secs as i64;
        let (kind, mut start, mut end) = if self.tth_known() {
            // Full visibility window, opened a safety margin before the
            // predicted appearance.
            let appearance = self.appearance_secs() as i64;
            (
                ItemKind::Spawn,
                appearance - spawn_delay as i64,
                appearance + SPAWN_DURATION_SECS,
            )
        } else {
            // Probe anywhere inside the open window to bisect it.
            let start = self.latest_seen as i64;
            (ItemKind::Tth, start, start + self.tth_window_secs() as i64)
        };

        if start < 0 {
            start += 3600;
            end += 3600;
        }
        while end < now + 10 {
            start += 3600;
            end += 3600;
        }

        Some(QueueItem::new(
            step,
            kind,
            cell_loc,
            start as u32,
            end as u32,
            Some(self.id.clone()),
        ))
    }
}

/// Cell-to-spawn-point association row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSpawnPoint {
    pub cellid: u64,
    pub sp_id: SpawnPointId,
}

/// Associate every spawn point with the coverage cells whose center lies
/// within the step distance. Appends one link row per association.
pub fn link_spawn_points(
    scans: &std::collections::BTreeMap<h3o::CellIndex, CellScan>,
    spawnpoints: &[SpawnPoint],
    step_distance_km: f64,
    out_links: &mut Vec<ScanSpawnPoint>,
) {
    use crate::spatial::equi_rect_distance;

    for sp in spawnpoints {
        for (cell, scan) in scans {
            if equi_rect_distance(sp.loc, scan.loc) <= step_distance_km {
                out_links.push(ScanSpawnPoint {
                    cellid: u64::from(*cell),
                    sp_id: sp.id.clone(),
                });
            }
        }
    }
}
