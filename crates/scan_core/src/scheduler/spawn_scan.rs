//! Spawn-point strategy: visit each known spawn point just after it
//! appears, in order of next appearance.
//!
//! Spawn points come from a sidecar JSON file when configured, otherwise
//! from storage. Appearance times are seconds within the hour; the schedule
//! converts them to wall clock on every rebuild, so the queue must be
//! regenerated each cycle.

use std::collections::VecDeque;
use std::fs::File;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::clock::{secs_within_hour, TimeSource, HOUR_SECS};
use crate::config::ScanParams;
use crate::elevation::ElevationCache;
use crate::items::{ParsedScan, SearchItem, WorkerStatus};
use crate::model::{Location, SPAWN_DURATION_SECS};
use crate::storage::{ScanStorage, SpawnTimeEntry};

use super::{pop_search_item, search_queue_message, NextItem, Scheduler};

pub struct SpawnScan {
    params: ScanParams,
    clock: Arc<dyn TimeSource>,
    storage: Arc<dyn ScanStorage>,
    elevation: ElevationCache,
    origin: Option<Location>,
    queue: VecDeque<SearchItem>,
    size: usize,
    ready: bool,
}

impl SpawnScan {
    pub fn new(
        params: ScanParams,
        clock: Arc<dyn TimeSource>,
        storage: Arc<dyn ScanStorage>,
        elevation: ElevationCache,
    ) -> Self {
        Self {
            params,
            clock,
            storage,
            elevation,
            origin: None,
            queue: VecDeque::new(),
            size: 0,
            ready: false,
        }
    }

    fn load_spawnpoints(&self, origin: Location) -> Vec<SpawnTimeEntry> {
        if let Some(path) = &self.params.spawnpoint_file {
            debug!("Loading spawn points from json file @ {}", path.display());
            match File::open(path).map_err(|e| e.to_string()).and_then(|f| {
                serde_json::from_reader::<_, Vec<SpawnTimeEntry>>(f).map_err(|e| e.to_string())
            }) {
                Ok(entries) if !entries.is_empty() => return entries,
                Ok(_) => warn!("Spawn point file is empty; will fallback to storage"),
                Err(e) => error!("Error reading spawn point file: {e}; will fallback to storage"),
            }
        }

        debug!("Loading spawn points from storage");
        self.storage.spawnpoint_times_in_hex(
            origin,
            self.params.step_limit,
            self.params.step_distance_km(),
        )
    }

    fn generate_locations(&mut self, origin: Location) -> Vec<SearchItem> {
        let entries = self.load_spawnpoints(origin);
        info!("Total of {} spawns to track", entries.len());
        if entries.is_empty() {
            // An empty area is survivable; the next refresh tries again.
            warn!("No spawn points available to scan");
            return Vec::new();
        }

        let now = self.clock.now();
        let now_sec = secs_within_hour(now) as u64;

        // Appearance as seconds within the hour -> next wall-clock instant.
        let mut timed: Vec<(u64, SpawnTimeEntry)> = entries
            .into_iter()
            .map(|entry| {
                let time = entry.time as u64;
                let appears = if time > now_sec {
                    now + (time - now_sec)
                } else {
                    now + HOUR_SECS - (now_sec - time)
                };
                (appears, entry)
            })
            .collect();

        timed.sort_by_key(|(appears, _)| *appears);

        timed
            .into_iter()
            .enumerate()
            .map(|(i, (appears, entry))| {
                let loc = Location::new(entry.lat, entry.lng);
                let alt = self.elevation.altitude_for(loc);
                SearchItem {
                    step: i + 1,
                    loc: Location::with_alt(entry.lat, entry.lng, alt),
                    appears,
                    leaves: appears + SPAWN_DURATION_SECS as u64,
                }
            })
            .collect()
    }
}

impl Scheduler for SpawnScan {
    fn schedule(&mut self) {
        let Some(origin) = self.origin else {
            warn!("Cannot schedule work until scan location has been set");
            return;
        };

        // Appearance times shift every hour; recompute on every rebuild.
        let locations = self.generate_locations(origin);
        for item in &locations {
            self.queue.push_back(item.clone());
        }
        self.size = locations.len();
        self.ready = true;
    }

    fn location_changed(&mut self, origin: Location) {
        self.origin = Some(origin);
        self.queue.clear();
        self.ready = false;
    }

    fn scanning_paused(&mut self) {
        self.queue.clear();
        self.ready = false;
    }

    fn time_to_refresh_queue(&self) -> bool {
        self.queue.is_empty()
    }

    fn ready(&self) -> bool {
        self.ready
    }

    fn next_item(&mut self, _status: &mut WorkerStatus) -> NextItem {
        pop_search_item(&mut self.queue, self.clock.now())
    }

    fn task_done(&mut self, _status: &WorkerStatus, _parsed: Option<&ParsedScan>) {}

    fn delay(&self, _last_scan_date: u64) -> u64 {
        self.params.scan_delay
    }

    fn getsize(&self) -> usize {
        self.size
    }

    fn get_overseer_message(&self) -> String {
        search_queue_message(self.queue.front(), self.clock.now())
    }
}
