//! Hex strategy restricted to cells with a known spawn point in range.
//!
//! Useful once an area has been learned: cells whose center has no spawn
//! point within 70 m will never produce a sighting, so they are dropped
//! from the schedule entirely.

use std::collections::VecDeque;
use std::sync::Arc;

use log::warn;

use crate::clock::TimeSource;
use crate::config::ScanParams;
use crate::elevation::ElevationCache;
use crate::items::{ParsedScan, SearchItem, WorkerStatus};
use crate::model::Location;
use crate::spatial::{haversine_distance, hex_bounds};
use crate::storage::ScanStorage;

use super::hex_search::generate_hex_items;
use super::{pop_search_item, search_queue_message, NextItem, Scheduler};

/// Maximum distance from a cell center to a spawn point for the cell to be
/// worth scanning (km).
const SPAWNPOINT_RANGE_KM: f64 = 0.070;

pub struct HexSearchSpawnpoint {
    params: ScanParams,
    clock: Arc<dyn TimeSource>,
    storage: Arc<dyn ScanStorage>,
    elevation: ElevationCache,
    origin: Option<Location>,
    locations: Option<Vec<SearchItem>>,
    queue: VecDeque<SearchItem>,
    size: usize,
    ready: bool,
}

impl HexSearchSpawnpoint {
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
            locations: None,
            queue: VecDeque::new(),
            size: 0,
            ready: false,
        }
    }

    fn any_spawnpoint_in_range(loc: Location, spawnpoints: &[Location]) -> bool {
        spawnpoints
            .iter()
            .any(|sp| haversine_distance(loc, *sp) <= SPAWNPOINT_RANGE_KM)
    }

    fn generate_locations(&mut self, origin: Location) -> Vec<SearchItem> {
        let (n, e, s, w) = hex_bounds(origin, self.params.step_limit, self.params.step_distance_km());
        let spawnpoints = self.storage.spawnpoints_in_bounds(s, w, n, e);

        if spawnpoints.is_empty() {
            warn!(
                "No spawnpoints found in the specified area! \
                 (Did you forget to run a normal scan in this area first?)"
            );
        }

        let mut items = generate_hex_items(&self.params, &mut self.elevation, origin);
        items.retain(|item| Self::any_spawnpoint_in_range(item.loc, &spawnpoints));
        items
    }
}

impl Scheduler for HexSearchSpawnpoint {
    fn schedule(&mut self) {
        let Some(origin) = self.origin else {
            warn!("Cannot schedule work until scan location has been set");
            return;
        };

        if self.locations.is_none() {
            self.locations = Some(self.generate_locations(origin));
        }

        let locations = self.locations.as_ref().expect("locations just generated");
        for item in locations {
            self.queue.push_back(item.clone());
        }
        self.size = locations.len();
        self.ready = true;
    }

    fn location_changed(&mut self, origin: Location) {
        self.origin = Some(origin);
        self.queue.clear();
        self.locations = None;
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
