//! The classic hex strategy: scan every cell of the coverage set, front to
//! back, with no timing constraints.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, warn};

use crate::clock::TimeSource;
use crate::config::ScanParams;
use crate::elevation::ElevationCache;
use crate::grid::hex_spiral;
use crate::items::{ParsedScan, SearchItem, WorkerStatus};
use crate::model::Location;

use super::{pop_search_item, search_queue_message, NextItem, Scheduler};

pub struct HexSearch {
    params: ScanParams,
    clock: Arc<dyn TimeSource>,
    elevation: ElevationCache,
    origin: Option<Location>,
    /// Generated items, cached until the next `location_changed`.
    locations: Option<Vec<SearchItem>>,
    queue: VecDeque<SearchItem>,
    size: usize,
    ready: bool,
}

impl HexSearch {
    pub fn new(params: ScanParams, clock: Arc<dyn TimeSource>, elevation: ElevationCache) -> Self {
        Self {
            params,
            clock,
            elevation,
            origin: None,
            locations: None,
            queue: VecDeque::new(),
            size: 0,
            ready: false,
        }
    }
}

/// Generate the hex items for an origin: spiral the cells, then attach a
/// jittered altitude to each. Shared with the spawnpoint-filtered variant.
pub(super) fn generate_hex_items(
    params: &ScanParams,
    elevation: &mut ElevationCache,
    origin: Location,
) -> Vec<SearchItem> {
    hex_spiral(origin, params.step_limit, params.step_distance_km())
        .into_iter()
        .enumerate()
        .map(|(i, loc)| {
            let alt = elevation.altitude_for(loc);
            SearchItem {
                step: i + 1,
                loc: Location::with_alt(loc.lat, loc.lng, alt),
                appears: 0,
                leaves: 0,
            }
        })
        .collect()
}

impl Scheduler for HexSearch {
    fn schedule(&mut self) {
        let Some(origin) = self.origin else {
            warn!("Cannot schedule work until scan location has been set");
            return;
        };

        if self.locations.is_none() {
            self.locations = Some(generate_hex_items(
                &self.params,
                &mut self.elevation,
                origin,
            ));
        }

        let locations = self.locations.as_ref().expect("locations just generated");
        for item in locations {
            debug!(
                "Added location step {} at {:.6},{:.6}",
                item.step, item.loc.lat, item.loc.lng
            );
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
