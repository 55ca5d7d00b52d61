//! The full-area strategy: initial band coverage plus targeted spawn and
//! TTH re-observation, selected per worker under a movement-speed budget.
//!
//! Two loops run at once. Until a cell has all five of its hour bands
//! sampled, wide `band` items keep pulling workers across the area so every
//! spawn point is observed at least once per band. Once a spawn point's
//! window is (partially) known, narrow `spawn` and `TTH` items re-observe
//! it at exactly the right seconds. The queue is rebuilt every few minutes
//! against a fresh refresh epoch; items in between are claimed by score:
//! bands beat TTH probes beat spawns, and within a tier the nearest item
//! wins, because travel time is the scarce resource.

use std::collections::BTreeMap;
use std::sync::Arc;

use h3o::CellIndex;
use log::{debug, info, warn};

use crate::clock::{secs_within_hour, TimeSource};
use crate::config::ScanParams;
use crate::items::{ItemKind, ItemState, ParsedScan, QueueItem, ScanMessages, WorkerStatus};
use crate::model::{link_spawn_points, CellScan, Location, ScannedLocation, BAND_COUNT};
use crate::spatial::{cell_id, equi_rect_distance};
use crate::stats::{refresh_report, SpeedStats};
use crate::storage::{DbUpdateQueue, DbWrite, ScanStorage};

use super::{ClaimedScan, NextItem, Scheduler};

/// Scoring tiers: missing a band loses the whole hour's predictive value
/// for its cell, and narrowing a TTH improves every future prediction, so
/// both dominate plain spawn visits.
const BAND_SCORE: f64 = 1e12;
const TTH_SCORE: f64 = 1e6;
const SPAWN_SCORE: f64 = 1.0;

/// Band items wider than this drive the band pacing delay.
const WIDE_BAND_SECS: u32 = 5 * 60;

pub struct SpeedScan {
    params: ScanParams,
    clock: Arc<dyn TimeSource>,
    storage: Arc<dyn ScanStorage>,
    dbq: DbUpdateQueue,
    origin: Option<Location>,
    /// Stable-order cell centers; indices are step numbers.
    locations: Vec<Location>,
    /// Cell id -> center + step, in stable iteration order.
    scans: BTreeMap<CellIndex, CellScan>,
    queue: Vec<QueueItem>,
    ready: bool,
    /// Unix seconds of the last refresh (the refresh epoch).
    refresh_date: u64,
    /// Seconds within the hour at the refresh instant.
    refresh_ms: u32,
    /// Unix seconds before which no new band may be started.
    next_band_date: u64,
    /// Seconds between band starts, spreading fresh bands over the area.
    band_spacing: u64,
    stats: SpeedStats,
}

impl SpeedScan {
    pub fn new(
        params: ScanParams,
        clock: Arc<dyn TimeSource>,
        storage: Arc<dyn ScanStorage>,
        dbq: DbUpdateQueue,
    ) -> Self {
        // Start a day in the past so the first dispatcher poll refreshes.
        let stale = clock.now().saturating_sub(24 * 3600);
        Self {
            params,
            clock,
            storage,
            dbq,
            origin: None,
            locations: Vec::new(),
            scans: BTreeMap::new(),
            queue: Vec::new(),
            ready: false,
            refresh_date: stale,
            refresh_ms: 0,
            next_band_date: stale,
            band_spacing: 0,
            stats: SpeedStats::default(),
        }
    }

    /// Virtual clock for item windows: seconds since the top of the hour of
    /// the refresh epoch.
    fn epoch_secs(&self, now: u64) -> i64 {
        (now as i64 - self.refresh_date as i64) + self.refresh_ms as i64
    }

    fn cells(&self) -> Vec<CellIndex> {
        self.scans.keys().copied().collect()
    }

    /// Log initial-scan progress; returns the filled percentage.
    fn band_status(&self) -> f64 {
        let bands_total = self.locations.len() * BAND_COUNT;
        if bands_total == 0 {
            return 0.0;
        }
        let bands_filled = self.storage.bands_filled(&self.cells());
        let percent = bands_filled as f64 * 100.0 / bands_total as f64;
        if bands_filled == bands_total {
            info!("Initial spawnpoint scan is complete");
        } else {
            info!(
                "Initial spawnpoint scan, {bands_filled} of {bands_total} bands \
                 are done or {percent:.1}% complete"
            );
        }
        percent
    }

    /// Observed spawns consume matching pending items and update the
    /// spawn-point windows in storage.
    fn absorb_observations(&mut self, parsed: &ParsedScan, epoch_now: i64, now_secs: u32) {
        for sp_id in &parsed.sp_id_list {
            self.storage.record_seen(sp_id, now_secs);
            for item in &mut self.queue {
                if item.sp.as_ref() == Some(sp_id)
                    && item.state.is_pending()
                    && (item.start as i64) < epoch_now
                    && epoch_now < item.end as i64
                {
                    item.state = ItemState::Scanned;
                }
            }
        }
    }
}

impl Scheduler for SpeedScan {
    fn schedule(&mut self) {
        if self.origin.is_none() || self.scans.is_empty() {
            warn!("Cannot schedule work until scan location has been set");
            return;
        }

        info!("Refreshing queue");
        self.ready = false;
        let now = self.clock.now();
        self.refresh_date = now;
        self.refresh_ms = secs_within_hour(now);

        let old_queue = std::mem::take(&mut self.queue);
        let mut queue = Vec::new();
        for (cell, scan) in &self.scans {
            let record = self
                .storage
                .scanned(*cell)
                .unwrap_or_else(|| ScannedLocation::new_loc(scan.loc));
            queue.extend(record.get_times(scan.step, self.refresh_ms));
            for sp in self.storage.linked_spawnpoints(*cell) {
                if let Some(item) =
                    sp.queue_item(scan.step, scan.loc, self.refresh_ms, self.params.spawn_delay)
                {
                    queue.push(item);
                }
            }
        }
        queue.sort_by_key(|item| item.start);
        self.queue = queue;
        self.ready = true;
        info!("New queue created with {} entries", self.queue.len());

        // Performance report on the finished cycle. Runs after the new
        // queue is installed so a bad report can never stall scanning.
        let band_percent = self.band_status();
        let origin = self.origin.expect("checked above");
        let spawnpoints = self.storage.spawnpoints_in_hex(
            origin,
            self.params.step_limit,
            self.params.step_distance_km(),
        );
        refresh_report(
            &mut self.stats,
            &old_queue,
            &spawnpoints,
            band_percent,
            self.params.refresh_minutes,
            self.params.workers,
        );
    }

    fn location_changed(&mut self, origin: Location) {
        self.origin = Some(origin);
        self.queue.clear();
        self.ready = false;

        // Fixed locations: the stable spiral keeps step indices and cell
        // ids valid when the ring count grows later.
        self.locations = crate::grid::stable_spiral(
            origin,
            self.params.step_limit,
            self.params.step_distance_km(),
        );

        let existing: BTreeMap<u64, ScannedLocation> = self
            .storage
            .scanned_in_hex(origin, self.params.step_limit, self.params.step_distance_km())
            .into_iter()
            .map(|row| (row.cellid, row))
            .collect();

        let mut scans = BTreeMap::new();
        let mut initial = Vec::new();
        for (step, loc) in self.locations.iter().enumerate() {
            let cell = cell_id(*loc);
            scans.insert(cell, CellScan { loc: *loc, step });
            initial.push(
                existing
                    .get(&u64::from(cell))
                    .cloned()
                    .unwrap_or_else(|| ScannedLocation::new_loc(*loc)),
            );
        }
        self.scans = scans;
        self.dbq.put(DbWrite::ScannedLocations(initial));
        info!("{} steps created", self.scans.len());

        self.band_spacing = (10 * 60 / self.scans.len().max(1)) as u64;
        self.band_status();

        let spawnpoints = self.storage.spawnpoints_in_hex(
            origin,
            self.params.step_limit,
            self.params.step_distance_km(),
        );
        if spawnpoints.is_empty() {
            info!("No spawnpoints in hex found in storage. Doing initial scan.");
        }
        info!("Found {} spawn points within hex", spawnpoints.len());
        info!(
            "Doing {} distance calcs to assign {} spawn points to {} scans",
            spawnpoints.len() * self.scans.len(),
            spawnpoints.len(),
            self.scans.len()
        );

        let mut links = Vec::new();
        link_spawn_points(
            &self.scans,
            &spawnpoints,
            self.params.step_distance_km(),
            &mut links,
        );
        if links.is_empty() {
            info!("Spawn points assigned");
        } else {
            info!(
                "{} relations found between the spawn points and steps",
                links.len()
            );
            self.dbq.put(DbWrite::ScanSpawnPoints(links));
        }
    }

    fn scanning_paused(&mut self) {
        self.queue.clear();
        self.ready = false;
    }

    fn time_to_refresh_queue(&self) -> bool {
        self.clock.now().saturating_sub(self.refresh_date) > self.params.refresh_minutes * 60
            || self.queue.is_empty()
    }

    fn ready(&self) -> bool {
        self.ready
    }

    fn next_item(&mut self, status: &mut WorkerStatus) -> NextItem {
        // Never touch the queue mid-refresh; the dispatcher spin-waits on
        // `ready` and retries.
        if !self.ready {
            return NextItem::idle("Search aborting. Overseer refreshing queue.");
        }

        let now = self.clock.now();
        let ms = self.epoch_secs(now);
        let worker_loc = status.location();
        let kph = self.params.kph;

        let mut best: Option<(f64, usize)> = None;
        let mut cant_reach = false;
        let mut reviewed = 0usize;

        for (i, item) in self.queue.iter_mut().enumerate() {
            // Claimed or finished by another worker.
            if !item.state.is_pending() {
                continue;
            }

            // Window already closed: mark and move on.
            if ms > item.end as i64 {
                item.state = ItemState::Missed;
                continue;
            }

            // A fresh band was just started; hold all claims briefly to
            // space band starts across the area.
            if now < self.next_band_date {
                continue;
            }

            // Queue is start-sorted: nothing further is ripe yet.
            if ms < item.start as i64 {
                break;
            }

            let distance = equi_rect_distance(item.loc, worker_loc);
            let secs_to_arrival = distance / kph * 3600.0;

            // Unreachable before the window closes.
            if ms as f64 + secs_to_arrival > item.end as f64 {
                cant_reach = true;
                continue;
            }

            reviewed += 1;
            let base = match item.kind {
                ItemKind::Band => BAND_SCORE,
                ItemKind::Tth => TTH_SCORE,
                ItemKind::Spawn => SPAWN_SCORE,
            };
            let score = base / (distance + 0.01);
            if best.map_or(true, |(best_score, _)| score > best_score) {
                best = Some((score, i));
            }
        }
        debug!("Reviewed {reviewed} ripe scans");

        let Some((_, i)) = best else {
            return if cant_reach {
                NextItem::idle("Not able to reach any scan under the speed limit")
            } else {
                NextItem::idle("Nothing to scan")
            };
        };

        let (step, loc, kind) = {
            let item = &self.queue[i];
            (item.step, item.loc, item.kind)
        };
        let late_by = now as i64 - status.last_scan_date as i64;
        let mut messages = ScanMessages::for_step(step, late_by);

        // Movement budget: the worker may only have drifted as far as its
        // time since the last scan allows at the speed limit.
        let distance = equi_rect_distance(loc, worker_loc);
        let allowed_km = now.saturating_sub(status.last_scan_date) as f64 * kph / 3600.0;
        if distance > allowed_km {
            messages.wait = format!(
                "Moving {}m to step {step} for a {kind}",
                (distance * 1000.0) as i64
            );
            return NextItem::Idle(messages);
        }

        // Re-check the claim; another worker may have taken it.
        if !self.queue[i].state.is_pending() {
            messages.wait = format!("Skipping step {step}. Other worker already scanned.");
            return NextItem::Idle(messages);
        }

        // A fresh wide band: pace out the next band start.
        if kind == ItemKind::Band && self.queue[i].duration() > WIDE_BAND_SECS {
            self.next_band_date = now + self.band_spacing;
        }

        self.queue[i].state = ItemState::Scanned;
        status.index_of_queue_item = Some(i);

        messages.search = format!("Scanning step {step} for a {kind}");
        NextItem::Claim(ClaimedScan {
            step,
            loc,
            appears: 0,
            leaves: 0,
            messages,
        })
    }

    fn task_done(&mut self, status: &WorkerStatus, parsed: Option<&ParsedScan>) {
        let Some(parsed) = parsed else {
            return;
        };
        let Some(i) = status.index_of_queue_item else {
            return;
        };
        // The queue may have been refreshed or paused since the claim.
        if i >= self.queue.len() {
            return;
        }

        let now = self.clock.now();
        let now_secs = secs_within_hour(now);
        let epoch_now = self.epoch_secs(now);

        let (step, kind, loc, start, end, sp) = {
            let item = &self.queue[i];
            (
                item.step,
                item.kind,
                item.loc,
                item.start,
                item.end,
                item.sp.clone(),
            )
        };

        if parsed.bad_scan {
            // Requeue in place; the sorted position is unchanged.
            self.stats.scans_missed_list.push(u64::from(cell_id(loc)));
            self.queue[i].state = ItemState::Pending;
            info!("Putting back step {step} in queue");
            return;
        }

        let spawn_margin = if kind == ItemKind::Spawn {
            self.params.spawn_delay as i64
        } else {
            0
        };
        let start_delay = epoch_now - start as i64 - spawn_margin;
        let safety_buffer = end as i64 - epoch_now;
        if safety_buffer < 0 {
            warn!(
                "Too late by {} sec for a {kind} at step {step}",
                -safety_buffer
            );
        }

        self.stats.scans_done += 1;
        self.queue[i].state = ItemState::Completed(start_delay);

        match kind {
            ItemKind::Band => {
                self.storage.fill_band(cell_id(loc), now_secs);
            }
            ItemKind::Spawn => {
                if let Some(sp_id) = &sp {
                    if parsed.sp_id_list.contains(sp_id) {
                        self.stats.spawns_found += 1;
                    } else if start_delay > 0 {
                        // Expected but absent: remember the delay, count the
                        // miss, and leave the item resolved.
                        self.stats
                            .spawns_missed_delay
                            .entry(sp_id.clone())
                            .or_default()
                            .push(start_delay);
                        self.storage.add_missed(sp_id);
                        self.queue[i].state = ItemState::Scanned;
                    }
                }
            }
            ItemKind::Tth => {
                if let Some(sp_id) = &sp {
                    if !parsed.sp_id_list.contains(sp_id) {
                        // Absent inside the window: shrink it from above.
                        self.storage.record_unseen(sp_id, now_secs);
                    }
                }
            }
        }

        self.absorb_observations(parsed, epoch_now, now_secs);
    }

    fn delay(&self, last_scan_date: u64) -> u64 {
        let now = self.clock.now();
        let wait = last_scan_date as i64 + self.params.scan_delay as i64 - now as i64;
        wait.max(2) as u64
    }

    fn getsize(&self) -> usize {
        self.queue.len()
    }

    fn get_overseer_message(&self) -> String {
        let ms = self.epoch_secs(self.clock.now());
        let mut waiting = 0usize;
        let mut bands = 0usize;
        let mut tth = 0usize;
        let mut spawns = 0usize;

        for item in &self.queue {
            if !item.state.is_pending() {
                continue;
            }
            if ms > item.end as i64 {
                continue;
            }
            if ms < item.start as i64 {
                break;
            }
            waiting += 1;
            match item.kind {
                ItemKind::Band => bands += 1,
                ItemKind::Tth => tth += 1,
                ItemKind::Spawn => spawns += 1,
            }
        }

        let mut message = format!(
            "Scanning status: {waiting} total waiting, {bands} initial bands, \
             {tth} TTH searches, and {spawns} new spawns"
        );
        if !self.stats.status_message.is_empty() {
            message.push('\n');
            message.push_str(&self.stats.status_message);
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{db_update_channel, MemoryStorage};

    fn hour_start() -> u64 {
        1_700_000_000 / 3600 * 3600
    }

    fn speed_scan(
        params: ScanParams,
        clock: Arc<ManualClock>,
        storage: Arc<MemoryStorage>,
    ) -> (SpeedScan, std::sync::mpsc::Receiver<DbWrite>) {
        let (dbq, rx) = db_update_channel();
        (SpeedScan::new(params, clock, storage, dbq), rx)
    }

    #[test]
    fn schedule_before_location_is_a_warning_not_a_panic() {
        let clock = Arc::new(ManualClock::new(hour_start()));
        let storage = Arc::new(MemoryStorage::new());
        let (mut s, _rx) = speed_scan(ScanParams::default(), clock, storage);
        s.schedule();
        assert!(!s.ready());
        assert_eq!(s.getsize(), 0);
    }

    #[test]
    fn location_changed_writes_rows_and_sets_band_spacing() {
        let clock = Arc::new(ManualClock::new(hour_start()));
        let storage = Arc::new(MemoryStorage::new());
        let params = ScanParams::default().with_step_limit(2);
        let (mut s, rx) = speed_scan(params, clock, storage.clone());

        s.location_changed(Location::new(52.52, 13.405));
        storage.drain(&rx);

        assert_eq!(s.scans.len(), 7);
        assert_eq!(s.band_spacing, 600 / 7);
        // Every cell got an initial row.
        for cell in s.cells() {
            assert!(storage.scanned(cell).is_some());
        }
    }

    #[test]
    fn fresh_area_schedules_one_wide_band_per_cell() {
        let clock = Arc::new(ManualClock::new(hour_start()));
        let storage = Arc::new(MemoryStorage::new());
        let params = ScanParams::default().with_step_limit(2);
        let (mut s, rx) = speed_scan(params, clock, storage.clone());

        s.location_changed(Location::new(52.52, 13.405));
        storage.drain(&rx);
        s.schedule();

        assert!(s.ready());
        assert_eq!(s.getsize(), 7);
        assert!(s.queue.iter().all(|i| i.kind == ItemKind::Band));
        // Sorted by start.
        assert!(s.queue.windows(2).all(|w| w[0].start <= w[1].start));
    }

    #[test]
    fn delay_enforces_floor_of_two_seconds() {
        let clock = Arc::new(ManualClock::new(hour_start()));
        let storage = Arc::new(MemoryStorage::new());
        let (s, _rx) = speed_scan(
            ScanParams::default().with_scan_delay(10),
            clock.clone(),
            storage,
        );
        let now = clock.now();
        assert_eq!(s.delay(now), 10);
        assert_eq!(s.delay(now - 5), 5);
        assert_eq!(s.delay(now - 3600), 2);
    }

    fn inject_item(s: &mut SpeedScan, item: QueueItem) {
        s.queue.push(item);
        s.queue.sort_by_key(|i| i.start);
        s.ready = true;
    }

    /// Scheduler with an installed (empty) queue pinned to an epoch at the
    /// top of the hour, for direct queue-injection tests.
    fn pinned(clock: Arc<ManualClock>) -> SpeedScan {
        let storage = Arc::new(MemoryStorage::new());
        let (dbq, _rx) = db_update_channel();
        // Receiver dropped on purpose; these tests never touch storage.
        let mut s = SpeedScan::new(ScanParams::default(), clock.clone(), storage, dbq);
        s.refresh_date = clock.now();
        s.refresh_ms = secs_within_hour(clock.now());
        s.ready = true;
        s
    }

    #[test]
    fn expired_item_is_marked_missed_and_claim_idles() {
        let clock = Arc::new(ManualClock::new(hour_start()));
        let mut s = pinned(clock.clone());
        inject_item(
            &mut s,
            QueueItem::new(1, ItemKind::Band, Location::new(0.0, 0.0), 0, 60, None),
        );

        // ms = 120, past the item's end.
        clock.advance(120);
        let mut status = WorkerStatus::at(0.0, 0.0);
        status.last_scan_date = hour_start();
        let out = s.next_item(&mut status);
        let NextItem::Idle(messages) = out else {
            panic!("expected the sentinel");
        };
        assert_eq!(messages.wait, "Nothing to scan");
        assert_eq!(s.queue[0].state, ItemState::Missed);
    }

    #[test]
    fn unreachable_item_reports_the_speed_limit() {
        let clock = Arc::new(ManualClock::new(hour_start()));
        let mut s = pinned(clock.clone());
        s.params.kph = 10.0;
        // 1.11 km away but the window closes in 30 s: 400 s of travel needed.
        inject_item(
            &mut s,
            QueueItem::new(1, ItemKind::Spawn, Location::new(0.0, 0.01), 0, 30, Some("a".into())),
        );

        let mut status = WorkerStatus::at(0.0, 0.0);
        status.last_scan_date = hour_start() - 3600;
        let NextItem::Idle(messages) = s.next_item(&mut status) else {
            panic!("expected the sentinel");
        };
        assert_eq!(
            messages.wait,
            "Not able to reach any scan under the speed limit"
        );
        // Unreachable is not missed; the item stays pending for others.
        assert_eq!(s.queue[0].state, ItemState::Pending);
    }

    #[test]
    fn claimed_item_window_contains_the_virtual_clock() {
        let clock = Arc::new(ManualClock::new(hour_start()));
        let mut s = pinned(clock.clone());
        inject_item(
            &mut s,
            QueueItem::new(2, ItemKind::Spawn, Location::new(0.0, 0.0), 50, 950, Some("a".into())),
        );
        inject_item(
            &mut s,
            QueueItem::new(3, ItemKind::Spawn, Location::new(0.0, 0.0), 400, 1300, Some("b".into())),
        );

        clock.advance(100); // ms = 100: only the first item is ripe
        let mut status = WorkerStatus::at(0.0, 0.0);
        status.last_scan_date = hour_start() - 3600;
        let NextItem::Claim(claim) = s.next_item(&mut status) else {
            panic!("expected a claim");
        };
        assert_eq!(claim.step, 2);
        let item = &s.queue[status.index_of_queue_item.expect("claim index")];
        let ms = 100;
        assert!(item.start as i64 <= ms && ms <= item.end as i64);
        assert_eq!(item.state, ItemState::Scanned);
    }

    #[test]
    fn start_sorted_queue_breaks_early() {
        let clock = Arc::new(ManualClock::new(hour_start()));
        let mut s = pinned(clock.clone());
        inject_item(
            &mut s,
            QueueItem::new(1, ItemKind::Spawn, Location::new(0.0, 0.0), 500, 900, Some("a".into())),
        );

        // Nothing ripe yet at ms = 100.
        clock.advance(100);
        let mut status = WorkerStatus::at(0.0, 0.0);
        status.last_scan_date = hour_start() - 3600;
        assert!(s.next_item(&mut status).is_idle());
        assert_eq!(s.queue[0].state, ItemState::Pending);
    }

    #[test]
    fn schedule_twice_with_frozen_clock_builds_the_same_queue() {
        let clock = Arc::new(ManualClock::new(hour_start()));
        let storage = Arc::new(MemoryStorage::new());
        let params = ScanParams::default().with_step_limit(2);
        let (mut s, rx) = speed_scan(params, clock, storage.clone());
        s.location_changed(Location::new(52.52, 13.405));
        storage.drain(&rx);

        s.schedule();
        let first: Vec<_> = s
            .queue
            .iter()
            .map(|i| (i.step, i.kind, i.start, i.end))
            .collect();
        s.schedule();
        let second: Vec<_> = s
            .queue
            .iter()
            .map(|i| (i.step, i.kind, i.start, i.end))
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn not_ready_claim_is_a_sentinel_without_mutation() {
        let clock = Arc::new(ManualClock::new(hour_start()));
        let storage = Arc::new(MemoryStorage::new());
        let params = ScanParams::default().with_step_limit(2);
        let (mut s, rx) = speed_scan(params, clock, storage.clone());
        s.location_changed(Location::new(52.52, 13.405));
        storage.drain(&rx);
        s.schedule();
        s.ready = false;

        let mut status = WorkerStatus::at(52.52, 13.405);
        let out = s.next_item(&mut status);
        assert!(out.is_idle());
        assert!(s.queue.iter().all(|i| i.state.is_pending()));
        assert!(status.index_of_queue_item.is_none());
    }
}
