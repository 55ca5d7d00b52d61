//! Refresh-cycle statistics for `SpeedScan`.
//!
//! On every queue refresh the previous queue is audited: how many bands were
//! filled, how many targeted spawns were found or missed, how the TTH search
//! is progressing. The report is written to the log and condensed into the
//! one-line overseer status. All arithmetic is guarded; a degenerate cycle
//! (empty queue, zero spawn points) must never prevent the new queue from
//! being installed.

use std::collections::HashMap;

use log::{info, warn};

use crate::items::{ItemKind, ItemState, QueueItem};
use crate::model::{SpawnPoint, SpawnPointId};

/// Counters and histories carried across refresh cycles.
#[derive(Debug, Default)]
pub struct SpeedStats {
    /// Targeted spawns found where expected, this cycle.
    pub spawns_found: usize,
    /// Per spawn point, the delays at which it was expected but absent.
    pub spawns_missed_delay: HashMap<SpawnPointId, Vec<i64>>,
    /// Successful scans this cycle.
    pub scans_done: usize,
    /// Cell ids of scans that returned bad data this cycle.
    pub scans_missed_list: Vec<u64>,
    /// Rolling history of spawns-found percentages.
    pub spawn_percent: Vec<f64>,
    /// Rolling history of good-scan percentages.
    pub scan_percent: Vec<f64>,
    /// Condensed status line for the overseer.
    pub status_message: String,
}

impl SpeedStats {
    /// Reset the per-cycle counters; histories and status survive.
    pub fn reset_cycle(&mut self) {
        self.spawns_found = 0;
        self.spawns_missed_delay.clear();
        self.scans_done = 0;
        self.scans_missed_list.clear();
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Most frequent values with counts, descending.
fn most_common(values: &[u64], n: usize) -> Vec<(u64, usize)> {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for v in values {
        *counts.entry(*v).or_insert(0) += 1;
    }
    let mut pairs: Vec<(u64, usize)> = counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    pairs.truncate(n);
    pairs
}

/// Audit the finished queue and the current spawn-point set; log the
/// performance report, update histories, and produce the status line.
pub fn refresh_report(
    stats: &mut SpeedStats,
    old_queue: &[QueueItem],
    spawnpoints: &[SpawnPoint],
    band_percent: f64,
    minutes: u64,
    workers: usize,
) {
    if old_queue.is_empty() {
        return;
    }

    let resolved: Vec<&QueueItem> = old_queue
        .iter()
        .filter(|item| !item.state.is_pending())
        .collect();
    let timed: Vec<&QueueItem> = resolved
        .iter()
        .copied()
        .filter(|item| matches!(item.state, ItemState::Completed(_)))
        .collect();

    let spawns_timed: Vec<&QueueItem> = timed
        .iter()
        .copied()
        .filter(|item| item.kind == ItemKind::Spawn)
        .collect();
    let bands_timed = timed
        .iter()
        .filter(|item| item.kind == ItemKind::Band)
        .count();
    let spawns_all = spawns_timed.len()
        + resolved
            .iter()
            .filter(|item| item.kind == ItemKind::Spawn && item.state == ItemState::Scanned)
            .count();
    let spawns_missed = resolved
        .iter()
        .filter(|item| item.kind == ItemKind::Spawn && item.state == ItemState::Missed)
        .count();

    // Spawn-point progress.
    let mut active_sp = 0usize;
    let mut tth_found = 0usize;
    let mut kinds: HashMap<String, usize> = HashMap::new();
    let mut tth_ranges: HashMap<u32, usize> = HashMap::new();
    for sp in spawnpoints {
        if !sp.active() {
            continue;
        }
        active_sp += 1;
        if sp.tth_known() {
            tth_found += 1;
        }
        *kinds.entry(sp.kind.clone()).or_insert(0) += 1;
        let range_min = ((sp.tth_window_secs() as f64) / 60.0).round() as u32;
        *tth_ranges.entry(range_min).or_insert(0) += 1;
    }
    // Spawn points with a known TTH all land in the 0-minute bucket; report
    // only the ones still being narrowed there.
    if let Some(zero) = tth_ranges.get_mut(&0) {
        *zero = zero.saturating_sub(tth_found);
    }

    let total_sp = spawnpoints.len();
    info!("Total spawn points found in hex: {total_sp}");
    info!(
        "Inactive spawn points found in hex: {} or {:.1}%",
        total_sp - active_sp,
        percent(total_sp - active_sp, total_sp)
    );
    info!(
        "Active spawn points found in hex: {} or {:.1}%",
        active_sp,
        percent(active_sp, total_sp)
    );
    let active_div = active_sp.max(1);
    let mut kind_names: Vec<&String> = kinds.keys().collect();
    kind_names.sort();
    for kind in kind_names {
        info!(
            "{kind} kind spawns: {} or {:.1}%",
            kinds[kind],
            percent(kinds[kind], active_div)
        );
    }
    info!(
        "Spawns with found TTH: {tth_found} or {:.1}%",
        percent(tth_found, active_div)
    );
    let mut ranges: Vec<(&u32, &usize)> = tth_ranges.iter().collect();
    ranges.sort_by_key(|(min, _)| **min);
    for (min, count) in ranges {
        info!("Spawnpoints with a {min}m range to find TTH: {count}");
    }

    info!(
        "Over last {minutes} minutes: {bands_timed} new bands, {spawns_all} spawns found"
    );
    info!(
        "Of the {spawns_all} total spawns, {} were targeted, and {} found scanning for others",
        spawns_timed.len(),
        spawns_all - spawns_timed.len()
    );
    let scan_total = spawns_timed.len() + bands_timed;
    let spm = scan_total as u64 / minutes.max(1);
    let seconds_per_scan = if scan_total > 0 {
        minutes * 60 * workers as u64 / scan_total as u64
    } else {
        0
    };
    info!(
        "{scan_total} scans over {minutes} minutes, {spm} scans per minute, \
         {seconds_per_scan} secs per scan per worker"
    );

    let mut spawns_reached = 100.0;
    if spawns_all + spawns_missed > 0 {
        spawns_reached = percent(spawns_all, spawns_all + spawns_missed);
        info!(
            "{spawns_all} spawns found, and {spawns_missed} were not reached in time \
             for {spawns_reached:.1}% found"
        );
    }

    let mut found_percent = 100.0;
    if !spawns_timed.is_empty() {
        let delay_sum: i64 = spawns_timed
            .iter()
            .map(|item| match item.state {
                ItemState::Completed(delay) => delay,
                _ => 0,
            })
            .sum();
        let average = delay_sum / spawns_timed.len() as i64;
        info!(
            "{spawns_all} spawns found, {} were targeted, with an average delay of {average} sec",
            spawns_timed.len()
        );

        let missed_when_expected: usize =
            stats.spawns_missed_delay.values().map(Vec::len).sum();
        let sum = missed_when_expected + stats.spawns_found;
        found_percent = percent(stats.spawns_found, sum);
        info!(
            "{} spawns scanned and {missed_when_expected} spawns were not there when expected \
             for {found_percent:.1}%",
            stats.spawns_found
        );
        stats.spawn_percent.push((found_percent * 10.0).round() / 10.0);
        if !stats.spawns_missed_delay.is_empty() {
            warn!(
                "Missed spawn IDs with times after spawn: {:?}",
                stats.spawns_missed_delay
            );
        }
        info!("Spawn history: {:?}", stats.spawn_percent);
    }

    // Unlike the spawn percentages, an idle cycle reports 0 here.
    let attempted = stats.scans_done + stats.scans_missed_list.len();
    let good_percent = percent(stats.scans_done, attempted);
    info!(
        "{} scans successful and {} scans missed for {good_percent:.1}% found",
        stats.scans_done,
        stats.scans_missed_list.len()
    );
    stats.scan_percent.push((good_percent * 10.0).round() / 10.0);
    if !stats.scans_missed_list.is_empty() {
        warn!(
            "Missed scans: {:?}",
            most_common(&stats.scans_missed_list, 3)
        );
        info!("Scan history: {:?}", stats.scan_percent);
    }

    stats.status_message = format!(
        "Initial scan: {band_percent:.2}%, TTH found: {:.2}%, Spawns reached: {spawns_reached:.2}%, \
         Spawns found: {found_percent:.2}%, Good scans {good_percent:.2}%",
        percent(tth_found, active_div)
    );
    stats.reset_cycle();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Location;

    fn item(kind: ItemKind, state: ItemState) -> QueueItem {
        let mut item = QueueItem::new(1, kind, Location::new(0.0, 0.0), 0, 100, None);
        item.state = state;
        item
    }

    #[test]
    fn empty_old_queue_changes_nothing() {
        let mut stats = SpeedStats::default();
        refresh_report(&mut stats, &[], &[], 0.0, 5, 1);
        assert!(stats.status_message.is_empty());
        assert!(stats.scan_percent.is_empty());
    }

    #[test]
    fn report_builds_status_message_and_resets_cycle() {
        let mut stats = SpeedStats {
            scans_done: 9,
            spawns_found: 3,
            ..Default::default()
        };
        stats.scans_missed_list.push(42);

        let old_queue = vec![
            item(ItemKind::Band, ItemState::Completed(5)),
            item(ItemKind::Spawn, ItemState::Completed(12)),
            item(ItemKind::Spawn, ItemState::Missed),
            item(ItemKind::Tth, ItemState::Pending),
        ];
        let spawnpoints = vec![
            SpawnPoint::with_tth("a", Location::new(0.0, 0.0), 900),
            SpawnPoint::with_window("b", Location::new(0.0, 0.0), 100, 400),
        ];

        refresh_report(&mut stats, &old_queue, &spawnpoints, 40.0, 5, 2);

        assert!(stats.status_message.contains("Initial scan: 40.00%"));
        assert!(stats.status_message.contains("TTH found: 50.00%"));
        assert!(stats.status_message.contains("Spawns reached: 50.00%"));
        assert!(stats.status_message.contains("Good scans 90.00%"));
        // Cycle counters reset, histories kept.
        assert_eq!(stats.scans_done, 0);
        assert!(stats.scans_missed_list.is_empty());
        assert_eq!(stats.scan_percent, vec![90.0]);
        assert_eq!(stats.spawn_percent, vec![100.0]);
    }

    #[test]
    fn zero_division_guards_hold() {
        let mut stats = SpeedStats::default();
        let old_queue = vec![item(ItemKind::Band, ItemState::Missed)];
        refresh_report(&mut stats, &old_queue, &[], 0.0, 5, 0);
        // An idle cycle reports zero good scans, not a healthy 100%.
        assert!(
            stats.status_message.contains("Good scans 0.00%"),
            "{}",
            stats.status_message
        );
        assert_eq!(stats.scan_percent, vec![0.0]);
        // The spawn percentages keep their gated 100% defaults.
        assert!(stats.status_message.contains("Spawns found: 100.00%"));
    }

    #[test]
    fn most_common_orders_by_count() {
        let values = [1, 2, 2, 3, 3, 3];
        let top = most_common(&values, 2);
        assert_eq!(top, vec![(3, 3), (2, 2)]);
    }
}
