//! Queue items and the worker-facing records exchanged through the
//! scheduler contract.
//!
//! Two item shapes exist. The simple strategies (`HexSearch`,
//! `HexSearchSpawnpoint`, `SpawnScan`) enqueue [`SearchItem`]s with
//! wall-clock appear/leave timestamps. `SpeedScan` builds [`QueueItem`]s
//! whose `start`/`end` live on the refresh-epoch timeline (seconds since the
//! top of the hour of the last queue refresh, so values may exceed 3600 for
//! next-hour windows).

use crate::model::{Location, SpawnPointId};

/// What a `SpeedScan` queue item is trying to accomplish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// Initial coverage sample; fills one of the cell's five hour bands.
    Band,
    /// Re-observation of a spawn point whose appearance time is known.
    Spawn,
    /// Probe that shrinks a spawn point's unknown transition window.
    Tth,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::Band => write!(f, "band"),
            ItemKind::Spawn => write!(f, "spawn"),
            ItemKind::Tth => write!(f, "TTH"),
        }
    }
}

/// Lifecycle of a queue item within one refresh cycle.
///
/// Replaces the original's single field that overloaded strings and numbers:
/// a claim marks the item `Scanned`, a successful acknowledge upgrades it to
/// `Completed` with the observed start delay, and a `bad_scan` acknowledge
/// flips it back to `Pending` in place so no re-sorting is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    /// The window closed before any worker could claim the item.
    Missed,
    /// Claimed by a worker (or consumed by another worker's observation).
    Scanned,
    /// Acknowledged; carries the delay in seconds past the item's ready time.
    Completed(i64),
}

impl ItemState {
    pub fn is_pending(self) -> bool {
        matches!(self, ItemState::Pending)
    }
}

/// One unit of `SpeedScan` work. `start < end` always holds; the queue is
/// kept sorted by `start`.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub step: usize,
    pub kind: ItemKind,
    pub loc: Location,
    /// Seconds since the top of the refresh hour at which the item is ripe.
    pub start: u32,
    /// Seconds since the top of the refresh hour at which the window closes.
    pub end: u32,
    /// Target spawn point; present iff `kind` is `Spawn` or `Tth`.
    pub sp: Option<SpawnPointId>,
    pub state: ItemState,
}

impl QueueItem {
    pub fn new(
        step: usize,
        kind: ItemKind,
        loc: Location,
        start: u32,
        end: u32,
        sp: Option<SpawnPointId>,
    ) -> Self {
        debug_assert!(start < end, "queue item window must be non-empty");
        Self {
            step,
            kind,
            loc,
            start,
            end,
            sp,
            state: ItemState::Pending,
        }
    }

    /// Seconds the item stays claimable.
    pub fn duration(&self) -> u32 {
        self.end - self.start
    }
}

/// One unit of work for the simple strategies. `appears`/`leaves` are unix
/// seconds; both zero means "no time constraint".
#[derive(Debug, Clone)]
pub struct SearchItem {
    pub step: usize,
    pub loc: Location,
    pub appears: u64,
    pub leaves: u64,
}

/// Worker state consumed by `next_item` / `task_done`. Owned by the worker;
/// the scheduler only records the claimed queue index on it.
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub latitude: f64,
    pub longitude: f64,
    /// Unix seconds of the worker's last completed scan.
    pub last_scan_date: u64,
    /// Index of the currently claimed `SpeedScan` queue item, if any.
    /// Only meaningful within the refresh epoch in which it was issued.
    pub index_of_queue_item: Option<usize>,
}

impl WorkerStatus {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Self::default()
        }
    }

    pub fn location(&self) -> Location {
        Location::new(self.latitude, self.longitude)
    }
}

/// Result of a worker's scan, fed back through `task_done`.
#[derive(Debug, Clone, Default)]
pub struct ParsedScan {
    /// Spawn points observed during the scan.
    pub sp_id_list: std::collections::HashSet<SpawnPointId>,
    /// True when the upstream returned an empty/invalid response; the item
    /// is requeued.
    pub bad_scan: bool,
}

impl ParsedScan {
    pub fn bad() -> Self {
        Self {
            bad_scan: true,
            ..Self::default()
        }
    }

    pub fn seen<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SpawnPointId>,
    {
        Self {
            sp_id_list: ids.into_iter().map(Into::into).collect(),
            bad_scan: false,
        }
    }
}

/// Human-readable strings the dispatcher selects from depending on the
/// outcome of a claim. Always fully populated; the sentinel path carries the
/// reason in `wait`.
#[derive(Debug, Clone)]
pub struct ScanMessages {
    pub wait: String,
    pub early: String,
    pub late: String,
    pub search: String,
    pub invalid: String,
}

impl ScanMessages {
    /// Messages for a claimed [`SearchItem`], keyed by location.
    pub fn for_location(loc: Location, remain_secs: i64) -> Self {
        Self {
            wait: "Waiting for item from queue".to_string(),
            early: format!(
                "Early for {:.6},{:.6}; waiting {}s...",
                loc.lat, loc.lng, remain_secs
            ),
            late: format!("Too late for location {:.6},{:.6}; skipping", loc.lat, loc.lng),
            search: format!("Searching at {:.6},{:.6}", loc.lat, loc.lng),
            invalid: format!(
                "Invalid response at {:.6},{:.6}, abandoning location",
                loc.lat, loc.lng
            ),
        }
    }

    /// Messages for a `SpeedScan` claim, keyed by step number.
    pub fn for_step(step: usize, late_by_secs: i64) -> Self {
        Self {
            wait: "Nothing to scan".to_string(),
            early: format!("Early for step {step}; waiting a few seconds..."),
            late: format!(
                "API response on step {step} delayed by {late_by_secs} seconds. \
                 Possible causes: slow proxies, internet, or upstream servers"
            ),
            search: format!("Searching at step {step}"),
            invalid: format!("Invalid response at step {step}, abandoning location"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_state_pending_check() {
        assert!(ItemState::Pending.is_pending());
        assert!(!ItemState::Missed.is_pending());
        assert!(!ItemState::Scanned.is_pending());
        assert!(!ItemState::Completed(3).is_pending());
    }

    #[test]
    fn queue_item_duration() {
        let item = QueueItem::new(
            1,
            ItemKind::Band,
            Location::new(0.0, 0.0),
            100,
            340,
            None,
        );
        assert_eq!(item.duration(), 240);
    }
}
