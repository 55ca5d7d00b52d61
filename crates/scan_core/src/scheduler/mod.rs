//! Scheduling strategies: the shared contract and the factory.
//!
//! Four strategies, selectable via [`SchedulerKind`]:
//!
//! - **`HexSearch`**: every cell of the hex, no time constraints.
//! - **`HexSearchSpawnpoint`**: hex cells that have a known spawn point
//!   within reach.
//! - **`SpawnScan`**: known spawn points at their appearance times.
//! - **`SpeedScan`**: band coverage plus targeted spawn/TTH work under a
//!   movement-speed budget.
//!
//! The dispatcher owns a single `Box<dyn Scheduler>` behind a lock; workers
//! interact only through `next_item` (claim) and `task_done` (acknowledge).
//! Scheduling hot paths never return errors — a claim that cannot be
//! served yields [`NextItem::Idle`] with the reason in `messages.wait`.
//! Only construction (an unknown strategy name) can fail.

pub mod hex_search;
pub mod hex_search_spawnpoint;
pub mod spawn_scan;
pub mod speed_scan;

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::TimeSource;
use crate::config::ScanParams;
use crate::elevation::{default_provider, ElevationCache, ElevationOptions};
use crate::items::{ParsedScan, ScanMessages, SearchItem, WorkerStatus};
use crate::model::Location;
use crate::storage::{DbUpdateQueue, ScanStorage};

pub use hex_search::HexSearch;
pub use hex_search_spawnpoint::HexSearchSpawnpoint;
pub use spawn_scan::SpawnScan;
pub use speed_scan::SpeedScan;

/// A successfully claimed unit of work.
#[derive(Debug, Clone)]
pub struct ClaimedScan {
    pub step: usize,
    pub loc: Location,
    /// Unix seconds the target appears; 0 = no constraint.
    pub appears: u64,
    /// Unix seconds the target leaves; 0 = no constraint.
    pub leaves: u64,
    pub messages: ScanMessages,
}

/// Outcome of a claim attempt. `Idle` is the sentinel: nothing to do right
/// now, with the reason in `messages.wait`.
#[derive(Debug, Clone)]
pub enum NextItem {
    Claim(ClaimedScan),
    Idle(ScanMessages),
}

impl NextItem {
    fn idle(wait: impl Into<String>) -> Self {
        let mut messages = ScanMessages::for_step(0, 0);
        messages.wait = wait.into();
        NextItem::Idle(messages)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, NextItem::Idle(_))
    }
}

/// Capability set shared by all strategies.
pub trait Scheduler: Send {
    /// Rebuild the queue from current state and storage. Idempotent.
    fn schedule(&mut self);

    /// The scan area moved; reset and regenerate locations.
    fn location_changed(&mut self, origin: Location);

    /// Drop all pending items. Safe to call repeatedly.
    fn scanning_paused(&mut self);

    /// Whether the dispatcher should call `schedule` now.
    fn time_to_refresh_queue(&self) -> bool;

    /// Queue installed and claimable. The dispatcher spin-waits on this
    /// rather than claiming during a refresh.
    fn ready(&self) -> bool;

    /// Atomically claim the next item for the calling worker.
    fn next_item(&mut self, status: &mut WorkerStatus) -> NextItem;

    /// Acknowledge a completed (or failed) scan.
    fn task_done(&mut self, status: &WorkerStatus, parsed: Option<&ParsedScan>);

    /// Minimum seconds the worker must wait after its last scan.
    fn delay(&self, last_scan_date: u64) -> u64;

    /// Queue size for telemetry.
    fn getsize(&self) -> usize;

    /// One-line status for the overseer display.
    fn get_overseer_message(&self) -> String;
}

/// Which strategy to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerKind {
    HexSearch,
    HexSearchSpawnpoint,
    SpawnScan,
    SpeedScan,
}

impl SchedulerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerKind::HexSearch => "hexsearch",
            SchedulerKind::HexSearchSpawnpoint => "hexsearchspawnpoint",
            SchedulerKind::SpawnScan => "spawnscan",
            SchedulerKind::SpeedScan => "speedscan",
        }
    }
}

/// Error building a scheduler.
#[derive(Debug)]
pub enum SchedulerError {
    /// The requested strategy name is not implemented.
    UnknownStrategy(String),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::UnknownStrategy(name) => {
                write!(f, "the requested scheduler '{name}' has not been implemented")
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl FromStr for SchedulerKind {
    type Err = SchedulerError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "hexsearch" => Ok(SchedulerKind::HexSearch),
            "hexsearchspawnpoint" => Ok(SchedulerKind::HexSearchSpawnpoint),
            "spawnscan" => Ok(SchedulerKind::SpawnScan),
            "speedscan" => Ok(SchedulerKind::SpeedScan),
            _ => Err(SchedulerError::UnknownStrategy(name.to_string())),
        }
    }
}

/// Build a concrete strategy.
pub fn build_scheduler(
    kind: SchedulerKind,
    params: ScanParams,
    clock: Arc<dyn TimeSource>,
    storage: Arc<dyn ScanStorage>,
    dbq: DbUpdateQueue,
) -> Box<dyn Scheduler> {
    let elevation = ElevationCache::new(
        default_provider(&params),
        ElevationOptions::from_params(&params),
    );
    match kind {
        SchedulerKind::HexSearch => Box::new(HexSearch::new(params, clock, elevation)),
        SchedulerKind::HexSearchSpawnpoint => {
            Box::new(HexSearchSpawnpoint::new(params, clock, storage, elevation))
        }
        SchedulerKind::SpawnScan => Box::new(SpawnScan::new(params, clock, storage, elevation)),
        SchedulerKind::SpeedScan => Box::new(SpeedScan::new(params, clock, storage, dbq)),
    }
}

/// Resolve a strategy by name (case-insensitive) and build it.
pub fn build_scheduler_by_name(
    name: &str,
    params: ScanParams,
    clock: Arc<dyn TimeSource>,
    storage: Arc<dyn ScanStorage>,
    dbq: DbUpdateQueue,
) -> Result<Box<dyn Scheduler>, SchedulerError> {
    let kind = name.parse::<SchedulerKind>()?;
    Ok(build_scheduler(kind, params, clock, storage, dbq))
}

/// FIFO claim shared by the simple strategies: pop the front item and build
/// the outcome messages around it.
pub(crate) fn pop_search_item(queue: &mut VecDeque<SearchItem>, now: u64) -> NextItem {
    let Some(item) = queue.pop_front() else {
        return NextItem::idle("Waiting for item from queue");
    };
    let remain = item.appears as i64 - now as i64 + 10;
    let messages = ScanMessages::for_location(item.loc, remain);
    NextItem::Claim(ClaimedScan {
        step: item.step,
        loc: item.loc,
        appears: item.appears,
        leaves: item.leaves,
        messages,
    })
}

/// Overseer line shared by the simple strategies.
pub(crate) fn search_queue_message(front: Option<&SearchItem>, now: u64) -> String {
    let Some(item) = front else {
        return "Search queue empty".to_string();
    };
    let mut message = format!(
        "Processing search queue, next item is {:.6},{:.6}",
        item.loc.lat, item.loc.lng
    );
    if item.appears > 0 {
        message.push_str(&format!(" @ {}", item.appears));
        if item.appears > now {
            message.push_str(&format!(" ({}s ahead)", item.appears - now));
        } else {
            message.push_str(&format!(" ({}s behind)", now - item.appears));
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!(
            "SpeedScan".parse::<SchedulerKind>().expect("kind"),
            SchedulerKind::SpeedScan
        );
        assert_eq!(
            "HEXSEARCH".parse::<SchedulerKind>().expect("kind"),
            SchedulerKind::HexSearch
        );
        assert_eq!(
            "hexsearchspawnpoint".parse::<SchedulerKind>().expect("kind"),
            SchedulerKind::HexSearchSpawnpoint
        );
    }

    #[test]
    fn unknown_strategy_is_a_construction_error() {
        let err = "bfs".parse::<SchedulerKind>().expect_err("must fail");
        let text = err.to_string();
        assert!(text.contains("bfs"));
        assert!(text.contains("not been implemented"));
    }

    #[test]
    fn pop_from_empty_queue_is_idle() {
        let mut queue = VecDeque::new();
        let out = pop_search_item(&mut queue, 1000);
        assert!(out.is_idle());
        if let NextItem::Idle(messages) = out {
            assert_eq!(messages.wait, "Waiting for item from queue");
        }
    }

    #[test]
    fn overseer_message_reports_time_offset() {
        let item = SearchItem {
            step: 1,
            loc: Location::new(1.0, 2.0),
            appears: 1500,
            leaves: 2400,
        };
        let ahead = search_queue_message(Some(&item), 1400);
        assert!(ahead.contains("(100s ahead)"), "{ahead}");
        let behind = search_queue_message(Some(&item), 1600);
        assert!(behind.contains("(100s behind)"), "{behind}");
    }
}
