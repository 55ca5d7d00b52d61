//! Dispatcher: the shared scheduler handle workers and the refresh thread
//! go through.
//!
//! One scheduler instance serves N worker threads plus one refresh thread.
//! A single lock covers all scheduler state; every operation inside it is
//! short and never blocks on I/O. Workers perform their actual scan
//! *outside* the lock, between `next_item` (claim) and `task_done` (ack).
//!
//! While a refresh is installing a new queue the scheduler reports not
//! `ready`; `next_item` then spin-waits with bounded one-second sleeps
//! (outside the lock) instead of surfacing an error to the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;

use crate::items::{ParsedScan, WorkerStatus};
use crate::model::Location;
use crate::scheduler::{NextItem, Scheduler};

/// Attempts to see `ready` before giving up and returning the sentinel.
const READY_WAIT_ATTEMPTS: u32 = 10;

/// Sleep between readiness checks.
const READY_POLL: Duration = Duration::from_secs(1);

/// Cloneable handle to the single scheduler instance.
#[derive(Clone)]
pub struct SharedScheduler {
    inner: Arc<Mutex<Box<dyn Scheduler>>>,
}

impl SharedScheduler {
    pub fn new(scheduler: Box<dyn Scheduler>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(scheduler)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Box<dyn Scheduler>> {
        self.inner.lock().expect("scheduler lock poisoned")
    }

    /// Claim the next item for a worker, waiting (bounded) through a
    /// concurrent refresh.
    pub fn next_item(&self, status: &mut WorkerStatus) -> NextItem {
        for _ in 0..READY_WAIT_ATTEMPTS {
            {
                let mut scheduler = self.lock();
                if scheduler.ready() {
                    return scheduler.next_item(status);
                }
            }
            thread::sleep(READY_POLL);
        }
        // Still refreshing; let the scheduler produce its sentinel.
        self.lock().next_item(status)
    }

    pub fn task_done(&self, status: &WorkerStatus, parsed: Option<&ParsedScan>) {
        self.lock().task_done(status, parsed);
    }

    pub fn schedule(&self) {
        self.lock().schedule();
    }

    pub fn location_changed(&self, origin: Location) {
        self.lock().location_changed(origin);
    }

    pub fn scanning_paused(&self) {
        self.lock().scanning_paused();
    }

    pub fn time_to_refresh_queue(&self) -> bool {
        self.lock().time_to_refresh_queue()
    }

    pub fn delay(&self, last_scan_date: u64) -> u64 {
        self.lock().delay(last_scan_date)
    }

    pub fn getsize(&self) -> usize {
        self.lock().getsize()
    }

    pub fn get_overseer_message(&self) -> String {
        self.lock().get_overseer_message()
    }
}

/// Run the refresh cycle until `stop` is set: whenever the scheduler says
/// it is time, rebuild the queue.
pub fn spawn_refresh_loop(
    scheduler: SharedScheduler,
    stop: Arc<AtomicBool>,
    poll: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            if scheduler.time_to_refresh_queue() {
                debug!("Refresh loop rebuilding the queue");
                scheduler.schedule();
            }
            thread::sleep(poll);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ScanParams;
    use crate::scheduler::{build_scheduler, SchedulerKind};
    use crate::storage::{db_update_channel, MemoryStorage};

    fn shared_hex_search() -> SharedScheduler {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let storage = Arc::new(MemoryStorage::new());
        let (dbq, _rx) = db_update_channel();
        let scheduler = build_scheduler(
            SchedulerKind::HexSearch,
            ScanParams::default().with_step_limit(2),
            clock,
            storage,
            dbq,
        );
        SharedScheduler::new(scheduler)
    }

    #[test]
    fn handle_round_trips_the_contract() {
        let shared = shared_hex_search();
        shared.location_changed(Location::new(52.52, 13.405));
        assert!(shared.time_to_refresh_queue());
        shared.schedule();
        assert_eq!(shared.getsize(), 7);

        let mut status = WorkerStatus::at(52.52, 13.405);
        let claim = shared.next_item(&mut status);
        assert!(!claim.is_idle());
        shared.task_done(&status, None);
    }

    #[test]
    fn refresh_loop_schedules_and_stops() {
        let shared = shared_hex_search();
        shared.location_changed(Location::new(52.52, 13.405));

        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_refresh_loop(shared.clone(), stop.clone(), Duration::from_millis(10));

        // The loop notices the empty queue and installs one.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while shared.getsize() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(shared.getsize(), 7);

        stop.store(true, Ordering::Relaxed);
        handle.join().expect("refresh loop joins");
    }
}
