//! # Scan Scheduler Core
//!
//! Scheduling engine for a geographic polling system: decides which map
//! cells to query, in what order, and at what moment, so that a bounded
//! pool of workers observes as many time-limited spawns as possible inside
//! a hex-tiled region.
//!
//! ## Overview
//!
//! - **Hex coverage**: deterministic cell-center generation from an origin
//!   and a ring count, keyed by stable H3 cell ids
//! - **Strategies**: four schedulers behind one contract, from the plain
//!   hex sweep to the speed-budgeted `SpeedScan` engine
//! - **Band learning**: five sampling bands per cell per hour discover
//!   spawn points; targeted probes then pin down their timing
//! - **Dispatch**: a single locked scheduler instance shared by worker
//!   threads and a refresh thread; claims via `next_item`, acknowledgements
//!   via `task_done`
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scan_core::clock::SystemTimeSource;
//! use scan_core::config::ScanParams;
//! use scan_core::dispatch::SharedScheduler;
//! use scan_core::items::WorkerStatus;
//! use scan_core::model::Location;
//! use scan_core::scheduler::{build_scheduler_by_name};
//! use scan_core::storage::{db_update_channel, MemoryStorage};
//!
//! let storage = Arc::new(MemoryStorage::new());
//! let (dbq, _rx) = db_update_channel();
//! let scheduler = build_scheduler_by_name(
//!     "speedscan",
//!     ScanParams::default().with_step_limit(5),
//!     Arc::new(SystemTimeSource),
//!     storage,
//!     dbq,
//! )
//! .expect("known strategy");
//!
//! let shared = SharedScheduler::new(scheduler);
//! shared.location_changed(Location::new(52.520, 13.405));
//! shared.schedule();
//!
//! let mut status = WorkerStatus::at(52.520, 13.405);
//! let _work = shared.next_item(&mut status);
//! ```

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod elevation;
pub mod grid;
pub mod items;
pub mod model;
pub mod proxy;
pub mod scheduler;
pub mod spatial;
pub mod stats;
pub mod storage;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
