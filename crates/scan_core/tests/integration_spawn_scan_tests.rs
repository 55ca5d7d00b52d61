mod support;

use std::sync::Arc;

use scan_core::clock::ManualClock;
use scan_core::config::ScanParams;
use scan_core::items::WorkerStatus;
use scan_core::model::{Location, SpawnPoint};
use scan_core::scheduler::{build_scheduler, NextItem, Scheduler, SchedulerKind};
use scan_core::storage::{db_update_channel, MemoryStorage, ScanStorage, SpawnTimeEntry};
use scan_core::test_helpers::{test_origin, TEST_HOUR_START};

fn build(params: ScanParams, now: u64, storage: Arc<MemoryStorage>) -> Box<dyn Scheduler> {
    let (dbq, _rx) = db_update_channel();
    let storage_dyn: Arc<dyn ScanStorage> = storage;
    build_scheduler(
        SchedulerKind::SpawnScan,
        params,
        Arc::new(ManualClock::new(now)),
        storage_dyn,
        dbq,
    )
}

#[test]
fn spawn_two_minutes_past_the_hour_seen_thirty_seconds_in() {
    // Current time is 30 s past the hour; the spawn appears at 02:00 past
    // the hour, i.e. 90 s from now.
    let now = TEST_HOUR_START + 30;
    let origin = test_origin();
    let storage = Arc::new(MemoryStorage::new());
    // appearance_secs() == 120 (despawn at 1020).
    storage.insert_spawnpoint(SpawnPoint::with_tth("sp1", origin, 1020));

    let mut scheduler = build(ScanParams::default().with_step_limit(2), now, storage);
    scheduler.location_changed(origin);
    scheduler.schedule();

    let mut status = WorkerStatus::at(origin.lat, origin.lng);
    let NextItem::Claim(claim) = scheduler.next_item(&mut status) else {
        panic!("expected a claim");
    };
    assert_eq!(claim.appears, now + 90);
    assert_eq!(claim.leaves, claim.appears + 900);
}

#[test]
fn schedule_is_recomputed_each_cycle() {
    let now = TEST_HOUR_START + 30;
    let origin = test_origin();
    let storage = Arc::new(MemoryStorage::new());
    storage.insert_spawnpoint(SpawnPoint::with_tth("sp1", origin, 1020));

    let mut scheduler = build(ScanParams::default().with_step_limit(2), now, storage);
    scheduler.location_changed(origin);

    scheduler.schedule();
    assert_eq!(scheduler.getsize(), 1);
    let mut status = WorkerStatus::at(origin.lat, origin.lng);
    let _ = scheduler.next_item(&mut status);
    assert!(scheduler.time_to_refresh_queue());

    // The queue regenerates from storage on the next cycle.
    scheduler.schedule();
    assert_eq!(scheduler.getsize(), 1);
    assert!(!scheduler.time_to_refresh_queue());
}

#[test]
fn sidecar_file_takes_precedence_over_storage() {
    let origin = test_origin();
    let entries = vec![
        SpawnTimeEntry {
            lat: origin.lat,
            lng: origin.lng,
            spawnpoint_id: "file-a".to_string(),
            time: 300,
        },
        SpawnTimeEntry {
            lat: origin.lat,
            lng: origin.lng,
            spawnpoint_id: "file-b".to_string(),
            time: 100,
        },
    ];
    let path = std::env::temp_dir().join(format!("spawns-{}.json", std::process::id()));
    std::fs::write(&path, serde_json::to_vec(&entries).expect("encode")).expect("write sidecar");

    let storage = Arc::new(MemoryStorage::new());
    storage.insert_spawnpoint(SpawnPoint::with_tth("db-only", origin, 1020));

    let params = ScanParams::default()
        .with_step_limit(2)
        .with_spawnpoint_file(&path);
    let mut scheduler = build(params, TEST_HOUR_START + 30, storage);
    scheduler.location_changed(origin);
    scheduler.schedule();

    // Both file entries, ordered by next appearance (100 s before 300 s).
    assert_eq!(scheduler.getsize(), 2);
    let mut status = WorkerStatus::at(origin.lat, origin.lng);
    let NextItem::Claim(first) = scheduler.next_item(&mut status) else {
        panic!("expected claim");
    };
    assert_eq!(first.appears, TEST_HOUR_START + 100);

    std::fs::remove_file(&path).ok();
}

#[test]
fn unreadable_sidecar_falls_back_to_storage() {
    let origin = test_origin();
    let path = std::env::temp_dir().join(format!("spawns-broken-{}.json", std::process::id()));
    std::fs::write(&path, b"{ not json").expect("write sidecar");

    let storage = Arc::new(MemoryStorage::new());
    storage.insert_spawnpoint(SpawnPoint::with_tth("db-only", origin, 1020));

    let params = ScanParams::default()
        .with_step_limit(2)
        .with_spawnpoint_file(&path);
    let mut scheduler = build(params, TEST_HOUR_START + 30, storage);
    scheduler.location_changed(origin);
    scheduler.schedule();
    assert_eq!(scheduler.getsize(), 1);

    std::fs::remove_file(&path).ok();
}

#[test]
fn empty_area_is_a_warning_not_an_error() {
    let storage = Arc::new(MemoryStorage::new());
    let mut scheduler = build(
        ScanParams::default().with_step_limit(2),
        TEST_HOUR_START,
        storage,
    );
    scheduler.location_changed(test_origin());
    scheduler.schedule();
    assert_eq!(scheduler.getsize(), 0);
    let mut status = WorkerStatus::at(0.0, 0.0);
    assert!(scheduler.next_item(&mut status).is_idle());
}
