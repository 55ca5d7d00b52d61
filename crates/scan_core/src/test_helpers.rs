//! Shared test setup: a fixed origin, a hand-driven clock, and seeded
//! storage, so test files don't repeat the same plumbing.

use std::sync::Arc;

use crate::clock::ManualClock;
use crate::model::{Location, SpawnPoint};
use crate::storage::MemoryStorage;

/// Unix second at the top of an hour; scheduling math is easiest to read
/// when the refresh epoch starts at second 0 of the hour.
pub const TEST_HOUR_START: u64 = 1_699_999_200;

/// A fixed test origin (central Berlin).
pub fn test_origin() -> Location {
    Location::new(52.520, 13.405)
}

/// Clock starting at [`TEST_HOUR_START`].
pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(TEST_HOUR_START))
}

/// Storage seeded with the given spawn points.
pub fn storage_with_spawnpoints(spawnpoints: Vec<SpawnPoint>) -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    for sp in spawnpoints {
        storage.insert_spawnpoint(sp);
    }
    storage
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hour_start_is_aligned() {
        assert_eq!(TEST_HOUR_START % 3600, 0);
    }

    #[test]
    fn seeded_storage_returns_spawnpoints() {
        let storage =
            storage_with_spawnpoints(vec![SpawnPoint::with_tth("a", test_origin(), 1000)]);
        assert!(storage.spawnpoint("a").is_some());
    }
}
