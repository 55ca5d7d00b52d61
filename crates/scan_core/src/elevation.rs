//! Elevation: pluggable lookup providers behind a small caching collaborator.
//!
//! Scan locations carry an altitude so upstream responses cannot be
//! fingerprinted by a constant 0 m. Lookups are expensive (an HTTP call per
//! coordinate), so the cache either reuses the first successful result for
//! the whole area (`cache_first_result`, the default — scan areas are a few
//! km wide at most) or keeps a per-cell LRU when terrain variation matters.
//! Every returned altitude gets whole-metre jitter within
//! `±jitter_m` plus a sub-metre random fraction.
//!
//! Providers:
//!
//! - **`NoElevation`**: always falls back to the configured default.
//! - **`GoogleElevation`** (feature `google-elevation`): the Maps Elevation
//!   API via a blocking HTTP client; any failure falls back to the default.

use std::num::NonZeroUsize;

use h3o::CellIndex;
use lru::LruCache;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ScanParams;
use crate::model::Location;
use crate::spatial::cell_id;

/// Elevation lookup backend.
pub trait ElevationProvider: Send + Sync {
    /// Elevation in metres, or `None` when the lookup failed.
    fn elevation(&self, loc: Location) -> Option<f64>;
}

/// Provider that never answers; the cache falls back to the default altitude.
#[derive(Debug, Default)]
pub struct NoElevation;

impl ElevationProvider for NoElevation {
    fn elevation(&self, _loc: Location) -> Option<f64> {
        None
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ElevationOptions {
    /// Reuse the first successful lookup for every location in the area.
    pub cache_first_result: bool,
    /// Altitude in metres when no lookup succeeds.
    pub default_altitude: f64,
    /// Whole-metre jitter amplitude; 0 disables it.
    pub jitter_m: i32,
}

impl Default for ElevationOptions {
    fn default() -> Self {
        Self {
            cache_first_result: true,
            default_altitude: 0.0,
            jitter_m: 0,
        }
    }
}

impl ElevationOptions {
    pub fn from_params(params: &ScanParams) -> Self {
        Self {
            cache_first_result: true,
            default_altitude: params.altitude,
            jitter_m: params.altitude_range,
        }
    }
}

/// Caching elevation source owned by a scheduler.
pub struct ElevationCache {
    provider: Box<dyn ElevationProvider>,
    options: ElevationOptions,
    first: Option<f64>,
    by_cell: LruCache<CellIndex, f64>,
    rng: StdRng,
}

impl ElevationCache {
    pub fn new(provider: Box<dyn ElevationProvider>, options: ElevationOptions) -> Self {
        Self::with_seed(provider, options, None)
    }

    /// Seedable constructor for reproducible jitter in tests.
    pub fn with_seed(
        provider: Box<dyn ElevationProvider>,
        options: ElevationOptions,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            provider,
            options,
            first: None,
            by_cell: LruCache::new(NonZeroUsize::new(10_000).expect("cache size must be non-zero")),
            rng,
        }
    }

    /// Jittered altitude for a scan at `loc`.
    pub fn altitude_for(&mut self, loc: Location) -> f64 {
        let base = self.base_altitude(loc);
        let whole = if self.options.jitter_m > 0 {
            self.rng.gen_range(-self.options.jitter_m..self.options.jitter_m) as f64
        } else {
            0.0
        };
        base + whole + self.rng.gen::<f64>()
    }

    fn base_altitude(&mut self, loc: Location) -> f64 {
        if self.options.cache_first_result {
            if let Some(first) = self.first {
                return first;
            }
            match self.provider.elevation(loc) {
                Some(e) => {
                    self.first = Some(e);
                    e
                }
                None => self.options.default_altitude,
            }
        } else {
            let cell = cell_id(loc);
            if let Some(e) = self.by_cell.get(&cell) {
                return *e;
            }
            match self.provider.elevation(loc) {
                Some(e) => {
                    self.by_cell.put(cell, e);
                    e
                }
                None => self.options.default_altitude,
            }
        }
    }
}

impl std::fmt::Debug for ElevationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevationCache")
            .field("options", &self.options)
            .field("first", &self.first)
            .finish_non_exhaustive()
    }
}

/// Default provider for the given parameters: the Google backend when the
/// feature is enabled and a key is configured, otherwise none.
pub fn default_provider(params: &ScanParams) -> Box<dyn ElevationProvider> {
    #[cfg(feature = "google-elevation")]
    if let Some(key) = &params.gmaps_key {
        return Box::new(google::GoogleElevation::new(key));
    }
    let _ = params;
    Box::new(NoElevation)
}

#[cfg(feature = "google-elevation")]
pub mod google {
    use super::*;
    use serde::Deserialize;
    use std::time::Duration;

    /// Google Maps Elevation API lookup.
    pub struct GoogleElevation {
        client: reqwest::blocking::Client,
        key: String,
    }

    impl GoogleElevation {
        pub fn new(key: &str) -> Self {
            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("failed to build HTTP client");
            Self {
                client,
                key: key.to_string(),
            }
        }
    }

    #[derive(Deserialize)]
    struct ElevationResponse {
        results: Vec<ElevationResult>,
    }

    #[derive(Deserialize)]
    struct ElevationResult {
        elevation: f64,
    }

    impl ElevationProvider for GoogleElevation {
        fn elevation(&self, loc: Location) -> Option<f64> {
            let url = format!(
                "https://maps.googleapis.com/maps/api/elevation/json?locations={},{}&key={}",
                loc.lat, loc.lng, self.key
            );
            let response: ElevationResponse = self.client.get(&url).send().ok()?.json().ok()?;
            response.results.first().map(|r| r.elevation)
        }
    }
}
