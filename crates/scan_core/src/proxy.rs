//! Proxy rotation: which proxy the next worker request should use.
//!
//! Health-checking is an external concern; this module only implements the
//! rotation policy over an already-vetted list.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Rotation policy for the proxy list. `None` (no explicit choice) and
/// `Round` share the round-robin path; only `Random` differs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyRotation {
    /// No rotation configured; cycles through the list like `Round`.
    #[default]
    None,
    /// Round-robin through the list.
    Round,
    /// Uniformly random pick per request.
    Random,
}

/// A set of working proxies plus the rotation state.
pub struct ProxyPool {
    proxies: Vec<String>,
    rotation: ProxyRotation,
    next_index: usize,
    rng: StdRng,
}

impl ProxyPool {
    pub fn new(proxies: Vec<String>, rotation: ProxyRotation, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            proxies,
            rotation,
            next_index: 0,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Pick the next proxy under the configured rotation. Returns the index
    /// and the proxy so callers can report which one failed.
    pub fn next_proxy(&mut self) -> Option<(usize, &str)> {
        if self.proxies.is_empty() {
            return None;
        }
        let index = match self.rotation {
            ProxyRotation::None | ProxyRotation::Round => {
                let index = self.next_index;
                self.next_index = (self.next_index + 1) % self.proxies.len();
                index
            }
            ProxyRotation::Random => self.rng.gen_range(0..self.proxies.len()),
        };
        Some((index, self.proxies[index].as_str()))
    }
}
