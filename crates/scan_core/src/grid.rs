//! Hex coverage grids: deterministic cell-center generators.
//!
//! Both generators tile concentric hexagonal rings around an origin with
//! column pitch `√3·d` and row pitch `1.5·d` for step distance `d`, and both
//! produce the same *set* of `1 + 3·r·(r+1)` centers for `r = ring_limit−1`.
//! They differ in traversal order:
//!
//! - [`hex_spiral`] is the classic display-friendly walk; for three or more
//!   rings the tail of the list is rotated to the front so the scan starts
//!   with a nugget of cells around the center.
//! - [`stable_spiral`] walks strictly outward so that regenerating with a
//!   larger `ring_limit` keeps every existing step index and cell id as a
//!   prefix. `SpeedScan` requires this because storage keys cells by id and
//!   growing the area must not re-key the interior.

use crate::model::Location;
use crate::spatial::{get_new_coords, EAST, NORTH, SOUTH, WEST};

/// Total cell count for a ring count (`ring_limit >= 1`).
pub fn cell_count(ring_limit: u32) -> usize {
    let r = ring_limit.saturating_sub(1) as usize;
    1 + 3 * r * (r + 1)
}

/// Classic hex spiral used by the `HexSearch` family.
pub fn hex_spiral(origin: Location, ring_limit: u32, step_distance_km: f64) -> Vec<Location> {
    let xdist = 3.0_f64.sqrt() * step_distance_km;
    let ydist = 1.5 * step_distance_km;

    let mut results = vec![Location::new(origin.lat, origin.lng)];

    if ring_limit > 1 {
        let mut loc = origin;

        // Upper part.
        for ring in 1..ring_limit {
            let odd = ring % 2 == 1;
            loc = get_new_coords(loc, xdist, if odd { WEST } else { EAST });
            results.push(loc);

            for _ in 0..ring {
                loc = get_new_coords(loc, ydist, NORTH);
                loc = get_new_coords(loc, xdist / 2.0, if odd { EAST } else { WEST });
                results.push(loc);
            }
            for _ in 0..ring {
                loc = get_new_coords(loc, xdist, if odd { EAST } else { WEST });
                results.push(loc);
            }
            for _ in 0..ring {
                loc = get_new_coords(loc, ydist, SOUTH);
                loc = get_new_coords(loc, xdist / 2.0, if odd { EAST } else { WEST });
                results.push(loc);
            }
        }

        // Lower part.
        let mut ring = ring_limit - 1;
        let odd = ring % 2 == 1;
        loc = get_new_coords(loc, ydist, SOUTH);
        loc = get_new_coords(loc, xdist / 2.0, if odd { WEST } else { EAST });
        results.push(loc);

        while ring > 0 {
            let odd = ring % 2 == 1;
            if ring == 1 {
                loc = get_new_coords(loc, xdist, WEST);
                results.push(loc);
            } else {
                for _ in 0..ring - 1 {
                    loc = get_new_coords(loc, ydist, SOUTH);
                    loc = get_new_coords(loc, xdist / 2.0, if odd { WEST } else { EAST });
                    results.push(loc);
                }
                for _ in 0..ring {
                    loc = get_new_coords(loc, xdist, if odd { WEST } else { EAST });
                    results.push(loc);
                }
                for _ in 0..ring - 1 {
                    loc = get_new_coords(loc, ydist, NORTH);
                    loc = get_new_coords(loc, xdist / 2.0, if odd { WEST } else { EAST });
                    results.push(loc);
                }
                loc = get_new_coords(loc, xdist, if odd { EAST } else { WEST });
                results.push(loc);
            }
            ring -= 1;
        }
    }

    // Pull the last few steps to the front so the scan starts with a
    // "center nugget" instead of sweeping the whole northern edge first.
    if ring_limit >= 3 {
        let n = if ring_limit == 3 { 2 } else { 7 };
        results.rotate_right(n);
    }

    results
}

/// Append-only outward spiral used by `SpeedScan`.
///
/// Growing `ring_limit` preserves the existing list as a prefix, so step
/// indices and cell ids of already-scanned cells never change.
pub fn stable_spiral(origin: Location, ring_limit: u32, step_distance_km: f64) -> Vec<Location> {
    let xdist = 3.0_f64.sqrt() * step_distance_km;
    let ydist = 1.5 * step_distance_km;

    let mut loc = Location::new(origin.lat, origin.lng);
    let mut results = vec![loc];

    for ring in 1..ring_limit {
        for _ in 0..(ring.saturating_sub(1).max(1)) {
            if ring > 1 {
                loc = get_new_coords(loc, ydist, NORTH);
            }
            let step_in = if ring > 1 { xdist / 2.0 } else { xdist };
            loc = get_new_coords(loc, step_in, WEST);
            results.push(loc);
        }
        for _ in 0..ring {
            loc = get_new_coords(loc, ydist, NORTH);
            loc = get_new_coords(loc, xdist / 2.0, EAST);
            results.push(loc);
        }
        for _ in 0..ring {
            loc = get_new_coords(loc, xdist, EAST);
            results.push(loc);
        }
        for _ in 0..ring {
            loc = get_new_coords(loc, ydist, SOUTH);
            loc = get_new_coords(loc, xdist / 2.0, EAST);
            results.push(loc);
        }
        for _ in 0..ring {
            loc = get_new_coords(loc, ydist, SOUTH);
            loc = get_new_coords(loc, xdist / 2.0, WEST);
            results.push(loc);
        }
        let closing = ring + u32::from(ring + 1 < ring_limit);
        for _ in 0..closing {
            loc = get_new_coords(loc, xdist, WEST);
            results.push(loc);
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{cell_id, equi_rect_distance};

    fn origin() -> Location {
        Location::new(52.520, 13.405)
    }

    #[test]
    fn cell_count_formula() {
        assert_eq!(cell_count(1), 1);
        assert_eq!(cell_count(2), 7);
        assert_eq!(cell_count(3), 19);
        assert_eq!(cell_count(5), 61);
    }

    #[test]
    fn single_ring_is_just_the_origin() {
        for locs in [
            hex_spiral(origin(), 1, 0.070),
            stable_spiral(origin(), 1, 0.070),
        ] {
            assert_eq!(locs.len(), 1);
            assert!(equi_rect_distance(locs[0], origin()) < 0.001);
        }
    }

    #[test]
    fn generators_produce_expected_counts() {
        for ring_limit in 1..=6 {
            assert_eq!(
                hex_spiral(origin(), ring_limit, 0.070).len(),
                cell_count(ring_limit),
                "hex_spiral ring_limit {ring_limit}"
            );
            assert_eq!(
                stable_spiral(origin(), ring_limit, 0.070).len(),
                cell_count(ring_limit),
                "stable_spiral ring_limit {ring_limit}"
            );
        }
    }

    #[test]
    fn generators_cover_the_same_cells() {
        use std::collections::BTreeSet;
        for ring_limit in [2, 3, 5] {
            let a: BTreeSet<_> = hex_spiral(origin(), ring_limit, 0.070)
                .into_iter()
                .map(|l| cell_id(l))
                .collect();
            let b: BTreeSet<_> = stable_spiral(origin(), ring_limit, 0.070)
                .into_iter()
                .map(|l| cell_id(l))
                .collect();
            assert_eq!(a, b, "ring_limit {ring_limit}");
        }
    }

    #[test]
    fn stable_spiral_grows_append_only() {
        let small = stable_spiral(origin(), 3, 0.070);
        let large = stable_spiral(origin(), 5, 0.070);
        for (i, loc) in small.iter().enumerate() {
            assert_eq!(
                cell_id(*loc),
                cell_id(large[i]),
                "step {i} moved when ring_limit grew"
            );
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let a = stable_spiral(origin(), 4, 0.070);
        let b = stable_spiral(origin(), 4, 0.070);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!((x.lat, x.lng), (y.lat, y.lng));
        }
    }

    #[test]
    fn neighbors_sit_one_step_apart() {
        let locs = stable_spiral(origin(), 2, 0.070);
        // Every ring-1 cell is within column pitch of the origin.
        let xdist = 3.0_f64.sqrt() * 0.070;
        for loc in &locs[1..] {
            let d = equi_rect_distance(*loc, origin());
            assert!(d < xdist * 1.05, "ring-1 cell {d} km away");
        }
    }
}
