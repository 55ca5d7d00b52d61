//! Spatial operations: bearing-based coordinate projection, fast distance
//! approximations, and stable H3 cell identifiers.
//!
//! This module provides:
//!
//! - **`get_new_coords`**: great-circle forward projection from a bearing and distance
//! - **`equi_rect_distance`**: equirectangular distance, accurate at sub-2 km scan ranges
//! - **`haversine_distance`**: exact great-circle distance for proximity filters
//! - **`cell_id`**: fixed-resolution H3 index keying a scan location across runs
//!
//! Cell resolution is 11 (~25 m hex edge). Adjacent scan steps are 70 m apart,
//! so no two steps ever share a cell, and the same coordinates always map to
//! the same 64-bit id.

use h3o::{CellIndex, LatLng, Resolution};

use crate::model::Location;

/// Mean earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// H3 resolution used for scan-cell identifiers.
pub const CELL_RESOLUTION: Resolution = Resolution::Eleven;

/// Compass bearings used by the grid generators (degrees).
pub const NORTH: f64 = 0.0;
pub const EAST: f64 = 90.0;
pub const SOUTH: f64 = 180.0;
pub const WEST: f64 = 270.0;

/// Project a new coordinate `distance_km` away from `origin` along `bearing_deg`.
///
/// Great-circle forward solution on a spherical earth. Bearings follow the
/// compass convention (N=0, E=90, S=180, W=270).
pub fn get_new_coords(origin: Location, distance_km: f64, bearing_deg: f64) -> Location {
    let d = distance_km / EARTH_RADIUS_KM;
    let bearing = bearing_deg.to_radians();
    let lat1 = origin.lat.to_radians();
    let lng1 = origin.lng.to_radians();

    let lat2 = (lat1.sin() * d.cos() + lat1.cos() * d.sin() * bearing.cos()).asin();
    let lng2 = lng1
        + (bearing.sin() * d.sin() * lat1.cos()).atan2(d.cos() - lat1.sin() * lat2.sin());

    // Normalize longitude to [-180, 180).
    let lng_deg = (lng2.to_degrees() + 540.0) % 360.0 - 180.0;
    Location::new(lat2.to_degrees(), lng_deg)
}

/// Equirectangular distance between two locations in kilometres.
///
/// Sufficiently accurate below ~2 km, which covers worker-to-step distances;
/// used on the selection hot path where haversine trigonometry is overkill.
pub fn equi_rect_distance(a: Location, b: Location) -> f64 {
    let mean_lat = ((a.lat + b.lat) / 2.0).to_radians();
    let x = (b.lng - a.lng).to_radians() * mean_lat.cos();
    let y = (b.lat - a.lat).to_radians();
    EARTH_RADIUS_KM * (x * x + y * y).sqrt()
}

/// Exact great-circle distance between two locations in kilometres.
pub fn haversine_distance(a: Location, b: Location) -> f64 {
    let (lat1, lng1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lng2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlng = (dlng * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlng * sin_dlng;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Stable cell identifier for a scan location.
///
/// H3 indices are deterministic, so the same coordinates produce the same id
/// across runs; persistent storage keys scan cells by this value.
pub fn cell_id(loc: Location) -> CellIndex {
    LatLng::new(loc.lat, loc.lng)
        .expect("scan coordinates must be finite and in range")
        .to_cell(CELL_RESOLUTION)
}

/// Bounding box `(north, east, south, west)` covering a hex of `ring_limit`
/// rings around `center`. Used by storage range queries.
pub fn hex_bounds(center: Location, ring_limit: u32, step_distance_km: f64) -> (f64, f64, f64, f64) {
    // Outer ring centers sit ring_limit * sqrt(3) * d from the origin at most;
    // pad by one step so edge cells are fully inside the box.
    let reach = step_distance_km * 3.0_f64.sqrt() * (ring_limit as f64 + 1.0);
    let n = get_new_coords(center, reach, NORTH).lat;
    let s = get_new_coords(center, reach, SOUTH).lat;
    let e = get_new_coords(center, reach, EAST).lng;
    let w = get_new_coords(center, reach, WEST).lng;
    (n, e, s, w)
}
