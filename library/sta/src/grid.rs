//! Flat-earth grid geometry for deciding when an address is still valid.
//!
//! The quantized position inside an address is the base corner of a
//! `LOCATION_GRANULARITY` sized grid cell. The address stays valid while the
//! node sits inside the region spanned by the cell and the communication
//! radius around its corners.

use crate::Position;

/// Communication range of the radio, meters.
const COMMUNICATION_RANGE: f64 = 50.0;

/// Edge length of one grid cell, meters.
const LOCATION_GRANULARITY: f64 = 1.0;

/// Meters per degree of latitude.
fn lat2y(lat: f64) -> f64 {
    lat * 110952.0
}

/// Length in meters of `lon` degrees of longitude at latitude `lat`.
// `lat` goes into the cosine in degrees; deployed peers compute it this
// way and the grid must line up with theirs.
fn lon2x(lon: f64, lat: f64) -> f64 {
    111319.0 * lon * lat.cos()
}

/// Whether the current fix still lies in the valid region of the cell whose
/// base corner is `decoded`.
///
/// Each corner of the cell contributes a quarter-disk of radius
/// [`COMMUNICATION_RANGE`] clipped by the half-planes through the cell
/// centre; the region is the intersection of all four contributions.
pub fn inside_valid_range(real: &Position, decoded: &Position) -> bool {
    let cr = COMMUNICATION_RANGE;
    let lg = LOCATION_GRANULARITY;

    let dx = lon2x(real.lon - decoded.lon, real.lat);
    let dy = lat2y(real.lat - decoded.lat);
    let x = lon2x(real.lon, real.lat);
    let y = lat2y(real.lat);
    let x0 = lon2x(decoded.lon, decoded.lat);
    let y0 = lat2y(decoded.lat);

    // base corner
    if !(dx * dx + dy * dy <= cr * cr && x >= x0 + lg / 2.0 && y >= y0 + lg / 2.0) {
        return false;
    }

    // north corner
    if !(dx * dx + (dy - lg) * (dy - lg) <= cr * cr && x >= x0 + lg / 2.0 && y <= y0 + lg / 2.0) {
        return false;
    }

    // east corner
    if !((dx - lg) * (dx - lg) + dy * dy <= cr * cr && x <= x0 + lg / 2.0 && y >= y0 + lg / 2.0) {
        return false;
    }

    // north-east corner
    (dx - lg) * (dx - lg) + (dy - lg) * (dy - lg) <= cr * cr
        && x <= x0 + lg / 2.0
        && y <= y0 + lg / 2.0
}
