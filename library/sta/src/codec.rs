//! Bit-exact conversion between a [`Position`] and a spatio-temporal address.
//!
//! Payload layout, in 16-bit groups (0 = most significant):
//!
//! | group | contents                                  |
//! |-------|-------------------------------------------|
//! | 0..3  | prefix `2001:0200:0000`                   |
//! | 3     | longitude bits 25..10                     |
//! | 4     | longitude bits 9..0, latitude bits 25..20 |
//! | 5     | latitude bits 19..4                       |
//! | 6     | latitude bits 3..0, altitude bits 13..2   |
//! | 7     | altitude bits 1..0, time bits 13..0       |

use std::net::Ipv6Addr;

use chrono::{DateTime, Local, Timelike};
use log::debug;
use thiserror::Error;

use crate::{Position, STA_PREFIX, is_sta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("latitude range error")]
    LatitudeRange,
    #[error("longitude range error")]
    LongitudeRange,
    #[error("not a spatio-temporal address")]
    NotAnSta,
}

/// Encodes a position into a spatio-temporal address.
///
/// Latitude is quantized to 4 microdegrees, longitude to 8 microdegrees,
/// altitude to 2 m and time of day to 10 s. Altitude is not range-checked;
/// values outside the 14-bit slot wrap silently.
// TODO: add an altitude bias so depths below sea level survive the mask
// (origin at -11000 m would cover the Mariana Trench).
pub fn encode(position: &Position) -> Result<Ipv6Addr, CodecError> {
    if position.lat > 90.0 || position.lat < -90.0 {
        return Err(CodecError::LatitudeRange);
    }
    if position.lon > 180.0 || position.lon < -180.0 {
        return Err(CodecError::LongitudeRange);
    }

    // 1 m along a meridian is 4.49 microdegrees, so six decimal places are
    // kept; the 28-bit integer is then cut down to its top 26 bits.
    let lat = ((position.lat + 90.0) * 1_000_000.0).floor() as u32;
    let lat = (lat & 0xfff_fffc) >> 2;

    // 1 m on the equator is 8.99 microdegrees; six decimal places give a
    // 29-bit integer, cut down to its top 26 bits.
    let lon = ((position.lon + 180.0) * 1_000_000.0).floor() as u32;
    let lon = (lon & 0x1fff_fff8) >> 3;

    // 2 m granularity, no bias, no mask.
    let alt = (position.alt / 2.0).floor() as i32 as u32;

    // 10 s granularity keeps the local time of day within 14 bits.
    let time = seconds_of_day(position.time) / 10;

    let sta = Ipv6Addr::new(
        STA_PREFIX[0],
        STA_PREFIX[1],
        STA_PREFIX[2],
        (lon >> 10) as u16,
        (((lon & 0x3ff) << 6) | (lat >> 20)) as u16,
        (lat >> 4) as u16,
        (((lat & 0xf) << 12) | ((alt & 0x3ffc) >> 2)) as u16,
        (((alt & 0x3) << 14) | time) as u16,
    );

    debug!("new spatio-temporal address {sta}");
    Ok(sta)
}

/// Recovers the position a spatio-temporal address was generated from.
///
/// The result is the quantized representative, not the original input, and
/// `time` is the second of the day; the date is not carried by the address.
pub fn decode(addr: &Ipv6Addr) -> Result<Position, CodecError> {
    if !is_sta(addr) {
        return Err(CodecError::NotAnSta);
    }

    let g = addr.segments();

    let time = u32::from(g[7] & 0x3fff) * 10;
    let alt = (u32::from(g[6] & 0x0fff) << 2) | u32::from(g[7] >> 14);
    let lat = (u32::from(g[4] & 0x3f) << 20) | (u32::from(g[5]) << 4) | u32::from(g[6] >> 12);
    let lon = (u32::from(g[3]) << 10) | u32::from((g[4] & 0xffc0) >> 6);

    let position = Position {
        time: i64::from(time),
        lat: f64::from(lat << 2) / 1_000_000.0 - 90.0,
        lon: f64::from(lon << 3) / 1_000_000.0 - 180.0,
        alt: f64::from(alt) * 2.0,
    };

    debug!(
        "decoded (time, lon, lat, alt) = ({}, {}, {}, {})",
        position.time, position.lon, position.lat, position.alt
    );
    Ok(position)
}

/// Seconds since local midnight for a unix timestamp, in the platform zone.
fn seconds_of_day(time: i64) -> u32 {
    DateTime::from_timestamp(time, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .with_timezone(&Local)
        .time()
        .num_seconds_from_midnight()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(lat: f64, lon: f64, alt: f64) -> Position {
        Position { time: 0, lat, lon, alt }
    }

    // Expected time bits for `time = 0`, derived through the same local-zone
    // conversion the encoder uses, so the assertions hold in any zone.
    fn time_code() -> u16 {
        (seconds_of_day(0) / 10) as u16
    }

    #[test]
    fn encode_is_bit_exact() {
        // 125.5 and 319.75 are dyadic, so the microdegree products are exact:
        // lat code = 125_500_000 >> 2, lon code = 319_750_000 >> 3.
        let sta = encode(&fix(35.5, 139.75, 8.0)).unwrap();

        let lat = 31_375_000_u32;
        let lon = 39_968_750_u32;
        let alt = 4_u32;
        assert_eq!(
            sta.segments(),
            [
                0x2001,
                0x0200,
                0x0000,
                (lon >> 10) as u16,
                (((lon & 0x3ff) << 6) | (lat >> 20)) as u16,
                (lat >> 4) as u16,
                (((lat & 0xf) << 12) | (alt >> 2)) as u16,
                (((alt & 0x3) << 14) as u16) | time_code(),
            ]
        );
    }

    #[test]
    fn encode_tokyo_matches_derivation() {
        let sta = encode(&fix(35.68, 139.77, 0.0)).unwrap();

        let lat = (((35.68_f64 + 90.0) * 1_000_000.0).floor() as u32 & 0xfff_fffc) >> 2;
        let lon = (((139.77_f64 + 180.0) * 1_000_000.0).floor() as u32 & 0x1fff_fff8) >> 3;
        assert_eq!(
            sta.segments(),
            [
                0x2001,
                0x0200,
                0x0000,
                (lon >> 10) as u16,
                (((lon & 0x3ff) << 6) | (lat >> 20)) as u16,
                (lat >> 4) as u16,
                ((lat & 0xf) << 12) as u16,
                time_code(),
            ]
        );
    }

    #[test]
    fn encode_rejects_out_of_range_latitude() {
        assert_eq!(
            encode(&fix(90.0001, 0.0, 0.0)),
            Err(CodecError::LatitudeRange)
        );
        assert_eq!(
            encode(&fix(-90.0001, 0.0, 0.0)),
            Err(CodecError::LatitudeRange)
        );
    }

    #[test]
    fn encode_rejects_out_of_range_longitude() {
        assert_eq!(
            encode(&fix(0.0, 180.0001, 0.0)),
            Err(CodecError::LongitudeRange)
        );
        assert_eq!(
            encode(&fix(0.0, -180.0001, 0.0)),
            Err(CodecError::LongitudeRange)
        );
    }

    #[test]
    fn encode_accepts_the_bounds() {
        assert!(encode(&fix(90.0, 180.0, 0.0)).is_ok());
        assert!(encode(&fix(-90.0, -180.0, 0.0)).is_ok());
    }

    #[test]
    fn round_trip_reproduces_the_quantized_position() {
        let sta = encode(&fix(35.68, 139.77, 0.0)).unwrap();
        let out = decode(&sta).unwrap();

        assert!((out.lat - 35.68).abs() < 4e-6);
        assert!((out.lon - 139.77).abs() < 8e-6);
        assert_eq!(out.alt, 0.0);
    }

    #[test]
    fn altitude_is_quantized_to_two_meters() {
        let out = decode(&encode(&fix(0.0, 0.0, 7.9)).unwrap()).unwrap();
        assert_eq!(out.alt, 6.0);
    }

    #[test]
    fn decode_rejects_foreign_addresses() {
        let link_local = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
        assert_eq!(decode(&link_local), Err(CodecError::NotAnSta));
    }
}
