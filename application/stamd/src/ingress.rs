//! Position ingress from the positioning middleware.
//!
//! The middleware writes fixed-size binary records into a named FIFO. Each
//! record carries a fresh fix; whenever the fix leaves the valid region of
//! the address currently bound, a renewal attempt is started.

use std::fs::File;
use std::io::Read;
use std::sync::Arc;

use log::debug;
use sta::Position;
use zerocopy::{AsBytes, FromBytes};

use crate::daemon::Daemon;

/// One record of middleware output, read verbatim from the FIFO.
/// Native byte order; only the time and the fix itself are used here.
#[derive(Debug, Default, Clone, Copy, FromBytes, AsBytes)]
#[repr(C)]
pub struct PositionRecord {
    pub index: u64,
    pub nodeid: [i32; 16],
    pub time: i64,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    /// covariance of the fix, unused
    pub error: [f64; 4],
    pub radio_range: f64,
}

impl PositionRecord {
    pub fn position(&self) -> Position {
        Position {
            time: self.time,
            lat: self.lat,
            lon: self.lon,
            alt: self.alt,
        }
    }
}

/// Reads records until the writer closes the FIFO or shutdown is requested.
/// An unreadable FIFO ends this thread, not the daemon.
pub fn run(daemon: Arc<Daemon>) {
    let mut fifo = match File::open(&daemon.fifo_path) {
        Ok(fifo) => fifo,
        Err(err) => {
            debug!("opening {} failed: {err}", daemon.fifo_path.display());
            return;
        }
    };

    let mut record = PositionRecord::default();
    while !daemon.shutting_down() {
        match fifo.read(record.as_bytes_mut()) {
            // writer closed
            Ok(0) => break,
            Ok(len) if len < size_of::<PositionRecord>() => {
                debug!("short record of {len} bytes, skipped");
            }
            Ok(_) => process_record(&daemon, &record),
            Err(err) => {
                debug!("record read failed: {err}");
            }
        }
    }
}

fn process_record(daemon: &Arc<Daemon>, record: &PositionRecord) {
    debug!("position record index={}", record.index);

    let bound = match daemon.interface.station_address() {
        Ok(bound) => bound,
        Err(err) => {
            debug!("address lookup failed: {err}");
            None
        }
    };

    match bound {
        // nothing bound yet, claim an address for this fix
        None => renew(daemon, record),
        Some(current) => {
            let decoded = match sta::decode(&current) {
                Ok(decoded) => decoded,
                Err(err) => {
                    debug!("decoding {current} failed: {err}");
                    return;
                }
            };
            if !sta::inside_valid_range(&record.position(), &decoded) {
                renew(daemon, record);
            }
        }
    }
}

fn renew(daemon: &Arc<Daemon>, record: &PositionRecord) {
    let candidate = match sta::encode(&record.position()) {
        Ok(candidate) => candidate,
        Err(err) => {
            debug!("record {} rejected: {err}", record.index);
            return;
        }
    };
    // Busy means a detection window is already open; this fix is skipped
    // and the next record drives the retry
    let _ = daemon.controller.begin_dad(candidate);
}
