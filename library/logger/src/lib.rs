//! Forward log records to the local syslog daemon.

use std::os::unix::net::UnixDatagram;

use log::{Level, LevelFilter, Log, Metadata, Record};

const SYSLOG_PATH: &str = "/dev/log";

/// Every record goes out as facility local0, severity debug.
const PRIORITY: u8 = 16 * 8 + 7;

pub struct Logger {
    /// the verbosity
    level: Level,
    /// program name stamped into each syslog line
    ident: &'static str,
    /// datagram socket connected to the syslog daemon; absent when none is
    /// listening, in which case records go to stderr only
    socket: Option<UnixDatagram>,
    /// echo to stderr as well (foreground mode)
    echo: bool,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let file = record
            .file()
            .unwrap_or("unknown")
            .split('/')
            .next_back()
            .unwrap_or("unknown");
        let line = record.line().unwrap_or(0);
        let message = format!("[{}@{:0>3}] {}", file, line, record.args());

        if let Some(socket) = &self.socket {
            let frame = format!(
                "<{}>{}[{}]: {}",
                PRIORITY,
                self.ident,
                std::process::id(),
                message
            );
            // a full or vanished syslog socket must never stall the daemon
            let _ = socket.send(frame.as_bytes());
        }
        if self.echo || self.socket.is_none() {
            eprintln!("{} {}", self.ident, message);
        }
    }

    fn flush(&self) {}
}

impl Logger {
    pub fn new(ident: &'static str, echo: bool) -> Self {
        let socket = UnixDatagram::unbound().ok().and_then(|socket| {
            socket.connect(SYSLOG_PATH).ok()?;
            Some(socket)
        });

        Self {
            level: Level::Debug,
            ident,
            socket,
            echo,
        }
    }
}

/// Installs the logger as the global sink for the `log` macros.
pub fn init(ident: &'static str, echo: bool) {
    if log::set_boxed_logger(Box::new(Logger::new(ident, echo))).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_records_are_enabled() {
        let logger = Logger::new("test", false);
        let debug = Metadata::builder().level(Level::Debug).build();
        let trace = Metadata::builder().level(Level::Trace).build();
        assert!(logger.enabled(&debug));
        assert!(!logger.enabled(&trace));
    }

    #[test]
    fn priority_encodes_local0_debug() {
        assert_eq!(PRIORITY, 135);
    }
}
