//! stamd – keep a spatio-temporal address on the wireless interface.
//!
//! The daemon consumes position fixes from the positioning middleware
//! through a named FIFO. Whenever the node leaves the grid cell encoded in
//! its current address, a fresh address is derived from the newest fix,
//! checked against the one-hop neighbours for duplicates and swapped onto
//! the interface.

use std::env;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use log::{debug, info};

mod controller;
mod daemon;
mod ingress;
mod listener;

use daemon::{
    Config, DEFAULT_FIFO_PATH, DEFAULT_UDP_PORT, DEFAULT_WAITING_TIME, DEFAULT_WLAN_INTERFACE,
    Daemon,
};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

fn usage() -> ! {
    eprintln!("Usage: stamd [options]");
    eprintln!("where options are:");
    eprintln!("  -f fifo_path : Path to FIFO. ({DEFAULT_FIFO_PATH})");
    eprintln!("  -h : Show this message and exit.");
    eprintln!("  -i wlan_interface : WLAN Interface to use. ({DEFAULT_WLAN_INTERFACE})");
    eprintln!("  -n : Not daemonize.");
    eprintln!("  -p port : UDP port number. ({DEFAULT_UDP_PORT})");
    eprintln!("  -t waiting_time : Waiting Time [sec] in DAD. ({DEFAULT_WAITING_TIME})");
    process::exit(1);
}

fn parse_args() -> Config {
    let mut config = Config::default();
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-f" => config.fifo_path = args.next().unwrap_or_else(|| usage()).into(),
            "-h" => usage(),
            "-i" => config.interface = args.next().unwrap_or_else(|| usage()),
            "-n" => config.foreground = true,
            "-p" => {
                config.port = args
                    .next()
                    .and_then(|port| port.parse().ok())
                    .unwrap_or_else(|| usage());
            }
            "-t" => {
                config.waiting_time = args
                    .next()
                    .and_then(|seconds| seconds.parse().ok())
                    .unwrap_or_else(|| usage());
            }
            _ => usage(),
        }
    }
    config
}

fn main() {
    let config = parse_args();

    logger::init("stamd", config.foreground);
    println!("STA Management Daemon started...");
    info!("STA Management Daemon started...");

    if !config.foreground && unsafe { libc::daemon(0, 1) } != 0 {
        debug!("daemonizing failed, staying in the foreground");
    }
    if unsafe { libc::signal(libc::SIGINT, handle_sigint as libc::sighandler_t) } == libc::SIG_ERR
    {
        eprintln!("installing the SIGINT handler failed");
        println!("STA Management Daemon dying...");
        process::exit(-1);
    }

    let daemon = match Daemon::new(config, &SHUTDOWN) {
        Ok(daemon) => Arc::new(daemon),
        Err(err) => {
            info!("initialisation failed: {err}");
            eprintln!("stamd: {err}");
            process::exit(-1);
        }
    };

    {
        let daemon = Arc::clone(&daemon);
        thread::spawn(move || listener::run(daemon));
    }
    let reader = {
        let daemon = Arc::clone(&daemon);
        thread::spawn(move || ingress::run(daemon))
    };

    // the daemon lives as long as the middleware keeps the FIFO open
    let _ = reader.join();

    info!("STA Management Daemon dying...");
    println!("STA Management Daemon dying...");
}
