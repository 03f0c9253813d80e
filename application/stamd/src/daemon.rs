//! Daemon-wide state and initialisation.

use std::io;
use std::net::{Ipv6Addr, SocketAddrV6, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::debug;
use netif::{ALL_NODES, Interface, InterfaceError};
use socket2::{Domain, SockRef, Socket, Type};
use thiserror::Error;
use wire::AreqFrame;
use zerocopy::AsBytes;

use crate::controller::Controller;

pub const DEFAULT_FIFO_PATH: &str = "/tmp/sta.fifo";
pub const DEFAULT_WLAN_INTERFACE: &str = "ath0";
pub const DEFAULT_UDP_PORT: u16 = 5003;
/// Seconds to wait for allocation replies.
pub const DEFAULT_WAITING_TIME: u64 = 10;

/// Command-line derived parameters.
pub struct Config {
    pub fifo_path: PathBuf,
    pub interface: String,
    pub port: u16,
    pub waiting_time: u64,
    pub foreground: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fifo_path: PathBuf::from(DEFAULT_FIFO_PATH),
            interface: DEFAULT_WLAN_INTERFACE.to_string(),
            port: DEFAULT_UDP_PORT,
            waiting_time: DEFAULT_WAITING_TIME,
            foreground: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error("interface setup failed: {0}")]
    Interface(#[from] InterfaceError),
    #[error("socket setup failed: {0}")]
    Socket(#[from] io::Error),
}

/// Everything the worker threads share.
pub struct Daemon {
    pub interface: Interface,
    pub socket: Arc<UdpSocket>,
    pub controller: Arc<Controller>,
    pub fifo_path: PathBuf,
    shutdown: &'static AtomicBool,
}

impl Daemon {
    pub fn new(config: Config, shutdown: &'static AtomicBool) -> Result<Self, InitError> {
        let interface = Interface::new(&config.interface)?;

        let socket = Socket::new(Domain::IPV6, Type::DGRAM, None)?;
        socket.set_reuse_address(true)?;
        let bind_addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, config.port, 0, 0);
        socket.bind(&bind_addr.into())?;
        let socket = Arc::new(UdpSocket::from(socket));

        // with `-p 0` (tests) the kernel picks the port; replies and
        // requests must still go to the real one
        let port = socket.local_addr()?.port();

        let send_areq = {
            let socket = Arc::clone(&socket);
            let interface = interface.clone();
            Box::new(move |candidate| {
                send_allocation_request(&socket, &interface, port, candidate);
            })
        };
        let controller = Controller::new(
            Arc::new(interface.clone()),
            send_areq,
            Duration::from_secs(config.waiting_time),
        );

        Ok(Self {
            interface,
            socket,
            controller,
            fifo_path: config.fifo_path,
            shutdown,
        })
    }

    pub fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

/// Multicasts an allocation request for `candidate` to the link-local
/// all-nodes group through the wireless interface.
fn send_allocation_request(
    socket: &UdpSocket,
    interface: &Interface,
    port: u16,
    candidate: Ipv6Addr,
) {
    debug!("# allocation request start, tentative address {candidate}");

    // the kernel joins all-nodes by itself; double check before relying on it
    if let Err(err) = interface.ensure_allnodes_membership(socket) {
        debug!("all-nodes membership check failed: {err}");
    }

    let index = match interface.index() {
        Ok(index) => index,
        Err(err) => {
            debug!("allocation request not sent: {err}");
            return;
        }
    };
    if let Err(err) = SockRef::from(socket).set_multicast_if_v6(index) {
        debug!("pinning multicast interface failed: {err}");
        return;
    }

    let frame = AreqFrame::new(candidate);
    let to = SocketAddrV6::new(ALL_NODES, port, 0, index);
    if let Err(err) = socket.send_to(frame.as_bytes(), to) {
        // the wait window still runs; an unanswered request commits
        debug!("allocation request send failed: {err}");
    }
}
