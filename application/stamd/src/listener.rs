//! Receive side of the allocation handshake.
//!
//! The listener thread only pulls datagrams off the shared socket; each one
//! is handed to its own worker so that a slow handler can never hold up
//! reception. A worker answers requests from neighbours and feeds duplicate
//! replies into the controller.

use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::thread;

use log::debug;
use wire::{ArepFrame, AreqFrame, PacketType};
use zerocopy::AsBytes;

use crate::daemon::Daemon;

const UDP_RECV_BUF_SIZE: usize = 512;

pub fn run(daemon: Arc<Daemon>) {
    let mut buf = [0u8; UDP_RECV_BUF_SIZE];

    while !daemon.shutting_down() {
        let (len, from) = match daemon.socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(err) => {
                debug!("receive failed: {err}");
                continue;
            }
        };
        debug!("received {len} bytes from {from}");

        let datagram = buf[..len].to_vec();
        let daemon = Arc::clone(&daemon);
        thread::spawn(move || handle_datagram(&daemon, &datagram, from));
    }
}

fn handle_datagram(daemon: &Daemon, datagram: &[u8], from: SocketAddr) {
    match wire::packet_type(datagram) {
        Some(PacketType::Areq) => {
            let Ok(request) = AreqFrame::parse(datagram) else {
                return;
            };
            answer_request(daemon, request.requested(), from);
        }
        Some(PacketType::Arep) => {
            let Ok(reply) = ArepFrame::parse(datagram) else {
                return;
            };
            if reply.duplicate() {
                daemon.controller.on_duplicate();
            }
        }
        // unknown types and runt datagrams are dropped
        None => {}
    }
}

/// A neighbour asked for `requested`: reply with the duplicate bit set iff
/// that address is bound here.
fn answer_request(daemon: &Daemon, requested: Ipv6Addr, from: SocketAddr) {
    let own = match daemon.interface.station_address() {
        Ok(own) => own,
        Err(err) => {
            debug!("address lookup failed: {err}");
            None
        }
    };
    let duplicate = own == Some(requested);

    let reply = ArepFrame::new(requested, duplicate);
    if let Err(err) = daemon.socket.send_to(reply.as_bytes(), from) {
        debug!("allocation reply to {from} failed: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::Config;
    use std::net::{Ipv6Addr, UdpSocket};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    static NO_SHUTDOWN: AtomicBool = AtomicBool::new(false);

    const REQUESTED: Ipv6Addr =
        Ipv6Addr::new(0x2001, 0x0200, 0, 0x4e0c, 0x2bc7, 0xa8c0, 0, 0);

    fn loopback_daemon() -> Arc<Daemon> {
        let config = Config {
            interface: "lo".to_string(),
            port: 0,
            ..Config::default()
        };
        Arc::new(Daemon::new(config, &NO_SHUTDOWN).expect("daemon init"))
    }

    /// The responder answers a request for an address the node does not hold
    /// with the duplicate bit clear and the request echoed.
    #[test]
    fn foreign_requests_are_answered_not_duplicate() {
        let daemon = loopback_daemon();
        let server = daemon.socket.local_addr().unwrap();
        {
            let daemon = Arc::clone(&daemon);
            thread::spawn(move || run(daemon));
        }

        let client = UdpSocket::bind("[::1]:0").unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let request = AreqFrame::new(REQUESTED);
        client
            .send_to(request.as_bytes(), ("::1", server.port()))
            .unwrap();

        let mut buf = [0u8; UDP_RECV_BUF_SIZE];
        let (len, _) = client.recv_from(&mut buf).unwrap();
        let reply = ArepFrame::parse(&buf[..len]).unwrap();
        assert!(!reply.duplicate());
        assert_eq!(reply.echoed(), REQUESTED);
    }

    /// A duplicate reply closes an open detection window without touching
    /// the interface.
    #[test]
    fn duplicate_replies_reach_the_controller() {
        use crate::controller::Phase;

        let daemon = loopback_daemon();
        let server = daemon.socket.local_addr().unwrap();
        {
            let daemon = Arc::clone(&daemon);
            thread::spawn(move || run(daemon));
        }

        daemon.controller.begin_dad(REQUESTED).unwrap();
        assert_eq!(daemon.controller.phase(), Phase::Dad);

        let client = UdpSocket::bind("[::1]:0").unwrap();
        let reply = ArepFrame::new(REQUESTED, true);
        client
            .send_to(reply.as_bytes(), ("::1", server.port()))
            .unwrap();

        for _ in 0..100 {
            if daemon.controller.phase() == Phase::Idle {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(daemon.controller.phase(), Phase::Idle);
        assert_eq!(daemon.interface.station_address().unwrap(), None);
    }

    /// Garbage datagrams neither crash the listener nor produce replies.
    #[test]
    fn malformed_datagrams_are_dropped() {
        let daemon = loopback_daemon();
        let server = daemon.socket.local_addr().unwrap();
        {
            let daemon = Arc::clone(&daemon);
            thread::spawn(move || run(daemon));
        }

        let client = UdpSocket::bind("[::1]:0").unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(300)))
            .unwrap();
        client.send_to(&[0xff, 0xff, 1, 2, 3], ("::1", server.port())).unwrap();
        client.send_to(&[0x00], ("::1", server.port())).unwrap();
        client.send_to(&[], ("::1", server.port())).unwrap();

        let mut buf = [0u8; UDP_RECV_BUF_SIZE];
        assert!(client.recv_from(&mut buf).is_err());
    }
}
