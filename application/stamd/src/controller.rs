//! Lifecycle of the tentative address.
//!
//! A new candidate address enters through [`Controller::begin_dad`], which
//! opens a duplicate-detection window: the candidate is multicast to the
//! one-hop neighbours and a timer is armed. A neighbour claiming the address
//! moves the attempt to [`Phase::Duplicate`] and cancels the timer, which
//! makes the timeout handler run immediately. The timeout handler is the
//! only place the attempt ends: it either swaps the address onto the
//! interface or abandons it, and always returns the controller to
//! [`Phase::Idle`].

use std::net::Ipv6Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use log::debug;
use netif::InterfaceError;
use thiserror::Error;
use timer::TimerTable;

/// Timer slot reserved for the duplicate-detection window.
const DAD_TIMER: usize = 0;

/// Another allocation attempt is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("address allocation already in progress")]
pub struct Busy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No attempt in flight.
    Idle,
    /// A candidate is out for duplicate detection.
    Dad,
    /// A neighbour reported the candidate as taken; waiting for the timeout
    /// handler to abandon it.
    Duplicate,
}

/// The single tentative address of the node.
struct Tentative {
    address: Ipv6Addr,
    generated_at: i64,
    phase: Phase,
}

impl Tentative {
    const fn new() -> Self {
        Self {
            address: Ipv6Addr::UNSPECIFIED,
            generated_at: 0,
            phase: Phase::Idle,
        }
    }

    fn reset(&mut self) {
        self.address = Ipv6Addr::UNSPECIFIED;
        self.generated_at = 0;
        self.phase = Phase::Idle;
    }
}

/// Address configuration surface of the wireless interface.
pub trait Link: Send + Sync {
    fn station_address(&self) -> Result<Option<Ipv6Addr>, InterfaceError>;
    fn add_address(&self, addr: Ipv6Addr) -> Result<(), InterfaceError>;
    fn remove_address(&self, addr: Ipv6Addr) -> Result<(), InterfaceError>;
}

impl Link for netif::Interface {
    fn station_address(&self) -> Result<Option<Ipv6Addr>, InterfaceError> {
        netif::Interface::station_address(self)
    }

    fn add_address(&self, addr: Ipv6Addr) -> Result<(), InterfaceError> {
        netif::Interface::add_address(self, addr)
    }

    fn remove_address(&self, addr: Ipv6Addr) -> Result<(), InterfaceError> {
        netif::Interface::remove_address(self, addr)
    }
}

pub struct Controller {
    tentative: Mutex<Tentative>,
    timers: TimerTable,
    link: Arc<dyn Link>,
    send_areq: Box<dyn Fn(Ipv6Addr) + Send + Sync>,
    waiting_time: Duration,
}

impl Controller {
    pub fn new(
        link: Arc<dyn Link>,
        send_areq: Box<dyn Fn(Ipv6Addr) + Send + Sync>,
        waiting_time: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            tentative: Mutex::new(Tentative::new()),
            timers: TimerTable::new(),
            link,
            send_areq,
            waiting_time,
        })
    }

    /// Starts duplicate detection for `candidate`: publish it as the
    /// tentative address, ask the neighbours, arm the wait window.
    ///
    /// A send failure does not roll the attempt back; the timer fires
    /// regardless and the address is committed unopposed.
    pub fn begin_dad(self: &Arc<Self>, candidate: Ipv6Addr) -> Result<(), Busy> {
        {
            let mut tentative = self.tentative.lock().unwrap();
            if tentative.phase != Phase::Idle {
                return Err(Busy);
            }
            tentative.address = candidate;
            tentative.generated_at = Utc::now().timestamp();
            tentative.phase = Phase::Dad;
        }

        (self.send_areq)(candidate);

        let controller = Arc::clone(self);
        self.timers
            .arm(DAD_TIMER, self.waiting_time, move || controller.on_timeout());
        Ok(())
    }

    /// A neighbour answered that it already holds the tentative address.
    /// Replies arriving outside an open window are dropped.
    pub fn on_duplicate(&self) {
        {
            let mut tentative = self.tentative.lock().unwrap();
            if tentative.phase != Phase::Dad {
                return;
            }
            tentative.phase = Phase::Duplicate;
            debug!("# DUPLICATE {}", tentative.address);
        }
        // cancelling runs the timeout handler right away; the tentative
        // mutex must be free by then
        self.timers.cancel(DAD_TIMER);
    }

    /// End of the wait window. Unopposed attempts replace the interface
    /// address; duplicated ones are dropped. Either way the slot is cleared.
    fn on_timeout(&self) {
        let mut tentative = self.tentative.lock().unwrap();
        match tentative.phase {
            Phase::Dad => {
                match self.link.station_address() {
                    Ok(Some(old)) => {
                        if let Err(err) = self.link.remove_address(old) {
                            debug!("removing {old} failed: {err}");
                        }
                    }
                    Ok(None) => {}
                    Err(err) => debug!("address lookup failed: {err}"),
                }
                if let Err(err) = self.link.add_address(tentative.address) {
                    // the attempt is lost, but the slot must not stay occupied
                    debug!("binding {} failed: {err}", tentative.address);
                }
                tentative.reset();
            }
            Phase::Duplicate => {
                debug!(
                    "# DUPLICATE, abandoning {} after {}s",
                    tentative.address,
                    Utc::now().timestamp() - tentative.generated_at
                );
                tentative.reset();
            }
            Phase::Idle => {}
        }
    }

    pub fn phase(&self) -> Phase {
        self.tentative.lock().unwrap().phase
    }
}
