//! Address configuration on a named network interface.
//!
//! Wraps the Linux surface the daemon needs: enumerating the IPv6 addresses
//! bound to a link, binding and removing one (`SIOCSIFADDR`/`SIOCDIFADDR`
//! on an `in6_ifreq`, the net-tools way, root only), and keeping the
//! all-nodes multicast membership alive.

use std::ffi::{CStr, CString};
use std::fs;
use std::io;
use std::net::Ipv6Addr;
use std::os::fd::AsRawFd;
use std::ptr;

use log::debug;
use thiserror::Error;

/// All-nodes link-local multicast group, `ff02::1`.
pub const ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

const PROC_NET_IGMP6: &str = "/proc/net/igmp6";
const ALL_NODES_HEX: &str = "ff020000000000000000000000000001";

#[derive(Debug, Error)]
pub enum InterfaceError {
    #[error("invalid interface name")]
    InvalidName,
    #[error("no such interface")]
    NoSuchInterface,
    #[error("address enumeration failed: {0}")]
    Enumerate(#[source] io::Error),
    #[error("address configuration failed: {0}")]
    Configure(#[source] io::Error),
    #[error("multicast membership update failed: {0}")]
    Membership(#[source] io::Error),
}

/// The kernel's request block for `SIOCSIFADDR`/`SIOCDIFADDR` on IPv6.
/// Declared in `linux/ipv6.h`, which userspace must not include, so it is
/// restated here the way ifconfig does.
#[repr(C)]
struct In6Ifreq {
    ifr6_addr: libc::in6_addr,
    ifr6_prefixlen: u32,
    ifr6_ifindex: libc::c_int,
}

/// A named network interface.
#[derive(Clone)]
pub struct Interface {
    name: String,
    cname: CString,
}

impl Interface {
    /// Wraps an interface name. Names longer than the kernel's `IFNAMSIZ`
    /// (including the terminator) or containing NUL bytes are rejected.
    pub fn new(name: &str) -> Result<Self, InterfaceError> {
        if name.is_empty() || name.len() >= libc::IF_NAMESIZE {
            return Err(InterfaceError::InvalidName);
        }
        let cname = CString::new(name).map_err(|_| InterfaceError::InvalidName)?;
        Ok(Self {
            name: name.to_string(),
            cname,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Result<u32, InterfaceError> {
        let index = unsafe { libc::if_nametoindex(self.cname.as_ptr()) };
        if index == 0 {
            return Err(InterfaceError::NoSuchInterface);
        }
        Ok(index)
    }

    /// All IPv6 addresses currently bound to this interface.
    pub fn ipv6_addresses(&self) -> Result<Vec<Ipv6Addr>, InterfaceError> {
        let mut ifap: *mut libc::ifaddrs = ptr::null_mut();
        if unsafe { libc::getifaddrs(&mut ifap) } != 0 {
            return Err(InterfaceError::Enumerate(io::Error::last_os_error()));
        }

        let mut addresses = Vec::new();
        let mut cursor = ifap;
        while !cursor.is_null() {
            let entry = unsafe { &*cursor };
            cursor = entry.ifa_next;

            if entry.ifa_addr.is_null() {
                continue;
            }
            let name = unsafe { CStr::from_ptr(entry.ifa_name) };
            if name.to_bytes() != self.cname.as_bytes() {
                continue;
            }
            if i32::from(unsafe { (*entry.ifa_addr).sa_family }) != libc::AF_INET6 {
                continue;
            }
            let sin6 = unsafe { &*entry.ifa_addr.cast::<libc::sockaddr_in6>() };
            addresses.push(Ipv6Addr::from(sin6.sin6_addr.s6_addr));
        }
        unsafe { libc::freeifaddrs(ifap) };

        Ok(addresses)
    }

    /// The spatio-temporal address bound to this interface, if any.
    pub fn station_address(&self) -> Result<Option<Ipv6Addr>, InterfaceError> {
        Ok(self
            .ipv6_addresses()?
            .into_iter()
            .find(sta::is_sta))
    }

    /// Binds `addr` to this interface with prefix length 0. Root only.
    pub fn add_address(&self, addr: Ipv6Addr) -> Result<(), InterfaceError> {
        self.configure(addr, libc::SIOCSIFADDR)?;
        debug!("bound {addr} on {}", self.name);
        Ok(())
    }

    /// Removes `addr` from this interface. Root only.
    pub fn remove_address(&self, addr: Ipv6Addr) -> Result<(), InterfaceError> {
        self.configure(addr, libc::SIOCDIFADDR)?;
        debug!("removed {addr} from {}", self.name);
        Ok(())
    }

    fn configure(&self, addr: Ipv6Addr, request: libc::c_ulong) -> Result<(), InterfaceError> {
        let request_block = In6Ifreq {
            ifr6_addr: libc::in6_addr {
                s6_addr: addr.octets(),
            },
            ifr6_prefixlen: 0,
            ifr6_ifindex: self.index()? as libc::c_int,
        };

        let fd = unsafe { libc::socket(libc::AF_INET6, libc::SOCK_DGRAM, 0) };
        if fd < 0 {
            return Err(InterfaceError::Configure(io::Error::last_os_error()));
        }
        let ret = unsafe { libc::ioctl(fd, request, &request_block) };
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };

        if ret < 0 {
            return Err(InterfaceError::Configure(err));
        }
        Ok(())
    }

    /// Verifies through the kernel's membership table that this interface is
    /// joined to `ff02::1` and re-joins through `socket` when it is not.
    ///
    /// The kernel joins all-nodes on its own when the interface comes up;
    /// this is the double check radvd performs before multicasting.
    pub fn ensure_allnodes_membership(&self, socket: &impl AsRawFd) -> Result<(), InterfaceError> {
        let index = self.index()?;
        let table =
            fs::read_to_string(PROC_NET_IGMP6).map_err(InterfaceError::Membership)?;
        if membership_listed(&table, index, ALL_NODES_HEX) {
            return Ok(());
        }

        debug!("resetting ipv6-allnodes membership on {}({index})", self.name);
        let request = libc::ipv6_mreq {
            ipv6mr_multiaddr: libc::in6_addr {
                s6_addr: ALL_NODES.octets(),
            },
            ipv6mr_interface: index,
        };
        let ret = unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                libc::IPPROTO_IPV6,
                libc::IPV6_ADD_MEMBERSHIP,
                ptr::from_ref(&request).cast(),
                size_of::<libc::ipv6_mreq>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            // linux returns EADDRINUSE when the group is already joined but
            // keeps the membership; not a failure
            if err.raw_os_error() != Some(libc::EADDRINUSE) {
                return Err(InterfaceError::Membership(err));
            }
        }
        Ok(())
    }
}

/// Scans an `igmp6` table dump for a group membership on one interface.
fn membership_listed(table: &str, index: u32, group_hex: &str) -> bool {
    table.lines().any(|line| {
        let mut fields = line.split_whitespace();
        let idx = fields.next().and_then(|f| f.parse::<u32>().ok());
        let group = fields.nth(1);
        idx == Some(index) && group == Some(group_hex)
    })
}
