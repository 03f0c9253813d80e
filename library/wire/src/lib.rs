//! Wire frames for the address allocation handshake.
//!
//! Both frame types are 160 bytes: a big-endian type tag at offset 0, a
//! 16-bit flag word at offset 2 (only the duplicate bit of an AREP is ever
//! set), the requested address at offsets 4..20 and zero padding to the end.

use std::net::Ipv6Addr;

use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};
use num_enum::TryFromPrimitive;
use thiserror::Error;
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned, U16};

/// Size of every frame on the wire.
pub const FRAME_SIZE: usize = 160;

const PADDING_SIZE: usize = FRAME_SIZE - 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum PacketType {
    /// Allocation request, multicast to all link-local nodes.
    Areq = 0,
    /// Allocation reply, unicast back to the requester.
    Arep = 1,
}

bitflags! {
    /// Flag byte of an allocation reply.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ArepFlags: u8 {
        /// The requested address is already bound on the replying node.
        const DUPLICATE = 0x01;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame too short")]
    Truncated,
    #[error("wrong packet type")]
    WrongType,
}

/// Reads the type tag of a received datagram. Unknown tags and runt
/// datagrams yield `None` and are dropped by the caller.
pub fn packet_type(buf: &[u8]) -> Option<PacketType> {
    if buf.len() < 2 {
        return None;
    }
    PacketType::try_from(BigEndian::read_u16(&buf[..2])).ok()
}

/// Allocation request carrying the address the sender wants to bind.
#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct AreqFrame {
    kind: U16<BigEndian>,
    reserved: U16<BigEndian>,
    address: [u8; 16],
    padding: [u8; PADDING_SIZE],
}

impl AreqFrame {
    pub fn new(requested: Ipv6Addr) -> Self {
        Self {
            kind: U16::new(PacketType::Areq as u16),
            reserved: U16::new(0),
            address: requested.octets(),
            padding: [0; PADDING_SIZE],
        }
    }

    pub fn parse(buf: &[u8]) -> Result<&Self, FrameError> {
        let (frame, _) = LayoutVerified::<_, Self>::new_unaligned_from_prefix(buf)
            .ok_or(FrameError::Truncated)?;
        let frame: &Self = frame.into_ref();
        if frame.kind.get() != PacketType::Areq as u16 {
            return Err(FrameError::WrongType);
        }
        Ok(frame)
    }

    pub fn requested(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.address)
    }
}

/// Allocation reply echoing the requested address, with the duplicate bit
/// answering whether the replier already holds it.
#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct ArepFrame {
    kind: U16<BigEndian>,
    flags: u8,
    reserved: u8,
    address: [u8; 16],
    padding: [u8; PADDING_SIZE],
}

impl ArepFrame {
    pub fn new(requested: Ipv6Addr, duplicate: bool) -> Self {
        let flags = if duplicate {
            ArepFlags::DUPLICATE
        } else {
            ArepFlags::empty()
        };

        Self {
            kind: U16::new(PacketType::Arep as u16),
            flags: flags.bits(),
            reserved: 0,
            address: requested.octets(),
            padding: [0; PADDING_SIZE],
        }
    }

    pub fn parse(buf: &[u8]) -> Result<&Self, FrameError> {
        let (frame, _) = LayoutVerified::<_, Self>::new_unaligned_from_prefix(buf)
            .ok_or(FrameError::Truncated)?;
        let frame: &Self = frame.into_ref();
        if frame.kind.get() != PacketType::Arep as u16 {
            return Err(FrameError::WrongType);
        }
        Ok(frame)
    }

    pub fn duplicate(&self) -> bool {
        ArepFlags::from_bits_truncate(self.flags).contains(ArepFlags::DUPLICATE)
    }

    pub fn echoed(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.address)
    }
}
