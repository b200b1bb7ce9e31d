//! # Port Server Wire Format
//!
//! The main emulator process and the privileged port server exchange
//! fixed-size [`PortRequest`] records over a pair of pipes. There is no
//! framing beyond the record size, and every field is encoded in host byte
//! order because both ends always run on the same machine.
//!
//! ```text
//!  offset  size            field
//!  0       2               port
//!  2       2               reserved (zero)
//!  4       4               operation tag
//!  8       size_of<usize>  value
//! ```
//!
//! Every request yields exactly one response record, except
//! [`Operation::Exit`] (no response) and [`Operation::ChainedAddress`],
//! whose single response is produced after the data phase that follows it.

#![no_std]

use core::mem::size_of;

/// Size in bytes of one encoded [`PortRequest`].
pub const RECORD_SIZE: usize = size_of::<PortRequest>();

/// The operation carried by a [`PortRequest`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u32)]
pub enum Operation {
    ByteIn = 0,
    ByteOut = 1,
    WordIn = 2,
    WordOut = 3,
    DwordIn = 4,
    DwordOut = 5,
    /// Address phase of a combined bus cycle. The server performs the dword
    /// write immediately and then reads the data-phase request.
    ChainedAddress = 6,
    /// Terminate the server. No response is sent.
    Exit = 7,
}

impl Operation {
    /// Decodes a raw tag. Every tag at or above [`Operation::Exit`] terminates.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::ByteIn,
            1 => Self::ByteOut,
            2 => Self::WordIn,
            3 => Self::WordOut,
            4 => Self::DwordIn,
            5 => Self::DwordOut,
            6 => Self::ChainedAddress,
            _ => Self::Exit,
        }
    }

    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        self as u32
    }

    /// `true` for the operations whose response carries a value read from a port.
    #[inline]
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::ByteIn | Self::WordIn | Self::DwordIn)
    }
}

/// One request (or response) of the port server protocol.
#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct PortRequest {
    /// The I/O port the operation targets.
    pub port: u16,

    /// Reserved; must be zero.
    pub reserved: u16,

    /// Raw [`Operation`] tag.
    pub op: u32,

    /// Value to write or, in a response to a read, the value read.
    pub value: usize,
}

impl PortRequest {
    #[inline]
    #[must_use]
    pub const fn new(port: u16, op: Operation, value: usize) -> Self {
        Self {
            port,
            reserved: 0,
            op: op.to_raw(),
            value,
        }
    }

    #[inline]
    #[must_use]
    pub const fn exit() -> Self {
        Self::new(0, Operation::Exit, 0)
    }

    #[inline]
    #[must_use]
    pub const fn operation(&self) -> Operation {
        Operation::from_raw(self.op)
    }

    /// Encodes the record in host byte order.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[0..2].copy_from_slice(&self.port.to_ne_bytes());
        out[2..4].copy_from_slice(&self.reserved.to_ne_bytes());
        out[4..8].copy_from_slice(&self.op.to_ne_bytes());
        out[8..8 + size_of::<usize>()].copy_from_slice(&self.value.to_ne_bytes());
        out
    }

    /// Decodes a record previously produced by [`PortRequest::to_bytes`].
    #[must_use]
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        let mut value = [0u8; size_of::<usize>()];
        value.copy_from_slice(&bytes[8..8 + size_of::<usize>()]);
        Self {
            port: u16::from_ne_bytes([bytes[0], bytes[1]]),
            reserved: u16::from_ne_bytes([bytes[2], bytes[3]]),
            op: u32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            value: usize::from_ne_bytes(value),
        }
    }
}
