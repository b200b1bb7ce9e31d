//! # Port Handlers
//!
//! A handler implements the access semantics for a set of ports. Device
//! subsystems implement [`PortHandler`] for their own state and register it
//! under a name; the dispatch layer then routes every access to a claimed
//! port to that handler.
//!
//! ## Capabilities
//! A handler declares which of the six accesses it implements. The dispatch
//! layer honours the declaration:
//!
//! | access            | declared            | not declared |
//! |-------------------|---------------------|--------------|
//! | byte read/write   | handler method      | "not available" stub |
//! | word read/write   | handler method      | two byte accesses at `port`, `port + 1` |
//! | dword read/write  | handler method      | four byte accesses, ascending |
//!
//! Composed accesses re-enter the port map for every byte, so each byte may
//! land on a different handler.

use crate::access::Access;
use crate::error::Fatal;
use crate::gate::IoGate;
use bitfield_struct::bitfield;
use core::fmt;

/// Index of a registered handler.
///
/// ```text
///  0      unmapped ("not available")
///  1..=3  standard hardware access: read/write, read-only, write-only
///  4      legacy video alias of standard read/write
///  5      special-cased video ports
///  6..    registered devices
/// ```
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Default, PartialOrd, Ord)]
pub struct Handle(u8);

impl Handle {
    pub const NONE: Self = Self(0);
    pub const STD_IO: Self = Self(1);
    pub const STD_RD: Self = Self(2);
    pub const STD_WR: Self = Self(3);
    pub const VIDEO_IO: Self = Self(4);
    pub const SPECIAL: Self = Self(5);

    /// The first handle handed out to device registrations.
    pub const FIRST_DEVICE: Self = Self(6);

    #[inline]
    pub(crate) const fn from_u8(raw: u8) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// `true` for the three hardware-backed standard handles.
    #[inline]
    #[must_use]
    pub const fn is_standard(self) -> bool {
        matches!(self.0, 1..=3)
    }

    /// The handle whose byte method serves `access` on this handle. The
    /// standard handles and the video alias all reach hardware through the
    /// same byte path in the directions they implement.
    #[must_use]
    pub const fn byte_path(self, access: Access) -> Self {
        match (access, self.0) {
            (Access::Read, 2 | 4) | (Access::Write, 3 | 4) => Self::STD_IO,
            _ => self,
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// The set of accesses a handler implements natively.
#[bitfield(u8)]
#[derive(Eq, PartialEq)]
pub struct Capabilities {
    pub read_byte: bool,
    pub write_byte: bool,
    pub read_word: bool,
    pub write_word: bool,
    pub read_dword: bool,
    pub write_dword: bool,
    #[bits(2)]
    __: u8,
}

impl Capabilities {
    pub const NONE: Self = Self::new();
    pub const ALL: Self = Self::from_bits(0b0011_1111);
    pub const BYTES: Self = Self::new().with_read_byte(true).with_write_byte(true);
    pub const READ_BYTE: Self = Self::new().with_read_byte(true);
    pub const WRITE_BYTE: Self = Self::new().with_write_byte(true);
}

/// Access semantics for a range of ports.
///
/// The handler's own fields take the place of an opaque context value. Every
/// method receives the [`IoGate`], through which handlers reach real
/// hardware (`std_in*`/`std_out*`) or the "not available" stubs.
///
/// Methods whose capability bit is clear are never called by the dispatch
/// layer. The defaults make every method safe to call anyway: byte accesses
/// fall back to the stubs, wide accesses compose from this handler's own
/// byte methods in ascending port order.
pub trait PortHandler: Send {
    fn capabilities(&self) -> Capabilities;

    /// # Errors
    /// Only [`Fatal`] conditions; the access itself cannot fail.
    fn read_byte(&mut self, gate: &mut IoGate, port: u16) -> Result<u8, Fatal> {
        Ok(gate.not_available_inb(port))
    }

    /// # Errors
    /// Only [`Fatal`] conditions; the access itself cannot fail.
    fn write_byte(&mut self, gate: &mut IoGate, port: u16, value: u8) -> Result<(), Fatal> {
        gate.not_available_outb(port, value)
    }

    /// # Errors
    /// Only [`Fatal`] conditions; the access itself cannot fail.
    fn read_word(&mut self, gate: &mut IoGate, port: u16) -> Result<u16, Fatal> {
        let lo = self.read_byte(gate, port)?;
        let hi = self.read_byte(gate, port.wrapping_add(1))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// # Errors
    /// Only [`Fatal`] conditions; the access itself cannot fail.
    fn write_word(&mut self, gate: &mut IoGate, port: u16, value: u16) -> Result<(), Fatal> {
        let [lo, hi] = value.to_le_bytes();
        self.write_byte(gate, port, lo)?;
        self.write_byte(gate, port.wrapping_add(1), hi)
    }

    /// # Errors
    /// Only [`Fatal`] conditions; the access itself cannot fail.
    fn read_dword(&mut self, gate: &mut IoGate, port: u16) -> Result<u32, Fatal> {
        let mut bytes = [0u8; 4];
        for (offset, byte) in (0u16..).zip(bytes.iter_mut()) {
            *byte = self.read_byte(gate, port.wrapping_add(offset))?;
        }
        Ok(u32::from_le_bytes(bytes))
    }

    /// # Errors
    /// Only [`Fatal`] conditions; the access itself cannot fail.
    fn write_dword(&mut self, gate: &mut IoGate, port: u16, value: u32) -> Result<(), Fatal> {
        for (offset, byte) in (0u16..).zip(value.to_le_bytes()) {
            self.write_byte(gate, port.wrapping_add(offset), byte)?;
        }
        Ok(())
    }
}

/// Handle 0: every access hits the "not available" stubs at its own width.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unmapped;

impl PortHandler for Unmapped {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    fn read_word(&mut self, gate: &mut IoGate, port: u16) -> Result<u16, Fatal> {
        Ok(gate.not_available_inw(port))
    }

    fn write_word(&mut self, gate: &mut IoGate, port: u16, value: u16) -> Result<(), Fatal> {
        gate.not_available_outw(port, value)
    }

    fn read_dword(&mut self, gate: &mut IoGate, port: u16) -> Result<u32, Fatal> {
        Ok(gate.not_available_ind(port))
    }

    fn write_dword(&mut self, gate: &mut IoGate, port: u16, value: u32) -> Result<(), Fatal> {
        gate.not_available_outd(port, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_constants() {
        assert!(Capabilities::ALL.read_dword());
        assert!(Capabilities::ALL.write_word());
        assert!(Capabilities::BYTES.read_byte());
        assert!(!Capabilities::BYTES.read_word());
        assert!(!Capabilities::WRITE_BYTE.read_byte());
        assert_eq!(Capabilities::NONE.into_bits(), 0);
    }

    #[test]
    fn standard_handles() {
        assert!(!Handle::NONE.is_standard());
        assert!(Handle::STD_IO.is_standard());
        assert!(Handle::STD_WR.is_standard());
        assert!(!Handle::VIDEO_IO.is_standard());
        assert_eq!(Handle::FIRST_DEVICE.to_string(), "0x06");
    }
}
