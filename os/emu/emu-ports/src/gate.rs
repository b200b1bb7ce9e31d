//! # Fast-Path Gate
//!
//! [`IoGate`] decides how a hardware-backed access is carried out:
//!
//! ```text
//! std_in*/std_out*(port)
//!     │
//!     ├─ IOPL 3, or every byte of the access in the ioperm map
//!     │      → direct `in`/`out` on the host
//!     │
//!     ├─ no port server
//!     │      → "not available" stub (all-ones / ignored write)
//!     │
//!     └─ port server attached
//!            → one request, block for its response
//! ```
//!
//! The gate also owns the per-port AND/OR masks, the critical-section guard
//! that turns unavailable writes into fatal errors, and the pending retrace
//! read of the special video handler.

use crate::access::Width;
use crate::bitmap::PortBitmap;
use crate::critical::CriticalSection;
use crate::error::Fatal;
use crate::hwio::HardwareIo;
use crate::privilege::Iopl;
use crate::transport::{HelperLink, low_u8, low_u16, low_u32, word};
use emu_portserver_abi::{Operation, PortRequest};
use log::{debug, info};
use std::io;

const PORTS: usize = 0x1_0000;

/// Data phase of a combined bus cycle.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DataPhase {
    ReadByte(u16),
    ReadWord(u16),
    ReadDword(u16),
    WriteByte(u16, u8),
    WriteWord(u16, u16),
    WriteDword(u16, u32),
}

impl DataPhase {
    fn request(self) -> PortRequest {
        match self {
            Self::ReadByte(port) => PortRequest::new(port, Operation::ByteIn, 0),
            Self::ReadWord(port) => PortRequest::new(port, Operation::WordIn, 0),
            Self::ReadDword(port) => PortRequest::new(port, Operation::DwordIn, 0),
            Self::WriteByte(port, v) => PortRequest::new(port, Operation::ByteOut, usize::from(v)),
            Self::WriteWord(port, v) => PortRequest::new(port, Operation::WordOut, usize::from(v)),
            Self::WriteDword(port, v) => PortRequest::new(port, Operation::DwordOut, word(v)),
        }
    }

    const fn width(self) -> Width {
        match self {
            Self::ReadByte(_) | Self::WriteByte(..) => Width::Byte,
            Self::ReadWord(_) | Self::WriteWord(..) => Width::Word,
            Self::ReadDword(_) | Self::WriteDword(..) => Width::Dword,
        }
    }
}

pub struct IoGate {
    hw: Box<dyn HardwareIo>,
    can_do_root_stuff: bool,
    iopl: Iopl,
    io_bitmap: PortBitmap,
    and_mask: Box<[u8]>,
    or_mask: Box<[u8]>,
    helper: Option<HelperLink>,
    critical: CriticalSection,
    write_width: Width,
    retrace_pending: Option<u16>,
}

impl core::fmt::Debug for IoGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IoGate")
            .field("can_do_root_stuff", &self.can_do_root_stuff)
            .field("iopl", &self.iopl)
            .field("io_bitmap", &self.io_bitmap)
            .field("helper", &self.helper)
            .field("critical", &self.critical)
            .finish_non_exhaustive()
    }
}

impl IoGate {
    #[must_use]
    pub fn new(hw: Box<dyn HardwareIo>, can_do_root_stuff: bool) -> Self {
        Self {
            hw,
            can_do_root_stuff,
            iopl: Iopl::Level0,
            io_bitmap: PortBitmap::new(),
            and_mask: vec![0xff; PORTS].into_boxed_slice(),
            or_mask: vec![0; PORTS].into_boxed_slice(),
            helper: None,
            critical: CriticalSection::new(),
            write_width: Width::Byte,
            retrace_pending: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn iopl(&self) -> Iopl {
        self.iopl
    }

    /// `true` if an access of `width` at `port` may touch hardware directly.
    #[inline]
    #[must_use]
    pub fn has_direct_access(&self, port: u16, width: Width) -> bool {
        self.iopl.grants_all_ports() || self.io_bitmap.covers(port, width)
    }

    #[inline]
    #[must_use]
    pub fn io_bitmap(&self) -> &PortBitmap {
        &self.io_bitmap
    }

    /// Raises the process IOPL through the hardware backend.
    ///
    /// # Errors
    /// The OS error if the level change was refused.
    pub fn acquire_iopl(&mut self, level: Iopl) -> io::Result<()> {
        self.hw.iopl(level)?;
        self.iopl = level;
        Ok(())
    }

    /// # Errors
    /// The OS error if the ids could not be reset.
    pub fn drop_privileges(&mut self) -> io::Result<()> {
        self.hw.drop_privileges()
    }

    /// Forgets every ioperm grant. A forked process does not inherit the
    /// grants of its parent, so the map no longer describes it.
    pub(crate) fn forget_ioperm(&mut self) {
        self.io_bitmap.clear_all();
    }

    /// Grants or revokes direct access to a port range and mirrors a
    /// successful change into the ioperm map. Grants are refused without
    /// elevated rights.
    ///
    /// # Errors
    /// `PermissionDenied` without elevated rights, or the OS error.
    pub fn set_ioperm(&mut self, start: u16, len: usize, enable: bool) -> io::Result<()> {
        if enable && !self.can_do_root_stuff {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        let result = self.hw.ioperm(start, len, enable);
        if result.is_ok() {
            self.io_bitmap.assign_range(start, len, enable);
        }
        info!(
            "PORT: set_ioperm [{start:x}:{len}:{}] returns {}",
            u8::from(enable),
            if result.is_ok() { 0 } else { -1 }
        );
        result
    }

    pub(crate) fn set_masks(&mut self, port: u16, and_mask: u8, or_mask: u8) {
        self.and_mask[usize::from(port)] = and_mask;
        self.or_mask[usize::from(port)] = or_mask;
    }

    #[must_use]
    pub fn masks(&self, port: u16) -> (u8, u8) {
        (self.and_mask[usize::from(port)], self.or_mask[usize::from(port)])
    }

    pub(crate) fn reset_masks(&mut self) {
        self.and_mask.fill(0xff);
        self.or_mask.fill(0);
    }

    #[inline]
    fn masked(&self, port: u16, value: u8) -> u8 {
        let (and_mask, or_mask) = self.masks(port);
        (value & and_mask) | or_mask
    }

    #[must_use]
    pub const fn helper(&self) -> Option<&HelperLink> {
        self.helper.as_ref()
    }

    #[must_use]
    pub const fn has_helper(&self) -> bool {
        self.helper.is_some()
    }

    pub(crate) fn attach_helper(&mut self, link: HelperLink) {
        self.helper = Some(link);
    }

    pub(crate) const fn take_helper(&mut self) -> Option<HelperLink> {
        self.helper.take()
    }

    #[must_use]
    pub const fn critical(&self) -> &CriticalSection {
        &self.critical
    }

    pub(crate) const fn critical_mut(&mut self) -> &mut CriticalSection {
        &mut self.critical
    }

    /// Sets the width of the write being composed from byte writes and
    /// returns the previous one. Unavailable byte writes report it.
    pub(crate) const fn set_write_width(&mut self, width: Width) -> Width {
        core::mem::replace(&mut self.write_width, width)
    }

    // ---------------------------------------------------------------------
    // "not available" stubs

    /// Unconnected ports read as all ones. Some software probes for cards
    /// by checking for exactly that.
    pub fn not_available_inb(&self, port: u16) -> u8 {
        debug!("PORTb: {port:x} not available for read");
        0xff
    }

    /// # Errors
    /// [`Fatal::CriticalPortUnavailable`] inside a critical section.
    pub fn not_available_outb(&mut self, port: u16, _value: u8) -> Result<(), Fatal> {
        let operation = match self.write_width {
            Width::Byte => "outb",
            Width::Word => "outw",
            Width::Dword => "outd",
        };
        self.critical.check_unavailable_write(port, operation)?;
        debug!("PORTb: {port:x} not available for write");
        Ok(())
    }

    pub fn not_available_inw(&self, port: u16) -> u16 {
        debug!("PORTw: {port:x} not available for read");
        0xffff
    }

    /// # Errors
    /// [`Fatal::CriticalPortUnavailable`] inside a critical section.
    pub fn not_available_outw(&mut self, port: u16, _value: u16) -> Result<(), Fatal> {
        self.critical.check_unavailable_write(port, "outw")?;
        debug!("PORTw: {port:x} not available for write");
        Ok(())
    }

    pub fn not_available_ind(&self, port: u16) -> u32 {
        debug!("PORTd: {port:x} not available for read");
        0xffff_ffff
    }

    /// # Errors
    /// [`Fatal::CriticalPortUnavailable`] inside a critical section.
    pub fn not_available_outd(&mut self, port: u16, _value: u32) -> Result<(), Fatal> {
        self.critical.check_unavailable_write(port, "outd")?;
        debug!("PORTd: {port:x} not available for write");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // standard hardware access

    /// # Errors
    /// [`Fatal::HelperTerminated`] if the port server is gone.
    pub fn std_inb(&mut self, port: u16) -> Result<u8, Fatal> {
        if self.has_direct_access(port, Width::Byte) {
            let value = self.hw.inb(port);
            return Ok(self.masked(port, value));
        }
        let Some(helper) = self.helper.as_mut() else {
            debug!("std_port_inb({port:#X}): port server unavailable");
            return Ok(self.not_available_inb(port));
        };
        let response = helper.round_trip(PortRequest::new(port, Operation::ByteIn, 0))?;
        Ok(low_u8(response.value))
    }

    /// # Errors
    /// [`Fatal::HelperTerminated`] if the port server is gone, or
    /// [`Fatal::CriticalPortUnavailable`] for an unavailable port inside a
    /// critical section.
    pub fn std_outb(&mut self, port: u16, value: u8) -> Result<(), Fatal> {
        if self.has_direct_access(port, Width::Byte) {
            let value = self.masked(port, value);
            self.hw.outb(port, value);
            return Ok(());
        }
        let Some(helper) = self.helper.as_mut() else {
            debug!("std_port_outb({port:#X},{value:#X}): port server unavailable");
            return self.not_available_outb(port, value);
        };
        helper.round_trip(PortRequest::new(port, Operation::ByteOut, usize::from(value)))?;
        Ok(())
    }

    /// # Errors
    /// [`Fatal::HelperTerminated`] if the port server is gone.
    pub fn std_inw(&mut self, port: u16) -> Result<u16, Fatal> {
        if self.has_direct_access(port, Width::Word) {
            return Ok(self.hw.inw(port));
        }
        let Some(helper) = self.helper.as_mut() else {
            debug!("std_port_inw({port:#X}): port server unavailable");
            return Ok(self.not_available_inw(port));
        };
        let response = helper.round_trip(PortRequest::new(port, Operation::WordIn, 0))?;
        Ok(low_u16(response.value))
    }

    /// # Errors
    /// See [`IoGate::std_outb`].
    pub fn std_outw(&mut self, port: u16, value: u16) -> Result<(), Fatal> {
        if self.has_direct_access(port, Width::Word) {
            self.hw.outw(port, value);
            return Ok(());
        }
        let Some(helper) = self.helper.as_mut() else {
            debug!("std_port_outw({port:#X},{value:#X}): port server unavailable");
            return self.not_available_outw(port, value);
        };
        helper.round_trip(PortRequest::new(port, Operation::WordOut, usize::from(value)))?;
        Ok(())
    }

    /// # Errors
    /// [`Fatal::HelperTerminated`] if the port server is gone.
    pub fn std_ind(&mut self, port: u16) -> Result<u32, Fatal> {
        if self.has_direct_access(port, Width::Dword) {
            return Ok(self.hw.inl(port));
        }
        let Some(helper) = self.helper.as_mut() else {
            debug!("std_port_ind({port:#X}): port server unavailable");
            return Ok(self.not_available_ind(port));
        };
        let response = helper.round_trip(PortRequest::new(port, Operation::DwordIn, 0))?;
        Ok(low_u32(response.value))
    }

    /// # Errors
    /// See [`IoGate::std_outb`].
    pub fn std_outd(&mut self, port: u16, value: u32) -> Result<(), Fatal> {
        if self.has_direct_access(port, Width::Dword) {
            self.hw.outl(port, value);
            return Ok(());
        }
        let Some(helper) = self.helper.as_mut() else {
            debug!("std_port_outd({port:#X},{value:#X}): port server unavailable");
            return self.not_available_outd(port, value);
        };
        helper.round_trip(PortRequest::new(port, Operation::DwordOut, word(value)))?;
        Ok(())
    }

    /// Performs an address write immediately followed by a data access,
    /// e.g. a PCI configuration cycle through 0xCF8/0xCFC.
    ///
    /// Through the port server both phases travel back to back and the
    /// server performs them with nothing in between; one response covers
    /// both. Writes return 0.
    ///
    /// # Errors
    /// See [`IoGate::std_outb`].
    pub fn combined_cycle(&mut self, address_port: u16, address: u32, data: DataPhase) -> Result<u32, Fatal> {
        let direct = self.has_direct_access(address_port, Width::Dword)
            && self.has_direct_access(data.request().port, data.width());
        let Some(helper) = self.helper.as_mut().filter(|_| !direct) else {
            self.std_outd(address_port, address)?;
            return self.data_phase(data);
        };
        helper.post(PortRequest::new(address_port, Operation::ChainedAddress, word(address)))?;
        let response = helper.round_trip(data.request())?;
        Ok(match data {
            DataPhase::ReadByte(_) => u32::from(low_u8(response.value)),
            DataPhase::ReadWord(_) => u32::from(low_u16(response.value)),
            DataPhase::ReadDword(_) => low_u32(response.value),
            _ => 0,
        })
    }

    fn data_phase(&mut self, data: DataPhase) -> Result<u32, Fatal> {
        match data {
            DataPhase::ReadByte(port) => self.std_inb(port).map(u32::from),
            DataPhase::ReadWord(port) => self.std_inw(port).map(u32::from),
            DataPhase::ReadDword(port) => self.std_ind(port),
            DataPhase::WriteByte(port, v) => self.std_outb(port, v).map(|()| 0),
            DataPhase::WriteWord(port, v) => self.std_outw(port, v).map(|()| 0),
            DataPhase::WriteDword(port, v) => self.std_outd(port, v).map(|()| 0),
        }
    }

    // ---------------------------------------------------------------------
    // deferred retrace read of the special video handler

    #[must_use]
    pub const fn retrace_pending(&self) -> Option<u16> {
        self.retrace_pending
    }

    pub(crate) const fn set_retrace_pending(&mut self, port: u16) {
        if self.retrace_pending.is_none() {
            self.retrace_pending = Some(port);
        }
    }

    /// Performs the deferred retrace-status read, if any.
    ///
    /// # Errors
    /// [`Fatal::HelperTerminated`] if the port server is gone.
    pub fn flush_pending_retrace(&mut self) -> Result<bool, Fatal> {
        let Some(port) = self.retrace_pending.take() else {
            return Ok(false);
        };
        self.std_inb(port)?;
        Ok(true)
    }
}
