//! # Dispatch Entry Points
//!
//! Every emulated `in`/`out` lands here. The port's handler is looked up in
//! the map and called at the requested width if it declares that access.
//! Otherwise:
//!
//! * a byte access hits the "not available" stub,
//! * a word access becomes byte accesses at `port` and `port + 1`,
//! * a dword access becomes byte accesses at `port` .. `port + 3`,
//!
//! composed in ascending port order, low byte first. Each byte of a composed
//! access is dispatched on its own and may reach another handler.
//!
//! The trace records the access at the requested width: writes before the
//! handler runs, reads once the value is known.

use crate::access::{Access, StringDirection, Width};
use crate::error::Fatal;
use crate::subsystem::PortSubsystem;

impl PortSubsystem {
    /// # Errors
    /// A [`Fatal`] condition raised by the handler.
    pub fn inb(&mut self, port: u16) -> Result<u8, Fatal> {
        let value = self.byte_in(port)?;
        self.trace.access(port, Access::Read, Width::Byte, u32::from(value));
        Ok(value)
    }

    /// # Errors
    /// A [`Fatal`] condition raised by the handler.
    pub fn outb(&mut self, port: u16, value: u8) -> Result<(), Fatal> {
        self.trace.access(port, Access::Write, Width::Byte, u32::from(value));
        self.byte_out(port, value)
    }

    /// # Errors
    /// A [`Fatal`] condition raised by a handler.
    pub fn inw(&mut self, port: u16) -> Result<u16, Fatal> {
        let handle = self.map.get(port);
        let value = if self.registry.capabilities(handle).read_word() {
            self.registry
                .get_mut(handle)
                .handler
                .read_word(&mut self.gate, port)?
        } else {
            let lo = self.composed_in(port)?;
            let hi = self.composed_in(port.wrapping_add(1))?;
            u16::from_le_bytes([lo, hi])
        };
        self.trace.access(port, Access::Read, Width::Word, u32::from(value));
        Ok(value)
    }

    /// # Errors
    /// A [`Fatal`] condition raised by a handler.
    pub fn outw(&mut self, port: u16, value: u16) -> Result<(), Fatal> {
        self.trace.access(port, Access::Write, Width::Word, u32::from(value));
        let handle = self.map.get(port);
        if self.registry.capabilities(handle).write_word() {
            return self
                .registry
                .get_mut(handle)
                .handler
                .write_word(&mut self.gate, port, value);
        }
        self.composed_write(port, Width::Word, &value.to_le_bytes())
    }

    /// # Errors
    /// A [`Fatal`] condition raised by a handler.
    pub fn ind(&mut self, port: u16) -> Result<u32, Fatal> {
        let handle = self.map.get(port);
        let value = if self.registry.capabilities(handle).read_dword() {
            self.registry
                .get_mut(handle)
                .handler
                .read_dword(&mut self.gate, port)?
        } else {
            let mut bytes = [0u8; 4];
            for (offset, byte) in (0u16..).zip(bytes.iter_mut()) {
                *byte = self.composed_in(port.wrapping_add(offset))?;
            }
            u32::from_le_bytes(bytes)
        };
        self.trace.access(port, Access::Read, Width::Dword, value);
        Ok(value)
    }

    /// # Errors
    /// A [`Fatal`] condition raised by a handler.
    pub fn outd(&mut self, port: u16, value: u32) -> Result<(), Fatal> {
        self.trace.access(port, Access::Write, Width::Dword, value);
        let handle = self.map.get(port);
        if self.registry.capabilities(handle).write_dword() {
            return self
                .registry
                .get_mut(handle)
                .handler
                .write_dword(&mut self.gate, port, value);
        }
        self.composed_write(port, Width::Dword, &value.to_le_bytes())
    }

    pub(crate) fn byte_in(&mut self, port: u16) -> Result<u8, Fatal> {
        let handle = self.map.get(port);
        if !self.registry.capabilities(handle).read_byte() {
            return Ok(self.gate.not_available_inb(port));
        }
        self.registry
            .get_mut(handle)
            .handler
            .read_byte(&mut self.gate, port)
    }

    pub(crate) fn byte_out(&mut self, port: u16, value: u8) -> Result<(), Fatal> {
        let handle = self.map.get(port);
        if !self.registry.capabilities(handle).write_byte() {
            return self.gate.not_available_outb(port, value);
        }
        self.registry
            .get_mut(handle)
            .handler
            .write_byte(&mut self.gate, port, value)
    }

    fn composed_in(&mut self, port: u16) -> Result<u8, Fatal> {
        let value = self.byte_in(port)?;
        self.trace.sub_access(port, Access::Read, value);
        Ok(value)
    }

    /// Byte writes of a `width` write, ascending from `port`.
    fn composed_write(&mut self, port: u16, width: Width, bytes: &[u8]) -> Result<(), Fatal> {
        let outer = self.gate.set_write_width(width);
        let result = (0u16..).zip(bytes).try_for_each(|(offset, &byte)| {
            let port = port.wrapping_add(offset);
            self.trace.sub_access(port, Access::Write, byte);
            self.byte_out(port, byte)
        });
        self.gate.set_write_width(outer);
        result
    }

    // ---------------------------------------------------------------------
    // string I/O

    /// `REP INSB`: one [`inb`](Self::inb) per element of `buf`, walked in
    /// `direction`. Returns the number of bytes transferred.
    ///
    /// # Errors
    /// A [`Fatal`] condition raised by the handler.
    pub fn rep_inb(&mut self, port: u16, buf: &mut [u8], direction: StringDirection) -> Result<usize, Fatal> {
        walk_mut(buf, direction, |slot| {
            *slot = self.inb(port)?;
            Ok(())
        })?;
        Ok(buf.len())
    }

    /// # Errors
    /// A [`Fatal`] condition raised by a handler.
    pub fn rep_inw(&mut self, port: u16, buf: &mut [u16], direction: StringDirection) -> Result<usize, Fatal> {
        walk_mut(buf, direction, |slot| {
            *slot = self.inw(port)?;
            Ok(())
        })?;
        Ok(buf.len() * usize::from(Width::Word.bytes()))
    }

    /// # Errors
    /// A [`Fatal`] condition raised by a handler.
    pub fn rep_ind(&mut self, port: u16, buf: &mut [u32], direction: StringDirection) -> Result<usize, Fatal> {
        walk_mut(buf, direction, |slot| {
            *slot = self.ind(port)?;
            Ok(())
        })?;
        Ok(buf.len() * usize::from(Width::Dword.bytes()))
    }

    /// `REP OUTSB`: one [`outb`](Self::outb) per element of `buf`, walked in
    /// `direction`. Returns the number of bytes transferred.
    ///
    /// # Errors
    /// A [`Fatal`] condition raised by the handler.
    pub fn rep_outb(&mut self, port: u16, buf: &[u8], direction: StringDirection) -> Result<usize, Fatal> {
        walk(buf, direction, |&value| self.outb(port, value))?;
        Ok(buf.len())
    }

    /// # Errors
    /// A [`Fatal`] condition raised by a handler.
    pub fn rep_outw(&mut self, port: u16, buf: &[u16], direction: StringDirection) -> Result<usize, Fatal> {
        walk(buf, direction, |&value| self.outw(port, value))?;
        Ok(buf.len() * usize::from(Width::Word.bytes()))
    }

    /// # Errors
    /// A [`Fatal`] condition raised by a handler.
    pub fn rep_outd(&mut self, port: u16, buf: &[u32], direction: StringDirection) -> Result<usize, Fatal> {
        walk(buf, direction, |&value| self.outd(port, value))?;
        Ok(buf.len() * usize::from(Width::Dword.bytes()))
    }
}

fn walk_mut<T>(
    buf: &mut [T],
    direction: StringDirection,
    step: impl FnMut(&mut T) -> Result<(), Fatal>,
) -> Result<(), Fatal> {
    match direction {
        StringDirection::Forward => buf.iter_mut().try_for_each(step),
        StringDirection::Backward => buf.iter_mut().rev().try_for_each(step),
    }
}

fn walk<T>(
    buf: &[T],
    direction: StringDirection,
    step: impl FnMut(&T) -> Result<(), Fatal>,
) -> Result<(), Fatal> {
    match direction {
        StringDirection::Forward => buf.iter().try_for_each(step),
        StringDirection::Backward => buf.iter().rev().try_for_each(step),
    }
}
