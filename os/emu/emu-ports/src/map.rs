//! # Port Map
//!
//! One [`Handle`] per port number. A port belongs to at most one handler;
//! claims are all-or-nothing.

use crate::access::Access;
use crate::handler::Handle;
use bitfield_struct::bitfield;

const PORTS: usize = 0x1_0000;

/// Options of a port range claim.
#[bitfield(u8)]
#[derive(Eq, PartialEq)]
pub struct RegisterFlags {
    /// Try to obtain direct hardware access for the range.
    pub fast: bool,
    /// Never trace the range.
    pub force_fast: bool,
    #[bits(6)]
    __: u8,
}

impl RegisterFlags {
    pub const NONE: Self = Self::new();
    pub const FAST: Self = Self::new().with_fast(true);
    pub const FORCE_FAST: Self = Self::new().with_fast(true).with_force_fast(true);
}

/// First port of a failed claim and its current owner.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ClaimConflict {
    pub port: u16,
    pub existing: Handle,
}

pub struct PortMap {
    handles: Box<[Handle]>,
}

impl core::fmt::Debug for PortMap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let claimed = self.handles.iter().filter(|h| **h != Handle::NONE).count();
        f.debug_struct("PortMap").field("claimed", &claimed).finish()
    }
}

impl Default for PortMap {
    fn default() -> Self {
        Self::new()
    }
}

impl PortMap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: vec![Handle::NONE; PORTS].into_boxed_slice(),
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, port: u16) -> Handle {
        self.handles[usize::from(port)]
    }

    /// Assigns `handle` to every port of `[start, end]`. Ports already owned
    /// by `handle` stay as they are. An empty range claims nothing.
    ///
    /// # Errors
    /// The first port owned by another handler; no port is changed then.
    pub fn claim(&mut self, handle: Handle, start: u16, end: u16) -> Result<(), ClaimConflict> {
        if end < start {
            return Ok(());
        }
        let range = usize::from(start)..=usize::from(end);
        if let Some((offset, existing)) = self.handles[range.clone()]
            .iter()
            .enumerate()
            .find(|(_, h)| **h != Handle::NONE && **h != handle)
        {
            let port = start.wrapping_add(u16::try_from(offset).unwrap_or(0));
            return Err(ClaimConflict {
                port,
                existing: *existing,
            });
        }
        self.handles[range].fill(handle);
        Ok(())
    }

    /// `true` if every port of an access of `span` ports starting at `port`
    /// reaches the same byte handler for `access`. Standard handles that
    /// share the hardware path count as one handler.
    #[must_use]
    pub fn same_handler(&self, port: u16, span: u16, access: Access) -> bool {
        let first = self.get(port).byte_path(access);
        (1..span).all(|i| self.get(port.wrapping_add(i)).byte_path(access) == first)
    }

    #[must_use]
    pub fn any_standard(&self) -> bool {
        self.handles.iter().any(|h| h.is_standard())
    }

    pub fn clear(&mut self) {
        self.handles.fill(Handle::NONE);
    }
}
