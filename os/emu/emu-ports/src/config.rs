//! # Port Subsystem Configuration

use crate::registry::RESERVED_HANDLES;

/// Trace verbosity at which every port is traced, not only the ones in the
/// trace map. Composed wide accesses also log their byte sub-accesses.
pub const TRACE_ALL_LEVEL: u8 = 5;

/// Default capacity of the handler registry.
pub const DEFAULT_MAX_HANDLERS: usize = 64;

/// Handles are stored as `u8` in the port map.
pub const MAX_HANDLERS_LIMIT: usize = 256;

/// Session settings the port subsystem consumes. Parsing them is the
/// caller's business.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PortConfig {
    /// The session runs with elevated capability (root and explicit consent).
    pub can_do_root_stuff: bool,

    /// Hardware PCI access was requested; forces the port server.
    pub pci: bool,

    /// The native PC speaker was requested; forces the port server.
    pub speaker_native: bool,

    /// Port trace verbosity: 0 off, 1.. traced ports, [`TRACE_ALL_LEVEL`].. all ports.
    pub trace_level: u8,

    /// Defer retrace-status reads until the attribute controller is written.
    pub emulate_retrace: bool,

    /// Capacity of the handler registry, reserved handles included.
    pub max_handlers: usize,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            can_do_root_stuff: false,
            pci: false,
            speaker_native: false,
            trace_level: 0,
            emulate_retrace: false,
            max_handlers: DEFAULT_MAX_HANDLERS,
        }
    }
}

impl PortConfig {
    /// Registry capacity clamped to what the port map can address.
    #[must_use]
    pub fn handler_capacity(&self) -> usize {
        self.max_handlers.clamp(RESERVED_HANDLES, MAX_HANDLERS_LIMIT)
    }
}
