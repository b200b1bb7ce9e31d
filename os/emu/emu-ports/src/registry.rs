//! # Handler Registry
//!
//! Fixed-capacity table of named handlers. The first [`RESERVED_HANDLES`]
//! slots are installed at construction and never change:
//!
//! | handle | name            | handler |
//! |--------|-----------------|---------|
//! | 0      | `unknown port`  | [`Unmapped`] |
//! | 1      | `std port io`   | standard, read + write |
//! | 2      | `std port read` | standard, read only |
//! | 3      | `std port write`| standard, write only |
//! | 4      | `video port io` | standard, read + write |
//! | 5      | `extra stuff`   | [`SpecialHandler`] |

use crate::config::PortConfig;
use crate::error::Fatal;
use crate::handler::{Capabilities, Handle, PortHandler, Unmapped};
use crate::special::SpecialHandler;
use crate::standard::{IoPermission, StandardHandler};
use log::{debug, error};

/// Number of handles installed by the registry itself.
pub const RESERVED_HANDLES: usize = 6;

pub(crate) struct RegisteredHandler {
    pub name: String,
    pub caps: Capabilities,
    pub handler: Box<dyn PortHandler>,
}

pub struct HandlerRegistry {
    entries: Vec<RegisteredHandler>,
    capacity: usize,
}

impl core::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| &e.name))
            .finish()
    }
}

impl HandlerRegistry {
    #[must_use]
    pub fn new(config: &PortConfig) -> Self {
        let capacity = config.handler_capacity();
        let mut registry = Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        };
        registry.install("unknown port", Box::new(Unmapped));
        registry.install("std port io", Box::new(StandardHandler::new(IoPermission::ReadWrite)));
        registry.install("std port read", Box::new(StandardHandler::new(IoPermission::ReadOnly)));
        registry.install("std port write", Box::new(StandardHandler::new(IoPermission::WriteOnly)));
        registry.install("video port io", Box::new(StandardHandler::new(IoPermission::ReadWrite)));
        registry.install("extra stuff", Box::new(SpecialHandler::new(config.emulate_retrace)));
        debug_assert_eq!(registry.entries.len(), RESERVED_HANDLES);
        registry
    }

    fn install(&mut self, name: &str, handler: Box<dyn PortHandler>) {
        self.entries.push(RegisteredHandler {
            name: name.to_owned(),
            caps: handler.capabilities(),
            handler,
        });
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<Handle> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .and_then(|i| u8::try_from(i).ok())
            .map(Handle::from_u8)
    }

    /// Returns the handle registered under `name`, allocating the next free
    /// one if the name is new. For a known name `handler` is dropped and the
    /// first registration stays in effect.
    ///
    /// # Errors
    /// [`Fatal::RegistryExhausted`] once every slot is taken.
    pub fn register(&mut self, name: &str, handler: Box<dyn PortHandler>) -> Result<Handle, Fatal> {
        if let Some(handle) = self.find(name) {
            debug!("PORT: reusing handle {handle} for \"{name}\"");
            return Ok(handle);
        }

        let raw = u8::try_from(self.entries.len()).ok().filter(|_| self.entries.len() < self.capacity);
        let Some(raw) = raw else {
            error!("PORT: too many IO devices, increase the handler capacity");
            return Err(Fatal::RegistryExhausted {
                name: name.to_owned(),
                capacity: self.capacity,
            });
        };

        self.install(name, handler);
        Ok(Handle::from_u8(raw))
    }

    /// The entry for `handle`; unknown handles resolve to handle 0.
    pub(crate) fn get_mut(&mut self, handle: Handle) -> &mut RegisteredHandler {
        let index = if handle.index() < self.entries.len() {
            handle.index()
        } else {
            0
        };
        &mut self.entries[index]
    }

    #[must_use]
    pub fn name(&self, handle: Handle) -> &str {
        self.entries
            .get(handle.index())
            .map_or("unknown port", |e| e.name.as_str())
    }

    #[must_use]
    pub fn capabilities(&self, handle: Handle) -> Capabilities {
        self.entries
            .get(handle.index())
            .map_or(Capabilities::NONE, |e| e.caps)
    }

    pub(crate) const fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    impl PortHandler for Nop {
        fn capabilities(&self) -> Capabilities {
            Capabilities::BYTES
        }
    }

    #[test]
    fn reserved_handles_are_installed() {
        let registry = HandlerRegistry::new(&PortConfig::default());
        assert_eq!(registry.len(), RESERVED_HANDLES);
        assert_eq!(registry.find("unknown port"), Some(Handle::NONE));
        assert_eq!(registry.find("std port write"), Some(Handle::STD_WR));
        assert_eq!(registry.find("extra stuff"), Some(Handle::SPECIAL));
        assert_eq!(registry.capabilities(Handle::NONE), Capabilities::ALL);
    }

    #[test]
    fn same_name_same_handle() {
        let mut registry = HandlerRegistry::new(&PortConfig::default());
        let a = registry.register("serial", Box::new(Nop)).unwrap();
        let b = registry.register("serial", Box::new(Nop)).unwrap();
        assert_eq!(a, Handle::FIRST_DEVICE);
        assert_eq!(a, b);
        assert_eq!(registry.len(), RESERVED_HANDLES + 1);
    }

    #[test]
    fn exhaustion_is_fatal() {
        let config = PortConfig {
            max_handlers: RESERVED_HANDLES + 1,
            ..PortConfig::default()
        };
        let mut registry = HandlerRegistry::new(&config);
        registry.register("one", Box::new(Nop)).unwrap();
        let err = registry.register("two", Box::new(Nop)).unwrap_err();
        assert_eq!(err.exit_code(), 77);
    }

    #[test]
    fn unknown_handle_falls_back_to_unmapped() {
        let mut registry = HandlerRegistry::new(&PortConfig::default());
        assert_eq!(registry.get_mut(Handle::from_u8(200)).name, "unknown port");
        assert_eq!(registry.name(Handle::from_u8(200)), "unknown port");
    }
}
