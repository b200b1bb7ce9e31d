//! # Port Subsystem
//!
//! [`PortSubsystem`] owns every table of the port layer. A session goes
//! through three phases:
//!
//! 1. **Setup**: [`PortSubsystem::new`], then device subsystems call
//!    [`register_handler`](PortSubsystem::register_handler) and configuration
//!    calls [`allow_io`](PortSubsystem::allow_io).
//! 2. [`finalize`](PortSubsystem::finalize) once every device registered. It
//!    reconciles tracing with fast access and may fork the port server.
//! 3. **Runtime**: the dispatch entry points (`inb` .. `outd`, `rep_*`).
//!
//! The tables are only mutated during setup; runtime dispatch reads them.

use crate::config::PortConfig;
use crate::error::{Fatal, PortError};
use crate::gate::{DataPhase, IoGate};
use crate::handler::{Handle, PortHandler};
use crate::hwio::HardwareIo;
use crate::map::{PortMap, RegisterFlags};
use crate::registry::HandlerRegistry;
use crate::standard::IoPermission;
use crate::trace::{PortTrace, TraceSink};
use crate::transport::{HelperLink, Transport};
use log::{debug, error, info, warn};

/// Speed hint of an [`allow_io`](PortSubsystem::allow_io) grant.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum PortSpeed {
    /// Accesses go through the standard handler's slow path.
    #[default]
    Slow,
    /// Direct hardware access is requested for the range.
    Fast,
    /// Direct hardware access, and the range is never traced.
    ForceFast,
}

impl PortSpeed {
    /// Decodes the configuration's signed speed value.
    #[must_use]
    pub const fn from_hint(hint: i32) -> Self {
        match hint {
            i32::MIN..=-1 => Self::Slow,
            0 => Self::Fast,
            _ => Self::ForceFast,
        }
    }

    const fn flags(self) -> RegisterFlags {
        match self {
            Self::Slow => RegisterFlags::NONE,
            Self::Fast => RegisterFlags::FAST,
            Self::ForceFast => RegisterFlags::FORCE_FAST,
        }
    }
}

#[derive(Debug)]
pub struct PortSubsystem {
    pub(crate) config: PortConfig,
    pub(crate) registry: HandlerRegistry,
    pub(crate) map: PortMap,
    pub(crate) trace: PortTrace,
    pub(crate) gate: IoGate,
    exit_early: bool,
}

impl PortSubsystem {
    /// Creates the tables with every port unmapped and the reserved handles
    /// installed.
    #[must_use]
    pub fn new(config: PortConfig, hw: Box<dyn HardwareIo>) -> Self {
        info!(
            "PORT: init, root={} trace level {}",
            config.can_do_root_stuff, config.trace_level
        );
        Self {
            registry: HandlerRegistry::new(&config),
            map: PortMap::new(),
            trace: PortTrace::new(config.trace_level),
            gate: IoGate::new(hw, config.can_do_root_stuff),
            config,
            exit_early: false,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PortConfig {
        &self.config
    }

    #[must_use]
    pub const fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn map(&self) -> &PortMap {
        &self.map
    }

    #[must_use]
    pub const fn gate(&self) -> &IoGate {
        &self.gate
    }

    #[must_use]
    pub const fn trace(&self) -> &PortTrace {
        &self.trace
    }

    /// `true` once a configuration conflict doomed the session.
    #[must_use]
    pub const fn exit_early(&self) -> bool {
        self.exit_early
    }

    #[must_use]
    pub fn handle_of(&self, port: u16) -> Handle {
        self.map.get(port)
    }

    /// Registers `handler` under `name` and claims `[start, end]` for it.
    ///
    /// A name that is already registered keeps its first handler; only the
    /// new range is claimed for it.
    ///
    /// # Errors
    /// [`PortError::Conflict`] if a port of the range belongs to another
    /// handler, [`Fatal::RegistryExhausted`] if no handle is left.
    pub fn register_handler(
        &mut self,
        name: &str,
        handler: Box<dyn PortHandler>,
        start: u16,
        end: u16,
        flags: RegisterFlags,
    ) -> Result<Handle, PortError> {
        let handle = self.registry.register(name, handler)?;
        self.claim_ports(handle, start, end, flags)?;
        Ok(handle)
    }

    pub(crate) fn claim_ports(
        &mut self,
        handle: Handle,
        start: u16,
        end: u16,
        flags: RegisterFlags,
    ) -> Result<(), PortError> {
        if let Err(conflict) = self.map.claim(handle, start, end) {
            self.exit_early = true;
            let err = PortError::Conflict {
                port: conflict.port,
                existing: self.registry.name(conflict.existing).to_owned(),
                requested: self.registry.name(handle).to_owned(),
            };
            error!("{err}");
            return Err(err);
        }
        if end < start {
            return Ok(());
        }

        if flags.force_fast() {
            for port in start..=end {
                self.trace.force_fast(port);
            }
        }
        if flags.fast() {
            let len = usize::from(end - start) + 1;
            if let Err(e) = self.gate.set_ioperm(start, len, true) {
                debug!("PORT: no fast access to [{start:#x}-{end:#x}]: {e}");
            }
        }

        debug!(
            "PORT: registered \"{}\" handle={handle} [{start:#x}-{end:#x}] fast={} ({}/{} handles)",
            self.registry.name(handle),
            u8::from(flags.fast()),
            self.registry.len(),
            self.registry.capacity()
        );
        Ok(())
    }

    /// Grants hardware access to `size` ports from `start` through the
    /// standard handler for `permission`.
    ///
    /// Masks are only kept for single-port grants. A range with a
    /// non-identity mask is granted without masks.
    ///
    /// # Errors
    /// [`PortError::PrivilegeRequired`] without elevated rights, or
    /// [`PortError::Conflict`] if a port already belongs to a device.
    pub fn allow_io(
        &mut self,
        start: u16,
        size: usize,
        permission: IoPermission,
        or_mask: u8,
        and_mask: u8,
        speed: PortSpeed,
    ) -> Result<(), PortError> {
        if !self.config.can_do_root_stuff {
            warn!("PORT: allow_io for port {start:#06x}:{size} requires root privileges");
            return Err(PortError::PrivilegeRequired);
        }
        if size == 0 {
            return Ok(());
        }

        let end = u16::try_from(usize::from(start).saturating_add(size - 1)).unwrap_or(u16::MAX);
        let masked = and_mask != 0xff || or_mask != 0;
        if masked && size > 1 {
            warn!(
                "PORT: andmask & ormask not supported for multiple ports, ignored for [{start:#x}-{end:#x}]"
            );
        }

        self.claim_ports(permission.handle(), start, end, speed.flags())?;
        if masked && size == 1 {
            self.gate.set_masks(start, and_mask, or_mask);
        }

        info!(
            "PORT: allow_io range [{start:#x}-{end:#x}] {permission:?} andmask={and_mask:#04x} ormask={or_mask:#04x} {speed:?}"
        );
        Ok(())
    }

    /// Completes setup once every device registered.
    ///
    /// Force-fast ports leave the trace map. Traced standard ports lose their
    /// direct access so every access is observed. With elevated rights the
    /// port server is forked if any standard port is mapped, or the PCI or
    /// native speaker access was requested.
    ///
    /// # Errors
    /// [`Fatal::HelperSpawn`] if the port server could not be started.
    pub fn finalize(&mut self) -> Result<(), Fatal> {
        if self.trace.any_marked() {
            for port in 0..=u16::MAX {
                if self.trace.is_force_fast(port) {
                    self.trace.unmark(port);
                }
                if self.trace.is_marked(port)
                    && self.map.get(port).is_standard()
                    && self.gate.io_bitmap().test(port)
                {
                    match self.gate.set_ioperm(port, 1, false) {
                        Ok(()) => info!("PORT: switched off ioperm for traced port {port:#x}"),
                        Err(e) => debug!("PORT: ioperm off for {port:#x} failed: {e}"),
                    }
                }
            }
        }

        let needs_helper = self.config.pci || self.config.speaker_native || self.map.any_standard();
        if self.config.can_do_root_stuff && needs_helper && !self.gate.has_helper() {
            self.spawn_helper()?;
        }
        Ok(())
    }

    /// Terminates and reaps the port server, if there is one.
    pub fn shutdown(&mut self) {
        if let Some(link) = self.gate.take_helper() {
            info!("PORT: stopping port server");
            link.terminate();
        }
    }

    /// Unmaps every port and clears masks and trace maps. Registered
    /// handlers stay.
    pub fn reset_map(&mut self) {
        self.map.clear();
        self.gate.reset_masks();
        self.trace.reset_maps();
        debug!("PORT: port map released");
    }

    pub fn enable_trace(&mut self, first: u16, last: u16) {
        self.trace.enable(first, last);
    }

    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    pub fn set_trace_level(&mut self, level: u8) {
        self.trace.set_level(level);
    }

    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.trace.set_sink(sink);
    }

    /// # Errors
    /// [`Fatal::CriticalSectionConflict`] if a critical section is active.
    pub fn enter_critical(&mut self, label: &'static str) -> Result<(), Fatal> {
        self.gate.critical_mut().enter(label).inspect_err(|e| error!("{e}"))
    }

    /// # Errors
    /// [`Fatal::LeaveWithoutEnter`] if no critical section is active.
    pub fn leave_critical(&mut self) -> Result<(), Fatal> {
        self.gate.critical_mut().leave().inspect_err(|e| error!("{e}"))
    }

    /// Uses `transport` as the link to an already running port server.
    pub fn attach_helper(&mut self, transport: Box<dyn Transport>) {
        if let Some(old) = self.gate.take_helper() {
            old.terminate();
        }
        self.gate.attach_helper(HelperLink::attached(transport));
    }

    /// Exit notification for a child process.
    ///
    /// # Errors
    /// [`Fatal::HelperTerminated`] if `pid` is the port server.
    pub fn handle_child_exit(&mut self, pid: libc::pid_t) -> Result<(), Fatal> {
        if self.gate.helper().and_then(HelperLink::pid) != Some(pid) {
            return Ok(());
        }
        drop(self.gate.take_helper());
        let err = Fatal::HelperTerminated {
            reason: format!("process {pid} exited"),
        };
        error!("{err}");
        Err(err)
    }

    /// Checks without blocking whether the forked port server is still alive.
    ///
    /// # Errors
    /// [`Fatal::HelperTerminated`] if it exited.
    pub fn poll_helper(&mut self) -> Result<(), Fatal> {
        let Some(pid) = self.gate.helper().and_then(HelperLink::pid) else {
            return Ok(());
        };
        let mut status = 0;
        let rc = unsafe { libc::waitpid(pid, &raw mut status, libc::WNOHANG) };
        if rc == pid {
            return self.handle_child_exit(pid);
        }
        Ok(())
    }

    /// Address write plus data access as one bus cycle.
    ///
    /// # Errors
    /// See [`IoGate::combined_cycle`].
    pub fn combined_cycle(&mut self, address_port: u16, address: u32, data: DataPhase) -> Result<u32, Fatal> {
        self.gate.combined_cycle(address_port, address, data)
    }

    /// # Errors
    /// [`Fatal::HelperTerminated`] if the port server is gone.
    pub fn flush_pending_retrace(&mut self) -> Result<bool, Fatal> {
        self.gate.flush_pending_retrace()
    }
}

impl Drop for PortSubsystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}
