//! # Port Subsystem Errors
//!
//! Two categories exist. [`PortError`] is returned from setup-time calls and
//! leaves the decision to the caller. [`Fatal`] marks an unrecoverable
//! condition; it unwinds through every dispatch call up to the session
//! owner, which logs it and terminates with [`Fatal::exit_code`].

/// Unrecoverable conditions, each mapped to a stable process exit code.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Fatal {
    #[error("PORT: too many IO devices registering \"{name}\", capacity is {capacity}")]
    RegistryExhausted { name: String, capacity: usize },

    #[error("Critical section conflict for {held} and {requested}")]
    CriticalSectionConflict {
        held: &'static str,
        requested: &'static str,
    },

    #[error("leave_critical_section without enter")]
    LeaveWithoutEnter,

    #[error("Port {port:#x} is not available ({operation}), \"{holder}\" failed")]
    CriticalPortUnavailable {
        port: u16,
        operation: &'static str,
        holder: &'static str,
    },

    #[error("port server terminated: {reason}")]
    HelperTerminated { reason: String },

    #[error("failed to start port server: {reason}")]
    HelperSpawn { reason: String },
}

impl Fatal {
    /// The exit code the emulator terminates with for this condition.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::RegistryExhausted { .. } => 77,
            Self::CriticalSectionConflict { .. } | Self::LeaveWithoutEnter => 49,
            Self::CriticalPortUnavailable { .. } => 46,
            Self::HelperTerminated { .. } | Self::HelperSpawn { .. } => 1,
        }
    }

    pub(crate) fn helper_io(err: &std::io::Error) -> Self {
        Self::HelperTerminated {
            reason: err.to_string(),
        }
    }
}

/// Errors of the registration API.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PortError {
    /// The port already belongs to a different handler. The session is
    /// marked for early exit.
    #[error("PORT: conflicting devices: {requested} & {existing} for port {port:#x}")]
    Conflict {
        port: u16,
        existing: String,
        requested: String,
    },

    /// Direct port access was requested without elevated rights.
    #[error("direct port I/O requires elevated privileges")]
    PrivilegeRequired,

    #[error(transparent)]
    Fatal(#[from] Fatal),
}
