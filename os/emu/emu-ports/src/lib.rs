//! # Emulated I/O Port Space
//!
//! Routes the port accesses of an emulated x86 machine to device handlers
//! and, for hardware-backed ports, to the host's real port space.
//!
//! ```text
//!  CPU emulation ── inb/outw/rep_insb ──▶ PortSubsystem (dispatch)
//!                                             │ port map
//!                        ┌────────────────────┼──────────────┐
//!                        ▼                    ▼              ▼
//!                  device handler     standard handler   "not available"
//!                                             │
//!                                          IoGate
//!                             ┌───────────────┼────────────────┐
//!                             ▼               ▼                ▼
//!                       direct in/out    port server      stub (all ones)
//!                   (IOPL 3 / ioperm)   (forked, IPC)
//! ```
//!
//! Hardware access normally lives in a separate [port server](server)
//! process so that the emulator itself can run without root privileges.
//!
//! ```rust,no_run
//! use emu_ports::{IoPermission, PortConfig, PortSpeed, PortSubsystem, RealHardware};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PortConfig { can_do_root_stuff: true, ..PortConfig::default() };
//! let mut ports = PortSubsystem::new(config, Box::new(RealHardware::new()));
//! ports.allow_io(0x61, 1, IoPermission::ReadWrite, 0, 0xff, PortSpeed::Slow)?;
//! ports.finalize()?;
//! let status = ports.inb(0x61)?;
//! ports.shutdown();
//! # let _ = status;
//! # Ok(())
//! # }
//! ```

#![allow(unsafe_code)]

mod access;
mod bitmap;
pub mod config;
mod critical;
mod dispatch;
mod error;
pub mod gate;
pub mod handler;
mod hwio;
mod map;
mod privilege;
mod registry;
pub mod server;
mod special;
mod standard;
mod subsystem;
pub mod trace;
pub mod transport;

pub use access::{Access, StringDirection, Width};
pub use bitmap::PortBitmap;
pub use config::{PortConfig, TRACE_ALL_LEVEL};
pub use critical::CriticalSection;
pub use error::{Fatal, PortError};
pub use gate::{DataPhase, IoGate};
pub use handler::{Capabilities, Handle, PortHandler, Unmapped};
pub use hwio::{HardwareIo, RealHardware};
pub use map::{ClaimConflict, PortMap, RegisterFlags};
pub use privilege::Iopl;
pub use registry::{HandlerRegistry, RESERVED_HANDLES};
pub use special::SpecialHandler;
pub use standard::{IoPermission, StandardHandler};
pub use subsystem::{PortSpeed, PortSubsystem};
pub use trace::{LogSink, PortTrace, TraceEntry, TraceSink};
pub use transport::{HelperLink, RecordChannel, Transport};
