//! # Port Tracing
//!
//! Ports marked in the trace map have every access reported to a
//! [`TraceSink`] once the trace level is non-zero; from
//! [`TRACE_ALL_LEVEL`] on every port is reported. Ports in the force-fast
//! map are never reported, whatever the trace map says.

use crate::access::{Access, Width};
use crate::bitmap::PortBitmap;
use crate::config::TRACE_ALL_LEVEL;
use core::fmt;
use log::info;

/// One traced port access.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct TraceEntry {
    pub port: u16,
    pub access: Access,
    pub width: Width,
    pub value: u32,
}

impl fmt::Display for TraceEntry {
    /// `port symbol value`, both in hex, with the value masked to its width.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:x} {} {:x}",
            self.port,
            self.access.symbol(self.width),
            self.value & self.width.mask()
        )
    }
}

/// Receives traced accesses.
pub trait TraceSink: Send {
    fn record(&mut self, entry: &TraceEntry);
}

/// Forwards trace entries to the `log` facade at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn record(&mut self, entry: &TraceEntry) {
        info!(target: "port_trace", "{entry}");
    }
}

pub struct PortTrace {
    level: u8,
    traced: PortBitmap,
    force_fast: PortBitmap,
    sink: Box<dyn TraceSink>,
}

impl fmt::Debug for PortTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortTrace")
            .field("level", &self.level)
            .field("traced", &self.traced)
            .field("force_fast", &self.force_fast)
            .finish_non_exhaustive()
    }
}

impl PortTrace {
    #[must_use]
    pub fn new(level: u8) -> Self {
        Self {
            level,
            traced: PortBitmap::new(),
            force_fast: PortBitmap::new(),
            sink: Box::new(LogSink),
        }
    }

    pub fn set_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.sink = sink;
    }

    #[inline]
    #[must_use]
    pub const fn level(&self) -> u8 {
        self.level
    }

    pub const fn set_level(&mut self, level: u8) {
        self.level = level;
    }

    /// Adds `[first, last]` to the trace map. An inverted range is ignored.
    pub fn enable(&mut self, first: u16, last: u16) {
        if last < first {
            return;
        }
        info!("PORT: tracing {first:#x}-{last:#x}");
        for port in first..=last {
            self.traced.set(port);
        }
    }

    pub fn clear(&mut self) {
        self.traced.clear_all();
    }

    #[inline]
    #[must_use]
    pub fn is_marked(&self, port: u16) -> bool {
        self.traced.test(port)
    }

    #[must_use]
    pub fn any_marked(&self) -> bool {
        self.traced.any()
    }

    pub fn unmark(&mut self, port: u16) {
        self.traced.clear(port);
    }

    pub fn force_fast(&mut self, port: u16) {
        self.force_fast.set(port);
    }

    #[inline]
    #[must_use]
    pub fn is_force_fast(&self, port: u16) -> bool {
        self.force_fast.test(port)
    }

    /// Only the per-port maps are reset; the level and sink stay.
    pub fn reset_maps(&mut self) {
        self.traced.clear_all();
        self.force_fast.clear_all();
    }

    #[inline]
    #[must_use]
    pub fn is_traced(&self, port: u16) -> bool {
        self.level > 0
            && !self.force_fast.test(port)
            && (self.level >= TRACE_ALL_LEVEL || self.traced.test(port))
    }

    /// Records an access at the width the caller requested.
    #[inline]
    pub fn access(&mut self, port: u16, access: Access, width: Width, value: u32) {
        if self.is_traced(port) {
            self.emit(port, access, width, value);
        }
    }

    /// Records one byte of a composed wide access; only at [`TRACE_ALL_LEVEL`].
    #[inline]
    pub fn sub_access(&mut self, port: u16, access: Access, value: u8) {
        if self.level >= TRACE_ALL_LEVEL && !self.force_fast.test(port) {
            self.emit(port, access, Width::Byte, u32::from(value));
        }
    }

    fn emit(&mut self, port: u16, access: Access, width: Width, value: u32) {
        self.sink.record(&TraceEntry {
            port,
            access,
            width,
            value,
        });
    }
}
