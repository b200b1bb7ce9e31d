//! # Port Server Transport
//!
//! The main process talks to the port server over a duplex [`Transport`]
//! carrying fixed-size [`PortRequest`] records. The forked server uses two
//! pipes; any `Read`/`Write` pair works, which lets tests run the server
//! loop on a thread over a socket pair.
//!
//! The protocol is strictly alternating: one request, then its response,
//! before anything else is sent. The only exception is the address phase of
//! a combined bus cycle, which is posted without waiting and answered
//! together with the data phase that immediately follows it.

use crate::error::Fatal;
use emu_portserver_abi::{PortRequest, RECORD_SIZE};
use log::debug;
use std::io::{self, Read, Write};

/// A duplex channel carrying whole protocol records.
pub trait Transport: Send {
    /// # Errors
    /// The I/O error of the underlying channel.
    fn send(&mut self, request: &PortRequest) -> io::Result<()>;

    /// Blocks until one complete record arrived.
    ///
    /// # Errors
    /// The I/O error of the underlying channel; `UnexpectedEof` once the
    /// other end is gone.
    fn recv(&mut self) -> io::Result<PortRequest>;
}

/// [`Transport`] over a reader and a writer, such as a pipe pair.
#[derive(Debug)]
pub struct RecordChannel<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> RecordChannel<R, W> {
    pub const fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R, W> Transport for RecordChannel<R, W>
where
    R: Read + Send,
    W: Write + Send,
{
    fn send(&mut self, request: &PortRequest) -> io::Result<()> {
        self.writer.write_all(&request.to_bytes())?;
        self.writer.flush()
    }

    fn recv(&mut self) -> io::Result<PortRequest> {
        let mut buf = [0u8; RECORD_SIZE];
        self.reader.read_exact(&mut buf)?;
        Ok(PortRequest::from_bytes(&buf))
    }
}

/// The main process's end of the protocol.
pub struct HelperLink {
    pid: Option<libc::pid_t>,
    channel: Box<dyn Transport>,
}

impl core::fmt::Debug for HelperLink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HelperLink")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl HelperLink {
    /// A link to a forked server process.
    pub(crate) fn forked(pid: libc::pid_t, channel: Box<dyn Transport>) -> Self {
        Self {
            pid: Some(pid),
            channel,
        }
    }

    /// A link to a server that is not a child process of ours.
    #[must_use]
    pub fn attached(channel: Box<dyn Transport>) -> Self {
        Self { pid: None, channel }
    }

    #[must_use]
    pub const fn pid(&self) -> Option<libc::pid_t> {
        self.pid
    }

    /// Sends one request and blocks for its response.
    ///
    /// # Errors
    /// [`Fatal::HelperTerminated`] if the channel broke.
    pub fn round_trip(&mut self, request: PortRequest) -> Result<PortRequest, Fatal> {
        self.post(request)?;
        self.channel.recv().map_err(|e| Fatal::helper_io(&e))
    }

    /// Sends a request that has no response of its own.
    ///
    /// # Errors
    /// [`Fatal::HelperTerminated`] if the channel broke.
    pub fn post(&mut self, request: PortRequest) -> Result<(), Fatal> {
        self.channel.send(&request).map_err(|e| Fatal::helper_io(&e))
    }

    /// Sends the terminate record and, for a forked server, reaps it.
    pub fn terminate(mut self) {
        if let Err(e) = self.channel.send(&PortRequest::exit()) {
            debug!("PORT: port server already gone: {e}");
        }
        if let Some(pid) = self.pid {
            reap(pid);
        }
    }
}

fn reap(pid: libc::pid_t) {
    let mut status = 0;
    loop {
        let rc = unsafe { libc::waitpid(pid, &raw mut status, 0) };
        if rc >= 0 {
            debug!("PORT: port server {pid} exited with status {status:#x}");
            return;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            debug!("PORT: waitpid({pid}) failed: {err}");
            return;
        }
    }
}

#[inline]
pub(crate) const fn low_u8(value: usize) -> u8 {
    value.to_le_bytes()[0]
}

#[inline]
pub(crate) const fn low_u16(value: usize) -> u16 {
    let b = value.to_le_bytes();
    u16::from_le_bytes([b[0], b[1]])
}

#[inline]
pub(crate) const fn low_u32(value: usize) -> u32 {
    let b = value.to_le_bytes();
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// Widens a port value into the record's machine word.
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn word(value: u32) -> usize {
    value as usize
}
