//! # Port Server
//!
//! The port server is a forked copy of the emulator that keeps IOPL 3 and
//! gives up every other privilege. It answers [`PortRequest`]s from the main
//! process through its own copy of the port map, so every request reaches
//! the handler the main process would have used:
//!
//! ```text
//!     main process                         port server
//!  ──────────────────                   ──────────────────
//!   std_inb(0x61) ── ByteIn 0x61 ──────▶  handler(0x61).read_byte
//!                 ◀───── response ─────
//!
//!   combined_cycle ─ ChainedAddress ──▶  handler(0xcf8).write_dword
//!                  ─ DwordIn 0xcfc ───▶  handler(0xcfc).read_dword
//!                  ◀───── response ─────
//! ```

use crate::access::Access;
use crate::error::Fatal;
use crate::privilege::Iopl;
use crate::subsystem::PortSubsystem;
use crate::transport::{HelperLink, RecordChannel, Transport, low_u8, low_u16, low_u32, word};
use emu_portserver_abi::{Operation, PortRequest};
use log::{debug, error, info, warn};
use std::io;

impl PortSubsystem {
    /// Forks the port server and attaches the main process to it.
    pub(crate) fn spawn_helper(&mut self) -> Result<(), Fatal> {
        info!("PORT: starting port server");
        let (request_rx, request_tx) = io::pipe().map_err(|e| spawn_error(&e))?;
        let (response_rx, response_tx) = io::pipe().map_err(|e| spawn_error(&e))?;

        match unsafe { libc::fork() } {
            -1 => Err(spawn_error(&io::Error::last_os_error())),
            0 => {
                drop(request_tx);
                drop(response_rx);
                let code = self.run_forked_server(RecordChannel::new(request_rx, response_tx));
                unsafe { libc::_exit(code) }
            }
            pid => {
                drop(request_rx);
                drop(response_tx);
                let channel = RecordChannel::new(response_rx, request_tx);
                self.gate.attach_helper(HelperLink::forked(pid, Box::new(channel)));
                debug!("PORT: port server running as {pid}");
                Ok(())
            }
        }
    }

    fn run_forked_server(&mut self, mut channel: impl Transport) -> i32 {
        unsafe {
            libc::setsid();
        }
        restore_default_signals();
        if let Err(e) = self.enter_server_mode() {
            error!("PORT: port server cannot drop privileges: {e}");
            return 1;
        }
        match self.serve(&mut channel) {
            Ok(()) => 0,
            Err(fatal) => {
                error!("{fatal}");
                fatal.exit_code()
            }
        }
    }

    /// Raises the I/O privilege level to 3, then permanently drops every
    /// other elevated privilege.
    ///
    /// Ioperm grants of the parent do not survive the fork and are
    /// forgotten first, so without IOPL 3 the server never touches a port
    /// directly.
    ///
    /// # Errors
    /// The OS error if the privileges could not be dropped. A refused IOPL
    /// is only logged.
    pub fn enter_server_mode(&mut self) -> io::Result<()> {
        self.gate.forget_ioperm();
        if let Err(e) = self.gate.acquire_iopl(Iopl::Level3) {
            warn!("PORT: port server runs without IOPL 3: {e}");
        }
        self.gate.drop_privileges()
    }

    /// Answers requests until the terminate record arrives or the main
    /// process closes its end.
    ///
    /// # Errors
    /// A [`Fatal`] condition raised by a handler.
    pub fn serve(&mut self, channel: &mut dyn Transport) -> Result<(), Fatal> {
        info!("PORT: server started at {:?}", self.gate.iopl());
        loop {
            let Ok(mut request) = channel.recv() else {
                debug!("PORT: request channel closed");
                return Ok(());
            };
            if request.operation() == Operation::ChainedAddress {
                let Ok(data) = channel.recv() else {
                    debug!("PORT: request channel closed after address phase");
                    return Ok(());
                };
                self.perform(PortRequest::new(request.port, Operation::DwordOut, request.value))?;
                request = data;
            }
            if request.operation() == Operation::Exit {
                debug!("PORT: server exiting");
                return Ok(());
            }

            request.value = self.perform(request)?;
            if let Err(e) = channel.send(&request) {
                debug!("PORT: response channel closed: {e}");
                return Ok(());
            }
        }
    }

    /// One request against the local handlers. A wide access is performed
    /// natively if every port of the span reaches the same byte handler and
    /// the first port's handler declares the width; otherwise it is split
    /// into byte accesses.
    fn perform(&mut self, request: PortRequest) -> Result<usize, Fatal> {
        let port = request.port;
        let value = request.value;
        let op = request.operation();
        let caps = self.registry.capabilities(self.map.get(port));
        let (native, span): (bool, u16) = match op {
            Operation::WordIn => (caps.read_word(), 2),
            Operation::WordOut => (caps.write_word(), 2),
            Operation::DwordIn => (caps.read_dword(), 4),
            Operation::DwordOut => (caps.write_dword(), 4),
            _ => (true, 1),
        };
        let access = if op.is_read() { Access::Read } else { Access::Write };
        let shared = self.map.same_handler(port, span, access);
        if !shared {
            info!("PORT: splitting {op:?}({port:#x})");
        }

        match op {
            Operation::ByteIn => return self.byte_in(port).map(usize::from),
            Operation::ByteOut => return self.byte_out(port, low_u8(value)).map(|()| value),
            Operation::ChainedAddress | Operation::Exit => return Ok(value),
            _ => {}
        }

        if native && shared {
            let handler = &mut self.registry.get_mut(self.map.get(port)).handler;
            let gate = &mut self.gate;
            return match op {
                Operation::WordIn => handler.read_word(gate, port).map(usize::from),
                Operation::WordOut => handler.write_word(gate, port, low_u16(value)).map(|()| value),
                Operation::DwordIn => handler.read_dword(gate, port).map(word),
                Operation::DwordOut => handler.write_dword(gate, port, low_u32(value)).map(|()| value),
                _ => Ok(value),
            };
        }

        if op.is_read() {
            let mut bytes = [0u8; 4];
            for (offset, byte) in (0u16..span).zip(bytes.iter_mut()) {
                *byte = self.byte_in(port.wrapping_add(offset))?;
            }
            return Ok(word(u32::from_le_bytes(bytes)));
        }
        for (offset, byte) in (0u16..span).zip(low_u32(value).to_le_bytes()) {
            self.byte_out(port.wrapping_add(offset), byte)?;
        }
        Ok(value)
    }
}

fn spawn_error(err: &io::Error) -> Fatal {
    Fatal::HelperSpawn {
        reason: err.to_string(),
    }
}

/// The port server must not run the emulator's signal handlers.
fn restore_default_signals() {
    const SIGNALS: [libc::c_int; 4] = [libc::SIGINT, libc::SIGPIPE, libc::SIGHUP, libc::SIGTERM];
    unsafe {
        let mut set: libc::sigset_t = core::mem::zeroed();
        libc::sigemptyset(&raw mut set);
        for signal in SIGNALS {
            libc::signal(signal, libc::SIG_DFL);
            libc::sigaddset(&raw mut set, signal);
        }
        libc::sigprocmask(libc::SIG_UNBLOCK, &raw const set, core::ptr::null_mut());
    }
}
