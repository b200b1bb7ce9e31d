use crate::error::Fatal;
use crate::gate::IoGate;
use crate::handler::{Capabilities, Handle, PortHandler};

/// Direction in which a hardware-backed port range may be accessed.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum IoPermission {
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

impl IoPermission {
    /// The standard handle serving this permission.
    #[must_use]
    pub const fn handle(self) -> Handle {
        match self {
            Self::ReadWrite => Handle::STD_IO,
            Self::ReadOnly => Handle::STD_RD,
            Self::WriteOnly => Handle::STD_WR,
        }
    }

    const fn capabilities(self) -> Capabilities {
        const READS: Capabilities = Capabilities::new()
            .with_read_byte(true)
            .with_read_word(true)
            .with_read_dword(true);
        const WRITES: Capabilities = Capabilities::new()
            .with_write_byte(true)
            .with_write_word(true)
            .with_write_dword(true);
        match self {
            Self::ReadWrite => Capabilities::ALL,
            Self::ReadOnly => READS,
            Self::WriteOnly => WRITES,
        }
    }
}

/// Hardware-backed handler: every declared access goes through the
/// [`IoGate`]'s `std_in*`/`std_out*` paths.
#[derive(Debug, Clone, Copy)]
pub struct StandardHandler {
    permission: IoPermission,
}

impl StandardHandler {
    #[must_use]
    pub const fn new(permission: IoPermission) -> Self {
        Self { permission }
    }
}

impl PortHandler for StandardHandler {
    fn capabilities(&self) -> Capabilities {
        self.permission.capabilities()
    }

    fn read_byte(&mut self, gate: &mut IoGate, port: u16) -> Result<u8, Fatal> {
        gate.std_inb(port)
    }

    fn write_byte(&mut self, gate: &mut IoGate, port: u16, value: u8) -> Result<(), Fatal> {
        gate.std_outb(port, value)
    }

    fn read_word(&mut self, gate: &mut IoGate, port: u16) -> Result<u16, Fatal> {
        gate.std_inw(port)
    }

    fn write_word(&mut self, gate: &mut IoGate, port: u16, value: u16) -> Result<(), Fatal> {
        gate.std_outw(port, value)
    }

    fn read_dword(&mut self, gate: &mut IoGate, port: u16) -> Result<u32, Fatal> {
        gate.std_ind(port)
    }

    fn write_dword(&mut self, gate: &mut IoGate, port: u16, value: u32) -> Result<(), Fatal> {
        gate.std_outd(port, value)
    }
}
