use crate::access::Width;
use crate::error::Fatal;
use crate::gate::IoGate;
use crate::handler::{Capabilities, PortHandler};

/// Input status register 1, monochrome and colour.
const INPUT_STATUS_MONO: u16 = 0x3ba;
const INPUT_STATUS_COLOR: u16 = 0x3da;
/// Light-pen strobe reset.
const LIGHT_PEN_RESET: u16 = 0x3db;
/// Attribute controller index/data.
const ATTRIBUTE_CONTROLLER: u16 = 0x3c0;

/// Handle 5: the few video ports that need more than plain pass-through.
///
/// With retrace emulation on, a status read is remembered instead of being
/// repeated. The next attribute controller write performs the remembered
/// read first, so the index/data flip-flop the read resets is in the state
/// the program expects.
#[derive(Debug, Clone, Copy)]
pub struct SpecialHandler {
    emulate_retrace: bool,
}

impl SpecialHandler {
    #[must_use]
    pub const fn new(emulate_retrace: bool) -> Self {
        Self { emulate_retrace }
    }
}

impl PortHandler for SpecialHandler {
    fn capabilities(&self) -> Capabilities {
        Capabilities::BYTES
    }

    fn read_byte(&mut self, gate: &mut IoGate, port: u16) -> Result<u8, Fatal> {
        if gate.has_direct_access(port, Width::Byte) {
            return gate.std_inb(port);
        }
        match port {
            LIGHT_PEN_RESET => Ok(0),
            INPUT_STATUS_MONO | INPUT_STATUS_COLOR => {
                let status = gate.std_inb(port)?;
                if self.emulate_retrace {
                    gate.set_retrace_pending(port);
                }
                Ok(status)
            }
            _ => gate.std_inb(port),
        }
    }

    fn write_byte(&mut self, gate: &mut IoGate, port: u16, value: u8) -> Result<(), Fatal> {
        if port == ATTRIBUTE_CONTROLLER && !gate.has_direct_access(port, Width::Byte) {
            gate.flush_pending_retrace()?;
        }
        gate.std_outb(port, value)
    }
}
