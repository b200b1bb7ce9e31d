#![allow(dead_code)]

use emu_ports::{
    Access, Capabilities, Fatal, HardwareIo, IoGate, Iopl, PortConfig, PortHandler, PortSubsystem,
    TraceEntry, TraceSink, Width,
};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

/// One observed host-level operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HwEvent {
    In(u16, Width),
    Out(u16, Width, u32),
    Ioperm(u16, usize, bool),
    Iopl(u8),
    DropPrivileges,
}

#[derive(Default)]
struct HwState {
    events: Vec<HwEvent>,
    values: HashMap<u16, u32>,
    refuse_ioperm: bool,
    refuse_iopl: bool,
}

/// Fake port space that records every operation. Clones share state.
#[derive(Clone, Default)]
pub struct FakeHardware {
    state: Arc<Mutex<HwState>>,
}

impl FakeHardware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value returned by reads of `port`, truncated to the access width.
    pub fn set_value(&self, port: u16, value: u32) {
        self.state.lock().unwrap().values.insert(port, value);
    }

    pub fn refuse_ioperm(&self) {
        self.state.lock().unwrap().refuse_ioperm = true;
    }

    pub fn refuse_iopl(&self) {
        self.state.lock().unwrap().refuse_iopl = true;
    }

    pub fn events(&self) -> Vec<HwEvent> {
        self.state.lock().unwrap().events.clone()
    }

    /// Only the `in`/`out` events.
    pub fn accesses(&self) -> Vec<HwEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, HwEvent::In(..) | HwEvent::Out(..)))
            .collect()
    }

    pub fn clear(&self) {
        self.state.lock().unwrap().events.clear();
    }

    fn read(&self, port: u16, width: Width) -> u32 {
        let mut state = self.state.lock().unwrap();
        state.events.push(HwEvent::In(port, width));
        state.values.get(&port).copied().unwrap_or(0) & width.mask()
    }

    fn write(&self, port: u16, width: Width, value: u32) {
        self.state
            .lock()
            .unwrap()
            .events
            .push(HwEvent::Out(port, width, value));
    }
}

impl HardwareIo for FakeHardware {
    fn inb(&mut self, port: u16) -> u8 {
        self.read(port, Width::Byte).to_le_bytes()[0]
    }

    fn outb(&mut self, port: u16, value: u8) {
        self.write(port, Width::Byte, u32::from(value));
    }

    fn inw(&mut self, port: u16) -> u16 {
        let [lo, hi, ..] = self.read(port, Width::Word).to_le_bytes();
        u16::from_le_bytes([lo, hi])
    }

    fn outw(&mut self, port: u16, value: u16) {
        self.write(port, Width::Word, u32::from(value));
    }

    fn inl(&mut self, port: u16) -> u32 {
        self.read(port, Width::Dword)
    }

    fn outl(&mut self, port: u16, value: u32) {
        self.write(port, Width::Dword, value);
    }

    fn ioperm(&mut self, start: u16, len: usize, enable: bool) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(HwEvent::Ioperm(start, len, enable));
        if state.refuse_ioperm {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        } else {
            Ok(())
        }
    }

    fn iopl(&mut self, level: Iopl) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.events.push(HwEvent::Iopl(level.to_u8()));
        if state.refuse_iopl {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        } else {
            Ok(())
        }
    }

    fn drop_privileges(&mut self) -> io::Result<()> {
        self.state
            .lock()
            .unwrap()
            .events
            .push(HwEvent::DropPrivileges);
        Ok(())
    }
}

/// Trace sink collecting entries. Clones share the list.
#[derive(Clone, Default)]
pub struct RecordingSink {
    entries: Arc<Mutex<Vec<TraceEntry>>>,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<TraceEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl TraceSink for RecordingSink {
    fn record(&mut self, entry: &TraceEntry) {
        self.entries.lock().unwrap().push(*entry);
    }
}

/// A handler access as seen by [`RecordingHandler`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Observed {
    pub port: u16,
    pub access: Access,
    pub width: Width,
    pub value: u32,
}

/// Device handler recording every call it receives. Every byte it reads is
/// `read_value`; wide reads repeat it. Clones share the log.
#[derive(Clone)]
pub struct RecordingHandler {
    caps: Capabilities,
    read_value: u8,
    log: Arc<Mutex<Vec<Observed>>>,
}

impl RecordingHandler {
    pub fn new(caps: Capabilities, read_value: u8) -> Self {
        Self {
            caps,
            read_value,
            log: Arc::default(),
        }
    }

    pub fn observed(&self) -> Vec<Observed> {
        self.log.lock().unwrap().clone()
    }

    fn push(&self, port: u16, access: Access, width: Width, value: u32) {
        self.log.lock().unwrap().push(Observed {
            port,
            access,
            width,
            value,
        });
    }
}

impl PortHandler for RecordingHandler {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn read_byte(&mut self, _gate: &mut IoGate, port: u16) -> Result<u8, Fatal> {
        self.push(port, Access::Read, Width::Byte, u32::from(self.read_value));
        Ok(self.read_value)
    }

    fn write_byte(&mut self, _gate: &mut IoGate, port: u16, value: u8) -> Result<(), Fatal> {
        self.push(port, Access::Write, Width::Byte, u32::from(value));
        Ok(())
    }

    fn read_word(&mut self, _gate: &mut IoGate, port: u16) -> Result<u16, Fatal> {
        let value = u16::from_le_bytes([self.read_value; 2]);
        self.push(port, Access::Read, Width::Word, u32::from(value));
        Ok(value)
    }

    fn write_word(&mut self, _gate: &mut IoGate, port: u16, value: u16) -> Result<(), Fatal> {
        self.push(port, Access::Write, Width::Word, u32::from(value));
        Ok(())
    }

    fn read_dword(&mut self, _gate: &mut IoGate, port: u16) -> Result<u32, Fatal> {
        let value = u32::from_le_bytes([self.read_value; 4]);
        self.push(port, Access::Read, Width::Dword, value);
        Ok(value)
    }

    fn write_dword(&mut self, _gate: &mut IoGate, port: u16, value: u32) -> Result<(), Fatal> {
        self.push(port, Access::Write, Width::Dword, value);
        Ok(())
    }
}

pub fn root_config() -> PortConfig {
    PortConfig {
        can_do_root_stuff: true,
        ..PortConfig::default()
    }
}

pub fn subsystem(config: PortConfig) -> (PortSubsystem, FakeHardware) {
    let hw = FakeHardware::new();
    let ports = PortSubsystem::new(config, Box::new(hw.clone()));
    (ports, hw)
}
