mod common;

use common::{HwEvent, RecordingHandler, RecordingSink, root_config, subsystem};
use emu_ports::{
    Access, Capabilities, Fatal, Handle, IoPermission, PortConfig, PortError, PortSpeed,
    RegisterFlags, TRACE_ALL_LEVEL, TraceEntry, Width,
};

fn traced_root_config(level: u8) -> PortConfig {
    PortConfig {
        trace_level: level,
        ..root_config()
    }
}

#[test]
fn fast_traced_write_hits_hardware_and_trace_once() {
    let (mut ports, hw) = subsystem(traced_root_config(1));
    let sink = RecordingSink::default();
    ports.set_trace_sink(Box::new(sink.clone()));
    ports.enable_trace(0x3f8, 0x3ff);
    ports
        .allow_io(0x3f8, 8, IoPermission::ReadWrite, 0x00, 0xff, PortSpeed::Fast)
        .unwrap();
    assert!(ports.gate().io_bitmap().covers(0x3f8, Width::Dword));

    ports.outb(0x3f8, 0x41).unwrap();

    assert_eq!(hw.accesses(), vec![HwEvent::Out(0x3f8, Width::Byte, 0x41)]);
    assert_eq!(
        sink.entries(),
        vec![TraceEntry {
            port: 0x3f8,
            access: Access::Write,
            width: Width::Byte,
            value: 0x41,
        }]
    );
    assert_eq!(sink.entries()[0].to_string(), "3f8 < 41");
}

#[test]
fn allow_io_requires_root() {
    let (mut ports, hw) = subsystem(PortConfig::default());
    let err = ports
        .allow_io(0x61, 1, IoPermission::ReadWrite, 0, 0xff, PortSpeed::Fast)
        .unwrap_err();
    assert_eq!(err, PortError::PrivilegeRequired);
    assert_eq!(ports.handle_of(0x61), Handle::NONE);
    assert!(hw.events().is_empty());
}

#[test]
fn allow_io_maps_permission_to_standard_handle() {
    let (mut ports, _) = subsystem(root_config());
    ports
        .allow_io(0x278, 3, IoPermission::ReadOnly, 0, 0xff, PortSpeed::Slow)
        .unwrap();
    ports
        .allow_io(0x2f8, 1, IoPermission::WriteOnly, 0, 0xff, PortSpeed::Slow)
        .unwrap();
    assert_eq!(ports.handle_of(0x278), Handle::STD_RD);
    assert_eq!(ports.handle_of(0x27a), Handle::STD_RD);
    assert_eq!(ports.handle_of(0x27b), Handle::NONE);
    assert_eq!(ports.handle_of(0x2f8), Handle::STD_WR);
    assert!(ports.map().any_standard());
}

#[test]
fn allow_io_clamps_range_to_last_port() {
    let (mut ports, _) = subsystem(root_config());
    ports
        .allow_io(0xfffe, 8, IoPermission::ReadWrite, 0, 0xff, PortSpeed::Slow)
        .unwrap();
    assert_eq!(ports.handle_of(0xffff), Handle::STD_IO);
    assert_eq!(ports.handle_of(0x0000), Handle::NONE);
}

#[test]
fn allow_io_conflicts_with_device() {
    let (mut ports, _) = subsystem(root_config());
    ports
        .register_handler(
            "keyboard",
            Box::new(RecordingHandler::new(Capabilities::BYTES, 0)),
            0x60,
            0x64,
            RegisterFlags::NONE,
        )
        .unwrap();
    let err = ports
        .allow_io(0x64, 1, IoPermission::ReadWrite, 0, 0xff, PortSpeed::Slow)
        .unwrap_err();
    assert!(matches!(err, PortError::Conflict { port: 0x64, .. }));
    assert!(ports.exit_early());
}

#[test]
fn single_port_masks_apply_to_direct_access() {
    let (mut ports, hw) = subsystem(root_config());
    ports
        .allow_io(0x61, 1, IoPermission::ReadWrite, 0x01, 0xfc, PortSpeed::Fast)
        .unwrap();
    assert_eq!(ports.gate().masks(0x61), (0xfc, 0x01));

    hw.set_value(0x61, 0x02);
    assert_eq!(ports.inb(0x61).unwrap(), 0x01);
    ports.outb(0x61, 0xff).unwrap();

    assert_eq!(
        hw.accesses(),
        vec![
            HwEvent::In(0x61, Width::Byte),
            HwEvent::Out(0x61, Width::Byte, 0xfd)
        ]
    );
}

#[test]
fn range_masks_are_not_stored() {
    let (mut ports, _) = subsystem(root_config());
    ports
        .allow_io(0x70, 2, IoPermission::ReadWrite, 0x80, 0x7f, PortSpeed::Slow)
        .unwrap();
    assert_eq!(ports.handle_of(0x71), Handle::STD_IO);
    assert_eq!(ports.gate().masks(0x70), (0xff, 0x00));
    assert_eq!(ports.gate().masks(0x71), (0xff, 0x00));
}

#[test]
fn refused_fast_path_still_registers() {
    let (mut ports, hw) = subsystem(root_config());
    hw.refuse_ioperm();
    ports
        .allow_io(0x378, 3, IoPermission::ReadWrite, 0, 0xff, PortSpeed::Fast)
        .unwrap();
    assert_eq!(ports.handle_of(0x378), Handle::STD_IO);
    assert!(!ports.gate().io_bitmap().test(0x378));

    // no direct access and no port server: the stub answers
    assert_eq!(ports.inb(0x378).unwrap(), 0xff);
    ports.outb(0x378, 0x00).unwrap();
    assert!(hw.accesses().is_empty());
}

#[test]
fn word_access_needs_both_ports_granted() {
    let (mut ports, hw) = subsystem(root_config());
    ports
        .allow_io(0x1ce, 1, IoPermission::ReadWrite, 0, 0xff, PortSpeed::Fast)
        .unwrap();
    ports
        .allow_io(0x1cf, 1, IoPermission::ReadWrite, 0, 0xff, PortSpeed::Slow)
        .unwrap();

    // 0x1cf is not in the ioperm map, so the word access is unavailable
    assert_eq!(ports.inw(0x1ce).unwrap(), 0xffff);
    assert!(hw.accesses().is_empty());

    hw.set_value(0x1ce, 0x1234);
    assert_eq!(ports.inb(0x1ce).unwrap(), 0x34);
}

#[test]
fn unavailable_write_inside_critical_section_is_fatal() {
    let (mut ports, _) = subsystem(root_config());
    ports
        .allow_io(0x61, 1, IoPermission::ReadWrite, 0, 0xff, PortSpeed::Slow)
        .unwrap();

    ports.outb(0x61, 0x03).unwrap();

    ports.enter_critical("speaker").unwrap();
    let err = ports.outb(0x61, 0x03).unwrap_err();
    assert_eq!(
        err,
        Fatal::CriticalPortUnavailable {
            port: 0x61,
            operation: "outb",
            holder: "speaker",
        }
    );
    assert_eq!(err.exit_code(), 46);
}

#[test]
fn critical_section_reentry_names_both_labels() {
    let (mut ports, _) = subsystem(PortConfig::default());
    ports.enter_critical("A").unwrap();
    let err = ports.enter_critical("B").unwrap_err();
    assert_eq!(
        err,
        Fatal::CriticalSectionConflict {
            held: "A",
            requested: "B"
        }
    );
    assert_eq!(err.exit_code(), 49);
    assert_eq!(ports.leave_critical(), Err(Fatal::LeaveWithoutEnter));
}

#[test]
fn composed_word_traces_requested_width() {
    let (mut ports, _) = subsystem(PortConfig {
        trace_level: 1,
        ..PortConfig::default()
    });
    let sink = RecordingSink::default();
    ports.set_trace_sink(Box::new(sink.clone()));
    ports.enable_trace(0x300, 0x301);
    ports
        .register_handler(
            "pair",
            Box::new(RecordingHandler::new(Capabilities::BYTES, 0x10)),
            0x300,
            0x301,
            RegisterFlags::NONE,
        )
        .unwrap();

    assert_eq!(ports.inw(0x300).unwrap(), 0x1010);

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].width, Width::Word);
    assert_eq!(entries[0].to_string(), "300 } 1010");
}

#[test]
fn trace_all_level_adds_byte_sub_accesses() {
    let (mut ports, _) = subsystem(PortConfig {
        trace_level: TRACE_ALL_LEVEL,
        ..PortConfig::default()
    });
    let sink = RecordingSink::default();
    ports.set_trace_sink(Box::new(sink.clone()));
    ports
        .register_handler(
            "pair",
            Box::new(RecordingHandler::new(Capabilities::WRITE_BYTE, 0)),
            0x300,
            0x301,
            RegisterFlags::NONE,
        )
        .unwrap();

    ports.outw(0x300, 0x1234).unwrap();

    let lines: Vec<String> = sink.entries().iter().map(ToString::to_string).collect();
    assert_eq!(lines, vec!["300 { 1234", "300 < 34", "301 < 12"]);
}

#[test]
fn force_fast_ports_are_never_traced() {
    let (mut ports, _) = subsystem(traced_root_config(TRACE_ALL_LEVEL));
    let sink = RecordingSink::default();
    ports.set_trace_sink(Box::new(sink.clone()));
    ports
        .allow_io(0x40, 4, IoPermission::ReadWrite, 0, 0xff, PortSpeed::ForceFast)
        .unwrap();
    ports.enable_trace(0x40, 0x43);

    ports.outb(0x40, 0x36).unwrap();
    ports.inb(0x42).unwrap();
    assert!(sink.entries().is_empty());

    ports.inb(0x44).unwrap();
    assert_eq!(sink.entries().len(), 1);
}

#[test]
fn speed_hint_decoding() {
    assert_eq!(PortSpeed::from_hint(-1), PortSpeed::Slow);
    assert_eq!(PortSpeed::from_hint(0), PortSpeed::Fast);
    assert_eq!(PortSpeed::from_hint(3), PortSpeed::ForceFast);
}

#[test]
fn special_handler_video_ports() {
    let (mut ports, hw) = subsystem(PortConfig {
        emulate_retrace: true,
        ..root_config()
    });
    ports
        .register_handler(
            "extra stuff",
            Box::new(RecordingHandler::new(Capabilities::NONE, 0)),
            0x3c0,
            0x3c0,
            RegisterFlags::NONE,
        )
        .unwrap();
    ports
        .register_handler(
            "extra stuff",
            Box::new(RecordingHandler::new(Capabilities::NONE, 0)),
            0x3da,
            0x3db,
            RegisterFlags::NONE,
        )
        .unwrap();
    assert_eq!(ports.handle_of(0x3da), Handle::SPECIAL);

    assert_eq!(ports.inb(0x3db).unwrap(), 0);
    assert_eq!(ports.inb(0x3da).unwrap(), 0xff);
    assert_eq!(ports.gate().retrace_pending(), Some(0x3da));

    ports.outb(0x3c0, 0x20).unwrap();
    assert_eq!(ports.gate().retrace_pending(), None);
    assert!(!ports.flush_pending_retrace().unwrap());
    assert!(hw.accesses().is_empty());
}

#[test]
fn special_handler_fast_path_goes_to_hardware() {
    let (mut ports, hw) = subsystem(root_config());
    ports
        .register_handler(
            "extra stuff",
            Box::new(RecordingHandler::new(Capabilities::NONE, 0)),
            0x3da,
            0x3db,
            RegisterFlags::FAST,
        )
        .unwrap();
    hw.set_value(0x3db, 0x80);

    assert_eq!(ports.inb(0x3db).unwrap(), 0x80);
    assert_eq!(ports.gate().retrace_pending(), None);
    assert_eq!(hw.accesses(), vec![HwEvent::In(0x3db, Width::Byte)]);
}

#[test]
fn allow_io_saturates_oversized_range() {
    let (mut ports, _) = subsystem(root_config());
    ports
        .allow_io(0x10, usize::MAX, IoPermission::ReadWrite, 0, 0xff, PortSpeed::Slow)
        .unwrap();
    assert_eq!(ports.handle_of(0x0f), Handle::NONE);
    assert_eq!(ports.handle_of(0x10), Handle::STD_IO);
    assert_eq!(ports.handle_of(0xffff), Handle::STD_IO);
}

#[test]
fn unavailable_composed_write_reports_requested_width() {
    let (mut ports, _) = subsystem(root_config());
    ports
        .allow_io(0x278, 4, IoPermission::ReadOnly, 0, 0xff, PortSpeed::Slow)
        .unwrap();

    ports.enter_critical("printer").unwrap();
    let err = ports.outw(0x278, 0x1234).unwrap_err();
    assert_eq!(
        err,
        Fatal::CriticalPortUnavailable {
            port: 0x278,
            operation: "outw",
            holder: "printer",
        }
    );

    ports.enter_critical("printer").unwrap();
    let err = ports.outd(0x278, 0x1234_5678).unwrap_err();
    assert!(matches!(err, Fatal::CriticalPortUnavailable { operation: "outd", .. }));

    ports.enter_critical("printer").unwrap();
    let err = ports.outb(0x279, 0x12).unwrap_err();
    assert!(matches!(err, Fatal::CriticalPortUnavailable { port: 0x279, operation: "outb", .. }));
}
