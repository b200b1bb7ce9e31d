use emu_logger::StderrLogger;
use emu_ports::{
    Fatal, IoPermission, PortConfig, PortError, PortSpeed, PortSubsystem, RealHardware, Width,
};
use log::{LevelFilter, error, info, warn};
use std::{env, process};

const USAGE: &str = "usage: portprobe <b|w|d> <port> [value]   (hex, e.g. portprobe b 0x61)";

/// Exit code for usage and configuration errors.
const EXIT_USAGE: i32 = 2;

struct Probe {
    width: Width,
    port: u16,
    value: Option<u32>,
}

fn main() {
    let level = if env::var_os("PORTPROBE_DEBUG").is_some() {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = StderrLogger::new(level).with_pid().init() {
        eprintln!("portprobe: logger already installed: {e}");
    }

    let Some(probe) = parse_args(env::args().skip(1)) else {
        eprintln!("{USAGE}");
        process::exit(EXIT_USAGE);
    };

    // The subsystem is dropped inside `run`, which stops the port server
    // before the process exits.
    let code = match run(&probe) {
        Ok(()) => 0,
        Err(PortError::Fatal(fatal)) => exit_code(&fatal),
        Err(e) => {
            error!("{e}");
            EXIT_USAGE
        }
    };
    process::exit(code);
}

fn exit_code(fatal: &Fatal) -> i32 {
    error!("{fatal}");
    fatal.exit_code()
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Option<Probe> {
    let width = match args.next()?.as_str() {
        "b" => Width::Byte,
        "w" => Width::Word,
        "d" => Width::Dword,
        _ => return None,
    };
    let port = u16::try_from(parse_hex(&args.next()?)?).ok()?;
    let value = match args.next() {
        Some(v) => Some(parse_hex(&v)? & width.mask()),
        None => None,
    };
    Some(Probe { width, port, value })
}

fn parse_hex(s: &str) -> Option<u32> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u32::from_str_radix(digits, 16).ok()
}

fn run(probe: &Probe) -> Result<(), PortError> {
    let config = PortConfig {
        can_do_root_stuff: unsafe { libc::geteuid() } == 0,
        trace_level: 1,
        ..PortConfig::default()
    };
    let mut ports = PortSubsystem::new(config, Box::new(RealHardware::new()));
    if let Some(value) = access(&mut ports, probe)? {
        info!("{value:#0width$x}", width = 2 + 2 * usize::from(probe.width.bytes()));
    }
    ports.shutdown();
    Ok(())
}

/// Grants the requested port and performs the access. Without root the port
/// stays unmapped and the access gets the "not available" result.
fn access(ports: &mut PortSubsystem, probe: &Probe) -> Result<Option<u32>, PortError> {
    let permission = if probe.value.is_some() {
        IoPermission::WriteOnly
    } else {
        IoPermission::ReadOnly
    };
    let granted = ports.allow_io(
        probe.port,
        usize::from(probe.width.bytes()),
        permission,
        0x00,
        0xff,
        PortSpeed::Slow,
    );
    match granted {
        Err(PortError::PrivilegeRequired) => warn!("portprobe: continuing without port access"),
        other => other?,
    }
    ports.enable_trace(probe.port, probe.port);
    ports.finalize()?;

    let [lo, hi, ..] = probe.value.unwrap_or(0).to_le_bytes();
    Ok(match (probe.width, probe.value) {
        (Width::Byte, None) => Some(u32::from(ports.inb(probe.port)?)),
        (Width::Word, None) => Some(u32::from(ports.inw(probe.port)?)),
        (Width::Dword, None) => Some(ports.ind(probe.port)?),
        (Width::Byte, Some(_)) => {
            ports.outb(probe.port, lo)?;
            None
        }
        (Width::Word, Some(_)) => {
            ports.outw(probe.port, u16::from_le_bytes([lo, hi]))?;
            None
        }
        (Width::Dword, Some(v)) => {
            ports.outd(probe.port, v)?;
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(ToString::to_string).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn parses_read_and_write() {
        let read = parse_args(args(&["w", "0x1ce"])).unwrap();
        assert_eq!(read.width, Width::Word);
        assert_eq!(read.port, 0x1ce);
        assert_eq!(read.value, None);

        let write = parse_args(args(&["b", "80", "0x1ff"])).unwrap();
        assert_eq!(write.port, 0x80);
        assert_eq!(write.value, Some(0xff));
    }

    #[test]
    fn missing_privilege_still_performs_access() {
        let mut ports = PortSubsystem::new(PortConfig::default(), Box::new(RealHardware::new()));
        let read = parse_args(args(&["w", "0x1ce"])).unwrap();
        assert_eq!(access(&mut ports, &read).unwrap(), Some(0xffff));

        let write = parse_args(args(&["b", "0x80", "0x12"])).unwrap();
        assert_eq!(access(&mut ports, &write).unwrap(), None);
        assert!(!ports.gate().has_helper());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(args(&[])).is_none());
        assert!(parse_args(args(&["q", "0x80"])).is_none());
        assert!(parse_args(args(&["b", "0x10000"])).is_none());
        assert!(parse_args(args(&["d", "zz"])).is_none());
    }
}
