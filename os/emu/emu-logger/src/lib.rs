//! # Emulator Logging
//!
//! A `log::Log` implementation for the emulator processes. Every record is
//! written as a single `[LEVEL] target: message` line to stderr, so output
//! from the main process and from the forked port server interleaves on
//! line boundaries.
//!
//! ```rust,no_run
//! use emu_logger::StderrLogger;
//! use log::{LevelFilter, info};
//!
//! StderrLogger::new(LevelFilter::Debug).init().expect("logger initialization");
//! info!("PORT: subsystem ready");
//! ```

mod logger;

pub use logger::StderrLogger;
