use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;

pub struct StderrLogger {
    max_level: LevelFilter,
    show_pid: bool,
}

impl StderrLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self {
            max_level,
            show_pid: false,
        }
    }

    /// Prefix every line with the id of the writing process.
    ///
    /// Useful once the port server is forked and both processes share stderr.
    #[must_use]
    pub const fn with_pid(mut self) -> Self {
        self.show_pid = true;
        self
    }

    /// Call this once during startup.
    #[allow(clippy::missing_errors_doc)]
    pub fn init(self) -> Result<(), SetLoggerError> {
        let max_level = self.max_level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }

    fn format(&self, record: &Record) -> String {
        if self.show_pid {
            format!(
                "[{}] ({}) {}: {}\n",
                record.level(),
                std::process::id(),
                record.target(),
                record.args()
            )
        } else {
            format!(
                "[{}] {}: {}\n",
                record.level(),
                record.target(),
                record.args()
            )
        }
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // One write per line keeps lines from both processes intact.
        let line = self.format(record);
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
