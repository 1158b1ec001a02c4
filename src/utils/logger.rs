use log::{Level, LevelFilter, Metadata, Record};

use crate::serial_println;

/// Logger implementation writing to the serial console.
struct TernLogger;

impl log::Log for TernLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            serial_println!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: TernLogger = TernLogger;

/// Initializes the logger.
///
/// # Panics
/// Panics if a logger was already installed.
pub fn init() {
    let result = log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info));

    match result {
        Ok(_) => serial_println!("Logger initialized correctly"),
        Err(err) => panic!("Error with initializing logger: {}", err),
    }
}
