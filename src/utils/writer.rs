use core::fmt;

use spin::MutexGuard;

use crate::arch::x86_64::peripheral::uart_16550::{COM1, SerialPort};

/// A simple writer that writes to the serial port.
///
/// Holds the COM1 lock for its lifetime, so one `Writer` emits one
/// uninterleaved burst of output.
pub struct Writer<'a> {
    serial: MutexGuard<'a, SerialPort>,
}

impl Writer<'_> {
    /// Creates a new instance of the writer, locking COM1.
    pub fn new() -> Writer<'static> {
        Writer {
            serial: COM1.lock(),
        }
    }

    /// Writes a byte to the serial port.
    pub fn write(&mut self, byte: u8) {
        self.serial.write(byte);
    }
}

impl fmt::Write for Writer<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write(byte);
        }
        Ok(())
    }
}
