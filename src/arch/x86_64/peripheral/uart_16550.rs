/*
 * 16550 UART driver (COM1)
 *
 * Minimal transmit-only serial driver backing the kernel console and the
 * logger. Receive support is intentionally absent; the kernel has no
 * interactive surface.
 */

use bitflags::bitflags;
use spin::Mutex;
use x86_64::instructions::port::Port;

bitflags! {
    /// Line status flags
    struct LineStsFlags: u8 {
        const INPUT_FULL = 1;
        // 1 to 4 unknown
        const OUTPUT_EMPTY = 1 << 5;
        // 6 and 7 unknown
    }
}

/// Serial port representation.
pub struct SerialPort {
    data: Port<u8>,       // Data register, read to receive, write to send
    int_en: Port<u8>,     // Interrupt enable
    fifo_ctrl: Port<u8>,  // FIFO control
    line_ctrl: Port<u8>,  // Line control
    modem_ctrl: Port<u8>, // Modem control
    line_sts: Port<u8>,   // Line status
}

impl SerialPort {
    /// Creates a new serial port instance for the given base port address.
    pub const fn new(base: u16) -> SerialPort {
        SerialPort {
            data: Port::new(base),
            int_en: Port::new(base + 1),
            fifo_ctrl: Port::new(base + 2),
            line_ctrl: Port::new(base + 3),
            modem_ctrl: Port::new(base + 4),
            line_sts: Port::new(base + 5),
        }
    }

    /// Initializes the serial port: 38400 baud, 8N1, FIFOs on.
    pub fn init(&mut self) {
        unsafe {
            self.int_en.write(0x00);
            self.line_ctrl.write(0x80);
            self.data.write(0x03);
            self.int_en.write(0x00);
            self.line_ctrl.write(0x03);
            self.fifo_ctrl.write(0xC7);
            self.modem_ctrl.write(0x0B);
        }
    }

    fn line_sts(&mut self) -> LineStsFlags {
        LineStsFlags::from_bits_truncate(unsafe { self.line_sts.read() })
    }

    /// Sends a byte of data through the serial port.
    pub fn send(&mut self, data: u8) {
        while !self.line_sts().contains(LineStsFlags::OUTPUT_EMPTY) {}
        unsafe { self.data.write(data) }
    }

    /// Writes a byte, translating newlines for terminal consumption.
    pub fn write(&mut self, b: u8) {
        match b {
            b'\n' => {
                self.send(b'\r');
                self.send(b'\n');
            }
            _ => {
                self.send(b);
            }
        }
    }
}

/// COM1, shared by the console writer and the logger.
pub static COM1: Mutex<SerialPort> = Mutex::new(SerialPort::new(0x3F8));

/// Initialize COM1.
pub fn init() {
    COM1.lock().init();
}
