pub mod pic;
pub mod uart_16550;
