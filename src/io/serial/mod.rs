// src/io/serial/mod.rs
//
// Serial device transport.
// Drives a direct serial link to the microcontroller through the serialport crate.
//
// Features:
// - Automatic port choice when none is configured (USB ports first)
// - Chunked reads forwarded to the session's frame decoder
// - Bidirectional communication (read + transmit)

pub mod reader;
pub(crate) mod utils;

pub use reader::{choose_port, list_serial_ports, SerialPortInfo, SerialTransport};
