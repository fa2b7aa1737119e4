// src/io/serial/utils.rs
//
// Frame format helpers: link configuration onto a serialport builder.

use serialport::{DataBits, Parity as SpParity, SerialPortBuilder, StopBits};

use crate::io::types::Parity;

/// Apply the link's frame format to a port builder.
pub fn with_frame(builder: SerialPortBuilder, data_bits: u8, parity: Parity, stop_bits: u8) -> SerialPortBuilder {
    builder
        .data_bits(data_bits_of(data_bits))
        .parity(parity_of(parity))
        .stop_bits(stop_bits_of(stop_bits))
}

fn parity_of(parity: Parity) -> SpParity {
    match parity {
        Parity::None => SpParity::None,
        Parity::Odd => SpParity::Odd,
        Parity::Even => SpParity::Even,
    }
}

// Out-of-range counts read as 8 data bits and 1 stop bit.
fn data_bits_of(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn stop_bits_of(bits: u8) -> StopBits {
    if bits == 2 {
        StopBits::Two
    } else {
        StopBits::One
    }
}

/// Short "8N1" style description of a frame format
pub fn frame_format(data_bits: u8, parity: Parity, stop_bits: u8) -> String {
    let p = match parity {
        Parity::None => 'N',
        Parity::Odd => 'O',
        Parity::Even => 'E',
    };
    format!("{}{}{}", data_bits, p, stop_bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_mapping() {
        assert!(matches!(parity_of(Parity::Odd), SpParity::Odd));
        assert!(matches!(parity_of(Parity::Even), SpParity::Even));
        assert!(matches!(data_bits_of(7), DataBits::Seven));
        assert!(matches!(data_bits_of(9), DataBits::Eight));
        assert!(matches!(stop_bits_of(2), StopBits::Two));
        assert!(matches!(stop_bits_of(0), StopBits::One));
    }

    #[test]
    fn test_frame_format() {
        assert_eq!(frame_format(8, Parity::None, 1), "8N1");
        assert_eq!(frame_format(7, Parity::Even, 2), "7E2");
    }
}
