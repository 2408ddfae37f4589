//! # 16550 UART
//!
//! Polled transmit, receive interrupts on. The 32-bit kernel uses this in
//! place of `uart_16550`, whose port I/O exists only on x86_64.
//!
//! | Offset | Register (DLAB=0)     | Register (DLAB=1) |
//! |--------|-----------------------|-------------------|
//! | 0      | data                  | divisor low       |
//! | 1      | interrupt enable      | divisor high      |
//! | 2      | FIFO control          |                   |
//! | 3      | line control          |                   |
//! | 4      | modem control         |                   |
//! | 5      | line status           |                   |

use core::fmt;

use crate::core::cpu::port::Port;

/// Input clock divided down to the baud rate.
const UART_CLOCK: u32 = 115_200;
pub const BAUD: u32 = 38_400;

const LCR_DLAB: u8 = 0x80;
const LCR_8N1: u8 = 0x03;
const FCR_ENABLE_CLEAR_14: u8 = 0xC7;
const MCR_DTR_RTS_OUT2: u8 = 0x0B;
const IER_RX_AVAILABLE: u8 = 0x01;
const LSR_TX_EMPTY: u8 = 0x20;

pub const fn divisor(baud: u32) -> u16 {
    (UART_CLOCK / baud) as u16
}

/// What goes on the wire for `byte`. Backspace and DEL rub out the
/// previous character on the terminal.
pub fn wire_bytes(byte: u8) -> &'static [u8] {
    match byte {
        0x08 | 0x7F => b"\x08 \x08",
        _ => &[],
    }
}

pub struct SerialPort {
    data: Port<u8>,
    int_en: Port<u8>,
    fifo_ctrl: Port<u8>,
    line_ctrl: Port<u8>,
    modem_ctrl: Port<u8>,
    line_sts: Port<u8>,
}

impl SerialPort {
    /// # Safety
    /// `base` must be the first port of a 16550 nobody else drives.
    pub const unsafe fn new(base: u16) -> Self {
        Self {
            data: Port::new(base),
            int_en: Port::new(base + 1),
            fifo_ctrl: Port::new(base + 2),
            line_ctrl: Port::new(base + 3),
            modem_ctrl: Port::new(base + 4),
            line_sts: Port::new(base + 5),
        }
    }

    pub fn init(&mut self) {
        let [low, high] = divisor(BAUD).to_le_bytes();
        unsafe {
            self.int_en.write(0);
            self.line_ctrl.write(LCR_DLAB);
            self.data.write(low);
            self.int_en.write(high);
            self.line_ctrl.write(LCR_8N1);
            self.fifo_ctrl.write(FCR_ENABLE_CLEAR_14);
            self.modem_ctrl.write(MCR_DTR_RTS_OUT2);
            self.int_en.write(IER_RX_AVAILABLE);
        }
    }

    fn send_raw(&mut self, byte: u8) {
        unsafe {
            while self.line_sts.read() & LSR_TX_EMPTY == 0 {
                core::hint::spin_loop();
            }
            self.data.write(byte);
        }
    }

    pub fn send(&mut self, byte: u8) {
        match wire_bytes(byte) {
            [] => self.send_raw(byte),
            seq => seq.iter().for_each(|&b| self.send_raw(b)),
        }
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.send(byte);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divisor() {
        assert_eq!(divisor(BAUD), 3);
        assert_eq!(divisor(115_200), 1);
        assert_eq!(divisor(9_600), 12);
    }

    #[test]
    fn test_rubout_sequence() {
        assert_eq!(wire_bytes(0x08), b"\x08 \x08");
        assert_eq!(wire_bytes(0x7F), b"\x08 \x08");
        assert!(wire_bytes(b'a').is_empty());
        assert!(wire_bytes(b'\n').is_empty());
    }
}
