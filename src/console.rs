//! # Console
//!
//! Serial console on COM1 plus the raw character sources the trap
//! dispatcher reads from.
//!
//! | Device   | Ports        | IRQ |
//! |----------|--------------|-----|
//! | COM1     | 0x3F8-0x3FF  | 4   |
//! | PS/2 kbd | 0x60, 0x64   | 1   |

use core::fmt::{self, Write};

use spin::Mutex;
#[cfg(target_arch = "x86_64")]
use uart_16550::SerialPort;

use crate::core::cpu::{interrupts, port::Port};
#[cfg(target_arch = "x86")]
use crate::devices::drivers::uart::SerialPort;
use crate::devices::drivers::ps2_keyboard::ScancodeDecoder;

const COM1: u16 = 0x3F8;
const COM_LSR: u16 = COM1 + 5;
const COM_LSR_DATA: u8 = 0x01;

const KBD_STATUS: u16 = 0x64;
const KBD_DATA: u16 = 0x60;
const KBD_DATA_READY: u8 = 0x01;

pub static SERIAL: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(COM1) });

static KEYBOARD: Mutex<ScancodeDecoder> = Mutex::new(ScancodeDecoder::new());

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::console::_print(::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => {
        $crate::console::_print(::core::format_args!("{}\n", ::core::format_args!($($arg)*)))
    };
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    // A trap taken while the lock is held would spin forever.
    interrupts::without_interrupts(|| {
        let _ = SERIAL.lock().write_fmt(args);
    });
}

/// Bring up the UART. Receive interrupts are enabled by the driver.
pub fn init() {
    SERIAL.lock().init();
}

/// Non-blocking read of one byte from COM1.
pub fn serial_getc() -> Option<u8> {
    let status: u8 = unsafe { Port::new(COM_LSR).read() };
    if status & COM_LSR_DATA == 0 {
        return None;
    }
    let c: u8 = unsafe { Port::new(COM1).read() };
    Some(if c == 127 { b'\x08' } else { c })
}

/// Non-blocking read of one decoded character from the PS/2 keyboard.
pub fn keyboard_getc() -> Option<u8> {
    let status: u8 = unsafe { Port::new(KBD_STATUS).read() };
    if status & KBD_DATA_READY == 0 {
        return None;
    }
    let scancode: u8 = unsafe { Port::new(KBD_DATA).read() };
    KEYBOARD.lock().process_scancode(scancode).and_then(|key| key.as_byte())
}

/// Poll every input device once.
pub fn getc() -> Option<u8> {
    serial_getc().or_else(keyboard_getc)
}

/// Zero-sized handle over the global console, for code that wants a
/// `fmt::Write` plus an input source.
pub struct Console;

impl Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        interrupts::without_interrupts(|| SERIAL.lock().write_str(s))
    }
}

impl crate::monitor::CharSource for Console {
    /// Spins until a device delivers a character.
    fn getc(&mut self) -> Option<u8> {
        loop {
            if let Some(c) = getc() {
                return Some(c);
            }
            core::hint::spin_loop();
        }
    }
}
