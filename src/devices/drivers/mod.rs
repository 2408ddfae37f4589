//! Device Drivers
//!
//! - PS/2 Keyboard (IRQ1)
//! - 8259 PIC pair and 16550 UART for the 32-bit build

pub mod i8259;
pub mod ps2_keyboard;
pub mod uart;

pub use ps2_keyboard::{KeyEvent, ScancodeDecoder};
