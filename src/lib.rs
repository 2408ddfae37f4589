//! # trapgate
//!
//! Trap and interrupt layer of a small 32-bit protected-mode kernel.
//!
//! ## Layout
//!
//! - `core::interrupts`: trap frame layout, vector table, dispatcher,
//!   privilege transitions, segment table, PIC and clock
//! - `core::kernel`: boot-time initialization phases (32-bit only)
//! - `console`: serial output macros and device input
//! - `devices`: PS/2 keyboard scancode decoding
//! - `monitor`: the kernel debug monitor
//!
//! The library is `no_std` outside of tests so that everything except the
//! hardware bring-up can be exercised on the host.

#![cfg_attr(not(test), no_std)]

pub mod console;
pub mod core;
pub mod devices;
pub mod logger;
pub mod monitor;

pub use crate::core::interrupts::trapframe::TrapFrame;
