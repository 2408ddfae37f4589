//! # Core Kernel Module
//!
//! ## Submodules
//!
//! - `cpu`: port I/O, interrupt flag and `hlt` for either target
//! - `interrupts`: trap frames, descriptor tables, PIC, clock, dispatch
//!   and privilege switches
//! - `kernel`: phased bring-up
//!
//! ## Initialization Order
//!
//! 1. GDT (Global Descriptor Table) - segments and TSS
//! 2. PIC (Programmable Interrupt Controller) - remap and unmask
//! 3. IDT (Interrupt Descriptor Table) - one gate per entry stub
//! 4. PIT - 100 Hz clock

pub mod cpu;
pub mod interrupts;
pub mod kernel;
