//! # Interrupt Handling Module
//!
//! Trap and interrupt infrastructure for the kernel:
//!
//! - **Trap frame**: the register snapshot every entry stub builds
//! - **GDT**: flat segments for ring 0 and ring 3 plus the TSS
//! - **IDT**: one gate per vector, all pointing at generated stubs
//! - **PIC**: 8259 remapping, masking and EOI
//! - **Timer**: 100 Hz PIT and the tick counter
//! - **Dispatch**: per-vector handling and privilege switches
//!
//! ## Interrupt Vector Layout
//!
//! | Vector | Type                   | Handling                  |
//! |--------|------------------------|---------------------------|
//! | 0-31   | CPU Exceptions         | fatal in the kernel       |
//! | 32     | Timer (IRQ0)           | tick count                |
//! | 33     | Keyboard (IRQ1)        | echo decoded key          |
//! | 36     | COM1 (IRQ4)            | echo received byte        |
//! | 46, 47 | IDE (IRQ14, IRQ15)     | ignored                   |
//! | 120    | Switch to user         | forge ring 3 context      |
//! | 121    | Switch to kernel       | relocate ring 0 context   |
//!
//! ## Usage
//!
//! ```ignore
//! use trapgate::core::kernel::init_kernel;
//! init_kernel(kernel_stack_top, &__vectors)?; // GDT, PIC, IDT, clock
//! ```

pub mod dispatch;
pub mod dump;
pub mod gdt;
pub mod idt;
#[cfg(target_arch = "x86")]
pub mod interrupts;
pub mod pic;
pub mod switch;
pub mod timer;
pub mod trapframe;
pub mod vectors;
