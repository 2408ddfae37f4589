//! # CPU Primitives
//!
//! Port I/O, the interrupt flag and `hlt`, with one interface for both
//! builds:
//!
//! | Target   | Source                                   |
//! |----------|------------------------------------------|
//! | `x86_64` | re-exported from `x86_64::instructions`  |
//! | `x86`    | `asm!` wrappers below                    |
//!
//! The `x86_64` crate compiles its `instructions` module only for 64-bit
//! targets, so the 32-bit kernel gets its own copies with the same names
//! and signatures.

#[cfg(target_arch = "x86_64")]
pub use x86_64::instructions::{hlt, interrupts, port};

#[cfg(target_arch = "x86")]
pub use self::ia32::{hlt, interrupts, port};

#[cfg(target_arch = "x86")]
mod ia32 {
    use core::arch::asm;

    /// Stop until the next interrupt.
    #[inline]
    pub fn hlt() {
        unsafe { asm!("hlt", options(nomem, nostack, preserves_flags)) };
    }

    pub mod interrupts {
        use core::arch::asm;

        use x86_64::registers::rflags::RFlags;

        const IF: u32 = RFlags::INTERRUPT_FLAG.bits() as u32;

        #[inline]
        pub fn are_enabled() -> bool {
            let eflags: u32;
            unsafe { asm!("pushfd", "pop {}", out(reg) eflags, options(nomem, preserves_flags)) };
            eflags & IF != 0
        }

        #[inline]
        pub fn enable() {
            unsafe { asm!("sti", options(nomem, nostack)) };
        }

        #[inline]
        pub fn disable() {
            unsafe { asm!("cli", options(nomem, nostack)) };
        }

        /// Run `f` with interrupts masked, restoring the previous state.
        #[inline]
        pub fn without_interrupts<F, R>(f: F) -> R
        where
            F: FnOnce() -> R,
        {
            let saved = are_enabled();
            if saved {
                disable();
            }
            let ret = f();
            if saved {
                enable();
            }
            ret
        }
    }

    pub mod port {
        use core::arch::asm;
        use core::marker::PhantomData;

        /// A value that fits a single `in`/`out`.
        pub trait PortValue: Copy {
            /// # Safety
            /// Reading may have side effects on the device behind `port`.
            unsafe fn read_from_port(port: u16) -> Self;
            /// # Safety
            /// Writing may have side effects on the device behind `port`.
            unsafe fn write_to_port(port: u16, value: Self);
        }

        impl PortValue for u8 {
            #[inline]
            unsafe fn read_from_port(port: u16) -> u8 {
                let value: u8;
                asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
                value
            }

            #[inline]
            unsafe fn write_to_port(port: u16, value: u8) {
                asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
            }
        }

        impl PortValue for u16 {
            #[inline]
            unsafe fn read_from_port(port: u16) -> u16 {
                let value: u16;
                asm!("in ax, dx", out("ax") value, in("dx") port, options(nomem, nostack, preserves_flags));
                value
            }

            #[inline]
            unsafe fn write_to_port(port: u16, value: u16) {
                asm!("out dx, ax", in("dx") port, in("ax") value, options(nomem, nostack, preserves_flags));
            }
        }

        impl PortValue for u32 {
            #[inline]
            unsafe fn read_from_port(port: u16) -> u32 {
                let value: u32;
                asm!("in eax, dx", out("eax") value, in("dx") port, options(nomem, nostack, preserves_flags));
                value
            }

            #[inline]
            unsafe fn write_to_port(port: u16, value: u32) {
                asm!("out dx, eax", in("dx") port, in("eax") value, options(nomem, nostack, preserves_flags));
            }
        }

        /// One I/O port of width `T`.
        pub struct Port<T> {
            port: u16,
            phantom: PhantomData<T>,
        }

        impl<T: PortValue> Port<T> {
            pub const fn new(port: u16) -> Self {
                Self { port, phantom: PhantomData }
            }

            /// # Safety
            /// The caller must know what reading this port does to its device.
            #[inline]
            pub unsafe fn read(&mut self) -> T {
                T::read_from_port(self.port)
            }

            /// # Safety
            /// The caller must know what writing this port does to its device.
            #[inline]
            pub unsafe fn write(&mut self, value: T) {
                T::write_to_port(self.port, value)
            }
        }
    }
}
