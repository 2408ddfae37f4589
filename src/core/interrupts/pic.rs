//! # Programmable Interrupt Controller (8259 PIC)
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐
//! │   PIC 1     │     │   PIC 2     │
//! │  (Master)   │◀────│  (Slave)    │
//! │ IRQ 0-7     │ IRQ2│ IRQ 8-15    │
//! └─────────────┘     └─────────────┘
//!       │
//!       ▼
//!     CPU
//! ```
//!
//! IRQs 0-15 are remapped to vectors 32-47 so they do not collide with
//! processor exceptions.
//!
//! | IRQ | Vector | Device     | Unmasked |
//! |-----|--------|------------|----------|
//! | 0   | 32     | Timer      | yes      |
//! | 1   | 33     | Keyboard   | yes      |
//! | 2   | 34     | Cascade    | yes      |
//! | 4   | 36     | COM1       | yes      |
//! | 14  | 46     | IDE 1      | no       |
//! | 15  | 47     | IDE 2      | no       |
//!
//! The chips are driven by `pic8259` on x86_64 and by
//! [`crate::devices::drivers::i8259`] on 32-bit x86.

#[cfg(target_arch = "x86_64")]
use pic8259::ChainedPics;
use spin::Mutex;

#[cfg(target_arch = "x86")]
use crate::devices::drivers::i8259::ChainedPics;

pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = 40;

const IRQ_CASCADE: u8 = 2;

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,
    Keyboard = PIC_1_OFFSET + 1,
    Com1 = PIC_1_OFFSET + 4,
    Ide1 = PIC_2_OFFSET + 6,
    Ide2 = PIC_2_OFFSET + 7,
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn irq(self) -> u8 {
        self.as_u8() - PIC_1_OFFSET
    }
}

/// Mask bytes for both chips with only `irqs` enabled (a set bit masks).
pub fn masks_enabling(irqs: &[u8]) -> [u8; 2] {
    let mut enabled: u16 = 0;
    for &irq in irqs {
        enabled |= 1 << irq;
    }
    let masks = !enabled;
    [masks as u8, (masks >> 8) as u8]
}

/// Remap both chips and unmask the devices this kernel services.
pub fn init() {
    let [master, slave] = masks_enabling(&[
        InterruptIndex::Timer.irq(),
        InterruptIndex::Keyboard.irq(),
        IRQ_CASCADE,
        InterruptIndex::Com1.irq(),
    ]);
    let mut pics = PICS.lock();
    unsafe {
        pics.initialize();
        pics.write_masks(master, slave);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vectors() {
        assert_eq!(InterruptIndex::Timer.as_u8(), 32);
        assert_eq!(InterruptIndex::Com1.as_u8(), 36);
        assert_eq!(InterruptIndex::Ide2.as_u8(), 47);
        assert_eq!(InterruptIndex::Ide1.irq(), 14);
    }

    #[test]
    fn test_masks() {
        assert_eq!(masks_enabling(&[0, 1, 2, 4]), [0b1110_1000, 0xFF]);
        assert_eq!(masks_enabling(&[14]), [0xFF, 0b1011_1111]);
        assert_eq!(masks_enabling(&[]), [0xFF, 0xFF]);
    }
}
