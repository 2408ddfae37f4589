//! Trap vector numbers and their classification.

use super::pic::{InterruptIndex, PIC_1_OFFSET};

// Processor-defined exceptions.
pub const DIVIDE_ERROR: u32 = 0;
pub const DEBUG: u32 = 1;
pub const NMI: u32 = 2;
pub const BREAKPOINT: u32 = 3;
pub const OVERFLOW: u32 = 4;
pub const BOUND_RANGE: u32 = 5;
pub const INVALID_OPCODE: u32 = 6;
pub const DEVICE_NOT_AVAILABLE: u32 = 7;
pub const DOUBLE_FAULT: u32 = 8;
pub const INVALID_TSS: u32 = 10;
pub const SEGMENT_NOT_PRESENT: u32 = 11;
pub const STACK_FAULT: u32 = 12;
pub const GENERAL_PROTECTION: u32 = 13;
pub const PAGE_FAULT: u32 = 14;
pub const X87_FPU: u32 = 16;
pub const ALIGNMENT_CHECK: u32 = 17;
pub const MACHINE_CHECK: u32 = 18;
pub const SIMD_FP: u32 = 19;

/// IRQ 0 arrives as this vector.
pub const IRQ_OFFSET: u32 = PIC_1_OFFSET as u32;
pub const IRQ_COUNT: u32 = 16;

// Software-issued privilege switches. Chosen clear of the exception and
// IRQ ranges.
pub const SWITCH_TO_USER: u32 = 120;
pub const SWITCH_TO_KERNEL: u32 = 121;

pub const VECTOR_COUNT: usize = 256;

static EXCEPTION_NAMES: [&str; 20] = [
    "Divide error",
    "Debug",
    "Non-Maskable Interrupt",
    "Breakpoint",
    "Overflow",
    "BOUND Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack Fault",
    "General Protection",
    "Page Fault",
    "(unknown trap)",
    "x87 FPU Floating-Point Error",
    "Alignment Check",
    "Machine-Check",
    "SIMD Floating-Point Exception",
];

pub fn trap_name(vector: u32) -> &'static str {
    if let Some(name) = EXCEPTION_NAMES.get(vector as usize) {
        return name;
    }
    if is_irq(vector) {
        return "Hardware Interrupt";
    }
    "(unknown trap)"
}

pub fn is_irq(vector: u32) -> bool {
    (IRQ_OFFSET..IRQ_OFFSET + IRQ_COUNT).contains(&vector)
}

/// What the dispatcher does with a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapKind {
    Timer,
    Serial,
    Keyboard,
    Disk,
    SwitchToUser,
    SwitchToKernel,
    Other(u32),
}

impl From<u32> for TrapKind {
    fn from(vector: u32) -> Self {
        const TIMER: u32 = InterruptIndex::Timer as u32;
        const KEYBOARD: u32 = InterruptIndex::Keyboard as u32;
        const COM1: u32 = InterruptIndex::Com1 as u32;
        const IDE1: u32 = InterruptIndex::Ide1 as u32;
        const IDE2: u32 = InterruptIndex::Ide2 as u32;

        match vector {
            TIMER => Self::Timer,
            COM1 => Self::Serial,
            KEYBOARD => Self::Keyboard,
            IDE1 | IDE2 => Self::Disk,
            SWITCH_TO_USER => Self::SwitchToUser,
            SWITCH_TO_KERNEL => Self::SwitchToKernel,
            other => Self::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_names() {
        assert_eq!(trap_name(DIVIDE_ERROR), "Divide error");
        assert_eq!(trap_name(GENERAL_PROTECTION), "General Protection");
        assert_eq!(trap_name(15), "(unknown trap)");
        assert_eq!(trap_name(SIMD_FP), "SIMD Floating-Point Exception");
    }

    #[test]
    fn test_irq_range_and_unknown() {
        for vector in 32..48 {
            assert_eq!(trap_name(vector), "Hardware Interrupt");
        }
        for vector in [20, 31, 48, SWITCH_TO_USER, 255, 4096] {
            assert_eq!(trap_name(vector), "(unknown trap)");
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(TrapKind::from(32), TrapKind::Timer);
        assert_eq!(TrapKind::from(33), TrapKind::Keyboard);
        assert_eq!(TrapKind::from(36), TrapKind::Serial);
        assert_eq!(TrapKind::from(46), TrapKind::Disk);
        assert_eq!(TrapKind::from(47), TrapKind::Disk);
        assert_eq!(TrapKind::from(120), TrapKind::SwitchToUser);
        assert_eq!(TrapKind::from(121), TrapKind::SwitchToKernel);
        assert_eq!(TrapKind::from(PAGE_FAULT), TrapKind::Other(14));
    }
}
