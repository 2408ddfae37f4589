//! # Interrupt Descriptor Table
//!
//! 256 protected-mode gate descriptors, one per vector.
//!
//! ```text
//!  63            48 47 46 45 44 43  40 39   32 31           16 15            0
//! ┌────────────────┬──┬─────┬──┬──────┬───────┬───────────────┬───────────────┐
//! │ offset 31..16  │P │ DPL │0 │ type │   0   │   selector    │ offset 15..0  │
//! └────────────────┴──┴─────┴──┴──────┴───────┴───────────────┴───────────────┘
//! ```

use core::mem::size_of;
use core::ops::Index;

use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

use super::gdt::DescriptorPointer;
use super::vectors::VECTOR_COUNT;

const PRESENT: u8 = 1 << 7;
const DPL_SHIFT: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GateType {
    /// Clears IF on entry.
    Interrupt32 = 0x0E,
    /// Leaves IF untouched.
    Trap32 = 0x0F,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct GateDescriptor {
    offset_low: u16,
    selector: u16,
    reserved: u8,
    attributes: u8,
    offset_high: u16,
}

const _: () = assert!(size_of::<GateDescriptor>() == 8);

impl GateDescriptor {
    /// A non-present gate; any trap through it faults.
    pub const fn missing() -> Self {
        Self { offset_low: 0, selector: 0, reserved: 0, attributes: 0, offset_high: 0 }
    }

    pub fn new(
        gate_type: GateType,
        selector: SegmentSelector,
        offset: u32,
        dpl: PrivilegeLevel,
    ) -> Self {
        Self {
            offset_low: offset as u16,
            selector: selector.0,
            reserved: 0,
            attributes: PRESENT | ((dpl as u8) << DPL_SHIFT) | gate_type as u8,
            offset_high: (offset >> 16) as u16,
        }
    }

    pub fn offset(&self) -> u32 {
        u32::from(self.offset_high) << 16 | u32::from(self.offset_low)
    }

    pub fn selector(&self) -> SegmentSelector {
        SegmentSelector(self.selector)
    }

    /// Lowest privilege allowed to reach this gate with `int n`.
    pub fn dpl(&self) -> PrivilegeLevel {
        PrivilegeLevel::from_u16(u16::from((self.attributes >> DPL_SHIFT) & 0b11))
    }

    pub fn gate_type(&self) -> Option<GateType> {
        match self.attributes & 0x1F {
            0x0E => Some(GateType::Interrupt32),
            0x0F => Some(GateType::Trap32),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.attributes & PRESENT != 0
    }

    pub fn as_u64(&self) -> u64 {
        u64::from(self.offset_high) << 48
            | u64::from(self.attributes) << 40
            | u64::from(self.reserved) << 32
            | u64::from(self.selector) << 16
            | u64::from(self.offset_low)
    }
}

#[repr(C, align(8))]
pub struct Idt {
    entries: [GateDescriptor; VECTOR_COUNT],
}

impl Idt {
    /// Fill every slot from `vectors` with a kernel-only interrupt gate on
    /// `code`, then open `user_vector` to ring 3 so user code may `int` it.
    pub fn new(vectors: &[u32; VECTOR_COUNT], code: SegmentSelector, user_vector: u8) -> Self {
        let mut entries = [GateDescriptor::missing(); VECTOR_COUNT];
        for (entry, &offset) in entries.iter_mut().zip(vectors.iter()) {
            *entry = GateDescriptor::new(GateType::Interrupt32, code, offset, PrivilegeLevel::Ring0);
        }
        let index = usize::from(user_vector);
        entries[index] =
            GateDescriptor::new(GateType::Interrupt32, code, vectors[index], PrivilegeLevel::Ring3);
        Self { entries }
    }

    pub fn entries(&self) -> &[GateDescriptor; VECTOR_COUNT] {
        &self.entries
    }

    pub fn pointer(&self) -> DescriptorPointer {
        DescriptorPointer {
            limit: (size_of::<[GateDescriptor; VECTOR_COUNT]>() - 1) as u16,
            base: self.entries.as_ptr() as usize as u32,
        }
    }

    /// Make this the table the CPU uses.
    ///
    /// # Safety
    /// Every present gate must point at a valid entry stub, and the table
    /// must stay put for as long as it is loaded.
    #[cfg(target_arch = "x86")]
    pub unsafe fn load(&'static self) {
        let pointer = self.pointer();
        core::arch::asm!(
            "lidt [{}]",
            in(reg) &pointer,
            options(readonly, nostack, preserves_flags)
        );
    }
}

impl Index<u8> for Idt {
    type Output = GateDescriptor;

    fn index(&self, vector: u8) -> &GateDescriptor {
        &self.entries[usize::from(vector)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KERNEL_CS: SegmentSelector = SegmentSelector(0x08);

    fn stub_addresses() -> [u32; VECTOR_COUNT] {
        let mut vectors = [0u32; VECTOR_COUNT];
        for (i, v) in vectors.iter_mut().enumerate() {
            *v = 0x0010_2000 + (i as u32) * 10;
        }
        vectors
    }

    #[test]
    fn test_gate_encoding() {
        let gate = GateDescriptor::new(
            GateType::Interrupt32,
            KERNEL_CS,
            0x1234_5678,
            PrivilegeLevel::Ring3,
        );
        assert_eq!(gate.as_u64(), 0x1234_EE00_0008_5678);
        assert_eq!(gate.offset(), 0x1234_5678);
        assert_eq!(gate.selector(), KERNEL_CS);
        assert_eq!(gate.dpl(), PrivilegeLevel::Ring3);
        assert_eq!(gate.gate_type(), Some(GateType::Interrupt32));
        assert!(gate.is_present());
        assert!(!GateDescriptor::missing().is_present());
    }

    #[test]
    fn test_all_slots_kernel_except_user_vector() {
        let vectors = stub_addresses();
        let idt = Idt::new(&vectors, KERNEL_CS, 121);
        for (i, gate) in idt.entries().iter().enumerate() {
            assert_eq!(gate.selector(), KERNEL_CS);
            assert_eq!(gate.offset(), vectors[i]);
            assert!(gate.is_present());
            let expected = if i == 121 { PrivilegeLevel::Ring3 } else { PrivilegeLevel::Ring0 };
            assert_eq!(gate.dpl(), expected, "vector {}", i);
        }
        assert_eq!(idt[121].dpl(), PrivilegeLevel::Ring3);
        assert_eq!(idt[120].dpl(), PrivilegeLevel::Ring0);
    }

    #[test]
    fn test_pointer_limit() {
        let idt = Idt::new(&stub_addresses(), KERNEL_CS, 121);
        let limit = idt.pointer().limit;
        assert_eq!(limit, 256 * 8 - 1);
    }
}
