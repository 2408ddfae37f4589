//! # Global Descriptor Table
//!
//! Flat 4 GiB segments for both privilege levels plus the TSS that tells the
//! CPU which stack to use when a trap arrives from ring 3.
//!
//! | Index | Selector | Segment     |
//! |-------|----------|-------------|
//! | 0     | 0x00     | null        |
//! | 1     | 0x08     | kernel code |
//! | 2     | 0x10     | kernel data |
//! | 3     | 0x1B     | user code   |
//! | 4     | 0x23     | user data   |
//! | 5     | 0x28     | TSS         |

use core::mem::size_of;

#[cfg(target_arch = "x86")]
use spin::Once;
use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

const SEG_KTEXT: u16 = 1;
const SEG_KDATA: u16 = 2;
const SEG_UTEXT: u16 = 3;
const SEG_UDATA: u16 = 4;
const SEG_TSS: u16 = 5;
const SEGMENT_COUNT: usize = 6;

const fn selector(index: u16, rpl: PrivilegeLevel) -> SegmentSelector {
    SegmentSelector(index << 3 | rpl as u16)
}

pub const KERNEL_CS: SegmentSelector = selector(SEG_KTEXT, PrivilegeLevel::Ring0);
pub const KERNEL_DS: SegmentSelector = selector(SEG_KDATA, PrivilegeLevel::Ring0);
pub const USER_CS: SegmentSelector = selector(SEG_UTEXT, PrivilegeLevel::Ring3);
pub const USER_DS: SegmentSelector = selector(SEG_UDATA, PrivilegeLevel::Ring3);
pub const TSS_SELECTOR: SegmentSelector = selector(SEG_TSS, PrivilegeLevel::Ring0);

/// Operand of `lgdt`/`lidt` in 32-bit mode.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct DescriptorPointer {
    pub limit: u16,
    pub base: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Code,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentDescriptor(u64);

impl SegmentDescriptor {
    const PRESENT: u64 = 1 << 47;
    const USER_SEGMENT: u64 = 1 << 44;
    const DEFAULT_SIZE: u64 = 1 << 54;
    const GRANULARITY: u64 = 1 << 55;
    const EXECUTABLE: u64 = 0x8 << 40;
    const READABLE: u64 = 0x2 << 40;
    const WRITABLE: u64 = 0x2 << 40;
    const TSS_AVAILABLE: u64 = 0x9 << 40;

    pub const NULL: Self = Self(0);

    /// Base 0, limit 4 GiB, 32-bit, page granular.
    pub fn flat(kind: SegmentKind, dpl: PrivilegeLevel) -> Self {
        let access = match kind {
            SegmentKind::Code => Self::EXECUTABLE | Self::READABLE,
            SegmentKind::Data => Self::WRITABLE,
        };
        Self(
            Self::limit_bits(0xF_FFFF)
                | access
                | Self::USER_SEGMENT
                | Self::dpl_bits(dpl)
                | Self::PRESENT
                | Self::DEFAULT_SIZE
                | Self::GRANULARITY,
        )
    }

    /// An available 32-bit TSS, byte granular.
    pub fn tss(base: u32, limit: u32) -> Self {
        Self(
            Self::limit_bits(limit)
                | Self::base_bits(base)
                | Self::TSS_AVAILABLE
                | Self::dpl_bits(PrivilegeLevel::Ring0)
                | Self::PRESENT
                | Self::DEFAULT_SIZE,
        )
    }

    fn limit_bits(limit: u32) -> u64 {
        let limit = u64::from(limit);
        (limit & 0xFFFF) | ((limit >> 16) & 0xF) << 48
    }

    fn base_bits(base: u32) -> u64 {
        let base = u64::from(base);
        (base & 0xFF_FFFF) << 16 | (base >> 24) << 56
    }

    fn dpl_bits(dpl: PrivilegeLevel) -> u64 {
        (dpl as u64) << 45
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// 32-bit task state segment. Only `esp0`/`ss0` are used: no hardware task
/// switching, no I/O bitmap.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct TaskStateSegment {
    link: u32,
    pub esp0: u32,
    pub ss0: u32,
    outer_stacks: [u32; 4],
    task_state: [u32; 18],
    trap: u16,
    pub iomap_base: u16,
}

const _: () = assert!(size_of::<TaskStateSegment>() == 104);

impl TaskStateSegment {
    pub fn new(esp0: u32, ss0: SegmentSelector) -> Self {
        Self {
            link: 0,
            esp0,
            ss0: u32::from(ss0.0),
            outer_stacks: [0; 4],
            task_state: [0; 18],
            trap: 0,
            iomap_base: size_of::<Self>() as u16,
        }
    }
}

#[repr(C, align(8))]
pub struct Gdt {
    entries: [SegmentDescriptor; SEGMENT_COUNT],
}

impl Gdt {
    pub fn new(tss_base: u32) -> Self {
        let mut entries = [SegmentDescriptor::NULL; SEGMENT_COUNT];
        entries[usize::from(SEG_KTEXT)] = SegmentDescriptor::flat(SegmentKind::Code, PrivilegeLevel::Ring0);
        entries[usize::from(SEG_KDATA)] = SegmentDescriptor::flat(SegmentKind::Data, PrivilegeLevel::Ring0);
        entries[usize::from(SEG_UTEXT)] = SegmentDescriptor::flat(SegmentKind::Code, PrivilegeLevel::Ring3);
        entries[usize::from(SEG_UDATA)] = SegmentDescriptor::flat(SegmentKind::Data, PrivilegeLevel::Ring3);
        entries[usize::from(SEG_TSS)] =
            SegmentDescriptor::tss(tss_base, size_of::<TaskStateSegment>() as u32);
        Self { entries }
    }

    pub fn entry(&self, selector: SegmentSelector) -> SegmentDescriptor {
        self.entries[usize::from(selector.index())]
    }

    pub fn pointer(&self) -> DescriptorPointer {
        DescriptorPointer {
            limit: (size_of::<[SegmentDescriptor; SEGMENT_COUNT]>() - 1) as u16,
            base: self.entries.as_ptr() as usize as u32,
        }
    }

    /// Load the table, reload every segment register and the task register.
    ///
    /// # Safety
    /// Must run in 32-bit protected mode with the table kept alive forever.
    #[cfg(target_arch = "x86")]
    pub unsafe fn load(&'static self) {
        use core::arch::asm;

        let pointer = self.pointer();
        asm!("lgdt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));
        asm!(
            "mov gs, {user:x}",
            "mov fs, {user:x}",
            "mov es, {kernel:x}",
            "mov ds, {kernel:x}",
            "mov ss, {kernel:x}",
            user = in(reg) u32::from(USER_DS.0),
            kernel = in(reg) u32::from(KERNEL_DS.0),
            options(nostack, preserves_flags)
        );
        // Far return to reload cs.
        asm!(
            "pushl {0}",
            "pushl $2f",
            "lret",
            "2:",
            in(reg) u32::from(KERNEL_CS.0),
            options(att_syntax)
        );
        asm!("ltr {0:x}", in(reg) u32::from(TSS_SELECTOR.0), options(nostack, preserves_flags));
    }
}

#[cfg(target_arch = "x86")]
static TSS: Once<TaskStateSegment> = Once::new();
#[cfg(target_arch = "x86")]
static GDT: Once<Gdt> = Once::new();

/// Install the segment table. Traps from ring 3 switch to `kernel_stack_top`.
#[cfg(target_arch = "x86")]
pub fn init(kernel_stack_top: u32) {
    let tss = TSS.call_once(|| TaskStateSegment::new(kernel_stack_top, KERNEL_DS));
    let gdt = GDT.call_once(|| Gdt::new(tss as *const TaskStateSegment as usize as u32));
    unsafe { gdt.load() };
}
