//! # Trap Frame
//!
//! The saved execution state at a trap boundary, exactly as it sits on the
//! stack. The entry stub writes the lower part, the CPU the upper part.
//!
//! ```text
//! offset  size  field       written by
//! ------  ----  ----------  ----------------------------------------
//!   0      32   regs        pushal (edi esi ebp oesp ebx edx ecx eax)
//!  32       4   gs + pad    entry stub
//!  36       4   fs + pad    entry stub
//!  40       4   es + pad    entry stub
//!  44       4   ds + pad    entry stub
//!  48       4   vector      vector stub
//!  52       4   err         CPU, or a zero pushed by the vector stub
//!  56       4   eip         CPU
//!  60       4   cs + pad    CPU
//!  64       4   eflags      CPU
//!  68       4   esp         CPU, only when the trap crossed privilege
//!  72       4   ss + pad    CPU, only when the trap crossed privilege
//! ```
//!
//! `iret` runs at ring 0, so the trailing `esp`/`ss` pair is consumed only
//! when the saved `cs` names another ring. [`ContextRegion`] ties the
//! byte length of a frame to that rule.

use core::fmt;
use core::mem::size_of;

use x86_64::registers::rflags::RFlags;
use x86_64::structures::gdt::SegmentSelector;
use x86_64::PrivilegeLevel;

/// Both IOPL bits of EFLAGS.
pub const IOPL_MASK: u32 = (RFlags::IOPL_HIGH.bits() | RFlags::IOPL_LOW.bits()) as u32;
const IOPL_SHIFT: u32 = 12;

/// General registers in `pushal` order, lowest address first.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushRegs {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    /// Ignored by `popal`.
    pub oesp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub regs: PushRegs,
    pub gs: u16,
    pad0: u16,
    pub fs: u16,
    pad1: u16,
    pub es: u16,
    pad2: u16,
    pub ds: u16,
    pad3: u16,
    pub vector: u32,
    pub err: u32,
    pub eip: u32,
    pub cs: u16,
    pad4: u16,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u16,
    pad5: u16,
}

// SAFETY: repr(C), every field is an integer and all padding is explicit.
unsafe impl plain::Plain for TrapFrame {}

const _: () = assert!(size_of::<TrapFrame>() == TrapFrame::SIZE);
const _: () = assert!(size_of::<PushRegs>() == 32);

impl TrapFrame {
    /// Size of a frame that carries the trailing stack pair.
    pub const SIZE: usize = 76;
    /// Size of a frame whose trap did not cross privilege levels.
    pub const SAME_LEVEL_SIZE: usize = Self::SIZE - 8;

    pub const fn zeroed() -> Self {
        Self {
            regs: PushRegs { edi: 0, esi: 0, ebp: 0, oesp: 0, ebx: 0, edx: 0, ecx: 0, eax: 0 },
            gs: 0,
            pad0: 0,
            fs: 0,
            pad1: 0,
            es: 0,
            pad2: 0,
            ds: 0,
            pad3: 0,
            vector: 0,
            err: 0,
            eip: 0,
            cs: 0,
            pad4: 0,
            eflags: 0,
            esp: 0,
            ss: 0,
            pad5: 0,
        }
    }

    pub fn code_selector(&self) -> SegmentSelector {
        SegmentSelector(self.cs)
    }

    /// Privilege level of the interrupted code, from the RPL of `cs`.
    pub fn privilege(&self) -> PrivilegeLevel {
        self.code_selector().rpl()
    }

    /// Whether `iret` must also pop `esp` and `ss` for this frame.
    pub fn crossed_privilege(&self) -> bool {
        self.privilege() != PrivilegeLevel::Ring0
    }

    pub fn flags(&self) -> RFlags {
        RFlags::from_bits_truncate(u64::from(self.eflags))
    }

    pub fn io_privilege(&self) -> u32 {
        (self.eflags & IOPL_MASK) >> IOPL_SHIFT
    }

    pub fn set_io_privilege(&mut self, level: PrivilegeLevel) {
        self.eflags = (self.eflags & !IOPL_MASK) | ((level as u32) << IOPL_SHIFT);
    }

    /// The full 76-byte image of the frame.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: Plain type without implicit padding.
        unsafe { plain::as_bytes(self) }
    }

    /// Decode the leading `bytes.len()` bytes (at most [`Self::SIZE`]) of a
    /// frame image; fields past the end stay zero.
    pub fn from_prefix(bytes: &[u8]) -> Self {
        let mut frame = Self::zeroed();
        let len = bytes.len().min(Self::SIZE);
        // SAFETY: any byte pattern is a valid TrapFrame.
        let raw = unsafe { plain::as_mut_bytes(&mut frame) };
        raw[..len].copy_from_slice(&bytes[..len]);
        frame
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionError {
    /// Code selector leaves ring 0 but no stack pair was given.
    MissingStack,
    /// Code selector stays at ring 0 yet a stack pair was given.
    UnexpectedStack,
    Truncated { needed: usize, got: usize },
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionError::MissingStack => write!(f, "privilege-crossing context without a stack"),
            RegionError::UnexpectedStack => write!(f, "ring 0 context with a stack pair"),
            RegionError::Truncated { needed, got } => {
                write!(f, "context truncated ({} of {} bytes)", got, needed)
            }
        }
    }
}

/// A frame image whose length matches what `iret` will consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRegion {
    /// `iret` stays at ring 0: pops eip, cs, eflags.
    SameLevel(TrapFrame),
    /// `iret` leaves ring 0: pops eip, cs, eflags, esp, ss.
    CrossLevel(TrapFrame),
}

impl ContextRegion {
    pub fn frame(&self) -> &TrapFrame {
        match self {
            ContextRegion::SameLevel(frame) | ContextRegion::CrossLevel(frame) => frame,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ContextRegion::SameLevel(_) => TrapFrame::SAME_LEVEL_SIZE,
            ContextRegion::CrossLevel(_) => TrapFrame::SIZE,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.frame().as_bytes()[..self.len()]
    }

    /// Read a region back from memory, sizing it by its own `cs`.
    pub fn decode(bytes: &[u8]) -> Result<Self, RegionError> {
        let short = TrapFrame::SAME_LEVEL_SIZE;
        if bytes.len() < short {
            return Err(RegionError::Truncated { needed: short, got: bytes.len() });
        }
        let head = TrapFrame::from_prefix(&bytes[..short]);
        if !head.crossed_privilege() {
            return Ok(ContextRegion::SameLevel(head));
        }
        if bytes.len() < TrapFrame::SIZE {
            return Err(RegionError::Truncated { needed: TrapFrame::SIZE, got: bytes.len() });
        }
        Ok(ContextRegion::CrossLevel(TrapFrame::from_prefix(&bytes[..TrapFrame::SIZE])))
    }
}

/// Builds a [`ContextRegion`] from an existing frame, checking that the
/// trailing stack pair is present exactly when the target `cs` needs it.
#[derive(Debug, Clone)]
pub struct RegionBuilder {
    frame: TrapFrame,
    stack: Option<(u32, SegmentSelector)>,
}

impl RegionBuilder {
    pub fn new(frame: &TrapFrame) -> Self {
        Self { frame: *frame, stack: None }
    }

    pub fn code_segment(mut self, selector: SegmentSelector) -> Self {
        self.frame.cs = selector.0;
        self
    }

    /// Sets `ds` and `es`; `fs` and `gs` are left alone.
    pub fn data_segments(mut self, selector: SegmentSelector) -> Self {
        self.frame.ds = selector.0;
        self.frame.es = selector.0;
        self
    }

    pub fn stack(mut self, esp: u32, ss: SegmentSelector) -> Self {
        self.stack = Some((esp, ss));
        self
    }

    pub fn io_privilege(mut self, level: PrivilegeLevel) -> Self {
        self.frame.set_io_privilege(level);
        self
    }

    pub fn build(self) -> Result<ContextRegion, RegionError> {
        let mut frame = self.frame;
        match (frame.crossed_privilege(), self.stack) {
            (true, Some((esp, ss))) => {
                frame.esp = esp;
                frame.ss = ss.0;
                Ok(ContextRegion::CrossLevel(frame))
            }
            (true, None) => Err(RegionError::MissingStack),
            (false, None) => Ok(ContextRegion::SameLevel(frame)),
            (false, Some(_)) => Err(RegionError::UnexpectedStack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    const USER_CS: u16 = 0x1B;
    const KERNEL_CS: u16 = 0x08;

    fn sample(cs: u16) -> TrapFrame {
        let mut frame = TrapFrame::zeroed();
        frame.regs.eax = 0x1111_1111;
        frame.regs.edi = 0x2222_2222;
        frame.vector = 0x0D;
        frame.eip = 0x0010_0000;
        frame.cs = cs;
        frame.eflags = 0x0000_0202;
        frame.esp = 0x0001_0000;
        frame.ss = 0x23;
        frame
    }

    #[test]
    fn test_layout_matches_stack_image() {
        assert_eq!(offset_of!(TrapFrame, regs), 0);
        assert_eq!(offset_of!(PushRegs, eax), 28);
        assert_eq!(offset_of!(TrapFrame, gs), 32);
        assert_eq!(offset_of!(TrapFrame, fs), 36);
        assert_eq!(offset_of!(TrapFrame, es), 40);
        assert_eq!(offset_of!(TrapFrame, ds), 44);
        assert_eq!(offset_of!(TrapFrame, vector), 48);
        assert_eq!(offset_of!(TrapFrame, err), 52);
        assert_eq!(offset_of!(TrapFrame, eip), 56);
        assert_eq!(offset_of!(TrapFrame, cs), 60);
        assert_eq!(offset_of!(TrapFrame, eflags), 64);
        assert_eq!(offset_of!(TrapFrame, esp), 68);
        assert_eq!(offset_of!(TrapFrame, ss), 72);
        assert_eq!(size_of::<TrapFrame>(), 76);
    }

    #[test]
    fn test_bytes_are_little_endian_fields() {
        let frame = sample(KERNEL_CS);
        let bytes = frame.as_bytes();
        assert_eq!(bytes.len(), TrapFrame::SIZE);
        assert_eq!(&bytes[28..32], &0x1111_1111u32.to_le_bytes());
        assert_eq!(&bytes[56..60], &0x0010_0000u32.to_le_bytes());
        assert_eq!(TrapFrame::from_prefix(bytes), frame);
    }

    #[test]
    fn test_privilege_follows_cs_rpl() {
        assert!(!sample(KERNEL_CS).crossed_privilege());
        assert!(sample(USER_CS).crossed_privilege());
        assert_eq!(sample(USER_CS).privilege(), PrivilegeLevel::Ring3);
        assert_eq!(sample(KERNEL_CS).privilege(), PrivilegeLevel::Ring0);
    }

    #[test]
    fn test_code_selector_splits_cs() {
        let user = sample(USER_CS).code_selector();
        assert_eq!(user.index(), 3);
        assert_eq!(user.rpl(), PrivilegeLevel::Ring3);
        let kernel = sample(KERNEL_CS).code_selector();
        assert_eq!(kernel.index(), 1);
        assert_eq!(kernel.rpl(), PrivilegeLevel::Ring0);
    }

    #[test]
    fn test_io_privilege_round_trip() {
        let mut frame = sample(KERNEL_CS);
        frame.set_io_privilege(PrivilegeLevel::Ring3);
        assert_eq!(frame.eflags & IOPL_MASK, 0x3000);
        assert_eq!(frame.io_privilege(), 3);
        frame.set_io_privilege(PrivilegeLevel::Ring0);
        assert_eq!(frame.eflags, 0x0000_0202);
    }

    #[test]
    fn test_builder_requires_stack_when_leaving_ring0() {
        let frame = sample(KERNEL_CS);
        let err = RegionBuilder::new(&frame)
            .code_segment(SegmentSelector(USER_CS))
            .build()
            .unwrap_err();
        assert_eq!(err, RegionError::MissingStack);

        let region = RegionBuilder::new(&frame)
            .code_segment(SegmentSelector(USER_CS))
            .stack(0xCAFE_0000, SegmentSelector(0x23))
            .build()
            .unwrap();
        assert_eq!(region.len(), TrapFrame::SIZE);
        assert_eq!(region.frame().esp, 0xCAFE_0000);
        assert_eq!(region.frame().ss, 0x23);
    }

    #[test]
    fn test_builder_rejects_stack_for_ring0() {
        let frame = sample(USER_CS);
        let err = RegionBuilder::new(&frame)
            .code_segment(SegmentSelector(KERNEL_CS))
            .stack(0, SegmentSelector(0x10))
            .build()
            .unwrap_err();
        assert_eq!(err, RegionError::UnexpectedStack);

        let region = RegionBuilder::new(&frame)
            .code_segment(SegmentSelector(KERNEL_CS))
            .build()
            .unwrap();
        assert!(matches!(region, ContextRegion::SameLevel(_)));
        assert_eq!(region.as_bytes().len(), TrapFrame::SAME_LEVEL_SIZE);
    }

    #[test]
    fn test_decode_sizes_by_cs() {
        let kernel = sample(KERNEL_CS);
        let region = ContextRegion::decode(&kernel.as_bytes()[..68]).unwrap();
        assert!(matches!(region, ContextRegion::SameLevel(_)));
        assert_eq!(region.frame().eip, kernel.eip);

        let user = sample(USER_CS);
        assert_eq!(
            ContextRegion::decode(&user.as_bytes()[..68]),
            Err(RegionError::Truncated { needed: 76, got: 68 })
        );
        let region = ContextRegion::decode(user.as_bytes()).unwrap();
        assert_eq!(region, ContextRegion::CrossLevel(user));
    }
}
