//! # Privilege Transitions
//!
//! Moves execution between ring 0 and ring 3 without a scheduler by
//! rewriting what the entry stub's `iret` will consume.
//!
//! The stub keeps a pointer-sized *restore slot* directly below the live
//! frame. After `trap` returns it loads the stack pointer from that slot,
//! pops registers and segments from there and executes `iret`. Pointing
//! the slot at a different, forged frame makes the CPU resume that one.
//!
//! ```text
//!   kernel -> user                       user -> kernel
//!
//!   scratch ┌────────────┐               user stack     ┌──────────────┐
//!           │ forged     │ cs = USER_CS    esp - 68 ──▶ │ frame copy   │
//!           │ frame (76) │ esp ─────┐                   │ (68, ring 0) │
//!           └────────────┘          │          esp ──▶  └──────────────┘
//!   slot    │ ──▶ scratch│          │
//!   frame   │ live frame │          │    kernel stack   ┌──────────────┐
//!           │ (68)       │          │    slot           │ ──▶ copy     │
//!   +68     │ 8 reserved │ ◀────────┘    frame          │ live (76)    │
//!           └────────────┘                              └──────────────┘
//! ```
//!
//! Kernel code asking to drop to ring 3 reserves 8 bytes before `int`, so
//! the forged frame's stack pointer lands right after the 68-byte frame
//! the CPU pushed. In the other direction the frame is copied onto the
//! interrupted user stack just below its saved `esp`, so the same-level
//! `iret` leaves `esp` exactly where the user code had it.

use core::fmt;

use x86_64::PrivilegeLevel;

use super::gdt::{KERNEL_CS, KERNEL_DS, USER_CS, USER_DS};
use super::trapframe::{ContextRegion, RegionBuilder, RegionError, TrapFrame};

/// Byte access to the 32-bit address space a trap frame lives in.
pub trait TrapMemory {
    fn read(&self, addr: u32, buf: &mut [u8]);
    fn write(&mut self, addr: u32, bytes: &[u8]);
}

/// Direct access through the current address space.
pub struct RawMemory(());

impl RawMemory {
    /// # Safety
    /// Every address handed to the returned value must be mapped and owned
    /// by the current trap.
    pub unsafe fn new() -> Self {
        Self(())
    }
}

impl TrapMemory for RawMemory {
    fn read(&self, addr: u32, buf: &mut [u8]) {
        // SAFETY: `new`'s caller vouches for every address it hands us; the
        // source may overlap the trap stack, hence `copy`.
        unsafe {
            core::ptr::copy(addr as usize as *const u8, buf.as_mut_ptr(), buf.len());
        }
    }

    fn write(&mut self, addr: u32, bytes: &[u8]) {
        // SAFETY: as for `read`. No Rust reference covers the destination
        // while we write; the trap frame is only ever accessed by value.
        unsafe {
            core::ptr::copy(bytes.as_ptr(), addr as usize as *mut u8, bytes.len());
        }
    }
}

/// One trap frame of scratch reserved by the entry stub for this trap.
/// Consumed by the first kernel-to-user switch; never reused.
#[derive(Debug)]
pub struct ShadowFrame {
    addr: u32,
}

impl ShadowFrame {
    /// # Safety
    /// `addr` must name [`TrapFrame::SIZE`] bytes that stay untouched until
    /// the stub's `iret` has consumed them.
    pub unsafe fn new(addr: u32) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> u32 {
        self.addr
    }
}

/// Where the current trap's frame lives and what may be rewritten around it.
pub struct TrapSite<'m, M: TrapMemory + ?Sized> {
    mem: &'m mut M,
    frame: u32,
    scratch: Option<ShadowFrame>,
}

impl<'m, M: TrapMemory + ?Sized> TrapSite<'m, M> {
    pub fn new(mem: &'m mut M, frame: u32, scratch: ShadowFrame) -> Self {
        Self { mem, frame, scratch: Some(scratch) }
    }

    pub fn frame_addr(&self) -> u32 {
        self.frame
    }

    pub fn restore_slot(&self) -> u32 {
        self.frame - 4
    }

    /// Address the stub will restore from.
    pub fn restore_target(&self) -> u32 {
        let mut word = [0u8; 4];
        self.mem.read(self.restore_slot(), &mut word);
        u32::from_le_bytes(word)
    }

    /// The live frame, read with exactly the bytes the CPU pushed.
    pub fn load_frame(&self) -> ContextRegion {
        let mut buf = [0u8; TrapFrame::SIZE];
        let (head, tail) = buf.split_at_mut(TrapFrame::SAME_LEVEL_SIZE);
        self.mem.read(self.frame, head);
        if !TrapFrame::from_prefix(head).crossed_privilege() {
            return ContextRegion::SameLevel(TrapFrame::from_prefix(head));
        }
        self.mem.read(self.frame + TrapFrame::SAME_LEVEL_SIZE as u32, tail);
        ContextRegion::CrossLevel(TrapFrame::from_prefix(&buf))
    }

    /// Run `f` on a copy of the live frame, then write the copy back over
    /// the bytes it was read from and no further.
    pub fn with_frame<R>(&mut self, f: impl FnOnce(&mut TrapFrame, &mut Self) -> R) -> R {
        let live = self.load_frame();
        let mut frame = *live.frame();
        let result = f(&mut frame, self);
        self.mem.write(self.frame, &frame.as_bytes()[..live.len()]);
        result
    }

    fn place(&mut self, addr: u32, region: &ContextRegion) {
        self.mem.write(addr, region.as_bytes());
    }

    fn redirect(&mut self, addr: u32) {
        let slot = self.restore_slot();
        self.mem.write(slot, &addr.to_le_bytes());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    /// Already at the requested level.
    Unchanged,
    /// The restore slot now names the frame at this address.
    Redirected(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchError {
    /// This trap's scratch frame was already spent.
    ScratchInUse,
    Region(RegionError),
}

impl From<RegionError> for SwitchError {
    fn from(err: RegionError) -> Self {
        SwitchError::Region(err)
    }
}

impl fmt::Display for SwitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchError::ScratchInUse => write!(f, "shadow frame already used by this trap"),
            SwitchError::Region(err) => write!(f, "bad forged context: {}", err),
        }
    }
}

/// Resume the interrupted kernel code at ring 3.
///
/// The live frame is left alone; a ring 3 copy is forged in the scratch
/// frame with I/O privilege kept at 3 so port access still works.
pub fn switch_to_user<M: TrapMemory + ?Sized>(
    frame: &TrapFrame,
    site: &mut TrapSite<'_, M>,
) -> Result<Switch, SwitchError> {
    if frame.cs == USER_CS.0 {
        return Ok(Switch::Unchanged);
    }
    // The stack pair overlays the 8 bytes reserved above the frame.
    let user_esp = site.frame_addr() + (TrapFrame::SIZE - 8) as u32;
    let region = RegionBuilder::new(frame)
        .code_segment(USER_CS)
        .data_segments(USER_DS)
        .stack(user_esp, USER_DS)
        .io_privilege(PrivilegeLevel::Ring3)
        .build()?;

    let shadow = site.scratch.take().ok_or(SwitchError::ScratchInUse)?;
    site.place(shadow.addr(), &region);
    site.redirect(shadow.addr());
    Ok(Switch::Redirected(shadow.addr()))
}

/// Resume the interrupted user code at ring 0.
///
/// The live frame itself is rewritten to kernel segments, then its
/// same-level part is copied onto the user stack right below the saved
/// `esp` and the restore slot pointed there.
pub fn switch_to_kernel<M: TrapMemory + ?Sized>(
    frame: &mut TrapFrame,
    site: &mut TrapSite<'_, M>,
) -> Result<Switch, SwitchError> {
    if frame.cs == KERNEL_CS.0 {
        return Ok(Switch::Unchanged);
    }
    frame.cs = KERNEL_CS.0;
    frame.ds = KERNEL_DS.0;
    frame.es = KERNEL_DS.0;
    frame.ss = KERNEL_DS.0;
    frame.set_io_privilege(PrivilegeLevel::Ring0);

    let region = RegionBuilder::new(frame).build()?;
    let dest = frame.esp.wrapping_sub(TrapFrame::SAME_LEVEL_SIZE as u32);
    site.place(dest, &region);
    site.redirect(dest);
    Ok(Switch::Redirected(dest))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A window of 32-bit address space backed by host memory.
    pub struct SimMemory {
        base: u32,
        bytes: Vec<u8>,
    }

    impl SimMemory {
        pub fn new(base: u32, len: usize) -> Self {
            Self { base, bytes: vec![0; len] }
        }

        fn range(&self, addr: u32, len: usize) -> core::ops::Range<usize> {
            let start = (addr - self.base) as usize;
            start..start + len
        }

        pub fn frame_at(&self, addr: u32) -> TrapFrame {
            let mut buf = [0u8; TrapFrame::SIZE];
            self.read(addr, &mut buf);
            TrapFrame::from_prefix(&buf)
        }

        pub fn region_at(&self, addr: u32) -> ContextRegion {
            let mut buf = [0u8; TrapFrame::SIZE];
            self.read(addr, &mut buf);
            ContextRegion::decode(&buf).unwrap()
        }

        pub fn snapshot(&self) -> Vec<u8> {
            self.bytes.clone()
        }
    }

    impl TrapMemory for SimMemory {
        fn read(&self, addr: u32, buf: &mut [u8]) {
            buf.copy_from_slice(&self.bytes[self.range(addr, buf.len())]);
        }

        fn write(&mut self, addr: u32, bytes: &[u8]) {
            let range = self.range(addr, bytes.len());
            self.bytes[range].copy_from_slice(bytes);
        }
    }

    /// Lay `frame` down at `addr` the way the entry stub would: frame bytes
    /// plus a restore slot naming it.
    pub fn push_frame(mem: &mut SimMemory, addr: u32, frame: &TrapFrame, len: usize) {
        mem.write(addr, &frame.as_bytes()[..len]);
        mem.write(addr - 4, &addr.to_le_bytes());
    }
}
