//! # Trap Entry
//!
//! Hooks the generated entry stubs up to the dispatcher.
//!
//! Every vector enters through a stub that pushes an error code (when the
//! CPU did not) and the vector number, then jumps to the common entry in
//! `trapentry.S`. That code completes the [`TrapFrame`], reserves a
//! restore slot and one frame of scratch, and calls [`trap`]:
//!
//! ```text
//!   high ┌──────────────┐
//!        │ trap frame   │ ◀── frame
//!        ├──────────────┤
//!        │ restore slot │ ──▶ frame (unless a switch redirected it)
//!        ├──────────────┤
//!        │ scratch (76) │ ◀── scratch
//!   low  └──────────────┘
//! ```
//!
//! On return the stub loads `esp` from the restore slot and unwinds
//! whatever frame it names.

use core::fmt::{self, Write};

use spin::Once;

use super::dispatch::{dispatch, TrapEnv};
use super::gdt::KERNEL_CS;
use super::idt::Idt;
use super::pic::PICS;
use super::switch::{RawMemory, ShadowFrame, TrapSite};
use super::timer::{Ticks, TICKS};
use super::trapframe::TrapFrame;
use super::vectors::{SWITCH_TO_KERNEL, VECTOR_COUNT};
use crate::console;

static IDT: Once<Idt> = Once::new();

/// The machine as the dispatcher sees it.
pub struct KernelEnv;

impl Write for KernelEnv {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        console::Console.write_str(s)
    }
}

impl TrapEnv for KernelEnv {
    fn ticks(&self) -> &Ticks {
        &TICKS
    }

    fn serial_getc(&mut self) -> Option<u8> {
        console::serial_getc()
    }

    fn keyboard_getc(&mut self) -> Option<u8> {
        console::keyboard_getc()
    }

    fn end_of_interrupt(&mut self, vector: u8) {
        unsafe { PICS.lock().notify_end_of_interrupt(vector) };
    }
}

/// Build the table from the stub addresses and load it. Only the
/// switch-to-kernel gate is reachable from ring 3.
pub fn init_idt(vectors: &[u32; VECTOR_COUNT]) {
    let idt = IDT.call_once(|| Idt::new(vectors, KERNEL_CS, SWITCH_TO_KERNEL as u8));
    unsafe { idt.load() };
}

/// Called by the common entry stub with interrupts masked.
///
/// The frame is only 68 bytes when the trap stayed at ring 0, so it is
/// never borrowed in place; the dispatcher works on a copy sized by `cs`.
///
/// # Safety
/// `frame` must be the trap frame the stub just built, with the restore
/// slot directly below it, and `scratch` the frame-sized area the stub
/// reserved for this trap.
#[no_mangle]
pub unsafe extern "C" fn trap(frame: *mut TrapFrame, scratch: *mut TrapFrame) {
    // SAFETY: the stub owns both areas until `iret`; the caller's contract.
    let (mut mem, shadow) = unsafe { (RawMemory::new(), ShadowFrame::new(scratch as u32)) };
    let mut site = TrapSite::new(&mut mem, frame as u32, shadow);
    let result = site.with_frame(|frame, site| dispatch(frame, site, &mut KernelEnv));
    if let Err(err) = result {
        panic!("{}", err);
    }
}
