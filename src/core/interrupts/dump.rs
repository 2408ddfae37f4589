//! Human-readable trap frame dumps, used by fatal traps and the monitor.

use core::fmt;

use x86_64::registers::rflags::RFlags;

use super::trapframe::{PushRegs, TrapFrame};
use super::vectors::trap_name;

static FLAG_NAMES: [(RFlags, &str); 16] = [
    (RFlags::CARRY_FLAG, "CF"),
    (RFlags::PARITY_FLAG, "PF"),
    (RFlags::AUXILIARY_CARRY_FLAG, "AF"),
    (RFlags::ZERO_FLAG, "ZF"),
    (RFlags::SIGN_FLAG, "SF"),
    (RFlags::TRAP_FLAG, "TF"),
    (RFlags::INTERRUPT_FLAG, "IF"),
    (RFlags::DIRECTION_FLAG, "DF"),
    (RFlags::OVERFLOW_FLAG, "OF"),
    (RFlags::NESTED_TASK, "NT"),
    (RFlags::RESUME_FLAG, "RF"),
    (RFlags::VIRTUAL_8086_MODE, "VM"),
    (RFlags::ALIGNMENT_CHECK, "AC"),
    (RFlags::VIRTUAL_INTERRUPT, "VIF"),
    (RFlags::VIRTUAL_INTERRUPT_PENDING, "VIP"),
    (RFlags::ID, "ID"),
];

pub struct RegsDump<'a>(pub &'a PushRegs);

impl fmt::Display for RegsDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let regs = self.0;
        writeln!(f, "  edi  0x{:08x}", regs.edi)?;
        writeln!(f, "  esi  0x{:08x}", regs.esi)?;
        writeln!(f, "  ebp  0x{:08x}", regs.ebp)?;
        writeln!(f, "  oesp 0x{:08x}", regs.oesp)?;
        writeln!(f, "  ebx  0x{:08x}", regs.ebx)?;
        writeln!(f, "  edx  0x{:08x}", regs.edx)?;
        writeln!(f, "  ecx  0x{:08x}", regs.ecx)?;
        writeln!(f, "  eax  0x{:08x}", regs.eax)
    }
}

pub struct TrapFrameDump<'a> {
    frame: &'a TrapFrame,
    addr: u32,
}

/// Render every field of `frame`, which lives at `addr`.
pub fn format_trap_context(frame: &TrapFrame, addr: u32) -> TrapFrameDump<'_> {
    TrapFrameDump { frame, addr }
}

impl fmt::Display for TrapFrameDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tf = self.frame;
        writeln!(f, "trapframe at 0x{:08x}", self.addr)?;
        write!(f, "{}", RegsDump(&tf.regs))?;
        writeln!(f, "  ds   0x----{:04x}", tf.ds)?;
        writeln!(f, "  es   0x----{:04x}", tf.es)?;
        writeln!(f, "  fs   0x----{:04x}", tf.fs)?;
        writeln!(f, "  gs   0x----{:04x}", tf.gs)?;
        writeln!(f, "  trap 0x{:08x} {}", tf.vector, trap_name(tf.vector))?;
        writeln!(f, "  err  0x{:08x}", tf.err)?;
        writeln!(f, "  eip  0x{:08x}", tf.eip)?;
        writeln!(f, "  cs   0x----{:04x}", tf.cs)?;
        write!(f, "  flag 0x{:08x} ", tf.eflags)?;

        let flags = tf.flags();
        for (bit, name) in FLAG_NAMES.iter() {
            if flags.contains(*bit) {
                write!(f, "{},", name)?;
            }
        }
        writeln!(f, "IOPL={}", tf.io_privilege())?;

        if tf.crossed_privilege() {
            writeln!(f, "  esp  0x{:08x}", tf.esp)?;
            writeln!(f, "  ss   0x----{:04x}", tf.ss)?;
        }
        Ok(())
    }
}
