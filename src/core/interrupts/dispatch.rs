//! # Trap Dispatch
//!
//! Routes one trap to its handler by vector.
//!
//! | Vector | Source            | Action                                 |
//! |--------|-------------------|----------------------------------------|
//! | 32     | Timer (IRQ0)      | count tick, report every `TICK_NUM`    |
//! | 33     | Keyboard (IRQ1)   | read one key, echo it                  |
//! | 36     | COM1 (IRQ4)       | read one byte, echo it                 |
//! | 46, 47 | IDE (IRQ14, 15)   | ignored                                |
//! | 120    | `int` from ring 0 | resume at ring 3                       |
//! | 121    | `int` from ring 3 | resume at ring 0                       |
//! | other  | anything          | fatal in the kernel, ignored from user |
//!
//! Everything the handlers touch outside the frame goes through
//! [`TrapEnv`], so the whole table runs against a fake in tests.

use core::fmt::{self, Write};

use super::dump::format_trap_context;
use super::switch::{switch_to_kernel, switch_to_user, SwitchError, TrapMemory, TrapSite};
use super::timer::{Ticks, TICK_NUM};
use super::trapframe::TrapFrame;
use super::vectors::{is_irq, TrapKind};

/// Devices and counters the handlers act on.
pub trait TrapEnv: Write {
    fn ticks(&self) -> &Ticks;
    fn serial_getc(&mut self) -> Option<u8>;
    fn keyboard_getc(&mut self) -> Option<u8>;
    fn end_of_interrupt(&mut self, vector: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapError {
    /// A trap nothing handles arrived while running at ring 0.
    UnexpectedInKernel { vector: u32 },
    /// Grading run reached its tick budget.
    EndOfTest,
    Switch(SwitchError),
}

impl From<SwitchError> for TrapError {
    fn from(err: SwitchError) -> Self {
        TrapError::Switch(err)
    }
}

impl fmt::Display for TrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrapError::UnexpectedInKernel { .. } => write!(f, "unexpected trap in kernel."),
            TrapError::EndOfTest => write!(f, "EOT: kernel seems ok."),
            TrapError::Switch(err) => write!(f, "privilege switch failed: {}", err),
        }
    }
}

pub fn dispatch<E, M>(
    frame: &mut TrapFrame,
    site: &mut TrapSite<'_, M>,
    env: &mut E,
) -> Result<(), TrapError>
where
    E: TrapEnv + ?Sized,
    M: TrapMemory + ?Sized,
{
    let vector = frame.vector;
    let result = handle(frame, site, env);
    if is_irq(vector) {
        env.end_of_interrupt(vector as u8);
    }
    result
}

fn handle<E, M>(
    frame: &mut TrapFrame,
    site: &mut TrapSite<'_, M>,
    env: &mut E,
) -> Result<(), TrapError>
where
    E: TrapEnv + ?Sized,
    M: TrapMemory + ?Sized,
{
    match TrapKind::from(frame.vector) {
        TrapKind::Timer => on_tick(env),
        TrapKind::Serial => {
            if let Some(c) = env.serial_getc() {
                echo(env, "serial", c);
            }
            Ok(())
        }
        TrapKind::Keyboard => {
            if let Some(c) = env.keyboard_getc() {
                echo(env, "kbd", c);
            }
            Ok(())
        }
        TrapKind::Disk => Ok(()),
        TrapKind::SwitchToUser => {
            switch_to_user(frame, site)?;
            Ok(())
        }
        TrapKind::SwitchToKernel => {
            switch_to_kernel(frame, site)?;
            Ok(())
        }
        TrapKind::Other(vector) => {
            if frame.crossed_privilege() {
                return Ok(());
            }
            let _ = write!(env, "{}", format_trap_context(frame, site.frame_addr()));
            Err(TrapError::UnexpectedInKernel { vector })
        }
    }
}

fn on_tick<E: TrapEnv + ?Sized>(env: &mut E) -> Result<(), TrapError> {
    let count = env.ticks().increment();
    if count % TICK_NUM == 0 {
        let _ = writeln!(env, "{} ticks", TICK_NUM);
        if cfg!(feature = "grade") {
            let _ = writeln!(env, "End of Test.");
            return Err(TrapError::EndOfTest);
        }
    }
    Ok(())
}

fn echo<E: TrapEnv + ?Sized>(env: &mut E, source: &str, c: u8) {
    let _ = writeln!(env, "{} [{:03}] {}", source, c, char::from(c));
}

#[cfg(test)]
mod tests {
    use super::super::gdt::{KERNEL_CS, KERNEL_DS, USER_CS, USER_DS};
    use super::super::switch::testing::{push_frame, SimMemory};
    use super::super::switch::ShadowFrame;
    use super::super::vectors::{PAGE_FAULT, SWITCH_TO_KERNEL, SWITCH_TO_USER};
    use super::*;
    use std::collections::VecDeque;

    const BASE: u32 = 0x7000;
    const SCRATCH: u32 = 0x7100;
    const KSTACK_FRAME: u32 = 0x7200;
    const TSS_FRAME: u32 = 0x7C00;

    #[derive(Default)]
    struct RecordingEnv {
        out: String,
        ticks: Ticks,
        serial: VecDeque<u8>,
        keyboard: VecDeque<u8>,
        eois: Vec<u8>,
    }

    impl Write for RecordingEnv {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            self.out.push_str(s);
            Ok(())
        }
    }

    impl TrapEnv for RecordingEnv {
        fn ticks(&self) -> &Ticks {
            &self.ticks
        }

        fn serial_getc(&mut self) -> Option<u8> {
            self.serial.pop_front()
        }

        fn keyboard_getc(&mut self) -> Option<u8> {
            self.keyboard.pop_front()
        }

        fn end_of_interrupt(&mut self, vector: u8) {
            self.eois.push(vector);
        }
    }

    fn kernel_frame(vector: u32) -> TrapFrame {
        let mut frame = TrapFrame::zeroed();
        frame.vector = vector;
        frame.cs = KERNEL_CS.0;
        frame.ds = KERNEL_DS.0;
        frame.es = KERNEL_DS.0;
        frame.eip = 0x0010_0200;
        frame.eflags = 0x0000_0202;
        frame
    }

    fn user_frame(vector: u32) -> TrapFrame {
        let mut frame = kernel_frame(vector);
        frame.cs = USER_CS.0;
        frame.ds = USER_DS.0;
        frame.es = USER_DS.0;
        frame.esp = 0x7800;
        frame.ss = USER_DS.0;
        frame
    }

    /// Lay `frame` down where the CPU would have and dispatch it.
    fn run(env: &mut RecordingEnv, mem: &mut SimMemory, frame: &mut TrapFrame) -> Result<(), TrapError> {
        let addr = if frame.crossed_privilege() { TSS_FRAME } else { KSTACK_FRAME };
        let len = if frame.crossed_privilege() { TrapFrame::SIZE } else { TrapFrame::SAME_LEVEL_SIZE };
        push_frame(mem, addr, frame, len);
        let mut site = TrapSite::new(mem, addr, unsafe { ShadowFrame::new(SCRATCH) });
        dispatch(frame, &mut site, env)
    }

    #[cfg(not(feature = "grade"))]
    #[test]
    fn test_ticks_report_every_hundred() {
        let mut env = RecordingEnv::default();
        let mut mem = SimMemory::new(BASE, 0x1000);
        for _ in 0..250 {
            run(&mut env, &mut mem, &mut kernel_frame(32)).unwrap();
        }
        assert_eq!(env.ticks.get(), 250);
        assert_eq!(env.out, "100 ticks\n100 ticks\n");
        assert_eq!(env.eois.len(), 250);
        assert!(env.eois.iter().all(|&v| v == 32));
    }

    #[cfg(feature = "grade")]
    #[test]
    fn test_grade_stops_at_first_report() {
        let mut env = RecordingEnv::default();
        let mut mem = SimMemory::new(BASE, 0x1000);
        for _ in 0..99 {
            run(&mut env, &mut mem, &mut kernel_frame(32)).unwrap();
        }
        let result = run(&mut env, &mut mem, &mut kernel_frame(32));
        assert_eq!(result, Err(TrapError::EndOfTest));
        assert_eq!(env.out, "100 ticks\nEnd of Test.\n");
        assert_eq!(env.eois.len(), 100);
    }

    #[test]
    fn test_serial_and_keyboard_echo() {
        let mut env = RecordingEnv::default();
        env.serial.push_back(b'a');
        env.keyboard.push_back(b'Z');
        let mut mem = SimMemory::new(BASE, 0x1000);

        run(&mut env, &mut mem, &mut kernel_frame(36)).unwrap();
        run(&mut env, &mut mem, &mut kernel_frame(33)).unwrap();
        assert_eq!(env.out, "serial [097] a\nkbd [090] Z\n");
        assert_eq!(env.eois, [36, 33]);
    }

    #[test]
    fn test_dropped_read_prints_nothing() {
        let mut env = RecordingEnv::default();
        let mut mem = SimMemory::new(BASE, 0x1000);

        run(&mut env, &mut mem, &mut kernel_frame(36)).unwrap();
        run(&mut env, &mut mem, &mut kernel_frame(33)).unwrap();
        assert!(env.out.is_empty());
        assert_eq!(env.eois, [36, 33]);
    }

    #[test]
    fn test_disk_interrupts_ignored() {
        let mut env = RecordingEnv::default();
        let mut mem = SimMemory::new(BASE, 0x1000);
        for vector in [46, 47] {
            let mut frame = kernel_frame(vector);
            let before = frame;
            run(&mut env, &mut mem, &mut frame).unwrap();
            assert_eq!(frame, before);
        }
        assert!(env.out.is_empty());
        assert_eq!(env.eois, [46, 47]);
    }

    #[test]
    fn test_unknown_trap_in_kernel_is_fatal() {
        let mut env = RecordingEnv::default();
        let mut mem = SimMemory::new(BASE, 0x1000);
        let result = run(&mut env, &mut mem, &mut kernel_frame(PAGE_FAULT));

        assert_eq!(result, Err(TrapError::UnexpectedInKernel { vector: PAGE_FAULT }));
        assert!(env.out.starts_with("trapframe at 0x00007200\n"));
        assert!(env.out.contains("  trap 0x0000000e Page Fault\n"));
        assert!(env.eois.is_empty());
        assert_eq!(
            result.unwrap_err().to_string(),
            "unexpected trap in kernel."
        );
    }

    #[test]
    fn test_unknown_trap_from_user_is_ignored() {
        let mut env = RecordingEnv::default();
        let mut mem = SimMemory::new(BASE, 0x1000);
        let mut frame = user_frame(PAGE_FAULT);
        let before = frame;

        assert_eq!(run(&mut env, &mut mem, &mut frame), Ok(()));
        assert_eq!(frame, before);
        assert!(env.out.is_empty());
    }

    #[test]
    fn test_switch_vectors_redirect_restore_slot() {
        let mut env = RecordingEnv::default();
        let mut mem = SimMemory::new(BASE, 0x1000);

        let mut frame = kernel_frame(SWITCH_TO_USER);
        run(&mut env, &mut mem, &mut frame).unwrap();
        let forged = mem.frame_at(SCRATCH);
        assert_eq!(forged.cs, USER_CS.0);
        let mut slot = [0u8; 4];
        mem.read(KSTACK_FRAME - 4, &mut slot);
        assert_eq!(u32::from_le_bytes(slot), SCRATCH);

        let mut frame = user_frame(SWITCH_TO_KERNEL);
        run(&mut env, &mut mem, &mut frame).unwrap();
        assert_eq!(frame.cs, KERNEL_CS.0);
        mem.read(TSS_FRAME - 4, &mut slot);
        assert_eq!(u32::from_le_bytes(slot), 0x7800 - 68);

        assert!(env.out.is_empty());
        assert!(env.eois.is_empty());
    }

    #[test]
    fn test_switch_to_current_level_is_noop() {
        let mut env = RecordingEnv::default();
        let mut mem = SimMemory::new(BASE, 0x1000);

        let mut frame = user_frame(SWITCH_TO_USER);
        let before = frame;
        run(&mut env, &mut mem, &mut frame).unwrap();
        assert_eq!(frame, before);

        let mut frame = kernel_frame(SWITCH_TO_KERNEL);
        let before = frame;
        run(&mut env, &mut mem, &mut frame).unwrap();
        assert_eq!(frame, before);
    }
}
