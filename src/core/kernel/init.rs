//! Kernel initialization phases

use log::{error, info};

/// Run one initialization step, logging how it went.
pub fn init_phase<F>(name: &'static str, init_fn: F) -> Result<(), &'static str>
where
    F: FnOnce() -> Result<(), &'static str>,
{
    info!("Initializing {}...", name);

    match init_fn() {
        Ok(()) => {
            info!("{} initialized successfully", name);
            Ok(())
        }
        Err(e) => {
            error!("{} failed: {}", name, e);
            Err(e)
        }
    }
}

/// Bring up everything traps depend on, in order, then unmask interrupts.
#[cfg(target_arch = "x86")]
pub fn init_kernel(
    kernel_stack_top: u32,
    stubs: &[u32; crate::core::interrupts::vectors::VECTOR_COUNT],
) -> Result<(), &'static str> {
    use crate::core::interrupts::{gdt, interrupts, pic, timer};

    init_phase("Segment Table", || {
        gdt::init(kernel_stack_top);
        Ok(())
    })?;
    init_phase("Interrupt Controller", || {
        pic::init();
        Ok(())
    })?;
    init_phase("Interrupt Table", || {
        interrupts::init_idt(stubs);
        Ok(())
    })?;
    init_phase("Clock", || {
        timer::init();
        Ok(())
    })?;

    crate::core::cpu::interrupts::enable();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_result_passes_through() {
        assert_eq!(init_phase("ok", || Ok(())), Ok(()));
        assert_eq!(init_phase("bad", || Err("no device")), Err("no device"));
    }

    #[test]
    fn test_phase_runs_once() {
        let mut runs = 0;
        init_phase("count", || {
            runs += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(runs, 1);
    }
}
