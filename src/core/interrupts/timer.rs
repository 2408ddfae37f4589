//! 8253/8254 PIT setup and the tick counter it drives.

use core::sync::atomic::{AtomicUsize, Ordering};

use log::info;
use crate::core::cpu::port::Port;

const IO_TIMER1: u16 = 0x040;
const TIMER_MODE: u16 = IO_TIMER1 + 3;

const TIMER_SEL0: u8 = 0x00;
const TIMER_RATEGEN: u8 = 0x04;
const TIMER_16BIT: u8 = 0x30;

/// PIT input clock in Hz.
pub const TIMER_FREQ: u32 = 1_193_182;
/// Interrupts per second.
pub const TICK_HZ: u32 = 100;
/// Ticks between periodic diagnostics.
pub const TICK_NUM: usize = 100;

pub const fn timer_divisor(hz: u32) -> u16 {
    ((TIMER_FREQ + hz / 2) / hz) as u16
}

pub struct Ticks(AtomicUsize);

impl Ticks {
    pub const fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    /// Count one tick, returning the new total.
    pub fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

impl Default for Ticks {
    fn default() -> Self {
        Self::new()
    }
}

pub static TICKS: Ticks = Ticks::new();

/// Start IRQ0 at [`TICK_HZ`].
pub fn init() {
    let divisor = timer_divisor(TICK_HZ);
    unsafe {
        Port::<u8>::new(TIMER_MODE).write(TIMER_SEL0 | TIMER_RATEGEN | TIMER_16BIT);
        let mut counter = Port::<u8>::new(IO_TIMER1);
        counter.write(divisor as u8);
        counter.write((divisor >> 8) as u8);
    }
    TICKS.reset();
    info!("setup timer interrupts");
}
