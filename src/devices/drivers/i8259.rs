//! # Chained 8259 PICs
//!
//! Master and slave 8259A driven through `crate::core::cpu::port`. The
//! 32-bit kernel uses this in place of `pic8259`, whose port I/O exists
//! only on x86_64. Same interface, same initialization sequence.
//!
//! ```text
//! ICW1  0x11           edge triggered, cascade, ICW4 follows
//! ICW2  offset         first vector of the chip
//! ICW3  0x04 / 0x02    master: slave on IRQ2; slave: cascade identity 2
//! ICW4  0x01           8086 mode, normal EOI
//! ```

use crate::core::cpu::port::Port;

const CMD_INIT: u8 = 0x11;
const CMD_END_OF_INTERRUPT: u8 = 0x20;
const MODE_8086: u8 = 0x01;

const MASTER_COMMAND: u16 = 0x20;
const MASTER_DATA: u16 = 0x21;
const SLAVE_COMMAND: u16 = 0xA0;
const SLAVE_DATA: u16 = 0xA1;

/// Unused port; writing it gives the chips time to settle between words.
const WAIT_PORT: u16 = 0x80;

/// ICW2..ICW4 for a chip at `offset` with cascade word `cascade`.
pub const fn init_words(offset: u8, cascade: u8) -> [u8; 3] {
    [offset, cascade, MODE_8086]
}

struct Pic {
    offset: u8,
    command: Port<u8>,
    data: Port<u8>,
}

impl Pic {
    fn handles_interrupt(&self, interrupt_id: u8) -> bool {
        self.offset <= interrupt_id && interrupt_id < self.offset.wrapping_add(8)
    }

    unsafe fn end_of_interrupt(&mut self) {
        self.command.write(CMD_END_OF_INTERRUPT);
    }

    unsafe fn read_mask(&mut self) -> u8 {
        self.data.read()
    }

    unsafe fn write_mask(&mut self, mask: u8) {
        self.data.write(mask)
    }
}

pub struct ChainedPics {
    pics: [Pic; 2],
}

impl ChainedPics {
    /// # Safety
    /// The offsets must not overlap processor exceptions or each other.
    pub const unsafe fn new(offset1: u8, offset2: u8) -> Self {
        Self {
            pics: [
                Pic { offset: offset1, command: Port::new(MASTER_COMMAND), data: Port::new(MASTER_DATA) },
                Pic { offset: offset2, command: Port::new(SLAVE_COMMAND), data: Port::new(SLAVE_DATA) },
            ],
        }
    }

    /// Run the ICW sequence on both chips, keeping their masks.
    ///
    /// # Safety
    /// Talks to the hardware; interrupts should be masked.
    pub unsafe fn initialize(&mut self) {
        let mut wait_port: Port<u8> = Port::new(WAIT_PORT);
        let mut wait = || wait_port.write(0);

        let saved = self.read_masks();

        for pic in self.pics.iter_mut() {
            pic.command.write(CMD_INIT);
            wait();
        }
        let words = [init_words(self.pics[0].offset, 4), init_words(self.pics[1].offset, 2)];
        for step in 0..3 {
            for (pic, words) in self.pics.iter_mut().zip(words.iter()) {
                pic.data.write(words[step]);
                wait();
            }
        }

        self.write_masks(saved[0], saved[1]);
    }

    /// # Safety
    /// Talks to the hardware.
    pub unsafe fn read_masks(&mut self) -> [u8; 2] {
        [self.pics[0].read_mask(), self.pics[1].read_mask()]
    }

    /// # Safety
    /// Unmasking a line with no handler makes its vector fire.
    pub unsafe fn write_masks(&mut self, mask1: u8, mask2: u8) {
        self.pics[0].write_mask(mask1);
        self.pics[1].write_mask(mask2);
    }

    pub fn handles_interrupt(&self, interrupt_id: u8) -> bool {
        self.pics.iter().any(|p| p.handles_interrupt(interrupt_id))
    }

    /// Which chips need an EOI for `interrupt_id`: the slave's lines are
    /// cascaded through the master, so both hear about them.
    pub fn eoi_targets(&self, interrupt_id: u8) -> [bool; 2] {
        if self.pics[1].handles_interrupt(interrupt_id) {
            [true, true]
        } else {
            [self.pics[0].handles_interrupt(interrupt_id), false]
        }
    }

    /// # Safety
    /// `interrupt_id` must be the interrupt being serviced.
    pub unsafe fn notify_end_of_interrupt(&mut self, interrupt_id: u8) {
        let [master, slave] = self.eoi_targets(interrupt_id);
        if slave {
            self.pics[1].end_of_interrupt();
        }
        if master {
            self.pics[0].end_of_interrupt();
        }
    }
}
