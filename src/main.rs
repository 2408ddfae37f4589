#![no_std]
#![no_main]

extern crate rlibc;

use core::arch::{asm, global_asm};
use core::fmt::{self, Write};
use core::panic::PanicInfo;
use core::sync::atomic::{AtomicUsize, Ordering};

use log::info;
use trapgate::console::{self, Console};
use trapgate::core::cpu::{hlt, interrupts};
use trapgate::core::interrupts::vectors::{SWITCH_TO_KERNEL, SWITCH_TO_USER, VECTOR_COUNT};
use trapgate::core::kernel::init_kernel;
use trapgate::monitor::{kmonitor, Debugger};
use trapgate::{logger, println};

global_asm!(include_str!(concat!(env!("OUT_DIR"), "/vectors.S")), options(att_syntax));
global_asm!(include_str!("trapentry.S"), options(att_syntax));

// The boot stack lives in .data so clearing .bss cannot wipe it from under
// kern_init. Traps from ring 3 land on their own stack named by the TSS.
global_asm!(
    r#"
.section .text.kern_entry, "ax"
.globl kern_entry
kern_entry:
    movl $bootstacktop, %esp
    xorl %ebp, %ebp
    call kern_init
1:  hlt
    jmp 1b

.data
.balign 4096
bootstack:
    .space 8192
.globl bootstacktop
bootstacktop:

.bss
.balign 16
trapstack:
    .space 4096
.globl trapstacktop
trapstacktop:
"#,
    options(att_syntax)
);

extern "C" {
    static __vectors: [u32; VECTOR_COUNT];
    static kern_entry: u8;
    static etext: u8;
    static edata: u8;
    static mut end: u8;
    static trapstacktop: u8;
}

const STACKFRAME_DEPTH: usize = 20;

fn symbol(sym: &u8) -> u32 {
    sym as *const u8 as u32
}

#[no_mangle]
extern "C" fn kern_init() -> ! {
    unsafe {
        let start = core::ptr::addr_of!(edata) as *mut u8;
        let stop = core::ptr::addr_of_mut!(end);
        core::ptr::write_bytes(start, 0, stop as usize - start as usize);
    }

    console::init();
    if let Err(e) = logger::init() {
        println!("logger: {}", e);
    }

    println!("(THU.CST) os is loading ...\n");
    let _ = Image.print_kerninfo(&mut Console);

    let trap_stack = unsafe { symbol(&trapstacktop) };
    if let Err(e) = init_kernel(trap_stack, unsafe { &__vectors }) {
        panic!("Kernel initialization failed: {}", e);
    }

    switch_test();

    loop {
        hlt();
    }
}

fn print_cur_status() {
    static ROUND: AtomicUsize = AtomicUsize::new(0);

    let (cs, ds, es, ss): (u16, u16, u16, u16);
    unsafe {
        asm!(
            "mov {0:x}, cs",
            "mov {1:x}, ds",
            "mov {2:x}, es",
            "mov {3:x}, ss",
            out(reg) cs,
            out(reg) ds,
            out(reg) es,
            out(reg) ss,
            options(nomem, nostack, preserves_flags)
        );
    }
    let round = ROUND.fetch_add(1, Ordering::Relaxed);
    println!("{}: @ring {}", round, cs & 3);
    println!("{}:  cs = {:x}", round, cs);
    println!("{}:  ds = {:x}", round, ds);
    println!("{}:  es = {:x}", round, es);
    println!("{}:  ss = {:x}", round, ss);
}

/// Drop to ring 3 and come back, printing the segment state each time.
fn switch_test() {
    print_cur_status();
    info!("+++ switch to  user  mode +++");
    // The 8 reserved bytes become the forged frame's esp/ss.
    unsafe {
        asm!(
            "mov {saved}, esp",
            "sub esp, 8",
            "int {vector}",
            "mov esp, {saved}",
            saved = out(reg) _,
            vector = const SWITCH_TO_USER,
        );
    }
    print_cur_status();
    info!("+++ switch to kernel mode +++");
    unsafe {
        asm!(
            "mov {saved}, esp",
            "int {vector}",
            "mov esp, {saved}",
            saved = out(reg) _,
            vector = const SWITCH_TO_KERNEL,
        );
    }
    print_cur_status();
}

/// The running kernel image.
struct Image;

impl Debugger for Image {
    fn print_kerninfo(&mut self, out: &mut dyn Write) -> fmt::Result {
        let (entry, text, data, image_end) = unsafe {
            (
                symbol(&kern_entry),
                symbol(&etext),
                symbol(&edata),
                core::ptr::addr_of!(end) as u32,
            )
        };
        writeln!(out, "Special kernel symbols:")?;
        writeln!(out, "  entry  0x{:08x} (phys)", entry)?;
        writeln!(out, "  etext  0x{:08x} (phys)", text)?;
        writeln!(out, "  edata  0x{:08x} (phys)", data)?;
        writeln!(out, "  end    0x{:08x} (phys)", image_end)?;
        writeln!(
            out,
            "Kernel executable memory footprint: {}KB",
            (image_end - entry + 1023) / 1024
        )
    }

    fn print_stackframe(&mut self, out: &mut dyn Write) -> fmt::Result {
        let mut ebp: u32;
        unsafe { asm!("mov {}, ebp", out(reg) ebp, options(nomem, nostack, preserves_flags)) };

        for _ in 0..STACKFRAME_DEPTH {
            if ebp == 0 {
                break;
            }
            let frame = ebp as *const u32;
            let (caller, eip, args) = unsafe {
                (
                    frame.read(),
                    frame.add(1).read(),
                    [frame.add(2).read(), frame.add(3).read(), frame.add(4).read(), frame.add(5).read()],
                )
            };
            writeln!(
                out,
                "ebp:0x{:08x} eip:0x{:08x} args:0x{:08x} 0x{:08x} 0x{:08x} 0x{:08x}",
                ebp, eip, args[0], args[1], args[2], args[3]
            )?;
            ebp = caller;
        }
        Ok(())
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    interrupts::disable();
    println!("kernel {}", info);

    kmonitor(None, &mut Console, &mut Console, &mut Image);

    loop {
        hlt();
    }
}
