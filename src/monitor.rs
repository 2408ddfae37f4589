//! # Kernel Monitor
//!
//! A minimal line-oriented debug shell, entered on panic.
//!
//! ## Available Commands
//!
//! - `help`: list commands
//! - `kerninfo`: kernel image layout and footprint
//! - `backtrace`: walk the saved frame-pointer chain
//!
//! ## Architecture
//!
//! Commands return `CommandResult`:
//! - `Continue`: prompt again
//! - `Exit`: leave the monitor (handled by caller)
//!
//! What `kerninfo` and `backtrace` print depends on the running image, so
//! they go through a [`Debugger`] supplied by the kernel binary.

use core::fmt::{self, Write};

use crate::core::interrupts::dump::format_trap_context;
use crate::core::interrupts::trapframe::TrapFrame;

/// Most words a command line may have, command name included.
pub const MAXARGS: usize = 16;
/// Line buffer size; one byte is kept free like a C string terminator.
pub const BUFSIZE: usize = 1024;

const PROMPT: &str = "K> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    KernInfo,
    Backtrace,
}

impl Command {
    pub const ALL: [Command; 3] = [Command::Help, Command::KernInfo, Command::Backtrace];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "help" => Some(Command::Help),
            "kerninfo" => Some(Command::KernInfo),
            "backtrace" => Some(Command::Backtrace),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::KernInfo => "kerninfo",
            Command::Backtrace => "backtrace",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Command::Help => "Display this list of commands.",
            Command::KernInfo => "Display information about the kernel.",
            Command::Backtrace => "Print backtrace of stack frame.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    Continue,
    Exit,
}

/// Image-specific inspection the monitor delegates to.
pub trait Debugger {
    fn print_kerninfo(&mut self, out: &mut dyn Write) -> fmt::Result;
    fn print_stackframe(&mut self, out: &mut dyn Write) -> fmt::Result;
}

/// Blocking character input. `None` means the source is closed.
pub trait CharSource {
    fn getc(&mut self) -> Option<u8>;
}

/// Parse and run one command line.
pub fn run_command<W, D>(line: &str, out: &mut W, debugger: &mut D) -> CommandResult
where
    W: Write,
    D: Debugger + ?Sized,
{
    let mut argv = [""; MAXARGS];
    let mut argc = 0;
    for word in line.split_ascii_whitespace() {
        if argc == MAXARGS - 1 {
            let _ = writeln!(out, "Too many arguments (max {}).", MAXARGS);
            break;
        }
        argv[argc] = word;
        argc += 1;
    }
    if argc == 0 {
        return CommandResult::Continue;
    }

    let Some(command) = Command::parse(argv[0]) else {
        let _ = writeln!(out, "Unknown command '{}'", argv[0]);
        return CommandResult::Continue;
    };

    let written = match command {
        Command::Help => Command::ALL
            .iter()
            .try_for_each(|cmd| writeln!(out, "{} - {}", cmd.name(), cmd.description())),
        Command::KernInfo => debugger.print_kerninfo(out),
        Command::Backtrace => debugger.print_stackframe(out),
    };
    match written {
        Ok(()) => CommandResult::Continue,
        // Nowhere left to talk to.
        Err(fmt::Error) => CommandResult::Exit,
    }
}

/// Read one line with echo and backspace editing. Returns `None` once the
/// input is closed.
pub fn readline<'b, S, W>(
    prompt: &str,
    input: &mut S,
    out: &mut W,
    buf: &'b mut [u8; BUFSIZE],
) -> Option<&'b str>
where
    S: CharSource + ?Sized,
    W: Write,
{
    let _ = out.write_str(prompt);
    let mut len = 0;
    loop {
        let c = input.getc()?;
        match c {
            b'\n' | b'\r' => {
                let _ = out.write_char('\n');
                break;
            }
            b'\x08' => {
                if len > 0 {
                    let _ = out.write_char('\x08');
                    len -= 1;
                }
            }
            b' '..=b'~' if len < BUFSIZE - 1 => {
                let _ = out.write_char(char::from(c));
                buf[len] = c;
                len += 1;
            }
            _ => {}
        }
    }
    // Only printable ASCII is ever stored.
    core::str::from_utf8(&buf[..len]).ok()
}

/// Greet, dump the trap that led here (if any) and serve commands until
/// one asks to exit or the input closes.
pub fn kmonitor<S, W, D>(trap: Option<(&TrapFrame, u32)>, input: &mut S, out: &mut W, debugger: &mut D)
where
    S: CharSource + ?Sized,
    W: Write,
    D: Debugger + ?Sized,
{
    let _ = writeln!(out, "Welcome to the kernel debug monitor!!");
    let _ = writeln!(out, "Type 'help' for a list of commands.");
    if let Some((frame, addr)) = trap {
        let _ = write!(out, "{}", format_trap_context(frame, addr));
    }

    let mut buf = [0u8; BUFSIZE];
    while let Some(line) = readline(PROMPT, input, out, &mut buf) {
        if run_command(line, out, debugger) == CommandResult::Exit {
            break;
        }
    }
}
