use hv2_core::core::{HostAction, HostHooks};
use hv2_core::registers::{Registers, Specifier};
use log::warn;
use std::fmt::Debug;
use std::io::Write;

/// `syscall` immediate that prints the low byte of `r1` as a character.
pub const PUTCHAR: u32 = 0xabcd00;

/// `debug` immediate that prints `a0` and stops the core.
pub const EXIT: u32 = 0xadc0de;

/// Services the console and exit conventions of programs built for the emulator.
///
/// Anything else is raised as an exception for the program's own handler.
#[derive(Debug)]
pub struct ConsoleHooks<W: Write + Debug> {
    out: W,
}

impl<W: Write + Debug> ConsoleHooks<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn emit(&mut self, bytes: &[u8]) {
        if let Err(err) = self.out.write_all(bytes).and_then(|()| self.out.flush()) {
            warn!("console output failed: {err}");
        }
    }
}

impl<W: Write + Debug> HostHooks for ConsoleHooks<W> {
    fn syscall(&mut self, immediate: u32, registers: &Registers) -> HostAction {
        if immediate != PUTCHAR {
            return HostAction::Raise;
        }
        let character = registers.get(Specifier::from_u5(1)) as u8;
        self.emit(&[character]);
        HostAction::Continue
    }

    fn debug(&mut self, immediate: u32, registers: &Registers) -> HostAction {
        if immediate != EXIT {
            return HostAction::Raise;
        }
        let line = format!("\na0={:08x}\n", registers.get(Specifier::A0));
        self.emit(line.as_bytes());
        HostAction::Halt
    }
}
