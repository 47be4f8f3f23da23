use crate::registers::Registers;
use std::fmt::Debug;

/// What the core should do after the host had a look at a trap instruction.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum HostAction {
    /// Take the exception as if no host were attached.
    #[default]
    Raise,
    /// The host serviced the request, retire the instruction without an exception.
    Continue,
    /// The host serviced the request and the core must stop.
    Halt,
}

/// Host side handlers for the `syscall` and `debug` instructions.
///
/// They run before the exception would be raised, and get a read-only view of the registers.
pub trait HostHooks: Debug {
    fn syscall(&mut self, immediate: u32, registers: &Registers) -> HostAction {
        let _ = (immediate, registers);
        HostAction::Raise
    }

    fn debug(&mut self, immediate: u32, registers: &Registers) -> HostAction {
        let _ = (immediate, registers);
        HostAction::Raise
    }
}
