use super::Core;
use crate::bus::Bus;
use crate::PrivilegeLevel;
use log::debug;
use std::fmt;

/// Cause codes recorded in the cause register on exception entry.
pub mod cause {
    /// Group of the causes raised by the CPU itself.
    pub const CPU: u32 = 0x0040_0000;
    /// Group of the causes raised by the MMU.
    pub const MMU: u32 = 0x0080_0000;

    pub const SYSCALL: u32 = CPU;
    pub const DEBUG: u32 = CPU | 1;
    pub const SOFTWARE_EXCEPTION: u32 = CPU | 2;
    pub const ILLEGAL_INSTRUCTION: u32 = CPU | 3;
    pub const INVALID_COP_ACCESS: u32 = CPU | 4;
    pub const TRAP_LEVEL_0: u32 = CPU | 5;
    pub const INVALID_TRAP_LEVEL: u32 = CPU | 9;
    pub const ARITHMETIC: u32 = CPU | 10;

    pub const NO_MAPPING: u32 = MMU;
    pub const READ_PROTECTION: u32 = MMU | 1;
    pub const WRITE_PROTECTION: u32 = MMU | 2;
    pub const EXEC_PROTECTION: u32 = MMU | 3;
    pub const FETCH_MISALIGNED: u32 = MMU | 4;
    pub const DATA_MISALIGNED: u32 = MMU | 5;

    /// Not an exception: the value left in the cause register by a reset.
    pub const RESET: u32 = 0xFFFF_FFFF;

    /// Shift applied to the 24-bit immediate of traps that carry one.
    pub const IMMEDIATE_SHIFT: u32 = 8;
}

/// Every fault and trap the core can take.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Exception {
    /// `syscall` with its 24-bit immediate.
    Syscall(u32),
    /// `debug` with its 24-bit immediate.
    Debug(u32),
    /// `excep` with its 24-bit immediate.
    SoftwareException(u32),
    /// Reserved instruction group or sub-operation, or a trap-to-level instruction.
    IllegalInstruction,
    /// Coprocessor exchange with an unresolvable coprocessor register.
    InvalidCopAccess,
    /// Trap into the given privilege level. No instruction raises it yet.
    TrapLevel(PrivilegeLevel),
    InvalidTrapLevel,
    /// Division or modulo by zero.
    Arithmetic,
    /// No entry of the active map contains the virtual address.
    NoMapping,
    ReadProtection,
    WriteProtection,
    ExecProtection,
    /// Instruction fetch from an address that isn't a multiple of 4.
    FetchMisaligned,
    /// Misaligned data access while the MMU's misalignment policy is set.
    DataMisaligned,
}

impl Exception {
    /// Returns the value recorded in the cause register for this exception.
    pub fn code(&self) -> u32 {
        match *self {
            Self::Syscall(immediate) => cause::SYSCALL | pack(immediate),
            Self::Debug(immediate) => cause::DEBUG | pack(immediate),
            Self::SoftwareException(immediate) => cause::SOFTWARE_EXCEPTION | pack(immediate),
            Self::IllegalInstruction => cause::ILLEGAL_INSTRUCTION,
            Self::InvalidCopAccess => cause::INVALID_COP_ACCESS,
            Self::TrapLevel(level) => cause::TRAP_LEVEL_0 + level.index() as u32,
            Self::InvalidTrapLevel => cause::INVALID_TRAP_LEVEL,
            Self::Arithmetic => cause::ARITHMETIC,
            Self::NoMapping => cause::NO_MAPPING,
            Self::ReadProtection => cause::READ_PROTECTION,
            Self::WriteProtection => cause::WRITE_PROTECTION,
            Self::ExecProtection => cause::EXEC_PROTECTION,
            Self::FetchMisaligned => cause::FETCH_MISALIGNED,
            Self::DataMisaligned => cause::DATA_MISALIGNED,
        }
    }
}

fn pack(immediate: u32) -> u32 {
    (immediate & 0xFF_FFFF) << cause::IMMEDIATE_SHIFT
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syscall(immediate) => write!(f, "syscall {immediate:#x}"),
            Self::Debug(immediate) => write!(f, "debug {immediate:#x}"),
            Self::SoftwareException(immediate) => write!(f, "software exception {immediate:#x}"),
            Self::IllegalInstruction => f.write_str("illegal instruction"),
            Self::InvalidCopAccess => f.write_str("invalid coprocessor access"),
            Self::TrapLevel(level) => write!(f, "trap to {level}"),
            Self::InvalidTrapLevel => f.write_str("invalid trap level"),
            Self::Arithmetic => f.write_str("arithmetic fault"),
            Self::NoMapping => f.write_str("no mapping"),
            Self::ReadProtection => f.write_str("read protection fault"),
            Self::WriteProtection => f.write_str("write protection fault"),
            Self::ExecProtection => f.write_str("execute protection fault"),
            Self::FetchMisaligned => f.write_str("misaligned fetch"),
            Self::DataMisaligned => f.write_str("misaligned data access"),
        }
    }
}

/// The exception registers of COP0.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Trap {
    cause: u32,
    handler: u32,
    exception_pc: u32,
}

impl Trap {
    pub fn new() -> Self {
        Self::default()
    }

    /// State after a reset: only the cause differs from all-zero.
    pub fn reset() -> Self {
        Self {
            cause: cause::RESET,
            ..Self::default()
        }
    }

    pub fn read_cause(&self) -> u32 {
        self.cause
    }

    pub fn write_cause(&mut self, value: u32) {
        self.cause = value;
    }

    /// Address the program counter is set to when an exception is taken.
    pub fn read_handler(&self) -> u32 {
        self.handler
    }

    pub fn write_handler(&mut self, value: u32) {
        self.handler = value;
    }

    /// Program counter at the time the last exception was taken.
    pub fn read_exception_pc(&self) -> u32 {
        self.exception_pc
    }

    pub fn write_exception_pc(&mut self, value: u32) {
        self.exception_pc = value;
    }
}

impl<B: Bus> Core<B> {
    /// Takes `exception`: records its cause and the current PC, jumps to the handler, moves one
    /// privilege level up, and flushes the pipeline if flow transfers flush it.
    pub fn raise_exception(&mut self, exception: Exception) {
        let pc = self.registers.pc();
        debug!(
            "taking exception at {pc:#010x} ({}): {exception} (cause {:#010x})",
            self.privilege_level,
            exception.code()
        );
        self.trap.write_cause(exception.code());
        self.trap.write_exception_pc(pc);
        *self.registers.pc_mut() = self.trap.read_handler();
        self.set_privilege_level(self.privilege_level.raised());
        self.flush_on_flow_transfer();
    }
}
