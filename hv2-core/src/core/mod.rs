//! Provides a simulatable HV2 core implementation.

mod control;
mod cop;
mod execute;
mod host;
mod mmu;
mod pipeline;
mod trap;

pub use control::Control;
pub use cop::{CopRegister, InvalidCopRegister};
pub use host::{HostAction, HostHooks};
pub use mmu::{
    attribute, EntryField, MapFullError, MappingEntry, MappingTable, Mmu, MmuControl, MAP_COUNT,
    MAP_ENTRIES,
};
pub use pipeline::Pipeline;
pub use trap::{cause, Exception, Trap};

use crate::bus::Bus;
use crate::instruction::Instruction;
use crate::registers::Registers;
use crate::{AccessSize, PrivilegeLevel};
use execute::Executor;
use log::{debug, trace};

/// Outcome of executing a single instruction. Exceptions are taken by the caller.
pub type ExecutionResult = Result<(), Exception>;

#[derive(Debug, Default, Clone)]
pub struct Config {
    /// Address to which the core's PC register is reset.
    pub reset_vector: u32,
}

/// An HV2 core connected to a bus.
///
/// Every call to [`step`](Self::step) is one cycle: a word is fetched into the pipeline through
/// the MMU, and the oldest word in the pipeline is executed. Faults never escape a step, they are
/// taken in-core by jumping to the exception handler.
#[derive(Debug)]
pub struct Core<B: Bus> {
    config: Config,
    registers: Registers,
    pipeline: Pipeline,
    privilege_level: PrivilegeLevel,
    control: Control,
    trap: Trap,
    mmu: Mmu,
    bus: B,
    hooks: Option<Box<dyn HostHooks>>,
    halted: bool,
    cycles: u64,
}

impl<B: Bus> Core<B> {
    /// Creates a core in its reset state.
    pub fn new(bus: B, config: Config) -> Self {
        let mut core = Self {
            config,
            registers: Registers::new(),
            pipeline: Pipeline::new(),
            privilege_level: PrivilegeLevel::Pl0,
            control: Control::new(),
            trap: Trap::reset(),
            mmu: Mmu::new(),
            bus,
            hooks: None,
            halted: false,
            cycles: 0,
        };
        core.reset();
        core
    }

    /// Installs handlers for the `syscall` and `debug` instructions.
    pub fn set_host_hooks(&mut self, hooks: Box<dyn HostHooks>) {
        self.hooks = Some(hooks);
    }

    /// Force this core to its reset state.
    ///
    /// The bus and its devices are left untouched.
    pub fn reset(&mut self) {
        self.registers = Registers::new();
        *self.registers.pc_mut() = self.config.reset_vector;
        self.pipeline.flush();
        self.privilege_level = PrivilegeLevel::Pl0;
        self.control = Control::new();
        self.trap = Trap::reset();
        self.mmu = Mmu::new();
        self.halted = false;
        self.cycles = 0;
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn pc(&self) -> u32 {
        self.registers.pc()
    }

    /// Sets the program counter. This is a host operation, the pipeline is left as is.
    pub fn set_pc(&mut self, value: u32) {
        *self.registers.pc_mut() = value;
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn privilege_level(&self) -> PrivilegeLevel {
        self.privilege_level
    }

    /// Moves the core to `level`, applying the MMU's privilege transition policies.
    ///
    /// Nothing happens if the core already is at `level`.
    pub fn set_privilege_level(&mut self, level: PrivilegeLevel) {
        if level == self.privilege_level {
            return;
        }
        debug!("privilege level {} -> {level}", self.privilege_level);
        self.privilege_level = level;

        let control = self.mmu.control_mut();
        if control.remap_on_transition() {
            control.set_active_map(level.index());
        }
        match level {
            PrivilegeLevel::Pl0 if control.disable_on_pl0() => control.set_enabled(false),
            PrivilegeLevel::Pl1 if control.enable_on_pl1() => control.set_enabled(true),
            _ => {}
        }
    }

    pub fn control(&self) -> &Control {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut Control {
        &mut self.control
    }

    pub fn trap(&self) -> &Trap {
        &self.trap
    }

    pub fn trap_mut(&mut self) -> &mut Trap {
        &mut self.trap
    }

    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    pub fn mmu_mut(&mut self) -> &mut Mmu {
        &mut self.mmu
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Reads a coprocessor register. Map words are read from the active mapping table.
    pub fn read_cop(&self, cop: u8, register: u16) -> Result<u32, InvalidCopRegister> {
        Ok(match CopRegister::resolve(cop, register)? {
            CopRegister::Control0 => self.control.read_cr0(),
            CopRegister::Control1 => self.control.read_cr1(),
            CopRegister::Cause => self.trap.read_cause(),
            CopRegister::Handler => self.trap.read_handler(),
            CopRegister::ExceptionPc => self.trap.read_exception_pc(),
            CopRegister::MmuControl => self.mmu.control().read(),
            CopRegister::MapWord { entry, field } => {
                self.mmu.active_map().entries()[entry].word(field)
            }
        })
    }

    /// Writes a coprocessor register. Map words are written to the active mapping table.
    pub fn write_cop(
        &mut self,
        cop: u8,
        register: u16,
        value: u32,
    ) -> Result<(), InvalidCopRegister> {
        match CopRegister::resolve(cop, register)? {
            CopRegister::Control0 => self.control.write_cr0(value),
            CopRegister::Control1 => self.control.write_cr1(value),
            CopRegister::Cause => self.trap.write_cause(value),
            CopRegister::Handler => self.trap.write_handler(value),
            CopRegister::ExceptionPc => self.trap.write_exception_pc(value),
            CopRegister::MmuControl => self.mmu.control_mut().write(value),
            CopRegister::MapWord { entry, field } => {
                self.mmu.active_map_mut().entries_mut()[entry].set_word(field, value)
            }
        }
        Ok(())
    }

    /// Advances the core by one cycle.
    ///
    /// Does nothing once the core is [halted](Self::is_halted).
    pub fn step(&mut self) {
        if self.halted {
            return;
        }

        let pc = self.registers.pc();
        match self.fetch(pc) {
            Ok(raw_instruction) => {
                self.pipeline.shift_in(raw_instruction);
                *self.registers.pc_mut() = pc.wrapping_add(AccessSize::Exec.bytes());
            }
            Err(exception) => {
                self.pipeline.shift_in(0);
                self.raise_exception(exception);
            }
        }

        let raw_instruction = self.pipeline.executing();
        if let Err(exception) = self.execute_raw_instruction(raw_instruction) {
            self.raise_exception(exception);
        }

        self.registers.clear_zero();
        self.cycles += 1;
    }

    /// Returns `true` once a host hook stopped the core.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn halt(&mut self) {
        debug!("core halted after {} cycles", self.cycles);
        self.halted = true;
    }

    /// Number of cycles stepped since the last reset.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Reads from virtual memory as the executing program would. A fault is taken, and reads as
    /// `0`.
    pub fn mmu_read(&mut self, address: u32, size: AccessSize) -> u32 {
        self.read_virtual(address, size).unwrap_or_else(|exception| {
            self.raise_exception(exception);
            0
        })
    }

    /// Writes to virtual memory as the executing program would. A fault is taken, and the write
    /// is dropped.
    pub fn mmu_write(&mut self, address: u32, value: u32, size: AccessSize) {
        if let Err(exception) = self.write_virtual(address, value, size) {
            self.raise_exception(exception);
        }
    }

    /// Execute a single instruction on this core.
    ///
    /// This only applies the instruction's own effects, the pipeline isn't shifted and `r0` isn't
    /// cleared. Reserved encodings yield [`Exception::IllegalInstruction`].
    pub fn execute_raw_instruction(&mut self, raw_instruction: u32) -> ExecutionResult {
        let instruction = match Instruction::decode(raw_instruction) {
            Ok(instruction) => instruction,
            Err(err) => {
                debug!("cannot decode {raw_instruction:#010x}: {err}");
                return Err(Exception::IllegalInstruction);
            }
        };
        trace!(
            "{:#010x}: {instruction}",
            self.registers.pc().wrapping_sub(3 * AccessSize::Exec.bytes())
        );
        self.execute_instruction(instruction)
    }

    pub fn execute_instruction(&mut self, instruction: Instruction) -> ExecutionResult {
        let mut executor = Executor { core: self };
        match instruction {
            Instruction::AluRegister {
                op,
                dest,
                src0,
                src1,
            } => executor.alu_register(op, dest, src0, src1),
            Instruction::AluImmediate {
                op,
                dest,
                immediate,
            } => executor.alu_immediate(op, dest, immediate),
            Instruction::Branch {
                condition,
                link,
                left,
                right,
                offset,
            } => executor.branch(condition, link, left, right, offset),
            Instruction::BranchRegister {
                condition,
                link,
                relative,
                left,
                right,
                target,
            } => executor.branch_register(condition, link, relative, left, right, target),
            Instruction::MoveToCop { src, cop, register } => {
                executor.move_to_cop(src, cop, register)
            }
            Instruction::MoveFromCop {
                dest,
                cop,
                register,
            } => executor.move_from_cop(dest, cop, register),
            Instruction::Syscall { immediate } => executor.syscall(immediate),
            Instruction::TrapLevel { level } => executor.trap_level(level),
            Instruction::Debug { immediate } => executor.debug(immediate),
            Instruction::SoftwareException { immediate } => executor.software_exception(immediate),
            Instruction::Load {
                size,
                dest,
                address,
            } => executor.load(size, dest, address),
            Instruction::Store { size, src, address } => executor.store(size, src, address),
            Instruction::Lea { dest, address } => executor.lea(dest, address),
            Instruction::LoadImmediate {
                dest,
                immediate,
                shift,
            } => executor.load_immediate(dest, immediate, shift),
            Instruction::SetIf {
                condition,
                dest,
                src,
                immediate,
            } => executor.set_if(condition, dest, src, immediate),
            Instruction::Coprocessor { raw } => executor.coprocessor(raw),
        }
    }

    /// Flushes the pipeline if control word 0 asks for flushes on flow transfers.
    fn flush_on_flow_transfer(&mut self) {
        if self.control.flush_on_flow_transfer() {
            trace!("flushing pipeline");
            self.pipeline.flush();
        }
    }
}

#[cfg(test)]
mod tests;
