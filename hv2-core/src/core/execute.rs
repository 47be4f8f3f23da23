use super::host::HostAction;
use super::trap::Exception;
use super::{Core, ExecutionResult};
use crate::alu::{AluOp, Condition};
use crate::bus::{AccessType, Bus};
use crate::instruction::{Address, Offset};
use crate::registers::Specifier;
use crate::{AccessSize, PrivilegeLevel};
use log::{debug, trace};

#[derive(Debug)]
pub(super) struct Executor<'c, B: Bus> {
    pub core: &'c mut Core<B>,
}

impl<'c, B: Bus> Executor<'c, B> {
    /// Executes an ALU instruction in register mode: `dest = op(src0, src1)`.
    pub fn alu_register(
        &mut self,
        op: AluOp,
        dest: Specifier,
        src0: Specifier,
        src1: Specifier,
    ) -> ExecutionResult {
        let (s0, s1) = (self.reg(src0), self.reg(src1));
        self.alu_op(op, dest, s0, s1)
    }

    /// Executes an ALU instruction in immediate mode: `dest = op(dest, immediate)`.
    pub fn alu_immediate(&mut self, op: AluOp, dest: Specifier, immediate: u32) -> ExecutionResult {
        let s0 = self.reg(dest);
        self.alu_op(op, dest, s0, immediate)
    }

    /// Executes a PC-relative branch. `offset` is relative to the program counter at execution
    /// time, which is three words past the branch itself.
    pub fn branch(
        &mut self,
        condition: Condition,
        link: bool,
        left: Specifier,
        right: Specifier,
        offset: i32,
    ) -> ExecutionResult {
        self.cond_branch(condition, link, left, right, |pc| {
            pc.wrapping_add_signed(offset)
        })
    }

    /// Executes a branch to the address held in `target`, or by the amount held in `target` if
    /// `relative` is set.
    pub fn branch_register(
        &mut self,
        condition: Condition,
        link: bool,
        relative: bool,
        left: Specifier,
        right: Specifier,
        target: Specifier,
    ) -> ExecutionResult {
        let target = self.reg(target);
        self.cond_branch(condition, link, left, right, |pc| {
            if relative {
                pc.wrapping_add(target)
            } else {
                target
            }
        })
    }

    /// Executes an `mtcr` instruction.
    pub fn move_to_cop(&mut self, src: Specifier, cop: u8, register: u16) -> ExecutionResult {
        let value = self.reg(src);
        self.core
            .write_cop(cop, register, value)
            .map_err(|_| Exception::InvalidCopAccess)
    }

    /// Executes an `mfcr` instruction.
    pub fn move_from_cop(&mut self, dest: Specifier, cop: u8, register: u16) -> ExecutionResult {
        let value = self
            .core
            .read_cop(cop, register)
            .map_err(|_| Exception::InvalidCopAccess)?;
        self.write_reg(dest, value);
        Ok(())
    }

    /// Executes a `syscall` instruction, giving the host a chance to service it first.
    pub fn syscall(&mut self, immediate: u32) -> ExecutionResult {
        let action = match self.core.hooks.as_mut() {
            Some(hooks) => hooks.syscall(immediate, &self.core.registers),
            None => HostAction::Raise,
        };
        self.host_action(action, Exception::Syscall(immediate))
    }

    /// Executes a `debug` instruction, giving the host a chance to service it first.
    pub fn debug(&mut self, immediate: u32) -> ExecutionResult {
        let action = match self.core.hooks.as_mut() {
            Some(hooks) => hooks.debug(immediate, &self.core.registers),
            None => HostAction::Raise,
        };
        self.host_action(action, Exception::Debug(immediate))
    }

    pub fn software_exception(&mut self, immediate: u32) -> ExecutionResult {
        Err(Exception::SoftwareException(immediate))
    }

    /// Trap-to-level instructions are reserved.
    pub fn trap_level(&mut self, level: PrivilegeLevel) -> ExecutionResult {
        debug!("reserved trap to {level}");
        Err(Exception::IllegalInstruction)
    }

    pub fn load(&mut self, size: AccessSize, dest: Specifier, address: Address) -> ExecutionResult {
        let address = self.effective_address(address);
        let value = self.core.read_virtual(address, size)?;
        self.write_reg(dest, value);
        Ok(())
    }

    pub fn store(&mut self, size: AccessSize, src: Specifier, address: Address) -> ExecutionResult {
        let address = self.effective_address(address);
        let value = self.reg(src);
        self.core.write_virtual(address, value, size)
    }

    /// Executes a `lea` instruction: the address is computed but never accessed.
    pub fn lea(&mut self, dest: Specifier, address: Address) -> ExecutionResult {
        let address = self.effective_address(address);
        self.write_reg(dest, address);
        Ok(())
    }

    pub fn load_immediate(&mut self, dest: Specifier, immediate: u32, shift: u32) -> ExecutionResult {
        self.write_reg(dest, immediate.wrapping_shl(shift));
        Ok(())
    }

    /// Executes a set-if instruction: `dest = condition(src, immediate) ? 1 : 0`.
    pub fn set_if(
        &mut self,
        condition: Condition,
        dest: Specifier,
        src: Specifier,
        immediate: u32,
    ) -> ExecutionResult {
        let result = condition.test(self.reg(src), immediate);
        self.write_reg(dest, result as u32);
        Ok(())
    }

    /// Coprocessor instructions are accepted and ignored.
    pub fn coprocessor(&mut self, raw: u32) -> ExecutionResult {
        trace!("ignoring coprocessor instruction {raw:#010x}");
        Ok(())
    }

    fn reg(&self, specifier: Specifier) -> u32 {
        self.core.registers.get(specifier)
    }

    /// Writes a destination register. A write to the program counter is a flow transfer.
    fn write_reg(&mut self, dest: Specifier, value: u32) {
        self.core.registers.set(dest, value);
        if dest == Specifier::PC {
            self.core.flush_on_flow_transfer();
        }
    }

    fn alu_op(&mut self, op: AluOp, dest: Specifier, s0: u32, s1: u32) -> ExecutionResult {
        let result = op
            .apply(self.reg(dest), s0, s1)
            .map_err(|_| Exception::Arithmetic)?;
        self.write_reg(dest, result);
        Ok(())
    }

    fn cond_branch<F>(
        &mut self,
        condition: Condition,
        link: bool,
        left: Specifier,
        right: Specifier,
        compute_target: F,
    ) -> ExecutionResult
    where
        F: FnOnce(u32) -> u32,
    {
        if !condition.test(self.reg(left), self.reg(right)) {
            return Ok(());
        }
        let pc = self.core.registers.pc();
        if link {
            self.core.registers.set(Specifier::LR, pc);
        }
        *self.core.registers.pc_mut() = compute_target(pc);
        self.core.flush_on_flow_transfer();
        Ok(())
    }

    fn host_action(&mut self, action: HostAction, exception: Exception) -> ExecutionResult {
        match action {
            HostAction::Raise => Err(exception),
            HostAction::Continue => Ok(()),
            HostAction::Halt => {
                self.core.halt();
                Ok(())
            }
        }
    }

    /// Computes `base ± offset` with wrapping arithmetic.
    fn effective_address(&self, address: Address) -> u32 {
        let base = self.reg(address.base);
        let offset = match address.offset {
            Offset::Scaled { index, scale } => self.reg(index).wrapping_mul(scale),
            Offset::Shifted { index, shift } => self.reg(index).wrapping_shl(shift),
            Offset::Fixed(immediate) => immediate,
        };
        if address.subtract {
            base.wrapping_sub(offset)
        } else {
            base.wrapping_add(offset)
        }
    }
}

impl<B: Bus> Core<B> {
    /// Translates and reads, propagating MMU faults.
    pub(super) fn read_virtual(&mut self, address: u32, size: AccessSize) -> Result<u32, Exception> {
        let physical = self.mmu.translate(address, size, AccessType::Read)?;
        Ok(self.bus.read(physical, size))
    }

    /// Translates and writes, propagating MMU faults.
    pub(super) fn write_virtual(
        &mut self,
        address: u32,
        value: u32,
        size: AccessSize,
    ) -> Result<(), Exception> {
        let physical = self.mmu.translate(address, size, AccessType::Write)?;
        self.bus.write(physical, value, size);
        Ok(())
    }

    /// Translates and fetches an instruction word.
    pub(super) fn fetch(&mut self, address: u32) -> Result<u32, Exception> {
        let physical = self
            .mmu
            .translate(address, AccessSize::Exec, AccessType::Execute)?;
        Ok(self.bus.read(physical, AccessSize::Exec))
    }
}
