use super::*;
use crate::bus::{DeviceBus, MemoryDevice, OPEN_BUS};
use crate::registers::Specifier;
use crate::resources::ram::Ram;
use std::cell::RefCell;
use std::rc::Rc;

const BASE: u32 = 0x8000_0000;
const HANDLER: u32 = 0x8000_0800;

const AT: u32 = 1;
const A0: u32 = 2;
const X0: u32 = 3;
const X1: u32 = 4;
const PC: u32 = 31;

fn li(dest: u32, immediate: u32) -> u32 {
    (0b10001 << 27) | (dest << 22) | ((immediate & 0xFFFF) << 6)
}

fn alu_register(op: u32, dest: u32, src0: u32, src1: u32) -> u32 {
    (dest << 22) | (src0 << 17) | (src1 << 12) | (op << 2)
}

fn alu_immediate(op: u32, dest: u32, immediate: u32) -> u32 {
    (dest << 22) | ((immediate & 0xFFFF) << 6) | (op << 2) | 0b10
}

/// `b<condition>` with a 1-based condition code.
fn branch(code: u32, link: bool, left: u32, right: u32, offset: i32) -> u32 {
    let offset = offset as u32;
    let group = (code << 1) | (((offset >> 16) & 1) << 4);
    (group << 27) | (left << 22) | (right << 17) | ((offset & 0xFFFF) << 1) | link as u32
}

fn branch_register(code: u32, link: bool, relative: bool, left: u32, right: u32, target: u32) -> u32 {
    (0b01101 << 27)
        | (left << 22)
        | (right << 17)
        | (target << 12)
        | ((relative as u32) << 4)
        | (code << 1)
        | link as u32
}

fn mtcr(src: u32, cop: u32, register: u32) -> u32 {
    (0b01110 << 27) | (src << 22) | (register << 12) | (cop << 8)
}

fn mfcr(dest: u32, cop: u32, register: u32) -> u32 {
    mtcr(dest, cop, register) | 1
}

fn system(op: u32, immediate: u32) -> u32 {
    (0b01111 << 27) | (op << 24) | immediate
}

/// Load (`op = 0`) or store (`op = 1`) at `[base + offset]`.
fn memory(op: u32, size: u32, reg: u32, base: u32, offset: u32) -> u32 {
    (0b10000 << 27) | (reg << 22) | (base << 17) | (offset << 7) | (size << 5) | (op << 3) | 0b100
}

fn reg(index: u32) -> Specifier {
    Specifier::from_u5(index as u8)
}

/// Core with 64 KiB of RAM at `BASE`, holding `program`, and the exception handler at `HANDLER`.
fn core_with_program(program: &[u32]) -> (Core<DeviceBus>, Rc<RefCell<Ram>>) {
    let ram = Rc::new(RefCell::new(Ram::new(BASE, 0x1_0000).unwrap()));
    let bytes: Vec<u8> = program.iter().flat_map(|word| word.to_le_bytes()).collect();
    ram.borrow_mut().load(0, &bytes);
    let mut bus = DeviceBus::new();
    bus.attach_memory(ram.clone());
    let mut core = Core::new(bus, Config { reset_vector: BASE });
    core.trap_mut().write_handler(HANDLER);
    (core, ram)
}

/// Steps until the last instruction of a straight-line `program` retired.
fn run(core: &mut Core<DeviceBus>, program: &[u32]) {
    for _ in 0..program.len() + 2 {
        core.step();
    }
}

#[test]
fn test_reset_state() {
    let (mut core, _) = core_with_program(&[li(AT, 1)]);
    assert_eq!(BASE, core.pc());
    assert_eq!(cause::RESET, core.trap().read_cause());
    assert_eq!(PrivilegeLevel::Pl0, core.privilege_level());
    assert!(!core.mmu().control().enabled());
    assert_eq!(&[0; 3], core.pipeline().slots());

    run(&mut core, &[li(AT, 1)]);
    core.mmu_mut().control_mut().set_enabled(true);
    core.control_mut().write_cr0(0xF);
    core.reset();
    assert_eq!(0, core.registers().get(reg(AT)));
    assert_eq!(BASE, core.pc());
    assert_eq!(cause::RESET, core.trap().read_cause());
    assert!(!core.mmu().control().enabled());
    assert_eq!(0, core.control().read_cr0());
    assert_eq!(0, core.cycles());
}

#[test]
fn test_pipeline_latency() {
    let program = [li(AT, 7)];
    let (mut core, _) = core_with_program(&program);
    core.step();
    core.step();
    assert_eq!(0, core.registers().get(reg(AT)));
    assert_eq!(program[0], core.pipeline().slots()[1]);
    core.step();
    assert_eq!(7, core.registers().get(reg(AT)));
    assert_eq!(BASE + 12, core.pc());
    assert_eq!(3, core.cycles());
}

#[test]
fn test_alu_immediate_uses_destination() {
    let program = [
        li(AT, 5),
        alu_immediate(0, AT, 3),
        // Sign-extended -1
        alu_immediate(0, A0, 0xFFFF) | 1,
        alu_immediate(2, AT, 4),
    ];
    let (mut core, _) = core_with_program(&program);
    run(&mut core, &program);
    assert_eq!(32, core.registers().get(reg(AT)));
    assert_eq!(0xFFFF_FFFF, core.registers().get(reg(A0)));
}

#[test]
fn test_zero_register_reads_zero_after_retirement() {
    let program = [alu_immediate(0, 0, 0x1234), alu_register(0, AT, 0, 0)];
    let (mut core, _) = core_with_program(&program);
    run(&mut core, &program);
    assert_eq!(0, core.registers().get(Specifier::R0));
    assert_eq!(0, core.registers().get(reg(AT)));
}

#[test]
fn test_scenario_load_immediate_then_add() {
    let program = [li(AT, 2), alu_register(0, A0, 0, AT)];
    let (mut core, _) = core_with_program(&program);
    run(&mut core, &program);
    assert_eq!(2, core.registers().get(reg(A0)));
}

#[test]
fn test_untaken_branch_has_no_effect() {
    let program = [
        li(AT, 1),
        // beq at, r0
        branch(1, true, AT, 0, 0x100),
        li(A0, 3),
    ];
    let (mut core, _) = core_with_program(&program);
    core.control_mut().set_flush_on_flow_transfer(true);
    for _ in 0..3 {
        core.step();
    }
    let registers = core.registers().clone();
    core.step();
    // Only the fetch moved the pipeline and program counter
    assert_eq!(&[0, program[2], program[1]], core.pipeline().slots());
    assert_eq!(registers.pc() + 4, core.pc());
    assert_eq!(0, core.registers().get(Specifier::LR));
    core.step();
    assert_eq!(3, core.registers().get(reg(A0)));
}

#[test]
fn test_scenario_taken_branch_flushes_when_enabled() {
    let program = [
        li(AT, 8),
        mtcr(AT, 0, 0),
        // beq r0, r0, +0x20
        branch(1, false, 0, 0, 0x20),
        li(A0, 1),
        li(A0, 2),
    ];
    let (mut core, _) = core_with_program(&program);
    for _ in 0..4 {
        core.step();
    }
    assert!(core.control().flush_on_flow_transfer());
    core.step();
    assert_eq!(&[0; 3], core.pipeline().slots());
    // Relative to the program counter at execution time, three words past the branch
    assert_eq!(BASE + 8 + 12 + 0x20, core.pc());
    for _ in 0..3 {
        core.step();
    }
    assert_eq!(0, core.registers().get(reg(A0)));
}

#[test]
fn test_taken_branch_without_flush_executes_fetched_words() {
    let program = [
        branch(1, false, 0, 0, 0x20),
        li(A0, 1),
        li(X0, 2),
    ];
    let (mut core, _) = core_with_program(&program);
    for _ in 0..5 {
        core.step();
    }
    assert_eq!(BASE + 12 + 0x20 + 8, core.pc());
    assert_eq!(1, core.registers().get(reg(A0)));
    assert_eq!(2, core.registers().get(reg(X0)));
}

#[test]
fn test_branch_link_and_backwards_offset() {
    let program = [branch(1, true, 0, 0, -8)];
    let (mut core, _) = core_with_program(&program);
    run(&mut core, &program);
    assert_eq!(BASE + 12, core.registers().get(Specifier::LR));
    assert_eq!(BASE + 4, core.pc());
}

#[test]
fn test_branch_register() {
    let program = [
        li(X1, 0x100),
        // brlt.r r0, at, x1 (at = 0, not taken)
        branch_register(4, false, true, 0, AT, X1),
        li(AT, 1),
        // brlt.r r0, at, x1 with link
        branch_register(4, true, true, 0, AT, X1),
    ];
    let (mut core, _) = core_with_program(&program);
    run(&mut core, &program);
    assert_eq!(BASE + 24 + 0x100, core.pc());
    assert_eq!(BASE + 24, core.registers().get(Specifier::LR));

    let (mut core, _) = core_with_program(&[
        li(X1, 0x40) | (1 << 5) | 16,
        // breq r0, r0, x1 (absolute)
        branch_register(0, false, false, 0, 0, X1),
    ]);
    run(&mut core, &[0, 0]);
    assert_eq!(0x0040_0000, core.pc());
}

#[test]
fn test_scenario_unmapped_store_then_read() {
    let program = [
        li(AT, 0x1000),
        li(A0, 0x55),
        memory(1, 2, A0, AT, 0),
        memory(0, 2, X0, AT, 0),
    ];
    let (mut core, _) = core_with_program(&program);
    run(&mut core, &program);
    assert_eq!(OPEN_BUS, core.registers().get(reg(X0)));
    assert_eq!(OPEN_BUS, core.bus_mut().read(0x1000, AccessSize::Long));
    assert_eq!(cause::RESET, core.trap().read_cause());
}

#[test]
fn test_load_store_sizes() {
    let program = [
        li(AT, 0x8000) | (1 << 5) | 16,
        li(A0, 0xBEEF),
        memory(1, 2, A0, AT, 0x100),
        memory(1, 0, A0, AT, 0x104),
        memory(0, 1, X0, AT, 0x100),
        memory(0, 2, X1, AT, 0x104),
    ];
    let (mut core, ram) = core_with_program(&program);
    run(&mut core, &program);
    assert_eq!(0xBEEF, ram.borrow_mut().read(0x100, AccessSize::Long));
    assert_eq!(0xBEEF, core.registers().get(reg(X0)));
    assert_eq!(0xEF, core.registers().get(reg(X1)));
}

#[test]
fn test_division_by_zero() {
    let program = [li(AT, 7), alu_register(4, AT, AT, 0)];
    let (mut core, _) = core_with_program(&program);
    run(&mut core, &program);
    assert_eq!(7, core.registers().get(reg(AT)));
    assert_eq!(cause::ARITHMETIC, core.trap().read_cause());
    assert_eq!(BASE + 4 + 12, core.trap().read_exception_pc());
    assert_eq!(HANDLER, core.pc());
}

#[test]
fn test_illegal_instruction() {
    let program = [0b00001 << 27, system(2, 0)];
    let (mut core, _) = core_with_program(&program);
    for _ in 0..3 {
        core.step();
    }
    assert_eq!(cause::ILLEGAL_INSTRUCTION, core.trap().read_cause());
    assert_eq!(BASE + 12, core.trap().read_exception_pc());

    // Trap to privilege level is reserved
    let (mut core, _) = core_with_program(&[system(2, 0)]);
    run(&mut core, &[0]);
    assert_eq!(cause::ILLEGAL_INSTRUCTION, core.trap().read_cause());
}

#[test]
fn test_system_exceptions() {
    let (mut core, _) = core_with_program(&[system(0, 0xAB_CD00)]);
    run(&mut core, &[0]);
    assert_eq!(cause::SYSCALL | 0xABCD_0000, core.trap().read_cause());
    assert_eq!(HANDLER, core.pc());

    let (mut core, _) = core_with_program(&[system(6, 0x12)]);
    run(&mut core, &[0]);
    assert_eq!(cause::SOFTWARE_EXCEPTION | 0x1200, core.trap().read_cause());

    let (mut core, _) = core_with_program(&[system(5, 0x1)]);
    run(&mut core, &[0]);
    assert_eq!(cause::DEBUG | 0x100, core.trap().read_cause());
}

#[derive(Debug, Default)]
struct Recorder {
    syscalls: Rc<RefCell<Vec<(u32, u32)>>>,
}

impl HostHooks for Recorder {
    fn syscall(&mut self, immediate: u32, registers: &Registers) -> HostAction {
        self.syscalls
            .borrow_mut()
            .push((immediate, registers.get(reg(AT))));
        HostAction::Continue
    }

    fn debug(&mut self, _immediate: u32, _registers: &Registers) -> HostAction {
        HostAction::Halt
    }
}

#[test]
fn test_host_hooks() {
    let program = [li(AT, 0x41), system(0, 0xAB_CD00), system(5, 0xAD_C0DE), li(A0, 1)];
    let (mut core, _) = core_with_program(&program);
    let recorder = Recorder::default();
    let syscalls = recorder.syscalls.clone();
    core.set_host_hooks(Box::new(recorder));
    for _ in 0..10 {
        core.step();
    }
    assert_eq!(vec![(0xAB_CD00, 0x41)], *syscalls.borrow());
    assert!(core.is_halted());
    assert_eq!(5, core.cycles());
    assert_eq!(cause::RESET, core.trap().read_cause());
    assert_eq!(0, core.registers().get(reg(A0)));
}

#[derive(Debug)]
struct Silent;

impl HostHooks for Silent {}

#[test]
fn test_default_hooks_raise() {
    let (mut core, _) = core_with_program(&[system(0, 0xAB_CD00)]);
    core.set_host_hooks(Box::new(Silent));
    run(&mut core, &[0]);
    assert_eq!(cause::SYSCALL | 0xABCD_0000, core.trap().read_cause());
}

#[test]
fn test_coprocessor_exchange() {
    let program = [
        li(AT, 0x1234),
        mtcr(AT, 4, 5),
        mtcr(AT, 0, 1),
        mfcr(X0, 0, 2),
        mfcr(X1, 4, 5),
    ];
    let (mut core, _) = core_with_program(&program);
    run(&mut core, &program);
    assert_eq!(0x1234, core.mmu().active_map().entries()[1].physical_base);
    assert_eq!(0x1234, core.control().read_cr1());
    assert_eq!(cause::RESET, core.registers().get(reg(X0)));
    assert_eq!(0x1234, core.registers().get(reg(X1)));

    assert_eq!(Ok(0x1234), core.read_cop(4, 5));
    assert_eq!(Ok(()), core.write_cop(0, 3, 0x8000_4000));
    assert_eq!(0x8000_4000, core.trap().read_handler());
    assert!(core.read_cop(0, 5).is_err());
    assert!(core.write_cop(4, 129, 0).is_err());
}

#[test]
fn test_map_words_follow_active_map() {
    let (mut core, _) = core_with_program(&[]);
    core.mmu_mut().control_mut().set_active_map(2);
    core.write_cop(4, 3, 0x2000).unwrap();
    assert_eq!(0x2000, core.mmu().map(2).entries()[0].size);
    assert!(core.mmu().map(0).entries()[0].is_vacant());
}

#[test]
fn test_invalid_coprocessor_access() {
    let program = [mtcr(AT, 1, 0)];
    let (mut core, _) = core_with_program(&program);
    run(&mut core, &program);
    assert_eq!(cause::INVALID_COP_ACCESS, core.trap().read_cause());
}

#[test]
fn test_move_from_cop_into_pc_flushes() {
    let program = [
        li(AT, 0x8000) | (1 << 5) | 16,
        mtcr(AT, 0, 3),
        mfcr(PC, 0, 3),
    ];
    let (mut core, _) = core_with_program(&program);
    core.control_mut().set_flush_on_flow_transfer(true);
    run(&mut core, &program);
    assert_eq!(0x8000_0000, core.pc());
    assert_eq!(&[0; 3], core.pipeline().slots());
}

#[test]
fn test_set_if() {
    let program = [
        li(AT, 5),
        // slt a0, at, 6
        (0b11011 << 27) | (A0 << 22) | (AT << 17) | (6 << 1),
        // seq x0, at, 6
        (0b10011 << 27) | (X0 << 22) | (AT << 17) | (6 << 1),
    ];
    let (mut core, _) = core_with_program(&program);
    run(&mut core, &program);
    assert_eq!(1, core.registers().get(reg(A0)));
    assert_eq!(0, core.registers().get(reg(X0)));
}

#[test]
fn test_lea() {
    let program = [
        li(AT, 0x100),
        li(A0, 3),
        // lea x0, [at + a0*8]
        (0b10000 << 27) | (X0 << 22) | (AT << 17) | (A0 << 12) | (8 << 7) | (2 << 3),
    ];
    let (mut core, _) = core_with_program(&program);
    run(&mut core, &program);
    assert_eq!(0x118, core.registers().get(reg(X0)));
}

#[test]
fn test_mmu_two_disjoint_entries() {
    let (mut core, ram) = core_with_program(&[]);
    ram.borrow_mut().write(0x100, 0x1111_1111, AccessSize::Long);
    ram.borrow_mut().write(0x2000, 0x2222_2222, AccessSize::Long);
    let rw = attribute::READ | attribute::WRITE;
    let map = core.mmu_mut().active_map_mut();
    map.insert(MappingEntry {
        physical_base: BASE,
        virtual_base: 0x1000,
        size: 0x1000,
        attributes: rw,
    })
    .unwrap();
    map.insert(MappingEntry {
        physical_base: BASE + 0x2000,
        virtual_base: 0x4000_0000,
        size: 0x100,
        attributes: rw,
    })
    .unwrap();
    core.mmu_mut().control_mut().set_enabled(true);

    assert_eq!(0x1111_1111, core.mmu_read(0x1100, AccessSize::Long));
    assert_eq!(0x2222_2222, core.mmu_read(0x4000_0000, AccessSize::Long));
    assert_eq!(cause::RESET, core.trap().read_cause());

    core.set_pc(BASE + 0x40);
    assert_eq!(0, core.mmu_read(0x3000, AccessSize::Long));
    assert_eq!(cause::NO_MAPPING, core.trap().read_cause());
    assert_eq!(BASE + 0x40, core.trap().read_exception_pc());
    assert_eq!(HANDLER, core.pc());
}

#[test]
fn test_mmu_write_protection() {
    let (mut core, ram) = core_with_program(&[]);
    core.mmu_mut()
        .active_map_mut()
        .insert(MappingEntry {
            physical_base: BASE,
            virtual_base: 0,
            size: 0x1000,
            attributes: attribute::READ,
        })
        .unwrap();
    core.mmu_mut().control_mut().set_enabled(true);
    core.mmu_write(0x10, 0xFFFF_FFFF, AccessSize::Long);
    assert_eq!(cause::WRITE_PROTECTION, core.trap().read_cause());
    assert_eq!(0, ram.borrow_mut().read(0x10, AccessSize::Long));
}

#[test]
fn test_mmu_disabled_is_passthrough() {
    let (mut core, ram) = core_with_program(&[]);
    core.mmu_write(BASE + 0x20, 0xCAFE, AccessSize::Short);
    assert_eq!(0xCAFE, ram.borrow_mut().read(0x20, AccessSize::Long));
    assert_eq!(0xCAFE, core.mmu_read(BASE + 0x20, AccessSize::Long));
}

#[test]
fn test_fetch_faults() {
    let (mut core, _) = core_with_program(&[li(AT, 1)]);
    core.set_pc(BASE + 2);
    core.step();
    assert_eq!(cause::FETCH_MISALIGNED, core.trap().read_cause());
    assert_eq!(BASE + 2, core.trap().read_exception_pc());
    assert_eq!(HANDLER, core.pc());
    assert_eq!(0, core.pipeline().slots()[0]);

    let (mut core, _) = core_with_program(&[li(AT, 1)]);
    core.mmu_mut().control_mut().set_enabled(true);
    core.step();
    assert_eq!(cause::NO_MAPPING, core.trap().read_cause());
    assert_eq!(BASE, core.trap().read_exception_pc());
    assert_eq!(HANDLER, core.pc());
}

#[test]
fn test_fetch_execute_protection() {
    let (mut core, _) = core_with_program(&[li(AT, 1)]);
    core.mmu_mut()
        .active_map_mut()
        .insert(MappingEntry {
            physical_base: BASE,
            virtual_base: BASE,
            size: 0x1000,
            attributes: attribute::READ,
        })
        .unwrap();
    core.mmu_mut().control_mut().set_enabled(true);
    core.step();
    assert_eq!(cause::EXEC_PROTECTION, core.trap().read_cause());
}

#[test]
fn test_exception_privilege_policies() {
    let (mut core, _) = core_with_program(&[]);
    let control = core.mmu_mut().control_mut();
    control.set_remap_on_transition(true);
    control.set_enable_on_pl1(true);
    control.set_disable_on_pl0(true);

    core.set_privilege_level(PrivilegeLevel::Pl2);
    assert_eq!(2, core.mmu().control().active_map());
    assert!(!core.mmu().control().enabled());

    core.raise_exception(Exception::SoftwareException(0));
    assert_eq!(PrivilegeLevel::Pl1, core.privilege_level());
    assert_eq!(1, core.mmu().control().active_map());
    assert!(core.mmu().control().enabled());

    core.raise_exception(Exception::SoftwareException(0));
    assert_eq!(PrivilegeLevel::Pl0, core.privilege_level());
    assert_eq!(0, core.mmu().control().active_map());
    assert!(!core.mmu().control().enabled());

    // Already at PL0: no transition, so no policy applies
    core.mmu_mut().control_mut().set_enabled(true);
    core.mmu_mut().control_mut().set_active_map(3);
    core.raise_exception(Exception::SoftwareException(0));
    assert_eq!(PrivilegeLevel::Pl0, core.privilege_level());
    assert!(core.mmu().control().enabled());
    assert_eq!(3, core.mmu().control().active_map());
}

#[test]
fn test_remap_translates_through_new_map() {
    let (mut core, ram) = core_with_program(&[]);
    ram.borrow_mut().load(0x100, &0xAAAA_0002u32.to_le_bytes());
    ram.borrow_mut().load(0x200, &0xBBBB_0001u32.to_le_bytes());
    let rw = attribute::READ | attribute::WRITE;
    core.mmu_mut()
        .map_mut(2)
        .insert(MappingEntry {
            physical_base: BASE + 0x100,
            virtual_base: 0x1000,
            size: 0x100,
            attributes: rw,
        })
        .unwrap();
    core.mmu_mut()
        .map_mut(2)
        .insert(MappingEntry {
            physical_base: BASE,
            virtual_base: 0x5000,
            size: 0x100,
            attributes: rw,
        })
        .unwrap();
    core.mmu_mut()
        .map_mut(1)
        .insert(MappingEntry {
            physical_base: BASE + 0x200,
            virtual_base: 0x1000,
            size: 0x100,
            attributes: rw,
        })
        .unwrap();
    core.mmu_mut().control_mut().set_remap_on_transition(true);
    core.set_privilege_level(PrivilegeLevel::Pl2);
    core.mmu_mut().control_mut().set_enabled(true);
    assert_eq!(0xAAAA_0002, core.mmu_read(0x1000, AccessSize::Long));

    core.raise_exception(Exception::SoftwareException(0));
    assert_eq!(PrivilegeLevel::Pl1, core.privilege_level());
    assert_eq!(0xBBBB_0001, core.mmu_read(0x1000, AccessSize::Long));
    // Only map 2 had an entry for this address
    assert_eq!(
        Err(Exception::NoMapping),
        core.mmu()
            .translate(0x5000, AccessSize::Long, crate::bus::AccessType::Read)
    );
}

#[test]
fn test_privilege_without_policies() {
    let (mut core, _) = core_with_program(&[]);
    core.set_privilege_level(PrivilegeLevel::Pl3);
    core.raise_exception(Exception::IllegalInstruction);
    assert_eq!(PrivilegeLevel::Pl2, core.privilege_level());
    assert_eq!(0, core.mmu().control().active_map());
    assert!(!core.mmu().control().enabled());
}

#[test]
fn test_exception_flushes_only_when_enabled() {
    let (mut core, _) = core_with_program(&[li(AT, 1), li(AT, 2)]);
    core.step();
    core.step();
    core.raise_exception(Exception::Arithmetic);
    assert_ne!(&[0; 3], core.pipeline().slots());
    core.control_mut().set_flush_on_flow_transfer(true);
    core.raise_exception(Exception::Arithmetic);
    assert_eq!(&[0; 3], core.pipeline().slots());
}

#[test]
fn test_coprocessor_instructions_are_ignored() {
    let program = [0b11110 << 27 | 0x1234, 0xFFFF_FFFF];
    let (mut core, _) = core_with_program(&program);
    run(&mut core, &program);
    assert_eq!(cause::RESET, core.trap().read_cause());
    assert_eq!(BASE + 16, core.pc());
}
