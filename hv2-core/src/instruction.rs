use crate::alu::{AluOp, Condition};
use crate::registers::Specifier;
use crate::{AccessSize, PrivilegeLevel};
use std::fmt;
use thiserror::Error;

/// Data structure that can hold any supported instruction in its decoded form.
///
/// Immediates are stored already extended to 32 bits, exactly as the execute stage consumes them.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Instruction {
    /// `dest = op(src0, src1)`
    AluRegister {
        op: AluOp,
        dest: Specifier,
        src0: Specifier,
        src1: Specifier,
    },
    /// `dest = op(dest, immediate)`
    AluImmediate {
        op: AluOp,
        dest: Specifier,
        immediate: u32,
    },
    /// PC-relative branch taken if `condition(left, right)` holds.
    Branch {
        condition: Condition,
        link: bool,
        left: Specifier,
        right: Specifier,
        offset: i32,
    },
    /// Branch to (or by, if `relative`) the value of `target`, if `condition(left, right)` holds.
    BranchRegister {
        condition: Condition,
        link: bool,
        relative: bool,
        left: Specifier,
        right: Specifier,
        target: Specifier,
    },
    /// `cop[register] = src`
    MoveToCop {
        src: Specifier,
        cop: u8,
        register: u16,
    },
    /// `dest = cop[register]`
    MoveFromCop {
        dest: Specifier,
        cop: u8,
        register: u16,
    },
    Syscall {
        immediate: u32,
    },
    /// Trap to privilege level; reserved, always raises an illegal instruction exception.
    TrapLevel {
        level: PrivilegeLevel,
    },
    Debug {
        immediate: u32,
    },
    SoftwareException {
        immediate: u32,
    },
    Load {
        size: AccessSize,
        dest: Specifier,
        address: Address,
    },
    Store {
        size: AccessSize,
        src: Specifier,
        address: Address,
    },
    /// Load effective address: `dest = address`.
    Lea {
        dest: Specifier,
        address: Address,
    },
    /// `dest = immediate << shift`
    LoadImmediate {
        dest: Specifier,
        immediate: u32,
        shift: u32,
    },
    /// `dest = condition(src, immediate) ? 1 : 0`
    SetIf {
        condition: Condition,
        dest: Specifier,
        src: Specifier,
        immediate: u32,
    },
    /// An instruction addressed at a coprocessor. None are defined yet.
    Coprocessor {
        raw: u32,
    },
}

/// Memory operand of a load, store or LEA instruction: `base ± offset`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Address {
    pub base: Specifier,
    pub offset: Offset,
    pub subtract: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Offset {
    /// `index * scale`
    Scaled { index: Specifier, scale: u32 },
    /// `index << shift`
    Shifted { index: Specifier, shift: u32 },
    /// An 11-bit unsigned immediate.
    Fixed(u32),
}

impl Instruction {
    pub fn decode(raw_instruction: u32) -> Result<Self, DecodeError> {
        let raw = raw_instruction;
        match group(raw) {
            0b00000 => {
                let op = AluOp::from_u4(alu_op(raw));
                if alu_immediate_mode(raw) {
                    Ok(Self::AluImmediate {
                        op,
                        dest: d(raw),
                        immediate: extend16(imm16_at6(raw), sign_extend_bit0(raw)),
                    })
                } else {
                    Ok(Self::AluRegister {
                        op,
                        dest: d(raw),
                        src0: s0(raw),
                        src1: s1(raw),
                    })
                }
            }
            0b00010 | 0b00100 | 0b00110 | 0b01000 | 0b01010 | 0b01100 | 0b10010 | 0b10100
            | 0b10110 | 0b11000 | 0b11010 | 0b11100 => Ok(Self::Branch {
                condition: group_condition(raw)?,
                link: raw & 1 == 1,
                left: d(raw),
                right: s0(raw),
                offset: branch_offset(raw),
            }),
            0b01101 => Ok(Self::BranchRegister {
                condition: Condition::from_index(((raw >> 1) & 0b111) as u8)
                    .ok_or(DecodeError::ReservedCondition)?,
                link: raw & 1 == 1,
                relative: (raw >> 4) & 1 == 1,
                left: d(raw),
                right: s0(raw),
                target: s1(raw),
            }),
            0b01110 => {
                let cop = cop_number(raw) & 0xF;
                let register = cop_register(raw);
                match cop_op(raw) {
                    0 => Ok(Self::MoveToCop {
                        src: d(raw),
                        cop,
                        register,
                    }),
                    1 => Ok(Self::MoveFromCop {
                        dest: d(raw),
                        cop,
                        register,
                    }),
                    _ => Err(DecodeError::ReservedCopOp),
                }
            }
            0b01111 => {
                let immediate = sys_imm24(raw);
                match sys_op(raw) {
                    0 => Ok(Self::Syscall { immediate }),
                    op @ 1..=4 => Ok(Self::TrapLevel {
                        level: PrivilegeLevel::from_u2(op - 1),
                    }),
                    5 => Ok(Self::Debug { immediate }),
                    6 => Ok(Self::SoftwareException { immediate }),
                    _ => Err(DecodeError::ReservedSystemOp),
                }
            }
            0b10000 => {
                let address = address(raw);
                let size = AccessSize::from_u2(lsl_size(raw));
                match (lsl_op(raw), size) {
                    (2, _) => Ok(Self::Lea {
                        dest: d(raw),
                        address,
                    }),
                    (0 | 1, AccessSize::Exec) => Err(DecodeError::ReservedAccessSize),
                    (0, _) => Ok(Self::Load {
                        size,
                        dest: d(raw),
                        address,
                    }),
                    (1, _) => Ok(Self::Store {
                        size,
                        src: d(raw),
                        address,
                    }),
                    _ => Err(DecodeError::ReservedMemoryOp),
                }
            }
            0b10001 => Ok(Self::LoadImmediate {
                dest: d(raw),
                immediate: extend16(imm16_at6(raw), (raw >> 5) & 1 == 1),
                shift: raw & 0x1F,
            }),
            0b10011 | 0b10101 | 0b10111 | 0b11001 | 0b11011 | 0b11101 => Ok(Self::SetIf {
                condition: group_condition(raw)?,
                dest: d(raw),
                src: s0(raw),
                immediate: extend16(imm16_at1(raw), sign_extend_bit0(raw)),
            }),
            0b11110 | 0b11111 => Ok(Self::Coprocessor { raw }),
            group => Err(DecodeError::ReservedGroup(group)),
        }
    }
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum DecodeError {
    #[error("instruction group {0:#07b} is reserved")]
    ReservedGroup(u8),
    #[error("system operation is reserved")]
    ReservedSystemOp,
    #[error("memory operation is reserved")]
    ReservedMemoryOp,
    #[error("access size is reserved")]
    ReservedAccessSize,
    #[error("coprocessor exchange operation is reserved")]
    ReservedCopOp,
    #[error("condition code is reserved")]
    ReservedCondition,
}

/// Returns the 5-bit instruction *group* (bits 31:27).
pub fn group(raw_instruction: u32) -> u8 {
    ((raw_instruction >> 27) & 0x1F) as u8
}

/// Returns the 5-bit *d* register (bits 26:22).
fn d(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 22) & 0x1F) as u8)
}

/// Returns the 5-bit *s0* register (bits 21:17).
fn s0(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 17) & 0x1F) as u8)
}

/// Returns the 5-bit *s1* register (bits 16:12).
fn s1(raw_instruction: u32) -> Specifier {
    Specifier::from_u5(((raw_instruction >> 12) & 0x1F) as u8)
}

/// Returns the 5-bit *s2* field (bits 11:7), a scale or shift amount for memory operands.
fn s2(raw_instruction: u32) -> u32 {
    (raw_instruction >> 7) & 0x1F
}

/// Returns the 4-bit ALU *op* (bits 5:2).
fn alu_op(raw_instruction: u32) -> u8 {
    ((raw_instruction >> 2) & 0xF) as u8
}

fn alu_immediate_mode(raw_instruction: u32) -> bool {
    (raw_instruction >> 1) & 1 == 1
}

fn sign_extend_bit0(raw_instruction: u32) -> bool {
    raw_instruction & 1 == 1
}

/// Returns the 16-bit immediate at bits 21:6 (ALU immediate and load immediate).
fn imm16_at6(raw_instruction: u32) -> u32 {
    (raw_instruction >> 6) & 0xFFFF
}

/// Returns the 16-bit immediate at bits 16:1 (branch and set-if).
fn imm16_at1(raw_instruction: u32) -> u32 {
    (raw_instruction >> 1) & 0xFFFF
}

/// Returns the condition encoded in bits 3:1 of the group, 1-based (`1` is *eq*).
fn group_condition(raw_instruction: u32) -> Result<Condition, DecodeError> {
    let code = (group(raw_instruction) >> 1) & 0b111;
    code.checked_sub(1)
        .and_then(Condition::from_index)
        .ok_or(DecodeError::ReservedCondition)
}

/// Returns the 17-bit branch offset sign-extended to 32 bits. Bit 16 is the top bit of the group.
fn branch_offset(raw_instruction: u32) -> i32 {
    let imm17 = imm16_at1(raw_instruction) | ((group(raw_instruction) as u32 & 0x10) << 12);
    ((imm17 << 15) as i32) >> 15
}

/// Returns the 10-bit coprocessor register (bits 21:12).
fn cop_register(raw_instruction: u32) -> u16 {
    ((raw_instruction >> 12) & 0x3FF) as u16
}

/// Returns the 5-bit coprocessor number field (bits 12:8).
///
/// Bit 12 is shared with [`cop_register`].
fn cop_number(raw_instruction: u32) -> u8 {
    ((raw_instruction >> 8) & 0x1F) as u8
}

fn cop_op(raw_instruction: u32) -> u8 {
    (raw_instruction & 0x1F) as u8
}

fn sys_op(raw_instruction: u32) -> u8 {
    ((raw_instruction >> 24) & 0b111) as u8
}

fn sys_imm24(raw_instruction: u32) -> u32 {
    raw_instruction & 0xFF_FFFF
}

fn lsl_size(raw_instruction: u32) -> u8 {
    ((raw_instruction >> 5) & 0b11) as u8
}

fn lsl_op(raw_instruction: u32) -> u8 {
    ((raw_instruction >> 3) & 0b11) as u8
}

/// Decodes the addressing mode (bits 2:0) and its operands.
fn address(raw_instruction: u32) -> Address {
    let mode = raw_instruction & 0b111;
    let offset = match mode {
        0b000 | 0b001 => Offset::Scaled {
            index: s1(raw_instruction),
            scale: s2(raw_instruction),
        },
        0b010 | 0b011 => Offset::Shifted {
            index: s1(raw_instruction),
            shift: s2(raw_instruction),
        },
        _ => Offset::Fixed(((raw_instruction >> 7) & 0x3FF) | ((mode & 0b10) << 9)),
    };
    Address {
        base: s0(raw_instruction),
        offset,
        subtract: mode & 1 == 1,
    }
}

fn extend16(value: u32, sign_extend: bool) -> u32 {
    if sign_extend {
        value as u16 as i16 as u32
    } else {
        value & 0xFFFF
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.subtract { '-' } else { '+' };
        match self.offset {
            Offset::Scaled { index, scale } => {
                write!(f, "[{}{sign}{index}*{scale:#x}]", self.base)
            }
            Offset::Shifted { index, shift } => {
                write!(f, "[{}{sign}{index}:{shift:#x}]", self.base)
            }
            Offset::Fixed(immediate) => write!(f, "[{}{sign}{immediate:#x}]", self.base),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::AluRegister {
                op: AluOp::Add,
                dest: Specifier::R0,
                src0: Specifier::R0,
                src1: Specifier::R0,
            } => f.write_str("nop"),
            Self::AluRegister {
                op,
                dest,
                src0,
                src1,
            } => write!(f, "{op} {dest}, {src0}, {src1}"),
            Self::AluImmediate {
                op,
                dest,
                immediate,
            } => write!(f, "{op} {dest}, {immediate:#x}"),
            Self::Branch {
                condition,
                link,
                left,
                right,
                offset,
            } => {
                let mnemonic = if link { "bl" } else { "b" };
                let sign = if offset < 0 { '-' } else { '+' };
                let magnitude = offset.unsigned_abs();
                write!(f, "{mnemonic}{condition} {left}, {right}, {sign}{magnitude:#x}")
            }
            Self::BranchRegister {
                condition,
                link,
                relative,
                left,
                right,
                target,
            } => {
                let mnemonic = if link { "blr" } else { "br" };
                let mode = if relative { ".r" } else { "" };
                write!(f, "{mnemonic}{condition}{mode} {left}, {right}, {target}")
            }
            Self::MoveToCop { src, cop, register } => {
                write!(f, "mtcr {src}, ${cop}, ${register}")
            }
            Self::MoveFromCop {
                dest,
                cop,
                register,
            } => write!(f, "mfcr ${cop}, ${register}, {dest}"),
            Self::Syscall { immediate } => write!(f, "syscall {immediate:#x}"),
            Self::TrapLevel { level } => write!(f, "tpl{}", level.index()),
            Self::Debug { immediate } => write!(f, "debug {immediate:#x}"),
            Self::SoftwareException { immediate } => write!(f, "excep {immediate:#x}"),
            Self::Load {
                size,
                dest,
                address,
            } => write!(f, "load.{size} {dest}, {address}"),
            Self::Store { size, src, address } => write!(f, "store.{size} {address}, {src}"),
            Self::Lea { dest, address } => write!(f, "lea {dest}, {address}"),
            Self::LoadImmediate {
                dest,
                immediate,
                shift,
            } => write!(f, "li {dest}, {:#010x}", immediate << shift),
            Self::SetIf {
                condition,
                dest,
                src,
                immediate,
            } => write!(f, "s{condition} {dest}, {src}, {immediate:#x}"),
            Self::Coprocessor { raw } => write!(f, "cop {raw:#010x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(index: u8) -> Specifier {
        Specifier::from_u5(index)
    }

    #[test]
    fn test_field_positions() {
        let raw = 0b10101_00011_00101_01001_10001_0110110;
        assert_eq!(0b10101, group(raw));
        assert_eq!(reg(3), d(raw));
        assert_eq!(reg(5), s0(raw));
        assert_eq!(reg(9), s1(raw));
        assert_eq!(0b10001, s2(raw));
        assert_eq!(0b1101, alu_op(raw));
        assert!(alu_immediate_mode(raw));
        assert!(!sign_extend_bit0(raw));
    }

    #[test]
    fn test_zero_word_is_nop() {
        let instruction = Instruction::decode(0).unwrap();
        assert_eq!(
            Instruction::AluRegister {
                op: AluOp::Add,
                dest: reg(0),
                src0: reg(0),
                src1: reg(0),
            },
            instruction
        );
        assert_eq!("nop", instruction.to_string());
    }

    #[test]
    fn test_alu_immediate() {
        // add at, 0xffff (sign-extended)
        let raw = (1 << 22) | (0xFFFF << 6) | (0 << 2) | 0b11;
        assert_eq!(
            Ok(Instruction::AluImmediate {
                op: AluOp::Add,
                dest: reg(1),
                immediate: 0xFFFF_FFFF,
            }),
            Instruction::decode(raw)
        );
        // Same without sign extension
        assert_eq!(
            Ok(Instruction::AluImmediate {
                op: AluOp::Add,
                dest: reg(1),
                immediate: 0xFFFF,
            }),
            Instruction::decode(raw & !1)
        );
    }

    #[test]
    fn test_branch_offset_sign() {
        // beq x0, x1, with offset bit 16 set through the group
        let raw = (0b10010 << 27) | (3 << 22) | (4 << 17) | (0xFFFC << 1);
        assert_eq!(
            Ok(Instruction::Branch {
                condition: Condition::Eq,
                link: false,
                left: reg(3),
                right: reg(4),
                offset: -4,
            }),
            Instruction::decode(raw)
        );
        // ble with link, positive offset
        let raw = (0b01100 << 27) | (0x10 << 1) | 1;
        assert_eq!(
            Ok(Instruction::Branch {
                condition: Condition::Le,
                link: true,
                left: reg(0),
                right: reg(0),
                offset: 0x10,
            }),
            Instruction::decode(raw)
        );
        assert_eq!(0xFFFF, branch_offset(0b00010 << 27 | 0xFFFF << 1));
    }

    #[test]
    fn test_branch_register() {
        let raw = (0b01101 << 27) | (1 << 22) | (2 << 17) | (3 << 12) | (1 << 4) | (4 << 1) | 1;
        assert_eq!(
            Ok(Instruction::BranchRegister {
                condition: Condition::Lt,
                link: true,
                relative: true,
                left: reg(1),
                right: reg(2),
                target: reg(3),
            }),
            Instruction::decode(raw)
        );
        let reserved = (0b01101 << 27) | (6 << 1);
        assert_eq!(
            Err(DecodeError::ReservedCondition),
            Instruction::decode(reserved)
        );
    }

    #[test]
    fn test_coprocessor_exchange() {
        // mtcr a0 -> COP0 register 0
        let raw = (0b01110 << 27) | (2 << 22);
        assert_eq!(
            Ok(Instruction::MoveToCop {
                src: reg(2),
                cop: 0,
                register: 0,
            }),
            Instruction::decode(raw)
        );
        // mfcr COP4 register 5 -> at; bit 12 belongs to the register index
        let raw = (0b01110 << 27) | (1 << 22) | (5 << 12) | (4 << 8) | 1;
        assert_eq!(
            Ok(Instruction::MoveFromCop {
                dest: reg(1),
                cop: 4,
                register: 5,
            }),
            Instruction::decode(raw)
        );
        assert_eq!(
            Err(DecodeError::ReservedCopOp),
            Instruction::decode((0b01110 << 27) | 2)
        );
    }

    #[test]
    fn test_system() {
        let sys = |op: u32, imm: u32| Instruction::decode((0b01111 << 27) | (op << 24) | imm);
        assert_eq!(
            Ok(Instruction::Syscall {
                immediate: 0xABCD00
            }),
            sys(0, 0xABCD00)
        );
        assert_eq!(
            Ok(Instruction::TrapLevel {
                level: PrivilegeLevel::Pl2
            }),
            sys(3, 0)
        );
        assert_eq!(
            Ok(Instruction::Debug {
                immediate: 0xADC0DE
            }),
            sys(5, 0xADC0DE)
        );
        assert_eq!(
            Ok(Instruction::SoftwareException { immediate: 7 }),
            sys(6, 7)
        );
        assert_eq!(Err(DecodeError::ReservedSystemOp), sys(7, 0));
    }

    #[test]
    fn test_memory_addressing_modes() {
        let lsl = |mode: u32| (0b10000 << 27) | (1 << 22) | (2 << 17) | (3 << 12) | (4 << 7) | mode;
        assert_eq!(
            Offset::Scaled {
                index: reg(3),
                scale: 4
            },
            address(lsl(0)).offset
        );
        assert!(address(lsl(1)).subtract);
        assert_eq!(
            Offset::Shifted {
                index: reg(3),
                shift: 4
            },
            address(lsl(2)).offset
        );
        // imm10 overlaps s1 and s2: 0b00011_00100, mode 110 adds bit 10
        assert_eq!(Offset::Fixed(0x64), address(lsl(0b100)).offset);
        assert_eq!(Offset::Fixed(0x464), address(lsl(0b110)).offset);
        assert!(address(lsl(0b111)).subtract);
        assert_eq!(reg(2), address(lsl(0)).base);
    }

    #[test]
    fn test_memory_ops() {
        let lsl = |size: u32, op: u32| (0b10000 << 27) | (5 << 22) | (size << 5) | (op << 3);
        assert!(matches!(
            Instruction::decode(lsl(2, 0)),
            Ok(Instruction::Load {
                size: AccessSize::Long,
                ..
            })
        ));
        assert!(matches!(
            Instruction::decode(lsl(0, 1)),
            Ok(Instruction::Store {
                size: AccessSize::Byte,
                ..
            })
        ));
        assert!(matches!(
            Instruction::decode(lsl(3, 2)),
            Ok(Instruction::Lea { .. })
        ));
        assert_eq!(
            Err(DecodeError::ReservedAccessSize),
            Instruction::decode(lsl(3, 0))
        );
        assert_eq!(
            Err(DecodeError::ReservedMemoryOp),
            Instruction::decode(lsl(2, 3))
        );
    }

    #[test]
    fn test_load_immediate() {
        let raw = (0b10001 << 27) | (1 << 22) | (2 << 6);
        assert_eq!(
            Ok(Instruction::LoadImmediate {
                dest: reg(1),
                immediate: 2,
                shift: 0,
            }),
            Instruction::decode(raw)
        );
        let raw = (0b10001 << 27) | (1 << 22) | (0x8000 << 6) | (1 << 5) | 16;
        let instruction = Instruction::decode(raw).unwrap();
        assert_eq!(
            Instruction::LoadImmediate {
                dest: reg(1),
                immediate: 0xFFFF_8000,
                shift: 16,
            },
            instruction
        );
        assert_eq!("li at, 0x80000000", instruction.to_string());
    }

    #[test]
    fn test_set_if() {
        let raw = (0b11101 << 27) | (1 << 22) | (2 << 17) | (0x8000 << 1) | 1;
        assert_eq!(
            Ok(Instruction::SetIf {
                condition: Condition::Le,
                dest: reg(1),
                src: reg(2),
                immediate: 0xFFFF_8000,
            }),
            Instruction::decode(raw)
        );
        let raw = 0b10011 << 27;
        assert!(matches!(
            Instruction::decode(raw),
            Ok(Instruction::SetIf {
                condition: Condition::Eq,
                ..
            })
        ));
    }

    #[test]
    fn test_reserved_groups() {
        for group in [0b00001, 0b00011, 0b00101, 0b00111, 0b01001, 0b01011] {
            assert_eq!(
                Err(DecodeError::ReservedGroup(group)),
                Instruction::decode((group as u32) << 27)
            );
        }
        assert!(matches!(
            Instruction::decode(0b11110 << 27),
            Ok(Instruction::Coprocessor { .. })
        ));
    }

    #[test]
    fn test_disassembly() {
        let raw = (0b00100 << 27) | (1 << 22) | (2 << 17) | (8 << 1) | 1;
        assert_eq!(
            "blne at, a0, +0x8",
            Instruction::decode(raw).unwrap().to_string()
        );
        let raw = (0b10000 << 27) | (2 << 22) | (29 << 17) | (4 << 7) | (2 << 5) | (1 << 3) | 0b101;
        assert_eq!(
            "store.l [sp-0x4], a0",
            Instruction::decode(raw).unwrap().to_string()
        );
    }
}
