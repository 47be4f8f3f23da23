//! The ALU operation table and the condition table.
//!
//! Both are pure functions over raw 32-bit values, selected by a small code taken from the
//! instruction word.

use std::fmt;
use thiserror::Error;

/// One of the 16 binary ALU operations, indexed by the 4-bit *op* field of an ALU instruction.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    /// Multiply-accumulate: adds the product to the destination's current value.
    Mla,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Lsl,
    Lsr,
    Asr,
    /// Sign-extend the low byte of the first operand.
    Sxb,
    /// Sign-extend the low 16 bits of the first operand.
    Sxs,
    Rol,
    Ror,
}

impl AluOp {
    /// Convert a 4-bit value into an [`AluOp`].
    /// Panics if the value doesn't fit in 4 bits (`0..=15`).
    pub fn from_u4(value_u4: u8) -> Self {
        match value_u4 {
            0 => Self::Add,
            1 => Self::Sub,
            2 => Self::Mul,
            3 => Self::Mla,
            4 => Self::Div,
            5 => Self::Mod,
            6 => Self::And,
            7 => Self::Or,
            8 => Self::Xor,
            9 => Self::Lsl,
            10 => Self::Lsr,
            11 => Self::Asr,
            12 => Self::Sxb,
            13 => Self::Sxs,
            14 => Self::Rol,
            15 => Self::Ror,
            _ => panic!("out of range u4 used"),
        }
    }

    /// Computes the new destination value.
    ///
    /// `dest` is the destination register's value before the operation, only [`AluOp::Mla`] uses
    /// it. Shift and rotate amounts are taken modulo 32. Division is unsigned, a zero divisor
    /// yields an [`ArithmeticError`].
    pub fn apply(self, dest: u32, s0: u32, s1: u32) -> Result<u32, ArithmeticError> {
        Ok(match self {
            Self::Add => s0.wrapping_add(s1),
            Self::Sub => s0.wrapping_sub(s1),
            Self::Mul => s0.wrapping_mul(s1),
            Self::Mla => dest.wrapping_add(s0.wrapping_mul(s1)),
            Self::Div => s0.checked_div(s1).ok_or(ArithmeticError::DivisionByZero)?,
            Self::Mod => s0.checked_rem(s1).ok_or(ArithmeticError::DivisionByZero)?,
            Self::And => s0 & s1,
            Self::Or => s0 | s1,
            Self::Xor => s0 ^ s1,
            Self::Lsl => s0.wrapping_shl(s1),
            Self::Lsr => s0.wrapping_shr(s1),
            Self::Asr => (s0 as i32).wrapping_shr(s1) as u32,
            Self::Sxb => s0 as u8 as i8 as u32,
            Self::Sxs => s0 as u16 as i16 as u32,
            Self::Rol => s0.rotate_left(s1 % 32),
            Self::Ror => s0.rotate_right(s1 % 32),
        })
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Mla => "mla",
            Self::Div => "div",
            Self::Mod => "mod",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Lsl => "lsl",
            Self::Lsr => "lsr",
            Self::Asr => "asr",
            Self::Sxb => "sx.b",
            Self::Sxs => "sx.s",
            Self::Rol => "rol",
            Self::Ror => "ror",
        }
    }
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivisionByZero,
}

/// One of the 6 comparison predicates. All of them compare the raw 32-bit patterns as unsigned
/// numbers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Condition {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Condition {
    /// Convert a 0-based condition index into a [`Condition`], returning `None` for the
    /// unassigned indices `6` and `7` (or anything larger).
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Eq),
            1 => Some(Self::Ne),
            2 => Some(Self::Gt),
            3 => Some(Self::Ge),
            4 => Some(Self::Lt),
            5 => Some(Self::Le),
            _ => None,
        }
    }

    /// Evaluates `left <cond> right`.
    pub fn test(self, left: u32, right: u32) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Ne => left != right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
            Self::Lt => left < right,
            Self::Le => left <= right,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
        })
    }
}
