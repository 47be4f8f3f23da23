//! Coprocessor register addressing.

use super::mmu::{EntryField, MAP_ENTRIES, WORDS_PER_ENTRY};
use thiserror::Error;

/// Coprocessor holding the control and exception registers.
pub const SYSTEM: u8 = 0;

/// Coprocessor holding the MMU control word and the active mapping table.
pub const MMU: u8 = 4;

/// Number of registers of COP4: the control word followed by every word of a mapping table.
pub const MMU_REGISTER_COUNT: u16 = 1 + (MAP_ENTRIES * WORDS_PER_ENTRY) as u16;

const_assert_eq!(MMU_REGISTER_COUNT, 129);

/// A resolved coprocessor register.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CopRegister {
    /// COP0 register 0.
    Control0,
    /// COP0 register 1.
    Control1,
    /// COP0 register 2.
    Cause,
    /// COP0 register 3.
    Handler,
    /// COP0 register 4.
    ExceptionPc,
    /// COP4 register 0.
    MmuControl,
    /// COP4 registers `1..=128`, a word of the active mapping table.
    MapWord { entry: usize, field: EntryField },
}

impl CopRegister {
    pub fn resolve(cop: u8, register: u16) -> Result<Self, InvalidCopRegister> {
        let resolved = match (cop, register) {
            (SYSTEM, 0) => Self::Control0,
            (SYSTEM, 1) => Self::Control1,
            (SYSTEM, 2) => Self::Cause,
            (SYSTEM, 3) => Self::Handler,
            (SYSTEM, 4) => Self::ExceptionPc,
            (MMU, 0) => Self::MmuControl,
            (MMU, 1..) if register < MMU_REGISTER_COUNT => {
                let word = (register - 1) as usize;
                Self::MapWord {
                    entry: word / WORDS_PER_ENTRY,
                    field: EntryField::from_u2(word % WORDS_PER_ENTRY),
                }
            }
            _ => return Err(InvalidCopRegister { cop, register }),
        };
        Ok(resolved)
    }
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
#[error("coprocessor {cop} has no register {register}")]
pub struct InvalidCopRegister {
    pub cop: u8,
    pub register: u16,
}
