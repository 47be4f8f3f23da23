//! General purpose registers.

use std::fmt;
use std::fmt::Formatter;

/// The number of general purpose registers (indices start at `0` for `r0`).
pub const LEN: u8 = 32;

/// Register names used by the assembler, indexed by register number.
const NAMES: [&str; LEN as usize] = [
    "r0", "at", "a0", "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11",
    "x12", "x13", "x14", "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24",
    "fp", "sp", "lr", "pc",
];

/// An HV2 core's general purpose registers.
///
/// There are 32 word-size (32 bit) registers, `r0` up to `r31`. The program counter is not a
/// separate register: it lives in `r31` ([`Specifier::PC`]), and `r30` ([`Specifier::LR`]) receives
/// return addresses of linking branches.
///
/// `r0` reads as zero once an instruction retires. Writes to it are stored until
/// [`clear_zero`](Self::clear_zero) is called at the end of the instruction.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Registers {
    r: [u32; LEN as usize],
}

impl Registers {
    /// Returns a fresh set of all-zero registers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of a register.
    pub fn get(&self, specifier: Specifier) -> u32 {
        self.r[usize::from(specifier)]
    }

    /// Sets the value of a register.
    pub fn set(&mut self, specifier: Specifier, value: u32) {
        self.r[usize::from(specifier)] = value;
    }

    /// Returns the value of the program counter (`r31`).
    pub fn pc(&self) -> u32 {
        self.get(Specifier::PC)
    }

    /// Returns a mutable reference to the program counter (`r31`).
    pub fn pc_mut(&mut self) -> &mut u32 {
        &mut self.r[usize::from(Specifier::PC)]
    }

    /// Forces `r0` back to zero.
    pub fn clear_zero(&mut self) {
        self.r[0] = 0;
    }
}

/// A register specifier. Can take values in the range `0..LEN`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Specifier(u8);

impl Specifier {
    /// Register `r0`, which always reads as zero after an instruction retires.
    pub const R0: Self = Specifier(0);

    /// Register `a0`, first argument register by convention.
    pub const A0: Self = Specifier(2);

    /// Link register, written by linking branches.
    pub const LR: Self = Specifier(30);

    /// Program counter.
    pub const PC: Self = Specifier(31);

    /// Convert a 5-bit value into a register specifier.
    /// Panics if the value doesn't fit in 5 bits (`0..=31`).
    pub fn from_u5(value_u5: u8) -> Self {
        const_assert_eq!(LEN, 32);
        if value_u5 > 31 {
            panic!("out of range u5 used");
        }
        Self(value_u5)
    }

    /// Assembler name of the register (`at`, `sp`, `pc`, ...).
    pub fn name(self) -> &'static str {
        NAMES[self.0 as usize]
    }
}

impl From<Specifier> for u8 {
    fn from(value: Specifier) -> Self {
        value.0
    }
}

impl From<Specifier> for u32 {
    fn from(value: Specifier) -> Self {
        value.0 as u32
    }
}

impl From<Specifier> for usize {
    fn from(value: Specifier) -> Self {
        value.0 as usize
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        const_assert!(LEN > 31);
        assert_eq!(31, u8::from(Specifier::PC));
        assert_eq!(30, u8::from(Specifier::LR));
    }

    #[test]
    fn test_write_to_zero_until_cleared() {
        let mut registers = Registers::default();
        registers.set(Specifier::R0, 0xDEADBEEF);
        assert_eq!(0xDEADBEEF, registers.get(Specifier::R0));
        registers.clear_zero();
        assert_eq!(0, registers.get(Specifier::R0));
    }

    #[test]
    fn test_pc_is_r31() {
        let mut registers = Registers::default();
        *registers.pc_mut() = 0x8000_0000;
        assert_eq!(0x8000_0000, registers.get(Specifier::from_u5(31)));
        registers.set(Specifier::PC, 0x1234);
        assert_eq!(0x1234, registers.pc());
    }

    #[test]
    fn test_set_all() {
        let mut registers = Registers::default();
        for i in 1..LEN {
            let specifier = Specifier::from_u5(i);
            registers.set(specifier, u32::from(specifier) + 1);
        }
        for i in 1..LEN {
            assert_eq!(i as u32 + 1, registers.get(Specifier::from_u5(i)));
        }
        assert_eq!(0, registers.get(Specifier::R0));
    }

    #[test]
    fn test_names() {
        assert_eq!("r0", Specifier::R0.to_string());
        assert_eq!("a0", Specifier::A0.to_string());
        assert_eq!("x0", Specifier::from_u5(3).to_string());
        assert_eq!("fp", Specifier::from_u5(28).to_string());
        assert_eq!("pc", Specifier::PC.to_string());
    }
}
