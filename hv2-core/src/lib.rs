#[macro_use]
extern crate static_assertions;

use std::fmt;

pub mod address_range;
pub mod alu;
pub mod board;
pub mod bus;
pub mod clock;
pub mod core;
pub mod instruction;
pub mod registers;
pub mod resources;

/// Re-export of [`AddressRange`] for convenience.
pub use address_range::AddressRange;

/// The four execution rings of an HV2 core.
///
/// Level `0` is the most privileged one. Exceptions move the core one level *up* in privilege,
/// i.e. towards [`PrivilegeLevel::Pl0`], and never past it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub enum PrivilegeLevel {
    /// Highest privilege, the level the core resets into.
    #[default]
    Pl0 = 0,
    Pl1 = 1,
    Pl2 = 2,
    /// Lowest privilege.
    Pl3 = 3,
}

impl PrivilegeLevel {
    /// Convert a 2-bit value into a [`PrivilegeLevel`].
    /// Panics if the value doesn't fit in 2 bits (`0..=3`).
    pub fn from_u2(value_u2: u8) -> Self {
        match value_u2 {
            0 => Self::Pl0,
            1 => Self::Pl1,
            2 => Self::Pl2,
            3 => Self::Pl3,
            _ => panic!("out of range u2 used"),
        }
    }

    /// Returns the next more privileged level, saturating at [`PrivilegeLevel::Pl0`].
    pub fn raised(self) -> Self {
        match self {
            Self::Pl0 | Self::Pl1 => Self::Pl0,
            Self::Pl2 => Self::Pl1,
            Self::Pl3 => Self::Pl2,
        }
    }

    /// Index of this level, usable to select a mapping table.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PL{}", *self as u8)
    }
}

/// Size of a memory access, as encoded in the 2-bit size fields of the ISA.
///
/// [`AccessSize::Exec`] is used for instruction fetches: it always transfers a full word and is
/// never masked.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AccessSize {
    Byte = 0,
    Short = 1,
    Long = 2,
    Exec = 3,
}

impl AccessSize {
    /// Convert a 2-bit value into an [`AccessSize`].
    /// Panics if the value doesn't fit in 2 bits (`0..=3`).
    pub fn from_u2(value_u2: u8) -> Self {
        match value_u2 {
            0 => Self::Byte,
            1 => Self::Short,
            2 => Self::Long,
            3 => Self::Exec,
            _ => panic!("out of range u2 used"),
        }
    }

    /// Number of bytes transferred by an access of this size.
    pub fn bytes(self) -> u32 {
        match self {
            Self::Byte => unit::BYTE,
            Self::Short => unit::SHORT,
            Self::Long | Self::Exec => unit::LONG,
        }
    }

    /// Mask to apply to a 32-bit bus value to truncate it to this size.
    pub fn mask(self) -> u32 {
        match self {
            Self::Byte => 0x0000_00FF,
            Self::Short => 0x0000_FFFF,
            Self::Long | Self::Exec => 0xFFFF_FFFF,
        }
    }

    /// The natural alignment of an access of this size.
    pub fn alignment(self) -> Alignment {
        match self {
            Self::Byte => Alignment::BYTE,
            Self::Short => Alignment::SHORT,
            Self::Long | Self::Exec => Alignment::LONG,
        }
    }
}

impl fmt::Display for AccessSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Byte => "b",
            Self::Short => "s",
            Self::Long => "l",
            Self::Exec => "x",
        })
    }
}

pub mod unit {
    //! Collection of the units in which memory can be addressed (in bytes).

    /// A _byte_ is 8 bits.
    pub const BYTE: u32 = 1;

    /// A _short_ is 16 bits (2 bytes).
    pub const SHORT: u32 = 2;

    /// A _long_ is 32 bits (4 bytes), the size of an instruction.
    pub const LONG: u32 = 4;
}

/// Address alignment, always a power of two.
// Maintains the invariant that self.0 is a power of two.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Alignment(u32);

impl Alignment {
    /// Byte alignment is equivalent to no alignment.
    pub const BYTE: Self = Self(unit::BYTE);

    /// Short alignment means the address is a multiple of 2 (`address & 0b1 == 0`).
    pub const SHORT: Self = Self(unit::SHORT);

    /// Long alignment means the address is a multiple of 4 (`address & 0b11 == 0`).
    pub const LONG: Self = Self(unit::LONG);

    /// Returns `true` if `address` is aligned to this alignment.
    pub fn is_aligned(self, address: u32) -> bool {
        address & (self.0 - 1) == 0
    }
}
