use std::fmt;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Exclusive upper bound of the 32-bit physical address space.
pub const ADDRESS_SPACE_END: u64 = 1 << 32;

/// A range in the 32-bit physical address space, bounded inclusively below and exclusively above.
///
/// Enforces the invariant that `self.start() <= self.end() <= 2^32`. The end is kept as a `u64`
/// so that a range can reach the last byte of the address space. An empty range
/// (`start == end`) contains no address.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct AddressRange {
    start: u32,
    end: u64,
}

impl Display for AddressRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#010x}, {:#010x})", self.start, self.end)
    }
}

impl AddressRange {
    pub fn new(start: u32, end: u64) -> Result<Self, InvalidBoundsError> {
        (start as u64 <= end && end <= ADDRESS_SPACE_END)
            .then_some(Self { start, end })
            .ok_or(InvalidBoundsError { start, end })
    }

    /// Create the range `[start, start + size)`.
    ///
    /// Fails if the range would extend past the end of the address space.
    pub fn with_size(start: u32, size: u32) -> Result<Self, InvalidBoundsError> {
        Self::new(start, start as u64 + size as u64)
    }

    pub fn start(self) -> u32 {
        self.start
    }

    /// First address past the range, `2^32` for a range reaching the top of the address space.
    pub fn end(self) -> u64 {
        self.end
    }

    /// Number of addresses in the range.
    pub fn len(self) -> u64 {
        self.end - self.start as u64
    }

    pub fn is_empty(self) -> bool {
        self.start as u64 == self.end
    }

    /// Check if an address is contained within this address range.
    pub fn contains(self, address: u32) -> bool {
        self.start <= address && (address as u64) < self.end
    }

    /// Returns the offset of `address` from the start of the range, or `None` if the range does
    /// not contain `address`.
    pub fn offset_of(self, address: u32) -> Option<u32> {
        self.contains(address).then(|| address - self.start)
    }

    /// Returns `true` if both ranges have at least one address in common.
    pub fn overlaps(self, other: Self) -> bool {
        (self.start as u64) < other.end && (other.start as u64) < self.end
    }
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
#[error("invalid address range bounds: start {start:#x}, end {end:#x}")]
pub struct InvalidBoundsError {
    pub start: u32,
    pub end: u64,
}
