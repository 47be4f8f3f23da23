use super::{read_le, write_le};
use crate::address_range::InvalidBoundsError;
use crate::bus::MemoryDevice;
use crate::{AccessSize, AddressRange};

/// Byte-based RAM with support for misaligned memory access.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Ram {
    data: Vec<u8>,
    range: AddressRange,
}

impl Ram {
    /// Create a new zero-initialized RAM device of `size` bytes, mapped at `base`.
    ///
    /// Fails if the device would extend past the end of the address space.
    pub fn new(base: u32, size: u32) -> Result<Self, InvalidBoundsError> {
        let range = AddressRange::with_size(base, size)?;
        Ok(Self {
            data: vec![0; size as usize],
            range,
        })
    }

    /// Returns the size expressed in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Force RAM back to its reset state, which is all-zeros.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Copies `bytes` into RAM starting at `offset`. Bytes that don't fit are dropped.
    pub fn load(&mut self, offset: u32, bytes: &[u8]) {
        let Some(dest) = self.data.get_mut(offset as usize..) else {
            return;
        };
        let len = bytes.len().min(dest.len());
        dest[..len].copy_from_slice(&bytes[..len]);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl MemoryDevice for Ram {
    fn physical_range(&self) -> AddressRange {
        self.range
    }

    fn read(&mut self, offset: u32, size: AccessSize) -> u32 {
        read_le(&self.data, offset, size)
    }

    fn write(&mut self, offset: u32, value: u32, size: AccessSize) {
        write_le(&mut self.data, offset, value, size);
    }
}
