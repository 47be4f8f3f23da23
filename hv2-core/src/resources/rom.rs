use super::read_le;
use crate::address_range::InvalidBoundsError;
use crate::bus::MemoryDevice;
use crate::{AccessSize, AddressRange};
use log::warn;

/// Byte-based ROM with support for misaligned memory access.
///
/// Writes are ignored.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Rom {
    data: Vec<u8>,
    range: AddressRange,
}

impl Rom {
    /// Create a new ROM device of `size` bytes mapped at `base`, of which the first bytes are
    /// initialized with `image`.
    ///
    /// Only up to `size` bytes are read from `image`, the remaining ones read as zero.
    pub fn new(base: u32, size: u32, image: &[u8]) -> Result<Self, InvalidBoundsError> {
        let range = AddressRange::with_size(base, size)?;
        let mut data = vec![0; size as usize];
        let len = image.len().min(data.len());
        data[..len].copy_from_slice(&image[..len]);
        Ok(Self { data, range })
    }

    /// Creates a ROM exactly as large as `image`.
    pub fn with_image(base: u32, image: &[u8]) -> Result<Self, InvalidBoundsError> {
        let size = u32::try_from(image.len()).map_err(|_| InvalidBoundsError {
            start: base,
            end: base as u64 + image.len() as u64,
        })?;
        Self::new(base, size, image)
    }

    /// Returns the size expressed in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl MemoryDevice for Rom {
    fn physical_range(&self) -> AddressRange {
        self.range
    }

    fn read(&mut self, offset: u32, size: AccessSize) -> u32 {
        read_le(&self.data, offset, size)
    }

    fn write(&mut self, offset: u32, value: u32, _size: AccessSize) {
        warn!(
            "ignoring write of {value:#x} to ROM at {:#010x}",
            self.range.start().wrapping_add(offset)
        );
    }
}
