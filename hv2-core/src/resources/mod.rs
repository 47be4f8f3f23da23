//! Provides implementations for common memory resources: RAM and ROM.

pub mod ram;
pub mod rom;

use crate::AccessSize;

/// Reads a little-endian value of `size` starting at `offset` in `data`.
///
/// Bytes past the end of `data` read as zero.
fn read_le(data: &[u8], offset: u32, size: AccessSize) -> u32 {
    (0..size.bytes()).fold(0, |value, i| {
        let byte = offset
            .checked_add(i)
            .and_then(|address| data.get(address as usize))
            .copied()
            .unwrap_or(0);
        value | (byte as u32) << (8 * i)
    })
}

/// Writes `value` as a little-endian value of `size` starting at `offset` in `data`.
///
/// Bytes that would land past the end of `data` are dropped.
fn write_le(data: &mut [u8], offset: u32, value: u32, size: AccessSize) {
    for i in 0..size.bytes() {
        let Some(address) = offset.checked_add(i) else {
            break;
        };
        if let Some(byte) = data.get_mut(address as usize) {
            *byte = (value >> (8 * i)) as u8;
        }
    }
}
