//! Virtual to physical address translation.
//!
//! The MMU (COP4) holds one mapping table per privilege level. Only the *active* table is
//! consulted, which one that is is selected by the control word, and may follow privilege level
//! transitions if the remap policy is set.

use super::trap::Exception;
use crate::bus::AccessType;
use crate::{AccessSize, Alignment};
use bitvec::{field::BitField, order::Lsb0, view::BitView};
use thiserror::Error;

/// Number of mapping tables, one per privilege level.
pub const MAP_COUNT: usize = 4;

/// Number of entries in each mapping table.
pub const MAP_ENTRIES: usize = 32;

/// Number of 32-bit words an entry occupies in the coprocessor register space.
pub const WORDS_PER_ENTRY: usize = 4;

const_assert_eq!(MAP_COUNT, 1 << (idx::ACTIVE_MAP_END - idx::ACTIVE_MAP_START));

/// Permission bits of a mapping entry. They have the same layout as ELF segment flags.
pub mod attribute {
    pub const EXECUTE: u32 = 0x1;
    pub const WRITE: u32 = 0x2;
    pub const READ: u32 = 0x4;
}

/// A contiguous range of virtual addresses mapped onto physical memory.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct MappingEntry {
    pub physical_base: u32,
    pub virtual_base: u32,
    pub size: u32,
    pub attributes: u32,
}

impl MappingEntry {
    /// Returns `true` if `virtual_base <= address < virtual_base + size`.
    ///
    /// An entry of size zero never matches.
    pub fn contains(&self, address: u32) -> bool {
        address.wrapping_sub(self.virtual_base) < self.size && address >= self.virtual_base
    }

    /// Translates `address`, assuming the entry [`contains`](Self::contains) it.
    pub fn translate(&self, address: u32) -> u32 {
        self.physical_base
            .wrapping_add(address.wrapping_sub(self.virtual_base))
    }

    pub fn allows(&self, access_type: AccessType) -> bool {
        let required = match access_type {
            AccessType::Read => attribute::READ,
            AccessType::Write => attribute::WRITE,
            AccessType::Execute => attribute::EXECUTE,
        };
        self.attributes & required != 0
    }

    /// Returns `true` for slots that hold no mapping.
    pub fn is_vacant(&self) -> bool {
        self.size == 0
    }

    /// Returns one of the four words through which the entry is exposed to software.
    pub fn word(&self, field: EntryField) -> u32 {
        match field {
            EntryField::PhysicalBase => self.physical_base,
            EntryField::VirtualBase => self.virtual_base,
            EntryField::Size => self.size,
            EntryField::Attributes => self.attributes,
        }
    }

    pub fn set_word(&mut self, field: EntryField, value: u32) {
        match field {
            EntryField::PhysicalBase => self.physical_base = value,
            EntryField::VirtualBase => self.virtual_base = value,
            EntryField::Size => self.size = value,
            EntryField::Attributes => self.attributes = value,
        }
    }
}

/// The words of a [`MappingEntry`], in the order they appear in the coprocessor register space.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum EntryField {
    PhysicalBase = 0,
    VirtualBase = 1,
    Size = 2,
    Attributes = 3,
}

impl EntryField {
    /// Convert a 2-bit value into an [`EntryField`].
    /// Panics if the value doesn't fit in 2 bits (`0..=3`).
    pub fn from_u2(value_u2: usize) -> Self {
        match value_u2 {
            0 => Self::PhysicalBase,
            1 => Self::VirtualBase,
            2 => Self::Size,
            3 => Self::Attributes,
            _ => panic!("out of range u2 used"),
        }
    }
}

/// One privilege level's set of mapping entries.
///
/// Entries are searched in order and the first one containing an address wins. Overlapping
/// entries are not rejected.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct MappingTable {
    entries: [MappingEntry; MAP_ENTRIES],
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[MappingEntry; MAP_ENTRIES] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [MappingEntry; MAP_ENTRIES] {
        &mut self.entries
    }

    /// Returns the first entry containing `address`.
    pub fn lookup(&self, address: u32) -> Option<&MappingEntry> {
        self.entries.iter().find(|entry| entry.contains(address))
    }

    /// Stores `entry` in the first vacant slot, returning the slot's index.
    pub fn insert(&mut self, entry: MappingEntry) -> Result<usize, MapFullError> {
        let (index, slot) = self
            .entries
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_vacant())
            .ok_or(MapFullError)?;
        *slot = entry;
        Ok(index)
    }

    pub fn clear(&mut self) {
        self.entries = Default::default();
    }
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
#[error("all {MAP_ENTRIES} entries of the mapping table are in use")]
pub struct MapFullError;

/// The MMU control word.
///
/// Bits that have no defined meaning read back as written.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct MmuControl(u32);

impl MmuControl {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn read(&self) -> u32 {
        self.0
    }

    pub fn write(&mut self, value: u32) {
        self.0 = value;
    }

    /// Returns `true` if translation is enabled.
    pub fn enabled(&self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::ENABLE]
    }

    pub fn set_enabled(&mut self, value: bool) {
        self.0.view_bits_mut::<Lsb0>().set(idx::ENABLE, value);
    }

    /// Returns `true` if entering privilege level 1 enables translation.
    pub fn enable_on_pl1(&self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::ENABLE_ON_PL1]
    }

    pub fn set_enable_on_pl1(&mut self, value: bool) {
        self.0.view_bits_mut::<Lsb0>().set(idx::ENABLE_ON_PL1, value);
    }

    /// Returns `true` if entering privilege level 0 disables translation.
    pub fn disable_on_pl0(&self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::DISABLE_ON_PL0]
    }

    pub fn set_disable_on_pl0(&mut self, value: bool) {
        self.0.view_bits_mut::<Lsb0>().set(idx::DISABLE_ON_PL0, value);
    }

    /// Returns `true` if a privilege level transition selects that level's map as active map.
    pub fn remap_on_transition(&self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::REMAP_ON_TRANSITION]
    }

    pub fn set_remap_on_transition(&mut self, value: bool) {
        self.0
            .view_bits_mut::<Lsb0>()
            .set(idx::REMAP_ON_TRANSITION, value);
    }

    /// Returns `true` if misaligned short and long accesses raise an exception.
    pub fn misalignment_exception(&self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::MISALIGNMENT_EXCEPTION]
    }

    pub fn set_misalignment_exception(&mut self, value: bool) {
        self.0
            .view_bits_mut::<Lsb0>()
            .set(idx::MISALIGNMENT_EXCEPTION, value);
    }

    /// Index of the mapping table used for translation.
    pub fn active_map(&self) -> usize {
        self.0.view_bits::<Lsb0>()[idx::ACTIVE_MAP_START..idx::ACTIVE_MAP_END].load_le::<usize>()
    }

    /// Selects the active mapping table.
    /// Panics if `index` doesn't fit in 2 bits (`0..=3`).
    pub fn set_active_map(&mut self, index: usize) {
        assert!(index < MAP_COUNT, "out of range map index used");
        self.0.view_bits_mut::<Lsb0>()[idx::ACTIVE_MAP_START..idx::ACTIVE_MAP_END]
            .store_le(index);
    }
}

/// Bit positions of the MMU control word fields.
pub mod idx {
    pub const ENABLE: usize = 0;
    pub const ENABLE_ON_PL1: usize = 8;
    pub const DISABLE_ON_PL0: usize = 9;
    pub const REMAP_ON_TRANSITION: usize = 10;
    pub const MISALIGNMENT_EXCEPTION: usize = 11;
    pub const ACTIVE_MAP_START: usize = 12;
    pub const ACTIVE_MAP_END: usize = 14;
}

/// The MMU state: its control word and the mapping tables.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Mmu {
    control: MmuControl,
    maps: [MappingTable; MAP_COUNT],
}

impl Mmu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn control(&self) -> &MmuControl {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut MmuControl {
        &mut self.control
    }

    pub fn map(&self, index: usize) -> &MappingTable {
        &self.maps[index]
    }

    pub fn map_mut(&mut self, index: usize) -> &mut MappingTable {
        &mut self.maps[index]
    }

    pub fn active_map(&self) -> &MappingTable {
        &self.maps[self.control.active_map()]
    }

    pub fn active_map_mut(&mut self) -> &mut MappingTable {
        let index = self.control.active_map();
        &mut self.maps[index]
    }

    /// Translates a virtual address to a physical one for an access of `size` and `access_type`.
    ///
    /// With translation disabled the address is passed through unchanged. Otherwise, the active
    /// map is searched and the entry's permissions checked. In both cases instruction fetches must
    /// be word-aligned, and shorts and longs must be naturally aligned if the misalignment policy
    /// is set.
    pub fn translate(
        &self,
        address: u32,
        size: AccessSize,
        access_type: AccessType,
    ) -> Result<u32, Exception> {
        let physical = if self.control.enabled() {
            let entry = self
                .active_map()
                .lookup(address)
                .ok_or(Exception::NoMapping)?;
            if !entry.allows(access_type) {
                return Err(match access_type {
                    AccessType::Read => Exception::ReadProtection,
                    AccessType::Write => Exception::WriteProtection,
                    AccessType::Execute => Exception::ExecProtection,
                });
            }
            entry.translate(address)
        } else {
            address
        };

        match size {
            AccessSize::Exec if !Alignment::LONG.is_aligned(physical) => {
                Err(Exception::FetchMisaligned)
            }
            AccessSize::Short | AccessSize::Long
                if self.control.misalignment_exception()
                    && !size.alignment().is_aligned(physical) =>
            {
                Err(Exception::DataMisaligned)
            }
            _ => Ok(physical),
        }
    }
}
