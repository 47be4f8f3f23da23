//! Provides a board built around a single HV2 core: main memory, a BIOS and the port I/O window.

use crate::address_range::InvalidBoundsError;
use crate::bus::{DeviceBus, MemoryDevice, SharedPortDevice, IO_WINDOW_BASE};
use crate::core::{Config as CoreConfig, Core};
use crate::resources::ram::Ram;
use crate::resources::rom::Rom;
use crate::AddressRange;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// Default physical base address of main memory.
pub const MEMORY_BASE: u32 = 0x8000_0000;

/// Default size of main memory (4 MiB).
pub const MEMORY_SIZE: u32 = 0x0040_0000;

/// Physical base address of the BIOS ROM, which is also the reset vector.
pub const BIOS_ROM_BASE: u32 = 0x0000_0000;

/// Physical base address of the scratch RAM available to the BIOS.
pub const BIOS_RAM_BASE: u32 = 0x0008_0000;

pub const BIOS_RAM_SIZE: u32 = 0x0001_0000;

#[derive(Debug, Clone)]
pub struct Config {
    /// Physical base address of main memory.
    pub memory_base: u32,
    /// Size of main memory in bytes.
    pub memory_size: u32,
    /// Contents of the BIOS ROM. Without an image no ROM is mapped.
    pub bios: Option<Vec<u8>>,
    /// Physical base address of the port I/O window.
    pub io_base: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_base: MEMORY_BASE,
            memory_size: MEMORY_SIZE,
            bios: None,
            io_base: IO_WINDOW_BASE,
        }
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum BoardError {
    #[error("{region} does not fit in the address space")]
    OutOfBounds {
        region: &'static str,
        #[source]
        source: InvalidBoundsError,
    },
    #[error("{region} overlaps {other}")]
    Overlap {
        region: &'static str,
        other: &'static str,
    },
}

impl BoardError {
    fn out_of_bounds(region: &'static str) -> impl FnOnce(InvalidBoundsError) -> Self {
        move |source| Self::OutOfBounds { region, source }
    }
}

/// Hardware platform made of one HV2 core and the memories it boots from.
///
/// The core resets into the BIOS at physical address `0`. Without a BIOS image, a program must be
/// loaded into memory and the program counter set by the host before stepping.
#[derive(Debug)]
pub struct Board {
    core: Core<DeviceBus>,
    memory: Rc<RefCell<Ram>>,
    bios_ram: Rc<RefCell<Ram>>,
    bios_rom: Option<Rc<RefCell<Rom>>>,
}

impl Board {
    pub fn new(config: Config) -> Result<Self, BoardError> {
        let memory = Rc::new(RefCell::new(
            Ram::new(config.memory_base, config.memory_size)
                .map_err(BoardError::out_of_bounds("main memory"))?,
        ));
        let bios_ram = Rc::new(RefCell::new(
            Ram::new(BIOS_RAM_BASE, BIOS_RAM_SIZE).map_err(BoardError::out_of_bounds("BIOS RAM"))?,
        ));
        let bios_rom = config
            .bios
            .as_deref()
            .map(|image| Rom::with_image(BIOS_ROM_BASE, image))
            .transpose()
            .map_err(BoardError::out_of_bounds("BIOS ROM"))?
            .map(|rom| Rc::new(RefCell::new(rom)));

        let mut bus = DeviceBus::new();
        bus.map_io_window(config.io_base)
            .map_err(BoardError::out_of_bounds("I/O window"))?;

        let mut regions = vec![
            ("main memory", memory.borrow().physical_range()),
            ("BIOS RAM", bios_ram.borrow().physical_range()),
        ];
        if let Some(rom) = &bios_rom {
            regions.push(("BIOS ROM", rom.borrow().physical_range()));
        }
        regions.extend(bus.io_window().map(|window| ("I/O window", window)));
        check_overlaps(&regions)?;

        bus.attach_memory(memory.clone());
        bus.attach_memory(bios_ram.clone());
        if let Some(rom) = &bios_rom {
            bus.attach_memory(rom.clone());
        }

        let core = Core::new(
            bus,
            CoreConfig {
                reset_vector: BIOS_ROM_BASE,
            },
        );

        Ok(Self {
            core,
            memory,
            bios_ram,
            bios_rom,
        })
    }

    pub fn core(&self) -> &Core<DeviceBus> {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut Core<DeviceBus> {
        &mut self.core
    }

    /// Physical range of main memory.
    pub fn memory_range(&self) -> AddressRange {
        self.memory.borrow().physical_range()
    }

    pub fn bios_rom(&self) -> Option<&Rc<RefCell<Rom>>> {
        self.bios_rom.as_ref()
    }

    /// Attach a device to the port I/O window.
    pub fn attach_port_device(&mut self, device: SharedPortDevice) {
        self.core.bus_mut().attach_ports(device);
    }

    /// Force board back to its reset state. The BIOS image is kept.
    pub fn reset(&mut self) {
        self.core.reset();
        self.memory.borrow_mut().reset();
        self.bios_ram.borrow_mut().reset();
    }

    /// Write a byte buffer into the physical address space.
    ///
    /// Only RAM is written, bytes that fall outside of it are ignored.
    pub fn load_physical(&mut self, base_address: u32, buf: &[u8]) {
        let start = base_address as u64;
        let end = start + buf.len() as u64;
        for ram in [&self.memory, &self.bios_ram] {
            let mut ram = ram.borrow_mut();
            let range = ram.physical_range();
            let overlap_start = start.max(range.start() as u64);
            let overlap_end = end.min(range.end());
            if overlap_start >= overlap_end {
                continue;
            }
            debug!("loading {} bytes at {overlap_start:#010x}", overlap_end - overlap_start);
            let slice = &buf[(overlap_start - start) as usize..(overlap_end - start) as usize];
            ram.load((overlap_start - range.start() as u64) as u32, slice);
        }
    }

    /// Advances the board by one cycle of the core.
    pub fn tick(&mut self) {
        self.core.step();
    }
}

/// Fails on the first pair of regions sharing an address.
fn check_overlaps(regions: &[(&'static str, AddressRange)]) -> Result<(), BoardError> {
    for (i, &(region, range)) in regions.iter().enumerate() {
        for &(other, other_range) in &regions[..i] {
            if range.overlaps(other_range) {
                return Err(BoardError::Overlap { region, other });
            }
        }
    }
    Ok(())
}
