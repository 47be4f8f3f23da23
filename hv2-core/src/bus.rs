//! Physical address space: the device bus and the traits devices implement to be attached to it.

use crate::address_range::InvalidBoundsError;
use crate::{AccessSize, AddressRange};
use log::trace;
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

/// Value returned by reads that no device answers.
pub const OPEN_BUS: u32 = 0xFFFF_FFFF;

/// Default physical base address of the port I/O window.
pub const IO_WINDOW_BASE: u32 = 0x0004_0000;

/// Size of the port I/O window, one address per 16-bit port number.
pub const IO_WINDOW_SIZE: u32 = 0x0001_0000;

/// The kind of access requested from the MMU, used for protection checks.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum AccessType {
    Read,
    Write,
    Execute,
}

/// Physical side of the core: anything that can answer sized reads and writes to 32-bit physical
/// addresses.
///
/// Accesses can never fail. Values are little-endian, and read results are already truncated to
/// the requested size (except for [`AccessSize::Exec`], which always carries a full word).
pub trait Bus: Debug {
    fn read(&mut self, address: u32, size: AccessSize) -> u32;

    fn write(&mut self, address: u32, value: u32, size: AccessSize);
}

/// A device occupying a contiguous range of the physical address space.
///
/// Addresses passed to [`read`](Self::read) and [`write`](Self::write) are relative to the start
/// of [`physical_range`](Self::physical_range).
pub trait MemoryDevice: Debug {
    fn physical_range(&self) -> AddressRange;

    fn read(&mut self, offset: u32, size: AccessSize) -> u32;

    fn write(&mut self, offset: u32, value: u32, size: AccessSize);
}

/// A device answering to a set of discrete 16-bit I/O ports.
pub trait PortDevice: Debug {
    fn ports(&self) -> &[u16];

    fn read(&mut self, port: u16, size: AccessSize) -> u32;

    fn write(&mut self, port: u16, value: u32, size: AccessSize);
}

pub type SharedMemoryDevice = Rc<RefCell<dyn MemoryDevice>>;
pub type SharedPortDevice = Rc<RefCell<dyn PortDevice>>;

/// Dispatches physical accesses to attached devices.
///
/// Devices are owned by whoever assembles the system, the bus only holds shared handles to them.
/// Memory devices are matched by address range and port devices by port number, in both cases the
/// device attached first wins when several match.
#[derive(Debug, Default)]
pub struct DeviceBus {
    memory_devices: Vec<SharedMemoryDevice>,
    port_devices: Vec<SharedPortDevice>,
    io_window: Option<AddressRange>,
}

impl DeviceBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_memory(&mut self, device: SharedMemoryDevice) {
        trace!("attaching memory device at {}", device.borrow().physical_range());
        self.memory_devices.push(device);
    }

    pub fn attach_ports(&mut self, device: SharedPortDevice) {
        trace!("attaching port device on ports {:x?}", device.borrow().ports());
        self.port_devices.push(device);
    }

    /// Forward physical accesses in `[base, base + 0x10000)` to the port devices, with
    /// `port = address - base`.
    ///
    /// The window takes precedence over memory devices.
    pub fn map_io_window(&mut self, base: u32) -> Result<(), InvalidBoundsError> {
        self.io_window = Some(AddressRange::with_size(base, IO_WINDOW_SIZE)?);
        Ok(())
    }

    pub fn io_window(&self) -> Option<AddressRange> {
        self.io_window
    }

    /// Reads from the port device owning `port`, or returns [`OPEN_BUS`] if there is none.
    pub fn read_port(&mut self, port: u16, size: AccessSize) -> u32 {
        match self.port_device(port) {
            Some(device) => device.borrow_mut().read(port, size) & size.mask(),
            None => OPEN_BUS,
        }
    }

    /// Writes to the port device owning `port`. Writes to unowned ports are dropped.
    pub fn write_port(&mut self, port: u16, value: u32, size: AccessSize) {
        if let Some(device) = self.port_device(port) {
            device.borrow_mut().write(port, value & size.mask(), size);
        }
    }

    fn port_device(&self, port: u16) -> Option<&SharedPortDevice> {
        self.port_devices
            .iter()
            .find(|device| device.borrow().ports().contains(&port))
    }

    /// Returns the first memory device containing `address` along with the offset of `address`
    /// within it.
    fn memory_device(&self, address: u32) -> Option<(&SharedMemoryDevice, u32)> {
        self.memory_devices.iter().find_map(|device| {
            let offset = device.borrow().physical_range().offset_of(address)?;
            Some((device, offset))
        })
    }

    fn io_port(&self, address: u32) -> Option<u16> {
        self.io_window?.offset_of(address).map(|offset| offset as u16)
    }
}

impl Bus for DeviceBus {
    fn read(&mut self, address: u32, size: AccessSize) -> u32 {
        if let Some(port) = self.io_port(address) {
            return self.read_port(port, size);
        }
        match self.memory_device(address) {
            Some((device, offset)) => device.borrow_mut().read(offset, size) & size.mask(),
            None => OPEN_BUS,
        }
    }

    fn write(&mut self, address: u32, value: u32, size: AccessSize) {
        if let Some(port) = self.io_port(address) {
            self.write_port(port, value, size);
            return;
        }
        match self.memory_device(address) {
            Some((device, offset)) => device.borrow_mut().write(offset, value & size.mask(), size),
            None => trace!("dropping write of {value:#x} to unmapped address {address:#010x}"),
        }
    }
}
