use bitvec::{order::Lsb0, view::BitView};

/// The two general control/status words of COP0.
///
/// Only control word 0 has defined flags. Control word 1 is plain storage, reserved for future
/// use, and reads back whatever was written to it.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Control {
    cr0: u32,
    cr1: u32,
}

impl Control {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_cr0(&self) -> u32 {
        self.cr0
    }

    pub fn write_cr0(&mut self, value: u32) {
        self.cr0 = value;
    }

    pub fn read_cr1(&self) -> u32 {
        self.cr1
    }

    pub fn write_cr1(&mut self, value: u32) {
        self.cr1 = value;
    }

    /// Returns `true` if the stacked ISR mode flag is set.
    pub fn stacked_isr(&self) -> bool {
        self.cr0.view_bits::<Lsb0>()[idx::STACKED_ISR]
    }

    /// Returns `true` if interrupts flush the pipeline.
    pub fn flush_on_interrupt(&self) -> bool {
        self.cr0.view_bits::<Lsb0>()[idx::FLUSH_ON_INTERRUPT]
    }

    /// Returns `true` if the stall-on-access flag is set.
    pub fn stall_on_access(&self) -> bool {
        self.cr0.view_bits::<Lsb0>()[idx::STALL_ON_ACCESS]
    }

    /// Returns `true` if branches, writes to the PC, and exception entries flush the pipeline.
    pub fn flush_on_flow_transfer(&self) -> bool {
        self.cr0.view_bits::<Lsb0>()[idx::FLUSH_ON_FLOW_TRANSFER]
    }

    pub fn set_flush_on_flow_transfer(&mut self, value: bool) {
        self.cr0
            .view_bits_mut::<Lsb0>()
            .set(idx::FLUSH_ON_FLOW_TRANSFER, value);
    }
}

/// Bit positions of the flags in control word 0.
pub mod idx {
    pub const STACKED_ISR: usize = 0;
    pub const FLUSH_ON_INTERRUPT: usize = 1;
    pub const STALL_ON_ACCESS: usize = 2;
    pub const FLUSH_ON_FLOW_TRANSFER: usize = 3;
}
