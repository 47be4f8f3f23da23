//! Derives a slower clock from a master clock.

/// Divides a master clock of `master_hz` down to `hz`.
///
/// The ratio need not be an integer: over any `master_hz` master ticks, exactly `hz` of them
/// produce a tick of the derived clock. A derived clock at least as fast as the master one ticks
/// on every master tick.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ClockDivider {
    master_hz: u64,
    hz: u64,
    elapsed: u64,
}

impl ClockDivider {
    pub fn new(master_hz: u64, hz: u64) -> Self {
        Self {
            master_hz,
            hz: hz.min(master_hz),
            elapsed: 0,
        }
    }

    pub fn hz(&self) -> u64 {
        self.hz
    }

    /// Advances the master clock by one tick, returning `true` if the derived clock ticks too.
    pub fn tick(&mut self) -> bool {
        self.elapsed += self.hz;
        if self.elapsed >= self.master_hz && self.hz > 0 {
            self.elapsed -= self.master_hz;
            true
        } else {
            false
        }
    }
}
