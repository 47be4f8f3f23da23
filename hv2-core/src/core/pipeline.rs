/// Number of instruction words in flight.
pub const DEPTH: usize = 3;

/// The fetch pipeline, a shift register of raw instruction words.
///
/// Newly fetched words enter slot `0`. The word in slot `DEPTH - 1` is the one executed in the
/// current cycle. A flushed slot holds `0`, which decodes as a no-op.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Pipeline {
    slots: [u32; DEPTH],
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shifts every slot one position down and stores `raw_instruction` into slot `0`.
    pub fn shift_in(&mut self, raw_instruction: u32) {
        self.slots.copy_within(0..DEPTH - 1, 1);
        self.slots[0] = raw_instruction;
    }

    /// The word to execute this cycle.
    pub fn executing(&self) -> u32 {
        self.slots[DEPTH - 1]
    }

    /// Drops all in-flight words.
    pub fn flush(&mut self) {
        self.slots = [0; DEPTH];
    }

    pub fn slots(&self) -> &[u32; DEPTH] {
        &self.slots
    }
}
