use std::time::Duration;

/// Per-worker capped exponential backoff: 1, 2, 4, ... up to the ceiling,
/// counted in `unit`s.
#[derive(Debug, Clone)]
pub struct Backoff {
    unit: Duration,
    ceiling_units: u32,
    current_units: u32,
}

impl Backoff {
    pub fn new(unit: Duration, ceiling_units: u32) -> Self {
        Self {
            unit,
            ceiling_units: ceiling_units.max(1),
            current_units: 1,
        }
    }

    pub fn current_units(&self) -> u32 {
        self.current_units
    }

    pub fn current(&self) -> Duration {
        self.unit * self.current_units
    }

    /// Returns the delay to wait now and doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current();
        self.current_units = self
            .current_units
            .saturating_mul(2)
            .min(self.ceiling_units);
        delay
    }

    pub fn reset(&mut self) {
        self.current_units = 1;
    }
}
