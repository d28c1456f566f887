//! Fixed-timestep scheduling
use std::time::Duration;

/// Nominal CPU speed
pub const CLOCK_SPEED: u32 = 96_000;

/// Scheduler ticks per second
pub const TICK_RATE: u32 = 30;

/// Length of one tick, in milliseconds
pub const TICK_MS: f64 = 1000.0 / TICK_RATE as f64;

/// Cycles executed per tick, i.e. `round(CLOCK_SPEED / TICK_MS)`
pub const CYCLES_PER_TICK: usize =
    ((CLOCK_SPEED as u64 * TICK_RATE as u64 + 500) / 1000) as usize;

/// Accumulates wall time and converts it into whole ticks
///
/// This decouples the emulated CPU rate from however often the host calls
/// in; leftover time carries over into the next call.
#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    /// Time not yet converted into ticks, in milliseconds
    acc: f64,
}

impl Scheduler {
    /// Builds a scheduler with an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `elapsed` to the accumulator and returns the number of ticks due
    pub fn advance(&mut self, elapsed: Duration) -> usize {
        self.acc += elapsed.as_secs_f64() * 1000.0;
        let mut ticks = 0;
        while self.acc > TICK_MS {
            self.acc -= TICK_MS;
            ticks += 1;
        }
        ticks
    }

    /// Discards any accumulated time
    pub fn reset(&mut self) {
        self.acc = 0.0;
    }
}
