//! TamaGo virtual machine
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod asm;
pub mod clock;
pub mod engine;
pub mod isa;
pub mod memory;
pub mod program;
pub mod save;

pub use asm::{compile, Assembly};
pub use clock::{Scheduler, CLOCK_SPEED, CYCLES_PER_TICK, TICK_MS, TICK_RATE};
pub use engine::{Engine, Renderer, State, PALETTE};
pub use isa::{Opcode, Register};
pub use memory::{Memory, MemoryMap, Region, Storage};
pub use program::{
    number_to_word, word_to_number, Address, Cutout, Program, Token,
};
pub use save::{EmptyStore, SaveRecord, Store, SAVE_RECORD_KEY};

/// Byte written for a true flag
pub const HIGH: u8 = 0xff;

/// Byte written for a false flag
pub const LOW: u8 = 0;

/// Checks whether a byte reads as a true flag
///
/// Anything non-zero is high, so flags written by programs with `SET 1` work
/// the same as ones written by the engine.
#[inline]
pub const fn value_is_high(v: u8) -> bool {
    v >= 1
}
