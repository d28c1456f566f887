//! Compiled program images
use std::collections::BTreeMap;

use crate::{asm::Assembly, isa::Opcode};

/// Big-endian `(high, low)` pair naming a 16-bit index
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Address {
    /// High byte
    pub high: u8,
    /// Low byte
    pub low: u8,
}

impl Address {
    /// Builds an address from its two bytes
    pub const fn new(high: u8, low: u8) -> Self {
        Self { high, low }
    }
}

impl From<u16> for Address {
    fn from(v: u16) -> Self {
        number_to_word(v)
    }
}

impl From<Address> for u16 {
    fn from(a: Address) -> u16 {
        word_to_number(a.high, a.low)
    }
}

/// Joins a big-endian byte pair into a 16-bit index
#[inline]
pub const fn word_to_number(high: u8, low: u8) -> u16 {
    u16::from_be_bytes([high, low])
}

/// Splits a 16-bit index into a big-endian [`Address`]
#[inline]
pub const fn number_to_word(v: u16) -> Address {
    let [high, low] = v.to_be_bytes();
    Address { high, low }
}

/// One decoded instruction, stored as two bytes
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Token {
    /// Opcode ordinal; see [`Opcode`]
    pub opcode: u8,
    /// Parameter byte
    pub parameter: u8,
}

impl Token {
    /// Builds a token from an opcode and parameter
    pub const fn new(op: Opcode, parameter: u8) -> Self {
        Self {
            opcode: op as u8,
            parameter,
        }
    }

    /// Returns the decoded opcode, if it is assigned
    pub fn op(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }

    /// Returns the serialized form `[opcode, parameter]`
    pub fn to_bytes(self) -> [u8; 2] {
        [self.opcode, self.parameter]
    }
}

/// Background image carried by a program
///
/// Compositing is left to the host; the VM never looks at the pixels.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Cutout {
    /// Width in pixels
    pub width: u16,
    /// Height in pixels
    pub height: u16,
    /// RGBA pixel data, row-major
    pub rgba: Vec<u8>,
}

/// A program image, ready to be loaded into an [`Engine`](crate::Engine)
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Program {
    /// Program name, which also keys its save data
    pub name: String,
    /// Author metadata
    pub author: String,
    /// References to icon images
    pub icons: Vec<String>,
    /// Optional background image
    pub cutout: Option<Cutout>,
    /// Initial storage contents, written before the tokens
    pub storage: Vec<u8>,
    /// Jump targets, keyed by label id
    pub labels: BTreeMap<u8, Address>,
    /// Instruction stream
    pub tokens: Vec<Token>,
}

impl Program {
    /// Builds an empty program with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    /// Assembles `source` into a program with the given name
    pub fn compile(name: &str, source: &str) -> Self {
        let mut out = Self::new(name);
        out.install(crate::asm::compile(source));
        out
    }

    /// Replaces the code of this program, keeping its metadata
    pub fn install(&mut self, asm: Assembly) {
        self.tokens = asm.tokens;
        self.labels = asm.labels;
    }

    /// Looks up the address of a label
    pub fn label(&self, id: u8) -> Option<Address> {
        self.labels.get(&id).copied()
    }
}
