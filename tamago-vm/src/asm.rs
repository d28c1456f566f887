//! Line-oriented assembler
//!
//! Every kept line becomes exactly one token, so a label's line index is also
//! the index of the token it refers to.  Nothing in the source can make
//! compilation fail: unknown names and malformed numbers become `0` (or
//! `NOP`, for opcodes).
//!
//! ```text
//! # comment
//! $SPEED 4        constant definition
//! :LOOP           label declaration
//! PUSH $SPEED     instruction with a parameter
//! JUMP LOOP
//! ```
//!
//! Labels must be declared before the jumps that use them; a forward
//! reference resolves to label id 0.
use std::collections::{BTreeMap, HashMap};

use crate::{
    isa::{Opcode, Register},
    program::{number_to_word, Address, Token},
};

/// Output of [`compile`]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Assembly {
    /// One token per kept source line
    pub tokens: Vec<Token>,
    /// Label id to token address
    pub labels: BTreeMap<u8, Address>,
}

/// Parses an integer literal
///
/// Accepts an optional sign followed by a decimal number or a `0x`, `0o` or
/// `0b` prefixed number.
fn parse_number(s: &str) -> Option<i64> {
    let (neg, s) = match s.strip_prefix('-') {
        Some(s) => (true, s),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if s.starts_with(['+', '-']) {
        return None;
    }
    let v = if let Some(h) = s.strip_prefix("0x").or(s.strip_prefix("0X")) {
        i64::from_str_radix(h, 16)
    } else if let Some(o) = s.strip_prefix("0o").or(s.strip_prefix("0O")) {
        i64::from_str_radix(o, 8)
    } else if let Some(b) = s.strip_prefix("0b").or(s.strip_prefix("0B")) {
        i64::from_str_radix(b, 2)
    } else {
        s.parse::<i64>()
    }
    .ok()?;
    if neg {
        v.checked_neg()
    } else {
        Some(v)
    }
}

/// Reduces an integer to a parameter byte
fn to_byte(v: i64) -> u8 {
    v.rem_euclid(256) as u8
}

/// Splits a line into its instruction word and optional parameter word
fn split(line: &str) -> (&str, Option<&str>) {
    let mut words = line.split_whitespace();
    let word = words.next().unwrap_or("");
    (word, words.next())
}

/// Returns the source lines that carry code, in order
fn code_lines(source: &str) -> Vec<&str> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Assembles source text into tokens and a label table
pub fn compile(source: &str) -> Assembly {
    let lines = code_lines(source);

    let mut constants: HashMap<String, i64> = HashMap::new();
    for line in &lines {
        let (word, param) = split(line);
        if word.starts_with('$') {
            let value = param.and_then(parse_number).unwrap_or(0);
            constants.insert(word.to_ascii_uppercase(), value);
        }
    }

    let mut out = Assembly::default();
    let mut label_ids: HashMap<String, u8> = HashMap::new();
    for (i, line) in lines.iter().enumerate() {
        let (word, raw) = split(line);
        let number = match raw {
            None => Some(0),
            Some(p) if p.starts_with('$') => {
                let v = constants.get(&p.to_ascii_uppercase()).copied();
                Some(v.unwrap_or(0))
            }
            Some(p) => parse_number(p),
        };

        if let Some(name) = word.strip_prefix(':') {
            let id = (out.labels.len() % 256) as u8;
            out.labels.insert(id, number_to_word(i as u16));
            label_ids.insert(name.to_ascii_uppercase(), id);
            let parameter = number.map(to_byte).unwrap_or(0);
            out.tokens.push(Token::new(Opcode::NOP, parameter));
            continue;
        }

        let op = Opcode::from_name(word).unwrap_or(Opcode::NOP);
        let parameter = if op.is_jump() {
            raw.and_then(|p| label_ids.get(&p.to_ascii_uppercase()))
                .copied()
                .unwrap_or(0)
        } else {
            match (number, raw) {
                (Some(v), _) => to_byte(v),
                (None, Some(p)) => {
                    Register::from_name(p).map(|r| r as u8).unwrap_or(0)
                }
                (None, None) => 0,
            }
        };
        out.tokens.push(Token::new(op, parameter));
    }
    out
}
