//! The bytecode instruction set, its encoding, and the emission-side
//! builder.
//!
//! `ketra-gen` is the only crate that constructs a [`builder::BitcodeBuilder`];
//! everything downstream of it — disassembly, the interpreter — consumes
//! the flat `Vec<u64>` it produces plus the parallel debug-position table,
//! which together form the bytecode blob boundary between emission and
//! execution.

pub mod builder;
pub mod inst;
pub mod opcode;
pub mod value_slot;

pub use builder::BitcodeBuilder;
pub use inst::Instruction;
pub use opcode::{ArithOp, Comparator, Opcode, OopOp, Segment, Width};
pub use value_slot::{decode_value_slot, encode_value_slot};

use ketra_util::source::SourcePosition;

/// A compiled function body: instruction words plus one source position per
/// word, handed from `ketra-gen` across the boundary into
/// [`crate::object::shapes::NormalFunctionShape`].
#[derive(Debug, Clone)]
pub struct Blob {
    pub words: Vec<u64>,
    pub positions: Vec<SourcePosition>,
}

impl Blob {
    pub fn from_builder(builder: BitcodeBuilder) -> Self {
        let (words, positions) = builder.finish();
        Blob { words, positions }
    }

    pub fn decode_at(&self, pc: u32) -> Instruction {
        Instruction::decode(self.words[pc as usize])
    }

    pub fn position_at(&self, pc: u32) -> SourcePosition {
        self.positions.get(pc as usize).copied().unwrap_or(SourcePosition::UNKNOWN)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
