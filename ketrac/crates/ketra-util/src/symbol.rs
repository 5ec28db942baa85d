//! String interning for identifiers seen by the lexer/parser/checker.
//!
//! `ketra`'s mutator is single-threaded end to end, so a plain `IndexSet`
//! keyed by `FxHasher` is enough, with no need for a concurrent map: O(1)
//! amortized interning, O(1) symbol comparison, and stable insertion order
//! for reproducible debug output.

use indexmap::IndexSet;
use rustc_hash::FxBuildHasher;
use std::fmt;

/// An interned identifier. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(u32);

impl Symbol {
    /// The raw interning index. Useful as a diagnostic id or a dense array
    /// key; never meaningful across two different `SymbolTable`s.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

/// Owns the backing strings for every `Symbol` handed out.
#[derive(Default)]
pub struct SymbolTable {
    strings: IndexSet<String, FxBuildHasher>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self { strings: IndexSet::with_hasher(FxBuildHasher) }
    }

    /// Intern `text`, returning the existing symbol if it was seen before.
    pub fn intern(&mut self, text: &str) -> Symbol {
        if let Some(index) = self.strings.get_index_of(text) {
            return Symbol(index as u32);
        }
        let (index, _) = self.strings.insert_full(text.to_owned());
        Symbol(index as u32)
    }

    /// Resolve a symbol back to its text. Panics if the symbol was not
    /// produced by this table (a correctness bug, never a user-facing error).
    pub fn resolve(&self, symbol: Symbol) -> &str {
        self.strings
            .get_index(symbol.0 as usize)
            .expect("symbol from a different SymbolTable")
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_interns_to_same_symbol() {
        let mut table = SymbolTable::new();
        let a = table.intern("hello");
        let b = table.intern("hello");
        let c = table.intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn resolve_round_trips() {
        let mut table = SymbolTable::new();
        let sym = table.intern("main");
        assert_eq!(table.resolve(sym), "main");
    }
}
