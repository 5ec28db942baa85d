//! Source positions, threaded from the lexer through to `NormalFunction`
//! debug info.

use std::fmt;

/// A single point in a source file, 1-based like every other tool in the
/// toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

impl SourcePosition {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// The position debug-info tables use for instructions the compiler
    /// could not attribute to source text (e.g. an implicit `ret`).
    pub const UNKNOWN: SourcePosition = SourcePosition { line: 0, column: 0 };
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
