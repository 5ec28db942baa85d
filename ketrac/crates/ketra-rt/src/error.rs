//! Runtime error type.
//!
//! One `thiserror`-derived enum per externally observable failure mode,
//! plus a `Result` alias used throughout the crate.

use std::fmt;

use thiserror::Error;

use crate::object::Kind;

/// Process-visible exit status, returned by [`crate::vm::Vm::run`] on a
/// script-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok,
    RuntimeError,
    OutOfMemory,
    NativeError,
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitCode::Ok => "ok",
            ExitCode::RuntimeError => "runtime error",
            ExitCode::OutOfMemory => "out of memory",
            ExitCode::NativeError => "native error",
        };
        f.write_str(s)
    }
}

/// Every failure mode `ketra-rt` can surface to an embedder.
#[derive(Debug, Error)]
pub enum RtError {
    #[error("segment exhausted: requested {requested} bytes, capacity is {capacity}")]
    SegmentExhausted { requested: usize, capacity: usize },

    #[error("stack overflow: depth {depth} exceeds limit {limit}")]
    StackOverflow { depth: usize, limit: usize },

    #[error("stack underflow: popped past frame base")]
    StackUnderflow,

    #[error("heap allocation of {bytes} bytes failed under GcConfig::max_heap_bytes={limit}")]
    HeapExhausted { bytes: usize, limit: usize },

    #[error("type mismatch: expected {expected}, found {found:?}")]
    TypeMismatch { expected: &'static str, found: Kind },

    #[error("union does not hold the requested variant")]
    UnionUnboxMismatch,

    #[error("map key is not hashable: {0:?}")]
    UnhashableKey(Kind),

    #[error("undefined global slot {0}")]
    UndefinedGlobal(u32),

    #[error("call to unresolved function register entry {0}")]
    UnresolvedFunction(u32),

    #[error("native call signature {signature:?} rejected argument {index}: {reason}")]
    NativeSignatureMismatch { signature: &'static str, index: usize, reason: &'static str },

    #[error("native function {0:?} returned an error")]
    NativeCallFailed(String),

    #[error("array index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("division by zero")]
    DivideByZero,

    #[error("bytecode blob failed validation: {0}")]
    InvalidBlob(&'static str),

    #[error("collector observed a corrupted header on a live handle")]
    CorruptHeader,
}

pub type RtResult<T> = Result<T, RtError>;
