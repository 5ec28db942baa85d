//! ketra-rt — the execution runtime for the Ketra scripting language.
//!
//! This crate is the execution core: a growable primitive
//! stack and object stack per thread, two global segments, a heap object
//! model with an atomic header word, an object factory, a reflected-type
//! table, a function register, an incremental generational mark-sweep
//! collector (`MSG`), the bytecode instruction set and its interpreter, and
//! the native-call bridge. Lexing, parsing, type inference and bytecode
//! emission live in sibling crates and are treated here only as producers of
//! the bytecode blob boundary in [`bytecode::blob`].
//!
//! ## Module map
//!
//! - [`stack`] / [`segment`]: the growable byte buffers everything else is
//!   built on.
//! - [`object`]: heap object headers and shapes.
//! - [`factory`]: allocation of every heap object kind.
//! - [`reflect`]: the reflected-type table.
//! - [`funcreg`]: function name → global slot / native binding.
//! - [`bytecode`]: the instruction encoding and the emission-boundary builder.
//! - [`gc`]: the incremental two-generation mark-sweep collector.
//! - [`interp`]: the bytecode dispatcher and call machinery.
//! - [`native`]: the signature-directed native-call bridge.
//! - [`trace`]: per-function loop/guard hit counters.
//! - [`profiler`]: the sampling profiler.
//! - [`vm`]: the embedding surface.

pub mod bytecode;
pub mod config;
pub mod error;
pub mod factory;
pub mod funcreg;
pub mod gc;
pub mod interp;
pub mod logging;
pub mod native;
pub mod object;
pub mod profiler;
pub mod reflect;
pub mod segment;
pub mod stack;
pub mod trace;
pub mod vm;

pub use config::RuntimeConfig;
pub use error::{ExitCode, RtError};
pub use vm::Vm;
