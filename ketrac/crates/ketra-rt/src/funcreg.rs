//! The function register: maps a function's interned name to
//! the global object-segment slot holding its callable (a `NormalFunction`,
//! `Closure`, or `NativeFunction` object).
//!
//! Calls to a registered name are dispatched through its callable object,
//! which is either interpreted bytecode or a native trampoline built by
//! [`crate::native`]; there is no JIT trampoline codegen here.

use rustc_hash::FxHashMap;

use ketra_util::symbol::Symbol;

use crate::error::{RtError, RtResult};
use crate::object::ObjectRef;

/// Where a registered function's callable object lives.
#[derive(Debug, Clone, Copy)]
pub struct FunctionEntry {
    pub global_object_slot: u32,
    pub callable: ObjectRef,
}

/// Name-keyed table of every function known to a running program, built
/// incrementally as modules link in `NormalFunction`/`NativeFunction`
/// objects.
#[derive(Default)]
pub struct FunctionRegister {
    by_name: FxHashMap<Symbol, FunctionEntry>,
}

impl FunctionRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: Symbol, global_object_slot: u32, callable: ObjectRef) {
        self.by_name.insert(name, FunctionEntry { global_object_slot, callable });
    }

    pub fn lookup(&self, name: Symbol) -> RtResult<FunctionEntry> {
        self.by_name
            .get(&name)
            .copied()
            .ok_or(RtError::UnresolvedFunction(name.as_u32()))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Every registered name paired with its entry, in unspecified order.
    /// Used by [`crate::vm::Vm::disassemble_all`]; iteration order isn't
    /// part of this type's contract, so callers that need stable output
    /// sort by name themselves.
    pub fn iter(&self) -> impl Iterator<Item = (Symbol, FunctionEntry)> + '_ {
        self.by_name.iter().map(|(&name, &entry)| (name, entry))
    }
}
