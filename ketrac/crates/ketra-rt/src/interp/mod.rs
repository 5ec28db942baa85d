//! The bytecode dispatcher and call machinery.

pub mod exec;
pub mod thread;

pub use thread::{Frame, Thread};

use crate::config::RuntimeConfig;
use crate::factory::Factory;
use crate::funcreg::FunctionRegister;
use crate::gc::{GcCollector, Registry};
use crate::segment::{ObjectSegment, PrimSegment};
use crate::trace::TraceTable;

/// Every piece of shared VM state the exec loop needs besides the thread
/// it is running. Bundled into one struct so `exec::run` doesn't take a
/// dozen separate borrows.
pub struct Machine<'a> {
    pub global_prim: &'a mut PrimSegment,
    pub global_obj: &'a mut ObjectSegment,
    pub const_prim: &'a PrimSegment,
    pub const_obj: &'a ObjectSegment,
    pub factory: &'a mut Factory,
    pub registry: &'a mut Registry,
    pub gc: &'a mut dyn GcCollector,
    pub funcreg: &'a FunctionRegister,
    pub trace: &'a mut TraceTable,
    pub config: &'a RuntimeConfig,
}

impl<'a> Machine<'a> {
    /// Run the collector one quantum if `auto_step` is enabled and the heap
    /// has grown past `max_heap_bytes`.
    pub fn maybe_step_gc(&mut self, roots: &[crate::object::ObjectRef]) {
        if self.config.gc.auto_step && self.registry.len() * std::mem::size_of::<crate::object::GcBox>()
            > self.config.gc.max_heap_bytes
        {
            self.gc.step(self.registry, roots);
        }
    }
}
