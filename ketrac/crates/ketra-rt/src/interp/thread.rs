//! A single Ketra thread: its primitive/object stacks and call frames.

use crate::config::RuntimeConfig;
use crate::object::{ObjectRef, Slot};
use crate::profiler::Callee;
use crate::stack::{ObjectStack, PrimStack};

/// One activation record. `base_prim`/`base_obj` are the index into the
/// thread's stacks where this frame's locals begin; `result_prim_slot`/
/// `result_obj_slot` say where the caller wants the return value written.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub callee: ObjectRef,
    pub pc: u32,
    pub base_prim: usize,
    pub base_obj: usize,
    pub result_is_object: bool,
    pub result_slot: u16,
}

pub struct Thread {
    pub prim: PrimStack,
    pub obj: ObjectStack,
    pub frames: Vec<Frame>,
    pub callee_probe: Callee,
}

impl Thread {
    pub fn new(config: &RuntimeConfig) -> Self {
        Thread {
            prim: PrimStack::with_capacity_bytes(config.initial_stack_bytes),
            obj: ObjectStack::with_capacity_bytes(config.initial_stack_bytes),
            frames: Vec::with_capacity(config.max_stack_frames.min(256)),
            callee_probe: Callee::new(),
        }
    }

    pub fn current_frame(&self) -> &Frame {
        self.frames.last().expect("exec loop never runs with an empty frame stack")
    }

    pub fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("exec loop never runs with an empty frame stack")
    }

    /// Every object-stack slot across every live frame: the thread's GC
    /// root set.
    pub fn roots(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.obj.roots().chain(self.frames.iter().map(|f| f.callee))
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
        self.callee_probe.set(0, frame.pc);
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn local_prim(&self, slot: i32) -> crate::error::RtResult<u64> {
        let base = self.current_frame().base_prim;
        self.prim.get(index_from_base(base, slot))
    }

    pub fn set_local_prim(&mut self, slot: i32, value: u64) -> crate::error::RtResult<()> {
        let base = self.current_frame().base_prim;
        self.prim.set(index_from_base(base, slot), value)
    }

    pub fn local_obj(&self, slot: i32) -> crate::error::RtResult<Option<ObjectRef>> {
        let base = self.current_frame().base_obj;
        self.obj.get(index_from_base(base, slot))
    }

    pub fn set_local_obj(&mut self, slot: i32, value: Option<ObjectRef>) -> crate::error::RtResult<()> {
        let base = self.current_frame().base_obj;
        self.obj.set(index_from_base(base, slot), value)
    }

    pub fn local_slot(&self, is_object: bool, slot: i32) -> crate::error::RtResult<Slot> {
        if is_object {
            Ok(Slot::Obj(self.local_obj(slot)?))
        } else {
            Ok(Slot::Prim(self.local_prim(slot)?))
        }
    }

    /// Render every live frame, innermost first, with a short hex window of
    /// its locals (see [`crate::stack::PrimStack::dump_hex`]). Debug tooling
    /// only; the symbol table lives on [`crate::vm::Vm`], not here, so
    /// frames are labeled by their callee's raw symbol id.
    #[cfg(debug_assertions)]
    pub fn backtrace(&self) -> String {
        use std::fmt::Write as _;
        use crate::object::ObjectPayload;

        let mut out = String::new();
        for (depth, frame) in self.frames.iter().rev().enumerate() {
            let label = match frame.callee.payload() {
                ObjectPayload::NormalFunction(shape) => format!("fn#{}", shape.name.as_u32()),
                ObjectPayload::NativeFunction(_) => "<native>".to_string(),
                ObjectPayload::Closure(_) => "<closure>".to_string(),
                other => format!("<unexpected callable {other:?}>"),
            };
            let _ = writeln!(
                out,
                "#{depth} {label} pc={} base_prim={} base_obj={}",
                frame.pc, frame.base_prim, frame.base_obj
            );
            let prim_end = self.prim.len();
            if frame.base_prim < prim_end {
                out.push_str(&self.prim.dump_hex(frame.base_prim, prim_end));
            }
        }
        out
    }
}

fn index_from_base(base: usize, slot: i32) -> usize {
    (base as i64 + slot as i64) as usize
}
