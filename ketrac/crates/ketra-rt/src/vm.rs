//! The embedding surface: construct a [`Vm`], link functions
//! into it, and call them.

use ketra_util::symbol::{Symbol, SymbolTable};

use crate::config::RuntimeConfig;
use crate::error::RtResult;
use crate::factory::Factory;
use crate::funcreg::FunctionRegister;
use crate::gc::{GcCollector, Msg, Registry};
use crate::interp::{exec, Frame, Machine, Thread};
use crate::object::{ObjectPayload, ObjectRef, Slot};
use crate::profiler::Profiler;
use crate::segment::{ObjectSegment, PrimSegment};
use crate::trace::TraceTable;

/// A running instance of the language: the global segments, heap, function
/// register, and collector an embedder needs one of per isolated program.
pub struct Vm {
    config: RuntimeConfig,
    pub symbols: SymbolTable,
    global_prim: PrimSegment,
    global_obj: ObjectSegment,
    const_prim: PrimSegment,
    const_obj: ObjectSegment,
    factory: Factory,
    registry: Registry,
    gc: Box<dyn GcCollector>,
    funcreg: FunctionRegister,
    trace: TraceTable,
    profiler: Option<Profiler>,
    /// Set by [`Vm::call`] whenever a run fails, so an embedder can inspect
    /// how the stack looked at the moment of the error. Debug tooling only.
    #[cfg(debug_assertions)]
    last_backtrace: Option<String>,
}

impl Vm {
    pub fn new(config: RuntimeConfig) -> Self {
        let profiler = if config.enable_profiler {
            Some(Profiler::start(
                crate::profiler::Callee::new(),
                std::time::Duration::from_micros(config.profiler_interval_micros),
            ))
        } else {
            None
        };
        Vm {
            global_prim: PrimSegment::with_capacity(config.initial_segment_bytes),
            global_obj: ObjectSegment::with_capacity(config.initial_segment_bytes),
            const_prim: PrimSegment::with_capacity(config.initial_segment_bytes),
            const_obj: ObjectSegment::with_capacity(config.initial_segment_bytes),
            factory: Factory::new(),
            registry: Registry::new(),
            gc: Box::new(Msg::new(config.gc.clone())),
            funcreg: FunctionRegister::new(),
            trace: TraceTable::new(),
            profiler,
            symbols: SymbolTable::new(),
            config,
            #[cfg(debug_assertions)]
            last_backtrace: None,
        }
    }

    /// Build a `Vm` with [`crate::gc::NoopCollector`] instead of the real
    /// collector — used by tests that want to assert interpreter behavior
    /// independent of collection timing.
    pub fn with_noop_collector(config: RuntimeConfig) -> Self {
        let mut vm = Vm::new(config);
        vm.gc = Box::new(crate::gc::NoopCollector::new());
        vm
    }

    pub fn intern(&mut self, text: &str) -> Symbol {
        self.symbols.intern(text)
    }

    pub fn alloc_str(&mut self, text: &str) -> ObjectRef {
        self.factory.alloc_str(&mut self.registry, text)
    }

    pub fn register_function(&mut self, name: Symbol, global_object_slot: u32, callable: ObjectRef) {
        self.global_obj.ensure_len(global_object_slot as usize + 1);
        self.global_obj.set(global_object_slot, Some(callable)).ok();
        self.funcreg.register(name, global_object_slot, callable);
    }

    pub fn register_native(
        &mut self,
        name: Symbol,
        signature: &'static str,
        func: crate::native::NativeFn,
        global_object_slot: u32,
    ) -> ObjectRef {
        let obj = self.factory.alloc_native_function(&mut self.registry, name, signature, func);
        self.register_function(name, global_object_slot, obj);
        obj
    }

    pub fn alloc_normal_function(
        &mut self,
        shape: crate::object::shapes::NormalFunctionShape,
    ) -> ObjectRef {
        self.factory.alloc_normal_function(&mut self.registry, shape)
    }

    pub fn const_prim_mut(&mut self) -> &mut PrimSegment {
        &mut self.const_prim
    }

    pub fn const_obj_mut(&mut self) -> &mut ObjectSegment {
        &mut self.const_obj
    }

    /// Call `callee` with `args` (already-evaluated argument slots) on a
    /// fresh thread and run it to completion.
    pub fn call(&mut self, callee: ObjectRef, args: &[Slot]) -> RtResult<Slot> {
        let mut thread = Thread::new(&self.config);
        let base_prim = thread.prim.len();
        let base_obj = thread.obj.len();
        for arg in args {
            match arg {
                Slot::Prim(v) => thread.prim.push(*v),
                Slot::Obj(v) => thread.obj.push(*v),
            }
        }
        thread.push_frame(Frame {
            callee,
            pc: 0,
            base_prim,
            base_obj,
            result_is_object: false,
            result_slot: 0,
        });

        let mut machine = Machine {
            global_prim: &mut self.global_prim,
            global_obj: &mut self.global_obj,
            const_prim: &self.const_prim,
            const_obj: &self.const_obj,
            factory: &mut self.factory,
            registry: &mut self.registry,
            gc: self.gc.as_mut(),
            funcreg: &self.funcreg,
            trace: &mut self.trace,
            config: &self.config,
        };
        let result = exec::run(&mut thread, &mut machine);
        #[cfg(debug_assertions)]
        if result.is_err() {
            self.last_backtrace = Some(thread.backtrace());
        }
        result
    }

    /// The backtrace captured at the last failing [`Vm::call`], if any.
    /// `None` until a call has actually failed.
    #[cfg(debug_assertions)]
    pub fn backtrace(&self) -> Option<&str> {
        self.last_backtrace.as_deref()
    }

    /// Run a full (non-incremental) collection now.
    pub fn full_gc(&mut self) {
        let roots: Vec<ObjectRef> = self.global_obj.roots().chain(self.const_obj.roots()).collect();
        self.gc.full_gc(&mut self.registry, &roots);
    }

    pub fn gc_stats(&self) -> crate::gc::GcStats {
        self.gc.stats()
    }

    pub fn trace_table(&self) -> &TraceTable {
        &self.trace
    }

    pub fn heap_object_count(&self) -> usize {
        self.registry.len()
    }

    /// Format every registered `NormalFunction`'s bytecode, one line per
    /// instruction, for human inspection. Functions are listed in name
    /// order; `NativeFunction`/`Closure` entries are noted but not expanded
    /// since they carry no blob of their own to disassemble.
    pub fn disassemble_all(&self) -> String {
        use std::fmt::Write as _;

        let mut entries: Vec<_> = self.funcreg.iter().collect();
        entries.sort_by_key(|(name, _)| self.symbols.resolve(*name).to_owned());

        let mut out = String::new();
        for (name, entry) in entries {
            let name = self.symbols.resolve(name);
            match entry.callable.payload() {
                ObjectPayload::NormalFunction(shape) => {
                    let _ = writeln!(
                        out,
                        "fn {name} (arity={}, prim_slots={}, obj_slots={}):",
                        shape.arity, shape.local_prim_slots, shape.local_object_slots
                    );
                    for pc in 0..shape.blob.len() as u32 {
                        let _ = writeln!(out, "  {pc:>4}: {}", disassemble_one(shape.blob.decode_at(pc)));
                    }
                }
                ObjectPayload::NativeFunction(_) => {
                    let _ = writeln!(out, "fn {name}: <native>");
                }
                other => {
                    let _ = writeln!(out, "fn {name}: <unexpected callable kind {other:?}>");
                }
            }
        }
        out
    }
}

/// Render one decoded instruction the way `ketrac --emit lir` renders MIR:
/// opcode name followed by its operands, no semantic interpretation.
fn disassemble_one(inst: crate::bytecode::Instruction) -> String {
    use crate::bytecode::Instruction;
    match inst {
        Instruction::Wide { opcode, result, op1, op2 } => {
            format!("{opcode:?} result={result} op1={op1} op2={op2}")
        }
        Instruction::Narrow { opcode, s1, s2 } => {
            format!("{opcode:?} s1={s1} s2={s2}")
        }
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        if let Some(profiler) = self.profiler.take() {
            let _ = profiler.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{BitcodeBuilder, Blob};
    use crate::object::shapes::NormalFunctionShape;
    use ketra_util::source::SourcePosition;

    const HERE: SourcePosition = SourcePosition::UNKNOWN;

    /// `fn answer() { return 42; }`, hand-assembled: `frame 1, 0`,
    /// `ld result=0 ConstPrim 0`, `ret 0`.
    fn answer_shape(vm: &mut Vm, name: &str) -> NormalFunctionShape {
        let const_slot = vm.const_prim_mut().push(42);
        let mut b = BitcodeBuilder::new();
        b.emit_frame(1, 0, HERE);
        b.emit_ld(0, crate::bytecode::Segment::ConstPrim, const_slot, HERE);
        b.emit_ret(0, HERE);
        let blob = Blob::from_builder(b);
        NormalFunctionShape {
            name: vm.intern(name),
            arity: 0,
            local_prim_slots: 1,
            local_object_slots: 0,
            blob: std::rc::Rc::new(blob),
            upvalues: Vec::new(),
            returns_object: false,
        }
    }

    #[test]
    fn disassemble_all_lists_every_registered_function() {
        let mut vm = Vm::with_noop_collector(RuntimeConfig::default());
        let shape = answer_shape(&mut vm, "answer");
        let name = shape.name;
        let obj = vm.alloc_normal_function(shape);
        vm.register_function(name, 0, obj);

        let dump = vm.disassemble_all();
        assert!(dump.contains("fn answer"));
        assert!(dump.contains("Frame"));
        assert!(dump.contains("Ret"));
    }

    #[test]
    fn backtrace_is_empty_before_any_failure() {
        let vm = Vm::with_noop_collector(RuntimeConfig::default());
        assert!(vm.backtrace().is_none());
    }

    #[test]
    fn backtrace_is_populated_after_a_failing_call() {
        let mut vm = Vm::with_noop_collector(RuntimeConfig::default());
        // `frame 0, 0; ret 5` reads an out-of-range prim local and must fail.
        let mut b = BitcodeBuilder::new();
        b.emit_frame(0, 0, HERE);
        b.emit_ret(5, HERE);
        let blob = Blob::from_builder(b);
        let name = vm.intern("broken");
        let shape = NormalFunctionShape {
            name,
            arity: 0,
            local_prim_slots: 0,
            local_object_slots: 0,
            blob: std::rc::Rc::new(blob),
            upvalues: Vec::new(),
            returns_object: false,
        };
        let obj = vm.alloc_normal_function(shape);
        vm.register_function(name, 0, obj);

        let result = vm.call(obj, &[]);
        assert!(result.is_err());
        let trace = vm.backtrace().expect("a failing call leaves a backtrace");
        assert!(trace.contains("pc="));
    }
}
