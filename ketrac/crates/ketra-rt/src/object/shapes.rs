//! Per-kind heap object shapes.
//!
//! Every heap object kind is a strongly typed Rust struct behind a single
//! tagged enum, one arm per [`crate::object::Kind`], rather than a family of
//! byte-offset subclasses sharing a base header.

use ketra_util::symbol::Symbol;

use crate::object::ObjectRef;

/// A value that is either a raw primitive bit pattern or a (possibly null)
/// heap handle. Used wherever the type system allows a slot to hold either
/// shape, e.g. array elements, map entries, union payloads.
#[derive(Debug, Clone, Copy)]
pub enum Slot {
    Prim(u64),
    Obj(Option<ObjectRef>),
}

/// An interned or heap-allocated UTF-8 string. Strings up to
/// [`SHORT_STRING_THRESHOLD`] bytes are interned by the factory (resolved
/// Open Question, see DESIGN.md).
pub const SHORT_STRING_THRESHOLD: usize = 32;

#[derive(Debug, Clone)]
pub struct StrShape {
    pub bytes: Box<str>,
    /// Cached FNV hash, computed once at construction (`vm-objects.h`
    /// `StringObject::hash_`), reused by map lookups.
    pub hash: u64,
}

/// `ArrayObject`: a growable, homogeneously-typed sequence.
#[derive(Debug, Clone, Default)]
pub struct ArrayShape {
    pub elems: Vec<Slot>,
}

/// `MapObject`: insertion-ordered key/value table. Keys must be one of the
/// hashable reflection kinds.
#[derive(Debug, Clone, Default)]
pub struct MapShape {
    pub entries: Vec<(Slot, Slot)>,
}

/// `WeakMapObject`: like [`MapShape`] but object-valued keys do not hold a
/// handle reference; the collector clears entries whose key died in
/// `SweepWeak`.
#[derive(Debug, Clone, Default)]
pub struct WeakMapShape {
    pub entries: Vec<(Slot, Slot)>,
}

/// One upvalue descriptor baked into a `NormalFunctionShape` at emission
/// time, resolved against the enclosing frame by `close_fn`.
#[derive(Debug, Clone, Copy)]
pub enum UpvalueDescriptor {
    /// Captures a local slot of the immediately enclosing frame, on
    /// whichever of the two stacks `is_object` names.
    ParentLocal { slot: u32, is_object: bool },
    /// Captures an upvalue already captured by the immediately enclosing
    /// closure.
    ParentUpvalue { index: u32 },
}

/// `NormalFunctionObject`: a compiled function body plus its debug tables.
#[derive(Debug, Clone)]
pub struct NormalFunctionShape {
    pub name: Symbol,
    pub arity: u16,
    pub local_prim_slots: u16,
    pub local_object_slots: u16,
    /// This function's own compiled body. Shared (never mutated) across
    /// every closure built over the same `NormalFunctionShape`.
    pub blob: std::rc::Rc<crate::bytecode::Blob>,
    pub upvalues: Vec<UpvalueDescriptor>,
    /// Whether `ret` inside this function reads the object stack rather
    /// than the prim stack; `call`/`ret` have no spare encoding bits to
    /// carry this per call site, so the callee's own shape is the source
    /// of truth (set by the emitter from the declared return type).
    pub returns_object: bool,
}

/// `NativeFunctionObject`: a Rust function exposed to Ketra code via the
/// native-call bridge.
#[derive(Clone, Copy)]
pub struct NativeFunctionShape {
    pub name: Symbol,
    pub signature: &'static str,
    pub func: crate::native::NativeFn,
}

impl std::fmt::Debug for NativeFunctionShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunctionShape")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

/// `ClosureObject`: a function paired with its captured upvalue cells.
#[derive(Debug, Clone, Default)]
pub struct ClosureShape {
    pub function: Option<ObjectRef>,
    pub upvalues: Vec<ObjectRef>,
}

/// `UpValueObject`: a closure's private copy of a captured variable's
/// value. `close_fn` is the only place one of these is ever built, and it
/// always builds a `Closed` cell directly — there is no separate "open"
/// heap representation, since the descriptor plus the enclosing frame
/// already identify the live binding until the closure closes over it.
#[derive(Debug, Clone, Copy)]
pub enum UpValueShape {
    Closed { value: Slot },
}

/// `UnionObject`: a tagged value of one of the union's declared variants.
#[derive(Debug, Clone, Copy)]
pub struct UnionShape {
    pub variant_tag: u32,
    pub value: Slot,
}

/// `ErrorObject`: a first-class runtime error value, as produced by a
/// failed `MapGet` or by `native::dispatch` wrapping a native failure.
/// Errors chain through `linked` the way a caught exception chains a cause.
#[derive(Debug, Clone)]
pub struct ErrorShape {
    pub message: ObjectRef,
    pub file: ObjectRef,
    pub position: ketra_util::source::SourcePosition,
    pub linked: Option<ObjectRef>,
}

/// `SliceObject`: a view into a backing `ArrayObject` — a begin offset and
/// a length, never a copy. Bounds are validated once at `Slice` construction
/// time and assumed to hold for the view's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct SliceShape {
    pub begin: u32,
    pub size: u32,
    pub backing: ObjectRef,
}

/// Opaque host-provided payload handed back to native functions.
pub struct UserdataShape {
    pub type_id: std::any::TypeId,
    pub data: Box<dyn std::any::Any>,
}

impl std::fmt::Debug for UserdataShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserdataShape").field("type_id", &self.type_id).finish()
    }
}

/// The tagged union of every heap object kind. One [`crate::object::GcBox`]
/// wraps exactly one of these behind its header.
#[derive(Debug)]
pub enum ObjectPayload {
    Str(StrShape),
    Array(ArrayShape),
    Map(MapShape),
    WeakMap(WeakMapShape),
    NormalFunction(NormalFunctionShape),
    NativeFunction(NativeFunctionShape),
    Closure(ClosureShape),
    UpValue(UpValueShape),
    Union(UnionShape),
    Module(ArrayShape),
    Userdata(UserdataShape),
    Error(ErrorShape),
    Slice(SliceShape),
}
