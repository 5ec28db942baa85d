//! The object factory: every heap allocation in the runtime
//! goes through here, never through a bare `Box::new`.
//!
//! Allocation is kept separate from collection so [`crate::gc::Msg`] only
//! has to know about tracing and sweeping, not construction.

use rustc_hash::FxHashMap;

use ketra_util::symbol::Symbol;

use crate::gc::Registry;
use crate::object::shapes::{
    ArrayShape, ClosureShape, ErrorShape, MapShape, NativeFunctionShape, NormalFunctionShape,
    SHORT_STRING_THRESHOLD, SliceShape, StrShape, UnionShape, UpValueShape, UserdataShape, WeakMapShape,
};
use crate::object::{Color, GcBox, Generation, Kind, ObjectPayload, ObjectRef};

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Owns the short-string intern table and the live-upvalue cache; every
/// other allocation is a fresh `GcBox` with no cross-call state.
#[derive(Default)]
pub struct Factory {
    interned: FxHashMap<Box<str>, ObjectRef>,
    /// Keyed by the unique-id `close_fn` derives for each captured binding
    /// (see `interp::exec::close_descriptor`), so sibling closures built
    /// from the same frame invocation share one `UpValue` cell. Entries for
    /// a frame are dropped when that frame returns.
    upvalues: FxHashMap<u64, ObjectRef>,
}

impl Factory {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(registry: &mut Registry, kind: Kind, payload: ObjectPayload) -> ObjectRef {
        // Always tagged White0 regardless of which shade the collector
        // currently treats as "this cycle's white": an object allocated
        // between `MarkRoot` and `Finalize` of an odd-numbered cycle sits
        // out that one cycle's marking (it is reachable but the collector
        // cannot yet tell), and is simply picked up cleanly on the next.
        let boxed = Box::new(GcBox {
            header: crate::object::ObjectHeader::new(kind, Color::White0, Generation::Young),
            payload,
        });
        let obj = ObjectRef::from_box(boxed);
        registry.track(obj);
        obj
    }

    /// Allocate or reuse an interned string (resolved Open Question: short
    /// strings are those at or under [`SHORT_STRING_THRESHOLD`] bytes; see
    /// DESIGN.md).
    pub fn alloc_str(&mut self, registry: &mut Registry, text: &str) -> ObjectRef {
        if text.len() <= SHORT_STRING_THRESHOLD {
            if let Some(existing) = self.interned.get(text) {
                return *existing;
            }
            let obj = Self::push(
                registry,
                Kind::Str,
                ObjectPayload::Str(StrShape { bytes: text.into(), hash: fnv1a(text.as_bytes()) }),
            );
            self.interned.insert(text.into(), obj);
            obj
        } else {
            Self::push(
                registry,
                Kind::Str,
                ObjectPayload::Str(StrShape { bytes: text.into(), hash: fnv1a(text.as_bytes()) }),
            )
        }
    }

    pub fn alloc_array(&mut self, registry: &mut Registry, elems: Vec<crate::object::Slot>) -> ObjectRef {
        Self::push(registry, Kind::Array, ObjectPayload::Array(ArrayShape { elems }))
    }

    pub fn alloc_map(&mut self, registry: &mut Registry) -> ObjectRef {
        Self::push(registry, Kind::Map, ObjectPayload::Map(MapShape::default()))
    }

    pub fn alloc_weak_map(&mut self, registry: &mut Registry) -> ObjectRef {
        Self::push(registry, Kind::WeakMap, ObjectPayload::WeakMap(WeakMapShape::default()))
    }

    pub fn alloc_normal_function(
        &mut self,
        registry: &mut Registry,
        shape: NormalFunctionShape,
    ) -> ObjectRef {
        Self::push(registry, Kind::NormalFunction, ObjectPayload::NormalFunction(shape))
    }

    pub fn alloc_native_function(
        &mut self,
        registry: &mut Registry,
        name: Symbol,
        signature: &'static str,
        func: crate::native::NativeFn,
    ) -> ObjectRef {
        Self::push(
            registry,
            Kind::NativeFunction,
            ObjectPayload::NativeFunction(NativeFunctionShape { name, signature, func }),
        )
    }

    pub fn alloc_closure(
        &mut self,
        registry: &mut Registry,
        function: ObjectRef,
        upvalues: Vec<ObjectRef>,
    ) -> ObjectRef {
        Self::push(
            registry,
            Kind::Closure,
            ObjectPayload::Closure(ClosureShape { function: Some(function), upvalues }),
        )
    }

    /// Resolve `unique_id` to its live `UpValue`, allocating and caching a
    /// fresh `Closed` cell holding `value` the first time this binding is
    /// closed over. Cleared per-frame by `evict_upvalues_from` on `ret`.
    pub fn get_or_new_upvalue(&mut self, registry: &mut Registry, unique_id: u64, value: crate::object::Slot) -> ObjectRef {
        if let Some(existing) = self.upvalues.get(&unique_id) {
            return *existing;
        }
        let obj = Self::push(registry, Kind::UpValue, ObjectPayload::UpValue(UpValueShape::Closed { value }));
        self.upvalues.insert(unique_id, obj);
        obj
    }

    /// Drop cache entries belonging to a frame whose locals are about to be
    /// truncated away (its bindings can never be closed over again).
    pub(crate) fn evict_upvalues_from(&mut self, prim_base: usize, obj_base: usize) {
        self.upvalues.retain(|&id, _| {
            let is_object = id >> 63 != 0;
            let addr = (id & !(1u64 << 63)) as usize;
            if is_object { addr < obj_base } else { addr < prim_base }
        });
    }

    pub fn alloc_error(
        &mut self,
        registry: &mut Registry,
        message: ObjectRef,
        file: ObjectRef,
        position: ketra_util::source::SourcePosition,
        linked: Option<ObjectRef>,
    ) -> ObjectRef {
        Self::push(registry, Kind::Error, ObjectPayload::Error(ErrorShape { message, file, position, linked }))
    }

    pub fn alloc_slice(&mut self, registry: &mut Registry, begin: u32, size: u32, backing: ObjectRef) -> ObjectRef {
        Self::push(registry, Kind::Slice, ObjectPayload::Slice(SliceShape { begin, size, backing }))
    }

    pub fn alloc_union(
        &mut self,
        registry: &mut Registry,
        variant_tag: u32,
        value: crate::object::Slot,
    ) -> ObjectRef {
        Self::push(registry, Kind::Union, ObjectPayload::Union(UnionShape { variant_tag, value }))
    }

    pub fn alloc_module(&mut self, registry: &mut Registry, elems: Vec<crate::object::Slot>) -> ObjectRef {
        Self::push(registry, Kind::Module, ObjectPayload::Module(ArrayShape { elems }))
    }

    pub fn alloc_userdata(
        &mut self,
        registry: &mut Registry,
        type_id: std::any::TypeId,
        data: Box<dyn std::any::Any>,
    ) -> ObjectRef {
        Self::push(registry, Kind::Userdata, ObjectPayload::Userdata(UserdataShape { type_id, data }))
    }

    /// Drop an interned entry once the collector has proven its object
    /// dead (called from `Msg::sweep_young`/`sweep_old`).
    pub(crate) fn forget_interned(&mut self, text: &str) {
        self.interned.remove(text);
    }
}
