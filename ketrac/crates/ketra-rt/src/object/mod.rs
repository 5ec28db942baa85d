//! The heap object model.
//!
//! A `GcBox` is a non-moving, individually `Box`-allocated cell: a packed
//! [`header::ObjectHeader`] followed by a [`shapes::ObjectPayload`]. Because
//! nothing in this runtime relocates objects, plain pointer-stable
//! allocation is sufficient — there is no colored-pointer/region machinery,
//! since that exists only to support relocating collectors.

pub mod handle;
pub mod header;
pub mod shapes;

use std::ptr::NonNull;

pub use handle::Handle;
pub use header::{Color, Generation, ObjectHeader};
pub use shapes::{ObjectPayload, Slot};

/// The reflection kind tag stored in the header's top byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Kind {
    Str = 0,
    Array = 1,
    Map = 2,
    WeakMap = 3,
    NormalFunction = 4,
    NativeFunction = 5,
    Closure = 6,
    UpValue = 7,
    Union = 8,
    Module = 9,
    Userdata = 10,
    Error = 11,
    Slice = 12,
}

impl Kind {
    pub(crate) fn from_bits(bits: u8) -> Kind {
        match bits {
            0 => Kind::Str,
            1 => Kind::Array,
            2 => Kind::Map,
            3 => Kind::WeakMap,
            4 => Kind::NormalFunction,
            5 => Kind::NativeFunction,
            6 => Kind::Closure,
            7 => Kind::UpValue,
            8 => Kind::Union,
            9 => Kind::Module,
            10 => Kind::Userdata,
            11 => Kind::Error,
            12 => Kind::Slice,
            other => unreachable!("corrupt kind tag: {other}"),
        }
    }

    /// Whether a map may use this kind as a key: scalars and interned strings only.
    pub fn is_map_key_eligible(self) -> bool {
        matches!(self, Kind::Str)
    }
}

/// The allocation unit: header plus payload, boxed once and never moved.
#[derive(Debug)]
pub struct GcBox {
    pub header: ObjectHeader,
    pub payload: ObjectPayload,
}

/// A non-null, non-owning pointer to a [`GcBox`] on the heap. Stack and
/// segment slots, closure upvalue lists, and array/map elements all hold
/// `ObjectRef`s; only [`Handle`] increments the header's handle count.
///
/// # Safety
/// Valid only while the `GcBox` it points at has not been swept. The
/// collector guarantees this for any `ObjectRef` reachable from a root at
/// the start of a `Step`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(NonNull<GcBox>);

impl std::fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectRef({:p})", self.0.as_ptr())
    }
}

impl ObjectRef {
    /// Construct from a freshly `Box::into_raw`'d allocation. Called only by
    /// [`crate::factory::Factory`].
    pub(crate) fn from_box(boxed: Box<GcBox>) -> Self {
        ObjectRef(NonNull::from(Box::leak(boxed)))
    }

    #[inline]
    pub fn header(&self) -> &ObjectHeader {
        // SAFETY: see struct-level safety note.
        unsafe { &self.0.as_ref().header }
    }

    #[inline]
    pub fn payload(&self) -> &ObjectPayload {
        // SAFETY: see struct-level safety note.
        unsafe { &self.0.as_ref().payload }
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut ObjectPayload {
        // SAFETY: `&mut self` statically proves exclusive access to this
        // handle; combined with the mutator being single-threaded
        // this cannot alias another live borrow.
        unsafe { &mut self.0.as_mut().payload }
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.header().kind()
    }

    /// Reclaim the box. Called only by the collector's sweep phases once a
    /// `GcBox` has been proven unreachable.
    pub(crate) unsafe fn reclaim(self) -> Box<GcBox> {
        Box::from_raw(self.0.as_ptr())
    }

    pub(crate) fn as_ptr(&self) -> *mut GcBox {
        self.0.as_ptr()
    }

    /// Every `ObjectRef` directly reachable from this object, for the
    /// collector's mark-phase traversal.
    pub fn trace_children(&self, mut visit: impl FnMut(ObjectRef)) {
        match self.payload() {
            ObjectPayload::Str(_) | ObjectPayload::NativeFunction(_) | ObjectPayload::Userdata(_) => {}
            ObjectPayload::Array(a) => visit_slots(&a.elems, &mut visit),
            ObjectPayload::Map(m) => visit_entries(&m.entries, &mut visit),
            ObjectPayload::WeakMap(_) => {
                // Weak maps do not keep their entries alive; traced only by
                // `SweepWeak`, never by `Propagate`.
            }
            ObjectPayload::Module(a) => visit_slots(&a.elems, &mut visit),
            ObjectPayload::NormalFunction(_) => {}
            ObjectPayload::Closure(c) => {
                if let Some(f) = c.function {
                    visit(f);
                }
                for upvalue in &c.upvalues {
                    visit(*upvalue);
                }
            }
            ObjectPayload::UpValue(UpValueShape::Closed { value }) => visit_slot(value, &mut visit),
            ObjectPayload::Union(u) => visit_slot(&u.value, &mut visit),
            ObjectPayload::Error(e) => {
                visit(e.message);
                visit(e.file);
                if let Some(linked) = e.linked {
                    visit(linked);
                }
            }
            ObjectPayload::Slice(s) => visit(s.backing),
        }
    }
}

fn visit_slot(slot: &Slot, visit: &mut impl FnMut(ObjectRef)) {
    if let Slot::Obj(Some(obj)) = slot {
        visit(*obj);
    }
}

fn visit_slots(slots: &[Slot], visit: &mut impl FnMut(ObjectRef)) {
    for slot in slots {
        visit_slot(slot, visit);
    }
}

fn visit_entries(entries: &[(Slot, Slot)], visit: &mut impl FnMut(ObjectRef)) {
    for (key, value) in entries {
        visit_slot(key, visit);
        visit_slot(value, visit);
    }
}

use shapes::UpValueShape;
