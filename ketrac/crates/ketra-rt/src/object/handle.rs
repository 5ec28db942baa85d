//! External handles.
//!
//! A `Handle` increments its target's header handle count on construction
//! and decrements it on drop. While the count is nonzero the collector
//! treats the object as an extra root regardless of on-heap reachability.

use crate::object::ObjectRef;

/// An embedder-held reference to a heap object that keeps it alive even if
/// nothing on a Ketra stack or segment points at it.
pub struct Handle {
    obj: ObjectRef,
}

impl Handle {
    pub fn new(obj: ObjectRef) -> Self {
        obj.header().incref();
        Handle { obj }
    }

    pub fn get(&self) -> ObjectRef {
        self.obj
    }
}

impl Clone for Handle {
    fn clone(&self) -> Self {
        Handle::new(self.obj)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.obj.header().decref();
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Handle").field(&self.obj).finish()
    }
}
