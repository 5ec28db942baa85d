//! Shared tracing helpers for [`super::msg::Msg`]: the gray worklist and the
//! white/gray/black shading rules common to `MarkRoot`, `Propagate`, and the
//! write barrier.

use std::collections::VecDeque;

use crate::object::{Color, ObjectRef};

/// FIFO queue of objects colored gray but not yet scanned. `Propagate`
/// drains a bounded number of entries per `Step` call; `FullGC` drains it
/// to empty.
#[derive(Default)]
pub struct GrayWorklist {
    queue: VecDeque<ObjectRef>,
}

impl GrayWorklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn pop(&mut self) -> Option<ObjectRef> {
        self.queue.pop_front()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Shade `obj` gray if it is currently white of either shade, and
    /// enqueue it for `Propagate` to scan. A no-op for objects already
    /// gray or black; iterative rather than recursive so marking one
    /// object can't blow the stack on a deep reference chain.
    pub fn shade(&mut self, obj: ObjectRef, current_white: Color) {
        let header = obj.header();
        let is_white = matches!(header.color(), c if c == current_white);
        if is_white {
            header.set_color(Color::Gray);
            self.queue.push_back(obj);
        }
    }
}
