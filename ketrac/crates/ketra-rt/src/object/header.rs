//! The atomic object header: a single packed 32-bit word carrying the
//! external handle count, tri-color mark, generation, and type tag for
//! every heap object.
//!
//! Field layout: handle-count in the low 16 bits, then a 4-bit color, a
//! 4-bit generation, then an 8-bit kind tag in the top byte. Packing
//! everything into one `AtomicU32` means a write barrier can inspect and
//! update color/generation without taking a lock, at the cost of a retry
//! loop on contention.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::object::Kind;

const HANDLE_COUNT_BITS: u32 = 16;
const COLOR_BITS: u32 = 4;
const GENERATION_BITS: u32 = 4;
const KIND_BITS: u32 = 8;

const HANDLE_COUNT_SHIFT: u32 = 0;
const COLOR_SHIFT: u32 = HANDLE_COUNT_SHIFT + HANDLE_COUNT_BITS;
const GENERATION_SHIFT: u32 = COLOR_SHIFT + COLOR_BITS;
const KIND_SHIFT: u32 = GENERATION_SHIFT + GENERATION_BITS;

const HANDLE_COUNT_MASK: u32 = (1 << HANDLE_COUNT_BITS) - 1;
const COLOR_MASK: u32 = (1 << COLOR_BITS) - 1;
const GENERATION_MASK: u32 = (1 << GENERATION_BITS) - 1;
const KIND_MASK: u32 = (1 << KIND_BITS) - 1;

pub const MAX_HANDLE_COUNT: u32 = HANDLE_COUNT_MASK;

/// Tri-color mark used by the incremental collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    White0 = 0,
    White1 = 1,
    Gray = 2,
    Black = 3,
}

impl Color {
    fn from_bits(bits: u32) -> Color {
        match bits {
            0 => Color::White0,
            1 => Color::White1,
            2 => Color::Gray,
            3 => Color::Black,
            other => unreachable!("corrupt color bits: {other}"),
        }
    }
}

/// Which generation an object currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Generation {
    Young = 0,
    Old = 1,
}

impl Generation {
    fn from_bits(bits: u32) -> Generation {
        match bits {
            0 => Generation::Young,
            1 => Generation::Old,
            other => unreachable!("corrupt generation bits: {other}"),
        }
    }
}

/// The packed header word. Every `GcBox` starts with one of these.
pub struct ObjectHeader {
    word: AtomicU32,
}

impl ObjectHeader {
    pub fn new(kind: Kind, color: Color, generation: Generation) -> Self {
        let packed = Self::pack(0, color, generation, kind);
        Self { word: AtomicU32::new(packed) }
    }

    fn pack(handle_count: u32, color: Color, generation: Generation, kind: Kind) -> u32 {
        debug_assert!(handle_count <= HANDLE_COUNT_MASK);
        (handle_count & HANDLE_COUNT_MASK) << HANDLE_COUNT_SHIFT
            | ((color as u32) & COLOR_MASK) << COLOR_SHIFT
            | ((generation as u32) & GENERATION_MASK) << GENERATION_SHIFT
            | ((kind as u32) & KIND_MASK) << KIND_SHIFT
    }

    #[inline]
    pub fn handle_count(&self) -> u32 {
        (self.word.load(Ordering::Acquire) >> HANDLE_COUNT_SHIFT) & HANDLE_COUNT_MASK
    }

    #[inline]
    pub fn color(&self) -> Color {
        Color::from_bits((self.word.load(Ordering::Acquire) >> COLOR_SHIFT) & COLOR_MASK)
    }

    #[inline]
    pub fn generation(&self) -> Generation {
        Generation::from_bits((self.word.load(Ordering::Acquire) >> GENERATION_SHIFT) & GENERATION_MASK)
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        Kind::from_bits(((self.word.load(Ordering::Acquire) >> KIND_SHIFT) & KIND_MASK) as u8)
    }

    /// Pin an external `Handle<T>`. Saturates at [`MAX_HANDLE_COUNT`] rather
    /// than wrapping, which would silently un-pin a live handle.
    pub fn incref(&self) {
        self.cas_update(|handle_count, color, generation, kind| {
            let next = (handle_count + 1).min(HANDLE_COUNT_MASK);
            Self::pack(next, color, generation, kind)
        });
    }

    /// Unpin an external `Handle<T>`. Returns the handle count after the
    /// decrement.
    pub fn decref(&self) -> u32 {
        let mut result = 0;
        self.cas_update(|handle_count, color, generation, kind| {
            let next = handle_count.saturating_sub(1);
            result = next;
            Self::pack(next, color, generation, kind)
        });
        result
    }

    pub fn set_color(&self, color: Color) {
        self.cas_update(|handle_count, _old_color, generation, kind| {
            Self::pack(handle_count, color, generation, kind)
        });
    }

    /// Promote to the old generation. Idempotent: promoting an already-old
    /// object is a no-op.
    pub fn promote(&self) {
        self.cas_update(|handle_count, color, _generation, kind| {
            Self::pack(handle_count, color, Generation::Old, kind)
        });
    }

    /// Apply `f(handle_count, color, generation, kind) -> packed_word` under
    /// a compare-and-swap retry loop.
    fn cas_update(&self, f: impl Fn(u32, Color, Generation, Kind) -> u32) {
        let mut current = self.word.load(Ordering::Acquire);
        loop {
            let handle_count = (current >> HANDLE_COUNT_SHIFT) & HANDLE_COUNT_MASK;
            let color = Color::from_bits((current >> COLOR_SHIFT) & COLOR_MASK);
            let generation = Generation::from_bits((current >> GENERATION_SHIFT) & GENERATION_MASK);
            let kind = Kind::from_bits(((current >> KIND_SHIFT) & KIND_MASK) as u8);
            let next = f(handle_count, color, generation, kind);
            match self.word.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

impl std::fmt::Debug for ObjectHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectHeader")
            .field("handle_count", &self.handle_count())
            .field("color", &self.color())
            .field("generation", &self.generation())
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_header_starts_unreferenced_and_white() {
        let header = ObjectHeader::new(Kind::Str, Color::White0, Generation::Young);
        assert_eq!(header.handle_count(), 0);
        assert_eq!(header.color(), Color::White0);
        assert_eq!(header.generation(), Generation::Young);
        assert_eq!(header.kind(), Kind::Str);
    }

    #[test]
    fn incref_decref_round_trip() {
        let header = ObjectHeader::new(Kind::Array, Color::White0, Generation::Young);
        header.incref();
        header.incref();
        assert_eq!(header.handle_count(), 2);
        assert_eq!(header.decref(), 1);
        assert_eq!(header.decref(), 0);
    }

    #[test]
    fn decref_below_zero_saturates() {
        let header = ObjectHeader::new(Kind::Array, Color::White0, Generation::Young);
        assert_eq!(header.decref(), 0);
    }

    #[test]
    fn set_color_preserves_other_fields() {
        let header = ObjectHeader::new(Kind::Map, Color::White0, Generation::Young);
        header.incref();
        header.set_color(Color::Gray);
        assert_eq!(header.color(), Color::Gray);
        assert_eq!(header.handle_count(), 1);
        assert_eq!(header.kind(), Kind::Map);
    }

    #[test]
    fn promote_is_idempotent() {
        let header = ObjectHeader::new(Kind::Map, Color::White0, Generation::Young);
        header.promote();
        header.promote();
        assert_eq!(header.generation(), Generation::Old);
    }

    #[test]
    fn incref_saturates_at_max() {
        let header = ObjectHeader::new(Kind::Str, Color::White0, Generation::Young);
        for _ in 0..(MAX_HANDLE_COUNT + 10) {
            header.incref();
        }
        assert_eq!(header.handle_count(), MAX_HANDLE_COUNT);
    }
}
