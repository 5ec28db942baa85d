//! The reflected type table: runtime type identity used by
//! `oop` operators, the native-call bridge's signature checker, and the
//! disassembler's pretty-printer.
//!
//! This is a distinct enumeration from [`crate::object::Kind`]: `Kind` tags
//! a `GcBox`'s header for the collector, while `ReflectionKind` is the
//! value the compiler stamps into `o_global`'s type table and that
//! `UnionUnbox`/array/map construction index by. Several heap `Kind`s
//! (`NormalFunction`, `NativeFunction`, `Closure`) collapse onto the single
//! `ReflectionFunction` entry, and `Integral`/`Floating` have no `Kind` at
//! all since primitives never carry a heap tag.

/// One of the eleven reflected-type kinds the compiler lowers every static
/// type to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReflectionKind {
    Void = 0,
    Integral = 1,
    Floating = 2,
    String = 3,
    Error = 4,
    Union = 5,
    External = 6,
    Slice = 7,
    Array = 8,
    Map = 9,
    Function = 10,
}

/// Static metadata for one reflection kind — placement size, whether it can
/// key a map — collected into one table instead of being implicit in each
/// object kind's own code.
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub kind: ReflectionKind,
    pub name: &'static str,
    /// Whether values of this kind may be used as map keys.
    pub map_key_eligible: bool,
    /// Whether this kind is boxed on the object stack (`true`) or unboxed
    /// on the primitive stack (`false`).
    pub is_heap_kind: bool,
    /// Bytes occupied by one value of this kind in a stack slot or inline
    /// union payload. `UnionUnbox` uses this to pick its output width and
    /// `Union` construction uses it to size the inline payload.
    pub placement_size: usize,
}

const TABLE: [TypeInfo; 11] = [
    TypeInfo { kind: ReflectionKind::Void, name: "void", map_key_eligible: false, is_heap_kind: false, placement_size: 0 },
    TypeInfo { kind: ReflectionKind::Integral, name: "integral", map_key_eligible: true, is_heap_kind: false, placement_size: 8 },
    TypeInfo { kind: ReflectionKind::Floating, name: "floating", map_key_eligible: true, is_heap_kind: false, placement_size: 8 },
    TypeInfo { kind: ReflectionKind::String, name: "string", map_key_eligible: true, is_heap_kind: true, placement_size: 8 },
    TypeInfo { kind: ReflectionKind::Error, name: "error", map_key_eligible: false, is_heap_kind: true, placement_size: 8 },
    TypeInfo { kind: ReflectionKind::Union, name: "union", map_key_eligible: false, is_heap_kind: true, placement_size: 8 },
    TypeInfo { kind: ReflectionKind::External, name: "external", map_key_eligible: false, is_heap_kind: true, placement_size: 8 },
    TypeInfo { kind: ReflectionKind::Slice, name: "slice", map_key_eligible: false, is_heap_kind: true, placement_size: 8 },
    TypeInfo { kind: ReflectionKind::Array, name: "array", map_key_eligible: false, is_heap_kind: true, placement_size: 8 },
    TypeInfo { kind: ReflectionKind::Map, name: "map", map_key_eligible: false, is_heap_kind: true, placement_size: 8 },
    TypeInfo { kind: ReflectionKind::Function, name: "function", map_key_eligible: false, is_heap_kind: true, placement_size: 8 },
];

/// Look up the static [`TypeInfo`] for a reflection kind.
pub fn type_info(kind: ReflectionKind) -> &'static TypeInfo {
    &TABLE[kind as usize]
}

/// Human-readable type name, used by error messages and the disassembler.
pub fn type_name(kind: ReflectionKind) -> &'static str {
    type_info(kind).name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_distinct_name() {
        let mut names: Vec<_> = TABLE.iter().map(|t| t.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), TABLE.len());
    }

    #[test]
    fn only_scalars_and_strings_are_map_key_eligible() {
        for info in &TABLE {
            let expected = matches!(info.kind, ReflectionKind::Integral | ReflectionKind::Floating | ReflectionKind::String);
            assert_eq!(info.map_key_eligible, expected);
        }
    }

    #[test]
    fn void_has_no_placement_size() {
        assert_eq!(type_info(ReflectionKind::Void).placement_size, 0);
    }
}
