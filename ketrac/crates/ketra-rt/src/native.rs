//! The native-call bridge.
//!
//! There is no JIT-built per-function trampoline marshaling the
//! interpreter's stack layout into the host ABI; the bridge is a plain
//! Rust dispatcher instead. A function's signature string is checked
//! against the actual argument kinds at call time and the callee receives
//! a typed [`NativeArgs`] view rather than raw stack slots.

use crate::error::{RtError, RtResult};
use crate::factory::Factory;
use crate::gc::Registry;
use crate::object::{Kind, Slot};

/// One argument or return slot's expected shape, parsed from a signature
/// character: `!` void, `8/7/5/9` signed integer widths 8/16/32/64, `3/6`
/// single/double float, and the object-reference kinds `z` string, `e`
/// error, `u` union, `x` external, `s` slice, `a` vector, `m` map,
/// `r` function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigKind {
    Void,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Str,
    Error,
    Union,
    External,
    Slice,
    Vector,
    Map,
    Function,
}

fn parse_sig_char(c: char) -> Option<SigKind> {
    match c {
        '!' => Some(SigKind::Void),
        '8' => Some(SigKind::I8),
        '7' => Some(SigKind::I16),
        '5' => Some(SigKind::I32),
        '9' => Some(SigKind::I64),
        '3' => Some(SigKind::F32),
        '6' => Some(SigKind::F64),
        'z' => Some(SigKind::Str),
        'e' => Some(SigKind::Error),
        'u' => Some(SigKind::Union),
        'x' => Some(SigKind::External),
        's' => Some(SigKind::Slice),
        'a' => Some(SigKind::Vector),
        'm' => Some(SigKind::Map),
        'r' => Some(SigKind::Function),
        _ => None,
    }
}

/// Split a signature string into its return kind (the first character) and
/// argument kinds (every character after it, in order) — no separator.
pub fn parse_signature(sig: &str) -> RtResult<(Vec<SigKind>, SigKind)> {
    let mut chars = sig.chars();
    let ret = chars
        .next()
        .and_then(parse_sig_char)
        .ok_or(RtError::InvalidBlob("native signature missing a return kind"))?;
    let args = chars
        .map(|c| parse_sig_char(c).ok_or(RtError::InvalidBlob("unrecognized signature character")))
        .collect::<RtResult<Vec<_>>>()?;
    Ok((args, ret))
}

fn slot_kind(signature: &'static str, index: usize, slot: Slot, expected: SigKind) -> RtResult<()> {
    let matches = match (expected, slot) {
        (SigKind::I8 | SigKind::I16 | SigKind::I32 | SigKind::I64, Slot::Prim(_)) => true,
        (SigKind::F32 | SigKind::F64, Slot::Prim(_)) => true,
        (SigKind::Str, Slot::Obj(Some(o))) => o.kind() == Kind::Str,
        (SigKind::Error, Slot::Obj(Some(o))) => o.kind() == Kind::Error,
        (SigKind::Union, Slot::Obj(Some(o))) => o.kind() == Kind::Union,
        (SigKind::External, Slot::Obj(Some(o))) => o.kind() == Kind::Userdata,
        (SigKind::Slice, Slot::Obj(Some(o))) => o.kind() == Kind::Slice,
        (SigKind::Vector, Slot::Obj(Some(o))) => o.kind() == Kind::Array,
        (SigKind::Map, Slot::Obj(Some(o))) => o.kind() == Kind::Map,
        (SigKind::Function, Slot::Obj(Some(o))) => {
            matches!(o.kind(), Kind::NormalFunction | Kind::NativeFunction | Kind::Closure)
        }
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(RtError::NativeSignatureMismatch { signature, index, reason: "argument kind mismatch" })
    }
}

/// Checked view over a native call's arguments, plus the allocation
/// capabilities a native function needs to build its return value.
pub struct NativeArgs<'a> {
    pub args: &'a [Slot],
    pub factory: &'a mut Factory,
    pub registry: &'a mut Registry,
}

impl<'a> NativeArgs<'a> {
    pub fn int(&self, index: usize) -> RtResult<i64> {
        match self.args[index] {
            Slot::Prim(bits) => Ok(bits as i64),
            Slot::Obj(_) => Err(RtError::TypeMismatch { expected: "int", found: Kind::Str }),
        }
    }

    pub fn float(&self, index: usize) -> RtResult<f64> {
        match self.args[index] {
            Slot::Prim(bits) => Ok(f64::from_bits(bits)),
            Slot::Obj(_) => Err(RtError::TypeMismatch { expected: "float", found: Kind::Str }),
        }
    }

    pub fn string(&self, index: usize) -> RtResult<&str> {
        match self.args[index] {
            Slot::Obj(Some(obj)) if obj.kind() == Kind::Str => match obj.payload() {
                crate::object::ObjectPayload::Str(s) => Ok(&s.bytes),
                _ => unreachable!(),
            },
            _ => Err(RtError::TypeMismatch { expected: "str", found: Kind::Str }),
        }
    }
}

/// The signature every native function body is compiled against.
pub type NativeFn = fn(&mut NativeArgs) -> RtResult<Slot>;

/// Validate `args` against `signature`, then invoke `func`. Called by the
/// `call_native` opcode handler in [`crate::interp::exec`].
pub fn dispatch(
    signature: &'static str,
    func: NativeFn,
    factory: &mut Factory,
    registry: &mut Registry,
    args: &[Slot],
) -> RtResult<Slot> {
    let (expected_args, _ret) = parse_signature(signature)?;
    if expected_args.len() != args.len() {
        return Err(RtError::NativeSignatureMismatch {
            signature,
            index: args.len(),
            reason: "argument count mismatch",
        });
    }
    for (index, (&slot, &expected)) in args.iter().zip(expected_args.iter()).enumerate() {
        slot_kind(signature, index, slot, expected)?;
    }
    let mut view = NativeArgs { args, factory, registry };
    func(&mut view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_signature() {
        let (args, ret) = parse_signature("999").unwrap();
        assert_eq!(args, vec![SigKind::I64, SigKind::I64]);
        assert_eq!(ret, SigKind::I64);
    }

    #[test]
    fn rejects_unrecognized_character() {
        assert!(parse_signature("9q").is_err());
    }

    #[test]
    fn void_return_parses() {
        let (args, ret) = parse_signature("!z").unwrap();
        assert_eq!(args, vec![SigKind::Str]);
        assert_eq!(ret, SigKind::Void);
    }
}
