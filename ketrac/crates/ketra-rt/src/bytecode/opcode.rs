//! The instruction opcode set.
//!
//! A naive one-mnemonic-per-width encoding would need `add_i8`, `add_i16`,
//! `add_i32`, `add_i64`, `add_f32`, `add_f64`, and the same crossed with
//! `sub`/`mul`/`div` — roughly two hundred flat enum tags. Rust's enums
//! carry data, so here width is a field on one `Arith` opcode rather than
//! two hundred near-identical variants; every width/op combination is still
//! reachable, just as `(Opcode::Arith, width, op)` instead of a bespoke tag.

/// Scalar width for arithmetic and comparison opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Width {
    I8 = 0,
    I16 = 1,
    I32 = 2,
    I64 = 3,
    F32 = 4,
    F64 = 5,
    Bool = 6,
}

impl Width {
    pub fn is_float(self) -> bool {
        matches!(self, Width::F32 | Width::F64)
    }

    pub(crate) fn from_bits(bits: u8) -> Width {
        match bits {
            0 => Width::I8,
            1 => Width::I16,
            2 => Width::I32,
            3 => Width::I64,
            4 => Width::F32,
            5 => Width::F64,
            6 => Width::Bool,
            other => panic!("invalid Width bits: {other}"),
        }
    }
}

/// Arithmetic operator, paired with a [`Width`] on `Opcode::Arith`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArithOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    Rem = 4,
    Neg = 5,
    BitAnd = 6,
    BitOr = 7,
    BitXor = 8,
    BitNot = 9,
    Shl = 10,
    Shr = 11,
}

impl ArithOp {
    pub(crate) fn from_bits(bits: u8) -> ArithOp {
        match bits {
            0 => ArithOp::Add,
            1 => ArithOp::Sub,
            2 => ArithOp::Mul,
            3 => ArithOp::Div,
            4 => ArithOp::Rem,
            5 => ArithOp::Neg,
            6 => ArithOp::BitAnd,
            7 => ArithOp::BitOr,
            8 => ArithOp::BitXor,
            9 => ArithOp::BitNot,
            10 => ArithOp::Shl,
            11 => ArithOp::Shr,
            other => panic!("invalid ArithOp bits: {other}"),
        }
    }
}

/// Comparison operator, paired with a [`Width`] on `Opcode::Cmp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Comparator {
    Eq = 0,
    Ne = 1,
    Lt = 2,
    Le = 3,
    Gt = 4,
    Ge = 5,
}

impl Comparator {
    pub(crate) fn from_bits(bits: u8) -> Comparator {
        match bits {
            0 => Comparator::Eq,
            1 => Comparator::Ne,
            2 => Comparator::Lt,
            3 => Comparator::Le,
            4 => Comparator::Gt,
            5 => Comparator::Ge,
            other => panic!("invalid Comparator bits: {other}"),
        }
    }
}

/// Which memory segment an `ld_*`/`st_*` opcode targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Segment {
    GlobalPrim = 0,
    GlobalObject = 1,
    ConstPrim = 2,
    ConstObject = 3,
    UpPrim = 4,
    UpObject = 5,
    LocalPrim = 6,
    LocalObject = 7,
}

impl Segment {
    pub(crate) fn from_bits(bits: u8) -> Segment {
        match bits {
            0 => Segment::GlobalPrim,
            1 => Segment::GlobalObject,
            2 => Segment::ConstPrim,
            3 => Segment::ConstObject,
            4 => Segment::UpPrim,
            5 => Segment::UpObject,
            6 => Segment::LocalPrim,
            7 => Segment::LocalObject,
            other => panic!("invalid Segment bits: {other}"),
        }
    }
}

/// The object operator meta-opcode's sub-operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OopOp {
    UnionOrMerge = 0,
    UnionTest = 1,
    UnionUnbox = 2,
    ArrayNew = 3,
    ArrayGet = 4,
    ArraySet = 5,
    ArrayLen = 6,
    ArrayPush = 7,
    Slice = 8,
    MapNew = 9,
    MapGet = 10,
    MapSet = 11,
    MapHas = 12,
    MapDelete = 13,
    MapFirstKey = 14,
    MapNextKey = 15,
    WeakMapNew = 16,
    WeakMapGet = 17,
    WeakMapSet = 18,
    ToString = 19,
    StrCat = 20,
    StrLen = 21,
    MapSize = 22,
    ArrayDirectSet = 23,
}

impl OopOp {
    pub(crate) fn from_bits(bits: u8) -> OopOp {
        match bits {
            0 => OopOp::UnionOrMerge,
            1 => OopOp::UnionTest,
            2 => OopOp::UnionUnbox,
            3 => OopOp::ArrayNew,
            4 => OopOp::ArrayGet,
            5 => OopOp::ArraySet,
            6 => OopOp::ArrayLen,
            7 => OopOp::ArrayPush,
            8 => OopOp::Slice,
            9 => OopOp::MapNew,
            10 => OopOp::MapGet,
            11 => OopOp::MapSet,
            12 => OopOp::MapHas,
            13 => OopOp::MapDelete,
            14 => OopOp::MapFirstKey,
            15 => OopOp::MapNextKey,
            16 => OopOp::WeakMapNew,
            17 => OopOp::WeakMapGet,
            18 => OopOp::WeakMapSet,
            19 => OopOp::ToString,
            20 => OopOp::StrCat,
            21 => OopOp::StrLen,
            22 => OopOp::MapSize,
            23 => OopOp::ArrayDirectSet,
            other => panic!("invalid OopOp bits: {other}"),
        }
    }
}

/// The top-level opcode byte. Everything below `Arith`/`Cmp`/`Ld`/`St`
/// carries its variation (width, segment, comparator, oop sub-op) as data
/// rather than as a distinct flat tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    /// `frame rp_count, ro_count` — reserves local slots for the callee.
    Frame = 1,
    /// `mov_prim dst, src` / `mov_obj dst, src` distinguished by which
    /// stack the operands index — encoded via the signed-16/16 form.
    MovPrim = 2,
    MovObj = 3,
    Ld = 4,
    St = 5,
    Arith = 6,
    Cmp = 7,
    Jmp = 8,
    JmpIfFalse = 9,
    JmpIfTrue = 10,
    Call = 11,
    CallNative = 12,
    Ret = 13,
    CloseFn = 14,
    Oop = 15,
    GcTick = 16,
    FullGc = 17,
    Halt = 18,
    /// `push_prim src` / `push_obj src` — append the caller's local slot
    /// `src` to the top of the corresponding stack. The emitter uses these
    /// immediately before `call` to stage arguments: the callee's frame
    /// base lands right after the pushed values, so they become its first
    /// param slots once `frame` reserves the rest (encoded narrow, `s2`
    /// only).
    PushPrim = 19,
    PushObj = 20,
}

impl Opcode {
    pub(crate) fn from_bits(bits: u8) -> Opcode {
        match bits {
            0 => Opcode::Nop,
            1 => Opcode::Frame,
            2 => Opcode::MovPrim,
            3 => Opcode::MovObj,
            4 => Opcode::Ld,
            5 => Opcode::St,
            6 => Opcode::Arith,
            7 => Opcode::Cmp,
            8 => Opcode::Jmp,
            9 => Opcode::JmpIfFalse,
            10 => Opcode::JmpIfTrue,
            11 => Opcode::Call,
            12 => Opcode::CallNative,
            13 => Opcode::Ret,
            14 => Opcode::CloseFn,
            15 => Opcode::Oop,
            16 => Opcode::GcTick,
            17 => Opcode::FullGc,
            18 => Opcode::Halt,
            19 => Opcode::PushPrim,
            20 => Opcode::PushObj,
            other => panic!("invalid Opcode bits: {other}"),
        }
    }

    /// Whether this opcode uses the signed-16/16 `frame`/`mov_*` encoding
    /// rather than the canonical result/op1/op2 encoding.
    pub fn uses_narrow_encoding(self) -> bool {
        matches!(self, Opcode::Frame | Opcode::MovPrim | Opcode::MovObj | Opcode::PushPrim | Opcode::PushObj)
    }
}
