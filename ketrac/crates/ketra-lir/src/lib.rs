//! ketra-lir — resolves `ketra-mir`'s virtual registers and names down to
//! concrete prim/object slot indices and global function slots, the last
//! step before `ketra-gen` walks this into real bytecode words.
//!
//! Ketra has no boxed-everything representation: every value is either a
//! 64-bit primitive (`int`/`float`/`bool`) living on the prim stack/segment
//! or a heap reference living on the object stack/segment.
//! This crate's whole job is deciding, for every virtual register and every
//! named local, which of the two it is, and assigning it a slot in that
//! half.

use rustc_hash::FxHashMap;

use ketra_mir::{Block, Const, Instr, MirFunction, MirModule, VReg};

#[derive(Debug, thiserror::Error)]
pub enum LirError {
    #[error("call to unknown function {0:?}")]
    UnknownFunction(String),
}

pub type LirResult<T> = Result<T, LirError>;

/// Which half of the split stack a slot lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Prim,
    Object,
}

/// A resolved local: an index within its kind's slot space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub kind: SlotKind,
    pub index: u16,
}

#[derive(Debug, Clone)]
pub enum LirConst {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl From<Const> for LirConst {
    fn from(c: Const) -> Self {
        match c {
            Const::Int(v) => LirConst::Int(v),
            Const::Float(v) => LirConst::Float(v),
            Const::Bool(v) => LirConst::Bool(v),
            Const::Str(v) => LirConst::Str(v),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LirInstr {
    LoadConst { dst: Slot, value: LirConst },
    Move { dst: Slot, src: Slot },
    BinOp { dst: Slot, op: ketra_par::ast::BinOp, lhs: Slot, rhs: Slot },
    Call { dst: Slot, func_slot: u16, args: Vec<Slot> },
    NewArray { dst: Slot, elems: Vec<Slot> },
    NewMap { dst: Slot, entries: Vec<(Slot, Slot)> },
    Index { dst: Slot, base: Slot, index: Slot },
    Return { value: Option<Slot> },
    BranchIfFalse { cond: Slot, target: usize },
    Jump { target: usize },
}

#[derive(Debug, Clone, Default)]
pub struct LirBlock {
    pub instrs: Vec<LirInstr>,
}

#[derive(Debug, Clone)]
pub struct LirFunction {
    pub name: String,
    /// Global object-segment slot this function's closure is published at,
    /// the `func_slot` operand every `Call` to it will use.
    pub global_slot: u16,
    pub param_count: u16,
    pub prim_slot_count: u16,
    pub object_slot_count: u16,
    pub blocks: Vec<LirBlock>,
}

#[derive(Debug, Clone, Default)]
pub struct LirModule {
    pub functions: Vec<LirFunction>,
}

/// Whether a virtual register ends up holding a primitive or a heap
/// reference. Decided structurally from the `Instr` that produces it:
/// there is no unifier here, just a direct reading of which bytecode-level
/// opcode the value would need to flow through.
fn classify(instrs: &[Instr], reg: VReg) -> SlotKind {
    for instr in instrs {
        let dst_kind = match instr {
            Instr::LoadConst { dst, value } if *dst == reg => Some(match value {
                Const::Int(_) | Const::Float(_) | Const::Bool(_) => SlotKind::Prim,
                Const::Str(_) => SlotKind::Object,
            }),
            Instr::LoadLocal { dst, .. } if *dst == reg => Some(SlotKind::Prim),
            Instr::BinOp { dst, .. } if *dst == reg => Some(SlotKind::Prim),
            Instr::Call { dst, .. } if *dst == reg => Some(SlotKind::Prim),
            Instr::NewArray { dst, .. } | Instr::NewMap { dst, .. } | Instr::Index { dst, .. } if *dst == reg => {
                Some(SlotKind::Object)
            }
            _ => None,
        };
        if let Some(kind) = dst_kind {
            return kind;
        }
    }
    SlotKind::Prim
}

/// Tracks the kind+slot assigned to every vreg and every named local within
/// one function, and the running slot counters used to allocate new ones.
struct SlotAllocator {
    by_reg: FxHashMap<VReg, Slot>,
    by_name: FxHashMap<String, Slot>,
    next_prim: u16,
    next_object: u16,
}

impl SlotAllocator {
    fn new() -> Self {
        SlotAllocator { by_reg: FxHashMap::default(), by_name: FxHashMap::default(), next_prim: 0, next_object: 0 }
    }

    fn alloc(&mut self, kind: SlotKind) -> Slot {
        let index = match kind {
            SlotKind::Prim => {
                let i = self.next_prim;
                self.next_prim += 1;
                i
            }
            SlotKind::Object => {
                let i = self.next_object;
                self.next_object += 1;
                i
            }
        };
        Slot { kind, index }
    }

    fn slot_for_reg(&mut self, reg: VReg, instrs: &[Instr]) -> Slot {
        if let Some(s) = self.by_reg.get(&reg) {
            return *s;
        }
        let kind = classify(instrs, reg);
        let slot = self.alloc(kind);
        self.by_reg.insert(reg, slot);
        slot
    }

    fn slot_for_name(&mut self, name: &str, kind: SlotKind) -> Slot {
        if let Some(s) = self.by_name.get(name) {
            return *s;
        }
        let slot = self.alloc(kind);
        self.by_name.insert(name.to_string(), slot);
        slot
    }
}

/// Lower an MIR module into slot-resolved LIR. Every function is published
/// to a global object slot in declaration order, mirroring the way
/// `ketra-rt::vm::Vm::register_function` publishes callables.
pub fn lower(mir: &MirModule) -> LirResult<LirModule> {
    let mut func_slots: FxHashMap<String, u16> = FxHashMap::default();
    for (i, f) in mir.functions.iter().enumerate() {
        func_slots.insert(f.name.clone(), i as u16);
    }

    let mut functions = Vec::with_capacity(mir.functions.len());
    for f in &mir.functions {
        functions.push(lower_function(f, &func_slots)?);
    }
    Ok(LirModule { functions })
}

fn lower_function(f: &MirFunction, func_slots: &FxHashMap<String, u16>) -> LirResult<LirFunction> {
    let mut alloc = SlotAllocator::new();
    let all_instrs: Vec<Instr> = f.blocks.iter().flat_map(|b| b.instrs.iter().cloned()).collect();

    // Parameters always bind to the lowest primitive slots in declaration
    // order; Ketra's surface language has no object-typed parameters yet
    //, so every `Param` takes a prim slot.
    for p in &f.params {
        alloc.slot_for_name(p, SlotKind::Prim);
    }

    let mut blocks = Vec::with_capacity(f.blocks.len());
    for block in &f.blocks {
        blocks.push(lower_block(block, &all_instrs, &mut alloc, func_slots)?);
    }

    let global_slot = *func_slots.get(&f.name).expect("function registered in its own table");

    Ok(LirFunction {
        name: f.name.clone(),
        global_slot,
        param_count: f.params.len() as u16,
        prim_slot_count: alloc.next_prim,
        object_slot_count: alloc.next_object,
        blocks,
    })
}

fn lower_block(
    block: &Block,
    all_instrs: &[Instr],
    alloc: &mut SlotAllocator,
    func_slots: &FxHashMap<String, u16>,
) -> LirResult<LirBlock> {
    let mut out = Vec::with_capacity(block.instrs.len());
    for instr in &block.instrs {
        out.push(lower_instr(instr, all_instrs, alloc, func_slots)?);
    }
    Ok(LirBlock { instrs: out })
}

fn lower_instr(
    instr: &Instr,
    all_instrs: &[Instr],
    alloc: &mut SlotAllocator,
    func_slots: &FxHashMap<String, u16>,
) -> LirResult<LirInstr> {
    Ok(match instr {
        Instr::LoadConst { dst, value } => {
            LirInstr::LoadConst { dst: alloc.slot_for_reg(*dst, all_instrs), value: value.clone().into() }
        }
        Instr::LoadLocal { dst, name } => {
            let dst_slot = alloc.slot_for_reg(*dst, all_instrs);
            let src_slot = alloc.slot_for_name(name, dst_slot.kind);
            LirInstr::Move { dst: dst_slot, src: src_slot }
        }
        Instr::BinOp { dst, op, lhs, rhs } => LirInstr::BinOp {
            dst: alloc.slot_for_reg(*dst, all_instrs),
            op: op.clone(),
            lhs: alloc.slot_for_reg(*lhs, all_instrs),
            rhs: alloc.slot_for_reg(*rhs, all_instrs),
        },
        Instr::Call { dst, callee, args } => {
            let func_slot = *func_slots.get(callee).ok_or_else(|| LirError::UnknownFunction(callee.clone()))?;
            LirInstr::Call {
                dst: alloc.slot_for_reg(*dst, all_instrs),
                func_slot,
                args: args.iter().map(|a| alloc.slot_for_reg(*a, all_instrs)).collect(),
            }
        }
        Instr::NewArray { dst, elems } => LirInstr::NewArray {
            dst: alloc.slot_for_reg(*dst, all_instrs),
            elems: elems.iter().map(|e| alloc.slot_for_reg(*e, all_instrs)).collect(),
        },
        Instr::NewMap { dst, entries } => LirInstr::NewMap {
            dst: alloc.slot_for_reg(*dst, all_instrs),
            entries: entries
                .iter()
                .map(|(k, v)| (alloc.slot_for_reg(*k, all_instrs), alloc.slot_for_reg(*v, all_instrs)))
                .collect(),
        },
        Instr::Index { dst, base, index } => LirInstr::Index {
            dst: alloc.slot_for_reg(*dst, all_instrs),
            base: alloc.slot_for_reg(*base, all_instrs),
            index: alloc.slot_for_reg(*index, all_instrs),
        },
        Instr::StoreLocal { name, value } => {
            let src_slot = alloc.slot_for_reg(*value, all_instrs);
            let dst_slot = alloc.slot_for_name(name, src_slot.kind);
            LirInstr::Move { dst: dst_slot, src: src_slot }
        }
        Instr::Return { value } => {
            LirInstr::Return { value: value.map(|v| alloc.slot_for_reg(v, all_instrs)) }
        }
        Instr::BranchIfFalse { cond, target } => {
            LirInstr::BranchIfFalse { cond: alloc.slot_for_reg(*cond, all_instrs), target: *target }
        }
        Instr::Jump { target } => LirInstr::Jump { target: *target },
        Instr::Label => LirInstr::Jump { target: 0 },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_params_and_call_target_slots() {
        let module = ketra_par::parse("fn add(a, b) { return a + b; } fn main() { return add(1, 2); }").unwrap();
        let checked = ketra_sem::check(module).unwrap();
        let mir = ketra_mir::lower(&checked);
        let lir = lower(&mir).unwrap();

        let add = lir.functions.iter().find(|f| f.name == "add").unwrap();
        assert_eq!(add.param_count, 2);
        assert!(add.prim_slot_count >= 2);

        let main = lir.functions.iter().find(|f| f.name == "main").unwrap();
        let call = main.blocks[0]
            .instrs
            .iter()
            .find_map(|i| if let LirInstr::Call { func_slot, .. } = i { Some(*func_slot) } else { None })
            .unwrap();
        assert_eq!(call, add.global_slot);
    }

    #[test]
    fn rejects_call_to_unknown_function() {
        let module = ketra_par::parse("fn main() { return missing(); }").unwrap();
        // sem only checks declared functions, so build the mir directly against an
        // already-"checked" module standing in for one whose checker was bypassed.
        let checked = ketra_sem::CheckedModule { module };
        let mir = ketra_mir::lower(&checked);
        assert!(matches!(lower(&mir), Err(LirError::UnknownFunction(_))));
    }
}
