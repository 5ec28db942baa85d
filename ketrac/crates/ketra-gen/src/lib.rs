//! ketra-gen — walks resolved LIR and drives [`ketra_rt::bytecode::BitcodeBuilder`]
//! to produce real [`ketra_rt::object::shapes::NormalFunctionShape`]s, then
//! links them into a [`ketra_rt::vm::Vm`].

use std::rc::Rc;

use ketra_lir::{LirConst, LirFunction, LirInstr, LirModule, Slot, SlotKind};
use ketra_par::ast::BinOp;
use ketra_rt::bytecode::builder::Label;
use ketra_rt::bytecode::{encode_value_slot, ArithOp, BitcodeBuilder, Blob, Comparator, OopOp, Segment, Width};
use ketra_rt::object::shapes::NormalFunctionShape;
use ketra_rt::object::ObjectRef;
use ketra_rt::vm::Vm;
use ketra_util::source::SourcePosition;

#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error("internal code generation error: {0}")]
    Internal(&'static str),
}

pub type GenResult<T> = Result<T, GenError>;

/// No compiler-phase crate upstream of this one threads source positions
/// through to LIR; every emitted instruction carries this placeholder.
/// Reinstating real positions would mean plumbing `SourcePosition` through
/// `ketra-mir`/`ketra-lir` alongside every `VReg`/`Slot` — worth doing if
/// this pipeline grows a real debugger, not yet.
const HERE: SourcePosition = SourcePosition::UNKNOWN;

fn map_binop(op: &BinOp) -> BinOpKind {
    match op {
        BinOp::Add => BinOpKind::Arith(ArithOp::Add),
        BinOp::Sub => BinOpKind::Arith(ArithOp::Sub),
        BinOp::Mul => BinOpKind::Arith(ArithOp::Mul),
        BinOp::Div => BinOpKind::Arith(ArithOp::Div),
        BinOp::Rem => BinOpKind::Arith(ArithOp::Rem),
        // Non-short-circuiting: both MIR operands are already evaluated by
        // the time a BinOp instruction runs, so `&&`/`||` compile to plain
        // bitwise ops over the 0/1 boolean representation rather than a
        // branch.
        BinOp::And => BinOpKind::Arith(ArithOp::BitAnd),
        BinOp::Or => BinOpKind::Arith(ArithOp::BitOr),
        BinOp::Eq => BinOpKind::Cmp(Comparator::Eq),
        BinOp::Ne => BinOpKind::Cmp(Comparator::Ne),
        BinOp::Lt => BinOpKind::Cmp(Comparator::Lt),
        BinOp::Le => BinOpKind::Cmp(Comparator::Le),
        BinOp::Gt => BinOpKind::Cmp(Comparator::Gt),
        BinOp::Ge => BinOpKind::Cmp(Comparator::Ge),
    }
}

enum BinOpKind {
    Arith(ArithOp),
    Cmp(Comparator),
}

/// Whether any `return` in `f` hands back an object-kind value. Ketra-sem
/// does not track declared return types (it is a name/arity checker, see
/// its module doc), so this is read directly off how the function's own
/// `return` statements classify their operand.
fn returns_object(f: &LirFunction) -> bool {
    f.blocks
        .iter()
        .flat_map(|b| &b.instrs)
        .any(|i| matches!(i, LirInstr::Return { value: Some(slot) } if slot.kind == SlotKind::Object))
}

/// Compile every function in `lir` and link it into `vm`, returning each
/// function's heap object in declaration order.
pub fn compile(lir: &LirModule, vm: &mut Vm) -> GenResult<Vec<ObjectRef>> {
    let mut objects = Vec::with_capacity(lir.functions.len());
    for f in &lir.functions {
        let blob = emit_function(f, vm)?;
        let name = vm.intern(&f.name);
        let shape = NormalFunctionShape {
            name,
            arity: f.param_count,
            local_prim_slots: f.prim_slot_count,
            // +1: a scratch object slot this function's own call sites use
            // to stage a callee before `call`, see `emit_call_instr`.
            local_object_slots: f.object_slot_count + 1,
            blob: Rc::new(blob),
            upvalues: Vec::new(),
            returns_object: returns_object(f),
        };
        let obj = vm.alloc_normal_function(shape);
        vm.register_function(name, f.global_slot as u32, obj);
        objects.push(obj);
    }
    Ok(objects)
}

fn emit_function(f: &LirFunction, vm: &mut Vm) -> GenResult<Blob> {
    let mut b = BitcodeBuilder::new();
    let scratch_obj_slot = f.object_slot_count;
    let extra_prim_slots = f.prim_slot_count.saturating_sub(f.param_count);
    b.emit_frame(extra_prim_slots as i32, (f.object_slot_count + 1) as i32, HERE);

    let mut block_offsets = vec![0u32; f.blocks.len()];
    let mut pending_jumps: Vec<(usize, usize)> = Vec::new();

    for (block_index, block) in f.blocks.iter().enumerate() {
        block_offsets[block_index] = b.current_offset();
        for instr in &block.instrs {
            emit_instr(&mut b, instr, vm, scratch_obj_slot, &mut pending_jumps)?;
        }
    }

    for (instr_index, target_block) in pending_jumps {
        let target_offset = *block_offsets
            .get(target_block)
            .ok_or(GenError::Internal("jump targets a block index past the end of the function"))?;
        b.patch_jmp_target(instr_index, Label::from_offset(target_offset));
    }

    Ok(Blob::from_builder(b))
}

fn emit_instr(
    b: &mut BitcodeBuilder,
    instr: &LirInstr,
    vm: &mut Vm,
    scratch_obj_slot: u16,
    pending_jumps: &mut Vec<(usize, usize)>,
) -> GenResult<()> {
    match instr {
        LirInstr::LoadConst { dst, value } => emit_load_const(b, *dst, value, vm),
        LirInstr::Move { dst, src } => {
            match dst.kind {
                SlotKind::Prim => b.emit_mov_prim(dst.index as i32, src.index as i32, HERE),
                SlotKind::Object => b.emit_mov_obj(dst.index as i32, src.index as i32, HERE),
            }
            Ok(())
        }
        LirInstr::BinOp { dst, op, lhs, rhs } => {
            match map_binop(op) {
                BinOpKind::Arith(arith) => b.emit_arith(Width::I64, arith, dst.index, lhs.index, rhs.index, HERE),
                BinOpKind::Cmp(cmp) => b.emit_cmp(Width::I64, cmp, dst.index, lhs.index, rhs.index, HERE),
            }
            Ok(())
        }
        LirInstr::Call { dst, func_slot, args } => {
            emit_call_instr(b, *dst, *func_slot, args, scratch_obj_slot);
            Ok(())
        }
        LirInstr::NewArray { dst, elems } => {
            b.emit_oop(OopOp::ArrayNew, dst.index, 0, 0, HERE);
            for elem in elems {
                let value = encode_value_slot(elem.kind == SlotKind::Object, elem.index);
                b.emit_oop(OopOp::ArrayPush, dst.index, value, 0, HERE);
            }
            Ok(())
        }
        LirInstr::NewMap { dst, entries } => {
            b.emit_oop(OopOp::MapNew, dst.index, 0, 0, HERE);
            for (key, value) in entries {
                let key = encode_value_slot(key.kind == SlotKind::Object, key.index);
                let value = encode_value_slot(value.kind == SlotKind::Object, value.index);
                b.emit_oop(OopOp::MapSet, dst.index, key, value, HERE);
            }
            Ok(())
        }
        LirInstr::Index { dst, base, index } => {
            // `[]` only targets arrays.
            b.emit_oop(OopOp::ArrayGet, dst.index, base.index, index.index, HERE);
            Ok(())
        }
        LirInstr::Return { value } => {
            let slot = value.map(|s| s.index).unwrap_or(0);
            b.emit_ret(slot, HERE);
            Ok(())
        }
        LirInstr::BranchIfFalse { cond, target } => {
            let idx = b.emit_jmp_if_false(cond.index, 0, HERE);
            pending_jumps.push((idx, *target));
            Ok(())
        }
        LirInstr::Jump { target } => {
            let idx = b.emit_jmp(0, HERE);
            pending_jumps.push((idx, *target));
            Ok(())
        }
    }
}

fn emit_load_const(b: &mut BitcodeBuilder, dst: Slot, value: &LirConst, vm: &mut Vm) {
    match value {
        LirConst::Int(v) => {
            let index = vm.const_prim_mut().push(*v as u64);
            b.emit_ld(dst.index, Segment::ConstPrim, index, HERE);
        }
        LirConst::Bool(v) => {
            let index = vm.const_prim_mut().push(*v as u64);
            b.emit_ld(dst.index, Segment::ConstPrim, index, HERE);
        }
        LirConst::Float(v) => {
            let index = vm.const_prim_mut().push(v.to_bits());
            b.emit_ld(dst.index, Segment::ConstPrim, index, HERE);
        }
        LirConst::Str(s) => {
            let obj = vm.alloc_str(s);
            let index = vm.const_obj_mut().push(Some(obj));
            b.emit_ld(dst.index, Segment::ConstObject, index, HERE);
        }
    }
}

/// Stage `args` onto the caller's stacks, load the callee from its global
/// slot into the per-function scratch object local, then `call` it.
/// Mirrors [`ketra_rt::interp::exec`]'s expectation that a `call`'s
/// argument words are already sitting on top of the stack it reads from.
fn emit_call_instr(b: &mut BitcodeBuilder, dst: Slot, func_slot: u16, args: &[Slot], scratch_obj_slot: u16) {
    let mut prim_argc = 0u16;
    let mut obj_argc = 0u16;
    for arg in args {
        match arg.kind {
            SlotKind::Prim => {
                b.emit_push_prim(arg.index as i32, HERE);
                prim_argc += 1;
            }
            SlotKind::Object => {
                b.emit_push_obj(arg.index as i32, HERE);
                obj_argc += 1;
            }
        }
    }
    b.emit_ld(scratch_obj_slot, Segment::GlobalObject, func_slot as u32, HERE);
    b.emit_call(scratch_obj_slot, prim_argc, obj_argc, dst.index, HERE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ketra_rt::config::RuntimeConfig;
    use ketra_rt::object::Slot as RtSlot;

    fn expect_prim(slot: RtSlot) -> u64 {
        match slot {
            RtSlot::Prim(v) => v,
            RtSlot::Obj(_) => panic!("expected a primitive result, got an object slot"),
        }
    }

    fn compile_source(source: &str) -> (Vm, Vec<ObjectRef>, std::collections::HashMap<String, usize>) {
        let module = ketra_par::parse(source).unwrap();
        let checked = ketra_sem::check(module).unwrap();
        let mir = ketra_mir::lower(&checked);
        let lir = ketra_lir::lower(&mir).unwrap();
        let mut vm = Vm::with_noop_collector(RuntimeConfig::default());
        let objects = compile(&lir, &mut vm).unwrap();
        let mut index_by_name = std::collections::HashMap::new();
        for f in &lir.functions {
            index_by_name.insert(f.name.clone(), f.global_slot as usize);
        }
        (vm, objects, index_by_name)
    }

    #[test]
    fn runs_straight_line_arithmetic() {
        let (mut vm, objects, names) = compile_source("fn add(a, b) { return a + b; }");
        let f = objects[names["add"]];
        let result = vm.call(f, &[RtSlot::Prim(2), RtSlot::Prim(3)]).unwrap();
        assert_eq!(expect_prim(result), 5);
    }

    #[test]
    fn runs_conditional_branch() {
        let source = "fn max(a, b) { if a < b { return b; } return a; }";
        let (mut vm, objects, names) = compile_source(source);
        let f = objects[names["max"]];
        assert_eq!(expect_prim(vm.call(f, &[RtSlot::Prim(2), RtSlot::Prim(9)]).unwrap()), 9);
        assert_eq!(expect_prim(vm.call(f, &[RtSlot::Prim(9), RtSlot::Prim(2)]).unwrap()), 9);
    }

    #[test]
    fn runs_while_loop_accumulation() {
        let source =
            "fn sum_to(n) { let acc = 0; let i = 0; while i < n { let acc = acc + i; let i = i + 1; } return acc; }";
        let (mut vm, objects, names) = compile_source(source);
        let f = objects[names["sum_to"]];
        // sum_to(5) = 0+1+2+3+4 = 10
        assert_eq!(expect_prim(vm.call(f, &[RtSlot::Prim(5)]).unwrap()), 10);
    }

    #[test]
    fn runs_function_call_between_functions() {
        let source = "fn add(a, b) { return a + b; } fn triple_add(a, b, c) { return add(add(a, b), c); }";
        let (mut vm, objects, names) = compile_source(source);
        let f = objects[names["triple_add"]];
        let result = vm.call(f, &[RtSlot::Prim(1), RtSlot::Prim(2), RtSlot::Prim(3)]).unwrap();
        assert_eq!(expect_prim(result), 6);
    }
}
