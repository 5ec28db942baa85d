//! The instruction dispatch loop.
//!
//! One `run` call drives a [`Thread`] until its outermost frame returns.
//! Every opcode handler is a short, flat match arm, dispatched with a plain
//! `match` over [`Instruction`] rather than a computed-goto table — there
//! is no JIT here, and a match compiles to a jump table on any optimizing
//! backend anyway.

use std::rc::Rc;

use crate::bytecode::{ArithOp, Blob, Comparator, Instruction, Opcode, OopOp, Segment, Width};
use crate::error::{RtError, RtResult};
use crate::interp::{Machine, Thread};
use crate::native;
use crate::object::shapes::{ClosureShape, MapShape, StrShape, UnionShape, UpValueShape, WeakMapShape};
use crate::object::{ObjectPayload, ObjectRef, Slot};

/// Resolve a callee object (a `NormalFunction` or a `Closure` wrapping
/// one) to the blob it executes and the upvalues visible while it runs.
fn resolve_callee(callee: ObjectRef) -> RtResult<(Rc<Blob>, Vec<ObjectRef>)> {
    match callee.payload() {
        ObjectPayload::NormalFunction(f) => Ok((Rc::clone(&f.blob), Vec::new())),
        ObjectPayload::Closure(ClosureShape { function: Some(function), upvalues }) => {
            match function.payload() {
                ObjectPayload::NormalFunction(f) => Ok((Rc::clone(&f.blob), upvalues.clone())),
                _ => Err(RtError::TypeMismatch { expected: "function", found: function.kind() }),
            }
        }
        _ => Err(RtError::TypeMismatch { expected: "function", found: callee.kind() }),
    }
}

/// Whether `callee`'s `ret` writes to the object stack, read off the
/// underlying `NormalFunctionShape` regardless of whether `callee` is the
/// function itself or a closure wrapping it.
fn returns_object(callee: ObjectRef) -> RtResult<bool> {
    match callee.payload() {
        ObjectPayload::NormalFunction(f) => Ok(f.returns_object),
        ObjectPayload::Closure(ClosureShape { function: Some(function), .. }) => match function.payload() {
            ObjectPayload::NormalFunction(f) => Ok(f.returns_object),
            _ => Err(RtError::TypeMismatch { expected: "function", found: function.kind() }),
        },
        _ => Err(RtError::TypeMismatch { expected: "function", found: callee.kind() }),
    }
}

fn read_segment(machine: &Machine, segment: Segment, index: u32, is_object: bool) -> RtResult<Slot> {
    match (segment, is_object) {
        (Segment::GlobalPrim, false) => Ok(Slot::Prim(machine.global_prim.get(index)?)),
        (Segment::GlobalObject, true) => Ok(Slot::Obj(machine.global_obj.get(index)?)),
        (Segment::ConstPrim, false) => Ok(Slot::Prim(machine.const_prim.get(index)?)),
        (Segment::ConstObject, true) => Ok(Slot::Obj(machine.const_obj.get(index)?)),
        _ => Err(RtError::InvalidBlob("ld/st segment does not match requested slot kind")),
    }
}

fn write_segment(machine: &mut Machine, segment: Segment, index: u32, slot: Slot) -> RtResult<()> {
    match (segment, slot) {
        (Segment::GlobalPrim, Slot::Prim(v)) => machine.global_prim.set(index, v),
        (Segment::GlobalObject, Slot::Obj(v)) => machine.global_obj.set(index, v),
        _ => Err(RtError::InvalidBlob("st segment does not match requested slot kind (or is read-only)")),
    }
}

fn arith_prim(width: Width, op: ArithOp, a: u64, b: u64) -> RtResult<u64> {
    if width.is_float() {
        let (x, y) = if matches!(width, Width::F32) {
            (f32::from_bits(a as u32) as f64, f32::from_bits(b as u32) as f64)
        } else {
            (f64::from_bits(a), f64::from_bits(b))
        };
        let result = match op {
            ArithOp::Add => x + y,
            ArithOp::Sub => x - y,
            ArithOp::Mul => x * y,
            ArithOp::Div => x / y,
            ArithOp::Rem => x % y,
            ArithOp::Neg => -x,
            _ => return Err(RtError::InvalidBlob("bitwise op on a float width")),
        };
        Ok(if matches!(width, Width::F32) { (result as f32).to_bits() as u64 } else { result.to_bits() })
    } else {
        let (x, y) = (a as i64, b as i64);
        let result = match op {
            ArithOp::Add => x.wrapping_add(y),
            ArithOp::Sub => x.wrapping_sub(y),
            ArithOp::Mul => x.wrapping_mul(y),
            ArithOp::Div => {
                if y == 0 {
                    return Err(RtError::DivideByZero);
                }
                x.wrapping_div(y)
            }
            ArithOp::Rem => {
                if y == 0 {
                    return Err(RtError::DivideByZero);
                }
                x.wrapping_rem(y)
            }
            ArithOp::Neg => x.wrapping_neg(),
            ArithOp::BitAnd => x & y,
            ArithOp::BitOr => x | y,
            ArithOp::BitXor => x ^ y,
            ArithOp::BitNot => !x,
            ArithOp::Shl => x.wrapping_shl(y as u32),
            ArithOp::Shr => x.wrapping_shr(y as u32),
        };
        Ok(result as u64)
    }
}

fn cmp_prim(width: Width, cmp: Comparator, a: u64, b: u64) -> bool {
    if width.is_float() {
        let (x, y) = if matches!(width, Width::F32) {
            (f32::from_bits(a as u32) as f64, f32::from_bits(b as u32) as f64)
        } else {
            (f64::from_bits(a), f64::from_bits(b))
        };
        match cmp {
            Comparator::Eq => x == y,
            Comparator::Ne => x != y,
            Comparator::Lt => x < y,
            Comparator::Le => x <= y,
            Comparator::Gt => x > y,
            Comparator::Ge => x >= y,
        }
    } else {
        let (x, y) = (a as i64, b as i64);
        match cmp {
            Comparator::Eq => x == y,
            Comparator::Ne => x != y,
            Comparator::Lt => x < y,
            Comparator::Le => x <= y,
            Comparator::Gt => x > y,
            Comparator::Ge => x >= y,
        }
    }
}

/// Run `thread` to completion starting from whatever frame is already on
/// top of its call stack (set up by [`crate::vm::Vm::call`]).
pub fn run(thread: &mut Thread, machine: &mut Machine) -> RtResult<Slot> {
    loop {
        let frame = *thread.current_frame();
        let (blob, upvalues) = resolve_callee(frame.callee)?;
        if frame.pc as usize >= blob.len() {
            return Err(RtError::InvalidBlob("pc ran off the end of the function body"));
        }
        let inst = blob.decode_at(frame.pc);
        thread.current_frame_mut().pc += 1;

        match inst {
            Instruction::Wide { opcode: Opcode::Nop, .. } => {}

            Instruction::Narrow { opcode: Opcode::MovPrim, s1, s2 } => {
                let v = thread.local_prim(s2)?;
                thread.set_local_prim(s1, v)?;
            }
            Instruction::Narrow { opcode: Opcode::MovObj, s1, s2 } => {
                let v = thread.local_obj(s2)?;
                thread.set_local_obj(s1, v)?;
            }
            Instruction::Narrow { opcode: Opcode::PushPrim, s2, .. } => {
                let v = thread.local_prim(s2)?;
                thread.prim.push(v);
            }
            Instruction::Narrow { opcode: Opcode::PushObj, s2, .. } => {
                let v = thread.local_obj(s2)?;
                thread.obj.push(v);
            }
            Instruction::Narrow { opcode: Opcode::Frame, s1, s2 } => {
                for _ in 0..s1.max(0) {
                    thread.prim.push(0);
                }
                for _ in 0..s2.max(0) {
                    thread.obj.push(None);
                }
            }

            Instruction::Wide { opcode: Opcode::Ld, result, op1, op2 } => {
                let segment = Segment::from_bits(op1 as u8);
                let is_object = matches!(
                    segment,
                    Segment::GlobalObject | Segment::ConstObject | Segment::UpObject | Segment::LocalObject
                );
                let slot = match segment {
                    Segment::UpPrim => {
                        let cell = upvalues.get(op2 as usize).copied().ok_or(RtError::InvalidBlob("upvalue index out of range"))?;
                        Slot::Prim(read_upvalue_prim(thread, cell)?)
                    }
                    Segment::UpObject => {
                        let cell = upvalues.get(op2 as usize).copied().ok_or(RtError::InvalidBlob("upvalue index out of range"))?;
                        Slot::Obj(read_upvalue_obj(thread, cell)?)
                    }
                    Segment::LocalPrim => Slot::Prim(thread.local_prim(op2 as i32)?),
                    Segment::LocalObject => Slot::Obj(thread.local_obj(op2 as i32)?),
                    other => read_segment(machine, other, op2, is_object)?,
                };
                write_result(thread, result, slot)?;
            }
            Instruction::Wide { opcode: Opcode::St, result, op1, op2 } => {
                let segment = Segment::from_bits(op1 as u8);
                let is_object = matches!(
                    segment,
                    Segment::GlobalObject | Segment::ConstObject | Segment::UpObject | Segment::LocalObject
                );
                let value = thread.local_slot(is_object, result as i32)?;
                match segment {
                    Segment::LocalPrim => {
                        if let Slot::Prim(v) = value {
                            thread.set_local_prim(op2 as i32, v)?;
                        }
                    }
                    Segment::LocalObject => {
                        if let Slot::Obj(v) = value {
                            thread.set_local_obj(op2 as i32, v)?;
                        }
                    }
                    other => write_segment(machine, other, op2, value)?,
                }
            }

            Instruction::Wide { opcode: Opcode::Arith, result, op1, op2 } => {
                let width = Width::from_bits(((op2 >> 24) & 0xFF) as u8);
                let op = ArithOp::from_bits(((op2 >> 16) & 0xFF) as u8);
                let a = thread.local_prim(op1 as i32)?;
                let b = thread.local_prim((op2 & 0xFFFF) as i32)?;
                let v = arith_prim(width, op, a, b)?;
                thread.set_local_prim(result as i32, v)?;
            }
            Instruction::Wide { opcode: Opcode::Cmp, result, op1, op2 } => {
                let width = Width::from_bits(((op2 >> 24) & 0xFF) as u8);
                let cmp = Comparator::from_bits(((op2 >> 16) & 0xFF) as u8);
                let a = thread.local_prim(op1 as i32)?;
                let b = thread.local_prim((op2 & 0xFFFF) as i32)?;
                thread.set_local_prim(result as i32, cmp_prim(width, cmp, a, b) as u64)?;
            }

            Instruction::Wide { opcode: Opcode::Jmp, op2, .. } => {
                if op2 <= frame.pc {
                    machine.trace.record_loop_hit(0, op2);
                }
                thread.current_frame_mut().pc = op2;
            }
            Instruction::Wide { opcode: Opcode::JmpIfFalse, result, op2, .. } => {
                if thread.local_prim(result as i32)? == 0 {
                    thread.current_frame_mut().pc = op2;
                }
            }
            Instruction::Wide { opcode: Opcode::JmpIfTrue, result, op2, .. } => {
                if thread.local_prim(result as i32)? != 0 {
                    thread.current_frame_mut().pc = op2;
                }
            }

            Instruction::Wide { opcode: Opcode::Call, result, op1, op2 } => {
                let callee = thread.local_obj(op1 as i32)?.ok_or(RtError::InvalidBlob("call target is null"))?;
                // `op2` packs prim_argc:16 | obj_argc:16. The emitter
                // evaluates every argument onto the *caller's* stacks
                // immediately before `call`, so the args already sitting
                // on top of each stack become the callee's first frame
                // slots once the base moves past them.
                let prim_argc = (op2 >> 16) as usize;
                let obj_argc = (op2 & 0xFFFF) as usize;
                let new_base_prim = thread.prim.len().checked_sub(prim_argc).ok_or(RtError::StackUnderflow)?;
                let new_base_obj = thread.obj.len().checked_sub(obj_argc).ok_or(RtError::StackUnderflow)?;
                let result_is_object = returns_object(callee)?;
                thread.push_frame(crate::interp::Frame {
                    callee,
                    pc: 0,
                    base_prim: new_base_prim,
                    base_obj: new_base_obj,
                    result_is_object,
                    result_slot: result,
                });
                if thread.frames.len() > machine.config.max_stack_frames {
                    return Err(RtError::StackOverflow {
                        depth: thread.frames.len(),
                        limit: machine.config.max_stack_frames,
                    });
                }
            }
            Instruction::Wide { opcode: Opcode::CallNative, result, op1, op2 } => {
                let callee = thread.local_obj(op1 as i32)?.ok_or(RtError::InvalidBlob("call target is null"))?;
                let ObjectPayload::NativeFunction(native_fn) = callee.payload() else {
                    return Err(RtError::TypeMismatch { expected: "native_function", found: callee.kind() });
                };
                let argc = op2 as usize;
                let base = thread.obj.len().saturating_sub(argc);
                let mut args = Vec::with_capacity(argc);
                for i in 0..argc {
                    args.push(thread.obj.get(base + i)?.map(Slot::Obj).unwrap_or(Slot::Obj(None)));
                }
                let value = native::dispatch(native_fn.signature, native_fn.func, machine.factory, machine.registry, &args)?;
                write_result(thread, result, value)?;
            }
            Instruction::Wide { opcode: Opcode::Ret, result, .. } => {
                // Whether `result` indexes the prim or object stack was
                // fixed at `call` time (from the callee's own
                // `returns_object`) and stored on this frame, since a bare
                // opcode word has no room for a type tag here.
                let is_object = thread.current_frame().result_is_object;
                let value = thread.local_slot(is_object, result as i32)?;
                let returning_frame = thread.pop_frame().expect("current frame exists");
                thread.prim.truncate(returning_frame.base_prim);
                thread.obj.truncate(returning_frame.base_obj);
                machine.factory.evict_upvalues_from(returning_frame.base_prim, returning_frame.base_obj);
                if thread.frames.is_empty() {
                    return Ok(value);
                }
                write_result(thread, returning_frame.result_slot, value)?;
            }

            Instruction::Wide { opcode: Opcode::CloseFn, result, op1, .. } => {
                let template = thread.local_obj(op1 as i32)?.ok_or(RtError::InvalidBlob("close_fn template is null"))?;
                let ObjectPayload::NormalFunction(shape) = template.payload() else {
                    return Err(RtError::TypeMismatch { expected: "function", found: template.kind() });
                };
                let mut cells = Vec::with_capacity(shape.upvalues.len());
                for descriptor in &shape.upvalues {
                    cells.push(close_descriptor(thread, machine, *descriptor)?);
                }
                let closure = machine.factory.alloc_closure(machine.registry, template, cells);
                thread.set_local_obj(result as i32, Some(closure))?;
            }

            Instruction::Wide { opcode: Opcode::Oop, result, op1, op2 } => {
                let op = OopOp::from_bits(((op2 >> 16) & 0xFF) as u8);
                exec_oop(thread, machine, op, result, op1, (op2 & 0xFFFF) as u16)?;
            }

            Instruction::Wide { opcode: Opcode::GcTick, .. } => {
                let roots = collect_roots(thread, machine);
                machine.gc.step(machine.registry, &roots);
            }
            Instruction::Wide { opcode: Opcode::FullGc, .. } => {
                let roots = collect_roots(thread, machine);
                machine.gc.full_gc(machine.registry, &roots);
            }
            Instruction::Wide { opcode: Opcode::Halt, .. } => {
                return Ok(Slot::Prim(0));
            }

            other => return Err(invalid_combination(other)),
        }
    }
}

fn invalid_combination(inst: Instruction) -> RtError {
    let _ = inst;
    RtError::InvalidBlob("instruction used an encoding its opcode does not support")
}

fn write_result(thread: &mut Thread, slot: u16, value: Slot) -> RtResult<()> {
    match value {
        Slot::Prim(v) => thread.set_local_prim(slot as i32, v),
        Slot::Obj(v) => thread.set_local_obj(slot as i32, v),
    }
}

fn read_upvalue_prim(_thread: &Thread, cell: ObjectRef) -> RtResult<u64> {
    match cell.payload() {
        ObjectPayload::UpValue(UpValueShape::Closed { value: Slot::Prim(v) }) => Ok(*v),
        _ => Err(RtError::InvalidBlob("upvalue does not hold a primitive")),
    }
}

fn read_upvalue_obj(_thread: &Thread, cell: ObjectRef) -> RtResult<Option<ObjectRef>> {
    match cell.payload() {
        ObjectPayload::UpValue(UpValueShape::Closed { value: Slot::Obj(v) }) => Ok(*v),
        _ => Err(RtError::InvalidBlob("upvalue does not hold an object")),
    }
}

/// The identity `close_fn` caches a closed-over local binding under: which
/// stack it lives on plus its absolute (frame-base-relative) address, valid
/// for exactly as long as the owning frame is on the call stack.
fn upvalue_unique_id(is_object: bool, absolute_slot: usize) -> u64 {
    ((is_object as u64) << 63) | absolute_slot as u64
}

fn close_descriptor(
    thread: &Thread,
    machine: &mut Machine,
    descriptor: crate::object::shapes::UpvalueDescriptor,
) -> RtResult<ObjectRef> {
    use crate::object::shapes::UpvalueDescriptor::*;
    match descriptor {
        ParentLocal { slot, is_object } => {
            let frame = thread.current_frame();
            let (absolute, value) = if is_object {
                let absolute = frame.base_obj + slot as usize;
                (absolute, Slot::Obj(thread.obj.get(absolute)?))
            } else {
                let absolute = frame.base_prim + slot as usize;
                (absolute, Slot::Prim(thread.prim.get(absolute)?))
            };
            let id = upvalue_unique_id(is_object, absolute);
            Ok(machine.factory.get_or_new_upvalue(machine.registry, id, value))
        }
        ParentUpvalue { index } => {
            let ObjectPayload::Closure(ClosureShape { upvalues, .. }) = thread.current_frame().callee.payload() else {
                return Err(RtError::InvalidBlob("parent upvalue capture outside a closure frame"));
            };
            upvalues.get(index as usize).copied().ok_or(RtError::InvalidBlob("parent upvalue index out of range"))
        }
    }
}

fn collect_roots(thread: &Thread, machine: &Machine) -> Vec<ObjectRef> {
    thread.roots().chain(machine.global_obj.roots()).chain(machine.const_obj.roots()).collect()
}

/// Apply §4.9's write-barrier policy in one place: every store of an object
/// reference into a field of an *already allocated* heap object (as opposed
/// to a field initialized at construction time) must shade/promote the
/// referent through the collector. Root-level stores (locals, globals) need
/// no barrier of their own — `Msg`'s `Atomic` phase re-roots from the live
/// thread/segment state before every sweep, so a root can never go stale
/// between one `gc_tick` and the next.
fn barrier_store(machine: &mut Machine, holder: ObjectRef, value: Slot) {
    if let Slot::Obj(Some(referent)) = value {
        machine.gc.write_barrier(machine.registry, holder, referent);
    }
}

/// The reserved union tag `MapGet` wraps a missing-key `Error` in, distinct
/// from any tag a compiled program assigns its own declared unions (those
/// are emitted as small increasing indices from 0 — see `ketra-gen`).
const MAP_MISSING_KEY_TAG: u32 = u32::MAX;

fn exec_oop(
    thread: &mut Thread,
    machine: &mut Machine,
    op: OopOp,
    result: u16,
    op1: u16,
    op2: u16,
) -> RtResult<()> {
    match op {
        OopOp::ArrayNew => {
            let arr = machine.factory.alloc_array(machine.registry, Vec::new());
            thread.set_local_obj(result as i32, Some(arr))?;
        }
        OopOp::ArrayPush => {
            let mut target = thread.local_obj(result as i32)?.ok_or(RtError::InvalidBlob("array_push on null"))?;
            let value = read_value_slot(thread, op1)?;
            match target.payload_mut() {
                ObjectPayload::Array(a) => a.elems.push(value),
                _ => return Err(RtError::TypeMismatch { expected: "array", found: target.kind() }),
            }
            barrier_store(machine, target, value);
        }
        OopOp::ArrayGet => {
            let target = thread.local_obj(op1 as i32)?.ok_or(RtError::InvalidBlob("array_get on null"))?;
            let index = thread.local_prim(op2 as i32)? as i64;
            match target.payload() {
                ObjectPayload::Array(a) => {
                    let elem = a
                        .elems
                        .get(index as usize)
                        .copied()
                        .ok_or(RtError::IndexOutOfBounds { index, len: a.elems.len() })?;
                    write_result(thread, result, elem)?;
                }
                _ => return Err(RtError::TypeMismatch { expected: "array", found: target.kind() }),
            }
        }
        OopOp::ArraySet => {
            let mut target = thread.local_obj(result as i32)?.ok_or(RtError::InvalidBlob("array_set on null"))?;
            let index = thread.local_prim(op1 as i32)? as i64;
            let value = read_value_slot(thread, op2)?;
            match target.payload_mut() {
                ObjectPayload::Array(a) => {
                    let len = a.elems.len();
                    let slot = a.elems.get_mut(index as usize).ok_or(RtError::IndexOutOfBounds { index, len })?;
                    *slot = value;
                }
                _ => return Err(RtError::TypeMismatch { expected: "array", found: target.kind() }),
            }
            barrier_store(machine, target, value);
        }
        OopOp::ArrayDirectSet => {
            let mut target = thread.local_obj(result as i32)?.ok_or(RtError::InvalidBlob("array_direct_set on null"))?;
            let index = op1 as usize;
            let value = read_value_slot(thread, op2)?;
            match target.payload_mut() {
                ObjectPayload::Array(a) => {
                    let len = a.elems.len();
                    let slot = a.elems.get_mut(index).ok_or(RtError::IndexOutOfBounds { index: index as i64, len })?;
                    *slot = value;
                }
                _ => return Err(RtError::TypeMismatch { expected: "array", found: target.kind() }),
            }
            barrier_store(machine, target, value);
        }
        OopOp::ArrayLen => {
            let target = thread.local_obj(op1 as i32)?.ok_or(RtError::InvalidBlob("array_len on null"))?;
            match target.payload() {
                ObjectPayload::Array(a) => thread.set_local_prim(result as i32, a.elems.len() as u64)?,
                _ => return Err(RtError::TypeMismatch { expected: "array", found: target.kind() }),
            }
        }
        OopOp::MapNew => {
            let map = machine.factory.alloc_map(machine.registry);
            thread.set_local_obj(result as i32, Some(map))?;
        }
        OopOp::MapSet => {
            let mut target = thread.local_obj(result as i32)?.ok_or(RtError::InvalidBlob("map_set on null"))?;
            let key = read_value_slot(thread, op1)?;
            let value = read_value_slot(thread, op2)?;
            check_map_key(key)?;
            match target.payload_mut() {
                ObjectPayload::Map(MapShape { entries }) => {
                    if let Some(slot) = entries.iter_mut().find(|(k, _)| slot_eq(*k, key)) {
                        slot.1 = value;
                    } else {
                        entries.push((key, value));
                    }
                }
                _ => return Err(RtError::TypeMismatch { expected: "map", found: target.kind() }),
            }
            barrier_store(machine, target, key);
            barrier_store(machine, target, value);
        }
        OopOp::MapGet => {
            let target = thread.local_obj(op1 as i32)?.ok_or(RtError::InvalidBlob("map_get on null"))?;
            let key = read_value_slot(thread, op2)?;
            match target.payload() {
                ObjectPayload::Map(MapShape { entries }) => {
                    match entries.iter().find(|(k, _)| slot_eq(*k, key)).map(|(_, v)| *v) {
                        Some(found) => write_result(thread, result, found)?,
                        None => {
                            let message = machine.factory.alloc_str(machine.registry, "key not found");
                            let file = machine.factory.alloc_str(machine.registry, "");
                            let error = machine.factory.alloc_error(
                                machine.registry,
                                message,
                                file,
                                ketra_util::source::SourcePosition::UNKNOWN,
                                None,
                            );
                            let wrapped =
                                machine.factory.alloc_union(machine.registry, MAP_MISSING_KEY_TAG, Slot::Obj(Some(error)));
                            write_result(thread, result, Slot::Obj(Some(wrapped)))?;
                        }
                    }
                }
                _ => return Err(RtError::TypeMismatch { expected: "map", found: target.kind() }),
            }
        }
        OopOp::MapSize => {
            let target = thread.local_obj(op1 as i32)?.ok_or(RtError::InvalidBlob("map_size on null"))?;
            match target.payload() {
                ObjectPayload::Map(MapShape { entries }) => thread.set_local_prim(result as i32, entries.len() as u64)?,
                _ => return Err(RtError::TypeMismatch { expected: "map", found: target.kind() }),
            }
        }
        OopOp::MapHas => {
            let target = thread.local_obj(op1 as i32)?.ok_or(RtError::InvalidBlob("map_has on null"))?;
            let key = read_value_slot(thread, op2)?;
            match target.payload() {
                ObjectPayload::Map(MapShape { entries }) => {
                    let has = entries.iter().any(|(k, _)| slot_eq(*k, key));
                    thread.set_local_prim(result as i32, has as u64)?;
                }
                _ => return Err(RtError::TypeMismatch { expected: "map", found: target.kind() }),
            }
        }
        OopOp::MapDelete => {
            let mut target = thread.local_obj(result as i32)?.ok_or(RtError::InvalidBlob("map_delete on null"))?;
            let key = read_value_slot(thread, op1)?;
            match target.payload_mut() {
                ObjectPayload::Map(MapShape { entries }) => entries.retain(|(k, _)| !slot_eq(*k, key)),
                _ => return Err(RtError::TypeMismatch { expected: "map", found: target.kind() }),
            }
        }
        OopOp::MapFirstKey => {
            let target = thread.local_obj(op1 as i32)?.ok_or(RtError::InvalidBlob("map_first_key on null"))?;
            match target.payload() {
                // Iteration order is insertion order; `MapNextKey` resumes
                // from `op2` (the previous key's index + 1), so the
                // emitter must treat the result slot's *next* instruction
                // as owning that index (resolved Open Question, see
                // DESIGN.md: "pc+1-skip semantics").
                ObjectPayload::Map(MapShape { entries }) => {
                    match entries.first() {
                        Some((k, _)) => write_result(thread, result, *k)?,
                        None => write_result(thread, result, Slot::Obj(None))?,
                    }
                }
                _ => return Err(RtError::TypeMismatch { expected: "map", found: target.kind() }),
            }
        }
        OopOp::MapNextKey => {
            let target = thread.local_obj(op1 as i32)?.ok_or(RtError::InvalidBlob("map_next_key on null"))?;
            let after = op2 as usize;
            match target.payload() {
                ObjectPayload::Map(MapShape { entries }) => match entries.get(after + 1) {
                    Some((k, _)) => write_result(thread, result, *k)?,
                    None => write_result(thread, result, Slot::Obj(None))?,
                },
                _ => return Err(RtError::TypeMismatch { expected: "map", found: target.kind() }),
            }
        }
        OopOp::WeakMapNew => {
            let map = machine.factory.alloc_weak_map(machine.registry);
            thread.set_local_obj(result as i32, Some(map))?;
        }
        OopOp::WeakMapSet => {
            let mut target = thread.local_obj(result as i32)?.ok_or(RtError::InvalidBlob("weak_map_set on null"))?;
            let key = read_value_slot(thread, op1)?;
            let value = read_value_slot(thread, op2)?;
            match target.payload_mut() {
                ObjectPayload::WeakMap(WeakMapShape { entries }) => {
                    if let Some(slot) = entries.iter_mut().find(|(k, _)| slot_eq(*k, key)) {
                        slot.1 = value;
                    } else {
                        entries.push((key, value));
                    }
                }
                _ => return Err(RtError::TypeMismatch { expected: "weakmap", found: target.kind() }),
            }
        }
        OopOp::WeakMapGet => {
            let target = thread.local_obj(op1 as i32)?.ok_or(RtError::InvalidBlob("weak_map_get on null"))?;
            let key = read_value_slot(thread, op2)?;
            match target.payload() {
                ObjectPayload::WeakMap(WeakMapShape { entries }) => {
                    let found = entries.iter().find(|(k, _)| slot_eq(*k, key)).map(|(_, v)| *v);
                    write_result(thread, result, found.unwrap_or(Slot::Obj(None)))?;
                }
                _ => return Err(RtError::TypeMismatch { expected: "weakmap", found: target.kind() }),
            }
        }
        OopOp::Slice => {
            let target = thread.local_obj(result as i32)?.ok_or(RtError::InvalidBlob("slice on null"))?;
            let begin = thread.local_prim(op1 as i32)? as usize;
            let size = thread.local_prim(op2 as i32)? as usize;
            match target.payload() {
                ObjectPayload::Array(a) => {
                    let end = begin.checked_add(size).filter(|&end| end <= a.elems.len());
                    if end.is_none() {
                        return Err(RtError::IndexOutOfBounds { index: (begin + size) as i64, len: a.elems.len() });
                    }
                }
                _ => return Err(RtError::TypeMismatch { expected: "array", found: target.kind() }),
            }
            let slice = machine.factory.alloc_slice(machine.registry, begin as u32, size as u32, target);
            thread.set_local_obj(result as i32, Some(slice))?;
        }
        OopOp::ToString => {
            let target = thread.local_obj(op1 as i32)?;
            let text = describe(target);
            let obj = machine.factory.alloc_str(machine.registry, &text);
            thread.set_local_obj(result as i32, Some(obj))?;
        }
        OopOp::StrCat => {
            let a = thread.local_obj(op1 as i32)?.ok_or(RtError::InvalidBlob("str_cat on null"))?;
            let b = thread.local_obj(op2 as i32)?.ok_or(RtError::InvalidBlob("str_cat on null"))?;
            let (ObjectPayload::Str(StrShape { bytes: a_bytes, .. }), ObjectPayload::Str(StrShape { bytes: b_bytes, .. })) =
                (a.payload(), b.payload())
            else {
                return Err(RtError::TypeMismatch { expected: "str", found: a.kind() });
            };
            let joined = format!("{a_bytes}{b_bytes}");
            let obj = machine.factory.alloc_str(machine.registry, &joined);
            thread.set_local_obj(result as i32, Some(obj))?;
        }
        OopOp::StrLen => {
            let target = thread.local_obj(op1 as i32)?.ok_or(RtError::InvalidBlob("str_len on null"))?;
            match target.payload() {
                ObjectPayload::Str(s) => thread.set_local_prim(result as i32, s.bytes.len() as u64)?,
                _ => return Err(RtError::TypeMismatch { expected: "str", found: target.kind() }),
            }
        }
        OopOp::UnionOrMerge => {
            let value = read_value_slot(thread, op1)?;
            let tag = op2 as u32;
            let obj = machine.factory.alloc_union(machine.registry, tag, value);
            thread.set_local_obj(result as i32, Some(obj))?;
        }
        OopOp::UnionTest => {
            let target = thread.local_obj(op1 as i32)?.ok_or(RtError::InvalidBlob("union_test on null"))?;
            let tag = op2 as u32;
            match target.payload() {
                ObjectPayload::Union(UnionShape { variant_tag, .. }) => {
                    thread.set_local_prim(result as i32, (*variant_tag == tag) as u64)?
                }
                _ => return Err(RtError::TypeMismatch { expected: "union", found: target.kind() }),
            }
        }
        OopOp::UnionUnbox => {
            let target = thread.local_obj(op1 as i32)?.ok_or(RtError::InvalidBlob("union_unbox on null"))?;
            match target.payload() {
                ObjectPayload::Union(UnionShape { value, .. }) => write_result(thread, result, *value)?,
                _ => return Err(RtError::UnionUnboxMismatch),
            }
        }
    }
    Ok(())
}

/// Decode a 16-bit "value operand" used by the `oop` array/map/weak-map
/// sub-operations (see [`crate::bytecode::value_slot`]).
fn read_value_slot(thread: &Thread, raw: u16) -> RtResult<Slot> {
    let (is_object, index) = crate::bytecode::decode_value_slot(raw);
    thread.local_slot(is_object, index)
}

fn check_map_key(key: Slot) -> RtResult<()> {
    match key {
        Slot::Obj(Some(obj)) if obj.kind().is_map_key_eligible() => Ok(()),
        Slot::Prim(_) => Ok(()),
        Slot::Obj(Some(obj)) => Err(RtError::UnhashableKey(obj.kind())),
        Slot::Obj(None) => Err(RtError::UnhashableKey(crate::object::Kind::Userdata)),
    }
}

fn slot_eq(a: Slot, b: Slot) -> bool {
    match (a, b) {
        (Slot::Prim(x), Slot::Prim(y)) => x == y,
        (Slot::Obj(Some(x)), Slot::Obj(Some(y))) => match (x.payload(), y.payload()) {
            (ObjectPayload::Str(a), ObjectPayload::Str(b)) => a.hash == b.hash && a.bytes == b.bytes,
            _ => x.as_ptr() == y.as_ptr(),
        },
        (Slot::Obj(None), Slot::Obj(None)) => true,
        _ => false,
    }
}

fn describe(target: Option<ObjectRef>) -> String {
    match target {
        None => "null".to_string(),
        Some(obj) => match obj.payload() {
            ObjectPayload::Str(s) => s.bytes.to_string(),
            ObjectPayload::Array(a) => format!("array[{}]", a.elems.len()),
            ObjectPayload::Map(m) => format!("map[{}]", m.entries.len()),
            ObjectPayload::Slice(s) => format!("slice[{}..{}]", s.begin, s.begin + s.size),
            ObjectPayload::Error(e) => format!("error: {}", describe(Some(e.message))),
            ObjectPayload::Union(UnionShape { variant_tag, value }) if *variant_tag == MAP_MISSING_KEY_TAG => {
                match value {
                    Slot::Obj(inner) => describe(*inner),
                    Slot::Prim(_) => "error".to_string(),
                }
            }
            other => format!("{:?}", std::mem::discriminant(other)),
        },
    }
}
