//! `BitcodeBuilder`: the emission-side boundary, with a per-mnemonic emit
//! method and a forward-jump patch list.

use crate::bytecode::inst::Instruction;
use crate::bytecode::opcode::{ArithOp, Comparator, Opcode, OopOp, Segment, Width};

/// An unresolved jump target, patched once its destination is known.
#[derive(Debug, Clone, Copy)]
pub struct Label(usize);

/// Builds a flat `Vec<u64>` of instruction words for one function body.
/// Consumed by `ketra-gen`; nothing in `ketra-rt` itself ever constructs
/// bytecode other than tests.
#[derive(Default)]
pub struct BitcodeBuilder {
    words: Vec<u64>,
    positions: Vec<ketra_util::source::SourcePosition>,
}

fn pack_width_op(width: Width, op: ArithOp) -> u32 {
    (width as u32) << 8 | (op as u32)
}

fn pack_width_cmp(width: Width, cmp: Comparator) -> u32 {
    (width as u32) << 8 | (cmp as u32)
}

fn pack_segment(segment: Segment) -> u32 {
    segment as u32
}

fn pack_oop(op: OopOp) -> u32 {
    op as u32
}

impl Label {
    /// Build a label pointing directly at a known instruction offset, for
    /// callers that already tracked the offset themselves (e.g. tests
    /// building bytecode by hand rather than through `new_label`/`bind_label`).
    pub fn from_offset(offset: u32) -> Label {
        Label(offset as usize)
    }
}

impl BitcodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, inst: Instruction, at: ketra_util::source::SourcePosition) -> usize {
        let index = self.words.len();
        self.words.push(inst.encode());
        self.positions.push(at);
        index
    }

    /// Reserve a label for a not-yet-known jump target.
    pub fn new_label(&self) -> Label {
        Label(usize::MAX)
    }

    /// Bind a reserved label to the current end of the instruction stream.
    pub fn bind_label(&self, _label: Label) -> Label {
        Label(self.words.len())
    }

    pub fn emit_frame(&mut self, prim_slots: i32, obj_slots: i32, at: ketra_util::source::SourcePosition) {
        self.push(Instruction::Narrow { opcode: Opcode::Frame, s1: prim_slots, s2: obj_slots }, at);
    }

    pub fn emit_mov_prim(&mut self, dst: i32, src: i32, at: ketra_util::source::SourcePosition) {
        self.push(Instruction::Narrow { opcode: Opcode::MovPrim, s1: dst, s2: src }, at);
    }

    pub fn emit_mov_obj(&mut self, dst: i32, src: i32, at: ketra_util::source::SourcePosition) {
        self.push(Instruction::Narrow { opcode: Opcode::MovObj, s1: dst, s2: src }, at);
    }

    pub fn emit_push_prim(&mut self, src: i32, at: ketra_util::source::SourcePosition) {
        self.push(Instruction::Narrow { opcode: Opcode::PushPrim, s1: 0, s2: src }, at);
    }

    pub fn emit_push_obj(&mut self, src: i32, at: ketra_util::source::SourcePosition) {
        self.push(Instruction::Narrow { opcode: Opcode::PushObj, s1: 0, s2: src }, at);
    }

    pub fn emit_ld(
        &mut self,
        dst: u16,
        segment: Segment,
        index: u32,
        at: ketra_util::source::SourcePosition,
    ) {
        self.push(
            Instruction::Wide { opcode: Opcode::Ld, result: dst, op1: pack_segment(segment) as u16, op2: index },
            at,
        );
    }

    pub fn emit_st(
        &mut self,
        src: u16,
        segment: Segment,
        index: u32,
        at: ketra_util::source::SourcePosition,
    ) {
        self.push(
            Instruction::Wide { opcode: Opcode::St, result: src, op1: pack_segment(segment) as u16, op2: index },
            at,
        );
    }

    pub fn emit_arith(
        &mut self,
        width: Width,
        op: ArithOp,
        result: u16,
        op1: u16,
        op2: u16,
        at: ketra_util::source::SourcePosition,
    ) {
        self.push(
            Instruction::Wide { opcode: Opcode::Arith, result, op1, op2: pack_width_op(width, op) << 16 | op2 as u32 },
            at,
        );
    }

    pub fn emit_cmp(
        &mut self,
        width: Width,
        cmp: Comparator,
        result: u16,
        op1: u16,
        op2: u16,
        at: ketra_util::source::SourcePosition,
    ) {
        self.push(
            Instruction::Wide { opcode: Opcode::Cmp, result, op1, op2: pack_width_cmp(width, cmp) << 16 | op2 as u32 },
            at,
        );
    }

    pub fn emit_jmp(&mut self, target: u32, at: ketra_util::source::SourcePosition) -> usize {
        self.push(Instruction::Wide { opcode: Opcode::Jmp, result: 0, op1: 0, op2: target }, at)
    }

    pub fn emit_jmp_if_false(&mut self, cond: u16, target: u32, at: ketra_util::source::SourcePosition) -> usize {
        self.push(Instruction::Wide { opcode: Opcode::JmpIfFalse, result: cond, op1: 0, op2: target }, at)
    }

    pub fn emit_jmp_if_true(&mut self, cond: u16, target: u32, at: ketra_util::source::SourcePosition) -> usize {
        self.push(Instruction::Wide { opcode: Opcode::JmpIfTrue, result: cond, op1: 0, op2: target }, at)
    }

    /// Patch a previously emitted jump's target operand in place, once its
    /// destination label has been bound.
    pub fn patch_jmp_target(&mut self, at_index: usize, target: Label) {
        let Instruction::Wide { opcode, result, op1, .. } = Instruction::decode(self.words[at_index]) else {
            panic!("patch_jmp_target on a non-wide instruction");
        };
        self.words[at_index] =
            Instruction::Wide { opcode, result, op1, op2: target.0 as u32 }.encode();
    }

    /// `callee_local_slot` must already hold the callee object (loaded via
    /// a prior `ld`); `prim_argc`/`obj_argc` count the arguments the
    /// emitter pushed onto each stack immediately before this instruction.
    pub fn emit_call(
        &mut self,
        callee_local_slot: u16,
        prim_argc: u16,
        obj_argc: u16,
        result: u16,
        at: ketra_util::source::SourcePosition,
    ) {
        self.push(
            Instruction::Wide {
                opcode: Opcode::Call,
                result,
                op1: callee_local_slot,
                op2: (prim_argc as u32) << 16 | obj_argc as u32,
            },
            at,
        );
    }

    pub fn emit_call_native(&mut self, func_slot: u16, argc: u16, result: u16, at: ketra_util::source::SourcePosition) {
        self.push(
            Instruction::Wide { opcode: Opcode::CallNative, result, op1: func_slot, op2: argc as u32 },
            at,
        );
    }

    pub fn emit_ret(&mut self, value_slot: u16, at: ketra_util::source::SourcePosition) {
        self.push(Instruction::Wide { opcode: Opcode::Ret, result: value_slot, op1: 0, op2: 0 }, at);
    }

    pub fn emit_close_fn(&mut self, dst: u16, template_const_slot: u16, at: ketra_util::source::SourcePosition) {
        self.push(
            Instruction::Wide { opcode: Opcode::CloseFn, result: dst, op1: template_const_slot, op2: 0 },
            at,
        );
    }

    pub fn emit_oop(&mut self, op: OopOp, result: u16, op1: u16, op2: u16, at: ketra_util::source::SourcePosition) {
        self.push(
            Instruction::Wide { opcode: Opcode::Oop, result, op1, op2: pack_oop(op) << 16 | op2 as u32 },
            at,
        );
    }

    pub fn emit_gc_tick(&mut self, at: ketra_util::source::SourcePosition) {
        self.push(Instruction::Wide { opcode: Opcode::GcTick, result: 0, op1: 0, op2: 0 }, at);
    }

    pub fn emit_full_gc(&mut self, at: ketra_util::source::SourcePosition) {
        self.push(Instruction::Wide { opcode: Opcode::FullGc, result: 0, op1: 0, op2: 0 }, at);
    }

    pub fn emit_halt(&mut self, at: ketra_util::source::SourcePosition) {
        self.push(Instruction::Wide { opcode: Opcode::Halt, result: 0, op1: 0, op2: 0 }, at);
    }

    pub fn current_offset(&self) -> u32 {
        self.words.len() as u32
    }

    pub fn finish(self) -> (Vec<u64>, Vec<ketra_util::source::SourcePosition>) {
        (self.words, self.positions)
    }
}
