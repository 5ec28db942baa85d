//! ketra-mir — a three-address mid-level IR lowered from the checked AST.
//!
//! Every expression becomes a chain of single-operation [`Instr`]s writing
//! into a fresh virtual register, the classic "explode expressions into
//! temporaries" shape that makes later register allocation (`ketra-lir`)
//! and bytecode emission (`ketra-gen`) a mechanical walk instead of a
//! recursive tree match.

use ketra_par::ast::{BinOp, Expr, FunctionDecl, Stmt};
use ketra_sem::CheckedModule;

/// A virtual register: infinitely many, allocated in order, never reused
/// until `ketra-lir` maps them onto real stack slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VReg(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    LoadConst { dst: VReg, value: Const },
    LoadLocal { dst: VReg, name: String },
    BinOp { dst: VReg, op: BinOp, lhs: VReg, rhs: VReg },
    Call { dst: VReg, callee: String, args: Vec<VReg> },
    NewArray { dst: VReg, elems: Vec<VReg> },
    NewMap { dst: VReg, entries: Vec<(VReg, VReg)> },
    Index { dst: VReg, base: VReg, index: VReg },
    StoreLocal { name: String, value: VReg },
    Return { value: Option<VReg> },
    /// `if not(cond) jump to block index target`; blocks are laid out
    /// linearly and resolved to absolute pcs in `ketra-lir`.
    BranchIfFalse { cond: VReg, target: usize },
    Jump { target: usize },
    Label,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub instrs: Vec<Instr>,
}

#[derive(Debug, Clone)]
pub struct MirFunction {
    pub name: String,
    pub params: Vec<String>,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Default)]
pub struct MirModule {
    pub functions: Vec<MirFunction>,
}

struct Builder {
    next_reg: u32,
    blocks: Vec<Block>,
    current: usize,
}

impl Builder {
    fn new() -> Self {
        Builder { next_reg: 0, blocks: vec![Block::default()], current: 0 }
    }

    fn fresh(&mut self) -> VReg {
        let r = VReg(self.next_reg);
        self.next_reg += 1;
        r
    }

    fn emit(&mut self, instr: Instr) {
        self.blocks[self.current].instrs.push(instr);
    }

    fn new_block(&mut self) -> usize {
        self.blocks.push(Block::default());
        self.blocks.len() - 1
    }

    fn lower_expr(&mut self, expr: &Expr) -> VReg {
        match expr {
            Expr::Int(v) => {
                let dst = self.fresh();
                self.emit(Instr::LoadConst { dst, value: Const::Int(*v) });
                dst
            }
            Expr::Float(v) => {
                let dst = self.fresh();
                self.emit(Instr::LoadConst { dst, value: Const::Float(*v) });
                dst
            }
            Expr::Bool(v) => {
                let dst = self.fresh();
                self.emit(Instr::LoadConst { dst, value: Const::Bool(*v) });
                dst
            }
            Expr::Str(v) => {
                let dst = self.fresh();
                self.emit(Instr::LoadConst { dst, value: Const::Str(v.clone()) });
                dst
            }
            Expr::Ident(name) => {
                let dst = self.fresh();
                self.emit(Instr::LoadLocal { dst, name: name.clone() });
                dst
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let lhs = self.lower_expr(lhs);
                let rhs = self.lower_expr(rhs);
                let dst = self.fresh();
                self.emit(Instr::BinOp { dst, op: op.clone(), lhs, rhs });
                dst
            }
            Expr::Call { callee, args, .. } => {
                let args = args.iter().map(|a| self.lower_expr(a)).collect();
                let dst = self.fresh();
                self.emit(Instr::Call { dst, callee: callee.clone(), args });
                dst
            }
            Expr::ArrayLit(elems) => {
                let elems = elems.iter().map(|e| self.lower_expr(e)).collect();
                let dst = self.fresh();
                self.emit(Instr::NewArray { dst, elems });
                dst
            }
            Expr::MapLit(entries) => {
                let entries = entries.iter().map(|(k, v)| (self.lower_expr(k), self.lower_expr(v))).collect();
                let dst = self.fresh();
                self.emit(Instr::NewMap { dst, entries });
                dst
            }
            Expr::Index { base, index, .. } => {
                let base = self.lower_expr(base);
                let index = self.lower_expr(index);
                let dst = self.fresh();
                self.emit(Instr::Index { dst, base, index });
                dst
            }
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, value } => {
                let v = self.lower_expr(value);
                self.emit(Instr::StoreLocal { name: name.clone(), value: v });
            }
            Stmt::ExprStmt(e) => {
                self.lower_expr(e);
            }
            Stmt::Return(Some(e)) => {
                let v = self.lower_expr(e);
                self.emit(Instr::Return { value: Some(v) });
            }
            Stmt::Return(None) => self.emit(Instr::Return { value: None }),
            Stmt::If { cond, then_body, else_body } => {
                let c = self.lower_expr(cond);
                let after_cond = self.current;
                let then_idx = self.new_block();
                self.current = then_idx;
                for s in then_body {
                    self.lower_stmt(s);
                }
                let end_then = self.current;
                let else_idx = self.new_block();
                self.current = else_idx;
                for s in else_body {
                    self.lower_stmt(s);
                }
                let end_else = self.current;
                let join = self.new_block();
                self.blocks[after_cond].instrs.push(Instr::BranchIfFalse { cond: c, target: else_idx });
                self.blocks[end_then].instrs.push(Instr::Jump { target: join });
                self.blocks[end_else].instrs.push(Instr::Jump { target: join });
                self.current = join;
            }
            Stmt::While { cond, body } => {
                let header = self.new_block();
                self.blocks[self.current].instrs.push(Instr::Jump { target: header });
                self.current = header;
                let c = self.lower_expr(cond);
                let body_idx = self.new_block();
                let exit_idx_placeholder = self.blocks.len(); // patched below
                self.blocks[header].instrs.push(Instr::BranchIfFalse { cond: c, target: exit_idx_placeholder });
                self.current = body_idx;
                for s in body {
                    self.lower_stmt(s);
                }
                self.blocks[self.current].instrs.push(Instr::Jump { target: header });
                let exit = self.new_block();
                if let Some(Instr::BranchIfFalse { target, .. }) =
                    self.blocks[header].instrs.iter_mut().find(|i| matches!(i, Instr::BranchIfFalse { .. }))
                {
                    *target = exit;
                }
                self.current = exit;
            }
        }
    }
}

pub fn lower(checked: &CheckedModule) -> MirModule {
    let mut module = MirModule::default();
    for f in &checked.module.functions {
        module.functions.push(lower_function(f));
    }
    module
}

fn lower_function(f: &FunctionDecl) -> MirFunction {
    let mut builder = Builder::new();
    for s in &f.body {
        builder.lower_stmt(s);
    }
    MirFunction { name: f.name.clone(), params: f.params.iter().map(|p| p.name.clone()).collect(), blocks: builder.blocks }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowers_arithmetic_to_three_address_form() {
        let module = ketra_par::parse("fn add(a, b) { return a + b; }").unwrap();
        let checked = ketra_sem::check(module).unwrap();
        let mir = lower(&checked);
        let f = &mir.functions[0];
        assert!(f.blocks[0].instrs.iter().any(|i| matches!(i, Instr::BinOp { op: BinOp::Add, .. })));
        assert!(matches!(f.blocks[0].instrs.last(), Some(Instr::Return { value: Some(_) })));
    }
}
