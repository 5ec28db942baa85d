//! ketra-sem — name resolution and the static checks this language
//! requires: every call site resolves to a declared function with matching
//! arity, and every identifier resolves to a local, parameter, or global.
//!
//! This is intentionally a name/arity checker, not a full Hindley-Milner
//! inferencer: `ketra`'s static typing is scalar-shape-level,
//! enforced at the reflection-kind level by `ketra-rt` at run time rather
//! than by a standalone unifier here.

use rustc_hash::FxHashSet;

use ketra_par::ast::{Expr, FunctionDecl, Module, Stmt};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SemError {
    #[error("undefined name {0:?}")]
    UndefinedName(String),
    #[error("call to undeclared function {0:?}")]
    UndeclaredFunction(String),
    #[error("function {name:?} expects {expected} argument(s), found {found}")]
    ArityMismatch { name: String, expected: usize, found: usize },
    #[error("function {0:?} declared more than once")]
    DuplicateFunction(String),
}

pub type SemResult<T> = Result<T, SemError>;

/// The checked module: just the AST plus proof every name resolves. Later
/// phases (`ketra-mir`/`ketra-lir`/`ketra-gen`) consume this rather than a
/// raw `ketra_par::Module`.
#[derive(Debug, PartialEq)]
pub struct CheckedModule {
    pub module: Module,
}

struct Scope<'a> {
    functions: &'a rustc_hash::FxHashMap<String, usize>,
    locals: Vec<FxHashSet<String>>,
}

impl<'a> Scope<'a> {
    fn is_bound(&self, name: &str) -> bool {
        self.locals.iter().any(|scope| scope.contains(name))
    }

    fn push(&mut self) {
        self.locals.push(FxHashSet::default());
    }

    fn pop(&mut self) {
        self.locals.pop();
    }

    fn bind(&mut self, name: &str) {
        self.locals.last_mut().expect("scope stack never empty during a check").insert(name.to_string());
    }
}

pub fn check(module: Module) -> SemResult<CheckedModule> {
    let mut functions = rustc_hash::FxHashMap::default();
    for f in &module.functions {
        if functions.insert(f.name.clone(), f.params.len()).is_some() {
            return Err(SemError::DuplicateFunction(f.name.clone()));
        }
    }

    for f in &module.functions {
        check_function(f, &functions)?;
    }

    Ok(CheckedModule { module })
}

fn check_function(f: &FunctionDecl, functions: &rustc_hash::FxHashMap<String, usize>) -> SemResult<()> {
    let mut scope = Scope { functions, locals: vec![FxHashSet::default()] };
    for p in &f.params {
        scope.bind(&p.name);
    }
    check_block(&f.body, &mut scope)
}

fn check_block(body: &[Stmt], scope: &mut Scope) -> SemResult<()> {
    scope.push();
    for stmt in body {
        check_stmt(stmt, scope)?;
    }
    scope.pop();
    Ok(())
}

fn check_stmt(stmt: &Stmt, scope: &mut Scope) -> SemResult<()> {
    match stmt {
        Stmt::Let { name, value } => {
            check_expr(value, scope)?;
            scope.bind(name);
        }
        Stmt::ExprStmt(e) => check_expr(e, scope)?,
        Stmt::Return(Some(e)) => check_expr(e, scope)?,
        Stmt::Return(None) => {}
        Stmt::If { cond, then_body, else_body } => {
            check_expr(cond, scope)?;
            check_block(then_body, scope)?;
            check_block(else_body, scope)?;
        }
        Stmt::While { cond, body } => {
            check_expr(cond, scope)?;
            check_block(body, scope)?;
        }
    }
    Ok(())
}

fn check_expr(expr: &Expr, scope: &mut Scope) -> SemResult<()> {
    match expr {
        Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Bool(_) => {}
        Expr::Ident(name) => {
            if !scope.is_bound(name) {
                return Err(SemError::UndefinedName(name.clone()));
            }
        }
        Expr::Binary { lhs, rhs, .. } => {
            check_expr(lhs, scope)?;
            check_expr(rhs, scope)?;
        }
        Expr::Call { callee, args, .. } => {
            let expected = scope
                .functions
                .get(callee)
                .copied()
                .ok_or_else(|| SemError::UndeclaredFunction(callee.clone()))?;
            if expected != args.len() {
                return Err(SemError::ArityMismatch { name: callee.clone(), expected, found: args.len() });
            }
            for a in args {
                check_expr(a, scope)?;
            }
        }
        Expr::ArrayLit(elems) => {
            for e in elems {
                check_expr(e, scope)?;
            }
        }
        Expr::MapLit(entries) => {
            for (k, v) in entries {
                check_expr(k, scope)?;
                check_expr(v, scope)?;
            }
        }
        Expr::Index { base, index, .. } => {
            check_expr(base, scope)?;
            check_expr(index, scope)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catches_undefined_variable() {
        let module = ketra_par::parse("fn f() { return x; }").unwrap();
        assert_eq!(check(module), Err(SemError::UndefinedName("x".into())));
    }

    #[test]
    fn catches_arity_mismatch() {
        let module = ketra_par::parse("fn add(a, b) { return a + b; } fn g() { return add(1); }").unwrap();
        assert!(matches!(check(module), Err(SemError::ArityMismatch { .. })));
    }

    #[test]
    fn accepts_well_formed_module() {
        let module = ketra_par::parse("fn add(a, b) { return a + b; } fn main() { return add(1, 2); }").unwrap();
        assert!(check(module).is_ok());
    }
}
