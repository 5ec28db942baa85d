use ketra_util::source::SourcePosition;

#[derive(Debug, Clone, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Ident(String),
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr>, pos: SourcePosition },
    Call { callee: String, args: Vec<Expr>, pos: SourcePosition },
    ArrayLit(Vec<Expr>),
    MapLit(Vec<(Expr, Expr)>),
    Index { base: Box<Expr>, index: Box<Expr>, pos: SourcePosition },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let { name: String, value: Expr },
    ExprStmt(Expr),
    Return(Option<Expr>),
    If { cond: Expr, then_body: Vec<Stmt>, else_body: Vec<Stmt> },
    While { cond: Expr, body: Vec<Stmt> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub functions: Vec<FunctionDecl>,
}
