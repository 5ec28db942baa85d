//! ketra-par — builds the AST from a `ketra-lex` token stream.
//!
//! A textbook Pratt parser for expressions (binding powers on `BinOp`) and
//! plain recursive descent for statements and function declarations.

pub mod ast;
mod parser;

pub use ast::Module;

use ketra_lex::LexError;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("unexpected token {found:?}, expected {expected}")]
    Unexpected { found: String, expected: &'static str },
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: &'static str },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Lex and parse `source` into a [`Module`].
pub fn parse(source: &str) -> ParseResult<Module> {
    let tokens = ketra_lex::lex(source)?;
    parser::Parser::new(tokens).parse_module()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::*;

    #[test]
    fn parses_function_with_return() {
        let module = parse("fn add(a, b) { return a + b; }").unwrap();
        assert_eq!(module.functions.len(), 1);
        let f = &module.functions[0];
        assert_eq!(f.name, "add");
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.body.len(), 1);
        assert!(matches!(&f.body[0], Stmt::Return(Some(Expr::Binary { op: BinOp::Add, .. }))));
    }

    #[test]
    fn parses_if_else() {
        let module = parse("fn f(a) { if a { return 1; } else { return 0; } }").unwrap();
        let body = &module.functions[0].body;
        assert!(matches!(&body[0], Stmt::If { .. }));
    }

    #[test]
    fn parses_map_literal() {
        let module = parse(r#"fn f() { let m = map { "k": 1 }; return m; }"#).unwrap();
        let body = &module.functions[0].body;
        assert!(matches!(&body[0], Stmt::Let { .. }));
    }
}
