use ketra_lex::{Token, TokenKind};
use ketra_util::source::SourcePosition;

use crate::ast::{BinOp, Expr, FunctionDecl, Module, Param, Stmt};
use crate::{ParseError, ParseResult};

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn binding_power(kind: &TokenKind) -> Option<(u8, BinOp)> {
    Some(match kind {
        TokenKind::OrOr => (1, BinOp::Or),
        TokenKind::AndAnd => (2, BinOp::And),
        TokenKind::EqEq => (3, BinOp::Eq),
        TokenKind::NotEq => (3, BinOp::Ne),
        TokenKind::Lt => (4, BinOp::Lt),
        TokenKind::Le => (4, BinOp::Le),
        TokenKind::Gt => (4, BinOp::Gt),
        TokenKind::Ge => (4, BinOp::Ge),
        TokenKind::Plus => (5, BinOp::Add),
        TokenKind::Minus => (5, BinOp::Sub),
        TokenKind::Star => (6, BinOp::Mul),
        TokenKind::Slash => (6, BinOp::Div),
        TokenKind::Percent => (6, BinOp::Rem),
        _ => return None,
    })
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_pos(&self) -> SourcePosition {
        self.tokens[self.pos].pos
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind, what: &'static str) -> ParseResult<()> {
        if *self.peek() == kind {
            self.bump();
            Ok(())
        } else if *self.peek() == TokenKind::Eof {
            Err(ParseError::UnexpectedEof { expected: what })
        } else {
            Err(ParseError::Unexpected { found: format!("{:?}", self.peek()), expected: what })
        }
    }

    fn expect_ident(&mut self, what: &'static str) -> ParseResult<String> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(name)
            }
            TokenKind::Eof => Err(ParseError::UnexpectedEof { expected: what }),
            other => Err(ParseError::Unexpected { found: format!("{other:?}"), expected: what }),
        }
    }

    pub(crate) fn parse_module(mut self) -> ParseResult<Module> {
        let mut module = Module::default();
        while *self.peek() != TokenKind::Eof {
            module.functions.push(self.parse_function()?);
        }
        Ok(module)
    }

    fn parse_function(&mut self) -> ParseResult<FunctionDecl> {
        self.expect(TokenKind::Fn, "'fn'")?;
        let name = self.expect_ident("function name")?;
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while *self.peek() != TokenKind::RParen {
            params.push(Param { name: self.expect_ident("parameter name")? });
            if *self.peek() == TokenKind::Comma {
                self.bump();
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_block()?;
        Ok(FunctionDecl { name, params, body })
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while *self.peek() != TokenKind::RBrace {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        match self.peek().clone() {
            TokenKind::Let => {
                self.bump();
                let name = self.expect_ident("variable name")?;
                self.expect(TokenKind::Eq, "'='")?;
                let value = self.parse_expr(0)?;
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Let { name, value })
            }
            TokenKind::Return => {
                self.bump();
                let value = if *self.peek() == TokenKind::Semicolon { None } else { Some(self.parse_expr(0)?) };
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Return(value))
            }
            TokenKind::If => {
                self.bump();
                let cond = self.parse_expr(0)?;
                let then_body = self.parse_block()?;
                let else_body = if *self.peek() == TokenKind::Else {
                    self.bump();
                    self.parse_block()?
                } else {
                    Vec::new()
                };
                Ok(Stmt::If { cond, then_body, else_body })
            }
            TokenKind::While => {
                self.bump();
                let cond = self.parse_expr(0)?;
                let body = self.parse_block()?;
                Ok(Stmt::While { cond, body })
            }
            _ => {
                let expr = self.parse_expr(0)?;
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::ExprStmt(expr))
            }
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> ParseResult<Expr> {
        let mut lhs = self.parse_postfix()?;
        while let Some((bp, op)) = binding_power(self.peek()) {
            if bp < min_bp {
                break;
            }
            let pos = self.peek_pos();
            self.bump();
            let rhs = self.parse_expr(bp + 1)?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
        }
        Ok(lhs)
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        while *self.peek() == TokenKind::LBracket {
            let pos = self.peek_pos();
            self.bump();
            let index = self.parse_expr(0)?;
            self.expect(TokenKind::RBracket, "']'")?;
            expr = Expr::Index { base: Box::new(expr), index: Box::new(index), pos };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let pos = self.peek_pos();
        match self.peek().clone() {
            TokenKind::Int(v) => {
                self.bump();
                Ok(Expr::Int(v))
            }
            TokenKind::Float(v) => {
                self.bump();
                Ok(Expr::Float(v))
            }
            TokenKind::Str(s) => {
                self.bump();
                Ok(Expr::Str(s))
            }
            TokenKind::True => {
                self.bump();
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.bump();
                Ok(Expr::Bool(false))
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr(0)?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.bump();
                let mut elems = Vec::new();
                while *self.peek() != TokenKind::RBracket {
                    elems.push(self.parse_expr(0)?);
                    if *self.peek() == TokenKind::Comma {
                        self.bump();
                    }
                }
                self.expect(TokenKind::RBracket, "']'")?;
                Ok(Expr::ArrayLit(elems))
            }
            TokenKind::Map => {
                self.bump();
                self.expect(TokenKind::LBrace, "'{'")?;
                let mut entries = Vec::new();
                while *self.peek() != TokenKind::RBrace {
                    let key = self.parse_expr(0)?;
                    self.expect(TokenKind::Colon, "':'")?;
                    let value = self.parse_expr(0)?;
                    entries.push((key, value));
                    if *self.peek() == TokenKind::Comma {
                        self.bump();
                    }
                }
                self.expect(TokenKind::RBrace, "'}'")?;
                Ok(Expr::MapLit(entries))
            }
            TokenKind::Ident(name) => {
                self.bump();
                if *self.peek() == TokenKind::LParen {
                    self.bump();
                    let mut args = Vec::new();
                    while *self.peek() != TokenKind::RParen {
                        args.push(self.parse_expr(0)?);
                        if *self.peek() == TokenKind::Comma {
                            self.bump();
                        }
                    }
                    self.expect(TokenKind::RParen, "')'")?;
                    Ok(Expr::Call { callee: name, args, pos })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            TokenKind::Eof => Err(ParseError::UnexpectedEof { expected: "expression" }),
            other => Err(ParseError::Unexpected { found: format!("{other:?}"), expected: "expression" }),
        }
    }
}
