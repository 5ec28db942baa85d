use std::str::Chars;

use ketra_util::source::SourcePosition;

use crate::token::{keyword, Token, TokenKind};
use crate::{LexError, LexResult};

pub(crate) struct Cursor<'a> {
    rest: Chars<'a>,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Cursor { rest: source.chars(), line: 1, column: 1 }
    }

    fn peek(&self) -> Option<char> {
        self.rest.clone().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.rest.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn pos(&self) -> SourcePosition {
        SourcePosition::new(self.line, self.column)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let mut lookahead = self.rest.clone();
                    lookahead.next();
                    if lookahead.next() == Some('/') {
                        while !matches!(self.peek(), None | Some('\n')) {
                            self.bump();
                        }
                    } else {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    pub(crate) fn next_token(&mut self) -> LexResult<Token> {
        self.skip_trivia();
        let pos = self.pos();
        let Some(c) = self.bump() else {
            return Ok(Token { kind: TokenKind::Eof, pos });
        };

        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => {
                if self.peek() == Some('>') {
                    self.bump();
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '=' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '&' if self.peek() == Some('&') => {
                self.bump();
                TokenKind::AndAnd
            }
            '|' if self.peek() == Some('|') => {
                self.bump();
                TokenKind::OrOr
            }
            '"' => return self.lex_string(pos),
            c if c.is_ascii_digit() => return Ok(Token { kind: self.lex_number(c), pos }),
            c if c.is_alphabetic() || c == '_' => return Ok(Token { kind: self.lex_ident(c), pos }),
            other => return Err(LexError::UnexpectedChar { ch: other, at: pos }),
        };
        Ok(Token { kind, pos })
    }

    fn lex_string(&mut self, start: SourcePosition) -> LexResult<Token> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(Token { kind: TokenKind::Str(out), pos: start }),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => return Err(LexError::UnterminatedString { at: start }),
                },
                Some(c) => out.push(c),
                None => return Err(LexError::UnterminatedString { at: start }),
            }
        }
    }

    fn lex_number(&mut self, first: char) -> TokenKind {
        let mut text = String::from(first);
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.bump().unwrap());
        }
        if self.peek() == Some('.') {
            text.push(self.bump().unwrap());
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(self.bump().unwrap());
            }
            TokenKind::Float(text.parse().unwrap_or(0.0))
        } else {
            TokenKind::Int(text.parse().unwrap_or(0))
        }
    }

    fn lex_ident(&mut self, first: char) -> TokenKind {
        let mut text = String::from(first);
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            text.push(self.bump().unwrap());
        }
        keyword(&text).unwrap_or(TokenKind::Ident(text))
    }
}
