//! ketra-lex — turns source text into a token stream.
//!
//! A single-pass, lookahead-free cursor over `&str`, in the same shape as
//! most hand-written Rust lexers: a `Cursor` walking `char_indices`, one
//! `next_token` per call, no regex engine.

mod cursor;
mod token;

pub use token::{Token, TokenKind};

use cursor::Cursor;
use ketra_util::source::SourcePosition;

#[derive(Debug, thiserror::Error)]
pub enum LexError {
    #[error("unexpected character {ch:?} at {at}")]
    UnexpectedChar { ch: char, at: SourcePosition },
    #[error("unterminated string literal starting at {at}")]
    UnterminatedString { at: SourcePosition },
}

pub type LexResult<T> = Result<T, LexError>;

/// Tokenize `source` in full. Returns every token including a trailing
/// `TokenKind::Eof`.
pub fn lex(source: &str) -> LexResult<Vec<Token>> {
    let mut cursor = Cursor::new(source);
    let mut tokens = Vec::new();
    loop {
        let tok = cursor.next_token()?;
        let is_eof = tok.kind == TokenKind::Eof;
        tokens.push(tok);
        if is_eof {
            break;
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_arithmetic_expression() {
        let tokens = lex("1 + 2 * x").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Int(1),
                TokenKind::Plus,
                TokenKind::Int(2),
                TokenKind::Star,
                TokenKind::Ident("x".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_keywords_distinctly_from_identifiers() {
        let tokens = lex("fn letter").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Fn);
        assert_eq!(tokens[1].kind, TokenKind::Ident("letter".into()));
    }

    #[test]
    fn unterminated_string_errors() {
        assert!(lex("\"abc").is_err());
    }
}
