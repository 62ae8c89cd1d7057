//! Hand-written scanner for Opal source text.
//!
//! Produces a flat token vector; `//` comments and whitespace are
//! stripped. Float literals are distinguished from integers by the
//! presence of a `.` and carried as their IEEE-754 bit pattern so the
//! rest of the pipeline only ever moves 64-bit words.

use opal_core::{f64_bits, OpalError, OpalResult, Span};

/// Token kinds, including keywords and all operators the grammar knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    Ident,
    Int,
    Float,

    KwFn,
    KwLet,
    KwReturn,
    KwIf,
    KwElse,
    KwWhile,
    KwFor,
    KwBreak,
    KwContinue,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Arrow,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    Le,
    Lt,
    Ge,
    Gt,
    Eq,
    Ne,
}

/// A single token with its source text and location.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Integer value for `Int`, IEEE-754 bits for `Float`, 0 otherwise.
    pub ival: i64,
    pub span: Span,
}

/// The Opal lexer.
pub struct Lexer<'src> {
    src: &'src [u8],
    pos: usize,
    line: u32,
    col: u32,
}

impl<'src> Lexer<'src> {
    /// Create a lexer over the given source.
    #[must_use]
    pub fn new(source: &'src str) -> Self {
        Lexer {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Lex the entire input, ending with an `Eof` token.
    pub fn lex(mut self) -> OpalResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self, k: usize) -> u8 {
        *self.src.get(self.pos + k).unwrap_or(&0)
    }

    fn bump(&mut self) -> u8 {
        let c = self.peek(0);
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        c
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek(0) {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'/' if self.peek(1) == b'/' => {
                    while self.pos < self.src.len() && self.peek(0) != b'\n' {
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.col)
    }

    fn next_token(&mut self) -> OpalResult<Token> {
        self.skip_trivia();

        let span = self.span();
        if self.pos >= self.src.len() {
            return Ok(simple(TokenKind::Eof, "", span));
        }

        let c = self.peek(0);
        if c.is_ascii_alphabetic() || c == b'_' {
            return Ok(self.ident_or_keyword(span));
        }
        if c.is_ascii_digit() {
            return self.number(span);
        }

        self.bump();
        let kind = match c {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b'+' => TokenKind::Plus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'-' => {
                if self.peek(0) == b'>' {
                    self.bump();
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            b'=' => {
                if self.peek(0) == b'=' {
                    self.bump();
                    TokenKind::Eq
                } else {
                    TokenKind::Assign
                }
            }
            b'<' => {
                if self.peek(0) == b'=' {
                    self.bump();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                if self.peek(0) == b'=' {
                    self.bump();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            b'!' => {
                if self.peek(0) == b'=' {
                    self.bump();
                    TokenKind::Ne
                } else {
                    return Err(OpalError::syntax("unexpected character '!'", span));
                }
            }
            other => {
                return Err(OpalError::syntax(
                    format!("unexpected character '{}'", other as char),
                    span,
                ));
            }
        };
        Ok(simple(kind, "", span))
    }

    fn ident_or_keyword(&mut self, span: Span) -> Token {
        let start = self.pos;
        loop {
            let c = self.peek(0);
            if !c.is_ascii_alphanumeric() && c != b'_' {
                break;
            }
            self.bump();
        }
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .unwrap_or_default()
            .to_string();

        let kind = match text.as_str() {
            "fn" => TokenKind::KwFn,
            "let" => TokenKind::KwLet,
            "return" => TokenKind::KwReturn,
            "if" => TokenKind::KwIf,
            "else" => TokenKind::KwElse,
            "while" => TokenKind::KwWhile,
            "for" => TokenKind::KwFor,
            "break" => TokenKind::KwBreak,
            "continue" => TokenKind::KwContinue,
            _ => TokenKind::Ident,
        };

        Token {
            kind,
            text,
            ival: 0,
            span,
        }
    }

    fn number(&mut self, span: Span) -> OpalResult<Token> {
        let start = self.pos;
        let mut is_float = false;
        while self.peek(0).is_ascii_digit() {
            self.bump();
        }
        if self.peek(0) == b'.' && self.peek(1).is_ascii_digit() {
            is_float = true;
            self.bump();
            while self.peek(0).is_ascii_digit() {
                self.bump();
            }
        }

        let text = std::str::from_utf8(&self.src[start..self.pos])
            .unwrap_or_default()
            .to_string();

        if is_float {
            let x: f64 = text
                .parse()
                .map_err(|_| OpalError::syntax(format!("bad float literal '{text}'"), span))?;
            Ok(Token {
                kind: TokenKind::Float,
                ival: f64_bits(x),
                text,
                span,
            })
        } else {
            let v: i64 = text
                .parse()
                .map_err(|_| OpalError::syntax(format!("bad integer literal '{text}'"), span))?;
            Ok(Token {
                kind: TokenKind::Int,
                ival: v,
                text,
                span,
            })
        }
    }
}

fn simple(kind: TokenKind, text: &str, span: Span) -> Token {
    Token {
        kind,
        text: text.to_string(),
        ival: 0,
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).lex().unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_and_punct() {
        assert_eq!(
            kinds("fn main() { let x = 1; }"),
            vec![
                TokenKind::KwFn,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::KwLet,
                TokenKind::Ident,
                TokenKind::Assign,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("<= < >= > == != -> - + * / %"),
            vec![
                TokenKind::Le,
                TokenKind::Lt,
                TokenKind::Ge,
                TokenKind::Gt,
                TokenKind::Eq,
                TokenKind::Ne,
                TokenKind::Arrow,
                TokenKind::Minus,
                TokenKind::Plus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_int_and_float_literals() {
        let toks = Lexer::new("42 3.5").lex().unwrap();
        assert_eq!(toks[0].kind, TokenKind::Int);
        assert_eq!(toks[0].ival, 42);
        assert_eq!(toks[1].kind, TokenKind::Float);
        assert_eq!(toks[1].ival, f64_bits(3.5));
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("1 // trailing\n2"),
            vec![TokenKind::Int, TokenKind::Int, TokenKind::Eof]
        );
    }

    #[test]
    fn test_unknown_character_errors() {
        assert!(Lexer::new("let a = $1;").lex().is_err());
    }

    #[test]
    fn test_spans_track_lines() {
        let toks = Lexer::new("1\n  2").lex().unwrap();
        assert_eq!(toks[0].span, Span::new(1, 1));
        assert_eq!(toks[1].span, Span::new(2, 3));
    }
}
