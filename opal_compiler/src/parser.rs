//! Recursive-descent parser with precedence climbing for expressions.

use crate::ast::{BinOp, Expr, FuncDecl, Module, Stmt};
use crate::lexer::{Token, TokenKind};
use opal_core::{OpalError, OpalResult, Span};

/// The Opal parser; consumes the token vector produced by the lexer.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Create a parser over a token stream (must end with `Eof`).
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    /// Parse a whole module: a sequence of `fn` declarations.
    pub fn parse_module(mut self) -> OpalResult<Module> {
        let mut module = Module::default();
        while self.cur().kind != TokenKind::Eof {
            module.funcs.push(self.parse_func()?);
        }
        Ok(module)
    }

    fn cur(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn span(&self) -> Span {
        self.cur().span
    }

    fn accept(&mut self, kind: TokenKind) -> bool {
        if self.cur().kind == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> OpalResult<()> {
        if self.accept(kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn error(&self, message: impl Into<String>) -> OpalError {
        let tok = self.cur();
        OpalError::syntax(
            format!("{} (token: '{}')", message.into(), tok.text),
            tok.span,
        )
    }

    fn ident(&mut self, what: &str) -> OpalResult<String> {
        if self.cur().kind == TokenKind::Ident {
            let name = self.cur().text.clone();
            self.pos += 1;
            Ok(name)
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    fn parse_func(&mut self) -> OpalResult<FuncDecl> {
        let span = self.span();
        self.expect(TokenKind::KwFn, "'fn'")?;
        let name = self.ident("function name")?;

        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if self.cur().kind != TokenKind::RParen {
            params.push(self.ident("parameter name")?);
            while self.accept(TokenKind::Comma) {
                params.push(self.ident("parameter name")?);
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        // Optional return-type annotation, accepted and ignored.
        if self.accept(TokenKind::Arrow) {
            self.accept(TokenKind::Ident);
        }

        let body = self.parse_block()?;
        Ok(FuncDecl {
            name,
            params,
            body,
            span,
        })
    }

    fn parse_block(&mut self) -> OpalResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut items = Vec::new();
        while self.cur().kind != TokenKind::RBrace {
            if self.cur().kind == TokenKind::Eof {
                return Err(self.error("unterminated block"));
            }
            items.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(items)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_stmt(&mut self) -> OpalResult<Stmt> {
        let span = self.span();

        if self.accept(TokenKind::KwLet) {
            let name = self.ident("identifier after 'let'")?;
            let init = if self.accept(TokenKind::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(TokenKind::Semicolon, "';'")?;
            return Ok(Stmt::Let { name, init, span });
        }

        if self.accept(TokenKind::KwReturn) {
            let value = self.parse_expr()?;
            self.expect(TokenKind::Semicolon, "';'")?;
            return Ok(Stmt::Return(value));
        }

        if self.accept(TokenKind::KwBreak) {
            self.expect(TokenKind::Semicolon, "';'")?;
            return Ok(Stmt::Break { span });
        }

        if self.accept(TokenKind::KwContinue) {
            self.expect(TokenKind::Semicolon, "';'")?;
            return Ok(Stmt::Continue { span });
        }

        if self.accept(TokenKind::KwIf) {
            self.expect(TokenKind::LParen, "'('")?;
            let cond = self.parse_expr()?;
            self.expect(TokenKind::RParen, "')'")?;
            let then_blk = self.parse_block()?;
            let else_blk = if self.accept(TokenKind::KwElse) {
                Some(self.parse_block()?)
            } else {
                None
            };
            return Ok(Stmt::If {
                cond,
                then_blk,
                else_blk,
            });
        }

        if self.accept(TokenKind::KwWhile) {
            self.expect(TokenKind::LParen, "'('")?;
            let cond = self.parse_expr()?;
            self.expect(TokenKind::RParen, "')'")?;
            let body = self.parse_block()?;
            return Ok(Stmt::While { cond, body });
        }

        if self.accept(TokenKind::KwFor) {
            return self.parse_for();
        }

        // Assignment forms start with an identifier; disambiguate by
        // looking past it, backtracking to an expression statement when
        // neither `=` nor `[...] =` follows.
        if self.cur().kind == TokenKind::Ident {
            let save = self.pos;
            let name = self.cur().text.clone();
            let name_span = self.span();
            self.pos += 1;

            if self.accept(TokenKind::Assign) {
                let value = self.parse_expr()?;
                self.expect(TokenKind::Semicolon, "';'")?;
                return Ok(Stmt::Assign {
                    name,
                    value,
                    span: name_span,
                });
            }

            if self.cur().kind == TokenKind::LBracket {
                self.pos += 1;
                let index = self.parse_expr()?;
                self.expect(TokenKind::RBracket, "']'")?;
                if self.accept(TokenKind::Assign) {
                    let value = self.parse_expr()?;
                    self.expect(TokenKind::Semicolon, "';'")?;
                    return Ok(Stmt::IndexAssign {
                        array: Expr::Var {
                            name,
                            span: name_span,
                        },
                        index,
                        value,
                    });
                }
            }

            self.pos = save;
        }

        let e = self.parse_expr()?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Stmt::Expr(e))
    }

    fn parse_for(&mut self) -> OpalResult<Stmt> {
        self.expect(TokenKind::LParen, "'('")?;

        let init = if self.cur().kind == TokenKind::Semicolon {
            None
        } else if self.accept(TokenKind::KwLet) {
            let span = self.span();
            let name = self.ident("identifier after 'let'")?;
            let init = if self.accept(TokenKind::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            Some(Box::new(Stmt::Let { name, init, span }))
        } else {
            let span = self.span();
            let name = self.ident("loop variable")?;
            self.expect(TokenKind::Assign, "'='")?;
            let value = self.parse_expr()?;
            Some(Box::new(Stmt::Assign { name, value, span }))
        };
        self.expect(TokenKind::Semicolon, "';'")?;

        let cond = if self.cur().kind == TokenKind::Semicolon {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semicolon, "';'")?;

        let step = if self.cur().kind == TokenKind::RParen {
            None
        } else {
            let span = self.span();
            let name = self.ident("loop variable")?;
            self.expect(TokenKind::Assign, "'='")?;
            let value = self.parse_expr()?;
            Some(Box::new(Stmt::Assign { name, value, span }))
        };
        self.expect(TokenKind::RParen, "')'")?;

        let body = self.parse_block()?;
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expr(&mut self) -> OpalResult<Expr> {
        let lhs = self.parse_primary()?;
        self.parse_bin_rhs(0, lhs)
    }

    fn parse_bin_rhs(&mut self, min_prec: i32, mut lhs: Expr) -> OpalResult<Expr> {
        loop {
            let Some((op, prec)) = bin_op_of(self.cur().kind) else {
                return Ok(lhs);
            };
            if prec < min_prec {
                return Ok(lhs);
            }
            self.pos += 1;

            let mut rhs = self.parse_primary()?;
            if let Some((_, next_prec)) = bin_op_of(self.cur().kind) {
                if next_prec > prec {
                    rhs = self.parse_bin_rhs(prec + 1, rhs)?;
                }
            }

            lhs = Expr::Bin {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_primary(&mut self) -> OpalResult<Expr> {
        // Unary minus desugars to `0 - x`.
        if self.accept(TokenKind::Minus) {
            let rhs = self.parse_primary()?;
            return Ok(Expr::Bin {
                op: BinOp::Sub,
                lhs: Box::new(Expr::Int(0)),
                rhs: Box::new(rhs),
            });
        }

        let mut lhs = match self.cur().kind {
            TokenKind::Int => {
                let v = self.cur().ival;
                self.pos += 1;
                Expr::Int(v)
            }
            TokenKind::Float => {
                let bits = self.cur().ival;
                self.pos += 1;
                Expr::Float(bits)
            }
            TokenKind::Ident => {
                let name = self.cur().text.clone();
                let span = self.span();
                self.pos += 1;

                if self.accept(TokenKind::LParen) {
                    let mut args = Vec::new();
                    if self.cur().kind != TokenKind::RParen {
                        args.push(self.parse_expr()?);
                        while self.accept(TokenKind::Comma) {
                            args.push(self.parse_expr()?);
                        }
                    }
                    self.expect(TokenKind::RParen, "')'")?;
                    Expr::Call { callee: name, args, span }
                } else {
                    Expr::Var { name, span }
                }
            }
            TokenKind::LParen => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                inner
            }
            _ => return Err(self.error("unexpected token in expression")),
        };

        while self.accept(TokenKind::LBracket) {
            let index = self.parse_expr()?;
            self.expect(TokenKind::RBracket, "']'")?;
            lhs = Expr::Index {
                array: Box::new(lhs),
                index: Box::new(index),
            };
        }

        Ok(lhs)
    }
}

fn bin_op_of(kind: TokenKind) -> Option<(BinOp, i32)> {
    match kind {
        TokenKind::Eq => Some((BinOp::Eq, 4)),
        TokenKind::Ne => Some((BinOp::Ne, 4)),
        TokenKind::Le => Some((BinOp::Le, 5)),
        TokenKind::Lt => Some((BinOp::Lt, 5)),
        TokenKind::Ge => Some((BinOp::Ge, 5)),
        TokenKind::Gt => Some((BinOp::Gt, 5)),
        TokenKind::Plus => Some((BinOp::Add, 10)),
        TokenKind::Minus => Some((BinOp::Sub, 10)),
        TokenKind::Star => Some((BinOp::Mul, 20)),
        TokenKind::Slash => Some((BinOp::Div, 20)),
        TokenKind::Percent => Some((BinOp::Mod, 20)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> Module {
        Parser::new(Lexer::new(src).lex().unwrap())
            .parse_module()
            .unwrap()
    }

    #[test]
    fn test_parse_empty_fn() {
        let m = parse("fn main() { }");
        assert_eq!(m.funcs.len(), 1);
        assert_eq!(m.funcs[0].name, "main");
        assert!(m.funcs[0].params.is_empty());
        assert!(m.funcs[0].body.is_empty());
    }

    #[test]
    fn test_precedence() {
        // 2 + 3 * 4 parses as 2 + (3 * 4)
        let m = parse("fn main() { let x = 2 + 3 * 4; }");
        let Stmt::Let { init: Some(e), .. } = &m.funcs[0].body[0] else {
            panic!("expected let");
        };
        let Expr::Bin { op: BinOp::Add, rhs, .. } = e else {
            panic!("expected top-level add, got {e:?}");
        };
        assert!(matches!(**rhs, Expr::Bin { op: BinOp::Mul, .. }));
    }

    #[test]
    fn test_unary_minus_desugars() {
        let m = parse("fn main() { let x = -5; }");
        let Stmt::Let { init: Some(e), .. } = &m.funcs[0].body[0] else {
            panic!("expected let");
        };
        let Expr::Bin { op: BinOp::Sub, lhs, .. } = e else {
            panic!("expected sub");
        };
        assert!(matches!(**lhs, Expr::Int(0)));
    }

    #[test]
    fn test_array_assignment_statement() {
        let m = parse("fn main() { a[0] = 7; }");
        assert!(matches!(m.funcs[0].body[0], Stmt::IndexAssign { .. }));
    }

    #[test]
    fn test_index_expression_statement_backtracks() {
        let m = parse("fn main() { a[0]; }");
        assert!(matches!(m.funcs[0].body[0], Stmt::Expr(Expr::Index { .. })));
    }

    #[test]
    fn test_for_header_forms() {
        let m = parse("fn main() { for (let i = 0; i < 3; i = i + 1) { } }");
        let Stmt::For { init, cond, step, .. } = &m.funcs[0].body[0] else {
            panic!("expected for");
        };
        assert!(init.is_some() && cond.is_some() && step.is_some());

        let m = parse("fn main() { for (;;) { break; } }");
        let Stmt::For { init, cond, step, .. } = &m.funcs[0].body[0] else {
            panic!("expected for");
        };
        assert!(init.is_none() && cond.is_none() && step.is_none());
    }

    #[test]
    fn test_return_type_annotation_ignored() {
        let m = parse("fn f(x) -> int { return x; }");
        assert_eq!(m.funcs[0].params.len(), 1);
    }

    #[test]
    fn test_errors_carry_location() {
        let err = Parser::new(Lexer::new("fn main( { }").lex().unwrap())
            .parse_module()
            .unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
