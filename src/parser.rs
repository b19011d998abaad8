//! kesh Parser - newline-separated statements, braces for blocks
//!
//! Recursive descent over the token stream. Newlines are statement
//! separators; inside brackets and after commas or binary operators they
//! are skipped, so literals and long expressions can span lines.
//! Compound assignment (`+=`, `++`, ...) desugars here into plain
//! assignment with the matching binary node.

use crate::ast::*;
use crate::error::{KeshError, KeshResult};
use crate::lexer::{Token, TokenKind};
use crate::span::Span;

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse(&mut self) -> KeshResult<Program> {
        let start = self.current_span();
        let mut stmts = Vec::new();

        loop {
            self.skip_newlines();
            if self.at_end() {
                break;
            }
            stmts.push(self.parse_stmt()?);
            self.end_stmt()?;
        }

        Ok(Program {
            stmts,
            span: start.merge(self.current_span()),
        })
    }

    // === STATEMENTS ===

    fn parse_stmt(&mut self) -> KeshResult<Stmt> {
        match self.peek_kind() {
            TokenKind::Var => self.parse_var(),
            TokenKind::If => self.parse_if(),
            TokenKind::Try => self.parse_try(),
            TokenKind::For => self.parse_for(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Throw => self.parse_throw(),
            TokenKind::Module => self.parse_module(),
            TokenKind::Go => self.parse_go(),
            TokenKind::Delete => self.parse_delete(),
            TokenKind::Close => self.parse_close(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Break => {
                let span = self.current_span();
                self.advance();
                Ok(Stmt::Break { span })
            }
            TokenKind::Continue => {
                let span = self.current_span();
                self.advance();
                Ok(Stmt::Continue { span })
            }
            _ => self.parse_simple_stmt(),
        }
    }

    /// Expression statement, assignment, or channel send. Shared with the
    /// init/post clauses of C-style `for`.
    fn parse_simple_stmt(&mut self) -> KeshResult<Stmt> {
        let start = self.current_span();
        let first = self.parse_expr()?;

        // ch <- value
        if self.check(TokenKind::Arrow) {
            self.advance();
            self.skip_newlines();
            let value = self.parse_expr()?;
            let span = start.merge(value.span());
            return Ok(Stmt::Send {
                chan: first,
                value,
                span,
            });
        }

        // x++ / x--
        if self.check(TokenKind::PlusPlus) || self.check(TokenKind::MinusMinus) {
            let op = if self.check(TokenKind::PlusPlus) {
                BinOp::Add
            } else {
                BinOp::Sub
            };
            let op_span = self.current_span();
            self.advance();
            Self::check_assign_target(&first)?;
            let span = start.merge(op_span);
            let one = Expr::Int {
                value: 1,
                span: op_span,
            };
            let rhs = Expr::Binary {
                op,
                left: Box::new(first.clone()),
                right: Box::new(one),
                span,
            };
            return Ok(Stmt::Assign {
                targets: vec![first],
                exprs: vec![rhs],
                span,
            });
        }

        // x += e and friends, single target only
        if let Some(op) = compound_op_of(&self.peek_kind()) {
            self.advance();
            self.skip_newlines();
            Self::check_assign_target(&first)?;
            let value = self.parse_expr()?;
            let span = start.merge(value.span());
            let rhs = Expr::Binary {
                op,
                left: Box::new(first.clone()),
                right: Box::new(value),
                span,
            };
            return Ok(Stmt::Assign {
                targets: vec![first],
                exprs: vec![rhs],
                span,
            });
        }

        // a, b = e1, e2 / a = e
        if self.check(TokenKind::Comma) || self.check(TokenKind::Eq) {
            let mut targets = vec![first];
            while self.check(TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
                targets.push(self.parse_expr()?);
            }
            if !self.check(TokenKind::Eq) {
                return Err(KeshError::syntax(
                    "expected '=' after assignment targets",
                    self.current_span(),
                ));
            }
            self.advance();
            self.skip_newlines();
            for target in &targets {
                Self::check_assign_target(target)?;
            }
            let mut exprs = vec![self.parse_expr()?];
            while self.check(TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
                exprs.push(self.parse_expr()?);
            }
            let span = start.merge(exprs[exprs.len() - 1].span());
            return Ok(Stmt::Assign {
                targets,
                exprs,
                span,
            });
        }

        let span = first.span();
        Ok(Stmt::Expr { expr: first, span })
    }

    fn check_assign_target(target: &Expr) -> KeshResult<()> {
        match target {
            Expr::Ident { .. } | Expr::Member { .. } | Expr::Index { .. } => Ok(()),
            other => Err(KeshError::syntax("invalid assignment target", other.span())),
        }
    }

    fn parse_var(&mut self) -> KeshResult<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::Var)?;
        let mut names = vec![self.expect_ident()?];
        while self.check(TokenKind::Comma) {
            self.advance();
            names.push(self.expect_ident()?);
        }
        self.expect(TokenKind::Eq)?;
        self.skip_newlines();
        let mut exprs = vec![self.parse_expr()?];
        while self.check(TokenKind::Comma) {
            self.advance();
            self.skip_newlines();
            exprs.push(self.parse_expr()?);
        }
        let span = start.merge(exprs[exprs.len() - 1].span());
        Ok(Stmt::Var { names, exprs, span })
    }

    fn parse_if(&mut self) -> KeshResult<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::If)?;
        let cond = self.parse_expr()?;
        let then_block = self.parse_block()?;

        // `else` may open on the next line
        let saved = self.pos;
        self.skip_newlines();
        let else_block = if self.check(TokenKind::Else) {
            self.advance();
            if self.check(TokenKind::If) {
                let nested = self.parse_if()?;
                let span = nested.span();
                Some(Block {
                    stmts: vec![nested],
                    span,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            self.pos = saved;
            None
        };

        let end = else_block.as_ref().map(|b| b.span).unwrap_or(then_block.span);
        Ok(Stmt::If {
            cond,
            then_block,
            else_block,
            span: start.merge(end),
        })
    }

    fn parse_try(&mut self) -> KeshResult<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::Try)?;
        let body = self.parse_block()?;

        let saved = self.pos;
        self.skip_newlines();
        let (catch_name, catch_block) = if self.check(TokenKind::Catch) {
            self.advance();
            let name = match self.peek_kind() {
                TokenKind::Ident(n) => {
                    self.advance();
                    Some(n)
                }
                _ => None,
            };
            (name, Some(self.parse_block()?))
        } else {
            self.pos = saved;
            (None, None)
        };

        let saved = self.pos;
        self.skip_newlines();
        let finally_block = if self.check(TokenKind::Finally) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            self.pos = saved;
            None
        };

        if catch_block.is_none() && finally_block.is_none() {
            return Err(KeshError::syntax(
                "expected catch or finally after try",
                self.current_span(),
            ));
        }

        Ok(Stmt::Try {
            body,
            catch_name,
            catch_block,
            finally_block,
            span: start.merge(self.current_span()),
        })
    }

    fn parse_for(&mut self) -> KeshResult<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::For)?;

        // for { }
        if self.check(TokenKind::LBrace) {
            let body = self.parse_block()?;
            let span = start.merge(body.span);
            return Ok(Stmt::Loop {
                cond: None,
                body,
                span,
            });
        }

        // for x in e / for k, v in e
        if self.at_for_in_header() {
            let mut names = vec![self.expect_ident()?];
            while self.check(TokenKind::Comma) {
                self.advance();
                names.push(self.expect_ident()?);
            }
            self.expect(TokenKind::In)?;
            let iterable = self.parse_expr()?;
            let body = self.parse_block()?;
            let span = start.merge(body.span);
            return Ok(Stmt::ForIn {
                names,
                iterable,
                body,
                span,
            });
        }

        // for ; cond ; post { }
        if self.check(TokenKind::Semi) {
            return self.parse_for_clauses(start, None);
        }

        let first = self.parse_simple_stmt()?;
        if self.check(TokenKind::Semi) {
            return self.parse_for_clauses(start, Some(Box::new(first)));
        }

        // while-form: the single clause must be a bare condition
        let cond = match first {
            Stmt::Expr { expr, .. } => expr,
            other => {
                return Err(KeshError::syntax(
                    "expected ';' in for clause",
                    other.span(),
                ))
            }
        };
        let body = self.parse_block()?;
        let span = start.merge(body.span);
        Ok(Stmt::Loop {
            cond: Some(cond),
            body,
            span,
        })
    }

    fn parse_for_clauses(&mut self, start: Span, init: Option<Box<Stmt>>) -> KeshResult<Stmt> {
        self.expect(TokenKind::Semi)?;
        let cond = if self.check(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semi)?;
        let post = if self.check(TokenKind::LBrace) {
            None
        } else {
            Some(Box::new(self.parse_simple_stmt()?))
        };
        let body = self.parse_block()?;
        let span = start.merge(body.span);
        Ok(Stmt::ForC {
            init,
            cond,
            post,
            body,
            span,
        })
    }

    /// ident (',' ident)* 'in' lookahead, without consuming.
    fn at_for_in_header(&self) -> bool {
        let mut i = self.pos;
        loop {
            match self.tokens.get(i).map(|t| &t.kind) {
                Some(TokenKind::Ident(_)) => i += 1,
                _ => return false,
            }
            match self.tokens.get(i).map(|t| &t.kind) {
                Some(TokenKind::In) => return true,
                Some(TokenKind::Comma) => i += 1,
                _ => return false,
            }
        }
    }

    fn parse_switch(&mut self) -> KeshResult<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::Switch)?;
        let subject = self.parse_expr()?;
        self.expect(TokenKind::LBrace)?;

        let mut cases = Vec::new();
        let mut default = None;
        loop {
            self.skip_newlines();
            if self.check(TokenKind::RBrace) || self.at_end() {
                break;
            }
            if self.check(TokenKind::Case) {
                let case_start = self.current_span();
                self.advance();
                let mut exprs = vec![self.parse_expr()?];
                while self.check(TokenKind::Comma) {
                    self.advance();
                    self.skip_newlines();
                    exprs.push(self.parse_expr()?);
                }
                self.expect(TokenKind::Colon)?;
                let body = self.parse_case_body()?;
                let span = case_start.merge(body.span);
                cases.push(SwitchCase { exprs, body, span });
            } else if self.check(TokenKind::Default) {
                let default_span = self.current_span();
                self.advance();
                self.expect(TokenKind::Colon)?;
                if default.is_some() {
                    return Err(KeshError::syntax("duplicate default case", default_span));
                }
                default = Some(self.parse_case_body()?);
            } else {
                return Err(KeshError::syntax(
                    "expected case or default in switch",
                    self.current_span(),
                ));
            }
        }

        let end = self.current_span();
        self.expect(TokenKind::RBrace)?;
        Ok(Stmt::Switch {
            subject,
            cases,
            default,
            span: start.merge(end),
        })
    }

    /// Statements until the next `case`, `default` or closing brace.
    fn parse_case_body(&mut self) -> KeshResult<Block> {
        let start = self.current_span();
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(TokenKind::Case)
                || self.check(TokenKind::Default)
                || self.check(TokenKind::RBrace)
                || self.at_end()
            {
                break;
            }
            stmts.push(self.parse_stmt()?);
            self.end_stmt()?;
        }
        Ok(Block {
            stmts,
            span: start.merge(self.current_span()),
        })
    }

    fn parse_throw(&mut self) -> KeshResult<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::Throw)?;
        let expr = self.parse_expr()?;
        let span = start.merge(expr.span());
        Ok(Stmt::Throw { expr, span })
    }

    fn parse_module(&mut self) -> KeshResult<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::Module)?;
        let name = self.expect_ident()?;
        let body = self.parse_block()?;
        let span = start.merge(body.span);
        Ok(Stmt::Module { name, body, span })
    }

    fn parse_go(&mut self) -> KeshResult<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::Go)?;
        let call = self.parse_expr()?;
        if !matches!(call, Expr::Call { .. }) {
            return Err(KeshError::syntax("expected a call after go", call.span()));
        }
        let span = start.merge(call.span());
        Ok(Stmt::Go { call, span })
    }

    /// `delete(m, k)` or `delete m[k]`.
    fn parse_delete(&mut self) -> KeshResult<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::Delete)?;

        if self.check(TokenKind::LParen) {
            self.advance();
            self.skip_newlines();
            let target = self.parse_expr()?;
            self.expect(TokenKind::Comma)?;
            self.skip_newlines();
            let key = self.parse_expr()?;
            self.skip_newlines();
            let end = self.current_span();
            self.expect(TokenKind::RParen)?;
            return Ok(Stmt::Delete {
                target,
                key,
                span: start.merge(end),
            });
        }

        let expr = self.parse_expr()?;
        match expr {
            Expr::Index {
                object,
                index,
                span,
            } => Ok(Stmt::Delete {
                target: *object,
                key: *index,
                span: start.merge(span),
            }),
            other => Err(KeshError::syntax(
                "expected map[key] after delete",
                other.span(),
            )),
        }
    }

    fn parse_close(&mut self) -> KeshResult<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::Close)?;
        self.expect(TokenKind::LParen)?;
        let chan = self.parse_expr()?;
        let end = self.current_span();
        self.expect(TokenKind::RParen)?;
        Ok(Stmt::Close {
            chan,
            span: start.merge(end),
        })
    }

    fn parse_return(&mut self) -> KeshResult<Stmt> {
        let start = self.current_span();
        self.expect(TokenKind::Return)?;
        let mut exprs = Vec::new();
        if !self.at_stmt_end() {
            exprs.push(self.parse_expr()?);
            while self.check(TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
                exprs.push(self.parse_expr()?);
            }
        }
        let span = match exprs.last() {
            Some(e) => start.merge(e.span()),
            None => start,
        };
        Ok(Stmt::Return { exprs, span })
    }

    fn parse_block(&mut self) -> KeshResult<Block> {
        let start = self.current_span();
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(TokenKind::RBrace) || self.at_end() {
                break;
            }
            stmts.push(self.parse_stmt()?);
            self.end_stmt()?;
        }
        let end = self.current_span();
        self.expect(TokenKind::RBrace)?;
        Ok(Block {
            stmts,
            span: start.merge(end),
        })
    }

    // === EXPRESSIONS ===

    fn parse_expr(&mut self) -> KeshResult<Expr> {
        let cond = self.parse_binary(0)?;
        if self.check(TokenKind::Question) {
            self.advance();
            self.skip_newlines();
            let then_expr = self.parse_expr()?;
            self.expect(TokenKind::Colon)?;
            self.skip_newlines();
            let else_expr = self.parse_expr()?;
            let span = cond.span().merge(else_expr.span());
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
                span,
            });
        }
        Ok(cond)
    }

    fn parse_binary(&mut self, min_prec: u8) -> KeshResult<Expr> {
        let mut left = self.parse_unary()?;
        while let Some((op, prec)) = self.binary_op_of() {
            if prec < min_prec {
                break;
            }
            self.advance();
            self.skip_newlines();
            let right = self.parse_binary(prec + 1)?;
            let span = left.span().merge(right.span());
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn binary_op_of(&self) -> Option<(BinOp, u8)> {
        match self.peek_kind() {
            TokenKind::QuestionQuestion => Some((BinOp::Coalesce, 1)),
            TokenKind::OrOr => Some((BinOp::Or, 2)),
            TokenKind::AndAnd => Some((BinOp::And, 3)),
            TokenKind::EqEq => Some((BinOp::Eq, 4)),
            TokenKind::NotEq => Some((BinOp::Ne, 4)),
            TokenKind::Lt => Some((BinOp::Lt, 5)),
            TokenKind::Gt => Some((BinOp::Gt, 5)),
            TokenKind::LtEq => Some((BinOp::Le, 5)),
            TokenKind::GtEq => Some((BinOp::Ge, 5)),
            TokenKind::In => Some((BinOp::In, 5)),
            TokenKind::Pipe => Some((BinOp::BitOr, 6)),
            TokenKind::Caret => Some((BinOp::BitXor, 7)),
            TokenKind::Amp => Some((BinOp::BitAnd, 8)),
            TokenKind::Shl => Some((BinOp::Shl, 9)),
            TokenKind::Shr => Some((BinOp::Shr, 9)),
            TokenKind::Plus => Some((BinOp::Add, 10)),
            TokenKind::Minus => Some((BinOp::Sub, 10)),
            TokenKind::Star => Some((BinOp::Mul, 11)),
            TokenKind::Slash => Some((BinOp::Div, 11)),
            TokenKind::Percent => Some((BinOp::Mod, 11)),
            _ => None,
        }
    }

    fn parse_unary(&mut self) -> KeshResult<Expr> {
        let span = self.current_span();
        match self.peek_kind() {
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_unary()?;
                let span = span.merge(operand.span());
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Not => {
                self.advance();
                let operand = self.parse_unary()?;
                let span = span.merge(operand.span());
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Caret => {
                self.advance();
                let operand = self.parse_unary()?;
                let span = span.merge(operand.span());
                Ok(Expr::Unary {
                    op: UnaryOp::BitNot,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::Arrow => {
                self.advance();
                let chan = self.parse_unary()?;
                let span = span.merge(chan.span());
                Ok(Expr::Recv {
                    chan: Box::new(chan),
                    span,
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> KeshResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.advance();
                    self.skip_newlines();
                    let mut args = Vec::new();
                    let mut spread = false;
                    while !self.check(TokenKind::RParen) {
                        args.push(self.parse_expr()?);
                        if self.check(TokenKind::Ellipsis) {
                            self.advance();
                            spread = true;
                            self.skip_newlines();
                            break;
                        }
                        self.skip_newlines();
                        if self.check(TokenKind::Comma) {
                            self.advance();
                            self.skip_newlines();
                        } else {
                            break;
                        }
                    }
                    let end = self.current_span();
                    self.expect(TokenKind::RParen)?;
                    let span = expr.span().merge(end);
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        spread,
                        span,
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_ident()?;
                    let span = expr.span().merge(self.current_span());
                    expr = Expr::Member {
                        object: Box::new(expr),
                        name,
                        span,
                    };
                }
                TokenKind::LBracket => {
                    expr = self.parse_index_or_slice(expr)?;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_index_or_slice(&mut self, object: Expr) -> KeshResult<Expr> {
        self.expect(TokenKind::LBracket)?;
        self.skip_newlines();
        let begin = if self.check(TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };

        if self.check(TokenKind::RBracket) {
            let end_span = self.current_span();
            self.advance();
            let span = object.span().merge(end_span);
            return match begin {
                Some(index) => Ok(Expr::Index {
                    object: Box::new(object),
                    index,
                    span,
                }),
                None => Err(KeshError::syntax("expected index expression", span)),
            };
        }

        self.expect(TokenKind::Colon)?;
        let end = if self.check(TokenKind::RBracket) || self.check(TokenKind::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        let cap = if self.check(TokenKind::Colon) {
            self.advance();
            if self.check(TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expr()?))
            }
        } else {
            None
        };
        let close = self.current_span();
        self.expect(TokenKind::RBracket)?;
        let span = object.span().merge(close);
        Ok(Expr::Slice {
            object: Box::new(object),
            begin,
            end,
            cap,
            span,
        })
    }

    fn parse_primary(&mut self) -> KeshResult<Expr> {
        let span = self.current_span();
        match self.peek_kind() {
            TokenKind::Nil => {
                self.advance();
                Ok(Expr::Nil { span })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool { value: true, span })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool { value: false, span })
            }
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expr::Int { value, span })
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expr::Float { value, span })
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expr::Str { value, span })
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Ident { name, span })
            }
            TokenKind::LParen => {
                self.advance();
                self.skip_newlines();
                let inner = self.parse_expr()?;
                self.skip_newlines();
                let end = self.current_span();
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Paren {
                    inner: Box::new(inner),
                    span: span.merge(end),
                })
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_map_literal(),
            TokenKind::Func => self.parse_func_literal(),
            TokenKind::Len => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let inner = self.parse_expr()?;
                let end = self.current_span();
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Len {
                    expr: Box::new(inner),
                    span: span.merge(end),
                })
            }
            TokenKind::Make => self.parse_make(),
            TokenKind::New => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let type_name = self.expect_ident()?;
                let end = self.current_span();
                self.expect(TokenKind::RParen)?;
                Ok(Expr::New {
                    type_name,
                    span: span.merge(end),
                })
            }
            TokenKind::Import => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let name = self.parse_expr()?;
                let end = self.current_span();
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Import {
                    name: Box::new(name),
                    span: span.merge(end),
                })
            }
            other => Err(KeshError::syntax(
                format!("unexpected token {:?} in expression", other),
                span,
            )),
        }
    }

    fn parse_array_literal(&mut self) -> KeshResult<Expr> {
        let start = self.current_span();
        self.expect(TokenKind::LBracket)?;
        self.skip_newlines();
        let mut items = Vec::new();
        while !self.check(TokenKind::RBracket) {
            items.push(self.parse_expr()?);
            self.skip_newlines();
            if self.check(TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }
        let end = self.current_span();
        self.expect(TokenKind::RBracket)?;
        Ok(Expr::Array {
            items,
            span: start.merge(end),
        })
    }

    fn parse_map_literal(&mut self) -> KeshResult<Expr> {
        let start = self.current_span();
        self.expect(TokenKind::LBrace)?;
        self.skip_newlines();
        let mut entries = Vec::new();
        while !self.check(TokenKind::RBrace) {
            // keys stop below the ternary so the ':' stays unambiguous
            let key = self.parse_binary(0)?;
            self.expect(TokenKind::Colon)?;
            self.skip_newlines();
            let value = self.parse_expr()?;
            entries.push((key, value));
            self.skip_newlines();
            if self.check(TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }
        let end = self.current_span();
        self.expect(TokenKind::RBrace)?;
        Ok(Expr::Map {
            entries,
            span: start.merge(end),
        })
    }

    fn parse_func_literal(&mut self) -> KeshResult<Expr> {
        let start = self.current_span();
        self.expect(TokenKind::Func)?;
        let name = match self.peek_kind() {
            TokenKind::Ident(n) => {
                self.advance();
                Some(n)
            }
            _ => None,
        };
        self.expect(TokenKind::LParen)?;
        self.skip_newlines();
        let mut params = Vec::new();
        let mut vararg = false;
        while !self.check(TokenKind::RParen) {
            params.push(self.expect_ident()?);
            if self.check(TokenKind::Ellipsis) {
                self.advance();
                vararg = true;
                self.skip_newlines();
                break;
            }
            if self.check(TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        let span = start.merge(body.span);
        Ok(Expr::Func {
            name,
            params,
            vararg,
            body,
            span,
        })
    }

    fn parse_make(&mut self) -> KeshResult<Expr> {
        let start = self.current_span();
        self.expect(TokenKind::Make)?;
        self.expect(TokenKind::LParen)?;
        self.skip_newlines();
        let kind = match self.peek_kind() {
            TokenKind::Ident(name) if name == "chan" => {
                self.advance();
                let cap = if self.check(TokenKind::Comma) {
                    self.advance();
                    self.skip_newlines();
                    Some(Box::new(self.parse_expr()?))
                } else {
                    None
                };
                MakeKind::Chan { cap }
            }
            TokenKind::Ident(name) if name == "map" => {
                self.advance();
                MakeKind::Map
            }
            TokenKind::LBracket => {
                self.advance();
                self.expect(TokenKind::RBracket)?;
                let len = if self.check(TokenKind::Comma) {
                    self.advance();
                    self.skip_newlines();
                    Some(Box::new(self.parse_expr()?))
                } else {
                    None
                };
                MakeKind::Array { len }
            }
            TokenKind::Ident(name) => {
                self.advance();
                MakeKind::Named(name)
            }
            other => {
                return Err(KeshError::syntax(
                    format!("expected chan, map, [] or a type name in make, got {:?}", other),
                    self.current_span(),
                ))
            }
        };
        let end = self.current_span();
        self.expect(TokenKind::RParen)?;
        Ok(Expr::Make {
            kind,
            span: start.merge(end),
        })
    }

    // Helper methods
    fn peek_kind(&self) -> TokenKind { self.tokens.get(self.pos).map(|t| t.kind.clone()).unwrap_or(TokenKind::Eof) }
    fn current_span(&self) -> Span { self.tokens.get(self.pos).map(|t| t.span).unwrap_or_default() }
    fn at_end(&self) -> bool { matches!(self.peek_kind(), TokenKind::Eof) }
    fn check(&self, k: TokenKind) -> bool { std::mem::discriminant(&self.peek_kind()) == std::mem::discriminant(&k) }
    fn advance(&mut self) { if self.pos < self.tokens.len() { self.pos += 1; } }
    fn skip_newlines(&mut self) { while matches!(self.peek_kind(), TokenKind::Newline) { self.advance(); } }
    fn at_stmt_end(&self) -> bool { matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Semi | TokenKind::RBrace | TokenKind::Eof) }

    fn expect(&mut self, k: TokenKind) -> KeshResult<()> {
        if self.check(k.clone()) {
            self.advance();
            Ok(())
        } else {
            Err(KeshError::syntax(
                format!("expected {:?}, got {:?}", k, self.peek_kind()),
                self.current_span(),
            ))
        }
    }

    fn expect_ident(&mut self) -> KeshResult<String> {
        match self.peek_kind() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(KeshError::syntax(
                format!("expected identifier, got {:?}", other),
                self.current_span(),
            )),
        }
    }

    /// Newline or ';' ends a statement; '}' and EOF end one without
    /// being consumed.
    fn end_stmt(&mut self) -> KeshResult<()> {
        match self.peek_kind() {
            TokenKind::Newline | TokenKind::Semi => {
                self.advance();
                Ok(())
            }
            TokenKind::RBrace | TokenKind::Eof => Ok(()),
            other => Err(KeshError::syntax(
                format!("expected end of statement, got {:?}", other),
                self.current_span(),
            )),
        }
    }
}

fn compound_op_of(kind: &TokenKind) -> Option<BinOp> {
    match kind {
        TokenKind::PlusEq => Some(BinOp::Add),
        TokenKind::MinusEq => Some(BinOp::Sub),
        TokenKind::StarEq => Some(BinOp::Mul),
        TokenKind::SlashEq => Some(BinOp::Div),
        TokenKind::AmpEq => Some(BinOp::BitAnd),
        TokenKind::PipeEq => Some(BinOp::BitOr),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_src(src: &str) -> Program {
        let tokens = Lexer::new(src).tokenize().unwrap();
        Parser::new(&tokens).parse().unwrap()
    }

    fn parse_err(src: &str) -> KeshError {
        let tokens = Lexer::new(src).tokenize().unwrap();
        Parser::new(&tokens).parse().unwrap_err()
    }

    #[test]
    fn test_var_multi() {
        let program = parse_src("var a, b = 1, 2");
        assert_eq!(program.stmts.len(), 1);
        match &program.stmts[0] {
            Stmt::Var { names, exprs, .. } => {
                assert_eq!(names, &["a".to_string(), "b".to_string()]);
                assert_eq!(exprs.len(), 2);
            }
            other => panic!("expected var, got {:?}", other),
        }
    }

    #[test]
    fn test_compound_assign_desugars() {
        let program = parse_src("x += 2");
        match &program.stmts[0] {
            Stmt::Assign { targets, exprs, .. } => {
                assert_eq!(targets.len(), 1);
                match &exprs[0] {
                    Expr::Binary { op, .. } => assert_eq!(*op, BinOp::Add),
                    other => panic!("expected binary rhs, got {:?}", other),
                }
            }
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn test_increment_desugars() {
        let program = parse_src("x++");
        match &program.stmts[0] {
            Stmt::Assign { exprs, .. } => match &exprs[0] {
                Expr::Binary { op, right, .. } => {
                    assert_eq!(*op, BinOp::Add);
                    assert!(matches!(**right, Expr::Int { value: 1, .. }));
                }
                other => panic!("expected binary rhs, got {:?}", other),
            },
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let program = parse_src("1 + 2 * 3");
        match &program.stmts[0] {
            Stmt::Expr { expr, .. } => match expr {
                Expr::Binary { op, right, .. } => {
                    assert_eq!(*op, BinOp::Add);
                    assert!(matches!(**right, Expr::Binary { op: BinOp::Mul, .. }));
                }
                other => panic!("expected binary, got {:?}", other),
            },
            other => panic!("expected expr stmt, got {:?}", other),
        }
    }

    #[test]
    fn test_ternary_over_coalesce() {
        // a ?? b ? c : d groups as (a ?? b) ? c : d
        let program = parse_src("a ?? b ? c : d");
        match &program.stmts[0] {
            Stmt::Expr { expr, .. } => match expr {
                Expr::Ternary { cond, .. } => {
                    assert!(matches!(**cond, Expr::Binary { op: BinOp::Coalesce, .. }));
                }
                other => panic!("expected ternary, got {:?}", other),
            },
            other => panic!("expected expr stmt, got {:?}", other),
        }
    }

    #[test]
    fn test_if_else_chain() {
        let program = parse_src("if a {\n x = 1\n} else if b {\n x = 2\n} else {\n x = 3\n}");
        match &program.stmts[0] {
            Stmt::If { else_block, .. } => {
                let else_block = else_block.as_ref().unwrap();
                assert_eq!(else_block.stmts.len(), 1);
                match &else_block.stmts[0] {
                    Stmt::If { else_block, .. } => assert!(else_block.is_some()),
                    other => panic!("expected nested if, got {:?}", other),
                }
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_for_forms() {
        assert!(matches!(parse_src("for { break }").stmts[0], Stmt::Loop { cond: None, .. }));
        assert!(matches!(parse_src("for a < 3 { a++ }").stmts[0], Stmt::Loop { cond: Some(_), .. }));
        assert!(matches!(parse_src("for x in xs { }").stmts[0], Stmt::ForIn { .. }));
        assert!(matches!(parse_src("for k, v in m { }").stmts[0], Stmt::ForIn { .. }));
        assert!(matches!(parse_src("for i = 0; i < 3; i++ { }").stmts[0], Stmt::ForC { .. }));
        assert!(matches!(parse_src("for ; ; { break }").stmts[0], Stmt::ForC { init: None, cond: None, post: None, .. }));
    }

    #[test]
    fn test_try_catch_finally() {
        let program = parse_src("try {\n f()\n} catch e {\n g()\n} finally {\n h()\n}");
        match &program.stmts[0] {
            Stmt::Try {
                catch_name,
                catch_block,
                finally_block,
                ..
            } => {
                assert_eq!(catch_name.as_deref(), Some("e"));
                assert!(catch_block.is_some());
                assert!(finally_block.is_some());
            }
            other => panic!("expected try, got {:?}", other),
        }
    }

    #[test]
    fn test_try_requires_handler() {
        let err = parse_err("try { f() }");
        assert!(err.to_string().contains("catch or finally"));
    }

    #[test]
    fn test_switch() {
        let program = parse_src("switch x {\ncase 1, 2:\n a()\ncase 3:\n b()\ndefault:\n c()\n}");
        match &program.stmts[0] {
            Stmt::Switch { cases, default, .. } => {
                assert_eq!(cases.len(), 2);
                assert_eq!(cases[0].exprs.len(), 2);
                assert!(default.is_some());
            }
            other => panic!("expected switch, got {:?}", other),
        }
    }

    #[test]
    fn test_send_and_recv() {
        assert!(matches!(parse_src("ch <- 1").stmts[0], Stmt::Send { .. }));
        let program = parse_src("v = <-ch");
        match &program.stmts[0] {
            Stmt::Assign { exprs, .. } => assert!(matches!(exprs[0], Expr::Recv { .. })),
            other => panic!("expected assign, got {:?}", other),
        }
        let program = parse_src("v, ok = <-ch");
        match &program.stmts[0] {
            Stmt::Assign { targets, exprs, .. } => {
                assert_eq!(targets.len(), 2);
                assert_eq!(exprs.len(), 1);
            }
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn test_go_requires_call() {
        assert!(matches!(parse_src("go f(1)").stmts[0], Stmt::Go { .. }));
        assert!(matches!(parse_src("go func() { }()").stmts[0], Stmt::Go { .. }));
        let err = parse_err("go x");
        assert!(err.to_string().contains("call after go"));
    }

    #[test]
    fn test_func_literal_vararg() {
        let program = parse_src("func add(a, b...) {\n return a\n}");
        match &program.stmts[0] {
            Stmt::Expr { expr, .. } => match expr {
                Expr::Func {
                    name,
                    params,
                    vararg,
                    ..
                } => {
                    assert_eq!(name.as_deref(), Some("add"));
                    assert_eq!(params.len(), 2);
                    assert!(vararg);
                }
                other => panic!("expected func, got {:?}", other),
            },
            other => panic!("expected expr stmt, got {:?}", other),
        }
    }

    #[test]
    fn test_call_spread() {
        let program = parse_src("f(xs...)");
        match &program.stmts[0] {
            Stmt::Expr { expr, .. } => match expr {
                Expr::Call { args, spread, .. } => {
                    assert_eq!(args.len(), 1);
                    assert!(spread);
                }
                other => panic!("expected call, got {:?}", other),
            },
            other => panic!("expected expr stmt, got {:?}", other),
        }
    }

    #[test]
    fn test_slice_forms() {
        let slice = |src: &str| match parse_src(src).stmts.remove(0) {
            Stmt::Expr { expr, .. } => expr,
            other => panic!("expected expr stmt, got {:?}", other),
        };
        assert!(matches!(slice("x[1]"), Expr::Index { .. }));
        assert!(matches!(slice("x[1:2]"), Expr::Slice { begin: Some(_), end: Some(_), cap: None, .. }));
        assert!(matches!(slice("x[:2]"), Expr::Slice { begin: None, end: Some(_), .. }));
        assert!(matches!(slice("x[1:]"), Expr::Slice { begin: Some(_), end: None, .. }));
        assert!(matches!(slice("x[:]"), Expr::Slice { begin: None, end: None, .. }));
        assert!(matches!(slice("x[1:2:3]"), Expr::Slice { cap: Some(_), .. }));
    }

    #[test]
    fn test_make_forms() {
        let make_kind = |src: &str| match parse_src(src).stmts.remove(0) {
            Stmt::Expr { expr: Expr::Make { kind, .. }, .. } => kind,
            other => panic!("expected make, got {:?}", other),
        };
        assert!(matches!(make_kind("make(chan)"), MakeKind::Chan { cap: None }));
        assert!(matches!(make_kind("make(chan, 3)"), MakeKind::Chan { cap: Some(_) }));
        assert!(matches!(make_kind("make([], 4)"), MakeKind::Array { len: Some(_) }));
        assert!(matches!(make_kind("make(map)"), MakeKind::Map));
        assert!(matches!(make_kind("make(point)"), MakeKind::Named(_)));
    }

    #[test]
    fn test_delete_forms() {
        assert!(matches!(parse_src("delete(m, \"k\")").stmts[0], Stmt::Delete { .. }));
        assert!(matches!(parse_src("delete m[\"k\"]").stmts[0], Stmt::Delete { .. }));
    }

    #[test]
    fn test_multiline_literals() {
        let program = parse_src("x = [\n 1,\n 2,\n]\ny = {\n \"a\": 1,\n \"b\": 2,\n}");
        assert_eq!(program.stmts.len(), 2);
    }

    #[test]
    fn test_module_stmt() {
        let program = parse_src("module counter {\n n = 0\n}");
        match &program.stmts[0] {
            Stmt::Module { name, body, .. } => {
                assert_eq!(name, "counter");
                assert_eq!(body.stmts.len(), 1);
            }
            other => panic!("expected module, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_brace_is_error() {
        let err = parse_err("if x {\n y = 1\n");
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_invalid_assign_target() {
        let err = parse_err("f() = 1");
        assert!(err.to_string().contains("invalid assignment target"));
    }
}
