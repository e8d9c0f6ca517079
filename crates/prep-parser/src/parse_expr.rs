//! Expression parsing with full operator precedence.
//!
//! Precedence (lowest → highest):
//! 9. `lambda`
//! 8. `x if c else y`
//! 7. `or`
//! 6. `and`
//! 5. `not`
//! 4. comparisons (`==` `<` `in` `is` ...), chained
//! 3. `+`, `-`
//! 2. `*`, `/`, `//`, `%`
//! 1. unary `-`/`+`, then `**` (right-associative)
//! 0. `.attr`, `[index]`, `(call)`

use prep_lexer::token::TokenKind;
use prep_types::ast::*;
use prep_types::{ErrorCode, Span};

use crate::parser::Parser;

/// Deepest expression nesting accepted before giving up.
const MAX_EXPR_DEPTH: u32 = 40;

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Points
    // ══════════════════════════════════════════════════════════════════════════

    /// `test ("," test)* [","]`, producing a tuple when a comma appears.
    pub(crate) fn parse_expr_list(&mut self) -> prep_types::Result<Expr> {
        let first = self.parse_test()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let start = first.span;
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if !self.starts_expression() {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), self.span_from(start)))
    }

    /// A full expression, including lambdas and conditional expressions.
    pub(crate) fn parse_test(&mut self) -> prep_types::Result<Expr> {
        self.expr_depth += 1;
        if self.expr_depth > MAX_EXPR_DEPTH {
            self.expr_depth -= 1;
            return Err(self.syntax_error("expression nested too deeply"));
        }
        let result = self.parse_test_inner();
        self.expr_depth -= 1;
        result
    }

    fn parse_test_inner(&mut self) -> prep_types::Result<Expr> {
        if self.check(&TokenKind::Lambda) {
            return self.parse_lambda();
        }
        let body = self.parse_or()?;
        if !self.check(&TokenKind::If) {
            return Ok(body);
        }
        self.advance();
        let test = self.parse_or()?;
        self.expect(&TokenKind::Else)?;
        let orelse = self.parse_test()?;
        let span = body.span.merge(orelse.span);
        Ok(Expr::new(
            ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            span,
        ))
    }

    /// A condition that cannot itself be an unparenthesised conditional
    /// expression (comprehension filters).
    pub(crate) fn parse_test_no_cond(&mut self) -> prep_types::Result<Expr> {
        if self.check(&TokenKind::Lambda) {
            return self.parse_lambda();
        }
        self.parse_or()
    }

    /// Whether the current token can begin an expression.
    pub(crate) fn starts_expression(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::Bytes(_)
                | TokenKind::Name(_)
                | TokenKind::None
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Not
                | TokenKind::Lambda
                | TokenKind::Minus
                | TokenKind::Plus
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
        )
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Lambda
    // ══════════════════════════════════════════════════════════════════════════

    /// `lambda params: body`
    fn parse_lambda(&mut self) -> prep_types::Result<Expr> {
        let start = self.expect(&TokenKind::Lambda)?.span;
        let params = self.parse_params(&TokenKind::Colon, false)?;
        self.expect(&TokenKind::Colon)?;
        let body = self.parse_test()?;
        Ok(Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            self.span_from(start),
        ))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Precedence Chain
    // ══════════════════════════════════════════════════════════════════════════

    /// `OrTest = AndTest { "or" AndTest }`
    fn parse_or(&mut self) -> prep_types::Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = logical(LogicalOp::Or, left, right);
        }
        Ok(left)
    }

    /// `AndTest = NotTest { "and" NotTest }`
    fn parse_and(&mut self) -> prep_types::Result<Expr> {
        let mut left = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            let right = self.parse_not()?;
            left = logical(LogicalOp::And, left, right);
        }
        Ok(left)
    }

    /// `NotTest = "not" NotTest | Comparison`
    fn parse_not(&mut self) -> prep_types::Result<Expr> {
        if self.check(&TokenKind::Not) {
            let start = self.advance().span;
            let operand = self.parse_not()?;
            let span = start.merge(operand.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_comparison()
    }

    /// `Comparison = Arith { CmpOp Arith }`, chained like `a < b < c`.
    fn parse_comparison(&mut self) -> prep_types::Result<Expr> {
        let left = self.parse_arith()?;
        let mut ops = Vec::new();
        while let Some(op) = self.comparison_operator() {
            let right = self.parse_arith()?;
            ops.push((op, right));
        }
        if ops.is_empty() {
            return Ok(left);
        }
        let span = ops
            .iter()
            .fold(left.span, |span, (_, right)| span.merge(right.span));
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                ops,
            },
            span,
        ))
    }

    /// Consume a comparison operator, including `not in` and `is not`.
    fn comparison_operator(&mut self) -> Option<CmpOp> {
        let op = match self.peek_kind() {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::NotEq => CmpOp::NotEq,
            TokenKind::Less => CmpOp::Lt,
            TokenKind::LessEq => CmpOp::LtE,
            TokenKind::Greater => CmpOp::Gt,
            TokenKind::GreaterEq => CmpOp::GtE,
            TokenKind::In => CmpOp::In,
            TokenKind::Not if self.look_ahead(1) == &TokenKind::In => {
                self.advance();
                CmpOp::NotIn
            }
            TokenKind::Is => {
                if self.look_ahead(1) == &TokenKind::Not {
                    self.advance();
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    /// `Arith = Term { ("+" | "-") Term }`
    pub(crate) fn parse_arith(&mut self) -> prep_types::Result<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    /// `Term = Factor { ("*" | "/" | "//" | "%") Factor }`
    fn parse_term(&mut self) -> prep_types::Result<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    /// `Factor = ("-" | "+") Factor | Power`
    fn parse_factor(&mut self) -> prep_types::Result<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        let start = self.advance().span;
        let operand = self.parse_factor()?;
        let span = start.merge(operand.span);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// `Power = Primary [ "**" Factor ]`
    fn parse_power(&mut self) -> prep_types::Result<Expr> {
        let base = self.parse_primary()?;
        if self.eat(&TokenKind::DoubleStar) {
            let exponent = self.parse_factor()?;
            return Ok(binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Primary and Trailers
    // ══════════════════════════════════════════════════════════════════════════

    /// `Primary = Atom { "." Name | "[" Subscript "]" | "(" Args ")" }`
    pub(crate) fn parse_primary(&mut self) -> prep_types::Result<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_name()?;
                    let span = self.span_from(expr.span);
                    expr = Expr::attr(expr, attr, span);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_subscript()?;
                    self.expect(&TokenKind::RBracket)?;
                    let span = self.span_from(expr.span);
                    expr = Expr::new(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    self.advance();
                    let args = self.parse_call_args()?;
                    self.expect(&TokenKind::RParen)?;
                    let span = self.span_from(expr.span);
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    /// A subscript: a plain index, a tuple of indices, or a slice.
    fn parse_subscript(&mut self) -> prep_types::Result<Expr> {
        let first = self.parse_slice_item()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let start = first.span;
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            items.push(self.parse_slice_item()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), self.span_from(start)))
    }

    /// `[lower] ":" [upper] [":" [step]]` or a plain expression.
    fn parse_slice_item(&mut self) -> prep_types::Result<Expr> {
        let start = self.current_span();
        let lower = if self.check(&TokenKind::Colon) {
            None
        } else {
            let expr = self.parse_test()?;
            if !self.check(&TokenKind::Colon) {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect(&TokenKind::Colon)?;
        let upper = self.parse_optional_slice_bound()?;
        let step = if self.eat(&TokenKind::Colon) {
            self.parse_optional_slice_bound()?
        } else {
            None
        };
        Ok(Expr::new(
            ExprKind::Slice { lower, upper, step },
            self.span_from(start),
        ))
    }

    fn parse_optional_slice_bound(&mut self) -> prep_types::Result<Option<Box<Expr>>> {
        if self.starts_expression() {
            Ok(Some(Box::new(self.parse_test()?)))
        } else {
            Ok(None)
        }
    }

    /// Call arguments up to (not including) the closing `)`.
    fn parse_call_args(&mut self) -> prep_types::Result<Vec<Arg>> {
        let mut args = Vec::new();
        let mut seen_keyword = false;
        while !self.check(&TokenKind::RParen) {
            let arg = match self.peek_kind() {
                TokenKind::Star => {
                    self.advance();
                    Arg::Star(self.parse_test()?)
                }
                TokenKind::DoubleStar => {
                    self.advance();
                    seen_keyword = true;
                    Arg::DoubleStar(self.parse_test()?)
                }
                TokenKind::Name(name) if self.look_ahead(1) == &TokenKind::Eq => {
                    let name = name.clone();
                    self.advance();
                    self.advance();
                    seen_keyword = true;
                    Arg::Keyword(name, self.parse_test()?)
                }
                _ => {
                    let start = self.current_span();
                    let value = self.parse_test()?;
                    if self.check(&TokenKind::For) {
                        // A generator argument must be the only argument.
                        if !args.is_empty() {
                            return Err(self.syntax_error(
                                "generator expression must be parenthesized",
                            ));
                        }
                        let comp = self.parse_comprehension(value, start)?;
                        if !self.check(&TokenKind::RParen) {
                            return Err(self.syntax_error(
                                "generator expression must be parenthesized",
                            ));
                        }
                        args.push(Arg::Positional(comp));
                        break;
                    }
                    if seen_keyword {
                        return Err(self.error_at(
                            ErrorCode::INVALID_SYNTAX,
                            "positional argument follows keyword argument",
                            value.span,
                        ));
                    }
                    Arg::Positional(value)
                }
            };
            args.push(arg);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(args)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Atoms
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_atom(&mut self) -> prep_types::Result<Expr> {
        let token = self.peek().clone();
        let span = token.span;
        let kind = match token.kind {
            TokenKind::Name(name) => ExprKind::Name(name),
            TokenKind::Int(n) => ExprKind::Int(n),
            TokenKind::Float(n) => ExprKind::Float(n),
            TokenKind::None => ExprKind::None,
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::Str(_) | TokenKind::Bytes(_) => return self.parse_strings(),
            TokenKind::LParen => return self.parse_paren(),
            TokenKind::LBracket => return self.parse_list(),
            TokenKind::LBrace => return self.parse_dict(),
            _ => return Err(self.unexpected("an expression")),
        };
        self.advance();
        Ok(Expr::new(kind, span))
    }

    /// Adjacent string literals concatenate.
    fn parse_strings(&mut self) -> prep_types::Result<Expr> {
        let start = self.current_span();
        let mut text: Option<String> = None;
        let mut bytes: Option<Vec<u8>> = None;
        loop {
            match self.peek_kind().clone() {
                TokenKind::Str(s) => {
                    if bytes.is_some() {
                        return Err(self.syntax_error("cannot mix bytes and nonbytes literals"));
                    }
                    text.get_or_insert_with(String::new).push_str(&s);
                }
                TokenKind::Bytes(b) => {
                    if text.is_some() {
                        return Err(self.syntax_error("cannot mix bytes and nonbytes literals"));
                    }
                    bytes.get_or_insert_with(Vec::new).extend_from_slice(&b);
                }
                _ => break,
            }
            self.advance();
        }
        let span = self.span_from(start);
        Ok(match bytes {
            Some(b) => Expr::new(ExprKind::Bytes(b), span),
            None => Expr::new(ExprKind::Str(text.unwrap_or_default()), span),
        })
    }

    /// `()`, `(expr)`, `(a, b)` or `(x for x in xs)`.
    fn parse_paren(&mut self) -> prep_types::Result<Expr> {
        let start = self.expect(&TokenKind::LParen)?.span;
        if self.eat(&TokenKind::RParen) {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), self.span_from(start)));
        }
        let first = self.parse_test()?;
        if self.check(&TokenKind::For) {
            let comp = self.parse_comprehension(first, start)?;
            self.expect(&TokenKind::RParen)?;
            return Ok(Expr::new(comp.kind, self.span_from(start)));
        }
        if self.eat(&TokenKind::RParen) {
            // Grouping keeps the inner expression but widens its span.
            return Ok(Expr::new(first.kind, self.span_from(start)));
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RParen) {
                break;
            }
            items.push(self.parse_test()?);
        }
        self.expect(&TokenKind::RParen)?;
        Ok(Expr::new(ExprKind::Tuple(items), self.span_from(start)))
    }

    /// `[]`, `[a, b]` or `[x for x in xs]`.
    fn parse_list(&mut self) -> prep_types::Result<Expr> {
        let start = self.expect(&TokenKind::LBracket)?.span;
        if self.eat(&TokenKind::RBracket) {
            return Ok(Expr::new(ExprKind::List(Vec::new()), self.span_from(start)));
        }
        let first = self.parse_test()?;
        if self.check(&TokenKind::For) {
            let comp = self.parse_comprehension(first, start)?;
            self.expect(&TokenKind::RBracket)?;
            return Ok(Expr::new(comp.kind, self.span_from(start)));
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            items.push(self.parse_test()?);
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(Expr::new(ExprKind::List(items), self.span_from(start)))
    }

    /// `{}` or `{k: v, ...}`.
    fn parse_dict(&mut self) -> prep_types::Result<Expr> {
        let start = self.expect(&TokenKind::LBrace)?.span;
        let mut entries = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let key = self.parse_test()?;
            if !self.check(&TokenKind::Colon) {
                return Err(self.syntax_error("set displays are not supported"));
            }
            self.advance();
            let value = self.parse_test()?;
            entries.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Expr::new(ExprKind::Dict(entries), self.span_from(start)))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Comprehensions
    // ══════════════════════════════════════════════════════════════════════════

    /// `element for target in iter [if cond]... [for ...]`
    ///
    /// Generator expressions are evaluated eagerly, so they share the list
    /// comprehension node.
    fn parse_comprehension(&mut self, element: Expr, start: Span) -> prep_types::Result<Expr> {
        let mut clauses = Vec::new();
        while self.eat(&TokenKind::For) {
            let target = self.parse_target_list()?;
            self.expect(&TokenKind::In)?;
            let iter = self.parse_or()?;
            let mut conditions = Vec::new();
            while self.eat(&TokenKind::If) {
                conditions.push(self.parse_test_no_cond()?);
            }
            clauses.push(Comprehension {
                target,
                iter,
                conditions,
            });
        }
        Ok(Expr::new(
            ExprKind::ListComp {
                element: Box::new(element),
                clauses,
            },
            self.span_from(start),
        ))
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Targets
    // ══════════════════════════════════════════════════════════════════════════

    /// A `for` target list: `a`, `a, b`, `(a, b), c`.
    ///
    /// Parsed below comparisons so that the `in` keyword ends it.
    pub(crate) fn parse_target_list(&mut self) -> prep_types::Result<Target> {
        let first = self.parse_arith()?;
        if !self.check(&TokenKind::Comma) {
            return self.to_target(first);
        }
        let mut items = vec![self.to_target(first)?];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::In) || self.check(&TokenKind::Eq) {
                break;
            }
            let next = self.parse_arith()?;
            items.push(self.to_target(next)?);
        }
        Ok(Target::Sequence(items))
    }

    /// Convert a parsed expression into an assignment target.
    pub(crate) fn to_target(&self, expr: Expr) -> prep_types::Result<Target> {
        match expr.kind {
            ExprKind::Name(name) => Ok(Target::Name(name)),
            ExprKind::Tuple(items) | ExprKind::List(items) => items
                .into_iter()
                .map(|item| self.to_target(item))
                .collect::<prep_types::Result<Vec<_>>>()
                .map(Target::Sequence),
            ExprKind::Subscript { value, index } => Ok(Target::Subscript {
                value: *value,
                index: *index,
            }),
            ExprKind::Attribute { value, attr } => Ok(Target::Attribute { value: *value, attr }),
            _ => Err(self.error_at(
                ErrorCode::BAD_TARGET,
                "cannot assign to expression",
                expr.span,
            )),
        }
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    Expr::new(
        ExprKind::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}
