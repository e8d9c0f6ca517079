//! Statement parsing: simple statements, compound blocks, parameter lists
//! and `case` patterns.

use prep_lexer::token::TokenKind;
use prep_types::ast::*;
use prep_types::{ErrorCode, Span};

use crate::parser::Parser;

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Dispatch
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse one logical line, or one compound statement.
    ///
    /// A line of `;`-separated simple statements yields several statements.
    pub(crate) fn parse_statement(&mut self) -> prep_types::Result<Vec<Stmt>> {
        let stmt = match self.peek_kind() {
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::For => self.parse_for()?,
            TokenKind::Try => self.parse_try()?,
            TokenKind::With => self.parse_with()?,
            TokenKind::Def => self.parse_function_def()?,
            TokenKind::Name(name) if name == "match" && self.pattern_matching => {
                match self.try_parse_match()? {
                    Some(stmt) => stmt,
                    None => return self.parse_simple_line(),
                }
            }
            _ => return self.parse_simple_line(),
        };
        Ok(vec![stmt])
    }

    /// `simple (";" simple)* [";"] NEWLINE`
    fn parse_simple_line(&mut self) -> prep_types::Result<Vec<Stmt>> {
        let mut stmts = vec![self.parse_simple()?];
        while self.eat(&TokenKind::Semicolon) {
            if matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_simple()?);
        }
        if !self.eat(&TokenKind::Newline) && !self.at_end() {
            return Err(self.unexpected("end of line"));
        }
        Ok(stmts)
    }

    /// `":" (NEWLINE INDENT stmt+ DEDENT | simple_line)`
    pub(crate) fn parse_block(&mut self) -> prep_types::Result<Vec<Stmt>> {
        self.expect(&TokenKind::Colon)?;
        if !self.eat(&TokenKind::Newline) {
            return self.parse_simple_line();
        }
        if !self.eat(&TokenKind::Indent) {
            return Err(self.syntax_error("expected an indented block"));
        }
        let mut body = Vec::new();
        while !self.eat(&TokenKind::Dedent) && !self.at_end() {
            if self.eat(&TokenKind::Newline) {
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        Ok(body)
    }

    /// A loop body: `break` and `continue` become legal inside it.
    fn parse_loop_block(&mut self) -> prep_types::Result<Vec<Stmt>> {
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        body
    }

    fn parse_else_block(&mut self) -> prep_types::Result<Vec<Stmt>> {
        if self.eat(&TokenKind::Else) {
            self.parse_block()
        } else {
            Ok(Vec::new())
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Compound Statements
    // ══════════════════════════════════════════════════════════════════════════

    /// `if test: block (elif test: block)* [else: block]`
    ///
    /// `elif` chains nest as a single `If` in `orelse`.
    fn parse_if(&mut self) -> prep_types::Result<Stmt> {
        let start = self.advance().span;
        let test = self.parse_test()?;
        let body = self.parse_block()?;
        let orelse = if self.check(&TokenKind::Elif) {
            vec![self.parse_if()?]
        } else {
            self.parse_else_block()?
        };
        Ok(Stmt::new(
            StmtKind::If { test, body, orelse },
            self.span_from(start),
        ))
    }

    /// `while test: block [else: block]`
    fn parse_while(&mut self) -> prep_types::Result<Stmt> {
        let start = self.expect(&TokenKind::While)?.span;
        let test = self.parse_test()?;
        let body = self.parse_loop_block()?;
        let orelse = self.parse_else_block()?;
        Ok(Stmt::new(
            StmtKind::While { test, body, orelse },
            self.span_from(start),
        ))
    }

    /// `for targets in exprs: block [else: block]`
    fn parse_for(&mut self) -> prep_types::Result<Stmt> {
        let start = self.expect(&TokenKind::For)?.span;
        let target = self.parse_target_list()?;
        self.expect(&TokenKind::In)?;
        let iter = self.parse_expr_list()?;
        let body = self.parse_loop_block()?;
        let orelse = self.parse_else_block()?;
        Ok(Stmt::new(
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            },
            self.span_from(start),
        ))
    }

    /// `try: block (except ...: block)* [else: block] [finally: block]`
    fn parse_try(&mut self) -> prep_types::Result<Stmt> {
        let start = self.expect(&TokenKind::Try)?.span;
        let body = self.parse_block()?;

        let mut handlers: Vec<Handler> = Vec::new();
        while self.check(&TokenKind::Except) {
            let clause_start = self.advance().span;
            if let Some(previous) = handlers.last() {
                if previous.kind.is_none() {
                    return Err(self.error_at(
                        ErrorCode::INVALID_SYNTAX,
                        "default 'except:' must be last",
                        previous.span,
                    ));
                }
            }
            let (kind, name) = self.parse_except_clause()?;
            let handler_body = self.parse_block()?;
            handlers.push(Handler {
                kind,
                name,
                body: handler_body,
                span: self.span_from(clause_start),
            });
        }

        let orelse = if !handlers.is_empty() {
            self.parse_else_block()?
        } else {
            Vec::new()
        };
        let finalbody = if self.eat(&TokenKind::Finally) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.syntax_error("expected 'except' or 'finally' block"));
        }
        Ok(Stmt::new(
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
            self.span_from(start),
        ))
    }

    /// The part of an `except` clause after the keyword.
    pub(crate) fn parse_except_clause(&mut self) -> prep_types::Result<(Option<Expr>, Option<String>)> {
        if !self.starts_expression() {
            return Ok((None, None));
        }
        let kind = self.parse_test()?;
        let name = if self.eat(&TokenKind::As) {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok((Some(kind), name))
    }

    /// `with item ("," item)*: block`
    fn parse_with(&mut self) -> prep_types::Result<Stmt> {
        let start = self.expect(&TokenKind::With)?.span;
        let items = self.parse_with_items()?;
        let body = self.parse_block()?;
        Ok(Stmt::new(StmtKind::With { items, body }, self.span_from(start)))
    }

    /// `expr [as target] ("," expr [as target])*`
    pub(crate) fn parse_with_items(&mut self) -> prep_types::Result<Vec<WithItem>> {
        let mut items = Vec::new();
        loop {
            let context = self.parse_test()?;
            let target = if self.eat(&TokenKind::As) {
                let expr = self.parse_arith()?;
                Some(self.to_target(expr)?)
            } else {
                None
            };
            items.push(WithItem { context, target });
            if !self.eat(&TokenKind::Comma) {
                return Ok(items);
            }
        }
    }

    /// `def name(params) [-> annotation]: block`
    fn parse_function_def(&mut self) -> prep_types::Result<Stmt> {
        let start = self.expect(&TokenKind::Def)?.span;
        let name = self.expect_name()?;
        self.expect(&TokenKind::LParen)?;
        let params = self.parse_params(&TokenKind::RParen, true)?;
        self.expect(&TokenKind::RParen)?;
        if self.eat(&TokenKind::Arrow) {
            self.parse_test()?;
        }
        let body = self.parse_function_body()?;
        Ok(Stmt::new(
            StmtKind::FunctionDef { name, params, body },
            self.span_from(start),
        ))
    }

    /// A function body: `return` is legal, enclosing loops are not visible.
    fn parse_function_body(&mut self) -> prep_types::Result<Vec<Stmt>> {
        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.parse_block();
        self.function_depth -= 1;
        self.loop_depth = saved_loops;
        body
    }

    /// `match subject: NEWLINE INDENT case+ DEDENT`
    ///
    /// `match` is a soft keyword: if the line does not have the shape of a
    /// match statement it is rewound and parsed as a simple statement.
    fn try_parse_match(&mut self) -> prep_types::Result<Option<Stmt>> {
        let mark = self.position();
        let start = self.advance().span;
        let subject = match self.parse_match_subject() {
            Some(subject) => subject,
            None => {
                self.rewind(mark);
                return Ok(None);
            }
        };
        if !self.eat(&TokenKind::Indent) {
            return Err(self.syntax_error("expected an indented block"));
        }
        let mut cases = Vec::new();
        while !self.eat(&TokenKind::Dedent) && !self.at_end() {
            if self.eat(&TokenKind::Newline) {
                continue;
            }
            if !self.peek_kind().is_name("case") {
                return Err(self.unexpected("'case'"));
            }
            let case_start = self.advance().span;
            let pattern = self.parse_case_pattern()?;
            let guard = if self.eat(&TokenKind::If) {
                Some(self.parse_test()?)
            } else {
                None
            };
            let body = self.parse_block()?;
            cases.push(MatchCase {
                pattern,
                guard,
                body,
                span: self.span_from(case_start),
            });
        }
        if cases.is_empty() {
            return Err(self.error_at(
                ErrorCode::BAD_MATCH,
                "match statement needs at least one case",
                start,
            ));
        }
        Ok(Some(Stmt::new(
            StmtKind::Match { subject, cases },
            self.span_from(start),
        )))
    }

    /// `subject ":" NEWLINE`, or `None` if the tokens do not fit.
    fn parse_match_subject(&mut self) -> Option<Expr> {
        if !self.starts_expression() {
            return None;
        }
        let subject = self.parse_expr_list().ok()?;
        if self.eat(&TokenKind::Colon) && self.eat(&TokenKind::Newline) {
            Some(subject)
        } else {
            None
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Simple Statements
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_simple(&mut self) -> prep_types::Result<Stmt> {
        let start = self.current_span();
        let kind = match self.peek_kind() {
            TokenKind::Pass => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Break => {
                self.advance();
                self.check_in_loop("break", start)?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                self.check_in_loop("continue", start)?;
                StmtKind::Continue
            }
            TokenKind::Return => {
                self.advance();
                self.check_in_function(start)?;
                let value = if self.starts_expression() {
                    Some(self.parse_expr_list()?)
                } else {
                    None
                };
                StmtKind::Return(value)
            }
            TokenKind::Raise => {
                self.advance();
                let value = if self.starts_expression() {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                StmtKind::Raise(value)
            }
            TokenKind::Assert => {
                self.advance();
                let test = self.parse_test()?;
                let msg = if self.eat(&TokenKind::Comma) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                StmtKind::Assert { test, msg }
            }
            TokenKind::Del => {
                self.advance();
                let expr = self.parse_expr_list()?;
                let targets = match self.to_target(expr)? {
                    Target::Sequence(items) => items,
                    single => vec![single],
                };
                StmtKind::Del(targets)
            }
            TokenKind::Import => {
                self.advance();
                StmtKind::Import(self.parse_aliases(true)?)
            }
            TokenKind::From => {
                self.advance();
                let module = self.expect_dotted_name()?;
                self.expect(&TokenKind::Import)?;
                let names = if self.eat(&TokenKind::LParen) {
                    let names = self.parse_aliases(false)?;
                    self.expect(&TokenKind::RParen)?;
                    names
                } else {
                    self.parse_aliases(false)?
                };
                StmtKind::ImportFrom { module, names }
            }
            _ => return self.parse_expression_statement(),
        };
        Ok(Stmt::new(kind, self.span_from(start)))
    }

    /// `name [as alias] ("," name [as alias])*`
    fn parse_aliases(&mut self, dotted: bool) -> prep_types::Result<Vec<Alias>> {
        let mut aliases = Vec::new();
        loop {
            let name = if dotted {
                self.expect_dotted_name()?
            } else {
                self.expect_name()?
            };
            let asname = if self.eat(&TokenKind::As) {
                Some(self.expect_name()?)
            } else {
                None
            };
            aliases.push(Alias { name, asname });
            if !self.eat(&TokenKind::Comma) || !matches!(self.peek_kind(), TokenKind::Name(_)) {
                return Ok(aliases);
            }
        }
    }

    /// An expression statement, a chained assignment or an augmented
    /// assignment.
    fn parse_expression_statement(&mut self) -> prep_types::Result<Stmt> {
        let first = self.parse_expr_list()?;
        let start = first.span;

        if let Some(op) = self.augmented_operator() {
            self.advance();
            if matches!(first.kind, ExprKind::Tuple(_) | ExprKind::List(_)) {
                return Err(self.error_at(
                    ErrorCode::BAD_TARGET,
                    "illegal expression for augmented assignment",
                    first.span,
                ));
            }
            let target = self.to_target(first)?;
            let value = self.parse_expr_list()?;
            return Ok(Stmt::new(
                StmtKind::AugAssign { target, op, value },
                self.span_from(start),
            ));
        }

        if !self.check(&TokenKind::Eq) {
            return Ok(Stmt::expr(first));
        }
        let mut targets = vec![self.to_target(first)?];
        self.advance();
        let mut value = self.parse_expr_list()?;
        while self.eat(&TokenKind::Eq) {
            targets.push(self.to_target(value)?);
            value = self.parse_expr_list()?;
        }
        Ok(Stmt::new(
            StmtKind::Assign { targets, value },
            self.span_from(start),
        ))
    }

    fn augmented_operator(&self) -> Option<BinOp> {
        Some(match self.peek_kind() {
            TokenKind::PlusEq => BinOp::Add,
            TokenKind::MinusEq => BinOp::Sub,
            TokenKind::StarEq => BinOp::Mul,
            TokenKind::SlashEq => BinOp::Div,
            TokenKind::DoubleSlashEq => BinOp::FloorDiv,
            TokenKind::PercentEq => BinOp::Mod,
            TokenKind::DoubleStarEq => BinOp::Pow,
            _ => return None,
        })
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Parameters
    // ══════════════════════════════════════════════════════════════════════════

    /// A parameter list up to (not including) `end`.
    ///
    /// `a, b=1, *args, c, d=2, **kw`. A bare `*` starts keyword-only
    /// parameters. Annotations are accepted and discarded when
    /// `annotations` is set (they would be ambiguous in a lambda).
    pub(crate) fn parse_params(&mut self, end: &TokenKind, annotations: bool) -> prep_types::Result<Params> {
        let mut params = Params::default();
        let mut after_star = false;
        let mut seen: Vec<String> = Vec::new();
        while !self.check(end) {
            let span = self.current_span();
            if self.eat(&TokenKind::DoubleStar) {
                let name = self.parse_param_name(annotations, &mut seen, span)?;
                params.kwarg = Some(name);
                self.eat(&TokenKind::Comma);
                if !self.check(end) {
                    return Err(self.syntax_error("arguments cannot follow var-keyword argument"));
                }
                break;
            }
            if self.eat(&TokenKind::Star) {
                if after_star {
                    return Err(self.error_at(ErrorCode::INVALID_SYNTAX, "* argument may appear only once", span));
                }
                after_star = true;
                if matches!(self.peek_kind(), TokenKind::Name(_)) {
                    params.vararg = Some(self.parse_param_name(annotations, &mut seen, span)?);
                } else if !self.check(&TokenKind::Comma) {
                    return Err(self.syntax_error("named arguments must follow bare *"));
                }
            } else {
                let name = self.parse_param_name(annotations, &mut seen, span)?;
                let default = if self.eat(&TokenKind::Eq) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                if after_star {
                    params.kwonly.push(Param { name, default });
                } else {
                    let follows_default = params.positional.last().is_some_and(|p| p.default.is_some());
                    if default.is_none() && follows_default {
                        return Err(self.error_at(
                            ErrorCode::INVALID_SYNTAX,
                            "non-default argument follows default argument",
                            span,
                        ));
                    }
                    params.positional.push(Param { name, default });
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        if after_star && params.vararg.is_none() && params.kwonly.is_empty() {
            return Err(self.syntax_error("named arguments must follow bare *"));
        }
        Ok(params)
    }

    fn parse_param_name(&mut self, annotations: bool, seen: &mut Vec<String>, span: Span) -> prep_types::Result<String> {
        let name = self.expect_name()?;
        if seen.contains(&name) {
            return Err(self.error_at(
                ErrorCode::INVALID_SYNTAX,
                format!("duplicate argument '{name}' in function definition"),
                self.span_from(span),
            ));
        }
        seen.push(name.clone());
        if annotations && self.eat(&TokenKind::Colon) {
            self.parse_test()?;
        }
        Ok(name)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Patterns
    // ══════════════════════════════════════════════════════════════════════════

    /// A `case` pattern; a top-level comma list is an open sequence.
    pub(crate) fn parse_case_pattern(&mut self) -> prep_types::Result<Pattern> {
        let first = self.parse_as_pattern()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if matches!(self.peek_kind(), TokenKind::Colon | TokenKind::If | TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            items.push(self.parse_as_pattern()?);
        }
        Ok(Pattern::Sequence(items))
    }

    /// `or_pattern [as name]`
    fn parse_as_pattern(&mut self) -> prep_types::Result<Pattern> {
        let pattern = self.parse_or_pattern()?;
        if self.eat(&TokenKind::As) {
            let span = self.current_span();
            let name = self.expect_name()?;
            if name == "_" {
                return Err(self.error_at(ErrorCode::BAD_MATCH, "cannot use '_' as a target", span));
            }
            return Ok(Pattern::As(Box::new(pattern), name));
        }
        Ok(pattern)
    }

    /// `closed ("|" closed)*`
    fn parse_or_pattern(&mut self) -> prep_types::Result<Pattern> {
        let first = self.parse_closed_pattern()?;
        if !self.check(&TokenKind::Pipe) {
            return Ok(first);
        }
        let mut alternatives = vec![first];
        while self.eat(&TokenKind::Pipe) {
            alternatives.push(self.parse_closed_pattern()?);
        }
        Ok(Pattern::Or(alternatives))
    }

    fn parse_closed_pattern(&mut self) -> prep_types::Result<Pattern> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Name(name) => {
                self.advance();
                if self.check(&TokenKind::Dot) {
                    let mut value = Expr::name(name, token.span);
                    while self.eat(&TokenKind::Dot) {
                        let attr = self.expect_name()?;
                        let span = self.span_from(token.span);
                        value = Expr::attr(value, attr, span);
                    }
                    return Ok(Pattern::Value(value));
                }
                if self.check(&TokenKind::LParen) {
                    return Err(self.error_at(
                        ErrorCode::BAD_MATCH,
                        "class patterns are not supported",
                        token.span,
                    ));
                }
                if name == "_" {
                    Ok(Pattern::Wildcard)
                } else {
                    Ok(Pattern::Capture(name))
                }
            }
            TokenKind::LParen | TokenKind::LBracket => {
                let close = if token.kind == TokenKind::LParen {
                    TokenKind::RParen
                } else {
                    TokenKind::RBracket
                };
                self.advance();
                let mut items = Vec::new();
                let mut trailing_comma = false;
                while !self.check(&close) {
                    items.push(self.parse_as_pattern()?);
                    trailing_comma = self.eat(&TokenKind::Comma);
                    if !trailing_comma {
                        break;
                    }
                }
                self.expect(&close)?;
                // `(p)` is a group, `(p,)` and `[p]` are sequences.
                if close == TokenKind::RParen && items.len() == 1 && !trailing_comma {
                    return Ok(items.remove(0));
                }
                Ok(Pattern::Sequence(items))
            }
            TokenKind::Minus => {
                self.advance();
                let value = match self.peek_kind() {
                    TokenKind::Int(n) => ExprKind::Int(-n),
                    TokenKind::Float(n) => ExprKind::Float(-n),
                    _ => return Err(self.unexpected("a number")),
                };
                self.advance();
                Ok(Pattern::Value(Expr::new(value, self.span_from(token.span))))
            }
            TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::Bytes(_)
            | TokenKind::None
            | TokenKind::True
            | TokenKind::False => {
                let value = self.parse_primary()?;
                Ok(Pattern::Value(value))
            }
            _ => Err(self.error_at(
                ErrorCode::BAD_MATCH,
                format!("invalid pattern starting with '{}'", token.kind),
                token.span,
            )),
        }
    }
}
