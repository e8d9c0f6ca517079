//! Core parser infrastructure: token cursor, error reporting, entry points.

use prep_lexer::token::{Token, TokenKind};
use prep_lexer::Lexer;
use prep_types::ast::*;
use prep_types::{ErrorCode, Origin, PrepError, SourceFile, Span};

/// What encloses the script being parsed.
///
/// Template directives are parsed one at a time, so the template parser
/// tells the script parser whether a loop or a function surrounds them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    /// `break` and `continue` are allowed.
    pub in_loop: bool,
    /// `return` is allowed.
    pub in_function: bool,
    /// `match` statements are recognised.
    pub pattern_matching: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            in_loop: false,
            in_function: false,
            pattern_matching: true,
        }
    }
}

/// A piece of script cut out of a template.
#[derive(Debug, Clone, Copy)]
pub struct Fragment<'a> {
    pub source_file: &'a SourceFile,
    pub text: &'a str,
    pub origin: Origin,
}

impl<'a> Fragment<'a> {
    /// A whole source file parsed as script.
    pub fn whole(source_file: &'a SourceFile) -> Self {
        Self {
            source_file,
            text: &source_file.source,
            origin: Origin::START,
        }
    }
}

/// The prep script parser.
///
/// Consumes a token stream produced by the script lexer and builds AST
/// nodes. Parsing stops at the first error.
pub struct Parser<'src> {
    /// The token stream (always ends with `Eof`).
    tokens: Vec<Token>,
    /// Current index into `tokens`.
    pos: usize,
    /// Source file for error context.
    source_file: &'src SourceFile,
    /// Enclosing loops inside the current function.
    pub(crate) loop_depth: u32,
    /// Enclosing function definitions.
    pub(crate) function_depth: u32,
    pub(crate) pattern_matching: bool,
    /// Current expression nesting.
    pub(crate) expr_depth: u32,
}

impl<'src> Parser<'src> {
    /// Create a parser from a token stream.
    pub fn new(tokens: Vec<Token>, source_file: &'src SourceFile, context: Context) -> Self {
        Self {
            tokens,
            pos: 0,
            source_file,
            loop_depth: u32::from(context.in_loop),
            function_depth: u32::from(context.in_function),
            pattern_matching: context.pattern_matching,
            expr_depth: 0,
        }
    }

    /// Tokenize a fragment and create a parser for it.
    pub fn for_fragment(fragment: Fragment<'src>, context: Context) -> prep_types::Result<Self> {
        let tokens = Lexer::new(fragment.source_file, fragment.text, fragment.origin).tokenize()?;
        Ok(Self::new(tokens, fragment.source_file, context))
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the current token without advancing.
    pub(crate) fn peek(&self) -> &Token {
        let idx = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    /// Returns the kind of the current token.
    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    /// Look ahead by `n` tokens from current position.
    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    /// Advance the cursor by one and return the consumed token.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Returns the previously consumed token's span.
    pub(crate) fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            self.current_span()
        }
    }

    /// Returns the span of the current token.
    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    /// Span from `start` to the end of the previously consumed token.
    pub(crate) fn span_from(&self, start: Span) -> Span {
        start.merge(self.previous_span())
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn rewind(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Returns `true` if the current token is `Eof`.
    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    /// Check if the current token matches the given kind exactly.
    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expect a specific token kind.
    pub(crate) fn expect(&mut self, expected: &TokenKind) -> prep_types::Result<Token> {
        if self.check(expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("'{expected}'")))
        }
    }

    /// Expect a name token. Returns the name.
    pub(crate) fn expect_name(&mut self) -> prep_types::Result<String> {
        match self.peek_kind() {
            TokenKind::Name(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    /// `a.b.c`
    pub(crate) fn expect_dotted_name(&mut self) -> prep_types::Result<String> {
        let mut name = self.expect_name()?;
        while self.eat(&TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    /// An error at a specific span.
    pub(crate) fn error_at(&self, code: ErrorCode, message: impl Into<String>, span: Span) -> PrepError {
        PrepError::at(self.source_file, code, message, span)
    }

    /// An invalid-syntax error at the current token.
    pub(crate) fn syntax_error(&self, message: impl Into<String>) -> PrepError {
        self.error_at(ErrorCode::INVALID_SYNTAX, message, self.current_span())
    }

    /// "expected X, got Y" at the current token.
    pub(crate) fn unexpected(&self, expected: &str) -> PrepError {
        let got = match self.peek_kind() {
            TokenKind::Newline | TokenKind::Eof => "end of line".to_string(),
            kind => format!("'{kind}'"),
        };
        self.syntax_error(format!("invalid syntax: expected {expected}, got {got}"))
    }

    // ── Entry Points ──────────────────────────────────────────────────────────

    /// Expect the end of the fragment, allowing trailing newlines.
    pub(crate) fn finish(&mut self) -> prep_types::Result<()> {
        while self.eat(&TokenKind::Newline) {}
        if self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of directive"))
        }
    }

    /// End of a block-opening directive: an optional `:` and nothing else.
    fn header_end(&mut self) -> prep_types::Result<()> {
        self.eat(&TokenKind::Colon);
        self.finish()
    }

    /// Parse a sequence of statements (a `script` block or a raw directive).
    pub fn parse_module(mut self) -> prep_types::Result<Vec<Stmt>> {
        let mut body = Vec::new();
        while !self.at_end() {
            if self.eat(&TokenKind::Newline) {
                continue;
            }
            if self.check(&TokenKind::Indent) {
                return Err(self.syntax_error("unexpected indent"));
            }
            body.extend(self.parse_statement()?);
        }
        Ok(body)
    }

    /// Parse a single expression (a bare tuple is allowed).
    pub fn parse_expression_only(mut self) -> prep_types::Result<Expr> {
        let expr = self.parse_expr_list()?;
        self.finish()?;
        Ok(expr)
    }

    /// `if expr`, `elif expr` or `while expr`.
    pub fn condition_header(mut self, keyword: TokenKind) -> prep_types::Result<Expr> {
        self.expect(&keyword)?;
        let test = self.parse_test()?;
        self.header_end()?;
        Ok(test)
    }

    /// `for target in iterable`
    pub fn for_header(mut self) -> prep_types::Result<(Target, Expr)> {
        self.expect(&TokenKind::For)?;
        let target = self.parse_target_list()?;
        self.expect(&TokenKind::In)?;
        let iter = self.parse_expr_list()?;
        self.header_end()?;
        Ok((target, iter))
    }

    /// `with ctx [as target], ...`
    pub fn with_header(mut self) -> prep_types::Result<Vec<WithItem>> {
        self.expect(&TokenKind::With)?;
        let items = self.parse_with_items()?;
        self.header_end()?;
        Ok(items)
    }

    /// `except [type [as name]]`
    pub fn except_header(mut self) -> prep_types::Result<(Option<Expr>, Option<String>)> {
        self.expect(&TokenKind::Except)?;
        let clause = self.parse_except_clause()?;
        self.header_end()?;
        Ok(clause)
    }

    /// `def(params)`: the signature of a callable template.
    pub fn signature(mut self) -> prep_types::Result<Params> {
        self.expect(&TokenKind::Def)?;
        self.expect(&TokenKind::LParen)?;
        let params = self.parse_params(&TokenKind::RParen, true)?;
        self.expect(&TokenKind::RParen)?;
        self.header_end()?;
        Ok(params)
    }

    /// `def name(params)`: a named sub-block.
    pub fn tdef_header(mut self) -> prep_types::Result<(String, Params)> {
        self.expect(&TokenKind::Def)?;
        let name = self.expect_name()?;
        self.expect(&TokenKind::LParen)?;
        let params = self.parse_params(&TokenKind::RParen, true)?;
        self.expect(&TokenKind::RParen)?;
        self.header_end()?;
        Ok((name, params))
    }

    /// `match subject`
    pub fn match_header(mut self) -> prep_types::Result<Expr> {
        if !self.peek_kind().is_name("match") {
            return Err(self.unexpected("'match'"));
        }
        self.advance();
        let subject = self.parse_expr_list()?;
        self.header_end()?;
        Ok(subject)
    }

    /// `case pattern [if guard]`
    pub fn case_header(mut self) -> prep_types::Result<(Pattern, Option<Expr>)> {
        if !self.peek_kind().is_name("case") {
            return Err(self.unexpected("'case'"));
        }
        self.advance();
        let pattern = self.parse_case_pattern()?;
        let guard = if self.eat(&TokenKind::If) {
            Some(self.parse_test()?)
        } else {
            None
        };
        self.header_end()?;
        Ok((pattern, guard))
    }

    // ── Contextual checks ─────────────────────────────────────────────────────

    pub(crate) fn check_in_loop(&self, keyword: &str, span: Span) -> prep_types::Result<()> {
        if self.loop_depth == 0 {
            return Err(self.error_at(ErrorCode::OUTSIDE_LOOP, format!("'{keyword}' outside loop"), span));
        }
        Ok(())
    }

    pub(crate) fn check_in_function(&self, span: Span) -> prep_types::Result<()> {
        if self.function_depth == 0 {
            return Err(self.error_at(ErrorCode::OUTSIDE_FUNCTION, "'return' outside function", span));
        }
        Ok(())
    }
}

/// Parse a fragment as a sequence of statements.
pub fn parse_script(fragment: Fragment<'_>, context: Context) -> prep_types::Result<Vec<Stmt>> {
    Parser::for_fragment(fragment, context)?.parse_module()
}

/// Parse a fragment as a single expression.
pub fn parse_expression(fragment: Fragment<'_>) -> prep_types::Result<Expr> {
    Parser::for_fragment(fragment, Context::default())?.parse_expression_only()
}
