//! Script lexer: converts a fragment of prep script into a token stream.
//!
//! Features:
//! - Indentation tracked with an indent stack, emitting `Indent`/`Dedent`
//! - Implicit line joining inside brackets, explicit joining with `\`
//! - `#` comments, blank lines skipped
//! - Single, double and triple quoted strings; `r` and `b` prefixes
//! - Every span rebased from the fragment onto the template through an
//!   [`Origin`], so nested fragments never drift
//!
//! Lexing stops at the first error.

use prep_types::{ErrorCode, Origin, PrepError, SourceFile, Span};

use crate::token::{Token, TokenKind};

/// The script lexer.
pub struct Lexer<'src> {
    /// Fragment being tokenized.
    text: &'src str,
    /// The template the fragment was cut from, for error reporting.
    source_file: &'src SourceFile,
    /// Where the fragment sits inside the template.
    origin: Origin,
    /// Current byte offset into `text`.
    pos: usize,
    /// Current line within the fragment (1-based).
    line: u32,
    /// Current column within the fragment (1-based, in chars).
    col: u32,
    /// Open bracket depth; newlines are insignificant while positive.
    depth: u32,
    /// Indentation widths of the enclosing blocks.
    indents: Vec<u32>,
    /// At the start of a logical line, indentation not yet measured.
    at_line_start: bool,
    tokens: Vec<Token>,
}

impl<'src> Lexer<'src> {
    /// Create a lexer for `text`, which starts at `origin` in `source_file`.
    pub fn new(source_file: &'src SourceFile, text: &'src str, origin: Origin) -> Self {
        Self {
            text,
            source_file,
            origin,
            pos: 0,
            line: 1,
            col: 1,
            depth: 0,
            indents: vec![0],
            at_line_start: true,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the whole fragment. The stream always ends with a
    /// `Newline`, any pending `Dedent`s, then `Eof`.
    pub fn tokenize(mut self) -> prep_types::Result<Vec<Token>> {
        loop {
            if self.at_line_start && self.depth == 0 {
                self.at_line_start = false;
                if !self.indentation()? {
                    continue;
                }
            }
            let Some(c) = self.peek() else {
                break;
            };
            match c {
                ' ' | '\t' | '\x0c' | '\r' => {
                    self.bump();
                }
                '#' => self.skip_comment(),
                '\n' => {
                    let start = self.here();
                    self.bump();
                    if self.depth == 0 {
                        self.push(TokenKind::Newline, start);
                        self.at_line_start = true;
                    }
                }
                '\\' => self.continuation()?,
                _ => self.scan_token(c)?,
            }
        }
        self.finish()
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.text[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn here(&self) -> (u32, u32) {
        (self.line, self.col)
    }

    fn span_from(&self, start: (u32, u32)) -> Span {
        Span::new(start.0, start.1, self.line, self.col).rebase(self.origin)
    }

    fn push(&mut self, kind: TokenKind, start: (u32, u32)) {
        let span = self.span_from(start);
        self.tokens.push(Token::new(kind, span));
    }

    fn error(&self, code: ErrorCode, message: impl Into<String>, start: (u32, u32)) -> PrepError {
        PrepError::at(self.source_file, code, message, self.span_from(start))
    }

    fn last_is_newline(&self) -> bool {
        matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline) | Some(TokenKind::Indent) | Some(TokenKind::Dedent)
        )
    }

    // ─────────────────────────────────────────────────────────────
    // Layout
    // ─────────────────────────────────────────────────────────────

    /// Measure the indentation of a new line. Returns `false` if the line
    /// was blank or a comment and has been skipped.
    fn indentation(&mut self) -> prep_types::Result<bool> {
        let start = self.here();
        let mut width = 0u32;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' => width = 0,
                _ => break,
            }
            self.bump();
        }
        match self.peek() {
            None => return Ok(true),
            Some('\n') | Some('#') | Some('\r') => {
                self.skip_comment();
                if self.peek() == Some('\r') {
                    self.bump();
                }
                if self.peek() == Some('\n') {
                    self.bump();
                }
                self.at_line_start = true;
                return Ok(false);
            }
            Some('\\') if matches!(self.peek_at(1), Some('\n')) => {
                // a continuation on an otherwise empty line joins onto it
                return Ok(true);
            }
            _ => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, start);
        } else if width < current {
            while self.indents.last().is_some_and(|&w| w > width) {
                self.indents.pop();
                self.push(TokenKind::Dedent, start);
            }
            if self.indents.last().copied() != Some(width) {
                return Err(self.error(
                    ErrorCode::BAD_INDENT,
                    "unindent does not match any outer indentation level",
                    start,
                ));
            }
        }
        Ok(true)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// `\` followed by a newline joins two physical lines.
    fn continuation(&mut self) -> prep_types::Result<()> {
        let start = self.here();
        self.bump();
        if self.peek() == Some('\r') {
            self.bump();
        }
        if !self.eat('\n') {
            return Err(self.error(
                ErrorCode::BAD_CHARACTER,
                "unexpected character after line continuation character",
                start,
            ));
        }
        Ok(())
    }

    fn finish(mut self) -> prep_types::Result<Vec<Token>> {
        let end = self.here();
        if self.depth > 0 {
            return Err(self.error(ErrorCode::INVALID_SYNTAX, "unexpected end of input inside brackets", end));
        }
        if !self.last_is_newline() {
            self.push(TokenKind::Newline, end);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, end);
        }
        self.push(TokenKind::Eof, end);
        Ok(self.tokens)
    }

    // ─────────────────────────────────────────────────────────────
    // Tokens
    // ─────────────────────────────────────────────────────────────

    fn scan_token(&mut self, c: char) -> prep_types::Result<()> {
        let start = self.here();
        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.scan_number(start);
        }
        if c == '"' || c == '\'' {
            return self.scan_string(start, false, false);
        }
        if c == '_' || c.is_alphabetic() {
            if let Some((raw, bytes, skip)) = self.string_prefix() {
                for _ in 0..skip {
                    self.bump();
                }
                return self.scan_string(start, raw, bytes);
            }
            return self.scan_name(start);
        }

        self.bump();
        let kind = match c {
            '(' | '[' | '{' => {
                self.depth += 1;
                match c {
                    '(' => TokenKind::LParen,
                    '[' => TokenKind::LBracket,
                    _ => TokenKind::LBrace,
                }
            }
            ')' | ']' | '}' => {
                self.depth = self.depth.saturating_sub(1);
                match c {
                    ')' => TokenKind::RParen,
                    ']' => TokenKind::RBracket,
                    _ => TokenKind::RBrace,
                }
            }
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            '|' => TokenKind::Pipe,
            '+' => self.with_eq(TokenKind::Plus, TokenKind::PlusEq),
            '%' => self.with_eq(TokenKind::Percent, TokenKind::PercentEq),
            '-' => {
                if self.eat('>') {
                    TokenKind::Arrow
                } else {
                    self.with_eq(TokenKind::Minus, TokenKind::MinusEq)
                }
            }
            '*' => {
                if self.eat('*') {
                    self.with_eq(TokenKind::DoubleStar, TokenKind::DoubleStarEq)
                } else {
                    self.with_eq(TokenKind::Star, TokenKind::StarEq)
                }
            }
            '/' => {
                if self.eat('/') {
                    self.with_eq(TokenKind::DoubleSlash, TokenKind::DoubleSlashEq)
                } else {
                    self.with_eq(TokenKind::Slash, TokenKind::SlashEq)
                }
            }
            '=' => self.with_eq(TokenKind::Eq, TokenKind::EqEq),
            '<' => self.with_eq(TokenKind::Less, TokenKind::LessEq),
            '>' => self.with_eq(TokenKind::Greater, TokenKind::GreaterEq),
            '!' if self.eat('=') => TokenKind::NotEq,
            other => {
                return Err(self.error(
                    ErrorCode::BAD_CHARACTER,
                    format!("invalid character '{other}'"),
                    start,
                ))
            }
        };
        self.push(kind, start);
        Ok(())
    }

    fn with_eq(&mut self, plain: TokenKind, with_eq: TokenKind) -> TokenKind {
        if self.eat('=') {
            with_eq
        } else {
            plain
        }
    }

    /// Recognise `r'`, `b"`, `rb'`, `Br"`... Returns (raw, bytes, prefix length).
    fn string_prefix(&self) -> Option<(bool, bool, usize)> {
        let mut raw = false;
        let mut bytes = false;
        for n in 0..3 {
            match self.peek_at(n)? {
                'r' | 'R' if !raw => raw = true,
                'b' | 'B' if !bytes => bytes = true,
                '\'' | '"' if n > 0 => return Some((raw, bytes, n)),
                _ => return None,
            }
        }
        None
    }

    fn scan_name(&mut self, start: (u32, u32)) -> prep_types::Result<()> {
        let begin = self.pos;
        while self.peek().is_some_and(|c| c == '_' || c.is_alphanumeric()) {
            self.bump();
        }
        let word = &self.text[begin..self.pos];
        let kind = TokenKind::from_keyword(word).unwrap_or_else(|| TokenKind::Name(word.to_string()));
        self.push(kind, start);
        Ok(())
    }

    fn scan_number(&mut self, start: (u32, u32)) -> prep_types::Result<()> {
        let begin = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')) {
            self.bump();
            let radix = match self.bump() {
                Some('x' | 'X') => 16,
                Some('o' | 'O') => 8,
                _ => 2,
            };
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_digit(radix) || c == '_') {
                self.bump();
            }
            let digits = self.text[digits_start..self.pos].replace('_', "");
            let value = i64::from_str_radix(&digits, radix)
                .map_err(|_| self.error(ErrorCode::BAD_NUMBER, "invalid integer literal", start))?;
            self.push(TokenKind::Int(value), start);
            return Ok(());
        }

        let mut is_float = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_none_or(|c| c != '.') {
            is_float = true;
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E'))
            && (self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
                || (matches!(self.peek_at(1), Some('+' | '-')) && self.peek_at(2).is_some_and(|c| c.is_ascii_digit())))
        {
            is_float = true;
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if self.peek().is_some_and(|c| c == '_' || c.is_alphabetic()) {
            return Err(self.error(ErrorCode::BAD_NUMBER, "invalid decimal literal", start));
        }

        let literal = self.text[begin..self.pos].replace('_', "");
        let kind = if is_float {
            TokenKind::Float(
                literal
                    .parse()
                    .map_err(|_| self.error(ErrorCode::BAD_NUMBER, "invalid float literal", start))?,
            )
        } else {
            TokenKind::Int(
                literal
                    .parse()
                    .map_err(|_| self.error(ErrorCode::BAD_NUMBER, "integer literal too large", start))?,
            )
        };
        self.push(kind, start);
        Ok(())
    }

    fn scan_string(&mut self, start: (u32, u32), raw: bool, bytes: bool) -> prep_types::Result<()> {
        let Some(quote) = self.bump() else {
            return Err(self.error(ErrorCode::UNTERMINATED_STRING, "unterminated string literal", start));
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error(ErrorCode::UNTERMINATED_STRING, "unterminated string literal", start));
            };
            match c {
                c if c == quote => {
                    if !triple {
                        break;
                    }
                    if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                        self.bump();
                        self.bump();
                        break;
                    }
                    value.push(c);
                }
                '\n' if !triple => {
                    return Err(self.error(ErrorCode::UNTERMINATED_STRING, "unterminated string literal", start));
                }
                '\\' if raw => {
                    value.push('\\');
                    if let Some(next) = self.bump() {
                        value.push(next);
                    }
                }
                '\\' => self.escape(&mut value, start)?,
                c => value.push(c),
            }
        }

        let kind = if bytes {
            if !value.is_ascii() {
                return Err(self.error(
                    ErrorCode::BAD_CHARACTER,
                    "bytes can only contain ASCII literal characters",
                    start,
                ));
            }
            TokenKind::Bytes(value.into_bytes())
        } else {
            TokenKind::Str(value)
        };
        self.push(kind, start);
        Ok(())
    }

    fn escape(&mut self, value: &mut String, start: (u32, u32)) -> prep_types::Result<()> {
        let Some(c) = self.bump() else {
            return Err(self.error(ErrorCode::UNTERMINATED_STRING, "unterminated string literal", start));
        };
        match c {
            '\n' => {}
            'n' => value.push('\n'),
            't' => value.push('\t'),
            'r' => value.push('\r'),
            '0' => value.push('\0'),
            'a' => value.push('\x07'),
            'b' => value.push('\x08'),
            'f' => value.push('\x0c'),
            'v' => value.push('\x0b'),
            '\\' | '\'' | '"' => value.push(c),
            'x' | 'u' | 'U' => {
                let len = match c {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut code = 0u32;
                for _ in 0..len {
                    let digit = self
                        .bump()
                        .and_then(|d| d.to_digit(16))
                        .ok_or_else(|| self.error(ErrorCode::BAD_CHARACTER, format!("truncated \\{c} escape"), start))?;
                    code = code * 16 + digit;
                }
                let ch = char::from_u32(code)
                    .ok_or_else(|| self.error(ErrorCode::BAD_CHARACTER, "invalid character escape", start))?;
                value.push(ch);
            }
            other => {
                value.push('\\');
                value.push(other);
            }
        }
        Ok(())
    }
}
