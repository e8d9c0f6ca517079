//! Template parser: rebuilds nested control flow from the flat tag stream.
//!
//! Every directive kind maps to one handler in a fixed table. A handler
//! consumes its opening tag, delegates the directive's header text to the
//! script parser, then collects the body with [`TemplateParser::parse_body`]
//! until one of its follower tags. Header fragments are parsed with an
//! origin taken straight from the template, so positions never accumulate
//! offsets from enclosing directives.

use prep_lexer::template::{unescape, LexOptions, Tag, TagKind, TemplateLexer};
use prep_lexer::token::TokenKind;
use prep_types::ast::{Stmt, StmtKind};
use prep_types::tree::*;
use prep_types::{ErrorCode, Origin, PrepError, SourceFile, Span};

use crate::parser::{self, Context, Fragment, Parser};

/// Handler for one directive kind. The opening tag has already been
/// consumed.
type Handler<'src> = fn(&mut TemplateParser<'src>, Tag) -> prep_types::Result<Vec<Node>>;

/// A candidate reading of an expression tag's text.
type Grammar<'src> = fn(&TemplateParser<'src>, &str, Tag) -> prep_types::Result<NodeKind>;

/// Parse a whole template.
pub fn parse_template(source_file: &SourceFile, options: LexOptions) -> prep_types::Result<Template> {
    TemplateParser::new(source_file, options)?.parse()
}

/// The template parser.
pub struct TemplateParser<'src> {
    source_file: &'src SourceFile,
    tags: Vec<Tag>,
    pos: usize,
    /// Enclosing template loops in the current function.
    loop_depth: u32,
    /// Enclosing `def name(...)` sub-blocks.
    tdef_depth: u32,
    signature: Option<Signature>,
    pattern_matching: bool,
}

impl<'src> TemplateParser<'src> {
    /// Lex `source_file` and prepare to parse it.
    pub fn new(source_file: &'src SourceFile, options: LexOptions) -> prep_types::Result<Self> {
        let tags = TemplateLexer::new(source_file, options).lex()?;
        Ok(Self {
            source_file,
            tags,
            pos: 0,
            loop_depth: 0,
            tdef_depth: 0,
            signature: None,
            pattern_matching: options.pattern_matching,
        })
    }

    /// Parse the template into a statement tree.
    pub fn parse(mut self) -> prep_types::Result<Template> {
        let (body, _) = self.parse_body(&[TagKind::Eof], None, true, false)?;
        Ok(Template {
            signature: self.signature,
            body,
        })
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    fn handler(kind: TagKind) -> Handler<'src> {
        match kind {
            TagKind::Const => Self::parse_const,
            TagKind::Expr => Self::parse_expr,
            TagKind::If => Self::parse_if,
            TagKind::While => Self::parse_while,
            TagKind::For => Self::parse_for,
            TagKind::Try => Self::parse_try,
            TagKind::With => Self::parse_with,
            TagKind::Import | TagKind::From | TagKind::Assert | TagKind::Raise => Self::parse_raw,
            TagKind::Return => Self::parse_return,
            TagKind::Break | TagKind::Continue => Self::parse_loop_control,
            TagKind::Script => Self::parse_script,
            TagKind::Eval => Self::parse_eval,
            TagKind::Def => Self::parse_signature,
            TagKind::Tdef => Self::parse_tdef,
            TagKind::Match => Self::parse_match,
            TagKind::Elif
            | TagKind::Else
            | TagKind::Except
            | TagKind::Finally
            | TagKind::Case
            | TagKind::EndIf
            | TagKind::EndFor
            | TagKind::EndWhile
            | TagKind::EndTry
            | TagKind::EndWith
            | TagKind::EndScript
            | TagKind::EndEval
            | TagKind::EndDef
            | TagKind::EndMatch
            | TagKind::Eof => Self::unexpected_directive,
        }
    }

    /// Collect nodes until a tag in `followers`.
    ///
    /// Returns the body and the follower that ended it. The follower is
    /// consumed when `pop` is set. With `fix_empty`, an empty body becomes a
    /// single [`NodeKind::Pass`].
    fn parse_body(
        &mut self,
        followers: &[TagKind],
        opener: Option<Tag>,
        pop: bool,
        fix_empty: bool,
    ) -> prep_types::Result<(Vec<Node>, Tag)> {
        let mut body = Vec::new();
        loop {
            let tag = self.peek_tag();
            if followers.contains(&tag.kind) {
                if pop {
                    self.pos += 1;
                }
                if body.is_empty() && fix_empty {
                    body.push(Node::pass(tag.span(self.source_file)));
                }
                return Ok((body, tag));
            }
            if tag.kind == TagKind::Eof {
                return Err(self.missing_end(opener, followers));
            }
            self.pos += 1;
            let handler = Self::handler(tag.kind);
            body.extend(handler(self, tag)?);
        }
    }

    // ── Tag helpers ───────────────────────────────────────────────────────────

    fn peek_tag(&self) -> Tag {
        let last = self.tags.len().saturating_sub(1);
        self.tags[self.pos.min(last)]
    }

    fn next_tag(&mut self) -> Tag {
        let tag = self.peek_tag();
        if self.pos < self.tags.len() {
            self.pos += 1;
        }
        tag
    }

    /// The stripped, unescaped text of a directive.
    fn directive_text(&self, tag: Tag) -> String {
        unescape(tag.text(&self.source_file.source).trim())
    }

    fn span_between(&self, open: Tag, close: Tag) -> Span {
        self.source_file.span(open.start, close.end)
    }

    fn script_context(&self) -> Context {
        Context {
            in_loop: self.loop_depth > 0,
            in_function: self.signature.is_some() || self.tdef_depth > 0,
            pattern_matching: self.pattern_matching,
        }
    }

    /// Run a script-parser entry point over a directive's text.
    fn header<T>(&self, tag: Tag, parse: impl FnOnce(Parser<'_>) -> prep_types::Result<T>) -> prep_types::Result<T> {
        let text = self.directive_text(tag);
        let fragment = Fragment {
            source_file: self.source_file,
            text: &text,
            origin: self.source_file.origin(tag.start),
        };
        parse(Parser::for_fragment(fragment, self.script_context())?)
    }

    fn error(&self, code: ErrorCode, message: impl Into<String>, tag: Tag) -> PrepError {
        PrepError::at_offset(self.source_file, code, message, tag.start)
    }

    fn missing_end(&self, opener: Option<Tag>, followers: &[TagKind]) -> PrepError {
        let expected = followers
            .iter()
            .map(|k| format!("'{k}'"))
            .collect::<Vec<_>>()
            .join(" or ");
        match opener {
            Some(tag) => self.error(
                ErrorCode::MISSING_END,
                format!("'{}' directive is never closed: expected {expected}", tag.kind),
                tag,
            ),
            None => self.error(
                ErrorCode::MISSING_END,
                format!("unexpected end of template: expected {expected}"),
                self.peek_tag(),
            ),
        }
    }

    // ── Text and expressions ──────────────────────────────────────────────────

    fn parse_const(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        let text = unescape(tag.text(&self.source_file.source));
        Ok(vec![Node::new(NodeKind::Literal(text), tag.span(self.source_file))])
    }

    /// An expression tag. The readings are tried in order; if none fits,
    /// the first reading's error is reported.
    fn parse_expr(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        let text = self.directive_text(tag);
        let grammars: [Grammar<'src>; 2] = [Self::script_expression, Self::whitespace_directive];
        let mut first_error = None;
        for grammar in grammars {
            match grammar(self, &text, tag) {
                Ok(kind) => return Ok(vec![Node::new(kind, tag.span(self.source_file))]),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        Err(first_error.unwrap_or_else(|| self.error(ErrorCode::INVALID_SYNTAX, "bad expression", tag)))
    }

    fn script_expression(&self, text: &str, tag: Tag) -> prep_types::Result<NodeKind> {
        let fragment = Fragment {
            source_file: self.source_file,
            text,
            origin: self.source_file.origin(tag.start),
        };
        parser::parse_expression(fragment).map(NodeKind::Write)
    }

    fn whitespace_directive(&self, text: &str, tag: Tag) -> prep_types::Result<NodeKind> {
        match text {
            ".dnl" => Ok(NodeKind::Whitespace(WsDirective::Dnl)),
            ".dws" => Ok(NodeKind::Whitespace(WsDirective::Dws)),
            _ => Err(self.error(ErrorCode::INVALID_SYNTAX, "bad expression", tag)),
        }
    }

    // ── Conditionals ──────────────────────────────────────────────────────────

    fn parse_if(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        let mut branches = Vec::new();
        let mut orelse = None;
        let mut opener = tag;
        let close = loop {
            let keyword = if opener.kind == TagKind::Elif {
                TokenKind::Elif
            } else {
                TokenKind::If
            };
            let test = self.header(opener, |p| p.condition_header(keyword))?;
            let (body, end) = self.parse_body(
                &[TagKind::EndIf, TagKind::Elif, TagKind::Else],
                Some(opener),
                true,
                true,
            )?;
            branches.push(Branch {
                test,
                body,
                span: self.span_between(opener, end),
            });
            match end.kind {
                TagKind::Elif => opener = end,
                TagKind::Else => {
                    let (body, close) = self.parse_body(&[TagKind::EndIf], Some(end), true, true)?;
                    orelse = Some(body);
                    break close;
                }
                _ => break end,
            }
        };
        Ok(vec![Node::new(
            NodeKind::If { branches, orelse },
            self.span_between(tag, close),
        )])
    }

    // ── Loops ─────────────────────────────────────────────────────────────────

    /// A loop body, then an optional `else` body outside the loop.
    fn parse_loop_bodies(
        &mut self,
        tag: Tag,
        end: TagKind,
    ) -> prep_types::Result<(Vec<Node>, Option<Vec<Node>>, Tag)> {
        self.loop_depth += 1;
        let (body, stop) = self.parse_body(&[end, TagKind::Else], Some(tag), true, true)?;
        self.loop_depth -= 1;
        if stop.kind != TagKind::Else {
            return Ok((body, None, stop));
        }
        let (orelse, close) = self.parse_body(&[end], Some(stop), true, true)?;
        Ok((body, Some(orelse), close))
    }

    fn parse_while(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        let test = self.header(tag, |p| p.condition_header(TokenKind::While))?;
        let (body, orelse, close) = self.parse_loop_bodies(tag, TagKind::EndWhile)?;
        Ok(vec![Node::new(
            NodeKind::While { test, body, orelse },
            self.span_between(tag, close),
        )])
    }

    fn parse_for(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        let (target, iter) = self.header(tag, |p| p.for_header())?;
        let (body, orelse, close) = self.parse_loop_bodies(tag, TagKind::EndFor)?;
        Ok(vec![Node::new(
            NodeKind::For {
                target,
                iter,
                body,
                orelse,
            },
            self.span_between(tag, close),
        )])
    }

    /// `break` / `continue`: the directive text must be exactly the keyword.
    fn parse_loop_control(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        let keyword = tag.kind.as_str();
        if self.directive_text(tag) != keyword {
            return Err(self.error(
                ErrorCode::INVALID_SYNTAX,
                format!("invalid {keyword} statement"),
                tag,
            ));
        }
        if self.loop_depth == 0 {
            return Err(self.error(
                ErrorCode::OUTSIDE_LOOP,
                format!("'{keyword}' outside loop"),
                tag,
            ));
        }
        let span = tag.span(self.source_file);
        let stmt = if tag.kind == TagKind::Break {
            StmtKind::Break
        } else {
            StmtKind::Continue
        };
        Ok(vec![Node::new(
            NodeKind::Raw(vec![Stmt::new(stmt, span)]),
            span,
        )])
    }

    // ── Exceptions ────────────────────────────────────────────────────────────

    fn parse_try(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        let text = self.directive_text(tag);
        if text.strip_suffix(':').unwrap_or(text.as_str()) != "try" {
            return Err(self.error(ErrorCode::INVALID_SYNTAX, "invalid try statement", tag));
        }
        let (body, _) = self.parse_body(&[TagKind::Except, TagKind::Finally], Some(tag), false, true)?;
        let mut handlers = Vec::new();
        let mut orelse = None;
        let mut finalbody = None;
        let close = loop {
            let clause = self.next_tag();
            match clause.kind {
                TagKind::EndTry => break clause,
                TagKind::Finally => {
                    let (body, close) = self.parse_body(&[TagKind::EndTry], Some(clause), true, true)?;
                    finalbody = Some(body);
                    break close;
                }
                TagKind::Else => {
                    let (body, _) = self.parse_body(
                        &[TagKind::Finally, TagKind::EndTry],
                        Some(clause),
                        false,
                        true,
                    )?;
                    orelse = Some(body);
                }
                TagKind::Except => {
                    let (kind, name) = self.header(clause, |p| p.except_header())?;
                    // A bare `except` must be the last handler.
                    let followers: &[TagKind] = if kind.is_none() {
                        &[TagKind::Finally, TagKind::Else, TagKind::EndTry]
                    } else {
                        &[TagKind::Except, TagKind::Finally, TagKind::EndTry, TagKind::Else]
                    };
                    let (body, end) = self.parse_body(followers, Some(clause), false, true)?;
                    handlers.push(ExceptClause {
                        kind,
                        name,
                        body,
                        span: self.span_between(clause, end),
                    });
                }
                _ => {
                    return Err(self.error(
                        ErrorCode::INVALID_SYNTAX,
                        "invalid syntax in try statement",
                        clause,
                    ))
                }
            }
        };
        Ok(vec![Node::new(
            NodeKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
            self.span_between(tag, close),
        )])
    }

    // ── Scoped blocks ─────────────────────────────────────────────────────────

    fn parse_with(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        let items = self.header(tag, |p| p.with_header())?;
        let (body, close) = self.parse_body(&[TagKind::EndWith], Some(tag), true, true)?;
        Ok(vec![Node::new(
            NodeKind::With { items, body },
            self.span_between(tag, close),
        )])
    }

    /// `import`, `from`, `assert` and `raise` pass straight through.
    fn parse_raw(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        let stmts = self.header(tag, |p| p.parse_module())?;
        Ok(vec![Node::new(NodeKind::Raw(stmts), tag.span(self.source_file))])
    }

    fn parse_return(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        if !self.script_context().in_function {
            return Err(self.error(
                ErrorCode::OUTSIDE_FUNCTION,
                "'return' outside a callable template or sub-block",
                tag,
            ));
        }
        self.parse_raw(tag)
    }

    /// `{{script}}...{{endscript}}` and `{{eval}}...{{endeval}}`: the text
    /// between the tags, dedented.
    ///
    /// Returns `None` for an empty block.
    fn block_fragment(&mut self, tag: Tag, end: TagKind) -> prep_types::Result<Option<(String, Origin)>> {
        let content = self.next_tag();
        if content.kind == end {
            return Ok(None);
        }
        if content.kind != TagKind::Const {
            return Err(self.error(ErrorCode::MISSING_END, format!("'{end}' expected"), content));
        }
        let close = self.next_tag();
        if close.kind != end {
            let culprit = if close.kind == TagKind::Eof { tag } else { close };
            return Err(self.error(ErrorCode::MISSING_END, format!("'{end}' expected"), culprit));
        }
        let raw = unescape(content.text(&self.source_file.source));
        let (indent, text) = dedent(&raw).map_err(|err| {
            self.error(ErrorCode::INCONSISTENT_INDENT, err.to_string(), content)
        })?;
        if text.is_empty() {
            return Ok(None);
        }
        let origin = self.source_file.origin(content.start).with_indent(indent);
        Ok(Some((text, origin)))
    }

    fn parse_script(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        let Some((text, origin)) = self.block_fragment(tag, TagKind::EndScript)? else {
            return Ok(Vec::new());
        };
        let fragment = Fragment {
            source_file: self.source_file,
            text: &text,
            origin,
        };
        let stmts = parser::parse_script(fragment, self.script_context())?;
        Ok(vec![Node::new(NodeKind::Raw(stmts), tag.span(self.source_file))])
    }

    fn parse_eval(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        let Some((text, origin)) = self.block_fragment(tag, TagKind::EndEval)? else {
            return Ok(Vec::new());
        };
        let fragment = Fragment {
            source_file: self.source_file,
            text: &text,
            origin,
        };
        let expr = parser::parse_expression(fragment)?;
        Ok(vec![Node::new(NodeKind::Write(expr), tag.span(self.source_file))])
    }

    // ── Functions ─────────────────────────────────────────────────────────────

    /// `{{def(params)}}` makes the rest of the template the body of a
    /// callable template. It produces no node.
    fn parse_signature(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        let params = self.header(tag, |p| p.signature())?;
        self.signature = Some(Signature {
            params,
            span: tag.span(self.source_file),
        });
        Ok(Vec::new())
    }

    fn parse_tdef(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        let (name, params) = self.header(tag, |p| p.tdef_header())?;
        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.tdef_depth += 1;
        let (body, close) = self.parse_body(&[TagKind::EndDef], Some(tag), true, true)?;
        self.tdef_depth -= 1;
        self.loop_depth = saved_loops;
        Ok(vec![Node::new(
            NodeKind::Subblock { name, params, body },
            self.span_between(tag, close),
        )])
    }

    // ── Pattern matching ──────────────────────────────────────────────────────

    fn parse_match(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        let subject = self.header(tag, |p| p.match_header())?;

        // Only whitespace may separate `match` from its first `case`.
        while self.peek_tag().kind == TagKind::Const {
            let text = self.next_tag();
            let stray = text.text(&self.source_file.source).trim();
            if !stray.is_empty() {
                return Err(self.error(
                    ErrorCode::BAD_MATCH,
                    format!("unexpected text, {stray:?}, in start of match"),
                    text,
                ));
            }
        }

        let mut cases = Vec::new();
        let close = loop {
            let clause = self.next_tag();
            match clause.kind {
                TagKind::EndMatch => break clause,
                TagKind::Case => {
                    let (pattern, guard) = self.header(clause, |p| p.case_header())?;
                    let (body, end) = self.parse_body(
                        &[TagKind::Case, TagKind::EndMatch],
                        Some(clause),
                        false,
                        true,
                    )?;
                    cases.push(CaseBlock {
                        pattern,
                        guard,
                        body,
                        span: self.span_between(clause, end),
                    });
                }
                TagKind::Eof => return Err(self.missing_end(Some(tag), &[TagKind::EndMatch])),
                _ => {
                    return Err(self.error(
                        ErrorCode::BAD_MATCH,
                        format!("expected 'case' inside match, got '{}'", clause.kind),
                        clause,
                    ))
                }
            }
        };
        if cases.is_empty() {
            return Err(self.error(ErrorCode::BAD_MATCH, "match needs at least one case", tag));
        }
        Ok(vec![Node::new(
            NodeKind::Match { subject, cases },
            self.span_between(tag, close),
        )])
    }

    fn unexpected_directive(&mut self, tag: Tag) -> prep_types::Result<Vec<Node>> {
        Err(self.error(
            ErrorCode::UNEXPECTED_DIRECTIVE,
            format!("unexpected '{}' directive", tag.kind),
            tag,
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Dedent
// ─────────────────────────────────────────────────────────────────────

/// A line of a script block that does not share the first line's indent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndentError {
    pub expected: String,
    pub got: String,
    pub line: String,
}

impl std::fmt::Display for IndentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "inconsistent indent expected {:?} got {:?} in {:?}",
            self.expected, self.got, self.line
        )
    }
}

fn is_blank_or_comment(line: &str) -> bool {
    let stripped = line.trim();
    stripped.is_empty() || stripped.starts_with('#')
}

/// Strip the common indentation of a script block.
///
/// Leading blank and comment lines are dropped and the indent is taken from
/// the first remaining line. Blank and comment lines become empty, and the
/// dropped lines are put back as empty lines, so line numbers are kept.
/// Returns the indent width in characters and the dedented text.
pub fn dedent(text: &str) -> Result<(u32, String), IndentError> {
    let lines: Vec<&str> = text.split('\n').collect();
    let leading = lines.iter().take_while(|l| is_blank_or_comment(l)).count();
    let Some(first) = lines.get(leading) else {
        return Ok((0, String::new()));
    };
    let indent = &first[..first.len() - first.trim_start().len()];

    let mut out: Vec<&str> = vec![""; leading];
    for line in &lines[leading..] {
        if is_blank_or_comment(line) {
            out.push("");
            continue;
        }
        match line.get(..indent.len()) {
            Some(prefix) if prefix == indent => out.push(&line[indent.len()..]),
            _ => {
                let got: String = line.chars().take(indent.chars().count()).collect();
                return Err(IndentError {
                    expected: indent.to_string(),
                    got,
                    line: line.to_string(),
                });
            }
        }
    }
    Ok((indent.chars().count() as u32, out.join("\n")))
}
