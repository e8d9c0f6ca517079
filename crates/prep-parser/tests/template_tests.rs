//! Template parser tests.
//!
//! Covers:
//! 1. Literal text, expression tags and escapes
//! 2. Nesting of if/elif/else, loops, try, with, match
//! 3. Directive ordering and context errors
//! 4. `script`/`eval` blocks and callable signatures
//! 5. Position fidelity of nodes and delegated headers

use pretty_assertions::assert_eq;
use prep_lexer::LexOptions;
use prep_parser::parse_template;
use prep_types::ast::{ExprKind, StmtKind, Target};
use prep_types::tree::*;
use prep_types::{ErrorCode, PrepError, SourceFile, Span};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn parse(source: &str) -> Result<Template, PrepError> {
    let sf = SourceFile::new("test.prep", source);
    parse_template(&sf, LexOptions::default())
}

fn parse_ok(source: &str) -> Template {
    parse(source).unwrap_or_else(|e| panic!("unexpected error:\n{e}"))
}

fn parse_err(source: &str) -> PrepError {
    parse(source).expect_err("expected an error")
}

fn body(source: &str) -> Vec<NodeKind> {
    parse_ok(source).body.into_iter().map(|n| n.kind).collect()
}

fn literal(text: &str) -> NodeKind {
    NodeKind::Literal(text.into())
}

/// Byte offset of the first occurrence of `needle` in `source`.
fn offset_of(source: &str, needle: &str) -> usize {
    source.find(needle).unwrap_or_else(|| panic!("{needle:?} not in source"))
}

/// Line and column of a byte offset.
fn position(source: &str, offset: usize) -> (u32, u32) {
    SourceFile::new("t", source).position(offset)
}

/// Byte offset of the start of a span.
fn offset_at(source: &str, span: Span) -> usize {
    let line_start: usize = source
        .split_inclusive('\n')
        .take(span.start_line as usize - 1)
        .map(str::len)
        .sum();
    let column: usize = source[line_start..]
        .chars()
        .take(span.start_col as usize - 1)
        .map(char::len_utf8)
        .sum();
    line_start + column
}

// ─────────────────────────────────────────────────────────────────────
// Text and expressions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_literal_and_expression() {
    let nodes = body("Hello {{2+2}} World");
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[0], literal("Hello "));
    assert!(matches!(&nodes[1], NodeKind::Write(e) if matches!(e.kind, ExprKind::Binary { .. })));
    assert_eq!(nodes[2], literal(" World"));
}

#[test]
fn test_whitespace_around_tags_is_literal() {
    let nodes = body("  \t \r{{2+3}}\n ");
    assert_eq!(nodes[0], literal("  \t \r"));
    assert_eq!(nodes[2], literal("\n "));
}

#[test]
fn test_escapes_are_applied_to_literals_and_expressions() {
    let nodes = body("a {${b}$} $$ {{'x$$'}}");
    assert_eq!(nodes[0], literal("a {{b}} $ "));
    assert!(matches!(&nodes[1], NodeKind::Write(e) if e.kind == ExprKind::Str("x$".into())));
}

#[test]
fn test_unbalanced_close_is_literal() {
    assert_eq!(body("i}}"), vec![literal("i}}")]);
}

#[test]
fn test_whitespace_directives() {
    let nodes = body("{{.dnl}}\n  a{{ .dws }}  b");
    assert_eq!(nodes[0], NodeKind::Whitespace(WsDirective::Dnl));
    assert_eq!(nodes[2], NodeKind::Whitespace(WsDirective::Dws));
}

#[test]
fn test_bad_expression_reports_script_error() {
    let err = parse_err("x {{1 +}} y");
    assert_eq!(err.code, ErrorCode::INVALID_SYNTAX);
    assert_eq!(err.span.start_line, 1);
}

#[test]
fn test_backslash_continuation_in_expression() {
    let nodes = body("{{1 + \\\n 5}}");
    assert!(matches!(&nodes[0], NodeKind::Write(_)));
}

#[test]
fn test_illegal_continuation_in_expression() {
    let err = parse_err("{{1 + \\ 5}}");
    assert_eq!(err.code, ErrorCode::BAD_CHARACTER);
}

// ─────────────────────────────────────────────────────────────────────
// Conditionals
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_if_elif_else_chain() {
    let nodes = body("{{if sex=='m'}}guy{{elif sex=='f'}}gal{{else}}neuter{{endif}}");
    let NodeKind::If { branches, orelse } = &nodes[0] else {
        panic!("expected if, got {:?}", nodes[0]);
    };
    assert_eq!(branches.len(), 2);
    assert_eq!(branches[1].body[0].kind, literal("gal"));
    assert_eq!(orelse.as_ref().map(|b| b[0].kind.clone()), Some(literal("neuter")));
}

#[test]
fn test_optional_colon_in_headers() {
    for source in ["{{if x}}a{{endif}}", "{{if x:}}a{{endif}}"] {
        let nodes = body(source);
        let NodeKind::If { branches, .. } = &nodes[0] else {
            panic!("expected if in {source:?}");
        };
        assert_eq!(branches[0].test.kind, ExprKind::Name("x".into()));
    }
    for source in ["{{for i in xs}}a{{endfor}}", "{{for i in xs:}}a{{endfor}}"] {
        assert!(matches!(&body(source)[0], NodeKind::For { .. }));
    }
}

#[test]
fn test_trailing_colon_on_end_keywords() {
    let nodes = body("{{if 1}}a{{else:}}b{{endif:}}");
    assert!(matches!(&nodes[0], NodeKind::If { orelse: Some(_), .. }));
}

#[test]
fn test_empty_body_becomes_pass() {
    let nodes = body("{{if 1:}}{{endif}}");
    let NodeKind::If { branches, .. } = &nodes[0] else {
        panic!("expected if");
    };
    assert_eq!(branches[0].body.len(), 1);
    assert_eq!(branches[0].body[0].kind, NodeKind::Pass);
}

#[test]
fn test_unclosed_if() {
    let err = parse_err("x\n{{if a}}b");
    assert_eq!(err.code, ErrorCode::MISSING_END);
    assert_eq!((err.span.start_line, err.span.start_col), (2, 3));
    assert!(err.message.contains("'if' directive is never closed"));
}

#[test]
fn test_stray_end_directive() {
    let err = parse_err("a{{endif}}");
    assert_eq!(err.code, ErrorCode::UNEXPECTED_DIRECTIVE);
    assert!(err.message.contains("'endif'"));
}

#[test]
fn test_else_after_else() {
    let err = parse_err("{{if a}}1{{else}}2{{else}}3{{endif}}");
    assert_eq!(err.code, ErrorCode::UNEXPECTED_DIRECTIVE);
}

// ─────────────────────────────────────────────────────────────────────
// Loops
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_for_with_else() {
    let nodes = body("{{for i in ()}}X{{else}}Y{{endfor}}");
    let NodeKind::For { target, body, orelse, .. } = &nodes[0] else {
        panic!("expected for");
    };
    assert_eq!(target, &Target::Name("i".into()));
    assert_eq!(body[0].kind, literal("X"));
    assert_eq!(orelse.as_ref().map(|b| b[0].kind.clone()), Some(literal("Y")));
}

#[test]
fn test_for_tuple_target() {
    let nodes = body("{{for k, v in d.items()}}{{k}}{{endfor}}");
    let NodeKind::For { target, .. } = &nodes[0] else {
        panic!("expected for");
    };
    assert!(matches!(target, Target::Sequence(items) if items.len() == 2));
}

#[test]
fn test_while_with_break() {
    let nodes = body("{{while x}}{{if y}}{{break}}{{endif}}{{continue}}{{endwhile}}");
    assert!(matches!(&nodes[0], NodeKind::While { orelse: None, .. }));
}

#[test]
fn test_break_outside_loop() {
    let err = parse_err("{{break}}");
    assert_eq!(err.code, ErrorCode::OUTSIDE_LOOP);
}

#[test]
fn test_break_in_loop_else_is_outside_loop() {
    let err = parse_err("{{for i in x}}a{{else}}{{break}}{{endfor}}");
    assert_eq!(err.code, ErrorCode::OUTSIDE_LOOP);
}

#[test]
fn test_break_must_be_exact() {
    let err = parse_err("{{for i in x}}{{break now}}{{endfor}}");
    assert!(err.message.contains("invalid break statement"));
}

#[test]
fn test_script_break_inside_template_loop() {
    let nodes = body("{{for i in x}}{{script}}if i > 2: break{{endscript}}{{endfor}}");
    assert!(matches!(&nodes[0], NodeKind::For { .. }));
}

// ─────────────────────────────────────────────────────────────────────
// Exceptions and scoped blocks
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_try_except_else_finally() {
    let source = "{{try}}a{{except KeyError as e}}b{{except}}c{{else}}d{{finally}}e{{endtry}}";
    let nodes = body(source);
    let NodeKind::Try { handlers, orelse, finalbody, .. } = &nodes[0] else {
        panic!("expected try");
    };
    assert_eq!(handlers.len(), 2);
    assert_eq!(handlers[0].name.as_deref(), Some("e"));
    assert!(handlers[1].kind.is_none());
    assert!(orelse.is_some());
    assert!(finalbody.is_some());
}

#[test]
fn test_try_finally_only() {
    let nodes = body("{{try:}}a{{finally}}b{{endtry}}");
    assert!(matches!(&nodes[0], NodeKind::Try { handlers, finalbody: Some(_), .. } if handlers.is_empty()));
}

#[test]
fn test_try_needs_a_handler() {
    let err = parse_err("{{try}}a{{endtry}}");
    assert_eq!(err.code, ErrorCode::UNEXPECTED_DIRECTIVE);
}

#[test]
fn test_except_after_bare_except() {
    let err = parse_err("{{try}}a{{except}}b{{except ValueError}}c{{endtry}}");
    assert_eq!(err.code, ErrorCode::UNEXPECTED_DIRECTIVE);
}

#[test]
fn test_else_before_except() {
    let err = parse_err("{{try}}a{{else}}b{{endtry}}");
    assert_eq!(err.code, ErrorCode::UNEXPECTED_DIRECTIVE);
}

#[test]
fn test_invalid_try_header() {
    let err = parse_err("{{try now}}a{{finally}}b{{endtry}}");
    assert!(err.message.contains("invalid try statement"));
}

#[test]
fn test_with_block() {
    let nodes = body("{{with open(p) as f}}{{f.read()}}{{endwith}}");
    assert!(matches!(&nodes[0], NodeKind::With { items, .. } if items.len() == 1));
}

#[test]
fn test_raw_statements() {
    let nodes = body("{{import math}}{{from math import floor}}{{assert x, 'm'}}{{raise ValueError('v')}}");
    assert_eq!(nodes.len(), 4);
    for node in &nodes {
        assert!(matches!(node, NodeKind::Raw(stmts) if stmts.len() == 1));
    }
}

#[test]
fn test_raw_statement_grammar_error() {
    let err = parse_err("line one\n  {{import 1}}");
    assert_eq!(err.code, ErrorCode::INVALID_SYNTAX);
    assert_eq!(err.span.start_line, 2);
}

// ─────────────────────────────────────────────────────────────────────
// Script and eval blocks
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_script_block() {
    let nodes = body("{{script}}l = [1, 2]{{endscript}}{{l.pop()}}");
    assert!(matches!(&nodes[0], NodeKind::Raw(stmts) if stmts.len() == 1));
    assert!(matches!(&nodes[1], NodeKind::Write(_)));
}

#[test]
fn test_indented_script_with_comments() {
    let source = "{{script}}\n    # set things up\n    x = 1\n\n    # more\n    if x:\n        y = 2\n    {{endscript}}";
    let nodes = body(source);
    let NodeKind::Raw(stmts) = &nodes[0] else {
        panic!("expected raw");
    };
    assert_eq!(stmts.len(), 2);
    // `x = 1` sits on line 3 at column 5 of the template.
    assert_eq!((stmts[0].span.start_line, stmts[0].span.start_col), (3, 5));
    assert_eq!((stmts[1].span.start_line, stmts[1].span.start_col), (6, 5));
}

#[test]
fn test_inconsistent_script_indent() {
    let err = parse_err("{{script}}\n    x = 1\n  y = 2\n{{endscript}}");
    assert_eq!(err.code, ErrorCode::INCONSISTENT_INDENT);
}

#[test]
fn test_empty_script_and_eval() {
    assert_eq!(body("{{script}}{{endscript}}{{eval}}{{endeval}}"), vec![]);
    assert_eq!(body("{{script}}\n   \n{{endscript}}"), vec![]);
}

#[test]
fn test_unterminated_script() {
    let err = parse_err("{{script}}x = 1");
    assert_eq!(err.code, ErrorCode::MISSING_END);
    assert!(err.message.contains("'endscript' expected"));
}

#[test]
fn test_eval_block_writes_expression() {
    let nodes = body("{{eval}}\n  1 + 2\n{{endeval}}");
    assert!(matches!(&nodes[0], NodeKind::Write(e) if matches!(e.kind, ExprKind::Binary { .. })));
}

// ─────────────────────────────────────────────────────────────────────
// Callable templates and sub-blocks
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_signature() {
    let template = parse_ok("{{def(a, b=2, *args, **kw)}}Hello {{a}}");
    let signature = template.signature.expect("signature");
    assert_eq!(signature.params.names(), vec!["a", "b", "args", "kw"]);
    assert_eq!(template.body.len(), 2);
}

#[test]
fn test_empty_signature() {
    let template = parse_ok("{{def()}}Hello World");
    assert!(template.is_callable());
    assert!(template.signature.unwrap().params.names().is_empty());
}

#[test]
fn test_text_before_signature_is_kept() {
    let template = parse_ok("\n{{def(a)}}x");
    assert_eq!(template.body[0].kind, literal("\n"));
}

#[test]
fn test_second_def_is_rejected() {
    let err = parse_err("{{def(a)}}{{def(b)}}");
    assert_eq!(err.code, ErrorCode::DUPLICATE_DEF);
}

#[test]
fn test_return_needs_callable_or_subblock() {
    assert_eq!(parse_err("{{return}}").code, ErrorCode::OUTSIDE_FUNCTION);
    assert!(parse("{{def()}}a{{return}}").is_ok());
    assert!(parse("{{def row(x)}}{{if x}}{{return}}{{endif}}{{enddef}}").is_ok());
}

#[test]
fn test_subblock_resets_loop_context() {
    let err = parse_err("{{for i in x}}{{def f()}}{{break}}{{enddef}}{{endfor}}");
    assert_eq!(err.code, ErrorCode::OUTSIDE_LOOP);
}

#[test]
fn test_subblock() {
    let nodes = body("{{def row(cells, sep=', ')}}{{sep.join(cells)}}{{enddef}}");
    let NodeKind::Subblock { name, params, body } = &nodes[0] else {
        panic!("expected sub-block");
    };
    assert_eq!(name, "row");
    assert_eq!(params.names(), vec!["cells", "sep"]);
    assert_eq!(body.len(), 1);
}

// ─────────────────────────────────────────────────────────────────────
// Pattern matching
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_match_cases() {
    let source = "{{match x}}\n  {{case 1}}one{{case [a, b] if a}}pair{{case _}}other{{endmatch}}";
    let nodes = body(source);
    let NodeKind::Match { cases, .. } = &nodes[0] else {
        panic!("expected match");
    };
    assert_eq!(cases.len(), 3);
    assert!(cases[1].guard.is_some());
    assert_eq!(cases[2].body[0].kind, literal("other"));
}

#[test]
fn test_text_before_first_case() {
    let err = parse_err("{{match x}} oops {{case 1}}a{{endmatch}}");
    assert_eq!(err.code, ErrorCode::BAD_MATCH);
    assert!(err.message.contains("in start of match"));
}

#[test]
fn test_case_outside_match() {
    let err = parse_err("{{case 1}}a");
    assert_eq!(err.code, ErrorCode::UNEXPECTED_DIRECTIVE);
}

#[test]
fn test_match_disabled() {
    let sf = SourceFile::new("test.prep", "{{match x}}{{case 1}}a{{endmatch}}");
    let err = parse_template(&sf, LexOptions { pattern_matching: false }).unwrap_err();
    assert_eq!(err.code, ErrorCode::INVALID_SYNTAX);
}

// ─────────────────────────────────────────────────────────────────────
// Position fidelity
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_header_expression_positions_are_absolute() {
    let source = "line one\n  {{if alpha}}\n    {{for x in beta}}{{gamma}}{{endfor}}\n{{endif}}";
    let template = parse_ok(source);
    let NodeKind::If { branches, .. } = &template.body[1].kind else {
        panic!("expected if");
    };
    let test = &branches[0].test;
    assert_eq!((test.span.start_line, test.span.start_col), position(source, offset_of(source, "alpha")));

    let NodeKind::For { iter, body, .. } = &branches[0].body[1].kind else {
        panic!("expected for, got {:?}", branches[0].body);
    };
    assert_eq!((iter.span.start_line, iter.span.start_col), position(source, offset_of(source, "beta")));
    let NodeKind::Write(gamma) = &body[0].kind else {
        panic!("expected write");
    };
    assert_eq!((gamma.span.start_line, gamma.span.start_col), position(source, offset_of(source, "gamma")));
}

#[test]
fn test_every_node_points_at_its_source_text() {
    let source = "\
{{def(items)}}
<ul>
{{for item in items}}
  {{if item.done}}
    <li class=\"done\">{{item.name}}</li>
  {{else}}
    <li>{{item.name}}</li>
  {{endif}}
{{endfor}}
</ul>
{{try}}{{items[0]}}{{except IndexError}}none{{endtry}}";
    let template = parse_ok(source);
    let mut previous = (0, 0);
    let mut checked = 0;
    walk(&template.body, &mut |node| {
        let start = (node.span.start_line, node.span.start_col);
        assert!(start >= previous, "{:?} starts before {previous:?}", node.kind);
        previous = start;
        match &node.kind {
            NodeKind::Literal(text) => {
                let at = offset_at(source, node.span);
                assert!(source[at..].starts_with(text.as_str()), "{text:?} at {:?}", node.span);
            }
            NodeKind::Write(expr) => {
                assert_eq!((expr.span.start_line, expr.span.start_col), start);
            }
            _ => {}
        }
        checked += 1;
    });
    assert!(checked > 10);
}

#[test]
fn test_nested_error_position_does_not_drift() {
    let source = "{{for a in x}}\n  {{for b in y}}\n    {{if b ===}}{{endif}}\n  {{endfor}}\n{{endfor}}";
    let err = parse_err(source);
    assert_eq!(err.span.start_line, 3);
    assert!(err.span.start_col >= 10 && err.span.start_col <= 15, "{:?}", err.span);
}

#[test]
fn test_script_statement_positions_on_first_line() {
    let source = "ab{{script}}x = 1; y = 2{{endscript}}";
    let nodes = parse_ok(source).body;
    let NodeKind::Raw(stmts) = &nodes[1].kind else {
        panic!("expected raw");
    };
    let y = offset_of(source, "y =");
    assert_eq!((stmts[1].span.start_line, stmts[1].span.start_col), position(source, y));
    assert!(matches!(stmts[1].kind, StmtKind::Assign { .. }));
}
