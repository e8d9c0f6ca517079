//! Lexer tests.
//!
//! Covers: tag splitting and classification, directive trailing-syntax
//! errors, the one-signature rule, error offsets and snippets, escapes,
//! script indentation, line joining, string/number literals, span rebasing,
//! and determinism.

use pretty_assertions::assert_eq;
use prep_lexer::{LexOptions, Lexer, Tag, TagKind, TemplateLexer, TokenKind};
use prep_types::{ErrorCode, Origin, PrepError, SourceFile, Span};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Lex a template and return its tags.
fn tags(source: &str) -> Vec<Tag> {
    let sf = SourceFile::new("test.prep", source);
    TemplateLexer::new(&sf, LexOptions::default())
        .lex()
        .unwrap_or_else(|e| panic!("unexpected lex error: {e}"))
}

/// Lex a template and return (kind, text) pairs, excluding Eof.
fn tag_texts(source: &str) -> Vec<(TagKind, String)> {
    tags(source)
        .into_iter()
        .filter(|t| t.kind != TagKind::Eof)
        .map(|t| (t.kind, t.text(source).to_string()))
        .collect()
}

/// Lex a template that must fail.
fn tag_error(source: &str) -> PrepError {
    let sf = SourceFile::new("test.prep", source);
    match TemplateLexer::new(&sf, LexOptions::default()).lex() {
        Ok(tags) => panic!("expected a lex error, got {tags:?}"),
        Err(e) => e,
    }
}

/// Tokenize script text and return the token kinds, excluding Eof.
fn script(source: &str) -> Vec<TokenKind> {
    let sf = SourceFile::new("test.prep", source);
    Lexer::new(&sf, source, Origin::START)
        .tokenize()
        .unwrap_or_else(|e| panic!("unexpected lex error: {e}"))
        .into_iter()
        .map(|t| t.kind)
        .filter(|k| *k != TokenKind::Eof)
        .collect()
}

fn script_error(source: &str) -> PrepError {
    let sf = SourceFile::new("test.prep", source);
    match Lexer::new(&sf, source, Origin::START).tokenize() {
        Ok(tokens) => panic!("expected a lex error, got {tokens:?}"),
        Err(e) => e,
    }
}

fn name(s: &str) -> TokenKind {
    TokenKind::Name(s.into())
}

// ─────────────────────────────────────────────────────────────────────
// Tag splitting
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_plain_text_is_one_const() {
    assert_eq!(tag_texts("Hello World"), vec![(TagKind::Const, "Hello World".into())]);
}

#[test]
fn test_expression_between_text() {
    assert_eq!(
        tag_texts("Hello {{2+2}} World"),
        vec![
            (TagKind::Const, "Hello ".into()),
            (TagKind::Expr, "2+2".into()),
            (TagKind::Const, " World".into()),
        ]
    );
}

#[test]
fn test_leading_whitespace_inside_tag_is_skipped() {
    assert_eq!(tag_texts("{{   x }}"), vec![(TagKind::Expr, "x ".into())]);
}

#[test]
fn test_empty_tag_is_dropped() {
    assert_eq!(
        tag_texts("a{{ }}b"),
        vec![(TagKind::Const, "a".into()), (TagKind::Const, "b".into())]
    );
}

#[test]
fn test_stray_closing_delimiter_is_text() {
    assert_eq!(tag_texts("i}}"), vec![(TagKind::Const, "i}}".into())]);
}

#[test]
fn test_eof_always_last() {
    let t = tags("");
    assert_eq!(t, vec![Tag::new(TagKind::Eof, 0, 0)]);
    let t = tags("x{{y}}");
    assert_eq!(t.last().map(|t| t.kind), Some(TagKind::Eof));
    assert_eq!(t.last().map(|t| t.start), Some(6));
}

#[test]
fn test_escaped_delimiters_stay_in_literal() {
    assert_eq!(
        tag_texts("{${not a tag}$} $$"),
        vec![(TagKind::Const, "{${not a tag}$} $$".into())]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Classification
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_control_keywords() {
    let src = "{{if x}}{{elif y:}}{{else}}{{endif}}{{for i in xs}}{{endfor}}{{while 1}}{{endwhile}}";
    let kinds: Vec<TagKind> = tag_texts(src).into_iter().map(|(k, _)| k).collect();
    assert_eq!(
        kinds,
        vec![
            TagKind::If,
            TagKind::Elif,
            TagKind::Else,
            TagKind::EndIf,
            TagKind::For,
            TagKind::EndFor,
            TagKind::While,
            TagKind::EndWhile,
        ]
    );
}

#[test]
fn test_bare_keywords_need_no_trailing_space() {
    let src = "{{try}}{{except}}{{raise}}{{return}}{{break}}{{continue}}";
    let kinds: Vec<TagKind> = tag_texts(src).into_iter().map(|(k, _)| k).collect();
    assert_eq!(
        kinds,
        vec![
            TagKind::Try,
            TagKind::Except,
            TagKind::Raise,
            TagKind::Return,
            TagKind::Break,
            TagKind::Continue,
        ]
    );
}

#[test]
fn test_end_keywords_accept_trailing_colon() {
    let kinds: Vec<TagKind> = tag_texts("{{else:}}{{endif :}}{{finally:}}")
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(kinds, vec![TagKind::Else, TagKind::EndIf, TagKind::Finally]);
}

#[test]
fn test_def_and_tdef() {
    assert_eq!(
        tag_texts("{{def(a, b=1)}}{{def row(x)}}{{enddef}}"),
        vec![
            (TagKind::Def, "def(a, b=1)".into()),
            (TagKind::Tdef, "def row(x)".into()),
            (TagKind::EndDef, "enddef".into()),
        ]
    );
}

#[test]
fn test_script_and_eval() {
    assert_eq!(
        tag_texts("{{script}}x = 1{{endscript}}{{eval}}x{{endeval}}"),
        vec![
            (TagKind::Script, "script".into()),
            (TagKind::Const, "x = 1".into()),
            (TagKind::EndScript, "endscript".into()),
            (TagKind::Eval, "eval".into()),
            (TagKind::Const, "x".into()),
            (TagKind::EndEval, "endeval".into()),
        ]
    );
}

#[test]
fn test_match_and_case() {
    let kinds: Vec<TagKind> = tag_texts("{{match x}}{{case 1}}{{endmatch}}")
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(kinds, vec![TagKind::Match, TagKind::Case, TagKind::EndMatch]);
}

#[test]
fn test_whitespace_directives_are_expressions() {
    let kinds: Vec<TagKind> = tag_texts("{{.dnl}}{{.dws}}").into_iter().map(|(k, _)| k).collect();
    assert_eq!(kinds, vec![TagKind::Expr, TagKind::Expr]);
}

// ─────────────────────────────────────────────────────────────────────
// Lex errors
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_unexpected_open_inside_tag() {
    let err = tag_error("ab {{x {{y}}");
    assert_eq!(err.code, ErrorCode::UNEXPECTED_OPEN);
    assert_eq!(err.offset, Some(7));
    assert_eq!(err.snippet(), "ab {{x {{y}}\n       ^");
}

#[test]
fn test_unterminated_tag() {
    let err = tag_error("line one\n{{script}}i=1{{endscript}}{{i}");
    assert_eq!(err.code, ErrorCode::UNTERMINATED_TAG);
    assert_eq!(err.span.start_line, 2);
    assert_eq!(err.source_line, "{{script}}i=1{{endscript}}{{i}");
}

#[test]
fn test_keyword_without_argument_is_bad() {
    let err = tag_error("{{if}}");
    assert_eq!(err.code, ErrorCode::BAD_DIRECTIVE);
    assert!(err.message.contains("'if'"));
}

#[test]
fn test_end_keyword_with_junk_is_bad() {
    assert_eq!(tag_error("{{if x}}{{endif x}}").code, ErrorCode::BAD_DIRECTIVE);
    assert_eq!(tag_error("{{for x in y}}{{else y}}").code, ErrorCode::BAD_DIRECTIVE);
}

#[test]
fn test_def_without_parens_is_bad() {
    assert_eq!(tag_error("{{def}}").code, ErrorCode::BAD_DIRECTIVE);
}

#[test]
fn test_only_one_def() {
    let err = tag_error("{{def(a)}}x{{def(b)}}");
    assert_eq!(err.code, ErrorCode::DUPLICATE_DEF);
}

#[test]
fn test_def_must_come_first() {
    let err = tag_error("{{x}}{{def(a)}}");
    assert_eq!(err.code, ErrorCode::DEF_NOT_FIRST);
    assert_eq!(err.offset, Some(7));
}

#[test]
fn test_def_after_literal_text_is_allowed() {
    let kinds: Vec<TagKind> = tag_texts("Hi {{def(a)}}{{a}}").into_iter().map(|(k, _)| k).collect();
    assert_eq!(kinds, vec![TagKind::Const, TagKind::Def, TagKind::Expr]);
}

#[test]
fn test_saw_signature() {
    let sf = SourceFile::new("t.prep", "{{def()}}x");
    let mut lexer = TemplateLexer::new(&sf, LexOptions::default());
    lexer.lex().unwrap();
    assert!(lexer.saw_signature());
}

// ─────────────────────────────────────────────────────────────────────
// Script tokens
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_simple_statement() {
    assert_eq!(
        script("x = a + 1"),
        vec![
            name("x"),
            TokenKind::Eq,
            name("a"),
            TokenKind::Plus,
            TokenKind::Int(1),
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_operators() {
    assert_eq!(
        script("a // b ** c != d <= e -> f"),
        vec![
            name("a"),
            TokenKind::DoubleSlash,
            name("b"),
            TokenKind::DoubleStar,
            name("c"),
            TokenKind::NotEq,
            name("d"),
            TokenKind::LessEq,
            name("e"),
            TokenKind::Arrow,
            name("f"),
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_augmented_assignment() {
    assert_eq!(
        script("i -= 1"),
        vec![name("i"), TokenKind::MinusEq, TokenKind::Int(1), TokenKind::Newline]
    );
}

#[test]
fn test_indent_and_dedent() {
    assert_eq!(
        script("if x:\n    y\nz"),
        vec![
            TokenKind::If,
            name("x"),
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            name("y"),
            TokenKind::Newline,
            TokenKind::Dedent,
            name("z"),
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_dedent_at_end() {
    let kinds = script("while x:\n  y");
    assert_eq!(kinds.last(), Some(&TokenKind::Dedent));
}

#[test]
fn test_blank_and_comment_lines_ignored() {
    assert_eq!(
        script("a\n\n   # note\nb # trailing\n"),
        vec![name("a"), TokenKind::Newline, name("b"), TokenKind::Newline]
    );
}

#[test]
fn test_brackets_join_lines() {
    assert_eq!(
        script("f(a,\n      b)"),
        vec![
            name("f"),
            TokenKind::LParen,
            name("a"),
            TokenKind::Comma,
            name("b"),
            TokenKind::RParen,
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_backslash_joins_lines() {
    assert_eq!(
        script("i=1+2+\\\n\t3"),
        vec![
            name("i"),
            TokenKind::Eq,
            TokenKind::Int(1),
            TokenKind::Plus,
            TokenKind::Int(2),
            TokenKind::Plus,
            TokenKind::Int(3),
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_backslash_followed_by_space_is_an_error() {
    assert_eq!(script_error("i=1+2+\\ \n\t3").code, ErrorCode::BAD_CHARACTER);
}

#[test]
fn test_inconsistent_dedent() {
    assert_eq!(script_error("if x:\n    a\n  b").code, ErrorCode::BAD_INDENT);
}

#[test]
fn test_strings() {
    assert_eq!(
        script(r#"'a\'b' "c\nd" '\x41\u00e9'"#),
        vec![
            TokenKind::Str("a'b".into()),
            TokenKind::Str("c\nd".into()),
            TokenKind::Str("Aé".into()),
            TokenKind::Newline,
        ]
    );
}

#[test]
fn test_triple_quoted_string_spans_lines() {
    assert_eq!(
        script("'''one\ntwo'''"),
        vec![TokenKind::Str("one\ntwo".into()), TokenKind::Newline]
    );
}

#[test]
fn test_unterminated_string() {
    assert_eq!(script_error("'abc").code, ErrorCode::UNTERMINATED_STRING);
    assert_eq!(script_error("'abc\n'").code, ErrorCode::UNTERMINATED_STRING);
}

#[test]
fn test_integer_overflow() {
    assert_eq!(script_error("99999999999999999999").code, ErrorCode::BAD_NUMBER);
}

#[test]
fn test_invalid_character() {
    let err = script_error("a ? b");
    assert_eq!(err.code, ErrorCode::BAD_CHARACTER);
    assert_eq!(err.span.start_col, 3);
}

#[test]
fn test_soft_keywords_are_names() {
    assert_eq!(
        script("match case _"),
        vec![name("match"), name("case"), name("_"), TokenKind::Newline]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Span rebasing
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_spans_rebased_onto_template() {
    let template = "Hello\n  {{if total > 10}}";
    let sf = SourceFile::new("t.prep", template);
    let start = template.find("if").unwrap();
    let fragment = &template[start..template.len() - 2];
    let tokens = Lexer::new(&sf, fragment, sf.origin(start)).tokenize().unwrap();
    let total = tokens.iter().find(|t| t.kind == name("total")).unwrap();
    assert_eq!(total.span, Span::new(2, 8, 2, 13));
}

#[test]
fn test_dedented_spans_keep_columns() {
    // Second line of a fragment whose lines were shifted left by four columns.
    let sf = SourceFile::new("t.prep", "{{script}}\n    a = 1\n    b = 2{{endscript}}");
    let tokens = Lexer::new(&sf, "\na = 1\nb = 2", Origin::new(1, 11).with_indent(4))
        .tokenize()
        .unwrap();
    let b = tokens.iter().find(|t| t.kind == name("b")).unwrap();
    assert_eq!(b.span.start_line, 3);
    assert_eq!(b.span.start_col, 5);
}

// ─────────────────────────────────────────────────────────────────────
// Determinism
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_lexing_is_deterministic() {
    let src = "{{for i in range(3)}}{{i}}{{if i}},{{endif}}{{endfor}}";
    let first = tags(src);
    for _ in 0..50 {
        assert_eq!(tags(src), first);
    }
}
