//! Script parser tests.
//!
//! Covers:
//! 1. Expression precedence and literals
//! 2. Calls, subscripts, comprehensions and lambdas
//! 3. Simple and compound statements
//! 4. Context checks for `break`, `continue` and `return`
//! 5. `match` as a soft keyword and case patterns

use pretty_assertions::assert_eq;
use prep_parser::{parse_expression, parse_script, Context, Fragment};
use prep_types::ast::*;
use prep_types::{ErrorCode, PrepError, SourceFile};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn expr(source: &str) -> Expr {
    let sf = SourceFile::new("test.prep", source);
    parse_expression(Fragment::whole(&sf)).unwrap_or_else(|e| panic!("{e}"))
}

fn expr_kind(source: &str) -> ExprKind {
    expr(source).kind
}

fn script_in(source: &str, context: Context) -> Result<Vec<Stmt>, PrepError> {
    let sf = SourceFile::new("test.prep", source);
    parse_script(Fragment::whole(&sf), context)
}

fn script(source: &str) -> Vec<Stmt> {
    script_in(source, Context::default()).unwrap_or_else(|e| panic!("{e}"))
}

fn script_err(source: &str) -> PrepError {
    script_in(source, Context::default()).expect_err("expected a parse error")
}

fn kinds(source: &str) -> Vec<StmtKind> {
    script(source).into_iter().map(|s| s.kind).collect()
}

fn name(n: &str) -> ExprKind {
    ExprKind::Name(n.into())
}

/// Render an expression as a fully parenthesised string for precedence
/// checks.
fn shape(e: &Expr) -> String {
    match &e.kind {
        ExprKind::Name(n) => n.clone(),
        ExprKind::Int(n) => n.to_string(),
        ExprKind::Binary { op, left, right } => {
            format!("({} {} {})", shape(left), op.symbol(), shape(right))
        }
        ExprKind::Unary { op, operand } => {
            let sym = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                UnaryOp::Not => "not ",
            };
            format!("({sym}{})", shape(operand))
        }
        ExprKind::Logical { op, left, right } => {
            let sym = if *op == LogicalOp::And { "and" } else { "or" };
            format!("({} {sym} {})", shape(left), shape(right))
        }
        ExprKind::Compare { left, ops } => {
            let mut s = format!("({}", shape(left));
            for (op, right) in ops {
                s.push_str(&format!(" {} {}", op.symbol(), shape(right)));
            }
            s.push(')');
            s
        }
        ExprKind::IfExp { test, body, orelse } => {
            format!("({} if {} else {})", shape(body), shape(test), shape(orelse))
        }
        other => format!("{other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(shape(&expr("1 + 2 * 3")), "(1 + (2 * 3))");
    assert_eq!(shape(&expr("(1 + 2) * 3")), "((1 + 2) * 3)");
    assert_eq!(shape(&expr("a - b - c")), "((a - b) - c)");
    assert_eq!(shape(&expr("a // b % c")), "((a // b) % c)");
}

#[test]
fn test_power_is_right_associative_and_binds_tighter_than_unary() {
    assert_eq!(shape(&expr("2 ** 3 ** 2")), "(2 ** (3 ** 2))");
    assert_eq!(shape(&expr("-2 ** 2")), "(-(2 ** 2))");
    assert_eq!(shape(&expr("2 ** -1")), "(2 ** (-1))");
}

#[test]
fn test_boolean_precedence() {
    assert_eq!(shape(&expr("not a and b or c")), "(((not a) and b) or c)");
    assert_eq!(shape(&expr("a or b and c")), "(a or (b and c))");
}

#[test]
fn test_chained_comparison() {
    assert_eq!(shape(&expr("a < b <= c")), "(a < b <= c)");
    assert_eq!(shape(&expr("a not in b")), "(a not in b)");
    assert_eq!(shape(&expr("a is not None")), "(a is not None)");
}

#[test]
fn test_conditional_expression() {
    assert_eq!(shape(&expr("a if c else b")), "(a if c else b)");
    assert_eq!(shape(&expr("a if c else b if d else e")), "(a if c else (b if d else e))");
}

#[test]
fn test_literals() {
    assert_eq!(expr_kind("None"), ExprKind::None);
    assert_eq!(expr_kind("True"), ExprKind::Bool(true));
    assert_eq!(expr_kind("1.5"), ExprKind::Float(1.5));
    assert_eq!(expr_kind("'a' \"b\""), ExprKind::Str("ab".into()));
    assert_eq!(expr_kind("b'x' b'y'"), ExprKind::Bytes(b"xy".to_vec()));
}

#[test]
fn test_mixing_bytes_and_str_is_an_error() {
    let sf = SourceFile::new("test.prep", "'a' b'b'");
    let err = parse_expression(Fragment::whole(&sf)).unwrap_err();
    assert_eq!(err.code, ErrorCode::INVALID_SYNTAX);
    assert!(err.message.contains("bytes"));
}

#[test]
fn test_displays() {
    match expr_kind("(1,)") {
        ExprKind::Tuple(items) => assert_eq!(items.len(), 1),
        other => panic!("expected tuple, got {other:?}"),
    }
    assert_eq!(expr_kind("()"), ExprKind::Tuple(vec![]));
    assert_eq!(expr_kind("[]"), ExprKind::List(vec![]));
    match expr_kind("{'a': 1, 'b': [2, 3],}") {
        ExprKind::Dict(entries) => assert_eq!(entries.len(), 2),
        other => panic!("expected dict, got {other:?}"),
    }
}

#[test]
fn test_bare_tuple_expression() {
    match expr_kind("1, 2") {
        ExprKind::Tuple(items) => assert_eq!(items.len(), 2),
        other => panic!("expected tuple, got {other:?}"),
    }
}

#[test]
fn test_grouping_keeps_inner_expression() {
    assert_eq!(shape(&expr("(a)")), "a");
}

#[test]
fn test_call_arguments() {
    let ExprKind::Call { func, args } = expr_kind("f(1, x=2, *rest, **kw)") else {
        panic!("expected call");
    };
    assert_eq!(func.kind, name("f"));
    assert_eq!(args.len(), 4);
    assert!(matches!(args[0], Arg::Positional(_)));
    assert!(matches!(&args[1], Arg::Keyword(k, _) if k == "x"));
    assert!(matches!(args[2], Arg::Star(_)));
    assert!(matches!(args[3], Arg::DoubleStar(_)));
}

#[test]
fn test_positional_after_keyword_is_an_error() {
    let sf = SourceFile::new("test.prep", "f(x=1, 2)");
    let err = parse_expression(Fragment::whole(&sf)).unwrap_err();
    assert!(err.message.contains("positional argument follows keyword argument"));
}

#[test]
fn test_generator_argument() {
    let ExprKind::Call { args, .. } = expr_kind("''.join(str(i) for i in xs)") else {
        panic!("expected call");
    };
    assert_eq!(args.len(), 1);
    assert!(matches!(&args[0], Arg::Positional(e) if matches!(e.kind, ExprKind::ListComp { .. })));
}

#[test]
fn test_list_comprehension_clauses() {
    let ExprKind::ListComp { element, clauses } = expr_kind("[a * b for a, b in pairs if a if b for c in cs]") else {
        panic!("expected comprehension");
    };
    assert_eq!(shape(&element), "(a * b)");
    assert_eq!(clauses.len(), 2);
    assert_eq!(
        clauses[0].target,
        Target::Sequence(vec![Target::Name("a".into()), Target::Name("b".into())])
    );
    assert_eq!(clauses[0].conditions.len(), 2);
    assert_eq!(clauses[1].target, Target::Name("c".into()));
}

#[test]
fn test_subscripts_and_slices() {
    let ExprKind::Subscript { index, .. } = expr_kind("xs[1:]") else {
        panic!("expected subscript");
    };
    assert!(matches!(
        index.kind,
        ExprKind::Slice { lower: Some(_), upper: None, step: None }
    ));
    let ExprKind::Subscript { index, .. } = expr_kind("xs[::-1]") else {
        panic!("expected subscript");
    };
    assert!(matches!(
        index.kind,
        ExprKind::Slice { lower: None, upper: None, step: Some(_) }
    ));
}

#[test]
fn test_attribute_chain_span_covers_whole_expression() {
    let e = expr("a.b.c(1)");
    assert_eq!((e.span.start_col, e.span.end_col), (1, 9));
}

#[test]
fn test_lambda() {
    let ExprKind::Lambda { params, body } = expr_kind("lambda x, y=2: x + y") else {
        panic!("expected lambda");
    };
    assert_eq!(params.names(), vec!["x", "y"]);
    assert!(params.positional[1].default.is_some());
    assert_eq!(shape(&body), "(x + y)");
}

#[test]
fn test_trailing_garbage_is_an_error() {
    let sf = SourceFile::new("test.prep", "a b");
    let err = parse_expression(Fragment::whole(&sf)).unwrap_err();
    assert_eq!(err.code, ErrorCode::INVALID_SYNTAX);
    assert_eq!((err.span.start_line, err.span.start_col), (1, 3));
}

#[test]
fn test_deep_nesting_is_rejected() {
    let source = format!("{}1{}", "(".repeat(60), ")".repeat(60));
    let sf = SourceFile::new("test.prep", source.as_str());
    let err = parse_expression(Fragment::whole(&sf)).unwrap_err();
    assert!(err.message.contains("nested too deeply"));
}

// ─────────────────────────────────────────────────────────────────────
// Simple statements
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_semicolon_separated_statements() {
    let stmts = kinds("x = 1; y = 2; pass");
    assert_eq!(stmts.len(), 3);
    assert_eq!(stmts[2], StmtKind::Pass);
}

#[test]
fn test_chained_and_unpacking_assignment() {
    let stmts = kinds("a = b = 1\nx, (y, z) = 1, (2, 3)");
    let StmtKind::Assign { targets, .. } = &stmts[0] else {
        panic!("expected assignment");
    };
    assert_eq!(targets, &vec![Target::Name("a".into()), Target::Name("b".into())]);
    let StmtKind::Assign { targets, .. } = &stmts[1] else {
        panic!("expected assignment");
    };
    assert_eq!(
        targets[0],
        Target::Sequence(vec![
            Target::Name("x".into()),
            Target::Sequence(vec![Target::Name("y".into()), Target::Name("z".into())]),
        ])
    );
}

#[test]
fn test_subscript_and_attribute_targets() {
    let stmts = kinds("d['k'] = 1\no.attr += 2");
    assert!(matches!(
        &stmts[0],
        StmtKind::Assign { targets, .. } if matches!(targets[0], Target::Subscript { .. })
    ));
    assert!(matches!(
        &stmts[1],
        StmtKind::AugAssign { target: Target::Attribute { .. }, op: BinOp::Add, .. }
    ));
}

#[test]
fn test_assignment_to_call_is_an_error() {
    let err = script_err("f() = 1");
    assert_eq!(err.code, ErrorCode::BAD_TARGET);
}

#[test]
fn test_augmented_assignment_to_tuple_is_an_error() {
    let err = script_err("a, b += 1");
    assert_eq!(err.code, ErrorCode::BAD_TARGET);
}

#[test]
fn test_imports() {
    let stmts = kinds("import math as m, os.path\nfrom math import floor, ceil as c");
    assert_eq!(
        stmts[0],
        StmtKind::Import(vec![
            Alias { name: "math".into(), asname: Some("m".into()) },
            Alias { name: "os.path".into(), asname: None },
        ])
    );
    assert_eq!(
        stmts[1],
        StmtKind::ImportFrom {
            module: "math".into(),
            names: vec![
                Alias { name: "floor".into(), asname: None },
                Alias { name: "ceil".into(), asname: Some("c".into()) },
            ],
        }
    );
}

#[test]
fn test_raise_assert_del() {
    let stmts = kinds("raise ValueError('x')\nraise\nassert x, 'msg'\ndel a, b[0]");
    assert!(matches!(stmts[0], StmtKind::Raise(Some(_))));
    assert_eq!(stmts[1], StmtKind::Raise(None));
    assert!(matches!(&stmts[2], StmtKind::Assert { msg: Some(_), .. }));
    assert!(matches!(&stmts[3], StmtKind::Del(targets) if targets.len() == 2));
}

// ─────────────────────────────────────────────────────────────────────
// Compound statements
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_if_elif_else_nests_in_orelse() {
    let stmts = kinds("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
    let StmtKind::If { orelse, .. } = &stmts[0] else {
        panic!("expected if");
    };
    let StmtKind::If { orelse: inner, .. } = &orelse[0].kind else {
        panic!("expected nested if");
    };
    assert_eq!(inner.len(), 1);
}

#[test]
fn test_one_line_block() {
    let stmts = kinds("if x: y = 1; z = 2\n");
    let StmtKind::If { body, .. } = &stmts[0] else {
        panic!("expected if");
    };
    assert_eq!(body.len(), 2);
}

#[test]
fn test_for_else_and_while_else() {
    let stmts = kinds("for i in range(3):\n    break\nelse:\n    pass\nwhile x:\n    continue\nelse:\n    pass\n");
    assert!(matches!(&stmts[0], StmtKind::For { orelse, .. } if orelse.len() == 1));
    assert!(matches!(&stmts[1], StmtKind::While { orelse, .. } if orelse.len() == 1));
}

#[test]
fn test_try_statement() {
    let source = "\
try:
    x = 1
except (KeyError, IndexError) as e:
    pass
except:
    pass
else:
    y = 2
finally:
    z = 3
";
    let stmts = kinds(source);
    let StmtKind::Try { handlers, orelse, finalbody, .. } = &stmts[0] else {
        panic!("expected try");
    };
    assert_eq!(handlers.len(), 2);
    assert_eq!(handlers[0].name.as_deref(), Some("e"));
    assert!(handlers[1].kind.is_none());
    assert_eq!(orelse.len(), 1);
    assert_eq!(finalbody.len(), 1);
}

#[test]
fn test_bare_except_must_be_last() {
    let err = script_err("try:\n    pass\nexcept:\n    pass\nexcept ValueError:\n    pass\n");
    assert!(err.message.contains("must be last"));
}

#[test]
fn test_try_without_handlers_is_an_error() {
    let err = script_err("try:\n    pass\nx = 1\n");
    assert!(err.message.contains("'except' or 'finally'"));
}

#[test]
fn test_with_statement() {
    let stmts = kinds("with open(p) as f, lock:\n    pass\n");
    let StmtKind::With { items, .. } = &stmts[0] else {
        panic!("expected with");
    };
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].target, Some(Target::Name("f".into())));
    assert_eq!(items[1].target, None);
}

#[test]
fn test_function_definition_parameters() {
    let stmts = kinds("def f(a, b=1, *args, c, d=2, **kw) -> str:\n    return a\n");
    let StmtKind::FunctionDef { name, params, body } = &stmts[0] else {
        panic!("expected def");
    };
    assert_eq!(name, "f");
    assert_eq!(params.names(), vec!["a", "b", "args", "c", "d", "kw"]);
    assert_eq!(params.kwonly.len(), 2);
    assert!(matches!(body[0].kind, StmtKind::Return(Some(_))));
}

#[test]
fn test_bare_star_keyword_only() {
    let stmts = kinds("def f(a, *, b):\n    pass\n");
    let StmtKind::FunctionDef { params, .. } = &stmts[0] else {
        panic!("expected def");
    };
    assert_eq!(params.vararg, None);
    assert_eq!(params.kwonly, vec![Param::new("b")]);
}

#[test]
fn test_parameter_errors() {
    assert!(script_err("def f(a=1, b):\n    pass\n")
        .message
        .contains("non-default argument follows default argument"));
    assert!(script_err("def f(a, a):\n    pass\n").message.contains("duplicate argument"));
    assert!(script_err("def f(*):\n    pass\n").message.contains("named arguments must follow bare *"));
}

#[test]
fn test_missing_indented_block() {
    let err = script_err("if x:\npass\n");
    assert!(err.message.contains("expected an indented block"));
}

#[test]
fn test_unexpected_indent() {
    let err = script_err("x = 1\n    y = 2\n");
    assert!(err.message.contains("unexpected indent"));
}

// ─────────────────────────────────────────────────────────────────────
// Context checks
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_break_outside_loop() {
    let err = script_err("break");
    assert_eq!(err.code, ErrorCode::OUTSIDE_LOOP);
}

#[test]
fn test_break_allowed_when_template_loop_encloses_script() {
    let context = Context {
        in_loop: true,
        ..Context::default()
    };
    let stmts = script_in("if x:\n    break\n", context).unwrap();
    assert_eq!(stmts.len(), 1);
}

#[test]
fn test_function_body_hides_enclosing_loop() {
    let err = script_err("for i in x:\n    def f():\n        break\n");
    assert_eq!(err.code, ErrorCode::OUTSIDE_LOOP);
}

#[test]
fn test_return_outside_function() {
    let err = script_err("return 1");
    assert_eq!(err.code, ErrorCode::OUTSIDE_FUNCTION);
    let context = Context {
        in_function: true,
        ..Context::default()
    };
    assert!(script_in("return 1", context).is_ok());
}

// ─────────────────────────────────────────────────────────────────────
// Pattern matching
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_match_statement_patterns() {
    let source = "\
match point:
    case (0, 0):
        pass
    case [x, _] if x > 0:
        pass
    case 1 | -2 | 'three' as n:
        pass
    case Color.RED:
        pass
    case a, b:
        pass
    case _:
        pass
";
    let stmts = kinds(source);
    let StmtKind::Match { cases, .. } = &stmts[0] else {
        panic!("expected match");
    };
    assert_eq!(cases.len(), 6);
    assert!(matches!(&cases[0].pattern, Pattern::Sequence(items) if items.len() == 2));
    assert_eq!(
        cases[1].pattern,
        Pattern::Sequence(vec![Pattern::Capture("x".into()), Pattern::Wildcard])
    );
    assert!(cases[1].guard.is_some());
    let Pattern::As(inner, bound) = &cases[2].pattern else {
        panic!("expected as pattern");
    };
    assert_eq!(bound, "n");
    assert!(matches!(&**inner, Pattern::Or(alts) if alts.len() == 3));
    assert!(matches!(&cases[3].pattern, Pattern::Value(e) if matches!(e.kind, ExprKind::Attribute { .. })));
    assert!(matches!(&cases[4].pattern, Pattern::Sequence(items) if items.len() == 2));
    assert_eq!(cases[5].pattern, Pattern::Wildcard);
}

#[test]
fn test_negative_literal_pattern() {
    let stmts = kinds("match x:\n    case -2:\n        pass\n");
    let StmtKind::Match { cases, .. } = &stmts[0] else {
        panic!("expected match");
    };
    assert!(matches!(&cases[0].pattern, Pattern::Value(e) if e.kind == ExprKind::Int(-2)));
}

#[test]
fn test_match_is_a_soft_keyword() {
    let stmts = kinds("match = 1\nmatch(2)\n");
    assert!(matches!(&stmts[0], StmtKind::Assign { .. }));
    assert!(matches!(&stmts[1], StmtKind::Expr(_)));
}

#[test]
fn test_match_disabled_reads_as_expression() {
    let context = Context {
        pattern_matching: false,
        ..Context::default()
    };
    let err = script_in("match x:\n    case 1:\n        pass\n", context).unwrap_err();
    assert_eq!(err.code, ErrorCode::INVALID_SYNTAX);
}

#[test]
fn test_class_patterns_are_rejected() {
    let err = script_err("match p:\n    case Point(x=0):\n        pass\n");
    assert_eq!(err.code, ErrorCode::BAD_MATCH);
}
