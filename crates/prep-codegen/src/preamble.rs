//! Synthesized statements wrapped around the translated template body.

use prep_types::ast::{Arg, Expr, ExprKind, Param, Params, Stmt, StmtKind, Target};
use prep_types::procedure::names;
use prep_types::Span;

// ── Expression builders ───────────────────────────────────────────────────

fn name(id: &str, span: Span) -> Expr {
    Expr::name(id, span)
}

fn call(func: &str, args: Vec<Expr>, span: Span) -> Expr {
    Expr::call(name(func, span), args, span)
}

fn method(value: Expr, attr: &str, args: Vec<Expr>, span: Span) -> Expr {
    Expr::call(Expr::attr(value, attr, span), args, span)
}

fn boolean(value: bool, span: Span) -> Expr {
    Expr::new(ExprKind::Bool(value), span)
}

fn none(span: Span) -> Expr {
    Expr::new(ExprKind::None, span)
}

/// `lambda x: body`
fn lambda_x(body: Expr, span: Span) -> Expr {
    Expr::new(
        ExprKind::Lambda {
            params: Params {
                positional: vec![Param::new("x")],
                ..Params::default()
            },
            body: Box::new(body),
        },
        span,
    )
}

/// `helper = lambda x: emit(convert(__wss__.op(x)))`
fn write_helper(helper: &str, emit: Expr, convert: &str, op: &str, span: Span) -> Stmt {
    let controlled = method(name(names::WSS, span), op, vec![name("x", span)], span);
    let converted = call(convert, vec![controlled], span);
    let body = Expr::new(
        ExprKind::Call {
            func: Box::new(emit),
            args: vec![Arg::Positional(converted)],
        },
        span,
    );
    Stmt::assign(helper, lambda_x(body, span), span)
}

/// `__qFunc__, __lqFunc__ = __get_conv__(__quoteFunc__, __lquoteFunc__, bytes)`
fn resolve_quotes(bytes: bool, span: Span) -> Stmt {
    let value = call(
        names::GET_CONV,
        vec![
            name(names::QUOTE_OVERRIDE, span),
            name(names::LQUOTE_OVERRIDE, span),
            boolean(bytes, span),
        ],
        span,
    );
    Stmt::new(
        StmtKind::Assign {
            targets: vec![Target::Sequence(vec![
                Target::Name(names::QFUNC.into()),
                Target::Name(names::LQFUNC.into()),
            ])],
            value,
        },
        span,
    )
}

fn new_controller(span: Span) -> Stmt {
    Stmt::assign(names::WSS, call(names::WSS_NEW, vec![], span), span)
}

/// Both write helpers, emitting through `emit`.
fn write_helpers(emit: impl Fn() -> Expr, span: Span) -> [Stmt; 2] {
    [
        write_helper(names::WRITE, emit(), names::LQFUNC, "c", span),
        write_helper(names::SWRITE, emit(), names::QFUNC, "x", span),
    ]
}

// ── Plain templates ───────────────────────────────────────────────────────

/// Statements run before the body of a plain template.
pub(crate) fn plain(bytes: bool, span: Span) -> Vec<Stmt> {
    let mut stmts = vec![resolve_quotes(bytes, span), new_controller(span)];
    stmts.extend(write_helpers(|| name(names::SINK, span), span));
    stmts.push(Stmt::expr(call(
        names::EXPOSE,
        vec![name(names::DICTIONARY, span)],
        span,
    )));
    stmts
}

// ── Callable templates ────────────────────────────────────────────────────

/// Statements run before the body of a callable template.
///
/// `catch_all` is the `**` parameter; `reject` is set when the generator
/// added it, so leftover keywords are an error.
pub(crate) fn callable(catch_all: &str, reject: bool, bytes: bool, span: Span) -> Vec<Stmt> {
    let pop = |key: &str| {
        method(
            name(catch_all, span),
            "pop",
            vec![Expr::str(key, span), none(span)],
            span,
        )
    };
    let mut stmts = vec![
        Stmt::assign(names::LQUOTE_OVERRIDE, pop(names::LQUOTE_OVERRIDE), span),
        Stmt::assign(names::QUOTE_OVERRIDE, pop(names::QUOTE_OVERRIDE), span),
        resolve_quotes(bytes, span),
    ];
    if reject {
        stmts.push(Stmt::expr(call(
            names::REJECT_KWDS,
            vec![name(catch_all, span)],
            span,
        )));
    }
    stmts.push(Stmt::assign(
        names::OUT,
        Expr::new(ExprKind::List(vec![]), span),
        span,
    ));
    stmts.push(new_controller(span));
    stmts.extend(write_helpers(
        || Expr::attr(name(names::OUT, span), "append", span),
        span,
    ));
    stmts
}

/// `__join__(__out__, bytes)`: the accumulated output of a callable template.
pub(crate) fn joined_output(bytes: bool, span: Span) -> Expr {
    call(
        names::JOIN,
        vec![name(names::OUT, span), boolean(bytes, span)],
        span,
    )
}

/// `return __join__(__out__, bytes)`
pub(crate) fn epilogue(bytes: bool, span: Span) -> Stmt {
    Stmt::new(StmtKind::Return(Some(joined_output(bytes, span))), span)
}

/// `return ''` closing a sub-block.
pub(crate) fn empty_return(span: Span) -> Stmt {
    Stmt::new(StmtKind::Return(Some(Expr::str("", span))), span)
}

// ── Body statements ───────────────────────────────────────────────────────

/// `__write__(text)`
pub(crate) fn write_literal(text: &str, span: Span) -> Stmt {
    Stmt::expr(call(names::WRITE, vec![Expr::str(text, span)], span))
}

/// `__swrite__(expr)`
pub(crate) fn write_expr(expr: Expr, span: Span) -> Stmt {
    Stmt::expr(call(names::SWRITE, vec![expr], span))
}

/// `__wss__.dnl()` / `__wss__.dws()`
pub(crate) fn whitespace(op: &str, span: Span) -> Stmt {
    Stmt::expr(method(name(names::WSS, span), op, vec![], span))
}
