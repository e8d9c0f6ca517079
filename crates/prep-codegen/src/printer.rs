//! Human-readable form of generated code.
//!
//! Prints a [`Procedure`] as indented script source. This is what
//! `prep compile -p` writes next to a template, and it is handy when a
//! template misbehaves. The output is for reading; it is never parsed back.

use std::fmt::Write as _;

use prep_types::ast::*;
use prep_types::procedure::names;
use prep_types::{Procedure, ProcedureKind};

const INDENT: &str = "    ";

/// Print a whole procedure, headed by the signature it is entered with.
pub fn print_procedure(procedure: &Procedure) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", procedure.name);
    match &procedure.kind {
        ProcedureKind::Plain => {
            let _ = writeln!(
                out,
                "def __code__({}, {}, {}, {}):",
                names::DICTIONARY,
                names::SINK,
                names::QUOTE_OVERRIDE,
                names::LQUOTE_OVERRIDE
            );
        }
        ProcedureKind::Callable { params } => {
            let _ = writeln!(out, "def get({}):", print_params(params));
        }
    }
    Printer::new(&mut out, 1).stmts(&procedure.body);
    out
}

/// Print a statement list at the top level.
pub fn print_stmts(stmts: &[Stmt]) -> String {
    let mut out = String::new();
    Printer::new(&mut out, 0).stmts(stmts);
    out
}

/// Print a single expression.
pub fn print_expr(expr: &Expr) -> String {
    let mut out = String::new();
    expr_into(&mut out, expr);
    out
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

struct Printer<'a> {
    out: &'a mut String,
    depth: usize,
}

impl<'a> Printer<'a> {
    fn new(out: &'a mut String, depth: usize) -> Self {
        Self { out, depth }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn block(&mut self, header: &str, body: &[Stmt]) {
        self.line(header);
        self.depth += 1;
        if body.is_empty() {
            self.line("pass");
        } else {
            self.stmts(body);
        }
        self.depth -= 1;
    }

    fn else_block(&mut self, orelse: &[Stmt]) {
        if !orelse.is_empty() {
            self.block("else:", orelse);
        }
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(e) => self.line(&print_expr(e)),
            StmtKind::Assign { targets, value } => {
                let mut text: String = targets.iter().map(|t| format!("{} = ", print_target(t))).collect();
                text.push_str(&print_expr(value));
                self.line(&text);
            }
            StmtKind::AugAssign { target, op, value } => {
                self.line(&format!("{} {}= {}", print_target(target), op.symbol(), print_expr(value)));
            }
            StmtKind::Pass => self.line("pass"),
            StmtKind::Break => self.line("break"),
            StmtKind::Continue => self.line("continue"),
            StmtKind::Return(value) => self.line(&keyword_with("return", value.as_ref())),
            StmtKind::Raise(value) => self.line(&keyword_with("raise", value.as_ref())),
            StmtKind::Assert { test, msg } => {
                let mut text = format!("assert {}", print_expr(test));
                if let Some(msg) = msg {
                    let _ = write!(text, ", {}", print_expr(msg));
                }
                self.line(&text);
            }
            StmtKind::Del(targets) => {
                let targets: Vec<String> = targets.iter().map(print_target).collect();
                self.line(&format!("del {}", targets.join(", ")));
            }
            StmtKind::Import(aliases) => self.line(&format!("import {}", print_aliases(aliases))),
            StmtKind::ImportFrom { module, names } => {
                self.line(&format!("from {module} import {}", print_aliases(names)));
            }
            StmtKind::If { test, body, orelse } => self.if_chain("if", test, body, orelse),
            StmtKind::While { test, body, orelse } => {
                self.block(&format!("while {}:", print_expr(test)), body);
                self.else_block(orelse);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let header = format!("for {} in {}:", print_target(target), print_expr(iter));
                self.block(&header, body);
                self.else_block(orelse);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.block("try:", body);
                for handler in handlers {
                    let mut header = String::from("except");
                    if let Some(kind) = &handler.kind {
                        let _ = write!(header, " {}", print_expr(kind));
                    }
                    if let Some(name) = &handler.name {
                        let _ = write!(header, " as {name}");
                    }
                    header.push(':');
                    self.block(&header, &handler.body);
                }
                self.else_block(orelse);
                if !finalbody.is_empty() {
                    self.block("finally:", finalbody);
                }
            }
            StmtKind::With { items, body } => {
                let items: Vec<String> = items
                    .iter()
                    .map(|item| match &item.target {
                        Some(t) => format!("{} as {}", print_expr(&item.context), print_target(t)),
                        None => print_expr(&item.context),
                    })
                    .collect();
                self.block(&format!("with {}:", items.join(", ")), body);
            }
            StmtKind::FunctionDef { name, params, body } => {
                self.block(&format!("def {name}({}):", print_params(params)), body);
            }
            StmtKind::Match { subject, cases } => {
                self.line(&format!("match {}:", print_expr(subject)));
                self.depth += 1;
                for case in cases {
                    let mut header = format!("case {}", print_pattern(&case.pattern));
                    if let Some(guard) = &case.guard {
                        let _ = write!(header, " if {}", print_expr(guard));
                    }
                    header.push(':');
                    self.block(&header, &case.body);
                }
                self.depth -= 1;
            }
        }
    }

    /// `if`, folding a lone nested `if` in the else branch into `elif`.
    fn if_chain(&mut self, keyword: &str, test: &Expr, body: &[Stmt], orelse: &[Stmt]) {
        self.block(&format!("{keyword} {}:", print_expr(test)), body);
        match orelse {
            [Stmt {
                kind: StmtKind::If { test, body, orelse },
                ..
            }] => self.if_chain("elif", test, body, orelse),
            _ => self.else_block(orelse),
        }
    }
}

fn keyword_with(keyword: &str, value: Option<&Expr>) -> String {
    match value {
        Some(value) => format!("{keyword} {}", print_expr(value)),
        None => keyword.to_string(),
    }
}

fn print_aliases(aliases: &[Alias]) -> String {
    aliases
        .iter()
        .map(|a| match &a.asname {
            Some(asname) => format!("{} as {asname}", a.name),
            None => a.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_params(params: &Params) -> String {
    let param = |p: &Param| match &p.default {
        Some(default) => format!("{}={}", p.name, print_expr(default)),
        None => p.name.clone(),
    };
    let mut parts: Vec<String> = params.positional.iter().map(param).collect();
    match &params.vararg {
        Some(vararg) => parts.push(format!("*{vararg}")),
        None if !params.kwonly.is_empty() => parts.push("*".into()),
        None => {}
    }
    parts.extend(params.kwonly.iter().map(param));
    if let Some(kwarg) = &params.kwarg {
        parts.push(format!("**{kwarg}"));
    }
    parts.join(", ")
}

fn print_target(target: &Target) -> String {
    match target {
        Target::Name(name) => name.clone(),
        Target::Sequence(items) => {
            let items: Vec<String> = items.iter().map(print_target).collect();
            if items.len() == 1 {
                format!("({},)", items[0])
            } else {
                format!("({})", items.join(", "))
            }
        }
        Target::Subscript { value, index } => format!("{}[{}]", atom(value), print_expr(index)),
        Target::Attribute { value, attr } => format!("{}.{attr}", atom(value)),
    }
}

fn print_pattern(pattern: &Pattern) -> String {
    match pattern {
        Pattern::Wildcard => "_".into(),
        Pattern::Capture(name) => name.clone(),
        Pattern::Value(expr) => print_expr(expr),
        Pattern::Sequence(items) => {
            let items: Vec<String> = items.iter().map(print_pattern).collect();
            format!("[{}]", items.join(", "))
        }
        Pattern::Or(options) => options.iter().map(print_pattern).collect::<Vec<_>>().join(" | "),
        Pattern::As(inner, name) => format!("{} as {name}", print_pattern(inner)),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

/// Whether an expression prints without surrounding parentheses in operand
/// position.
fn is_atomic(expr: &Expr) -> bool {
    !matches!(
        expr.kind,
        ExprKind::Binary { .. }
            | ExprKind::Unary { .. }
            | ExprKind::Logical { .. }
            | ExprKind::Compare { .. }
            | ExprKind::IfExp { .. }
            | ExprKind::Lambda { .. }
    )
}

/// An operand, parenthesized unless atomic.
fn atom(expr: &Expr) -> String {
    if is_atomic(expr) {
        print_expr(expr)
    } else {
        format!("({})", print_expr(expr))
    }
}

fn expr_into(out: &mut String, expr: &Expr) {
    match &expr.kind {
        ExprKind::None => out.push_str("None"),
        ExprKind::Bool(true) => out.push_str("True"),
        ExprKind::Bool(false) => out.push_str("False"),
        ExprKind::Int(n) => {
            let _ = write!(out, "{n}");
        }
        ExprKind::Float(f) => out.push_str(&float_repr(*f)),
        ExprKind::Str(s) => out.push_str(&str_repr(s)),
        ExprKind::Bytes(b) => out.push_str(&bytes_repr(b)),
        ExprKind::Name(name) => out.push_str(name),
        ExprKind::List(items) => {
            let _ = write!(out, "[{}]", comma_list(items));
        }
        ExprKind::Tuple(items) if items.len() == 1 => {
            let _ = write!(out, "({},)", print_expr(&items[0]));
        }
        ExprKind::Tuple(items) => {
            let _ = write!(out, "({})", comma_list(items));
        }
        ExprKind::Dict(entries) => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", print_expr(k), print_expr(v)))
                .collect();
            let _ = write!(out, "{{{}}}", entries.join(", "));
        }
        ExprKind::ListComp { element, clauses } => {
            let _ = write!(out, "[{}", print_expr(element));
            for clause in clauses {
                let _ = write!(out, " for {} in {}", print_target(&clause.target), atom(&clause.iter));
                for condition in &clause.conditions {
                    let _ = write!(out, " if {}", atom(condition));
                }
            }
            out.push(']');
        }
        ExprKind::Attribute { value, attr } => {
            let _ = write!(out, "{}.{attr}", atom(value));
        }
        ExprKind::Subscript { value, index } => {
            let _ = write!(out, "{}[{}]", atom(value), print_expr(index));
        }
        ExprKind::Slice { lower, upper, step } => {
            let part = |e: &Option<Box<Expr>>| e.as_deref().map(print_expr).unwrap_or_default();
            let _ = write!(out, "{}:{}", part(lower), part(upper));
            if step.is_some() {
                let _ = write!(out, ":{}", part(step));
            }
        }
        ExprKind::Call { func, args } => {
            let args: Vec<String> = args
                .iter()
                .map(|arg| match arg {
                    Arg::Positional(e) => print_expr(e),
                    Arg::Keyword(name, e) => format!("{name}={}", print_expr(e)),
                    Arg::Star(e) => format!("*{}", atom(e)),
                    Arg::DoubleStar(e) => format!("**{}", atom(e)),
                })
                .collect();
            let _ = write!(out, "{}({})", atom(func), args.join(", "));
        }
        ExprKind::Binary { op, left, right } => {
            let _ = write!(out, "{} {} {}", atom(left), op.symbol(), atom(right));
        }
        ExprKind::Unary { op, operand } => {
            let symbol = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                UnaryOp::Not => "not ",
            };
            let _ = write!(out, "{symbol}{}", atom(operand));
        }
        ExprKind::Logical { op, left, right } => {
            let word = match op {
                LogicalOp::And => "and",
                LogicalOp::Or => "or",
            };
            let _ = write!(out, "{} {word} {}", atom(left), atom(right));
        }
        ExprKind::Compare { left, ops } => {
            out.push_str(&atom(left));
            for (op, right) in ops {
                let _ = write!(out, " {} {}", op.symbol(), atom(right));
            }
        }
        ExprKind::IfExp { test, body, orelse } => {
            let _ = write!(out, "{} if {} else {}", atom(body), atom(test), atom(orelse));
        }
        ExprKind::Lambda { params, body } => {
            let params = print_params(params);
            if params.is_empty() {
                let _ = write!(out, "lambda: {}", print_expr(body));
            } else {
                let _ = write!(out, "lambda {params}: {}", print_expr(body));
            }
        }
    }
}

fn comma_list(items: &[Expr]) -> String {
    items.iter().map(print_expr).collect::<Vec<_>>().join(", ")
}

fn float_repr(f: f64) -> String {
    if f.is_nan() {
        "float('nan')".into()
    } else if f.is_infinite() {
        let sign = if f > 0.0 { "" } else { "-" };
        format!("{sign}float('inf')")
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// Single-quoted string literal with backslash escapes.
pub(crate) fn str_repr(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn bytes_repr(bytes: &[u8]) -> String {
    let mut out = String::from("b'");
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            }
        }
    }
    out.push('\'');
    out
}
