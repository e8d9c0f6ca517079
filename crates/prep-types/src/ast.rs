//! AST node types for the embedded script language.
//!
//! Directive headers, expressions and raw statements inside templates all
//! parse into these nodes, and the code generator emits them too, so the
//! interpreter only ever walks one tree shape.
//!
//! Every expression and statement carries a [`Span`] in the coordinates of
//! the original template. Large recursive types are boxed.

use crate::Span;
use serde::{Deserialize, Serialize};

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

/// A spanned expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// A bare name reference.
    pub fn name(name: impl Into<String>, span: Span) -> Self {
        Self::new(ExprKind::Name(name.into()), span)
    }

    /// A string literal.
    pub fn str(value: impl Into<String>, span: Span) -> Self {
        Self::new(ExprKind::Str(value.into()), span)
    }

    /// A call with positional arguments only.
    pub fn call(func: Expr, args: Vec<Expr>, span: Span) -> Self {
        Self::new(
            ExprKind::Call {
                func: Box::new(func),
                args: args.into_iter().map(Arg::Positional).collect(),
            },
            span,
        )
    }

    /// `value.attr`
    pub fn attr(value: Expr, attr: impl Into<String>, span: Span) -> Self {
        Self::new(
            ExprKind::Attribute {
                value: Box::new(value),
                attr: attr.into(),
            },
            span,
        )
    }
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Name(String),

    /// `[a, b]`
    List(Vec<Expr>),
    /// `(a, b)` or a bare `a, b`
    Tuple(Vec<Expr>),
    /// `{k: v}`
    Dict(Vec<(Expr, Expr)>),
    /// `[element for target in iter if cond ...]`
    ListComp {
        element: Box<Expr>,
        clauses: Vec<Comprehension>,
    },

    /// `value.attr`
    Attribute { value: Box<Expr>, attr: String },
    /// `value[index]`
    Subscript { value: Box<Expr>, index: Box<Expr> },
    /// `lower:upper:step`, only valid as a subscript index.
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    /// `func(args...)`
    Call { func: Box<Expr>, args: Vec<Arg> },

    /// `left op right`
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `op operand`
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// `left and right` / `left or right`
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a < b <= c`, evaluated pairwise with short-circuit.
    Compare {
        left: Box<Expr>,
        ops: Vec<(CmpOp, Expr)>,
    },
    /// `body if test else orelse`
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    /// `lambda params: body`
    Lambda { params: Params, body: Box<Expr> },
}

/// One `for target in iter if cond...` clause of a comprehension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comprehension {
    pub target: Target,
    pub iter: Expr,
    pub conditions: Vec<Expr>,
}

/// A call argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Positional(Expr),
    Keyword(String, Expr),
    /// `*expr`
    Star(Expr),
    /// `**expr`
    DoubleStar(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtE => "<=",
            Self::Gt => ">",
            Self::GtE => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Is => "is",
            Self::IsNot => "is not",
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Assignment Targets
// ══════════════════════════════════════════════════════════════════════════════

/// The left-hand side of an assignment, a `for` loop or an `as` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    Name(String),
    /// `a, b` / `(a, b)` / `[a, b]`
    Sequence(Vec<Target>),
    /// `value[index]`
    Subscript { value: Expr, index: Expr },
    /// `value.attr`
    Attribute { value: Expr, attr: String },
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions
// ══════════════════════════════════════════════════════════════════════════════

/// A parameter list: `a, b=1, *args, c, d=2, **kwargs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    pub positional: Vec<Param>,
    pub vararg: Option<String>,
    pub kwonly: Vec<Param>,
    pub kwarg: Option<String>,
}

impl Params {
    /// Every name the parameter list binds, in declaration order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.positional.iter().map(|p| p.name.as_str()).collect();
        names.extend(self.vararg.as_deref());
        names.extend(self.kwonly.iter().map(|p| p.name.as_str()));
        names.extend(self.kwarg.as_deref());
        names
    }
}

/// A single named parameter with an optional default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

/// A spanned statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// An expression statement.
    pub fn expr(expr: Expr) -> Self {
        let span = expr.span;
        Self::new(StmtKind::Expr(expr), span)
    }

    /// `name = value`
    pub fn assign(name: impl Into<String>, value: Expr, span: Span) -> Self {
        Self::new(
            StmtKind::Assign {
                targets: vec![Target::Name(name.into())],
                value,
            },
            span,
        )
    }
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Expr(Expr),
    /// `t1 = t2 = value`
    Assign { targets: Vec<Target>, value: Expr },
    /// `target op= value`
    AugAssign {
        target: Target,
        op: BinOp,
        value: Expr,
    },
    Pass,
    Break,
    Continue,
    Return(Option<Expr>),
    /// `raise` / `raise expr`
    Raise(Option<Expr>),
    Assert { test: Expr, msg: Option<Expr> },
    Del(Vec<Target>),
    /// `import a.b as c, d`
    Import(Vec<Alias>),
    /// `from module import a as b`
    ImportFrom { module: String, names: Vec<Alias> },

    /// `if`/`elif` chains nest as a single `If` in `orelse`.
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<Handler>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    With { items: Vec<WithItem>, body: Vec<Stmt> },
    FunctionDef {
        name: String,
        params: Params,
        body: Vec<Stmt>,
    },
    Match {
        subject: Expr,
        cases: Vec<MatchCase>,
    },
}

/// `except [type [as name]]: body`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handler {
    pub kind: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// `context [as target]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithItem {
    pub context: Expr,
    pub target: Option<Target>,
}

/// `name [as asname]` in an import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Pattern Matching
// ══════════════════════════════════════════════════════════════════════════════

/// `case pattern [if guard]: body`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// A `case` pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    /// `_`
    Wildcard,
    /// A bare name, which always matches and binds.
    Capture(String),
    /// A literal or dotted name compared with `==`.
    Value(Expr),
    /// `[p, q]` / `(p, q)`
    Sequence(Vec<Pattern>),
    /// `p | q`
    Or(Vec<Pattern>),
    /// `p as name`
    As(Box<Pattern>, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_names_in_order() {
        let params = Params {
            positional: vec![Param::new("a"), Param::new("b")],
            vararg: Some("rest".into()),
            kwonly: vec![Param::new("c")],
            kwarg: Some("kw".into()),
        };
        assert_eq!(params.names(), vec!["a", "b", "rest", "c", "kw"]);
    }

    #[test]
    fn test_call_helper_wraps_positional_args() {
        let span = Span::point(1, 1);
        let call = Expr::call(Expr::name("f", span), vec![Expr::str("x", span)], span);
        match call.kind {
            ExprKind::Call { args, .. } => {
                assert_eq!(args, vec![Arg::Positional(Expr::str("x", span))]);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_stmt_serde_round_trip() {
        let span = Span::new(2, 3, 2, 9);
        let stmt = Stmt::new(
            StmtKind::For {
                target: Target::Sequence(vec![Target::Name("k".into()), Target::Name("v".into())]),
                iter: Expr::name("items", span),
                body: vec![Stmt::new(StmtKind::Pass, span)],
                orelse: vec![],
            },
            span,
        );
        let json = serde_json::to_string(&stmt).unwrap();
        let back: Stmt = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stmt);
    }
}
