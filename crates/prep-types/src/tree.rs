//! The template statement tree.
//!
//! Built by the template parser from the flat tag stream, consumed by the
//! code generator. Directive headers and raw statements are already parsed
//! into script [`ast`](crate::ast) nodes; the tree only records how the
//! directives nest around literal text.
//!
//! Bodies are never empty: a directive with nothing inside it holds a single
//! [`NodeKind::Pass`].

use crate::ast::{Expr, Params, Pattern, Stmt, Target, WithItem};
use crate::Span;
use serde::{Deserialize, Serialize};

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Present when the template opens with `{{def(...)}}`.
    pub signature: Option<Signature>,
    pub body: Vec<Node>,
}

impl Template {
    pub fn is_callable(&self) -> bool {
        self.signature.is_some()
    }
}

/// The parameter list of a callable template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub params: Params,
    pub span: Span,
}

/// A spanned tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn pass(span: Span) -> Self {
        Self::new(NodeKind::Pass, span)
    }
}

/// Whitespace controller directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WsDirective {
    /// `{{.dnl}}`: drop leading whitespace of the next literal through its
    /// first newline.
    Dnl,
    /// `{{.dws}}`: drop all leading whitespace of the next literal.
    Dws,
}

/// Tree node variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Literal text, already unescaped.
    Literal(String),
    /// `{{expr}}` or `{{eval}}expr{{endeval}}`
    Write(Expr),
    Whitespace(WsDirective),
    /// `if`/`elif` branches in order, then the optional `else` body.
    If {
        branches: Vec<Branch>,
        orelse: Option<Vec<Node>>,
    },
    While {
        test: Expr,
        body: Vec<Node>,
        orelse: Option<Vec<Node>>,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Node>,
        orelse: Option<Vec<Node>>,
    },
    Try {
        body: Vec<Node>,
        handlers: Vec<ExceptClause>,
        orelse: Option<Vec<Node>>,
        finalbody: Option<Vec<Node>>,
    },
    With { items: Vec<WithItem>, body: Vec<Node> },
    /// Statements passed straight through: `import`, `from`, `assert`,
    /// `raise`, `break`, `continue`, `return` and `script` blocks.
    Raw(Vec<Stmt>),
    /// `{{def name(params)}}...{{enddef}}`
    Subblock {
        name: String,
        params: Params,
        body: Vec<Node>,
    },
    Match {
        subject: Expr,
        cases: Vec<CaseBlock>,
    },
    Pass,
}

/// One `if`/`elif` arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub test: Expr,
    pub body: Vec<Node>,
    pub span: Span,
}

/// One `except` clause of a template `try`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptClause {
    pub kind: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Node>,
    pub span: Span,
}

/// One `case` of a template `match`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBlock {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Vec<Node>,
    pub span: Span,
}

/// Visit every node of a body depth-first, parents before children.
pub fn walk<'a>(nodes: &'a [Node], visit: &mut dyn FnMut(&'a Node)) {
    for node in nodes {
        visit(node);
        match &node.kind {
            NodeKind::If { branches, orelse } => {
                for b in branches {
                    walk(&b.body, visit);
                }
                if let Some(body) = orelse {
                    walk(body, visit);
                }
            }
            NodeKind::While { body, orelse, .. } | NodeKind::For { body, orelse, .. } => {
                walk(body, visit);
                if let Some(body) = orelse {
                    walk(body, visit);
                }
            }
            NodeKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                walk(body, visit);
                for h in handlers {
                    walk(&h.body, visit);
                }
                for body in [orelse, finalbody].into_iter().flatten() {
                    walk(body, visit);
                }
            }
            NodeKind::With { body, .. } | NodeKind::Subblock { body, .. } => walk(body, visit),
            NodeKind::Match { cases, .. } => {
                for c in cases {
                    walk(&c.body, visit);
                }
            }
            NodeKind::Literal(_)
            | NodeKind::Write(_)
            | NodeKind::Whitespace(_)
            | NodeKind::Raw(_)
            | NodeKind::Pass => {}
        }
    }
}
