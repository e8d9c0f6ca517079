//! Lowering of the template statement tree.
//!
//! Orchestrates code generation:
//! 1. Check the signature and sub-block names against the generated names
//! 2. Emit the preamble for the template kind
//! 3. Translate the body node by node
//! 4. Emit the epilogue (callable templates only)

use prep_types::ast::{Handler, MatchCase, Params, Stmt, StmtKind};
use prep_types::procedure::names;
use prep_types::tree::{Node, NodeKind, Template, WsDirective};
use prep_types::{Procedure, ProcedureKind, Span};

use crate::error::{CodegenError, CodegenResult};
use crate::preamble;

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// Code generation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Logical name recorded on the procedure.
    pub name: String,
    /// The template source was supplied as bytes.
    pub bytes: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            name: "<template>".into(),
            bytes: false,
        }
    }
}

/// Names the preamble binds; user code may not declare them.
const GENERATED: &[&str] = &[
    names::WRITE,
    names::SWRITE,
    names::WSS,
    names::QFUNC,
    names::LQFUNC,
    names::QUOTE_OVERRIDE,
    names::LQUOTE_OVERRIDE,
    names::OUT,
];

/// Lower a parsed template into a [`Procedure`].
pub fn generate(template: &Template, options: &CodegenOptions) -> CodegenResult<Procedure> {
    let mut generator = Generator {
        callable: template.is_callable(),
        bytes: options.bytes,
        tdef_depth: 0,
    };
    let first = Span::point(1, 1);
    let last = template
        .body
        .last()
        .map(|n| Span::point(n.span.end_line, n.span.end_col))
        .unwrap_or(first);

    let (kind, mut body) = match &template.signature {
        Some(signature) => {
            let mut params = signature.params.clone();
            check_params(&params, signature.span)?;
            let (catch_all, added) = match &params.kwarg {
                Some(kwarg) => (kwarg.clone(), false),
                None => {
                    let kwarg = catch_all_name(&params);
                    params.kwarg = Some(kwarg.clone());
                    (kwarg, true)
                }
            };
            let preamble = preamble::callable(&catch_all, added, options.bytes, signature.span);
            (ProcedureKind::Callable { params }, preamble)
        }
        None => (ProcedureKind::Plain, preamble::plain(options.bytes, first)),
    };

    body.extend(generator.lower_body(&template.body)?);
    if generator.callable {
        body.push(preamble::epilogue(options.bytes, last));
    }

    Ok(Procedure {
        name: options.name.clone(),
        kind,
        body,
        bytes: options.bytes,
    })
}

fn check_name(name: &str, span: Span) -> CodegenResult<()> {
    if GENERATED.contains(&name) {
        return Err(CodegenError::ReservedName {
            name: name.to_string(),
            span,
        });
    }
    Ok(())
}

fn check_params(params: &Params, span: Span) -> CodegenResult<()> {
    params.names().into_iter().try_for_each(|name| check_name(name, span))
}

/// A catch-all keyword parameter name that does not clash with `params`.
fn catch_all_name(params: &Params) -> String {
    let taken = params.names();
    let mut name = names::KWDS.to_string();
    while taken.contains(&name.as_str()) {
        name.insert(0, '_');
    }
    name
}

// ══════════════════════════════════════════════════════════════════════════════
// Generator
// ══════════════════════════════════════════════════════════════════════════════

struct Generator {
    callable: bool,
    bytes: bool,
    /// Enclosing sub-blocks; a bare `return` only ends the template outside
    /// of them.
    tdef_depth: u32,
}

impl Generator {
    fn lower_body(&mut self, nodes: &[Node]) -> CodegenResult<Vec<Stmt>> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            self.lower_node(node, &mut out)?;
        }
        Ok(out)
    }

    fn lower_optional(&mut self, nodes: &Option<Vec<Node>>) -> CodegenResult<Vec<Stmt>> {
        match nodes {
            Some(nodes) => self.lower_body(nodes),
            None => Ok(Vec::new()),
        }
    }

    fn lower_node(&mut self, node: &Node, out: &mut Vec<Stmt>) -> CodegenResult<()> {
        let span = node.span;
        match &node.kind {
            NodeKind::Literal(text) => out.push(preamble::write_literal(text, span)),
            NodeKind::Write(expr) => out.push(preamble::write_expr(expr.clone(), span)),
            NodeKind::Whitespace(directive) => {
                let op = match directive {
                    WsDirective::Dnl => "dnl",
                    WsDirective::Dws => "dws",
                };
                out.push(preamble::whitespace(op, span));
            }
            NodeKind::If { branches, orelse } => {
                // Build the chain inside out: each `elif` nests in the
                // previous branch's else.
                let mut tail = self.lower_optional(orelse)?;
                for branch in branches.iter().rev() {
                    let body = self.lower_body(&branch.body)?;
                    let stmt = Stmt::new(
                        StmtKind::If {
                            test: branch.test.clone(),
                            body,
                            orelse: tail,
                        },
                        branch.span,
                    );
                    tail = vec![stmt];
                }
                if let Some(mut stmt) = tail.pop() {
                    stmt.span = span;
                    out.push(stmt);
                }
            }
            NodeKind::While { test, body, orelse } => {
                let kind = StmtKind::While {
                    test: test.clone(),
                    body: self.lower_body(body)?,
                    orelse: self.lower_optional(orelse)?,
                };
                out.push(Stmt::new(kind, span));
            }
            NodeKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let kind = StmtKind::For {
                    target: target.clone(),
                    iter: iter.clone(),
                    body: self.lower_body(body)?,
                    orelse: self.lower_optional(orelse)?,
                };
                out.push(Stmt::new(kind, span));
            }
            NodeKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                let body = self.lower_body(body)?;
                let handlers = handlers
                    .iter()
                    .map(|h| {
                        Ok(Handler {
                            kind: h.kind.clone(),
                            name: h.name.clone(),
                            body: self.lower_body(&h.body)?,
                            span: h.span,
                        })
                    })
                    .collect::<CodegenResult<Vec<_>>>()?;
                let kind = StmtKind::Try {
                    body,
                    handlers,
                    orelse: self.lower_optional(orelse)?,
                    finalbody: self.lower_optional(finalbody)?,
                };
                out.push(Stmt::new(kind, span));
            }
            NodeKind::With { items, body } => {
                let kind = StmtKind::With {
                    items: items.clone(),
                    body: self.lower_body(body)?,
                };
                out.push(Stmt::new(kind, span));
            }
            NodeKind::Raw(stmts) => {
                let mut stmts = stmts.clone();
                if self.callable && self.tdef_depth == 0 {
                    rewrite_bare_returns(&mut stmts, self.bytes);
                }
                out.extend(stmts);
            }
            NodeKind::Subblock { name, params, body } => {
                check_name(name, span)?;
                check_params(params, span)?;
                self.tdef_depth += 1;
                let lowered = self.lower_body(body);
                self.tdef_depth -= 1;
                let mut body = lowered?;
                body.push(preamble::empty_return(span));
                let kind = StmtKind::FunctionDef {
                    name: name.clone(),
                    params: params.clone(),
                    body,
                };
                out.push(Stmt::new(kind, span));
            }
            NodeKind::Match { subject, cases } => {
                let cases = cases
                    .iter()
                    .map(|c| {
                        Ok(MatchCase {
                            pattern: c.pattern.clone(),
                            guard: c.guard.clone(),
                            body: self.lower_body(&c.body)?,
                            span: c.span,
                        })
                    })
                    .collect::<CodegenResult<Vec<_>>>()?;
                let kind = StmtKind::Match {
                    subject: subject.clone(),
                    cases,
                };
                out.push(Stmt::new(kind, span));
            }
            NodeKind::Pass => out.push(Stmt::new(StmtKind::Pass, span)),
        }
        Ok(())
    }
}

/// Make every bare `return` of a callable template return the output
/// accumulated so far. Nested function bodies keep their own returns.
fn rewrite_bare_returns(stmts: &mut [Stmt], bytes: bool) {
    for stmt in stmts {
        let span = stmt.span;
        match &mut stmt.kind {
            StmtKind::Return(value @ None) => {
                *value = Some(preamble::joined_output(bytes, span));
            }
            StmtKind::If { body, orelse, .. }
            | StmtKind::While { body, orelse, .. }
            | StmtKind::For { body, orelse, .. } => {
                rewrite_bare_returns(body, bytes);
                rewrite_bare_returns(orelse, bytes);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                rewrite_bare_returns(body, bytes);
                for handler in handlers {
                    rewrite_bare_returns(&mut handler.body, bytes);
                }
                rewrite_bare_returns(orelse, bytes);
                rewrite_bare_returns(finalbody, bytes);
            }
            StmtKind::With { body, .. } => rewrite_bare_returns(body, bytes),
            StmtKind::Match { cases, .. } => {
                for case in cases {
                    rewrite_bare_returns(&mut case.body, bytes);
                }
            }
            _ => {}
        }
    }
}
