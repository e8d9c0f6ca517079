//! Tree-walking interpreter for prep script.
//!
//! Statements and expressions are evaluated directly from the AST. Script
//! exceptions travel as [`Unwind::Raise`] and are caught by `try`; everything
//! else ([`Unwind::Fatal`]) aborts the invocation.

use std::collections::HashMap;
use std::rc::Rc;

use prep_types::ast::{
    Arg, BinOp, Comprehension, Expr, ExprKind, Handler, LogicalOp, MatchCase, Param, Params, Pattern,
    Stmt, StmtKind, Target,
};

use crate::env::{Env, Scope};
use crate::error::{exception, raise, type_error, EvalError, Flow, Unwind};
use crate::exceptions::{ExcKind, Exception};
use crate::ops;
use crate::quote::QuotePair;
use crate::runtime::TemplateLoader;
use crate::value::{BoundMethod, CallArgs, Dict, Function, FunctionBody, ParamSpec, Value};

/// Default evaluation step budget.
pub const DEFAULT_STEP_LIMIT: u64 = 50_000_000;

/// Nested calls allowed before `RuntimeError` is raised.
pub const MAX_CALL_DEPTH: usize = 100;

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Exec {
    Next,
    Break,
    Continue,
    Return(Value),
}

/// Items of an iterable value.
pub fn iterate(value: &Value) -> Flow<Vec<Value>> {
    match value.iter_items() {
        Some(items) => Ok(items),
        None => type_error(format!("'{}' object is not iterable", value.type_name())),
    }
}

/// Script interpreter state shared by everything one invocation runs,
/// including included templates.
pub struct Interpreter {
    steps: u64,
    step_limit: u64,
    depth: usize,
    builtins: Rc<HashMap<String, Value>>,
    modules: HashMap<String, Value>,
    loader: Option<Rc<dyn TemplateLoader>>,
    /// Quote pairs of the templates currently executing, innermost last.
    quotes: Vec<QuotePair>,
    /// Exceptions being handled, for bare `raise`.
    handling: Vec<Rc<Exception>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_LIMIT)
    }
}

impl Interpreter {
    /// Create an interpreter with the given step budget.
    pub fn new(step_limit: u64) -> Self {
        Self {
            steps: 0,
            step_limit,
            depth: 0,
            builtins: Rc::new(crate::builtins::builtins()),
            modules: HashMap::new(),
            loader: None,
            quotes: Vec::new(),
            handling: Vec::new(),
        }
    }

    /// Resolve `include()` through `loader`.
    pub fn with_loader(mut self, loader: Rc<dyn TemplateLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn loader(&self) -> Option<Rc<dyn TemplateLoader>> {
        self.loader.clone()
    }

    /// Steps consumed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    fn tick(&mut self) -> Flow<()> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(Unwind::Fatal(EvalError::StepLimit(self.step_limit)));
        }
        Ok(())
    }

    // ── quote context ─────────────────────────────────────────────────────

    pub(crate) fn push_quotes(&mut self, pair: QuotePair) {
        self.quotes.push(pair);
    }

    /// The quote pair of the innermost executing template.
    pub fn current_quotes(&self) -> Option<&QuotePair> {
        self.quotes.last()
    }

    pub(crate) fn quote_depth(&self) -> usize {
        self.quotes.len()
    }

    pub(crate) fn restore_quotes(&mut self, depth: usize) {
        self.quotes.truncate(depth);
    }

    // ── names ─────────────────────────────────────────────────────────────

    /// Resolve `name` in `env`, then among the builtins.
    pub fn lookup(&self, env: &Env, name: &str) -> Flow<Value> {
        if let Some(value) = env.borrow().get(name) {
            return Ok(value);
        }
        match self.builtins.get(name) {
            Some(value) => Ok(value.clone()),
            None => raise(ExcKind::NameError, format!("name '{name}' is not defined")),
        }
    }

    fn import(&mut self, name: &str) -> Flow<Value> {
        if let Some(module) = self.modules.get(name) {
            return Ok(module.clone());
        }
        match crate::builtins::module(name) {
            Some(module) => {
                self.modules.insert(name.to_string(), module.clone());
                Ok(module)
            }
            None => raise(ExcKind::ImportError, format!("No module named '{name}'")),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    /// Execute statements in order until one transfers control.
    pub fn exec_block(&mut self, stmts: &[Stmt], env: &Env) -> Flow<Exec> {
        for stmt in stmts {
            match self.exec_stmt(stmt, env)? {
                Exec::Next => {}
                other => return Ok(other),
            }
        }
        Ok(Exec::Next)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Env) -> Flow<Exec> {
        self.tick()?;
        self.exec_kind(stmt, env).map_err(|unwind| {
            if let Unwind::Raise(exc) = &unwind {
                if exc.span.get().is_none() {
                    exc.span.set(Some(stmt.span));
                }
            }
            unwind
        })
    }

    fn exec_kind(&mut self, stmt: &Stmt, env: &Env) -> Flow<Exec> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, env)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, env)?;
                for target in targets {
                    self.assign(target, value.clone(), env)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value, env)?,
            StmtKind::Pass => {}
            StmtKind::Break => return Ok(Exec::Break),
            StmtKind::Continue => return Ok(Exec::Continue),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::None,
                };
                return Ok(Exec::Return(value));
            }
            StmtKind::Raise(None) => {
                return match self.handling.last() {
                    Some(exc) => Err(Unwind::Raise(exc.clone())),
                    None => raise(ExcKind::RuntimeError, "No active exception to reraise"),
                };
            }
            StmtKind::Raise(Some(expr)) => {
                let exc = match self.eval(expr, env)? {
                    Value::ExceptionType(kind) => Rc::new(Exception::new(kind, Vec::new())),
                    Value::Exception(exc) => exc,
                    _ => return type_error("exceptions must derive from BaseException"),
                };
                return Err(Unwind::Raise(exc));
            }
            StmtKind::Assert { test, msg } => {
                if !self.eval(test, env)?.is_truthy() {
                    let args = match msg {
                        Some(msg) => vec![self.eval(msg, env)?],
                        None => Vec::new(),
                    };
                    return Err(Unwind::Raise(Rc::new(Exception::new(
                        ExcKind::AssertionError,
                        args,
                    ))));
                }
            }
            StmtKind::Del(targets) => {
                for target in targets {
                    self.delete(target, env)?;
                }
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    if alias.name.contains('.') {
                        return raise(
                            ExcKind::ImportError,
                            format!("No module named '{}'", alias.name),
                        );
                    }
                    let module = self.import(&alias.name)?;
                    let bound = alias.asname.as_deref().unwrap_or(&alias.name);
                    env.borrow_mut().set(bound, module);
                }
            }
            StmtKind::ImportFrom { module, names } => {
                let Value::Module(m) = self.import(module)? else {
                    return raise(ExcKind::ImportError, format!("No module named '{module}'"));
                };
                for alias in names {
                    if alias.name == "*" {
                        for (name, value) in &m.attrs {
                            env.borrow_mut().set(name.as_str(), value.clone());
                        }
                        continue;
                    }
                    let Some(value) = m.attrs.get(&alias.name) else {
                        return raise(
                            ExcKind::ImportError,
                            format!("cannot import name '{}' from '{module}'", alias.name),
                        );
                    };
                    let bound = alias.asname.as_deref().unwrap_or(&alias.name);
                    env.borrow_mut().set(bound, value.clone());
                }
            }
            StmtKind::If { test, body, orelse } => {
                return if self.eval(test, env)?.is_truthy() {
                    self.exec_block(body, env)
                } else {
                    self.exec_block(orelse, env)
                };
            }
            StmtKind::While { test, body, orelse } => {
                let mut entered = false;
                loop {
                    self.tick()?;
                    if !self.eval(test, env)?.is_truthy() {
                        if entered {
                            break;
                        }
                        return self.exec_block(orelse, env);
                    }
                    entered = true;
                    match self.exec_block(body, env)? {
                        Exec::Break => break,
                        Exec::Return(value) => return Ok(Exec::Return(value)),
                        Exec::Next | Exec::Continue => {}
                    }
                }
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let items = iterate(&self.eval(iter, env)?)?;
                // `else` runs only when the body never ran.
                if items.is_empty() {
                    return self.exec_block(orelse, env);
                }
                for item in items {
                    self.tick()?;
                    self.assign(target, item, env)?;
                    match self.exec_block(body, env)? {
                        Exec::Break => break,
                        Exec::Return(value) => return Ok(Exec::Return(value)),
                        Exec::Next | Exec::Continue => {}
                    }
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.exec_try(body, handlers, orelse, finalbody, env),
            StmtKind::With { items, body } => {
                for item in items {
                    let value = self.eval(&item.context, env)?;
                    if let Some(target) = &item.target {
                        self.assign(target, value, env)?;
                    }
                }
                return self.exec_block(body, env);
            }
            StmtKind::FunctionDef { name, params, body } => {
                let body = FunctionBody::Block(body.clone().into());
                let function = self.make_function(name, params, body, env)?;
                env.borrow_mut().set(name.as_str(), function);
            }
            StmtKind::Match { subject, cases } => {
                let subject = self.eval(subject, env)?;
                return self.exec_match(&subject, cases, env);
            }
        }
        Ok(Exec::Next)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[Handler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
        env: &Env,
    ) -> Flow<Exec> {
        let outcome = match self.exec_block(body, env) {
            Err(Unwind::Raise(exc)) => self.handle(exc, handlers, env),
            Ok(Exec::Next) => self.exec_block(orelse, env),
            other => other,
        };
        if finalbody.is_empty() {
            return outcome;
        }
        match self.exec_block(finalbody, env)? {
            Exec::Next => outcome,
            redirect => Ok(redirect),
        }
    }

    fn handle(&mut self, exc: Rc<Exception>, handlers: &[Handler], env: &Env) -> Flow<Exec> {
        for handler in handlers {
            if let Some(kind) = &handler.kind {
                let class = self.eval(kind, env)?;
                if !exception_matches(&exc, &class)? {
                    continue;
                }
            }
            if let Some(name) = &handler.name {
                env.borrow_mut().set(name.as_str(), Value::Exception(exc.clone()));
            }
            self.handling.push(exc);
            let result = self.exec_block(&handler.body, env);
            self.handling.pop();
            return result;
        }
        Err(Unwind::Raise(exc))
    }

    fn exec_match(&mut self, subject: &Value, cases: &[MatchCase], env: &Env) -> Flow<Exec> {
        for case in cases {
            let mut bindings = Vec::new();
            if !self.match_pattern(&case.pattern, subject, env, &mut bindings)? {
                continue;
            }
            for (name, value) in bindings {
                env.borrow_mut().set(name, value);
            }
            if let Some(guard) = &case.guard {
                if !self.eval(guard, env)?.is_truthy() {
                    continue;
                }
            }
            return self.exec_block(&case.body, env);
        }
        Ok(Exec::Next)
    }

    fn match_pattern(
        &mut self,
        pattern: &Pattern,
        subject: &Value,
        env: &Env,
        bindings: &mut Vec<(String, Value)>,
    ) -> Flow<bool> {
        Ok(match pattern {
            Pattern::Wildcard => true,
            Pattern::Capture(name) => {
                bindings.push((name.clone(), subject.clone()));
                true
            }
            Pattern::Value(expr) => {
                let value = self.eval(expr, env)?;
                match value {
                    // Singletons match by identity, so `case True` skips 1.
                    Value::None | Value::Bool(_) => subject.is(&value),
                    _ => ops::values_equal(subject, &value),
                }
            }
            Pattern::Sequence(patterns) => {
                let items = match subject {
                    Value::List(items) => items.borrow().clone(),
                    Value::Tuple(items) => items.as_ref().clone(),
                    _ => return Ok(false),
                };
                if items.len() != patterns.len() {
                    return Ok(false);
                }
                for (pattern, item) in patterns.iter().zip(&items) {
                    if !self.match_pattern(pattern, item, env, bindings)? {
                        return Ok(false);
                    }
                }
                true
            }
            Pattern::Or(alternatives) => {
                for alternative in alternatives {
                    let mut trial = Vec::new();
                    if self.match_pattern(alternative, subject, env, &mut trial)? {
                        bindings.extend(trial);
                        return Ok(true);
                    }
                }
                false
            }
            Pattern::As(inner, name) => {
                if !self.match_pattern(inner, subject, env, bindings)? {
                    return Ok(false);
                }
                bindings.push((name.clone(), subject.clone()));
                true
            }
        })
    }

    // ── assignment ────────────────────────────────────────────────────────

    fn assign(&mut self, target: &Target, value: Value, env: &Env) -> Flow<()> {
        match target {
            Target::Name(name) => {
                env.borrow_mut().set(name.as_str(), value);
                Ok(())
            }
            Target::Sequence(targets) => {
                let items = iterate(&value)?;
                if items.len() != targets.len() {
                    let message = if items.len() > targets.len() {
                        format!("too many values to unpack (expected {})", targets.len())
                    } else {
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        )
                    };
                    return raise(ExcKind::ValueError, message);
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, env)?;
                }
                Ok(())
            }
            Target::Subscript { value: container, index } => {
                if matches!(index.kind, ExprKind::Slice { .. }) {
                    return type_error("slice assignment is not supported");
                }
                let container = self.eval(container, env)?;
                let index = self.eval(index, env)?;
                ops::set_item(&container, &index, value)
            }
            Target::Attribute { value: object, attr } => {
                let object = self.eval(object, env)?;
                raise(
                    ExcKind::AttributeError,
                    format!(
                        "'{}' object attribute '{attr}' is read-only",
                        object.type_name()
                    ),
                )
            }
        }
    }

    fn aug_assign(
        &mut self,
        target: &Target,
        op: BinOp,
        value: &Expr,
        env: &Env,
    ) -> Flow<()> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(env, name)?;
                let rhs = self.eval(value, env)?;
                let result = in_place(op, &current, &rhs)?;
                env.borrow_mut().set(name.as_str(), result);
                Ok(())
            }
            Target::Subscript { value: container, index } => {
                let container = self.eval(container, env)?;
                let index = self.eval(index, env)?;
                let current = ops::get_item(&container, &index)?;
                let rhs = self.eval(value, env)?;
                let result = in_place(op, &current, &rhs)?;
                ops::set_item(&container, &index, result)
            }
            Target::Attribute { .. } | Target::Sequence(_) => {
                let current = self.eval(&target_expr(target), env)?;
                let rhs = self.eval(value, env)?;
                let result = in_place(op, &current, &rhs)?;
                self.assign(target, result, env)
            }
        }
    }

    fn delete(&mut self, target: &Target, env: &Env) -> Flow<()> {
        match target {
            Target::Name(name) => match env.borrow_mut().remove(name) {
                Some(_) => Ok(()),
                None => raise(ExcKind::NameError, format!("name '{name}' is not defined")),
            },
            Target::Sequence(targets) => {
                for target in targets {
                    self.delete(target, env)?;
                }
                Ok(())
            }
            Target::Subscript { value, index } => {
                let container = self.eval(value, env)?;
                let index = self.eval(index, env)?;
                ops::del_item(&container, &index)
            }
            Target::Attribute { attr, .. } => {
                raise(ExcKind::AttributeError, format!("cannot delete attribute '{attr}'"))
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    /// Evaluate an expression.
    pub fn eval(&mut self, expr: &Expr, env: &Env) -> Flow<Value> {
        match &expr.kind {
            ExprKind::None => Ok(Value::None),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Int(n) => Ok(Value::Int(*n)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::Str(s) => Ok(Value::from(s.as_str())),
            ExprKind::Bytes(b) => Ok(Value::bytes(b.clone())),
            ExprKind::Name(name) => self.lookup(env, name),
            ExprKind::List(items) => Ok(Value::list(self.eval_all(items, env)?)),
            ExprKind::Tuple(items) => Ok(Value::tuple(self.eval_all(items, env)?)),
            ExprKind::Dict(pairs) => {
                let mut dict = Dict::new();
                for (key, value) in pairs {
                    let key = self.eval(key, env)?;
                    let value = self.eval(value, env)?;
                    if dict.insert(key.clone(), value).is_err() {
                        return ops::unhashable(&key);
                    }
                }
                Ok(Value::dict(dict))
            }
            ExprKind::ListComp { element, clauses } => {
                let scope = Scope::child(env);
                let mut out = Vec::new();
                self.comprehend(element, clauses, &scope, &mut out)?;
                Ok(Value::list(out))
            }
            ExprKind::Attribute { value, attr } => {
                let value = self.eval(value, env)?;
                get_attr(&value, attr)
            }
            ExprKind::Subscript { value, index } => {
                let value = self.eval(value, env)?;
                match &index.kind {
                    ExprKind::Slice { lower, upper, step } => {
                        let lower = self.eval_bound(lower.as_deref(), env)?;
                        let upper = self.eval_bound(upper.as_deref(), env)?;
                        let step = self.eval_bound(step.as_deref(), env)?;
                        ops::get_slice(&value, lower, upper, step)
                    }
                    _ => {
                        let index = self.eval(index, env)?;
                        ops::get_item(&value, &index)
                    }
                }
            }
            ExprKind::Slice { .. } => type_error("slices are only valid as subscripts"),
            ExprKind::Call { func, args } => {
                let func = self.eval(func, env)?;
                let args = self.eval_args(args, env)?;
                self.call_in(&func, args, env)
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                ops::binary(*op, &left, &right)
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.eval(operand, env)?;
                ops::unary(*op, &operand)
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.eval(left, env)?;
                match (op, left.is_truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval(right, env),
                }
            }
            ExprKind::Compare { left, ops: links } => {
                let mut lhs = self.eval(left, env)?;
                for (op, right) in links {
                    let rhs = self.eval(right, env)?;
                    if !ops::compare(*op, &lhs, &rhs)? {
                        return Ok(Value::Bool(false));
                    }
                    lhs = rhs;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval(test, env)?.is_truthy() {
                    self.eval(body, env)
                } else {
                    self.eval(orelse, env)
                }
            }
            ExprKind::Lambda { params, body } => {
                let body = FunctionBody::Expr(Rc::new(body.as_ref().clone()));
                self.make_function("<lambda>", params, body, env)
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr], env: &Env) -> Flow<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e, env)).collect()
    }

    fn eval_bound(&mut self, bound: Option<&Expr>, env: &Env) -> Flow<Option<i64>> {
        let Some(expr) = bound else {
            return Ok(None);
        };
        match self.eval(expr, env)? {
            Value::None => Ok(None),
            value => match value.as_int() {
                Some(n) => Ok(Some(n)),
                None => type_error("slice indices must be integers or None"),
            },
        }
    }

    fn comprehend(
        &mut self,
        element: &Expr,
        clauses: &[Comprehension],
        scope: &Env,
        out: &mut Vec<Value>,
    ) -> Flow<()> {
        let Some((clause, rest)) = clauses.split_first() else {
            out.push(self.eval(element, scope)?);
            return Ok(());
        };
        let items = iterate(&self.eval(&clause.iter, scope)?)?;
        'items: for item in items {
            self.tick()?;
            self.assign(&clause.target, item, scope)?;
            for condition in &clause.conditions {
                if !self.eval(condition, scope)?.is_truthy() {
                    continue 'items;
                }
            }
            self.comprehend(element, rest, scope, out)?;
        }
        Ok(())
    }

    fn eval_args(&mut self, args: &[Arg], env: &Env) -> Flow<CallArgs> {
        let mut call = CallArgs::default();
        for arg in args {
            match arg {
                Arg::Positional(expr) => call.positional.push(self.eval(expr, env)?),
                Arg::Keyword(name, expr) => {
                    let value = self.eval(expr, env)?;
                    call.keywords.push((name.clone(), value));
                }
                Arg::Star(expr) => {
                    let value = self.eval(expr, env)?;
                    call.positional.extend(iterate(&value)?);
                }
                Arg::DoubleStar(expr) => {
                    let Value::Dict(dict) = self.eval(expr, env)? else {
                        return type_error("argument after ** must be a mapping");
                    };
                    for (key, value) in dict.borrow().items() {
                        let Value::Str(key) = key else {
                            return type_error("keywords must be strings");
                        };
                        call.keywords.push((key.to_string(), value));
                    }
                }
            }
        }
        Ok(call)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Calls
    // ══════════════════════════════════════════════════════════════════════

    /// Evaluate parameter defaults and build a function closed over `env`.
    fn make_function(
        &mut self,
        name: &str,
        params: &Params,
        body: FunctionBody,
        env: &Env,
    ) -> Flow<Value> {
        let params = self.param_spec(params, env)?;
        Ok(Value::Function(Rc::new(Function {
            name: name.to_string(),
            params,
            body,
            closure: env.clone(),
        })))
    }

    pub(crate) fn param_spec(&mut self, params: &Params, env: &Env) -> Flow<ParamSpec> {
        Ok(ParamSpec {
            positional: self.eval_defaults(&params.positional, env)?,
            vararg: params.vararg.clone(),
            kwonly: self.eval_defaults(&params.kwonly, env)?,
            kwarg: params.kwarg.clone(),
        })
    }

    fn eval_defaults(&mut self, params: &[Param], env: &Env) -> Flow<Vec<(String, Option<Value>)>> {
        let mut out = Vec::with_capacity(params.len());
        for param in params {
            let default = match &param.default {
                Some(expr) => Some(self.eval(expr, env)?),
                None => None,
            };
            out.push((param.name.clone(), default));
        }
        Ok(out)
    }

    /// Call any callable value from host code.
    pub fn call_value(&mut self, func: &Value, args: CallArgs) -> Flow<Value> {
        let env = Scope::global();
        self.call_in(func, args, &env)
    }

    /// Call `func`; natives see the caller's scope `env`.
    pub fn call_in(&mut self, func: &Value, args: CallArgs, env: &Env) -> Flow<Value> {
        match func {
            Value::Function(function) => {
                let bindings = bind_args(&function.name, &function.params, args)
                    .map_err(|message| exception(ExcKind::TypeError, message))?;
                match &function.body {
                    FunctionBody::Block(body) => self.run_frame(&function.closure, bindings, body),
                    FunctionBody::Expr(expr) => {
                        self.enter()?;
                        let scope = bind_scope(&function.closure, bindings);
                        let result = self.eval(expr, &scope);
                        self.depth -= 1;
                        result
                    }
                }
            }
            Value::Native(native) => (native.func)(self, env, args),
            Value::Method(method) => {
                crate::methods::call_method(self, &method.receiver, &method.name, args)
            }
            Value::ExceptionType(kind) => {
                if !args.keywords.is_empty() {
                    return type_error(format!("{kind}() takes no keyword arguments"));
                }
                Ok(Value::Exception(Rc::new(Exception::new(*kind, args.positional))))
            }
            other => type_error(format!("'{}' object is not callable", other.type_name())),
        }
    }

    fn enter(&mut self) -> Flow<()> {
        if self.depth >= MAX_CALL_DEPTH {
            return raise(ExcKind::RuntimeError, "maximum recursion depth exceeded");
        }
        self.depth += 1;
        Ok(())
    }

    /// Run a function body in a fresh scope under `closure`.
    pub(crate) fn run_frame(
        &mut self,
        closure: &Env,
        bindings: Vec<(String, Value)>,
        body: &[Stmt],
    ) -> Flow<Value> {
        self.enter()?;
        let scope = bind_scope(closure, bindings);
        let result = self.exec_block(body, &scope);
        self.depth -= 1;
        match result? {
            Exec::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }
}

fn bind_scope(closure: &Env, bindings: Vec<(String, Value)>) -> Env {
    let scope = Scope::child(closure);
    {
        let mut vars = scope.borrow_mut();
        for (name, value) in bindings {
            vars.set(name, value);
        }
    }
    scope
}

fn exception_matches(exc: &Exception, class: &Value) -> Flow<bool> {
    match class {
        Value::ExceptionType(kind) => Ok(exc.kind.is_subclass_of(*kind)),
        Value::Tuple(classes) => {
            for class in classes.iter() {
                if exception_matches(exc, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => type_error("catching classes that do not inherit from BaseException is not allowed"),
    }
}

/// `current op= rhs`. Lists grow in place so aliases see the change.
fn in_place(op: BinOp, current: &Value, rhs: &Value) -> Flow<Value> {
    if let (BinOp::Add, Value::List(items)) = (op, current) {
        let extra = iterate(rhs)?;
        items.borrow_mut().extend(extra);
        return Ok(current.clone());
    }
    ops::binary(op, current, rhs)
}

/// Rebuild the expression a target reads from.
fn target_expr(target: &Target) -> Expr {
    let span = prep_types::Span::point(1, 1);
    match target {
        Target::Name(name) => Expr::name(name.as_str(), span),
        Target::Sequence(targets) => {
            Expr::new(ExprKind::Tuple(targets.iter().map(target_expr).collect()), span)
        }
        Target::Subscript { value, index } => Expr::new(
            ExprKind::Subscript {
                value: Box::new(value.clone()),
                index: Box::new(index.clone()),
            },
            span,
        ),
        Target::Attribute { value, attr } => Expr::attr(value.clone(), attr.as_str(), span),
    }
}

/// `value.attr`
pub fn get_attr(value: &Value, attr: &str) -> Flow<Value> {
    match value {
        Value::Module(module) => match module.attrs.get(attr) {
            Some(value) => Ok(value.clone()),
            None => raise(
                ExcKind::AttributeError,
                format!("module '{}' has no attribute '{attr}'", module.name),
            ),
        },
        Value::Exception(exc) if attr == "args" => Ok(Value::tuple(exc.args.clone())),
        Value::Function(function) if attr == "__name__" => Ok(Value::from(function.name.as_str())),
        Value::ExceptionType(kind) if attr == "__name__" => Ok(Value::from(kind.name())),
        _ if crate::methods::has_method(value, attr) => Ok(Value::Method(Rc::new(BoundMethod {
            receiver: value.clone(),
            name: attr.to_string(),
        }))),
        _ => raise(
            ExcKind::AttributeError,
            format!("'{}' object has no attribute '{attr}'", value.type_name()),
        ),
    }
}

/// Match call arguments to parameters. The error is the message of the
/// `TypeError` a script sees.
pub fn bind_args(
    name: &str,
    spec: &ParamSpec,
    args: CallArgs,
) -> Result<Vec<(String, Value)>, String> {
    let mut positional: Vec<Option<Value>> = vec![None; spec.positional.len()];
    let given = args.positional.len();
    let mut values = args.positional.into_iter();
    for slot in positional.iter_mut() {
        match values.next() {
            Some(value) => *slot = Some(value),
            None => break,
        }
    }
    let extra: Vec<Value> = values.collect();
    if !extra.is_empty() && spec.vararg.is_none() {
        let takes = spec.positional.len();
        return Err(format!(
            "{name}() takes {takes} positional argument{} but {given} {} given",
            if takes == 1 { "" } else { "s" },
            if given == 1 { "was" } else { "were" }
        ));
    }

    let mut kwonly: Vec<Option<Value>> = vec![None; spec.kwonly.len()];
    let mut extra_keywords = Dict::new();
    for (key, value) in args.keywords {
        let slot = match spec.positional.iter().position(|(n, _)| *n == key) {
            Some(i) => Some(&mut positional[i]),
            None => spec
                .kwonly
                .iter()
                .position(|(n, _)| *n == key)
                .map(|i| &mut kwonly[i]),
        };
        match slot {
            Some(Some(_)) => {
                return Err(format!("{name}() got multiple values for argument '{key}'"))
            }
            Some(slot) => *slot = Some(value),
            None if spec.kwarg.is_some() => {
                if extra_keywords.get_str(&key).is_some() {
                    return Err(format!("{name}() got multiple values for argument '{key}'"));
                }
                extra_keywords.insert_str(&key, value);
            }
            None => {
                return Err(format!(
                    "{name}() got an unexpected keyword argument '{key}'"
                ))
            }
        }
    }

    let mut bindings = Vec::new();
    let mut missing = Vec::new();
    for ((param, default), value) in spec.positional.iter().zip(positional) {
        match value.or_else(|| default.clone()) {
            Some(value) => bindings.push((param.clone(), value)),
            None => missing.push(param.as_str()),
        }
    }
    if !missing.is_empty() {
        return Err(missing_message(name, "positional", &missing));
    }
    if let Some(vararg) = &spec.vararg {
        bindings.push((vararg.clone(), Value::tuple(extra)));
    }
    for ((param, default), value) in spec.kwonly.iter().zip(kwonly) {
        match value.or_else(|| default.clone()) {
            Some(value) => bindings.push((param.clone(), value)),
            None => missing.push(param.as_str()),
        }
    }
    if !missing.is_empty() {
        return Err(missing_message(name, "keyword-only", &missing));
    }
    if let Some(kwarg) = &spec.kwarg {
        bindings.push((kwarg.clone(), Value::dict(extra_keywords)));
    }
    Ok(bindings)
}

fn missing_message(name: &str, what: &str, missing: &[&str]) -> String {
    let quoted: Vec<String> = missing.iter().map(|m| format!("'{m}'")).collect();
    let list = match quoted.split_last() {
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {last}", rest.join(", ")),
        None => String::new(),
    };
    format!(
        "{name}() missing {} required {what} argument{}: {list}",
        missing.len(),
        if missing.len() == 1 { "" } else { "s" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(positional: &[(&str, Option<Value>)]) -> ParamSpec {
        ParamSpec {
            positional: positional
                .iter()
                .map(|(n, d)| (n.to_string(), d.clone()))
                .collect(),
            ..ParamSpec::default()
        }
    }

    #[test]
    fn test_bind_positional_and_defaults() {
        let spec = spec(&[("a", None), ("b", Some(Value::Int(2)))]);
        let bound = bind_args("f", &spec, CallArgs::new(vec![Value::Int(1)])).unwrap();
        assert_eq!(
            bound,
            vec![("a".to_string(), Value::Int(1)), ("b".to_string(), Value::Int(2))]
        );
    }

    #[test]
    fn test_bind_errors() {
        let spec = spec(&[("a", None), ("b", None)]);
        assert_eq!(
            bind_args("f", &spec, CallArgs::default()).unwrap_err(),
            "f() missing 2 required positional arguments: 'a' and 'b'"
        );
        let too_many = CallArgs::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(
            bind_args("f", &spec, too_many).unwrap_err(),
            "f() takes 2 positional arguments but 3 were given"
        );
        let mut unexpected = CallArgs::new(vec![Value::Int(1), Value::Int(2)]);
        unexpected.keywords.push(("c".into(), Value::None));
        assert_eq!(
            bind_args("f", &spec, unexpected).unwrap_err(),
            "f() got an unexpected keyword argument 'c'"
        );
    }

    #[test]
    fn test_bind_catch_alls() {
        let spec = ParamSpec {
            positional: vec![("a".into(), None)],
            vararg: Some("rest".into()),
            kwonly: Vec::new(),
            kwarg: Some("kw".into()),
        };
        let mut args = CallArgs::new(vec![Value::Int(1), Value::Int(2)]);
        args.keywords.push(("x".into(), Value::Int(3)));
        let bound = bind_args("f", &spec, args).unwrap();
        assert_eq!(bound[1], ("rest".to_string(), Value::tuple(vec![Value::Int(2)])));
        let Value::Dict(kw) = &bound[2].1 else {
            panic!("expected dict");
        };
        assert_eq!(kw.borrow().get_str("x"), Some(Value::Int(3)));
    }

    #[test]
    fn test_step_limit_is_fatal() {
        let mut interp = Interpreter::new(3);
        let env = Scope::global();
        let span = prep_types::Span::point(1, 1);
        let body = vec![Stmt::new(StmtKind::Pass, span); 5];
        let Err(Unwind::Fatal(EvalError::StepLimit(3))) = interp.exec_block(&body, &env) else {
            panic!("expected the step limit to trip");
        };
    }
}
