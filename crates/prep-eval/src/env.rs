//! Lexical scopes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

/// A shared handle to a scope. Closures keep their defining scope alive.
pub type Env = Rc<RefCell<Scope>>;

/// One level of name bindings.
///
/// Assignment always binds in the scope it runs in; lookup walks outward
/// through the enclosing scopes.
#[derive(Default)]
pub struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<Env>,
}

impl Scope {
    /// A top-level scope.
    pub fn global() -> Env {
        Rc::new(RefCell::new(Scope::default()))
    }

    /// A scope nested in `parent`.
    pub fn child(parent: &Env) -> Env {
        Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: Some(parent.clone()),
        }))
    }

    /// Bind `name` in this scope.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Remove a binding from this scope only.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    /// Look `name` up here and in the enclosing scopes.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.get(name) {
            return Some(value.clone());
        }
        let mut scope = self.parent.clone();
        while let Some(env) = scope {
            let env = env.borrow();
            if let Some(value) = env.vars.get(name) {
                return Some(value.clone());
            }
            scope = env.parent.clone();
        }
        None
    }

    /// Look `name` up in this scope only.
    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }
}
