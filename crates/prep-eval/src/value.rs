//! Runtime values.
//!
//! Containers are reference counted with interior mutability so that
//! aliasing behaves like the script language expects: appending to a list
//! through one name is visible through every other name bound to it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use prep_types::ast::{Expr, Stmt};

use crate::env::Env;
use crate::error::Flow;
use crate::exceptions::{ExcKind, Exception};
use crate::interpreter::Interpreter;
use crate::whitespace::WsController;

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<Dict>>),
    Function(Rc<Function>),
    Native(Rc<Native>),
    Method(Rc<BoundMethod>),
    Module(Rc<Module>),
    ExceptionType(ExcKind),
    Exception(Rc<Exception>),
    Controller(Rc<RefCell<WsController>>),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Rc::new(items))
    }

    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(data.into().into())
    }

    pub fn dict(dict: Dict) -> Self {
        Self::Dict(Rc::new(RefCell::new(dict)))
    }

    /// A native function value.
    pub fn native(
        name: impl Into<String>,
        func: impl Fn(&mut Interpreter, &Env, CallArgs) -> Flow<Value> + 'static,
    ) -> Self {
        Self::Native(Rc::new(Native {
            name: name.into(),
            func: Box::new(func),
        }))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Function(_) => "function",
            Self::Native(_) => "builtin_function_or_method",
            Self::Method(_) => "method",
            Self::Module(_) => "module",
            Self::ExceptionType(_) => "type",
            Self::Exception(e) => e.kind.name(),
            Self::Controller(_) => "wsscontroller",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Bytes(b) => !b.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::Dict(d) => !d.borrow().is_empty(),
            _ => true,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Self::Function(_) | Self::Native(_) | Self::Method(_) | Self::ExceptionType(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value of an `int` or `bool`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Numeric value of an `int`, `bool` or `float`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            other => other.as_int().map(|n| n as f64),
        }
    }

    /// Identity comparison (`is`).
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => Rc::ptr_eq(a, b),
            (Self::Module(a), Self::Module(b)) => Rc::ptr_eq(a, b),
            (Self::ExceptionType(a), Self::ExceptionType(b)) => a == b,
            (Self::Exception(a), Self::Exception(b)) => Rc::ptr_eq(a, b),
            (Self::Controller(a), Self::Controller(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Items of a sequence-like value, or `None` if it is not iterable.
    pub fn iter_items(&self) -> Option<Vec<Value>> {
        Some(match self {
            Self::List(items) => items.borrow().clone(),
            Self::Tuple(items) => items.as_ref().clone(),
            Self::Dict(d) => d.borrow().keys(),
            Self::Str(s) => s.chars().map(|c| Value::from(c.to_string())).collect(),
            Self::Bytes(b) => b.iter().map(|&byte| Value::Int(byte as i64)).collect(),
            _ => return None,
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        crate::ops::values_equal(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::format::repr(self))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::list(items)
    }
}

impl From<Dict> for Value {
    fn from(dict: Dict) -> Self {
        Self::dict(dict)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Dictionaries
// ══════════════════════════════════════════════════════════════════════════════

/// A hashable projection of a value, used as a dictionary key.
///
/// Numbers that compare equal share a key, so `d[1]`, `d[1.0]` and
/// `d[True]` address the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    Tuple(Vec<Key>),
    ExceptionType(ExcKind),
}

impl Key {
    /// The key for `value`, or `None` if the value is unhashable.
    pub fn of(value: &Value) -> Option<Key> {
        Some(match value {
            Value::None => Key::None,
            Value::Bool(b) => Key::Int(*b as i64),
            Value::Int(n) => Key::Int(*n),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Key::Int(*f as i64),
            Value::Float(f) => Key::Float(f.to_bits()),
            Value::Str(s) => Key::Str(s.clone()),
            Value::Bytes(b) => Key::Bytes(b.clone()),
            Value::Tuple(items) => Key::Tuple(items.iter().map(Key::of).collect::<Option<_>>()?),
            Value::ExceptionType(kind) => Key::ExceptionType(*kind),
            _ => return None,
        })
    }
}

/// An insertion-ordered dictionary.
#[derive(Clone, Default)]
pub struct Dict {
    entries: IndexMap<Key, (Value, Value)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `key`. `Err(())` means the key is unhashable.
    pub fn get(&self, key: &Value) -> Result<Option<Value>, ()> {
        let key = Key::of(key).ok_or(())?;
        Ok(self.entries.get(&key).map(|(_, v)| v.clone()))
    }

    pub fn get_str(&self, key: &str) -> Option<Value> {
        self.entries.get(&Key::Str(key.into())).map(|(_, v)| v.clone())
    }

    /// Insert or replace. `Err(())` means the key is unhashable.
    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), ()> {
        let hashed = Key::of(&key).ok_or(())?;
        match self.entries.get_mut(&hashed) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(hashed, (key, value));
            }
        }
        Ok(())
    }

    pub fn insert_str(&mut self, key: &str, value: Value) {
        self.entries.insert(Key::Str(key.into()), (Value::from(key), value));
    }

    /// Remove `key`, keeping the order of the remaining entries.
    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>, ()> {
        let key = Key::of(key).ok_or(())?;
        Ok(self.entries.shift_remove(&key).map(|(_, v)| v))
    }

    pub fn contains(&self, key: &Value) -> Result<bool, ()> {
        let key = Key::of(key).ok_or(())?;
        Ok(self.entries.contains_key(&key))
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.values().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.values().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.entries.values().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl FromIterator<(Value, Value)> for Dict {
    /// Unhashable keys are skipped.
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut dict = Dict::new();
        for (k, v) in iter {
            let _ = dict.insert(k, v);
        }
        dict
    }
}

impl<'a> FromIterator<(&'a str, Value)> for Dict {
    fn from_iter<I: IntoIterator<Item = (&'a str, Value)>>(iter: I) -> Self {
        let mut dict = Dict::new();
        for (k, v) in iter {
            dict.insert_str(k, v);
        }
        dict
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Callables
// ══════════════════════════════════════════════════════════════════════════════

/// Evaluated parameter list: names with default values.
#[derive(Debug, Clone, Default)]
pub struct ParamSpec {
    pub positional: Vec<(String, Option<Value>)>,
    pub vararg: Option<String>,
    pub kwonly: Vec<(String, Option<Value>)>,
    pub kwarg: Option<String>,
}

/// What a script function runs.
#[derive(Debug, Clone)]
pub enum FunctionBody {
    Block(Rc<[Stmt]>),
    /// A lambda.
    Expr(Rc<Expr>),
}

/// A script function or lambda closed over its defining scope.
pub struct Function {
    pub name: String,
    pub params: ParamSpec,
    pub body: FunctionBody,
    pub closure: Env,
}

/// Signature of native functions.
pub type NativeFn = dyn Fn(&mut Interpreter, &Env, CallArgs) -> Flow<Value>;

/// A function implemented in Rust.
pub struct Native {
    pub name: String,
    pub func: Box<NativeFn>,
}

/// `receiver.name` looked up on a built-in type.
pub struct BoundMethod {
    pub receiver: Value,
    pub name: String,
}

/// An importable module.
pub struct Module {
    pub name: String,
    pub attrs: IndexMap<String, Value>,
}

/// Arguments of a call, after `*` and `**` expansion.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    /// Remove and return keyword `name`.
    pub fn take_keyword(&mut self, name: &str) -> Option<Value> {
        let index = self.keywords.iter().position(|(k, _)| k == name)?;
        Some(self.keywords.remove(index).1)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name)
    }
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<built-in function {}>", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_keys_unify() {
        let mut dict = Dict::new();
        dict.insert(Value::Int(1), Value::from("int")).unwrap();
        dict.insert(Value::Float(1.0), Value::from("float")).unwrap();
        dict.insert(Value::Bool(true), Value::from("bool")).unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get(&Value::Int(1)).unwrap(), Some(Value::from("bool")));
        // the first key written is kept
        assert!(matches!(dict.keys()[0], Value::Int(1)));
    }

    #[test]
    fn test_unhashable_key() {
        let mut dict = Dict::new();
        assert!(dict.insert(Value::list(vec![]), Value::None).is_err());
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut dict: Dict = [("a", Value::Int(1)), ("b", Value::Int(2)), ("c", Value::Int(3))]
            .into_iter()
            .collect();
        dict.remove(&Value::from("a")).unwrap();
        assert_eq!(dict.keys(), vec![Value::from("b"), Value::from("c")]);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::list(vec![Value::None]).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
    }
}
