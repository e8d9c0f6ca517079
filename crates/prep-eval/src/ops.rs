//! Operators, comparisons and subscripts.

use std::cmp::Ordering;
use std::rc::Rc;

use prep_types::ast::{BinOp, CmpOp, UnaryOp};

use crate::error::{raise, type_error, Flow, Unwind};
use crate::exceptions::{ExcKind, Exception};
use crate::format::percent_format;
use crate::value::{Dict, Value};

/// Largest sequence a repetition or `range` may build.
pub const MAX_SEQUENCE: usize = 10_000_000;

fn overflow() -> Unwind {
    crate::error::exception(ExcKind::OverflowError, "integer overflow")
}

fn unsupported<T>(op: &str, a: &Value, b: &Value) -> Flow<T> {
    type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        a.type_name(),
        b.type_name()
    ))
}

// ══════════════════════════════════════════════════════════════════════════════
// Equality and ordering
// ══════════════════════════════════════════════════════════════════════════════

/// `a == b`
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            Rc::ptr_eq(x, y) || seq_equal(&x.borrow(), &y.borrow())
        }
        (Value::Tuple(x), Value::Tuple(y)) => seq_equal(x, y),
        (Value::Dict(x), Value::Dict(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.items().iter().all(|(k, v)| match y.get(k) {
                    Ok(Some(other)) => values_equal(v, &other),
                    _ => false,
                })
        }
        (Value::Float(_), _) | (_, Value::Float(_)) => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        _ => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => x == y,
            _ => a.is(b),
        },
    }
}

fn seq_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
}

/// Total order used by `<`, `sorted`, `min` and `max`.
pub fn compare_values(a: &Value, b: &Value) -> Flow<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Ok(x.cmp(y)),
        (Value::List(x), Value::List(y)) => compare_seq(&x.borrow(), &y.borrow()),
        (Value::Tuple(x), Value::Tuple(y)) => compare_seq(x, y),
        _ => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => Ok(x.cmp(&y)),
            _ => match (a.as_float(), b.as_float()) {
                (Some(x), Some(y)) => Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
                _ => type_error(format!(
                    "'<' not supported between instances of '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                )),
            },
        },
    }
}

fn compare_seq(a: &[Value], b: &[Value]) -> Flow<Ordering> {
    for (x, y) in a.iter().zip(b) {
        if !values_equal(x, y) {
            return compare_values(x, y);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

/// One link of a comparison chain.
pub fn compare(op: CmpOp, a: &Value, b: &Value) -> Flow<bool> {
    Ok(match op {
        CmpOp::Eq => values_equal(a, b),
        CmpOp::NotEq => !values_equal(a, b),
        CmpOp::Is => a.is(b),
        CmpOp::IsNot => !a.is(b),
        CmpOp::In => contains(b, a)?,
        CmpOp::NotIn => !contains(b, a)?,
        CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
            // NaN compares false with everything.
            let is_nan = |v: &Value| matches!(v, Value::Float(f) if f.is_nan());
            if is_nan(a) || is_nan(b) {
                return Ok(false);
            }
            let ordering = compare_values(a, b).map_err(|_| {
                crate::error::exception(
                    ExcKind::TypeError,
                    format!(
                        "'{}' not supported between instances of '{}' and '{}'",
                        op.symbol(),
                        a.type_name(),
                        b.type_name()
                    ),
                )
            })?;
            match op {
                CmpOp::Lt => ordering == Ordering::Less,
                CmpOp::LtE => ordering != Ordering::Greater,
                CmpOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }
        }
    })
}

/// `item in container`
pub fn contains(container: &Value, item: &Value) -> Flow<bool> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_ref())),
            other => type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            )),
        },
        Value::Bytes(b) => match item {
            Value::Bytes(needle) => Ok(needle.is_empty()
                || b.windows(needle.len()).any(|w| w == needle.as_ref())),
            Value::Int(n) => Ok(b.iter().any(|&byte| byte as i64 == *n)),
            other => type_error(format!(
                "a bytes-like object is required, not '{}'",
                other.type_name()
            )),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| values_equal(v, item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Dict(dict) => dict
            .borrow()
            .contains(item)
            .or_else(|()| unhashable(item)),
        other => type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        )),
    }
}

pub fn unhashable<T>(value: &Value) -> Flow<T> {
    type_error(format!("unhashable type: '{}'", value.type_name()))
}

// ══════════════════════════════════════════════════════════════════════════════
// Arithmetic
// ══════════════════════════════════════════════════════════════════════════════

/// `a op b`
pub fn binary(op: BinOp, a: &Value, b: &Value) -> Flow<Value> {
    match op {
        BinOp::Add => add(a, b),
        BinOp::Sub => arith(op, a, b, i64::checked_sub, |x, y| x - y),
        BinOp::Mul => mul(a, b),
        BinOp::Div => {
            let (Some(x), Some(y)) = (a.as_float(), b.as_float()) else {
                return unsupported("/", a, b);
            };
            if y == 0.0 {
                return raise(ExcKind::ZeroDivisionError, "division by zero");
            }
            Ok(Value::Float(x / y))
        }
        BinOp::FloorDiv => {
            if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
                if y == 0 {
                    return raise(ExcKind::ZeroDivisionError, "integer division or modulo by zero");
                }
                if x == i64::MIN && y == -1 {
                    return Err(overflow());
                }
                return Ok(Value::Int(floor_div(x, y)));
            }
            let (Some(x), Some(y)) = (a.as_float(), b.as_float()) else {
                return unsupported("//", a, b);
            };
            if y == 0.0 {
                return raise(ExcKind::ZeroDivisionError, "float floor division by zero");
            }
            Ok(Value::Float((x / y).floor()))
        }
        BinOp::Mod => {
            if let Value::Str(template) = a {
                return percent_format(template, b).map(Value::from);
            }
            if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
                if y == 0 {
                    return raise(ExcKind::ZeroDivisionError, "integer division or modulo by zero");
                }
                let r = x.wrapping_rem(y);
                return Ok(Value::Int(if r != 0 && (r < 0) != (y < 0) { r + y } else { r }));
            }
            let (Some(x), Some(y)) = (a.as_float(), b.as_float()) else {
                return unsupported("%", a, b);
            };
            if y == 0.0 {
                return raise(ExcKind::ZeroDivisionError, "float modulo");
            }
            let r = x % y;
            Ok(Value::Float(if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r }))
        }
        BinOp::Pow => power(a, b),
    }
}

/// Floor division on integers that rounds toward negative infinity.
fn floor_div(x: i64, y: i64) -> i64 {
    let q = x / y;
    if (x % y != 0) && ((x < 0) != (y < 0)) {
        q - 1
    } else {
        q
    }
}

fn arith(
    op: BinOp,
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Flow<Value> {
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        return int_op(x, y).map(Value::Int).ok_or_else(overflow);
    }
    match (a.as_float(), b.as_float()) {
        (Some(x), Some(y)) => Ok(Value::Float(float_op(x, y))),
        _ => unsupported(op.symbol(), a, b),
    }
}

fn add(a: &Value, b: &Value) -> Flow<Value> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Value::from(format!("{x}{y}"))),
        (Value::Bytes(x), Value::Bytes(y)) => Ok(Value::bytes([x.as_ref(), y.as_ref()].concat())),
        (Value::List(x), Value::List(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (Value::Tuple(x), Value::Tuple(y)) => {
            Ok(Value::tuple(x.iter().chain(y.iter()).cloned().collect()))
        }
        (Value::Str(_), other) => type_error(format!(
            "can only concatenate str (not \"{}\") to str",
            other.type_name()
        )),
        _ => arith(BinOp::Add, a, b, i64::checked_add, |x, y| x + y),
    }
}

fn is_sequence(value: &Value) -> bool {
    matches!(
        value,
        Value::Str(_) | Value::Bytes(_) | Value::List(_) | Value::Tuple(_)
    )
}

fn repeat(seq: &Value, n: i64) -> Flow<Value> {
    let count = n.max(0) as usize;
    let len = match seq {
        Value::Str(s) => s.len(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        _ => 0,
    };
    if len.saturating_mul(count) > MAX_SEQUENCE {
        return raise(ExcKind::OverflowError, "repeated sequence is too long");
    }
    Ok(match seq {
        Value::Str(s) => Value::from(s.repeat(count)),
        Value::Bytes(b) => Value::bytes(b.repeat(count)),
        Value::List(items) => Value::list(repeated(&items.borrow(), count)),
        Value::Tuple(items) => Value::tuple(repeated(items, count)),
        other => other.clone(),
    })
}

fn repeated(items: &[Value], count: usize) -> Vec<Value> {
    (0..count).flat_map(|_| items.iter().cloned()).collect()
}

fn mul(a: &Value, b: &Value) -> Flow<Value> {
    if is_sequence(a) {
        if let Some(n) = b.as_int() {
            return repeat(a, n);
        }
    }
    if is_sequence(b) {
        if let Some(n) = a.as_int() {
            return repeat(b, n);
        }
    }
    arith(BinOp::Mul, a, b, i64::checked_mul, |x, y| x * y)
}

fn power(a: &Value, b: &Value) -> Flow<Value> {
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        if y >= 0 {
            let exp = u32::try_from(y).map_err(|_| overflow())?;
            return x.checked_pow(exp).map(Value::Int).ok_or_else(overflow);
        }
        if x == 0 {
            return raise(
                ExcKind::ZeroDivisionError,
                "0.0 cannot be raised to a negative power",
            );
        }
        return Ok(Value::Float((x as f64).powf(y as f64)));
    }
    match (a.as_float(), b.as_float()) {
        (Some(x), Some(y)) => {
            if x == 0.0 && y < 0.0 {
                return raise(
                    ExcKind::ZeroDivisionError,
                    "0.0 cannot be raised to a negative power",
                );
            }
            Ok(Value::Float(x.powf(y)))
        }
        _ => unsupported("**", a, b),
    }
}

/// `op operand`
pub fn unary(op: UnaryOp, operand: &Value) -> Flow<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::Neg => match operand {
            Value::Float(f) => Ok(Value::Float(-f)),
            other => match other.as_int() {
                Some(n) => n.checked_neg().map(Value::Int).ok_or_else(overflow),
                None => type_error(format!(
                    "bad operand type for unary -: '{}'",
                    other.type_name()
                )),
            },
        },
        UnaryOp::Pos => match operand {
            Value::Float(_) | Value::Int(_) => Ok(operand.clone()),
            Value::Bool(b) => Ok(Value::Int(*b as i64)),
            other => type_error(format!(
                "bad operand type for unary +: '{}'",
                other.type_name()
            )),
        },
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Subscripts
// ══════════════════════════════════════════════════════════════════════════════

/// Resolve a possibly negative index against `len`.
fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { index + len } else { index };
    (0..len).contains(&i).then_some(i as usize)
}

fn index_of(container: &Value, index: &Value) -> Flow<i64> {
    match index.as_int() {
        Some(i) => Ok(i),
        None => type_error(format!(
            "{} indices must be integers or slices, not {}",
            container.type_name(),
            index.type_name()
        )),
    }
}

pub fn key_error(key: &Value) -> Unwind {
    Unwind::Raise(Rc::new(Exception::new(ExcKind::KeyError, vec![key.clone()])))
}

/// `value[index]`
pub fn get_item(value: &Value, index: &Value) -> Flow<Value> {
    let out_of_range = |what: &str| raise(ExcKind::IndexError, format!("{what} index out of range"));
    match value {
        Value::Dict(dict) => match dict.borrow().get(index) {
            Ok(Some(v)) => Ok(v),
            Ok(None) => Err(key_error(index)),
            Err(()) => unhashable(index),
        },
        Value::List(items) => {
            let items = items.borrow();
            match normalize_index(index_of(value, index)?, items.len()) {
                Some(i) => Ok(items[i].clone()),
                None => out_of_range("list"),
            }
        }
        Value::Tuple(items) => match normalize_index(index_of(value, index)?, items.len()) {
            Some(i) => Ok(items[i].clone()),
            None => out_of_range("tuple"),
        },
        Value::Str(s) => {
            let i = index_of(value, index)?;
            let count = s.chars().count();
            match normalize_index(i, count).and_then(|i| s.chars().nth(i)) {
                Some(c) => Ok(Value::from(c.to_string())),
                None => out_of_range("string"),
            }
        }
        Value::Bytes(b) => match normalize_index(index_of(value, index)?, b.len()) {
            Some(i) => Ok(Value::Int(b[i] as i64)),
            None => out_of_range("index"),
        },
        Value::Exception(exc) => match normalize_index(index_of(value, index)?, exc.args.len()) {
            Some(i) => Ok(exc.args[i].clone()),
            None => out_of_range("tuple"),
        },
        other => type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        )),
    }
}

/// Positions selected by `[lower:upper:step]` on a sequence of `len`.
pub fn slice_indices(len: usize, lower: Option<i64>, upper: Option<i64>, step: Option<i64>) -> Flow<Vec<usize>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return raise(ExcKind::ValueError, "slice step cannot be zero");
    }
    let len = len as i64;
    let clamp = |bound: i64, low: i64, high: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(low, high)
    };
    let mut out = Vec::new();
    if step > 0 {
        let start = lower.map_or(0, |l| clamp(l, 0, len));
        let stop = upper.map_or(len, |u| clamp(u, 0, len));
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            i += step;
        }
    } else {
        let start = lower.map_or(len - 1, |l| clamp(l, -1, len - 1));
        let stop = upper.map_or(-1, |u| clamp(u, -1, len - 1));
        let mut i = start;
        while i > stop {
            out.push(i as usize);
            i += step;
        }
    }
    Ok(out)
}

/// `value[lower:upper:step]`
pub fn get_slice(value: &Value, lower: Option<i64>, upper: Option<i64>, step: Option<i64>) -> Flow<Value> {
    match value {
        Value::List(items) => {
            let items = items.borrow();
            let picked = slice_indices(items.len(), lower, upper, step)?;
            Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let picked = slice_indices(items.len(), lower, upper, step)?;
            Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = slice_indices(chars.len(), lower, upper, step)?;
            Ok(Value::from(picked.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        Value::Bytes(b) => {
            let picked = slice_indices(b.len(), lower, upper, step)?;
            Ok(Value::bytes(picked.into_iter().map(|i| b[i]).collect::<Vec<u8>>()))
        }
        other => type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        )),
    }
}

/// `value[index] = item`
pub fn set_item(value: &Value, index: &Value, item: Value) -> Flow<()> {
    match value {
        Value::Dict(dict) => dict
            .borrow_mut()
            .insert(index.clone(), item)
            .or_else(|()| unhashable(index)),
        Value::List(items) => {
            let i = index_of(value, index)?;
            let mut items = items.borrow_mut();
            match normalize_index(i, items.len()) {
                Some(i) => {
                    items[i] = item;
                    Ok(())
                }
                None => raise(ExcKind::IndexError, "list assignment index out of range"),
            }
        }
        other => type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        )),
    }
}

/// `del value[index]`
pub fn del_item(value: &Value, index: &Value) -> Flow<()> {
    match value {
        Value::Dict(dict) => match dict.borrow_mut().remove(index) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(key_error(index)),
            Err(()) => unhashable(index),
        },
        Value::List(items) => {
            let i = index_of(value, index)?;
            let mut items = items.borrow_mut();
            match normalize_index(i, items.len()) {
                Some(i) => {
                    items.remove(i);
                    Ok(())
                }
                None => raise(ExcKind::IndexError, "list assignment index out of range"),
            }
        }
        other => type_error(format!(
            "'{}' object doesn't support item deletion",
            other.type_name()
        )),
    }
}

/// Build a dictionary from a mapping or an iterable of pairs.
pub fn dict_from(value: &Value) -> Flow<Dict> {
    if let Value::Dict(dict) = value {
        return Ok(dict.borrow().clone());
    }
    let Some(items) = value.iter_items() else {
        return type_error(format!("'{}' object is not iterable", value.type_name()));
    };
    let mut dict = Dict::new();
    for (n, item) in items.iter().enumerate() {
        match item.iter_items().as_deref() {
            Some([k, v]) => dict.insert(k.clone(), v.clone()).or_else(|()| unhashable(k))?,
            _ => {
                return raise(
                    ExcKind::ValueError,
                    format!("dictionary update sequence element #{n} has wrong length"),
                )
            }
        }
    }
    Ok(dict)
}
