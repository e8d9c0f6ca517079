//! Built-in functions, the hooks generated code calls, and the `math`
//! module.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use prep_lexer::token::is_identifier;
use prep_types::ast::BinOp;
use prep_types::procedure::names;

use crate::env::Env;
use crate::error::{raise, type_error, EvalError, Flow, Unwind};
use crate::exceptions::ExcKind;
use crate::format::{repr, to_str};
use crate::interpreter::{iterate, Interpreter};
use crate::ops::{self, MAX_SEQUENCE};
use crate::value::{CallArgs, Dict, Module, Value};
use crate::whitespace::WsController;

// ══════════════════════════════════════════════════════════════════════════════
// Argument helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Check the positional count and reject keywords.
pub(crate) fn arity(name: &str, args: &CallArgs, min: usize, max: usize) -> Flow<()> {
    if let Some((key, _)) = args.keywords.first() {
        return type_error(format!("{name}() got an unexpected keyword argument '{key}'"));
    }
    let given = args.positional.len();
    if given < min || given > max {
        let expected = if min == max {
            format!("exactly {min}")
        } else if given < min {
            format!("at least {min}")
        } else {
            format!("at most {max}")
        };
        return type_error(format!(
            "{name}() takes {expected} argument{} ({given} given)",
            if min == max && min == 1 { "" } else { "s" }
        ));
    }
    Ok(())
}

pub(crate) fn int_arg(name: &str, value: &Value) -> Flow<i64> {
    match value.as_int() {
        Some(n) => Ok(n),
        None => type_error(format!(
            "{name}() expected an integer, got '{}'",
            value.type_name()
        )),
    }
}

pub(crate) fn str_arg<'a>(name: &str, value: &'a Value) -> Flow<&'a str> {
    match value {
        Value::Str(s) => Ok(s),
        other => type_error(format!(
            "{name}() argument must be str, not {}",
            other.type_name()
        )),
    }
}

/// Sort `items`, comparing `keys` when given.
pub(crate) fn sort_values(items: &mut Vec<Value>, keys: Option<Vec<Value>>, reverse: bool) -> Flow<()> {
    let keys = keys.unwrap_or_else(|| items.clone());
    let mut order: Vec<usize> = (0..items.len()).collect();
    let mut failure = None;
    order.sort_by(|&a, &b| match ops::compare_values(&keys[a], &keys[b]) {
        Ok(ordering) => {
            if reverse {
                ordering.reverse()
            } else {
                ordering
            }
        }
        Err(err) => {
            failure.get_or_insert(err);
            Ordering::Equal
        }
    });
    if let Some(err) = failure {
        return Err(err);
    }
    let sorted: Vec<Value> = order.into_iter().map(|i| items[i].clone()).collect();
    *items = sorted;
    Ok(())
}

/// Call `key` on every item.
pub(crate) fn keys_for(interp: &mut Interpreter, key: &Value, items: &[Value]) -> Flow<Option<Vec<Value>>> {
    if key.is_none() {
        return Ok(None);
    }
    items
        .iter()
        .map(|item| interp.call_value(key, CallArgs::new(vec![item.clone()])))
        .collect::<Flow<Vec<_>>>()
        .map(Some)
}

fn extremum(interp: &mut Interpreter, name: &str, mut args: CallArgs, want: Ordering) -> Flow<Value> {
    let key = args.take_keyword("key").unwrap_or(Value::None);
    let default = args.take_keyword("default");
    arity(name, &args, 1, usize::MAX)?;
    let items = if args.positional.len() == 1 {
        iterate(&args.positional[0])?
    } else {
        args.positional
    };
    if items.is_empty() {
        return match default {
            Some(value) => Ok(value),
            None => raise(ExcKind::ValueError, format!("{name}() arg is an empty sequence")),
        };
    }
    let keys = keys_for(interp, &key, &items)?.unwrap_or_else(|| items.clone());
    let mut best = 0;
    for i in 1..items.len() {
        if ops::compare_values(&keys[i], &keys[best])? == want {
            best = i;
        }
    }
    Ok(items[best].clone())
}

fn parse_int(text: &str, base: u32) -> Option<i64> {
    let cleaned = text.trim().replace('_', "");
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest.to_string()),
        None => (false, cleaned.trim_start_matches('+').to_string()),
    };
    let digits = match base {
        16 => digits.trim_start_matches("0x").trim_start_matches("0X").to_string(),
        8 => digits.trim_start_matches("0o").trim_start_matches("0O").to_string(),
        2 => digits.trim_start_matches("0b").trim_start_matches("0B").to_string(),
        _ => digits,
    };
    if digits.is_empty() {
        return None;
    }
    let n = i64::from_str_radix(&digits, base).ok()?;
    Some(if negative { -n } else { n })
}

fn parse_float(text: &str) -> Option<f64> {
    let text = text.trim().replace('_', "");
    match text.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        "nan" | "+nan" | "-nan" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

/// `round()` on a float with ties to even.
fn round_float(f: f64, ndigits: i64) -> f64 {
    let scale = 10f64.powi(ndigits.clamp(-308, 308) as i32);
    (f * scale).round_ties_even() / scale
}

// ══════════════════════════════════════════════════════════════════════════════
// The builtin table
// ══════════════════════════════════════════════════════════════════════════════

type NativeImpl = fn(&mut Interpreter, &Env, CallArgs) -> Flow<Value>;

const FUNCTIONS: &[(&str, NativeImpl)] = &[
    ("len", builtin_len),
    ("str", builtin_str),
    ("repr", builtin_repr),
    ("int", builtin_int),
    ("float", builtin_float),
    ("bool", builtin_bool),
    ("list", builtin_list),
    ("tuple", builtin_tuple),
    ("dict", builtin_dict),
    ("range", builtin_range),
    ("enumerate", builtin_enumerate),
    ("zip", builtin_zip),
    ("sorted", builtin_sorted),
    ("reversed", builtin_reversed),
    ("min", builtin_min),
    ("max", builtin_max),
    ("sum", builtin_sum),
    ("abs", builtin_abs),
    ("round", builtin_round),
    ("any", builtin_any),
    ("all", builtin_all),
    ("map", builtin_map),
    ("filter", builtin_filter),
    ("chr", builtin_chr),
    ("ord", builtin_ord),
    ("callable", builtin_callable),
    ("include", crate::runtime::include),
    (names::GET_CONV, hook_get_conv),
    (names::WSS_NEW, hook_wsscontroller),
    (names::EXPOSE, hook_expose),
    (names::JOIN, hook_join),
    (names::REJECT_KWDS, hook_reject_kwds),
];

/// Every name visible to scripts without an import.
pub fn builtins() -> HashMap<String, Value> {
    let mut table: HashMap<String, Value> = FUNCTIONS
        .iter()
        .map(|&(name, func)| (name.to_string(), Value::native(name, func)))
        .collect();
    for &kind in ExcKind::ALL {
        table.insert(kind.name().to_string(), Value::ExceptionType(kind));
    }
    table
}

fn builtin_len(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("len", &args, 1, 1)?;
    let n = match &args.positional[0] {
        Value::Str(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        Value::Dict(dict) => dict.borrow().len(),
        other => return type_error(format!("object of type '{}' has no len()", other.type_name())),
    };
    Ok(Value::Int(n as i64))
}

fn builtin_str(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("str", &args, 0, 2)?;
    match args.positional.as_slice() {
        [] => Ok(Value::from("")),
        [value] => Ok(Value::from(to_str(value))),
        [Value::Bytes(b), encoding] => {
            let encoding = str_arg("str", encoding)?.to_ascii_lowercase().replace('-', "");
            if encoding != "utf8" {
                return raise(ExcKind::ValueError, format!("unknown encoding: {encoding}"));
            }
            match std::str::from_utf8(b) {
                Ok(s) => Ok(Value::from(s)),
                Err(e) => raise(ExcKind::ValueError, format!("'utf-8' codec can't decode: {e}")),
            }
        }
        _ => type_error("decoding str is not supported"),
    }
}

fn builtin_repr(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("repr", &args, 1, 1)?;
    Ok(Value::from(repr(&args.positional[0])))
}

fn builtin_int(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("int", &args, 0, 2)?;
    let base = match args.positional.get(1) {
        Some(base) => int_arg("int", base)?,
        None => 10,
    };
    if !(2..=36).contains(&base) {
        return raise(ExcKind::ValueError, "int() base must be >= 2 and <= 36");
    }
    match args.positional.first() {
        None => Ok(Value::Int(0)),
        Some(Value::Str(s)) => match parse_int(s, base as u32) {
            Some(n) => Ok(Value::Int(n)),
            None => raise(
                ExcKind::ValueError,
                format!("invalid literal for int() with base {base}: {}", repr(&Value::Str(s.clone()))),
            ),
        },
        Some(_) if args.positional.len() == 2 => type_error("int() can't convert non-string with explicit base"),
        Some(Value::Float(f)) => {
            if !f.is_finite() {
                return raise(ExcKind::OverflowError, "cannot convert float infinity or NaN to integer");
            }
            if f.abs() >= 9.2e18 {
                return raise(ExcKind::OverflowError, "integer overflow");
            }
            Ok(Value::Int(f.trunc() as i64))
        }
        Some(other) => match other.as_int() {
            Some(n) => Ok(Value::Int(n)),
            None => type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                other.type_name()
            )),
        },
    }
}

fn builtin_float(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("float", &args, 0, 1)?;
    match args.positional.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(s)) => match parse_float(s) {
            Some(f) => Ok(Value::Float(f)),
            None => raise(
                ExcKind::ValueError,
                format!("could not convert string to float: {}", repr(&Value::Str(s.clone()))),
            ),
        },
        Some(other) => match other.as_float() {
            Some(f) => Ok(Value::Float(f)),
            None => type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            )),
        },
    }
}

fn builtin_bool(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("bool", &args, 0, 1)?;
    Ok(Value::Bool(args.positional.first().is_some_and(Value::is_truthy)))
}

fn builtin_list(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("list", &args, 0, 1)?;
    match args.positional.first() {
        Some(value) => Ok(Value::list(iterate(value)?)),
        None => Ok(Value::list(Vec::new())),
    }
}

fn builtin_tuple(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("tuple", &args, 0, 1)?;
    match args.positional.first() {
        Some(value) => Ok(Value::tuple(iterate(value)?)),
        None => Ok(Value::tuple(Vec::new())),
    }
}

fn builtin_dict(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    if args.positional.len() > 1 {
        return type_error(format!(
            "dict expected at most 1 argument, got {}",
            args.positional.len()
        ));
    }
    let mut dict = match args.positional.first() {
        Some(value) => ops::dict_from(value)?,
        None => Dict::new(),
    };
    for (key, value) in args.keywords {
        dict.insert_str(&key, value);
    }
    Ok(Value::dict(dict))
}

fn builtin_range(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("range", &args, 1, 3)?;
    let ints = args
        .positional
        .iter()
        .map(|v| int_arg("range", v))
        .collect::<Flow<Vec<_>>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return type_error("range expected at least 1 argument"),
    };
    if step == 0 {
        return raise(ExcKind::ValueError, "range() arg 3 must not be zero");
    }
    let span = if step > 0 {
        (stop as i128 - start as i128 + step as i128 - 1) / step as i128
    } else {
        (start as i128 - stop as i128 - step as i128 - 1) / -(step as i128)
    };
    let len = span.max(0);
    if len > MAX_SEQUENCE as i128 {
        return raise(ExcKind::OverflowError, "range() result is too large");
    }
    let items = (0..len as i64).map(|i| Value::Int(start + i * step)).collect();
    Ok(Value::list(items))
}

fn builtin_enumerate(_: &mut Interpreter, _: &Env, mut args: CallArgs) -> Flow<Value> {
    let start = match args.take_keyword("start") {
        Some(start) => int_arg("enumerate", &start)?,
        None => 0,
    };
    arity("enumerate", &args, 1, 2)?;
    let start = match args.positional.get(1) {
        Some(value) => int_arg("enumerate", value)?,
        None => start,
    };
    let items = iterate(&args.positional[0])?;
    Ok(Value::list(
        items
            .into_iter()
            .zip(start..)
            .map(|(item, n)| Value::tuple(vec![Value::Int(n), item]))
            .collect(),
    ))
}

fn builtin_zip(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("zip", &args, 0, usize::MAX)?;
    let columns = args
        .positional
        .iter()
        .map(iterate)
        .collect::<Flow<Vec<_>>>()?;
    let len = columns.iter().map(Vec::len).min().unwrap_or(0);
    Ok(Value::list(
        (0..len)
            .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
            .collect(),
    ))
}

fn builtin_sorted(interp: &mut Interpreter, _: &Env, mut args: CallArgs) -> Flow<Value> {
    let key = args.take_keyword("key").unwrap_or(Value::None);
    let reverse = args.take_keyword("reverse").is_some_and(|v| v.is_truthy());
    arity("sorted", &args, 1, 1)?;
    let mut items = iterate(&args.positional[0])?;
    let keys = keys_for(interp, &key, &items)?;
    sort_values(&mut items, keys, reverse)?;
    Ok(Value::list(items))
}

fn builtin_reversed(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("reversed", &args, 1, 1)?;
    let mut items = iterate(&args.positional[0])?;
    items.reverse();
    Ok(Value::list(items))
}

fn builtin_min(interp: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    extremum(interp, "min", args, Ordering::Less)
}

fn builtin_max(interp: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    extremum(interp, "max", args, Ordering::Greater)
}

fn builtin_sum(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("sum", &args, 1, 2)?;
    let mut total = args.positional.get(1).cloned().unwrap_or(Value::Int(0));
    if matches!(total, Value::Str(_)) {
        return type_error("sum() can't sum strings [use ''.join(seq) instead]");
    }
    for item in iterate(&args.positional[0])? {
        total = ops::binary(BinOp::Add, &total, &item)?;
    }
    Ok(total)
}

fn builtin_abs(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("abs", &args, 1, 1)?;
    match &args.positional[0] {
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => match other.as_int() {
            Some(n) => n
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| crate::error::exception(ExcKind::OverflowError, "integer overflow")),
            None => type_error(format!("bad operand type for abs(): '{}'", other.type_name())),
        },
    }
}

fn builtin_round(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("round", &args, 1, 2)?;
    let ndigits = match args.positional.get(1) {
        None | Some(Value::None) => None,
        Some(n) => Some(int_arg("round", n)?),
    };
    match (&args.positional[0], ndigits) {
        (Value::Float(f), None) => {
            let rounded = f.round_ties_even();
            if !rounded.is_finite() || rounded.abs() >= 9.2e18 {
                return raise(ExcKind::OverflowError, "cannot convert float to integer");
            }
            Ok(Value::Int(rounded as i64))
        }
        (Value::Float(f), Some(n)) => Ok(Value::Float(round_float(*f, n))),
        (other, _) => match other.as_int() {
            Some(n) => Ok(Value::Int(n)),
            None => type_error(format!(
                "type {} doesn't define __round__ method",
                other.type_name()
            )),
        },
    }
}

fn builtin_any(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("any", &args, 1, 1)?;
    Ok(Value::Bool(iterate(&args.positional[0])?.iter().any(Value::is_truthy)))
}

fn builtin_all(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("all", &args, 1, 1)?;
    Ok(Value::Bool(iterate(&args.positional[0])?.iter().all(Value::is_truthy)))
}

fn builtin_map(interp: &mut Interpreter, env: &Env, args: CallArgs) -> Flow<Value> {
    arity("map", &args, 2, usize::MAX)?;
    let (func, iterables) = args.positional.split_first().ok_or_else(|| {
        crate::error::exception(ExcKind::TypeError, "map() must have at least two arguments.")
    })?;
    let columns = iterables.iter().map(iterate).collect::<Flow<Vec<_>>>()?;
    let len = columns.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let call = CallArgs::new(columns.iter().map(|c| c[i].clone()).collect());
        out.push(interp.call_in(func, call, env)?);
    }
    Ok(Value::list(out))
}

fn builtin_filter(interp: &mut Interpreter, env: &Env, args: CallArgs) -> Flow<Value> {
    arity("filter", &args, 2, 2)?;
    let func = &args.positional[0];
    let mut out = Vec::new();
    for item in iterate(&args.positional[1])? {
        let keep = if func.is_none() {
            item.is_truthy()
        } else {
            interp
                .call_in(func, CallArgs::new(vec![item.clone()]), env)?
                .is_truthy()
        };
        if keep {
            out.push(item);
        }
    }
    Ok(Value::list(out))
}

fn builtin_chr(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("chr", &args, 1, 1)?;
    let n = int_arg("chr", &args.positional[0])?;
    match u32::try_from(n).ok().and_then(char::from_u32) {
        Some(c) => Ok(Value::from(c.to_string())),
        None => raise(ExcKind::ValueError, "chr() arg not in range(0x110000)"),
    }
}

fn builtin_ord(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("ord", &args, 1, 1)?;
    match &args.positional[0] {
        Value::Str(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Int(c as i64)),
                _ => type_error(format!(
                    "ord() expected a character, but string of length {} found",
                    s.chars().count()
                )),
            }
        }
        Value::Bytes(b) if b.len() == 1 => Ok(Value::Int(b[0] as i64)),
        other => type_error(format!(
            "ord() expected string of length 1, but {} found",
            other.type_name()
        )),
    }
}

fn builtin_callable(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity("callable", &args, 1, 1)?;
    Ok(Value::Bool(args.positional[0].is_callable()))
}

// ══════════════════════════════════════════════════════════════════════════════
// Hooks called by generated code
// ══════════════════════════════════════════════════════════════════════════════

/// `__get_conv__(quote, lquote, bytes)` resolves and records the quote pair.
fn hook_get_conv(interp: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity(names::GET_CONV, &args, 3, 3)?;
    let mut positional = args.positional.into_iter();
    let quote = positional.next().unwrap_or(Value::None);
    let lquote = positional.next().unwrap_or(Value::None);
    let bytes = positional.next().is_some_and(|b| b.is_truthy());
    let pair = crate::quote::resolve(interp, quote, lquote, bytes)?;
    let result = Value::tuple(vec![pair.quote.clone(), pair.lquote.clone()]);
    interp.push_quotes(pair);
    Ok(result)
}

fn hook_wsscontroller(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity(names::WSS_NEW, &args, 0, 0)?;
    Ok(Value::Controller(Rc::new(std::cell::RefCell::new(WsController::new()))))
}

/// Bind the parameter mapping's keys as names in the calling scope. Keys
/// that are not identifiers, or are reserved, are skipped.
fn hook_expose(_: &mut Interpreter, env: &Env, args: CallArgs) -> Flow<Value> {
    arity(names::EXPOSE, &args, 1, 1)?;
    let Value::Dict(dict) = &args.positional[0] else {
        return Ok(Value::None);
    };
    let mut scope = env.borrow_mut();
    for (key, value) in dict.borrow().items() {
        if let Value::Str(key) = key {
            if is_identifier(&key) && !names::is_reserved(&key) {
                scope.set(key.as_ref(), value);
            }
        }
    }
    Ok(Value::None)
}

fn hook_join(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity(names::JOIN, &args, 2, 2)?;
    let pieces = iterate(&args.positional[0])?;
    crate::quote::join(&pieces, args.positional[1].is_truthy())
}

/// Leftover keywords of a callable template invocation are a signature
/// error, not a catchable exception.
fn hook_reject_kwds(_: &mut Interpreter, _: &Env, args: CallArgs) -> Flow<Value> {
    arity(names::REJECT_KWDS, &args, 1, 1)?;
    let Value::Dict(extra) = &args.positional[0] else {
        return Ok(Value::None);
    };
    let keys: Vec<String> = extra.borrow().keys().iter().map(to_str).collect();
    if keys.is_empty() {
        return Ok(Value::None);
    }
    let listed: Vec<String> = keys.iter().map(|k| format!("'{k}'")).collect();
    Err(Unwind::Fatal(EvalError::Signature(format!(
        "get() got an unexpected keyword argument{} {}",
        if keys.len() == 1 { "" } else { "s" },
        listed.join(", ")
    ))))
}

// ══════════════════════════════════════════════════════════════════════════════
// Modules
// ══════════════════════════════════════════════════════════════════════════════

fn unary_math(name: &'static str, f: fn(f64) -> f64) -> Value {
    Value::native(name, move |_, _, args| {
        arity(name, &args, 1, 1)?;
        let Some(x) = args.positional[0].as_float() else {
            return type_error(format!(
                "must be real number, not {}",
                args.positional[0].type_name()
            ));
        };
        Ok(Value::Float(f(x)))
    })
}

fn to_integral(name: &'static str, f: fn(f64) -> f64) -> Value {
    Value::native(name, move |_, _, args| {
        arity(name, &args, 1, 1)?;
        match &args.positional[0] {
            Value::Float(x) => {
                let y = f(*x);
                if !y.is_finite() || y.abs() >= 9.2e18 {
                    return raise(ExcKind::OverflowError, "cannot convert float to integer");
                }
                Ok(Value::Int(y as i64))
            }
            other => match other.as_int() {
                Some(n) => Ok(Value::Int(n)),
                None => type_error(format!("must be real number, not {}", other.type_name())),
            },
        }
    })
}

fn domain_checked(name: &'static str, f: fn(f64) -> f64, valid: fn(f64) -> bool) -> Value {
    Value::native(name, move |_, _, args| {
        arity(name, &args, 1, 1)?;
        let Some(x) = args.positional[0].as_float() else {
            return type_error(format!(
                "must be real number, not {}",
                args.positional[0].type_name()
            ));
        };
        if !valid(x) {
            return raise(ExcKind::ValueError, "math domain error");
        }
        Ok(Value::Float(f(x)))
    })
}

fn math_module() -> Module {
    let mut attrs = IndexMap::new();
    attrs.insert("pi".to_string(), Value::Float(std::f64::consts::PI));
    attrs.insert("e".to_string(), Value::Float(std::f64::consts::E));
    attrs.insert("inf".to_string(), Value::Float(f64::INFINITY));
    attrs.insert("nan".to_string(), Value::Float(f64::NAN));
    attrs.insert("floor".to_string(), to_integral("floor", f64::floor));
    attrs.insert("ceil".to_string(), to_integral("ceil", f64::ceil));
    attrs.insert("trunc".to_string(), to_integral("trunc", f64::trunc));
    attrs.insert("sqrt".to_string(), domain_checked("sqrt", f64::sqrt, |x| x >= 0.0));
    attrs.insert("exp".to_string(), unary_math("exp", f64::exp));
    attrs.insert("fabs".to_string(), unary_math("fabs", f64::abs));
    attrs.insert("sin".to_string(), unary_math("sin", f64::sin));
    attrs.insert("cos".to_string(), unary_math("cos", f64::cos));
    attrs.insert(
        "log".to_string(),
        Value::native("log", |_, _, args| {
            arity("log", &args, 1, 2)?;
            let floats: Vec<f64> = args.positional.iter().filter_map(Value::as_float).collect();
            if floats.len() != args.positional.len() {
                return type_error("must be real number");
            }
            if floats.iter().any(|&x| x <= 0.0) {
                return raise(ExcKind::ValueError, "math domain error");
            }
            Ok(Value::Float(match floats.as_slice() {
                [x, base] => x.ln() / base.ln(),
                [x] => x.ln(),
                _ => f64::NAN,
            }))
        }),
    );
    attrs.insert(
        "pow".to_string(),
        Value::native("pow", |_, _, args| {
            arity("pow", &args, 2, 2)?;
            match (args.positional[0].as_float(), args.positional[1].as_float()) {
                (Some(x), Some(y)) => Ok(Value::Float(x.powf(y))),
                _ => type_error("must be real number"),
            }
        }),
    );
    Module {
        name: "math".into(),
        attrs,
    }
}

/// An importable module by name.
pub fn module(name: &str) -> Option<Value> {
    match name {
        "math" => Some(Value::Module(Rc::new(math_module()))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Scope;

    fn call(name: &str, args: Vec<Value>) -> Value {
        let mut interp = Interpreter::default();
        let env = Scope::global();
        let func = interp.lookup(&env, name).unwrap();
        interp
            .call_in(&func, CallArgs::new(args), &env)
            .unwrap_or_else(|e| panic!("{name}() failed: {e:?}"))
    }

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().map(|&n| Value::Int(n)).collect())
    }

    #[test]
    fn test_range() {
        assert_eq!(call("range", vec![Value::Int(3)]), ints(&[0, 1, 2]));
        assert_eq!(call("range", vec![Value::Int(5), Value::Int(0), Value::Int(-2)]), ints(&[5, 3, 1]));
        assert_eq!(call("range", vec![Value::Int(2), Value::Int(2)]), ints(&[]));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", vec![Value::from(" 42 ")]), Value::Int(42));
        assert_eq!(call("int", vec![Value::from("ff"), Value::Int(16)]), Value::Int(255));
        assert_eq!(call("int", vec![Value::Float(-2.7)]), Value::Int(-2));
        assert_eq!(call("float", vec![Value::from("2.5")]), Value::Float(2.5));
        assert_eq!(call("str", vec![Value::Float(2.0)]), Value::from("2.0"));
        assert_eq!(call("bool", vec![Value::list(vec![])]), Value::Bool(false));
    }

    #[test]
    fn test_round_ties_to_even() {
        assert_eq!(call("round", vec![Value::Float(2.5)]), Value::Int(2));
        assert_eq!(call("round", vec![Value::Float(3.5)]), Value::Int(4));
        assert_eq!(call("round", vec![Value::Float(1.234), Value::Int(2)]), Value::Float(1.23));
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(call("sum", vec![ints(&[1, 2, 3])]), Value::Int(6));
        assert_eq!(call("max", vec![Value::Int(3), Value::Int(9), Value::Int(4)]), Value::Int(9));
        assert_eq!(call("min", vec![ints(&[3, 1, 2])]), Value::Int(1));
        assert_eq!(call("sorted", vec![ints(&[3, 1, 2])]), ints(&[1, 2, 3]));
        assert_eq!(call("any", vec![ints(&[0, 0, 1])]), Value::Bool(true));
        assert_eq!(call("all", vec![ints(&[1, 0])]), Value::Bool(false));
    }

    #[test]
    fn test_zip_and_enumerate() {
        let zipped = call("zip", vec![ints(&[1, 2, 3]), Value::from("ab")]);
        assert_eq!(
            zipped,
            Value::list(vec![
                Value::tuple(vec![Value::Int(1), Value::from("a")]),
                Value::tuple(vec![Value::Int(2), Value::from("b")]),
            ])
        );
        let numbered = call("enumerate", vec![Value::from("x"), Value::Int(1)]);
        assert_eq!(numbered, Value::list(vec![Value::tuple(vec![Value::Int(1), Value::from("x")])]));
    }

    #[test]
    fn test_chr_and_ord() {
        assert_eq!(call("chr", vec![Value::Int(97)]), Value::from("a"));
        assert_eq!(call("ord", vec![Value::from("é")]), Value::Int(233));
    }

    #[test]
    fn test_expose_skips_reserved_and_non_identifiers() {
        let mut interp = Interpreter::default();
        let env = Scope::global();
        let dict: Dict = [
            ("title", Value::from("t")),
            ("not valid", Value::Int(1)),
            ("for", Value::Int(2)),
            ("__wss__", Value::Int(3)),
        ]
        .into_iter()
        .collect();
        hook_expose(&mut interp, &env, CallArgs::new(vec![Value::dict(dict)])).unwrap();
        let scope = env.borrow();
        assert_eq!(scope.get_local("title"), Some(Value::from("t")));
        assert_eq!(scope.get_local("for"), None);
        assert_eq!(scope.get_local("__wss__"), None);
    }

    #[test]
    fn test_math_module() {
        let Some(Value::Module(math)) = module("math") else {
            panic!("math module missing");
        };
        let mut interp = Interpreter::default();
        let floor = math.attrs["floor"].clone();
        assert_eq!(
            interp.call_value(&floor, CallArgs::new(vec![Value::Float(2.5)])).unwrap(),
            Value::Int(2)
        );
        let sqrt = math.attrs["sqrt"].clone();
        assert!(interp.call_value(&sqrt, CallArgs::new(vec![Value::Float(-1.0)])).is_err());
    }
}
