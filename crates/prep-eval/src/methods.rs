//! Methods of the built-in types, reached through attribute access.

use std::rc::Rc;

use crate::builtins::{arity, int_arg, keys_for, sort_values, str_arg};
use crate::error::{raise, type_error, Flow};
use crate::exceptions::ExcKind;
use crate::format::{percent_format, to_str};
use crate::interpreter::{iterate, Interpreter};
use crate::ops::{self, MAX_SEQUENCE};
use crate::value::{CallArgs, Dict, Value};

const STR_METHODS: &[&str] = &[
    "upper", "lower", "strip", "lstrip", "rstrip", "split", "rsplit", "splitlines", "join",
    "replace", "startswith", "endswith", "find", "rfind", "index", "count", "format", "title",
    "capitalize", "isdigit", "isalpha", "isspace", "isalnum", "isupper", "islower", "zfill",
    "center", "ljust", "rjust", "encode", "partition", "rpartition",
];
const BYTES_METHODS: &[&str] = &["decode", "join", "startswith", "endswith", "strip", "replace"];
const LIST_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "index", "count", "reverse", "sort", "copy",
    "clear",
];
const TUPLE_METHODS: &[&str] = &["index", "count"];
const DICT_METHODS: &[&str] = &[
    "get", "keys", "values", "items", "pop", "setdefault", "update", "copy", "clear",
];
const CONTROLLER_METHODS: &[&str] = &["c", "x", "dnl", "dws"];

pub fn has_method(value: &Value, name: &str) -> bool {
    let table = match value {
        Value::Str(_) => STR_METHODS,
        Value::Bytes(_) => BYTES_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Controller(_) => CONTROLLER_METHODS,
        _ => return false,
    };
    table.contains(&name)
}

pub fn call_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: CallArgs,
) -> Flow<Value> {
    match receiver {
        Value::Str(s) => str_method(s, name, args),
        Value::Bytes(b) => bytes_method(b, name, args),
        Value::List(_) => list_method(interp, receiver, name, args),
        Value::Tuple(items) => sequence_method("tuple", items, name, args),
        Value::Dict(_) => dict_method(receiver, name, args),
        Value::Controller(controller) => {
            let mut controller = controller.borrow_mut();
            match name {
                "c" | "x" => {
                    arity(name, &args, 1, 1)?;
                    let value = args.positional.into_iter().next().unwrap_or(Value::None);
                    Ok(if name == "c" {
                        controller.literal(value)
                    } else {
                        controller.expression(value)
                    })
                }
                "dnl" => {
                    arity(name, &args, 0, 0)?;
                    controller.dnl();
                    Ok(Value::None)
                }
                _ => {
                    arity(name, &args, 0, 0)?;
                    controller.dws();
                    Ok(Value::None)
                }
            }
        }
        other => raise(
            ExcKind::AttributeError,
            format!("'{}' object has no attribute '{name}'", other.type_name()),
        ),
    }
}

fn char_offset(s: &str, byte: usize) -> i64 {
    s[..byte].chars().count() as i64
}

fn optional_str<'a>(name: &str, value: Option<&'a Value>) -> Flow<Option<&'a str>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(value) => str_arg(name, value).map(Some),
    }
}

fn padded(s: &str, width: i64, fill: char, align: char) -> String {
    let len = s.chars().count() as i64;
    let pad = (width - len).max(0) as usize;
    let (left, right) = match align {
        '>' => (pad, 0),
        '^' => (pad / 2, pad - pad / 2),
        _ => (0, pad),
    };
    let mut out = String::with_capacity(s.len() + pad);
    out.extend(std::iter::repeat(fill).take(left));
    out.push_str(s);
    out.extend(std::iter::repeat(fill).take(right));
    out
}

fn fill_char(name: &str, value: Option<&Value>) -> Flow<char> {
    let Some(value) = value else {
        return Ok(' ');
    };
    let s = str_arg(name, value)?;
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => type_error("The fill character must be exactly one character long"),
    }
}

/// Prefixes for `startswith` and `endswith`: one string or a tuple.
fn affixes(name: &str, value: &Value) -> Flow<Vec<Value>> {
    match value {
        Value::Tuple(items) => Ok(items.as_ref().clone()),
        Value::Str(_) | Value::Bytes(_) => Ok(vec![value.clone()]),
        other => type_error(format!(
            "{name} first arg must be str, bytes or a tuple, not {}",
            other.type_name()
        )),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// str
// ══════════════════════════════════════════════════════════════════════════════

fn str_method(s: &Rc<str>, name: &str, mut args: CallArgs) -> Flow<Value> {
    let text: &str = s;
    match name {
        "upper" | "lower" | "title" | "capitalize" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::from(match name {
                "upper" => text.to_uppercase(),
                "lower" => text.to_lowercase(),
                "title" => title_case(text),
                _ => {
                    let mut chars = text.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                        None => String::new(),
                    }
                }
            }))
        }
        "strip" | "lstrip" | "rstrip" => {
            arity(name, &args, 0, 1)?;
            let chars = optional_str(name, args.positional.first())?;
            let matches = |c: char| match chars {
                Some(set) => set.contains(c),
                None => c.is_whitespace(),
            };
            Ok(Value::from(match name {
                "strip" => text.trim_matches(matches),
                "lstrip" => text.trim_start_matches(matches),
                _ => text.trim_end_matches(matches),
            }))
        }
        "split" | "rsplit" => {
            let sep = args.take_keyword("sep");
            let maxsplit = args.take_keyword("maxsplit");
            arity(name, &args, 0, 2)?;
            let sep = args.positional.first().cloned().or(sep);
            let maxsplit = match args.positional.get(1).or(maxsplit.as_ref()) {
                Some(n) => int_arg(name, n)?,
                None => -1,
            };
            let limit = if maxsplit < 0 { usize::MAX } else { maxsplit as usize };
            let parts: Vec<String> = match optional_str(name, sep.as_ref())? {
                Some("") => return raise(ExcKind::ValueError, "empty separator"),
                Some(sep) if name == "split" => text.splitn(limit.saturating_add(1), sep).map(String::from).collect(),
                Some(sep) => {
                    let mut parts: Vec<String> =
                        text.rsplitn(limit.saturating_add(1), sep).map(String::from).collect();
                    parts.reverse();
                    parts
                }
                None => split_whitespace(text, limit, name == "rsplit"),
            };
            Ok(Value::list(parts.into_iter().map(Value::from).collect()))
        }
        "splitlines" => {
            arity(name, &args, 0, 1)?;
            let keepends = args.positional.first().is_some_and(Value::is_truthy);
            let lines: Vec<Value> = if keepends {
                text.split_inclusive('\n').map(Value::from).collect()
            } else {
                text.lines().map(Value::from).collect()
            };
            Ok(Value::list(lines))
        }
        "join" => {
            arity(name, &args, 1, 1)?;
            let items = iterate(&args.positional[0])?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(part) => parts.push(part.to_string()),
                    other => {
                        return type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        ))
                    }
                }
            }
            Ok(Value::from(parts.join(text)))
        }
        "replace" => {
            arity(name, &args, 2, 3)?;
            let old = str_arg(name, &args.positional[0])?;
            let new = str_arg(name, &args.positional[1])?;
            let count = match args.positional.get(2) {
                Some(n) => int_arg(name, n)?,
                None => -1,
            };
            Ok(Value::from(if count < 0 {
                text.replace(old, new)
            } else {
                text.replacen(old, new, count as usize)
            }))
        }
        "startswith" | "endswith" => {
            arity(name, &args, 1, 1)?;
            for affix in affixes(name, &args.positional[0])? {
                let affix = str_arg(name, &affix)?;
                let hit = if name == "startswith" {
                    text.starts_with(affix)
                } else {
                    text.ends_with(affix)
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "find" | "rfind" | "index" => {
            arity(name, &args, 1, 1)?;
            let needle = str_arg(name, &args.positional[0])?;
            let found = if name == "rfind" {
                text.rfind(needle)
            } else {
                text.find(needle)
            };
            match found {
                Some(byte) => Ok(Value::Int(char_offset(text, byte))),
                None if name == "index" => raise(ExcKind::ValueError, "substring not found"),
                None => Ok(Value::Int(-1)),
            }
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            let needle = str_arg(name, &args.positional[0])?;
            let n = if needle.is_empty() {
                text.chars().count() + 1
            } else {
                text.matches(needle).count()
            };
            Ok(Value::Int(n as i64))
        }
        "format" => Ok(Value::from(str_format(text, &args)?)),
        "isdigit" | "isalpha" | "isspace" | "isalnum" => {
            arity(name, &args, 0, 0)?;
            let test: fn(char) -> bool = match name {
                "isdigit" => |c| c.is_ascii_digit(),
                "isalpha" => char::is_alphabetic,
                "isspace" => char::is_whitespace,
                _ => char::is_alphanumeric,
            };
            Ok(Value::Bool(!text.is_empty() && text.chars().all(test)))
        }
        "isupper" | "islower" => {
            arity(name, &args, 0, 0)?;
            let cased: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
            let test = if name == "isupper" {
                cased.iter().all(|c| !c.is_lowercase())
            } else {
                cased.iter().all(|c| !c.is_uppercase())
            };
            Ok(Value::Bool(!cased.is_empty() && test))
        }
        "zfill" => {
            arity(name, &args, 1, 1)?;
            let width = int_arg(name, &args.positional[0])?;
            let (sign, digits) = match text.chars().next() {
                Some(c @ ('+' | '-')) => (Some(c), &text[1..]),
                _ => (None, text),
            };
            let pad = (width - text.chars().count() as i64).max(0) as usize;
            let mut out = String::new();
            out.extend(sign);
            out.extend(std::iter::repeat('0').take(pad));
            out.push_str(digits);
            Ok(Value::from(out))
        }
        "center" | "ljust" | "rjust" => {
            arity(name, &args, 1, 2)?;
            let width = int_arg(name, &args.positional[0])?;
            if width > MAX_SEQUENCE as i64 {
                return raise(ExcKind::OverflowError, "result too large");
            }
            let fill = fill_char(name, args.positional.get(1))?;
            let align = match name {
                "center" => '^',
                "rjust" => '>',
                _ => '<',
            };
            Ok(Value::from(padded(text, width, fill, align)))
        }
        "encode" => {
            arity(name, &args, 0, 1)?;
            if let Some(encoding) = optional_str(name, args.positional.first())? {
                check_utf8(encoding)?;
            }
            Ok(Value::bytes(text.as_bytes()))
        }
        "partition" | "rpartition" => {
            arity(name, &args, 1, 1)?;
            let sep = str_arg(name, &args.positional[0])?;
            if sep.is_empty() {
                return raise(ExcKind::ValueError, "empty separator");
            }
            let split = if name == "partition" {
                text.split_once(sep)
            } else {
                text.rsplit_once(sep)
            };
            let parts = match split {
                Some((head, tail)) => [head, sep, tail],
                None if name == "partition" => [text, "", ""],
                None => ["", "", text],
            };
            Ok(Value::tuple(parts.into_iter().map(Value::from).collect()))
        }
        _ => no_method("str", name),
    }
}

fn no_method<T>(type_name: &str, name: &str) -> Flow<T> {
    raise(
        ExcKind::AttributeError,
        format!("'{type_name}' object has no attribute '{name}'"),
    )
}

fn check_utf8(encoding: &str) -> Flow<()> {
    match encoding.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
        "utf8" => Ok(()),
        _ => raise(ExcKind::ValueError, format!("unknown encoding: {encoding}")),
    }
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Whitespace splitting, dropping empty parts.
fn split_whitespace(text: &str, limit: usize, from_right: bool) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= limit {
        return words.into_iter().map(String::from).collect();
    }
    if from_right {
        // Everything before the last `limit` words stays joined as written.
        let keep = words.len() - limit;
        let mut rest = text.trim_start();
        for word in &words[..keep] {
            rest = rest[word.len()..].trim_start();
        }
        let head_len = text.trim().len() - rest.len();
        let head = text.trim()[..head_len].trim_end();
        let mut parts = vec![head.to_string()];
        parts.extend(words[keep..].iter().map(|w| w.to_string()));
        parts
    } else {
        let mut parts = Vec::with_capacity(limit + 1);
        let mut rest = text.trim_start();
        for word in &words[..limit] {
            parts.push(word.to_string());
            rest = rest[word.len()..].trim_start();
        }
        parts.push(rest.to_string());
        parts
    }
}

/// `str.format` with `{}`, `{0}`, `{name}`, `!r`/`!s` conversions and a
/// `[[fill]align][0][width][.precision][type]` spec.
fn str_format(template: &str, args: &CallArgs) -> Flow<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto = 0;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return raise(ExcKind::ValueError, "Single '}' encountered in format string"),
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    field.push(c);
                }
                if !closed {
                    return raise(ExcKind::ValueError, "expected '}' before end of string");
                }
                let (field, spec) = match field.split_once(':') {
                    Some((field, spec)) => (field.to_string(), spec.to_string()),
                    None => (field, String::new()),
                };
                let (field, conversion) = match field.split_once('!') {
                    Some((field, conv)) => (field.to_string(), Some(conv.to_string())),
                    None => (field, None),
                };
                let value = if field.is_empty() {
                    let value = args.positional.get(auto).cloned();
                    auto += 1;
                    value
                } else if let Ok(index) = field.parse::<usize>() {
                    args.positional.get(index).cloned()
                } else {
                    args.keywords.iter().find(|(k, _)| *k == field).map(|(_, v)| v.clone())
                };
                let Some(value) = value else {
                    return if field.is_empty() || field.parse::<usize>().is_ok() {
                        raise(ExcKind::IndexError, "Replacement index out of range for positional args tuple")
                    } else {
                        raise(ExcKind::KeyError, format!("'{field}'"))
                    };
                };
                let value = match conversion.as_deref() {
                    Some("r") => Value::from(crate::format::repr(&value)),
                    Some("s") | None => value,
                    Some(other) => {
                        return raise(
                            ExcKind::ValueError,
                            format!("Unknown conversion specifier {other}"),
                        )
                    }
                };
                out.push_str(&format_spec(&value, &spec)?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn format_spec(value: &Value, spec: &str) -> Flow<String> {
    if spec.is_empty() {
        return Ok(to_str(value));
    }
    let chars: Vec<char> = spec.chars().collect();
    let mut i = 0;
    let mut fill = ' ';
    let mut align = None;
    if chars.len() >= 2 && matches!(chars[1], '<' | '>' | '^') {
        fill = chars[0];
        align = Some(chars[1]);
        i = 2;
    } else if matches!(chars.first(), Some('<' | '>' | '^')) {
        align = Some(chars[0]);
        i = 1;
    }
    if chars.get(i) == Some(&'0') {
        if align.is_none() {
            fill = '0';
            align = Some('>');
        }
        i += 1;
    }
    let mut width = String::new();
    while let Some(c) = chars.get(i).filter(|c| c.is_ascii_digit()) {
        width.push(*c);
        i += 1;
    }
    let mut precision = None;
    if chars.get(i) == Some(&'.') {
        i += 1;
        let mut digits = String::new();
        while let Some(c) = chars.get(i).filter(|c| c.is_ascii_digit()) {
            digits.push(*c);
            i += 1;
        }
        precision = Some(digits);
    }
    let kind = chars.get(i).copied();
    if i + usize::from(kind.is_some()) != chars.len() {
        return raise(ExcKind::ValueError, "Invalid format specifier");
    }
    let numeric = matches!(value, Value::Int(_) | Value::Float(_) | Value::Bool(_));
    let body = match kind {
        Some(k @ ('d' | 'x' | 'X' | 'o' | 'f' | 'F' | 'e' | 'E' | '%')) => {
            let prec = precision.map(|p| format!(".{p}")).unwrap_or_default();
            if k == '%' {
                let scaled = match value.as_float() {
                    Some(f) => Value::Float(f * 100.0),
                    None => return type_error("'%' format requires a number"),
                };
                let prec = if prec.is_empty() { ".6".to_string() } else { prec };
                format!("{}%", percent_format(&format!("%{prec}f"), &scaled)?)
            } else {
                percent_format(&format!("%{prec}{k}"), value)?
            }
        }
        Some('s') | None => match (precision, value) {
            (Some(p), Value::Float(_)) if kind.is_none() => {
                percent_format(&format!("%.{p}f"), value)?
            }
            (Some(p), _) => {
                let n: usize = p.parse().unwrap_or(0);
                to_str(value).chars().take(n).collect()
            }
            (None, _) => to_str(value),
        },
        Some(other) => {
            return raise(
                ExcKind::ValueError,
                format!("Unknown format code '{other}' for object of type '{}'", value.type_name()),
            )
        }
    };
    let width: i64 = width.parse().unwrap_or(0);
    let align = align.unwrap_or(if numeric { '>' } else { '<' });
    if fill == '0' && numeric && body.starts_with('-') {
        return Ok(format!("-{}", padded(&body[1..], width - 1, '0', '>')));
    }
    Ok(padded(&body, width, fill, align))
}

// ══════════════════════════════════════════════════════════════════════════════
// bytes
// ══════════════════════════════════════════════════════════════════════════════

fn bytes_arg<'a>(name: &str, value: &'a Value) -> Flow<&'a [u8]> {
    match value {
        Value::Bytes(b) => Ok(b),
        other => type_error(format!(
            "{name}() argument must be bytes, not {}",
            other.type_name()
        )),
    }
}

fn bytes_method(b: &Rc<[u8]>, name: &str, args: CallArgs) -> Flow<Value> {
    let data: &[u8] = b;
    match name {
        "decode" => {
            arity(name, &args, 0, 1)?;
            if let Some(encoding) = optional_str(name, args.positional.first())? {
                check_utf8(encoding)?;
            }
            match std::str::from_utf8(data) {
                Ok(s) => Ok(Value::from(s)),
                Err(e) => raise(ExcKind::ValueError, format!("'utf-8' codec can't decode: {e}")),
            }
        }
        "join" => {
            arity(name, &args, 1, 1)?;
            let mut out = Vec::new();
            for (i, item) in iterate(&args.positional[0])?.iter().enumerate() {
                if i > 0 {
                    out.extend_from_slice(data);
                }
                out.extend_from_slice(bytes_arg(name, item)?);
            }
            Ok(Value::bytes(out))
        }
        "startswith" | "endswith" => {
            arity(name, &args, 1, 1)?;
            for affix in affixes(name, &args.positional[0])? {
                let affix = bytes_arg(name, &affix)?;
                let hit = if name == "startswith" {
                    data.starts_with(affix)
                } else {
                    data.ends_with(affix)
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "strip" => {
            arity(name, &args, 0, 1)?;
            let set: &[u8] = match args.positional.first() {
                None | Some(Value::None) => b" \t\n\r\x0b\x0c",
                Some(value) => bytes_arg(name, value)?,
            };
            let start = data.iter().position(|c| !set.contains(c)).unwrap_or(data.len());
            let end = data.iter().rposition(|c| !set.contains(c)).map_or(start, |i| i + 1);
            Ok(Value::bytes(&data[start..end.max(start)]))
        }
        "replace" => {
            arity(name, &args, 2, 2)?;
            let old = bytes_arg(name, &args.positional[0])?;
            let new = bytes_arg(name, &args.positional[1])?;
            if old.is_empty() {
                return Ok(Value::Bytes(b.clone()));
            }
            let mut out = Vec::with_capacity(data.len());
            let mut i = 0;
            while i < data.len() {
                if data[i..].starts_with(old) {
                    out.extend_from_slice(new);
                    i += old.len();
                } else {
                    out.push(data[i]);
                    i += 1;
                }
            }
            Ok(Value::bytes(out))
        }
        _ => no_method("bytes", name),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// list, tuple
// ══════════════════════════════════════════════════════════════════════════════

fn sequence_method(type_name: &str, items: &[Value], name: &str, args: CallArgs) -> Flow<Value> {
    match name {
        "index" => {
            arity(name, &args, 1, 1)?;
            match items.iter().position(|v| ops::values_equal(v, &args.positional[0])) {
                Some(i) => Ok(Value::Int(i as i64)),
                None => raise(ExcKind::ValueError, "value is not in list"),
            }
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            let n = items
                .iter()
                .filter(|v| ops::values_equal(v, &args.positional[0]))
                .count();
            Ok(Value::Int(n as i64))
        }
        _ => no_method(type_name, name),
    }
}

fn list_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    mut args: CallArgs,
) -> Flow<Value> {
    let Value::List(list) = receiver else {
        return no_method(receiver.type_name(), name);
    };
    match name {
        "append" => {
            arity(name, &args, 1, 1)?;
            let mut items = list.borrow_mut();
            if items.len() >= MAX_SEQUENCE {
                return raise(ExcKind::OverflowError, "list too large");
            }
            items.extend(args.positional);
            Ok(Value::None)
        }
        "extend" => {
            arity(name, &args, 1, 1)?;
            let extra = iterate(&args.positional[0])?;
            let mut items = list.borrow_mut();
            if items.len() + extra.len() > MAX_SEQUENCE {
                return raise(ExcKind::OverflowError, "list too large");
            }
            items.extend(extra);
            Ok(Value::None)
        }
        "insert" => {
            arity(name, &args, 2, 2)?;
            let index = int_arg(name, &args.positional[0])?;
            let mut items = list.borrow_mut();
            let len = items.len() as i64;
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(at as usize, args.positional[1].clone());
            Ok(Value::None)
        }
        "pop" => {
            arity(name, &args, 0, 1)?;
            let mut items = list.borrow_mut();
            if items.is_empty() {
                return raise(ExcKind::IndexError, "pop from empty list");
            }
            let len = items.len() as i64;
            let index = match args.positional.first() {
                Some(i) => int_arg(name, i)?,
                None => -1,
            };
            let at = if index < 0 { index + len } else { index };
            if !(0..len).contains(&at) {
                return raise(ExcKind::IndexError, "pop index out of range");
            }
            Ok(items.remove(at as usize))
        }
        "remove" => {
            arity(name, &args, 1, 1)?;
            let mut items = list.borrow_mut();
            match items.iter().position(|v| ops::values_equal(v, &args.positional[0])) {
                Some(i) => {
                    items.remove(i);
                    Ok(Value::None)
                }
                None => raise(ExcKind::ValueError, "list.remove(x): x not in list"),
            }
        }
        "reverse" => {
            arity(name, &args, 0, 0)?;
            list.borrow_mut().reverse();
            Ok(Value::None)
        }
        "sort" => {
            let key = args.take_keyword("key").unwrap_or(Value::None);
            let reverse = args.take_keyword("reverse").is_some_and(|v| v.is_truthy());
            arity(name, &args, 0, 0)?;
            let mut items = list.borrow().clone();
            let keys = keys_for(interp, &key, &items)?;
            sort_values(&mut items, keys, reverse)?;
            *list.borrow_mut() = items;
            Ok(Value::None)
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(list.borrow().clone()))
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            list.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => {
            let items = list.borrow().clone();
            sequence_method("list", &items, name, args)
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// dict
// ══════════════════════════════════════════════════════════════════════════════

fn dict_method(receiver: &Value, name: &str, args: CallArgs) -> Flow<Value> {
    let Value::Dict(dict) = receiver else {
        return no_method(receiver.type_name(), name);
    };
    match name {
        "get" => {
            arity(name, &args, 1, 2)?;
            let key = &args.positional[0];
            let found = dict.borrow().get(key).or_else(|()| ops::unhashable(key))?;
            Ok(found.or_else(|| args.positional.get(1).cloned()).unwrap_or(Value::None))
        }
        "keys" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(dict.borrow().keys()))
        }
        "values" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::list(dict.borrow().values()))
        }
        "items" => {
            arity(name, &args, 0, 0)?;
            let items = dict
                .borrow()
                .items()
                .into_iter()
                .map(|(k, v)| Value::tuple(vec![k, v]))
                .collect();
            Ok(Value::list(items))
        }
        "pop" => {
            arity(name, &args, 1, 2)?;
            let key = &args.positional[0];
            let removed = dict.borrow_mut().remove(key).or_else(|()| ops::unhashable(key))?;
            match (removed, args.positional.get(1)) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(ops::key_error(key)),
            }
        }
        "setdefault" => {
            arity(name, &args, 1, 2)?;
            let key = args.positional[0].clone();
            let mut dict = dict.borrow_mut();
            if let Some(value) = dict.get(&key).or_else(|()| ops::unhashable(&key))? {
                return Ok(value);
            }
            let value = args.positional.get(1).cloned().unwrap_or(Value::None);
            dict.insert(key.clone(), value.clone())
                .or_else(|()| ops::unhashable(&key))?;
            Ok(value)
        }
        "update" => {
            if args.positional.len() > 1 {
                return type_error(format!(
                    "update expected at most 1 argument, got {}",
                    args.positional.len()
                ));
            }
            let mut merged: Dict = match args.positional.first() {
                Some(other) => ops::dict_from(other)?,
                None => Dict::new(),
            };
            for (key, value) in args.keywords {
                merged.insert_str(&key, value);
            }
            let mut dict = dict.borrow_mut();
            for (key, value) in merged.items() {
                dict.insert(key.clone(), value)
                    .or_else(|()| ops::unhashable(&key))?;
            }
            Ok(Value::None)
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            Ok(Value::dict(dict.borrow().clone()))
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            dict.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => no_method("dict", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(receiver: Value, name: &str, args: Vec<Value>) -> Value {
        let mut interp = Interpreter::default();
        call_method(&mut interp, &receiver, name, CallArgs::new(args))
            .unwrap_or_else(|e| panic!("{name}() failed: {e:?}"))
    }

    fn strs(items: &[&str]) -> Value {
        Value::list(items.iter().map(|&s| Value::from(s)).collect())
    }

    #[test]
    fn test_split_variants() {
        assert_eq!(call(Value::from(" a  b c "), "split", vec![]), strs(&["a", "b", "c"]));
        assert_eq!(call(Value::from("a,b,,c"), "split", vec![Value::from(",")]), strs(&["a", "b", "", "c"]));
        assert_eq!(
            call(Value::from("a b c"), "split", vec![Value::None, Value::Int(1)]),
            strs(&["a", "b c"])
        );
        assert_eq!(
            call(Value::from("a b c"), "rsplit", vec![Value::None, Value::Int(1)]),
            strs(&["a b", "c"])
        );
        assert_eq!(call(Value::from("x\ny\n"), "splitlines", vec![]), strs(&["x", "y"]));
    }

    #[test]
    fn test_str_queries() {
        assert_eq!(call(Value::from("héllo"), "find", vec![Value::from("l")]), Value::Int(2));
        assert_eq!(call(Value::from("hello"), "rfind", vec![Value::from("z")]), Value::Int(-1));
        assert_eq!(call(Value::from("banana"), "count", vec![Value::from("an")]), Value::Int(2));
        let prefixes = Value::tuple(vec![Value::from("x"), Value::from("he")]);
        assert_eq!(call(Value::from("hello"), "startswith", vec![prefixes]), Value::Bool(true));
    }

    #[test]
    fn test_str_transforms() {
        assert_eq!(call(Value::from("hello world"), "title", vec![]), Value::from("Hello World"));
        assert_eq!(call(Value::from("-42"), "zfill", vec![Value::Int(5)]), Value::from("-0042"));
        assert_eq!(call(Value::from("ab"), "center", vec![Value::Int(6), Value::from("*")]), Value::from("**ab**"));
        assert_eq!(call(Value::from("xxhixx"), "strip", vec![Value::from("x")]), Value::from("hi"));
        assert_eq!(
            call(Value::from(", "), "join", vec![strs(&["a", "b"])]),
            Value::from("a, b")
        );
        assert_eq!(
            call(Value::from("k=v=w"), "partition", vec![Value::from("=")]),
            Value::tuple(vec![Value::from("k"), Value::from("="), Value::from("v=w")])
        );
    }

    #[test]
    fn test_str_format() {
        let mut interp = Interpreter::default();
        let mut args = CallArgs::new(vec![Value::Int(7), Value::Float(3.14159)]);
        args.keywords.push(("who".into(), Value::from("you")));
        let out = call_method(
            &mut interp,
            &Value::from("{who}: {} {1:.2f} {0:>3} {{x}}"),
            "format",
            args,
        )
        .unwrap();
        assert_eq!(out, Value::from("you: 7 3.14   7 {x}"));
    }

    #[test]
    fn test_bytes_methods() {
        let data = Value::bytes(&b"  ab  "[..]);
        assert_eq!(call(data, "strip", vec![]), Value::bytes(&b"ab"[..]));
        assert_eq!(call(Value::bytes(&b"hi"[..]), "decode", vec![]), Value::from("hi"));
        assert_eq!(
            call(Value::bytes(&b"aXa"[..]), "replace", vec![Value::bytes(&b"a"[..]), Value::bytes(&b"bb"[..])]),
            Value::bytes(&b"bbXbb"[..])
        );
    }

    #[test]
    fn test_list_methods_mutate_in_place() {
        let list = Value::list(vec![Value::Int(3), Value::Int(1)]);
        call(list.clone(), "append", vec![Value::Int(2)]);
        call(list.clone(), "sort", vec![]);
        assert_eq!(list, Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
        assert_eq!(call(list.clone(), "pop", vec![]), Value::Int(3));
        call(list.clone(), "insert", vec![Value::Int(0), Value::Int(9)]);
        assert_eq!(list, Value::list(vec![Value::Int(9), Value::Int(1), Value::Int(2)]));
        assert_eq!(call(list, "index", vec![Value::Int(2)]), Value::Int(2));
    }

    #[test]
    fn test_dict_methods() {
        let dict: Dict = [("a", Value::Int(1))].into_iter().collect();
        let dict = Value::dict(dict);
        assert_eq!(call(dict.clone(), "get", vec![Value::from("z"), Value::Int(0)]), Value::Int(0));
        assert_eq!(call(dict.clone(), "setdefault", vec![Value::from("b"), Value::Int(2)]), Value::Int(2));
        assert_eq!(call(dict.clone(), "keys", vec![]), strs(&["a", "b"]));
        assert_eq!(call(dict.clone(), "pop", vec![Value::from("a")]), Value::Int(1));
        assert_eq!(call(dict, "items", vec![]), Value::list(vec![Value::tuple(vec![Value::from("b"), Value::Int(2)])]));
    }

    #[test]
    fn test_controller_methods() {
        let controller = Value::Controller(Rc::new(std::cell::RefCell::new(
            crate::whitespace::WsController::new(),
        )));
        call(controller.clone(), "dnl", vec![]);
        assert_eq!(call(controller.clone(), "c", vec![Value::from("  \nrest")]), Value::from("rest"));
        assert_eq!(call(controller, "c", vec![Value::from("  kept")]), Value::from("  kept"));
    }

    #[test]
    fn test_has_method() {
        assert!(has_method(&Value::from("s"), "upper"));
        assert!(!has_method(&Value::from("s"), "append"));
        assert!(!has_method(&Value::Int(1), "upper"));
    }
}
