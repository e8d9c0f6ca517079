//! Converting values to text: `str()`, `repr()` and `%`-formatting.

use crate::error::{raise, type_error, Flow};
use crate::exceptions::ExcKind;
use crate::value::Value;

/// `str(value)`
pub fn to_str(value: &Value) -> String {
    match value {
        Value::Str(s) => s.to_string(),
        Value::Exception(exc) => exc.message(),
        other => repr(other),
    }
}

/// `repr(value)`
pub fn repr(value: &Value) -> String {
    match value {
        Value::None => "None".into(),
        Value::Bool(true) => "True".into(),
        Value::Bool(false) => "False".into(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => float_repr(*f),
        Value::Str(s) => str_repr(s),
        Value::Bytes(b) => bytes_repr(b),
        Value::List(items) => format!("[{}]", join_reprs(&items.borrow())),
        Value::Tuple(items) if items.len() == 1 => format!("({},)", repr(&items[0])),
        Value::Tuple(items) => format!("({})", join_reprs(items)),
        Value::Dict(dict) => {
            let entries: Vec<String> = dict
                .borrow()
                .items()
                .iter()
                .map(|(k, v)| format!("{}: {}", repr(k), repr(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        Value::Function(f) => format!("<function {}>", f.name),
        Value::Native(f) => format!("<built-in function {}>", f.name),
        Value::Method(m) => format!(
            "<built-in method {} of {} object>",
            m.name,
            m.receiver.type_name()
        ),
        Value::Module(m) => format!("<module '{}'>", m.name),
        Value::ExceptionType(kind) => format!("<class '{kind}'>"),
        Value::Exception(exc) => format!("{}({})", exc.kind, join_reprs(&exc.args)),
        Value::Controller(_) => "<wsscontroller>".into(),
    }
}

fn join_reprs(items: &[Value]) -> String {
    items.iter().map(repr).collect::<Vec<_>>().join(", ")
}

/// Shortest text that reads back as `f`, switching to exponent form for
/// very large and very small magnitudes.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let sci = format!("{f:e}");
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if f != 0.0 && !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.abs());
    }
    let plain = f.to_string();
    if plain.contains('.') {
        plain
    } else {
        format!("{plain}.0")
    }
}

/// Quote a string the way `repr` does.
pub fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

pub fn bytes_repr(b: &[u8]) -> String {
    let mut out = String::from("b'");
    for &byte in b {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\x{byte:02x}")),
        }
    }
    out.push('\'');
    out
}

// ══════════════════════════════════════════════════════════════════════════════
// %-formatting
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct Spec {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    width: usize,
    precision: Option<usize>,
}

/// `template % args`
pub fn percent_format(template: &str, args: &Value) -> Flow<String> {
    let mapping = match args {
        Value::Dict(_) => Some(args),
        _ => None,
    };
    let positional: Vec<Value> = match args {
        Value::Tuple(items) => items.as_ref().clone(),
        Value::Dict(_) => Vec::new(),
        other => vec![other.clone()],
    };
    let mut next = positional.iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        // Mapping key
        let mut keyed = None;
        if chars.peek() == Some(&'(') {
            chars.next();
            let mut key = String::new();
            let mut depth = 1;
            for c in chars.by_ref() {
                match c {
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                key.push(c);
            }
            let Some(Value::Dict(dict)) = mapping else {
                return type_error("format requires a mapping");
            };
            let value = dict.borrow().get_str(&key);
            match value {
                Some(value) => keyed = Some(value),
                None => return Err(key_error(key)),
            }
        }

        let mut spec = Spec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.left = true,
                '0' => spec.zero = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '#' => {}
                _ => break,
            }
            chars.next();
        }
        spec.width = take_number(&mut chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(take_number(&mut chars));
        }

        let Some(conversion) = chars.next() else {
            return raise(ExcKind::ValueError, "incomplete format");
        };
        if conversion == '%' {
            out.push('%');
            continue;
        }
        let value = match keyed {
            Some(value) => value,
            None => match next.next() {
                Some(value) => value.clone(),
                None => return type_error("not enough arguments for format string"),
            },
        };
        let text = convert(conversion, &value, &spec)?;
        pad(&mut out, &text, &spec, conversion);
    }

    if mapping.is_none() && next.next().is_some() {
        return type_error("not all arguments converted during string formatting");
    }
    Ok(out)
}

fn key_error(key: String) -> crate::error::Unwind {
    crate::error::Unwind::Raise(std::rc::Rc::new(crate::exceptions::Exception::new(
        ExcKind::KeyError,
        vec![Value::from(key)],
    )))
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> usize {
    let mut n = 0usize;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        n = n.saturating_mul(10).saturating_add(d as usize);
        chars.next();
    }
    n
}

fn convert(conversion: char, value: &Value, spec: &Spec) -> Flow<String> {
    let text = match conversion {
        's' => to_str(value),
        'r' => repr(value),
        'd' | 'i' => {
            let n = match value {
                Value::Float(f) => f.trunc() as i64,
                other => match other.as_int() {
                    Some(n) => n,
                    None => {
                        return type_error(format!(
                            "%{conversion} format: a real number is required, not {}",
                            value.type_name()
                        ))
                    }
                },
            };
            signed(n.to_string(), n < 0, spec)
        }
        'x' | 'X' | 'o' => {
            let Some(n) = value.as_int() else {
                return type_error(format!(
                    "%{conversion} format: an integer is required, not {}",
                    value.type_name()
                ));
            };
            let digits = match conversion {
                'x' => format!("{:x}", n.unsigned_abs()),
                'X' => format!("{:X}", n.unsigned_abs()),
                _ => format!("{:o}", n.unsigned_abs()),
            };
            signed(digits, n < 0, spec)
        }
        'f' | 'F' | 'e' | 'E' => {
            let Some(f) = value.as_float() else {
                return type_error(format!(
                    "must be real number, not {}",
                    value.type_name()
                ));
            };
            let precision = spec.precision.unwrap_or(6);
            let digits = match conversion {
                'f' | 'F' => format!("{:.*}", precision, f.abs()),
                _ => exponent_form(f.abs(), precision, conversion == 'E'),
            };
            signed(digits, f.is_sign_negative() && f != 0.0, spec)
        }
        other => {
            return raise(
                ExcKind::ValueError,
                format!("unsupported format character '{other}'"),
            )
        }
    };
    Ok(match (conversion, spec.precision) {
        ('s' | 'r', Some(p)) => text.chars().take(p).collect(),
        _ => text,
    })
}

/// `1.500000e+00` style.
fn exponent_form(f: f64, precision: usize, upper: bool) -> String {
    let raw = format!("{:.*e}", precision, f);
    let (mantissa, exponent) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    let e = if upper { 'E' } else { 'e' };
    format!("{mantissa}{e}{sign}{:02}", exponent.abs())
}

fn signed(digits: String, negative: bool, spec: &Spec) -> String {
    let digits = digits.trim_start_matches('-').to_string();
    if negative {
        format!("-{digits}")
    } else if spec.plus {
        format!("+{digits}")
    } else if spec.space {
        format!(" {digits}")
    } else {
        digits
    }
}

fn pad(out: &mut String, text: &str, spec: &Spec, conversion: char) {
    let len = text.chars().count();
    if len >= spec.width {
        out.push_str(text);
        return;
    }
    let fill = spec.width - len;
    if spec.left {
        out.push_str(text);
        out.extend(std::iter::repeat(' ').take(fill));
    } else if spec.zero && !matches!(conversion, 's' | 'r') {
        let (sign, digits) = match text.chars().next() {
            Some(c @ ('-' | '+' | ' ')) => (Some(c), &text[1..]),
            _ => (None, text),
        };
        out.extend(sign);
        out.extend(std::iter::repeat('0').take(fill));
        out.push_str(digits);
    } else {
        out.extend(std::iter::repeat(' ').take(fill));
        out.push_str(text);
    }
}
