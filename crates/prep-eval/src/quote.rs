//! Quote resolution.
//!
//! A template writes through two functions: the quote function for
//! expression results and the l-quote function for literal text. Callers
//! may override either; the missing one is derived so the pair always
//! agrees on text versus bytes.

use crate::error::{raise, type_error, Flow};
use crate::exceptions::ExcKind;
use crate::format::to_str;
use crate::interpreter::Interpreter;
use crate::value::{CallArgs, Value};

/// A resolved `(quote, lquote)` pair.
#[derive(Debug, Clone)]
pub struct QuotePair {
    pub quote: Value,
    pub lquote: Value,
}

/// Resolve the pair from optional overrides. `bytes` selects the default
/// encoding when neither is given.
pub fn resolve(interp: &mut Interpreter, quote: Value, lquote: Value, bytes: bool) -> Flow<QuotePair> {
    let pair = match (quote.is_truthy(), lquote.is_truthy()) {
        (true, true) => QuotePair { quote, lquote },
        (true, false) => {
            let sample = interp.call_value(&quote, CallArgs::new(vec![Value::from("")]))?;
            let lquote = if matches!(sample, Value::Bytes(_)) {
                as_bytes()
            } else {
                as_text()
            };
            QuotePair { quote, lquote }
        }
        (false, true) => {
            let sample = interp.call_value(&lquote, CallArgs::new(vec![Value::from("")]))?;
            let quote = if matches!(sample, Value::Bytes(_)) {
                bytes_quote()
            } else {
                text_quote()
            };
            QuotePair { quote, lquote }
        }
        (false, false) => defaults(bytes),
    };
    Ok(pair)
}

/// The pair used when nothing is overridden.
pub fn defaults(bytes: bool) -> QuotePair {
    if bytes {
        QuotePair {
            quote: bytes_quote(),
            lquote: as_bytes(),
        }
    } else {
        QuotePair {
            quote: text_quote(),
            lquote: as_text(),
        }
    }
}

/// Coerce an expression result to text. `None` writes nothing.
pub fn text_of(value: &Value) -> Flow<String> {
    Ok(match value {
        Value::None => String::new(),
        Value::Str(s) => s.to_string(),
        Value::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => s.to_string(),
            Err(e) => return raise(ExcKind::ValueError, format!("invalid utf-8 in bytes: {e}")),
        },
        other => to_str(other),
    })
}

fn single_arg(name: &str, args: CallArgs) -> Flow<Value> {
    match <[Value; 1]>::try_from(args.positional) {
        Ok([value]) if args.keywords.is_empty() => Ok(value),
        _ => type_error(format!("{name}() takes exactly one argument")),
    }
}

/// Default quote for text templates.
pub fn text_quote() -> Value {
    Value::native("text_quote", |_, _, args| {
        let value = single_arg("text_quote", args)?;
        Ok(Value::from(text_of(&value)?))
    })
}

/// Default quote for byte templates.
pub fn bytes_quote() -> Value {
    Value::native("bytes_quote", |_, _, args| {
        let value = single_arg("bytes_quote", args)?;
        Ok(Value::bytes(text_of(&value)?.into_bytes()))
    })
}

/// Literal text as text.
pub fn as_text() -> Value {
    Value::native("as_text", |_, _, args| match single_arg("as_text", args)? {
        Value::Bytes(b) => Ok(Value::from(text_of(&Value::Bytes(b))?)),
        other => Ok(other),
    })
}

/// Literal text as UTF-8 bytes.
pub fn as_bytes() -> Value {
    Value::native("as_bytes", |_, _, args| match single_arg("as_bytes", args)? {
        Value::Str(s) => Ok(Value::bytes(s.as_bytes())),
        other => Ok(other),
    })
}

/// Concatenate output pieces. An empty output is `''`, or `b''` for byte
/// templates.
pub fn join(pieces: &[Value], bytes: bool) -> Flow<Value> {
    match pieces.first() {
        None if bytes => Ok(Value::bytes(Vec::new())),
        None => Ok(Value::from("")),
        Some(Value::Bytes(_)) => {
            let mut out = Vec::new();
            for piece in pieces {
                match piece {
                    Value::Bytes(b) => out.extend_from_slice(b),
                    other => {
                        return type_error(format!(
                            "sequence item: expected a bytes-like object, {} found",
                            other.type_name()
                        ))
                    }
                }
            }
            Ok(Value::bytes(out))
        }
        Some(_) => {
            let mut out = String::new();
            for piece in pieces {
                match piece {
                    Value::Str(s) => out.push_str(s),
                    other => {
                        return type_error(format!(
                            "sequence item: expected str instance, {} found",
                            other.type_name()
                        ))
                    }
                }
            }
            Ok(Value::from(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(interp: &mut Interpreter, f: &Value, arg: Value) -> Value {
        interp
            .call_value(f, CallArgs::new(vec![arg]))
            .unwrap_or_else(|_| panic!("quote call failed"))
    }

    fn upper() -> Value {
        Value::native("upper", |_, _, args| {
            Ok(Value::from(to_str(&args.positional[0]).to_uppercase()))
        })
    }

    fn to_bytes() -> Value {
        Value::native("to_bytes", |_, _, args| {
            Ok(Value::bytes(to_str(&args.positional[0]).into_bytes()))
        })
    }

    #[test]
    fn test_defaults() {
        let mut interp = Interpreter::default();
        let pair = resolve(&mut interp, Value::None, Value::None, false).unwrap();
        assert_eq!(apply(&mut interp, &pair.quote, Value::None), Value::from(""));
        assert_eq!(apply(&mut interp, &pair.quote, Value::Int(4)), Value::from("4"));
        assert_eq!(apply(&mut interp, &pair.lquote, Value::from("x")), Value::from("x"));

        let pair = resolve(&mut interp, Value::None, Value::None, true).unwrap();
        assert_eq!(apply(&mut interp, &pair.quote, Value::Int(4)), Value::bytes(&b"4"[..]));
        assert_eq!(apply(&mut interp, &pair.lquote, Value::from("x")), Value::bytes(&b"x"[..]));
    }

    #[test]
    fn test_lquote_follows_text_quote() {
        let mut interp = Interpreter::default();
        let pair = resolve(&mut interp, upper(), Value::None, true).unwrap();
        assert_eq!(apply(&mut interp, &pair.lquote, Value::from("lit")), Value::from("lit"));
    }

    #[test]
    fn test_lquote_follows_bytes_quote() {
        let mut interp = Interpreter::default();
        let pair = resolve(&mut interp, to_bytes(), Value::None, false).unwrap();
        assert_eq!(apply(&mut interp, &pair.lquote, Value::from("lit")), Value::bytes(&b"lit"[..]));
    }

    #[test]
    fn test_quote_follows_lquote() {
        let mut interp = Interpreter::default();
        let pair = resolve(&mut interp, Value::None, to_bytes(), false).unwrap();
        assert_eq!(apply(&mut interp, &pair.quote, Value::Int(1)), Value::bytes(&b"1"[..]));
        let pair = resolve(&mut interp, Value::None, upper(), true).unwrap();
        assert_eq!(apply(&mut interp, &pair.quote, Value::Int(1)), Value::from("1"));
    }

    #[test]
    fn test_join() {
        assert_eq!(join(&[], false).unwrap(), Value::from(""));
        assert_eq!(join(&[], true).unwrap(), Value::bytes(Vec::new()));
        let pieces = [Value::from("a"), Value::from("b")];
        assert_eq!(join(&pieces, false).unwrap(), Value::from("ab"));
        assert!(join(&[Value::from("a"), Value::Int(1)], false).is_err());
    }
}
