//! The built-in exception hierarchy.

use std::cell::Cell;
use std::fmt;

use prep_types::Span;

use crate::format::to_str;
use crate::value::Value;

/// A built-in exception class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcKind {
    Exception,
    LookupError,
    KeyError,
    IndexError,
    ArithmeticError,
    ZeroDivisionError,
    OverflowError,
    TypeError,
    ValueError,
    NameError,
    AttributeError,
    AssertionError,
    RuntimeError,
    ImportError,
    NotImplementedError,
}

impl ExcKind {
    pub const ALL: &'static [ExcKind] = &[
        Self::Exception,
        Self::LookupError,
        Self::KeyError,
        Self::IndexError,
        Self::ArithmeticError,
        Self::ZeroDivisionError,
        Self::OverflowError,
        Self::TypeError,
        Self::ValueError,
        Self::NameError,
        Self::AttributeError,
        Self::AssertionError,
        Self::RuntimeError,
        Self::ImportError,
        Self::NotImplementedError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Exception => "Exception",
            Self::LookupError => "LookupError",
            Self::KeyError => "KeyError",
            Self::IndexError => "IndexError",
            Self::ArithmeticError => "ArithmeticError",
            Self::ZeroDivisionError => "ZeroDivisionError",
            Self::OverflowError => "OverflowError",
            Self::TypeError => "TypeError",
            Self::ValueError => "ValueError",
            Self::NameError => "NameError",
            Self::AttributeError => "AttributeError",
            Self::AssertionError => "AssertionError",
            Self::RuntimeError => "RuntimeError",
            Self::ImportError => "ImportError",
            Self::NotImplementedError => "NotImplementedError",
        }
    }

    pub fn parent(self) -> Option<ExcKind> {
        match self {
            Self::Exception => None,
            Self::KeyError | Self::IndexError => Some(Self::LookupError),
            Self::ZeroDivisionError | Self::OverflowError => Some(Self::ArithmeticError),
            Self::NotImplementedError => Some(Self::RuntimeError),
            _ => Some(Self::Exception),
        }
    }

    /// Whether `self` is `other` or derives from it.
    pub fn is_subclass_of(self, other: ExcKind) -> bool {
        let mut kind = Some(self);
        while let Some(k) = kind {
            if k == other {
                return true;
            }
            kind = k.parent();
        }
        false
    }
}

impl fmt::Display for ExcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A raised (or raisable) exception instance.
#[derive(Debug)]
pub struct Exception {
    pub kind: ExcKind,
    pub args: Vec<Value>,
    /// Where the exception was raised, filled in as it leaves the first
    /// statement.
    pub span: Cell<Option<Span>>,
}

impl Exception {
    pub fn new(kind: ExcKind, args: Vec<Value>) -> Self {
        Self {
            kind,
            args,
            span: Cell::new(None),
        }
    }

    /// `str(exc)`: the single argument, or the argument tuple.
    pub fn message(&self) -> String {
        match self.args.as_slice() {
            [] => String::new(),
            [one] if self.kind == ExcKind::KeyError => crate::format::repr(one),
            [one] => to_str(one),
            many => crate::format::repr(&Value::tuple(many.to_vec())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy() {
        assert!(ExcKind::KeyError.is_subclass_of(ExcKind::LookupError));
        assert!(ExcKind::KeyError.is_subclass_of(ExcKind::Exception));
        assert!(!ExcKind::KeyError.is_subclass_of(ExcKind::IndexError));
        assert!(ExcKind::ZeroDivisionError.is_subclass_of(ExcKind::ArithmeticError));
    }

    #[test]
    fn test_message() {
        let exc = Exception::new(ExcKind::KeyError, vec![Value::from("k")]);
        assert_eq!(exc.message(), "'k'");
        let exc = Exception::new(ExcKind::ValueError, vec![Value::from("bad")]);
        assert_eq!(exc.message(), "bad");
    }
}
