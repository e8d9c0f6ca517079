//! Runtime error types for the prep interpreter.

use std::rc::Rc;

use prep_types::Span;
use thiserror::Error;

use crate::exceptions::{ExcKind, Exception};
use crate::value::Value;

/// A failure surfaced to the caller of a template.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A script exception nobody handled.
    #[error("{kind}: {message}{}", at(.span))]
    Exception {
        kind: String,
        message: String,
        span: Option<Span>,
    },
    /// A callable template was invoked with arguments its signature rejects.
    #[error("SignatureError: {0}")]
    Signature(String),
    /// Conflicting or invalid invocation options.
    #[error("configuration error: {0}")]
    Config(String),
    /// A plain template was called, or a callable one run.
    #[error("wrong kind of template: {0}")]
    WrongKind(String),
    #[error("RuntimeError: step limit of {0} exceeded")]
    StepLimit(u64),
    /// An included template could not be loaded.
    #[error("cannot include '{name}': {source}")]
    Include {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn at(span: &Option<Span>) -> String {
    match span {
        Some(span) => format!(" (at {span})"),
        None => String::new(),
    }
}

impl EvalError {
    /// The exception class name, for unhandled script exceptions.
    pub fn exception_kind(&self) -> Option<&str> {
        match self {
            Self::Exception { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

impl From<Rc<Exception>> for EvalError {
    fn from(exc: Rc<Exception>) -> Self {
        Self::Exception {
            kind: exc.kind.name().to_string(),
            message: exc.message(),
            span: exc.span.get(),
        }
    }
}

/// Result alias for the host-facing API.
pub type EvalResult<T> = Result<T, EvalError>;

/// Why evaluation stopped early.
#[derive(Debug)]
pub enum Unwind {
    /// A script exception, catchable by `try`.
    Raise(Rc<Exception>),
    /// Aborts the whole invocation.
    Fatal(EvalError),
}

impl From<EvalError> for Unwind {
    fn from(err: EvalError) -> Self {
        Self::Fatal(err)
    }
}

impl From<Unwind> for EvalError {
    fn from(unwind: Unwind) -> Self {
        match unwind {
            Unwind::Raise(exc) => exc.into(),
            Unwind::Fatal(err) => err,
        }
    }
}

/// Result alias used while evaluating.
pub type Flow<T> = Result<T, Unwind>;

/// A fresh exception of `kind` with a message argument.
pub fn exception(kind: ExcKind, message: impl Into<String>) -> Unwind {
    Unwind::Raise(Rc::new(Exception::new(
        kind,
        vec![Value::from(message.into())],
    )))
}

/// Raise `kind` with a message.
pub fn raise<T>(kind: ExcKind, message: impl Into<String>) -> Flow<T> {
    Err(exception(kind, message))
}

/// `TypeError` shorthand.
pub fn type_error<T>(message: impl Into<String>) -> Flow<T> {
    raise(ExcKind::TypeError, message)
}
