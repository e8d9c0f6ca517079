//! prep runtime: executes generated procedures.
//!
//! A tree-walking interpreter for the embedded script language, plus the two
//! runtime services generated code relies on: the whitespace controller
//! ([`whitespace`]) and quote resolution ([`quote`]). Template invocation
//! lives in [`runtime`].

pub mod builtins;
pub mod env;
pub mod error;
pub mod exceptions;
pub mod format;
pub mod interpreter;
mod methods;
pub mod ops;
pub mod quote;
pub mod runtime;
pub mod value;
pub mod whitespace;

pub use error::{EvalError, EvalResult, Flow, Unwind};
pub use exceptions::ExcKind;
pub use interpreter::{Interpreter, DEFAULT_STEP_LIMIT};
pub use runtime::{Invocation, TemplateLoader};
pub use value::{CallArgs, Dict, Value};
pub use whitespace::WsController;
