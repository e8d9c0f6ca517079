//! prep code generator: lowers a parsed template into a [`Procedure`].
//!
//! # Architecture
//!
//! The generator walks the [`prep_types::tree::Template`] built by the
//! template parser and emits script statements that the interpreter runs
//! directly. Literal text becomes `__write__(text)`, expression tags become
//! `__swrite__(expr)`, and control directives become the matching script
//! statements.
//!
//! ## Plain templates
//!
//! Entered with `dictionary`, `__sink__`, `__quoteFunc__` and
//! `__lquoteFunc__` bound. The preamble resolves the quote pair, creates a
//! whitespace controller, defines the two write helpers on top of the sink
//! and exposes identifier keys of `dictionary` as locals.
//!
//! ## Callable templates
//!
//! Entered like a function with the declared parameters plus a `**`
//! catch-all. The preamble pops the two quote overrides from the catch-all,
//! rejects any other unexpected keyword, and writes into an accumulator
//! that the epilogue joins and returns.
//!
//! [`Procedure`]: prep_types::Procedure

pub mod compiler;
pub mod error;
mod preamble;
pub mod printer;

pub use compiler::{generate, CodegenOptions};
pub use error::{CodegenError, CodegenResult};
pub use printer::{print_expr, print_procedure, print_stmts};
