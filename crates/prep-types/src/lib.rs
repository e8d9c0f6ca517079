//! Shared types for the prep template compiler.
//!
//! This crate defines the source spans, diagnostics, the AST of the embedded
//! script language, the template statement tree and the generated
//! [`Procedure`] used across all compiler stages.

mod error;
mod span;
pub mod ast;
pub mod procedure;
pub mod tree;

pub use error::{ErrorCategory, ErrorCode, PrepError};
pub use procedure::{Procedure, ProcedureKind};
pub use span::{Origin, SourceFile, Span};

/// Result type used by the lexing and parsing stages.
pub type Result<T> = std::result::Result<T, PrepError>;
