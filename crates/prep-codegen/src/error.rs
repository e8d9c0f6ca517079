//! Codegen error types.

use prep_types::{ErrorCode, PrepError, SourceFile, Span};
use thiserror::Error;

/// Errors that can occur while lowering a template.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodegenError {
    /// A signature parameter or sub-block would shadow a name the generated
    /// code relies on.
    #[error("'{name}' is reserved for generated code")]
    ReservedName { name: String, span: Span },
}

impl CodegenError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ReservedName { .. } => ErrorCode::BAD_SIGNATURE,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::ReservedName { span, .. } => *span,
        }
    }

    /// Render as a positioned diagnostic against the template source.
    pub fn to_prep_error(&self, source: &SourceFile) -> PrepError {
        PrepError::at(source, self.code(), self.to_string(), self.span())
    }
}

/// Codegen result type alias.
pub type CodegenResult<T> = Result<T, CodegenError>;
