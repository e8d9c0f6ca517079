//! Compiler error types.

use std::io;
use std::path::PathBuf;

use prep_types::PrepError;
use thiserror::Error;

/// A failure to obtain a compiled artifact. Every variant names the
/// template identity that failed.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Lexing, parsing or code generation rejected the template.
    #[error("cannot compile {identity}: {source}")]
    Template {
        identity: String,
        #[source]
        source: PrepError,
    },
    /// Neither the source file nor a persisted artifact exists.
    #[error("cannot compile {identity}: no source at {}", .path.display())]
    MissingSource { identity: String, path: PathBuf },
    /// A persisted artifact with a valid header has an unreadable body.
    #[error("malformed artifact for {identity}: {reason}")]
    Malformed { identity: String, reason: String },
    #[error("{identity}: cannot {action}: {source}")]
    Io {
        identity: String,
        action: &'static str,
        #[source]
        source: io::Error,
    },
    /// A batch target pattern could not be translated.
    #[error("invalid pattern {identity}: {source}")]
    Pattern {
        identity: String,
        #[source]
        source: regex::Error,
    },
}

impl CompileError {
    /// The template identity (path, pattern or text label) that failed.
    pub fn identity(&self) -> &str {
        match self {
            Self::Template { identity, .. }
            | Self::MissingSource { identity, .. }
            | Self::Malformed { identity, .. }
            | Self::Io { identity, .. }
            | Self::Pattern { identity, .. } => identity,
        }
    }

    /// The positioned diagnostic, for template failures.
    pub fn diagnostic(&self) -> Option<&PrepError> {
        match self {
            Self::Template { source, .. } => Some(source),
            _ => None,
        }
    }

    pub(crate) fn io(identity: impl Into<String>, action: &'static str, source: io::Error) -> Self {
        Self::Io {
            identity: identity.into(),
            action,
            source,
        }
    }
}

/// Compiler result type alias.
pub type CompileResult<T> = Result<T, CompileError>;
