use crate::{SourceFile, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Malformed tag syntax found while splitting the template.
    Lex,
    /// Invalid nesting, ordering or signature, or a grammar error inside a
    /// directive body.
    Parse,
    /// Failures while lowering the statement tree.
    Compile,
}

/// Numeric error code (L100–L199, P200–P299, C300–C399).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Template lexer (L100–L109) ──
    pub const UNEXPECTED_OPEN: Self = Self(100);
    pub const UNTERMINATED_TAG: Self = Self(101);
    pub const DUPLICATE_DEF: Self = Self(102);
    pub const DEF_NOT_FIRST: Self = Self(103);
    pub const BAD_DIRECTIVE: Self = Self(104);

    // ── Script tokenizer (L110–L199) ──
    pub const BAD_CHARACTER: Self = Self(110);
    pub const UNTERMINATED_STRING: Self = Self(111);
    pub const BAD_INDENT: Self = Self(112);
    pub const BAD_NUMBER: Self = Self(113);

    // ── Parser (P200–P299) ──
    pub const INVALID_SYNTAX: Self = Self(200);
    pub const UNEXPECTED_DIRECTIVE: Self = Self(201);
    pub const MISSING_END: Self = Self(202);
    pub const OUTSIDE_LOOP: Self = Self(203);
    pub const OUTSIDE_FUNCTION: Self = Self(204);
    pub const BAD_MATCH: Self = Self(205);
    pub const INCONSISTENT_INDENT: Self = Self(206);
    pub const BAD_TARGET: Self = Self(207);

    // ── Code generation (C300–C399) ──
    pub const BAD_SIGNATURE: Self = Self(300);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=199 => ErrorCategory::Lex,
            200..=299 => ErrorCategory::Parse,
            _ => ErrorCategory::Compile,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.category() {
            ErrorCategory::Lex => 'L',
            ErrorCategory::Parse => 'P',
            ErrorCategory::Compile => 'C',
        };
        write!(f, "{prefix}{}", self.0)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex => write!(f, "lex"),
            Self::Parse => write!(f, "parse"),
            Self::Compile => write!(f, "compile"),
        }
    }
}

/// A structured template diagnostic.
///
/// Lexing and parsing stop at the first error, so a compilation produces at
/// most one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepError {
    /// Source file name.
    pub file: String,
    /// Error code (e.g., P203).
    pub code: ErrorCode,
    /// Error category (derived from code).
    pub category: ErrorCategory,
    /// Human-readable error message.
    pub message: String,
    /// Location in the original template.
    #[serde(flatten)]
    pub span: Span,
    /// The exact source line for context.
    pub source_line: String,
    /// Byte offset into the template, when the error came from the lexer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl PrepError {
    /// Create a new error.
    pub fn new(
        file: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            code,
            category: code.category(),
            message: message.into(),
            span,
            source_line: source_line.into(),
            offset: None,
        }
    }

    /// Create an error at a byte offset of a source file.
    pub fn at_offset(source: &SourceFile, code: ErrorCode, message: impl Into<String>, offset: usize) -> Self {
        let span = source.span(offset, offset);
        let mut err = Self::at(source, code, message, span);
        err.offset = Some(offset);
        err
    }

    /// Create an error against a source file, filling in the offending line.
    pub fn at(source: &SourceFile, code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        let line = source.line(span.start_line).unwrap_or_default();
        Self::new(source.name.clone(), code, message, span, line)
    }

    /// The offending line with a caret under the error column.
    pub fn snippet(&self) -> String {
        let pad: String = self
            .source_line
            .chars()
            .take(self.span.start_col.saturating_sub(1) as usize)
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect();
        format!("{}\n{}^", self.source_line, pad)
    }
}

impl fmt::Display for PrepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}] {}\n{}",
            self.file,
            self.span,
            self.code,
            self.category,
            self.message,
            self.snippet()
        )
    }
}

impl std::error::Error for PrepError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(format!("{}", ErrorCode::UNTERMINATED_TAG), "L101");
        assert_eq!(format!("{}", ErrorCode::OUTSIDE_LOOP), "P203");
        assert_eq!(format!("{}", ErrorCode::BAD_SIGNATURE), "C300");
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::DUPLICATE_DEF.category(), ErrorCategory::Lex);
        assert_eq!(ErrorCode::BAD_INDENT.category(), ErrorCategory::Lex);
        assert_eq!(ErrorCode::BAD_MATCH.category(), ErrorCategory::Parse);
        assert_eq!(ErrorCode::BAD_SIGNATURE.category(), ErrorCategory::Compile);
    }

    #[test]
    fn test_error_at_fills_source_line() {
        let sf = SourceFile::new("page.prep", "first\nab {{x\nthird");
        let err = PrepError::at(&sf, ErrorCode::UNTERMINATED_TAG, "unterminated tag", Span::point(2, 4));
        assert_eq!(err.source_line, "ab {{x");
        assert_eq!(err.snippet(), "ab {{x\n   ^");
        assert_eq!(err.category, ErrorCategory::Lex);
    }

    #[test]
    fn test_error_at_offset_records_offset() {
        let sf = SourceFile::new("page.prep", "ab\ncd {{ {{x}}");
        let err = PrepError::at_offset(&sf, ErrorCode::UNEXPECTED_OPEN, "unexpected '{{'", 9);
        assert_eq!(err.offset, Some(9));
        assert_eq!(err.span, Span::point(2, 7));
        assert_eq!(err.snippet(), "cd {{ {{x}}\n      ^");
    }

    #[test]
    fn test_error_display() {
        let err = PrepError::new(
            "page.prep",
            ErrorCode::OUTSIDE_LOOP,
            "'break' outside loop",
            Span::new(1, 3, 1, 12),
            "x {{break}}",
        );
        assert_eq!(
            err.to_string(),
            "page.prep:1:3: P203 [parse] 'break' outside loop\nx {{break}}\n  ^"
        );
    }

    #[test]
    fn test_error_json_serialization() {
        let err = PrepError::new(
            "page.prep",
            ErrorCode::DEF_NOT_FIRST,
            "def must come first",
            Span::new(3, 1, 3, 10),
            "{{def(a)}}",
        );
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], 103);
        assert_eq!(json["category"], "lex");
        assert_eq!(json["start_line"], 3);
        let back: PrepError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }
}
