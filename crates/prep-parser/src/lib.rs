//! Parsers for prep templates and the embedded script language.
//!
//! [`parse_template`] turns a template into a [`Template`](prep_types::tree::Template)
//! statement tree. Directive headers, expressions and `script` blocks are
//! handed to the script [`Parser`], a recursive-descent parser over the
//! tokens of [`prep_lexer::Lexer`].

mod parse_expr;
mod parse_stmt;
pub mod parser;
pub mod template;

pub use parser::{parse_expression, parse_script, Context, Fragment, Parser};
pub use template::{dedent, parse_template, IndentError, TemplateParser};
