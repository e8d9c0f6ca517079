//! prep lexers.
//!
//! [`template`] splits a template into literal text and classified tags.
//! [`lexer`] tokenizes the embedded script language found inside tags and
//! `script` blocks.

pub mod lexer;
pub mod template;
pub mod token;

pub use lexer::Lexer;
pub use template::{unescape, LexOptions, Tag, TagKind, TemplateLexer};
pub use token::{Token, TokenKind, KEYWORDS};
