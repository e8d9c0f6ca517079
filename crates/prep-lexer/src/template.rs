//! Template lexer: splits a template into literal text and classified tags.
//!
//! A single pass over `{{` / `}}` delimiters tracks whether we are inside a
//! tag. Text outside tags becomes [`TagKind::Const`]; text inside a tag is
//! classified by its leading keyword. Tags own no text; callers re-slice
//! the source with [`Tag::text`].

use once_cell::sync::Lazy;
use prep_types::{ErrorCode, PrepError, SourceFile, Span};
use regex::{Captures, Regex};
use std::fmt;

/// Opening tag delimiter.
pub const START_DELIMITER: &str = "{{";
/// Closing tag delimiter.
pub const END_DELIMITER: &str = "}}";

/// Literal replacements applied when tag or literal text is materialized,
/// in this order.
pub const UNESCAPES: &[(&str, &str)] = &[("{${", "{{"), ("}$}", "}}"), ("$$", "$")];

/// Apply [`UNESCAPES`] to a piece of template text.
pub fn unescape(text: &str) -> String {
    UNESCAPES
        .iter()
        .fold(text.to_string(), |s, (old, new)| s.replace(old, new))
}

// ─────────────────────────────────────────────────────────────────────
// Patterns
// ─────────────────────────────────────────────────────────────────────

static DELIMITER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*|\}\}").expect("delimiter pattern"));

const START_KEYWORDS: &str = "while|if|elif|for|continue|break|try|except|raise|with|import|from|assert|return";
const END_KEYWORDS: &str =
    "else|script|eval|endwhile|endif|endscript|endeval|endfor|finally|endtry|endwith|enddef";

fn classifier(pattern_matching: bool) -> Regex {
    let (start_extra, end_extra) = if pattern_matching {
        ("|match|case", "|endmatch")
    } else {
        ("", "")
    };
    let pattern = format!(
        r"(?sm)\A(?:(?P<start>{START_KEYWORDS}{start_extra})(?P<startend>\s+|:|$)|(?P<tdef>def\s*[_a-zA-Z])(?P<tdefend>\w*\s*\(.*\)\s*$)|(?P<def>def\s*)(?P<defend>\(|$)|(?P<end>{END_KEYWORDS}{end_extra})(?:\s*$|(?P<endend>.+$)))"
    );
    Regex::new(&pattern).expect("classifier pattern")
}

static CLASSIFIER: Lazy<Regex> = Lazy::new(|| classifier(true));
static CLASSIFIER_NO_MATCH: Lazy<Regex> = Lazy::new(|| classifier(false));

/// Start keywords that are complete on their own, e.g. `{{break}}`.
const BARE_KEYWORDS: &[&str] = &["continue", "break", "try", "except", "return", "raise"];

// ─────────────────────────────────────────────────────────────────────
// Tags
// ─────────────────────────────────────────────────────────────────────

/// Classified kind of a template tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    /// Literal text between tags.
    Const,
    /// Any tag that is not a directive: an expression to write.
    Expr,

    // ── control-start keywords ──
    If,
    Elif,
    Else,
    For,
    While,
    Try,
    Except,
    Finally,
    With,
    Import,
    From,
    Assert,
    Return,
    Break,
    Continue,
    Raise,
    Match,
    Case,

    // ── block-end keywords ──
    EndIf,
    EndFor,
    EndWhile,
    EndTry,
    EndWith,
    EndScript,
    EndEval,
    EndDef,
    EndMatch,

    Script,
    Eval,
    /// `{{def(...)}}`: the callable-template signature.
    Def,
    /// `{{def name(...)}}`: a named sub-block.
    Tdef,
    Eof,
}

impl TagKind {
    /// Look up a directive keyword.
    pub fn from_keyword(word: &str) -> Option<TagKind> {
        Some(match word {
            "if" => Self::If,
            "elif" => Self::Elif,
            "else" => Self::Else,
            "for" => Self::For,
            "while" => Self::While,
            "try" => Self::Try,
            "except" => Self::Except,
            "finally" => Self::Finally,
            "with" => Self::With,
            "import" => Self::Import,
            "from" => Self::From,
            "assert" => Self::Assert,
            "return" => Self::Return,
            "break" => Self::Break,
            "continue" => Self::Continue,
            "raise" => Self::Raise,
            "match" => Self::Match,
            "case" => Self::Case,
            "endif" => Self::EndIf,
            "endfor" => Self::EndFor,
            "endwhile" => Self::EndWhile,
            "endtry" => Self::EndTry,
            "endwith" => Self::EndWith,
            "endscript" => Self::EndScript,
            "endeval" => Self::EndEval,
            "enddef" => Self::EndDef,
            "endmatch" => Self::EndMatch,
            "script" => Self::Script,
            "eval" => Self::Eval,
            _ => return None,
        })
    }

    /// The keyword as written in a template.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Const => "const",
            Self::Expr => "expr",
            Self::If => "if",
            Self::Elif => "elif",
            Self::Else => "else",
            Self::For => "for",
            Self::While => "while",
            Self::Try => "try",
            Self::Except => "except",
            Self::Finally => "finally",
            Self::With => "with",
            Self::Import => "import",
            Self::From => "from",
            Self::Assert => "assert",
            Self::Return => "return",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Raise => "raise",
            Self::Match => "match",
            Self::Case => "case",
            Self::EndIf => "endif",
            Self::EndFor => "endfor",
            Self::EndWhile => "endwhile",
            Self::EndTry => "endtry",
            Self::EndWith => "endwith",
            Self::EndScript => "endscript",
            Self::EndEval => "endeval",
            Self::EndDef => "enddef",
            Self::EndMatch => "endmatch",
            Self::Script => "script",
            Self::Eval => "eval",
            Self::Def => "def",
            Self::Tdef => "tdef",
            Self::Eof => "eof",
        }
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified slice of the template: `source[start..end]`.
///
/// For directives the slice excludes the delimiters and the whitespace that
/// follows `{{`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub kind: TagKind,
    pub start: usize,
    pub end: usize,
}

impl Tag {
    pub fn new(kind: TagKind, start: usize, end: usize) -> Self {
        Self { kind, start, end }
    }

    /// The raw text of the tag.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    /// Span of the tag in the source.
    pub fn span(&self, source: &SourceFile) -> Span {
        source.span(self.start, self.end)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Lexer
// ─────────────────────────────────────────────────────────────────────

/// Lexer options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexOptions {
    /// Recognise `match`, `case` and `endmatch` directives.
    pub pattern_matching: bool,
}

impl Default for LexOptions {
    fn default() -> Self {
        Self {
            pattern_matching: true,
        }
    }
}

/// Whether a callable signature has been seen, and whether anything else
/// came first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefState {
    Unseen,
    Seen,
    OtherFirst,
}

/// The template lexer.
pub struct TemplateLexer<'src> {
    source_file: &'src SourceFile,
    classifier: &'static Regex,
    def_state: DefState,
}

impl<'src> TemplateLexer<'src> {
    pub fn new(source_file: &'src SourceFile, options: LexOptions) -> Self {
        let classifier = if options.pattern_matching {
            Lazy::force(&CLASSIFIER)
        } else {
            Lazy::force(&CLASSIFIER_NO_MATCH)
        };
        Self {
            source_file,
            classifier,
            def_state: DefState::Unseen,
        }
    }

    /// Whether the template opened with a `{{def(...)}}` signature.
    pub fn saw_signature(&self) -> bool {
        self.def_state == DefState::Seen
    }

    /// Lex the whole template. The result always ends with [`TagKind::Eof`].
    pub fn lex(&mut self) -> prep_types::Result<Vec<Tag>> {
        let text = self.source_file.source.as_str();
        let mut tags = Vec::new();
        let mut inside = false;
        let mut ix = 0;

        for m in DELIMITER.find_iter(text) {
            let (i0, i1) = (m.start(), m.end());
            if m.as_str() != END_DELIMITER {
                if inside {
                    return Err(self.error(ErrorCode::UNEXPECTED_OPEN, "unexpected '{{' inside a tag", i0));
                }
                inside = true;
                if i0 != ix {
                    tags.push(Tag::new(TagKind::Const, ix, i0));
                }
                ix = i1;
            } else if inside {
                inside = false;
                let kind = self.classify(ix, i0)?;
                if self.def_state == DefState::Unseen {
                    self.def_state = DefState::OtherFirst;
                }
                if i0 != ix {
                    tags.push(Tag::new(kind, ix, i0));
                }
                ix = i1;
            }
        }

        if inside {
            return Err(self.error(ErrorCode::UNTERMINATED_TAG, "unterminated tag", ix));
        }
        if ix != text.len() {
            tags.push(Tag::new(TagKind::Const, ix, text.len()));
        }
        tags.push(Tag::new(TagKind::Eof, text.len(), text.len()));
        Ok(tags)
    }

    /// Classify the body of a tag spanning `start..end`.
    fn classify(&mut self, start: usize, end: usize) -> prep_types::Result<TagKind> {
        let body = &self.source_file.source[start..end];
        let Some(caps) = self.classifier.captures(body) else {
            return Ok(TagKind::Expr);
        };

        if let Some(word) = caps.name("start") {
            let word = word.as_str();
            if group_is_empty(&caps, "startend") && !BARE_KEYWORDS.contains(&word) {
                return Err(self.bad(word, start));
            }
            return self.keyword(word, start);
        }

        if let Some(word) = caps.name("end") {
            let word = word.as_str();
            if let Some(rest) = caps.name("endend") {
                if rest.as_str().trim() != ":" {
                    return Err(self.bad(word, start));
                }
            }
            return self.keyword(word, start);
        }

        if caps.name("def").is_some() {
            if group_is_empty(&caps, "defend") {
                return Err(self.bad("def", start));
            }
            return match self.def_state {
                DefState::Seen => Err(self.error(ErrorCode::DUPLICATE_DEF, "only one def may be used", start)),
                DefState::OtherFirst => Err(self.error(ErrorCode::DEF_NOT_FIRST, "def must come first", start)),
                DefState::Unseen => {
                    self.def_state = DefState::Seen;
                    Ok(TagKind::Def)
                }
            };
        }

        // The only remaining alternative is a named sub-block.
        Ok(TagKind::Tdef)
    }

    fn keyword(&self, word: &str, offset: usize) -> prep_types::Result<TagKind> {
        TagKind::from_keyword(word).ok_or_else(|| self.bad(word, offset))
    }

    fn bad(&self, word: &str, offset: usize) -> PrepError {
        self.error(ErrorCode::BAD_DIRECTIVE, format!("bad '{word}' directive"), offset)
    }

    fn error(&self, code: ErrorCode, message: impl Into<String>, offset: usize) -> PrepError {
        PrepError::at_offset(self.source_file, code, message, offset)
    }
}

fn group_is_empty(caps: &Captures<'_>, name: &str) -> bool {
    caps.name(name).is_none_or(|m| m.as_str().is_empty())
}
