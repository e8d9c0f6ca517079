//! The executable form of a compiled template.

use crate::ast::{Params, Stmt};
use serde::{Deserialize, Serialize};

/// A generated procedure: script statements plus how the runtime enters them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    /// Logical name of the template it was generated from.
    pub name: String,
    pub kind: ProcedureKind,
    /// Preamble, translated template body and epilogue.
    pub body: Vec<Stmt>,
    /// The template source was supplied as bytes, so default quoting
    /// produces bytes.
    pub bytes: bool,
}

impl Procedure {
    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ProcedureKind::Callable { .. })
    }
}

/// How a procedure is invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcedureKind {
    /// Entered with [`names::DICTIONARY`], [`names::SINK`] and the two quote
    /// overrides bound; writes everything to the sink.
    Plain,
    /// Entered like a function with the declared parameters (always ending
    /// in a `**` catch-all); returns the joined output.
    Callable { params: Params },
}

/// Names the generated code and the runtime agree on.
pub mod names {
    /// Parameter mapping of a plain template.
    pub const DICTIONARY: &str = "dictionary";
    /// Host-provided output callback of a plain template.
    pub const SINK: &str = "__sink__";
    /// Writes literal text through the l-quote function.
    pub const WRITE: &str = "__write__";
    /// Writes expression results through the quote function.
    pub const SWRITE: &str = "__swrite__";
    /// The whitespace controller instance.
    pub const WSS: &str = "__wss__";
    pub const QUOTE_OVERRIDE: &str = "__quoteFunc__";
    pub const LQUOTE_OVERRIDE: &str = "__lquoteFunc__";
    /// Resolved quote function.
    pub const QFUNC: &str = "__qFunc__";
    /// Resolved l-quote function.
    pub const LQFUNC: &str = "__lqFunc__";
    /// Output accumulator of a callable template.
    pub const OUT: &str = "__out__";
    /// Catch-all keyword parameter added to callable signatures.
    pub const KWDS: &str = "__kwds__";

    // ── runtime hooks called by the preamble ──
    pub const GET_CONV: &str = "__get_conv__";
    pub const WSS_NEW: &str = "__wsscontroller__";
    pub const EXPOSE: &str = "__expose__";
    pub const JOIN: &str = "__join__";
    pub const REJECT_KWDS: &str = "__reject_kwds__";

    /// Names a plain template never exposes from its parameter mapping.
    pub const RESERVED: &[&str] = &[
        DICTIONARY,
        "outputfile",
        WRITE,
        SWRITE,
        "__save_sys_stdout__",
        WSS,
        SINK,
        QFUNC,
        LQFUNC,
        QUOTE_OVERRIDE,
        LQUOTE_OVERRIDE,
    ];

    /// Whether `name` is one of the names above.
    pub fn is_reserved(name: &str) -> bool {
        RESERVED.contains(&name)
    }
}
