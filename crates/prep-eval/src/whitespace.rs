//! The whitespace controller.
//!
//! `.dnl` and `.dws` directives arm the controller; the next literal write
//! consumes the setting. Expression writes disarm it.

use crate::value::Value;

/// Whitespace stripped by the controller. Line feed is not in the class:
/// only `.dws` removes it.
const WS_CLASS: &[char] = &[
    '\u{0009}', '\u{000B}', '\u{000C}', '\u{000D}', '\u{001C}', '\u{001D}', '\u{001E}', '\u{001F}',
    '\u{0020}', '\u{0085}', '\u{00A0}', '\u{1680}', '\u{2000}', '\u{2001}', '\u{2002}', '\u{2003}',
    '\u{2004}', '\u{2005}', '\u{2006}', '\u{2007}', '\u{2008}', '\u{2009}', '\u{200A}', '\u{200B}',
    '\u{2028}', '\u{2029}', '\u{202F}', '\u{205F}', '\u{3000}',
];

fn is_ws(c: char) -> bool {
    WS_CLASS.contains(&c)
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WsState {
    #[default]
    Normal,
    /// Strip whitespace and one line break.
    SuppressToNewline,
    /// Strip whitespace including line breaks.
    SuppressAll,
}

/// Per-invocation whitespace state machine.
#[derive(Debug, Clone, Default)]
pub struct WsController {
    state: WsState,
}

impl WsController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WsState {
        self.state
    }

    /// `.dnl`
    pub fn dnl(&mut self) {
        self.state = WsState::SuppressToNewline;
    }

    /// `.dws`
    pub fn dws(&mut self) {
        self.state = WsState::SuppressAll;
    }

    /// Pass an expression result through, resetting the state.
    pub fn expression(&mut self, value: Value) -> Value {
        self.state = WsState::Normal;
        value
    }

    /// Apply the pending suppression to a literal and reset the state.
    pub fn literal(&mut self, value: Value) -> Value {
        let state = std::mem::take(&mut self.state);
        match value {
            Value::Str(s) => Value::from(strip(&s, state)),
            Value::Bytes(b) => match std::str::from_utf8(&b) {
                Ok(s) => Value::bytes(strip(s, state).as_bytes()),
                Err(_) => Value::Bytes(b),
            },
            other => other,
        }
    }
}

/// Strip leading whitespace according to `state`.
pub fn strip(text: &str, state: WsState) -> &str {
    match state {
        WsState::Normal => text,
        WsState::SuppressToNewline => {
            let rest = text.trim_start_matches(is_ws);
            rest.strip_prefix('\n').unwrap_or(rest)
        }
        WsState::SuppressAll => text.trim_start_matches(|c| is_ws(c) || c == '\n'),
    }
}
