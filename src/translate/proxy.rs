//! The line-shifted copy of the config document that the service works on.
//!
//! The first `module.exports =` assignment is rewritten to a type-annotated
//! `const _exports =` on its own line, so the proxy has exactly one more line
//! than the real document:
//!
//! ```text
//! real                          proxy
//! L    ␣␣module.exports = {     L    ␣␣/** @type {…} */
//!                               L+1  const _exports = {
//! ```
//!
//! `module.exports` and `const _exports` have the same length, so columns
//! after the indent move by exactly the indent width.

use std::sync::OnceLock;

use lsp_types::{Position, Range};
use regex::Regex;

/// Type annotation placed above the rewritten assignment.
pub const TYPE_ANNOTATION: &str = r#"/** @type {import("stylepen").Config} */"#;
pub const EXPORTS_BINDING: &str = "const _exports";

fn exports_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^([ \t]*)module\.exports(\s*=)").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Anchor {
    line: u32,
    indent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyDocument {
    text: String,
    anchor: Option<Anchor>,
}

impl ProxyDocument {
    pub fn new(source: &str) -> Self {
        let Some(caps) = exports_re().captures(source) else {
            return Self {
                text: source.to_string(),
                anchor: None,
            };
        };
        let (Some(whole), Some(indent), Some(assign)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            return Self {
                text: source.to_string(),
                anchor: None,
            };
        };

        let mut text = String::with_capacity(source.len() + TYPE_ANNOTATION.len() + 1);
        text.push_str(&source[..whole.start()]);
        text.push_str(indent.as_str());
        text.push_str(TYPE_ANNOTATION);
        text.push('\n');
        text.push_str(EXPORTS_BINDING);
        text.push_str(assign.as_str());
        text.push_str(&source[whole.end()..]);

        let line = source[..whole.start()].matches('\n').count() as u32;
        Self {
            text,
            anchor: Some(Anchor {
                line,
                indent: indent.as_str().chars().count() as u32,
            }),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Line of `const _exports` in the proxy, if the document has an export.
    pub fn exports_line(&self) -> Option<u32> {
        self.anchor.map(|a| a.line + 1)
    }

    /// Real position → proxy position.
    pub fn to_proxy(&self, position: Position) -> Position {
        let Some(Anchor { line, indent }) = self.anchor else {
            return position;
        };
        match position.line {
            l if l < line => position,
            l if l == line && position.character < indent => position,
            l if l == line => Position::new(line + 1, position.character - indent),
            l => Position::new(l + 1, position.character),
        }
    }

    /// Proxy position → real position. Positions inside the injected
    /// annotation clamp to the end of the indent.
    pub fn from_proxy(&self, position: Position) -> Position {
        let Some(Anchor { line, indent }) = self.anchor else {
            return position;
        };
        match position.line {
            l if l < line => position,
            l if l == line => Position::new(line, position.character.min(indent)),
            l if l == line + 1 => Position::new(line, position.character + indent),
            l => Position::new(l - 1, position.character),
        }
    }

    pub fn range_from_proxy(&self, range: Range) -> Range {
        Range::new(self.from_proxy(range.start), self.from_proxy(range.end))
    }
}
