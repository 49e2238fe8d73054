//! Language features for the three editor documents.
//!
//! Every feature reads the [`StateSnapshot`] of the last successful compile;
//! nothing here evaluates the config again. Positions are in the service
//! dialect (0-based lines, UTF-16 columns).

pub mod color;
pub mod config;
pub mod markup;
pub mod stylesheet;

use lsp_types::{
    ColorInformation, Command, CompletionItem, CompletionItemKind, CompletionTextEdit, Diagnostic,
    DiagnosticSeverity, Documentation, Hover, HoverContents, MarkupContent, MarkupKind,
    NumberOrString, Position, Range, TextEdit,
};
use serde::{Deserialize, Serialize};

use crate::compiler::{ClassInfo, StateSnapshot};

/// `source` of every diagnostic produced here.
pub const DIAGNOSTIC_SOURCE: &str = "stylepen";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentKind {
    Markup,
    Stylesheet,
    Config,
}

pub fn complete(kind: DocumentKind, text: &str, position: Position, state: Option<&StateSnapshot>) -> Vec<CompletionItem> {
    match kind {
        DocumentKind::Markup => state.map(|s| markup::complete(text, position, s)).unwrap_or_default(),
        DocumentKind::Stylesheet => stylesheet::complete(text, position, state),
        DocumentKind::Config => config::complete(text, position, state),
    }
}

pub fn hover(kind: DocumentKind, text: &str, position: Position, state: Option<&StateSnapshot>) -> Option<Hover> {
    match kind {
        DocumentKind::Markup => markup::hover(text, position, state?),
        DocumentKind::Stylesheet => stylesheet::hover(text, position, state?),
        DocumentKind::Config => config::hover(text, position),
    }
}

pub fn validate(kind: DocumentKind, text: &str, state: Option<&StateSnapshot>) -> Vec<Diagnostic> {
    match (kind, state) {
        (DocumentKind::Stylesheet, Some(state)) => stylesheet::validate(text, state),
        _ => Vec::new(),
    }
}

pub fn document_colors(kind: DocumentKind, text: &str, state: Option<&StateSnapshot>) -> Vec<ColorInformation> {
    match (kind, state) {
        (DocumentKind::Markup, Some(state)) => markup::document_colors(text, state),
        (DocumentKind::Stylesheet, Some(state)) => stylesheet::document_colors(text, state),
        (DocumentKind::Config, _) => config::document_colors(text),
        _ => Vec::new(),
    }
}

// ── Text positions ──────────────────────────────────────────────────────

/// Convert a byte offset into a line/character position. Characters are
/// counted in UTF-16 code units, as editors count them.
pub fn offset_to_position(source: &str, offset: usize) -> Position {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &source[..offset];
    let line = before.matches('\n').count();
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let character = before[line_start..].encode_utf16().count();
    Position::new(line as u32, character as u32)
}

/// Convert a position into a byte offset, clamping past-the-end lines and
/// columns to the end of the text and of the line. A column inside a
/// surrogate pair resolves to the start of that character.
pub fn position_to_offset(source: &str, position: Position) -> usize {
    let mut line_start = 0;
    for _ in 0..position.line {
        match source[line_start..].find('\n') {
            Some(i) => line_start += i + 1,
            None => return source.len(),
        }
    }
    let line = &source[line_start..];
    let line_end = line.find('\n').unwrap_or(line.len());

    let target = position.character as usize;
    let mut units = 0;
    for (i, c) in line[..line_end].char_indices() {
        units += c.len_utf16();
        if units > target {
            return line_start + i;
        }
    }
    line_start + line_end
}

pub fn range_of(source: &str, start: usize, end: usize) -> Range {
    Range::new(offset_to_position(source, start), offset_to_position(source, end))
}

/// Byte span of the run of `is_word` characters around `offset`.
pub fn word_span(source: &str, offset: usize, is_word: impl Fn(char) -> bool) -> (usize, usize) {
    let offset = offset.min(source.len());
    let start = source[..offset]
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(offset);
    let end = source[offset..]
        .char_indices()
        .find(|(_, c)| !is_word(*c))
        .map(|(i, _)| offset + i)
        .unwrap_or(source.len());
    (start, end)
}

/// Range of the identifier-like word at `position`, used as the default
/// completion range by the editor.
pub fn word_range(source: &str, position: Position) -> Range {
    let offset = position_to_offset(source, position);
    let (start, end) = word_span(source, offset, |c| c.is_alphanumeric() || c == '-' || c == '_');
    range_of(source, start, end)
}

/// Class-name characters, including variant separators and escapes.
pub(crate) fn is_class_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '"' | '\'' | '`' | ';' | '{' | '}' | '<' | '>' | '=')
}

// ── Shared items ────────────────────────────────────────────────────────

/// Zero-pad digit runs so `p-2` sorts before `p-10`.
pub(crate) fn natural_key(label: &str) -> String {
    let mut key = String::with_capacity(label.len() + 8);
    let mut digits = String::new();
    for c in label.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if !digits.is_empty() {
            key.push_str(&format!("{digits:0>8}"));
            digits.clear();
        }
        key.push(c);
    }
    if !digits.is_empty() {
        key.push_str(&format!("{digits:0>8}"));
    }
    key
}

fn edit(range: Range, text: impl Into<String>) -> Option<CompletionTextEdit> {
    Some(CompletionTextEdit::Edit(TextEdit::new(range, text.into())))
}

/// Completion items for `variant:` prefixes and class names, replacing
/// `replace` (the partial class after any variants already typed).
pub(crate) fn class_completions(state: &StateSnapshot, used_variants: &[&str], replace: Range) -> Vec<CompletionItem> {
    let mut items = Vec::with_capacity(state.variants.len() + state.classes.len());

    for (index, variant) in state.variants.iter().enumerate() {
        if used_variants.contains(&variant.as_str()) {
            continue;
        }
        let label = format!("{variant}{}", state.separator);
        items.push(CompletionItem {
            label: label.clone(),
            kind: Some(CompletionItemKind::MODULE),
            sort_text: Some(format!("-{index:05}")),
            text_edit: edit(replace, label),
            command: Some(Command {
                title: String::new(),
                command: "editor.action.triggerSuggest".to_string(),
                arguments: None,
            }),
            ..Default::default()
        });
    }

    for (name, info) in &state.classes {
        let swatch = info.color_value().and_then(color::parse_color);
        items.push(CompletionItem {
            label: name.clone(),
            kind: Some(if swatch.is_some() {
                CompletionItemKind::COLOR
            } else {
                CompletionItemKind::CONSTANT
            }),
            detail: Some(declaration_summary(info)),
            documentation: swatch.map(|c| Documentation::String(color::to_rgb_string(&c))),
            sort_text: Some(natural_key(name)),
            text_edit: edit(replace, name.clone()),
            ..Default::default()
        });
    }

    items
}

fn declaration_summary(info: &ClassInfo) -> String {
    info.declarations
        .iter()
        .map(|d| format!("{}: {}", d.property, d.value))
        .collect::<Vec<_>>()
        .join("; ")
}

pub(crate) fn css_hover(css: String, range: Range) -> Hover {
    Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: format!("```css\n{css}\n```"),
        }),
        range: Some(range),
    }
}

pub(crate) fn markdown_hover(value: String, range: Range) -> Hover {
    Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range: Some(range),
    }
}

/// Look up `class` (with optional variants) and render its rule.
pub(crate) fn class_hover(state: &StateSnapshot, class: &str, range: Range) -> Option<Hover> {
    let (_, base) = state.split_variants(class);
    let info = state.classes.get(base)?;
    Some(css_hover(info.to_css(class), range))
}

/// Swatch for a class whose rule sets a color.
pub(crate) fn class_color(state: &StateSnapshot, class: &str, range: Range) -> Option<ColorInformation> {
    let (_, base) = state.split_variants(class);
    let value = state.classes.get(base)?.color_value()?;
    Some(ColorInformation {
        range,
        color: color::parse_color(value)?,
    })
}

pub(crate) fn diagnostic(range: Range, code: &str, message: String) -> Diagnostic {
    Diagnostic {
        range,
        severity: Some(DiagnosticSeverity::ERROR),
        code: Some(NumberOrString::String(code.to_string())),
        source: Some(DIAGNOSTIC_SOURCE.to_string()),
        message,
        ..Default::default()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::compiler::{compile, SassEngine, StateSnapshot};
    use crate::sandbox::ConfigModule;
    use serde_json::json;

    pub fn state() -> StateSnapshot {
        let module = ConfigModule::from_exports(json!({}));
        compile(&SassEngine::default(), ".card { color: #ef4444; }", &module)
            .expect("default config compiles")
            .state
    }
}
