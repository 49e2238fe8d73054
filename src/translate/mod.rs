//! Conversion between the two coordinate dialects.
//!
//! The language service speaks `lsp_types` (0-based lines and characters).
//! The editor widget speaks 1-based `lineNumber`/`column` and its own
//! completion and marker shapes. Everything that crosses between them goes
//! through one of the functions here.

pub mod proxy;

use lsp_types::{
    ColorInformation, Command, CompletionItem, CompletionItemKind, CompletionTextEdit, Diagnostic,
    DiagnosticRelatedInformation, DiagnosticSeverity, Documentation, Hover, HoverContents,
    InsertTextFormat, MarkedString, MarkupContent, MarkupKind, NumberOrString, Position, Range,
    TextEdit,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use proxy::ProxyDocument;

// ── Editor shapes ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorPosition {
    pub line_number: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorRange {
    pub start_line_number: u32,
    pub start_column: u32,
    pub end_line_number: u32,
    pub end_column: u32,
}

/// Marker severity as the editor numbers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MarkerSeverity {
    Hint = 1,
    Info = 2,
    Warning = 4,
    Error = 8,
}

impl From<MarkerSeverity> for u8 {
    fn from(severity: MarkerSeverity) -> u8 {
        severity as u8
    }
}

impl TryFrom<u8> for MarkerSeverity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            1 => Ok(Self::Hint),
            2 => Ok(Self::Info),
            4 => Ok(Self::Warning),
            8 => Ok(Self::Error),
            other => Err(format!("invalid marker severity {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorRelatedInformation {
    pub resource: String,
    #[serde(flatten)]
    pub range: EditorRange,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorDiagnostic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub severity: MarkerSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub range: EditorRange,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_information: Vec<EditorRelatedInformation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkdownString {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EditorDocumentation {
    Plain(String),
    Markdown(MarkdownString),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorTextEdit {
    pub range: EditorRange,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorCommand {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Value>,
}

/// Insert-text rule flag: the text is a snippet.
pub const INSERT_AS_SNIPPET: u8 = 4;

/// Editor kind number for custom colors; it has no service counterpart.
pub const EDITOR_KIND_CUSTOM_COLOR: u8 = 22;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorCompletionItem {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<EditorDocumentation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_text: Option<String>,
    pub insert_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_text_rules: Option<u8>,
    pub range: EditorRange,
    /// The range came from the item's own edit, not the word at the cursor.
    #[serde(default)]
    pub from_edit: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_text_edits: Vec<EditorTextEdit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commit_characters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<EditorCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preselect: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorHover {
    pub contents: Vec<MarkdownString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<EditorRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EditorColor {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EditorColorInformation {
    pub color: EditorColor,
    pub range: EditorRange,
}

// ── Positions and ranges ────────────────────────────────────────────────

/// Shift to 1-based. The editor cannot represent `u32::MAX + 1`, so a line
/// or character of `u32::MAX` clamps to `u32::MAX` and comes back from
/// [`to_service_position`] as `u32::MAX - 1`; every smaller value round-trips.
pub fn to_editor_position(position: Position) -> EditorPosition {
    EditorPosition {
        line_number: position.line.saturating_add(1),
        column: position.character.saturating_add(1),
    }
}

/// Inverse of [`to_editor_position`]. Editor positions below 1 clamp to 0.
pub fn to_service_position(position: EditorPosition) -> Position {
    Position::new(
        position.line_number.saturating_sub(1),
        position.column.saturating_sub(1),
    )
}

pub fn to_editor_range(range: Range) -> EditorRange {
    let start = to_editor_position(range.start);
    let end = to_editor_position(range.end);
    EditorRange {
        start_line_number: start.line_number,
        start_column: start.column,
        end_line_number: end.line_number,
        end_column: end.column,
    }
}

pub fn to_service_range(range: EditorRange) -> Range {
    Range::new(
        to_service_position(EditorPosition {
            line_number: range.start_line_number,
            column: range.start_column,
        }),
        to_service_position(EditorPosition {
            line_number: range.end_line_number,
            column: range.end_column,
        }),
    )
}

// ── Diagnostics ─────────────────────────────────────────────────────────

pub fn to_editor_severity(severity: Option<DiagnosticSeverity>) -> MarkerSeverity {
    match severity {
        Some(DiagnosticSeverity::ERROR) => MarkerSeverity::Error,
        Some(DiagnosticSeverity::WARNING) => MarkerSeverity::Warning,
        Some(DiagnosticSeverity::INFORMATION) => MarkerSeverity::Info,
        _ => MarkerSeverity::Hint,
    }
}

pub fn to_editor_diagnostic(diagnostic: &Diagnostic) -> EditorDiagnostic {
    EditorDiagnostic {
        code: diagnostic.code.as_ref().map(|code| match code {
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::String(s) => s.clone(),
        }),
        severity: to_editor_severity(diagnostic.severity),
        message: diagnostic.message.clone(),
        source: diagnostic.source.clone(),
        range: to_editor_range(diagnostic.range),
        related_information: diagnostic
            .related_information
            .iter()
            .flatten()
            .map(to_editor_related)
            .collect(),
    }
}

pub fn to_editor_diagnostics(diagnostics: &[Diagnostic]) -> Vec<EditorDiagnostic> {
    diagnostics.iter().map(to_editor_diagnostic).collect()
}

fn to_editor_related(info: &DiagnosticRelatedInformation) -> EditorRelatedInformation {
    EditorRelatedInformation {
        resource: info.location.uri.as_str().to_string(),
        range: to_editor_range(info.location.range),
        message: info.message.clone(),
    }
}

// ── Completion ──────────────────────────────────────────────────────────

/// Service kind ↔ editor kind. The editor numbering starts at 0 and orders
/// the kinds differently.
const KINDS: [(CompletionItemKind, u8); 25] = [
    (CompletionItemKind::METHOD, 0),
    (CompletionItemKind::FUNCTION, 1),
    (CompletionItemKind::CONSTRUCTOR, 2),
    (CompletionItemKind::FIELD, 3),
    (CompletionItemKind::VARIABLE, 4),
    (CompletionItemKind::CLASS, 5),
    (CompletionItemKind::STRUCT, 6),
    (CompletionItemKind::INTERFACE, 7),
    (CompletionItemKind::MODULE, 8),
    (CompletionItemKind::PROPERTY, 9),
    (CompletionItemKind::EVENT, 10),
    (CompletionItemKind::OPERATOR, 11),
    (CompletionItemKind::UNIT, 12),
    (CompletionItemKind::VALUE, 13),
    (CompletionItemKind::CONSTANT, 14),
    (CompletionItemKind::ENUM, 15),
    (CompletionItemKind::ENUM_MEMBER, 16),
    (CompletionItemKind::KEYWORD, 17),
    (CompletionItemKind::TEXT, 18),
    (CompletionItemKind::COLOR, 19),
    (CompletionItemKind::FILE, 20),
    (CompletionItemKind::REFERENCE, 21),
    (CompletionItemKind::FOLDER, 23),
    (CompletionItemKind::TYPE_PARAMETER, 24),
    (CompletionItemKind::SNIPPET, 25),
];

pub fn to_editor_kind(kind: CompletionItemKind) -> u8 {
    KINDS
        .iter()
        .find(|(service, _)| *service == kind)
        .map(|(_, editor)| *editor)
        .unwrap_or(18)
}

pub fn to_service_kind(kind: u8) -> CompletionItemKind {
    if kind == EDITOR_KIND_CUSTOM_COLOR {
        return CompletionItemKind::COLOR;
    }
    KINDS
        .iter()
        .find(|(_, editor)| *editor == kind)
        .map(|(service, _)| *service)
        .unwrap_or(CompletionItemKind::TEXT)
}

fn to_editor_documentation(documentation: &Documentation) -> EditorDocumentation {
    match documentation {
        Documentation::String(text) => EditorDocumentation::Plain(text.clone()),
        Documentation::MarkupContent(MarkupContent {
            kind: MarkupKind::PlainText,
            value,
        }) => EditorDocumentation::Plain(value.clone()),
        Documentation::MarkupContent(MarkupContent { value, .. }) => {
            EditorDocumentation::Markdown(MarkdownString {
                value: value.clone(),
            })
        }
    }
}

fn to_editor_text_edit(edit: &TextEdit) -> EditorTextEdit {
    EditorTextEdit {
        range: to_editor_range(edit.range),
        text: edit.new_text.clone(),
    }
}

/// Translate a completion item. `default_range` is the editor's word range
/// at the cursor, used when the item carries no edit of its own.
pub fn to_editor_completion(item: &CompletionItem, default_range: EditorRange) -> EditorCompletionItem {
    let (insert_text, range, from_edit) = match &item.text_edit {
        Some(CompletionTextEdit::Edit(edit)) => (edit.new_text.clone(), to_editor_range(edit.range), true),
        Some(CompletionTextEdit::InsertAndReplace(edit)) => {
            (edit.new_text.clone(), to_editor_range(edit.insert), true)
        }
        None => (
            item.insert_text.clone().unwrap_or_else(|| item.label.clone()),
            default_range,
            false,
        ),
    };
    let snippet = item.insert_text_format == Some(InsertTextFormat::SNIPPET)
        && (from_edit || item.insert_text.is_some());

    EditorCompletionItem {
        label: item.label.clone(),
        kind: item.kind.map(to_editor_kind),
        detail: item.detail.clone(),
        documentation: item.documentation.as_ref().map(to_editor_documentation),
        sort_text: item.sort_text.clone(),
        filter_text: item.filter_text.clone(),
        insert_text,
        insert_text_rules: snippet.then_some(INSERT_AS_SNIPPET),
        range,
        from_edit,
        additional_text_edits: item
            .additional_text_edits
            .iter()
            .flatten()
            .map(to_editor_text_edit)
            .collect(),
        commit_characters: item.commit_characters.clone().unwrap_or_default(),
        command: item.command.as_ref().map(|command| EditorCommand {
            id: command.command.clone(),
            title: command.title.clone(),
            arguments: command.arguments.clone().unwrap_or_default(),
        }),
        deprecated: item.deprecated,
        preselect: item.preselect,
        data: item.data.clone(),
    }
}

/// Inverse of [`to_editor_completion`], for items the editor hands back
/// (e.g. to resolve more detail).
pub fn to_service_completion(item: &EditorCompletionItem) -> CompletionItem {
    let snippet = item
        .insert_text_rules
        .is_some_and(|rules| rules & INSERT_AS_SNIPPET != 0);
    let (text_edit, insert_text) = if item.from_edit {
        (
            Some(CompletionTextEdit::Edit(TextEdit::new(
                to_service_range(item.range),
                item.insert_text.clone(),
            ))),
            None,
        )
    } else {
        (None, Some(item.insert_text.clone()))
    };

    CompletionItem {
        label: item.label.clone(),
        kind: item.kind.map(to_service_kind),
        detail: item.detail.clone(),
        documentation: item.documentation.as_ref().map(|doc| match doc {
            EditorDocumentation::Plain(text) => Documentation::String(text.clone()),
            EditorDocumentation::Markdown(md) => Documentation::MarkupContent(MarkupContent {
                kind: MarkupKind::Markdown,
                value: md.value.clone(),
            }),
        }),
        sort_text: item.sort_text.clone(),
        filter_text: item.filter_text.clone(),
        insert_text,
        insert_text_format: Some(if snippet {
            InsertTextFormat::SNIPPET
        } else {
            InsertTextFormat::PLAIN_TEXT
        }),
        text_edit,
        additional_text_edits: (!item.additional_text_edits.is_empty()).then(|| {
            item.additional_text_edits
                .iter()
                .map(|edit| TextEdit::new(to_service_range(edit.range), edit.text.clone()))
                .collect()
        }),
        commit_characters: (!item.commit_characters.is_empty()).then(|| item.commit_characters.clone()),
        command: item.command.as_ref().map(|command| Command {
            title: command.title.clone(),
            command: command.id.clone(),
            arguments: Some(command.arguments.clone()),
        }),
        deprecated: item.deprecated,
        preselect: item.preselect,
        data: item.data.clone(),
        ..CompletionItem::default()
    }
}

// ── Hover and colors ────────────────────────────────────────────────────

fn marked_to_markdown(marked: &MarkedString) -> MarkdownString {
    match marked {
        MarkedString::String(text) => MarkdownString { value: text.clone() },
        MarkedString::LanguageString(code) => MarkdownString {
            value: format!("```{}\n{}\n```", code.language, code.value),
        },
    }
}

pub fn to_editor_hover(hover: &Hover) -> EditorHover {
    let contents = match &hover.contents {
        HoverContents::Scalar(marked) => vec![marked_to_markdown(marked)],
        HoverContents::Array(items) => items.iter().map(marked_to_markdown).collect(),
        HoverContents::Markup(markup) => vec![MarkdownString {
            value: markup.value.clone(),
        }],
    };
    EditorHover {
        contents,
        range: hover.range.map(to_editor_range),
    }
}

pub fn to_editor_color(info: &ColorInformation) -> EditorColorInformation {
    EditorColorInformation {
        color: EditorColor {
            red: info.color.red,
            green: info.color.green,
            blue: info.color.blue,
            alpha: info.color.alpha,
        },
        range: to_editor_range(info.range),
    }
}
