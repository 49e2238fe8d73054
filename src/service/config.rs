//! The config script: key completion and hover inside the exported object,
//! and swatches for color strings.
//!
//! Completion and hover work on the [`ProxyDocument`], where the export is the
//! annotated `const _exports = { .. }`, and map their ranges back.

use lsp_types::{ColorInformation, CompletionItem, CompletionItemKind, Hover, Position, Range};

use super::{color, edit, markdown_hover, offset_to_position, position_to_offset, range_of};
use crate::compiler::resolve::default_theme;
use crate::compiler::utilities::{FAMILIES, OTHER_CORE_PLUGINS};
use crate::compiler::StateSnapshot;
use crate::lexer::lex;
use crate::token::{Spanned, Token};
use crate::translate::ProxyDocument;

const CONFIG_KEYS: &[(&str, &str)] = &[
    ("theme", "Design tokens: colors, spacing, screens and the rest. Sections under `extend` are merged into the defaults."),
    ("variants", "Variants generated for each core plugin."),
    ("plugins", "Functions that add utilities, components, base styles and variants."),
    ("corePlugins", "Turn core plugins off (object form) or list the ones to keep (array form)."),
    ("prefix", "Prefix added to every generated class."),
    ("important", "`true` marks utilities `!important`; a selector scopes them under it."),
    ("separator", "Separator between variants and the class name. Defaults to `:`."),
    ("darkMode", "`\"media\"` (default) or `\"class\"`."),
    ("future", "Opt into upcoming changes, per flag or `\"all\"`."),
    ("experimental", "Enable experimental features, per flag or `\"all\"`."),
];

#[derive(Debug, Clone, PartialEq)]
enum Frame {
    Object(Option<String>),
    Other,
}

/// Where in the exported object a key would go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Root,
    Theme,
    ThemeExtend,
    CorePlugins,
}

fn scope_of(frames: &[Frame]) -> Option<Scope> {
    let mut keys = Vec::with_capacity(frames.len());
    for frame in frames.iter().skip(1) {
        match frame {
            Frame::Object(Some(key)) => keys.push(key.as_str()),
            _ => return None,
        }
    }
    if !matches!(frames.first(), Some(Frame::Object(_))) {
        return None;
    }
    match keys.as_slice() {
        [] => Some(Scope::Root),
        ["theme"] => Some(Scope::Theme),
        ["theme", "extend"] => Some(Scope::ThemeExtend),
        ["variants"] | ["corePlugins"] => Some(Scope::CorePlugins),
        _ => None,
    }
}

/// Index of the `{` opening the exported object.
fn exports_brace(tokens: &[Spanned]) -> Option<usize> {
    tokens.windows(4).position(|w| {
        matches!(&w[0].token, Token::Ident(s) if s == "const")
            && matches!(&w[1].token, Token::Ident(s) if s == "_exports")
            && w[2].token == Token::Assign
            && w[3].token == Token::LBrace
    }).map(|i| i + 3)
}

/// Open frames after `tokens[root..end]`, or `None` once the exported
/// object has been closed.
fn frames_until(tokens: &[Spanned], root: usize, end: usize) -> Option<Vec<Frame>> {
    let mut frames = Vec::new();
    let mut key: Option<String> = None;
    for (i, spanned) in tokens.iter().enumerate().take(end).skip(root) {
        match &spanned.token {
            Token::LBrace => frames.push(Frame::Object(key.take())),
            Token::LBracket | Token::LParen => {
                key = None;
                frames.push(Frame::Other);
            }
            Token::RBrace | Token::RBracket | Token::RParen => {
                frames.pop();
                if frames.is_empty() {
                    return None;
                }
            }
            Token::Ident(name) | Token::Str(name)
                if tokens.get(i + 1).map(|t| &t.token) == Some(&Token::Colon) =>
            {
                key = Some(name.clone());
            }
            Token::Comma => key = None,
            _ => {}
        }
    }
    Some(frames)
}

fn core_plugin_names() -> impl Iterator<Item = &'static str> {
    let mut names: Vec<&'static str> = FAMILIES.iter().map(|f| f.plugin).collect();
    names.extend(OTHER_CORE_PLUGINS);
    names.into_iter()
}

fn theme_sections(state: Option<&StateSnapshot>, with_extend: bool) -> Vec<String> {
    let mut sections: Vec<String> = default_theme().keys().cloned().collect();
    if let Some(state) = state {
        for key in state.theme.keys() {
            if !sections.contains(key) {
                sections.push(key.clone());
            }
        }
    }
    if with_extend {
        sections.push("extend".to_string());
    }
    sections
}

pub fn complete(text: &str, position: Position, state: Option<&StateSnapshot>) -> Vec<CompletionItem> {
    let proxy = ProxyDocument::new(text);
    let shifted = proxy.text();
    let offset = position_to_offset(shifted, proxy.to_proxy(position));
    let tokens = lex(shifted);
    let Some(root) = exports_brace(&tokens) else {
        return Vec::new();
    };

    let mut end = tokens.partition_point(|t| t.span.end <= offset);
    let mut replace_start = offset;
    if let Some(last) = end.checked_sub(1).and_then(|i| tokens.get(i)) {
        if matches!(last.token, Token::Ident(_)) && last.span.end == offset {
            replace_start = last.span.start;
            end -= 1;
        }
    }
    if end <= root {
        return Vec::new();
    }
    // Keys only go right after `{` or `,`.
    if !matches!(tokens[end - 1].token, Token::LBrace | Token::Comma) {
        return Vec::new();
    }
    let Some(frames) = frames_until(&tokens, root, end) else {
        return Vec::new();
    };
    let Some(scope) = scope_of(&frames) else {
        return Vec::new();
    };

    let replace = proxy.range_from_proxy(Range::new(
        offset_to_position(shifted, replace_start),
        offset_to_position(shifted, offset),
    ));
    let item = |label: String, kind: CompletionItemKind, detail: Option<String>| CompletionItem {
        text_edit: edit(replace, label.clone()),
        label,
        kind: Some(kind),
        detail,
        ..Default::default()
    };

    match scope {
        Scope::Root => CONFIG_KEYS
            .iter()
            .map(|(key, doc)| item(key.to_string(), CompletionItemKind::PROPERTY, Some(doc.to_string())))
            .collect(),
        Scope::Theme | Scope::ThemeExtend => theme_sections(state, scope == Scope::Theme)
            .into_iter()
            .map(|section| item(section, CompletionItemKind::FIELD, None))
            .collect(),
        Scope::CorePlugins => core_plugin_names()
            .map(|name| item(name.to_string(), CompletionItemKind::MODULE, Some("core plugin".to_string())))
            .collect(),
    }
}

fn key_doc(scope: Scope, key: &str) -> Option<String> {
    match scope {
        Scope::Root => CONFIG_KEYS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(k, doc)| format!("**{k}**\n\n{doc}")),
        Scope::Theme | Scope::ThemeExtend => {
            if key == "extend" {
                return Some("**extend**\n\nSections merged into the defaults instead of replacing them.".into());
            }
            let theme = default_theme();
            let section = theme.get(key)?;
            let count = section.as_object().map(|m| m.len()).unwrap_or(0);
            Some(format!("**theme.{key}**\n\n{count} default entries."))
        }
        Scope::CorePlugins => {
            if let Some(family) = FAMILIES.iter().find(|f| f.plugin == key) {
                return Some(format!(
                    "**{key}**\n\nGenerates `{}-*` classes setting `{}` from `theme.{}`.",
                    family.class, family.property, family.section
                ));
            }
            OTHER_CORE_PLUGINS
                .contains(&key)
                .then(|| format!("**{key}**\n\nCore plugin."))
        }
    }
}

pub fn hover(text: &str, position: Position) -> Option<Hover> {
    let proxy = ProxyDocument::new(text);
    let shifted = proxy.text();
    let offset = position_to_offset(shifted, proxy.to_proxy(position));
    let tokens = lex(shifted);
    let root = exports_brace(&tokens)?;

    let index = tokens
        .iter()
        .position(|t| t.span.start <= offset && offset <= t.span.end)?;
    if index <= root || tokens.get(index + 1).map(|t| &t.token) != Some(&Token::Colon) {
        return None;
    }
    let (Token::Ident(key) | Token::Str(key)) = &tokens[index].token else {
        return None;
    };

    let frames = frames_until(&tokens, root, index)?;
    let doc = key_doc(scope_of(&frames)?, key)?;
    let span = &tokens[index].span;
    let range = proxy.range_from_proxy(Range::new(
        offset_to_position(shifted, span.start),
        offset_to_position(shifted, span.end),
    ));
    Some(markdown_hover(doc, range))
}

/// Swatches for string literals holding a color.
pub fn document_colors(text: &str) -> Vec<ColorInformation> {
    lex(text)
        .into_iter()
        .filter_map(|spanned| {
            let Token::Str(value) = &spanned.token else { return None };
            let color = color::parse_color(value)?;
            Some(ColorInformation {
                range: range_of(text, spanned.span.start + 1, spanned.span.end - 1),
                color,
            })
        })
        .collect()
}
