//! Directive support in the stylesheet document: `@apply`, `@tailwind`,
//! `@screen`.

use std::sync::OnceLock;

use lsp_types::{ColorInformation, CompletionItem, CompletionItemKind, Diagnostic, Hover, Position};
use regex::Regex;

use super::{
    class_color, class_completions, class_hover, diagnostic, edit, is_class_char, markdown_hover,
    position_to_offset, range_of, word_span,
};
use crate::compiler::engine::TAILWIND_GROUPS;
use crate::compiler::StateSnapshot;

const AT_RULES: &[(&str, &str)] = &[
    ("apply", "Inline the declarations of existing classes."),
    ("tailwind", "Insert generated styles: base, components, utilities or screens."),
    ("screen", "A media query for one of the configured screens."),
];

fn apply_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@apply\s+([^;}\n]*)").unwrap())
}

fn directive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@(tailwind|screen)\s+([\w-]+)").unwrap())
}

fn open_directive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@(apply|tailwind|screen)\s+([^;{}\n]*)$|@([\w-]*)$").unwrap())
}

/// A class named by an `@apply`, with its byte span.
struct Applied<'a> {
    class: &'a str,
    start: usize,
    end: usize,
}

fn applied_classes(text: &str) -> Vec<Applied<'_>> {
    let mut out = Vec::new();
    for caps in apply_re().captures_iter(text) {
        let Some(list) = caps.get(1) else { continue };
        let mut offset = list.start();
        for word in list.as_str().split(char::is_whitespace) {
            if !word.is_empty() && word != "!important" {
                out.push(Applied {
                    class: word,
                    start: offset,
                    end: offset + word.len(),
                });
            }
            offset += word.len() + 1;
        }
    }
    out
}

fn screen_detail(state: &StateSnapshot, screen: &str) -> Option<String> {
    state
        .theme_value(&format!("screens.{screen}"))
        .and_then(|v| v.as_str())
        .map(|min| format!("@media (min-width: {min})"))
}

pub fn complete(text: &str, position: Position, state: Option<&StateSnapshot>) -> Vec<CompletionItem> {
    let offset = position_to_offset(text, position);
    let line_start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let Some(caps) = open_directive_re().captures(&text[line_start..offset]) else {
        return Vec::new();
    };

    if let Some(partial) = caps.get(3) {
        // Replace from the `@` itself.
        let replace = range_of(text, line_start + partial.start() - 1, offset);
        return AT_RULES
            .iter()
            .map(|(name, doc)| CompletionItem {
                label: format!("@{name}"),
                kind: Some(CompletionItemKind::KEYWORD),
                detail: Some(doc.to_string()),
                text_edit: edit(replace, format!("@{name}")),
                ..Default::default()
            })
            .collect();
    }

    let (Some(directive), Some(args)) = (caps.get(1), caps.get(2)) else {
        return Vec::new();
    };
    let word = args.as_str().rsplit(char::is_whitespace).next().unwrap_or("");
    let word_start = offset - word.len();

    match directive.as_str() {
        "tailwind" => TAILWIND_GROUPS
            .iter()
            .map(|group| CompletionItem {
                label: group.to_string(),
                kind: Some(CompletionItemKind::CONSTANT),
                text_edit: edit(range_of(text, word_start, offset), *group),
                ..Default::default()
            })
            .collect(),
        "screen" => state
            .map(|state| {
                state
                    .screens
                    .iter()
                    .map(|screen| CompletionItem {
                        label: screen.clone(),
                        kind: Some(CompletionItemKind::CONSTANT),
                        detail: screen_detail(state, screen),
                        text_edit: edit(range_of(text, word_start, offset), screen.clone()),
                        ..Default::default()
                    })
                    .collect()
            })
            .unwrap_or_default(),
        _ => {
            let Some(state) = state else { return Vec::new() };
            let (variants, base) = state.split_variants(word);
            class_completions(state, &variants, range_of(text, offset - base.len(), offset))
        }
    }
}

pub fn validate(text: &str, state: &StateSnapshot) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for applied in applied_classes(text) {
        let range = range_of(text, applied.start, applied.end);
        let (variants, base) = state.split_variants(applied.class);
        if let Some(unknown) = variants.iter().find(|v| !state.is_variant(v)) {
            diagnostics.push(diagnostic(
                range,
                "invalidVariant",
                format!("the variant '{unknown}' does not exist"),
            ));
        } else if !variants.is_empty() {
            diagnostics.push(diagnostic(
                range,
                "invalidApply",
                format!("'{}' cannot be used with @apply because it has variants", applied.class),
            ));
        } else if !state.classes.contains_key(base) {
            diagnostics.push(diagnostic(
                range,
                "invalidApply",
                format!("'{base}' is not a known class"),
            ));
        }
    }

    for caps in directive_re().captures_iter(text) {
        let (Some(directive), Some(arg)) = (caps.get(1), caps.get(2)) else { continue };
        let range = range_of(text, arg.start(), arg.end());
        let value = arg.as_str();
        match directive.as_str() {
            "tailwind" if !TAILWIND_GROUPS.contains(&value) => diagnostics.push(diagnostic(
                range,
                "invalidTailwindDirective",
                format!(
                    "'{value}' is not a valid group, expected one of {}",
                    TAILWIND_GROUPS.join(", ")
                ),
            )),
            "screen" if !state.screens.iter().any(|s| s == value) => diagnostics.push(diagnostic(
                range,
                "invalidScreen",
                format!("the screen '{value}' does not exist in your theme"),
            )),
            _ => {}
        }
    }

    diagnostics.sort_by_key(|d| (d.range.start.line, d.range.start.character));
    diagnostics
}

pub fn hover(text: &str, position: Position, state: &StateSnapshot) -> Option<Hover> {
    let offset = position_to_offset(text, position);

    if let Some(applied) = applied_classes(text)
        .into_iter()
        .find(|a| (a.start..=a.end).contains(&offset))
    {
        return class_hover(state, applied.class, range_of(text, applied.start, applied.end));
    }

    let (start, end) = word_span(text, offset, is_class_char);
    let word = &text[start..end];
    let before = text[..start].trim_end();
    if before.ends_with("@screen") {
        let detail = screen_detail(state, word)?;
        return Some(markdown_hover(format!("```css\n{detail}\n```"), range_of(text, start, end)));
    }
    None
}

pub fn document_colors(text: &str, state: &StateSnapshot) -> Vec<ColorInformation> {
    applied_classes(text)
        .into_iter()
        .filter_map(|a| class_color(state, a.class, range_of(text, a.start, a.end)))
        .collect()
}
