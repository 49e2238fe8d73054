//! Class attributes in the markup document.

use std::sync::OnceLock;

use lsp_types::{ColorInformation, CompletionItem, Hover, Position};
use regex::Regex;

use super::{class_color, class_completions, class_hover, position_to_offset, range_of};
use crate::compiler::StateSnapshot;

/// An attribute still open at the end of the text.
fn open_attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\bclass(?:Name)?\s*=\s*["']([^"']*)$"#).unwrap())
}

fn attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\bclass(?:Name)?\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap())
}

/// Byte spans of every class attribute value.
fn attribute_values(text: &str) -> impl Iterator<Item = (usize, usize)> + '_ {
    attribute_re()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| (m.start(), m.end()))
}

/// Byte spans of each class inside each attribute value.
fn class_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    for (start, end) in attribute_values(text) {
        let mut offset = start;
        for word in text[start..end].split(char::is_whitespace) {
            if !word.is_empty() {
                spans.push((offset, offset + word.len()));
            }
            offset += word.len() + 1;
        }
    }
    spans
}

pub fn complete(text: &str, position: Position, state: &StateSnapshot) -> Vec<CompletionItem> {
    let offset = position_to_offset(text, position);
    let before = &text[..offset];
    let Some(value) = open_attribute_re().captures(before).and_then(|c| c.get(1)) else {
        return Vec::new();
    };

    let partial = value.as_str().rsplit(char::is_whitespace).next().unwrap_or("");
    let (variants, base) = state.split_variants(partial);
    let base_start = offset - base.len();
    class_completions(state, &variants, range_of(text, base_start, offset))
}

pub fn hover(text: &str, position: Position, state: &StateSnapshot) -> Option<Hover> {
    let offset = position_to_offset(text, position);
    let (start, end) = class_spans(text)
        .into_iter()
        .find(|(start, end)| (*start..=*end).contains(&offset))?;
    class_hover(state, &text[start..end], range_of(text, start, end))
}

pub fn document_colors(text: &str, state: &StateSnapshot) -> Vec<ColorInformation> {
    class_spans(text)
        .into_iter()
        .filter_map(|(start, end)| class_color(state, &text[start..end], range_of(text, start, end)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fixtures;
    use lsp_types::{CompletionTextEdit, HoverContents, Range};

    fn edit_range(item: &CompletionItem) -> Range {
        match &item.text_edit {
            Some(CompletionTextEdit::Edit(edit)) => edit.range,
            _ => panic!("expected a text edit"),
        }
    }

    #[test]
    fn completes_inside_open_attribute() {
        let state = fixtures::state();
        let text = r#"<div class="p-4 md:hov"#;
        let items = complete(text, Position::new(0, text.len() as u32), &state);
        assert!(!items.is_empty());

        // `md:` is already typed, so only the base is replaced.
        let first = items.iter().find(|i| i.label == "p-4").unwrap();
        assert_eq!(edit_range(first), Range::new(Position::new(0, 19), Position::new(0, 22)));
        assert!(items.iter().all(|i| i.label != "md:"));
        assert!(items.iter().any(|i| i.label == "hover:"));
    }

    #[test]
    fn columns_after_astral_characters_are_utf16() {
        let state = fixtures::state();
        // The emoji is one char but two UTF-16 code units.
        let text = "<p>\u{1F600}</p><div class=\"p-";
        let end = text.encode_utf16().count() as u32;
        let items = complete(text, Position::new(0, end), &state);
        let first = items.iter().find(|i| i.label == "p-4").unwrap();
        assert_eq!(edit_range(first), Range::new(Position::new(0, end - 2), Position::new(0, end)));
    }

    #[test]
    fn no_completions_outside_attributes() {
        let state = fixtures::state();
        let text = r#"<div class="p-4">hello"#;
        assert!(complete(text, Position::new(0, text.len() as u32), &state).is_empty());
    }

    #[test]
    fn hover_shows_rule() {
        let state = fixtures::state();
        let text = r#"<p class="m-0 hover:bg-white">x</p>"#;
        let hover = hover(text, Position::new(0, 16), &state).expect("hover");
        let HoverContents::Markup(markup) = hover.contents else {
            panic!("markdown hover")
        };
        assert!(markup.value.contains("background-color: #fff"));
        assert_eq!(
            hover.range,
            Some(Range::new(Position::new(0, 14), Position::new(0, 28)))
        );
    }

    #[test]
    fn colors_for_color_classes() {
        let state = fixtures::state();
        let text = "<p class=\"text-red-500 p-4\"></p>\n<p class='bg-black'></p>";
        let colors = document_colors(text, &state);
        assert_eq!(colors.len(), 2);
        assert_eq!(colors[0].range, Range::new(Position::new(0, 10), Position::new(0, 22)));
        assert_eq!(colors[1].range.start, Position::new(1, 10));
        assert_eq!(colors[1].color.red, 0.0);
    }
}
