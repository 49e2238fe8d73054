//! Class names, their declarations, and where they came from.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

impl Declaration {
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClassOrigin {
    /// Generated from the theme by a core plugin.
    Utility,
    /// `@tailwind components` output, including plugin components.
    Component,
    /// Authored in the user stylesheet.
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassInfo {
    pub declarations: Vec<Declaration>,
    pub origin: ClassOrigin,
    /// Core plugin that generated the class, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
}

impl ClassInfo {
    /// The class's rule as shown in hovers.
    pub fn to_css(&self, class: &str) -> String {
        let mut css = format!(".{} {{\n", escape_class(class));
        for decl in &self.declarations {
            css.push_str(&format!("  {}: {};\n", decl.property, decl.value));
        }
        css.push('}');
        css
    }

    /// The first color-ish declaration value, for swatches.
    pub fn color_value(&self) -> Option<&str> {
        self.declarations
            .iter()
            .find(|d| matches!(d.property.as_str(), "color" | "background-color" | "border-color"))
            .map(|d| d.value.as_str())
    }
}

/// Escape a class name for use in a selector.
pub fn escape_class(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if i == 0 && c.is_ascii_digit() {
            out.push_str(&format!("\\3{c} "));
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// Undo [`escape_class`] (and simple hex escapes written by hand).
pub fn unescape_class(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let mut hex = String::new();
        while let Some(h) = chars.peek().copied().filter(|h| h.is_ascii_hexdigit() && hex.len() < 6) {
            hex.push(h);
            chars.next();
        }
        if hex.is_empty() {
            if let Some(next) = chars.next() {
                out.push(next);
            }
            continue;
        }
        if chars.peek() == Some(&' ') {
            chars.next();
        }
        if let Some(decoded) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
            out.push(decoded);
        }
    }
    out
}

/// Parse `a: b; c: d` into declarations.
pub fn parse_declarations(body: &str) -> Vec<Declaration> {
    body.split(';')
        .filter_map(|part| {
            let (property, value) = part.split_once(':')?;
            let (property, value) = (property.trim(), value.trim());
            (!property.is_empty() && !value.is_empty()).then(|| Declaration::new(property, value))
        })
        .collect()
}

/// Collect the classes a compiled stylesheet defines.
///
/// Classes in the last compound of a selector receive the rule's
/// declarations; classes elsewhere in the selector are only recorded.
pub fn scan(css: &str) -> BTreeMap<String, ClassInfo> {
    static RULE: OnceLock<Regex> = OnceLock::new();
    static CLASS: OnceLock<Regex> = OnceLock::new();
    let rule = RULE.get_or_init(|| Regex::new(r"([^{};]+)\{([^{}]*)\}").unwrap());
    let class = CLASS.get_or_init(|| Regex::new(r"\.((?:\\[0-9a-fA-F]{1,6} ?|\\.|[A-Za-z0-9_-])+)").unwrap());

    let mut classes: BTreeMap<String, ClassInfo> = BTreeMap::new();
    for caps in rule.captures_iter(css) {
        let selectors = caps[1].trim();
        if selectors.starts_with('@') {
            continue;
        }
        let declarations = parse_declarations(&caps[2]);

        for selector in selectors.split(',') {
            let selector = selector.trim();
            let subject_start = selector
                .rfind(|c: char| c.is_whitespace() || c == '>' || c == '+' || c == '~')
                .map(|i| i + 1)
                .unwrap_or(0);

            for m in class.captures_iter(selector) {
                let Some(name) = m.get(1) else { continue };
                let entry = classes
                    .entry(unescape_class(name.as_str()))
                    .or_insert_with(|| ClassInfo {
                        declarations: Vec::new(),
                        origin: ClassOrigin::User,
                        plugin: None,
                    });
                if name.start() >= subject_start {
                    entry.declarations.extend(declarations.iter().cloned());
                }
            }
        }
    }
    classes
}
