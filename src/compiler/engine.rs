//! The stylesheet engine seam and its grass-backed implementation.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::resolve::{css_value, flatten_section, ResolvedConfig};
use super::utilities::{CssWriter, UtilitySet};

/// Engine failures, classified by the engine itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The stylesheet is malformed at this 1-based line.
    Syntax { message: String, line: u32 },
    /// The config produced something the engine cannot use.
    Config(String),
    /// Anything else; origin unknown.
    Internal(String),
}

pub struct EngineInput<'a> {
    pub stylesheet: &'a str,
    pub config: &'a ResolvedConfig,
    pub utilities: &'a UtilitySet,
}

pub struct EngineOutput {
    /// Final css, directives expanded.
    pub css: String,
    /// Css compiled from the user's own rules only.
    pub user_css: String,
}

pub trait StylesheetEngine: Send + Sync {
    fn compile(&self, input: &EngineInput<'_>) -> Result<EngineOutput, EngineError>;
}

/// Directive groups `@tailwind` accepts.
pub const TAILWIND_GROUPS: &[&str] = &["base", "components", "utilities", "screens"];

/// Lines the variable prelude occupies in front of the user stylesheet.
const PRELUDE_LINES: u32 = 1;

/// SCSS via `grass`, with `@tailwind`, `@apply`, `@screen` and `theme()`
/// handled around it.
#[derive(Debug, Clone, Default)]
pub struct SassEngine {
    pub minify: bool,
}

impl SassEngine {
    pub fn new(minify: bool) -> Self {
        Self { minify }
    }
}

impl StylesheetEngine for SassEngine {
    fn compile(&self, input: &EngineInput<'_>) -> Result<EngineOutput, EngineError> {
        let expanded = preprocess(input)?;
        let source = format!("{}\n{expanded}", prelude(input.config));

        let style = if self.minify {
            grass::OutputStyle::Compressed
        } else {
            grass::OutputStyle::Expanded
        };
        let options = grass::Options::default()
            .fs(&grass::NullFs)
            .quiet(true)
            .style(style);

        let user_css = grass::from_string(source, &options).map_err(|err| match (*err).kind() {
            grass::ErrorKind::ParseError { message, loc, .. } => {
                let line = loc.begin.line as u32 + 1;
                if line <= PRELUDE_LINES {
                    EngineError::Config(format!("theme value is not valid css: {message}"))
                } else {
                    EngineError::Syntax {
                        message,
                        line: line - PRELUDE_LINES,
                    }
                }
            }
            other => EngineError::Internal(format!("{other:?}")),
        })?;

        let css = expand_directives(&user_css, input, self.minify);
        Ok(EngineOutput { css, user_css })
    }
}

// ── Before grass ───────────────────────────────────────────────────────

/// `$section-key: value;` for every theme leaf that is safe to splice in,
/// all on one line.
fn prelude(config: &ResolvedConfig) -> String {
    let mut line = String::new();
    for (section, value) in &config.theme {
        if !is_ident(section) {
            continue;
        }
        for (key, value) in flatten_section(value) {
            if is_ident(&key) && is_safe_value(&value) {
                line.push_str(&format!("${section}-{key}: {value}; "));
            }
        }
    }
    line
}

fn is_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_safe_value(v: &str) -> bool {
    let banned = [";", "{", "}", "\n", "\r", "#{", "//", "/*", "!", "$", "@", "\\"];
    !v.trim().is_empty()
        && !banned.iter().any(|b| v.contains(b))
        && v.matches('"').count() % 2 == 0
        && v.matches('\'').count() % 2 == 0
}

fn syntax(message: impl Into<String>, line: usize) -> EngineError {
    EngineError::Syntax {
        message: message.into(),
        line: line as u32,
    }
}

/// Expand the directives grass does not know, line by line, never changing
/// the number of lines.
fn preprocess(input: &EngineInput<'_>) -> Result<String, EngineError> {
    static TAILWIND: OnceLock<Regex> = OnceLock::new();
    static SCREEN: OnceLock<Regex> = OnceLock::new();
    static THEME: OnceLock<Regex> = OnceLock::new();
    let tailwind = TAILWIND.get_or_init(|| Regex::new(r"@tailwind\s+([^;\s]*)").unwrap());
    let screen = SCREEN.get_or_init(|| Regex::new(r"@screen\s+([^\s{]*)").unwrap());
    let theme = THEME.get_or_init(|| Regex::new(r#"theme\(\s*['"]([^'"]*)['"]\s*\)"#).unwrap());

    let config = input.config;
    let mut lines = Vec::new();

    for (i, line) in input.stylesheet.split('\n').enumerate() {
        let number = i + 1;

        for caps in tailwind.captures_iter(line) {
            let group = &caps[1];
            if !TAILWIND_GROUPS.contains(&group) {
                return Err(syntax(
                    format!(
                        "`@tailwind {group}` is not a valid group. Valid groups: {}",
                        TAILWIND_GROUPS.join(", ")
                    ),
                    number,
                ));
            }
        }

        let mut line = line.to_string();

        if line.contains("@screen") {
            let screens = config.screens();
            let mut missing = None;
            line = screen
                .replace_all(&line, |caps: &Captures| {
                    match screens.iter().find(|(name, _)| name == &caps[1]) {
                        Some((_, min)) => format!("@media (min-width: {min})"),
                        None => {
                            missing.get_or_insert_with(|| caps[1].to_string());
                            String::new()
                        }
                    }
                })
                .into_owned();
            if let Some(name) = missing {
                return Err(syntax(
                    format!("the `{name}` screen does not exist in your theme"),
                    number,
                ));
            }
        }

        if line.contains("theme(") {
            let mut missing = None;
            line = theme
                .replace_all(&line, |caps: &Captures| {
                    match config.theme_value(&caps[1]).and_then(css_value) {
                        Some(value) => value,
                        None => {
                            missing.get_or_insert_with(|| caps[1].to_string());
                            String::new()
                        }
                    }
                })
                .into_owned();
            if let Some(path) = missing {
                return Err(syntax(
                    format!("`theme('{path}')` does not resolve to a value"),
                    number,
                ));
            }
        }

        if line.contains("@apply") {
            line = expand_apply(&line, input, number)?;
        }

        lines.push(line);
    }

    Ok(lines.join("\n"))
}

/// Replace each `@apply a b c;` on one line with the classes' declarations.
fn expand_apply(line: &str, input: &EngineInput<'_>, number: usize) -> Result<String, EngineError> {
    let mut out = String::with_capacity(line.len() * 2);
    let mut rest = line;

    while let Some(at) = rest.find("@apply") {
        out.push_str(&rest[..at]);
        let after = &rest[at + "@apply".len()..];
        let end = after.find(&[';', '}'][..]).unwrap_or(after.len());
        let consumed = if after[end..].starts_with(';') { end + 1 } else { end };

        let mut important = false;
        let mut classes = Vec::new();
        for token in after[..end].split_whitespace() {
            if token == "!important" {
                important = true;
            } else {
                classes.push(token.trim_start_matches('.'));
            }
        }
        if classes.is_empty() {
            return Err(syntax("`@apply` needs at least one class", number));
        }

        let bang = if important { " !important" } else { "" };
        let mut declarations = Vec::new();
        for class in classes {
            let Some(utility) = input.utilities.get(class) else {
                let sep = &input.config.separator;
                let message = match class.split_once(sep.as_str()) {
                    Some((variant, _)) => format!(
                        "`@apply` cannot be used with `.{class}` because variants like `{variant}{sep}` are not supported"
                    ),
                    None => format!("`@apply` cannot be used with `.{class}` because `.{class}` cannot be found"),
                };
                return Err(syntax(message, number));
            };
            for d in &utility.declarations {
                declarations.push(format!("{}: {}{bang};", d.property, d.value));
            }
        }
        out.push_str(&declarations.join(" "));
        rest = &after[consumed..];
    }

    out.push_str(rest);
    Ok(out)
}

// ── After grass ────────────────────────────────────────────────────────

fn expand_directives(css: &str, input: &EngineInput<'_>, minify: bool) -> String {
    static DIRECTIVE: OnceLock<Regex> = OnceLock::new();
    let directive = DIRECTIVE
        .get_or_init(|| Regex::new(r"@tailwind\s+(base|components|utilities|screens)\s*;?").unwrap());

    if !directive.is_match(css) {
        return css.to_string();
    }
    let has_screens = directive.captures_iter(css).any(|c| &c[1] == "screens");

    directive
        .replace_all(css, |caps: &Captures| {
            let mut out = CssWriter::new(minify);
            let (config, utilities) = (input.config, input.utilities);
            match &caps[1] {
                "base" => utilities.render_base(config, &mut out),
                "components" => utilities.render_components(config, &mut out),
                "utilities" => utilities.render_utilities(config, &mut out, !has_screens),
                _ => utilities.render_screens(config, &mut out),
            }
            out.finish()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ConfigModule;
    use serde_json::json;

    fn run(stylesheet: &str, exports: serde_json::Value, minify: bool) -> Result<EngineOutput, EngineError> {
        let config = ResolvedConfig::from_module(&ConfigModule::from_exports(exports)).unwrap();
        let utilities = UtilitySet::generate(&config);
        SassEngine::new(minify).compile(&EngineInput {
            stylesheet,
            config: &config,
            utilities: &utilities,
        })
    }

    #[test]
    fn plain_rule_compiles() {
        let out = run(".a{color:red}", json!({}), false).expect("compiles");
        assert!(out.css.contains("color: red"), "{}", out.css);

        let out = run(".a{color:red}", json!({}), true).expect("compiles");
        assert!(out.css.contains("color:red"), "{}", out.css);
    }

    #[test]
    fn unterminated_block_is_a_syntax_error_on_line_one() {
        match run(".a{color:red", json!({}), false) {
            Err(EngineError::Syntax { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected syntax error, got {:?}", other.map(|o| o.css)),
        }
    }

    #[test]
    fn syntax_error_line_skips_prelude() {
        let sheet = ".a {\n  color: red;\n}\n\n.b {\n  color: blue;";
        match run(sheet, json!({}), false) {
            Err(EngineError::Syntax { line, .. }) => assert_eq!(line, 6),
            other => panic!("expected syntax error, got {:?}", other.map(|o| o.css)),
        }
    }

    #[test]
    fn theme_variables_are_available() {
        let out = run(".a { color: $colors-red-500; }", json!({}), true).expect("compiles");
        assert!(out.css.contains("color:#f56565"), "{}", out.css);
    }

    #[test]
    fn apply_expands_in_place() {
        let out = run(".btn {\n  @apply p-4 text-red-500;\n}", json!({}), true).expect("compiles");
        assert!(out.css.contains("padding:1rem"), "{}", out.css);
        assert!(out.css.contains("color:#f56565"), "{}", out.css);
    }

    #[test]
    fn apply_important() {
        let out = run(".btn { @apply p-4 !important }", json!({}), true).expect("compiles");
        assert!(out.css.contains("padding:1rem"), "{}", out.css);
        assert!(out.css.contains("important"), "{}", out.css);
    }

    #[test]
    fn apply_unknown_class() {
        let err = run("\n.btn { @apply nope; }", json!({}), false).err();
        match err {
            Some(EngineError::Syntax { message, line }) => {
                assert_eq!(line, 2);
                assert!(message.contains("`.nope`"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn apply_with_variant_is_rejected() {
        let err = run(".btn { @apply hover:p-4; }", json!({}), false).err();
        assert!(matches!(err, Some(EngineError::Syntax { ref message, .. }) if message.contains("hover:")));
    }

    #[test]
    fn invalid_tailwind_group() {
        let err = run("@tailwind base;\n@tailwind nope;", json!({}), false).err();
        assert!(matches!(err, Some(EngineError::Syntax { line: 2, .. })));
    }

    #[test]
    fn tailwind_directives_expand() {
        let out = run(
            "@tailwind base;\n@tailwind components;\n@tailwind utilities;\n.x { color: red }",
            json!({ "corePlugins": ["padding", "container"], "theme": { "spacing": { "4": "1rem" } } }),
            true,
        )
        .expect("compiles");
        assert!(!out.css.contains("@tailwind"), "{}", out.css);
        assert!(out.css.contains(".container{width:100%;}"), "{}", out.css);
        assert!(out.css.contains(".p-4{padding:1rem;}"), "{}", out.css);
        assert!(out.css.contains("@media (min-width: 768px){.md\\:p-4{padding:1rem;}}"), "{}", out.css);
        assert!(out.user_css.contains("@tailwind"));
    }

    #[test]
    fn screen_and_theme_function() {
        let out = run(
            "@screen md { .a { color: theme('colors.blue.500'); } }",
            json!({}),
            true,
        )
        .expect("compiles");
        assert!(out.css.contains("768px"), "{}", out.css);
        assert!(out.css.contains("color:#4299e1"), "{}", out.css);

        let err = run("\n\n@screen tablet { }", json!({}), false).err();
        assert!(matches!(err, Some(EngineError::Syntax { line: 3, .. })));

        let err = run(".a { color: theme('colors.nope'); }", json!({}), false).err();
        assert!(matches!(err, Some(EngineError::Syntax { line: 1, .. })));
    }

    #[test]
    fn unsafe_theme_values_stay_out_of_the_prelude() {
        let out = run(
            ".a { color: red }",
            json!({ "theme": { "extend": { "colors": { "bad": "red; } .x {" } } } }),
            false,
        )
        .expect("compiles");
        assert!(!out.css.contains(".x"));
    }
}
