//! Utility classes generated from the resolved theme, and their css.

use std::collections::HashMap;
use std::fmt::Write;

use serde_json::Value;

use super::classes::{escape_class, ClassInfo, ClassOrigin, Declaration};
use super::resolve::{flatten_section, DarkMode, Important, ResolvedConfig};

/// A core plugin that maps one theme section onto one css property.
#[derive(Debug, Clone, Copy)]
pub struct Family {
    pub plugin: &'static str,
    pub section: &'static str,
    pub class: &'static str,
    pub property: &'static str,
}

pub const FAMILIES: &[Family] = &[
    Family { plugin: "textColor", section: "colors", class: "text", property: "color" },
    Family { plugin: "backgroundColor", section: "colors", class: "bg", property: "background-color" },
    Family { plugin: "borderColor", section: "colors", class: "border", property: "border-color" },
    Family { plugin: "padding", section: "spacing", class: "p", property: "padding" },
    Family { plugin: "margin", section: "spacing", class: "m", property: "margin" },
    Family { plugin: "width", section: "spacing", class: "w", property: "width" },
    Family { plugin: "height", section: "spacing", class: "h", property: "height" },
    Family { plugin: "fontSize", section: "fontSize", class: "text", property: "font-size" },
    Family { plugin: "borderRadius", section: "borderRadius", class: "rounded", property: "border-radius" },
    Family { plugin: "opacity", section: "opacity", class: "opacity", property: "opacity" },
];

/// Core plugins without a theme-driven family.
pub const OTHER_CORE_PLUGINS: &[&str] = &["preflight", "container"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Base,
    Components,
    Utilities,
}

/// One addressable class.
#[derive(Debug, Clone, PartialEq)]
pub struct Utility {
    /// Class name, prefix included, no variants.
    pub class: String,
    /// Core plugin name; `None` for plugin-provided classes.
    pub plugin: Option<&'static str>,
    pub layer: Layer,
    pub declarations: Vec<Declaration>,
}

/// A plugin rule whose selector is not a single class.
#[derive(Debug, Clone, PartialEq)]
struct RawRule {
    selector: String,
    layer: Layer,
    declarations: Vec<Declaration>,
}

/// Everything `@tailwind` directives can expand to, for one config.
#[derive(Debug, Clone, Default)]
pub struct UtilitySet {
    items: Vec<Utility>,
    index: HashMap<String, usize>,
    raw: Vec<RawRule>,
}

impl UtilitySet {
    pub fn generate(config: &ResolvedConfig) -> Self {
        let mut set = Self::default();

        if config.core_plugins.enabled("container") {
            set.push(Utility {
                class: format!("{}container", config.prefix),
                plugin: Some("container"),
                layer: Layer::Components,
                declarations: vec![Declaration::new("width", "100%")],
            });
        }

        for family in FAMILIES {
            if !config.core_plugins.enabled(family.plugin) {
                continue;
            }
            let Some(section) = config.theme.get(family.section) else {
                continue;
            };
            for (key, value) in flatten_section(section) {
                let class = if key == "DEFAULT" {
                    format!("{}{}", config.prefix, family.class)
                } else {
                    format!("{}{}-{}", config.prefix, family.class, key)
                };
                set.push(Utility {
                    class,
                    plugin: Some(family.plugin),
                    layer: Layer::Utilities,
                    declarations: vec![Declaration::new(family.property, value)],
                });
            }
        }

        for (styles, layer) in [
            (&config.plugins.base, Layer::Base),
            (&config.plugins.components, Layer::Components),
            (&config.plugins.utilities, Layer::Utilities),
        ] {
            for object in styles {
                set.add_css_in_js(object, layer);
            }
        }

        set
    }

    fn push(&mut self, utility: Utility) {
        match self.index.get(&utility.class) {
            // Later definitions win, as they would in the cascade.
            Some(&i) => self.items[i] = utility,
            None => {
                self.index.insert(utility.class.clone(), self.items.len());
                self.items.push(utility);
            }
        }
    }

    fn add_css_in_js(&mut self, object: &Value, layer: Layer) {
        let Value::Object(rules) = object else { return };
        for (selector, body) in rules {
            let Value::Object(body) = body else { continue };
            let declarations: Vec<Declaration> = body
                .iter()
                .filter_map(|(prop, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        _ => return None,
                    };
                    Some(Declaration::new(kebab_case(prop), value))
                })
                .collect();

            match single_class(selector) {
                Some(class) if layer != Layer::Base => self.push(Utility {
                    class,
                    plugin: None,
                    layer,
                    declarations,
                }),
                _ => self.raw.push(RawRule {
                    selector: selector.clone(),
                    layer,
                    declarations,
                }),
            }
        }
    }

    pub fn get(&self, class: &str) -> Option<&Utility> {
        self.index.get(class).map(|&i| &self.items[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utility> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Class table entries for every addressable class.
    pub fn class_infos(&self) -> impl Iterator<Item = (String, ClassInfo)> + '_ {
        self.items.iter().map(|u| {
            (
                u.class.clone(),
                ClassInfo {
                    declarations: u.declarations.clone(),
                    origin: match u.layer {
                        Layer::Utilities => ClassOrigin::Utility,
                        Layer::Base | Layer::Components => ClassOrigin::Component,
                    },
                    plugin: u.plugin.map(str::to_string),
                },
            )
        })
    }

    // ── Rendering ───────────────────────────────────────────────────────

    /// Css for `@tailwind base`.
    pub fn render_base(&self, config: &ResolvedConfig, out: &mut CssWriter) {
        if config.core_plugins.enabled("preflight") {
            for (selector, body) in PREFLIGHT {
                out.rule(selector, body.iter().map(|(p, v)| (*p, *v)), false);
            }
        }
        self.render_raw(Layer::Base, out);
    }

    /// Css for `@tailwind components`.
    pub fn render_components(&self, config: &ResolvedConfig, out: &mut CssWriter) {
        for u in self.items.iter().filter(|u| u.layer == Layer::Components) {
            out.class_rule(&u.class, &u.declarations, &Important::No);
            if u.plugin == Some("container") {
                for (_, min) in config.screens() {
                    out.open_block(&format!("@media (min-width: {min})"));
                    out.rule(
                        &format!(".{}", escape_class(&u.class)),
                        [("max-width", min.as_str())],
                        false,
                    );
                    out.close_block();
                }
            }
        }
        self.render_raw(Layer::Components, out);
    }

    /// Css for `@tailwind utilities`, responsive variants included unless
    /// they are rendered separately by `@tailwind screens`.
    pub fn render_utilities(&self, config: &ResolvedConfig, out: &mut CssWriter, with_screens: bool) {
        self.render_variants(config, out, "");
        self.render_raw(Layer::Utilities, out);
        if with_screens {
            self.render_screens(config, out);
        }
    }

    /// Css for `@tailwind screens`: every responsive variant.
    pub fn render_screens(&self, config: &ResolvedConfig, out: &mut CssWriter) {
        for (screen, min) in config.screens() {
            out.open_block(&format!("@media (min-width: {min})"));
            let screen_prefix = format!("{screen}{}", config.separator);
            self.render_variants_filtered(config, out, &screen_prefix, true);
            out.close_block();
        }
    }

    fn render_variants(&self, config: &ResolvedConfig, out: &mut CssWriter, screen_prefix: &str) {
        self.render_variants_filtered(config, out, screen_prefix, false);
    }

    fn render_variants_filtered(
        &self,
        config: &ResolvedConfig,
        out: &mut CssWriter,
        screen_prefix: &str,
        responsive_only: bool,
    ) {
        let sep = &config.separator;

        for family in FAMILIES {
            let variants = config.variants_for(family.plugin);
            if responsive_only && !variants.iter().any(|v| v == "responsive") {
                continue;
            }
            let members: Vec<&Utility> = self
                .items
                .iter()
                .filter(|u| u.plugin == Some(family.plugin))
                .collect();
            if members.is_empty() {
                continue;
            }

            for u in &members {
                let class = format!("{screen_prefix}{}", u.class);
                out.class_rule(&class, &u.declarations, &config.important);
            }

            for variant in variants.iter().filter(|v| *v != "responsive") {
                let dark_media = variant == "dark" && config.dark_mode == DarkMode::Media;
                if dark_media {
                    out.open_block("@media (prefers-color-scheme: dark)");
                }
                for u in &members {
                    let class = format!("{screen_prefix}{variant}{sep}{}", u.class);
                    let Some(selector) = variant_selector(variant, &class, config) else {
                        continue;
                    };
                    out.rule_important(&selector, &u.declarations, &config.important);
                }
                if dark_media {
                    out.close_block();
                }
            }
        }

        // Plugin utilities get responsive variants only.
        for u in self.items.iter().filter(|u| u.plugin.is_none() && u.layer == Layer::Utilities) {
            let class = format!("{screen_prefix}{}", u.class);
            out.class_rule(&class, &u.declarations, &config.important);
        }
    }

    fn render_raw(&self, layer: Layer, out: &mut CssWriter) {
        for rule in self.raw.iter().filter(|r| r.layer == layer) {
            out.rule(
                &rule.selector,
                rule.declarations.iter().map(|d| (d.property.as_str(), d.value.as_str())),
                false,
            );
        }
    }
}

/// Selector for `class` carrying `variant`, or `None` for unknown variants.
pub fn variant_selector(variant: &str, class: &str, config: &ResolvedConfig) -> Option<String> {
    let escaped = escape_class(class);
    let selector = match variant {
        "hover" | "focus" | "active" | "visited" | "disabled" | "focus-within" => {
            format!(".{escaped}:{variant}")
        }
        "first" => format!(".{escaped}:first-child"),
        "last" => format!(".{escaped}:last-child"),
        "odd" => format!(".{escaped}:nth-child(odd)"),
        "even" => format!(".{escaped}:nth-child(even)"),
        "group-hover" => format!(".group:hover .{escaped}"),
        "group-focus" => format!(".group:focus .{escaped}"),
        "dark" => match config.dark_mode {
            DarkMode::Media => format!(".{escaped}"),
            DarkMode::Class => format!(".dark .{escaped}"),
        },
        other if config.plugins.variants.iter().any(|v| v == other) => format!(".{escaped}:{other}"),
        _ => return None,
    };
    Some(selector)
}

fn single_class(selector: &str) -> Option<String> {
    let name = selector.trim().strip_prefix('.')?;
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '\\' | '/' | ':'));
    plain.then(|| super::classes::unescape_class(name))
}

fn kebab_case(prop: &str) -> String {
    if prop.starts_with("--") {
        return prop.to_string();
    }
    let mut out = String::with_capacity(prop.len() + 4);
    for c in prop.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

const PREFLIGHT: &[(&str, &[(&str, &str)])] = &[
    (
        "*, ::before, ::after",
        &[
            ("box-sizing", "border-box"),
            ("border-width", "0"),
            ("border-style", "solid"),
            ("border-color", "currentColor"),
        ],
    ),
    (
        "html",
        &[
            ("line-height", "1.5"),
            ("-webkit-text-size-adjust", "100%"),
            ("font-family", "system-ui, -apple-system, \"Segoe UI\", Roboto, sans-serif"),
        ],
    ),
    ("body", &[("margin", "0"), ("font-family", "inherit"), ("line-height", "inherit")]),
    (
        "h1, h2, h3, h4, h5, h6",
        &[("font-size", "inherit"), ("font-weight", "inherit"), ("margin", "0")],
    ),
    ("p, blockquote, figure, pre", &[("margin", "0")]),
    ("img, svg, video", &[("display", "block"), ("max-width", "100%"), ("height", "auto")]),
    ("button, input, select, textarea", &[("font", "inherit"), ("color", "inherit")]),
];

// ── Writer ─────────────────────────────────────────────────────────────

/// Accumulates css in expanded or compressed form.
#[derive(Debug, Default)]
pub struct CssWriter {
    css: String,
    depth: usize,
    compressed: bool,
}

impl CssWriter {
    pub fn new(compressed: bool) -> Self {
        Self {
            css: String::new(),
            depth: 0,
            compressed,
        }
    }

    pub fn finish(self) -> String {
        self.css
    }

    fn indent(&mut self) {
        if !self.compressed {
            for _ in 0..self.depth {
                self.css.push_str("  ");
            }
        }
    }

    pub fn open_block(&mut self, prelude: &str) {
        self.indent();
        self.css.push_str(prelude);
        self.css.push_str(if self.compressed { "{" } else { " {\n" });
        self.depth += 1;
    }

    pub fn close_block(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.css.push_str(if self.compressed { "}" } else { "}\n" });
    }

    pub fn rule<'a>(
        &mut self,
        selector: &str,
        declarations: impl IntoIterator<Item = (&'a str, &'a str)>,
        important: bool,
    ) {
        self.open_block(selector);
        let bang = if important { " !important" } else { "" };
        for (property, value) in declarations {
            self.indent();
            if self.compressed {
                let _ = write!(self.css, "{property}:{value}{bang};");
            } else {
                let _ = writeln!(self.css, "{property}: {value}{bang};");
            }
        }
        self.close_block();
    }

    fn rule_important(&mut self, selector: &str, declarations: &[Declaration], important: &Important) {
        let pairs = declarations.iter().map(|d| (d.property.as_str(), d.value.as_str()));
        match important {
            Important::No => self.rule(selector, pairs, false),
            Important::Yes => self.rule(selector, pairs, true),
            Important::Selector(scope) => self.rule(&format!("{scope} {selector}"), pairs, false),
        }
    }

    pub fn class_rule(&mut self, class: &str, declarations: &[Declaration], important: &Important) {
        self.rule_important(&format!(".{}", escape_class(class)), declarations, important);
    }
}
