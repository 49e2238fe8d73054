//! Resolving an evaluated config against the built-in defaults.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::LocatedError;
use crate::sandbox::{ConfigModule, PluginContributions};

/// Theme sections every config starts from.
pub fn default_theme() -> Map<String, Value> {
    let theme = json!({
        "screens": { "sm": "640px", "md": "768px", "lg": "1024px", "xl": "1280px" },
        "colors": {
            "transparent": "transparent",
            "current": "currentColor",
            "black": "#000",
            "white": "#fff",
            "gray": {
                "100": "#f7fafc", "200": "#edf2f7", "300": "#e2e8f0", "400": "#cbd5e0", "500": "#a0aec0",
                "600": "#718096", "700": "#4a5568", "800": "#2d3748", "900": "#1a202c"
            },
            "red": {
                "100": "#fff5f5", "200": "#fed7d7", "300": "#feb2b2", "400": "#fc8181", "500": "#f56565",
                "600": "#e53e3e", "700": "#c53030", "800": "#9b2c2c", "900": "#742a2a"
            },
            "yellow": {
                "100": "#fffff0", "200": "#fefcbf", "300": "#faf089", "400": "#f6e05e", "500": "#ecc94b",
                "600": "#d69e2e", "700": "#b7791f", "800": "#975a16", "900": "#744210"
            },
            "green": {
                "100": "#f0fff4", "200": "#c6f6d5", "300": "#9ae6b4", "400": "#68d391", "500": "#48bb78",
                "600": "#38a169", "700": "#2f855a", "800": "#276749", "900": "#22543d"
            },
            "blue": {
                "100": "#ebf8ff", "200": "#bee3f8", "300": "#90cdf4", "400": "#63b3ed", "500": "#4299e1",
                "600": "#3182ce", "700": "#2b6cb0", "800": "#2c5282", "900": "#2a4365"
            },
            "indigo": {
                "100": "#ebf4ff", "200": "#c3dafe", "300": "#a3bffa", "400": "#7f9cf5", "500": "#667eea",
                "600": "#5a67d8", "700": "#4c51bf", "800": "#434190", "900": "#3c366b"
            },
            "purple": {
                "100": "#faf5ff", "200": "#e9d8fd", "300": "#d6bcfa", "400": "#b794f4", "500": "#9f7aea",
                "600": "#805ad5", "700": "#6b46c1", "800": "#553c9a", "900": "#44337a"
            },
            "pink": {
                "100": "#fff5f7", "200": "#fed7e2", "300": "#fbb6ce", "400": "#f687b3", "500": "#ed64a6",
                "600": "#d53f8c", "700": "#b83280", "800": "#97266d", "900": "#702459"
            }
        },
        "spacing": {
            "px": "1px", "0": "0", "1": "0.25rem", "2": "0.5rem", "3": "0.75rem", "4": "1rem",
            "5": "1.25rem", "6": "1.5rem", "8": "2rem", "10": "2.5rem", "12": "3rem", "16": "4rem",
            "20": "5rem", "24": "6rem", "32": "8rem", "40": "10rem", "48": "12rem", "56": "14rem",
            "64": "16rem"
        },
        "fontSize": {
            "xs": "0.75rem", "sm": "0.875rem", "base": "1rem", "lg": "1.125rem", "xl": "1.25rem",
            "2xl": "1.5rem", "3xl": "1.875rem", "4xl": "2.25rem", "5xl": "3rem", "6xl": "4rem"
        },
        "borderRadius": {
            "none": "0", "sm": "0.125rem", "DEFAULT": "0.25rem", "md": "0.375rem", "lg": "0.5rem",
            "full": "9999px"
        },
        "opacity": { "0": "0", "25": "0.25", "50": "0.5", "75": "0.75", "100": "1" }
    });

    match theme {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Variants each core plugin gets unless the config says otherwise.
pub fn default_variants() -> BTreeMap<String, Vec<String>> {
    let colors = ["responsive", "dark", "group-hover", "hover", "focus"];
    let layout = ["responsive"];

    let mut variants = BTreeMap::new();
    for name in ["textColor", "backgroundColor", "borderColor", "opacity"] {
        variants.insert(name.to_string(), colors.iter().map(|s| s.to_string()).collect());
    }
    for name in ["padding", "margin", "width", "height", "fontSize", "borderRadius"] {
        variants.insert(name.to_string(), layout.iter().map(|s| s.to_string()).collect());
    }
    variants
}

/// Variants that exist without any plugin.
pub const BUILTIN_VARIANTS: &[&str] = &[
    "responsive",
    "dark",
    "group-hover",
    "group-focus",
    "focus-within",
    "hover",
    "focus",
    "active",
    "visited",
    "disabled",
    "first",
    "last",
    "odd",
    "even",
];

/// Which core plugins are on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CorePlugins {
    /// Object form: everything except the keys set to `false`.
    AllExcept(BTreeSet<String>),
    /// Array form: only the listed plugins.
    Only(BTreeSet<String>),
}

impl CorePlugins {
    pub fn enabled(&self, name: &str) -> bool {
        match self {
            CorePlugins::AllExcept(off) => !off.contains(name),
            CorePlugins::Only(on) => on.contains(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DarkMode {
    Media,
    Class,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Important {
    No,
    Yes,
    /// Utilities are scoped under this selector instead of using `!important`.
    Selector(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureFlags {
    pub future: Vec<String>,
    pub experimental: Vec<String>,
}

/// A config after defaults, `theme` and `theme.extend` are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub separator: String,
    pub prefix: String,
    pub important: Important,
    pub theme: Map<String, Value>,
    pub core_plugins: CorePlugins,
    pub variants: BTreeMap<String, Vec<String>>,
    pub dark_mode: DarkMode,
    pub feature_flags: FeatureFlags,
    pub plugins: PluginContributions,
}

impl ResolvedConfig {
    pub fn from_module(module: &ConfigModule) -> Result<Self, LocatedError> {
        let empty = Map::new();
        let exports = match &module.exports {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(LocatedError::config(
                    format!("config must export an object, got {}", type_name(other)),
                    None,
                ))
            }
        };

        let separator = match exports.get("separator") {
            None | Some(Value::Null) => ":".to_string(),
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(_) => {
                return Err(LocatedError::config(
                    "`separator` must be a non-empty string",
                    None,
                ))
            }
        };

        let prefix = match exports.get("prefix") {
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };

        let important = match exports.get("important") {
            Some(Value::Bool(true)) => Important::Yes,
            Some(Value::String(s)) if !s.is_empty() => Important::Selector(s.clone()),
            _ => Important::No,
        };

        let dark_mode = match exports.get("darkMode").or_else(|| exports.get("dark")) {
            Some(Value::String(s)) if s == "class" => DarkMode::Class,
            _ => DarkMode::Media,
        };

        Ok(Self {
            separator,
            prefix,
            important,
            theme: resolve_theme(exports.get("theme")),
            core_plugins: resolve_core_plugins(exports.get("corePlugins")),
            variants: resolve_variants(exports.get("variants")),
            dark_mode,
            feature_flags: FeatureFlags {
                future: flags(exports.get("future")),
                experimental: flags(exports.get("experimental")),
            },
            plugins: module.plugins.clone(),
        })
    }

    /// Look up `section.key.sub` in the resolved theme.
    pub fn theme_value(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut cur = self.theme.get(parts.next()?)?;
        for part in parts {
            cur = cur.as_object()?.get(part)?;
        }
        Some(cur)
    }

    /// Screen name to min-width, in the order the config lists them.
    pub fn screens(&self) -> Vec<(String, String)> {
        match self.theme.get("screens") {
            Some(Value::Object(map)) => map
                .iter()
                .filter_map(|(k, v)| css_value(v).map(|v| (k.clone(), v)))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Every variant name usable in a class, built-in and plugin-added.
    pub fn variant_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.screens().into_iter().map(|(k, _)| k).collect();
        names.extend(
            BUILTIN_VARIANTS
                .iter()
                .filter(|v| **v != "responsive")
                .map(|v| v.to_string()),
        );
        for extra in &self.plugins.variants {
            if !names.contains(extra) {
                names.push(extra.clone());
            }
        }
        names
    }

    pub fn variants_for(&self, plugin: &str) -> &[String] {
        self.variants.get(plugin).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn resolve_theme(user: Option<&Value>) -> Map<String, Value> {
    let mut theme = default_theme();
    let Some(Value::Object(user)) = user else {
        return theme;
    };

    for (section, value) in user {
        if section != "extend" {
            theme.insert(section.clone(), value.clone());
        }
    }

    if let Some(Value::Object(extend)) = user.get("extend") {
        for (section, value) in extend {
            match theme.get_mut(section) {
                Some(existing) => deep_merge(existing, value),
                None => {
                    theme.insert(section.clone(), value.clone());
                }
            }
        }
    }

    theme
}

/// Merge `over` into `base`; objects merge key by key, anything else replaces.
pub fn deep_merge(base: &mut Value, over: &Value) {
    match (base, over) {
        (Value::Object(base), Value::Object(over)) => {
            for (key, value) in over {
                match base.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, over) => *base = over.clone(),
    }
}

fn resolve_core_plugins(value: Option<&Value>) -> CorePlugins {
    match value {
        Some(Value::Array(list)) => CorePlugins::Only(
            list.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        Some(Value::Object(map)) => CorePlugins::AllExcept(
            map.iter()
                .filter(|(_, v)| matches!(v, Value::Bool(false)))
                .map(|(k, _)| k.clone())
                .collect(),
        ),
        _ => CorePlugins::AllExcept(BTreeSet::new()),
    }
}

fn resolve_variants(value: Option<&Value>) -> BTreeMap<String, Vec<String>> {
    let mut variants = default_variants();
    let Some(Value::Object(user)) = value else {
        return variants;
    };

    let strings = |v: &Value| -> Vec<String> {
        v.as_array()
            .map(|a| a.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    };

    for (plugin, list) in user {
        if plugin != "extend" {
            variants.insert(plugin.clone(), strings(list));
        }
    }
    if let Some(Value::Object(extend)) = user.get("extend") {
        for (plugin, list) in extend {
            let entry = variants.entry(plugin.clone()).or_default();
            for v in strings(list) {
                if !entry.contains(&v) {
                    entry.push(v);
                }
            }
        }
    }
    variants
}

fn flags(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if s == "all" => vec!["all".to_string()],
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, v)| matches!(v, Value::Bool(true)))
            .map(|(k, _)| k.clone())
            .collect(),
        _ => Vec::new(),
    }
}

/// A theme leaf as a css value: strings and numbers as-is, string lists
/// joined with commas, `[size, {..}]` tuples by their first element.
pub fn css_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            if items.iter().all(Value::is_string) && !items.is_empty() {
                Some(
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(", "),
                )
            } else {
                items.first().and_then(Value::as_str).map(str::to_string)
            }
        }
        _ => None,
    }
}

/// Flatten a theme section into `(key, css value)` pairs. Nested keys join
/// with `-`; a `DEFAULT` key takes its parent's name.
pub fn flatten_section(section: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into(section, "", &mut out);
    out
}

fn flatten_into(value: &Value, path: &str, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let name = match (path.is_empty(), key.as_str()) {
                    (true, k) => k.to_string(),
                    (false, "DEFAULT") => path.to_string(),
                    (false, k) => format!("{path}-{k}"),
                };
                flatten_into(child, &name, out);
            }
        }
        leaf => {
            if let Some(v) = css_value(leaf) {
                out.push((path.to_string(), v));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(exports: Value) -> ResolvedConfig {
        ResolvedConfig::from_module(&ConfigModule::from_exports(exports)).expect("valid config")
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = resolve(json!({}));
        assert_eq!(config.separator, ":");
        assert_eq!(config.prefix, "");
        assert_eq!(config.important, Important::No);
        assert_eq!(config.theme_value("colors.red.500"), Some(&json!("#f56565")));
        assert!(config.core_plugins.enabled("padding"));
        assert_eq!(config.dark_mode, DarkMode::Media);
    }

    #[test]
    fn theme_replaces_and_extend_merges() {
        let config = resolve(json!({
            "theme": {
                "spacing": { "sm": "2px" },
                "extend": { "colors": { "red": { "950": "#300" }, "brand": "#123" } }
            }
        }));
        assert_eq!(config.theme_value("spacing.sm"), Some(&json!("2px")));
        assert_eq!(config.theme_value("spacing.4"), None);
        assert_eq!(config.theme_value("colors.red.950"), Some(&json!("#300")));
        assert_eq!(config.theme_value("colors.red.500"), Some(&json!("#f56565")));
        assert_eq!(config.theme_value("colors.brand"), Some(&json!("#123")));
    }

    #[test]
    fn separator_must_be_a_non_empty_string() {
        let err = ResolvedConfig::from_module(&ConfigModule::from_exports(json!({ "separator": "" })))
            .unwrap_err();
        assert!(err.message.contains("separator"));
        assert_eq!(err.line, None);

        assert_eq!(resolve(json!({ "separator": "_" })).separator, "_");
    }

    #[test]
    fn non_object_export_is_rejected() {
        let err = ResolvedConfig::from_module(&ConfigModule::from_exports(json!(3))).unwrap_err();
        assert!(err.message.contains("a number"));
    }

    #[test]
    fn core_plugins_both_forms() {
        let config = resolve(json!({ "corePlugins": { "padding": false } }));
        assert!(!config.core_plugins.enabled("padding"));
        assert!(config.core_plugins.enabled("margin"));

        let config = resolve(json!({ "corePlugins": ["margin"] }));
        assert!(!config.core_plugins.enabled("padding"));
        assert!(config.core_plugins.enabled("margin"));
    }

    #[test]
    fn variants_override_and_extend() {
        let config = resolve(json!({
            "variants": { "padding": ["hover"], "extend": { "margin": ["focus"] } }
        }));
        assert_eq!(config.variants_for("padding"), ["hover".to_string()]);
        assert_eq!(
            config.variants_for("margin"),
            ["responsive".to_string(), "focus".to_string()]
        );
    }

    #[test]
    fn feature_flags() {
        let config = resolve(json!({
            "future": { "removeDeprecatedGapUtilities": true, "purgeLayersByDefault": false },
            "experimental": "all"
        }));
        assert_eq!(config.feature_flags.future, vec!["removeDeprecatedGapUtilities"]);
        assert_eq!(config.feature_flags.experimental, vec!["all"]);
    }

    #[test]
    fn flatten_nested_and_default() {
        let pairs = flatten_section(&json!({
            "red": { "DEFAULT": "#f00", "500": "#e00" },
            "sans": ["Inter", "sans-serif"],
            "lg": ["1.125rem", { "lineHeight": "1.75rem" }]
        }));
        assert!(pairs.contains(&("red".into(), "#f00".into())));
        assert!(pairs.contains(&("red-500".into(), "#e00".into())));
        assert!(pairs.contains(&("sans".into(), "Inter, sans-serif".into())));
        assert!(pairs.contains(&("lg".into(), "1.125rem".into())));
    }

    #[test]
    fn variant_names_include_screens_and_plugins() {
        let mut module = ConfigModule::from_exports(json!({}));
        module.plugins.variants.push("hocus".into());
        let config = ResolvedConfig::from_module(&module).unwrap();
        let names = config.variant_names();
        assert!(names.contains(&"md".to_string()));
        assert!(names.contains(&"hover".to_string()));
        assert!(names.contains(&"hocus".to_string()));
        assert!(!names.contains(&"responsive".to_string()));
    }
}
