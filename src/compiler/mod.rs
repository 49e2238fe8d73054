//! Stylesheet compilation against an evaluated config.
//!
//! [`compile`] resolves the config, generates its utilities, runs the
//! [`StylesheetEngine`] and returns the css together with the
//! [`StateSnapshot`] the language service reads.

pub mod classes;
pub mod engine;
pub mod resolve;
pub mod utilities;

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::LocatedError;
use crate::sandbox::ConfigModule;

pub use classes::{ClassInfo, ClassOrigin, Declaration};
pub use engine::{EngineError, EngineInput, EngineOutput, SassEngine, StylesheetEngine};
pub use resolve::{FeatureFlags, ResolvedConfig};
pub use utilities::UtilitySet;

/// The resolved, function-free config and the classes it produced.
///
/// Built once per successful compile; the language service only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub separator: String,
    pub prefix: String,
    /// Variant names usable in class attributes, screens first.
    pub variants: Vec<String>,
    /// Screen names in breakpoint order.
    pub screens: Vec<String>,
    pub theme: Map<String, Value>,
    pub feature_flags: FeatureFlags,
    pub classes: BTreeMap<String, ClassInfo>,
}

impl StateSnapshot {
    fn new(config: &ResolvedConfig, classes: BTreeMap<String, ClassInfo>) -> Self {
        Self {
            separator: config.separator.clone(),
            prefix: config.prefix.clone(),
            variants: config.variant_names(),
            screens: config.screens().into_iter().map(|(name, _)| name).collect(),
            theme: config.theme.clone(),
            feature_flags: config.feature_flags.clone(),
            classes,
        }
    }

    /// Split `md:hover:p-4` into its variants and the base class.
    pub fn split_variants<'a>(&self, class: &'a str) -> (Vec<&'a str>, &'a str) {
        let mut parts: Vec<&str> = class.split(self.separator.as_str()).collect();
        let base = parts.pop().unwrap_or(class);
        (parts, base)
    }

    pub fn is_variant(&self, name: &str) -> bool {
        self.variants.iter().any(|v| v == name)
    }

    /// Look up a theme value by dotted path.
    pub fn theme_value(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut cur = self.theme.get(parts.next()?)?;
        for part in parts {
            cur = cur.as_object()?.get(part)?;
        }
        Some(cur)
    }
}

/// A successful compile.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub css: String,
    pub state: StateSnapshot,
}

/// Compile `stylesheet` against an evaluated config.
///
/// Engine syntax errors map to stylesheet errors with a line. Everything else
/// the engine throws, panics included, is a config error without one.
pub fn compile(
    engine: &dyn StylesheetEngine,
    stylesheet: &str,
    module: &ConfigModule,
) -> Result<Compiled, LocatedError> {
    let config = ResolvedConfig::from_module(module)?;
    let utilities = UtilitySet::generate(&config);
    let input = EngineInput {
        stylesheet,
        config: &config,
        utilities: &utilities,
    };

    let output = match panic::catch_unwind(AssertUnwindSafe(|| engine.compile(&input))) {
        Ok(Ok(output)) => output,
        Ok(Err(EngineError::Syntax { message, line })) => {
            return Err(LocatedError::stylesheet(message, line.max(1)))
        }
        Ok(Err(EngineError::Config(message))) | Ok(Err(EngineError::Internal(message))) => {
            return Err(LocatedError::config(message, None))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(%message, "stylesheet engine panicked");
            return Err(LocatedError::config(
                format!("stylesheet engine crashed: {message}"),
                None,
            ));
        }
    };

    let mut classes: BTreeMap<String, ClassInfo> = utilities.class_infos().collect();
    for (name, info) in classes::scan(&output.user_css) {
        classes.entry(name).or_insert(info);
    }

    tracing::debug!(
        css_bytes = output.css.len(),
        classes = classes.len(),
        "stylesheet compiled"
    );

    Ok(Compiled {
        css: output.css,
        state: StateSnapshot::new(&config, classes),
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, SourceFile};
    use serde_json::json;

    struct Panicking;

    impl StylesheetEngine for Panicking {
        fn compile(&self, _: &EngineInput<'_>) -> Result<EngineOutput, EngineError> {
            panic!("engine bug")
        }
    }

    struct Internal;

    impl StylesheetEngine for Internal {
        fn compile(&self, _: &EngineInput<'_>) -> Result<EngineOutput, EngineError> {
            Err(EngineError::Internal("lost".into()))
        }
    }

    fn empty() -> ConfigModule {
        ConfigModule::from_exports(json!({}))
    }

    #[test]
    fn success_carries_css_and_state() {
        let compiled = compile(&SassEngine::default(), ".card { color: red }", &empty())
            .expect("compiles");
        assert!(compiled.css.contains("color: red"));
        assert_eq!(compiled.state.separator, ":");
        assert_eq!(compiled.state.classes["card"].origin, ClassOrigin::User);
        assert_eq!(compiled.state.classes["p-4"].origin, ClassOrigin::Utility);
        assert!(compiled.state.is_variant("hover"));
        assert_eq!(compiled.state.screens, vec!["sm", "md", "lg", "xl"]);
    }

    #[test]
    fn unterminated_rule_is_a_stylesheet_error() {
        let err = compile(&SassEngine::default(), ".a{color:red", &empty()).unwrap_err();
        assert_eq!(err.file, SourceFile::Stylesheet);
        assert_eq!(err.kind, ErrorKind::StylesheetSyntax);
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn engine_panic_is_a_config_error_without_line() {
        let err = compile(&Panicking, ".a{}", &empty()).unwrap_err();
        assert_eq!(err.file, SourceFile::Config);
        assert_eq!(err.line, None);
        assert!(err.message.contains("engine bug"));
    }

    #[test]
    fn internal_engine_error_is_a_config_error() {
        let err = compile(&Internal, ".a{}", &empty()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigEvaluation);
        assert_eq!(err.message, "lost");
    }

    #[test]
    fn bad_separator_fails_before_the_engine() {
        let module = ConfigModule::from_exports(json!({ "separator": 3 }));
        let err = compile(&Panicking, "", &module).unwrap_err();
        assert!(err.message.contains("separator"));
    }

    #[test]
    fn split_variants() {
        let state = compile(&SassEngine::default(), "", &empty()).unwrap().state;
        assert_eq!(state.split_variants("md:hover:p-4"), (vec!["md", "hover"], "p-4"));
        assert_eq!(state.split_variants("p-4"), (vec![], "p-4"));
    }
}
