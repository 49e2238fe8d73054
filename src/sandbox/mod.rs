//! Sandboxed evaluation of user config scripts.
//!
//! A config script is arbitrary user code. It never runs in this process:
//! [`Sandbox`] hands the wrapped script to a child `node` process, answers its
//! module lookups from a [`PackageRegistry`], and turns whatever comes back
//! into a [`ConfigModule`] or a line-located error.

mod harness;
mod registry;
mod runner;
pub mod wrap;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LocatedError;
use crate::settings::Settings;

pub use registry::{HttpRegistry, MemoryRegistry, Package, PackageRegistry, RegistryError};
pub use runner::Sandbox;

/// What a plugin contributed while running against the recording API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginContributions {
    /// Names passed to `addVariant`.
    pub variants: Vec<String>,
    /// CSS-in-JS objects passed to `addUtilities`.
    pub utilities: Vec<Value>,
    pub components: Vec<Value>,
    pub base: Vec<Value>,
}

/// An evaluated config: `module.exports` with functions removed, plus what
/// its plugins registered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigModule {
    pub exports: Value,
    pub plugins: PluginContributions,
}

impl ConfigModule {
    /// A module exporting `exports` with no plugins.
    pub fn from_exports(exports: Value) -> Self {
        Self {
            exports,
            plugins: PluginContributions::default(),
        }
    }
}

/// Something that can run a config script.
pub trait Evaluate: Send {
    fn evaluate(&self, source: &str) -> Result<ConfigModule, LocatedError>;
}

impl<E: Evaluate + Sync + ?Sized> Evaluate for Arc<E> {
    fn evaluate(&self, source: &str) -> Result<ConfigModule, LocatedError> {
        (**self).evaluate(source)
    }
}

impl<E: Evaluate + ?Sized> Evaluate for Box<E> {
    fn evaluate(&self, source: &str) -> Result<ConfigModule, LocatedError> {
        (**self).evaluate(source)
    }
}

impl Sandbox {
    /// The production sandbox: `settings.node` with an HTTP registry.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let registry = HttpRegistry::new(&settings.registry, settings.fetch_timeout())?;
        Ok(Self::new(
            settings.node.clone(),
            settings.eval_timeout(),
            Arc::new(registry),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contributions_accept_partial_json() {
        let c: PluginContributions = serde_json::from_str(r#"{"variants":["hocus"]}"#).unwrap();
        assert_eq!(c.variants, vec!["hocus"]);
        assert!(c.utilities.is_empty());
    }

    #[test]
    fn from_settings_rejects_bad_registry() {
        let settings = Settings {
            registry: "not a url".into(),
            ..Settings::default()
        };
        assert!(Sandbox::from_settings(&settings).is_err());
    }
}
