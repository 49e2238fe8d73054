//! Runtime settings for a playground instance.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Tunables for a [`crate::playground::Playground`].
///
/// Every field has a default, so partial JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Quiet period of the dispatch queue.
    pub quiet_period_ms: u64,
    /// How long an error waits before being shown; a success in the meantime drops it.
    pub error_delay_ms: u64,
    /// Program used to run the config sandbox.
    pub node: String,
    /// Base URL that bare module ids are fetched from.
    pub registry: String,
    /// Hard limit on one config evaluation, module fetches included.
    pub eval_timeout_ms: u64,
    /// Limit on a single module fetch.
    pub fetch_timeout_ms: u64,
    /// Emit compressed css.
    pub minify: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quiet_period_ms: 200,
            error_delay_ms: 1000,
            node: "node".to_string(),
            registry: "https://unpkg.com/".to_string(),
            eval_timeout_ms: 5000,
            fetch_timeout_ms: 10_000,
            minify: false,
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid playground settings")
    }

    /// Defaults, overridden by `STYLEPEN_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut settings = Self::default();

        if let Some(node) = lookup("STYLEPEN_NODE") {
            settings.node = node;
        }
        if let Some(registry) = lookup("STYLEPEN_REGISTRY") {
            settings.registry = registry;
        }
        if let Some(ms) = lookup("STYLEPEN_QUIET_MS") {
            settings.quiet_period_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("STYLEPEN_QUIET_MS is not a number: {ms:?}"))?;
        }
        if let Some(ms) = lookup("STYLEPEN_EVAL_TIMEOUT_MS") {
            settings.eval_timeout_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("STYLEPEN_EVAL_TIMEOUT_MS is not a number: {ms:?}"))?;
        }
        if let Some(flag) = lookup("STYLEPEN_MINIFY") {
            settings.minify = matches!(flag.trim(), "1" | "true" | "yes" | "on");
        }

        Ok(settings)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn error_delay(&self) -> Duration {
        Duration::from_millis(self.error_delay_ms)
    }

    pub fn eval_timeout(&self) -> Duration {
        Duration::from_millis(self.eval_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
