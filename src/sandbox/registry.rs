use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use ureq::ResponseExt;
use url::Url;

/// A module fetched for the sandbox: where it ended up, and its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub url: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("cannot find module '{0}'")]
    NotFound(String),
    #[error("cannot find module '{id}' ({reason})")]
    Unreachable { id: String, reason: String },
    #[error("cannot resolve relative module '{0}' outside of a package")]
    Relative(String),
}

/// Where `require` ids are looked up.
pub trait PackageRegistry: Send + Sync {
    /// Resolve `id`, relative to the module at `parent` when it is a path.
    fn resolve(&self, id: &str, parent: Option<&str>) -> Result<Package, RegistryError>;
}

fn is_relative(id: &str) -> bool {
    id.starts_with("./") || id.starts_with("../") || id.starts_with('/')
}

// ── HTTP ───────────────────────────────────────────────────────────────

/// Fetches bare ids from a CDN-style registry (`<base>/<id>`), following
/// redirects to the concrete file.
pub struct HttpRegistry {
    base: Url,
    agent: ureq::Agent,
    cache: Mutex<HashMap<String, Package>>,
}

impl HttpRegistry {
    pub fn new(base: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Ok(Self {
            base,
            agent,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn url_for(&self, id: &str, parent: Option<&str>) -> Result<Url, RegistryError> {
        let not_found = |_| RegistryError::NotFound(id.to_string());

        if id.starts_with("http://") || id.starts_with("https://") {
            return Url::parse(id).map_err(not_found);
        }
        if is_relative(id) {
            let parent = parent.ok_or_else(|| RegistryError::Relative(id.to_string()))?;
            let parent = Url::parse(parent).map_err(not_found)?;
            return parent.join(id).map_err(not_found);
        }
        self.base.join(id).map_err(not_found)
    }
}

impl PackageRegistry for HttpRegistry {
    fn resolve(&self, id: &str, parent: Option<&str>) -> Result<Package, RegistryError> {
        let url = self.url_for(id, parent)?;
        let key = url.to_string();

        if let Some(hit) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            tracing::trace!(%key, "module cache hit");
            return Ok(hit.clone());
        }

        let mut response = match self.agent.get(url.as_str()).call() {
            Ok(response) => response,
            Err(ureq::Error::StatusCode(status)) => {
                tracing::debug!(%url, status, "module not found");
                return Err(RegistryError::NotFound(id.to_string()));
            }
            Err(err) => {
                tracing::warn!(%url, error = %err, "module fetch failed");
                return Err(RegistryError::Unreachable {
                    id: id.to_string(),
                    reason: err.to_string(),
                });
            }
        };

        let final_url = response.get_uri().to_string();
        let source = response
            .body_mut()
            .read_to_string()
            .map_err(|err| RegistryError::Unreachable {
                id: id.to_string(),
                reason: err.to_string(),
            })?;

        tracing::debug!(%id, url = %final_url, bytes = source.len(), "module fetched");
        let package = Package {
            url: final_url,
            source,
        };
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, package.clone());
        Ok(package)
    }
}

// ── In-memory ──────────────────────────────────────────────────────────

/// A fixed set of modules, keyed by bare id or by `memory:///` path.
#[derive(Default)]
pub struct MemoryRegistry {
    modules: HashMap<String, String>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, id: impl Into<String>, source: impl Into<String>) -> Self {
        self.modules.insert(id.into(), source.into());
        self
    }
}

impl PackageRegistry for MemoryRegistry {
    fn resolve(&self, id: &str, parent: Option<&str>) -> Result<Package, RegistryError> {
        let url = if is_relative(id) {
            let parent = parent.ok_or_else(|| RegistryError::Relative(id.to_string()))?;
            Url::parse(parent)
                .and_then(|p| p.join(id))
                .map_err(|_| RegistryError::NotFound(id.to_string()))?
                .to_string()
        } else {
            format!("memory:///{id}")
        };

        let key = url.trim_start_matches("memory:///");
        self.modules
            .get(key)
            .map(|source| Package {
                url: url.clone(),
                source: source.clone(),
            })
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_resolves_bare_and_relative_ids() {
        let registry = MemoryRegistry::new()
            .with_module("colors", "module.exports = require('./palette')")
            .with_module("palette", "module.exports = { red: '#f00' }");

        let colors = registry.resolve("colors", None).expect("bare id");
        assert_eq!(colors.url, "memory:///colors");

        let palette = registry
            .resolve("./palette", Some(&colors.url))
            .expect("relative id");
        assert_eq!(palette.url, "memory:///palette");
        assert!(palette.source.contains("#f00"));
    }

    #[test]
    fn memory_missing_module() {
        let err = MemoryRegistry::new().resolve("nope", None).unwrap_err();
        assert_eq!(err.to_string(), "cannot find module 'nope'");
    }

    #[test]
    fn relative_without_parent_is_rejected() {
        let err = MemoryRegistry::new().resolve("./x", None).unwrap_err();
        assert_eq!(err, RegistryError::Relative("./x".into()));
    }

    #[test]
    fn http_urls() {
        let registry =
            HttpRegistry::new("https://unpkg.com", Duration::from_secs(1)).expect("valid base");

        let url = registry.url_for("tailwindcss-typography", None).expect("bare");
        assert_eq!(url.as_str(), "https://unpkg.com/tailwindcss-typography");

        let url = registry
            .url_for("./lib/index.js", Some("https://unpkg.com/pkg@1.0.0/src/main.js"))
            .expect("relative");
        assert_eq!(url.as_str(), "https://unpkg.com/pkg@1.0.0/src/lib/index.js");

        let url = registry
            .url_for("https://example.com/m.js", None)
            .expect("absolute");
        assert_eq!(url.as_str(), "https://example.com/m.js");
    }
}
