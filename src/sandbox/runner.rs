use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::harness::HARNESS;
use super::registry::PackageRegistry;
use super::wrap;
use super::{ConfigModule, Evaluate, PluginContributions};
use crate::error::LocatedError;

/// Most stderr kept for crash reports.
const STDERR_EXCERPT: usize = 2048;

/// Evaluates config scripts in a fresh `node` child per call.
pub struct Sandbox {
    node: String,
    timeout: Duration,
    registry: Arc<dyn PackageRegistry>,
}

impl Sandbox {
    pub fn new(node: impl Into<String>, timeout: Duration, registry: Arc<dyn PackageRegistry>) -> Self {
        Self {
            node: node.into(),
            timeout,
            registry,
        }
    }

    fn run(&self, source: &str) -> anyhow::Result<Result<ConfigModule, LocatedError>> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let user_lines = wrap::line_count(source);
        let wrapped = wrap::wrap(source);

        let mut child = ChildGuard(
            Command::new(&self.node)
                .arg("-e")
                .arg(HARNESS)
                .env_clear()
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .with_context(|| format!("failed to start `{}`", self.node))?,
        );

        let mut stdin = child.0.stdin.take().context("sandbox stdin unavailable")?;
        let stdout = child.0.stdout.take().context("sandbox stdout unavailable")?;
        let stderr = child.0.stderr.take().context("sandbox stderr unavailable")?;

        let (tx, rx) = mpsc::channel::<String>();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        let stderr_reader: JoinHandle<String> = std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = stderr.take(64 * 1024).read_to_string(&mut buf);
            buf
        });

        send(
            &mut stdin,
            &HostMessage::Evaluate {
                source: &wrapped,
                filename: wrap::FILENAME,
            },
        )?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let line = match rx.recv_timeout(remaining) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "config evaluation timed out");
                    return Ok(Err(LocatedError::config(
                        format!(
                            "config evaluation timed out after {}ms",
                            self.timeout.as_millis()
                        ),
                        None,
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    drop(stdin);
                    let status = child.0.wait().context("failed to wait for sandbox")?;
                    let stderr = stderr_reader.join().unwrap_or_default();
                    return Err(anyhow!(
                        "sandbox exited ({status}) without a result{}",
                        excerpt(&stderr)
                    ));
                }
            };

            let message: ChildMessage = serde_json::from_str(&line)
                .with_context(|| format!("unexpected sandbox output: {}", truncate(&line, 200)))?;

            match message {
                ChildMessage::Resolve { id, parent, line } => {
                    let reply = match self.registry.resolve(&id, parent.as_deref()) {
                        Ok(package) => {
                            tracing::debug!(%id, url = %package.url, ?line, "module resolved");
                            send(
                                &mut stdin,
                                &HostMessage::Module {
                                    url: &package.url,
                                    source: &package.source,
                                },
                            )
                        }
                        Err(err) => {
                            tracing::debug!(%id, error = %err, ?line, "module unresolved");
                            send(
                                &mut stdin,
                                &HostMessage::Missing {
                                    message: err.to_string(),
                                },
                            )
                        }
                    };
                    reply?;
                }
                ChildMessage::Done { exports, plugins } => {
                    tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "config evaluated");
                    return Ok(Ok(ConfigModule { exports, plugins }));
                }
                ChildMessage::Error {
                    kind: FailureKind::Require,
                    message,
                    line,
                    ..
                } => {
                    return Ok(Err(match line {
                        Some(line) => LocatedError::module_resolution(message, line),
                        None => LocatedError::config(message, None),
                    }));
                }
                ChildMessage::Error {
                    kind: FailureKind::Evaluation,
                    name,
                    message,
                    line,
                    stack,
                } => {
                    let line = line
                        .filter(|l| (1..=user_lines).contains(l))
                        .or_else(|| stack.as_deref().and_then(|s| wrap::line_from_stack(s, user_lines)));
                    let message = if name.is_empty() || name == "Error" {
                        message
                    } else {
                        format!("{name}: {message}")
                    };
                    return Ok(Err(LocatedError::config(message, line)));
                }
            }
        }
    }
}

impl Evaluate for Sandbox {
    fn evaluate(&self, source: &str) -> Result<ConfigModule, LocatedError> {
        match self.run(source) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!("sandbox failure: {err:#}");
                Err(LocatedError::config(format!("{err:#}"), None))
            }
        }
    }
}

/// Kills the child on every exit path.
struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn send(stdin: &mut ChildStdin, message: &HostMessage<'_>) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    stdin
        .write_all(line.as_bytes())
        .and_then(|_| stdin.flush())
        .context("sandbox closed its input")
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", truncate(trimmed, STDERR_EXCERPT))
    }
}

// ── Protocol ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum HostMessage<'a> {
    Evaluate { source: &'a str, filename: &'a str },
    Module { url: &'a str, source: &'a str },
    Missing { message: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ChildMessage {
    Resolve {
        id: String,
        #[serde(default)]
        parent: Option<String>,
        #[serde(default)]
        line: Option<u32>,
    },
    Done {
        #[serde(default)]
        exports: Value,
        #[serde(default)]
        plugins: PluginContributions,
    },
    Error {
        kind: FailureKind,
        #[serde(default)]
        name: String,
        message: String,
        #[serde(default)]
        line: Option<u32>,
        #[serde(default)]
        stack: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FailureKind {
    Require,
    Evaluation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sandbox::MemoryRegistry;

    fn node_available() -> bool {
        Command::new("node")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn sandbox(registry: MemoryRegistry) -> Sandbox {
        Sandbox::new("node", Duration::from_secs(10), Arc::new(registry))
    }

    #[test]
    fn parses_child_messages() {
        let msg: ChildMessage =
            serde_json::from_str(r#"{"type":"resolve","id":"x","parent":null,"line":3}"#).unwrap();
        assert!(matches!(msg, ChildMessage::Resolve { line: Some(3), .. }));

        let msg: ChildMessage = serde_json::from_str(
            r#"{"type":"error","kind":"evaluation","name":"TypeError","message":"x","stack":"TypeError: x"}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ChildMessage::Error {
                kind: FailureKind::Evaluation,
                ..
            }
        ));

        let msg: ChildMessage = serde_json::from_str(r#"{"type":"done","exports":null}"#).unwrap();
        assert!(matches!(msg, ChildMessage::Done { exports: Value::Null, .. }));
    }

    #[test]
    fn host_messages_are_single_lines() {
        let json = serde_json::to_string(&HostMessage::Evaluate {
            source: "a\nb",
            filename: "config.js",
        })
        .unwrap();
        assert!(!json.contains('\n'));
        assert!(json.starts_with(r#"{"type":"evaluate""#));
    }

    #[test]
    fn missing_program_is_a_config_error() {
        let sandbox = Sandbox::new(
            "/nonexistent/stylepen-node",
            Duration::from_secs(1),
            Arc::new(MemoryRegistry::new()),
        );
        let err = sandbox.evaluate("module.exports = {}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigEvaluation);
        assert!(err.message.contains("failed to start"));
        assert_eq!(err.line, None);
    }

    #[test]
    fn throw_reports_user_line() {
        if !node_available() {
            eprintln!("skipping: node not found");
            return;
        }
        let source = "module.exports = {}\n\n\n\n\nthrow new Error('x')";
        let err = sandbox(MemoryRegistry::new()).evaluate(source).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigEvaluation);
        assert_eq!(err.message, "x");
        assert_eq!(err.line, Some(6));
    }

    #[test]
    fn syntax_error_reports_user_line() {
        if !node_available() {
            eprintln!("skipping: node not found");
            return;
        }
        let source = "module.exports = {\n  a: 1,\n  b c\n}";
        let err = sandbox(MemoryRegistry::new()).evaluate(source).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigEvaluation);
        assert!(err.message.starts_with("SyntaxError"), "{}", err.message);
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn empty_require_is_non_empty_error() {
        if !node_available() {
            eprintln!("skipping: node not found");
            return;
        }
        let source = "const x = 1\nconst y = require('')\nmodule.exports = {}";
        let err = sandbox(MemoryRegistry::new()).evaluate(source).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ModuleResolution);
        assert!(err.message.contains("non-empty"));
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn whitespace_require_is_non_empty_error() {
        if !node_available() {
            eprintln!("skipping: node not found");
            return;
        }
        let source = "// palette\n\nconst p = require('   ')\nmodule.exports = {}";
        let err = sandbox(MemoryRegistry::new()).evaluate(source).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ModuleResolution);
        assert!(err.message.contains("non-empty"), "{}", err.message);
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn argumentless_require_needs_a_string() {
        if !node_available() {
            eprintln!("skipping: node not found");
            return;
        }
        let source = "const a = 1\nconst b = require()\nmodule.exports = {}";
        let err = sandbox(MemoryRegistry::new()).evaluate(source).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ModuleResolution);
        assert!(err.message.contains("must be a string"), "{}", err.message);
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn missing_module_reports_call_line() {
        if !node_available() {
            eprintln!("skipping: node not found");
            return;
        }
        let source = "\n\nmodule.exports = { plugins: [require('nope')] }";
        let err = sandbox(MemoryRegistry::new()).evaluate(source).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ModuleResolution);
        assert_eq!(err.message, "cannot find module 'nope'");
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn modules_load_and_functions_are_stripped() {
        if !node_available() {
            eprintln!("skipping: node not found");
            return;
        }
        let registry = MemoryRegistry::new()
            .with_module("palette", "module.exports = require('./shades')")
            .with_module("shades", "exports.brand = '#123456'")
            .with_module(
                "plugin",
                "module.exports = function ({ addVariant, addUtilities }) {\n\
                   addVariant('hocus');\n\
                   addUtilities({ '.skew-10': { transform: 'skewY(-10deg)' } });\n\
                 }",
            );
        let source = "const palette = require('palette')\n\
                      module.exports = {\n\
                        theme: { extend: { colors: palette } },\n\
                        plugins: [require('plugin')],\n\
                        fn: () => 1,\n\
                      }";

        let module = sandbox(registry).evaluate(source).expect("evaluates");
        assert_eq!(module.exports["theme"]["extend"]["colors"]["brand"], "#123456");
        assert!(module.exports.get("fn").is_none());
        assert_eq!(module.exports["plugins"], serde_json::json!([]));
        assert_eq!(module.plugins.variants, vec!["hocus".to_string()]);
        assert_eq!(
            module.plugins.utilities[0][".skew-10"]["transform"],
            "skewY(-10deg)"
        );
    }

    #[test]
    fn infinite_loop_times_out() {
        if !node_available() {
            eprintln!("skipping: node not found");
            return;
        }
        let sandbox = Sandbox::new("node", Duration::from_millis(500), Arc::new(MemoryRegistry::new()));
        let err = sandbox.evaluate("while (true) {}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigEvaluation);
        assert!(err.message.contains("timed out"));
    }
}
