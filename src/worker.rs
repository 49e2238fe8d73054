//! The two workers behind a playground: compiling and answering editor queries.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use lsp_types::{ColorInformation, CompletionItem, Diagnostic, Hover, Position};

use crate::channel::{Handler, Reply};
use crate::compiler::{self, StateSnapshot, StylesheetEngine};
use crate::error::{ChannelError, LocatedError};
use crate::sandbox::{ConfigModule, Evaluate};
use crate::service::{self, DocumentKind};

// ── Compile ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    pub stylesheet: String,
    pub config: String,
}

/// Outcome of one compile request.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileResult {
    Success {
        css: String,
        state: Arc<StateSnapshot>,
    },
    Error(LocatedError),
    /// Superseded by a newer request. Never shown to the user.
    Canceled,
}

impl CompileResult {
    pub fn is_canceled(&self) -> bool {
        matches!(self, CompileResult::Canceled)
    }
}

impl From<Reply<CompileResult>> for CompileResult {
    fn from(reply: Reply<CompileResult>) -> Self {
        match reply {
            Reply::Ready(result) => result,
            Reply::Canceled => CompileResult::Canceled,
        }
    }
}

/// Last config source that evaluated successfully, and its module.
struct Evaluated {
    source: String,
    module: ConfigModule,
}

/// Evaluates the config and compiles the stylesheet against it.
///
/// Runs on the compile channel's thread, one request at a time.
pub struct CompileWorker<E> {
    evaluator: E,
    engine: Box<dyn StylesheetEngine>,
    last: Option<Evaluated>,
}

impl<E: Evaluate> CompileWorker<E> {
    pub fn new(evaluator: E, engine: Box<dyn StylesheetEngine>) -> Self {
        Self {
            evaluator,
            engine,
            last: None,
        }
    }

    /// Evaluate `source` unless it is the config evaluated last time.
    fn refresh(&mut self, source: &str) -> Result<(), LocatedError> {
        if self.last.as_ref().is_some_and(|last| last.source == source) {
            tracing::trace!("config unchanged, reusing evaluation");
            return Ok(());
        }
        let module = self.evaluator.evaluate(source)?;
        self.last = Some(Evaluated {
            source: source.to_string(),
            module,
        });
        Ok(())
    }

    pub fn compile(&mut self, request: &CompileRequest) -> CompileResult {
        if let Err(err) = self.refresh(&request.config) {
            tracing::debug!(%err, "config rejected");
            return CompileResult::Error(err);
        }
        let Some(last) = &self.last else {
            return CompileResult::Error(LocatedError::config("config produced no module", None));
        };
        match compiler::compile(self.engine.as_ref(), &request.stylesheet, &last.module) {
            Ok(compiled) => CompileResult::Success {
                css: compiled.css,
                state: Arc::new(compiled.state),
            },
            Err(err) => {
                tracing::debug!(%err, "stylesheet rejected");
                CompileResult::Error(err)
            }
        }
    }
}

impl<E: Evaluate + 'static> Handler for CompileWorker<E> {
    type Request = CompileRequest;
    type Response = CompileResult;

    fn handle(&mut self, request: CompileRequest) -> CompileResult {
        self.compile(&request)
    }
}

/// Collapse a channel reply into a compile result. A lost worker counts as
/// canceled: the caller supersedes it with the next edit.
pub fn settle(reply: Result<Reply<CompileResult>, ChannelError>) -> CompileResult {
    match reply {
        Ok(reply) => reply.into(),
        Err(err) => {
            tracing::error!("compile worker unavailable: {err}");
            CompileResult::Canceled
        }
    }
}

// ── Language service ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum LanguageRequest {
    Complete {
        kind: DocumentKind,
        text: String,
        position: Position,
    },
    Hover {
        kind: DocumentKind,
        text: String,
        position: Position,
    },
    Validate {
        kind: DocumentKind,
        text: String,
    },
    DocumentColors {
        kind: DocumentKind,
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LanguageResponse {
    Completions(Vec<CompletionItem>),
    Hover(Option<Hover>),
    Diagnostics(Vec<Diagnostic>),
    Colors(Vec<ColorInformation>),
}

/// Shared slot holding the snapshot of the last delivered compile.
pub type SharedState = Arc<ArcSwapOption<StateSnapshot>>;

/// Answers editor queries from the latest [`StateSnapshot`].
pub struct LanguageWorker {
    state: SharedState,
}

impl LanguageWorker {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

impl Handler for LanguageWorker {
    type Request = LanguageRequest;
    type Response = LanguageResponse;

    fn handle(&mut self, request: LanguageRequest) -> LanguageResponse {
        let snapshot = self.state.load_full();
        let state = snapshot.as_deref();
        match request {
            LanguageRequest::Complete { kind, text, position } => {
                LanguageResponse::Completions(service::complete(kind, &text, position, state))
            }
            LanguageRequest::Hover { kind, text, position } => {
                LanguageResponse::Hover(service::hover(kind, &text, position, state))
            }
            LanguageRequest::Validate { kind, text } => {
                LanguageResponse::Diagnostics(service::validate(kind, &text, state))
            }
            LanguageRequest::DocumentColors { kind, text } => {
                LanguageResponse::Colors(service::document_colors(kind, &text, state))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::SassEngine;
    use crate::error::ErrorKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Evaluates `module.exports = {}` to an empty object and counts calls.
    struct Counting(Arc<AtomicUsize>);

    impl Evaluate for Counting {
        fn evaluate(&self, source: &str) -> Result<ConfigModule, LocatedError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            if source.contains("throw") {
                return Err(LocatedError::config("x", Some(1)));
            }
            Ok(ConfigModule::from_exports(json!({})))
        }
    }

    fn worker() -> (CompileWorker<Counting>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let worker = CompileWorker::new(Counting(Arc::clone(&calls)), Box::new(SassEngine::default()));
        (worker, calls)
    }

    fn request(stylesheet: &str, config: &str) -> CompileRequest {
        CompileRequest {
            stylesheet: stylesheet.into(),
            config: config.into(),
        }
    }

    #[test]
    fn success_and_stylesheet_error() {
        let (mut worker, _) = worker();
        let CompileResult::Success { css, state } = worker.compile(&request(".a{color:red}", "module.exports={}")) else {
            panic!("expected success")
        };
        assert!(css.contains("color: red"));
        assert_eq!(state.separator, ":");

        let CompileResult::Error(err) = worker.compile(&request(".a{color:red", "module.exports={}")) else {
            panic!("expected error")
        };
        assert_eq!(err.kind, ErrorKind::StylesheetSyntax);
    }

    #[test]
    fn unchanged_config_is_evaluated_once() {
        let (mut worker, calls) = worker();
        worker.compile(&request(".a{}", "module.exports={}"));
        worker.compile(&request(".b{}", "module.exports={}"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        worker.compile(&request(".b{}", "module.exports={ }"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_config_is_retried() {
        let (mut worker, calls) = worker();
        assert!(matches!(worker.compile(&request("", "throw 1")), CompileResult::Error(_)));
        assert!(matches!(worker.compile(&request("", "throw 1")), CompileResult::Error(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn settle_maps_cancellation_and_disconnects() {
        assert!(settle(Ok(Reply::Canceled)).is_canceled());
        assert!(settle(Err(ChannelError::Disconnected("compile".into()))).is_canceled());
    }

    #[test]
    fn language_worker_reads_latest_snapshot() {
        let state: SharedState = Arc::new(ArcSwapOption::empty());
        let mut language = LanguageWorker::new(Arc::clone(&state));
        let validate = || LanguageRequest::Validate {
            kind: DocumentKind::Stylesheet,
            text: "@apply nope;".into(),
        };

        assert_eq!(language.handle(validate()), LanguageResponse::Diagnostics(vec![]));

        let (mut worker, _) = worker();
        let CompileResult::Success { state: snapshot, .. } = worker.compile(&request("", "module.exports={}")) else {
            panic!("expected success")
        };
        state.store(Some(snapshot));
        let LanguageResponse::Diagnostics(diagnostics) = language.handle(validate()) else {
            panic!("diagnostics")
        };
        assert_eq!(diagnostics.len(), 1);
    }
}
