//! The editor-facing side of a playground session.
//!
//! A [`Playground`] owns the compile and language workers. Markup edits go
//! straight to the preview; stylesheet and config edits are debounced into
//! compiles whose outcomes come back as [`PlaygroundEvent`]s.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::channel::WorkerChannel;
use crate::compiler::{SassEngine, StylesheetEngine};
use crate::dispatch::DispatchQueue;
use crate::error::{ChannelError, LocatedError};
use crate::preview::PreviewMessage;
use crate::sandbox::{Evaluate, Sandbox};
use crate::service::{self, DocumentKind};
use crate::settings::Settings;
use crate::translate::{
    self, EditorColorInformation, EditorCompletionItem, EditorDiagnostic, EditorHover, EditorPosition,
};
use crate::worker::{
    settle, CompileRequest, CompileResult, CompileWorker, LanguageRequest, LanguageResponse,
    LanguageWorker, SharedState,
};

type Compiler = CompileWorker<Box<dyn Evaluate>>;

/// The three documents of a playground.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sources {
    pub markup: String,
    pub stylesheet: String,
    pub config: String,
}

impl Sources {
    fn compile_request(&self) -> CompileRequest {
        CompileRequest {
            stylesheet: self.stylesheet.clone(),
            config: self.config.clone(),
        }
    }
}

/// A change to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Markup(String),
    Stylesheet(String),
    Config(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaygroundEvent {
    Preview(PreviewMessage),
    /// The last compile failed and nothing newer succeeded within the error delay.
    Error(LocatedError),
    /// A compile succeeded; any visible error is stale.
    ClearError,
}

pub struct Playground {
    sources: Mutex<Sources>,
    compiler: WorkerChannel<Compiler>,
    language: WorkerChannel<LanguageWorker>,
    queue: DispatchQueue<Compiler>,
    state: SharedState,
    events: mpsc::UnboundedSender<PlaygroundEvent>,
}

impl Playground {
    /// Start a session with the node sandbox and the built-in engine.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(settings: &Settings) -> anyhow::Result<(Self, mpsc::UnboundedReceiver<PlaygroundEvent>)> {
        let sandbox = Sandbox::from_settings(settings)?;
        Self::with_parts(
            settings,
            Box::new(sandbox),
            Box::new(SassEngine::new(settings.minify)),
        )
    }

    /// Start a session with a caller-supplied evaluator and engine.
    pub fn with_parts(
        settings: &Settings,
        evaluator: Box<dyn Evaluate>,
        engine: Box<dyn StylesheetEngine>,
    ) -> anyhow::Result<(Self, mpsc::UnboundedReceiver<PlaygroundEvent>)> {
        let state: SharedState = Arc::new(ArcSwapOption::empty());
        let compiler = WorkerChannel::spawn("compile", CompileWorker::new(evaluator, engine))?;
        let language = WorkerChannel::spawn("language", LanguageWorker::new(Arc::clone(&state)))?;
        let (queue, results) = DispatchQueue::spawn(compiler.clone(), settings.quiet_period());
        let (events, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(forward(
            results,
            events.clone(),
            Arc::clone(&state),
            settings.error_delay(),
        ));
        tracing::debug!(?settings, "playground started");

        let playground = Self {
            sources: Mutex::new(Sources::default()),
            compiler,
            language,
            queue,
            state,
            events,
        };
        Ok((playground, events_rx))
    }

    fn sources(&self) -> MutexGuard<'_, Sources> {
        self.sources.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: PlaygroundEvent) {
        let _ = self.events.send(event);
    }

    pub fn edit(&self, edit: Edit) {
        let mut sources = self.sources();
        match edit {
            Edit::Markup(markup) => {
                sources.markup = markup.clone();
                self.emit(PlaygroundEvent::Preview(PreviewMessage::html(markup)));
            }
            Edit::Stylesheet(stylesheet) => {
                sources.stylesheet = stylesheet;
                self.queue.notify(sources.compile_request());
            }
            Edit::Config(config) => {
                sources.config = config;
                self.queue.notify(sources.compile_request());
            }
        }
    }

    /// Replace all three documents: reset the preview, inject the markup and
    /// compile without waiting for the quiet period.
    pub fn load(&self, new: Sources) {
        let mut sources = self.sources();
        *sources = new;
        self.emit(PlaygroundEvent::Preview(PreviewMessage::clear()));
        self.emit(PlaygroundEvent::Preview(PreviewMessage::html(sources.markup.clone())));
        self.queue.flush(sources.compile_request());
    }

    /// A copy of the current documents.
    pub fn snapshot(&self) -> Sources {
        self.sources().clone()
    }

    /// Compile directly, superseding whatever the queue has in flight.
    ///
    /// No events are emitted; a success still becomes the state that editor
    /// features read.
    pub async fn compile(&self, sources: &Sources) -> CompileResult {
        let result = settle(self.compiler.send(sources.compile_request()).await);
        if let CompileResult::Success { state, .. } = &result {
            self.state.store(Some(Arc::clone(state)));
        }
        result
    }

    async fn ask(&self, request: LanguageRequest) -> Result<Option<LanguageResponse>, ChannelError> {
        Ok(self.language.request(request).await?.ready())
    }

    pub async fn complete(
        &self,
        kind: DocumentKind,
        text: &str,
        position: EditorPosition,
    ) -> Result<Vec<EditorCompletionItem>, ChannelError> {
        let position = translate::to_service_position(position);
        let default_range = translate::to_editor_range(service::word_range(text, position));
        let request = LanguageRequest::Complete {
            kind,
            text: text.to_string(),
            position,
        };
        Ok(match self.ask(request).await? {
            Some(LanguageResponse::Completions(items)) => items
                .iter()
                .map(|item| translate::to_editor_completion(item, default_range))
                .collect(),
            _ => Vec::new(),
        })
    }

    pub async fn hover(
        &self,
        kind: DocumentKind,
        text: &str,
        position: EditorPosition,
    ) -> Result<Option<EditorHover>, ChannelError> {
        let request = LanguageRequest::Hover {
            kind,
            text: text.to_string(),
            position: translate::to_service_position(position),
        };
        Ok(match self.ask(request).await? {
            Some(LanguageResponse::Hover(Some(hover))) => Some(translate::to_editor_hover(&hover)),
            _ => None,
        })
    }

    pub async fn validate(&self, kind: DocumentKind, text: &str) -> Result<Vec<EditorDiagnostic>, ChannelError> {
        let request = LanguageRequest::Validate {
            kind,
            text: text.to_string(),
        };
        Ok(match self.ask(request).await? {
            Some(LanguageResponse::Diagnostics(diagnostics)) => translate::to_editor_diagnostics(&diagnostics),
            _ => Vec::new(),
        })
    }

    pub async fn document_colors(
        &self,
        kind: DocumentKind,
        text: &str,
    ) -> Result<Vec<EditorColorInformation>, ChannelError> {
        let request = LanguageRequest::DocumentColors {
            kind,
            text: text.to_string(),
        };
        Ok(match self.ask(request).await? {
            Some(LanguageResponse::Colors(colors)) => colors.iter().map(translate::to_editor_color).collect(),
            _ => Vec::new(),
        })
    }

    /// Stop both workers. Pending calls resolve instead of hanging.
    pub fn close(&self) {
        self.compiler.close();
        self.language.close();
    }
}

/// Turn queue results into events. Errors are held back for `error_delay`
/// and dropped when a success lands first; a newer error restarts the wait.
async fn forward(
    mut results: mpsc::UnboundedReceiver<CompileResult>,
    events: mpsc::UnboundedSender<PlaygroundEvent>,
    state: SharedState,
    error_delay: Duration,
) {
    let mut pending: Option<(LocatedError, Instant)> = None;

    loop {
        let deadline = pending.as_ref().map(|(_, at)| *at);
        tokio::select! {
            biased;
            result = results.recv() => match result {
                Some(CompileResult::Success { css, state: snapshot }) => {
                    state.store(Some(snapshot));
                    if pending.take().is_some() {
                        tracing::trace!("pending error dropped by success");
                    }
                    let _ = events.send(PlaygroundEvent::ClearError);
                    let _ = events.send(PlaygroundEvent::Preview(PreviewMessage::css(css)));
                }
                Some(CompileResult::Error(err)) => {
                    pending = Some((err, Instant::now() + error_delay));
                }
                Some(CompileResult::Canceled) => {}
                None => break,
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some((err, _)) = pending.take() {
                    tracing::debug!(%err, "showing compile error");
                    let _ = events.send(PlaygroundEvent::Error(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ConfigModule;
    use serde_json::json;

    /// Accepts any config that does not contain `throw`.
    struct Stub;

    impl Evaluate for Stub {
        fn evaluate(&self, source: &str) -> Result<ConfigModule, LocatedError> {
            if source.contains("throw") {
                return Err(LocatedError::config("boom", Some(1)));
            }
            Ok(ConfigModule::from_exports(json!({})))
        }
    }

    fn settings() -> Settings {
        Settings {
            quiet_period_ms: 200,
            error_delay_ms: 1000,
            ..Settings::default()
        }
    }

    fn start() -> (Playground, mpsc::UnboundedReceiver<PlaygroundEvent>) {
        Playground::with_parts(&settings(), Box::new(Stub), Box::new(SassEngine::default())).unwrap()
    }

    #[tokio::test]
    async fn markup_edits_go_straight_to_preview() {
        let (playground, mut events) = start();
        playground.edit(Edit::Markup("<p>hi</p>".into()));
        assert_eq!(
            events.recv().await,
            Some(PlaygroundEvent::Preview(PreviewMessage::html("<p>hi</p>")))
        );
        assert_eq!(playground.snapshot().markup, "<p>hi</p>");
    }

    #[tokio::test]
    async fn load_clears_injects_and_compiles() {
        let (playground, mut events) = start();
        playground.load(Sources {
            markup: "<div class=\"a\"></div>".into(),
            stylesheet: ".a { color: red; }".into(),
            config: "module.exports = {}".into(),
        });
        assert_eq!(events.recv().await, Some(PlaygroundEvent::Preview(PreviewMessage::clear())));
        assert!(matches!(
            events.recv().await,
            Some(PlaygroundEvent::Preview(PreviewMessage { html: Some(_), .. }))
        ));
        assert_eq!(events.recv().await, Some(PlaygroundEvent::ClearError));
        let Some(PlaygroundEvent::Preview(PreviewMessage { css: Some(css), .. })) = events.recv().await else {
            panic!("expected css")
        };
        assert!(css.contains("color: red"));
    }

    #[tokio::test]
    async fn direct_compile_feeds_editor_features() {
        let (playground, _events) = start();
        let sources = Sources {
            stylesheet: ".a { @apply nope; }".into(),
            config: "module.exports = {}".into(),
            ..Sources::default()
        };
        assert!(playground.validate(DocumentKind::Stylesheet, &sources.stylesheet).await.unwrap().is_empty());

        let CompileResult::Error(_) = playground.compile(&sources).await else {
            panic!("unknown @apply class should fail to compile")
        };
        let ok = Sources {
            stylesheet: ".a { color: red; }".into(),
            ..sources.clone()
        };
        assert!(matches!(playground.compile(&ok).await, CompileResult::Success { .. }));

        let diagnostics = playground.validate(DocumentKind::Stylesheet, &sources.stylesheet).await.unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].range.start_line_number, 1);
    }

    #[tokio::test]
    async fn closed_playground_answers_instead_of_hanging() {
        let (playground, _events) = start();
        playground.close();
        assert!(playground.compile(&Sources::default()).await.is_canceled());
        assert!(playground.hover(DocumentKind::Markup, "", EditorPosition { line_number: 1, column: 1 }).await.is_err());
    }
}
