use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stylepen::compiler::SassEngine;
use stylepen::sandbox::{ConfigModule, Evaluate, MemoryRegistry, Sandbox};
use stylepen::service::DocumentKind;
use stylepen::translate::EditorPosition;
use stylepen::{
    CompileResult, Edit, ErrorKind, LocatedError, Playground, PlaygroundEvent, PreviewMessage, Settings,
    SourceFile, Sources,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

/// Stands in for the node sandbox: `module.exports={}` style configs
/// evaluate to an empty object, anything mentioning `throw` fails on line 1.
struct FakeSandbox;

impl Evaluate for FakeSandbox {
    fn evaluate(&self, source: &str) -> Result<ConfigModule, LocatedError> {
        if source.contains("throw") {
            return Err(LocatedError::config("thrown", Some(1)));
        }
        Ok(ConfigModule::from_exports(json!({})))
    }
}

fn settings() -> Settings {
    Settings {
        quiet_period_ms: 20,
        error_delay_ms: 300,
        ..Settings::default()
    }
}

fn start() -> (Playground, UnboundedReceiver<PlaygroundEvent>) {
    Playground::with_parts(&settings(), Box::new(FakeSandbox), Box::new(SassEngine::default())).unwrap()
}

fn sources(stylesheet: &str) -> Sources {
    Sources {
        markup: String::new(),
        stylesheet: stylesheet.into(),
        config: "module.exports={}".into(),
    }
}

async fn next(events: &mut UnboundedReceiver<PlaygroundEvent>) -> PlaygroundEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("event expected")
        .expect("playground stopped")
}

fn node_available() -> bool {
    Command::new("node")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[tokio::test(flavor = "multi_thread")]
async fn compiles_a_simple_rule() {
    let (playground, _events) = start();
    let CompileResult::Success { css, .. } = playground.compile(&sources(".a{color:red}")).await else {
        panic!("expected success");
    };
    assert!(css.replace(' ', "").contains("color:red"), "{css}");
}

#[tokio::test(flavor = "multi_thread")]
async fn unterminated_rule_is_a_stylesheet_error_on_line_one() {
    let (playground, _events) = start();
    let CompileResult::Error(err) = playground.compile(&sources(".a{color:red")).await else {
        panic!("expected error");
    };
    assert_eq!(err.kind, ErrorKind::StylesheetSyntax);
    assert_eq!(err.file, SourceFile::Stylesheet);
    assert_eq!(err.line, Some(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn debounced_edits_reach_the_preview() {
    let (playground, mut events) = start();
    playground.edit(Edit::Config("module.exports={}".into()));
    for partial in [".a", ".a{", ".a{color:", ".a{color:blue}"] {
        playground.edit(Edit::Stylesheet(partial.into()));
    }

    assert_eq!(next(&mut events).await, PlaygroundEvent::ClearError);
    let PlaygroundEvent::Preview(PreviewMessage { css: Some(css), .. }) = next(&mut events).await else {
        panic!("expected css preview");
    };
    assert!(css.contains("blue"));
}

#[tokio::test(flavor = "multi_thread")]
async fn errors_wait_and_are_dropped_by_a_fix() {
    let (playground, mut events) = start();
    playground.edit(Edit::Config("module.exports={}".into()));
    playground.edit(Edit::Stylesheet(".a{color:red".into()));

    // Compiled and failed, but still inside the error delay.
    tokio::time::sleep(Duration::from_millis(100)).await;
    playground.edit(Edit::Stylesheet(".a{color:red}".into()));

    assert_eq!(next(&mut events).await, PlaygroundEvent::ClearError);
    assert!(matches!(next(&mut events).await, PlaygroundEvent::Preview(_)));
    let late = timeout(Duration::from_millis(600), events.recv()).await;
    assert!(late.is_err(), "unexpected event {late:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn persistent_error_is_shown() {
    let (playground, mut events) = start();
    playground.edit(Edit::Config("throw new Error('x')".into()));

    let PlaygroundEvent::Error(err) = next(&mut events).await else {
        panic!("expected an error event");
    };
    assert_eq!(err.file, SourceFile::Config);
    assert_eq!(err.line, Some(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn editor_features_follow_the_last_compile() {
    let (playground, mut events) = start();
    let markup = "<div class=\"text-re";
    let at_end = EditorPosition {
        line_number: 1,
        column: markup.len() as u32 + 1,
    };

    // No compile yet: nothing to suggest.
    assert!(playground.complete(DocumentKind::Markup, markup, at_end).await.unwrap().is_empty());

    playground.load(sources(".card { color: red; }"));
    while next(&mut events).await != PlaygroundEvent::ClearError {}

    let items = playground.complete(DocumentKind::Markup, markup, at_end).await.unwrap();
    let red = items
        .iter()
        .find(|item| item.label == "text-red-500")
        .expect("color utility offered");
    assert_eq!(red.range.start_column, 13);

    let colors = playground
        .document_colors(DocumentKind::Markup, "<p class=\"bg-red-500 p-4\"></p>")
        .await
        .unwrap();
    assert_eq!(colors.len(), 1);
    assert_eq!(colors[0].range.start_line_number, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn real_sandbox_plugins_feed_completions() {
    if !node_available() {
        eprintln!("skipping: node not found");
        return;
    }
    let registry = MemoryRegistry::new().with_module(
        "hocus",
        "module.exports = function ({ addVariant }) { addVariant('hocus') }",
    );
    let sandbox = Sandbox::new("node", Duration::from_secs(10), Arc::new(registry));
    let (playground, _events) =
        Playground::with_parts(&settings(), Box::new(sandbox), Box::new(SassEngine::default())).unwrap();

    let result = playground
        .compile(&Sources {
            markup: String::new(),
            stylesheet: ".a { @apply p-4; }".into(),
            config: "module.exports = {\n  plugins: [require('hocus')],\n}".into(),
        })
        .await;
    assert!(matches!(result, CompileResult::Success { .. }), "{result:?}");

    let markup = "<a class=\"";
    let items = playground
        .complete(
            DocumentKind::Markup,
            markup,
            EditorPosition {
                line_number: 1,
                column: markup.len() as u32 + 1,
            },
        )
        .await
        .unwrap();
    assert!(items.iter().any(|item| item.label == "hocus:"));
}
