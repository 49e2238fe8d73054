//! Core of a live stylesheet playground.
//!
//! A user edits three documents: markup, a stylesheet and a config script.
//! The config runs in a [`sandbox`], the stylesheet is compiled against it by
//! the [`compiler`], and both happen on a worker behind a [`channel`] whose
//! newer requests cancel older ones. [`dispatch`] debounces edits into that
//! channel, [`service`] answers editor queries from the last good compile and
//! [`translate`] converts its answers into the editor's coordinates.
//! [`playground::Playground`] ties it together.

pub mod channel;
pub mod compiler;
pub mod dispatch;
pub mod error;
pub mod lexer;
pub mod logging;
pub mod playground;
pub mod preview;
pub mod sandbox;
pub mod service;
pub mod settings;
pub mod token;
pub mod translate;
pub mod worker;

pub use channel::{Reply, WorkerChannel};
pub use error::{ChannelError, ErrorKind, LocatedError, SourceFile};
pub use playground::{Edit, Playground, PlaygroundEvent, Sources};
pub use preview::PreviewMessage;
pub use settings::Settings;
pub use worker::CompileResult;

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::compiler::SassEngine;
    use crate::sandbox::ConfigModule;
    use serde_json::json;

    fn compile(stylesheet: &str, exports: serde_json::Value) -> Result<compiler::Compiled, LocatedError> {
        compiler::compile(&SassEngine::default(), stylesheet, &ConfigModule::from_exports(exports))
    }

    #[test]
    fn end_to_end_utilities_and_apply() {
        let out = compile(
            "@tailwind utilities;\n.btn { @apply p-4 text-red-500; }",
            json!({}),
        )
        .expect("compilation should succeed");
        assert!(out.css.contains(".btn"));
        assert!(out.css.contains("padding: 1rem"));
        assert!(out.state.classes.contains_key("text-red-500"));
    }

    #[test]
    fn end_to_end_custom_prefix_and_separator() {
        let out = compile(".a { color: red; }", json!({ "prefix": "tw-", "separator": "_" }))
            .expect("compilation should succeed");
        assert_eq!(out.state.separator, "_");
        assert_eq!(out.state.prefix, "tw-");
        assert!(out.state.classes.contains_key("tw-p-4"));
        assert!(!out.state.classes.contains_key("p-4"));
    }

    #[test]
    fn end_to_end_error_lines_point_into_the_stylesheet() {
        let err = compile("\n\n.a { @apply nope; }", json!({})).expect_err("unknown class");
        assert_eq!(err.file, SourceFile::Stylesheet);
        assert_eq!(err.line, Some(3));
    }
}
