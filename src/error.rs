use std::fmt;

use serde::Serialize;

/// Which editor tab an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceFile {
    Config,
    Stylesheet,
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFile::Config => f.write_str("Config"),
            SourceFile::Stylesheet => f.write_str("Stylesheet"),
        }
    }
}

/// User-visible failure categories of a compile.
///
/// Cancellation is deliberately absent: a superseded request is never an
/// error, see [`crate::channel::Reply::Canceled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// A `require` call failed or had a malformed specifier. Always has a line.
    ModuleResolution,
    /// The config script threw or failed to parse. Line is best-effort.
    ConfigEvaluation,
    /// The engine rejected the stylesheet. Always has a line.
    StylesheetSyntax,
}

/// An error pinned (when possible) to a 1-based line of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatedError {
    pub kind: ErrorKind,
    pub file: SourceFile,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl fmt::Display for LocatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.file, self.message)?;

        if let Some(line) = self.line {
            write!(f, " (line {line})")?;
        }

        Ok(())
    }
}

impl std::error::Error for LocatedError {}

/// Shorthand constructors.
impl LocatedError {
    pub fn module_resolution(message: impl Into<String>, line: u32) -> Self {
        Self {
            kind: ErrorKind::ModuleResolution,
            file: SourceFile::Config,
            message: message.into(),
            line: Some(line),
        }
    }

    pub fn config(message: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            kind: ErrorKind::ConfigEvaluation,
            file: SourceFile::Config,
            message: message.into(),
            line,
        }
    }

    pub fn stylesheet(message: impl Into<String>, line: u32) -> Self {
        Self {
            kind: ErrorKind::StylesheetSyntax,
            file: SourceFile::Stylesheet,
            message: message.into(),
            line: Some(line),
        }
    }
}

/// Failure of the message channel itself, as opposed to the work it carries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("worker `{0}` is no longer running")]
    Disconnected(String),
}
