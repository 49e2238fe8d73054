//! Turning user config source into the program the sandbox runs, and mapping
//! positions in that program back to the user's text.

use std::sync::OnceLock;

use regex::Regex;

use crate::lexer;

/// Script name the wrapped program is compiled under. Stack frames that point
/// into user code carry this name.
pub const FILENAME: &str = "config.js";

/// Opens the async function user code runs in and defines the loader.
///
/// `require` takes the module id first and the annotated line last, so extra
/// user arguments never shift the line.
pub const PREAMBLE: &str = "(async function (module, exports) {\n\
const require = async (...args) => __load(args[0], args[args.length - 1], null);";

/// Closes the function. The leading statement references `require` so strict
/// tooling never flags it as unused.
pub const POSTAMBLE: &str = ";void require;\n})";

/// Lines in front of the first user line.
pub const PREAMBLE_LINES: u32 = 2;

/// Rewrite every real `require(...)` call into `await require(..., LINE)`.
///
/// Edits never add or remove newlines, so line N of the result is line N of
/// the input.
pub fn annotate(source: &str) -> String {
    let calls = lexer::require_calls(source);
    let mut out = source.to_string();

    // Back to front so earlier offsets stay valid.
    for call in calls.iter().rev() {
        let suffix = if call.empty {
            format!("undefined, {}", call.line)
        } else {
            format!(", {}", call.line)
        };
        if call.empty {
            let open = call.start + "require(".len();
            out.replace_range(open..call.close, &suffix);
        } else {
            out.insert_str(call.close, &suffix);
        }
        out.insert_str(call.start, "await ");
    }

    out
}

/// The full program handed to the sandbox.
pub fn wrap(source: &str) -> String {
    format!("{PREAMBLE}\n{}\n{POSTAMBLE}", annotate(source))
}

/// Recover the 1-based user line from an engine stack trace.
///
/// Takes the first stack line that mentions [`FILENAME`], reads the last
/// `:line` or `:line:column` marker on it, and removes the preamble. Returns
/// `None` when nothing points inside the `user_lines` lines of user text.
pub fn line_from_stack(stack: &str, user_lines: u32) -> Option<u32> {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let marker = MARKER.get_or_init(|| Regex::new(r":(\d+)(?::\d+)?").unwrap());

    let frame = stack.lines().find(|l| l.contains(FILENAME))?;
    let tail = &frame[frame.find(FILENAME)? + FILENAME.len()..];
    let wrapped: u32 = marker.captures_iter(tail).last()?.get(1)?.as_str().parse().ok()?;

    let line = wrapped.checked_sub(PREAMBLE_LINES)?;
    (1..=user_lines).contains(&line).then_some(line)
}

/// Number of lines in user text, counting an empty source as one line.
pub fn line_count(source: &str) -> u32 {
    source.split('\n').count() as u32
}
