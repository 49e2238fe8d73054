use logos::Logos;

/// Tokens produced by scanning a config script.
///
/// This is not a JavaScript parser. It only needs to be precise about what is
/// *not* code (strings, templates, comments) so that `require(` inside a
/// string or a comment is never rewritten, and about brace/key structure for
/// config completions. Anything else collapses into `Punct`.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // ── Literals ───────────────────────────────────────────────────────
    #[regex(r#""([^"\\\n]|\\.)*""#, unquote)]
    #[regex(r"'([^'\\\n]|\\.)*'", unquote)]
    Str(String),

    #[regex(r"`([^`\\]|\\.)*`", unquote)]
    Template(String),

    #[regex(r"[0-9][0-9a-zA-Z_.]*")]
    Number,

    // ── Identifiers ────────────────────────────────────────────────────
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    // ── Structure ──────────────────────────────────────────────────────
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token("=")]
    Assign,

    #[regex(r"[-+*/%<>!&|^~?@#]")]
    Punct,

    /// Never produced: the callback skips the whole comment.
    #[token("/*", block_comment)]
    BlockComment,
}

/// Skip to just past the closing `*/`, or to the end of an unterminated comment.
fn block_comment(lex: &mut logos::Lexer<Token>) -> logos::Skip {
    let rest = lex.remainder();
    let len = rest.find("*/").map(|i| i + 2).unwrap_or(rest.len());
    lex.bump(len);
    logos::Skip
}

fn unquote(lex: &mut logos::Lexer<Token>) -> String {
    let s = lex.slice();
    s[1..s.len() - 1].to_string()
}

/// A token with its byte span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: std::ops::Range<usize>,
}
