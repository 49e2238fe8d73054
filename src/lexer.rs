use logos::Logos;

use crate::token::{Spanned, Token};

/// Tokenize a config script into spanned tokens.
///
/// Unlike a compiler lexer this never fails: characters the scanner does not
/// understand (non-ASCII identifiers, regex literal bodies, stray quotes) are
/// dropped, since the script is handed to a real engine anyway.
pub fn lex(source: &str) -> Vec<Spanned> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);

    while let Some(result) = lexer.next() {
        if let Ok(token) = result {
            tokens.push(Spanned {
                token,
                span: lexer.span(),
            });
        }
    }

    tokens
}

/// Byte offsets of every `require(...)` call site, with the call's 1-based line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireCall {
    /// Offset of the `r` in `require`.
    pub start: usize,
    /// Offset of the closing `)`.
    pub close: usize,
    /// Whether the parentheses contain nothing but whitespace.
    pub empty: bool,
    pub line: u32,
}

/// Find `require(...)` calls that are real code: not inside strings or
/// comments, and not a method call such as `foo.require(...)`.
pub fn require_calls(source: &str) -> Vec<RequireCall> {
    let tokens = lex(source);
    let mut calls = Vec::new();

    for (i, tok) in tokens.iter().enumerate() {
        if !matches!(&tok.token, Token::Ident(name) if name == "require") {
            continue;
        }
        if i > 0 && tokens[i - 1].token == Token::Dot {
            continue;
        }
        if tokens.get(i + 1).map(|t| &t.token) != Some(&Token::LParen) {
            continue;
        }

        let mut depth = 0usize;
        let mut close = None;
        for t in &tokens[i + 1..] {
            match t.token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(t.span.start);
                        break;
                    }
                }
                _ => {}
            }
        }

        let Some(close) = close else {
            // Unbalanced: leave it for the engine to report as a syntax error.
            continue;
        };

        let open = tokens[i + 1].span.end;
        calls.push(RequireCall {
            start: tok.span.start,
            close,
            empty: source[open..close].trim().is_empty(),
            line: line_of(source, tok.span.start),
        });
    }

    calls
}

/// 1-based line containing the byte at `offset`.
pub fn line_of(source: &str, offset: usize) -> u32 {
    let offset = offset.min(source.len());
    source[..offset].bytes().filter(|b| *b == b'\n').count() as u32 + 1
}
