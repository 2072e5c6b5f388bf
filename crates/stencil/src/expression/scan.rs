/*
 * expression/scan.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Helpers for scanning expression text at nesting depth zero.

/// Characters at nesting depth zero and outside quoted strings, with their
/// byte offsets. Brackets and quote characters themselves are not reported.
pub(crate) fn top_level(text: &str) -> Vec<(usize, char)> {
    let mut result = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '{' | '(' | '[' => depth += 1,
            '}' | ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => result.push((i, ch)),
            _ => {}
        }
    }
    result
}

/// Split at every top-level occurrence of `separator`.
pub(crate) fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, ch) in top_level(text) {
        if ch == separator {
            parts.push(&text[start..i]);
            start = i + ch.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Split at every top-level `->`.
pub(crate) fn split_arrows(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, ch) in top_level(text) {
        if ch == '-' && bytes.get(i + 1) == Some(&b'>') {
            parts.push(&text[start..i]);
            start = i + 2;
        }
    }
    parts.push(&text[start..]);
    parts
}

/// If `text` is exactly one quoted string, its unescaped content.
pub(crate) fn unquote(text: &str) -> Option<String> {
    let quote = text.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let mut content = String::new();
    let mut escaped = false;
    for (i, ch) in text.char_indices().skip(1) {
        if escaped {
            if ch != quote && ch != '\\' {
                content.push('\\');
            }
            content.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            return (i + ch.len_utf8() == text.len()).then_some(content);
        } else {
            content.push(ch);
        }
    }
    None
}

/// If `text` is exactly one `{...}` group, its content.
pub(crate) fn unbrace(text: &str) -> Option<&str> {
    if !text.starts_with('{') {
        return None;
    }
    let close = crate::lexer::matching_brace(text, 0)?;
    (close == text.len() - 1).then(|| &text[1..close])
}
