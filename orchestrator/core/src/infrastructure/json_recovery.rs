// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tolerant JSON recovery for model output.
//!
//! Models wrap JSON in Markdown fences, prefix it with chatter, or leave a
//! trailing comma behind. Recovery order:
//!
//! 1. the whole text, trimmed
//! 2. the body of the first code fence
//! 3. each balanced `{…}` substring in order of appearance (string and
//!    escape aware, so braces inside string literals are ignored)
//!
//! Each candidate is decoded as-is, then once more with trailing commas
//! removed. The first candidate that decodes to an object wins.

use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum JsonRecoveryError {
    #[error("No JSON object found in model output")]
    NoObject,

    #[error("Malformed JSON object: {0}")]
    Malformed(String),
}

/// Recover the first JSON object embedded in `text`.
pub fn recover_object(text: &str) -> Result<Map<String, Value>, JsonRecoveryError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(JsonRecoveryError::NoObject);
    }

    if let Some(object) = decode_object(trimmed) {
        return Ok(object);
    }

    if let Some(body) = fenced_body(trimmed) {
        if let Some(object) = decode_object(body) {
            return Ok(object);
        }
    }

    let mut last_candidate = None;
    let mut search_from = 0;
    while let Some((start, end)) = balanced_object(trimmed, search_from) {
        let candidate = &trimmed[start..end];
        if let Some(object) = decode_object(candidate) {
            return Ok(object);
        }
        last_candidate = Some(candidate);
        search_from = start + 1;
    }

    match last_candidate {
        Some(candidate) => Err(JsonRecoveryError::Malformed(preview(candidate))),
        None => Err(JsonRecoveryError::NoObject),
    }
}

fn decode_object(candidate: &str) -> Option<Map<String, Value>> {
    let as_object = |value: Value| match value {
        Value::Object(map) => Some(map),
        _ => None,
    };

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return as_object(value);
    }

    let repaired = strip_trailing_commas(candidate);
    serde_json::from_str::<Value>(&repaired).ok().and_then(as_object)
}

/// Body of the first ```` ``` ```` fence, skipping an optional language tag.
fn fenced_body(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let body_start = match after_fence.find('\n') {
        Some(newline) if !after_fence[..newline].trim().contains(['{', '[']) => newline + 1,
        _ => 0,
    };
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Byte range of the first balanced `{…}` starting at or after `from`.
fn balanced_object(text: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut start = from + text.get(from..)?.find('{')?;

    loop {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, &byte) in bytes[start..].iter().enumerate() {
            if in_string {
                match byte {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }

            match byte {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((start, start + offset + 1));
                    }
                }
                _ => {}
            }
        }

        // Unbalanced from this brace; an inner one may still close
        start = start + 1 + text.get(start + 1..)?.find('{')?;
    }
}

/// Drop commas that directly precede `}` or `]`, outside string literals.
fn strip_trailing_commas(candidate: &str) -> String {
    let mut out = String::with_capacity(candidate.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = candidate.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }

    out
}

fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}
