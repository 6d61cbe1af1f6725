//! JSON extraction from mixed AI responses.
//!
//! Step outputs are requested as JSON, but models wrap them in markdown
//! fences or lead with prose. This module pulls the first well-formed JSON
//! value out of a raw completion and distinguishes "no JSON at all" from
//! "JSON started but was cut off", which the executor treats differently
//! (truncation is a transient failure worth a retry; absence goes to the
//! repair pass).
//!
//! Extraction strategies, in order:
//! 1. ```json fenced block
//! 2. Generic ``` fenced block
//! 3. Direct JSON (content starts with '{' or '[')
//! 4. First balanced JSON object/array anywhere in the content

use regex::Regex;
use thiserror::Error;

/// Error type for JSON extraction failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed} unclosed delimiters. Partial: {preview}...")]
    Truncated { preview: String, unclosed: usize },

    #[error("No JSON content found in response starting with: '{preview}'")]
    NotFound { preview: String },
}

impl JsonExtractionError {
    /// Truncated responses are retried; missing JSON goes to repair.
    pub fn is_truncation(&self) -> bool {
        matches!(self, JsonExtractionError::Truncated { .. })
    }
}

/// Extract the first well-formed JSON value from a raw completion.
pub fn extract_json(content: &str) -> Result<serde_json::Value, JsonExtractionError> {
    let trimmed = content.trim();

    // Fenced blocks first: the most reliable location for structured output.
    for candidate in fenced_blocks(trimmed) {
        if let Ok(value) = serde_json::from_str(&candidate) {
            return Ok(value);
        }
    }

    // Direct JSON or JSON embedded in prose.
    if let Some(start) = trimmed.find(['{', '[']) {
        let tail = &trimmed[start..];
        if let Some(end) = find_balanced_end(tail) {
            if let Ok(value) = serde_json::from_str(&tail[..=end]) {
                return Ok(value);
            }
        }

        let unclosed = count_unclosed(tail);
        if unclosed > 0 {
            return Err(JsonExtractionError::Truncated {
                preview: preview(tail, 100),
                unclosed,
            });
        }
    }

    Err(JsonExtractionError::NotFound {
        preview: preview(trimmed, 50),
    })
}

/// Candidate payloads from markdown code fences, ```json fences first.
fn fenced_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();

    let json_fence = Regex::new(r"(?s)```json\s*\n(.*?)\n?```").expect("static regex");
    for cap in json_fence.captures_iter(content) {
        blocks.push(cap[1].trim().to_string());
    }

    let generic_fence = Regex::new(r"(?s)```\s*\n(.*?)\n?```").expect("static regex");
    for cap in generic_fence.captures_iter(content) {
        let body = cap[1].trim();
        if body.starts_with('{') || body.starts_with('[') {
            blocks.push(body.to_string());
        }
    }

    blocks
}

/// Index of the byte closing the first balanced JSON value, if any.
///
/// Tracks string literals and escapes so braces inside strings don't count.
fn find_balanced_end(s: &str) -> Option<usize> {
    let mut depth: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Number of unclosed braces/brackets outside string literals.
fn count_unclosed(s: &str) -> usize {
    let mut depth: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => depth -= 1,
            _ => {}
        }
    }

    depth.max(0) as usize
}

fn preview(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
