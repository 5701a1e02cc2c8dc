// ABOUTME: Chart configuration extraction from assistant responses
// ABOUTME: Finds the trailing fenced JSON block and repairs embedded JS functions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Matches the first fenced code block, optionally tagged `json`.
/// Non-greedy so following blocks are ignored.
static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fenced block regex is valid")
});

/// Extract a chart configuration from an assistant response.
///
/// Looks for the first fenced JSON block, tries a strict parse, and on
/// failure runs one repair pass that replaces `function(...) {...}` spans
/// with `null`. Returns `None` when there is no block or the content never
/// parses as JSON.
#[must_use]
pub fn extract_chart_config(text: &str) -> Option<serde_json::Value> {
    let captures = FENCED_JSON.captures(text)?;
    let candidate = captures.get(1)?.as_str();

    if let Ok(value) = serde_json::from_str(candidate) {
        return Some(value);
    }

    let repaired = strip_js_functions(candidate);
    match serde_json::from_str(&repaired) {
        Ok(value) => {
            debug!("Chart config parsed after stripping JS functions");
            Some(value)
        }
        Err(e) => {
            debug!("Fenced block is not valid JSON even after repair: {}", e);
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    /// Inside `function (...)`, tracking parenthesis depth
    FunctionSignature { paren_depth: u32 },
    /// Between the signature and the opening brace
    AwaitingBody,
    /// Inside the function body, tracking brace depth
    FunctionBody { brace_depth: u32 },
}

/// Replace each `function(...) {...}` span with `null`.
///
/// Balanced-brace scanning without string-literal awareness: a brace inside
/// a string literal within a function body will truncate that span early.
/// Models rarely emit those, and a failed repair only means no chart.
fn strip_js_functions(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut output = String::with_capacity(input.len());
    let mut state = ScanState::Normal;
    // Start of the span being replaced, for bailing out on malformed input
    let mut span_start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match state {
            ScanState::Normal => {
                if matches_function_keyword(&chars, i) {
                    span_start = i;
                    i += "function".len();
                    // Skip whitespace and an optional identifier before the args
                    while i < chars.len() && (chars[i].is_whitespace() || chars[i].is_alphanumeric() || chars[i] == '_') {
                        i += 1;
                    }
                    if i < chars.len() && chars[i] == '(' {
                        state = ScanState::FunctionSignature { paren_depth: 1 };
                        i += 1;
                    } else {
                        // Not a function expression after all
                        output.extend(&chars[span_start..i]);
                    }
                } else {
                    output.push(c);
                    i += 1;
                }
            }
            ScanState::FunctionSignature { paren_depth } => {
                match c {
                    '(' => state = ScanState::FunctionSignature { paren_depth: paren_depth + 1 },
                    ')' => {
                        if paren_depth == 1 {
                            state = ScanState::AwaitingBody;
                        } else {
                            state = ScanState::FunctionSignature { paren_depth: paren_depth - 1 };
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
            ScanState::AwaitingBody => {
                if c == '{' {
                    state = ScanState::FunctionBody { brace_depth: 1 };
                    i += 1;
                } else if c.is_whitespace() {
                    i += 1;
                } else {
                    // Malformed; emit the span verbatim and resume scanning
                    output.extend(&chars[span_start..=i]);
                    state = ScanState::Normal;
                    i += 1;
                }
            }
            ScanState::FunctionBody { brace_depth } => {
                match c {
                    '{' => state = ScanState::FunctionBody { brace_depth: brace_depth + 1 },
                    '}' => {
                        if brace_depth == 1 {
                            output.push_str("null");
                            state = ScanState::Normal;
                        } else {
                            state = ScanState::FunctionBody { brace_depth: brace_depth - 1 };
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
        }
    }

    // Unterminated span: keep the original text so the caller sees the parse fail
    match state {
        ScanState::Normal => {}
        _ => output.extend(&chars[span_start..]),
    }

    output
}

/// True when `function` starts at `pos` as a standalone keyword
fn matches_function_keyword(chars: &[char], pos: usize) -> bool {
    const KEYWORD: &[char] = &['f', 'u', 'n', 'c', 't', 'i', 'o', 'n'];

    if pos + KEYWORD.len() > chars.len() || chars[pos..pos + KEYWORD.len()] != *KEYWORD {
        return false;
    }
    // Reject identifiers like "myfunction" or "functional"
    if pos > 0 {
        let prev = chars[pos - 1];
        if prev.is_alphanumeric() || prev == '_' {
            return false;
        }
    }
    if let Some(&next) = chars.get(pos + KEYWORD.len()) {
        if next.is_alphanumeric() || next == '_' {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_valid_json_block() {
        let text = "Here is your chart:\n```json\n{\"a\": 1}\n```";
        assert_eq!(extract_chart_config(text), Some(json!({"a": 1})));
    }

    #[test]
    fn extracts_untagged_fence() {
        let text = "```\n{\"series\": []}\n```";
        assert_eq!(extract_chart_config(text), Some(json!({"series": []})));
    }

    #[test]
    fn no_fence_means_no_chart() {
        assert_eq!(extract_chart_config("Just a plain answer."), None);
        assert_eq!(extract_chart_config(""), None);
    }

    #[test]
    fn garbage_in_fence_means_no_chart() {
        let text = "```json\nnot json at all {{{\n```";
        assert_eq!(extract_chart_config(text), None);
    }

    #[test]
    fn first_block_wins() {
        let text = "```json\n{\"first\": true}\n```\ntext\n```json\n{\"second\": true}\n```";
        assert_eq!(extract_chart_config(text), Some(json!({"first": true})));
    }

    #[test]
    fn repairs_embedded_function() {
        let text = concat!(
            "```json\n",
            "{\"color\": function(p){ return p.value > 0 ? \"red\" : \"blue\"; }, \"type\": \"bar\"}\n",
            "```"
        );
        assert_eq!(
            extract_chart_config(text),
            Some(json!({"color": null, "type": "bar"}))
        );
    }

    #[test]
    fn repairs_nested_braces_in_body() {
        let text = "```json\n{\"fmt\": function(v){ if (v) { return v; } return 0; }}\n```";
        assert_eq!(extract_chart_config(text), Some(json!({"fmt": null})));
    }

    #[test]
    fn keyword_inside_identifier_is_untouched() {
        assert_eq!(
            strip_js_functions("{\"label\": \"functional\"}"),
            "{\"label\": \"functional\"}"
        );
    }

    #[test]
    fn unterminated_function_keeps_original() {
        let input = "{\"f\": function(v){ no closing brace";
        assert_eq!(strip_js_functions(input), input);
    }
}
