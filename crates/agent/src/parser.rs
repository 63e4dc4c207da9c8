//! Tag-block extraction from raw model text.
//!
//! The model writes tool invocations and results inline:
//!
//! ```text
//! <TOOL>{"tool": "calc", "input": {"expression": "2+2"}}</TOOL>
//! <RESULT>{"answer": 4}</RESULT>
//! ```
//!
//! A block's extent is found by counting braces from the opening tag, ignoring
//! braces inside quoted strings, so `}` or `</TOOL>` inside a string value
//! never ends the block early. The closing tag must follow the balanced value
//! (whitespace allowed). Malformed blocks are skipped and logged; they never
//! stop extraction of later blocks.

use reagent_core::tool::{JsonMap, ToolCallRequest};
use serde_json::Value;
use tracing::{debug, warn};

pub const TOOL_OPEN: &str = "<TOOL>";
pub const TOOL_CLOSE: &str = "</TOOL>";
pub const RESULT_OPEN: &str = "<RESULT>";
pub const RESULT_CLOSE: &str = "</RESULT>";

/// Why a candidate block was dropped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BlockRejection {
    #[error("malformed JSON: {0}")]
    InvalidJson(String),

    #[error("tool call must be a JSON object")]
    NotAnObject,

    #[error("tool call missing 'tool' field")]
    MissingTool,

    #[error("tool call 'tool' field must be a string")]
    ToolNotString,

    #[error("tool call missing 'input' field")]
    MissingInput,

    #[error("tool input must be a JSON object")]
    InputNotObject,
}

/// A balanced block located in the source text.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Block<'a> {
    /// Byte offset of the opening tag
    start: usize,
    /// Byte offset just past the closing tag
    end: usize,
    /// The JSON text between the tags, trimmed
    json: &'a str,
}

/// Everything extracted from one response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    pub tool_calls: Vec<ToolCallRequest>,
    pub results: Vec<Value>,
}

/// Extract every well-formed tool call, in document order.
pub fn parse_tool_calls(content: &str) -> Vec<ToolCallRequest> {
    find_blocks(content, TOOL_OPEN, TOOL_CLOSE)
        .into_iter()
        .filter_map(|block| match parse_tool_call(block.json) {
            Ok(call) => Some(call),
            Err(reason) => {
                warn!(%reason, "Skipping invalid tool call");
                debug!(content = block.json, "Rejected tool block");
                None
            }
        })
        .collect()
}

/// Extract every result block that parses as JSON, in document order.
pub fn parse_results(content: &str) -> Vec<Value> {
    find_blocks(content, RESULT_OPEN, RESULT_CLOSE)
        .into_iter()
        .filter_map(|block| match serde_json::from_str::<Value>(block.json) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Skipping malformed result JSON");
                debug!(content = block.json, "Rejected result block");
                None
            }
        })
        .collect()
}

/// Extract both tool calls and results.
pub fn extract_all(content: &str) -> ParsedResponse {
    ParsedResponse {
        tool_calls: parse_tool_calls(content),
        results: parse_results(content),
    }
}

/// Whether the text holds at least one balanced `<TOOL>` block.
pub fn has_tool_calls(content: &str) -> bool {
    !find_blocks(content, TOOL_OPEN, TOOL_CLOSE).is_empty()
}

/// Whether the text holds at least one balanced `<RESULT>` block.
pub fn has_results(content: &str) -> bool {
    !find_blocks(content, RESULT_OPEN, RESULT_CLOSE).is_empty()
}

/// Remove all tool and result blocks, leaving the surrounding prose.
///
/// Runs of blank lines left behind collapse to a single blank line.
pub fn strip_blocks(content: &str) -> String {
    let mut spans: Vec<(usize, usize)> = find_blocks(content, TOOL_OPEN, TOOL_CLOSE)
        .into_iter()
        .chain(find_blocks(content, RESULT_OPEN, RESULT_CLOSE))
        .map(|b| (b.start, b.end))
        .collect();
    spans.sort_unstable();

    let mut text = String::with_capacity(content.len());
    let mut cursor = 0;
    for (start, end) in spans {
        // a RESULT block can sit inside a TOOL string and vice versa
        if start < cursor {
            cursor = cursor.max(end);
            continue;
        }
        text.push_str(&content[cursor..start]);
        cursor = end;
    }
    text.push_str(&content[cursor..]);

    let mut out: Vec<&str> = Vec::new();
    let mut previous_blank = false;
    for line in text.lines() {
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        out.push(if blank { "" } else { line });
        previous_blank = blank;
    }
    out.join("\n").trim().to_string()
}

fn parse_tool_call(json: &str) -> Result<ToolCallRequest, BlockRejection> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| BlockRejection::InvalidJson(e.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(BlockRejection::NotAnObject);
    };

    let alias = match object.remove("tool") {
        None => return Err(BlockRejection::MissingTool),
        Some(Value::String(alias)) => alias,
        Some(_) => return Err(BlockRejection::ToolNotString),
    };
    let input: JsonMap = match object.remove("input") {
        None => return Err(BlockRejection::MissingInput),
        Some(Value::Object(input)) => input,
        Some(_) => return Err(BlockRejection::InputNotObject),
    };

    Ok(ToolCallRequest::new(alias, input))
}

/// Locate balanced `open {...} close` blocks.
///
/// Scanning works on bytes: tags, braces, quotes, and backslashes are all
/// ASCII, so every slice boundary falls on a character boundary.
fn find_blocks<'a>(content: &'a str, open: &str, close: &str) -> Vec<Block<'a>> {
    let bytes = content.as_bytes();
    let mut blocks = Vec::new();
    let mut pos = 0;

    while let Some(found) = content[pos..].find(open) {
        let start = pos + found;
        let json_start = start + open.len();

        let Some(json_end) = balanced_object_end(bytes, json_start) else {
            // no balanced object here: try the next opening tag
            pos = json_start;
            continue;
        };

        let rest = &content[json_end..];
        let trimmed = rest.trim_start();
        if trimmed.starts_with(close) {
            let close_start = json_end + (rest.len() - trimmed.len());
            blocks.push(Block {
                start,
                end: close_start + close.len(),
                json: content[json_start..json_end].trim(),
            });
            pos = close_start + close.len();
        } else {
            // retry any opening tag inside the abandoned span
            debug!(tag = open, offset = start, "Balanced block without closing tag");
            pos = json_start;
        }
    }

    blocks
}

/// Byte offset just past the object that starts (after whitespace) at `from`.
fn balanced_object_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if bytes.get(i) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[i..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}
