//! Tolerant extraction of a `<tool_call>{...}</tool_call>` block from oracle text.
//!
//! Parsing is a two-stage combinator: strict JSON first, then one bounded
//! repair pass (close an open string, drop a trailing comma, append missing
//! closers) and a single retry. Failure is a value, never a panic: "no tool
//! call" is a normal outcome for the caller.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const OPEN_DELIMITER: &str = "<tool_call>";
pub const CLOSE_DELIMITER: &str = "</tool_call>";
/// Emitted by the dispatcher instead of a tool call once the task is done.
pub const COMPLETION_SENTINEL: &str = "TASK_COMPLETE";

/// Whether the dispatcher reply signals completion.
///
/// The sentinel only counts outside a tool call block, so a tool call whose
/// content mentions it is still dispatched.
pub fn is_completion(text: &str) -> bool {
    let outside = match text.find(OPEN_DELIMITER) {
        Some(start) => &text[..start],
        None => text,
    };
    outside.contains(COMPLETION_SENTINEL)
}

/// A request for the tool collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Why no tool call could be recovered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedToolCallError {
    #[error("no <tool_call> block in oracle output")]
    NoToolCall,
    #[error("tool call is not valid JSON after repair: {reason}")]
    InvalidJson { block: String, reason: String },
    #[error("tool call has no string `name`")]
    MissingName { block: String },
    #[error("tool call `arguments` must be an object")]
    InvalidArguments { block: String },
}

/// Extract and parse the first tool call in `text`.
pub fn parse_tool_call(text: &str) -> Result<ToolCallRequest, MalformedToolCallError> {
    let block = extract_block(text).ok_or(MalformedToolCallError::NoToolCall)?;
    let value = parse_tolerant(&block)?;
    into_request(value, &block)
}

/// Text between the opening delimiter and the closing one (or end of text),
/// with stray delimiters and code fences removed.
fn extract_block(text: &str) -> Option<String> {
    let start = text.find(OPEN_DELIMITER)? + OPEN_DELIMITER.len();
    let rest = &text[start..];
    let body = match rest.find(CLOSE_DELIMITER) {
        Some(end) => &rest[..end],
        None => rest,
    };
    let cleaned = body
        .replace(OPEN_DELIMITER, "")
        .replace(CLOSE_DELIMITER, "")
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");
    Some(cleaned.trim().to_string())
}

fn parse_tolerant(block: &str) -> Result<Value, MalformedToolCallError> {
    if let Ok(value) = serde_json::from_str::<Value>(block) {
        return Ok(value);
    }
    let repaired = repair_json(block);
    serde_json::from_str::<Value>(&repaired).map_err(|err| MalformedToolCallError::InvalidJson {
        block: block.to_string(),
        reason: err.to_string(),
    })
}

/// Single repair pass for truncated JSON.
///
/// Tracks string state so braces inside string literals are not counted, then
/// closes an unterminated string, removes a dangling comma and appends the
/// closers for every still-open `{` / `[` in nesting order.
pub fn repair_json(input: &str) -> String {
    let mut open: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in input.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => open.push('}'),
            '[' => open.push(']'),
            '}' | ']' => {
                if open.last() == Some(&c) {
                    open.pop();
                }
            }
            _ => {}
        }
    }

    let mut repaired = input.trim_end().to_string();
    if in_string {
        if escaped {
            repaired.pop();
        }
        repaired.push('"');
    }
    while repaired.ends_with(',') {
        repaired.pop();
        repaired.truncate(repaired.trim_end().len());
    }
    while let Some(closer) = open.pop() {
        repaired.push(closer);
    }
    repaired
}

fn into_request(value: Value, block: &str) -> Result<ToolCallRequest, MalformedToolCallError> {
    let Value::Object(mut object) = value else {
        return Err(MalformedToolCallError::MissingName {
            block: block.to_string(),
        });
    };
    let name = match object.remove("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        _ => {
            return Err(MalformedToolCallError::MissingName {
                block: block.to_string(),
            });
        }
    };
    let arguments = match object.remove("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(arguments)) => arguments,
        // Some models emit OpenAI-style stringified arguments.
        Some(Value::String(encoded)) => match serde_json::from_str::<Value>(&encoded) {
            Ok(Value::Object(arguments)) => arguments,
            _ => {
                return Err(MalformedToolCallError::InvalidArguments {
                    block: block.to_string(),
                });
            }
        },
        Some(_) => {
            return Err(MalformedToolCallError::InvalidArguments {
                block: block.to_string(),
            });
        }
    };
    Ok(ToolCallRequest { name, arguments })
}
