//! Tool collaborator: the service trait, its catalog and the stdio wire format.
//!
//! Two implementations exist. [`local::LocalToolbox`] runs the file tools in
//! process; [`stdio::StdioToolClient`] talks to a separate tool server
//! (usually `summarizer serve-tools`, see [`server::serve`]) over one JSON
//! message per line.

pub mod local;
pub mod server;
pub mod stdio;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::tool_call::ToolCallRequest;

/// A tool declaration as shown to the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the `arguments` object.
    pub input_schema: Value,
}

/// Result of one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    /// The tool ran but failed (bad arguments, missing file, I/O error).
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Tool collaborator used by the execution loop.
///
/// `call` returns `Err` only for failures the caller must classify
/// ([`crate::error::UnknownToolError`], [`crate::error::TransportClosedError`],
/// session timeout). A tool that ran and failed is an `Ok` output with
/// `is_error` set.
pub trait ToolService {
    fn list_tools(&self) -> Result<Vec<ToolSpec>>;
    fn call(&self, request: &ToolCallRequest) -> Result<ToolOutput>;
}

impl<T: ToolService + ?Sized> ToolService for &T {
    fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        (**self).list_tools()
    }

    fn call(&self, request: &ToolCallRequest) -> Result<ToolOutput> {
        (**self).call(request)
    }
}

impl<T: ToolService + ?Sized> ToolService for Box<T> {
    fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        (**self).list_tools()
    }

    fn call(&self, request: &ToolCallRequest) -> Result<ToolOutput> {
        (**self).call(request)
    }
}

/// Render the tool catalog for prompts, one tool per block.
pub fn render_catalog(tools: &[ToolSpec]) -> String {
    tools
        .iter()
        .map(|tool| {
            let schema = serde_json::to_string(&tool.input_schema).unwrap_or_default();
            format!(
                "- {}: {}\n  arguments schema: {schema}",
                tool.name, tool.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Client to server message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum WireRequest {
    ListTools,
    CallTool {
        name: String,
        #[serde(default)]
        arguments: Map<String, Value>,
    },
}

/// Server to client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WireResponse {
    Tools { tools: Vec<ToolSpec> },
    Output(ToolOutput),
    UnknownTool { name: String },
    Error { message: String },
}
