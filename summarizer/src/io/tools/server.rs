//! Stdio tool server loop (`summarizer serve-tools`).

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::{ToolService, WireRequest, WireResponse};
use crate::core::tool_call::ToolCallRequest;
use crate::error::UnknownToolError;

/// Answer one request per input line until EOF.
///
/// Malformed requests and tool failures are answered with an `error` reply;
/// only I/O on `output` ends the loop early.
pub fn serve<S, R, W>(service: &S, input: R, mut output: W) -> Result<()>
where
    S: ToolService + ?Sized,
    R: BufRead,
    W: Write,
{
    info!("tool server ready");
    for line in input.lines() {
        let line = line.context("read request line")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<WireRequest>(&line) {
            Ok(request) => handle(service, request),
            Err(err) => WireResponse::Error {
                message: format!("malformed request: {err}"),
            },
        };
        let mut reply = serde_json::to_string(&response).context("encode reply")?;
        reply.push('\n');
        output
            .write_all(reply.as_bytes())
            .and_then(|()| output.flush())
            .context("write reply")?;
    }
    info!("tool server input closed");
    Ok(())
}

fn handle<S: ToolService + ?Sized>(service: &S, request: WireRequest) -> WireResponse {
    match request {
        WireRequest::ListTools => match service.list_tools() {
            Ok(tools) => WireResponse::Tools { tools },
            Err(err) => WireResponse::Error {
                message: format!("{err:#}"),
            },
        },
        WireRequest::CallTool { name, arguments } => {
            debug!(tool = %name, "call_tool");
            match service.call(&ToolCallRequest { name, arguments }) {
                Ok(output) => WireResponse::Output(output),
                Err(err) => match err.downcast_ref::<UnknownToolError>() {
                    Some(unknown) => WireResponse::UnknownTool {
                        name: unknown.name.clone(),
                    },
                    None => WireResponse::Error {
                        message: format!("{err:#}"),
                    },
                },
            }
        }
    }
}
