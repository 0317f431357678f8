//! Tool client for an external server speaking JSON lines over stdio.

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use super::{ToolOutput, ToolService, ToolSpec, WireRequest, WireResponse};
use crate::core::budget::SessionBudget;
use crate::core::tool_call::ToolCallRequest;
use crate::error::{SessionTimeoutError, TransportClosedError, UnknownToolError};

/// How long a closed server gets to finish writing its log before we read it.
const EXIT_GRACE: Duration = Duration::from_millis(500);
/// How long a server gets to exit after its stdin closes on drop.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

struct Session {
    child: Child,
    stdin: Option<ChildStdin>,
    replies: Receiver<String>,
}

/// Spawns the configured tool server and exchanges one request/reply pair
/// per call. Replies wait no longer than the remaining session budget.
pub struct StdioToolClient {
    session: RefCell<Session>,
    log_path: PathBuf,
    budget: SessionBudget,
}

impl StdioToolClient {
    /// Spawn `command` with stderr captured to `log_path`.
    #[instrument(skip_all, fields(program = command.first().map(String::as_str)))]
    pub fn spawn(command: &[String], log_path: &Path, budget: SessionBudget) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("tool server command is empty"))?;
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log directory {}", parent.display()))?;
        }
        let log = File::create(log_path)
            .with_context(|| format!("create tool server log {}", log_path.display()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(log))
            .spawn()
            .with_context(|| format!("spawn tool server {program}"))?;

        let stdin = child.stdin.take().context("tool server stdin was not piped")?;
        let stdout = child
            .stdout
            .take()
            .context("tool server stdout was not piped")?;

        let (sender, replies) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if sender.send(line).is_err() {
                    break;
                }
            }
        });

        debug!(pid = child.id(), "tool server started");
        Ok(Self {
            session: RefCell::new(Session {
                child,
                stdin: Some(stdin),
                replies,
            }),
            log_path: log_path.to_path_buf(),
            budget,
        })
    }

    fn request(&self, request: &WireRequest) -> Result<WireResponse> {
        let timeout = self.budget.remaining()?;
        let mut session = self.session.borrow_mut();

        let mut line = serde_json::to_string(request).context("encode tool request")?;
        line.push('\n');
        let written = match session.stdin.as_mut() {
            Some(stdin) => stdin
                .write_all(line.as_bytes())
                .and_then(|()| stdin.flush())
                .map_err(|err| err.to_string()),
            None => Err("stdin already closed".to_string()),
        };
        if let Err(reason) = written {
            return Err(self.transport_closed(&mut session, format!("write failed: {reason}")));
        }

        let reply = loop {
            match session.replies.recv_timeout(timeout) {
                Ok(reply) if reply.trim().is_empty() => continue,
                Ok(reply) => break reply,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(SessionTimeoutError {
                        secs: self.budget.total().as_secs(),
                    }
                    .into());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(
                        self.transport_closed(&mut session, "server closed its output".to_string())
                    );
                }
            }
        };
        serde_json::from_str(&reply).with_context(|| format!("parse tool server reply: {reply}"))
    }

    fn transport_closed(&self, session: &mut Session, reason: String) -> anyhow::Error {
        session.stdin = None;
        let reason = match session.child.wait_timeout(EXIT_GRACE) {
            Ok(Some(status)) => format!("{reason} ({status})"),
            _ => reason,
        };
        let diagnostic_log = fs::read_to_string(&self.log_path).unwrap_or_default();
        warn!(%reason, log = %self.log_path.display(), "tool transport closed");
        TransportClosedError {
            reason,
            diagnostic_log,
        }
        .into()
    }
}

impl ToolService for StdioToolClient {
    fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        match self.request(&WireRequest::ListTools)? {
            WireResponse::Tools { tools } => Ok(tools),
            WireResponse::Error { message } => Err(anyhow!("tool server error: {message}")),
            other => Err(anyhow!("unexpected reply to list_tools: {other:?}")),
        }
    }

    #[instrument(skip_all, fields(tool = %request.name))]
    fn call(&self, request: &ToolCallRequest) -> Result<ToolOutput> {
        let wire = WireRequest::CallTool {
            name: request.name.clone(),
            arguments: request.arguments.clone(),
        };
        match self.request(&wire)? {
            WireResponse::Output(output) => Ok(output),
            WireResponse::UnknownTool { name } => Err(UnknownToolError { name }.into()),
            WireResponse::Error { message } => Err(anyhow!("tool server error: {message}")),
            WireResponse::Tools { .. } => Err(anyhow!("unexpected tool list reply to call_tool")),
        }
    }
}

impl Drop for StdioToolClient {
    fn drop(&mut self) {
        let session = self.session.get_mut();
        // Closing stdin ends the server's read loop.
        session.stdin = None;
        match session.child.wait_timeout(SHUTDOWN_GRACE) {
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => {
                warn!("tool server did not exit, killing");
                let _ = session.child.kill();
                let _ = session.child.wait();
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn closed_pipe_reports_transport_closed_with_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = temp.path().join("logs/tools.log");
        let client = StdioToolClient::spawn(
            &sh("echo 'boom: missing api key' >&2"),
            &log,
            SessionBudget::new(Duration::from_secs(30)),
        )
        .expect("spawn");

        let err = client.list_tools().unwrap_err();
        let closed = err
            .downcast_ref::<TransportClosedError>()
            .expect("transport closed");
        assert!(closed.diagnostic_log.contains("boom: missing api key"));
    }

    #[test]
    fn replies_are_read_line_by_line() {
        let temp = tempfile::tempdir().expect("tempdir");
        let client = StdioToolClient::spawn(
            &sh(r#"read line; echo '{"status":"output","content":"hi","is_error":false}'; read line"#),
            &temp.path().join("tools.log"),
            SessionBudget::new(Duration::from_secs(30)),
        )
        .expect("spawn");

        let output = client
            .call(&ToolCallRequest {
                name: "read_file".to_string(),
                arguments: serde_json::Map::new(),
            })
            .expect("call");
        assert_eq!(output, ToolOutput::ok("hi"));
    }

    #[test]
    fn unknown_tool_reply_maps_to_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let client = StdioToolClient::spawn(
            &sh(r#"read line; echo '{"status":"unknown_tool","name":"rm"}'; read line"#),
            &temp.path().join("tools.log"),
            SessionBudget::new(Duration::from_secs(30)),
        )
        .expect("spawn");

        let err = client
            .call(&ToolCallRequest {
                name: "rm".to_string(),
                arguments: serde_json::Map::new(),
            })
            .unwrap_err();
        assert!(err.downcast_ref::<UnknownToolError>().is_some());
    }
}
