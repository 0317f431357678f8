//! Typed failure classes carried through `anyhow::Result`.
//!
//! Orchestration code returns `anyhow::Error` everywhere; callers that need to
//! react to a specific class (recover, abort, pick an exit code) use
//! `err.downcast_ref::<T>()` on one of the types below.

use std::path::PathBuf;

use thiserror::Error;

/// Input paths are missing or unreadable. Raised before any oracle call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("template not found: {}", .0.display())]
    TemplateMissing(PathBuf),
    #[error("patient folder is not accessible: {}", .0.display())]
    PatientFolderMissing(PathBuf),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The tool collaborator has no tool with this name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown tool '{name}'")]
pub struct UnknownToolError {
    pub name: String,
}

/// The tool transport dropped mid-session.
///
/// `diagnostic_log` holds whatever the tool server wrote to its log before it
/// went away, so the operator can see why.
#[derive(Debug, Error)]
#[error("tool transport closed: {reason}")]
pub struct TransportClosedError {
    pub reason: String,
    pub diagnostic_log: String,
}

/// The oracle could not produce a completion (connection refused, HTTP error,
/// unparseable response).
#[derive(Debug, Error)]
#[error("generation service failed: {message}")]
pub struct GenerationServiceError {
    pub message: String,
}

/// The overall session budget ran out before the next blocking call.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("session timed out after {secs}s")]
pub struct SessionTimeoutError {
    pub secs: u64,
}
