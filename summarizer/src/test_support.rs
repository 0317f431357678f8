//! Test-only doubles for the oracle and tool collaborators, plus a patient
//! folder fixture.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::core::tool_call::ToolCallRequest;
use crate::error::{GenerationServiceError, UnknownToolError};
use crate::io::oracle::{ChatMessage, Oracle};
use crate::io::tools::local::builtin_specs;
use crate::io::tools::{ToolOutput, ToolService, ToolSpec};

/// Oracle that returns queued replies in order and records every request.
///
/// Running out of replies is a [`GenerationServiceError`], so a test that
/// under-scripts fails loudly instead of hanging.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    replies: RefCell<VecDeque<String>>,
    requests: RefCell<Vec<Vec<ChatMessage>>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().map(Into::into).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Every message list passed to `generate`, in call order.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl Oracle for ScriptedOracle {
    fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        self.requests.borrow_mut().push(messages.to_vec());
        self.replies.borrow_mut().pop_front().ok_or_else(|| {
            GenerationServiceError {
                message: "scripted oracle has no replies left".to_string(),
            }
            .into()
        })
    }
}

/// Tool service that declares the built-in tools, records calls and answers
/// with queued outputs. Names outside the catalog are [`UnknownToolError`].
#[derive(Debug)]
pub struct ScriptedTools {
    specs: Vec<ToolSpec>,
    outputs: RefCell<VecDeque<ToolOutput>>,
    calls: RefCell<Vec<ToolCallRequest>>,
}

impl ScriptedTools {
    pub fn new(outputs: Vec<ToolOutput>) -> Self {
        Self {
            specs: builtin_specs(),
            outputs: RefCell::new(outputs.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Every request that reached `call`, known tool or not.
    pub fn calls(&self) -> Vec<ToolCallRequest> {
        self.calls.borrow().clone()
    }
}

impl ToolService for ScriptedTools {
    fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        Ok(self.specs.clone())
    }

    fn call(&self, request: &ToolCallRequest) -> Result<ToolOutput> {
        self.calls.borrow_mut().push(request.clone());
        if !self.specs.iter().any(|spec| spec.name == request.name) {
            return Err(UnknownToolError {
                name: request.name.clone(),
            }
            .into());
        }
        Ok(self
            .outputs
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| ToolOutput::ok("ok")))
    }
}

/// Temporary workspace with a patient folder, a template and an artifacts dir.
///
/// ```text
/// <tmp>/template.txt
/// <tmp>/patient/
/// <tmp>/artifacts/
/// ```
pub struct PatientFixture {
    temp: TempDir,
}

impl PatientFixture {
    pub fn new(template: &str) -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        fs::create_dir(temp.path().join("patient")).context("create patient folder")?;
        fs::write(temp.path().join("template.txt"), template).context("write template")?;
        Ok(Self { temp })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn folder(&self) -> PathBuf {
        self.root().join("patient")
    }

    pub fn template_path(&self) -> PathBuf {
        self.root().join("template.txt")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root().join("artifacts")
    }

    /// Write a document into the patient folder and return its path.
    pub fn add_document(&self, name: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.folder().join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// File names in the patient folder, sorted.
    pub fn folder_entries(&self) -> Result<Vec<String>> {
        let mut names = fs::read_dir(self.folder())
            .context("read patient folder")?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<Vec<_>>>()
            .context("read patient folder entry")?;
        names.sort();
        Ok(names)
    }
}
