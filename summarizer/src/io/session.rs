//! Artifact layout for an agent session and per-iteration logs.
//!
//! ```text
//! <artifacts_dir>/
//!   plan.txt
//!   blackboard.json
//!   iterations/<n>/plan.txt
//!   iterations/<n>/step_response.txt
//!   iterations/<n>/meta.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::plan::Plan;

/// All canonical paths within the artifacts directory.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub dir: PathBuf,
    pub plan_path: PathBuf,
    pub blackboard_path: PathBuf,
    pub iterations_dir: PathBuf,
}

impl SessionPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            plan_path: dir.join("plan.txt"),
            blackboard_path: dir.join("blackboard.json"),
            iterations_dir: dir.join("iterations"),
            dir,
        }
    }

    pub fn iteration(&self, iter: u32) -> IterationPaths {
        IterationPaths::new(&self.iterations_dir, iter)
    }
}

/// Atomically write the plan artifact (one task per line).
pub fn write_plan(path: &Path, plan: &Plan) -> Result<()> {
    super::write_atomic(path, &plan.render())
}

/// What happened in one iteration, written to `meta.json`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IterationMeta {
    pub iter: u32,
    pub pending_steps: usize,
    pub selected_step: Option<String>,
    pub tool: Option<String>,
    pub outcome: IterationOutcome,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IterationOutcome {
    /// A tool ran and the step was marked done.
    Dispatched,
    /// A tool ran but reported an error; the step stays pending.
    ToolError,
    MalformedToolCall,
    UnknownTool,
    /// The plan had no pending step.
    PlanExhausted,
    /// The oracle emitted the completion sentinel.
    Completed,
}

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub plan_path: PathBuf,
    pub step_response_path: PathBuf,
    pub meta_path: PathBuf,
}

impl IterationPaths {
    pub fn new(iterations_dir: &Path, iter: u32) -> Self {
        let dir = iterations_dir.join(iter.to_string());
        Self {
            plan_path: dir.join("plan.txt"),
            step_response_path: dir.join("step_response.txt"),
            meta_path: dir.join("meta.json"),
            dir,
        }
    }
}

pub struct IterationWriteRequest<'a> {
    pub paths: &'a IterationPaths,
    pub meta: &'a IterationMeta,
    pub plan: &'a Plan,
    pub step_response: Option<&'a str>,
}

pub fn write_iteration(request: &IterationWriteRequest<'_>) -> Result<()> {
    let paths = request.paths;
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;

    // Write in deterministic order to keep logs stable.
    write_text(&paths.plan_path, &request.plan.render())?;
    if let Some(response) = request.step_response {
        write_text(&paths.step_response_path, response)?;
    }
    let mut buf = serde_json::to_string_pretty(request.meta)?;
    buf.push('\n');
    write_text(&paths.meta_path, &buf)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
