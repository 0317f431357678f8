//! Blackboard persistence (`<artifacts_dir>/blackboard.json`).
//!
//! The on-disk copy is a debugging checkpoint written after every mutation,
//! not a source of truth: nothing in the summarizer reads it back to resume.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::core::blackboard::Blackboard;

/// Owns the session blackboard and mirrors it to disk on every write.
#[derive(Debug)]
pub struct BlackboardStore {
    board: Blackboard,
    path: PathBuf,
}

impl BlackboardStore {
    /// Create a store with an empty board and write the first snapshot.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            board: Blackboard::new(),
            path: path.into(),
        };
        store.persist()?;
        Ok(store)
    }

    pub fn board(&self) -> &Blackboard {
        &self.board
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.board.set(key, value);
        debug!(key, entries = self.board.len(), "blackboard set");
        self.persist()
    }

    pub fn push(&mut self, key: &str, entry: impl Into<Value>) -> Result<()> {
        self.board.push(key, entry);
        debug!(key, entries = self.board.len(), "blackboard push");
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        write_blackboard(&self.path, &self.board)
    }
}

/// Load a blackboard snapshot (for inspection tooling and tests).
pub fn load_blackboard(path: &Path) -> Result<Blackboard> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read blackboard {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse blackboard {}", path.display()))
}

/// Atomically write a blackboard snapshot as pretty JSON.
pub fn write_blackboard(path: &Path, board: &Blackboard) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(board).context("serialize blackboard")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
