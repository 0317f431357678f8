//! Typed plan model and deterministic next-step selection.
//!
//! The oracle sees and writes plans as marker-prefixed text lines
//! (`PENDING - ...` / `DONE - ...`). Everything else works on [`Plan`]; the
//! text form exists only at the prompt and artifact boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::merge::normalize_proposed;

pub const PENDING_MARKER: &str = "PENDING";
pub const DONE_MARKER: &str = "DONE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Done,
}

impl TaskStatus {
    pub fn marker(self) -> &'static str {
        match self {
            TaskStatus::Pending => PENDING_MARKER,
            TaskStatus::Done => DONE_MARKER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    pub description: String,
    pub status: TaskStatus,
}

impl TaskItem {
    pub fn pending(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: TaskStatus::Pending,
        }
    }

    /// Parse one plan line. Lines without a leading status marker are not tasks.
    ///
    /// Accepts an optional list bullet before the marker and an optional
    /// ` - ` / `:` separator after it.
    fn parse(line: &str) -> Option<Self> {
        let line = line
            .trim()
            .trim_start_matches(['-', '*'])
            .trim_start();
        let (status, rest) = if let Some(rest) = line.strip_prefix(PENDING_MARKER) {
            (TaskStatus::Pending, rest)
        } else if let Some(rest) = line.strip_prefix(DONE_MARKER) {
            (TaskStatus::Done, rest)
        } else {
            return None;
        };
        // "PENDINGX" is not a marker.
        if rest.starts_with(|c: char| c.is_alphanumeric()) {
            return None;
        }
        let description = rest
            .trim_start()
            .trim_start_matches(['-', ':'])
            .trim()
            .to_string();
        if description.is_empty() {
            return None;
        }
        Some(Self {
            description,
            status,
        })
    }
}

impl fmt::Display for TaskItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.status.marker(), self.description)
    }
}

/// Ordered task list. The first pending item is always the next step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Plan {
    pub items: Vec<TaskItem>,
}

impl Plan {
    /// Parse oracle plan text, ignoring any line that is not a task.
    pub fn parse(text: &str) -> Self {
        let normalized = normalize_proposed(text);
        Self {
            items: normalized.lines().filter_map(TaskItem::parse).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// First pending item in sequence order, if any.
    pub fn next_pending(&self) -> Option<&TaskItem> {
        self.items
            .iter()
            .find(|item| item.status == TaskStatus::Pending)
    }

    /// Flip the first pending item with exactly this description to done.
    ///
    /// Returns false when no such item exists.
    pub fn mark_done(&mut self, description: &str) -> bool {
        match self
            .items
            .iter_mut()
            .find(|item| item.status == TaskStatus::Pending && item.description == description)
        {
            Some(item) => {
                item.status = TaskStatus::Done;
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.status == TaskStatus::Pending)
            .count()
    }

    /// One line per task, newline-terminated (empty string for an empty plan).
    pub fn render(&self) -> String {
        self.items
            .iter()
            .map(|item| format!("{item}\n"))
            .collect()
    }
}
