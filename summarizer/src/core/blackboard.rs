//! Shared session state for the planning loop.
//!
//! Keys are only ever added or overwritten (there is no removal API), so the
//! board grows monotonically over one session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PATIENT_FOLDER_KEY: &str = "patient_folder";
pub const TEMPLATE_PATH_KEY: &str = "template_path";
pub const TEMPLATE_KEY: &str = "template";
pub const FILES_KEY: &str = "files";
pub const PLAN_KEY: &str = "plan";
pub const LAST_TOOL_CALL_KEY: &str = "last_tool_call";
pub const RESULT_KEY: &str = "last_tool_result";
pub const HISTORY_KEY: &str = "completed_steps";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blackboard {
    entries: BTreeMap<String, Value>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    /// Append `entry` to the array under `key`, creating it if needed.
    ///
    /// A non-array value under `key` is wrapped so nothing is lost.
    pub fn push(&mut self, key: &str, entry: impl Into<Value>) {
        let slot = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            let previous = slot.take();
            *slot = Value::Array(vec![previous]);
        }
        if let Value::Array(items) = slot {
            items.push(entry.into());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Pretty JSON rendering used in prompts and on disk.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.entries).unwrap_or_else(|_| "{}".to_string())
    }

    /// Like [`Blackboard::to_pretty_json`], leaving out `skip`.
    pub fn to_pretty_json_without(&self, skip: &[&str]) -> String {
        let entries: BTreeMap<&str, &Value> = self
            .entries
            .iter()
            .filter(|(key, _)| !skip.contains(&key.as_str()))
            .map(|(key, value)| (key.as_str(), value))
            .collect();
        serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "{}".to_string())
    }
}
