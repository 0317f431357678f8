//! In-process file tools.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use super::{ToolOutput, ToolService, ToolSpec};
use crate::core::tool_call::ToolCallRequest;
use crate::error::UnknownToolError;

/// `list_files`, `read_file`, `write_file` and `append_to_file`, with
/// relative paths resolved against `root`.
pub struct LocalToolbox {
    root: PathBuf,
    specs: Vec<ToolSpec>,
    validators: BTreeMap<String, Validator>,
}

impl LocalToolbox {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let specs = builtin_specs();
        let mut validators = BTreeMap::new();
        for spec in &specs {
            let validator = validator_for(&spec.input_schema)
                .map_err(|err| anyhow!("invalid schema for tool {}: {err}", spec.name))?;
            validators.insert(spec.name.clone(), validator);
        }
        Ok(Self {
            root: root.into(),
            specs,
            validators,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn list_files(&self, folder: &str) -> ToolOutput {
        let dir = self.resolve(folder);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => return ToolOutput::error(format!("Error: cannot list {folder}: {err}")),
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        ToolOutput::ok(names.join("\n"))
    }

    fn read_file(&self, filepath: &str) -> ToolOutput {
        match fs::read(self.resolve(filepath)) {
            Ok(bytes) => ToolOutput::ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) => ToolOutput::error(format!("Error: cannot read {filepath}: {err}")),
        }
    }

    fn write_file(&self, filepath: &str, content: &str) -> ToolOutput {
        match crate::io::write_atomic(&self.resolve(filepath), content) {
            Ok(()) => ToolOutput::ok(format!("Wrote {} bytes to {filepath}", content.len())),
            Err(err) => ToolOutput::error(format!("Error: cannot write {filepath}: {err:#}")),
        }
    }

    fn append_to_file(&self, filepath: &str, content: &str) -> ToolOutput {
        let path = self.resolve(filepath);
        let appended = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| OpenOptions::new().create(true).append(true).open(&path))
            .and_then(|mut file| file.write_all(content.as_bytes()));
        match appended {
            Ok(()) => ToolOutput::ok(format!("Appended {} bytes to {filepath}", content.len())),
            Err(err) => ToolOutput::error(format!("Error: cannot append to {filepath}: {err}")),
        }
    }

    /// Schema violations as one message, or `None` when the arguments fit.
    fn schema_violations(&self, name: &str, arguments: &Map<String, Value>) -> Option<String> {
        let validator = self.validators.get(name)?;
        let instance = Value::Object(arguments.clone());
        if validator.is_valid(&instance) {
            return None;
        }
        let messages = validator
            .iter_errors(&instance)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        Some(messages.join("; "))
    }
}

impl ToolService for LocalToolbox {
    fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        Ok(self.specs.clone())
    }

    #[instrument(skip_all, fields(tool = %request.name))]
    fn call(&self, request: &ToolCallRequest) -> Result<ToolOutput> {
        if !self.validators.contains_key(&request.name) {
            return Err(UnknownToolError {
                name: request.name.clone(),
            }
            .into());
        }
        if let Some(violations) = self.schema_violations(&request.name, &request.arguments) {
            debug!(%violations, "tool arguments rejected");
            return Ok(ToolOutput::error(format!(
                "Error: invalid arguments for {}: {violations}",
                request.name
            )));
        }

        let arg = |key: &str| {
            request
                .arguments
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
        };
        let output = match request.name.as_str() {
            "list_files" => self.list_files(arg("folder_path")),
            "read_file" => self.read_file(arg("filepath")),
            "write_file" => self.write_file(arg("filepath"), arg("content")),
            "append_to_file" => self.append_to_file(arg("filepath"), arg("content")),
            other => {
                return Err(UnknownToolError {
                    name: other.to_string(),
                }
                .into());
            }
        };
        debug!(
            is_error = output.is_error,
            bytes = output.content.len(),
            "tool finished"
        );
        Ok(output)
    }
}

fn string_property(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

/// Declarations of the built-in file tools.
pub fn builtin_specs() -> Vec<ToolSpec> {
    let path_and_content = |path_doc: &str, content_doc: &str| {
        json!({
            "type": "object",
            "properties": {
                "filepath": string_property(path_doc),
                "content": string_property(content_doc),
            },
            "required": ["filepath", "content"],
        })
    };
    vec![
        ToolSpec {
            name: "list_files".to_string(),
            description: "List the entries of a folder, sorted by name.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"folder_path": string_property("Folder to list.")},
                "required": ["folder_path"],
            }),
        },
        ToolSpec {
            name: "read_file".to_string(),
            description: "Read a text file and return its content.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"filepath": string_property("File to read.")},
                "required": ["filepath"],
            }),
        },
        ToolSpec {
            name: "write_file".to_string(),
            description: "Create or overwrite a text file.".to_string(),
            input_schema: path_and_content("File to write.", "Full new content."),
        },
        ToolSpec {
            name: "append_to_file".to_string(),
            description: "Append text to the end of a file, creating it if needed.".to_string(),
            input_schema: path_and_content("File to append to.", "Text to append."),
        },
    ]
}
