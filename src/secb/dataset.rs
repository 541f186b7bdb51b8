//! Dataset lookup and patch input loading.
//!
//! The dataset maps instance ids to their working directory and, optionally,
//! the exit code accepted by medium mode. Patch input maps instance ids to
//! candidate patches. Both accept either a whole-file JSON document or JSON
//! Lines.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::executor::EvalInstance;
use crate::error::EvalError;

/// One dataset row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub instance_id: String,
    pub work_dir: String,
    /// Known-acceptable exit code of the proof-of-concept.
    #[serde(default)]
    pub exit_code: Option<i64>,
}

impl DatasetEntry {
    /// Resolves this entry into a unit of work.
    pub fn to_instance(&self) -> EvalInstance {
        EvalInstance {
            instance_id: self.instance_id.clone(),
            working_dir: self.work_dir.clone(),
            expected_exit_code: self.exit_code,
        }
    }
}

/// Source of per-instance metadata.
pub trait DatasetProvider: Send + Sync {
    fn lookup(&self, instance_id: &str) -> Option<&DatasetEntry>;
}

/// Dataset held in memory, loaded from a local file.
#[derive(Debug, Clone, Default)]
pub struct LocalDataset {
    entries: HashMap<String, DatasetEntry>,
}

impl LocalDataset {
    /// Loads a JSON array or JSON Lines file of entries.
    ///
    /// # Errors
    ///
    /// Returns `EvalError::Io` if the file cannot be read and
    /// `EvalError::MalformedDataset` if it cannot be parsed.
    pub fn from_path(path: &Path) -> Result<Self, EvalError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|reason| EvalError::MalformedDataset {
            path: path.display().to_string(),
            reason,
        })
    }

    pub fn from_entries(entries: impl IntoIterator<Item = DatasetEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.instance_id.clone(), e))
                .collect(),
        }
    }

    /// Parses dataset content. Later duplicates replace earlier ones.
    pub fn parse(content: &str) -> Result<Self, String> {
        let trimmed = content.trim_start();

        let entries: Vec<DatasetEntry> = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed).map_err(|e| e.to_string())?
        } else {
            trimmed
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(i, line)| {
                    serde_json::from_str(line).map_err(|e| format!("line {}: {e}", i + 1))
                })
                .collect::<Result<_, _>>()?
        };

        Ok(Self::from_entries(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DatasetProvider for LocalDataset {
    fn lookup(&self, instance_id: &str) -> Option<&DatasetEntry> {
        self.entries.get(instance_id)
    }
}

/// One candidate patch. An empty `model_patch` means none was submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchEntry {
    pub instance_id: String,
    pub model_patch: String,
}

/// Ordered set of candidate patches.
#[derive(Debug, Clone, Default)]
pub struct PatchSet {
    entries: Vec<PatchEntry>,
}

impl PatchSet {
    /// Loads patch input from a file.
    ///
    /// Accepts a JSON object keyed by instance id
    /// (`{"<id>": {"model_patch": "..."}}`) or JSON Lines with an
    /// `instance_id` field per line.
    ///
    /// # Errors
    ///
    /// Returns `EvalError::EmptyPatchInput` when no entries are found,
    /// `EvalError::MissingInstanceId` for entries without an id and
    /// `EvalError::MalformedPatchInput` for anything that does not parse.
    pub fn from_path(path: &Path) -> Result<Self, EvalError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parses patch input; `origin` names the source in error messages.
    pub fn parse(content: &str, origin: &str) -> Result<Self, EvalError> {
        let malformed = |reason: String| EvalError::MalformedPatchInput {
            path: origin.to_string(),
            reason,
        };

        let entries = match serde_json::from_str::<Value>(content) {
            Ok(Value::Object(map)) if !map.contains_key("instance_id") => map
                .into_iter()
                .enumerate()
                .map(|(i, (instance_id, value))| {
                    if instance_id.is_empty() {
                        return Err(EvalError::MissingInstanceId(i));
                    }
                    let model_patch = model_patch_of(&value).map_err(&malformed)?;
                    Ok(PatchEntry {
                        instance_id,
                        model_patch,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Ok(Value::Object(_)) | Err(_) => Self::parse_lines(content, &malformed)?,
            Ok(other) => {
                return Err(malformed(format!(
                    "expected an object or JSON Lines, found {}",
                    json_type(&other)
                )))
            }
        };

        if entries.is_empty() {
            return Err(EvalError::EmptyPatchInput(origin.to_string()));
        }

        Ok(Self { entries })
    }

    fn parse_lines(
        content: &str,
        malformed: &dyn Fn(String) -> EvalError,
    ) -> Result<Vec<PatchEntry>, EvalError> {
        let mut entries = Vec::new();

        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line)
                .map_err(|e| malformed(format!("line {}: {e}", i + 1)))?;

            let instance_id = match value.get("instance_id") {
                Some(Value::String(id)) if !id.is_empty() => id.clone(),
                _ => return Err(EvalError::MissingInstanceId(i)),
            };
            let model_patch = model_patch_of(&value)
                .map_err(|reason| malformed(format!("line {}: {reason}", i + 1)))?;

            entries.push(PatchEntry {
                instance_id,
                model_patch,
            });
        }

        Ok(entries)
    }

    pub fn entries(&self) -> &[PatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<PatchEntry> for PatchSet {
    fn from_iter<I: IntoIterator<Item = PatchEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Extracts `model_patch` from an entry. Missing or null means no patch.
fn model_patch_of(value: &Value) -> Result<String, String> {
    let Value::Object(fields) = value else {
        return Err(format!("entry must be an object, found {}", json_type(value)));
    };

    match fields.get("model_patch") {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(patch)) => Ok(patch.clone()),
        Some(other) => Err(format!(
            "model_patch must be a string, found {}",
            json_type(other)
        )),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
