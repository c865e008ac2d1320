//! Change instructions and the changeset wire format.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{MendError, Result};

/// What a [`ChangeInstruction`] does to its target path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }

    /// Whether the action carries file content.
    pub fn writes_content(&self) -> bool {
        matches!(self, ChangeAction::Create | ChangeAction::Update)
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file-level edit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeInstruction {
    /// Path relative to the workspace root.
    pub path: String,

    pub action: ChangeAction,

    /// Full new file content. Required for create/update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChangeInstruction {
    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: ChangeAction::Create,
            content: Some(content.into()),
        }
    }

    pub fn update(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: ChangeAction::Update,
            content: Some(content.into()),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: ChangeAction::Delete,
            content: None,
        }
    }
}

/// Strip a surrounding Markdown code fence (```` ```json ```` or ```` ``` ````).
///
/// Model-backed producers frequently wrap JSON in a fence even when told not
/// to. Text without a leading fence is returned trimmed and otherwise as-is.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") up to the first newline.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches("json"),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse a changeset from its wire form.
///
/// Accepts a bare JSON array of instructions or an object with a `files`
/// array. Any instruction with a missing or unrecognized `action`, or a
/// create/update without `content`, makes the whole changeset malformed.
pub fn parse_changeset(raw: &str) -> Result<Vec<ChangeInstruction>> {
    let body = strip_code_fence(raw);
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| MendError::InvalidChangeset(format!("not valid JSON: {e}")))?;

    let items = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut map) => map
            .remove("files")
            .ok_or_else(|| MendError::InvalidChangeset("missing 'files' key".to_string()))?,
        other => {
            return Err(MendError::InvalidChangeset(format!(
                "expected array or object, got {}",
                json_kind(&other)
            )))
        }
    };

    let instructions: Vec<ChangeInstruction> = serde_json::from_value(items)
        .map_err(|e| MendError::InvalidChangeset(format!("malformed instruction: {e}")))?;

    for (idx, instruction) in instructions.iter().enumerate() {
        if instruction.path.trim().is_empty() {
            return Err(MendError::InvalidChangeset(format!(
                "instruction {idx} has an empty path"
            )));
        }
        if instruction.action.writes_content() && instruction.content.is_none() {
            return Err(MendError::InvalidChangeset(format!(
                "instruction {idx} ({} {}) is missing content",
                instruction.action, instruction.path
            )));
        }
    }

    Ok(instructions)
}

/// Parse and validate an oracle proposal.
///
/// Stricter than [`parse_changeset`]: the proposal must contain at least one
/// instruction and every path must be relative. Containment (`..`) is left to
/// the workspace guard so a single bad path only fails that instruction.
pub fn parse_proposal(raw: &str) -> Result<Vec<ChangeInstruction>> {
    let instructions =
        parse_changeset(raw).map_err(|e| MendError::OracleFailure(e.to_string()))?;

    if instructions.is_empty() {
        return Err(MendError::OracleFailure(
            "proposal contains no instructions".to_string(),
        ));
    }

    if let Some(bad) = instructions
        .iter()
        .find(|i| Path::new(&i.path).is_absolute() || i.path.starts_with('/'))
    {
        return Err(MendError::OracleFailure(format!(
            "proposal path is not workspace-relative: {}",
            bad.path
        )));
    }

    Ok(instructions)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
