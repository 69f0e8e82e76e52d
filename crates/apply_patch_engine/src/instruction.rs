//! Validating decoder for the model's structured response.
//!
//! The top level must be a JSON object whose optional `files`, `patches` and
//! `commands` fields are arrays. Each array item decodes on its own into either a
//! typed value or an [`InvalidItem`] that keeps its position.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub type Decoded<T> = Result<T, InvalidItem>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstructionSet {
    pub files: Vec<Decoded<FileWrite>>,
    pub patches: Vec<Decoded<FilePatch>>,
    pub commands: Vec<Decoded<String>>,
}

impl InstructionSet {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.patches.is_empty() && self.commands.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileWrite {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilePatch {
    pub file: String,
    pub instructions: Vec<PatchInstruction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchInstruction {
    pub line_number: usize,
    pub old_text: String,
    pub new_text: String,
}

impl PatchInstruction {
    pub fn new(line_number: usize, old_text: impl Into<String>, new_text: impl Into<String>) -> Self {
        Self {
            line_number,
            old_text: old_text.into(),
            new_text: new_text.into(),
        }
    }
}

/// An array item that does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("item {index}: {reason}")]
pub struct InvalidItem {
    pub index: usize,
    pub reason: String,
}

impl InvalidItem {
    fn new(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },

    #[error("field '{field}' must be an array, found {found}")]
    FieldNotArray {
        field: &'static str,
        found: &'static str,
    },
}

/// Decodes the raw accumulated model text.
pub fn decode(raw: &str) -> Result<InstructionSet, DecodeError> {
    let value: Value = serde_json::from_str(raw)?;
    let root = match value {
        Value::Object(root) => root,
        other => {
            return Err(DecodeError::NotAnObject {
                found: kind_of(&other),
            })
        }
    };

    Ok(InstructionSet {
        files: decode_items(&root, "files", decode_file)?,
        patches: decode_items(&root, "patches", decode_patch)?,
        commands: decode_items(&root, "commands", decode_command)?,
    })
}

fn decode_items<T>(
    root: &Map<String, Value>,
    field: &'static str,
    decode_one: fn(&Value) -> Result<T, String>,
) -> Result<Vec<Decoded<T>>, DecodeError> {
    let items = match root.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(DecodeError::FieldNotArray {
                field,
                found: kind_of(other),
            })
        }
    };

    Ok(items
        .iter()
        .enumerate()
        .map(|(index, item)| decode_one(item).map_err(|reason| InvalidItem::new(index, reason)))
        .collect())
}

fn decode_file(item: &Value) -> Result<FileWrite, String> {
    let object = as_object(item, "file entry")?;
    Ok(FileWrite {
        path: required_string(object, "path")?,
        content: required_string(object, "content")?,
    })
}

fn decode_patch(item: &Value) -> Result<FilePatch, String> {
    let object = as_object(item, "patch entry")?;
    let file = required_string(object, "file")?;

    let instructions = match object.get("instructions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                decode_instruction(item).map_err(|reason| format!("instructions[{index}]: {reason}"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(format!(
                "'instructions' must be an array, found {}",
                kind_of(other)
            ))
        }
    };

    Ok(FilePatch { file, instructions })
}

fn decode_instruction(item: &Value) -> Result<PatchInstruction, String> {
    let object = as_object(item, "instruction")?;
    let line_number = object
        .get("lineNumber")
        .and_then(Value::as_u64)
        .filter(|line| *line >= 1)
        .and_then(|line| usize::try_from(line).ok())
        .ok_or_else(|| "'lineNumber' must be a positive integer".to_string())?;

    Ok(PatchInstruction {
        line_number,
        old_text: required_string(object, "oldText")?,
        new_text: required_string(object, "newText")?,
    })
}

fn decode_command(item: &Value) -> Result<String, String> {
    item.as_str()
        .map(str::to_owned)
        .ok_or_else(|| format!("command must be a string, found {}", kind_of(item)))
}

fn as_object<'a>(item: &'a Value, what: &str) -> Result<&'a Map<String, Value>, String> {
    item.as_object()
        .ok_or_else(|| format!("{what} must be an object, found {}", kind_of(item)))
}

fn required_string(object: &Map<String, Value>, field: &str) -> Result<String, String> {
    match object.get(field) {
        Some(Value::String(value)) => Ok(value.clone()),
        None => Err(format!("missing '{field}'")),
        Some(other) => Err(format!("'{field}' must be a string, found {}", kind_of(other))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
