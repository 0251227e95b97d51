//! In-memory file model shared with the host pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigurationError;

/// Metadata key holding a source file's CMS directive block.
pub const DIRECTIVE_KEY: &str = "contentful";

/// All files of one build, keyed by their path relative to the source root.
pub type FileCollection = BTreeMap<String, FileRecord>;

/// A source file read by the host, or a file synthesised from a CMS entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub contents: Vec<u8>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl FileRecord {
    pub fn new(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: contents.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(contents: impl Into<Vec<u8>>, metadata: Map<String, Value>) -> Self {
        Self {
            contents: contents.into(),
            metadata,
        }
    }

    /// Parse this file's directive block, if it has one.
    ///
    /// A missing, `null` or `false` block means "no directive". Anything else
    /// that is not an object carrying a string `space_id` is a configuration error.
    pub fn directive(&self, key: &str) -> Result<Option<CmsDirective>, ConfigurationError> {
        match self.metadata.get(DIRECTIVE_KEY) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
            Some(Value::Object(block)) => CmsDirective::from_block(key, block).map(Some),
            Some(other) => Err(ConfigurationError::InvalidDirective {
                file: key.to_string(),
                reason: format!("expected an object, found {}", json_kind(other)),
            }),
        }
    }
}

/// Per-file CMS fetch parameters declared in front matter.
#[derive(Debug, Clone, PartialEq)]
pub struct CmsDirective {
    pub space_id: String,
    pub content_type: Option<String>,
    pub filter: Map<String, Value>,
    pub entry_template: Option<String>,
}

impl CmsDirective {
    fn from_block(file: &str, block: &Map<String, Value>) -> Result<Self, ConfigurationError> {
        let space_id = optional_string(file, block, "space_id")?.ok_or_else(|| {
            ConfigurationError::MissingSpaceId {
                file: file.to_string(),
            }
        })?;

        let filter = match block.get("filter") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(filter)) => filter.clone(),
            Some(other) => {
                return Err(ConfigurationError::InvalidDirective {
                    file: file.to_string(),
                    reason: format!("`filter` must be an object, found {}", json_kind(other)),
                })
            }
        };

        Ok(Self {
            space_id,
            content_type: optional_string(file, block, "content_type")?,
            filter,
            entry_template: optional_string(file, block, "entry_template")?,
        })
    }
}

fn optional_string(
    file: &str,
    block: &Map<String, Value>,
    name: &str,
) -> Result<Option<String>, ConfigurationError> {
    match block.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ConfigurationError::InvalidDirective {
            file: file.to_string(),
            reason: format!("`{name}` must be a string, found {}", json_kind(other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
