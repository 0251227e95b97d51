//! Entry → file mapping.
//!
//! [`map_entry`] turns one [`CmsEntry`] into a [`SynthesizedFile`] whose key is
//! `{contentType}-{id}.{extension}`. It never panics on missing fields: every
//! gap the templates depend on is reported as a [`MalformedEntryError`].

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::contract::CmsEntry;
use crate::error::MalformedEntryError;
use crate::files::FileRecord;

/// Extension used when no entry template is configured.
pub const DEFAULT_EXTENSION: &str = "html";

/// Date format applied to `sys.createdAt`.
pub const DATE_FORMAT: &str = "%m-%d-%Y";

/// A virtual file manufactured from a CMS entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedFile {
    pub contents: Vec<u8>,
    pub id: String,
    pub content_type: String,
    pub template: Option<String>,
    pub title: Option<String>,
    pub date: String,
    pub collection: String,
    /// The raw entry, exposed to templates as `data`.
    pub data: Value,
}

impl SynthesizedFile {
    /// Deterministic collection key for this file.
    pub fn key(&self) -> String {
        format!(
            "{}-{}.{}",
            self.content_type,
            self.id,
            extension_for(self.template.as_deref())
        )
    }

    /// Metadata as seen by downstream stages.
    pub fn metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("id".into(), Value::String(self.id.clone()));
        metadata.insert("contentType".into(), Value::String(self.content_type.clone()));
        if let Some(template) = &self.template {
            metadata.insert("template".into(), Value::String(template.clone()));
        }
        if let Some(title) = &self.title {
            metadata.insert("title".into(), Value::String(title.clone()));
        }
        metadata.insert("date".into(), Value::String(self.date.clone()));
        metadata.insert("collection".into(), Value::String(self.collection.clone()));
        metadata.insert("data".into(), self.data.clone());
        metadata
    }

    /// The file as listed in its source's directive block: metadata plus `contents`.
    pub fn listing(&self) -> Value {
        let mut listing = self.metadata();
        listing.insert(
            "contents".into(),
            Value::String(String::from_utf8_lossy(&self.contents).into_owned()),
        );
        Value::Object(listing)
    }

    pub fn into_record(self) -> FileRecord {
        let metadata = self.metadata();
        FileRecord::with_metadata(self.contents, metadata)
    }
}

/// Output extension for an entry template path.
///
/// The path is split on `.`, the first segment dropped and the last remaining
/// one used, so `layout.html` gives `html` and `layout` falls back to the default.
pub fn extension_for(template: Option<&str>) -> &str {
    template
        .and_then(|t| t.split('.').skip(1).last())
        .filter(|ext| !ext.is_empty())
        .unwrap_or(DEFAULT_EXTENSION)
}

/// Map one entry to a synthesised file.
///
/// `fallback_content_type` is the directive's `content_type`, used only when the
/// entry does not carry its own content type link.
pub fn map_entry(
    entry: &CmsEntry,
    template: Option<&str>,
    fallback_content_type: Option<&str>,
) -> Result<SynthesizedFile, MalformedEntryError> {
    let id = entry.id();
    let malformed = |reason: &str| MalformedEntryError::new(id, reason);

    let content_type = entry
        .content_type_id()
        .or(fallback_content_type)
        .ok_or_else(|| malformed("missing sys.contentType.sys.id"))?;

    let body = entry
        .field("body")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing string field `body`"))?;

    let title = entry
        .field("subject")
        .and_then(Value::as_str)
        .map(str::to_string);

    let collection = entry
        .field("category")
        .ok_or_else(|| malformed("missing field `category`"))?
        .get("fields")
        .and_then(|fields| fields.get("title"))
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing string field `category.fields.title`"))?;

    let created_at = entry
        .sys
        .created_at
        .as_deref()
        .ok_or_else(|| malformed("missing sys.createdAt"))?;
    let date = DateTime::parse_from_rfc3339(created_at)
        .map_err(|e| malformed(&format!("invalid sys.createdAt `{created_at}`: {e}")))?
        .format(DATE_FORMAT)
        .to_string();

    let data = serde_json::to_value(entry)
        .map_err(|e| malformed(&format!("entry cannot be serialised: {e}")))?;

    Ok(SynthesizedFile {
        contents: body.as_bytes().to_vec(),
        id: id.to_string(),
        content_type: content_type.to_string(),
        template: template.map(str::to_string),
        title,
        date,
        collection: collection.to_string(),
        data,
    })
}
