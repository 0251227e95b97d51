//! Minimal host pipeline: source directory in, file collection out.
//!
//! Files may start with a YAML front-matter block delimited by `---` lines; it
//! becomes the record's metadata and is stripped from the contents.

use anyhow::{bail, Context, Result};
use cms_pages_core::{FileCollection, FileRecord};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Component, Path};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Split a leading front-matter block from `raw`.
///
/// Content without a (terminated) block, or that is not UTF-8, is returned
/// unchanged with empty metadata.
pub fn parse_front_matter(raw: &[u8]) -> Result<(Map<String, Value>, Vec<u8>)> {
    let Ok(text) = std::str::from_utf8(raw) else {
        return Ok((Map::new(), raw.to_vec()));
    };
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return Ok((Map::new(), raw.to_vec()));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(|c| c == '\r' || c == '\n') == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            if yaml.trim().is_empty() {
                return Ok((Map::new(), body.as_bytes().to_vec()));
            }
            let metadata = match serde_yaml::from_str::<Value>(yaml)
                .context("Failed to parse front matter YAML")?
            {
                Value::Null => Map::new(),
                Value::Object(map) => map,
                other => bail!("Front matter must be a mapping, found {other}"),
            };
            return Ok((metadata, body.as_bytes().to_vec()));
        }
        offset += line.len();
    }

    Ok((Map::new(), raw.to_vec()))
}

/// Read every file under `dir` into a collection keyed by `/`-separated relative path.
pub fn read_source(dir: &Path) -> Result<FileCollection> {
    info!(source = %dir.display(), "Reading source directory");
    let mut files = FileCollection::new();

    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel_path = path
            .strip_prefix(dir)
            .with_context(|| format!("{} is outside {}", path.display(), dir.display()))?;
        let key = rel_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let raw = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let (metadata, contents) = parse_front_matter(&raw)
            .with_context(|| format!("Invalid front matter in {}", path.display()))?;
        debug!(file = %key, size = contents.len(), "Read source file");
        files.insert(key, FileRecord::with_metadata(contents, metadata));
    }

    info!(count = files.len(), "Source directory read");
    Ok(files)
}

/// `key` as a path that stays below the output directory.
fn relative_key(key: &str) -> Result<&Path> {
    let path = Path::new(key);
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes || key.is_empty() {
        bail!("Refusing to write file key {key:?} outside the output directory");
    }
    Ok(path)
}

/// Write every record's contents below `dir`. Returns the number of files written.
pub fn write_output(dir: &Path, files: &FileCollection) -> Result<usize> {
    let targets = files
        .iter()
        .map(|(key, record)| -> Result<_> { Ok((dir.join(relative_key(key)?), record)) })
        .collect::<Result<Vec<_>>>()?;

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    for (target, record) in targets {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&target, &record.contents)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        debug!(path = %target.display(), "Wrote output file");
    }

    info!(destination = %dir.display(), count = files.len(), "Output written");
    Ok(files.len())
}
