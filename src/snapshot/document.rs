//! Snapshot documents and their on-disk form.
//!
//! A document is a flat set of named fields serialized as one JSON object.
//! Fields live in a `BTreeMap` and every nested map is built from ordered
//! keys, so the same chain state always serializes to the same bytes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::error::SnapshotError;

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDocument {
    name: String,
    version: u32,
    fields: BTreeMap<String, Value>,
}

impl SnapshotDocument {
    pub fn new(name: &str, version: u32) -> Self {
        Self {
            name: name.to_string(),
            version,
            fields: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `"{name}_v{version}"`
    pub fn key(&self) -> String {
        format!("{}_v{}", self.name, self.version)
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.key())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut bytes = serde_json::to_vec_pretty(&self.fields)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Writes `document` into `dir`. The file appears complete or not at all:
/// content goes to a temporary sibling that is then renamed over the target.
pub fn write_snapshot(dir: &Path, document: &SnapshotDocument) -> Result<PathBuf, SnapshotError> {
    fs::create_dir_all(dir)?;

    let bytes = document.to_bytes()?;
    let path = dir.join(document.file_name());
    let tmp_path = dir.join(format!("{}.tmp", document.file_name()));

    fs::write(&tmp_path, &bytes)?;
    if let Err(e) = fs::rename(&tmp_path, &path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    tracing::info!(
        "Wrote snapshot {} ({} fields, {} bytes) to {}",
        document.key(),
        document.fields().len(),
        bytes.len(),
        path.display()
    );

    Ok(path)
}
