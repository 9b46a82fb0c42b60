use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::load_dir;
use crate::error::{IomError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedSchema {
    pub file: String,
    pub old_size: usize,
    pub new_size: usize,
    pub old_digest: String,
    pub new_digest: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComparisonSummary {
    pub old_count: usize,
    pub new_count: usize,
    pub added_count: usize,
    pub removed_count: usize,
    pub modified_count: usize,
    pub unchanged_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaComparison {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<ModifiedSchema>,
    pub unchanged: Vec<String>,
    pub summary: ComparisonSummary,
    pub timestamp: String,
}

/// Serialize with object keys sorted at every level, independent of map ordering.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hex SHA-256 of the canonical form.
pub fn digest(value: &Value) -> String {
    hex::encode(Sha256::digest(canonical_json(value).as_bytes()))
}

/// Compare two file-name-keyed schema sets.
pub fn compare(old: &BTreeMap<String, Value>, new: &BTreeMap<String, Value>) -> SchemaComparison {
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut modified = Vec::new();
    let mut unchanged = Vec::new();

    for (file, old_value) in old {
        match new.get(file) {
            None => removed.push(file.clone()),
            Some(new_value) => {
                let (old_digest, new_digest) = (digest(old_value), digest(new_value));
                if old_digest == new_digest {
                    unchanged.push(file.clone());
                } else {
                    modified.push(ModifiedSchema {
                        file: file.clone(),
                        old_size: old_value.to_string().len(),
                        new_size: new_value.to_string().len(),
                        old_digest,
                        new_digest,
                    });
                }
            }
        }
    }
    added.extend(new.keys().filter(|f| !old.contains_key(*f)).cloned());

    let summary = ComparisonSummary {
        old_count: old.len(),
        new_count: new.len(),
        added_count: added.len(),
        removed_count: removed.len(),
        modified_count: modified.len(),
        unchanged_count: unchanged.len(),
    };
    SchemaComparison {
        added,
        removed,
        modified,
        unchanged,
        summary,
        timestamp: crate::output::json::timestamp(),
    }
}

fn load_map(dir: &Path) -> Result<BTreeMap<String, Value>> {
    if !dir.is_dir() {
        return Err(IomError::NotFound(format!("directory '{}'", dir.display())));
    }
    Ok(load_dir(dir)?
        .into_iter()
        .map(|s| (s.file_name, s.content))
        .collect())
}

pub fn compare_dirs(old_dir: &Path, new_dir: &Path) -> Result<SchemaComparison> {
    Ok(compare(&load_map(old_dir)?, &load_map(new_dir)?))
}
