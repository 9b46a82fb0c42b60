//! The on-disk schema store: `schema-<provider>-<type>.json` files as written
//! by the prober, plus the resource-type catalogs that feed it.

pub mod catalog;
pub mod compare;
pub mod validate;

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{IomError, Result};
use crate::rules::CloudProvider;

pub const SCHEMA_FILE_PREFIX: &str = "schema-";

/// One stored schema file.
#[derive(Debug, Clone)]
pub struct SchemaFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub content: Value,
}

impl SchemaFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let content = serde_json::from_str(&text)?;
        Ok(Self {
            path: path.to_path_buf(),
            file_name: file_name_of(path),
            size: text.len() as u64,
            content,
        })
    }

    /// Provider encoded in the file name.
    pub fn provider(&self) -> Option<CloudProvider> {
        provider_from_file_name(&self.file_name)
    }

    /// The first schema entry, e.g. `{"AWS::EC2::Instance": {...}}`.
    pub fn first_entry(&self) -> Option<&Map<String, Value>> {
        self.content.as_array()?.first()?.as_object()
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.first_entry()?.keys().next().map(String::as_str)
    }

    pub fn configuration(&self) -> Option<&Map<String, Value>> {
        let entry = self.first_entry()?;
        entry.values().next()?.get("configuration")?.as_object()
    }

    pub fn config_field_count(&self) -> usize {
        self.configuration().map_or(0, Map::len)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `schema-aws-...json` -> `Aws`. `None` when the segment is not a known provider.
pub fn provider_from_file_name(file_name: &str) -> Option<CloudProvider> {
    let rest = file_name.strip_prefix(SCHEMA_FILE_PREFIX)?;
    let segment = rest.split('-').next()?;
    match CloudProvider::from_platform(segment) {
        CloudProvider::Generic(_) => None,
        known => Some(known),
    }
}

/// Schema files directly inside `dir`, sorted by name.
pub fn schema_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IomError::NotFound(format!(
            "schemas directory '{}'",
            dir.display()
        )));
    }
    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy();
            name.starts_with(SCHEMA_FILE_PREFIX) && name.ends_with(".json")
        })
        .map(|e| e.into_path())
        .collect();
    paths.sort();
    Ok(paths)
}

/// Load every readable schema file in `dir`; unreadable ones are skipped with a warning.
pub fn load_dir(dir: &Path) -> Result<Vec<SchemaFile>> {
    let mut schemas = Vec::new();
    for path in schema_paths(dir)? {
        match SchemaFile::load(&path) {
            Ok(schema) => schemas.push(schema),
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping unreadable schema")
            }
        }
    }
    Ok(schemas)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{json, Value};

    pub fn ec2_schema() -> Value {
        json!([{
            "AWS::EC2::Instance": {
                "configuration": {"instanceId": "string", "metadataOptions": "object"},
                "relationships": [],
                "resourceId": "string",
                "resourceName": "string"
            }
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parsed_from_prefix_segment() {
        assert_eq!(
            provider_from_file_name("schema-aws-aws-ec2-instance.json"),
            Some(CloudProvider::Aws)
        );
        assert_eq!(
            provider_from_file_name("schema-azure-microsoft-compute-virtualmachines.json"),
            Some(CloudProvider::Azure)
        );
        assert_eq!(provider_from_file_name("schema-misc.json"), None);
        assert_eq!(provider_from_file_name("notes-aws.json"), None);
    }

    #[test]
    fn loads_schema_summary_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema-aws-aws-ec2-instance.json");
        std::fs::write(&path, fixtures::ec2_schema().to_string()).unwrap();
        std::fs::write(dir.path().join("validation-report.json"), "{}").unwrap();

        let schemas = load_dir(dir.path()).unwrap();
        assert_eq!(schemas.len(), 1);
        let schema = &schemas[0];
        assert_eq!(schema.resource_type(), Some("AWS::EC2::Instance"));
        assert_eq!(schema.config_field_count(), 2);
        assert_eq!(schema.provider(), Some(CloudProvider::Aws));
        assert!(schema.size > 0);
    }

    #[test]
    fn broken_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("schema-aws-bad.json"), "{not json").unwrap();
        assert!(load_dir(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_dir_is_not_found() {
        assert!(matches!(
            schema_paths(Path::new("/nonexistent/schemas")),
            Err(IomError::NotFound(_))
        ));
    }
}
