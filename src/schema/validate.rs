use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use super::schema_paths;
use crate::error::{IomError, Result};

/// Keys every schema entry body must carry.
pub const REQUIRED_SCHEMA_FIELDS: [&str; 4] =
    ["configuration", "relationships", "resourceId", "resourceName"];

#[derive(Debug, Clone, Serialize)]
pub struct ValidSchema {
    pub file: PathBuf,
    pub resource_type: String,
    pub config_fields: usize,
    pub file_size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidSchema {
    pub file: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaValidationReport {
    pub total_files: usize,
    pub valid: usize,
    pub invalid: usize,
    pub valid_schemas: Vec<ValidSchema>,
    pub invalid_schemas: Vec<InvalidSchema>,
    pub timestamp: String,
}

impl SchemaValidationReport {
    pub fn is_clean(&self) -> bool {
        self.invalid == 0
    }
}

/// Check one decoded schema; returns the resource type and configuration field count.
pub fn check_schema(value: &Value) -> std::result::Result<(String, usize), String> {
    let items = value.as_array().ok_or("schema must be a list")?;
    let first = items.first().ok_or("schema list is empty")?;
    let entry = first.as_object().ok_or("schema items must be objects")?;
    let (resource_type, body) = entry.iter().next().ok_or("no resource type found")?;
    let body = body
        .as_object()
        .ok_or_else(|| format!("'{resource_type}' must map to an object"))?;

    let missing: Vec<&str> = REQUIRED_SCHEMA_FIELDS
        .iter()
        .copied()
        .filter(|f| !body.contains_key(*f))
        .collect();
    if !missing.is_empty() {
        return Err(format!("missing fields: {}", missing.join(", ")));
    }

    let config_fields = body
        .get("configuration")
        .and_then(Value::as_object)
        .map_or(0, |c| c.len());
    Ok((resource_type.clone(), config_fields))
}

/// Validate every schema file in `dir`. Fails only when there is nothing to validate.
pub fn validate_dir(dir: &Path) -> Result<SchemaValidationReport> {
    let paths = schema_paths(dir)?;
    if paths.is_empty() {
        return Err(IomError::NotFound(format!(
            "no schema files in '{}'",
            dir.display()
        )));
    }

    let mut valid_schemas = Vec::new();
    let mut invalid_schemas = Vec::new();
    for path in &paths {
        let checked = std::fs::read_to_string(path)
            .map_err(|e| format!("read error: {e}"))
            .and_then(|text| {
                let size = text.len() as u64;
                let value: Value =
                    serde_json::from_str(&text).map_err(|e| format!("JSON decode error: {e}"))?;
                check_schema(&value).map(|(rt, fields)| (rt, fields, size))
            });

        match checked {
            Ok((resource_type, config_fields, file_size)) => valid_schemas.push(ValidSchema {
                file: path.clone(),
                resource_type,
                config_fields,
                file_size,
            }),
            Err(error) => {
                tracing::warn!(file = %path.display(), %error, "invalid schema");
                invalid_schemas.push(InvalidSchema {
                    file: path.clone(),
                    error,
                });
            }
        }
    }

    Ok(SchemaValidationReport {
        total_files: paths.len(),
        valid: valid_schemas.len(),
        invalid: invalid_schemas.len(),
        valid_schemas,
        invalid_schemas,
        timestamp: crate::output::json::timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::ec2_schema;
    use serde_json::json;

    #[test]
    fn well_formed_schema_passes() {
        let (rt, fields) = check_schema(&ec2_schema()).unwrap();
        assert_eq!(rt, "AWS::EC2::Instance");
        assert_eq!(fields, 2);
    }

    #[test]
    fn structural_problems_are_named() {
        assert_eq!(check_schema(&json!({})).unwrap_err(), "schema must be a list");
        assert_eq!(check_schema(&json!([])).unwrap_err(), "schema list is empty");
        assert_eq!(
            check_schema(&json!(["x"])).unwrap_err(),
            "schema items must be objects"
        );
        let err = check_schema(&json!([{"T": {"configuration": {}}}])).unwrap_err();
        assert_eq!(err, "missing fields: relationships, resourceId, resourceName");
    }

    #[test]
    fn directory_report_separates_valid_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("schema-aws-ec2.json"),
            ec2_schema().to_string(),
        )
        .unwrap();
        std::fs::write(dir.path().join("schema-aws-bad.json"), "[").unwrap();
        std::fs::write(dir.path().join("other.json"), "[]").unwrap();

        let report = validate_dir(dir.path()).unwrap();
        assert_eq!(report.total_files, 2);
        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid, 1);
        assert!(!report.is_clean());
        assert!(report.invalid_schemas[0].error.starts_with("JSON decode error"));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            validate_dir(dir.path()),
            Err(IomError::NotFound(_))
        ));
    }
}
