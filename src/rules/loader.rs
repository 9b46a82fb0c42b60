use std::path::{Path, PathBuf};

use serde_yaml::Value;
use walkdir::WalkDir;

use super::RuleDocument;
use crate::error::{IomError, Result};

/// Fields every `rule` section must carry.
pub const REQUIRED_FIELDS: [&str; 6] = [
    "name",
    "description",
    "resource_type",
    "platform",
    "provider",
    "logic",
];

/// Parse a rule document, checking structure before typed decoding so
/// errors name the offending field.
pub fn parse_document(source_name: &str, text: &str) -> Result<RuleDocument> {
    let value: Value = serde_yaml::from_str(text)
        .map_err(|e| IomError::validation(source_name, format!("invalid YAML: {e}")))?;

    let Value::Mapping(root) = &value else {
        return Err(IomError::validation(
            source_name,
            "configuration must be a mapping",
        ));
    };

    let Some(rule) = root.get("rule") else {
        return Err(IomError::validation(
            source_name,
            "configuration must contain a 'rule' section",
        ));
    };

    let Value::Mapping(rule) = rule else {
        return Err(IomError::validation(source_name, "'rule' must be a mapping"));
    };

    for field in REQUIRED_FIELDS {
        if !rule.contains_key(field) {
            return Err(IomError::validation(
                source_name,
                format!("missing required field 'rule.{field}'"),
            ));
        }
    }

    serde_yaml::from_value(value).map_err(|e| IomError::validation(source_name, e.to_string()))
}

pub fn load_document(path: &Path) -> Result<RuleDocument> {
    if !path.is_file() {
        return Err(IomError::NotFound(format!(
            "configuration file '{}'",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path)?;
    parse_document(&path.display().to_string(), &text)
}

/// YAML rule files directly inside `dir`, hidden files excluded, sorted by name.
pub fn discover_rule_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IomError::NotFound(format!(
            "rules directory '{}'",
            dir.display()
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.') && (name.ends_with(".yaml") || name.ends_with(".yml"))
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(IomError::NotFound(format!(
            "no YAML files in '{}'",
            dir.display()
        )));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Severity;

    const VALID: &str = r#"
rule:
  name: "EC2-IMDSv2-Required"
  description: "Instances must enforce IMDSv2"
  resource_type: "AWS::EC2::Instance"
  platform: "AWS"
  provider: "AWS"
  severity: 0
  logic: |
    package crowdstrike
    default result = "fail"
    result = "pass" if { input.configuration.metadataOptions.httpTokens == "required" }
testing:
  sample_resource_ids: ["i-1", "i-2"]
metadata:
  version: "1.0"
  author: "secops"
"#;

    #[test]
    fn parses_full_document() {
        let doc = parse_document("valid.yaml", VALID).unwrap();
        assert_eq!(doc.rule.name, "EC2-IMDSv2-Required");
        assert_eq!(doc.rule.severity, Severity::Critical);
        assert_eq!(doc.rule.domain, "CSPM");
        assert_eq!(doc.rule.subdomain, "IOM");
        assert_eq!(
            doc.testing.unwrap().sample_resource_ids,
            vec!["i-1".to_string(), "i-2".to_string()]
        );
        assert_eq!(doc.metadata.unwrap().author.as_deref(), Some("secops"));
    }

    #[test]
    fn missing_field_named_in_error() {
        let text = VALID.replace("  description: \"Instances must enforce IMDSv2\"\n", "");
        let err = parse_document("x.yaml", &text).unwrap_err();
        assert!(err.to_string().contains("rule.description"), "{err}");
    }

    #[test]
    fn missing_rule_section_rejected() {
        let err = parse_document("x.yaml", "metadata:\n  version: '1'\n").unwrap_err();
        assert!(matches!(err, IomError::Validation { .. }));
        assert!(err.to_string().contains("'rule' section"));
    }

    #[test]
    fn non_mapping_rejected() {
        let err = parse_document("x.yaml", "- a\n- b\n").unwrap_err();
        assert!(err.to_string().contains("must be a mapping"));
    }

    #[test]
    fn out_of_range_severity_rejected() {
        let text = VALID.replace("severity: 0", "severity: 7");
        let err = parse_document("x.yaml", &text).unwrap_err();
        assert!(matches!(err, IomError::Validation { .. }));
        assert!(err.to_string().contains("severity"));
    }

    #[test]
    fn severity_defaults_to_high() {
        let text = VALID.replace("  severity: 0\n", "");
        let doc = parse_document("x.yaml", &text).unwrap();
        assert_eq!(doc.rule.severity, Severity::High);
    }

    #[test]
    fn discovers_only_visible_yaml_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.yaml", "a.yml", ".hidden.yaml", "notes.txt"] {
            std::fs::write(dir.path().join(name), "rule: {}").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.yaml"), "rule: {}").unwrap();

        let files = discover_rule_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.yml", "b.yaml"]);
    }

    #[test]
    fn empty_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_rule_files(dir.path()),
            Err(IomError::NotFound(_))
        ));
    }
}
