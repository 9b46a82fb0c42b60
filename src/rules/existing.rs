use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{
    DocumentMetadata, RuleConfig, RuleDocument, Severity, DEFAULT_DOMAIN, DEFAULT_SUBDOMAIN,
};

/// Source recorded in exported documents.
pub const EXPORT_SOURCE: &str = "CrowdStrike API";

/// A rule as the backend reports it. Fetched per invocation, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExistingRule {
    pub uuid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub provider: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub severity: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub logic: String,
    #[serde(default)]
    pub alert_info: Option<String>,
    #[serde(default)]
    pub remediation: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attack_types: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub controls: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resource_types: Vec<ResourceTypeRef>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTypeRef {
    #[serde(default)]
    pub resource_type: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ExistingRule {
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// First declared resource type, or "Unknown".
    pub fn primary_resource_type(&self) -> &str {
        self.resource_types
            .first()
            .map(|rt| rt.resource_type.as_str())
            .filter(|rt| !rt.is_empty())
            .unwrap_or("Unknown")
    }

    /// Severity as the typed level; out-of-range values fall back to high.
    pub fn severity_level(&self) -> Severity {
        self.severity
            .and_then(|s| u8::try_from(s).ok())
            .and_then(|s| Severity::try_from(s).ok())
            .unwrap_or_default()
    }

    /// Desired-state document equivalent of this rule, ready to re-import.
    pub fn to_document(&self) -> RuleDocument {
        let provider = if self.provider.is_empty() {
            "Unknown".to_string()
        } else {
            self.provider.clone()
        };
        let non_empty = |s: &Option<String>| s.clone().filter(|v| !v.is_empty());

        RuleDocument {
            metadata: Some(DocumentMetadata {
                version: Some("1.0".into()),
                author: None,
                exported_from: Some(EXPORT_SOURCE.into()),
                original_uuid: Some(self.uuid.clone()),
                created_at: self.created_at.clone(),
                updated_at: self.updated_at.clone().or_else(|| self.created_at.clone()),
                created_by: self.created_by.clone(),
                updated_by: self.updated_by.clone().or_else(|| self.created_by.clone()),
            }),
            rule: RuleConfig {
                name: self.name.clone(),
                description: self.description.clone(),
                resource_type: self.primary_resource_type().to_string(),
                platform: provider.clone(),
                provider,
                domain: self.domain.clone().unwrap_or_else(|| DEFAULT_DOMAIN.into()),
                subdomain: self
                    .subdomain
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SUBDOMAIN.into()),
                severity: self.severity_level(),
                logic: self.logic.clone(),
                alert_info: non_empty(&self.alert_info),
                remediation: non_empty(&self.remediation),
                attack_types: self
                    .attack_types
                    .iter()
                    .filter(|a| !a.is_empty())
                    .cloned()
                    .collect(),
                controls: self.controls.clone(),
            },
            testing: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::parse_document;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> ExistingRule {
        ExistingRule::from_value(json!({
            "uuid": "7c4f9a81-3c50-47c7-83a2-c89459ad833f",
            "name": "S3 Public Read",
            "description": "Bucket allows public reads",
            "provider": "AWS",
            "domain": "CSPM",
            "subdomain": "IOM",
            "severity": 2,
            "logic": "package crowdstrike\ndefault result = \"fail\"\nresult = \"pass\" if { true }\n",
            "alert_info": "Bucket ACL grants AllUsers",
            "remediation": null,
            "attack_types": ["", "Exfiltration"],
            "controls": null,
            "resource_types": [{"resource_type": "AWS::S3::Bucket"}],
            "created_at": "2025-01-01T00:00:00Z",
            "created_by": "api-client"
        }))
        .unwrap()
    }

    #[test]
    fn decodes_nulls_as_defaults() {
        let rule = sample();
        assert!(rule.controls.is_empty());
        assert_eq!(rule.remediation, None);
        assert_eq!(rule.primary_resource_type(), "AWS::S3::Bucket");
    }

    #[test]
    fn export_fills_metadata_fallbacks() {
        let doc = sample().to_document();
        let meta = doc.metadata.unwrap();
        assert_eq!(meta.updated_at.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert_eq!(meta.updated_by.as_deref(), Some("api-client"));
        assert_eq!(
            meta.original_uuid.as_deref(),
            Some("7c4f9a81-3c50-47c7-83a2-c89459ad833f")
        );
        assert_eq!(doc.rule.attack_types, vec!["Exfiltration".to_string()]);
    }

    #[test]
    fn exported_yaml_reparses_to_same_rule() {
        let existing = sample();
        let yaml = serde_yaml::to_string(&existing.to_document()).unwrap();
        let reparsed = parse_document("export.yaml", &yaml).unwrap();

        assert_eq!(reparsed.rule.name, existing.name);
        assert_eq!(reparsed.rule.resource_type, "AWS::S3::Bucket");
        assert_eq!(reparsed.rule.platform, reparsed.rule.provider);
        assert_eq!(reparsed.rule.provider, existing.provider);
        assert_eq!(reparsed.rule.severity, Severity::Medium);
        assert_eq!(reparsed.rule.logic, existing.logic);
        assert_eq!(reparsed, existing.to_document());
    }

    #[test]
    fn missing_resource_types_export_unknown() {
        let rule = ExistingRule {
            uuid: "u".into(),
            name: "n".into(),
            ..Default::default()
        };
        let doc = rule.to_document();
        assert_eq!(doc.rule.resource_type, "Unknown");
        assert_eq!(doc.rule.provider, "Unknown");
        assert_eq!(doc.rule.severity, Severity::High);
    }
}
