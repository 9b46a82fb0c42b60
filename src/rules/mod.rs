//! Desired-state rule documents and the observed rules the backend returns.

pub mod existing;
pub mod loader;
pub mod provider;
pub mod validate;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use existing::ExistingRule;
pub use loader::{discover_rule_files, load_document, parse_document};
pub use provider::CloudProvider;
pub use validate::{check_logic, load_and_validate, LogicCheck, ValidatedRule};

pub const DEFAULT_DOMAIN: &str = "CSPM";
pub const DEFAULT_SUBDOMAIN: &str = "IOM";

/// A rule file: the rule itself plus optional test fixtures and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
    pub rule: RuleConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testing: Option<TestingSection>,
}

/// Desired state of one custom IOM rule. The name is the reconciliation key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    pub description: String,
    pub resource_type: String,
    pub platform: String,
    pub provider: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default = "default_subdomain")]
    pub subdomain: String,
    #[serde(default)]
    pub severity: Severity,
    pub logic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attack_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<Value>,
}

impl RuleConfig {
    pub fn cloud_provider(&self) -> CloudProvider {
        CloudProvider::from_platform(&self.platform)
    }

    /// Lowercase, dash-separated form of the name used in report file names.
    pub fn slug(&self) -> String {
        crate::output::naming::slug(&self.name)
    }
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.into()
}

fn default_subdomain() -> String {
    DEFAULT_SUBDOMAIN.into()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestingSection {
    #[serde(default)]
    pub sample_resource_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

/// Rule severity. Serialized as its backend integer (0 = critical ... 3 = informational).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Severity {
    Critical,
    #[default]
    High,
    Medium,
    Informational,
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Critical),
            1 => Ok(Self::High),
            2 => Ok(Self::Medium),
            3 => Ok(Self::Informational),
            other => Err(format!(
                "severity must be 0 (critical), 1 (high), 2 (medium), or 3 (informational), got {other}"
            )),
        }
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Informational => 3,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "Critical"),
            Self::High => write!(f, "High"),
            Self::Medium => write!(f, "Medium"),
            Self::Informational => write!(f, "Informational"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_round_trips_through_integer() {
        for n in 0u8..=3 {
            let sev = Severity::try_from(n).unwrap();
            assert_eq!(u8::from(sev), n);
        }
        assert!(Severity::try_from(4).is_err());
    }

    #[test]
    fn default_severity_is_high() {
        assert_eq!(Severity::default(), Severity::High);
        assert_eq!(u8::from(Severity::default()), 1);
    }

    #[test]
    fn severity_orders_critical_first() {
        assert!(Severity::Critical < Severity::Informational);
    }
}
