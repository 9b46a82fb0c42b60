//! Resource-type catalogs: plain-text lists of the types a provider offers.
//!
//! Files are named `all-resource-types-<provider>.txt`, one type per line,
//! with `#` comments. Azure catalogs are noisy (operations, actions,
//! sub-resources) and are reduced to top-level resource types on load.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::error::{IomError, Result};
use crate::rules::CloudProvider;

/// Directory listing of the public AWS Config resource-schema repository.
pub const AWS_SCHEMA_LISTING_URL: &str = "https://api.github.com/repos/awslabs/aws-config-resource-schema/contents/config/properties/resource-types";

const AWS_SCHEMA_SUFFIX: &str = ".properties.json";

/// Path fragments that mark Azure entries which are not resources.
const AZURE_SKIP_PATTERNS: &[&str] = &[
    "/operations",
    "/locations",
    "/operationstatus",
    "/operationresults",
    "/checknameavailability",
    "/usages",
    "/quotas",
    "/skus",
    "/capabilities",
    "/listkeys",
    "/regeneratekey",
    "/validate",
    "/migrate",
    "/move",
    "/export",
    "/import",
    "/backup",
    "/restore",
    "/sync",
    "/cancel",
    "/restart",
    "/start",
    "/stop",
    "/deallocate",
    "/generalize",
    "/capture",
    "/redeploy",
    "/reimage",
    "/performmaintenance",
    "/assesspatches",
    "/installpatches",
    "/runcommand",
    "/extensions",
    "/metricdefinitions",
    "/metrics",
    "/diagnosticsettings",
    "/logs",
    "/events",
    "/alerts",
    "/recommendations",
    "/assessments",
    "/securitystatuses",
    "/vulnerabilityassessments",
    "/advancedthreatprotectionsettings",
];

/// Words that, inside the last path segment, mark an action or sub-resource.
const AZURE_ACTION_WORDS: &[&str] = &[
    "operation", "status", "result", "availability", "usage", "quota", "key", "credential",
    "token", "secret", "certificate", "policy", "rule", "setting", "configuration",
    "definition", "template", "profile", "plan", "schedule", "job", "task", "run",
    "execution", "deployment", "migration", "backup", "restore", "snapshot", "replica", "copy",
    "sync", "export", "import", "transfer", "connection", "link", "association", "binding",
    "mapping", "assignment", "attachment", "endpoint", "gateway", "proxy", "filter", "monitor",
    "alert", "notification", "event", "log", "metric", "diagnostic", "health", "state", "info",
    "detail", "summary", "report", "analysis", "assessment", "recommendation", "suggestion",
    "advice", "guidance", "help",
];

pub fn catalog_file_name(provider: &CloudProvider) -> String {
    format!("all-resource-types-{}.txt", provider.api_name())
}

/// Non-empty, non-comment lines.
pub fn parse_catalog(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Whether an Azure catalog entry names a top-level resource type.
pub fn is_azure_resource_type(entry: &str, include_third_party: bool) -> bool {
    let lower = entry.to_lowercase();
    if AZURE_SKIP_PATTERNS.iter().any(|p| lower.contains(p)) {
        return false;
    }
    if let Some((_, last)) = lower.rsplit_once('/') {
        if AZURE_ACTION_WORDS.iter().any(|w| last.contains(w)) {
            return false;
        }
    }
    if entry.matches('/').count() > 2 {
        return false;
    }
    include_third_party || entry.starts_with("Microsoft.")
}

/// Resource types from the AWS Config schema repository listing
/// (`AWS%3A%3AEC2%3A%3AInstance.properties.json` -> `AWS::EC2::Instance`).
pub fn decode_aws_listing(listing: &Value) -> Vec<String> {
    let mut types: Vec<String> = listing
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| item.get("name").and_then(Value::as_str))
        .filter_map(|name| name.strip_suffix(AWS_SCHEMA_SUFFIX))
        .filter_map(|encoded| urlencoding::decode(encoded).ok())
        .map(|decoded| decoded.into_owned())
        .collect();
    types.sort();
    types
}

pub fn fetch_aws_catalog(timeout: Duration) -> Result<Vec<String>> {
    let http = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("iomctl/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| IomError::Http(e.to_string()))?;
    let resp = http.get(AWS_SCHEMA_LISTING_URL).send()?;
    let status = resp.status();
    if !status.is_success() {
        return Err(IomError::from_status(
            status.as_u16(),
            "failed to list AWS Config resource schemas",
        ));
    }
    let listing: Value = resp.json()?;
    Ok(decode_aws_listing(&listing))
}

/// Where the catalog for `provider` is read from.
#[derive(Debug, Clone)]
pub struct CatalogSource {
    pub provider: CloudProvider,
    /// Explicit catalog file; defaults to `all-resource-types-<provider>.txt`.
    pub path: Option<PathBuf>,
    pub include_third_party: bool,
    pub timeout: Duration,
}

impl CatalogSource {
    pub fn new(provider: CloudProvider) -> Self {
        Self {
            provider,
            path: None,
            include_third_party: false,
            timeout: Duration::from_secs(30),
        }
    }

    fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(catalog_file_name(&self.provider)))
    }

    /// Load and filter the catalog. AWS falls back to the public schema
    /// listing when no file exists.
    pub fn load(&self) -> Result<Vec<String>> {
        let path = self.resolved_path();
        let types = if path.is_file() {
            let entries = parse_catalog(&std::fs::read_to_string(&path)?);
            self.filter(entries)
        } else if self.provider == CloudProvider::Aws {
            tracing::info!(path = %path.display(), "no local catalog, fetching AWS Config listing");
            fetch_aws_catalog(self.timeout)?
        } else {
            return Err(IomError::NotFound(format!(
                "resource type catalog '{}'",
                path.display()
            )));
        };

        if types.is_empty() {
            return Err(IomError::NotFound(format!(
                "no {} resource types in catalog",
                self.provider
            )));
        }
        Ok(types)
    }

    fn filter(&self, entries: Vec<String>) -> Vec<String> {
        match self.provider {
            CloudProvider::Azure => entries
                .into_iter()
                .filter(|e| is_azure_resource_type(e, self.include_third_party))
                .collect(),
            _ => entries,
        }
    }
}

pub fn load_from(path: &Path, provider: CloudProvider) -> Result<Vec<String>> {
    CatalogSource {
        path: Some(path.to_path_buf()),
        ..CatalogSource::new(provider)
    }
    .load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn comments_and_blanks_skipped() {
        let types = parse_catalog("# AWS types\n\nAWS::EC2::Instance\n  AWS::S3::Bucket  \n");
        assert_eq!(types, vec!["AWS::EC2::Instance", "AWS::S3::Bucket"]);
    }

    #[test]
    fn azure_filter_keeps_top_level_microsoft_types() {
        assert!(is_azure_resource_type("Microsoft.Compute/virtualMachines", false));
        assert!(is_azure_resource_type("Microsoft.Storage/storageAccounts", false));
        assert!(!is_azure_resource_type("Microsoft.Compute/operations", false));
        assert!(!is_azure_resource_type("Microsoft.Compute/virtualMachines/restart", false));
        assert!(!is_azure_resource_type("Microsoft.Network/applicationGateways", false));
        assert!(!is_azure_resource_type("Microsoft.Web/sites/a/b/c", false));
    }

    #[test]
    fn third_party_types_are_opt_in() {
        assert!(!is_azure_resource_type("Datadog.Monitoring/workspaces", false));
        assert!(is_azure_resource_type("Datadog.Monitoring/workspaces", true));
    }

    #[test]
    fn aws_listing_decoded_and_sorted() {
        let listing = json!([
            {"name": "AWS%3A%3AS3%3A%3ABucket.properties.json"},
            {"name": "AWS%3A%3AEC2%3A%3AInstance.properties.json"},
            {"name": "README.md"}
        ]);
        assert_eq!(
            decode_aws_listing(&listing),
            vec!["AWS::EC2::Instance", "AWS::S3::Bucket"]
        );
    }

    #[test]
    fn azure_catalog_file_is_filtered_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("azure.txt");
        std::fs::write(
            &path,
            "Microsoft.Compute/virtualMachines\nMicrosoft.Compute/locations\nAcme.Thing/widgets\n",
        )
        .unwrap();
        let types = load_from(&path, CloudProvider::Azure).unwrap();
        assert_eq!(types, vec!["Microsoft.Compute/virtualMachines"]);
    }

    #[test]
    fn missing_non_aws_catalog_is_not_found() {
        let source = CatalogSource {
            path: Some(PathBuf::from("/nonexistent/all-resource-types-gcp.txt")),
            ..CatalogSource::new(CloudProvider::Gcp)
        };
        assert!(matches!(source.load(), Err(IomError::NotFound(_))));
    }
}
