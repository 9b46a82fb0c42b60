use std::path::{Path, PathBuf};

use crate::rules::CloudProvider;

/// File-name form of a rule name: lowercase, spaces and underscores become
/// dashes, anything other than alphanumerics, `-` and `.` is dropped.
pub fn slug(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '_' { '-' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '.')
        .collect();
    if slug.is_empty() {
        "rule".to_string()
    } else {
        slug
    }
}

/// File-name form of a resource type (`AWS::EC2::Instance` -> `aws-ec2-instance`).
pub fn resource_type_stem(resource_type: &str) -> String {
    resource_type
        .to_lowercase()
        .replace("::", "-")
        .replace(['/', '.'], "-")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect()
}

/// Name under which the input schema of a resource type is stored.
pub fn schema_file_name(provider: &CloudProvider, resource_type: &str) -> String {
    format!(
        "schema-{}-{}.json",
        provider.api_name(),
        resource_type_stem(resource_type)
    )
}

/// `dir/stem.ext`, or the first free `dir/stem-N.ext` when that exists.
pub fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let candidate = dir.join(format!("{stem}.{ext}"));
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|n| dir.join(format!("{stem}-{n}.{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_normalizes_rule_names() {
        assert_eq!(slug("S3 Public_Read v1.2"), "s3-public-read-v1.2");
        assert_eq!(slug("EC2/IMDSv2: required!"), "ec2imdsv2-required");
        assert_eq!(slug("???"), "rule");
    }

    #[test]
    fn schema_names_follow_provider_and_type() {
        assert_eq!(
            schema_file_name(&CloudProvider::Aws, "AWS::EC2::Instance"),
            "schema-aws-aws-ec2-instance.json"
        );
        assert_eq!(
            schema_file_name(&CloudProvider::Azure, "Microsoft.Storage/storageAccounts"),
            "schema-azure-microsoft-storage-storageaccounts.json"
        );
        assert_eq!(
            resource_type_stem("compute.googleapis.com/Instance"),
            "compute-googleapis-com-instance"
        );
    }

    #[test]
    fn unique_path_adds_counter_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), "rule", "yaml");
        assert_eq!(first, dir.path().join("rule.yaml"));
        std::fs::write(&first, "").unwrap();

        let second = unique_path(dir.path(), "rule", "yaml");
        assert_eq!(second, dir.path().join("rule-1.yaml"));
        std::fs::write(&second, "").unwrap();

        assert_eq!(
            unique_path(dir.path(), "rule", "yaml"),
            dir.path().join("rule-2.yaml")
        );
    }
}
