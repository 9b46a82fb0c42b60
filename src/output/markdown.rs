use std::fmt::Write as _;

use serde_json::Value;

use crate::rules::CloudProvider;
use crate::schema::SchemaFile;
use crate::workflow::{ProbeResult, ProbeStatus, SupportCounts};

/// Extra column a provider's support table carries: header plus per-type link.
struct LinkColumn {
    header: &'static str,
    link: fn(&str) -> Option<String>,
}

fn link_column(provider: &CloudProvider) -> Option<LinkColumn> {
    match provider {
        CloudProvider::Aws => Some(LinkColumn {
            header: "AWS Config Schema",
            link: aws_config_link,
        }),
        CloudProvider::Azure => Some(LinkColumn {
            header: "ARM Template Reference",
            link: azure_template_link,
        }),
        CloudProvider::Gcp => Some(LinkColumn {
            header: "Service Documentation",
            link: gcp_docs_link,
        }),
        CloudProvider::Oci | CloudProvider::Generic(_) => None,
    }
}

pub fn aws_config_link(resource_type: &str) -> Option<String> {
    resource_type.starts_with("AWS::").then(|| {
        format!(
            "https://github.com/awslabs/aws-config-resource-schema/blob/master/config/properties/resource-types/{}.properties.json",
            urlencoding::encode(resource_type)
        )
    })
}

pub fn azure_template_link(resource_type: &str) -> Option<String> {
    let (namespace, rest) = resource_type.split_once('/')?;
    let resource = rest.split('/').next()?.to_lowercase();
    let namespace = namespace.to_lowercase();
    let service = namespace.strip_prefix("microsoft.").unwrap_or(&namespace);
    Some(format!(
        "https://learn.microsoft.com/en-us/azure/templates/{service}/{resource}"
    ))
}

pub fn gcp_docs_link(resource_type: &str) -> Option<String> {
    if let Some((service, _)) = resource_type.split_once(".googleapis.com/") {
        return Some(format!("https://cloud.google.com/{service}"));
    }
    resource_type
        .starts_with("k8s.io/")
        .then(|| "https://kubernetes.io/docs/reference/kubernetes-api/".to_string())
}

fn status_cell(status: ProbeStatus) -> &'static str {
    match status {
        ProbeStatus::Supported => "✅ Yes",
        ProbeStatus::NotSupported => "❌ No",
        ProbeStatus::Error => "⚠️ Error",
    }
}

fn example_resource_type(provider: &CloudProvider) -> &'static str {
    match provider {
        CloudProvider::Aws => "AWS::EC2::Instance",
        CloudProvider::Azure => "Microsoft.Compute/virtualMachines",
        CloudProvider::Gcp => "compute.googleapis.com/Instance",
        CloudProvider::Oci | CloudProvider::Generic(_) => "<resource type>",
    }
}

/// Support table for one provider, rows sorted by resource type.
pub fn support_table(
    provider: &CloudProvider,
    results: &[ProbeResult],
    counts: &SupportCounts,
    timestamp: &str,
) -> String {
    let mut rows: Vec<&ProbeResult> = results.iter().collect();
    rows.sort_by(|a, b| a.resource_type.cmp(&b.resource_type));

    let total = counts.supported + counts.unsupported + counts.errors;
    let pct = counts.support_percentage();
    let name = provider.platform_name();
    let column = link_column(provider);

    let mut md = String::new();
    let _ = writeln!(md, "# {name} Resource Type Support\n");
    let _ = writeln!(
        md,
        "Which {name} resource types the backend accepts for custom IOM rules.\n"
    );
    let _ = writeln!(md, "## Summary\n");
    let _ = writeln!(md, "- **Total Tested**: {total} resource types");
    let _ = writeln!(md, "- **Supported**: {} ({pct:.1}%)", counts.supported);
    let _ = writeln!(md, "- **Not Supported**: {}", counts.unsupported);
    if counts.errors > 0 {
        let _ = writeln!(md, "- **Errors**: {}", counts.errors);
    }
    let _ = writeln!(md, "- **Last Updated**: {timestamp}\n");
    let _ = writeln!(md, "## Resource Type Support Table\n");

    match &column {
        Some(col) => {
            let _ = writeln!(md, "| Resource Type | Support | {} |", col.header);
            let _ = writeln!(md, "|---|---|---|");
        }
        None => {
            let _ = writeln!(md, "| Resource Type | Support |");
            let _ = writeln!(md, "|---|---|");
        }
    }
    for row in rows {
        let status = status_cell(row.status);
        match &column {
            Some(col) => {
                let link = (col.link)(&row.resource_type)
                    .map(|url| format!("[View]({url})"))
                    .unwrap_or_else(|| "N/A".into());
                let _ = writeln!(md, "| `{}` | {status} | {link} |", row.resource_type);
            }
            None => {
                let _ = writeln!(md, "| `{}` | {status} |", row.resource_type);
            }
        }
    }

    let _ = write!(
        md,
        r#"
## Example Rule

```yaml
rule:
  name: "My-Custom-Rule"
  description: "Custom rule for a supported resource type"
  resource_type: "{example}"
  platform: "{name}"
  provider: "{name}"
  severity: 1
  logic: |
    package crowdstrike
    default result = "fail"
    result = "pass" if {{
        # policy logic
    }}
```

Regenerate with `iom-schemas test-support --provider {api}`.
"#,
        example = example_resource_type(provider),
        api = provider.api_name(),
    );
    md
}

fn provider_label(schema: &SchemaFile) -> String {
    schema
        .provider()
        .map(|p| p.platform_name())
        .unwrap_or_else(|| "Unknown".into())
}

/// Markdown page for one schema file.
pub fn schema_page(schema: &SchemaFile) -> String {
    let resource_type = schema.resource_type().unwrap_or("unknown");
    let mut md = String::new();
    let _ = writeln!(md, "# {resource_type}\n");
    let _ = writeln!(md, "**Provider:** {}\n", provider_label(schema));
    let _ = writeln!(
        md,
        "**Configuration Fields:** {}\n",
        schema.config_field_count()
    );

    let entry = schema
        .first_entry()
        .map(|e| Value::Object(e.clone()))
        .unwrap_or(Value::Null);
    let pretty = serde_json::to_string_pretty(&entry).unwrap_or_default();
    let _ = writeln!(md, "## Schema Structure\n\n```json\n{pretty}\n```\n");

    let _ = writeln!(md, "## Configuration Fields\n");
    let mut first_field = None;
    if let Some(config) = schema.configuration() {
        for (field, kind) in config {
            first_field.get_or_insert(field.as_str());
            let kind = match kind {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let _ = writeln!(md, "- **{field}**: `{kind}`");
        }
    }
    let _ = write!(
        md,
        r#"
## Usage Example

```rego
package crowdstrike

default result = "fail"

result = "pass" if {{
    input.configuration.{field}
}}
```
"#,
        field = first_field.unwrap_or("field_name"),
    );
    md
}

/// `README.md` index linking every schema page, grouped by provider.
pub fn schema_index(schemas: &[SchemaFile]) -> String {
    let mut entries: Vec<(String, &str, &SchemaFile)> = schemas
        .iter()
        .map(|s| (provider_label(s), s.resource_type().unwrap_or("unknown"), s))
        .collect();
    entries.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));

    let mut md =
        String::from("# Resource Schemas\n\nInput schemas for supported resource types.\n");
    let mut current: Option<&str> = None;
    for (provider, resource_type, schema) in &entries {
        if current != Some(provider.as_str()) {
            let _ = writeln!(md, "\n## {provider}\n");
            current = Some(provider.as_str());
        }
        let _ = writeln!(
            md,
            "- [{resource_type}]({}) ({} fields)",
            page_name(&schema.file_name),
            schema.config_field_count()
        );
    }

    let mut providers: Vec<&str> = entries.iter().map(|e| e.0.as_str()).collect();
    providers.dedup();
    let _ = write!(
        md,
        "\n## Summary\n\n- **Total Resource Types:** {}\n- **Providers:** {}\n",
        entries.len(),
        providers.len()
    );
    md
}

/// Markdown page name for a schema file name.
pub fn page_name(file_name: &str) -> String {
    match file_name.strip_suffix(".json") {
        Some(stem) => format!("{stem}.md"),
        None => format!("{file_name}.md"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::ec2_schema;
    use std::path::PathBuf;

    fn result(rt: &str, status: ProbeStatus) -> ProbeResult {
        ProbeResult {
            provider: CloudProvider::Aws,
            resource_type: rt.into(),
            status,
            supported: status == ProbeStatus::Supported,
            schema: None,
            schema_file: None,
            error: None,
            attempts: 1,
        }
    }

    #[test]
    fn aws_link_percent_encodes_type() {
        assert_eq!(
            aws_config_link("AWS::EC2::Instance").unwrap(),
            "https://github.com/awslabs/aws-config-resource-schema/blob/master/config/properties/resource-types/AWS%3A%3AEC2%3A%3AInstance.properties.json"
        );
        assert!(aws_config_link("Custom::Thing").is_none());
    }

    #[test]
    fn azure_and_gcp_links() {
        assert_eq!(
            azure_template_link("Microsoft.Compute/virtualMachines").unwrap(),
            "https://learn.microsoft.com/en-us/azure/templates/compute/virtualmachines"
        );
        assert!(azure_template_link("Microsoft.Compute").is_none());
        assert_eq!(
            gcp_docs_link("compute.googleapis.com/Instance").unwrap(),
            "https://cloud.google.com/compute"
        );
        assert!(gcp_docs_link("k8s.io/Pod").unwrap().contains("kubernetes.io"));
    }

    #[test]
    fn support_table_sorted_with_link_column() {
        let results = vec![
            result("AWS::S3::Bucket", ProbeStatus::NotSupported),
            result("AWS::EC2::Instance", ProbeStatus::Supported),
        ];
        let counts = SupportCounts {
            supported: 1,
            unsupported: 1,
            errors: 0,
        };
        let md = support_table(&CloudProvider::Aws, &results, &counts, "2026-01-01T00:00:00Z");
        assert!(md.contains("| Resource Type | Support | AWS Config Schema |"));
        assert!(md.contains("- **Supported**: 1 (50.0%)"));
        let ec2 = md.find("AWS::EC2::Instance`").unwrap();
        let s3 = md.find("AWS::S3::Bucket`").unwrap();
        assert!(ec2 < s3);
    }

    #[test]
    fn oci_table_has_no_link_column() {
        let results = vec![result("Instance", ProbeStatus::Supported)];
        let counts = SupportCounts {
            supported: 1,
            ..Default::default()
        };
        let md = support_table(&CloudProvider::Oci, &results, &counts, "t");
        assert!(md.contains("| Resource Type | Support |\n"));
        assert!(md.contains("| `Instance` | ✅ Yes |"));
    }

    #[test]
    fn schema_page_lists_fields() {
        let schema = SchemaFile {
            path: PathBuf::from("schema-aws-aws-ec2-instance.json"),
            file_name: "schema-aws-aws-ec2-instance.json".into(),
            size: 10,
            content: ec2_schema(),
        };
        let page = schema_page(&schema);
        assert!(page.starts_with("# AWS::EC2::Instance"));
        assert!(page.contains("**Provider:** AWS"));
        assert!(page.contains("- **instanceId**: `string`"));
        assert!(page.contains("input.configuration.instanceId"));

        let index = schema_index(std::slice::from_ref(&schema));
        assert!(index.contains("## AWS"));
        assert!(index.contains("(schema-aws-aws-ec2-instance.md) (2 fields)"));
    }
}
