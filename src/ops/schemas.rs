//! Schema-tool commands: support probing, schema harvesting, and the
//! offline operations over a directory of saved schemas.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Value};

use super::rules::{combined_filter, fetch_rule_details, fetch_rule_ids, fetch_schema};
use super::{save, Artifact, Session};
use crate::api::ListQuery;
use crate::error::{IomError, Result};
use crate::output::json::timestamp;
use crate::output::markdown::{page_name, schema_index, schema_page, support_table};
use crate::output::{html, DocFormat};
use crate::progress::ProgressTracker;
use crate::rules::CloudProvider;
use crate::schema::catalog::CatalogSource;
use crate::schema::compare::{compare_dirs, SchemaComparison};
use crate::schema::validate::{validate_dir, SchemaValidationReport};
use crate::schema::{load_dir, SchemaFile};
use crate::workflow::{ProbeResult, ProbeStatus, ProbeTarget, Prober, RetryPolicy, Snapshot};

/// Asset ids requested per provider during discovery.
const MAX_ASSETS_PER_PROVIDER: usize = 250;

/// Asset details fetched per provider to learn resource types.
const ASSET_SAMPLE_SIZE: usize = 50;

fn prober<'a>(session: &Session<'a>, workers: Option<usize>) -> Prober<'a> {
    Prober::new(
        session.api,
        workers.unwrap_or(session.probe.workers),
        RetryPolicy::from_config(&session.probe),
    )
    .with_cancel(session.cancel.clone())
}

#[derive(Debug, Clone)]
pub struct SupportOptions {
    pub provider: CloudProvider,
    pub output_dir: PathBuf,
    /// Catalog file; defaults to `all-resource-types-<provider>.txt`.
    pub catalog: Option<PathBuf>,
    pub include_third_party: bool,
    /// Overrides the configured worker count.
    pub workers: Option<usize>,
}

impl SupportOptions {
    pub fn new(provider: CloudProvider) -> Self {
        Self {
            provider,
            output_dir: PathBuf::from("."),
            catalog: None,
            include_third_party: false,
            workers: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SupportReport {
    pub provider: CloudProvider,
    #[serde(flatten)]
    pub snapshot: Snapshot<ProbeResult>,
    pub cancelled: bool,
    pub support_percentage: f64,
    pub timestamp: String,
}

impl SupportReport {
    pub fn has_errors(&self) -> bool {
        self.snapshot.counts.errors > 0
    }
}

#[derive(Debug, Clone)]
pub struct SupportOutput {
    pub report: Artifact<SupportReport>,
    pub markdown: PathBuf,
}

fn catalog_source(session: &Session<'_>, options: &SupportOptions) -> CatalogSource {
    CatalogSource {
        path: options.catalog.clone(),
        include_third_party: options.include_third_party,
        timeout: session.timeout,
        ..CatalogSource::new(options.provider.clone())
    }
}

/// Probe every catalog type of one provider. Supported schemas land in
/// `<out>/json/`; the report goes to `resource-type-support-report-<p>.json`
/// and the table to `resource-type-support-<p>.md`.
pub fn test_support(
    session: &Session<'_>,
    options: &SupportOptions,
    progress: &dyn ProgressTracker,
) -> Result<SupportOutput> {
    let targets: Vec<ProbeTarget> = catalog_source(session, options)
        .load()?
        .into_iter()
        .map(|rt| ProbeTarget::new(options.provider.clone(), rt))
        .collect();
    tracing::info!(provider = %options.provider, count = targets.len(), "probing resource types");

    let run = prober(session, options.workers)
        .with_schema_dir(options.output_dir.join("json"))
        .run(&targets, progress)?;

    let report = SupportReport {
        provider: options.provider.clone(),
        support_percentage: run.snapshot.counts.support_percentage(),
        snapshot: run.snapshot,
        cancelled: run.cancelled,
        timestamp: timestamp(),
    };
    let api_name = options.provider.api_name();
    let markdown = options
        .output_dir
        .join(format!("resource-type-support-{api_name}.md"));
    std::fs::create_dir_all(&options.output_dir)?;
    std::fs::write(
        &markdown,
        support_table(
            &report.provider,
            &report.snapshot.items,
            &report.snapshot.counts,
            &report.timestamp,
        ),
    )?;
    let report = save(
        options
            .output_dir
            .join(format!("resource-type-support-report-{api_name}.json")),
        report,
    )?;
    Ok(SupportOutput { report, markdown })
}

/// The (provider, resource type) pairs seen in cloud assets and existing
/// rules, sorted and de-duplicated.
///
/// Asset discovery is best effort: a provider whose assets cannot be read
/// is skipped with a warning. Rule discovery failures are errors.
pub fn discover_targets(session: &Session<'_>, limit: usize) -> Result<BTreeSet<ProbeTarget>> {
    let mut targets = BTreeSet::new();

    let per_provider = (limit / 4).clamp(1, MAX_ASSETS_PER_PROVIDER);
    for provider in CloudProvider::known() {
        match asset_types(session, &provider, per_provider) {
            Ok(types) => {
                tracing::debug!(provider = %provider, count = types.len(), "asset resource types");
                targets.extend(types.into_iter().map(|rt| ProbeTarget::new(provider.clone(), rt)));
            }
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "asset discovery failed, skipping")
            }
        }
    }

    let ids = fetch_rule_ids(session, None, limit)?;
    for rule in fetch_rule_details(session.api, &ids)? {
        if rule.provider.is_empty() {
            continue;
        }
        let provider = CloudProvider::from_platform(&rule.provider);
        targets.extend(
            rule.resource_types
                .iter()
                .filter(|rt| !rt.resource_type.is_empty())
                .map(|rt| ProbeTarget::new(provider.clone(), rt.resource_type.clone())),
        );
    }
    Ok(targets)
}

fn asset_types(
    session: &Session<'_>,
    provider: &CloudProvider,
    limit: usize,
) -> Result<Vec<String>> {
    let filter = combined_filter(Some(provider.api_name().as_str()), None, None);
    let mut ids = session
        .api
        .list_resources(&ListQuery::new(filter, limit))?
        .into_ids()?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    ids.truncate(ASSET_SAMPLE_SIZE);
    Ok(session
        .api
        .get_resource_details(&ids)?
        .into_resources()?
        .iter()
        .filter_map(|r| r.get("resource_type").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexEntry {
    pub provider: CloudProvider,
    pub resource_type: String,
    pub schema_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceTypeIndex {
    pub total_discovered: usize,
    pub successful_schemas: usize,
    pub failed_schemas: usize,
    pub cancelled: bool,
    pub resource_types: Vec<IndexEntry>,
    pub timestamp: String,
}

/// Discover every resource type in use, probe it, and save its schema under
/// `output_dir`. Writes `resource-types-index.json`.
pub fn generate_all(
    session: &Session<'_>,
    output_dir: &Path,
    limit: usize,
    progress: &dyn ProgressTracker,
) -> Result<Artifact<ResourceTypeIndex>> {
    let targets: Vec<ProbeTarget> = discover_targets(session, limit)?.into_iter().collect();
    if targets.is_empty() {
        return Err(IomError::NotFound(
            "no resource types found in assets or existing rules".into(),
        ));
    }
    tracing::info!(count = targets.len(), "discovered resource types");

    let run = prober(session, None)
        .with_schema_dir(output_dir)
        .run(&targets, progress)?;

    let mut resource_types: Vec<IndexEntry> = run
        .snapshot
        .items
        .into_iter()
        .map(|item| IndexEntry {
            schema_generated: item.schema_file.is_some(),
            filename: item
                .schema_file
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned()),
            error: match item.status {
                ProbeStatus::NotSupported => Some("resource type not supported".into()),
                _ => item.error,
            },
            provider: item.provider,
            resource_type: item.resource_type,
        })
        .collect();
    resource_types.sort_by(|a, b| {
        (&a.provider, &a.resource_type).cmp(&(&b.provider, &b.resource_type))
    });

    let successful = resource_types.iter().filter(|e| e.schema_generated).count();
    let index = ResourceTypeIndex {
        total_discovered: targets.len(),
        successful_schemas: successful,
        failed_schemas: resource_types.len() - successful,
        cancelled: run.cancelled,
        resource_types,
        timestamp: timestamp(),
    };
    save(output_dir.join("resource-types-index.json"), index)
}

/// Fetch and save one schema, then read it back for its summary.
pub fn get_schema(
    session: &Session<'_>,
    provider: &CloudProvider,
    resource_type: &str,
    output: Option<PathBuf>,
) -> Result<Artifact<SchemaFile>> {
    let saved = fetch_schema(session, provider, resource_type, output)?;
    let schema = SchemaFile::load(&saved.path)?;
    Ok(Artifact::new(schema, saved.path))
}

/// Validate the schemas in `dir`; the report is written next to them.
pub fn validate_schemas(dir: &Path) -> Result<Artifact<SchemaValidationReport>> {
    let report = validate_dir(dir)?;
    save(dir.join("validation-report.json"), report)
}

pub fn compare_schemas(
    old_dir: &Path,
    new_dir: &Path,
    output: &Path,
) -> Result<Artifact<SchemaComparison>> {
    save(output.to_path_buf(), compare_dirs(old_dir, new_dir)?)
}

#[derive(Debug, Clone, Serialize)]
struct DocumentedSchema<'a> {
    resource_type: &'a str,
    provider: String,
    filename: &'a str,
    config_fields_count: usize,
    config_fields: Vec<&'a str>,
    full_schema: Option<&'a serde_json::Map<String, Value>>,
}

fn json_docs(schemas: &[SchemaFile], generated_at: &str) -> Value {
    let resources: Vec<DocumentedSchema<'_>> = schemas
        .iter()
        .map(|s| DocumentedSchema {
            resource_type: s.resource_type().unwrap_or("unknown"),
            provider: s
                .provider()
                .map(|p| p.platform_name())
                .unwrap_or_else(|| "Unknown".into()),
            filename: &s.file_name,
            config_fields_count: s.config_field_count(),
            config_fields: s
                .configuration()
                .map(|c| c.keys().map(String::as_str).collect())
                .unwrap_or_default(),
            full_schema: s.first_entry(),
        })
        .collect();
    json!({
        "title": "Resource Schemas",
        "generated_at": generated_at,
        "total_schemas": schemas.len(),
        "resources": resources,
    })
}

#[derive(Debug, Clone)]
pub struct DocsOutput {
    pub format: DocFormat,
    pub schemas: usize,
    pub files: Vec<PathBuf>,
}

/// Render documentation for every schema in `schemas_dir` into `output_dir`.
pub fn generate_docs(
    schemas_dir: &Path,
    output_dir: &Path,
    format: DocFormat,
) -> Result<DocsOutput> {
    let schemas = load_dir(schemas_dir)?;
    if schemas.is_empty() {
        return Err(IomError::NotFound(format!(
            "no schema files in '{}'",
            schemas_dir.display()
        )));
    }
    std::fs::create_dir_all(output_dir)?;
    let generated_at = timestamp();

    let files = match format {
        DocFormat::Markdown => {
            let mut files = Vec::with_capacity(schemas.len() + 1);
            for schema in &schemas {
                let path = output_dir.join(page_name(&schema.file_name));
                std::fs::write(&path, schema_page(schema))?;
                files.push(path);
            }
            let index = output_dir.join("README.md");
            std::fs::write(&index, schema_index(&schemas))?;
            files.push(index);
            files
        }
        DocFormat::Html => {
            let path = output_dir.join("index.html");
            std::fs::write(&path, html::render_schema_docs(&schemas, &generated_at))?;
            vec![path]
        }
        DocFormat::Json => {
            let docs = json_docs(&schemas, &generated_at);
            vec![save(output_dir.join("schemas-documentation.json"), docs)?.path]
        }
    };
    tracing::info!(count = schemas.len(), ?format, "generated schema docs");
    Ok(DocsOutput {
        format,
        schemas: schemas.len(),
        files,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ListedSchema {
    pub file_name: String,
    pub resource_type: String,
    pub config_fields: usize,
    pub size: u64,
}

/// Saved schemas grouped by provider label, each group sorted by type.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaListing {
    pub groups: BTreeMap<String, Vec<ListedSchema>>,
}

impl SchemaListing {
    pub fn total_schemas(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn total_size(&self) -> u64 {
        self.groups.values().flatten().map(|s| s.size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

pub fn list_schemas(dir: &Path, provider: Option<&CloudProvider>) -> Result<SchemaListing> {
    let mut listing = SchemaListing::default();
    for schema in load_dir(dir)? {
        let schema_provider = schema.provider();
        if provider.is_some_and(|p| schema_provider.as_ref() != Some(p)) {
            continue;
        }
        let Some(resource_type) = schema.resource_type().map(str::to_string) else {
            tracing::warn!(file = %schema.file_name, "schema has no resource type, skipping");
            continue;
        };
        let label = schema_provider
            .map(|p| p.platform_name())
            .unwrap_or_else(|| "Unknown".into());
        listing.groups.entry(label).or_default().push(ListedSchema {
            config_fields: schema.config_field_count(),
            size: schema.size,
            file_name: schema.file_name,
            resource_type,
        });
    }
    for group in listing.groups.values_mut() {
        group.sort_by(|a, b| a.resource_type.cmp(&b.resource_type));
    }
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ops::testing::FakeApi;
    use crate::progress::SilentProgress;
    use crate::schema::fixtures::ec2_schema;
    use pretty_assertions::assert_eq;

    fn bucket_schema() -> Value {
        json!([{
            "AWS::S3::Bucket": {
                "configuration": {"bucketName": "string"},
                "relationships": [],
                "resourceId": "string",
                "resourceName": "string"
            }
        }])
    }

    fn session<'a>(api: &'a FakeApi, out: &Path) -> Session<'a> {
        let mut session = Session::new(api, &Config::default()).with_out_dir(out);
        session.probe.base_delay_ms = 0;
        session
    }

    #[test]
    fn catalog_fetch_uses_configured_timeout() {
        let api = FakeApi::new();
        let mut config = Config::default();
        config.api.timeout_secs = 7;
        let session = Session::new(&api, &config);
        let options = SupportOptions {
            include_third_party: true,
            ..SupportOptions::new(CloudProvider::Azure)
        };
        let source = catalog_source(&session, &options);
        assert_eq!(source.timeout, std::time::Duration::from_secs(7));
        assert!(source.include_third_party);
    }

    #[test]
    fn support_run_writes_report_table_and_schemas() {
        let out = tempfile::tempdir().unwrap();
        let catalog = out.path().join("aws.txt");
        std::fs::write(&catalog, "# aws\nAWS::EC2::Instance\nAWS::Foo::Bar\n").unwrap();
        let api = FakeApi::new().with_schema("AWS::EC2::Instance", ec2_schema());

        let options = SupportOptions {
            output_dir: out.path().to_path_buf(),
            catalog: Some(catalog),
            workers: Some(2),
            ..SupportOptions::new(CloudProvider::Aws)
        };
        let progress = SilentProgress::new();
        let output = test_support(&session(&api, out.path()), &options, &progress).unwrap();
        let report = &output.report.value;

        assert_eq!(report.snapshot.total, 2);
        assert_eq!(report.snapshot.counts.supported, 1);
        assert_eq!(report.snapshot.counts.unsupported, 1);
        assert_eq!(report.support_percentage, 50.0);
        assert!(!report.cancelled);
        assert_eq!(progress.position(), 2);
        assert!(out
            .path()
            .join("json/schema-aws-aws-ec2-instance.json")
            .is_file());
        assert!(output
            .report
            .path
            .ends_with("resource-type-support-report-aws.json"));
        let table = std::fs::read_to_string(&output.markdown).unwrap();
        assert!(table.contains("| `AWS::Foo::Bar` | ❌ No |"));
    }

    #[test]
    fn discovery_unions_assets_and_rules() {
        let out = tempfile::tempdir().unwrap();
        let api = FakeApi::new()
            .with_asset("i-1", "aws", "AWS::EC2::Instance")
            .with_asset("i-2", "aws", "AWS::EC2::Instance")
            .with_asset("vm-1", "azure", "Microsoft.Compute/virtualMachines")
            .with_rule("u1", "R1", "AWS", "AWS::S3::Bucket")
            .with_rule("u2", "R2", "AWS", "AWS::EC2::Instance");

        let targets: Vec<ProbeTarget> = discover_targets(&session(&api, out.path()), 1000)
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(
            targets,
            vec![
                ProbeTarget::new(CloudProvider::Aws, "AWS::EC2::Instance"),
                ProbeTarget::new(CloudProvider::Aws, "AWS::S3::Bucket"),
                ProbeTarget::new(CloudProvider::Azure, "Microsoft.Compute/virtualMachines"),
            ]
        );
    }

    #[test]
    fn generate_all_indexes_every_discovered_type() {
        let out = tempfile::tempdir().unwrap();
        let api = FakeApi::new()
            .with_rule("u1", "R1", "AWS", "AWS::S3::Bucket")
            .with_rule("u2", "R2", "AWS", "AWS::EC2::Instance")
            .with_schema("AWS::S3::Bucket", bucket_schema());

        let index = generate_all(
            &session(&api, out.path()),
            out.path(),
            1000,
            &SilentProgress::new(),
        )
        .unwrap();
        let value = &index.value;
        assert_eq!(value.total_discovered, 2);
        assert_eq!(value.successful_schemas, 1);
        assert_eq!(value.failed_schemas, 1);
        assert_eq!(value.resource_types[0].resource_type, "AWS::EC2::Instance");
        assert!(!value.resource_types[0].schema_generated);
        assert_eq!(
            value.resource_types[1].filename.as_deref(),
            Some("schema-aws-aws-s3-bucket.json")
        );
        assert!(out.path().join("resource-types-index.json").is_file());
    }

    #[test]
    fn generate_all_with_nothing_discovered_is_not_found() {
        let out = tempfile::tempdir().unwrap();
        let api = FakeApi::new();
        let result = generate_all(
            &session(&api, out.path()),
            out.path(),
            100,
            &SilentProgress::new(),
        );
        assert!(matches!(result, Err(IomError::NotFound(_))));
    }

    fn write_schema_dir(dir: &Path) {
        std::fs::write(
            dir.join("schema-aws-aws-ec2-instance.json"),
            ec2_schema().to_string(),
        )
        .unwrap();
        std::fs::write(
            dir.join("schema-aws-aws-s3-bucket.json"),
            bucket_schema().to_string(),
        )
        .unwrap();
    }

    #[test]
    fn docs_in_every_format() {
        let schemas = tempfile::tempdir().unwrap();
        write_schema_dir(schemas.path());
        let docs = tempfile::tempdir().unwrap();

        let md = generate_docs(schemas.path(), docs.path(), DocFormat::Markdown).unwrap();
        assert_eq!(md.files.len(), 3);
        assert!(docs.path().join("README.md").is_file());
        assert!(docs.path().join("schema-aws-aws-s3-bucket.md").is_file());

        let html = generate_docs(schemas.path(), docs.path(), DocFormat::Html).unwrap();
        assert_eq!(html.files, vec![docs.path().join("index.html")]);

        generate_docs(schemas.path(), docs.path(), DocFormat::Json).unwrap();
        let text =
            std::fs::read_to_string(docs.path().join("schemas-documentation.json")).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["total_schemas"], 2);
        assert_eq!(
            value["resources"][0]["config_fields"],
            json!(["instanceId", "metadataOptions"])
        );
    }

    #[test]
    fn listing_groups_by_provider_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        write_schema_dir(dir.path());
        std::fs::write(
            dir.path().join("schema-gcp-compute-googleapis-com-instance.json"),
            json!([{"compute.googleapis.com/Instance": {"configuration": {}}}]).to_string(),
        )
        .unwrap();

        let all = list_schemas(dir.path(), None).unwrap();
        assert_eq!(all.total_schemas(), 3);
        assert_eq!(all.groups.keys().collect::<Vec<_>>(), vec!["AWS", "GCP"]);
        assert_eq!(all.groups["AWS"][0].resource_type, "AWS::EC2::Instance");

        let gcp = list_schemas(dir.path(), Some(&CloudProvider::Gcp)).unwrap();
        assert_eq!(gcp.total_schemas(), 1);
        assert_eq!(gcp.groups["GCP"][0].config_fields, 0);
    }

    #[test]
    fn validation_report_written_next_to_schemas() {
        let dir = tempfile::tempdir().unwrap();
        write_schema_dir(dir.path());
        let report = validate_schemas(dir.path()).unwrap();
        assert!(report.value.is_clean());
        assert_eq!(report.path, dir.path().join("validation-report.json"));
    }
}
