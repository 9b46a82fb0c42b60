//! Rule-manager commands.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use super::{display_path, save, Artifact, Environment, Session};
use crate::api::{
    CspmApi, EvaluationRequest, ListQuery, NewRule, RulePatch, SchemaRequest, MAX_IDS_PER_REQUEST,
};
use crate::error::{IomError, Result};
use crate::output::json::{timestamp, write_json};
use crate::output::naming::{schema_file_name, slug, unique_path};
use crate::rules::{
    discover_rule_files, load_and_validate, CloudProvider, ExistingRule, Severity,
};
use crate::workflow::{
    fetch_paginated, Desired, DesiredRule, FailurePolicy, ReconcileRun, Reconciler,
    ReconciliationOutcome, Snapshot,
};

/// Resources requested when a rule has no sample ids of its own.
const SAMPLE_DISCOVERY_LIMIT: usize = 5;

/// Discovered resources a rule is evaluated against.
const SAMPLE_TEST_COUNT: usize = 3;

/// Rule ids across as many pages as it takes, up to `max_total`.
pub fn fetch_rule_ids(
    session: &Session<'_>,
    filter: Option<&str>,
    max_total: usize,
) -> Result<Vec<String>> {
    fetch_paginated(
        session.pagination.page_size,
        max_total,
        Some(&session.cancel),
        |window| {
            tracing::debug!(offset = window.offset, limit = window.limit, "fetching rule ids");
            let query = ListQuery {
                filter: filter.map(str::to_string),
                sort: None,
                limit: window.limit,
                offset: window.offset,
            };
            session.api.list_rules(&query)?.into_ids()
        },
    )
}

/// Raw rule detail records, fetched in id chunks and concatenated in order.
pub fn fetch_rule_records(api: &dyn CspmApi, ids: &[String]) -> Result<Vec<Value>> {
    let mut records = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
        records.extend(api.get_rule_details(chunk)?.into_resources()?);
    }
    Ok(records)
}

pub fn fetch_rule_details(api: &dyn CspmApi, ids: &[String]) -> Result<Vec<ExistingRule>> {
    fetch_rule_records(api, ids)?
        .into_iter()
        .map(|record| ExistingRule::from_value(record).map_err(IomError::from))
        .collect()
}

/// Name to id map of the observed rules. When the backend holds several rules
/// with one name, the first one listed is the one that gets updated.
pub fn observed_index(rules: &[ExistingRule]) -> HashMap<String, String> {
    let mut index = HashMap::with_capacity(rules.len());
    for rule in rules.iter().filter(|r| !r.name.is_empty()) {
        match index.entry(rule.name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(rule.uuid.clone());
            }
            Entry::Occupied(slot) => tracing::warn!(
                name = %rule.name,
                kept = %slot.get(),
                ignored = %rule.uuid,
                "several backend rules share a name"
            ),
        }
    }
    index
}

/// Load every rule file in `dir` as a reconcile batch.
///
/// Under fail-fast the first invalid file aborts with its validation error,
/// before any network call. Otherwise it is kept as a failed entry.
pub fn load_desired(dir: &Path, policy: FailurePolicy) -> Result<Vec<Desired>> {
    let files = discover_rule_files(dir)?;
    let mut desired = Vec::with_capacity(files.len());
    for path in files {
        match load_and_validate(&path) {
            Ok(valid) => desired.push(Desired::Valid(DesiredRule {
                source: valid.source_name(),
                rule: valid.document.rule,
            })),
            Err(e) if policy == FailurePolicy::ContinueOnError => {
                tracing::warn!(file = %path.display(), error = %e, "skipping invalid rule file");
                desired.push(Desired::Invalid {
                    source: display_path(&path),
                    error: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(desired)
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    #[serde(flatten)]
    pub snapshot: Snapshot<ReconciliationOutcome>,
    pub halted: bool,
    pub environment: Environment,
    pub timestamp: String,
}

impl ReconcileReport {
    fn new(run: ReconcileRun, environment: Environment) -> Self {
        Self {
            snapshot: run.snapshot,
            halted: run.halted,
            environment,
            timestamp: timestamp(),
        }
    }

    pub fn is_clean(&self) -> bool {
        !self.halted && self.snapshot.counts.failed == 0
    }
}

fn reconcile(
    session: &Session<'_>,
    desired: Vec<Desired>,
    observed: &mut HashMap<String, String>,
    policy: FailurePolicy,
    environment: Environment,
) -> ReconcileReport {
    let run = Reconciler::new(session.api, policy)
        .with_cancel(session.cancel.clone())
        .run(desired, observed);
    ReconcileReport::new(run, environment)
}

/// Create-or-update every rule file in `dir` against the rules already on the
/// backend. Writes `deployment-summary-<env>.json`.
pub fn deploy_all(
    session: &Session<'_>,
    dir: &Path,
    environment: Environment,
    policy: FailurePolicy,
) -> Result<Artifact<ReconcileReport>> {
    let desired = load_desired(dir, policy)?;
    tracing::info!(files = desired.len(), dir = %dir.display(), "loaded rule files");

    let ids = fetch_rule_ids(session, None, session.pagination.max_total)?;
    let existing = fetch_rule_details(session.api, &ids)?;
    let mut observed = observed_index(&existing);
    tracing::info!(existing = observed.len(), "indexed existing rules");

    let report = reconcile(session, desired, &mut observed, policy, environment);
    session.save(&format!("deployment-summary-{environment}.json"), report)
}

/// Create every rule file in `dir` without looking at the backend first.
/// Rules sharing a name within the batch update the first one created.
/// Writes `bulk-creation-summary-<env>.json`.
pub fn create_all(
    session: &Session<'_>,
    dir: &Path,
    environment: Environment,
    policy: FailurePolicy,
) -> Result<Artifact<ReconcileReport>> {
    let desired = load_desired(dir, policy)?;
    let report = reconcile(session, desired, &mut HashMap::new(), policy, environment);
    session.save(&format!("bulk-creation-summary-{environment}.json"), report)
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidRuleEntry {
    pub file: String,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidRuleEntry {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub total_files: usize,
    pub valid: usize,
    pub invalid: usize,
    pub valid_rules: Vec<ValidRuleEntry>,
    pub invalid_rules: Vec<InvalidRuleEntry>,
    /// True when fail-fast stopped before the last file.
    pub halted: bool,
    pub timestamp: String,
}

impl ValidationSummary {
    pub fn is_clean(&self) -> bool {
        self.invalid == 0
    }
}

/// Validate every rule file in `dir`. No network. Writes
/// `validation-summary.json` into `out_dir`.
pub fn validate_all(
    dir: &Path,
    out_dir: &Path,
    policy: FailurePolicy,
) -> Result<Artifact<ValidationSummary>> {
    let files = discover_rule_files(dir)?;
    let mut valid_rules = Vec::new();
    let mut invalid_rules = Vec::new();
    let mut halted = false;

    for (index, path) in files.iter().enumerate() {
        match load_and_validate(path) {
            Ok(valid) => valid_rules.push(ValidRuleEntry {
                file: valid.source_name(),
                name: valid.document.rule.name,
                warnings: valid.warnings,
            }),
            Err(e) => {
                invalid_rules.push(InvalidRuleEntry {
                    file: display_path(path),
                    error: e.to_string(),
                });
                if policy == FailurePolicy::FailFast {
                    halted = index + 1 < files.len();
                    break;
                }
            }
        }
    }

    let summary = ValidationSummary {
        total_files: files.len(),
        valid: valid_rules.len(),
        invalid: invalid_rules.len(),
        valid_rules,
        invalid_rules,
        halted,
        timestamp: timestamp(),
    };
    save(out_dir.join("validation-summary.json"), summary)
}

/// Create the single rule in `config`. Writes `created-rule-<slug>.json`.
pub fn create_rule(session: &Session<'_>, config: &Path) -> Result<Artifact<Vec<Value>>> {
    let valid = load_and_validate(config)?;
    let rule = &valid.document.rule;
    let created = session.api.create_rule(&NewRule::from(rule))?.into_resources()?;
    if created.is_empty() {
        return Err(IomError::Internal(format!(
            "create of '{}' returned no rule",
            rule.name
        )));
    }
    tracing::info!(name = %rule.name, "created rule");
    session.save(&format!("created-rule-{}.json", rule.slug()), created)
}

/// `+`-joined FQL filter from the optional parts, `None` when all are absent.
pub fn combined_filter(
    provider: Option<&str>,
    resource_type: Option<&str>,
    extra: Option<&str>,
) -> Option<String> {
    let parts: Vec<String> = [
        provider.map(|p| format!("cloud_provider:\"{p}\"")),
        resource_type.map(|rt| format!("resource_type:\"{rt}\"")),
        extra.map(str::to_string),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.trim().is_empty())
    .collect();
    (!parts.is_empty()).then(|| parts.join("+"))
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleTestReport {
    pub rule: String,
    pub provider: String,
    pub resource_type: String,
    pub resource_ids: Vec<String>,
    /// True when the ids were discovered rather than taken from the document.
    pub discovered: bool,
    pub results: Vec<Value>,
    pub timestamp: String,
}

impl RuleTestReport {
    /// `(resource_id, evaluation result)` per evaluated resource.
    pub fn verdicts(&self) -> Vec<(String, String)> {
        self.results
            .iter()
            .map(|r| {
                let id = r.get("resource_id").and_then(Value::as_str).unwrap_or("unknown");
                let result = r
                    .pointer("/evaluation/result")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                (id.to_string(), result.to_string())
            })
            .collect()
    }
}

/// Evaluate the rule in `config` against real resources without creating it.
/// Writes `test-results-<slug>.json`.
pub fn test_rule(session: &Session<'_>, config: &Path) -> Result<Artifact<RuleTestReport>> {
    let valid = load_and_validate(config)?;
    let rule = &valid.document.rule;
    let provider = rule.cloud_provider().api_name();

    let configured = valid
        .document
        .testing
        .as_ref()
        .map(|t| t.sample_resource_ids.clone())
        .unwrap_or_default();
    let discovered = configured.is_empty();
    let resource_ids = if discovered {
        let filter = combined_filter(
            Some(provider.as_str()),
            Some(rule.resource_type.as_str()),
            None,
        );
        let mut ids = session
            .api
            .list_resources(&ListQuery::new(filter, SAMPLE_DISCOVERY_LIMIT))?
            .into_ids()?;
        ids.truncate(SAMPLE_TEST_COUNT);
        tracing::info!(
            count = ids.len(),
            resource_type = %rule.resource_type,
            "discovered test resources"
        );
        ids
    } else {
        configured
    };
    if resource_ids.is_empty() {
        return Err(IomError::NotFound(format!(
            "no {} resources of type '{}' to test against",
            provider, rule.resource_type
        )));
    }

    let request = EvaluationRequest {
        cloud_provider: provider.clone(),
        resource_type: rule.resource_type.clone(),
        logic: rule.logic.clone(),
        ids: resource_ids.clone(),
    };
    let results = session.api.evaluate_logic(&request)?.into_resources()?;

    let report = RuleTestReport {
        rule: rule.name.clone(),
        provider,
        resource_type: rule.resource_type.clone(),
        resource_ids,
        discovered,
        results,
        timestamp: timestamp(),
    };
    session.save(&format!("test-results-{}.json", rule.slug()), report)
}

/// Rule ids matching `filter`. Writes `custom-rules-list.json`.
pub fn list_rules(
    session: &Session<'_>,
    filter: Option<&str>,
    limit: usize,
) -> Result<Artifact<Vec<String>>> {
    let ids = fetch_rule_ids(session, filter, limit)?;
    session.save("custom-rules-list.json", ids)
}

/// Details of the given rules. Writes the raw records to `rule-details.json`.
pub fn rule_details(session: &Session<'_>, ids: &[String]) -> Result<Artifact<Vec<ExistingRule>>> {
    let records = fetch_rule_records(session.api, ids)?;
    let path = session.artifact_path("rule-details.json");
    write_json(&path, &records)?;
    let rules = records
        .into_iter()
        .map(ExistingRule::from_value)
        .collect::<serde_json::Result<Vec<_>>>()?;
    Ok(Artifact::new(rules, path))
}

/// Fields an `update` may change.
#[derive(Debug, Clone, Default)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub alert_info: Option<String>,
}

/// Partial update of one rule. Writes `updated-rule-<id>.json`.
pub fn update_rule(
    session: &Session<'_>,
    rule_id: &str,
    update: RuleUpdate,
) -> Result<Artifact<Vec<Value>>> {
    let patch = RulePatch {
        name: update.name,
        description: update.description,
        severity: update.severity.map(u8::from),
        alert_info: update.alert_info,
        ..RulePatch::new(rule_id)
    };
    if patch.is_empty() {
        return Err(IomError::validation(
            rule_id,
            "no updates specified, pass at least one of --name, --description, --severity, --alert-info",
        ));
    }

    let updated = session.api.update_rule(&patch)?.into_resources()?;
    if updated.is_empty() {
        return Err(IomError::Internal(format!("update of '{rule_id}' returned no rule")));
    }
    tracing::info!(id = %rule_id, "updated rule");
    session.save(&format!("updated-rule-{}.json", slug(rule_id)), updated)
}

/// A delete chunk the backend refused. Its rules may still exist.
#[derive(Debug, Clone, Serialize)]
pub struct FailedDelete {
    pub rule_ids: Vec<String>,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub deleted_rule_ids: Vec<String>,
    pub result: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedDelete>,
    pub timestamp: String,
}

impl DeleteResult {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete the given rules in chunks. A failed chunk does not stop the
/// remaining ones, and the report is written either way. Confirmation is the
/// caller's job. Writes `deleted-rules-result.json`.
pub fn delete_rules(session: &Session<'_>, ids: &[String]) -> Result<Artifact<DeleteResult>> {
    if ids.is_empty() {
        return Err(IomError::validation("delete", "no rule ids given"));
    }
    let mut deleted_rule_ids = Vec::new();
    let mut result = Vec::new();
    let mut failed = Vec::new();
    for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
        match session
            .api
            .delete_rules(chunk)
            .and_then(|response| response.into_resources())
        {
            Ok(resources) => {
                deleted_rule_ids.extend_from_slice(chunk);
                result.extend(resources);
            }
            Err(e) => {
                tracing::warn!(count = chunk.len(), error = %e, "delete chunk failed");
                failed.push(FailedDelete {
                    rule_ids: chunk.to_vec(),
                    error: e.to_string(),
                });
            }
        }
    }
    tracing::info!(
        deleted = deleted_rule_ids.len(),
        failed = ids.len() - deleted_rule_ids.len(),
        "deleted rules"
    );
    session.save(
        "deleted-rules-result.json",
        DeleteResult {
            deleted_rule_ids,
            result,
            failed,
            timestamp: timestamp(),
        },
    )
}

/// Input schema for the resource type of the rule in `config`.
/// Writes `schema-<provider>-<type>.json`.
pub fn rule_schema(session: &Session<'_>, config: &Path) -> Result<Artifact<Vec<Value>>> {
    let valid = load_and_validate(config)?;
    let rule = &valid.document.rule;
    let provider = rule.cloud_provider();
    fetch_schema(session, &provider, &rule.resource_type, None)
}

/// Fetch one input schema and save it, by default under its canonical name.
pub fn fetch_schema(
    session: &Session<'_>,
    provider: &CloudProvider,
    resource_type: &str,
    output: Option<PathBuf>,
) -> Result<Artifact<Vec<Value>>> {
    let request = SchemaRequest::iom(provider.api_name(), resource_type);
    let response = session.api.get_input_schema(&request)?;
    if response.is_not_found_signal() {
        return Err(IomError::NotFound(format!(
            "no input schema for {provider} resource type '{resource_type}'"
        )));
    }
    let schema = response.into_resources()?;
    if schema.is_empty() {
        return Err(IomError::NotFound(format!(
            "no input schema for {provider} resource type '{resource_type}'"
        )));
    }
    let path =
        output.unwrap_or_else(|| session.artifact_path(&schema_file_name(provider, resource_type)));
    save(path, schema)
}

#[derive(Debug, Clone, Default)]
pub struct ResourceIdQuery {
    pub provider: Option<CloudProvider>,
    pub resource_type: Option<String>,
    pub filter: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct ResourceIds {
    pub ids: Artifact<Vec<String>>,
    /// Details of the first id, when there is one.
    pub sample: Option<Artifact<Vec<Value>>>,
}

/// Resource ids for building test fixtures. Writes `resource-ids.json`, then
/// details of the first id to `sample-resource-details.json` when they can
/// be fetched.
pub fn resource_ids(session: &Session<'_>, query: &ResourceIdQuery) -> Result<ResourceIds> {
    let provider = query.provider.as_ref().map(CloudProvider::api_name);
    let filter = combined_filter(
        provider.as_deref(),
        query.resource_type.as_deref(),
        query.filter.as_deref(),
    );
    tracing::debug!(filter = filter.as_deref().unwrap_or(""), "querying resource ids");
    let ids = session
        .api
        .list_resources(&ListQuery::new(filter, query.limit))?
        .into_ids()?;
    let ids = session.save("resource-ids.json", ids)?;

    let sample = match ids.value.first() {
        Some(first) => sample_details(session, first)?,
        None => None,
    };
    Ok(ResourceIds { ids, sample })
}

/// Details of one resource, best effort: a failed lookup only warns.
fn sample_details(session: &Session<'_>, id: &str) -> Result<Option<Artifact<Vec<Value>>>> {
    let details = session
        .api
        .get_resource_details(&[id.to_string()])
        .and_then(|response| response.into_resources());
    match details {
        Ok(details) => Ok(Some(session.save("sample-resource-details.json", details)?)),
        Err(e) => {
            tracing::warn!(resource_id = id, error = %e, "could not fetch sample resource details");
            Ok(None)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedRule {
    pub name: String,
    pub uuid: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedExport {
    pub name: String,
    pub uuid: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub total_rules: usize,
    pub exported: usize,
    pub failed: usize,
    pub output_directory: PathBuf,
    pub exported_rules: Vec<ExportedRule>,
    pub failed_exports: Vec<FailedExport>,
    pub timestamp: String,
}

fn export_rule(rule: &ExistingRule, dir: &Path) -> Result<PathBuf> {
    let yaml = serde_yaml::to_string(&rule.to_document())?;
    let path = unique_path(dir, &slug(&rule.name), "yaml");
    std::fs::write(&path, yaml)?;
    Ok(path)
}

/// Re-export backend rules as rule files in `dir`, one per rule. Colliding
/// names get a numeric suffix. Writes `export-summary.json` into `dir`.
pub fn export_all(
    session: &Session<'_>,
    dir: &Path,
    filter: Option<&str>,
    limit: usize,
) -> Result<Artifact<ExportSummary>> {
    let ids = fetch_rule_ids(session, filter, limit)?;
    if ids.is_empty() {
        return Err(IomError::NotFound("no custom rules to export".into()));
    }
    let rules = fetch_rule_details(session.api, &ids)?;
    std::fs::create_dir_all(dir)?;

    let mut exported_rules = Vec::new();
    let mut failed_exports = Vec::new();
    for rule in &rules {
        match export_rule(rule, dir) {
            Ok(path) => exported_rules.push(ExportedRule {
                name: rule.name.clone(),
                uuid: rule.uuid.clone(),
                filename: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            }),
            Err(e) => {
                tracing::warn!(name = %rule.name, error = %e, "export failed");
                failed_exports.push(FailedExport {
                    name: rule.name.clone(),
                    uuid: rule.uuid.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    let summary = ExportSummary {
        total_rules: rules.len(),
        exported: exported_rules.len(),
        failed: failed_exports.len(),
        output_directory: dir.to_path_buf(),
        exported_rules,
        failed_exports,
        timestamp: timestamp(),
    };
    save(dir.join("export-summary.json"), summary)
}
