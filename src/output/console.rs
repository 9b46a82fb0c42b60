//! Plain-text renderings of command results for stdout.

use crate::ops::rules::{
    DeleteResult, ExportSummary, ReconcileReport, RuleTestReport, ValidationSummary,
};
use crate::ops::schemas::{ResourceTypeIndex, SchemaListing, SupportReport};
use crate::rules::{ExistingRule, ValidatedRule};
use crate::schema::compare::SchemaComparison;
use crate::schema::validate::SchemaValidationReport;
use crate::schema::SchemaFile;
use crate::workflow::ReconcileStatus;

/// Items shown before a list is cut off with "... and N more".
const LIST_PREVIEW: usize = 10;

fn more_line(output: &mut String, total: usize, shown: usize) {
    if total > shown {
        output.push_str(&format!("    ... and {} more\n", total - shown));
    }
}

/// Summary of one rule file that passed validation.
pub fn validated_rule(valid: &ValidatedRule) -> String {
    let rule = &valid.document.rule;
    let mut output = format!("\n  {} is valid\n\n", valid.source_name());
    output.push_str(&format!("  Name:          {}\n", rule.name));
    output.push_str(&format!("  Description:   {}\n", rule.description));
    output.push_str(&format!("  Resource type: {}\n", rule.resource_type));
    output.push_str(&format!("  Platform:      {}\n", rule.platform));
    output.push_str(&format!(
        "  Severity:      {} ({})\n",
        u8::from(rule.severity),
        rule.severity
    ));
    output.push_str(&format!("  Logic:         {} characters\n", rule.logic.len()));

    if let Some(testing) = &valid.document.testing {
        output.push_str(&format!(
            "  Test fixtures: {} sample resource id(s)\n",
            testing.sample_resource_ids.len()
        ));
    }
    if let Some(metadata) = &valid.document.metadata {
        output.push_str(&format!(
            "  Version:       {}\n  Author:        {}\n",
            metadata.version.as_deref().unwrap_or("-"),
            metadata.author.as_deref().unwrap_or("-")
        ));
    }
    for warning in &valid.warnings {
        output.push_str(&format!("  warning: {warning}\n"));
    }
    output.push('\n');
    output
}

pub fn validation_summary(summary: &ValidationSummary) -> String {
    let mut output = format!(
        "\n  {} file(s): {} valid, {} invalid\n\n",
        summary.total_files, summary.valid, summary.invalid
    );
    for rule in &summary.valid_rules {
        output.push_str(&format!("  [OK]   {} ({})\n", rule.name, rule.file));
    }
    for rule in &summary.invalid_rules {
        output.push_str(&format!("  [FAIL] {}\n         {}\n", rule.file, rule.error));
    }
    if summary.halted {
        output.push_str("\n  Stopped at the first invalid file (use --continue-on-error to check all).\n");
    }
    output.push('\n');
    output
}

pub fn reconcile_summary(report: &ReconcileReport) -> String {
    let counts = &report.snapshot.counts;
    let mut output = format!(
        "\n  {} rule(s) for {}: {} created, {} updated, {} failed\n\n",
        report.snapshot.total, report.environment, counts.created, counts.updated, counts.failed
    );
    for item in &report.snapshot.items {
        let tag = match item.status {
            ReconcileStatus::Created => "[CREATED]",
            ReconcileStatus::Updated => "[UPDATED]",
            ReconcileStatus::Failed => "[FAILED] ",
        };
        let name = if item.name.is_empty() { &item.source } else { &item.name };
        output.push_str(&format!("  {tag} {name}"));
        if let Some(id) = &item.id {
            output.push_str(&format!(" ({id})"));
        }
        output.push('\n');
        if let Some(error) = &item.error {
            output.push_str(&format!("            {error}\n"));
        }
    }
    if report.halted {
        output.push_str("\n  Batch halted before its last rule.\n");
    }
    output.push('\n');
    output
}

pub fn rule_test(report: &RuleTestReport) -> String {
    let source = if report.discovered { "discovered" } else { "configured" };
    let mut output = format!(
        "\n  {} against {} {} resource(s) of {}\n\n",
        report.rule,
        report.resource_ids.len(),
        source,
        report.resource_type
    );
    for (id, result) in report.verdicts() {
        output.push_str(&format!("  {:<8} {id}\n", result.to_uppercase()));
    }
    output.push('\n');
    output
}

pub fn rule_details(rules: &[ExistingRule]) -> String {
    if rules.is_empty() {
        return "\n  No rules found.\n\n".to_string();
    }
    let mut output = String::from("\n");
    for rule in rules {
        output.push_str(&format!("  {} ({})\n", rule.name, rule.uuid));
        output.push_str(&format!(
            "    provider: {}  severity: {}  resource type: {}\n",
            if rule.provider.is_empty() { "-" } else { &rule.provider },
            rule.severity_level(),
            rule.primary_resource_type()
        ));
        output.push_str(&format!(
            "    created: {}\n",
            rule.created_at.as_deref().unwrap_or("-")
        ));
    }
    output.push('\n');
    output
}

/// A titled id list, cut off after `preview` entries.
pub fn id_list(title: &str, ids: &[String], preview: usize) -> String {
    if ids.is_empty() {
        return format!("\n  No {title} found.\n\n");
    }
    let mut output = format!("\n  {} {title}:\n", ids.len());
    for id in ids.iter().take(preview) {
        output.push_str(&format!("    {id}\n"));
    }
    more_line(&mut output, ids.len(), preview);
    output.push('\n');
    output
}

/// Deleted ids, then any chunk the backend refused.
pub fn delete_result(result: &DeleteResult) -> String {
    let mut output = id_list(
        "deleted rule(s)",
        &result.deleted_rule_ids,
        result.deleted_rule_ids.len(),
    );
    for failed in &result.failed {
        output.push_str(&format!(
            "  [FAILED] {} rule(s) not deleted: {}\n",
            failed.rule_ids.len(),
            failed.error
        ));
        for id in &failed.rule_ids {
            output.push_str(&format!("    {id}\n"));
        }
    }
    if !result.failed.is_empty() {
        output.push('\n');
    }
    output
}

pub fn export_summary(summary: &ExportSummary) -> String {
    let mut output = format!(
        "\n  Exported {} of {} rule(s) to {}\n\n",
        summary.exported,
        summary.total_rules,
        summary.output_directory.display()
    );
    for rule in summary.exported_rules.iter().take(LIST_PREVIEW) {
        output.push_str(&format!("    {} -> {}\n", rule.name, rule.filename));
    }
    more_line(&mut output, summary.exported_rules.len(), LIST_PREVIEW);
    for failed in &summary.failed_exports {
        output.push_str(&format!(
            "  [FAILED] {} ({}): {}\n",
            failed.name, failed.uuid, failed.error
        ));
    }
    output.push('\n');
    output
}

pub fn support_summary(report: &SupportReport) -> String {
    let counts = &report.snapshot.counts;
    let mut output = format!(
        "\n  {}: {} of {} resource type(s) supported ({:.1}%)\n",
        report.provider, counts.supported, report.snapshot.total, report.support_percentage
    );
    output.push_str(&format!(
        "  not supported: {}  errors: {}\n",
        counts.unsupported, counts.errors
    ));
    let mut errors: Vec<_> = report
        .snapshot
        .items
        .iter()
        .filter_map(|r| r.error.as_ref().map(|e| (&r.resource_type, e)))
        .collect();
    errors.sort();
    for (resource_type, error) in errors.iter().take(LIST_PREVIEW) {
        output.push_str(&format!("  [ERROR] {resource_type}: {error}\n"));
    }
    more_line(&mut output, errors.len(), LIST_PREVIEW);
    if report.cancelled {
        output.push_str("  Interrupted: some resource types were not probed.\n");
    }
    output.push('\n');
    output
}

pub fn resource_type_index(index: &ResourceTypeIndex) -> String {
    let mut output = format!(
        "\n  {} resource type(s) discovered: {} schema(s) saved, {} failed\n\n",
        index.total_discovered, index.successful_schemas, index.failed_schemas
    );
    let saved: Vec<_> = index
        .resource_types
        .iter()
        .filter(|e| e.schema_generated)
        .collect();
    for entry in saved.iter().take(LIST_PREVIEW) {
        output.push_str(&format!(
            "    {} {} -> {}\n",
            entry.provider,
            entry.resource_type,
            entry.filename.as_deref().unwrap_or("-")
        ));
    }
    more_line(&mut output, saved.len(), LIST_PREVIEW);
    for entry in index.resource_types.iter().filter(|e| !e.schema_generated) {
        output.push_str(&format!(
            "  [FAILED] {} {}: {}\n",
            entry.provider,
            entry.resource_type,
            entry.error.as_deref().unwrap_or("no schema")
        ));
    }
    output.push('\n');
    output
}

pub fn schema_summary(schema: &SchemaFile) -> String {
    format!(
        "\n  Resource type:        {}\n  Configuration fields: {}\n  File size:            {} bytes\n\n",
        schema.resource_type().unwrap_or("unknown"),
        schema.config_field_count(),
        schema.size
    )
}

pub fn schema_validation(report: &SchemaValidationReport) -> String {
    let mut output = format!(
        "\n  {} schema file(s): {} valid, {} invalid\n\n",
        report.total_files, report.valid, report.invalid
    );
    for invalid in &report.invalid_schemas {
        output.push_str(&format!(
            "  [INVALID] {}\n            {}\n",
            invalid.file.display(),
            invalid.error
        ));
    }
    output.push('\n');
    output
}

pub fn comparison(cmp: &SchemaComparison) -> String {
    let s = &cmp.summary;
    let mut output = format!(
        "\n  old: {}  new: {}\n  added: {}  removed: {}  modified: {}  unchanged: {}\n",
        s.old_count,
        s.new_count,
        s.added_count,
        s.removed_count,
        s.modified_count,
        s.unchanged_count
    );
    for file in &cmp.added {
        output.push_str(&format!("  + {file}\n"));
    }
    for file in &cmp.removed {
        output.push_str(&format!("  - {file}\n"));
    }
    for modified in &cmp.modified {
        output.push_str(&format!(
            "  ~ {} ({} -> {} bytes)\n",
            modified.file, modified.old_size, modified.new_size
        ));
    }
    output.push('\n');
    output
}

pub fn schema_listing(listing: &SchemaListing) -> String {
    if listing.is_empty() {
        return "\n  No schema files found.\n\n".to_string();
    }
    let mut output = String::new();
    for (provider, schemas) in &listing.groups {
        output.push_str(&format!("\n  {provider} schemas:\n"));
        for schema in schemas {
            output.push_str(&format!(
                "    {:<50} ({:>3} fields, {:>6.1} KB)\n",
                schema.resource_type,
                schema.config_fields,
                schema.size as f64 / 1024.0
            ));
        }
    }
    output.push_str(&format!(
        "\n  Total schemas: {}\n  Total size: {:.1} KB\n  Providers: {}\n\n",
        listing.total_schemas(),
        listing.total_size() as f64 / 1024.0,
        listing.groups.len()
    ));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::schemas::ListedSchema;
    use crate::ops::Environment;
    use crate::workflow::{ReconcileCounts, ReconciliationOutcome, Snapshot};

    #[test]
    fn delete_result_lists_refused_ids() {
        let result = DeleteResult {
            deleted_rule_ids: vec!["r1".into()],
            result: Vec::new(),
            failed: vec![crate::ops::rules::FailedDelete {
                rule_ids: vec!["r2".into()],
                error: "Transient error: HTTP 500: boom".into(),
            }],
            timestamp: "2026-01-01T00:00:00Z".into(),
        };
        let text = delete_result(&result);
        assert!(text.contains("1 deleted rule(s):"));
        assert!(text.contains("[FAILED] 1 rule(s) not deleted: Transient error: HTTP 500: boom"));
        assert!(text.contains("    r2\n"));
    }

    #[test]
    fn reconcile_summary_lists_each_item() {
        let report = ReconcileReport {
            snapshot: Snapshot {
                total: 2,
                counts: ReconcileCounts {
                    created: 1,
                    updated: 0,
                    failed: 1,
                },
                items: vec![
                    ReconciliationOutcome {
                        source: "rules/a.yaml".into(),
                        name: "R1".into(),
                        status: ReconcileStatus::Created,
                        id: Some("uuid-1".into()),
                        error: None,
                    },
                    ReconciliationOutcome {
                        source: "rules/b.yaml".into(),
                        name: String::new(),
                        status: ReconcileStatus::Failed,
                        id: None,
                        error: Some("missing required field 'rule.logic'".into()),
                    },
                ],
            },
            halted: false,
            environment: Environment::Staging,
            timestamp: "t".into(),
        };
        let text = reconcile_summary(&report);
        assert!(text.contains("2 rule(s) for staging: 1 created, 0 updated, 1 failed"));
        assert!(text.contains("[CREATED] R1 (uuid-1)"));
        assert!(text.contains("[FAILED]  rules/b.yaml"));
        assert!(!text.contains("halted"));
    }

    #[test]
    fn id_list_truncates() {
        let ids: Vec<String> = (0..7).map(|i| format!("id-{i}")).collect();
        let text = id_list("resource ids", &ids, 5);
        assert!(text.contains("7 resource ids:"));
        assert!(text.contains("id-4"));
        assert!(!text.contains("id-5"));
        assert!(text.contains("... and 2 more"));
        assert!(id_list("rules", &[], 5).contains("No rules found."));
    }

    #[test]
    fn listing_shows_sizes_in_kb() {
        let mut listing = SchemaListing::default();
        listing.groups.insert(
            "AWS".into(),
            vec![ListedSchema {
                file_name: "schema-aws-aws-ec2-instance.json".into(),
                resource_type: "AWS::EC2::Instance".into(),
                config_fields: 12,
                size: 2048,
            }],
        );
        let text = schema_listing(&listing);
        assert!(text.contains("AWS schemas:"));
        assert!(text.contains("( 12 fields,    2.0 KB)"));
        assert!(text.contains("Providers: 1"));
    }
}
