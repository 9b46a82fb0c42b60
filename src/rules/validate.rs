use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{load_document, RuleDocument};
use crate::error::{IomError, Result};

/// Every policy must open with this package declaration.
pub const REQUIRED_PACKAGE: &str = "package crowdstrike";

static DEFAULT_FAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*default\s+result\s*:?=\s*"fail""#).unwrap());

static PASS_CLAUSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*result\s*:?=\s*"pass""#).unwrap());

/// Non-fatal findings from checking policy logic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicCheck {
    pub warnings: Vec<String>,
}

/// Check policy-logic text. Missing package declaration is an error; a missing
/// default outcome or pass clause only warns.
pub fn check_logic(source_name: &str, logic: &str) -> Result<LogicCheck> {
    let trimmed = logic.trim();
    if trimmed.is_empty() {
        return Err(IomError::validation(source_name, "rule logic cannot be empty"));
    }
    if !trimmed.starts_with(REQUIRED_PACKAGE) {
        return Err(IomError::validation(
            source_name,
            format!("rule logic must start with '{REQUIRED_PACKAGE}'"),
        ));
    }

    let mut warnings = Vec::new();
    if !DEFAULT_FAIL_RE.is_match(logic) {
        warnings.push(r#"rule logic should include 'default result = "fail"'"#.to_string());
    }
    if !PASS_CLAUSE_RE.is_match(logic) {
        warnings.push(r#"rule logic should include a 'result = "pass"' condition"#.to_string());
    }
    Ok(LogicCheck { warnings })
}

/// Cross-field checks on an already-parsed document.
pub fn check_document(source_name: &str, document: &RuleDocument) -> Result<LogicCheck> {
    let rule = &document.rule;
    if rule.platform != rule.provider {
        return Err(IomError::validation(
            source_name,
            format!(
                "'platform' ({}) and 'provider' ({}) must have the same value",
                rule.platform, rule.provider
            ),
        ));
    }
    if rule.name.trim().is_empty() {
        return Err(IomError::validation(source_name, "'rule.name' cannot be empty"));
    }
    check_logic(source_name, &rule.logic)
}

/// A rule file that passed every hard check.
#[derive(Debug, Clone)]
pub struct ValidatedRule {
    pub source: PathBuf,
    pub document: RuleDocument,
    pub warnings: Vec<String>,
}

impl ValidatedRule {
    pub fn source_name(&self) -> String {
        self.source.display().to_string()
    }
}

pub fn load_and_validate(path: &Path) -> Result<ValidatedRule> {
    let document = load_document(path)?;
    let check = check_document(&path.display().to_string(), &document)?;
    for warning in &check.warnings {
        tracing::warn!(file = %path.display(), "{warning}");
    }
    Ok(ValidatedRule {
        source: path.to_path_buf(),
        document,
        warnings: check.warnings,
    })
}
