use std::collections::HashMap;

use serde::Serialize;

use super::summary::{Aggregator, Outcome, ReconcileCounts, Snapshot};
use super::CancelToken;
use crate::api::{CspmApi, NewRule, RulePatch};
use crate::error::{IomError, Result};
use crate::rules::RuleConfig;

/// What to do after an item fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failure; later items are left unprocessed.
    #[default]
    FailFast,
    /// Record the failure and move on.
    ContinueOnError,
}

impl FailurePolicy {
    pub fn from_flag(continue_on_error: bool) -> Self {
        if continue_on_error {
            Self::ContinueOnError
        } else {
            Self::FailFast
        }
    }
}

#[derive(Debug, Clone)]
pub struct DesiredRule {
    /// Where the rule came from, usually a file path.
    pub source: String,
    pub rule: RuleConfig,
}

/// One entry of the desired-state batch. Files that failed to load are kept
/// so they show up in the summary.
#[derive(Debug, Clone)]
pub enum Desired {
    Valid(DesiredRule),
    Invalid { source: String, error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileStatus {
    Created,
    Updated,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationOutcome {
    pub source: String,
    pub name: String,
    pub status: ReconcileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReconciliationOutcome {
    fn failed(source: &str, name: &str, id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            name: name.to_string(),
            status: ReconcileStatus::Failed,
            id,
            error: Some(error.into()),
        }
    }
}

impl Outcome for ReconciliationOutcome {
    type Counts = ReconcileCounts;

    fn tally(&self, counts: &mut ReconcileCounts) {
        match self.status {
            ReconcileStatus::Created => counts.created += 1,
            ReconcileStatus::Updated => counts.updated += 1,
            ReconcileStatus::Failed => counts.failed += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileRun {
    pub snapshot: Snapshot<ReconciliationOutcome>,
    /// True when the batch stopped before its last item.
    pub halted: bool,
}

impl ReconcileRun {
    pub fn is_clean(&self) -> bool {
        !self.halted && self.snapshot.counts.failed == 0
    }
}

/// Converges backend rules to a desired-state batch by create-or-update.
/// Never deletes.
pub struct Reconciler<'a> {
    api: &'a dyn CspmApi,
    policy: FailurePolicy,
    cancel: Option<CancelToken>,
}

impl<'a> Reconciler<'a> {
    pub fn new(api: &'a dyn CspmApi, policy: FailurePolicy) -> Self {
        Self {
            api,
            policy,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Process `desired` in order against `observed` (name to rule id).
    ///
    /// Every create registers its new id in `observed`, so a later item with
    /// the same name becomes an update of the rule just created.
    pub fn run(
        &self,
        desired: Vec<Desired>,
        observed: &mut HashMap<String, String>,
    ) -> ReconcileRun {
        let aggregator = Aggregator::new();
        let total = desired.len();
        let mut halted = false;

        for (index, item) in desired.into_iter().enumerate() {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                tracing::warn!(remaining = total - index, "reconcile interrupted");
                halted = true;
                break;
            }

            let outcome = match item {
                Desired::Valid(desired) => self.apply(&desired, observed),
                Desired::Invalid { source, error } => {
                    ReconciliationOutcome::failed(&source, "", None, error)
                }
            };
            let failed = outcome.status == ReconcileStatus::Failed;
            if failed {
                tracing::warn!(
                    source = %outcome.source,
                    name = %outcome.name,
                    error = outcome.error.as_deref().unwrap_or(""),
                    "rule failed"
                );
            }
            aggregator.record(outcome);

            if failed && self.policy == FailurePolicy::FailFast {
                halted = index + 1 < total;
                break;
            }
        }

        ReconcileRun {
            snapshot: aggregator.finish(),
            halted,
        }
    }

    fn apply(
        &self,
        desired: &DesiredRule,
        observed: &mut HashMap<String, String>,
    ) -> ReconciliationOutcome {
        let rule = &desired.rule;
        match observed.get(&rule.name).cloned() {
            Some(id) => match self.update(&id, rule) {
                Ok(()) => {
                    tracing::info!(name = %rule.name, id = %id, "updated rule");
                    ReconciliationOutcome {
                        source: desired.source.clone(),
                        name: rule.name.clone(),
                        status: ReconcileStatus::Updated,
                        id: Some(id),
                        error: None,
                    }
                }
                Err(e) => ReconciliationOutcome::failed(
                    &desired.source,
                    &rule.name,
                    Some(id),
                    e.to_string(),
                ),
            },
            None => match self.create(rule) {
                Ok(id) => {
                    tracing::info!(name = %rule.name, id = %id, "created rule");
                    observed.insert(rule.name.clone(), id.clone());
                    ReconciliationOutcome {
                        source: desired.source.clone(),
                        name: rule.name.clone(),
                        status: ReconcileStatus::Created,
                        id: Some(id),
                        error: None,
                    }
                }
                Err(e) => ReconciliationOutcome::failed(
                    &desired.source,
                    &rule.name,
                    None,
                    e.to_string(),
                ),
            },
        }
    }

    fn create(&self, rule: &RuleConfig) -> Result<String> {
        let resources = self.api.create_rule(&NewRule::from(rule))?.into_resources()?;
        resources
            .first()
            .and_then(|r| r.get("uuid"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| IomError::Internal("create returned no rule id".into()))
    }

    fn update(&self, id: &str, rule: &RuleConfig) -> Result<()> {
        let resources = self
            .api
            .update_rule(&RulePatch::from_config(id, rule))?
            .into_resources()?;
        if resources.is_empty() {
            return Err(IomError::Internal("update returned no rule".into()));
        }
        Ok(())
    }
}
