use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;

use super::summary::{Aggregator, Outcome, Snapshot, SupportCounts};
use super::CancelToken;
use crate::api::{CspmApi, SchemaRequest};
use crate::config::ProbeConfig;
use crate::error::{IomError, Result};
use crate::output::{json::write_json, naming::schema_file_name};
use crate::progress::ProgressTracker;
use crate::rules::CloudProvider;

/// One (provider, resource type) pair to check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProbeTarget {
    pub provider: CloudProvider,
    pub resource_type: String,
}

impl ProbeTarget {
    pub fn new(provider: CloudProvider, resource_type: impl Into<String>) -> Self {
        Self {
            provider,
            resource_type: resource_type.into(),
        }
    }
}

/// Bounded retry with exponential backoff for transient failures only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ProbeConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    /// Delay before retry number `retry` (0 for the first retry):
    /// `base * 2^retry` plus jitter drawn from `[0, base)`.
    ///
    /// The jitter stays below `base`, so delays grow strictly with `retry`
    /// whenever `base` is non-zero.
    pub fn backoff(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp = base_ms.saturating_mul(1u64 << retry.min(20));
        let jitter = if base_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..base_ms)
        };
        Duration::from_millis(exp.saturating_add(jitter))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Supported,
    NotSupported,
    Error,
}

/// Outcome of probing one resource type.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub provider: CloudProvider,
    pub resource_type: String,
    pub status: ProbeStatus,
    pub supported: bool,
    /// Schema payload; cleared once persisted so reports stay small.
    #[serde(skip)]
    pub schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

impl ProbeResult {
    fn new(target: &ProbeTarget, status: ProbeStatus, attempts: u32) -> Self {
        Self {
            provider: target.provider.clone(),
            resource_type: target.resource_type.clone(),
            status,
            supported: status == ProbeStatus::Supported,
            schema: None,
            schema_file: None,
            error: None,
            attempts,
        }
    }
}

impl Outcome for ProbeResult {
    type Counts = SupportCounts;

    fn tally(&self, counts: &mut SupportCounts) {
        match self.status {
            ProbeStatus::Supported => counts.supported += 1,
            ProbeStatus::NotSupported => counts.unsupported += 1,
            ProbeStatus::Error => counts.errors += 1,
        }
    }
}

/// Result of a full probe run.
#[derive(Debug, Clone)]
pub struct ProbeRun {
    pub snapshot: Snapshot<ProbeResult>,
    /// True when an interrupt stopped the run before every target was probed.
    pub cancelled: bool,
}

/// Runs schema probes on a fixed-size worker pool.
pub struct Prober<'a> {
    api: &'a dyn CspmApi,
    workers: usize,
    retry: RetryPolicy,
    schema_dir: Option<PathBuf>,
    cancel: Option<CancelToken>,
}

impl<'a> Prober<'a> {
    pub fn new(api: &'a dyn CspmApi, workers: usize, retry: RetryPolicy) -> Self {
        Self {
            api,
            workers: workers.max(1),
            retry,
            schema_dir: None,
            cancel: None,
        }
    }

    /// Persist each supported schema under `dir`.
    pub fn with_schema_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.schema_dir = Some(dir.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Probe one target, retrying transient failures.
    pub fn probe(&self, target: &ProbeTarget) -> ProbeResult {
        let request = SchemaRequest::iom(target.provider.api_name(), &target.resource_type);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let err = match self.api.get_input_schema(&request) {
                Ok(resp) if resp.is_success() => {
                    return match resp.into_resources() {
                        Ok(resources) if !resources.is_empty() => {
                            let mut result =
                                ProbeResult::new(target, ProbeStatus::Supported, attempts);
                            result.schema = Some(Value::Array(resources));
                            result
                        }
                        Ok(_) => ProbeResult::new(target, ProbeStatus::NotSupported, attempts),
                        Err(e) => {
                            let mut result =
                                ProbeResult::new(target, ProbeStatus::Error, attempts);
                            result.error = Some(e.to_string());
                            result
                        }
                    };
                }
                Ok(resp) if resp.is_not_found_signal() => {
                    return ProbeResult::new(target, ProbeStatus::NotSupported, attempts);
                }
                Ok(resp) => IomError::from_status(resp.status, resp.error_message()),
                Err(e) => e,
            };

            if err.is_transient() && attempts < self.retry.max_attempts && !self.is_cancelled() {
                let delay = self.retry.backoff(attempts - 1);
                tracing::warn!(
                    resource_type = %target.resource_type,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient probe failure, retrying"
                );
                std::thread::sleep(delay);
                continue;
            }

            let mut result = ProbeResult::new(target, ProbeStatus::Error, attempts);
            result.error = Some(err.to_string());
            return result;
        }
    }

    fn persist(&self, result: &mut ProbeResult) {
        let Some(dir) = &self.schema_dir else {
            return;
        };
        let Some(schema) = result.schema.take() else {
            return;
        };
        let path = dir.join(schema_file_name(&result.provider, &result.resource_type));
        match write_json(&path, &schema) {
            Ok(()) => result.schema_file = Some(path),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to save schema");
                result.error = Some(format!("failed to save schema: {e}"));
            }
        }
    }

    /// Probe every target with at most `workers` probes in flight.
    ///
    /// Results arrive in completion order. Each worker persists its own
    /// schema before recording the outcome.
    pub fn run(&self, targets: &[ProbeTarget], progress: &dyn ProgressTracker) -> Result<ProbeRun> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("probe-{i}"))
            .build()
            .map_err(|e| IomError::Internal(format!("failed to start probe workers: {e}")))?;

        let aggregator = Aggregator::new();
        let skipped = AtomicBool::new(false);
        progress.set_length(targets.len() as u64);

        pool.install(|| {
            targets.par_iter().with_max_len(1).for_each(|target| {
                if self.is_cancelled() {
                    skipped.store(true, Ordering::Relaxed);
                    return;
                }
                let mut result = self.probe(target);
                self.persist(&mut result);
                tracing::debug!(
                    resource_type = %result.resource_type,
                    status = ?result.status,
                    attempts = result.attempts,
                    "probe finished"
                );
                aggregator.record(result);
                progress.increment(1);
            });
        });

        let snapshot = aggregator.finish();
        progress.finish_with_message(&format!(
            "{} of {} supported",
            snapshot.counts.supported, snapshot.total
        ));
        Ok(ProbeRun {
            snapshot,
            cancelled: skipped.load(Ordering::Relaxed),
        })
    }
}
