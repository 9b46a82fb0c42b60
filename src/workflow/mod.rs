//! The multi-step workflows behind the batch commands: paginated fetch,
//! concurrent support probing, create-or-update reconciliation, and the
//! aggregator that turns per-item outcomes into a report.

pub mod cancel;
pub mod paginate;
pub mod probe;
pub mod reconcile;
pub mod summary;

pub use cancel::CancelToken;
pub use paginate::{fetch_paginated, PageWindow};
pub use probe::{ProbeResult, ProbeRun, ProbeStatus, ProbeTarget, Prober, RetryPolicy};
pub use reconcile::{
    Desired, DesiredRule, FailurePolicy, ReconcileRun, ReconcileStatus, Reconciler,
    ReconciliationOutcome,
};
pub use summary::{Aggregator, Outcome, ReconcileCounts, Snapshot, SupportCounts};
