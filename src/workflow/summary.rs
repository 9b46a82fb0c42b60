use std::sync::{Mutex, PoisonError};

use serde::Serialize;

/// A per-item result the aggregator knows how to count.
pub trait Outcome: Clone + Send + std::fmt::Debug {
    type Counts: Default + Clone + std::fmt::Debug + Serialize + Send;

    /// Add this outcome to the running totals.
    fn tally(&self, counts: &mut Self::Counts);
}

/// Serializable view of an aggregator: totals plus itemized outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot<T: Outcome + Serialize> {
    pub total: usize,
    #[serde(flatten)]
    pub counts: T::Counts,
    pub items: Vec<T>,
}

impl<T: Outcome + Serialize> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            total: 0,
            counts: T::Counts::default(),
            items: Vec::new(),
        }
    }
}

struct Inner<T: Outcome> {
    counts: T::Counts,
    items: Vec<T>,
}

/// Collects outcomes from one or more threads.
///
/// The lock is held only while appending one finished outcome or copying the
/// current state, so it is never held across a network call.
pub struct Aggregator<T: Outcome> {
    inner: Mutex<Inner<T>>,
}

impl<T: Outcome + Serialize> Aggregator<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                counts: T::Counts::default(),
                items: Vec::new(),
            }),
        }
    }

    pub fn record(&self, outcome: T) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        outcome.tally(&mut inner.counts);
        inner.items.push(outcome);
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consistent copy of the current state; safe to call mid-run.
    pub fn snapshot(&self) -> Snapshot<T> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Snapshot {
            total: inner.items.len(),
            counts: inner.counts.clone(),
            items: inner.items.clone(),
        }
    }

    /// Final snapshot. Consumes the aggregator so nothing can be recorded after.
    pub fn finish(self) -> Snapshot<T> {
        let inner = self
            .inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        Snapshot {
            total: inner.items.len(),
            counts: inner.counts,
            items: inner.items,
        }
    }
}

impl<T: Outcome + Serialize> Default for Aggregator<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCounts {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SupportCounts {
    pub supported: usize,
    pub unsupported: usize,
    pub errors: usize,
}

impl SupportCounts {
    /// Supported share of all probed types, in percent.
    pub fn support_percentage(&self) -> f64 {
        let total = self.supported + self.unsupported + self.errors;
        if total == 0 {
            0.0
        } else {
            self.supported as f64 * 100.0 / total as f64
        }
    }
}
