//! Collectors for VM inventory, cost and utilization
//!
//! Each collector turns raw Azure payloads into the typed samples in
//! [`crate::models`]. Per-item failures are kept as data in a [`Collection`]
//! instead of aborting the whole collection.

mod cost;
mod inventory;
mod utilization;


pub use cost::{
    normalize_rows, CostCollector, CostColumn, CostQueryProperties, CostQueryResponse,
    COST_WINDOW_DAYS,
};
pub use inventory::{ArmVirtualMachine, InventoryCollector};
pub use utilization::{
    normalize_metrics, MetricsResponse, UtilizationCollector, DEFAULT_UTILIZATION_WINDOW_DAYS,
};

use std::collections::HashMap;

/// Outcome of looking up one item in a joined source
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Value(T),
    /// The source answered but had nothing for this item
    NoData,
    /// The source call failed
    Failed(String),
}

impl<T> Fetched<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Fetched::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Result of one collector run, keyed by lower-cased resource id
#[derive(Debug, Clone)]
pub struct Collection<T> {
    pub samples: HashMap<String, T>,
    /// Items whose individual request failed
    pub failures: HashMap<String, String>,
    /// Set when a failure affects every item not in `samples`
    pub batch_failure: Option<String>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            samples: HashMap::new(),
            failures: HashMap::new(),
            batch_failure: None,
        }
    }
}

impl<T> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A collection where the single batch request failed
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            batch_failure: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn insert(&mut self, key: String, sample: T) {
        self.failures.remove(&key);
        self.samples.insert(key, sample);
    }

    pub fn record_failure(&mut self, key: String, reason: impl Into<String>) {
        if !self.samples.contains_key(&key) {
            self.failures.insert(key, reason.into());
        }
    }

    /// Look up the sample for a join key
    pub fn lookup(&self, key: &str) -> Fetched<&T> {
        if let Some(sample) = self.samples.get(key) {
            return Fetched::Value(sample);
        }
        if let Some(reason) = self.failures.get(key) {
            return Fetched::Failed(reason.clone());
        }
        if let Some(reason) = &self.batch_failure {
            return Fetched::Failed(reason.clone());
        }
        Fetched::NoData
    }

    /// Whether any item is affected by a failure
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty() || self.batch_failure.is_some()
    }
}
