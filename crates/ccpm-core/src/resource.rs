//! Resource entity: a constrained capacity shared across tasks.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::TaskId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    #[error("resource id cannot be empty")]
    EmptyId,
    #[error("resource name cannot be empty")]
    EmptyName,
    #[error("resource capacity must be positive, got {0}")]
    NonPositiveCapacity(f64),
}

/// A named capacity (a person, a machine, a team) that tasks draw from.
/// Allocation tracking here is advisory/reporting-only: the leveller resolves
/// conflicts through the critical-chain priority graph, not through this map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub capacity: f64,
    /// Reported allocation fraction per task, per date. Advisory only — see
    /// Open Question 3 in SPEC_FULL.md.
    pub allocations: BTreeMap<NaiveDate, BTreeMap<TaskId, f64>>,
}

impl Resource {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Result<Self, ResourceError> {
        Self::with_capacity(id, name, 1.0)
    }

    pub fn with_capacity(
        id: impl Into<String>,
        name: impl Into<String>,
        capacity: f64,
    ) -> Result<Self, ResourceError> {
        let id = id.into();
        let name = name.into();
        if id.trim().is_empty() {
            return Err(ResourceError::EmptyId);
        }
        if name.trim().is_empty() {
            return Err(ResourceError::EmptyName);
        }
        if capacity <= 0.0 {
            return Err(ResourceError::NonPositiveCapacity(capacity));
        }
        Ok(Self {
            id,
            name,
            capacity,
            allocations: BTreeMap::new(),
        })
    }

    /// Record an advisory allocation fraction for `task_id` on `date`. Does
    /// not enforce capacity; this is a reporting aid only.
    pub fn record_allocation(&mut self, date: NaiveDate, task_id: impl Into<TaskId>, fraction: f64) {
        self.allocations
            .entry(date)
            .or_default()
            .insert(task_id.into(), fraction);
    }

    /// Sum of reported allocation fractions on `date`, for reporting whether
    /// a resource looks over-committed. Not used by the leveller itself.
    pub fn allocated_fraction(&self, date: NaiveDate) -> f64 {
        self.allocations
            .get(&date)
            .map(|tasks| tasks.values().sum())
            .unwrap_or(0.0)
    }

    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("Resource serializes infallibly")
    }

    pub fn from_dict(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
