//! Task entity: the unit of work scheduled by the engine.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ChainKind, ResourceId, TaskId};

/// Lifecycle state of a task.
///
/// Transitions: `Planned -> InProgress -> {Completed, OnHold, Cancelled}`,
/// `OnHold -> InProgress`. `Completed` and `Cancelled` are terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    Planned,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Planned => "planned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::OnHold => "on_hold",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// One entry in a task's progress history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub date: NaiveDate,
    pub remaining: i64,
    pub status: TaskStatus,
    pub status_change: Option<String>,
    pub note: Option<String>,
}

/// The three input shapes a caller may provide for a task's resource demand;
/// all normalize to a `ResourceId -> units` map at construction time.
#[derive(Clone, Debug)]
pub enum ResourceInput {
    Single(String),
    List(Vec<String>),
    Map(BTreeMap<String, f64>),
}

impl From<&str> for ResourceInput {
    fn from(value: &str) -> Self {
        ResourceInput::Single(value.to_string())
    }
}

impl From<String> for ResourceInput {
    fn from(value: String) -> Self {
        ResourceInput::Single(value)
    }
}

impl From<Vec<&str>> for ResourceInput {
    fn from(value: Vec<&str>) -> Self {
        ResourceInput::List(value.into_iter().map(String::from).collect())
    }
}

impl From<BTreeMap<String, f64>> for ResourceInput {
    fn from(value: BTreeMap<String, f64>) -> Self {
        ResourceInput::Map(value)
    }
}

impl ResourceInput {
    fn normalize(self) -> BTreeMap<ResourceId, f64> {
        match self {
            ResourceInput::Single(id) => BTreeMap::from([(id, 1.0)]),
            ResourceInput::List(ids) => ids.into_iter().map(|id| (id, 1.0)).collect(),
            ResourceInput::Map(map) => map,
        }
    }
}

/// Errors raised validating a task's construction or a state transition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error("task id cannot be empty")]
    EmptyId,
    #[error("task name cannot be empty")]
    EmptyName,
    #[error("aggressive duration must be positive, got {0}")]
    NonPositiveAggressive(i64),
    #[error("safe duration {safe} must be >= aggressive duration {aggressive}")]
    SafeLessThanAggressive { safe: i64, aggressive: i64 },
    #[error("cannot {action} task {task_id} in status {status}")]
    InvalidTransition {
        task_id: TaskId,
        status: TaskStatus,
        action: &'static str,
    },
    #[error("remaining duration cannot be negative, got {0}")]
    NegativeRemaining(i64),
}

/// A unit of work: the node of the dependency graph the engine schedules.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,

    pub aggressive_duration: i64,
    pub safe_duration: i64,
    pub planned_duration: i64,

    pub dependencies: Vec<TaskId>,
    pub resources: BTreeMap<ResourceId, f64>,
    pub tags: std::collections::BTreeSet<String>,

    pub status: TaskStatus,

    pub early_start: Option<i64>,
    pub early_finish: Option<i64>,
    pub late_start: Option<i64>,
    pub late_finish: Option<i64>,
    pub slack: Option<i64>,

    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub new_start_date: Option<NaiveDate>,
    pub new_end_date: Option<NaiveDate>,
    pub actual_start_date: Option<NaiveDate>,
    pub actual_end_date: Option<NaiveDate>,

    pub remaining_duration: i64,
    pub original_duration: Option<i64>,

    pub chain_id: Option<String>,
    pub chain_kind: ChainKind,

    pub history: Vec<ProgressEvent>,
}

impl Task {
    /// Create a new planned task. `safe` defaults to `ceil(aggressive * 1.5)`
    /// when not overridden by [`Task::safe_duration`].
    pub fn new(
        id: impl Into<TaskId>,
        name: impl Into<String>,
        aggressive_duration: i64,
    ) -> Result<Self, TaskError> {
        let id = id.into();
        let name = name.into();
        if id.trim().is_empty() {
            return Err(TaskError::EmptyId);
        }
        if name.trim().is_empty() {
            return Err(TaskError::EmptyName);
        }
        if aggressive_duration <= 0 {
            return Err(TaskError::NonPositiveAggressive(aggressive_duration));
        }

        let safe_duration = ((aggressive_duration as f64) * 1.5).ceil() as i64;

        Ok(Self {
            id,
            name,
            aggressive_duration,
            safe_duration,
            planned_duration: aggressive_duration,
            dependencies: Vec::new(),
            resources: BTreeMap::new(),
            tags: std::collections::BTreeSet::new(),
            status: TaskStatus::Planned,
            early_start: None,
            early_finish: None,
            late_start: None,
            late_finish: None,
            slack: None,
            start_date: None,
            end_date: None,
            new_start_date: None,
            new_end_date: None,
            actual_start_date: None,
            actual_end_date: None,
            remaining_duration: aggressive_duration,
            original_duration: None,
            chain_id: None,
            chain_kind: ChainKind::None,
            history: Vec::new(),
        })
    }

    /// Override the safe (conservative) duration estimate. Must be `>= aggressive`.
    pub fn safe_duration(mut self, safe: i64) -> Result<Self, TaskError> {
        if safe < self.aggressive_duration {
            return Err(TaskError::SafeLessThanAggressive {
                safe,
                aggressive: self.aggressive_duration,
            });
        }
        self.safe_duration = safe;
        Ok(self)
    }

    pub fn depends_on(mut self, dep: impl Into<TaskId>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    pub fn depends_on_all(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies.extend(deps);
        self
    }

    /// Attach a resource demand, normalizing any of the three accepted input
    /// shapes into the `ResourceId -> units` map.
    pub fn resources(mut self, input: impl Into<ResourceInput>) -> Self {
        self.resources.extend(input.into().normalize());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn is_container(&self) -> bool {
        false
    }

    /// Begin work on this task. Valid from `Planned` or `OnHold`. Freezes
    /// `original_duration` the first time a task starts, and resolves the
    /// actual-start-date ambiguity the source left unresolved: use the
    /// scheduled start when the status date has reached it, else the status
    /// date itself.
    pub fn start(
        &mut self,
        status_date: NaiveDate,
        scheduled_start: Option<NaiveDate>,
    ) -> Result<(), TaskError> {
        if !matches!(self.status, TaskStatus::Planned | TaskStatus::OnHold) {
            return Err(TaskError::InvalidTransition {
                task_id: self.id.clone(),
                status: self.status,
                action: "start",
            });
        }
        if self.original_duration.is_none() {
            self.original_duration = Some(self.planned_duration);
        }
        let actual_start = match scheduled_start {
            Some(scheduled) if status_date >= scheduled => scheduled,
            _ => status_date,
        };
        self.actual_start_date = Some(actual_start);
        self.status = TaskStatus::InProgress;
        self.history.push(ProgressEvent {
            date: status_date,
            remaining: self.remaining_duration,
            status: self.status,
            status_change: Some("started".to_string()),
            note: None,
        });
        Ok(())
    }

    /// Report progress. Requires `InProgress`. A remaining duration of zero
    /// completes the task.
    pub fn update_progress(
        &mut self,
        remaining: i64,
        status_date: NaiveDate,
    ) -> Result<(), TaskError> {
        if self.status != TaskStatus::InProgress {
            return Err(TaskError::InvalidTransition {
                task_id: self.id.clone(),
                status: self.status,
                action: "update progress on",
            });
        }
        if remaining < 0 {
            return Err(TaskError::NegativeRemaining(remaining));
        }

        self.remaining_duration = remaining;

        let status_change = if remaining == 0 {
            self.status = TaskStatus::Completed;
            self.actual_end_date = Some(status_date);
            self.new_end_date = Some(status_date);
            Some("completed".to_string())
        } else {
            let expected_end = status_date + chrono::Duration::days(remaining);
            self.new_end_date = Some(expected_end);
            None
        };

        self.history.push(ProgressEvent {
            date: status_date,
            remaining,
            status: self.status,
            status_change,
            note: None,
        });
        Ok(())
    }

    pub fn hold(&mut self) -> Result<(), TaskError> {
        if self.status != TaskStatus::InProgress {
            return Err(TaskError::InvalidTransition {
                task_id: self.id.clone(),
                status: self.status,
                action: "hold",
            });
        }
        self.status = TaskStatus::OnHold;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), TaskError> {
        if matches!(self.status, TaskStatus::Completed | TaskStatus::Cancelled) {
            return Err(TaskError::InvalidTransition {
                task_id: self.id.clone(),
                status: self.status,
                action: "cancel",
            });
        }
        self.status = TaskStatus::Cancelled;
        Ok(())
    }

    pub fn is_critical(&self) -> bool {
        self.chain_kind == ChainKind::Critical
    }

    /// Percent complete derived from `original_duration`/`remaining_duration`,
    /// 0 before the task has a frozen original duration.
    pub fn percent_complete(&self) -> f64 {
        match self.original_duration {
            Some(original) if original > 0 => {
                let done = (original - self.remaining_duration).max(0) as f64;
                (done / original as f64 * 100.0).min(100.0)
            }
            _ => 0.0,
        }
    }

    /// Serialize to the canonical JSON representation (`toDict`).
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("Task serializes infallibly")
    }

    /// Deserialize from the canonical JSON representation (`fromDict`).
    pub fn from_dict(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults_safe_to_one_point_five_times_aggressive() {
        let t = Task::new("t1", "Design", 10).unwrap();
        assert_eq!(t.safe_duration, 15);
        assert_eq!(t.planned_duration, 10);
        assert_eq!(t.remaining_duration, 10);
        assert_eq!(t.status, TaskStatus::Planned);
    }

    #[test]
    fn new_rejects_empty_id_and_nonpositive_aggressive() {
        assert_eq!(Task::new("", "x", 1).unwrap_err(), TaskError::EmptyId);
        assert_eq!(
            Task::new("t", "x", 0).unwrap_err(),
            TaskError::NonPositiveAggressive(0)
        );
    }

    #[test]
    fn safe_duration_override_rejects_below_aggressive() {
        let t = Task::new("t1", "Design", 10).unwrap();
        let err = t.safe_duration(5).unwrap_err();
        assert_eq!(
            err,
            TaskError::SafeLessThanAggressive {
                safe: 5,
                aggressive: 10
            }
        );
    }

    #[test]
    fn resources_normalizes_all_three_shapes() {
        let single = Task::new("t1", "A", 1).unwrap().resources("dev");
        assert_eq!(single.resources.get("dev"), Some(&1.0));

        let list = Task::new("t2", "B", 1)
            .unwrap()
            .resources(vec!["dev", "qa"]);
        assert_eq!(list.resources.len(), 2);

        let mut map = BTreeMap::new();
        map.insert("dev".to_string(), 0.5);
        let mapped = Task::new("t3", "C", 1).unwrap().resources(map);
        assert_eq!(mapped.resources.get("dev"), Some(&0.5));
    }

    #[test]
    fn start_freezes_original_duration_and_uses_scheduled_start_rule() {
        let mut t = Task::new("t1", "A", 10).unwrap();
        let scheduled = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        let status_date = NaiveDate::from_ymd_opt(2026, 1, 12).unwrap();
        t.start(status_date, Some(scheduled)).unwrap();
        assert_eq!(t.status, TaskStatus::InProgress);
        assert_eq!(t.original_duration, Some(10));
        assert_eq!(t.actual_start_date, Some(scheduled));

        let mut t2 = Task::new("t2", "A", 10).unwrap();
        let scheduled = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap();
        let status_date = NaiveDate::from_ymd_opt(2026, 1, 12).unwrap();
        t2.start(status_date, Some(scheduled)).unwrap();
        assert_eq!(t2.actual_start_date, Some(status_date));
    }

    #[test]
    fn update_progress_completes_at_zero_remaining() {
        let mut t = Task::new("t1", "A", 10).unwrap();
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        t.start(start, Some(start)).unwrap();
        let status_date = start + chrono::Duration::days(3);
        t.update_progress(0, status_date).unwrap();
        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(t.actual_end_date, Some(status_date));
        assert_eq!(t.history.len(), 2);
    }

    #[test]
    fn update_progress_rejects_negative_remaining() {
        let mut t = Task::new("t1", "A", 10).unwrap();
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        t.start(start, Some(start)).unwrap();
        assert_eq!(
            t.update_progress(-1, start).unwrap_err(),
            TaskError::NegativeRemaining(-1)
        );
    }

    #[test]
    fn update_progress_requires_in_progress() {
        let mut t = Task::new("t1", "A", 10).unwrap();
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(t.update_progress(5, start).is_err());
    }

    #[test]
    fn to_dict_from_dict_round_trips() {
        let t = Task::new("t1", "A", 10).unwrap().resources("dev");
        let dict = t.to_dict();
        let back = Task::from_dict(dict).unwrap();
        assert_eq!(back.id, t.id);
        assert_eq!(back.resources, t.resources);
    }

    #[test]
    fn cancel_is_terminal() {
        let mut t = Task::new("t1", "A", 10).unwrap();
        t.cancel().unwrap();
        assert_eq!(t.status, TaskStatus::Cancelled);
        assert!(t.cancel().is_err());
    }
}
