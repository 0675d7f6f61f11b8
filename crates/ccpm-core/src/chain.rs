//! Chain entity: an ordered sequence of tasks forming either the critical
//! chain or a feeding chain.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{BufferId, TaskId};

/// Which kind of chain a task belongs to, or none.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainKind {
    #[default]
    None,
    Critical,
    Feeding,
}

impl std::fmt::Display for ChainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChainKind::None => "none",
            ChainKind::Critical => "critical",
            ChainKind::Feeding => "feeding",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    #[error("chain id cannot be empty")]
    EmptyId,
    #[error("chain name cannot be empty")]
    EmptyName,
    #[error("buffer ratio must be within [0, 1], got {0}")]
    InvalidBufferRatio(f64),
    #[error("only feeding chains can connect to a task")]
    NotFeeding,
}

/// An ordered path of tasks: either the critical chain or one feeding it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chain {
    pub id: String,
    pub name: String,
    pub kind: ChainKind,
    pub buffer_ratio: f64,
    pub tasks: Vec<TaskId>,
    pub connects_to_task_id: Option<TaskId>,
    pub buffer_id: Option<BufferId>,
    pub completion_percentage: f64,
}

impl Chain {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ChainKind,
        buffer_ratio: f64,
    ) -> Result<Self, ChainError> {
        let id = id.into();
        let name = name.into();
        if id.trim().is_empty() {
            return Err(ChainError::EmptyId);
        }
        if name.trim().is_empty() {
            return Err(ChainError::EmptyName);
        }
        if !(0.0..=1.0).contains(&buffer_ratio) {
            return Err(ChainError::InvalidBufferRatio(buffer_ratio));
        }
        Ok(Self {
            id,
            name,
            kind,
            buffer_ratio,
            tasks: Vec::new(),
            connects_to_task_id: None,
            buffer_id: None,
            completion_percentage: 0.0,
        })
    }

    pub fn with_tasks(mut self, tasks: Vec<TaskId>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn connect_to(mut self, task_id: impl Into<TaskId>) -> Result<Self, ChainError> {
        if self.kind != ChainKind::Feeding {
            return Err(ChainError::NotFeeding);
        }
        self.connects_to_task_id = Some(task_id.into());
        Ok(self)
    }

    pub fn set_buffer(mut self, buffer_id: impl Into<BufferId>) -> Self {
        self.buffer_id = Some(buffer_id.into());
        self
    }

    /// Updates the chain's tracked completion percentage. Called by the
    /// scheduler after scheduling and after every progress update, since
    /// completion is derived from task progress rather than stored
    /// independently of it.
    pub fn set_completion_percentage(&mut self, percentage: f64) {
        self.completion_percentage = percentage;
    }

    pub fn is_critical(&self) -> bool {
        self.kind == ChainKind::Critical
    }

    pub fn is_feeding(&self) -> bool {
        self.kind == ChainKind::Feeding
    }

    pub fn last_task(&self) -> Option<&TaskId> {
        self.tasks.last()
    }

    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("Chain serializes infallibly")
    }

    pub fn from_dict(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_validates_id_name_and_ratio() {
        assert_eq!(
            Chain::new("", "x", ChainKind::Critical, 0.5).unwrap_err(),
            ChainError::EmptyId
        );
        assert_eq!(
            Chain::new("c", "x", ChainKind::Critical, 1.5).unwrap_err(),
            ChainError::InvalidBufferRatio(1.5)
        );
    }

    #[test]
    fn connect_to_requires_feeding_kind() {
        let critical = Chain::new("critical", "Critical Chain", ChainKind::Critical, 0.5).unwrap();
        assert_eq!(
            critical.connect_to("t1").unwrap_err(),
            ChainError::NotFeeding
        );

        let feeding = Chain::new("feeding_1", "Feeding Chain 1", ChainKind::Feeding, 0.3)
            .unwrap()
            .connect_to("t1")
            .unwrap();
        assert_eq!(feeding.connects_to_task_id, Some("t1".to_string()));
    }

    #[test]
    fn is_critical_is_feeding_are_mutually_exclusive() {
        let critical = Chain::new("critical", "Critical Chain", ChainKind::Critical, 0.5).unwrap();
        assert!(critical.is_critical());
        assert!(!critical.is_feeding());
    }

    #[test]
    fn to_dict_from_dict_round_trips() {
        let chain = Chain::new("critical", "Critical Chain", ChainKind::Critical, 0.5)
            .unwrap()
            .with_tasks(vec!["a".to_string(), "b".to_string()]);
        let back = Chain::from_dict(chain.to_dict()).unwrap();
        assert_eq!(back.tasks, chain.tasks);
    }
}
