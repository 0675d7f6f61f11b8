//! Project aggregate: the registries of tasks, resources, chains and buffers
//! that the solver schedules, plus the configuration knobs governing it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Buffer, BufferId, Chain, Resource, ResourceId, Task, TaskId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectError {
    #[error("project name cannot be empty")]
    EmptyName,
    #[error("duplicate task id: {0}")]
    DuplicateTask(TaskId),
    #[error("duplicate resource id: {0}")]
    DuplicateResource(ResourceId),
    #[error("unknown task id: {0}")]
    UnknownTask(TaskId),
    #[error("unknown resource id: {0}")]
    UnknownResource(ResourceId),
}

/// Which closed-form sizing formula a buffer's size is derived with.
/// Implementations of the formulas live in `ccpm-solver::buffer_strategy`;
/// this enum is the serializable selector carried on [`ScheduleConfig`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferStrategyKind {
    CutAndPaste,
    #[default]
    SumOfSquares,
    RootSquareError,
    Adaptive,
}

impl std::fmt::Display for BufferStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BufferStrategyKind::CutAndPaste => "cut_and_paste",
            BufferStrategyKind::SumOfSquares => "sum_of_squares",
            BufferStrategyKind::RootSquareError => "root_square_error",
            BufferStrategyKind::Adaptive => "adaptive",
        };
        write!(f, "{s}")
    }
}

/// Engine-wide knobs: which buffer strategies size the project and feeding
/// buffers, their ratios, and whether over-allocation is tolerated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub project_buffer_strategy: BufferStrategyKind,
    pub feeding_buffer_strategy: BufferStrategyKind,
    pub project_buffer_ratio: f64,
    pub feeding_buffer_ratio: f64,
    pub allow_resource_overallocation: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            project_buffer_strategy: BufferStrategyKind::CutAndPaste,
            feeding_buffer_strategy: BufferStrategyKind::SumOfSquares,
            project_buffer_ratio: 0.5,
            feeding_buffer_ratio: 0.3,
            allow_resource_overallocation: false,
        }
    }
}

impl ScheduleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project_buffer_strategy(mut self, kind: BufferStrategyKind) -> Self {
        self.project_buffer_strategy = kind;
        self
    }

    pub fn feeding_buffer_strategy(mut self, kind: BufferStrategyKind) -> Self {
        self.feeding_buffer_strategy = kind;
        self
    }

    pub fn project_buffer_ratio(mut self, ratio: f64) -> Self {
        self.project_buffer_ratio = ratio;
        self
    }

    pub fn feeding_buffer_ratio(mut self, ratio: f64) -> Self {
        self.feeding_buffer_ratio = ratio;
        self
    }

    pub fn allow_resource_overallocation(mut self, allow: bool) -> Self {
        self.allow_resource_overallocation = allow;
        self
    }
}

/// Owns the collections of tasks, resources, chains and buffers that make up
/// a schedulable project. The solver borrows these registries; it does not
/// own a copy of its own.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub tasks: BTreeMap<TaskId, Task>,
    pub resources: BTreeMap<ResourceId, Resource>,
    pub chains: Vec<Chain>,
    pub buffers: BTreeMap<BufferId, Buffer>,
    pub config: ScheduleConfig,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Result<Self, ProjectError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ProjectError::EmptyName);
        }
        Ok(Self {
            name,
            tasks: BTreeMap::new(),
            resources: BTreeMap::new(),
            chains: Vec::new(),
            buffers: BTreeMap::new(),
            config: ScheduleConfig::default(),
        })
    }

    pub fn with_config(mut self, config: ScheduleConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers `task`. Dependencies naming a task id not (yet) present in
    /// the project are accepted: the dependency graph builder treats them as
    /// absent rather than rejecting the task, so insertion order never
    /// matters and phantom dependencies can be exercised deliberately.
    pub fn add_task(&mut self, task: Task) -> Result<(), ProjectError> {
        if self.tasks.contains_key(&task.id) {
            return Err(ProjectError::DuplicateTask(task.id));
        }
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    pub fn add_resource(&mut self, resource: Resource) -> Result<(), ProjectError> {
        if self.resources.contains_key(&resource.id) {
            return Err(ProjectError::DuplicateResource(resource.id));
        }
        self.resources.insert(resource.id.clone(), resource);
        Ok(())
    }

    pub fn task(&self, id: &str) -> Result<&Task, ProjectError> {
        self.tasks.get(id).ok_or_else(|| ProjectError::UnknownTask(id.to_string()))
    }

    pub fn task_mut(&mut self, id: &str) -> Result<&mut Task, ProjectError> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| ProjectError::UnknownTask(id.to_string()))
    }

    pub fn resource(&self, id: &str) -> Result<&Resource, ProjectError> {
        self.resources
            .get(id)
            .ok_or_else(|| ProjectError::UnknownResource(id.to_string()))
    }

    pub fn add_chain(&mut self, chain: Chain) {
        self.chains.push(chain);
    }

    pub fn add_buffer(&mut self, buffer: Buffer) {
        self.buffers.insert(buffer.id.clone(), buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_task_rejects_duplicate_id() {
        let mut p = Project::new("Demo").unwrap();
        p.add_task(Task::new("t1", "A", 1).unwrap()).unwrap();
        assert_eq!(
            p.add_task(Task::new("t1", "B", 1).unwrap()).unwrap_err(),
            ProjectError::DuplicateTask("t1".to_string())
        );
    }

    #[test]
    fn add_task_tolerates_dependency_on_unregistered_task() {
        let mut p = Project::new("Demo").unwrap();
        let t = Task::new("t2", "B", 1).unwrap().depends_on("t1");
        p.add_task(t).unwrap();
        assert!(p.task("t2").is_ok());
    }

    #[test]
    fn config_builder_overrides_defaults() {
        let cfg = ScheduleConfig::new()
            .project_buffer_strategy(BufferStrategyKind::Adaptive)
            .feeding_buffer_strategy(BufferStrategyKind::CutAndPaste)
            .project_buffer_ratio(0.4);
        assert_eq!(cfg.project_buffer_strategy, BufferStrategyKind::Adaptive);
        assert_eq!(cfg.feeding_buffer_strategy, BufferStrategyKind::CutAndPaste);
        assert_eq!(cfg.project_buffer_ratio, 0.4);
    }
}
