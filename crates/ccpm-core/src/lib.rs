//! # ccpm-core
//!
//! Domain model for the CCPM (Critical Chain Project Management) scheduling
//! engine: tasks, chains, buffers, resources, and the project that owns
//! them.
//!
//! This crate holds the data model and its invariants only. The scheduling
//! algorithms — dependency graph construction, critical chain identification,
//! resource leveling, buffer sizing — live in `ccpm-solver`, which depends on
//! this crate.
//!
//! ## Example
//!
//! ```rust
//! use ccpm_core::{Project, Task};
//!
//! let mut project = Project::new("Demo").unwrap();
//! project.add_task(Task::new("design", "Design", 5).unwrap().resources("dev")).unwrap();
//! project
//!     .add_task(
//!         Task::new("implement", "Implement", 10)
//!             .unwrap()
//!             .depends_on("design")
//!             .resources("dev"),
//!     )
//!     .unwrap();
//! ```

mod buffer;
mod chain;
mod project;
mod resource;
mod task;

pub use buffer::{Buffer, BufferError, BufferKind, BufferStatus, ConsumptionEvent};
pub use chain::{Chain, ChainError, ChainKind};
pub use project::{BufferStrategyKind, Project, ProjectError, ScheduleConfig};
pub use resource::{Resource, ResourceError};
pub use task::{ProgressEvent, ResourceInput, Task, TaskError, TaskStatus};

/// Unique identifier for a task.
pub type TaskId = String;

/// Unique identifier for a resource.
pub type ResourceId = String;

/// Unique identifier for a buffer.
pub type BufferId = String;

/// Unique identifier for a chain.
pub type ChainId = String;
