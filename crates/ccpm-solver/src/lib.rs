//! # ccpm-solver
//!
//! Scheduling algorithms for the CCPM (Critical Chain Project Management)
//! engine: dependency graph construction and the CPM forward/backward pass,
//! critical-chain identification with resource-conflict resolution, feeding
//! chains, buffer-sizing strategies, resource leveling by graph coloring,
//! and the `Engine` orchestrator that wires all of it into a `schedule()`
//! pipeline plus an execution-time progress API.
//!
//! `ccpm-core` holds the domain model and its invariants; this crate holds
//! the algorithms that operate on it.
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use ccpm_core::{Project, Task};
//! use ccpm_solver::Engine;
//!
//! let mut project = Project::new("Demo").unwrap();
//! project.add_task(Task::new("design", "Design", 5).unwrap()).unwrap();
//! project
//!     .add_task(Task::new("implement", "Implement", 10).unwrap().depends_on("design"))
//!     .unwrap();
//!
//! let mut engine = Engine::new(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
//! engine.schedule(&mut project).unwrap();
//! assert!(project.task("implement").unwrap().start_date.is_some());
//! ```

pub mod buffer_strategy;
pub mod critical_chain;
pub mod feeding_chain;
pub mod graph;
pub mod leveling;
pub mod scheduler;

pub use buffer_strategy::calculate_buffer_size;
pub use critical_chain::{identify_critical_chain, resolve_resource_conflicts, CriticalChainError};
pub use feeding_chain::identify_feeding_chains;
pub use graph::{run_cpm, CpmResult, DependencyGraph, GraphError};
pub use leveling::{level_resources, LevelingResult};
pub use scheduler::{ChainReport, Engine, ExecutionReport, HealthIndicator, ScheduleError};
