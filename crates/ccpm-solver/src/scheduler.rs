//! Scheduler orchestrator (4.F): wires the graph, critical-chain, feeding-
//! chain, buffer-sizing and leveling stages into one `schedule()` pipeline,
//! plus the execution-time API that re-propagates progress through an
//! already-scheduled project.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use tracing::{debug, debug_span, warn};

use ccpm_core::{
    Buffer, BufferError, BufferKind, BufferStatus, Chain, ChainError, ChainKind, Project,
    ProjectError, ResourceId, Task, TaskError, TaskId, TaskStatus,
};

use crate::buffer_strategy::calculate_buffer_size;
use crate::critical_chain::{identify_critical_chain, resolve_resource_conflicts, CriticalChainError};
use crate::feeding_chain::identify_feeding_chains;
use crate::graph::{run_cpm, DependencyGraph, GraphError};
use crate::leveling::level_resources;

/// Errors raised by the scheduling pipeline or the execution-time API.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleError {
    Graph(GraphError),
    CriticalChain(CriticalChainError),
    Chain(ChainError),
    Buffer(BufferError),
    Project(ProjectError),
    Task(TaskError),
    /// No leveling honors resource capacity and `allow_resource_overallocation`
    /// is false. Fatal for the `schedule()` call that raised it.
    ResourceInfeasible { resource: ResourceId, tasks: (TaskId, TaskId) },
    /// A progress update referenced an unknown task or a negative remaining
    /// duration.
    InvalidProgress(String),
    /// An execution-time method was called before `schedule()` ever ran.
    NotScheduled,
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::Graph(e) => write!(f, "{e}"),
            ScheduleError::CriticalChain(e) => write!(f, "{e}"),
            ScheduleError::Chain(e) => write!(f, "{e}"),
            ScheduleError::Buffer(e) => write!(f, "{e}"),
            ScheduleError::Project(e) => write!(f, "{e}"),
            ScheduleError::Task(e) => write!(f, "{e}"),
            ScheduleError::ResourceInfeasible { resource, tasks } => write!(
                f,
                "resource {resource} overallocated between {} and {} and overallocation is not permitted",
                tasks.0, tasks.1
            ),
            ScheduleError::InvalidProgress(msg) => write!(f, "invalid progress update: {msg}"),
            ScheduleError::NotScheduled => write!(f, "schedule() has not run yet"),
        }
    }
}

impl std::error::Error for ScheduleError {}

impl From<GraphError> for ScheduleError {
    fn from(e: GraphError) -> Self {
        ScheduleError::Graph(e)
    }
}
impl From<CriticalChainError> for ScheduleError {
    fn from(e: CriticalChainError) -> Self {
        ScheduleError::CriticalChain(e)
    }
}
impl From<ChainError> for ScheduleError {
    fn from(e: ChainError) -> Self {
        ScheduleError::Chain(e)
    }
}
impl From<BufferError> for ScheduleError {
    fn from(e: BufferError) -> Self {
        ScheduleError::Buffer(e)
    }
}
impl From<ProjectError> for ScheduleError {
    fn from(e: ProjectError) -> Self {
        ScheduleError::Project(e)
    }
}
impl From<TaskError> for ScheduleError {
    fn from(e: TaskError) -> Self {
        ScheduleError::Task(e)
    }
}

/// Fever-chart health derived from the project buffer's consumption status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthIndicator {
    OnTrack,
    AtRisk,
    Behind,
}

impl std::fmt::Display for HealthIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthIndicator::OnTrack => "on_track",
            HealthIndicator::AtRisk => "at_risk",
            HealthIndicator::Behind => "behind",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct ChainReport {
    pub chain_id: String,
    pub completion_percentage: f64,
    pub buffer_status: Option<BufferStatus>,
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub status_date: NaiveDate,
    pub project_buffer_status: BufferStatus,
    pub indicator: HealthIndicator,
    pub chains: Vec<ChainReport>,
}

impl std::fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Status as of {}: {} ({})", self.status_date, self.indicator, self.project_buffer_status)?;
        for chain in &self.chains {
            write!(f, "  {} — {:.1}% complete", chain.chain_id, chain.completion_percentage)?;
            if let Some(status) = chain.buffer_status {
                write!(f, ", buffer {status}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Stateful scheduling engine. Holds the dependency graph built by the last
/// `schedule()` call so the execution-time API can re-propagate progress
/// without rebuilding it from scratch.
#[derive(Debug, Clone)]
pub struct Engine {
    project_start: NaiveDate,
    graph: Option<DependencyGraph>,
}

impl Engine {
    pub fn new(project_start: NaiveDate) -> Self {
        Self { project_start, graph: None }
    }

    /// Run the full pipeline: dependency graph, CPM pass, critical chain
    /// (with resource-conflict resolution), project buffer, feeding chains
    /// and their buffers, resource leveling, then calendar placement.
    pub fn schedule(&mut self, project: &mut Project) -> Result<(), ScheduleError> {
        let span = debug_span!("schedule", tasks = project.tasks.len());
        let _enter = span.enter();

        // Re-running schedule() on an already-scheduled project starts from
        // a clean slate rather than accumulating duplicate chains/buffers.
        project.chains.clear();
        project.buffers.clear();

        let graph = DependencyGraph::build(&project.tasks)?;
        let topo = graph.topological_sort()?;
        let cpm = run_cpm(&project.tasks, &graph, &topo)?;

        for (id, task) in project.tasks.iter_mut() {
            task.early_start = cpm.early_start.get(id).copied();
            task.early_finish = cpm.early_finish.get(id).copied();
            task.late_start = cpm.late_start.get(id).copied();
            task.late_finish = cpm.late_finish.get(id).copied();
            task.slack = cpm.slack.get(id).copied();
        }

        let critical_path = {
            let span = debug_span!("critical_chain");
            let _enter = span.enter();

            let (chain, raw_path) = identify_critical_chain(&project.tasks, &graph)?;
            let resolved = resolve_resource_conflicts(&raw_path, &project.tasks, &graph)?;
            debug!(chain_length = resolved.len(), "critical chain resolved");

            for id in &resolved {
                if let Some(task) = project.tasks.get_mut(id) {
                    task.chain_id = Some(chain.id.clone());
                    task.chain_kind = ChainKind::Critical;
                }
            }

            let chain_tasks: Vec<&Task> = resolved.iter().filter_map(|id| project.tasks.get(id)).collect();
            let size = calculate_buffer_size(
                project.config.project_buffer_strategy,
                &chain_tasks,
                project.config.project_buffer_ratio,
            )
            .round() as i64;

            let buffer = Buffer::new("project_buffer", "Project Buffer", size, BufferKind::Project)?;
            let chain = chain.with_tasks(resolved.clone()).set_buffer(buffer.id.clone());
            project.add_buffer(buffer);
            project.add_chain(chain);

            resolved
        };

        {
            let span = debug_span!("feeding_chains");
            let _enter = span.enter();

            let feeding_chains = identify_feeding_chains(&project.tasks, &critical_path, &graph)?;
            debug!(count = feeding_chains.len(), "feeding chains identified");

            for chain in feeding_chains {
                for id in &chain.tasks {
                    if let Some(task) = project.tasks.get_mut(id) {
                        task.chain_id = Some(chain.id.clone());
                        task.chain_kind = ChainKind::Feeding;
                    }
                }

                let chain_tasks: Vec<&Task> = chain.tasks.iter().filter_map(|id| project.tasks.get(id)).collect();
                let size = calculate_buffer_size(
                    project.config.feeding_buffer_strategy,
                    &chain_tasks,
                    project.config.feeding_buffer_ratio,
                )
                .round() as i64;

                let buffer_id = format!("{}_buffer", chain.id);
                let connects_to = chain
                    .connects_to_task_id
                    .clone()
                    .expect("identify_feeding_chains always connects its chains");
                let buffer = Buffer::new(buffer_id, format!("{} Buffer", chain.name), size, BufferKind::Feeding)?
                    .connect_to(connects_to);
                let chain = chain.set_buffer(buffer.id.clone());
                project.add_buffer(buffer);
                project.add_chain(chain);
            }
        }

        // When overallocation is explicitly permitted, leveling reports
        // conflicts rather than resequencing tasks to eliminate them: skip
        // the coloring pass and leave the raw CPM placement in effect.
        if !project.config.allow_resource_overallocation {
            let span = debug_span!("leveling");
            let _enter = span.enter();
            let leveled = level_resources(&project.tasks, &graph, &cpm, &critical_path);
            for (id, es) in &leveled.early_start {
                if let Some(task) = project.tasks.get_mut(id) {
                    task.early_start = Some(*es);
                }
            }
            for (id, ef) in &leveled.early_finish {
                if let Some(task) = project.tasks.get_mut(id) {
                    task.early_finish = Some(*ef);
                }
            }
        }

        self.check_resource_feasibility(project)?;

        for task in project.tasks.values_mut() {
            let es = task.early_start.unwrap_or(0);
            let start = self.project_start + Duration::days(es);
            task.start_date = Some(start);
            task.end_date = Some(start + Duration::days(task.planned_duration));
        }

        {
            let span = debug_span!("buffers");
            let _enter = span.enter();
            self.graph = Some(graph);
            self.apply_buffers_to_schedule(project)?;
        }

        self.populate_resource_allocations(project);
        self.update_chain_completion(project);

        Ok(())
    }

    /// Record each task's resource shares over its final `[start, end)`
    /// calendar interval onto the resource's advisory allocation map
    /// (Section 3). Cleared and rebuilt from scratch each call so a
    /// re-schedule never accumulates stale entries from a prior placement.
    fn populate_resource_allocations(&self, project: &mut Project) {
        for resource in project.resources.values_mut() {
            resource.allocations.clear();
        }

        let assignments: Vec<(TaskId, NaiveDate, NaiveDate, Vec<(ResourceId, f64)>)> = project
            .tasks
            .values()
            .filter_map(|t| {
                let start = t.start_date?;
                let end = t.end_date?;
                Some((t.id.clone(), start, end, t.resources.iter().map(|(r, f)| (r.clone(), *f)).collect()))
            })
            .collect();

        for (task_id, start, end, resources) in assignments {
            let mut date = start;
            while date < end {
                for (resource_id, fraction) in &resources {
                    if let Some(resource) = project.resources.get_mut(resource_id) {
                        resource.record_allocation(date, task_id.clone(), fraction);
                    }
                }
                date += Duration::days(1);
            }
        }
    }

    /// Write each chain's derived completion percentage back onto its
    /// `Chain::completion_percentage` field so it is current in `to_dict()`
    /// output without the caller having to ask the solver separately.
    fn update_chain_completion(&self, project: &mut Project) {
        let percentages: Vec<(usize, f64)> = project
            .chains
            .iter()
            .enumerate()
            .map(|(i, c)| (i, chain_completion_percentage(project, c)))
            .collect();
        for (i, pct) in percentages {
            project.chains[i].set_completion_percentage(pct);
        }
    }

    /// Checks, for every pair of tasks sharing a resource whose combined
    /// demand exceeds that resource's declared capacity, that their final
    /// calendar placement does not overlap. When overallocation is
    /// explicitly permitted this only warns (masking the violation rather
    /// than failing the `schedule()` call); otherwise it is fatal.
    fn check_resource_feasibility(&self, project: &Project) -> Result<(), ScheduleError> {
        let allowed = project.config.allow_resource_overallocation;
        let ids: Vec<&TaskId> = project.tasks.keys().collect();
        for (i, &a_id) in ids.iter().enumerate() {
            for &b_id in &ids[i + 1..] {
                let a = &project.tasks[a_id];
                let b = &project.tasks[b_id];
                let (Some(a_es), Some(a_ef), Some(b_es), Some(b_ef)) =
                    (a.early_start, a.early_finish, b.early_start, b.early_finish)
                else {
                    continue;
                };
                let overlaps = a_es < b_ef && b_es < a_ef;
                if !overlaps {
                    continue;
                }
                for (resource_id, &a_alloc) in &a.resources {
                    let Some(&b_alloc) = b.resources.get(resource_id) else { continue };
                    let capacity = project
                        .resources
                        .get(resource_id)
                        .map(|r| r.capacity)
                        .unwrap_or(1.0);
                    if a_alloc + b_alloc > capacity {
                        if allowed {
                            warn!(resource = %resource_id, a = %a_id, b = %b_id, "resource overallocation permitted by config, masking capacity violation");
                            continue;
                        }
                        return Err(ScheduleError::ResourceInfeasible {
                            resource: resource_id.clone(),
                            tasks: (a_id.to_string(), b_id.to_string()),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Place each buffer against its chain's calendar and, for feeding
    /// buffers that would otherwise collide with the critical-chain task
    /// they join, cascade the resulting delay forward.
    fn apply_buffers_to_schedule(&self, project: &mut Project) -> Result<(), ScheduleError> {
        let chain_info: Vec<(ChainKind, Option<String>, Option<TaskId>, Option<TaskId>)> = project
            .chains
            .iter()
            .map(|c| (c.kind, c.buffer_id.clone(), c.last_task().cloned(), c.connects_to_task_id.clone()))
            .collect();

        for (kind, buffer_id, predecessor, successor) in chain_info {
            let (Some(buffer_id), Some(predecessor_id)) = (buffer_id, predecessor) else { continue };
            let pred_end = project.task(&predecessor_id)?.end_date.unwrap_or(self.project_start);
            let size = project.buffers.get(&buffer_id).map(|b| b.size).unwrap_or(0);

            match kind {
                ChainKind::Critical => {
                    if let Some(buffer) = project.buffers.get_mut(&buffer_id) {
                        buffer.start_date = Some(pred_end);
                        buffer.end_date = Some(pred_end + Duration::days(size));
                    }
                }
                ChainKind::Feeding => {
                    let Some(successor_id) = successor else { continue };
                    let succ_start = project.task(&successor_id)?.start_date.unwrap_or(pred_end);

                    let mut end = succ_start;
                    let mut start = end - Duration::days(size);
                    if start < pred_end {
                        start = pred_end;
                        end = start + Duration::days(size);
                        if end > succ_start {
                            let overflow = (end - succ_start).num_days();
                            self.delay_task_and_dependents(project, &successor_id, overflow);
                        }
                    }

                    if let Some(buffer) = project.buffers.get_mut(&buffer_id) {
                        buffer.start_date = Some(start);
                        buffer.end_date = Some(end);
                    }
                }
                ChainKind::None => {}
            }
        }
        Ok(())
    }

    /// Shift `task_id`'s dates by `delay_days`, cascading the same delay to
    /// every downstream task reachable through the dependency graph and to
    /// any buffer whose chain's last task is `task_id`.
    fn delay_task_and_dependents(&self, project: &mut Project, task_id: &str, delay_days: i64) {
        if delay_days <= 0 {
            return;
        }
        let shifted = if let Some(task) = project.tasks.get_mut(task_id) {
            if let Some(s) = task.start_date {
                task.start_date = Some(s + Duration::days(delay_days));
            }
            if let Some(e) = task.end_date {
                task.end_date = Some(e + Duration::days(delay_days));
            }
            true
        } else {
            false
        };
        if !shifted {
            return;
        }

        if let Some(graph) = &self.graph {
            if let Some(successors) = graph.successors.get(task_id).cloned() {
                for succ in successors {
                    self.delay_task_and_dependents(project, &succ, delay_days);
                }
            }
        }

        let connected_buffers: Vec<String> = project
            .chains
            .iter()
            .filter(|c| c.last_task().is_some_and(|t| t == task_id))
            .filter_map(|c| c.buffer_id.clone())
            .collect();
        for buffer_id in connected_buffers {
            if let Some(buffer) = project.buffers.get_mut(&buffer_id) {
                if let Some(s) = buffer.start_date {
                    buffer.start_date = Some(s + Duration::days(delay_days));
                }
                if let Some(e) = buffer.end_date {
                    buffer.end_date = Some(e + Duration::days(delay_days));
                }
            }
        }
    }

    /// Report progress on `task_id` as of `status_date`, starting it first
    /// if it is still planned, then re-propagate the effect through the
    /// network and buffers.
    pub fn update_task_progress(
        &mut self,
        project: &mut Project,
        task_id: &str,
        remaining: i64,
        status_date: NaiveDate,
    ) -> Result<(), ScheduleError> {
        if remaining < 0 {
            return Err(ScheduleError::InvalidProgress(format!(
                "remaining duration cannot be negative, got {remaining}"
            )));
        }
        let scheduled_start = project.task(task_id)?.start_date;
        let task = project.task_mut(task_id)?;
        if task.status == TaskStatus::Planned {
            task.start(status_date, scheduled_start)?;
        }
        task.update_progress(remaining, status_date)?;

        let mut updated = BTreeSet::new();
        updated.insert(task_id.to_string());
        self.recalculate_from_progress(project, status_date, &updated)?;
        self.update_buffer_consumption(project, status_date);
        Ok(())
    }

    /// Re-derive `new_start_date`/`new_end_date` for every task reachable
    /// from an already-updated task, following topological order so each
    /// planned task sees its predecessors' effective end dates before its
    /// own is computed.
    pub fn recalculate_from_progress(
        &mut self,
        project: &mut Project,
        status_date: NaiveDate,
        directly_updated: &BTreeSet<TaskId>,
    ) -> Result<(), ScheduleError> {
        let graph = self.graph.clone().ok_or(ScheduleError::NotScheduled)?;
        let topo = graph.topological_sort()?;
        let mut updated = directly_updated.clone();

        for id in &topo {
            let status = project.task(id)?.status;
            match status {
                TaskStatus::Completed => {
                    let t = project.task_mut(id)?;
                    t.new_start_date = t.actual_start_date;
                    t.new_end_date = t.actual_end_date;
                    updated.insert(id.clone());
                }
                TaskStatus::InProgress => {
                    let t = project.task_mut(id)?;
                    t.new_start_date = t.actual_start_date;
                    if directly_updated.contains(id) {
                        t.new_end_date = Some(status_date + Duration::days(t.remaining_duration));
                    }
                    updated.insert(id.clone());
                }
                TaskStatus::Planned => {
                    let preds = graph.predecessors.get(id).cloned().unwrap_or_default();
                    if preds.is_empty() || !preds.iter().any(|p| updated.contains(p)) {
                        continue;
                    }
                    let mut latest_end = status_date;
                    for p in &preds {
                        let end = effective_end_date(project.task(p)?, status_date);
                        latest_end = latest_end.max(end);
                    }
                    let t = project.task_mut(id)?;
                    t.new_start_date = Some(latest_end);
                    t.new_end_date = Some(latest_end + Duration::days(t.planned_duration));
                    updated.insert(id.clone());
                }
                TaskStatus::OnHold | TaskStatus::Cancelled => {}
            }
        }

        self.relevel_not_started(project, &updated)?;
        self.update_buffer_positions(project);
        self.update_chain_completion(project);
        Ok(())
    }

    /// Re-level the not-yet-started subset of `updated` tasks, writing the
    /// resulting offsets back as day counts relative to project start —
    /// the plain CPM `early_start`/`early_finish` fields, not the calendar
    /// `new_start_date`/`new_end_date` ones.
    fn relevel_not_started(&self, project: &mut Project, updated: &BTreeSet<TaskId>) -> Result<(), ScheduleError> {
        let not_started: std::collections::BTreeMap<TaskId, Task> = project
            .tasks
            .iter()
            .filter(|(id, t)| updated.contains(*id) && t.status == TaskStatus::Planned)
            .map(|(id, t)| (id.clone(), t.clone()))
            .collect();
        if not_started.is_empty() {
            return Ok(());
        }

        let sub_graph = DependencyGraph::build(&not_started)?;
        let sub_topo = sub_graph.topological_sort()?;
        let cpm = run_cpm(&not_started, &sub_graph, &sub_topo)?;
        let leveled = level_resources(&not_started, &sub_graph, &cpm, &[]);

        for (id, es) in leveled.early_start {
            if let Some(task) = project.tasks.get_mut(&id) {
                task.early_start = Some(es);
            }
        }
        for (id, ef) in leveled.early_finish {
            if let Some(task) = project.tasks.get_mut(&id) {
                task.early_finish = Some(ef);
            }
        }
        Ok(())
    }

    /// Recompute each buffer's `new_start_date`/`new_end_date` from its
    /// predecessor task's effective end date, cascading a delay to a
    /// feeding buffer's join task if the buffer would otherwise collide
    /// with it.
    fn update_buffer_positions(&self, project: &mut Project) {
        let chain_info: Vec<(ChainKind, Option<String>, Option<TaskId>, Option<TaskId>)> = project
            .chains
            .iter()
            .map(|c| (c.kind, c.buffer_id.clone(), c.last_task().cloned(), c.connects_to_task_id.clone()))
            .collect();

        for (kind, buffer_id, predecessor, successor) in chain_info {
            let (Some(buffer_id), Some(pred_id)) = (buffer_id, predecessor) else { continue };
            let Some(pred) = project.tasks.get(&pred_id) else { continue };
            let pred_end = pred.new_end_date.or(pred.end_date);
            let Some(pred_end) = pred_end else { continue };
            let size = project.buffers.get(&buffer_id).map(|b| b.size).unwrap_or(0);
            let new_start = pred_end;
            let new_end = new_start + Duration::days(size);

            if kind == ChainKind::Feeding {
                if let Some(succ_id) = &successor {
                    if let Some(succ) = project.tasks.get(succ_id) {
                        let succ_started = matches!(succ.status, TaskStatus::InProgress | TaskStatus::Completed);
                        let succ_start = succ.new_start_date.or(succ.start_date);
                        if let Some(succ_start) = succ_start {
                            if new_end > succ_start && !succ_started {
                                let overflow = (new_end - succ_start).num_days();
                                self.delay_task_and_dependents(project, succ_id, overflow);
                            }
                        }
                    }
                }
            }

            if let Some(buffer) = project.buffers.get_mut(&buffer_id) {
                buffer.new_start_date = Some(new_start);
                buffer.new_end_date = Some(new_end);
            }
        }
    }

    /// Set each buffer's total consumption from how far its chain's final
    /// task has slipped relative to its originally scheduled end date.
    /// Idempotent: calling this repeatedly with the same projected slip
    /// does not grow the consumption history.
    fn update_buffer_consumption(&self, project: &mut Project, status_date: NaiveDate) {
        let chain_info: Vec<(Option<String>, Option<TaskId>)> =
            project.chains.iter().map(|c| (c.buffer_id.clone(), c.last_task().cloned())).collect();

        for (buffer_id, last_task_id) in chain_info {
            let (Some(buffer_id), Some(last_task_id)) = (buffer_id, last_task_id) else { continue };
            let Some(last_task) = project.tasks.get(&last_task_id) else { continue };
            let (Some(original), Some(projected)) =
                (last_task.end_date, last_task.new_end_date.or(last_task.end_date))
            else {
                continue;
            };
            let delay = (projected - original).num_days().max(0);
            if let Some(buffer) = project.buffers.get_mut(&buffer_id) {
                buffer.set_total_consumption(delay, status_date, Some("progress re-propagation".to_string()));
            }
        }
    }

    /// Bulk-apply a hypothetical execution state without mutating `project`,
    /// returning the execution report that state would produce.
    pub fn simulate_execution(
        &mut self,
        project: &Project,
        status_date: NaiveDate,
        completed: &[TaskId],
        in_progress: &[(TaskId, i64)],
    ) -> Result<ExecutionReport, ScheduleError> {
        let mut scratch = project.clone();
        for id in completed {
            if let Some(task) = scratch.tasks.get_mut(id) {
                if task.status == TaskStatus::Planned {
                    task.start(status_date, task.start_date)?;
                }
                task.update_progress(0, status_date)?;
            }
        }
        for (id, remaining) in in_progress {
            if let Some(task) = scratch.tasks.get_mut(id) {
                if task.status == TaskStatus::Planned {
                    task.start(status_date, task.start_date)?;
                }
                task.update_progress(*remaining, status_date)?;
            }
        }

        let mut updated: BTreeSet<TaskId> = completed.iter().cloned().collect();
        updated.extend(in_progress.iter().map(|(id, _)| id.clone()));
        self.recalculate_from_progress(&mut scratch, status_date, &updated)?;
        self.update_buffer_consumption(&mut scratch, status_date);

        Ok(self.generate_execution_report(&scratch, status_date))
    }

    /// Build a fever-chart style snapshot: per-chain completion percentage
    /// and buffer status, plus an overall health indicator derived from the
    /// project buffer.
    pub fn generate_execution_report(&self, project: &Project, status_date: NaiveDate) -> ExecutionReport {
        let project_buffer_status = project
            .chains
            .iter()
            .find(|c| c.is_critical())
            .and_then(|c| c.buffer_id.as_ref())
            .and_then(|id| project.buffers.get(id))
            .map(|b| b.status)
            .unwrap_or(BufferStatus::Green);

        let indicator = match project_buffer_status {
            BufferStatus::Green => HealthIndicator::OnTrack,
            BufferStatus::Yellow => HealthIndicator::AtRisk,
            BufferStatus::Red => HealthIndicator::Behind,
        };

        let chains = project
            .chains
            .iter()
            .map(|c| ChainReport {
                chain_id: c.id.clone(),
                completion_percentage: c.completion_percentage,
                buffer_status: c.buffer_id.as_ref().and_then(|id| project.buffers.get(id)).map(|b| b.status),
            })
            .collect();

        ExecutionReport { status_date, project_buffer_status, indicator, chains }
    }
}

fn effective_end_date(task: &Task, status_date: NaiveDate) -> NaiveDate {
    match task.status {
        TaskStatus::Completed => task.actual_end_date.unwrap_or(status_date),
        TaskStatus::InProgress => status_date + Duration::days(task.remaining_duration),
        _ => task.new_end_date.or(task.end_date).unwrap_or(status_date),
    }
}

fn chain_completion_percentage(project: &Project, chain: &Chain) -> f64 {
    let (done, total) = chain.tasks.iter().filter_map(|id| project.tasks.get(id)).fold(
        (0.0_f64, 0.0_f64),
        |(done, total), task| {
            let task_done = (task.planned_duration - task.remaining_duration).max(0) as f64;
            (done + task_done, total + task.planned_duration as f64)
        },
    );
    if total > 0.0 {
        (done / total * 100.0).min(100.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccpm_core::{Resource, ScheduleConfig};

    fn demo_project() -> Project {
        let mut p = Project::new("Demo").unwrap();
        p.add_task(Task::new("design", "Design", 5).unwrap().resources("dev")).unwrap();
        p.add_task(
            Task::new("implement", "Implement", 10)
                .unwrap()
                .depends_on("design")
                .resources("dev"),
        )
        .unwrap();
        p.add_task(
            Task::new("test", "Test", 3)
                .unwrap()
                .depends_on("implement")
                .resources("qa"),
        )
        .unwrap();
        p.add_resource(Resource::new("dev", "Developer").unwrap()).unwrap();
        p.add_resource(Resource::new("qa", "QA").unwrap()).unwrap();
        p
    }

    #[test]
    fn schedule_assigns_dates_and_a_project_buffer() {
        let mut project = demo_project();
        let mut engine = Engine::new(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        engine.schedule(&mut project).unwrap();

        assert!(project.task("design").unwrap().start_date.is_some());
        assert!(project.chains.iter().any(|c| c.is_critical()));
        let pb = project.buffers.get("project_buffer").unwrap();
        assert!(pb.start_date.is_some());
        assert!(pb.size > 0);
    }

    #[test]
    fn update_task_progress_transitions_and_consumes_buffer_on_delay() {
        let mut project = demo_project();
        let mut engine = Engine::new(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        engine.schedule(&mut project).unwrap();

        let status_date = project.task("design").unwrap().start_date.unwrap() + Duration::days(6);
        engine.update_task_progress(&mut project, "design", 3, status_date).unwrap();

        assert_eq!(project.task("design").unwrap().status, TaskStatus::InProgress);
        let pb = project.buffers.get("project_buffer").unwrap();
        assert!(pb.remaining_size <= pb.size);
    }

    #[test]
    fn update_task_progress_rejects_negative_remaining() {
        let mut project = demo_project();
        let mut engine = Engine::new(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        engine.schedule(&mut project).unwrap();
        let status_date = project.task("design").unwrap().start_date.unwrap();
        let err = engine.update_task_progress(&mut project, "design", -1, status_date).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidProgress(_)));
    }

    #[test]
    fn conflicting_resource_demand_is_leveled_rather_than_left_overlapping() {
        let mut project = Project::new("Demo").unwrap();
        project.add_task(Task::new("a", "A", 5).unwrap().resources("dev")).unwrap();
        project.add_task(Task::new("b", "B", 5).unwrap().resources("dev")).unwrap();
        project.add_resource(Resource::new("dev", "Developer").unwrap()).unwrap();

        let mut engine = Engine::new(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        // the leveller sequences conflicting same-resource tasks into distinct
        // colors, so a valid non-overlapping schedule always exists here.
        engine.schedule(&mut project).unwrap();
        let a = project.task("a").unwrap();
        let b = project.task("b").unwrap();
        assert!(a.early_finish.unwrap() <= b.early_start.unwrap() || b.early_finish.unwrap() <= a.early_start.unwrap());

        project.config = ScheduleConfig::new().allow_resource_overallocation(true);
        assert!(engine.schedule(&mut project).is_ok());
    }

    #[test]
    fn schedule_populates_resource_allocations_and_chain_completion() {
        let mut project = demo_project();
        let mut engine = Engine::new(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        engine.schedule(&mut project).unwrap();

        let design_start = project.task("design").unwrap().start_date.unwrap();
        let dev = project.resources.get("dev").unwrap();
        assert_eq!(dev.allocated_fraction(design_start), 1.0);

        assert!(project.chains.iter().any(|c| c.is_critical()));
        for chain in &project.chains {
            assert_eq!(chain.completion_percentage, 0.0);
        }

        let status_date = design_start + Duration::days(6);
        engine.update_task_progress(&mut project, "design", 0, status_date).unwrap();
        let critical = project.chains.iter().find(|c| c.is_critical()).unwrap();
        assert!(critical.completion_percentage > 0.0);
    }

    #[test]
    fn generate_execution_report_reflects_green_buffer_by_default() {
        let mut project = demo_project();
        let mut engine = Engine::new(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        engine.schedule(&mut project).unwrap();

        let report = engine.generate_execution_report(&project, NaiveDate::from_ymd_opt(2026, 1, 6).unwrap());
        assert_eq!(report.indicator, HealthIndicator::OnTrack);
        assert_eq!(report.project_buffer_status, BufferStatus::Green);
    }
}
