//! Dependency graph construction, topological ordering, and the forward/
//! backward CPM pass that derives slack and the critical path.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use ccpm_core::{Task, TaskId};

/// Errors raised building or traversing the dependency graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    CycleDetected { remaining: Vec<TaskId> },
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::CycleDetected { remaining } => {
                write!(f, "cycle detected, unresolved tasks: {remaining:?}")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// A directed acyclic graph over a task set: successor/predecessor adjacency
/// built strictly from dependencies that stay within the task set. A
/// dependency referencing a task outside the set is treated as absent
/// rather than an error, so callers can exercise phantom-dependency inputs.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub successors: BTreeMap<TaskId, Vec<TaskId>>,
    pub predecessors: BTreeMap<TaskId, Vec<TaskId>>,
}

impl DependencyGraph {
    pub fn build(tasks: &BTreeMap<TaskId, Task>) -> Result<Self, GraphError> {
        let mut successors: BTreeMap<TaskId, Vec<TaskId>> = BTreeMap::new();
        let mut predecessors: BTreeMap<TaskId, Vec<TaskId>> = BTreeMap::new();

        for id in tasks.keys() {
            successors.entry(id.clone()).or_default();
            predecessors.entry(id.clone()).or_default();
        }

        for task in tasks.values() {
            for dep in &task.dependencies {
                if !tasks.contains_key(dep) {
                    continue;
                }
                successors.entry(dep.clone()).or_default().push(task.id.clone());
                predecessors.entry(task.id.clone()).or_default().push(dep.clone());
            }
        }

        for edges in successors.values_mut() {
            edges.sort();
        }
        for edges in predecessors.values_mut() {
            edges.sort();
        }

        Ok(Self { successors, predecessors })
    }

    /// Kahn's algorithm with a deterministic, lexicographically-ordered
    /// ready queue: whenever more than one node is ready, the smallest
    /// `TaskId` comes next.
    pub fn topological_sort(&self) -> Result<Vec<TaskId>, GraphError> {
        let node_count = self.successors.len();
        let mut in_degree: BTreeMap<TaskId, usize> =
            self.successors.keys().map(|id| (id.clone(), 0)).collect();
        for edges in self.successors.values() {
            for to in edges {
                *in_degree.get_mut(to).expect("edge target must be a known node") += 1;
            }
        }

        let mut ready: BTreeSet<TaskId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| id.clone())
            .collect();

        let mut order = Vec::with_capacity(node_count);
        while let Some(id) = ready.iter().next().cloned() {
            ready.remove(&id);
            order.push(id.clone());
            if let Some(edges) = self.successors.get(&id) {
                for to in edges {
                    let deg = in_degree.get_mut(to).expect("edge target must be a known node");
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(to.clone());
                    }
                }
            }
        }

        if order.len() != node_count {
            let resolved: BTreeSet<&TaskId> = order.iter().collect();
            let remaining = in_degree
                .keys()
                .filter(|id| !resolved.contains(id))
                .cloned()
                .collect();
            return Err(GraphError::CycleDetected { remaining });
        }
        Ok(order)
    }

    /// Topologically sort the induced subgraph restricted to `nodes`,
    /// using only edges between members of `nodes`.
    pub fn topological_sort_subset(&self, nodes: &BTreeSet<TaskId>) -> Result<Vec<TaskId>, GraphError> {
        let mut in_degree: BTreeMap<TaskId, usize> = nodes.iter().map(|id| (id.clone(), 0)).collect();
        let mut sub_successors: BTreeMap<TaskId, Vec<TaskId>> =
            nodes.iter().map(|id| (id.clone(), Vec::new())).collect();

        for id in nodes {
            if let Some(edges) = self.successors.get(id) {
                for to in edges {
                    if nodes.contains(to) {
                        sub_successors.get_mut(id).unwrap().push(to.clone());
                        *in_degree.get_mut(to).unwrap() += 1;
                    }
                }
            }
        }

        let mut ready: BTreeSet<TaskId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| id.clone())
            .collect();

        let mut order = Vec::with_capacity(nodes.len());
        while let Some(id) = ready.iter().next().cloned() {
            ready.remove(&id);
            order.push(id.clone());
            for to in &sub_successors[&id] {
                let deg = in_degree.get_mut(to).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(to.clone());
                }
            }
        }

        if order.len() != nodes.len() {
            let resolved: BTreeSet<&TaskId> = order.iter().collect();
            let remaining = nodes.iter().filter(|id| !resolved.contains(id)).cloned().collect();
            return Err(GraphError::CycleDetected { remaining });
        }
        Ok(order)
    }
}

/// Result of the forward/backward CPM pass: per-task early/late dates and
/// slack, plus the overall project duration.
#[derive(Debug, Clone, Default)]
pub struct CpmResult {
    pub project_duration: i64,
    pub early_start: BTreeMap<TaskId, i64>,
    pub early_finish: BTreeMap<TaskId, i64>,
    pub late_start: BTreeMap<TaskId, i64>,
    pub late_finish: BTreeMap<TaskId, i64>,
    pub slack: BTreeMap<TaskId, i64>,
}

impl CpmResult {
    pub fn is_critical(&self, id: &str) -> bool {
        self.slack.get(id).is_some_and(|&s| s == 0)
    }

    pub fn critical_task_ids(&self) -> BTreeSet<TaskId> {
        self.slack
            .iter()
            .filter(|(_, &s)| s == 0)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Run the forward and backward pass over `tasks` in one shot, using
/// `planned_duration` as each task's duration. Offsets are day counts from
/// project start (day 0), not calendar dates — date placement is the
/// scheduler's job.
pub fn run_cpm(
    tasks: &BTreeMap<TaskId, Task>,
    graph: &DependencyGraph,
    topo_order: &[TaskId],
) -> Result<CpmResult, GraphError> {
    let mut early_start: BTreeMap<TaskId, i64> = BTreeMap::new();
    let mut early_finish: BTreeMap<TaskId, i64> = BTreeMap::new();

    for id in topo_order {
        let duration = tasks[id].planned_duration;
        let es = graph.predecessors[id]
            .iter()
            .map(|p| early_finish[p])
            .max()
            .unwrap_or(0);
        early_start.insert(id.clone(), es);
        early_finish.insert(id.clone(), es + duration);
    }

    let project_duration = early_finish.values().copied().max().unwrap_or(0);

    let mut late_start: BTreeMap<TaskId, i64> = BTreeMap::new();
    let mut late_finish: BTreeMap<TaskId, i64> = BTreeMap::new();

    for id in topo_order.iter().rev() {
        let duration = tasks[id].planned_duration;
        let lf = graph.successors[id]
            .iter()
            .map(|s| late_start[s])
            .min()
            .unwrap_or(project_duration);
        late_finish.insert(id.clone(), lf);
        late_start.insert(id.clone(), lf - duration);
    }

    let slack = topo_order
        .iter()
        .map(|id| (id.clone(), late_start[id] - early_start[id]))
        .collect();

    Ok(CpmResult {
        project_duration,
        early_start,
        early_finish,
        late_start,
        late_finish,
        slack,
    })
}

/// Extract the critical path in execution order: the topological order of
/// the tasks with zero slack.
pub fn find_critical_path(graph: &DependencyGraph, cpm: &CpmResult) -> Result<Vec<TaskId>, GraphError> {
    let critical = cpm.critical_task_ids();
    graph.topological_sort_subset(&critical)
}
