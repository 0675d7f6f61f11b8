//! Critical chain identification: the critical path augmented with
//! resource-conflict precedence edges (4.C).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use ccpm_core::{Chain, ChainError, ChainKind, Task, TaskId};

use crate::graph::{find_critical_path, run_cpm, DependencyGraph, GraphError};

/// Identify the critical chain: the longest path by duration through the
/// dependency graph, wrapped in a [`Chain`].
pub fn identify_critical_chain(
    tasks: &BTreeMap<TaskId, Task>,
    graph: &DependencyGraph,
) -> Result<(Chain, Vec<TaskId>), CriticalChainError> {
    let topo = graph.topological_sort()?;
    let cpm = run_cpm(tasks, graph, &topo)?;
    let critical_path = find_critical_path(graph, &cpm)?;

    let chain = Chain::new("critical", "Critical Chain", ChainKind::Critical, 0.5)?
        .with_tasks(critical_path.clone());

    Ok((chain, critical_path))
}

/// Walk `graph`'s successor edges to determine whether `to` is reachable
/// from `from` (a directed path exists).
fn reachable(graph: &DependencyGraph, from: &str, to: &str) -> bool {
    let mut seen: BTreeSet<TaskId> = BTreeSet::new();
    let mut queue: VecDeque<TaskId> = VecDeque::from([from.to_string()]);
    while let Some(id) = queue.pop_front() {
        if id == to {
            return true;
        }
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(next) = graph.successors.get(&id) {
            queue.extend(next.iter().cloned());
        }
    }
    false
}

fn already_dependent(graph: &DependencyGraph, a: &str, b: &str) -> bool {
    reachable(graph, a, b) || reachable(graph, b, a)
}

fn shares_resource(a: &Task, b: &Task) -> bool {
    a.resources.keys().any(|r| b.resources.contains_key(r))
}

/// Resolve resource conflicts along the critical path: where two
/// non-dependent tasks on the path share a resource, inject a directed
/// precedence edge from the higher-priority (earlier in topological order)
/// task to the lower-priority one, then recompute the critical path over
/// the augmented graph.
pub fn resolve_resource_conflicts(
    critical_path: &[TaskId],
    tasks: &BTreeMap<TaskId, Task>,
    graph: &DependencyGraph,
) -> Result<Vec<TaskId>, CriticalChainError> {
    let mut conflicts: Vec<(TaskId, TaskId)> = Vec::new();
    for (i, a) in critical_path.iter().enumerate() {
        for b in &critical_path[i + 1..] {
            if shares_resource(&tasks[a], &tasks[b]) && !already_dependent(graph, a, b) {
                conflicts.push((a.clone(), b.clone()));
            }
        }
    }

    if conflicts.is_empty() {
        return Ok(critical_path.to_vec());
    }

    let topo_order = graph.topological_sort()?;
    let priority: BTreeMap<&TaskId, usize> =
        topo_order.iter().enumerate().map(|(i, id)| (id, i)).collect();

    let mut augmented = graph.clone();
    for (a, b) in &conflicts {
        let (from, to) = if priority[a] < priority[b] { (a, b) } else { (b, a) };
        augmented.successors.entry(from.clone()).or_default().push(to.clone());
        augmented.predecessors.entry(to.clone()).or_default().push(from.clone());
    }

    let augmented_topo = augmented.topological_sort()?;
    let cpm = run_cpm(tasks, &augmented, &augmented_topo)?;
    Ok(find_critical_path(&augmented, &cpm)?)
}

#[derive(Debug, Clone, PartialEq)]
pub enum CriticalChainError {
    Graph(GraphError),
    Chain(ChainError),
}

impl std::fmt::Display for CriticalChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CriticalChainError::Graph(e) => write!(f, "{e}"),
            CriticalChainError::Chain(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CriticalChainError {}

impl From<GraphError> for CriticalChainError {
    fn from(e: GraphError) -> Self {
        CriticalChainError::Graph(e)
    }
}

impl From<ChainError> for CriticalChainError {
    fn from(e: ChainError) -> Self {
        CriticalChainError::Chain(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, duration: i64, deps: &[&str], resource: Option<&str>) -> Task {
        let mut t = Task::new(id, id, duration).unwrap().depends_on_all(deps.iter().map(|d| d.to_string()));
        if let Some(r) = resource {
            t = t.resources(r);
        }
        t
    }

    #[test]
    fn identifies_longest_path_as_critical_chain() {
        let mut tasks = BTreeMap::new();
        tasks.insert("a".to_string(), task("a", 5, &[], None));
        tasks.insert("b".to_string(), task("b", 3, &["a"], None));
        tasks.insert("c".to_string(), task("c", 10, &["a"], None));
        tasks.insert("d".to_string(), task("d", 2, &["b", "c"], None));
        let graph = DependencyGraph::build(&tasks).unwrap();

        let (chain, path) = identify_critical_chain(&tasks, &graph).unwrap();
        assert_eq!(path, vec!["a", "c", "d"]);
        assert!(chain.is_critical());
    }

    #[test]
    fn resource_conflict_injects_precedence_between_non_dependent_tasks() {
        let mut tasks = BTreeMap::new();
        tasks.insert("a".to_string(), task("a", 5, &[], Some("dev")));
        tasks.insert("b".to_string(), task("b", 5, &["a"], None));
        tasks.insert("c".to_string(), task("c", 5, &["a"], Some("dev")));
        tasks.insert("d".to_string(), task("d", 1, &["b", "c"], None));
        let graph = DependencyGraph::build(&tasks).unwrap();

        let topo = graph.topological_sort().unwrap();
        let cpm = run_cpm(&tasks, &graph, &topo).unwrap();
        let path = find_critical_path(&graph, &cpm).unwrap();

        let adjusted = resolve_resource_conflicts(&path, &tasks, &graph).unwrap();
        assert!(adjusted.contains(&"a".to_string()));
        assert!(adjusted.contains(&"d".to_string()));
    }

    #[test]
    fn no_conflicts_returns_path_unchanged() {
        let mut tasks = BTreeMap::new();
        tasks.insert("a".to_string(), task("a", 5, &[], None));
        tasks.insert("b".to_string(), task("b", 5, &["a"], None));
        let graph = DependencyGraph::build(&tasks).unwrap();
        let path = vec!["a".to_string(), "b".to_string()];
        let adjusted = resolve_resource_conflicts(&path, &tasks, &graph).unwrap();
        assert_eq!(adjusted, path);
    }
}
