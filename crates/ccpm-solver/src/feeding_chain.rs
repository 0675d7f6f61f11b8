//! Feeding chain identification: paths of non-critical tasks that feed into
//! the critical chain (4.D).

use std::collections::{BTreeMap, BTreeSet};

use ccpm_core::{Chain, ChainError, ChainKind, Task, TaskId};

use crate::graph::DependencyGraph;

/// Trace every non-critical path that joins the critical chain, each becoming
/// its own [`Chain`] connected to the critical-chain task it feeds.
///
/// Where a feeding task has more than one non-critical predecessor, the
/// longest by `planned_duration` is followed; ties break on the smaller
/// `TaskId` so the result is deterministic regardless of input order (the
/// original algorithm this is ported from has no tie-break at all).
///
/// A task already claimed by an earlier-constructed feeding chain is never
/// re-claimed: feeding points are visited in critical-path order, so the
/// chain with the earlier critical connection point wins (4.D non-overlap).
pub fn identify_feeding_chains(
    tasks: &BTreeMap<TaskId, Task>,
    critical_path: &[TaskId],
    graph: &DependencyGraph,
) -> Result<Vec<Chain>, ChainError> {
    let critical_set: BTreeSet<&TaskId> = critical_path.iter().collect();

    let mut feeding_points: Vec<(TaskId, TaskId)> = Vec::new();
    for critical_task_id in critical_path {
        if let Some(preds) = graph.predecessors.get(critical_task_id) {
            for pred in preds {
                if !critical_set.contains(pred) {
                    feeding_points.push((critical_task_id.clone(), pred.clone()));
                }
            }
        }
    }

    let mut chains = Vec::new();
    let mut chain_number = 1;
    let mut claimed: BTreeSet<TaskId> = BTreeSet::new();

    for (critical_task_id, feeding_task_id) in feeding_points {
        if claimed.contains(&feeding_task_id) {
            continue;
        }

        let mut chain_tasks = vec![feeding_task_id.clone()];
        let mut current = feeding_task_id;

        loop {
            let mut preds: Vec<TaskId> = graph
                .predecessors
                .get(&current)
                .into_iter()
                .flatten()
                .filter(|p| !critical_set.contains(p) && !claimed.contains(*p))
                .cloned()
                .collect();

            if preds.is_empty() {
                break;
            }

            preds.sort_by(|a, b| {
                tasks[b]
                    .planned_duration
                    .cmp(&tasks[a].planned_duration)
                    .then_with(|| a.cmp(b))
            });

            current = preds[0].clone();
            chain_tasks.push(current.clone());
        }

        chain_tasks.reverse();
        claimed.extend(chain_tasks.iter().cloned());

        let chain = Chain::new(
            format!("feeding_{chain_number}"),
            format!("Feeding Chain {chain_number}"),
            ChainKind::Feeding,
            0.3,
        )?
        .with_tasks(chain_tasks)
        .connect_to(critical_task_id)?;

        chains.push(chain);
        chain_number += 1;
    }

    Ok(chains)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, duration: i64, deps: &[&str]) -> Task {
        Task::new(id, id, duration)
            .unwrap()
            .depends_on_all(deps.iter().map(|d| d.to_string()))
    }

    #[test]
    fn traces_a_single_feeding_chain_back_to_its_origin() {
        let mut tasks = BTreeMap::new();
        tasks.insert("a".to_string(), task("a", 5, &[]));
        tasks.insert("x1".to_string(), task("x1", 2, &[]));
        tasks.insert("x2".to_string(), task("x2", 3, &["x1"]));
        tasks.insert("b".to_string(), task("b", 4, &["a", "x2"]));
        let graph = DependencyGraph::build(&tasks).unwrap();

        let critical_path = vec!["a".to_string(), "b".to_string()];
        let chains = identify_feeding_chains(&tasks, &critical_path, &graph).unwrap();

        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].tasks, vec!["x1".to_string(), "x2".to_string()]);
        assert_eq!(chains[0].connects_to_task_id, Some("b".to_string()));
    }

    #[test]
    fn picks_longest_predecessor_with_lexicographic_tiebreak() {
        let mut tasks = BTreeMap::new();
        tasks.insert("a".to_string(), task("a", 5, &[]));
        tasks.insert("y1".to_string(), task("y1", 3, &[]));
        tasks.insert("y2".to_string(), task("y2", 3, &[]));
        tasks.insert("feed".to_string(), task("feed", 1, &["y1", "y2"]));
        tasks.insert("b".to_string(), task("b", 4, &["a", "feed"]));
        let graph = DependencyGraph::build(&tasks).unwrap();

        let critical_path = vec!["a".to_string(), "b".to_string()];
        let chains = identify_feeding_chains(&tasks, &critical_path, &graph).unwrap();

        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].tasks, vec!["y1".to_string(), "feed".to_string()]);
    }

    #[test]
    fn a_task_claimed_by_an_earlier_feeding_chain_is_not_reclaimed() {
        let mut tasks = BTreeMap::new();
        tasks.insert("x".to_string(), task("x", 2, &[]));
        tasks.insert("y".to_string(), task("y", 5, &["x"]));
        tasks.insert("z".to_string(), task("z", 4, &["y", "x"]));
        let graph = DependencyGraph::build(&tasks).unwrap();

        let critical_path = vec!["y".to_string(), "z".to_string()];
        let chains = identify_feeding_chains(&tasks, &critical_path, &graph).unwrap();

        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].tasks, vec!["x".to_string()]);
        assert_eq!(chains[0].connects_to_task_id, Some("y".to_string()));
    }

    #[test]
    fn no_feeding_tasks_yields_no_chains() {
        let mut tasks = BTreeMap::new();
        tasks.insert("a".to_string(), task("a", 5, &[]));
        tasks.insert("b".to_string(), task("b", 4, &["a"]));
        let graph = DependencyGraph::build(&tasks).unwrap();
        let critical_path = vec!["a".to_string(), "b".to_string()];
        let chains = identify_feeding_chains(&tasks, &critical_path, &graph).unwrap();
        assert!(chains.is_empty());
    }
}
