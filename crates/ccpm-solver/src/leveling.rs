//! Resource leveller: graph-coloring conflict resolution followed by a
//! 3-pass ASAP/ALAP schedule adjustment (4.E).
//!
//! This implementation deliberately omits the "parallel-with-critical" delay
//! optimization the ported algorithm's second pass references but never
//! builds in time to use — see the Open Questions in SPEC_FULL.md. Pass 2
//! here schedules non-critical, non-feeding tasks purely ASAP.

use std::collections::{BTreeMap, BTreeSet};

use ccpm_core::{ChainKind, Task, TaskId};

use crate::graph::{CpmResult, DependencyGraph};

#[derive(Debug, Clone, Default)]
pub struct LevelingResult {
    pub early_start: BTreeMap<TaskId, i64>,
    pub early_finish: BTreeMap<TaskId, i64>,
}

fn shares_over_capacity(a: &Task, b: &Task) -> bool {
    a.resources.iter().any(|(r, &alloc_a)| {
        b.resources
            .get(r)
            .is_some_and(|&alloc_b| alloc_a + alloc_b > 1.0)
    })
}

fn shares_any_resource(a: &Task, b: &Task) -> bool {
    a.resources.keys().any(|r| b.resources.contains_key(r))
}

fn directly_dependent(a_id: &str, a: &Task, b_id: &str, b: &Task) -> bool {
    a.dependencies.iter().any(|d| d == b_id) || b.dependencies.iter().any(|d| d == a_id)
}

/// Undirected conflict edges between tasks sharing a resource beyond its
/// capacity and not already directly dependent.
fn build_conflict_graph(tasks: &BTreeMap<TaskId, Task>) -> BTreeMap<TaskId, BTreeSet<TaskId>> {
    let mut conflicts: BTreeMap<TaskId, BTreeSet<TaskId>> =
        tasks.keys().map(|id| (id.clone(), BTreeSet::new())).collect();

    let ids: Vec<&TaskId> = tasks.keys().collect();
    for (i, &a_id) in ids.iter().enumerate() {
        for &b_id in &ids[i + 1..] {
            let a = &tasks[a_id];
            let b = &tasks[b_id];
            if directly_dependent(a_id, a, b_id, b) {
                continue;
            }
            if shares_over_capacity(a, b) {
                conflicts.get_mut(a_id).unwrap().insert(b_id.clone());
                conflicts.get_mut(b_id).unwrap().insert(a_id.clone());
            }
        }
    }
    conflicts
}

/// `1000 - late_finish - (500 if feeding)`, lower value scheduled first,
/// unless the task sits on the supplied priority chain, which always wins
/// ordered by its position on that chain.
fn task_priority(task_id: &str, task: &Task, cpm: &CpmResult, priority_chain: &[TaskId]) -> i64 {
    if let Some(pos) = priority_chain.iter().position(|id| id == task_id) {
        return pos as i64 - 1_000_000;
    }
    let late_finish = cpm.late_finish.get(task_id).copied().unwrap_or(0);
    let feeding_bonus = if task.chain_kind == ChainKind::Feeding { 500 } else { 0 };
    1000 - late_finish - feeding_bonus
}

/// Greedy graph coloring: process nodes ascending by priority, assign the
/// smallest color not already used by a colored neighbor.
fn color_graph(
    conflicts: &BTreeMap<TaskId, BTreeSet<TaskId>>,
    tasks: &BTreeMap<TaskId, Task>,
    cpm: &CpmResult,
    priority_chain: &[TaskId],
) -> BTreeMap<TaskId, usize> {
    let mut nodes: Vec<&TaskId> = conflicts.keys().collect();
    nodes.sort_by_key(|id| (task_priority(id, &tasks[*id], cpm, priority_chain), (*id).clone()));

    let mut coloring: BTreeMap<TaskId, usize> = BTreeMap::new();
    for id in nodes {
        let used: BTreeSet<usize> = conflicts[id]
            .iter()
            .filter_map(|n| coloring.get(n).copied())
            .collect();
        let mut color = 0;
        while used.contains(&color) {
            color += 1;
        }
        coloring.insert(id.clone(), color);
    }
    coloring
}

fn topo_within(graph: &DependencyGraph, nodes: &BTreeSet<TaskId>) -> Vec<TaskId> {
    graph
        .topological_sort_subset(nodes)
        .unwrap_or_else(|_| nodes.iter().cloned().collect())
}

/// Schedule `group` ASAP: each task starts at the max of its dependencies'
/// recorded finish times and the finish times of same-resource tasks already
/// placed in a strictly earlier color.
fn schedule_asap(
    group_by_color: &BTreeMap<usize, Vec<TaskId>>,
    tasks: &BTreeMap<TaskId, Task>,
    graph: &DependencyGraph,
    finish_times: &mut BTreeMap<TaskId, i64>,
    result: &mut LevelingResult,
) {
    for (&color, ids) in group_by_color {
        if ids.is_empty() {
            continue;
        }
        let set: BTreeSet<TaskId> = ids.iter().cloned().collect();
        for id in topo_within(graph, &set) {
            let task = &tasks[&id];
            let mut earliest_start = 0i64;

            for dep in &task.dependencies {
                if let Some(&finish) = finish_times.get(dep) {
                    earliest_start = earliest_start.max(finish);
                }
            }

            for prev_color in 0..color {
                let Some(prev_ids) = group_by_color.get(&prev_color) else { continue };
                for prev_id in prev_ids {
                    if finish_times.contains_key(prev_id) && shares_any_resource(task, &tasks[prev_id]) {
                        earliest_start = earliest_start.max(finish_times[prev_id]);
                    }
                }
            }

            let finish = earliest_start + task.planned_duration;
            result.early_start.insert(id.clone(), earliest_start);
            result.early_finish.insert(id.clone(), finish);
            finish_times.insert(id, finish);
        }
    }
}

/// Apply graph coloring and the 3-pass ASAP/ALAP schedule adjustment.
/// `priority_chain` (typically the critical chain) gets the highest
/// scheduling priority in the coloring step.
pub fn level_resources(
    tasks: &BTreeMap<TaskId, Task>,
    graph: &DependencyGraph,
    cpm: &CpmResult,
    priority_chain: &[TaskId],
) -> LevelingResult {
    let conflicts = build_conflict_graph(tasks);
    let mut result = LevelingResult::default();

    if conflicts.values().all(BTreeSet::is_empty) {
        result.early_start = cpm.early_start.clone();
        result.early_finish = cpm.early_finish.clone();
        return result;
    }

    let coloring = color_graph(&conflicts, tasks, cpm, priority_chain);

    let mut by_color: BTreeMap<usize, Vec<TaskId>> = BTreeMap::new();
    for (id, &color) in &coloring {
        by_color.entry(color).or_default().push(id.clone());
    }

    let critical_set: BTreeSet<TaskId> = priority_chain.iter().cloned().collect();
    let mut feeding_set: BTreeSet<TaskId> = tasks
        .iter()
        .filter(|(id, t)| t.chain_kind == ChainKind::Feeding && !critical_set.contains(*id))
        .map(|(id, _)| id.clone())
        .collect();
    for id in tasks.keys() {
        if !critical_set.contains(id) && !feeding_set.contains(id) {
            let reaches_critical = critical_set.iter().any(|c| graph_reachable(graph, id, c));
            if reaches_critical {
                feeding_set.insert(id.clone());
            }
        }
    }

    let mut finish_times: BTreeMap<TaskId, i64> = BTreeMap::new();

    let critical_groups: BTreeMap<usize, Vec<TaskId>> = by_color
        .iter()
        .map(|(&c, ids)| (c, ids.iter().filter(|id| critical_set.contains(*id)).cloned().collect()))
        .collect();
    schedule_asap(&critical_groups, tasks, graph, &mut finish_times, &mut result);

    let plain_groups: BTreeMap<usize, Vec<TaskId>> = by_color
        .iter()
        .map(|(&c, ids)| {
            (
                c,
                ids.iter()
                    .filter(|id| !critical_set.contains(*id) && !feeding_set.contains(*id))
                    .cloned()
                    .collect(),
            )
        })
        .collect();
    schedule_asap(&plain_groups, tasks, graph, &mut finish_times, &mut result);

    // Pass 3: feeding tasks ALAP via backward pass.
    let project_duration = result
        .early_finish
        .values()
        .copied()
        .max()
        .unwrap_or(cpm.project_duration);

    let mut latest_finish: BTreeMap<TaskId, i64> = BTreeMap::new();
    for id in &feeding_set {
        latest_finish.insert(id.clone(), project_duration);
    }

    let feeding_topo = {
        let mut reversed = graph.clone();
        std::mem::swap(&mut reversed.successors, &mut reversed.predecessors);
        topo_within(&reversed, &feeding_set)
    };

    for id in &feeding_topo {
        let mut min_successor_start = project_duration;
        if let Some(successors) = graph.successors.get(id) {
            for succ in successors {
                if let Some(&succ_finish) = latest_finish.get(succ) {
                    let succ_start = succ_finish - tasks[succ].planned_duration;
                    min_successor_start = min_successor_start.min(succ_start);
                }
            }
        }

        let task_color = coloring.get(id).copied().unwrap_or(0);
        for (other_id, &other_color) in &coloring {
            if other_id == id || other_color <= task_color {
                continue;
            }
            if let Some(&other_finish) = latest_finish.get(other_id) {
                if shares_any_resource(&tasks[id], &tasks[other_id]) {
                    let other_start = other_finish - tasks[other_id].planned_duration;
                    min_successor_start = min_successor_start.min(other_start);
                }
            }
        }

        latest_finish.insert(id.clone(), min_successor_start);
    }

    for id in &feeding_set {
        let task = &tasks[id];
        let latest_start = latest_finish[id] - task.planned_duration;

        let mut earliest_possible_start = 0i64;
        for dep in &task.dependencies {
            if let Some(&finish) = finish_times.get(dep) {
                earliest_possible_start = earliest_possible_start.max(finish);
            }
        }

        let start_time = earliest_possible_start.max(latest_start);
        let finish = start_time + task.planned_duration;

        result.early_start.insert(id.clone(), start_time);
        result.early_finish.insert(id.clone(), finish);
        finish_times.insert(id.clone(), finish);
    }

    result
}

fn graph_reachable(graph: &DependencyGraph, from: &str, to: &str) -> bool {
    let mut seen = BTreeSet::new();
    let mut stack = vec![from.to_string()];
    while let Some(id) = stack.pop() {
        if id == to {
            return true;
        }
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(next) = graph.successors.get(&id) {
            stack.extend(next.iter().cloned());
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::run_cpm;

    fn task(id: &str, duration: i64, deps: &[&str], resource: Option<&str>) -> Task {
        let mut t = Task::new(id, id, duration).unwrap().depends_on_all(deps.iter().map(|d| d.to_string()));
        if let Some(r) = resource {
            t = t.resources(r);
        }
        t
    }

    #[test]
    fn no_conflicts_keeps_cpm_schedule() {
        let mut tasks = BTreeMap::new();
        tasks.insert("a".to_string(), task("a", 5, &[], None));
        tasks.insert("b".to_string(), task("b", 3, &["a"], None));
        let graph = DependencyGraph::build(&tasks).unwrap();
        let topo = graph.topological_sort().unwrap();
        let cpm = run_cpm(&tasks, &graph, &topo).unwrap();

        let result = level_resources(&tasks, &graph, &cpm, &["a".to_string(), "b".to_string()]);
        assert_eq!(result.early_start["b"], cpm.early_start["b"]);
    }

    #[test]
    fn conflicting_tasks_get_sequenced_not_overlapped() {
        let mut tasks = BTreeMap::new();
        tasks.insert("a".to_string(), task("a", 5, &[], Some("dev")));
        tasks.insert("b".to_string(), task("b", 5, &[], Some("dev")));
        let graph = DependencyGraph::build(&tasks).unwrap();
        let topo = graph.topological_sort().unwrap();
        let cpm = run_cpm(&tasks, &graph, &topo).unwrap();

        let result = level_resources(&tasks, &graph, &cpm, &[]);
        let a_range = (result.early_start["a"], result.early_finish["a"]);
        let b_range = (result.early_start["b"], result.early_finish["b"]);
        assert!(a_range.1 <= b_range.0 || b_range.1 <= a_range.0);
    }

    #[test]
    fn priority_chain_tasks_are_scheduled_first() {
        let mut tasks = BTreeMap::new();
        tasks.insert("a".to_string(), task("a", 5, &[], Some("dev")));
        tasks.insert("b".to_string(), task("b", 5, &[], Some("dev")));
        let graph = DependencyGraph::build(&tasks).unwrap();
        let topo = graph.topological_sort().unwrap();
        let cpm = run_cpm(&tasks, &graph, &topo).unwrap();

        let result = level_resources(&tasks, &graph, &cpm, &["b".to_string()]);
        assert_eq!(result.early_start["b"], 0);
    }
}
