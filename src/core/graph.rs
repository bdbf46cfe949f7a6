//! Dependency graph for task ordering.
//!
//! Tasks live in an arena indexed by id; dependencies are an explicit
//! list of (from, to, provenance, confidence) edges. Cycle repair drops
//! the lowest-confidence edge on each cycle until the edge set is
//! acyclic, so ordering always terminates. petgraph is used for cycle
//! detection only, never as the owning representation.

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Why a dependency edge was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeProvenance {
    /// The task text referenced another task directly.
    Explicit,
    /// A category-precedence rule (e.g. database before api).
    TypeBased,
    /// A content-similarity cluster heuristic.
    Implicit,
}

impl std::fmt::Display for EdgeProvenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeProvenance::Explicit => write!(f, "explicit"),
            EdgeProvenance::TypeBased => write!(f, "type_based"),
            EdgeProvenance::Implicit => write!(f, "implicit"),
        }
    }
}

/// A single dependency: `from` must complete before `to` starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: TaskId,
    pub to: TaskId,
    pub provenance: EdgeProvenance,
    /// Strength of the edge in [0, 1]; cycle repair drops the weakest
    /// edge on each cycle.
    pub confidence: f64,
}

/// The task dependency graph.
///
/// Nodes are task ids held in an arena; edges are explicit tuples.
/// Insertion order is preserved for deterministic ordering tie-breaks.
pub struct DependencyGraph {
    tasks: HashMap<TaskId, Task>,
    /// Task ids in insertion order.
    order: Vec<TaskId>,
    edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            order: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Add a task to the arena.
    ///
    /// Returns false if a task with the same id is already present.
    pub fn add_task(&mut self, task: Task) -> bool {
        if self.tasks.contains_key(&task.id) {
            return false;
        }
        self.order.push(task.id);
        self.tasks.insert(task.id, task);
        true
    }

    /// Add a dependency edge: `from` must complete before `to`.
    ///
    /// Self-edges are rejected. Duplicate (from, to) pairs keep the
    /// highest-confidence edge. Cycles are allowed here; they are
    /// resolved later by `repair_cycles`.
    ///
    /// # Errors
    /// Returns an error if either endpoint is not in the arena.
    pub fn add_edge(
        &mut self,
        from: TaskId,
        to: TaskId,
        provenance: EdgeProvenance,
        confidence: f64,
    ) -> Result<()> {
        if !self.tasks.contains_key(&from) {
            return Err(Error::Validation(format!("Task {} not in graph", from)));
        }
        if !self.tasks.contains_key(&to) {
            return Err(Error::Validation(format!("Task {} not in graph", to)));
        }
        if from == to {
            return Ok(());
        }
        let confidence = confidence.clamp(0.0, 1.0);

        if let Some(existing) = self
            .edges
            .iter_mut()
            .find(|e| e.from == from && e.to == to)
        {
            if confidence > existing.confidence {
                existing.confidence = confidence;
                existing.provenance = provenance;
            }
            return Ok(());
        }

        self.edges.push(DependencyEdge {
            from,
            to,
            provenance,
            confidence,
        });
        Ok(())
    }

    /// Get a reference to a task by its id.
    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Check if the graph contains a task.
    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Number of tasks in the arena.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All edges, in creation order.
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Check if a dependency exists between two tasks.
    pub fn has_edge(&self, from: &TaskId, to: &TaskId) -> bool {
        self.edges.iter().any(|e| e.from == *from && e.to == *to)
    }

    /// Check whether the current edge set is acyclic.
    pub fn is_acyclic(&self) -> bool {
        self.cycle_members().is_empty()
    }

    /// Task ids participating in at least one cycle.
    fn cycle_members(&self) -> HashSet<TaskId> {
        let graph = self.to_petgraph();
        let mut members = HashSet::new();

        // Self-edges are rejected at insertion, so singleton SCCs are
        // never cyclic here.
        for scc in tarjan_scc(&graph) {
            if scc.len() > 1 {
                for node in scc {
                    members.insert(graph[node]);
                }
            }
        }
        members
    }

    fn to_petgraph(&self) -> DiGraph<TaskId, ()> {
        let mut graph = DiGraph::new();
        let mut index_of: HashMap<TaskId, NodeIndex> = HashMap::new();
        for id in &self.order {
            let idx = graph.add_node(*id);
            index_of.insert(*id, idx);
        }
        for edge in &self.edges {
            if let (Some(&from), Some(&to)) = (index_of.get(&edge.from), index_of.get(&edge.to)) {
                graph.add_edge(from, to, ());
            }
        }
        graph
    }

    /// Break every cycle by removing its single lowest-confidence edge.
    ///
    /// Repeats until acyclic, bounded by the initial edge count so
    /// termination is guaranteed (every iteration on a cyclic graph
    /// removes at least one edge). Returns the removed edges.
    pub fn repair_cycles(&mut self) -> Vec<DependencyEdge> {
        let mut removed = Vec::new();
        let bound = self.edges.len();

        for _ in 0..=bound {
            let members = self.cycle_members();
            if members.is_empty() {
                break;
            }

            // Weakest edge inside the cyclic region; ties broken by
            // creation order for determinism.
            let victim = self
                .edges
                .iter()
                .enumerate()
                .filter(|(_, e)| members.contains(&e.from) && members.contains(&e.to))
                .min_by(|(ia, a), (ib, b)| {
                    a.confidence
                        .partial_cmp(&b.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(ia.cmp(ib))
                })
                .map(|(i, _)| i);

            match victim {
                Some(i) => removed.push(self.edges.remove(i)),
                None => break,
            }
        }

        removed
    }

    /// Tasks in dependency-respecting order.
    ///
    /// Deterministic Kahn topological sort over a one-pass adjacency
    /// index; among tasks whose dependencies are all satisfied, the one
    /// added to the arena first comes first (ready set is a min-heap on
    /// insertion position).
    ///
    /// # Errors
    /// Returns an error if the edge set still contains a cycle
    /// (callers run `repair_cycles` first).
    pub fn topological_order(&self) -> Result<Vec<TaskId>> {
        let position: HashMap<TaskId, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();

        let mut in_degree: HashMap<TaskId, usize> =
            self.order.iter().map(|id| (*id, 0)).collect();
        let mut successors: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for edge in &self.edges {
            if let Some(d) = in_degree.get_mut(&edge.to) {
                *d += 1;
            }
            successors.entry(edge.from).or_default().push(edge.to);
        }

        let mut ready: BinaryHeap<Reverse<usize>> = self
            .order
            .iter()
            .enumerate()
            .filter(|(_, id)| in_degree[id] == 0)
            .map(|(i, _)| Reverse(i))
            .collect();
        let mut result = Vec::with_capacity(self.order.len());

        while let Some(Reverse(i)) = ready.pop() {
            let id = self.order[i];
            result.push(id);
            let Some(next) = successors.get(&id) else {
                continue;
            };
            for to in next {
                if let Some(d) = in_degree.get_mut(to) {
                    *d = d.saturating_sub(1);
                    if *d == 0 {
                        if let Some(&pos) = position.get(to) {
                            ready.push(Reverse(pos));
                        }
                    }
                }
            }
        }

        if result.len() < self.order.len() {
            return Err(Error::Validation(
                "Cycle detected during topological sort".to_string(),
            ));
        }
        Ok(result)
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("tasks", &self.task_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_task(description: &str) -> Task {
        Task::new(description, "explicit_todo", 0)
    }

    // EdgeProvenance tests

    #[test]
    fn test_provenance_display() {
        assert_eq!(format!("{}", EdgeProvenance::Explicit), "explicit");
        assert_eq!(format!("{}", EdgeProvenance::TypeBased), "type_based");
        assert_eq!(format!("{}", EdgeProvenance::Implicit), "implicit");
    }

    #[test]
    fn test_provenance_serialization() {
        let json = serde_json::to_string(&EdgeProvenance::TypeBased).unwrap();
        assert!(json.contains("type_based"));
        let parsed: EdgeProvenance = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, EdgeProvenance::TypeBased);
    }

    // Basic graph tests

    #[test]
    fn test_graph_new() {
        let graph = DependencyGraph::new();
        assert_eq!(graph.task_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.is_acyclic());
    }

    #[test]
    fn test_graph_add_task() {
        let mut graph = DependencyGraph::new();
        let task = test_task("task a");
        let id = task.id;

        assert!(graph.add_task(task));
        assert_eq!(graph.task_count(), 1);
        assert!(graph.contains_task(&id));
        assert_eq!(graph.get_task(&id).unwrap().description, "task a");
    }

    #[test]
    fn test_graph_add_task_duplicate() {
        let mut graph = DependencyGraph::new();
        let task = test_task("task a");

        assert!(graph.add_task(task.clone()));
        assert!(!graph.add_task(task));
        assert_eq!(graph.task_count(), 1);
    }

    #[test]
    fn test_graph_add_edge() {
        let mut graph = DependencyGraph::new();
        let a = test_task("task a");
        let b = test_task("task b");
        let (ia, ib) = (a.id, b.id);
        graph.add_task(a);
        graph.add_task(b);

        graph.add_edge(ia, ib, EdgeProvenance::Explicit, 0.8).unwrap();

        assert_eq!(graph.edge_count(), 1);
        assert!(graph.has_edge(&ia, &ib));
        assert!(!graph.has_edge(&ib, &ia));
    }

    #[test]
    fn test_graph_add_edge_missing_endpoint() {
        let mut graph = DependencyGraph::new();
        let a = test_task("task a");
        let ia = a.id;
        graph.add_task(a);

        let result = graph.add_edge(ia, TaskId::new(), EdgeProvenance::Explicit, 0.8);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not in graph"));
    }

    #[test]
    fn test_graph_add_edge_self_loop_ignored() {
        let mut graph = DependencyGraph::new();
        let a = test_task("task a");
        let ia = a.id;
        graph.add_task(a);

        graph.add_edge(ia, ia, EdgeProvenance::Explicit, 0.8).unwrap();
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_graph_duplicate_edge_keeps_strongest() {
        let mut graph = DependencyGraph::new();
        let a = test_task("task a");
        let b = test_task("task b");
        let (ia, ib) = (a.id, b.id);
        graph.add_task(a);
        graph.add_task(b);

        graph.add_edge(ia, ib, EdgeProvenance::TypeBased, 0.3).unwrap();
        graph.add_edge(ia, ib, EdgeProvenance::Explicit, 0.9).unwrap();
        graph.add_edge(ia, ib, EdgeProvenance::Implicit, 0.4).unwrap();

        assert_eq!(graph.edge_count(), 1);
        let edge = &graph.edges()[0];
        assert_eq!(edge.provenance, EdgeProvenance::Explicit);
        assert!((edge.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_graph_confidence_clamped() {
        let mut graph = DependencyGraph::new();
        let a = test_task("task a");
        let b = test_task("task b");
        let (ia, ib) = (a.id, b.id);
        graph.add_task(a);
        graph.add_task(b);

        graph.add_edge(ia, ib, EdgeProvenance::Explicit, 1.5).unwrap();
        assert!((graph.edges()[0].confidence - 1.0).abs() < f64::EPSILON);
    }

    // Cycle detection and repair tests

    #[test]
    fn test_acyclic_chain() {
        let mut graph = DependencyGraph::new();
        let tasks: Vec<Task> = (0..3).map(|i| test_task(&format!("task {}", i))).collect();
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        for t in tasks {
            graph.add_task(t);
        }
        graph.add_edge(ids[0], ids[1], EdgeProvenance::Explicit, 0.8).unwrap();
        graph.add_edge(ids[1], ids[2], EdgeProvenance::Explicit, 0.8).unwrap();

        assert!(graph.is_acyclic());
        assert!(graph.repair_cycles().is_empty());
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_two_node_cycle_removes_weakest() {
        let mut graph = DependencyGraph::new();
        let a = test_task("task a");
        let b = test_task("task b");
        let (ia, ib) = (a.id, b.id);
        graph.add_task(a);
        graph.add_task(b);

        graph.add_edge(ia, ib, EdgeProvenance::Explicit, 0.9).unwrap();
        graph.add_edge(ib, ia, EdgeProvenance::TypeBased, 0.3).unwrap();

        assert!(!graph.is_acyclic());
        let removed = graph.repair_cycles();

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].provenance, EdgeProvenance::TypeBased);
        assert!(graph.is_acyclic());
        assert!(graph.has_edge(&ia, &ib));
        assert!(!graph.has_edge(&ib, &ia));
    }

    #[test]
    fn test_three_node_cycle_repair() {
        let mut graph = DependencyGraph::new();
        let tasks: Vec<Task> = (0..3).map(|i| test_task(&format!("task {}", i))).collect();
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        for t in tasks {
            graph.add_task(t);
        }
        graph.add_edge(ids[0], ids[1], EdgeProvenance::Explicit, 0.9).unwrap();
        graph.add_edge(ids[1], ids[2], EdgeProvenance::Explicit, 0.8).unwrap();
        graph.add_edge(ids[2], ids[0], EdgeProvenance::Implicit, 0.4).unwrap();

        let removed = graph.repair_cycles();

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].provenance, EdgeProvenance::Implicit);
        assert!(graph.is_acyclic());
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_two_independent_cycles_repair() {
        let mut graph = DependencyGraph::new();
        let tasks: Vec<Task> = (0..4).map(|i| test_task(&format!("task {}", i))).collect();
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        for t in tasks {
            graph.add_task(t);
        }
        // Cycle 1: 0 <-> 1, cycle 2: 2 <-> 3
        graph.add_edge(ids[0], ids[1], EdgeProvenance::Explicit, 0.9).unwrap();
        graph.add_edge(ids[1], ids[0], EdgeProvenance::TypeBased, 0.3).unwrap();
        graph.add_edge(ids[2], ids[3], EdgeProvenance::Explicit, 0.8).unwrap();
        graph.add_edge(ids[3], ids[2], EdgeProvenance::Implicit, 0.4).unwrap();

        let removed = graph.repair_cycles();

        assert_eq!(removed.len(), 2);
        assert!(graph.is_acyclic());
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_repair_terminates_on_dense_cycles() {
        let mut graph = DependencyGraph::new();
        let tasks: Vec<Task> = (0..4).map(|i| test_task(&format!("task {}", i))).collect();
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        for t in tasks {
            graph.add_task(t);
        }
        // Every ordered pair: maximally cyclic
        for &from in &ids {
            for &to in &ids {
                if from != to {
                    let _ = graph.add_edge(from, to, EdgeProvenance::Implicit, 0.4);
                }
            }
        }

        graph.repair_cycles();
        assert!(graph.is_acyclic());
        assert!(graph.topological_order().is_ok());
    }

    // Topological order tests

    #[test]
    fn test_topological_order_empty() {
        let graph = DependencyGraph::new();
        assert!(graph.topological_order().unwrap().is_empty());
    }

    #[test]
    fn test_topological_order_chain() {
        let mut graph = DependencyGraph::new();
        let tasks: Vec<Task> = (0..3).map(|i| test_task(&format!("task {}", i))).collect();
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        for t in tasks {
            graph.add_task(t);
        }
        // Reverse dependency: 2 before 1 before 0
        graph.add_edge(ids[2], ids[1], EdgeProvenance::Explicit, 0.8).unwrap();
        graph.add_edge(ids[1], ids[0], EdgeProvenance::Explicit, 0.8).unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec![ids[2], ids[1], ids[0]]);
    }

    #[test]
    fn test_topological_order_tie_break_is_insertion_order() {
        let mut graph = DependencyGraph::new();
        let tasks: Vec<Task> = (0..4).map(|i| test_task(&format!("task {}", i))).collect();
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        for t in tasks {
            graph.add_task(t);
        }
        // No edges: output must equal insertion order
        let order = graph.topological_order().unwrap();
        assert_eq!(order, ids);
    }

    #[test]
    fn test_topological_order_tie_break_holds_as_tasks_become_ready() {
        let mut graph = DependencyGraph::new();
        let tasks: Vec<Task> = (0..6).map(|i| test_task(&format!("task {}", i))).collect();
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        for t in tasks {
            graph.add_task(t);
        }
        // Three independent chains: 0 -> 3, 1 -> 4, 2 -> 5. Tasks 3-5
        // become ready one at a time but must still emit in insertion
        // order relative to the already-ready ones.
        graph.add_edge(ids[0], ids[3], EdgeProvenance::Explicit, 0.8).unwrap();
        graph.add_edge(ids[1], ids[4], EdgeProvenance::Explicit, 0.8).unwrap();
        graph.add_edge(ids[2], ids[5], EdgeProvenance::Explicit, 0.8).unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(order, ids);
    }

    #[test]
    fn test_topological_order_diamond() {
        let mut graph = DependencyGraph::new();
        let tasks: Vec<Task> = (0..4).map(|i| test_task(&format!("task {}", i))).collect();
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        for t in tasks {
            graph.add_task(t);
        }
        // 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3
        graph.add_edge(ids[0], ids[1], EdgeProvenance::Explicit, 0.8).unwrap();
        graph.add_edge(ids[0], ids[2], EdgeProvenance::Explicit, 0.8).unwrap();
        graph.add_edge(ids[1], ids[3], EdgeProvenance::Explicit, 0.8).unwrap();
        graph.add_edge(ids[2], ids[3], EdgeProvenance::Explicit, 0.8).unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec![ids[0], ids[1], ids[2], ids[3]]);
    }

    #[test]
    fn test_topological_order_errors_on_cycle() {
        let mut graph = DependencyGraph::new();
        let a = test_task("task a");
        let b = test_task("task b");
        let (ia, ib) = (a.id, b.id);
        graph.add_task(a);
        graph.add_task(b);
        graph.add_edge(ia, ib, EdgeProvenance::Explicit, 0.8).unwrap();
        graph.add_edge(ib, ia, EdgeProvenance::Explicit, 0.8).unwrap();

        assert!(graph.topological_order().is_err());
    }

    #[test]
    fn test_every_task_appears_exactly_once() {
        let mut graph = DependencyGraph::new();
        let tasks: Vec<Task> = (0..6).map(|i| test_task(&format!("task {}", i))).collect();
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        for t in tasks {
            graph.add_task(t);
        }
        graph.add_edge(ids[3], ids[0], EdgeProvenance::Explicit, 0.8).unwrap();
        graph.add_edge(ids[5], ids[2], EdgeProvenance::Implicit, 0.4).unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(order.len(), 6);
        let unique: HashSet<_> = order.iter().collect();
        assert_eq!(unique.len(), 6);
    }

    #[test]
    fn test_graph_debug() {
        let graph = DependencyGraph::new();
        let debug = format!("{:?}", graph);
        assert!(debug.contains("DependencyGraph"));
    }
}
