//! Dependency-respecting task ordering.
//!
//! Three edge sources feed the graph, strongest first:
//! 1. explicit dependency hints captured by the parser, resolved to a
//!    task by substring containment or word overlap;
//! 2. category precedence rules (database before api, api before ui,
//!    tests after implementation, deployment last);
//! 3. content-similarity clusters (two tasks mentioning schema words
//!    probably belong together, earlier one first).
//!
//! Cycles are repaired by dropping the weakest edge per cycle, then a
//! deterministic topological sort produces the final order. The public
//! entry point never fails: any internal fault falls back to the
//! original input order.

use crate::core::graph::{DependencyGraph, EdgeProvenance};
use crate::core::task::{Task, TaskCategory, TaskId};
use crate::error::{Error, Result};
use crate::{tplog_debug, tplog_warn};
use std::collections::{HashMap, HashSet};

const TYPE_EDGE_CONFIDENCE: f64 = 0.3;
const IMPLICIT_BASE_CONFIDENCE: f64 = 0.35;
const IMPLICIT_CONFIDENCE_SPAN: f64 = 0.14;
const MIN_HINT_OVERLAP: f64 = 0.5;

/// Category pairs (first runs before second).
static CATEGORY_PRECEDENCE: &[(TaskCategory, TaskCategory)] = &[
    (TaskCategory::Database, TaskCategory::Api),
    (TaskCategory::Database, TaskCategory::Ui),
    (TaskCategory::Api, TaskCategory::Ui),
    (TaskCategory::Database, TaskCategory::Test),
    (TaskCategory::Api, TaskCategory::Test),
    (TaskCategory::Ui, TaskCategory::Test),
    (TaskCategory::Database, TaskCategory::Security),
    (TaskCategory::Api, TaskCategory::Security),
    (TaskCategory::Ui, TaskCategory::Security),
    (TaskCategory::Database, TaskCategory::Performance),
    (TaskCategory::Api, TaskCategory::Performance),
    (TaskCategory::Ui, TaskCategory::Performance),
    (TaskCategory::Database, TaskCategory::Refactor),
    (TaskCategory::Api, TaskCategory::Refactor),
    (TaskCategory::Ui, TaskCategory::Refactor),
    (TaskCategory::Database, TaskCategory::Deployment),
    (TaskCategory::Api, TaskCategory::Deployment),
    (TaskCategory::Ui, TaskCategory::Deployment),
    (TaskCategory::Test, TaskCategory::Deployment),
    (TaskCategory::Security, TaskCategory::Deployment),
    (TaskCategory::Performance, TaskCategory::Deployment),
    (TaskCategory::Refactor, TaskCategory::Deployment),
];

/// Content-similarity clusters; sharing a word from one cluster links
/// two tasks with a weak edge.
static SIMILARITY_CLUSTERS: &[&[&str]] = &[
    &["component", "widget", "view", "screen", "layout"],
    &["endpoint", "route", "handler", "controller"],
    &["schema", "migration", "table", "index"],
    &["test", "spec", "coverage", "assertion"],
];

/// Orders tasks so dependencies run first.
pub struct Sequencer;

impl Sequencer {
    pub fn new() -> Self {
        Self
    }

    /// Order tasks dependency-first.
    ///
    /// Always returns a permutation of the input. Empty and singleton
    /// inputs pass through; any internal fault falls back to the
    /// original order rather than failing the run.
    pub fn sequence(&self, tasks: Vec<Task>) -> Vec<Task> {
        if tasks.len() <= 1 {
            return tasks;
        }

        match self.try_sequence(&tasks) {
            Ok(order) => {
                let mut by_id: HashMap<TaskId, Task> =
                    tasks.into_iter().map(|t| (t.id, t)).collect();
                order
                    .into_iter()
                    .filter_map(|id| by_id.remove(&id))
                    .collect()
            }
            Err(e) => {
                tplog_warn!("Sequencer fell back to input order: {}", e);
                tasks
            }
        }
    }

    fn try_sequence(&self, tasks: &[Task]) -> Result<Vec<TaskId>> {
        let mut graph = DependencyGraph::new();
        for task in tasks {
            if !graph.add_task(task.clone()) {
                return Err(Error::Validation(format!(
                    "Duplicate task id {} in sequencer input",
                    task.id
                )));
            }
        }

        self.add_explicit_edges(&mut graph, tasks)?;
        self.add_type_edges(&mut graph, tasks)?;
        self.add_implicit_edges(&mut graph, tasks)?;

        let removed = graph.repair_cycles();
        if !removed.is_empty() {
            tplog_debug!(
                "Sequencer removed {} edge(s) during cycle repair",
                removed.len()
            );
        }

        graph.topological_order()
    }

    /// Resolve each captured hint to the best-overlapping other task.
    fn add_explicit_edges(&self, graph: &mut DependencyGraph, tasks: &[Task]) -> Result<()> {
        for task in tasks {
            for hint in &task.dependency_hints {
                let Some((runs_before, target)) = split_hint(hint) else {
                    continue;
                };

                let mut best: Option<(TaskId, f64)> = None;
                for candidate in tasks {
                    if candidate.id == task.id {
                        continue;
                    }
                    let overlap = hint_overlap(&target, &candidate.description);
                    if overlap >= MIN_HINT_OVERLAP
                        && best.map_or(true, |(_, b)| overlap > b)
                    {
                        best = Some((candidate.id, overlap));
                    }
                }

                if let Some((other, confidence)) = best {
                    // "before X" points the other way round.
                    let (from, to) = if runs_before {
                        (task.id, other)
                    } else {
                        (other, task.id)
                    };
                    graph.add_edge(from, to, EdgeProvenance::Explicit, confidence)?;
                }
            }
        }
        Ok(())
    }

    fn add_type_edges(&self, graph: &mut DependencyGraph, tasks: &[Task]) -> Result<()> {
        for &(first, second) in CATEGORY_PRECEDENCE {
            for a in tasks.iter().filter(|t| t.category == first) {
                for b in tasks.iter().filter(|t| t.category == second) {
                    graph.add_edge(a.id, b.id, EdgeProvenance::TypeBased, TYPE_EDGE_CONFIDENCE)?;
                }
            }
        }
        Ok(())
    }

    /// Link same-cluster tasks earlier-first with a weak edge whose
    /// confidence grows with description overlap but stays below the
    /// explicit band.
    fn add_implicit_edges(&self, graph: &mut DependencyGraph, tasks: &[Task]) -> Result<()> {
        for cluster in SIMILARITY_CLUSTERS {
            let members: Vec<&Task> = tasks
                .iter()
                .filter(|t| {
                    let words = word_set(&t.description);
                    cluster.iter().any(|m| words.contains(*m))
                })
                .collect();

            for pair in members.windows(2) {
                let (earlier, later) = (pair[0], pair[1]);
                let overlap = description_overlap(&earlier.description, &later.description);
                let confidence = IMPLICIT_BASE_CONFIDENCE + IMPLICIT_CONFIDENCE_SPAN * overlap;
                graph.add_edge(earlier.id, later.id, EdgeProvenance::Implicit, confidence)?;
            }
        }
        Ok(())
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a hint like "depends on database schema" into its direction
/// and target phrase. Returns `(runs_before, target)`; `runs_before`
/// is true for "before X" hints, where the hinting task precedes X.
fn split_hint(hint: &str) -> Option<(bool, String)> {
    let lower = hint.trim().to_lowercase();
    for trigger in ["depends on", "after", "requires", "needs"] {
        if let Some(rest) = lower.strip_prefix(trigger) {
            let target = rest.trim();
            if !target.is_empty() {
                return Some((false, target.to_string()));
            }
        }
    }
    if let Some(rest) = lower.strip_prefix("before") {
        let target = rest.trim();
        if !target.is_empty() {
            return Some((true, target.to_string()));
        }
    }
    None
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

/// Fraction of the hint's words found in the candidate description.
/// Substring containment counts as a full match.
fn hint_overlap(target: &str, description: &str) -> f64 {
    if description.to_lowercase().contains(target) {
        return 1.0;
    }
    let hint_words = word_set(target);
    if hint_words.is_empty() {
        return 0.0;
    }
    let desc_words = word_set(description);
    let shared = hint_words.intersection(&desc_words).count();
    shared as f64 / hint_words.len() as f64
}

/// Word overlap between two descriptions relative to the smaller one.
fn description_overlap(a: &str, b: &str) -> f64 {
    let wa = word_set(a);
    let wb = word_set(b);
    let smaller = wa.len().min(wb.len());
    if smaller == 0 {
        return 0.0;
    }
    wa.intersection(&wb).count() as f64 / smaller as f64
}
