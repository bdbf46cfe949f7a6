//! Core domain types: tasks and the dependency graph.

pub mod graph;
pub mod task;
