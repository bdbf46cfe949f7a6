//! taskpilot — the decision core of a developer-automation pipeline.
//!
//! Given free-form text containing action items, taskpilot extracts
//! discrete tasks, computes a dependency-respecting execution order,
//! drives each task through an external completion agent, and runs a
//! bounded confirmation protocol to decide whether a task is truly
//! finished or needs a human.
//!
//! The pipeline, leaves first:
//! - [`parser::InputParser`] — pattern-catalog task extraction
//! - [`sequencer::Sequencer`] — dependency graph, cycle repair, ordering
//! - [`confirm::ConfirmationProtocol`] — bounded status-query loop
//! - [`orchestrator::SessionOrchestrator`] — end-to-end session runs
//!
//! Everything that touches the outside world (the agent channel, the
//! quality validator, the optional workflow engine, progress sinks)
//! sits behind the traits in [`agent`] and [`orchestrator::events`].

pub mod agent;
pub mod config;
pub mod confirm;
pub mod core;
pub mod detection;
pub mod error;
pub mod log;
pub mod orchestrator;
pub mod parser;
pub mod sequencer;

pub use agent::{
    AgentChannel, AssessmentReport, FallbackDetector, InputNeed, KeywordFallbackDetector,
    QualityValidator, WorkflowContext, WorkflowEngine, WorkflowOutcome,
};
pub use config::{Config, ConfirmConfig};
pub use confirm::{
    ConfirmOutcome, ConfirmStatus, ConfirmationAttempt, ConfirmationProtocol, TestOutcome,
};
pub use core::graph::{DependencyEdge, DependencyGraph, EdgeProvenance};
pub use core::task::{Task, TaskCategory, TaskId, TaskStatus};
pub use error::{Error, Result};
pub use orchestrator::{
    ExecutionPath, MpscProgressSink, ProgressEvent, ProgressSink, RunOptions, Session, SessionId,
    SessionOrchestrator, SessionRegistry, SessionResult, SessionStatus, TaskResult,
};
pub use parser::InputParser;
pub use sequencer::Sequencer;
