//! Collaborator seams for the orchestrator.
//!
//! Everything that talks to the outside world sits behind one of these
//! traits: the completion agent itself, the detector that decides when
//! an agent reply is really a question for the user, the quality
//! validator that corroborates a "completed" claim, and the optional
//! enhanced workflow engine. The orchestrator only ever sees the
//! traits, so tests drive it with stubs.

use crate::core::task::{TaskCategory, TaskId};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::detection;

/// The channel to the external completion agent.
///
/// Implementations must tolerate arbitrary free-text replies.
#[async_trait]
pub trait AgentChannel: Send + Sync {
    async fn send(&self, prompt: &str) -> Result<String>;
}

/// Whether an agent reply needs a human before the task can continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputNeed {
    Pause,
    Continue,
}

/// Consulted between confirmation attempts; a `Pause` verdict stops the
/// retry loop and surfaces a paused task instead of a failed one.
#[async_trait]
pub trait FallbackDetector: Send + Sync {
    async fn detect_input_need(&self, response: &str) -> InputNeed;
}

/// Default detector backed by the reply heuristics in [`detection`].
pub struct KeywordFallbackDetector;

#[async_trait]
impl FallbackDetector for KeywordFallbackDetector {
    async fn detect_input_need(&self, response: &str) -> InputNeed {
        if detection::needs_user_input(response) {
            InputNeed::Pause
        } else {
            InputNeed::Continue
        }
    }
}

/// Quality assessment of an agent reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentReport {
    /// How much of the requested work the reply covers, in [0, 1].
    pub completeness_score: f64,
    /// Overall quality, in [0, 1].
    pub overall_score: f64,
    pub has_errors: bool,
    /// Where the assessment came from; "keyword_fallback" when the
    /// validator collaborator was unavailable.
    pub source: String,
}

impl AssessmentReport {
    /// Minimal keyword-based check used when the validator collaborator
    /// fails. Completion words score the reply up; error words flag it.
    pub fn from_keywords(response: &str) -> Self {
        let lower = response.to_lowercase();
        let completed = lower.contains("success")
            || crate::confirm::COMPLETION_LEXICON
                .iter()
                .any(|k| lower.contains(k));
        let has_errors = ["error", "failed", "exception", "panic"]
            .iter()
            .any(|k| lower.contains(k));
        let score = if completed && !has_errors { 0.6 } else { 0.2 };
        Self {
            completeness_score: score,
            overall_score: score,
            has_errors,
            source: "keyword_fallback".to_string(),
        }
    }

    /// A report corroborates completion when it is error-free and both
    /// scores clear the halfway mark.
    pub fn corroborates_completion(&self) -> bool {
        !self.has_errors && self.completeness_score >= 0.5 && self.overall_score >= 0.5
    }
}

/// Corroborates a structurally "completed" confirmation before the
/// task is finally marked done.
#[async_trait]
pub trait QualityValidator: Send + Sync {
    async fn assess(&self, response: &str, context: &str) -> Result<AssessmentReport>;
}

/// Per-task context handed to the enhanced execution path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub task_id: TaskId,
    pub description: String,
    pub category: TaskCategory,
}

/// Result of an enhanced-path execution: the agent-style reply text to
/// feed into confirmation.
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub response: String,
}

/// Optional enhanced execution path (e.g. a git branch-per-task
/// workflow). Failure here is not fatal; the orchestrator falls back
/// to the baseline dispatch path and records which path ran.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn execute_workflow(&self, context: &WorkflowContext) -> Result<WorkflowOutcome>;
}
