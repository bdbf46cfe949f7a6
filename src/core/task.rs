//! Task data model for parsed action items.
//!
//! Tasks are the atomic units of work driven through the completion agent.
//! Each task tracks its source pattern, category, status, and the raw
//! dependency hints captured at parse time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task within a session.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Task status in its lifecycle.
///
/// Tasks progress through these states as the orchestrator drives
/// them through dispatch, confirmation, and validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Task created but not yet started.
    Pending,
    /// Task is currently being executed by the agent.
    InProgress,
    /// Task stopped because the agent is waiting on a human.
    Paused {
        /// Reason why the task is paused.
        reason: String,
    },
    /// Task completed successfully.
    Completed,
    /// Task failed with an error.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Paused { reason } => write!(f, "paused: {}", reason),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// Category assigned to a task by keyword classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Ui,
    Api,
    Database,
    Test,
    Deployment,
    Security,
    Performance,
    Refactor,
    Uncategorized,
}

impl Default for TaskCategory {
    fn default() -> Self {
        Self::Uncategorized
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskCategory::Ui => "ui",
            TaskCategory::Api => "api",
            TaskCategory::Database => "database",
            TaskCategory::Test => "test",
            TaskCategory::Deployment => "deployment",
            TaskCategory::Security => "security",
            TaskCategory::Performance => "performance",
            TaskCategory::Refactor => "refactor",
            TaskCategory::Uncategorized => "uncategorized",
        };
        write!(f, "{}", s)
    }
}

/// Category → keyword table used for classification.
///
/// Categories are tried in this order; the first category with a
/// matching keyword wins. Keywords match on word boundaries so "ui"
/// never matches inside "build".
const CATEGORY_KEYWORDS: &[(TaskCategory, &[&str])] = &[
    (
        TaskCategory::Ui,
        &[
            "ui", "interface", "frontend", "component", "button", "form", "page", "view",
            "screen", "layout", "css", "style",
        ],
    ),
    (
        TaskCategory::Api,
        &[
            "api", "endpoint", "route", "rest", "graphql", "handler", "controller", "backend",
        ],
    ),
    (
        TaskCategory::Database,
        &[
            "database", "db", "schema", "migration", "table", "sql", "query", "index",
        ],
    ),
    (
        TaskCategory::Test,
        &["test", "tests", "spec", "coverage", "e2e", "regression"],
    ),
    (
        TaskCategory::Deployment,
        &[
            "deploy", "deployment", "release", "ci", "cd", "pipeline", "docker", "kubernetes",
        ],
    ),
    (
        TaskCategory::Security,
        &[
            "security", "auth", "authentication", "authorization", "encrypt", "vulnerability",
            "xss", "csrf",
        ],
    ),
    (
        TaskCategory::Performance,
        &[
            "performance", "optimize", "optimization", "cache", "caching", "latency",
            "profiling",
        ],
    ),
    (
        TaskCategory::Refactor,
        &["refactor", "refactoring", "cleanup", "restructure", "rewrite", "simplify"],
    ),
];

/// Classify a task description into a category.
///
/// Pure, table-driven: lowercases the description, splits into
/// alphanumeric words, and returns the first category with a keyword
/// hit. No match yields `Uncategorized`.
pub fn classify(description: &str) -> TaskCategory {
    let lower = description.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|kw| words.contains(kw)) {
            return *category;
        }
    }
    TaskCategory::Uncategorized
}

/// A single parsed action item.
///
/// Created by the input parser; status mutated only by the session
/// orchestrator; never deleted mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// The action-item text (without its source marker).
    pub description: String,
    /// Name of the pattern that extracted this task.
    pub pattern: String,
    /// Priority of the source pattern; an ordering tie-break, not
    /// a business priority.
    pub pattern_priority: u8,
    /// Classified category.
    pub category: TaskCategory,
    /// Current execution status.
    pub status: TaskStatus,
    /// Raw dependency-hint phrases captured at parse time.
    pub dependency_hints: Vec<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new pending task, classifying its category from the
    /// description.
    pub fn new(description: &str, pattern: &str, pattern_priority: u8) -> Self {
        Self {
            id: TaskId::new(),
            description: description.to_string(),
            pattern: pattern.to_string(),
            pattern_priority,
            category: classify(description),
            status: TaskStatus::Pending,
            dependency_hints: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Start the task execution.
    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
    }

    /// Mark the task as successfully completed.
    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
    }

    /// Mark the task as failed with an error message.
    pub fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed {
            error: error.to_string(),
        };
    }

    /// Mark the task as paused, waiting on a human.
    pub fn pause(&mut self, reason: &str) {
        self.status = TaskStatus::Paused {
            reason: reason.to_string(),
        };
    }

    /// Check if the task is in a terminal state (Completed or Failed).
    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Completed | TaskStatus::Failed { .. }
        )
    }
}
