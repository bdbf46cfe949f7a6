//! Task extraction from free-form text.
//!
//! A prioritized catalog of line patterns (explicit TODO markers,
//! bullets, numbered lists, checkboxes, secondary annotations) is
//! scanned over the input. Matches are deduplicated by (line, content)
//! and sorted by (pattern priority, line) so identical input always
//! produces the identical task list.

use crate::core::task::{Task, TaskStatus};
use crate::error::{Error, Result};
use crate::tplog_debug;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static EXPLICIT_TODO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*todo\s*[:\-]\s*(.+)$").unwrap());

// Content starting with '[' is left to the checkbox patterns.
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*+]\s+([^\[\s].*)$").unwrap());

static NUMBERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+[.)]\s+(.+)$").unwrap());

static CHECKBOX_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*+]\s*\[\s\]\s*(.+)$").unwrap());

static CHECKBOX_DONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*+]\s*\[[xX]\]\s*(.+)$").unwrap());

static ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:fixme|note|hack)\s*[:\-]\s*(.+)$").unwrap());

/// Trigger phrases that suggest an ordering between tasks. The whole
/// phrase (trigger word included) is kept verbatim for the sequencer.
static DEPENDENCY_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:after|before|depends\s+on|requires|needs)\s+.+$").unwrap());

struct LinePattern {
    name: &'static str,
    priority: u8,
    regex: &'static LazyLock<Regex>,
    /// Matches of this pattern arrive already done (checked checkbox).
    pre_completed: bool,
}

/// Catalog order is match priority: earlier patterns win the sort.
static PATTERNS: &[LinePattern] = &[
    LinePattern {
        name: "explicit_todo",
        priority: 0,
        regex: &EXPLICIT_TODO,
        pre_completed: false,
    },
    LinePattern {
        name: "bullet",
        priority: 1,
        regex: &BULLET,
        pre_completed: false,
    },
    LinePattern {
        name: "numbered",
        priority: 2,
        regex: &NUMBERED,
        pre_completed: false,
    },
    LinePattern {
        name: "checkbox_open",
        priority: 3,
        regex: &CHECKBOX_OPEN,
        pre_completed: false,
    },
    LinePattern {
        name: "checkbox_done",
        priority: 4,
        regex: &CHECKBOX_DONE,
        pre_completed: true,
    },
    LinePattern {
        name: "annotation",
        priority: 5,
        regex: &ANNOTATION,
        pre_completed: false,
    },
];

/// Extracts tasks from raw text.
///
/// Pure and deterministic: the same input yields the same tasks in the
/// same order (ids aside).
pub struct InputParser;

impl InputParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse raw text into a task list.
    ///
    /// An empty result is a valid outcome ("no tasks found"); only
    /// empty input is an error.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` when the text is empty or
    /// whitespace-only.
    pub fn parse(&self, text: &str) -> Result<Vec<Task>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("input text is empty".to_string()));
        }

        let lines: Vec<&str> = text.lines().collect();
        let mut seen: HashSet<(usize, String)> = HashSet::new();
        // (priority, line_no, pattern, content, pre_completed)
        let mut matches: Vec<(u8, usize, &'static str, String, bool)> = Vec::new();

        for pattern in PATTERNS {
            for (line_no, line) in lines.iter().enumerate() {
                let Some(caps) = pattern.regex.captures(line) else {
                    continue;
                };
                let Some(content) = caps.get(1) else {
                    continue;
                };
                let content = content.as_str().trim().to_string();
                if content.is_empty() {
                    continue;
                }
                if !seen.insert((line_no, content.clone())) {
                    continue;
                }
                matches.push((
                    pattern.priority,
                    line_no,
                    pattern.name,
                    content,
                    pattern.pre_completed,
                ));
            }
        }

        matches.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let tasks: Vec<Task> = matches
            .into_iter()
            .map(|(priority, _, name, content, pre_completed)| {
                let mut task = Task::new(&content, name, priority);
                task.dependency_hints = extract_hints(&content);
                if pre_completed {
                    task.status = TaskStatus::Completed;
                }
                task
            })
            .collect();

        tplog_debug!("InputParser::parse extracted {} tasks", tasks.len());
        Ok(tasks)
    }
}

impl Default for InputParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Capture dependency trigger phrases verbatim from a task description.
fn extract_hints(description: &str) -> Vec<String> {
    DEPENDENCY_HINT
        .find_iter(description)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}
