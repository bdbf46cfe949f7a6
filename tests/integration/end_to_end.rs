//! End-to-end pipeline tests: raw text in, session report out.

use std::sync::Arc;
use tokio_test::assert_ok;

use taskpilot::{
    InputParser, KeywordFallbackDetector, MpscProgressSink, RunOptions, Sequencer,
    SessionOrchestrator, SessionStatus, TaskCategory, TaskStatus,
};

use crate::fixtures::{fast_config, orchestrator_with_reply, FixedAgent, ScriptedAgent, NeverPause};

/// Test: E2E Happy Path
/// Given "create database schema / build api depends on it / build ui after api"
/// When the full pipeline runs with an agent that reports "completed"
/// Then 3 tasks parse with the right categories, order database -> api -> ui,
/// and the run reports completedTasks=3, failedTasks=0
#[tokio::test]
async fn test_e2e_happy_path_three_tasks() {
    let input = "TODO: create database schema\nTODO: build api depends on database schema\nTODO: build ui after api";

    // Parse and sequence checks first, on their own
    let tasks = InputParser::new().parse(input).unwrap();
    assert_eq!(tasks.len(), 3);
    let categories: Vec<TaskCategory> = tasks.iter().map(|t| t.category).collect();
    assert_eq!(
        categories,
        vec![TaskCategory::Database, TaskCategory::Api, TaskCategory::Ui]
    );

    let ordered = Sequencer::new().sequence(tasks);
    let ordered_categories: Vec<TaskCategory> = ordered.iter().map(|t| t.category).collect();
    assert_eq!(
        ordered_categories,
        vec![TaskCategory::Database, TaskCategory::Api, TaskCategory::Ui]
    );

    // Then the whole run
    let orch = orchestrator_with_reply("completed");
    let result = assert_ok!(orch.run(input, RunOptions::default()).await);

    assert_eq!(result.status, SessionStatus::Completed);
    assert_eq!(result.total_tasks, 3);
    assert_eq!(result.completed_tasks, 3);
    assert_eq!(result.failed_tasks, 0);

    // Results arrive in execution order
    let result_categories: Vec<&str> = result
        .task_results
        .iter()
        .map(|r| r.description.as_str())
        .collect();
    assert_eq!(
        result_categories,
        vec![
            "create database schema",
            "build api depends on database schema",
            "build ui after api"
        ]
    );
}

/// Test: Progress Event Stream
/// Given a two-task input
/// When the run completes
/// Then events arrive in transition order with exactly one terminal event
#[tokio::test]
async fn test_event_stream_order_and_single_terminal() {
    let (sink, mut rx) = MpscProgressSink::new();
    let orch = orchestrator_with_reply("completed").with_sink(Arc::new(sink));

    let result = orch
        .run("TODO: alpha work\nTODO: beta work after alpha work", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(result.completed_tasks, 2);

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.session_id(), result.session_id);
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec![
            "start",
            "tasks-parsed",
            "task-start",
            "task-complete",
            "task-start",
            "task-complete",
            "complete"
        ]
    );
    assert_eq!(names.iter().filter(|n| **n == "complete").count(), 1);
}

/// Test: Pause Without Failing the Session
/// Given an agent whose status reply is a question back at the user
/// When the keyword fallback detector is wired
/// Then the task pauses, a task-pause event fires, and the run still
/// ends with a complete event
#[tokio::test]
async fn test_agent_question_pauses_task() {
    let (sink, mut rx) = MpscProgressSink::new();
    let orch = SessionOrchestrator::new(
        Arc::new(FixedAgent::new("Which schema version should I target?")),
        Arc::new(KeywordFallbackDetector),
        fast_config(),
    )
    .with_sink(Arc::new(sink));

    let result = orch
        .run("TODO: migrate the records", RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, SessionStatus::Completed);
    assert_eq!(result.paused_tasks, 1);
    assert_eq!(result.completed_tasks, 0);
    assert_eq!(result.failed_tasks, 0);
    assert!(matches!(
        result.task_results[0].status,
        TaskStatus::Paused { .. }
    ));

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name());
    }
    assert!(names.contains(&"task-pause"));
    assert_eq!(*names.last().unwrap(), "complete");
}

/// Test: Ambiguous Replies Exhaust Attempts
/// Given an agent that never gives a parseable status
/// When confirmation runs with max_attempts=3
/// Then the task fails with max_attempts_exceeded and the run records it
#[tokio::test]
async fn test_unparseable_replies_exhaust_confirmation() {
    let orch = SessionOrchestrator::new(
        Arc::new(FixedAgent::new("mumble mumble")),
        Arc::new(NeverPause),
        fast_config(),
    );

    let result = orch
        .run("TODO: vague work", RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.failed_tasks, 1);
    let task = &result.task_results[0];
    assert_eq!(
        task.error.as_deref(),
        Some("Confirmation exhausted after 3 attempts")
    );
    let confirm = task.confirm.as_ref().unwrap();
    assert_eq!(confirm.reason.as_deref(), Some("max_attempts_exceeded"));
    assert_eq!(confirm.attempts, 3);
    assert!(!confirm.confirmed);
}

/// Test: Late Confirmation Still Counts
/// Given an agent that only reports completed on its third status reply
/// When the run executes one task
/// Then the task completes after retries
#[tokio::test]
async fn test_confirmation_succeeds_after_retries() {
    // First reply answers the dispatch prompt; the next three answer
    // the confirmation queries.
    let agent = ScriptedAgent::new(&["working on it", "still going", "almost", "completed"]);
    let orch = SessionOrchestrator::new(Arc::new(agent), Arc::new(NeverPause), fast_config());

    let result = orch
        .run("TODO: slow burner", RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.completed_tasks, 1);
    assert_eq!(result.task_results[0].confirm.as_ref().unwrap().attempts, 3);
}

/// Test: Multilingual Completion Fallback
/// Given an agent replying in German with no structured token
/// When confirmation parses the reply
/// Then the lexicon fallback accepts it as completed
#[tokio::test]
async fn test_multilingual_completion_reply() {
    let orch = orchestrator_with_reply("Alles erledigt!");
    let result = orch
        .run("TODO: internationale arbeit", RunOptions::default())
        .await
        .unwrap();

    // Lexicon confidence is 0.6, below the 0.7 threshold, so retries
    // burn out; lower the bar and it completes.
    assert_eq!(result.completed_tasks, 0);

    let mut config = fast_config();
    config.confirm.confidence_threshold = 0.5;
    let orch = SessionOrchestrator::new(
        Arc::new(FixedAgent::new("Alles erledigt!")),
        Arc::new(NeverPause),
        config,
    );
    let result = orch
        .run("TODO: internationale arbeit", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(result.completed_tasks, 1);
}
