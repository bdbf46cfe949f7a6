//! Session lifecycle tests: registry, concurrency, cancellation, and
//! the idle sweep.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use taskpilot::{
    AgentChannel, Error, Result, RunOptions, Session, SessionRegistry, SessionOrchestrator,
    SessionStatus,
};

use crate::fixtures::{fast_config, orchestrator_with_reply, FixedAgent, NeverPause};

/// Agent that takes a little wall-clock time per reply, so tests can
/// observe sessions mid-flight.
struct SlowAgent {
    delay: Duration,
}

#[async_trait]
impl AgentChannel for SlowAgent {
    async fn send(&self, _prompt: &str) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok("completed".to_string())
    }
}

/// Test: Concurrent Sessions
/// Given two runs driven on the same orchestrator at once
/// When both execute against a slow agent
/// Then both finish, and the registry saw two sessions live together
#[tokio::test]
async fn test_two_sessions_run_concurrently() {
    let orch = SessionOrchestrator::new(
        Arc::new(SlowAgent {
            delay: Duration::from_millis(10),
        }),
        Arc::new(NeverPause),
        fast_config(),
    );

    let (a, b) = futures::future::join(
        orch.run("TODO: first stream of work", RunOptions::default()),
        orch.run("TODO: second stream of work", RunOptions::default()),
    )
    .await;

    assert_eq!(a.unwrap().status, SessionStatus::Completed);
    assert_eq!(b.unwrap().status, SessionStatus::Completed);
    assert_eq!(orch.registry().len().await, 2);
    assert_eq!(orch.registry().max_concurrent_observed(), 2);
}

/// Test: Active Session Listing
/// Given a few finished runs
/// When active sessions are listed
/// Then the listing length equals the registry entry count and every
/// id resolves through get_session
#[tokio::test]
async fn test_active_sessions_matches_registry() {
    let orch = orchestrator_with_reply("completed");
    for input in ["TODO: one", "TODO: two", "TODO: three"] {
        orch.run(input, RunOptions::default()).await.unwrap();
    }

    let active = orch.active_sessions().await;
    assert_eq!(active.len(), orch.registry().len().await);
    for id in &active {
        assert!(orch.get_session(id).await.is_some());
    }
}

/// Test: Cooperative Cancellation
/// Given a long run of several slow tasks
/// When the session is cancelled mid-flight
/// Then the run stops between tasks with status cancelled, and the
/// in-flight task was not forcibly interrupted
#[tokio::test]
async fn test_cancel_mid_run() {
    let orch = Arc::new(SessionOrchestrator::new(
        Arc::new(SlowAgent {
            delay: Duration::from_millis(25),
        }),
        Arc::new(NeverPause),
        fast_config(),
    ));

    let runner = orch.clone();
    let handle = tokio::spawn(async move {
        runner
            .run(
                "TODO: step one\nTODO: step two\nTODO: step three",
                RunOptions::default(),
            )
            .await
    });

    // Wait until the session is registered, then cancel it
    let id = loop {
        let active = orch.active_sessions().await;
        if let Some(id) = active.first() {
            break *id;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    };
    assert!(orch.cancel_session(&id).await);

    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.status, SessionStatus::Cancelled);
    assert!(result.completed_tasks < 3);
    assert_eq!(
        orch.get_session(&id).await.unwrap().status,
        SessionStatus::Cancelled
    );
}

/// Test: Cancel Unknown Session
/// Given an empty orchestrator
/// When an unknown id is cancelled or fetched
/// Then the calls report absence instead of failing
#[tokio::test]
async fn test_unknown_session_queries_never_fail() {
    let orch = orchestrator_with_reply("completed");
    let phantom = "00000000-0000-4000-8000-000000000000".parse().unwrap();

    assert!(orch.get_session(&phantom).await.is_none());
    assert!(!orch.cancel_session(&phantom).await);
}

/// Test: Idle Sweep
/// Given a registry with a stale session and a background sweeper
/// When the sweep interval elapses
/// Then the stale session is gone
#[tokio::test]
async fn test_sweeper_removes_idle_sessions() {
    let registry = SessionRegistry::new();
    let mut stale = Session::new("old work", RunOptions::default());
    stale.last_active = chrono::Utc::now() - chrono::Duration::seconds(600);
    registry.insert(stale).await;

    let sweeper = registry.spawn_sweeper(Duration::from_millis(10), Duration::from_secs(300));

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(registry.is_empty().await);
    sweeper.abort();
}

/// Test: Input Failure Lifecycle
/// Given input that parses to zero tasks
/// When the run starts
/// Then it surfaces InvalidInput and the session record is failed
#[tokio::test]
async fn test_zero_task_input_fails_session() {
    let orch = orchestrator_with_reply("completed");
    let result = orch
        .run("nothing actionable here", RunOptions::default())
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    let id = orch.active_sessions().await[0];
    assert_eq!(
        orch.get_session(&id).await.unwrap().status,
        SessionStatus::Failed
    );
}

/// Test: Stop On Error
/// Given two tasks and an agent that decisively reports need human
/// When stop_on_error is set
/// Then only the first task runs and the session fails with a reason
#[tokio::test]
async fn test_stop_on_error_aborts_remaining_tasks() {
    let orch = SessionOrchestrator::new(
        Arc::new(FixedAgent::new("need human")),
        Arc::new(NeverPause),
        fast_config(),
    );

    let result = orch
        .run(
            "TODO: risky work\nTODO: later work",
            RunOptions {
                stop_on_error: true,
                ..RunOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(result.status, SessionStatus::Failed);
    assert_eq!(result.task_results.len(), 1);
    assert!(result.reason.as_deref().unwrap().contains("risky work"));
}
