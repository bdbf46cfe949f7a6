//! Progress events streamed during a session run.
//!
//! Emission is best-effort: a sink failure is logged and swallowed,
//! never propagated into the run.

use crate::core::task::TaskId;
use crate::error::Result;
use crate::orchestrator::session::SessionId;
use serde::Serialize;
use tokio::sync::mpsc;

/// One observable state transition of a running session.
///
/// Serialized with the event name on the wire, e.g.
/// `{"event":"task-complete","session_id":...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ProgressEvent {
    Start {
        session_id: SessionId,
    },
    TasksParsed {
        session_id: SessionId,
        total_tasks: usize,
    },
    TaskStart {
        session_id: SessionId,
        task_id: TaskId,
        description: String,
    },
    TaskComplete {
        session_id: SessionId,
        task_id: TaskId,
        completed_tasks: usize,
    },
    TaskError {
        session_id: SessionId,
        task_id: TaskId,
        error: String,
    },
    TaskPause {
        session_id: SessionId,
        task_id: TaskId,
        reason: String,
    },
    Complete {
        session_id: SessionId,
        completed_tasks: usize,
        failed_tasks: usize,
    },
    Error {
        session_id: SessionId,
        reason: String,
    },
    Cancelled {
        session_id: SessionId,
        completed_tasks: usize,
    },
}

impl ProgressEvent {
    /// Wire name of the event, as used in serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Start { .. } => "start",
            ProgressEvent::TasksParsed { .. } => "tasks-parsed",
            ProgressEvent::TaskStart { .. } => "task-start",
            ProgressEvent::TaskComplete { .. } => "task-complete",
            ProgressEvent::TaskError { .. } => "task-error",
            ProgressEvent::TaskPause { .. } => "task-pause",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
            ProgressEvent::Cancelled { .. } => "cancelled",
        }
    }

    pub fn session_id(&self) -> SessionId {
        match self {
            ProgressEvent::Start { session_id }
            | ProgressEvent::TasksParsed { session_id, .. }
            | ProgressEvent::TaskStart { session_id, .. }
            | ProgressEvent::TaskComplete { session_id, .. }
            | ProgressEvent::TaskError { session_id, .. }
            | ProgressEvent::TaskPause { session_id, .. }
            | ProgressEvent::Complete { session_id, .. }
            | ProgressEvent::Error { session_id, .. }
            | ProgressEvent::Cancelled { session_id, .. } => *session_id,
        }
    }

    /// Terminal events close a session's stream; every run emits
    /// exactly one of them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. }
                | ProgressEvent::Error { .. }
                | ProgressEvent::Cancelled { .. }
        )
    }
}

/// Receives progress events. Implementations should be cheap; the
/// orchestrator calls them inline between state transitions.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent) -> Result<()>;
}

/// Sink that drops everything; the default when no observer is wired.
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn emit(&self, _event: &ProgressEvent) -> Result<()> {
        Ok(())
    }
}

/// Forwards events over an unbounded channel, e.g. to a UI or test.
pub struct MpscProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl MpscProgressSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for MpscProgressSink {
    fn emit(&self, event: &ProgressEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|e| crate::error::Error::Validation(format!("Progress channel closed: {}", e)))
    }
}
