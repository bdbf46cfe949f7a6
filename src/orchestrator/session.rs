//! Session model and the shared session registry.
//!
//! A session is one end-to-end run over a batch of tasks. Sessions
//! live in a registry keyed by id; distinct sessions may run
//! concurrently, but only the owning run mutates its own record, so
//! the registry needs nothing beyond an async rwlock around the map.

use crate::agent::AssessmentReport;
use crate::confirm::ConfirmOutcome;
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::tplog_debug;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short form for logs and display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle of a session. Terminal states never transition further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Parsing,
    Sequenced,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Created => "created",
            SessionStatus::Parsing => "parsing",
            SessionStatus::Sequenced => "sequenced",
            SessionStatus::Executing => "executing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Which dispatch path a task actually ran through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    /// The optional workflow-engine collaborator.
    Enhanced,
    /// Plain dispatch through the agent channel.
    Baseline,
}

impl std::fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionPath::Enhanced => write!(f, "enhanced"),
            ExecutionPath::Baseline => write!(f, "baseline"),
        }
    }
}

/// Per-run options supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    /// Abort the remaining run on the first task failure.
    #[serde(default)]
    pub stop_on_error: bool,
    /// Try the enhanced workflow path when an engine is wired.
    #[serde(default = "default_true")]
    pub use_enhanced_path: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            stop_on_error: false,
            use_enhanced_path: true,
        }
    }
}

/// Outcome of one task inside a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub description: String,
    pub status: TaskStatus,
    pub path: ExecutionPath,
    pub confirm: Option<ConfirmOutcome>,
    pub assessment: Option<AssessmentReport>,
    pub error: Option<String>,
}

/// Final report of a run, terminal event's payload included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub paused_tasks: usize,
    pub task_results: Vec<TaskResult>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// One live run and its bookkeeping.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub input: String,
    pub options: RunOptions,
    pub status: SessionStatus,
    /// Ordered task list as produced by the sequencer.
    pub tasks: Vec<Task>,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Updated on every task transition; the idle sweep keys off it.
    pub last_active: DateTime<Utc>,
    pub results: Vec<TaskResult>,
    pub cancel: CancellationToken,
}

impl Session {
    pub fn new(input: &str, options: RunOptions) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            input: input.to_string(),
            options,
            status: SessionStatus::Created,
            tasks: Vec::new(),
            completed_tasks: 0,
            failed_tasks: 0,
            started_at: now,
            ended_at: None,
            last_active: now,
            results: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Move to a new status. Terminal states are final; a transition
    /// out of one is ignored.
    pub fn transition(&mut self, status: SessionStatus) {
        if self.status.is_terminal() {
            return;
        }
        tplog_debug!("Session {} {} -> {}", self.id.short(), self.status, status);
        self.status = status;
        self.last_active = Utc::now();
        if status.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    pub fn idle_for(&self) -> Duration {
        (Utc::now() - self.last_active).to_std().unwrap_or_default()
    }
}

/// Shared, concurrently accessed map of live sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    /// High-water mark of simultaneously live sessions. Observational
    /// only; never used to reject work.
    max_concurrent_observed: Arc<AtomicUsize>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_concurrent_observed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn insert(&self, session: Session) -> SessionId {
        let id = session.id;
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, session);
        self.max_concurrent_observed
            .fetch_max(sessions.len(), Ordering::SeqCst);
        id
    }

    /// Snapshot of a session; `None` for unknown ids, never an error.
    pub async fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Mutate a session in place. Returns false for unknown ids.
    pub async fn update<F>(&self, id: &SessionId, f: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) => {
                f(session);
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: &SessionId) -> Option<Session> {
        self.sessions.write().await.remove(id)
    }

    pub async fn active_sessions(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Highest number of sessions ever live at once.
    pub fn max_concurrent_observed(&self) -> usize {
        self.max_concurrent_observed.load(Ordering::SeqCst)
    }

    /// Cancel a session: flips status, fires the token, leaves any
    /// in-flight await to finish on its own. Returns false for unknown
    /// or already-terminal sessions.
    pub async fn cancel(&self, id: &SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) if !session.status.is_terminal() => {
                session.transition(SessionStatus::Cancelled);
                session.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Remove sessions idle past `timeout`. Returns how many went.
    pub async fn sweep_idle(&self, timeout: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, session| {
            let keep = session.idle_for() <= timeout;
            if !keep {
                tplog_debug!(
                    "Sweeping idle session {} (status {})",
                    id.short(),
                    session.status
                );
            }
            keep
        });
        before - sessions.len()
    }

    /// Background sweeper on a fixed interval. Aborts with the handle.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        timeout: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let swept = registry.sweep_idle(timeout).await;
                if swept > 0 {
                    tplog_debug!("Sweeper removed {} idle session(s)", swept);
                }
            }
        })
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
