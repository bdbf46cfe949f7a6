//! End-to-end session execution.
//!
//! `SessionOrchestrator::run` owns the whole pipeline: parse the input,
//! order the tasks, then drive them strictly one at a time through
//! dispatch, confirmation, and validation, streaming progress events
//! along the way. Task N+1 never begins before task N resolves.

use crate::agent::{
    AgentChannel, AssessmentReport, FallbackDetector, QualityValidator, WorkflowContext,
    WorkflowEngine,
};
use crate::config::Config;
use crate::confirm::ConfirmationProtocol;
use crate::core::task::{Task, TaskStatus};
use crate::error::{Error, Result};
use crate::orchestrator::events::{NoopProgressSink, ProgressEvent, ProgressSink};
use crate::orchestrator::session::{
    ExecutionPath, RunOptions, Session, SessionId, SessionRegistry, SessionResult, SessionStatus,
    TaskResult,
};
use crate::parser::InputParser;
use crate::sequencer::Sequencer;
use crate::{tplog, tplog_warn};
use chrono::Utc;
use std::sync::Arc;

/// Drives sessions from raw text to a final report.
pub struct SessionOrchestrator {
    parser: InputParser,
    sequencer: Sequencer,
    protocol: ConfirmationProtocol,
    agent: Arc<dyn AgentChannel>,
    detector: Arc<dyn FallbackDetector>,
    validator: Option<Arc<dyn QualityValidator>>,
    engine: Option<Arc<dyn WorkflowEngine>>,
    sink: Arc<dyn ProgressSink>,
    registry: SessionRegistry,
    config: Config,
}

impl SessionOrchestrator {
    pub fn new(
        agent: Arc<dyn AgentChannel>,
        detector: Arc<dyn FallbackDetector>,
        config: Config,
    ) -> Self {
        Self {
            parser: InputParser::new(),
            sequencer: Sequencer::new(),
            protocol: ConfirmationProtocol::new(config.confirm.clone()),
            agent,
            detector,
            validator: None,
            engine: None,
            sink: Arc::new(NoopProgressSink),
            registry: SessionRegistry::new(),
            config,
        }
    }

    /// Wire the quality-validation collaborator.
    pub fn with_validator(mut self, validator: Arc<dyn QualityValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Wire the enhanced workflow engine.
    pub fn with_engine(mut self, engine: Arc<dyn WorkflowEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Wire a progress sink.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Snapshot of a session; `None` for unknown ids.
    pub async fn get_session(&self, id: &SessionId) -> Option<Session> {
        self.registry.get(id).await
    }

    pub async fn active_sessions(&self) -> Vec<SessionId> {
        self.registry.active_sessions().await
    }

    /// Cancel a session. Cooperative: the cancellation is checked
    /// between tasks, so an in-flight agent wait still completes and
    /// appends its result to the already-cancelled session. Emits the
    /// run's terminal `cancelled` event.
    pub async fn cancel_session(&self, id: &SessionId) -> bool {
        if !self.registry.cancel(id).await {
            return false;
        }
        let completed = self
            .registry
            .get(id)
            .await
            .map(|s| s.completed_tasks)
            .unwrap_or(0);
        self.emit(ProgressEvent::Cancelled {
            session_id: *id,
            completed_tasks: completed,
        });
        true
    }

    /// Start the background idle sweep using the configured interval
    /// and timeout.
    pub fn start_sweeper(&self) -> tokio::task::JoinHandle<()> {
        self.registry
            .spawn_sweeper(self.config.sweep_interval(), self.config.session_timeout())
    }

    /// Run one session end to end.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` when the text is empty or yields
    /// zero tasks; the session is marked failed and its single `error`
    /// event is emitted before the error surfaces.
    pub async fn run(&self, text: &str, options: RunOptions) -> Result<SessionResult> {
        let session = Session::new(text, options.clone());
        let session_id = session.id;
        let cancel = session.cancel.clone();
        let started_at = session.started_at;
        self.registry.insert(session).await;

        tplog!("Session {} started", session_id.short());
        self.emit(ProgressEvent::Start { session_id });

        self.update_session(session_id, |s| s.transition(SessionStatus::Parsing))
            .await;

        let parsed = match self.parser.parse(text) {
            Ok(tasks) if tasks.is_empty() => {
                let err = Error::InvalidInput("no tasks found in input".to_string());
                self.fail_session(session_id, &err).await;
                return Err(err);
            }
            Ok(tasks) => tasks,
            Err(err) => {
                self.fail_session(session_id, &err).await;
                return Err(err);
            }
        };

        let ordered = self.sequencer.sequence(parsed);
        let total_tasks = ordered.len();
        self.update_session(session_id, |s| {
            s.tasks = ordered.clone();
            s.transition(SessionStatus::Sequenced);
        })
        .await;
        self.emit(ProgressEvent::TasksParsed {
            session_id,
            total_tasks,
        });

        self.update_session(session_id, |s| s.transition(SessionStatus::Executing))
            .await;

        let mut results: Vec<TaskResult> = Vec::with_capacity(total_tasks);
        let mut completed = 0usize;
        let mut failed = 0usize;
        let mut paused = 0usize;
        let mut abort_reason: Option<String> = None;
        let mut was_cancelled = false;

        for task in &ordered {
            if cancel.is_cancelled() {
                was_cancelled = true;
                break;
            }

            let result = self.execute_task(session_id, task, &options).await;

            match result.status {
                TaskStatus::Completed => {
                    completed += 1;
                    self.emit(ProgressEvent::TaskComplete {
                        session_id,
                        task_id: task.id,
                        completed_tasks: completed,
                    });
                }
                TaskStatus::Paused { ref reason } => {
                    paused += 1;
                    self.emit(ProgressEvent::TaskPause {
                        session_id,
                        task_id: task.id,
                        reason: reason.clone(),
                    });
                }
                _ => {
                    failed += 1;
                    let error = result
                        .error
                        .clone()
                        .unwrap_or_else(|| "task failed".to_string());
                    self.emit(ProgressEvent::TaskError {
                        session_id,
                        task_id: task.id,
                        error: error.clone(),
                    });
                    if options.stop_on_error {
                        abort_reason = Some(format!(
                            "stopped on first failure: {} ({})",
                            task.description, error
                        ));
                    }
                }
            }

            let snapshot = result.clone();
            self.update_session(session_id, |s| {
                if let Some(t) = s.tasks.iter_mut().find(|t| t.id == snapshot.task_id) {
                    t.status = snapshot.status.clone();
                }
                s.results.push(snapshot);
                s.completed_tasks = completed;
                s.failed_tasks = failed;
                s.touch();
            })
            .await;
            results.push(result);

            if abort_reason.is_some() {
                break;
            }
        }

        // Exactly one terminal event per run; the cancelled one is
        // emitted by cancel_session at the moment of cancellation.
        let (status, reason) = if was_cancelled || cancel.is_cancelled() {
            (SessionStatus::Cancelled, Some("cancelled".to_string()))
        } else if let Some(reason) = abort_reason {
            self.update_session(session_id, |s| s.transition(SessionStatus::Failed))
                .await;
            self.emit(ProgressEvent::Error {
                session_id,
                reason: reason.clone(),
            });
            (SessionStatus::Failed, Some(reason))
        } else {
            self.update_session(session_id, |s| s.transition(SessionStatus::Completed))
                .await;
            self.emit(ProgressEvent::Complete {
                session_id,
                completed_tasks: completed,
                failed_tasks: failed,
            });
            (SessionStatus::Completed, None)
        };

        tplog!(
            "Session {} finished: {} ({} completed, {} failed, {} paused)",
            session_id.short(),
            status,
            completed,
            failed,
            paused
        );

        Ok(SessionResult {
            session_id,
            status,
            total_tasks,
            completed_tasks: completed,
            failed_tasks: failed,
            paused_tasks: paused,
            task_results: results,
            started_at,
            ended_at: Utc::now(),
            reason,
        })
    }

    /// Dispatch, confirm, and validate one task.
    async fn execute_task(
        &self,
        session_id: SessionId,
        task: &Task,
        options: &RunOptions,
    ) -> TaskResult {
        // Pre-marked completed tasks (checked checkboxes) need no work.
        if task.status == TaskStatus::Completed {
            return TaskResult {
                task_id: task.id,
                description: task.description.clone(),
                status: TaskStatus::Completed,
                path: ExecutionPath::Baseline,
                confirm: None,
                assessment: None,
                error: None,
            };
        }

        self.emit(ProgressEvent::TaskStart {
            session_id,
            task_id: task.id,
            description: task.description.clone(),
        });
        self.update_session(session_id, |s| {
            if let Some(t) = s.tasks.iter_mut().find(|t| t.id == task.id) {
                t.start();
            }
            s.touch();
        })
        .await;

        let (path, dispatched) = self.dispatch(task, options).await;
        match dispatched {
            Ok(response) => {
                crate::tplog_trace!("Task {} working reply: {}", task.id.short(), response);
            }
            Err(e) => {
                let err = Error::AgentDispatch(e.to_string());
                return TaskResult {
                    task_id: task.id,
                    description: task.description.clone(),
                    status: TaskStatus::Failed {
                        error: err.to_string(),
                    },
                    path,
                    confirm: None,
                    assessment: None,
                    error: Some(err.to_string()),
                };
            }
        }

        let outcome = match self
            .protocol
            .confirm(self.agent.as_ref(), self.detector.as_ref(), &task.description)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                return TaskResult {
                    task_id: task.id,
                    description: task.description.clone(),
                    status: TaskStatus::Failed {
                        error: e.to_string(),
                    },
                    path,
                    confirm: None,
                    assessment: None,
                    error: Some(e.to_string()),
                };
            }
        };

        if outcome.paused {
            let reason = outcome
                .reason
                .clone()
                .unwrap_or_else(|| "user_input_needed".to_string());
            return TaskResult {
                task_id: task.id,
                description: task.description.clone(),
                status: TaskStatus::Paused {
                    reason: reason.clone(),
                },
                path,
                confirm: Some(outcome),
                assessment: None,
                error: None,
            };
        }

        if !outcome.confirmed {
            let error = if outcome.reason.as_deref() == Some("max_attempts_exceeded") {
                Error::ConfirmationExhausted {
                    attempts: outcome.attempts,
                }
                .to_string()
            } else {
                outcome
                    .reason
                    .clone()
                    .unwrap_or_else(|| "confirmation failed".to_string())
            };
            return TaskResult {
                task_id: task.id,
                description: task.description.clone(),
                status: TaskStatus::Failed {
                    error: error.clone(),
                },
                path,
                confirm: Some(outcome),
                assessment: None,
                error: Some(error),
            };
        }

        // Corroborate the completion claim before marking done.
        let assessment = self
            .validate(&outcome.last_reply, &task.description)
            .await;
        if assessment.corroborates_completion() {
            TaskResult {
                task_id: task.id,
                description: task.description.clone(),
                status: TaskStatus::Completed,
                path,
                confirm: Some(outcome),
                assessment: Some(assessment),
                error: None,
            }
        } else {
            let error = "completion not corroborated by validation".to_string();
            TaskResult {
                task_id: task.id,
                description: task.description.clone(),
                status: TaskStatus::Failed {
                    error: error.clone(),
                },
                path,
                confirm: Some(outcome),
                assessment: Some(assessment),
                error: Some(error),
            }
        }
    }

    /// Pick the execution path and fetch the agent's working reply.
    /// The enhanced engine is tried first when wired and allowed; any
    /// failure there falls back to baseline dispatch, and the chosen
    /// path is recorded rather than hidden.
    async fn dispatch(&self, task: &Task, options: &RunOptions) -> (ExecutionPath, Result<String>) {
        if options.use_enhanced_path {
            if let Some(engine) = &self.engine {
                let context = WorkflowContext {
                    task_id: task.id,
                    description: task.description.clone(),
                    category: task.category,
                };
                match engine.execute_workflow(&context).await {
                    Ok(outcome) => return (ExecutionPath::Enhanced, Ok(outcome.response)),
                    Err(e) => {
                        tplog_warn!(
                            "Enhanced path failed for task {}, falling back to baseline: {}",
                            task.id.short(),
                            e
                        );
                    }
                }
            }
        }

        let prompt = format!(
            "Complete the following task and report when done: {}",
            task.description
        );
        let timeout = self.config.confirm.request_timeout();
        let sent = match tokio::time::timeout(timeout, self.agent.send(&prompt)).await {
            Ok(reply) => reply,
            Err(_) => Err(Error::Timeout(timeout)),
        };
        (ExecutionPath::Baseline, sent)
    }

    /// Run the validator collaborator, degrading to the keyword check
    /// when it is missing or fails.
    async fn validate(&self, response: &str, context: &str) -> AssessmentReport {
        if let Some(validator) = &self.validator {
            match validator.assess(response, context).await {
                Ok(report) => return report,
                Err(e) => {
                    tplog_warn!("Validator failed, using keyword fallback: {}", e);
                }
            }
        }
        AssessmentReport::from_keywords(response)
    }

    async fn fail_session(&self, session_id: SessionId, err: &Error) {
        tplog_warn!("Session {} failed: {}", session_id.short(), err);
        self.update_session(session_id, |s| s.transition(SessionStatus::Failed))
            .await;
        self.emit(ProgressEvent::Error {
            session_id,
            reason: err.to_string(),
        });
    }

    /// Best-effort emission: sink failures are logged, never surfaced.
    fn emit(&self, event: ProgressEvent) {
        if let Err(e) = self.sink.emit(&event) {
            tplog_warn!("Progress sink dropped {} event: {}", event.name(), e);
        }
    }

    /// Registry update that tolerates a session swept mid-run.
    async fn update_session<F>(&self, session_id: SessionId, f: F)
    where
        F: FnOnce(&mut Session),
    {
        if !self.registry.update(&session_id, f).await {
            tplog_warn!("{}", Error::SessionNotFound(session_id));
        }
    }
}
