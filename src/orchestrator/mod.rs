//! Session orchestration: lifecycle, registry, events, and the runner.

pub mod events;
pub mod runner;
pub mod session;

pub use events::{MpscProgressSink, NoopProgressSink, ProgressEvent, ProgressSink};
pub use runner::SessionOrchestrator;
pub use session::{
    ExecutionPath, RunOptions, Session, SessionId, SessionRegistry, SessionResult, SessionStatus,
    TaskResult,
};
