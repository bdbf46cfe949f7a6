//! Test fixtures for integration tests.
//!
//! Provides stub implementations of every collaborator seam plus a
//! fast configuration with zero retry delay.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use taskpilot::{
    AgentChannel, Config, ConfirmConfig, FallbackDetector, InputNeed, Result,
    SessionOrchestrator,
};

/// Agent that answers every prompt with the same reply.
pub struct FixedAgent {
    reply: String,
}

impl FixedAgent {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl AgentChannel for FixedAgent {
    async fn send(&self, _prompt: &str) -> Result<String> {
        Ok(self.reply.clone())
    }
}

/// Agent that plays back a scripted reply sequence, then repeats the
/// last one.
pub struct ScriptedAgent {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedAgent {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            last: Mutex::new("no reply".to_string()),
        }
    }
}

#[async_trait]
impl AgentChannel for ScriptedAgent {
    async fn send(&self, _prompt: &str) -> Result<String> {
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => {
                *self.last.lock().unwrap() = reply.clone();
                Ok(reply)
            }
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }
}

/// Detector that never asks for a pause.
pub struct NeverPause;

#[async_trait]
impl FallbackDetector for NeverPause {
    async fn detect_input_need(&self, _response: &str) -> InputNeed {
        InputNeed::Continue
    }
}

/// Config with zero retry delay so tests run instantly.
pub fn fast_config() -> Config {
    Config {
        confirm: ConfirmConfig {
            max_attempts: 3,
            confidence_threshold: 0.7,
            retry_delay_ms: 0,
            request_timeout_secs: 5,
        },
        ..Config::default()
    }
}

/// Orchestrator wired to a fixed-reply agent and a never-pausing
/// detector.
pub fn orchestrator_with_reply(reply: &str) -> SessionOrchestrator {
    SessionOrchestrator::new(
        Arc::new(FixedAgent::new(reply)),
        Arc::new(NeverPause),
        fast_config(),
    )
}
