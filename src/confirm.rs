//! Bounded confirmation protocol.
//!
//! After a task has been dispatched, the orchestrator asks the agent
//! for a structured status report and parses the reply. Structured
//! tokens win; a multilingual completion lexicon is the fallback.
//! Decisive answers (positive or negative) stop the loop immediately;
//! ambiguous ones are retried up to a bound with a fixed delay.

use crate::agent::{AgentChannel, FallbackDetector, InputNeed};
use crate::config::ConfirmConfig;
use crate::detection;
use crate::error::{Error, Result};
use crate::{tplog_debug, tplog_trace};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// `[PASSED|FAILED] NN%` test-outcome token.
static TEST_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(passed|failed)\b\s*(\d{1,3})\s*%").unwrap());

/// Completion words the keyword fallback accepts, across the languages
/// agents have been seen replying in. Shared with the minimal
/// validation fallback.
pub(crate) const COMPLETION_LEXICON: &[&str] = &[
    "done",
    "finished",
    "complete",
    "completado",
    "terminado",
    "terminé",
    "fini",
    "fertig",
    "erledigt",
    "klaar",
    "pronto",
    "完了",
    "完成",
];

const NEED_HUMAN_TOKENS: &[&str] = &["need human", "needs human", "need a human"];

/// Negated completion phrases; a reply containing one of these never
/// counts as a completion claim, structured or lexicon.
const NEGATED_COMPLETION: &[&str] = &[
    "not completed",
    "not complete",
    "not done",
    "not finished",
    "uncompleted",
    "incomplete",
    "unfinished",
];

/// Parsed status of one confirmation reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmStatus {
    Completed,
    PartiallyCompleted,
    NeedHuman,
    Unknown,
}

impl std::fmt::Display for ConfirmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmStatus::Completed => write!(f, "completed"),
            ConfirmStatus::PartiallyCompleted => write!(f, "partially_completed"),
            ConfirmStatus::NeedHuman => write!(f, "need_human"),
            ConfirmStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Optional test outcome reported alongside a status token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub passed: bool,
    pub percentage: u8,
}

/// One round-trip status query: what was asked, what came back, and
/// how it parsed.
#[derive(Debug, Clone)]
pub struct ConfirmationAttempt {
    pub question: String,
    pub reply: String,
    pub status: ConfirmStatus,
    pub confidence: f64,
    pub test_outcome: Option<TestOutcome>,
}

/// Final verdict of the confirmation loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmOutcome {
    pub confirmed: bool,
    pub status: ConfirmStatus,
    pub confidence: f64,
    pub reason: Option<String>,
    pub attempts: u32,
    /// Set when the fallback detector asked for a human mid-loop; the
    /// task is paused, not failed.
    pub paused: bool,
    pub test_outcome: Option<TestOutcome>,
    /// Raw text of the reply the verdict was based on.
    pub last_reply: String,
}

/// Drives the bounded status-query loop against the agent channel.
pub struct ConfirmationProtocol {
    config: ConfirmConfig,
}

impl ConfirmationProtocol {
    pub fn new(config: ConfirmConfig) -> Self {
        Self { config }
    }

    /// Run the confirmation loop for one task.
    ///
    /// Stops immediately on a decisive reply in either direction; only
    /// ambiguous replies burn further attempts. A `Pause` verdict from
    /// the detector short-circuits into a paused outcome.
    ///
    /// # Errors
    /// Propagates agent-channel failures and per-request timeouts.
    pub async fn confirm(
        &self,
        agent: &dyn AgentChannel,
        detector: &dyn FallbackDetector,
        context: &str,
    ) -> Result<ConfirmOutcome> {
        let question = build_status_request(context);
        let mut last_status = ConfirmStatus::Unknown;
        let mut last_confidence = 0.0;
        let mut last_test = None;
        let mut last_reply = String::new();

        for attempt in 1..=self.config.max_attempts {
            let reply = tokio::time::timeout(self.config.request_timeout(), agent.send(&question))
                .await
                .map_err(|_| Error::Timeout(self.config.request_timeout()))??;

            let parsed = parse_reply(&question, &reply);
            tplog_debug!(
                "Confirmation attempt {}/{}: status={} confidence={:.2}",
                attempt,
                self.config.max_attempts,
                parsed.status,
                parsed.confidence
            );
            tplog_trace!("Confirmation reply: {}", reply);

            last_status = parsed.status;
            last_confidence = parsed.confidence;
            last_test = parsed.test_outcome;
            last_reply = reply.clone();

            let decisive = parsed.confidence >= self.config.confidence_threshold;
            match parsed.status {
                ConfirmStatus::Completed if decisive => {
                    return Ok(ConfirmOutcome {
                        confirmed: true,
                        status: parsed.status,
                        confidence: parsed.confidence,
                        reason: None,
                        attempts: attempt,
                        paused: false,
                        test_outcome: parsed.test_outcome,
                        last_reply: reply,
                    });
                }
                ConfirmStatus::NeedHuman | ConfirmStatus::PartiallyCompleted if decisive => {
                    // A clear negative; further attempts would not
                    // change the answer.
                    return Ok(ConfirmOutcome {
                        confirmed: false,
                        status: parsed.status,
                        confidence: parsed.confidence,
                        reason: Some(parsed.status.to_string()),
                        attempts: attempt,
                        paused: false,
                        test_outcome: parsed.test_outcome,
                        last_reply: reply,
                    });
                }
                _ => {}
            }

            // Ambiguous reply: maybe the agent is actually asking us
            // something.
            if detector.detect_input_need(&reply).await == InputNeed::Pause {
                let reason = match detection::extract_prompt(&reply) {
                    Some(question) => format!("user_input_needed: {}", question),
                    None => "user_input_needed".to_string(),
                };
                return Ok(ConfirmOutcome {
                    confirmed: false,
                    status: ConfirmStatus::NeedHuman,
                    confidence: parsed.confidence,
                    reason: Some(reason),
                    attempts: attempt,
                    paused: true,
                    test_outcome: parsed.test_outcome,
                    last_reply: reply,
                });
            }

            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.retry_delay()).await;
            }
        }

        Ok(ConfirmOutcome {
            confirmed: false,
            status: last_status,
            confidence: last_confidence,
            reason: Some("max_attempts_exceeded".to_string()),
            attempts: self.config.max_attempts,
            paused: false,
            test_outcome: last_test,
            last_reply,
        })
    }
}

/// The canonical status request sent on every attempt.
fn build_status_request(context: &str) -> String {
    format!(
        "Report the current status of this task as exactly one of: \
         completed, partially completed, need human. \
         If tests were run, also report the outcome as PASSED or FAILED \
         with a percentage, e.g. \"PASSED 95%\".\n\nTask: {}",
        context
    )
}

/// Parse one agent reply into a confirmation attempt.
///
/// Structured tokens are checked longest-first: "partially completed"
/// before need-human, need-human before the bare "completed" token, so
/// a negative phrased around the word "completed" is never upgraded.
/// Negated completion phrases suppress both the structured token and
/// the multilingual lexicon, which is the last resort.
pub fn parse_reply(question: &str, reply: &str) -> ConfirmationAttempt {
    let lower = reply.to_lowercase();
    let test_outcome = parse_test_token(reply);
    let negated = NEGATED_COMPLETION.iter().any(|t| lower.contains(t));

    let (status, confidence) = if lower.contains("partially completed")
        || lower.contains("partially complete")
    {
        (ConfirmStatus::PartiallyCompleted, 0.7)
    } else if NEED_HUMAN_TOKENS.iter().any(|t| lower.contains(t)) {
        (ConfirmStatus::NeedHuman, 0.8)
    } else if !negated && lower.contains("completed") {
        (ConfirmStatus::Completed, 0.9)
    } else if !negated && COMPLETION_LEXICON.iter().any(|w| lower.contains(w)) {
        (ConfirmStatus::Completed, 0.6)
    } else {
        (ConfirmStatus::Unknown, 0.0)
    };

    ConfirmationAttempt {
        question: question.to_string(),
        reply: reply.to_string(),
        status,
        confidence,
        test_outcome,
    }
}

fn parse_test_token(reply: &str) -> Option<TestOutcome> {
    let caps = TEST_TOKEN_RE.captures(reply)?;
    let passed = caps.get(1)?.as_str().eq_ignore_ascii_case("passed");
    let percentage: u8 = caps.get(2)?.as_str().parse().ok()?;
    Some(TestOutcome {
        passed,
        percentage: percentage.min(100),
    })
}
