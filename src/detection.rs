//! Heuristics for spotting agent replies that need a human.
//!
//! The confirmation loop and the default fallback detector use these
//! to decide whether an agent reply is really a question back at the
//! user (pause the task) or just narration (keep going).

use regex::Regex;
use std::sync::LazyLock;

/// Two consecutive numbered options, e.g. "1. A\n2. B".
static OPTION_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*1[.)]\s+.+\n\s*2[.)]\s+").unwrap());

/// Phrases that turn a reply into a question aimed at the user.
const QUESTION_PHRASES: &[&str] = &[
    "do you want",
    "would you like",
    "should i",
    "shall i",
    "can i",
    "may i",
    "please confirm",
    "please select",
    "please choose",
    "choose one",
    "choose an option",
    "select an option",
    "which one",
    "which option",
    "what should",
    "how should",
    "want me to",
];

/// Prompt fragments that indicate the agent stopped to wait for input.
const INPUT_PROMPTS: &[&str] = &[
    "please provide",
    "please enter",
    "please input",
    "enter your",
    "type your",
    "input your",
    "specify the",
    "press enter",
    "(y/n)",
    "[y/n]",
    "(yes/no)",
    "[yes/no]",
];

/// Does the reply need a human response before the task can continue?
pub fn needs_user_input(reply: &str) -> bool {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return false;
    }

    if trimmed.lines().any(|l| l.trim().ends_with('?')) {
        return true;
    }

    if has_option_list(trimmed) {
        return true;
    }

    let lower = trimmed.to_lowercase();
    if QUESTION_PHRASES.iter().any(|p| lower.contains(p)) {
        return true;
    }
    if INPUT_PROMPTS.iter().any(|p| lower.contains(p)) {
        return true;
    }

    // A bare trailing colon reads as a prompt; an ellipsis reads as
    // ongoing work.
    let last = trimmed.lines().last().unwrap_or("").trim();
    last.ends_with(':') && !last.contains("...")
}

/// Pull out the line the user is being asked to answer, if any.
pub fn extract_prompt(reply: &str) -> Option<String> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return None;
    }

    // The last question-mark line is the most recent ask.
    if let Some(line) = trimmed.lines().rev().find(|l| l.trim().ends_with('?')) {
        return Some(line.trim().to_string());
    }

    // The line preceding an option list is its prompt.
    if OPTION_LIST_RE.is_match(trimmed) {
        let lines: Vec<&str> = trimmed.lines().collect();
        for (i, line) in lines.iter().enumerate() {
            let l = line.trim();
            if (l.starts_with("1.") || l.starts_with("1)")) && i > 0 {
                let prev = lines[i - 1].trim();
                if !prev.is_empty() {
                    return Some(prev.to_string());
                }
            }
        }
    }

    for line in trimmed.lines().rev() {
        let lower = line.to_lowercase();
        if QUESTION_PHRASES
            .iter()
            .chain(INPUT_PROMPTS.iter())
            .any(|p| lower.contains(p))
        {
            return Some(line.trim().to_string());
        }
    }

    None
}

fn has_option_list(text: &str) -> bool {
    if !OPTION_LIST_RE.is_match(text) {
        return false;
    }
    // An option list only reads as a question next to selection words;
    // a plain enumeration of results does not.
    let lower = text.to_lowercase();
    lower.contains("choose")
        || lower.contains("select")
        || lower.contains("pick")
        || lower.contains("option")
        || lower.contains("which")
        || lower.contains("what")
}
