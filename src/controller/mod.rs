//! Drives generate → validate → continue/rewrite rounds until the text is
//! complete or the retry budget runs out.
//!
//! Truncated output is extended in place: the partial answer and a
//! "continue" instruction are appended to the conversation and the
//! accumulated text is kept. Output that does not parse is thrown away: the
//! conversation is replaced by one corrective prompt and the accumulated
//! text starts over. A `length` finish reason always counts as truncation.
//! Exhausting the budget is not an error; the best text so far is returned.

use serde::Serialize;
use tracing::{info, warn};

use crate::prompt;
use crate::provider::DynProvider;
use crate::validate::{clean_for_parsing, ValidationResult, Validator};
use crate::wire::{Completion, Conversation, FinishReason};

const TOKEN_LIMIT_REASON: &str = "response stopped at the token limit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Accept,
    Continue,
    Rewrite,
    /// Transport failed; the same conversation is sent again.
    RetrySame,
    GiveUp,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// 1-based.
    pub index: u32,
    pub messages_sent: usize,
    pub accumulated_before: usize,
    pub received_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ValidationResult>,
    pub action: Action,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    /// Raw accumulated model output.
    pub text: String,
    /// `text` without narrative and fences.
    pub code: String,
    pub attempts: Vec<AttemptRecord>,
    pub final_verdict: Option<ValidationResult>,
}

impl GenerationOutcome {
    pub fn is_complete(&self) -> bool {
        self.final_verdict.as_ref().is_some_and(ValidationResult::is_complete)
    }

    pub fn status(&self) -> &'static str {
        self.final_verdict.as_ref().map_or("NO_RESPONSE", ValidationResult::status)
    }
}

/// Hooks for progress display and transcript saving.
pub trait AttemptObserver: Send {
    fn on_request(&mut self, _index: u32, _conversation: &Conversation) {}
    fn on_attempt(&mut self, _record: &AttemptRecord, _received: Option<&Completion>) {}
}

pub struct NoopObserver;

impl AttemptObserver for NoopObserver {}

pub struct ContinuationController {
    provider: DynProvider,
    validator: Box<dyn Validator>,
    max_retries: u32,
}

impl ContinuationController {
    pub fn new(provider: DynProvider, validator: Box<dyn Validator>, max_retries: u32) -> Self {
        Self { provider, validator, max_retries }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub async fn generate(&self, request: &str) -> GenerationOutcome {
        self.generate_with(request, &mut NoopObserver).await
    }

    pub async fn generate_with(&self, request: &str, observer: &mut dyn AttemptObserver) -> GenerationOutcome {
        let total = self.max_attempts();
        let mut conversation = Conversation::single_user(request);
        let mut accumulated = String::new();
        let mut attempts = Vec::new();
        let mut final_verdict = None;

        for index in 1..=total {
            let retries_left = index < total;
            let messages_sent = conversation.len();
            let accumulated_before = accumulated.len();
            observer.on_request(index, &conversation);

            let completion = match self.provider.stream_completion(&conversation).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(attempt = index, error = %e, "transport failure");
                    let record = AttemptRecord {
                        index,
                        messages_sent,
                        accumulated_before,
                        received_len: 0,
                        finish_reason: None,
                        transport_error: Some(e.to_string()),
                        verdict: None,
                        action: if retries_left { Action::RetrySame } else { Action::GiveUp },
                    };
                    observer.on_attempt(&record, None);
                    attempts.push(record);
                    continue;
                }
            };

            accumulated.push_str(&completion.content);
            let hard_cut = completion.finish_reason == FinishReason::Length;
            let verdict = match self.validator.classify(&accumulated).await {
                ValidationResult::Complete if hard_cut => ValidationResult::truncated(TOKEN_LIMIT_REASON),
                v => v,
            };
            let action = decide(&verdict, hard_cut, retries_left);

            info!(
                attempt = index,
                of = total,
                received = completion.content.len(),
                accumulated = accumulated.len(),
                finish_reason = completion.finish_reason.as_str(),
                verdict = verdict.status(),
                action = ?action,
                "attempt finished"
            );

            let record = AttemptRecord {
                index,
                messages_sent,
                accumulated_before,
                received_len: completion.content.len(),
                finish_reason: Some(completion.finish_reason),
                transport_error: None,
                verdict: Some(verdict.clone()),
                action,
            };
            observer.on_attempt(&record, Some(&completion));
            attempts.push(record);

            match action {
                Action::Accept | Action::GiveUp => {
                    final_verdict = Some(verdict);
                    break;
                }
                Action::Continue => {
                    conversation.push_continuation(&completion.content, prompt::continuation_instruction());
                    final_verdict = Some(verdict);
                }
                Action::Rewrite => {
                    let diagnostic = verdict.describe();
                    conversation.replace_with(prompt::rewrite_prompt(request, &accumulated, &diagnostic));
                    accumulated.clear();
                    final_verdict = None;
                }
                // decide() never picks this; transport failures are handled above
                Action::RetrySame => {}
            }
        }

        if !final_verdict.as_ref().is_some_and(ValidationResult::is_complete) {
            warn!(attempts = attempts.len(), "retries exhausted, returning best-effort text");
        }

        let code = clean_for_parsing(&accumulated).body;
        GenerationOutcome { text: accumulated, code, attempts, final_verdict }
    }
}

fn decide(verdict: &ValidationResult, hard_cut: bool, retries_left: bool) -> Action {
    match verdict {
        ValidationResult::Complete => Action::Accept,
        _ if !retries_left => Action::GiveUp,
        ValidationResult::Truncated { .. } => Action::Continue,
        ValidationResult::SyntaxError { .. } if hard_cut => Action::Continue,
        ValidationResult::SyntaxError { .. } => Action::Rewrite,
    }
}
