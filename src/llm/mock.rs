//! Scripted `LlmProvider` for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};

/// Replays queued results, then repeats `fallback` (or fails once exhausted).
pub(crate) struct ScriptedLlm {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    /// Always answers with `content`.
    pub(crate) fn replying(content: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(content.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers with each scripted result in turn.
    pub(crate) fn scripted(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Text of every message sent so far, one string per request.
    pub(crate) fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| {
                r.messages
                    .iter()
                    .map(|m| m.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        let content = match next {
            Some(result) => result?,
            None => self.fallback.clone().ok_or_else(|| LlmError::RequestFailed {
                provider: "scripted".into(),
                reason: "script exhausted".into(),
            })?,
        };
        Ok(CompletionResponse {
            content,
            input_tokens: 10,
            output_tokens: 10,
            finish_reason: FinishReason::Stop,
        })
    }
}
