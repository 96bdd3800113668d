//! Bridges rig-core's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::CompletionModel;
use rig::message::{AssistantContent, Message};

use crate::error::LlmError;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};

/// Wraps any rig completion model as an `LlmProvider`.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = flatten_conversation(&request);
        let mut builder = self.model.completion_request(Message::user(prompt));

        if let Some(preamble) = request.system_prompt() {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder.send().await.map_err(|e| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: e.to_string(),
        })?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|part| match part {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            tracing::debug!(model = %self.model_name, "Completion returned no text content");
        }

        let output_tokens = u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX);
        Ok(CompletionResponse {
            content,
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens,
            finish_reason: FinishReason::from_usage(output_tokens, request.max_tokens),
        })
    }
}

/// Collapse the non-system messages into a single user prompt.
///
/// A lone user message is passed through verbatim; longer exchanges are
/// rendered as a labelled transcript.
fn flatten_conversation(request: &CompletionRequest) -> String {
    let turns: Vec<_> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .collect();

    match turns.as_slice() {
        [only] => only.content.clone(),
        _ => turns
            .iter()
            .map(|m| match m.role {
                Role::Assistant => format!("Assistant: {}", m.content),
                _ => format!("User: {}", m.content),
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::ChatMessage;

    #[test]
    fn single_user_message_passes_through() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("hello"),
        ]);
        assert_eq!(flatten_conversation(&request), "hello");
    }

    #[test]
    fn multi_turn_becomes_transcript() {
        let request = CompletionRequest::new(vec![
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
            ChatMessage::user("again"),
        ]);
        assert_eq!(
            flatten_conversation(&request),
            "User: hello\n\nAssistant: hi\n\nUser: again"
        );
    }
}
