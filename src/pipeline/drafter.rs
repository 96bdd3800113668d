//! Reply drafting.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{DraftError, InvalidInputError};
use crate::llm::provider::{ChatMessage, CompletionRequest, FinishReason, LlmProvider};
use crate::llm::strip_code_fence;
use crate::pipeline::types::Classification;
use crate::store::record::Category;

/// Acknowledgement used for `Other` emails instead of a model call.
pub const DEFAULT_OTHER_REPLY: &str = "Thank you for your email. We have received your message \
                                       and will respond appropriately.";

/// Longest email excerpt sent to the model.
const MAX_PROMPT_CHARS: usize = 6000;

/// Produces a reply draft for a classified email.
#[async_trait]
pub trait Drafter: Send + Sync {
    async fn draft(&self, text: &str, classification: &Classification)
    -> Result<String, DraftError>;
}

/// Drafting knobs.
#[derive(Debug, Clone)]
pub struct DrafterConfig {
    /// Fixed reply for `Other` emails; `None` drafts them with the model too.
    pub other_reply: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for DrafterConfig {
    fn default() -> Self {
        Self {
            other_reply: Some(DEFAULT_OTHER_REPLY.to_string()),
            temperature: 0.4,
            max_tokens: 1024,
        }
    }
}

/// Drafter backed by an `LlmProvider`.
pub struct LlmDrafter {
    llm: Arc<dyn LlmProvider>,
    config: DrafterConfig,
}

impl LlmDrafter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self::with_config(llm, DrafterConfig::default())
    }

    pub fn with_config(llm: Arc<dyn LlmProvider>, config: DrafterConfig) -> Self {
        Self { llm, config }
    }
}

#[async_trait]
impl Drafter for LlmDrafter {
    async fn draft(
        &self,
        text: &str,
        classification: &Classification,
    ) -> Result<String, DraftError> {
        if text.trim().is_empty() {
            return Err(InvalidInputError::empty_text().into());
        }

        if classification.category == Category::Other
            && let Some(reply) = self.config.other_reply.as_ref()
        {
            let reply = reply.trim();
            if reply.is_empty() {
                return Err(DraftError::EmptyDraft);
            }
            debug!("Using fixed acknowledgement for uncategorized email");
            return Ok(reply.to_string());
        }

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_draft_system_prompt()),
            ChatMessage::user(build_draft_user_prompt(text, classification)),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self.llm.complete(request).await?;
        if response.finish_reason == FinishReason::Length {
            warn!(
                max_tokens = self.config.max_tokens,
                "Draft hit the token limit and may be cut off"
            );
        }
        let draft = strip_code_fence(&response.content);
        if draft.is_empty() {
            return Err(DraftError::EmptyDraft);
        }

        debug!(
            category = classification.category.as_str(),
            chars = draft.len(),
            "Reply drafted"
        );
        Ok(draft.to_string())
    }
}

// ── Prompts ─────────────────────────────────────────────────────────

fn build_draft_system_prompt() -> String {
    r#"You draft replies to inbound business emails for a manufacturing sales team.
A human reviews every draft before it is sent.

Guidelines by category:
- quote_request: thank the sender, confirm the items and quantities you understood,
  say a formal quote will follow, and ask for any missing specifications.
- new_order: confirm receipt of the order, repeat the order reference and quantities,
  and give an expected processing timeline.
- delivery_question: acknowledge the order reference, say you are checking the status,
  and promise an estimated delivery or dispatch date.
- other: acknowledge politely and say the right person will follow up.

Write only the reply body: no subject line, no markdown, no placeholders in square
brackets. Keep it concise and professional."#
        .to_string()
}

fn build_draft_user_prompt(text: &str, classification: &Classification) -> String {
    let mut prompt = format!(
        "Category: {} ({})\n",
        classification.category.as_str(),
        classification.category.label()
    );

    if !classification.fields.is_empty() {
        prompt.push_str("Extracted details:\n");
        for (key, value) in &classification.fields {
            prompt.push_str(&format!("- {}: {}\n", key, value));
        }
    }

    let excerpt: String = text.chars().take(MAX_PROMPT_CHARS).collect();
    prompt.push_str(&format!("\nOriginal email:\n{}\n\nDraft the reply.", excerpt));
    prompt
}
