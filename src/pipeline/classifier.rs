//! Email classification: intent category plus extracted fields.
//!
//! `LlmClassifier` is the validation boundary between free-form model
//! output and the typed record model. Whatever the backend answers, the
//! result is one of the fixed categories and a flat string map.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ClassificationError, InvalidInputError};
use crate::llm::extract_json_object;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::extract::heuristic_fields;
use crate::pipeline::types::Classification;
use crate::store::record::{Category, ExtractedFields};

/// Max tokens for the classification call (JSON answer only).
const CLASSIFY_MAX_TOKENS: u32 = 512;

/// Temperature for classification (deterministic-ish).
const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// Longest email excerpt sent to the model.
const MAX_PROMPT_CHARS: usize = 6000;

/// Default minimum confidence below which the category becomes `Other`.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// Labelled examples shown to the model in every classification prompt.
const FEW_SHOT_EXAMPLES: &[(&str, Category)] = &[
    (
        "Subject: RFQ - Costing for Custom Sensor Assemblies\n\
         We require a formal RFQ for a new project. Please price the custom sensor \
         assemblies in drawings QD-DWG-77A/77B for a batch of 50 and a batch of 100.",
        Category::QuoteRequest,
    ),
    (
        "Subject: Request for Quote - Replacement Motor Looms\n\
         Could you please provide a quote for the following replacement parts?\n\
         ITEM: AI-ML-V4, Industrial Motor Looms\nQUANTITY: 10 units",
        Category::QuoteRequest,
    ),
    (
        "Subject: Purchase Order PO2025-095 for Sensor Assemblies\n\
         Please see the attached Purchase Order PO2025-095 for the batch of 100 units, \
         based on your quotation Q-9981.",
        Category::NewOrder,
    ),
    (
        "Subject: Delivery Inquiry for PO-PW-1134\n\
         I'm following up on our order for motor looms. Can you please provide an \
         estimated delivery date? We need to schedule technicians for installation.",
        Category::DeliveryQuestion,
    ),
    (
        "Subject: Quote Refresh - Part SC-3100-D Power Converters\n\
         Could you provide a refreshed quote for 200 units of part SC-3100-D Power \
         Converters? We need to verify current costing before issuing a new order.",
        Category::QuoteRequest,
    ),
    (
        "Subject: New PO Attached - PO-2025-790 for SC-3100-D\n\
         Please find our new PO attached for the power converters. PO-2025-790 is for \
         200 units.",
        Category::NewOrder,
    ),
    (
        "Subject: ETD Request for PO2025-095\n\
         Could you provide the target ETD for our order? Our logistics team is planning \
         the receiving schedule.",
        Category::DeliveryQuestion,
    ),
    (
        "Subject: Confirmation for order PO-2025-790\n\
         Just confirming that the order is on track to ship this Friday as per the \
         acknowledged delivery date. Let me know if there are any delays.",
        Category::DeliveryQuestion,
    ),
    (
        "Subject: Purchase Order for additional Motor Looms - PO-PW-1145\n\
         Please accept the attached Purchase Order for an additional 5 units of the \
         AI-ML-V4 Motor Looms.",
        Category::NewOrder,
    ),
    (
        "Subject: Team lunch on Friday\n\
         Hi all, we're booking a table for Friday at noon. Reply if you can make it.",
        Category::Other,
    ),
];

/// Maps raw email text to a category and extracted fields.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, ClassificationError>;
}

/// Classifier backed by an `LlmProvider`, with regex extraction on top.
pub struct LlmClassifier {
    llm: Arc<dyn LlmProvider>,
    min_confidence: f32,
    heuristics: bool,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            heuristics: true,
        }
    }

    /// Categories reported with lower confidence are coerced to `Other`.
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Enable or disable regex field extraction.
    pub fn with_heuristics(mut self, enabled: bool) -> Self {
        self.heuristics = enabled;
        self
    }

    fn validate(&self, raw: &str) -> Result<Classification, ClassificationError> {
        let response = parse_classifier_response(raw)?;

        let category = match Category::from_label(&response.category) {
            Some(category) => category,
            None => {
                warn!(
                    label = %response.category,
                    "Unrecognized category from classifier, using other"
                );
                Category::Other
            }
        };

        let category = match response.confidence {
            Some(confidence) if confidence < self.min_confidence && category != Category::Other => {
                debug!(
                    category = category.as_str(),
                    confidence,
                    min_confidence = self.min_confidence,
                    "Classifier confidence below threshold, using other"
                );
                Category::Other
            }
            _ => category,
        };

        let fields = match response.fields {
            None | Some(Value::Null) => ExtractedFields::new(),
            Some(Value::Object(map)) => flatten_fields(map),
            Some(other) => {
                return Err(ClassificationError::MalformedResponse {
                    reason: format!("\"fields\" must be an object, got {}", json_kind(&other)),
                });
            }
        };

        Ok(Classification::new(category, fields))
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, ClassificationError> {
        if text.trim().is_empty() {
            return Err(InvalidInputError::empty_text().into());
        }

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_classifier_system_prompt()),
            ChatMessage::user(build_classifier_user_prompt(text)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;

        let mut classification = self.validate(&response.content).inspect_err(|e| {
            warn!(
                raw_response = %response.content,
                error = %e,
                "Failed to parse classifier response"
            );
        })?;

        if self.heuristics {
            for (key, value) in heuristic_fields(text) {
                classification.fields.entry(key).or_insert(value);
            }
        }

        debug!(
            category = classification.category.as_str(),
            fields = classification.fields.len(),
            "Email classified"
        );
        Ok(classification)
    }
}

// ── Prompts ─────────────────────────────────────────────────────────

fn build_classifier_system_prompt() -> String {
    let categories = Category::ALL
        .iter()
        .map(|c| format!("- \"{}\" ({})", c.as_str(), c.label()))
        .collect::<Vec<_>>()
        .join("\n");

    let examples = FEW_SHOT_EXAMPLES
        .iter()
        .map(|(text, category)| format!("Email:\n{}\nCategory: {}", text, category.as_str()))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"You classify inbound business emails for a manufacturing sales team.

Categories:
{categories}

Respond with ONLY a JSON object, no other text:
{{"category": "<one of the category ids above>", "confidence": <0.0-1.0>, "fields": {{"<name>": "<value>"}}}}

Put any details you can identify in "fields" using snake_case names such as
"quantity", "item", "order_reference", "quote_reference", "requested_date".
Use plain strings for values. Omit fields you cannot find.

Examples:

{examples}"#
    )
}

fn build_classifier_user_prompt(text: &str) -> String {
    let excerpt: String = text.chars().take(MAX_PROMPT_CHARS).collect();
    format!("Classify this email:\n\n{}", excerpt)
}

// ── Response parsing ────────────────────────────────────────────────

/// Expected JSON structure from the classifier.
#[derive(Debug, Deserialize)]
struct ClassifierResponse {
    category: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    fields: Option<Value>,
}

fn parse_classifier_response(raw: &str) -> Result<ClassifierResponse, ClassificationError> {
    let json_str = extract_json_object(raw);
    serde_json::from_str(&json_str).map_err(|e| ClassificationError::MalformedResponse {
        reason: format!("JSON parse error: {e}"),
    })
}

/// Flatten arbitrary JSON values into trimmed strings keyed by snake_case names.
fn flatten_fields(map: serde_json::Map<String, Value>) -> ExtractedFields {
    map.into_iter()
        .filter_map(|(key, value)| {
            let key = normalize_field_key(&key);
            if key.is_empty() {
                return None;
            }
            let value = flatten_value(value)?;
            Some((key, value))
        })
        .collect()
}

fn flatten_value(value: Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(flatten_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    };
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn normalize_field_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for ch in key.trim().chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::mock::ScriptedLlm;

    fn classifier(reply: &str) -> (Arc<ScriptedLlm>, LlmClassifier) {
        let llm = Arc::new(ScriptedLlm::replying(reply));
        (llm.clone(), LlmClassifier::new(llm))
    }

    #[test]
    fn system_prompt_lists_categories_and_examples() {
        let prompt = build_classifier_system_prompt();
        for category in Category::ALL {
            assert!(prompt.contains(category.as_str()));
        }
        assert!(prompt.contains("PO-PW-1134"));
        assert!(prompt.contains("\"confidence\""));
    }

    #[test]
    fn user_prompt_truncates_long_emails() {
        let prompt = build_classifier_user_prompt(&"x".repeat(10_000));
        assert!(prompt.len() < 10_000);
        assert!(prompt.contains(&"x".repeat(100)));
    }

    #[tokio::test]
    async fn quote_request_with_fields() {
        let (_, classifier) = classifier(
            r#"{"category": "quote_request", "confidence": 0.93,
                "fields": {"quantity": 50, "item": "part X"}}"#,
        );
        let result = classifier
            .classify("Please send a quote for 50 units of part X")
            .await
            .unwrap();
        assert_eq!(result.category, Category::QuoteRequest);
        assert_eq!(result.fields["quantity"], "50");
        assert_eq!(result.fields["item"], "part X");
    }

    #[tokio::test]
    async fn labels_and_fences_are_tolerated() {
        let (_, classifier) = classifier(
            "Sure!\n```json\n{\"category\": \"New Order Received\", \"confidence\": 0.8}\n```",
        );
        let result = classifier.classify("PO attached").await.unwrap();
        assert_eq!(result.category, Category::NewOrder);
    }

    #[tokio::test]
    async fn trailing_prose_after_object_is_ignored() {
        let (_, classifier) = classifier(
            "{\"category\":\"new_order\",\"confidence\":0.9}\nLet me know if you need anything else.",
        );
        let result = classifier.classify("PO attached").await.unwrap();
        assert_eq!(result.category, Category::NewOrder);
    }

    #[tokio::test]
    async fn unknown_category_becomes_other() {
        let (_, classifier) = classifier(r#"{"category": "complaint", "confidence": 0.99}"#);
        let result = classifier.classify("This is unacceptable").await.unwrap();
        assert_eq!(result.category, Category::Other);
    }

    #[tokio::test]
    async fn low_confidence_becomes_other() {
        let (_, classifier) =
            classifier(r#"{"category": "delivery_question", "confidence": 0.2}"#);
        let result = classifier.classify("when?").await.unwrap();
        assert_eq!(result.category, Category::Other);

        let llm = Arc::new(ScriptedLlm::replying(
            r#"{"category": "delivery_question", "confidence": 0.2}"#,
        ));
        let lenient = LlmClassifier::new(llm).with_min_confidence(0.1);
        assert_eq!(
            lenient.classify("when?").await.unwrap().category,
            Category::DeliveryQuestion
        );
    }

    #[tokio::test]
    async fn missing_confidence_keeps_category() {
        let (_, classifier) = classifier(r#"{"category": "new_order"}"#);
        assert_eq!(
            classifier.classify("order").await.unwrap().category,
            Category::NewOrder
        );
    }

    #[tokio::test]
    async fn fields_are_flattened() {
        let (_, classifier) = classifier(
            r#"{"category": "new_order", "confidence": 1,
                "fields": {"Order Reference": "PO-1", "items": ["a", 2, null],
                           "rush": true, "notes": null, "": "x", "blank": "  "}}"#,
        );
        let fields = classifier
            .with_heuristics(false)
            .classify("order")
            .await
            .unwrap()
            .fields;
        assert_eq!(fields["order_reference"], "PO-1");
        assert_eq!(fields["items"], "a, 2");
        assert_eq!(fields["rush"], "true");
        assert!(!fields.contains_key("notes"));
        assert!(!fields.contains_key("blank"));
        assert_eq!(fields.len(), 3);
    }

    #[tokio::test]
    async fn heuristics_fill_missing_keys_only() {
        let (_, classifier) = classifier(
            r#"{"category": "quote_request", "confidence": 0.9, "fields": {"item": "sensor kit"}}"#,
        );
        let result = classifier
            .classify("From: Ann <ann@acme.test>\nSubject: RFQ\n\nPlease quote 20 units of part Q")
            .await
            .unwrap();
        assert_eq!(result.fields["item"], "sensor kit");
        assert_eq!(result.fields["quantity"], "20");
        assert_eq!(result.fields["subject"], "RFQ");
        assert_eq!(result.fields["sender_email"], "ann@acme.test");
    }

    #[tokio::test]
    async fn empty_text_is_rejected_without_calling_the_model() {
        let (llm, classifier) = classifier(r#"{"category": "other"}"#);
        let err = classifier.classify("  \n\t").await.unwrap_err();
        assert!(matches!(err, ClassificationError::InvalidInput(_)));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn unparsable_response_is_malformed() {
        let (_, classifier) = classifier("I think it's a quote request.");
        let err = classifier.classify("quote please").await.unwrap_err();
        assert!(matches!(err, ClassificationError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn non_object_fields_are_malformed() {
        let (_, classifier) = classifier(r#"{"category": "other", "fields": "none"}"#);
        let err = classifier.classify("hi").await.unwrap_err();
        assert!(matches!(err, ClassificationError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn backend_failure_is_reported() {
        let llm = Arc::new(ScriptedLlm::scripted(vec![Err(LlmError::Timeout {
            provider: "scripted".into(),
            timeout: std::time::Duration::from_secs(30),
        })]));
        let err = LlmClassifier::new(llm).classify("hi").await.unwrap_err();
        assert!(matches!(
            err,
            ClassificationError::Backend(LlmError::Timeout { .. })
        ));
    }

    #[test]
    fn field_keys_normalize() {
        assert_eq!(normalize_field_key("Order Reference"), "order_reference");
        assert_eq!(normalize_field_key("  qty. "), "qty");
        assert_eq!(normalize_field_key("--"), "");
    }
}
