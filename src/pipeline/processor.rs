//! Email pipeline: classify, draft and commit one email at a time.
//!
//! **Core invariant: a submission either ends up committed to the store or
//! leaves the store exactly as it was.**
//!
//! Flow:
//! 1. Validate input (non-empty text)
//! 2. Classifier → category + extracted fields
//! 3. Drafter → reply draft
//! 4. Append the new record and commit the working set
//!
//! The pipeline never retries. Transient LLM failures are retried inside
//! the LLM layer (`RetryProvider`), before they ever reach this code.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{InvalidInputError, PipelineError, PipelineStage, StoreError};
use crate::pipeline::classifier::Classifier;
use crate::pipeline::drafter::Drafter;
use crate::pipeline::types::SubmissionState;
use crate::store::record::EmailRecord;
use crate::store::traits::RecordStore;

/// Orchestrates classifier, drafter and record store.
pub struct EmailPipeline {
    store: Arc<dyn RecordStore>,
    classifier: Arc<dyn Classifier>,
    drafter: Arc<dyn Drafter>,
}

impl EmailPipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        classifier: Arc<dyn Classifier>,
        drafter: Arc<dyn Drafter>,
    ) -> Self {
        Self {
            store,
            classifier,
            drafter,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Process a single email end to end and return the committed record.
    pub async fn process(&self, text: &str) -> Result<EmailRecord, PipelineError> {
        let mut state = SubmissionState::Received;
        debug!(chars = text.len(), state = %state, "Email received");

        let result = self.run(text, &mut state).await;
        if let Err(e) = &result {
            let failed = SubmissionState::Failed(e.stage());
            debug!(from = %state, to = %failed, "Submission state changed");
            warn!(stage = e.stage().as_str(), error = %e, "Email processing failed");
        }
        result
    }

    async fn run(
        &self,
        text: &str,
        state: &mut SubmissionState,
    ) -> Result<EmailRecord, PipelineError> {
        if text.trim().is_empty() {
            return Err(InvalidInputError::empty_text().into());
        }

        let classification = self.classifier.classify(text).await?;
        transition(state, SubmissionState::Classified);
        debug!(
            category = classification.category.as_str(),
            fields = classification.fields.len(),
            "Classification complete"
        );

        let draft = self.drafter.draft(text, &classification).await?;
        transition(state, SubmissionState::Drafted);

        let record = EmailRecord::new(text, classification.category, classification.fields, draft);
        let record = self.commit(record).await?;
        transition(state, SubmissionState::Persisted);

        info!(
            id = %record.id,
            category = record.category.as_str(),
            priority = %record.priority(),
            subject = %record.subject(),
            "Email processed"
        );
        Ok(record)
    }

    /// Append `record` and persist the working set, undoing the append on failure.
    async fn commit(&self, record: EmailRecord) -> Result<EmailRecord, StoreError> {
        let id = record.id;
        self.store.append(record.clone()).await?;

        if let Err(e) = self.store.commit().await {
            if let Err(rollback) = self.store.remove(id).await {
                error!(
                    id = %id,
                    error = %rollback,
                    "Failed to roll back uncommitted record"
                );
            }
            return Err(e);
        }

        Ok(record)
    }

    /// Process several emails in order.
    ///
    /// Each email is independent: a failure is logged and reported in its
    /// slot without stopping the rest of the batch.
    pub async fn process_batch<I, S>(&self, texts: I) -> Vec<Result<EmailRecord, PipelineError>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let texts: Vec<S> = texts.into_iter().collect();
        let count = texts.len();
        info!(count, "Processing email batch");

        let mut results = Vec::with_capacity(count);
        for (index, text) in texts.iter().enumerate() {
            let result = self.process(text.as_ref()).await;
            if let Err(e) = &result {
                error!(index, stage = e.stage().as_str(), error = %e, "Failed to process email in batch");
            }
            results.push(result);
        }

        let processed = results.iter().filter(|r| r.is_ok()).count();
        info!(processed, total = count, "Batch processing complete");
        results
    }
}

fn transition(state: &mut SubmissionState, next: SubmissionState) {
    debug!(from = %state, to = %next, "Submission state changed");
    *state = next;
}

/// Count failures per stage, for batch reporting.
pub fn failures_by_stage(
    results: &[Result<EmailRecord, PipelineError>],
) -> Vec<(PipelineStage, usize)> {
    let stages = [
        PipelineStage::Validation,
        PipelineStage::Classification,
        PipelineStage::Drafting,
        PipelineStage::Persistence,
    ];
    stages
        .into_iter()
        .map(|stage| {
            let count = results
                .iter()
                .filter(|r| matches!(r, Err(e) if e.stage() == stage))
                .count();
            (stage, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{ClassificationError, DraftError, LlmError};
    use crate::llm::RetryProvider;
    use crate::llm::mock::ScriptedLlm;
    use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};
    use crate::pipeline::classifier::LlmClassifier;
    use crate::pipeline::drafter::LlmDrafter;
    use crate::pipeline::types::Classification;
    use crate::store::MemoryRecordStore;
    use crate::store::record::{Category, ExtractedFields, RecordStatus};

    struct FixedClassifier(Category);

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, _text: &str) -> Result<Classification, ClassificationError> {
            Ok(Classification::bare(self.0))
        }
    }

    struct FailingClassifier;

    #[async_trait]
    impl Classifier for FailingClassifier {
        async fn classify(&self, _text: &str) -> Result<Classification, ClassificationError> {
            Err(ClassificationError::MalformedResponse {
                reason: "not json".into(),
            })
        }
    }

    struct EchoDrafter {
        calls: AtomicUsize,
    }

    impl EchoDrafter {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Drafter for EchoDrafter {
        async fn draft(
            &self,
            _text: &str,
            classification: &Classification,
        ) -> Result<String, DraftError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("Re: your {}", classification.category.label()))
        }
    }

    struct EmptyDrafter;

    #[async_trait]
    impl Drafter for EmptyDrafter {
        async fn draft(&self, _: &str, _: &Classification) -> Result<String, DraftError> {
            Err(DraftError::EmptyDraft)
        }
    }

    /// Never answers within any reasonable timeout.
    struct HangingLlm;

    #[async_trait]
    impl LlmProvider for HangingLlm {
        fn model_name(&self) -> &str {
            "hanging"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("sleep never completes within the test timeout")
        }
    }

    fn pipeline(
        store: Arc<MemoryRecordStore>,
        classifier: Arc<dyn Classifier>,
        drafter: Arc<dyn Drafter>,
    ) -> EmailPipeline {
        EmailPipeline::new(store, classifier, drafter)
    }

    #[tokio::test]
    async fn quote_request_end_to_end() {
        let llm = Arc::new(ScriptedLlm::scripted(vec![
            Ok(r#"{"category": "quote_request", "confidence": 0.95,
                   "fields": {"quantity": "50", "item": "part X"}}"#
                .into()),
            Ok("Thanks for your request. We will send a quote for 50 units of part X.".into()),
        ]));
        let store = Arc::new(MemoryRecordStore::new());
        let pipeline = pipeline(
            store.clone(),
            Arc::new(LlmClassifier::new(llm.clone())),
            Arc::new(LlmDrafter::new(llm.clone())),
        );

        let record = pipeline
            .process("Please send a quote for 50 units of part X")
            .await
            .unwrap();

        assert_eq!(record.category, Category::QuoteRequest);
        assert_eq!(record.extracted_fields["quantity"], "50");
        assert_eq!(record.extracted_fields["item"], "part X");
        assert!(!record.draft_reply.trim().is_empty());
        assert_eq!(record.status, RecordStatus::New);
        assert!(record.notes.is_empty());
        assert_eq!(store.committed().await, vec![record]);
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let store = Arc::new(MemoryRecordStore::new());
        let pipeline = pipeline(
            store.clone(),
            Arc::new(FixedClassifier(Category::NewOrder)),
            Arc::new(EchoDrafter::new()),
        );
        let a = pipeline.process("order one").await.unwrap();
        let b = pipeline.process("order two").await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.committed().await.len(), 2);
    }

    #[tokio::test]
    async fn empty_text_fails_validation_without_side_effects() {
        let store = Arc::new(MemoryRecordStore::new());
        let drafter = Arc::new(EchoDrafter::new());
        let pipeline = pipeline(
            store.clone(),
            Arc::new(FixedClassifier(Category::Other)),
            drafter.clone(),
        );

        let err = pipeline.process("   ").await.unwrap_err();
        assert_eq!(err.stage(), PipelineStage::Validation);
        assert!(err.to_string().starts_with("validation failed"));
        assert_eq!(drafter.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn classification_failure_skips_drafting() {
        let store = Arc::new(MemoryRecordStore::new());
        let drafter = Arc::new(EchoDrafter::new());
        let pipeline = pipeline(store.clone(), Arc::new(FailingClassifier), drafter.clone());

        let err = pipeline.process("hello").await.unwrap_err();
        assert_eq!(err.stage(), PipelineStage::Classification);
        assert_eq!(drafter.calls.load(Ordering::SeqCst), 0);
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn classifier_timeout_appends_nothing() {
        let llm: Arc<dyn LlmProvider> = Arc::new(
            RetryProvider::new(Arc::new(HangingLlm), 0, Duration::from_millis(20))
                .with_base_backoff(Duration::ZERO),
        );
        let store = Arc::new(MemoryRecordStore::new());
        let pipeline = pipeline(
            store.clone(),
            Arc::new(LlmClassifier::new(llm)),
            Arc::new(EchoDrafter::new()),
        );

        let err = pipeline.process("where is my order?").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Classification(ClassificationError::Backend(LlmError::Timeout { .. }))
        ));
        assert!(store.records().await.is_empty());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn drafting_failure_appends_nothing() {
        let store = Arc::new(MemoryRecordStore::new());
        let pipeline = pipeline(
            store.clone(),
            Arc::new(FixedClassifier(Category::QuoteRequest)),
            Arc::new(EmptyDrafter),
        );

        let err = pipeline.process("quote please").await.unwrap_err();
        assert_eq!(err.stage(), PipelineStage::Drafting);
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_rolls_back_working_set() {
        let existing = EmailRecord::new("old", Category::Other, ExtractedFields::new(), "ok");
        let store = Arc::new(MemoryRecordStore::with_records(vec![existing.clone()]).unwrap());
        store.set_fail_saves(true);
        let pipeline = pipeline(
            store.clone(),
            Arc::new(FixedClassifier(Category::NewOrder)),
            Arc::new(EchoDrafter::new()),
        );

        let err = pipeline.process("new order").await.unwrap_err();
        assert_eq!(err.stage(), PipelineStage::Persistence);
        assert!(matches!(
            err,
            PipelineError::Persistence(StoreError::Persistence { .. })
        ));
        assert_eq!(store.records().await, vec![existing.clone()]);
        assert_eq!(store.committed().await, vec![existing]);
    }

    #[tokio::test]
    async fn batch_reports_each_result() {
        let store = Arc::new(MemoryRecordStore::new());
        let pipeline = pipeline(
            store.clone(),
            Arc::new(FixedClassifier(Category::DeliveryQuestion)),
            Arc::new(EchoDrafter::new()),
        );

        let results = pipeline
            .process_batch(["where is PO-1?", "", "and PO-2?"])
            .await;
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
        assert_eq!(store.committed().await.len(), 2);
        assert_eq!(
            failures_by_stage(&results),
            vec![(PipelineStage::Validation, 1)]
        );
    }
}
