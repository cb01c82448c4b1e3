//! Batch orchestrator: drives one owner's messages through the pipeline.
//!
//! Messages are handled strictly one after another. A message's
//! classify → match → execute cycle completes before the next begins, since
//! order and package resolution is a read-modify-write on shared keys.
//!
//! Per message:
//! 1. Skip if a processed-message record exists (the only dedup guard)
//! 2. Anonymize and classify
//! 3. Evaluate every active rule, executing the matches
//! 4. Write the processed-message record (write-after)
//!
//! Anything that goes wrong inside a message, panics included, is counted
//! against that message and the loop moves on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::actions::{ActionContext, ActionExecutor};
use crate::classifier::{Classifier, classifier_from_config};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::anonymizer::anonymize;
use crate::pipeline::extract::extract_details;
use crate::pipeline::types::{AnonymizedMessage, Category, RawMessage};
use crate::records::{ExecutionResult, ProcessedMessageRecord, RecordKind, RecordRef};
use crate::rules::{Rule, RuleMatcher};
use crate::store::Database;

/// Bounds and switches for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    /// Process at most this many messages (after the recency filter).
    pub max_messages: Option<usize>,
    /// Ignore messages received longer ago than this.
    pub since: Option<chrono::Duration>,
    /// Write processed-message records. Off means a dry run for dedup.
    pub persist: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_messages: None,
            since: None,
            persist: true,
        }
    }
}

/// Records newly created during a batch, by type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationBreakdown {
    pub tasks: usize,
    pub events: usize,
    pub invoices: usize,
    pub packages: usize,
    pub orders: usize,
}

impl CreationBreakdown {
    fn record(&mut self, reference: &RecordRef) {
        match reference.kind() {
            RecordKind::Task => self.tasks += 1,
            RecordKind::Event => self.events += 1,
            RecordKind::Invoice => self.invoices += 1,
            RecordKind::Package => self.packages += 1,
            RecordKind::Order => self.orders += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.tasks + self.events + self.invoices + self.packages + self.orders
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Processed,
    Skipped,
    Failed,
}

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResult {
    pub message_id: String,
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_source: Option<String>,
    pub results: Vec<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageResult {
    fn skipped(message_id: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            status: MessageStatus::Skipped,
            category: None,
            confidence: None,
            classification_source: None,
            results: Vec::new(),
            error: None,
        }
    }

    fn failed(message_id: &str, error: String) -> Self {
        Self {
            status: MessageStatus::Failed,
            error: Some(error),
            ..Self::skipped(message_id)
        }
    }
}

/// Aggregate outcome of a batch. Returned even when every message failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub owner_id: String,
    /// Messages looked at, skipped ones included.
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub created: CreationBreakdown,
    pub results: Vec<MessageResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Trigger evaluation for one message without side effects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePreview {
    pub message_id: String,
    pub anonymized: AnonymizedMessage,
    pub category: Category,
    pub confidence: f64,
    pub classification_source: String,
    pub reasoning: String,
    /// One per active rule; `actionExecuted` is always false.
    pub results: Vec<ExecutionResult>,
}

/// Runs batches for one owner at a time.
pub struct BatchProcessor {
    db: Arc<dyn Database>,
    classifier: Arc<dyn Classifier>,
    executor: ActionExecutor,
    matcher: RuleMatcher,
}

impl BatchProcessor {
    pub fn new(
        db: Arc<dyn Database>,
        classifier: Arc<dyn Classifier>,
        executor: ActionExecutor,
        matcher: RuleMatcher,
    ) -> Self {
        Self {
            db,
            classifier,
            executor,
            matcher,
        }
    }

    /// Wire classifier, executor and matcher from configuration.
    pub fn from_config(db: Arc<dyn Database>, config: &PipelineConfig) -> Self {
        let classifier = classifier_from_config(&config.classifier, config.min_confidence);
        let executor = ActionExecutor::new(Arc::clone(&db), config);
        Self::new(db, classifier, executor, RuleMatcher::new(config.min_confidence))
    }

    /// Process `messages` in order for `owner_id`.
    ///
    /// Only a missing owner or a failure to load the owner's rules aborts
    /// the batch; every other failure is counted against its message.
    pub async fn run(
        &self,
        owner_id: &str,
        messages: &[RawMessage],
        options: &BatchOptions,
    ) -> Result<BatchSummary, PipelineError> {
        if owner_id.trim().is_empty() {
            return Err(PipelineError::MissingOwner);
        }
        let started_at = Utc::now();
        let rules = self.db.list_active_rules(owner_id).await?;

        // A window reaching past the representable range means no cutoff.
        let cutoff = options
            .since
            .and_then(|window| started_at.checked_sub_signed(window));
        let selected: Vec<&RawMessage> = messages
            .iter()
            .filter(|m| cutoff.is_none_or(|c| m.received_at >= c))
            .take(options.max_messages.unwrap_or(usize::MAX))
            .collect();

        info!(
            owner = %owner_id,
            messages = selected.len(),
            rules = rules.len(),
            "Batch started"
        );

        let mut summary = BatchSummary {
            owner_id: owner_id.to_string(),
            processed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            created: CreationBreakdown::default(),
            results: Vec::with_capacity(selected.len()),
            started_at,
            finished_at: started_at,
        };

        for message in selected {
            summary.processed += 1;
            // Filled as records are written, so a message that fails later
            // still accounts for what it already created.
            let mut created = Vec::new();
            let handled = std::panic::AssertUnwindSafe(self.process_one(
                owner_id,
                message,
                &rules,
                options,
                &mut created,
            ))
            .catch_unwind()
            .await;
            for reference in &created {
                summary.created.record(reference);
            }

            let result = match handled {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!(id = %message.id, error = %e, "Message failed");
                    MessageResult::failed(&message.id, e.to_string())
                }
                Err(panic) => {
                    let reason = panic_reason(panic.as_ref());
                    error!(id = %message.id, reason = %reason, "Message handling panicked");
                    let e = PipelineError::Panicked {
                        id: message.id.clone(),
                        reason,
                    };
                    MessageResult::failed(&message.id, e.to_string())
                }
            };

            match result.status {
                MessageStatus::Processed => summary.succeeded += 1,
                MessageStatus::Skipped => summary.skipped += 1,
                MessageStatus::Failed => summary.failed += 1,
            }
            summary.results.push(result);
        }

        summary.finished_at = Utc::now();
        info!(
            owner = %owner_id,
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            created = summary.created.total(),
            "Batch finished"
        );
        Ok(summary)
    }

    async fn process_one(
        &self,
        owner_id: &str,
        message: &RawMessage,
        rules: &[Rule],
        options: &BatchOptions,
        created: &mut Vec<RecordRef>,
    ) -> Result<MessageResult, PipelineError> {
        if self
            .db
            .find_processed_message(owner_id, &message.id)
            .await?
            .is_some()
        {
            debug!(id = %message.id, "Already processed, skipping");
            return Ok(MessageResult::skipped(&message.id));
        }

        let anonymized = anonymize(message);
        let outcome = self.classifier.classify(&anonymized).await;
        let classification = outcome.classification;
        let source = outcome.source.label().to_string();
        debug!(
            id = %message.id,
            category = %classification.category,
            confidence = classification.confidence,
            source = %source,
            "Message classified"
        );

        let details = extract_details(message);
        let ctx = ActionContext {
            owner_id,
            message,
            classification: &classification,
            details: &details,
        };

        let mut results = Vec::with_capacity(rules.len());
        for rule in rules {
            if !self.matcher.matches(rule, message, &classification) {
                results.push(ExecutionResult::not_triggered(rule.id, &rule.name));
                continue;
            }
            debug!(id = %message.id, rule = %rule.name, action = rule.action.type_tag(), "Rule triggered");
            let action_outcome = self.executor.execute(&rule.action, &ctx).await;
            created.extend(action_outcome.created.iter().copied());
            results.push(action_outcome.into_execution_result(rule.id, &rule.name));
        }

        if options.persist {
            let record = ProcessedMessageRecord {
                id: Uuid::new_v4(),
                owner_id: owner_id.to_string(),
                external_id: message.id.clone(),
                category: classification.category,
                confidence: classification.confidence,
                classification_source: source.clone(),
                results: results.clone(),
                processed_at: Utc::now(),
            };
            self.db.insert_processed_message(&record).await?;
        }

        Ok(MessageResult {
            message_id: message.id.clone(),
            status: MessageStatus::Processed,
            category: Some(classification.category),
            confidence: Some(classification.confidence),
            classification_source: Some(source),
            results,
            error: None,
        })
    }

    /// Anonymize, classify and evaluate triggers for one message. Nothing is
    /// executed or persisted.
    pub async fn preview(
        &self,
        owner_id: &str,
        message: &RawMessage,
    ) -> Result<MessagePreview, PipelineError> {
        if owner_id.trim().is_empty() {
            return Err(PipelineError::MissingOwner);
        }
        let rules = self.db.list_active_rules(owner_id).await?;
        let anonymized = anonymize(message);
        let outcome = self.classifier.classify(&anonymized).await;
        let classification = outcome.classification;

        let results = rules
            .iter()
            .map(|rule| ExecutionResult {
                triggered: self.matcher.matches(rule, message, &classification),
                ..ExecutionResult::not_triggered(rule.id, &rule.name)
            })
            .collect();

        Ok(MessagePreview {
            message_id: message.id.clone(),
            anonymized,
            category: classification.category,
            confidence: classification.confidence,
            classification_source: outcome.source.label().to_string(),
            reasoning: classification.reasoning,
            results,
        })
    }
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
