//! Rule action execution.
//!
//! [`ActionExecutor::execute`] dispatches on the closed [`RuleAction`] set.
//! Handlers return `Result`; the executor folds every error into a failed
//! [`ActionOutcome`] so one rule can never abort its siblings or the batch.

mod event;
mod invoice;
mod notify;
mod order;
mod package;
mod task;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::ActionError;
use crate::pipeline::extract::MessageDetails;
use crate::pipeline::types::{Classification, RawMessage};
use crate::records::{ExecutionResult, RecordRef};
use crate::rules::RuleAction;
use crate::store::Database;

/// Carrier recorded when none can be determined.
pub const UNKNOWN_CARRIER: &str = "Onbekend";

/// Everything a handler may read about the message being processed.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub owner_id: &'a str,
    pub message: &'a RawMessage,
    pub classification: &'a Classification,
    /// Locally extracted fields. Raw-text derived, never sent off-host.
    pub details: &'a MessageDetails,
}

/// What one action did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    pub success: bool,
    /// The record the action created or updated.
    pub reference: Option<RecordRef>,
    /// Every record newly created, including side records such as a package
    /// linked to a shipped order.
    pub created: Vec<RecordRef>,
    pub detail: Option<String>,
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn created(reference: RecordRef) -> Self {
        Self {
            success: true,
            reference: Some(reference),
            created: vec![reference],
            ..Default::default()
        }
    }

    pub fn updated(reference: RecordRef) -> Self {
        Self {
            success: true,
            reference: Some(reference),
            ..Default::default()
        }
    }

    /// Success without a domain record.
    pub fn done(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: Some(detail.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Execution result for a rule that triggered.
    pub fn into_execution_result(self, rule_id: Uuid, rule_name: &str) -> ExecutionResult {
        ExecutionResult {
            triggered: true,
            action_executed: self.success,
            result: self.reference,
            detail: self.detail,
            error: self.error,
            ..ExecutionResult::not_triggered(rule_id, rule_name)
        }
    }
}

/// Performs the side effects of matched rules.
pub struct ActionExecutor {
    db: Arc<dyn Database>,
    http: reqwest::Client,
    create_package_on_ship: bool,
    webhook_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(db: Arc<dyn Database>, config: &PipelineConfig) -> Self {
        Self {
            db,
            http: reqwest::Client::new(),
            create_package_on_ship: config.create_package_on_ship,
            webhook_timeout: config.webhook_timeout,
        }
    }

    /// Run one action. Never fails; errors land in the outcome.
    pub async fn execute(&self, action: &RuleAction, ctx: &ActionContext<'_>) -> ActionOutcome {
        let db = self.db.as_ref();
        let result = match action {
            RuleAction::CreateTask(params) => task::create_task(db, params, ctx).await,
            RuleAction::CreateEvent(params) => event::create_event(db, params, ctx).await,
            RuleAction::RecordInvoice(params) => invoice::record_invoice(db, params, ctx).await,
            RuleAction::TrackPackage(params) => package::track_package(db, params, ctx).await,
            RuleAction::TrackOrder(params) => {
                let create_package = params.create_package.unwrap_or(self.create_package_on_ship);
                order::track_order(db, params, create_package, ctx).await
            }
            RuleAction::SendNotification(params) => Ok(notify::send_notification(params)),
            RuleAction::Webhook(params) => {
                webhook::call_webhook(&self.http, self.webhook_timeout, params, ctx).await
            }
            RuleAction::Invalid { kind, reason } => Err(ActionError::Unsupported {
                kind: kind.clone(),
                reason: reason.clone(),
            }),
        };

        match result {
            Ok(outcome) => {
                debug!(
                    id = %ctx.message.id,
                    action = action.type_tag(),
                    created = outcome.created.len(),
                    "Action executed"
                );
                outcome
            }
            Err(e) => {
                warn!(id = %ctx.message.id, action = action.type_tag(), error = %e, "Action failed");
                ActionOutcome::failed(e.to_string())
            }
        }
    }
}

/// First `max` characters of `s`.
fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::pipeline::extract::extract_details;
    use crate::pipeline::types::Category;
    use crate::store::LibSqlBackend;

    /// Owned message plus derived data, handing out an [`ActionContext`].
    pub struct Fixture {
        pub message: RawMessage,
        pub classification: Classification,
        pub details: MessageDetails,
    }

    impl Fixture {
        pub fn new(id: &str, sender: &str, subject: &str, body: &str, category: Category) -> Self {
            let message = RawMessage {
                id: id.into(),
                thread_id: format!("thread-{id}"),
                sender: sender.into(),
                recipients: vec!["ik@example.nl".into()],
                subject: subject.into(),
                body: body.into(),
                received_at: Utc.with_ymd_and_hms(2026, 3, 2, 9, 15, 0).unwrap(),
                attachments: vec![],
                labels: vec![],
            };
            let details = extract_details(&message);
            Self {
                message,
                classification: Classification {
                    category,
                    confidence: 0.9,
                    extracted_data: None,
                    reasoning: String::new(),
                },
                details,
            }
        }

        pub fn ctx(&self) -> ActionContext<'_> {
            ActionContext {
                owner_id: "owner-1",
                message: &self.message,
                classification: &self.classification,
                details: &self.details,
            }
        }
    }

    pub async fn memory_db() -> Arc<dyn Database> {
        Arc::new(LibSqlBackend::new_memory().await.unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{Fixture, memory_db};
    use super::*;
    use crate::pipeline::types::Category;
    use crate::records::RecordKind;
    use crate::rules::{NotificationParams, TaskParams};

    #[tokio::test]
    async fn invalid_action_is_a_failed_outcome() {
        let executor = ActionExecutor::new(memory_db().await, &PipelineConfig::default());
        let fixture = Fixture::new("m1", "a@b.nl", "Hoi", "", Category::Personal);
        let action = RuleAction::parse("teleport", serde_json::json!({}));

        let outcome = executor.execute(&action, &fixture.ctx()).await;
        assert!(!outcome.success);
        assert!(outcome.reference.is_none());
        assert!(outcome.error.unwrap().contains("teleport"));
    }

    #[tokio::test]
    async fn notification_has_no_record() {
        let executor = ActionExecutor::new(memory_db().await, &PipelineConfig::default());
        let fixture = Fixture::new("m1", "a@b.nl", "Hoi", "", Category::Personal);
        let outcome = executor
            .execute(
                &RuleAction::SendNotification(NotificationParams {
                    channel: "email".into(),
                    title: None,
                }),
                &fixture.ctx(),
            )
            .await;
        assert!(outcome.success);
        assert!(outcome.created.is_empty());
        assert_eq!(
            outcome.detail.as_deref(),
            Some("notification scheduled on channel email")
        );
    }

    #[tokio::test]
    async fn outcome_converts_to_execution_result() {
        let executor = ActionExecutor::new(memory_db().await, &PipelineConfig::default());
        let fixture = Fixture::new("m1", "a@b.nl", "Bel de gemeente", "", Category::Task);
        let outcome = executor
            .execute(&RuleAction::CreateTask(TaskParams::default()), &fixture.ctx())
            .await;
        let rule_id = Uuid::new_v4();
        let result = outcome.into_execution_result(rule_id, "Taken");

        assert!(result.triggered);
        assert!(result.action_executed);
        assert_eq!(result.rule_id, rule_id);
        assert_eq!(result.result.map(|r| r.kind()), Some(RecordKind::Task));
        assert!(result.error.is_none());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("café au lait", 4), "café");
        assert_eq!(truncate_chars("kort", 100), "kort");
    }
}
