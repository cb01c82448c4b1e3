//! Automation rules: typed model and trigger matching.

pub mod matcher;
pub mod model;

pub use matcher::RuleMatcher;
pub use model::{
    ActionSpec, Condition, ConditionField, ConditionOperator, EventParams, InvoiceParams,
    NotificationParams, OrderParams, PackageParams, Rule, RuleAction, RuleDefinition, TaskParams,
    Trigger, WebhookParams,
};
