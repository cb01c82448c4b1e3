//! Rule, trigger and action types.
//!
//! Rules arrive as loosely shaped JSON (`{type, params}` actions, condition
//! lists). They are parsed once here, at the storage boundary, into closed
//! typed variants; the matcher and executor never look at raw JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::pipeline::types::Category;
use crate::records::{OrderStatus, TaskPriority};

// ── Trigger ─────────────────────────────────────────────────────────

/// Message field a condition reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionField {
    #[serde(alias = "from")]
    Sender,
    #[serde(alias = "to")]
    Recipient,
    Subject,
    Body,
    Category,
    SenderDomain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Contains,
    NotContains,
    Equals,
    StartsWith,
    EndsWith,
    Regex,
}

/// One field test. Case-insensitive unless `case_sensitive` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub field: ConditionField,
    pub operator: ConditionOperator,
    pub value: String,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl Condition {
    pub fn new(field: ConditionField, operator: ConditionOperator, value: impl Into<String>) -> Self {
        Self {
            field,
            operator,
            value: value.into(),
            case_sensitive: false,
        }
    }
}

/// When a rule fires: an optional category plus conditions that must all hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Trigger {
    pub fn category(category: Category) -> Self {
        Self {
            category: Some(category),
            conditions: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

// ── Action params ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Overrides the urgency-keyword scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_in_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Default for EventParams {
    fn default() -> Self {
        Self {
            title: None,
            duration_minutes: default_duration_minutes(),
            location: None,
        }
    }
}

fn default_duration_minutes() -> u32 {
    60
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceParams {
    #[serde(default)]
    pub auto_approve: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageParams {
    /// Used when the carrier cannot be detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderParams {
    /// Used when the shop cannot be inferred from the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_name: Option<String>,
    /// Forces the status instead of inferring it from the text.
    #[serde(
        default,
        deserialize_with = "deserialize_order_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<OrderStatus>,
    /// Overrides the configured create-package-on-ship default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_package: Option<bool>,
}

fn deserialize_order_status<'de, D>(deserializer: D) -> Result<Option<OrderStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => OrderStatus::parse(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown order status '{s}'"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationParams {
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Default for NotificationParams {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            title: None,
        }
    }
}

fn default_channel() -> String {
    "push".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookParams {
    pub url: String,
}

// ── Action ──────────────────────────────────────────────────────────

/// What a rule does when it fires. Closed set of kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ActionSpec", into = "ActionSpec")]
pub enum RuleAction {
    CreateTask(TaskParams),
    CreateEvent(EventParams),
    RecordInvoice(InvoiceParams),
    TrackPackage(PackageParams),
    TrackOrder(OrderParams),
    SendNotification(NotificationParams),
    Webhook(WebhookParams),
    /// A stored action that failed to parse. Executing it yields a failed result.
    Invalid { kind: String, reason: String },
}

/// Storage and wire form of an action: `{"type": "...", "params": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RuleAction {
    pub fn type_tag(&self) -> &str {
        match self {
            Self::CreateTask(_) => "create_task",
            Self::CreateEvent(_) => "create_event",
            Self::RecordInvoice(_) => "record_invoice",
            Self::TrackPackage(_) => "track_package",
            Self::TrackOrder(_) => "track_order",
            Self::SendNotification(_) => "send_notification",
            Self::Webhook(_) => "webhook",
            Self::Invalid { kind, .. } => kind.as_str(),
        }
    }

    /// Parse an action from its stored kind and params.
    pub fn from_db(kind: &str, params: serde_json::Value) -> Result<Self, String> {
        // Absent params mean "all defaults".
        let params = if params.is_null() {
            serde_json::json!({})
        } else {
            params
        };
        let parsed = match kind {
            "create_task" => serde_json::from_value(params).map(Self::CreateTask),
            "create_event" => serde_json::from_value(params).map(Self::CreateEvent),
            "record_invoice" => serde_json::from_value(params).map(Self::RecordInvoice),
            "track_package" => serde_json::from_value(params).map(Self::TrackPackage),
            "track_order" => serde_json::from_value(params).map(Self::TrackOrder),
            "send_notification" => serde_json::from_value(params).map(Self::SendNotification),
            "webhook" => {
                let parsed: Result<WebhookParams, _> = serde_json::from_value(params);
                match parsed {
                    Ok(p) if !(p.url.starts_with("http://") || p.url.starts_with("https://")) => {
                        return Err(format!("webhook url '{}' is not http(s)", p.url));
                    }
                    other => other.map(Self::Webhook),
                }
            }
            other => return Err(format!("unknown action type '{other}'")),
        };
        parsed.map_err(|e| format!("invalid params for {kind}: {e}"))
    }

    /// Parse, keeping a failure as [`RuleAction::Invalid`].
    pub fn parse(kind: &str, params: serde_json::Value) -> Self {
        Self::from_db(kind, params).unwrap_or_else(|reason| Self::Invalid {
            kind: kind.to_string(),
            reason,
        })
    }

    /// Params as stored alongside [`RuleAction::type_tag`].
    pub fn to_params_json(&self) -> serde_json::Value {
        let value = match self {
            Self::CreateTask(p) => serde_json::to_value(p),
            Self::CreateEvent(p) => serde_json::to_value(p),
            Self::RecordInvoice(p) => serde_json::to_value(p),
            Self::TrackPackage(p) => serde_json::to_value(p),
            Self::TrackOrder(p) => serde_json::to_value(p),
            Self::SendNotification(p) => serde_json::to_value(p),
            Self::Webhook(p) => serde_json::to_value(p),
            Self::Invalid { .. } => Ok(serde_json::json!({})),
        };
        value.unwrap_or_else(|_| serde_json::json!({}))
    }
}

impl From<ActionSpec> for RuleAction {
    fn from(spec: ActionSpec) -> Self {
        Self::parse(&spec.kind, spec.params)
    }
}

impl From<RuleAction> for ActionSpec {
    fn from(action: RuleAction) -> Self {
        Self {
            kind: action.type_tag().to_string(),
            params: action.to_params_json(),
        }
    }
}

// ── Rule ────────────────────────────────────────────────────────────

/// A user-authored automation: trigger plus action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub trigger: Trigger,
    pub action: RuleAction,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        trigger: Trigger,
        action: RuleAction,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            name: name.into(),
            trigger,
            action,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: mark inactive.
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// A rule as authored, before it has an id or owner.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    pub name: String,
    #[serde(default)]
    pub trigger: Trigger,
    pub action: RuleAction,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl RuleDefinition {
    pub fn into_rule(self, owner_id: impl Into<String>) -> Rule {
        let mut rule = Rule::new(owner_id, self.name, self.trigger, self.action);
        rule.active = self.active;
        rule
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_each_action_kind() {
        let cases = [
            ("create_task", json!({ "priority": "high", "dueInDays": 3 })),
            ("create_event", json!({ "durationMinutes": 30 })),
            ("record_invoice", json!({ "autoApprove": true })),
            ("track_package", json!({})),
            ("track_order", json!({ "status": "shipped", "createPackage": false })),
            ("send_notification", json!({ "channel": "email" })),
            ("webhook", json!({ "url": "https://hooks.test/x" })),
        ];
        for (kind, params) in cases {
            let action = RuleAction::from_db(kind, params).unwrap();
            assert_eq!(action.type_tag(), kind);
        }
    }

    #[test]
    fn typed_params_and_defaults() {
        let action = RuleAction::from_db("create_task", json!({ "priority": "high", "dueInDays": 3 })).unwrap();
        assert_eq!(
            action,
            RuleAction::CreateTask(TaskParams {
                title: None,
                priority: Some(TaskPriority::High),
                due_in_days: Some(3),
            })
        );
        let action = RuleAction::from_db("create_event", serde_json::Value::Null).unwrap();
        assert_eq!(action, RuleAction::CreateEvent(EventParams::default()));
        let action = RuleAction::from_db("send_notification", json!({})).unwrap();
        assert!(matches!(action, RuleAction::SendNotification(p) if p.channel == "push"));
        let action = RuleAction::from_db("track_order", json!({ "status": "Delivered" })).unwrap();
        assert!(matches!(action, RuleAction::TrackOrder(p) if p.status == Some(OrderStatus::Delivered)));
    }

    #[test]
    fn bad_actions_become_invalid() {
        assert!(RuleAction::from_db("teleport", json!({})).is_err());
        assert!(RuleAction::from_db("webhook", json!({})).is_err());
        assert!(RuleAction::from_db("webhook", json!({ "url": "ftp://x" })).is_err());
        assert!(RuleAction::from_db("track_order", json!({ "status": "LOST" })).is_err());
        assert!(RuleAction::from_db("create_task", json!({ "dueInDays": -1 })).is_err());

        let action = RuleAction::parse("teleport", json!({}));
        assert!(matches!(&action, RuleAction::Invalid { kind, .. } if kind == "teleport"));
        assert_eq!(action.type_tag(), "teleport");
    }

    #[test]
    fn action_wire_form() {
        let action: RuleAction = serde_json::from_value(json!({
            "type": "record_invoice",
            "params": { "autoApprove": true }
        }))
        .unwrap();
        assert_eq!(action, RuleAction::RecordInvoice(InvoiceParams { auto_approve: true }));
        let back = serde_json::to_value(&action).unwrap();
        assert_eq!(back["type"], "record_invoice");
        assert_eq!(back["params"]["autoApprove"], true);
    }

    #[test]
    fn trigger_and_conditions_from_json() {
        let trigger: Trigger = serde_json::from_value(json!({
            "category": "delivery",
            "conditions": [
                { "field": "from", "operator": "ends_with", "value": "@postnl.nl" },
                { "field": "senderDomain", "operator": "equals", "value": "postnl.nl", "caseSensitive": true },
            ]
        }))
        .unwrap();
        assert_eq!(trigger.category, Some(Category::Delivery));
        assert_eq!(trigger.conditions[0].field, ConditionField::Sender);
        assert!(!trigger.conditions[0].case_sensitive);
        assert_eq!(trigger.conditions[1].field, ConditionField::SenderDomain);
        assert!(trigger.conditions[1].case_sensitive);

        let bad = serde_json::from_value::<Trigger>(json!({ "category": "refund" }));
        assert!(bad.is_err());
    }

    #[test]
    fn rule_definition_defaults_active() {
        let def: RuleDefinition = serde_json::from_value(json!({
            "name": "Pakketjes",
            "trigger": { "category": "delivery" },
            "action": { "type": "track_package" }
        }))
        .unwrap();
        let rule = def.into_rule("owner-1");
        assert!(rule.active);
        assert_eq!(rule.owner_id, "owner-1");
        assert_eq!(rule.action, RuleAction::TrackPackage(PackageParams::default()));
    }
}
