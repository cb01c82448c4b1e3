//! Domain records produced by rule actions, plus per-message bookkeeping.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::types::Category;

// ── Tasks ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parse a stored value, defaulting to `Medium`.
    pub fn from_db(s: &str) -> Self {
        match s {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

/// A to-do created from a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: TaskPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub completed: bool,
    /// Weak back-reference to the originating message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(owner_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            title: title.into(),
            description: None,
            priority: TaskPriority::Medium,
            due_date: None,
            completed: false,
            source_message_id: None,
            created_at: Utc::now(),
        }
    }
}

// ── Events ──────────────────────────────────────────────────────────

/// A calendar event created from a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ── Invoices ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Approved,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Paid => "paid",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "approved" => Self::Approved,
            "paid" => Self::Paid,
            _ => Self::Pending,
        }
    }
}

/// A bill extracted from a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,
    pub owner_id: String,
    pub vendor: String,
    /// Zero when no amount could be extracted.
    pub amount: Decimal,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: InvoiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ── Packages ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Pending,
    InTransit,
    OutForDelivery,
    Delivered,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InTransit => "in_transit",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "in_transit" => Self::InTransit,
            "out_for_delivery" => Self::OutForDelivery,
            "delivered" => Self::Delivered,
            _ => Self::Pending,
        }
    }
}

/// A parcel being tracked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: Uuid,
    pub owner_id: String,
    /// Real tracking number, or a `PENDING-…` placeholder.
    pub tracking_number: String,
    pub carrier: String,
    pub status: PackageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_delivery: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Orders ──────────────────────────────────────────────────────────

/// Order lifecycle.
///
/// Transitions are plain overwrites: any later message about the same order
/// may move it to any state, including out of `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Ordered,
    AwaitingPayment,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ordered => "ORDERED",
            Self::AwaitingPayment => "AWAITING_PAYMENT",
            Self::Paid => "PAID",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
            Self::Returned => "RETURNED",
        }
    }

    /// Parse a status name, accepting any case.
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase();
        [
            Self::Ordered,
            Self::AwaitingPayment,
            Self::Paid,
            Self::Processing,
            Self::Shipped,
            Self::Delivered,
            Self::Cancelled,
            Self::Returned,
        ]
        .into_iter()
        .find(|status| status.as_str() == upper)
    }
}

/// A web-shop order followed across several messages.
///
/// Unique per `(owner_id, shop_name, order_number)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub owner_id: String,
    pub shop_name: String,
    pub order_number: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub is_paid: bool,
    pub order_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipped_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    /// Linked parcel, set when the order ships.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── References and results ──────────────────────────────────────────

/// Reference to the record an action produced.
///
/// Serializes as a single-key object: `{"taskId": "…"}`, `{"orderId": "…"}`, …
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordRef {
    TaskId(Uuid),
    EventId(Uuid),
    InvoiceId(Uuid),
    PackageId(Uuid),
    OrderId(Uuid),
}

impl RecordRef {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::TaskId(_) => RecordKind::Task,
            Self::EventId(_) => RecordKind::Event,
            Self::InvoiceId(_) => RecordKind::Invoice,
            Self::PackageId(_) => RecordKind::Package,
            Self::OrderId(_) => RecordKind::Order,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::TaskId(id)
            | Self::EventId(id)
            | Self::InvoiceId(id)
            | Self::PackageId(id)
            | Self::OrderId(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Task,
    Event,
    Invoice,
    Package,
    Order,
}

/// Outcome of evaluating one rule against one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub triggered: bool,
    pub action_executed: bool,
    pub result: Option<RecordRef>,
    /// Human-readable outcome for actions that produce no record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    /// Result for a rule whose trigger did not match.
    pub fn not_triggered(rule_id: Uuid, rule_name: impl Into<String>) -> Self {
        Self {
            rule_id,
            rule_name: rule_name.into(),
            triggered: false,
            action_executed: false,
            result: None,
            detail: None,
            error: None,
            timestamp: Utc::now(),
        }
    }
}

/// Marker that a message has been handled for an owner.
///
/// Its existence is the only deduplication guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedMessageRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub external_id: String,
    pub category: Category,
    pub confidence: f64,
    /// `"remote"` or `"local"`.
    pub classification_source: String,
    pub results: Vec<ExecutionResult>,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ref_is_single_key_object() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(RecordRef::PackageId(id)).unwrap();
        assert_eq!(json, serde_json::json!({ "packageId": id.to_string() }));
        let back: RecordRef = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), RecordKind::Package);
        assert_eq!(back.id(), id);
    }

    #[test]
    fn execution_result_wire_shape() {
        let result = ExecutionResult::not_triggered(Uuid::nil(), "Pakketjes");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["ruleName"], "Pakketjes");
        assert_eq!(json["triggered"], false);
        assert_eq!(json["actionExecuted"], false);
        assert!(json["result"].is_null());
        assert!(json["error"].is_null());
        assert!(json.get("detail").is_none());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn order_status_names() {
        assert_eq!(
            serde_json::to_value(OrderStatus::AwaitingPayment).unwrap(),
            "AWAITING_PAYMENT"
        );
        assert_eq!(OrderStatus::parse("shipped"), Some(OrderStatus::Shipped));
        assert_eq!(OrderStatus::parse(" Delivered "), Some(OrderStatus::Delivered));
        assert_eq!(OrderStatus::parse("lost"), None);
    }

    #[test]
    fn status_db_strings_roundtrip() {
        for status in [
            PackageStatus::Pending,
            PackageStatus::InTransit,
            PackageStatus::OutForDelivery,
            PackageStatus::Delivered,
        ] {
            assert_eq!(PackageStatus::from_db(status.as_str()), status);
            assert_eq!(serde_json::to_value(status).unwrap(), status.as_str());
        }
        assert_eq!(InvoiceStatus::from_db("garbage"), InvoiceStatus::Pending);
        assert_eq!(TaskPriority::from_db("high"), TaskPriority::High);
    }
}
