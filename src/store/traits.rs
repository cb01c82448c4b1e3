//! `Database` trait: single async interface for all persistence the
//! pipeline needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::records::{Event, Invoice, Order, Package, ProcessedMessageRecord, Task};
use crate::rules::Rule;

/// Backend-agnostic storage for rules, processed-message markers and the
/// records actions produce.
///
/// Implementations rely on two uniqueness keys: `(owner_id, external_id)` for
/// processed messages and `(owner_id, shop_name, order_number)` for orders.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Rules ───────────────────────────────────────────────────────

    /// Insert a rule. Rule CRUD lives outside the pipeline; this exists for
    /// seeding.
    async fn create_rule(&self, rule: &Rule) -> Result<(), DatabaseError>;

    /// Active rules for an owner, oldest first.
    async fn list_active_rules(&self, owner_id: &str) -> Result<Vec<Rule>, DatabaseError>;

    // ── Processed messages ──────────────────────────────────────────

    async fn find_processed_message(
        &self,
        owner_id: &str,
        external_id: &str,
    ) -> Result<Option<ProcessedMessageRecord>, DatabaseError>;

    /// Insert a marker. Fails with `Constraint` if one already exists.
    async fn insert_processed_message(
        &self,
        record: &ProcessedMessageRecord,
    ) -> Result<(), DatabaseError>;

    async fn list_processed_messages_since(
        &self,
        owner_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProcessedMessageRecord>, DatabaseError>;

    // ── Tasks, events, invoices ─────────────────────────────────────

    async fn create_task(&self, task: &Task) -> Result<(), DatabaseError>;

    async fn list_tasks(&self, owner_id: &str) -> Result<Vec<Task>, DatabaseError>;

    async fn create_event(&self, event: &Event) -> Result<(), DatabaseError>;

    async fn list_events(&self, owner_id: &str) -> Result<Vec<Event>, DatabaseError>;

    async fn create_invoice(&self, invoice: &Invoice) -> Result<(), DatabaseError>;

    async fn list_invoices(&self, owner_id: &str) -> Result<Vec<Invoice>, DatabaseError>;

    // ── Packages ────────────────────────────────────────────────────

    async fn create_package(&self, package: &Package) -> Result<(), DatabaseError>;

    async fn get_package(&self, id: Uuid) -> Result<Option<Package>, DatabaseError>;

    async fn find_package_by_tracking(
        &self,
        owner_id: &str,
        tracking_number: &str,
    ) -> Result<Option<Package>, DatabaseError>;

    /// Persist status, carrier and description changes.
    async fn update_package(&self, package: &Package) -> Result<(), DatabaseError>;

    async fn list_packages(&self, owner_id: &str) -> Result<Vec<Package>, DatabaseError>;

    // ── Orders ──────────────────────────────────────────────────────

    async fn create_order(&self, order: &Order) -> Result<(), DatabaseError>;

    async fn find_order(
        &self,
        owner_id: &str,
        shop_name: &str,
        order_number: &str,
    ) -> Result<Option<Order>, DatabaseError>;

    async fn find_order_by_tracking(
        &self,
        owner_id: &str,
        tracking_number: &str,
    ) -> Result<Option<Order>, DatabaseError>;

    /// Persist every mutable order field.
    async fn update_order(&self, order: &Order) -> Result<(), DatabaseError>;

    async fn list_orders(&self, owner_id: &str) -> Result<Vec<Order>, DatabaseError>;
}
