//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::types::Category;
use crate::records::{
    Event, Invoice, InvoiceStatus, Order, OrderStatus, Package, PackageStatus,
    ProcessedMessageRecord, Task, TaskPriority,
};
use crate::rules::{Rule, RuleAction, Trigger};
use crate::store::migrations;
use crate::store::traits::Database;

/// Store backed by one libSQL connection, shared by every call.
pub struct LibSqlBackend {
    // Owns the handle the connection was opened from.
    _db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open the database file at `path`, creating parent directories as needed.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("cannot open {}: {e}", path.display())))?;
        let backend = Self::attach(db).await?;
        info!(path = %path.display(), "Store opened");
        Ok(backend)
    }

    /// Throwaway in-memory store.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("cannot open in-memory store: {e}")))?;
        Self::attach(db).await
    }

    async fn attach(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("cannot connect: {e}")))?;
        let backend = Self {
            _db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run arbitrary SQL against the store, for tests that need to break it.
    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, sql: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(sql)
            .await
            .map(|_| ())
            .map_err(|e| DatabaseError::Query(e.to_string()))
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Timestamps are written as RFC 3339; SQLite's own `datetime()` format is
/// accepted for rows stamped by defaults. Unreadable values sort first.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").map(|ndt| ndt.and_utc())
        })
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn parse_optional_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.filter(|s| !s.is_empty()).map(|s| parse_datetime(&s))
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    s.parse().ok()
}

fn parse_uuid(s: &str, column: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Query(format!("{column} parse: {e}")))
}

/// Required text column, mapped to a `Query` error naming the column.
fn col(row: &libsql::Row, idx: i32, column: &str) -> Result<String, DatabaseError> {
    row.get::<String>(idx)
        .map_err(|e| DatabaseError::Query(format!("{column}: {e}")))
}

/// Nullable text column.
fn opt_text(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

/// Map a write failure, surfacing unique-key violations as `Constraint`.
fn write_error(op: &str, e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {message}"))
    } else {
        DatabaseError::Query(format!("{op}: {message}"))
    }
}

// ── Row mapping ─────────────────────────────────────────────────────

const RULE_COLUMNS: &str =
    "id, owner_id, name, trigger_config, action_type, action_params, active, created_at, updated_at";

/// Map a row to a Rule.
///
/// Returns `Ok(None)` when the stored trigger is unreadable; such rules can
/// never be evaluated safely and are skipped. An unreadable action becomes
/// [`RuleAction::Invalid`] so its failure shows up in the results.
fn row_to_rule(row: &libsql::Row) -> Result<Option<Rule>, DatabaseError> {
    let id_str: String = col(row, 0, "rule.id")?;
    let id = parse_uuid(&id_str, "rule.id")?;
    let owner_id: String = col(row, 1, "rule.owner_id")?;
    let name: String = col(row, 2, "rule.name")?;
    let trigger_str: String = col(row, 3, "rule.trigger_config")?;
    let action_type: String = col(row, 4, "rule.action_type")?;
    let params_str: String = row.get(5).unwrap_or_else(|_| "{}".to_string());
    let active: i64 = row.get(6).unwrap_or(1);
    let created_str: String = col(row, 7, "rule.created_at")?;
    let updated_str: String = col(row, 8, "rule.updated_at")?;

    let trigger: Trigger = match serde_json::from_str(&trigger_str) {
        Ok(t) => t,
        Err(e) => {
            warn!(rule_id = %id, error = %e, "Skipping rule with unreadable trigger");
            return Ok(None);
        }
    };
    let params = serde_json::from_str(&params_str).unwrap_or(serde_json::Value::Null);

    Ok(Some(Rule {
        id,
        owner_id,
        name,
        trigger,
        action: RuleAction::parse(&action_type, params),
        active: active != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    }))
}

const PROCESSED_COLUMNS: &str =
    "id, owner_id, external_id, category, confidence, classification_source, results, processed_at";

fn row_to_processed(row: &libsql::Row) -> Result<ProcessedMessageRecord, DatabaseError> {
    let id_str: String = col(row, 0, "processed.id")?;
    let category_str: String = col(row, 3, "processed.category")?;
    let results_str: String = row.get(6).unwrap_or_else(|_| "[]".to_string());
    let processed_str: String = col(row, 7, "processed.processed_at")?;

    Ok(ProcessedMessageRecord {
        id: parse_uuid(&id_str, "processed.id")?,
        owner_id: col(row, 1, "processed.owner_id")?,
        external_id: col(row, 2, "processed.external_id")?,
        category: category_str.parse().unwrap_or(Category::Unknown),
        confidence: row.get(4).unwrap_or(0.0),
        classification_source: row.get(5).unwrap_or_default(),
        results: serde_json::from_str(&results_str)
            .map_err(|e| DatabaseError::Serialization(format!("processed.results: {e}")))?,
        processed_at: parse_datetime(&processed_str),
    })
}

const TASK_COLUMNS: &str =
    "id, owner_id, title, description, priority, due_date, completed, source_message_id, created_at";

fn row_to_task(row: &libsql::Row) -> Result<Task, DatabaseError> {
    let id_str: String = col(row, 0, "task.id")?;
    let priority: String = row.get(4).unwrap_or_else(|_| "medium".to_string());
    let completed: i64 = row.get(6).unwrap_or(0);
    let created_str: String = col(row, 8, "task.created_at")?;

    Ok(Task {
        id: parse_uuid(&id_str, "task.id")?,
        owner_id: col(row, 1, "task.owner_id")?,
        title: col(row, 2, "task.title")?,
        description: opt_text(row, 3),
        priority: TaskPriority::from_db(&priority),
        due_date: parse_optional_datetime(opt_text(row, 5)),
        completed: completed != 0,
        source_message_id: opt_text(row, 7),
        created_at: parse_datetime(&created_str),
    })
}

const EVENT_COLUMNS: &str =
    "id, owner_id, title, description, start_time, end_time, location, source_message_id, created_at";

fn row_to_event(row: &libsql::Row) -> Result<Event, DatabaseError> {
    let id_str: String = col(row, 0, "event.id")?;
    let start_str: String = col(row, 4, "event.start_time")?;
    let end_str: String = col(row, 5, "event.end_time")?;
    let created_str: String = col(row, 8, "event.created_at")?;

    Ok(Event {
        id: parse_uuid(&id_str, "event.id")?,
        owner_id: col(row, 1, "event.owner_id")?,
        title: col(row, 2, "event.title")?,
        description: opt_text(row, 3),
        start_time: parse_datetime(&start_str),
        end_time: parse_datetime(&end_str),
        location: opt_text(row, 6),
        source_message_id: opt_text(row, 7),
        created_at: parse_datetime(&created_str),
    })
}

const INVOICE_COLUMNS: &str = "id, owner_id, vendor, amount, currency, invoice_number, due_date, description, status, source_message_id, created_at";

fn row_to_invoice(row: &libsql::Row) -> Result<Invoice, DatabaseError> {
    let id_str: String = col(row, 0, "invoice.id")?;
    let amount_str: String = col(row, 3, "invoice.amount")?;
    let status: String = row.get(8).unwrap_or_else(|_| "pending".to_string());
    let created_str: String = col(row, 10, "invoice.created_at")?;

    Ok(Invoice {
        id: parse_uuid(&id_str, "invoice.id")?,
        owner_id: col(row, 1, "invoice.owner_id")?,
        vendor: col(row, 2, "invoice.vendor")?,
        amount: parse_decimal(&amount_str).unwrap_or(Decimal::ZERO),
        currency: row.get(4).unwrap_or_else(|_| "EUR".to_string()),
        invoice_number: opt_text(row, 5),
        due_date: opt_text(row, 6).and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        description: opt_text(row, 7),
        status: InvoiceStatus::from_db(&status),
        source_message_id: opt_text(row, 9),
        created_at: parse_datetime(&created_str),
    })
}

const PACKAGE_COLUMNS: &str = "id, owner_id, tracking_number, carrier, status, description, source_message_id, created_at, updated_at, expected_delivery";

fn row_to_package(row: &libsql::Row) -> Result<Package, DatabaseError> {
    let id_str: String = col(row, 0, "package.id")?;
    let status: String = row.get(4).unwrap_or_else(|_| "pending".to_string());
    let created_str: String = col(row, 7, "package.created_at")?;
    let updated_str: String = col(row, 8, "package.updated_at")?;

    Ok(Package {
        id: parse_uuid(&id_str, "package.id")?,
        owner_id: col(row, 1, "package.owner_id")?,
        tracking_number: col(row, 2, "package.tracking_number")?,
        carrier: col(row, 3, "package.carrier")?,
        status: PackageStatus::from_db(&status),
        description: opt_text(row, 5),
        source_message_id: opt_text(row, 6),
        expected_delivery: opt_text(row, 9).and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

const ORDER_COLUMNS: &str = "id, owner_id, shop_name, order_number, status, total_amount, currency, is_paid, order_date, shipped_date, delivered_date, tracking_number, carrier, package_id, source_message_id, created_at, updated_at";

fn row_to_order(row: &libsql::Row) -> Result<Order, DatabaseError> {
    let id_str: String = col(row, 0, "order.id")?;
    let status: String = row.get(4).unwrap_or_else(|_| "ORDERED".to_string());
    let is_paid: i64 = row.get(7).unwrap_or(0);
    let order_date_str: String = col(row, 8, "order.order_date")?;
    let created_str: String = col(row, 15, "order.created_at")?;
    let updated_str: String = col(row, 16, "order.updated_at")?;

    Ok(Order {
        id: parse_uuid(&id_str, "order.id")?,
        owner_id: col(row, 1, "order.owner_id")?,
        shop_name: col(row, 2, "order.shop_name")?,
        order_number: col(row, 3, "order.order_number")?,
        status: OrderStatus::parse(&status).unwrap_or(OrderStatus::Ordered),
        total_amount: opt_text(row, 5).and_then(|s| parse_decimal(&s)),
        currency: opt_text(row, 6),
        is_paid: is_paid != 0,
        order_date: parse_datetime(&order_date_str),
        shipped_date: parse_optional_datetime(opt_text(row, 9)),
        delivered_date: parse_optional_datetime(opt_text(row, 10)),
        tracking_number: opt_text(row, 11),
        carrier: opt_text(row, 12),
        package_id: opt_text(row, 13).and_then(|s| Uuid::parse_str(&s).ok()),
        source_message_id: opt_text(row, 14),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Rules ───────────────────────────────────────────────────────

    async fn create_rule(&self, rule: &Rule) -> Result<(), DatabaseError> {
        let trigger_json = serde_json::to_string(&rule.trigger)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let params_json = serde_json::to_string(&rule.action.to_params_json())
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                &format!("INSERT INTO rules ({RULE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    rule.id.to_string(),
                    rule.owner_id.as_str(),
                    rule.name.as_str(),
                    trigger_json,
                    rule.action.type_tag(),
                    params_json,
                    rule.active as i64,
                    rule.created_at.to_rfc3339(),
                    rule.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("create_rule", e))?;

        debug!(rule_id = %rule.id, action = rule.action.type_tag(), "Rule created");
        Ok(())
    }

    async fn list_active_rules(&self, owner_id: &str) -> Result<Vec<Rule>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RULE_COLUMNS} FROM rules WHERE owner_id = ?1 AND active = 1 ORDER BY created_at ASC"),
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_rules: {e}")))?;

        let mut rules = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_rules row: {e}")))?
        {
            if let Some(rule) = row_to_rule(&row)? {
                rules.push(rule);
            }
        }
        Ok(rules)
    }

    // ── Processed messages ──────────────────────────────────────────

    async fn find_processed_message(
        &self,
        owner_id: &str,
        external_id: &str,
    ) -> Result<Option<ProcessedMessageRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROCESSED_COLUMNS} FROM processed_messages WHERE owner_id = ?1 AND external_id = ?2"),
                params![owner_id, external_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_processed_message: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_processed(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_processed_message row: {e}"))),
        }
    }

    async fn insert_processed_message(
        &self,
        record: &ProcessedMessageRecord,
    ) -> Result<(), DatabaseError> {
        let results_json = serde_json::to_string(&record.results)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                &format!("INSERT INTO processed_messages ({PROCESSED_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    record.id.to_string(),
                    record.owner_id.as_str(),
                    record.external_id.as_str(),
                    record.category.as_str(),
                    record.confidence,
                    record.classification_source.as_str(),
                    results_json,
                    record.processed_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("insert_processed_message", e))?;

        debug!(id = %record.external_id, category = %record.category, "Message marked processed");
        Ok(())
    }

    async fn list_processed_messages_since(
        &self,
        owner_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProcessedMessageRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROCESSED_COLUMNS} FROM processed_messages WHERE owner_id = ?1 AND processed_at >= ?2 ORDER BY processed_at ASC"),
                params![owner_id, since.to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_processed_messages_since: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            records.push(row_to_processed(&row)?);
        }
        Ok(records)
    }

    // ── Tasks ───────────────────────────────────────────────────────

    async fn create_task(&self, task: &Task) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    task.id.to_string(),
                    task.owner_id.as_str(),
                    task.title.as_str(),
                    task.description.clone(),
                    task.priority.as_str(),
                    task.due_date.map(|d| d.to_rfc3339()),
                    task.completed as i64,
                    task.source_message_id.clone(),
                    task.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("create_task", e))?;

        debug!(task_id = %task.id, "Task created");
        Ok(())
    }

    async fn list_tasks(&self, owner_id: &str) -> Result<Vec<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = ?1 ORDER BY created_at ASC"),
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_tasks: {e}")))?;

        let mut tasks = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }

    // ── Events ──────────────────────────────────────────────────────

    async fn create_event(&self, event: &Event) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO events ({EVENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    event.id.to_string(),
                    event.owner_id.as_str(),
                    event.title.as_str(),
                    event.description.clone(),
                    event.start_time.to_rfc3339(),
                    event.end_time.to_rfc3339(),
                    event.location.clone(),
                    event.source_message_id.clone(),
                    event.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("create_event", e))?;

        debug!(event_id = %event.id, "Event created");
        Ok(())
    }

    async fn list_events(&self, owner_id: &str) -> Result<Vec<Event>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE owner_id = ?1 ORDER BY start_time ASC"),
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_events: {e}")))?;

        let mut events = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            events.push(row_to_event(&row)?);
        }
        Ok(events)
    }

    // ── Invoices ────────────────────────────────────────────────────

    async fn create_invoice(&self, invoice: &Invoice) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO invoices ({INVOICE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
                params![
                    invoice.id.to_string(),
                    invoice.owner_id.as_str(),
                    invoice.vendor.as_str(),
                    invoice.amount.to_string(),
                    invoice.currency.as_str(),
                    invoice.invoice_number.clone(),
                    invoice.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
                    invoice.description.clone(),
                    invoice.status.as_str(),
                    invoice.source_message_id.clone(),
                    invoice.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("create_invoice", e))?;

        debug!(invoice_id = %invoice.id, "Invoice created");
        Ok(())
    }

    async fn list_invoices(&self, owner_id: &str) -> Result<Vec<Invoice>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE owner_id = ?1 ORDER BY created_at ASC"),
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_invoices: {e}")))?;

        let mut invoices = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            invoices.push(row_to_invoice(&row)?);
        }
        Ok(invoices)
    }

    // ── Packages ────────────────────────────────────────────────────

    async fn create_package(&self, package: &Package) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO packages ({PACKAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                params![
                    package.id.to_string(),
                    package.owner_id.as_str(),
                    package.tracking_number.as_str(),
                    package.carrier.as_str(),
                    package.status.as_str(),
                    package.description.clone(),
                    package.source_message_id.clone(),
                    package.created_at.to_rfc3339(),
                    package.updated_at.to_rfc3339(),
                    package.expected_delivery.map(|d| d.format("%Y-%m-%d").to_string()),
                ],
            )
            .await
            .map_err(|e| write_error("create_package", e))?;

        debug!(package_id = %package.id, carrier = %package.carrier, "Package created");
        Ok(())
    }

    async fn get_package(&self, id: Uuid) -> Result<Option<Package>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PACKAGE_COLUMNS} FROM packages WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_package: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_package(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_package row: {e}"))),
        }
    }

    async fn find_package_by_tracking(
        &self,
        owner_id: &str,
        tracking_number: &str,
    ) -> Result<Option<Package>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PACKAGE_COLUMNS} FROM packages WHERE owner_id = ?1 AND tracking_number = ?2 ORDER BY created_at ASC LIMIT 1"),
                params![owner_id, tracking_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_package_by_tracking: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_package(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_package_by_tracking row: {e}"))),
        }
    }

    async fn update_package(&self, package: &Package) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE packages SET carrier = ?2, status = ?3, description = ?4, updated_at = ?5, expected_delivery = ?6 WHERE id = ?1",
                params![
                    package.id.to_string(),
                    package.carrier.as_str(),
                    package.status.as_str(),
                    package.description.clone(),
                    package.updated_at.to_rfc3339(),
                    package.expected_delivery.map(|d| d.format("%Y-%m-%d").to_string()),
                ],
            )
            .await
            .map_err(|e| write_error("update_package", e))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "package".into(),
                id: package.id.to_string(),
            });
        }
        debug!(package_id = %package.id, status = package.status.as_str(), "Package updated");
        Ok(())
    }

    async fn list_packages(&self, owner_id: &str) -> Result<Vec<Package>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PACKAGE_COLUMNS} FROM packages WHERE owner_id = ?1 ORDER BY created_at ASC"),
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_packages: {e}")))?;

        let mut packages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            packages.push(row_to_package(&row)?);
        }
        Ok(packages)
    }

    // ── Orders ──────────────────────────────────────────────────────

    async fn create_order(&self, order: &Order) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO orders ({ORDER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"),
                params![
                    order.id.to_string(),
                    order.owner_id.as_str(),
                    order.shop_name.as_str(),
                    order.order_number.as_str(),
                    order.status.as_str(),
                    order.total_amount.map(|a| a.to_string()),
                    order.currency.clone(),
                    order.is_paid as i64,
                    order.order_date.to_rfc3339(),
                    order.shipped_date.map(|d| d.to_rfc3339()),
                    order.delivered_date.map(|d| d.to_rfc3339()),
                    order.tracking_number.clone(),
                    order.carrier.clone(),
                    order.package_id.map(|id| id.to_string()),
                    order.source_message_id.clone(),
                    order.created_at.to_rfc3339(),
                    order.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("create_order", e))?;

        debug!(order_id = %order.id, shop = %order.shop_name, status = order.status.as_str(), "Order created");
        Ok(())
    }

    async fn find_order(
        &self,
        owner_id: &str,
        shop_name: &str,
        order_number: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE owner_id = ?1 AND shop_name = ?2 AND order_number = ?3"),
                params![owner_id, shop_name, order_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_order: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_order(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_order row: {e}"))),
        }
    }

    async fn find_order_by_tracking(
        &self,
        owner_id: &str,
        tracking_number: &str,
    ) -> Result<Option<Order>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE owner_id = ?1 AND tracking_number = ?2 ORDER BY created_at ASC LIMIT 1"),
                params![owner_id, tracking_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_order_by_tracking: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_order(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_order_by_tracking row: {e}"))),
        }
    }

    async fn update_order(&self, order: &Order) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE orders SET status = ?2, total_amount = ?3, currency = ?4, is_paid = ?5,
                    shipped_date = ?6, delivered_date = ?7, tracking_number = ?8, carrier = ?9,
                    package_id = ?10, updated_at = ?11
                 WHERE id = ?1",
                params![
                    order.id.to_string(),
                    order.status.as_str(),
                    order.total_amount.map(|a| a.to_string()),
                    order.currency.clone(),
                    order.is_paid as i64,
                    order.shipped_date.map(|d| d.to_rfc3339()),
                    order.delivered_date.map(|d| d.to_rfc3339()),
                    order.tracking_number.clone(),
                    order.carrier.clone(),
                    order.package_id.map(|id| id.to_string()),
                    order.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("update_order", e))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "order".into(),
                id: order.id.to_string(),
            });
        }
        debug!(order_id = %order.id, status = order.status.as_str(), "Order updated");
        Ok(())
    }

    async fn list_orders(&self, owner_id: &str) -> Result<Vec<Order>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE owner_id = ?1 ORDER BY created_at ASC"),
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_orders: {e}")))?;

        let mut orders = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            orders.push(row_to_order(&row)?);
        }
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::records::{ExecutionResult, RecordRef};
    use crate::rules::{Condition, ConditionField, ConditionOperator, PackageParams};

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_package(owner: &str, tracking: &str) -> Package {
        let now = Utc::now();
        Package {
            id: Uuid::new_v4(),
            owner_id: owner.into(),
            tracking_number: tracking.into(),
            carrier: "PostNL".into(),
            status: PackageStatus::InTransit,
            description: Some("Pakket van PostNL".into()),
            source_message_id: Some("msg-1".into()),
            expected_delivery: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn make_order(owner: &str, shop: &str, number: &str) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            owner_id: owner.into(),
            shop_name: shop.into(),
            order_number: number.into(),
            status: OrderStatus::Ordered,
            total_amount: Some(dec!(23.45)),
            currency: Some("EUR".into()),
            is_paid: false,
            order_date: now,
            shipped_date: None,
            delivered_date: None,
            tracking_number: None,
            carrier: None,
            package_id: None,
            source_message_id: Some("msg-1".into()),
            created_at: now,
            updated_at: now,
        }
    }

    fn make_processed(owner: &str, external_id: &str) -> ProcessedMessageRecord {
        ProcessedMessageRecord {
            id: Uuid::new_v4(),
            owner_id: owner.into(),
            external_id: external_id.into(),
            category: Category::Delivery,
            confidence: 0.82,
            classification_source: "local".into(),
            results: vec![ExecutionResult {
                result: Some(RecordRef::PackageId(Uuid::new_v4())),
                triggered: true,
                action_executed: true,
                ..ExecutionResult::not_triggered(Uuid::new_v4(), "Pakketjes")
            }],
            processed_at: Utc::now(),
        }
    }

    // ── Rules ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn rules_round_trip_and_inactive_are_hidden() {
        let db = test_db().await;
        let trigger = Trigger::category(Category::Delivery).with_condition(Condition::new(
            ConditionField::SenderDomain,
            ConditionOperator::Equals,
            "postnl.nl",
        ));
        let active = Rule::new(
            "owner-1",
            "Pakketjes",
            trigger.clone(),
            RuleAction::TrackPackage(PackageParams::default()),
        );
        let inactive = Rule::new(
            "owner-1",
            "Uit",
            trigger,
            RuleAction::TrackPackage(PackageParams::default()),
        )
        .inactive();
        db.create_rule(&active).await.unwrap();
        db.create_rule(&inactive).await.unwrap();

        let rules = db.list_active_rules("owner-1").await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, active.id);
        assert_eq!(rules[0].trigger, active.trigger);
        assert_eq!(rules[0].action, active.action);
        assert!(db.list_active_rules("owner-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreadable_trigger_is_skipped_and_bad_action_kept_as_invalid() {
        let db = test_db().await;
        let now = Utc::now().to_rfc3339();
        db.conn()
            .execute(
                &format!("INSERT INTO rules ({RULE_COLUMNS}) VALUES (?1, 'o', 'broken trigger', 'not json', 'create_task', '{{}}', 1, ?2, ?2)"),
                params![Uuid::new_v4().to_string(), now.as_str()],
            )
            .await
            .unwrap();
        db.conn()
            .execute(
                &format!("INSERT INTO rules ({RULE_COLUMNS}) VALUES (?1, 'o', 'odd action', '{{}}', 'teleport', '{{}}', 1, ?2, ?2)"),
                params![Uuid::new_v4().to_string(), now.as_str()],
            )
            .await
            .unwrap();

        let rules = db.list_active_rules("o").await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "odd action");
        assert!(matches!(rules[0].action, RuleAction::Invalid { .. }));
    }

    // ── Processed messages ──────────────────────────────────────────

    #[tokio::test]
    async fn processed_message_round_trip() {
        let db = test_db().await;
        let record = make_processed("owner-1", "msg-1");
        db.insert_processed_message(&record).await.unwrap();

        let fetched = db
            .find_processed_message("owner-1", "msg-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.id, record.id);
        assert_eq!(fetched.category, Category::Delivery);
        assert_eq!(fetched.results, record.results);
        assert!(db.find_processed_message("owner-2", "msg-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_processed_message_is_constraint_error() {
        let db = test_db().await;
        db.insert_processed_message(&make_processed("owner-1", "msg-1"))
            .await
            .unwrap();
        let err = db
            .insert_processed_message(&make_processed("owner-1", "msg-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn processed_since_filters_by_time() {
        let db = test_db().await;
        let mut old = make_processed("owner-1", "old");
        old.processed_at = Utc::now() - chrono::Duration::days(10);
        db.insert_processed_message(&old).await.unwrap();
        db.insert_processed_message(&make_processed("owner-1", "new"))
            .await
            .unwrap();

        let recent = db
            .list_processed_messages_since("owner-1", Utc::now() - chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].external_id, "new");
    }

    // ── Records ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn task_event_invoice_round_trip() {
        let db = test_db().await;

        let mut task = Task::new("owner-1", "Belastingaangifte");
        task.priority = TaskPriority::High;
        task.due_date = Some(Utc::now());
        db.create_task(&task).await.unwrap();
        let tasks = db.list_tasks("owner-1").await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].priority, TaskPriority::High);
        assert!(tasks[0].due_date.is_some());

        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            owner_id: "owner-1".into(),
            title: "Tandarts".into(),
            description: None,
            start_time: now,
            end_time: now + chrono::Duration::minutes(30),
            location: Some("Utrecht".into()),
            source_message_id: Some("msg-2".into()),
            created_at: now,
        };
        db.create_event(&event).await.unwrap();
        let events = db.list_events("owner-1").await.unwrap();
        assert_eq!(events[0].location.as_deref(), Some("Utrecht"));
        assert!(events[0].description.is_none());

        let invoice = Invoice {
            id: Uuid::new_v4(),
            owner_id: "owner-1".into(),
            vendor: "Energie BV".into(),
            amount: dec!(1234.56),
            currency: "EUR".into(),
            invoice_number: Some("F-2026-001".into()),
            due_date: NaiveDate::from_ymd_opt(2026, 3, 1),
            description: None,
            status: InvoiceStatus::Pending,
            source_message_id: Some("msg-3".into()),
            created_at: now,
        };
        db.create_invoice(&invoice).await.unwrap();
        let invoices = db.list_invoices("owner-1").await.unwrap();
        assert_eq!(invoices[0].amount, dec!(1234.56));
        assert_eq!(invoices[0].due_date, NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(invoices[0].status, InvoiceStatus::Pending);
    }

    #[tokio::test]
    async fn package_find_and_update() {
        let db = test_db().await;
        let mut package = make_package("owner-1", "3SABC1234567");
        db.create_package(&package).await.unwrap();

        let found = db
            .find_package_by_tracking("owner-1", "3SABC1234567")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, package.id);
        assert!(db.find_package_by_tracking("owner-2", "3SABC1234567").await.unwrap().is_none());

        package.status = PackageStatus::Delivered;
        db.update_package(&package).await.unwrap();
        let fetched = db.get_package(package.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, PackageStatus::Delivered);
    }

    #[tokio::test]
    async fn updating_missing_package_is_not_found() {
        let db = test_db().await;
        let err = db.update_package(&make_package("o", "X")).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn order_unique_key_and_update() {
        let db = test_db().await;
        let mut order = make_order("owner-1", "AliExpress", "8123456789");
        db.create_order(&order).await.unwrap();

        let dup = db
            .create_order(&make_order("owner-1", "AliExpress", "8123456789"))
            .await
            .unwrap_err();
        assert!(matches!(dup, DatabaseError::Constraint(_)));
        db.create_order(&make_order("owner-2", "AliExpress", "8123456789"))
            .await
            .unwrap();

        let package = make_package("owner-1", "LP00123456789CN");
        db.create_package(&package).await.unwrap();
        order.status = OrderStatus::Shipped;
        order.shipped_date = Some(Utc::now());
        order.tracking_number = Some("LP00123456789CN".into());
        order.package_id = Some(package.id);
        db.update_order(&order).await.unwrap();

        let found = db
            .find_order("owner-1", "AliExpress", "8123456789")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, OrderStatus::Shipped);
        assert_eq!(found.total_amount, Some(dec!(23.45)));
        assert_eq!(found.package_id, Some(package.id));
        assert!(found.shipped_date.is_some());

        let by_tracking = db
            .find_order_by_tracking("owner-1", "LP00123456789CN")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_tracking.id, order.id);
        assert_eq!(db.list_orders("owner-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn local_file_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lifeflow.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.insert_processed_message(&make_processed("owner-1", "msg-1"))
                .await
                .unwrap();
        }

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(db.find_processed_message("owner-1", "msg-1").await.unwrap().is_some());
    }
}
