//! Schema history for the libSQL store.
//!
//! The highest version recorded in `_migrations` is the schema level; on open,
//! every step above it is applied in order, each in its own transaction.

use libsql::Connection;

use crate::error::DatabaseError;

struct Step {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Append only. Never edit a step that has shipped.
static STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS rules (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                trigger_config TEXT NOT NULL,
                action_type TEXT NOT NULL,
                action_params TEXT NOT NULL DEFAULT '{}',
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rules_owner ON rules(owner_id, active);

            CREATE TABLE IF NOT EXISTS processed_messages (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                external_id TEXT NOT NULL,
                category TEXT NOT NULL,
                confidence REAL NOT NULL,
                classification_source TEXT NOT NULL,
                results TEXT NOT NULL DEFAULT '[]',
                processed_at TEXT NOT NULL,
                UNIQUE (owner_id, external_id)
            );
            CREATE INDEX IF NOT EXISTS idx_processed_owner_time
                ON processed_messages(owner_id, processed_at);

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                priority TEXT NOT NULL DEFAULT 'medium',
                due_date TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                source_message_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_owner ON tasks(owner_id);

            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                location TEXT,
                source_message_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_owner ON events(owner_id);

            CREATE TABLE IF NOT EXISTS invoices (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                vendor TEXT NOT NULL,
                amount TEXT NOT NULL,
                currency TEXT NOT NULL DEFAULT 'EUR',
                invoice_number TEXT,
                due_date TEXT,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                source_message_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_invoices_owner ON invoices(owner_id);

            CREATE TABLE IF NOT EXISTS packages (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                tracking_number TEXT NOT NULL,
                carrier TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                description TEXT,
                source_message_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_packages_tracking
                ON packages(owner_id, tracking_number);
        "#,
    },
    Step {
        version: 2,
        name: "order_tracking",
        sql: r#"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                shop_name TEXT NOT NULL,
                order_number TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'ORDERED',
                total_amount TEXT,
                currency TEXT,
                is_paid INTEGER NOT NULL DEFAULT 0,
                order_date TEXT NOT NULL,
                shipped_date TEXT,
                delivered_date TEXT,
                tracking_number TEXT,
                carrier TEXT,
                package_id TEXT REFERENCES packages(id) ON DELETE SET NULL,
                source_message_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (owner_id, shop_name, order_number)
            );
            CREATE INDEX IF NOT EXISTS idx_orders_tracking
                ON orders(owner_id, tracking_number);
        "#,
    },
    Step {
        version: 3,
        name: "package_expected_delivery",
        sql: "ALTER TABLE packages ADD COLUMN expected_delivery TEXT;",
    },
];

/// Bring the schema up to the latest step.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("cannot create version ledger: {e}")))?;

    let level = schema_level(conn).await?;
    let pending: Vec<&Step> = STEPS.iter().filter(|step| step.version > level).collect();
    if pending.is_empty() {
        tracing::debug!(level, "Schema up to date");
        return Ok(());
    }

    for step in pending {
        tracing::info!(version = step.version, name = step.name, "Applying schema step");
        let batch = format!(
            "BEGIN;\n{}\nINSERT INTO _migrations (version, name) VALUES ({}, '{}');\nCOMMIT;",
            step.sql, step.version, step.name
        );
        if let Err(e) = conn.execute_batch(&batch).await {
            // Leave the connection usable for the caller's error path.
            let _ = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::Migration(format!(
                "step {} ({}) failed: {e}",
                step.version, step.name
            )));
        }
    }
    Ok(())
}

async fn schema_level(conn: &Connection) -> Result<i64, DatabaseError> {
    let level_error = |e: libsql::Error| DatabaseError::Migration(format!("cannot read schema level: {e}"));
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(level_error)?;
    match rows.next().await.map_err(level_error)? {
        Some(row) => row.get::<i64>(0).map_err(level_error),
        None => Ok(0),
    }
}
