//! Processing statistics over an owner's processed-message history.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::error::DatabaseError;
use crate::store::Database;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStats {
    pub days: u32,
    pub total_processed: usize,
    pub by_category: BTreeMap<String, usize>,
    /// Keyed by UTC processing date.
    pub by_day: BTreeMap<NaiveDate, usize>,
    pub rules_triggered: usize,
    pub actions_executed: usize,
    pub action_errors: usize,
}

/// Aggregate the last `days` days of processed messages for `owner_id`.
pub async fn processing_stats(
    db: &dyn Database,
    owner_id: &str,
    days: u32,
) -> Result<ProcessingStats, DatabaseError> {
    // Windows longer than chrono can represent cover the whole history.
    let since = Utc::now()
        .checked_sub_signed(Duration::days(i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let records = db.list_processed_messages_since(owner_id, since).await?;

    let mut stats = ProcessingStats {
        days,
        total_processed: records.len(),
        ..Default::default()
    };
    for record in &records {
        *stats
            .by_category
            .entry(record.category.as_str().to_string())
            .or_default() += 1;
        *stats
            .by_day
            .entry(record.processed_at.date_naive())
            .or_default() += 1;
        for result in &record.results {
            stats.rules_triggered += usize::from(result.triggered);
            stats.actions_executed += usize::from(result.action_executed);
            stats.action_errors += usize::from(result.error.is_some());
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::pipeline::types::Category;
    use crate::records::{ExecutionResult, ProcessedMessageRecord};
    use crate::store::LibSqlBackend;

    fn record(external_id: &str, category: Category, age: Duration, results: Vec<ExecutionResult>) -> ProcessedMessageRecord {
        ProcessedMessageRecord {
            id: Uuid::new_v4(),
            owner_id: "owner-1".into(),
            external_id: external_id.into(),
            category,
            confidence: 0.8,
            classification_source: "local".into(),
            results,
            processed_at: Utc::now() - age,
        }
    }

    #[tokio::test]
    async fn counts_within_window() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let triggered = ExecutionResult {
            triggered: true,
            action_executed: true,
            ..ExecutionResult::not_triggered(Uuid::new_v4(), "Facturen")
        };
        let failed = ExecutionResult {
            triggered: true,
            error: Some("webhook returned HTTP 500".into()),
            ..ExecutionResult::not_triggered(Uuid::new_v4(), "Hook")
        };
        db.insert_processed_message(&record("m1", Category::Invoice, Duration::hours(1), vec![triggered, failed]))
            .await
            .unwrap();
        db.insert_processed_message(&record("m2", Category::Invoice, Duration::hours(2), vec![]))
            .await
            .unwrap();
        db.insert_processed_message(&record("m3", Category::Delivery, Duration::hours(3), vec![]))
            .await
            .unwrap();
        db.insert_processed_message(&record("old", Category::Spam, Duration::days(30), vec![]))
            .await
            .unwrap();

        let stats = processing_stats(&db, "owner-1", 7).await.unwrap();
        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.by_category.get("invoice"), Some(&2));
        assert_eq!(stats.by_category.get("delivery"), Some(&1));
        assert!(!stats.by_category.contains_key("spam"));
        assert_eq!(stats.by_day.values().sum::<usize>(), 3);
        assert_eq!(stats.rules_triggered, 2);
        assert_eq!(stats.actions_executed, 1);
        assert_eq!(stats.action_errors, 1);
    }

    #[tokio::test]
    async fn huge_window_covers_whole_history() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.insert_processed_message(&record("old", Category::Spam, Duration::days(30), vec![]))
            .await
            .unwrap();

        let stats = processing_stats(&db, "owner-1", u32::MAX).await.unwrap();
        assert_eq!(stats.days, u32::MAX);
        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.by_category.get("spam"), Some(&1));
    }

    #[tokio::test]
    async fn other_owners_are_invisible() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let mut foreign = record("m1", Category::Task, Duration::hours(1), vec![]);
        foreign.owner_id = "owner-2".into();
        db.insert_processed_message(&foreign).await.unwrap();

        let stats = processing_stats(&db, "owner-1", 7).await.unwrap();
        assert_eq!(stats, ProcessingStats { days: 7, ..Default::default() });
    }
}
