//! Error types for the LifeFlow rules pipeline.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Inference endpoint errors. Never escape the classifier adapter.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Inference endpoint not configured")]
    NotConfigured,

    #[error("Inference request failed: {0}")]
    RequestFailed(String),

    #[error("Inference request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Inference endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Invalid inference response: {0}")]
    InvalidResponse(String),
}

/// Errors raised inside a single action handler.
///
/// Always captured into that rule's `ExecutionResult.error`.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Storage failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Invalid action parameters: {0}")]
    InvalidParams(String),

    #[error("Unsupported action '{kind}': {reason}")]
    Unsupported { kind: String, reason: String },

    #[error("Webhook returned HTTP {status}")]
    WebhookStatus { status: u16 },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Batch-level errors.
///
/// `MissingOwner` and rule-loading `Database` failures abort a batch. Inside the
/// message boundary a `Database` error or `Panicked` fails only that message.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Batch requires an owner id")]
    MissingOwner,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Message {id} panicked: {reason}")]
    Panicked { id: String, reason: String },
}
