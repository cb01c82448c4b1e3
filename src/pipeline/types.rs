//! Shared types for the message processing pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Inbound message ─────────────────────────────────────────────────

/// An attachment's metadata. Content is never loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    #[serde(default)]
    pub size: u64,
}

/// Inbound email as supplied by the message source. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// Provider-native message id; the idempotency key.
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    /// `From` header, e.g. `"Jan Jansen <jan@example.nl>"`.
    pub sender: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl RawMessage {
    /// Subject and body joined for text scans.
    pub fn full_text(&self) -> String {
        format!("{}\n{}", self.subject, self.body)
    }

    /// Display name from the `From` header, falling back to the local part.
    ///
    /// `"Jan Jansen <jan@x.nl>"` → `"Jan Jansen"`, `"jan@x.nl"` → `"jan"`.
    pub fn sender_name(&self) -> String {
        let sender = self.sender.trim();
        if let Some(idx) = sender.find('<') {
            let name = sender[..idx].trim().trim_matches('"').trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
        let address = sender.trim_start_matches('<').trim_end_matches('>');
        match address.split_once('@') {
            Some((local, _)) if !local.is_empty() => local.to_string(),
            _ => sender.to_string(),
        }
    }
}

// ── Anonymized message ──────────────────────────────────────────────

/// When the message was received, reduced to coarse features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalFeatures {
    /// 0 = Sunday … 6 = Saturday.
    pub day_of_week: u32,
    pub hour_of_day: u32,
    pub is_weekend: bool,
}

/// PII-free representation of a message. The only thing that leaves the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnonymizedMessage {
    pub sender_domain: String,
    pub subject_tokens: Vec<String>,
    pub body_tokens: Vec<String>,
    pub has_attachments: bool,
    pub attachment_types: Vec<String>,
    pub temporal: TemporalFeatures,
}

impl AnonymizedMessage {
    /// Subject tokens followed by body tokens.
    pub fn all_tokens(&self) -> impl Iterator<Item = &str> {
        self.subject_tokens
            .iter()
            .chain(self.body_tokens.iter())
            .map(String::as_str)
    }

    /// Whether any token equals `token`.
    pub fn has_token(&self, token: &str) -> bool {
        self.all_tokens().any(|t| t == token)
    }
}

// ── Category ────────────────────────────────────────────────────────

/// Inferred purpose of a message.
///
/// Declaration order is significant: when two categories share the maximum
/// local score, the one declared first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Invoice,
    Delivery,
    Order,
    Event,
    Task,
    Newsletter,
    Spam,
    Personal,
    Unknown,
}

impl Category {
    /// All categories in declaration (tie-break) order.
    pub const ALL: [Category; 9] = [
        Category::Invoice,
        Category::Delivery,
        Category::Order,
        Category::Event,
        Category::Task,
        Category::Newsletter,
        Category::Spam,
        Category::Personal,
        Category::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Delivery => "delivery",
            Self::Order => "order",
            Self::Event => "event",
            Self::Task => "task",
            Self::Newsletter => "newsletter",
            Self::Spam => "spam",
            Self::Personal => "personal",
            Self::Unknown => "unknown",
        }
    }

    /// Position in `ALL`.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category: '{s}'"))
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Category-specific fields derived from tokens (never from raw text).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_location: Option<String>,
}

impl ExtractedData {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Result of classifying one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub category: Category,
    /// Always within [0, 1].
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<ExtractedData>,
    #[serde(default)]
    pub reasoning: String,
}

impl Classification {
    pub fn extracted(&self) -> Option<&ExtractedData> {
        self.extracted_data.as_ref()
    }
}

/// Which path produced a classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ClassificationSource {
    /// The inference endpoint answered.
    Remote,
    /// Local-only mode was selected in configuration.
    LocalOnly,
    /// No endpoint or key configured.
    NotConfigured,
    /// The remote call failed and the local algorithm was used.
    Fallback { error: String },
}

impl ClassificationSource {
    /// Short label for logging and persistence.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::LocalOnly | Self::NotConfigured | Self::Fallback { .. } => "local",
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// A classification plus the path that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationOutcome {
    pub classification: Classification,
    pub source: ClassificationSource,
}
