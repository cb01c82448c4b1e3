//! Message classification.
//!
//! Every classifier sees only the [`AnonymizedMessage`]. The remote adapter
//! reports which path produced the result instead of hiding fallbacks.

pub mod local;
pub mod remote;

pub use local::classify_locally;
pub use remote::RemoteClassifier;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ClassifierConfig;
use crate::pipeline::types::{AnonymizedMessage, ClassificationOutcome, ClassificationSource};

/// Classifies anonymized messages. Infallible by contract.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, message: &AnonymizedMessage) -> ClassificationOutcome;
}

/// Keyword scoring only.
#[derive(Debug, Clone)]
pub struct LocalClassifier {
    source: ClassificationSource,
}

impl LocalClassifier {
    /// Local classifier chosen explicitly by configuration.
    pub fn new() -> Self {
        Self {
            source: ClassificationSource::LocalOnly,
        }
    }

    /// Local classifier used because no endpoint is configured.
    pub fn unconfigured() -> Self {
        Self {
            source: ClassificationSource::NotConfigured,
        }
    }
}

impl Default for LocalClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for LocalClassifier {
    async fn classify(&self, message: &AnonymizedMessage) -> ClassificationOutcome {
        ClassificationOutcome {
            classification: classify_locally(message),
            source: self.source.clone(),
        }
    }
}

/// Pick the classifier the configuration asks for.
pub fn classifier_from_config(config: &ClassifierConfig, min_confidence: f64) -> Arc<dyn Classifier> {
    if config.local_only {
        tracing::info!("Classifier: local only");
        Arc::new(LocalClassifier::new())
    } else if config.remote_enabled() {
        tracing::info!(
            endpoint = config.endpoint.as_deref().unwrap_or_default(),
            "Classifier: remote with local fallback"
        );
        Arc::new(RemoteClassifier::new(config.clone(), min_confidence))
    } else {
        tracing::info!("Classifier: local (inference endpoint not configured)");
        Arc::new(LocalClassifier::unconfigured())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::pipeline::types::{Category, TemporalFeatures};

    fn anon() -> AnonymizedMessage {
        AnonymizedMessage {
            sender_domain: "postnl.nl".into(),
            subject_tokens: vec!["delivery:pakket".into()],
            body_tokens: vec![],
            has_attachments: false,
            attachment_types: vec![],
            temporal: TemporalFeatures {
                day_of_week: 1,
                hour_of_day: 8,
                is_weekend: false,
            },
        }
    }

    #[tokio::test]
    async fn local_classifier_reports_its_source() {
        let outcome = LocalClassifier::new().classify(&anon()).await;
        assert_eq!(outcome.source, ClassificationSource::LocalOnly);
        assert_eq!(outcome.classification.category, Category::Delivery);

        let outcome = LocalClassifier::unconfigured().classify(&anon()).await;
        assert_eq!(outcome.source, ClassificationSource::NotConfigured);
    }

    #[tokio::test]
    async fn missing_key_degrades_to_local() {
        let config = ClassifierConfig {
            endpoint: Some("http://127.0.0.1:9".into()),
            api_key: None,
            ..Default::default()
        };
        let classifier = classifier_from_config(&config, 0.6);
        let outcome = classifier.classify(&anon()).await;
        assert_eq!(outcome.source, ClassificationSource::NotConfigured);
    }

    #[tokio::test]
    async fn local_only_wins_over_endpoint() {
        let config = ClassifierConfig {
            endpoint: Some("http://127.0.0.1:9".into()),
            api_key: Some(SecretString::from("k")),
            local_only: true,
            ..Default::default()
        };
        let outcome = classifier_from_config(&config, 0.6).classify(&anon()).await;
        assert_eq!(outcome.source, ClassificationSource::LocalOnly);
    }
}
