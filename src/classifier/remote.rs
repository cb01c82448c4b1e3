//! Inference endpoint adapter with unconditional local fallback.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::classifier::Classifier;
use crate::classifier::local::{classify_locally, extracted_from_tokens};
use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use crate::pipeline::types::{
    AnonymizedMessage, Category, Classification, ClassificationOutcome, ClassificationSource,
    ExtractedData,
};

/// Calls `POST {endpoint}/classify` and falls back to local scoring on any failure.
pub struct RemoteClassifier {
    config: ClassifierConfig,
    min_confidence: f64,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteClassification {
    category: String,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    extracted_data: Option<ExtractedData>,
}

/// The endpoint answers either with the bare classification or wrapped in
/// a `{success, classification}` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteResponse {
    Envelope {
        success: bool,
        #[serde(default)]
        classification: Option<RemoteClassification>,
        #[serde(default)]
        error: Option<String>,
    },
    Bare(RemoteClassification),
}

impl RemoteClassifier {
    pub fn new(config: ClassifierConfig, min_confidence: f64) -> Self {
        Self {
            config,
            min_confidence,
            http: reqwest::Client::new(),
        }
    }

    /// One attempt at the endpoint. No retries.
    pub async fn try_remote(
        &self,
        message: &AnonymizedMessage,
    ) -> Result<Classification, ClassifierError> {
        let (Some(endpoint), Some(api_key)) = (&self.config.endpoint, &self.config.api_key) else {
            return Err(ClassifierError::NotConfigured);
        };

        let body = serde_json::json!({
            "action": "classify_email",
            "data": message,
            "options": {
                "includeReasoning": true,
                "minConfidence": self.min_confidence,
            },
        });

        let response = self
            .http
            .post(format!("{endpoint}/classify"))
            .bearer_auth(api_key.expose_secret())
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Status(status.as_u16()));
        }

        let text = response.text().await.map_err(|e| self.map_transport(e))?;
        let parsed: RemoteResponse = serde_json::from_str(&text)
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

        let remote = match parsed {
            RemoteResponse::Bare(c) => c,
            RemoteResponse::Envelope {
                success: true,
                classification: Some(c),
                ..
            } => c,
            RemoteResponse::Envelope { error, .. } => {
                return Err(ClassifierError::InvalidResponse(
                    error.unwrap_or_else(|| "endpoint reported failure".to_string()),
                ));
            }
        };

        let category: Category = remote
            .category
            .parse()
            .map_err(ClassifierError::InvalidResponse)?;
        if !remote.confidence.is_finite() || !(0.0..=1.0).contains(&remote.confidence) {
            return Err(ClassifierError::InvalidResponse(format!(
                "confidence {} outside [0, 1]",
                remote.confidence
            )));
        }

        let mut extracted = remote.extracted_data.unwrap_or_default();
        let local = extracted_from_tokens(message);
        if extracted.carrier.is_none() {
            extracted.carrier = local.carrier;
        }
        if extracted.merchant.is_none() {
            extracted.merchant = local.merchant;
        }

        Ok(Classification {
            category,
            confidence: remote.confidence,
            extracted_data: (!extracted.is_empty()).then_some(extracted),
            reasoning: remote.reasoning,
        })
    }

    /// Probe `GET {endpoint}/health`. The key is sent when one is configured.
    pub async fn health(&self) -> Result<(), ClassifierError> {
        let Some(endpoint) = &self.config.endpoint else {
            return Err(ClassifierError::NotConfigured);
        };

        let mut request = self
            .http
            .get(format!("{endpoint}/health"))
            .timeout(self.config.timeout);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }
        let response = request.send().await.map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Status(status.as_u16()));
        }
        Ok(())
    }

    fn map_transport(&self, e: reqwest::Error) -> ClassifierError {
        if e.is_timeout() {
            ClassifierError::Timeout(self.config.timeout)
        } else {
            ClassifierError::RequestFailed(e.to_string())
        }
    }
}

#[async_trait]
impl Classifier for RemoteClassifier {
    async fn classify(&self, message: &AnonymizedMessage) -> ClassificationOutcome {
        match self.try_remote(message).await {
            Ok(classification) => {
                debug!(
                    category = %classification.category,
                    confidence = classification.confidence,
                    "Remote classification"
                );
                ClassificationOutcome {
                    classification,
                    source: ClassificationSource::Remote,
                }
            }
            Err(e) => {
                warn!(error = %e, "Remote classification failed, using local scoring");
                ClassificationOutcome {
                    classification: classify_locally(message),
                    source: ClassificationSource::Fallback {
                        error: e.to_string(),
                    },
                }
            }
        }
    }
}
