//! Configuration types.
//!
//! Built once at process start and passed explicitly into the classifier,
//! the action executor, the batch processor and the storage layer.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::pipeline::orchestrator::BatchOptions;

/// Default rule confidence gate.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

/// Inference endpoint settings.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Base URL of the inference endpoint. `None` means local-only.
    pub endpoint: Option<String>,
    /// Bearer token for the endpoint.
    pub api_key: Option<SecretString>,
    /// Request timeout. A timeout is handled like any other remote failure.
    pub timeout: Duration,
    /// Skip the remote adapter even when an endpoint is configured.
    pub local_only: bool,
}

impl ClassifierConfig {
    /// True when both the endpoint and the key are present and local-only is off.
    pub fn remote_enabled(&self) -> bool {
        !self.local_only && self.endpoint.is_some() && self.api_key.is_some()
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout: Duration::from_secs(10),
            local_only: false,
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Inference endpoint settings.
    pub classifier: ClassifierConfig,
    /// Classifications below this confidence never trigger a rule.
    pub min_confidence: f64,
    /// Whether track_order creates and links a Package on SHIPPED by default.
    pub create_package_on_ship: bool,
    /// Timeout for outbound webhook calls.
    pub webhook_timeout: Duration,
    /// libSQL database file.
    pub database_path: PathBuf,
    /// Default maximum messages per batch.
    pub max_messages: usize,
    /// Default recency window in hours.
    pub since_hours: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            create_package_on_ship: true,
            webhook_timeout: Duration::from_secs(10),
            database_path: PathBuf::from("./data/lifeflow.db"),
            max_messages: 20,
            since_hours: 24,
        }
    }
}

impl PipelineConfig {
    /// Build configuration from `LIFEFLOW_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let endpoint = get("LIFEFLOW_INFERENCE_URL").map(|u| u.trim_end_matches('/').to_string());
        let api_key = get("LIFEFLOW_INFERENCE_API_KEY").map(SecretString::from);
        let timeout = match get("LIFEFLOW_INFERENCE_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_number("LIFEFLOW_INFERENCE_TIMEOUT_SECS", &v)?),
            None => defaults.classifier.timeout,
        };
        let local_only = match get("LIFEFLOW_LOCAL_ONLY") {
            Some(v) => parse_bool("LIFEFLOW_LOCAL_ONLY", &v)?,
            None => false,
        };

        let min_confidence = match get("LIFEFLOW_MIN_CONFIDENCE") {
            Some(v) => {
                let parsed: f64 = v.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "LIFEFLOW_MIN_CONFIDENCE".into(),
                    message: format!("'{v}' is not a number"),
                })?;
                if !(0.0..=1.0).contains(&parsed) {
                    return Err(ConfigError::InvalidValue {
                        key: "LIFEFLOW_MIN_CONFIDENCE".into(),
                        message: format!("{parsed} is outside [0, 1]"),
                    });
                }
                parsed
            }
            None => defaults.min_confidence,
        };

        let create_package_on_ship = match get("LIFEFLOW_CREATE_PACKAGE_ON_SHIP") {
            Some(v) => parse_bool("LIFEFLOW_CREATE_PACKAGE_ON_SHIP", &v)?,
            None => defaults.create_package_on_ship,
        };
        let webhook_timeout = match get("LIFEFLOW_WEBHOOK_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_number("LIFEFLOW_WEBHOOK_TIMEOUT_SECS", &v)?),
            None => defaults.webhook_timeout,
        };
        let database_path = get("LIFEFLOW_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);
        let max_messages = match get("LIFEFLOW_MAX_MESSAGES") {
            Some(v) => narrow("LIFEFLOW_MAX_MESSAGES", parse_number("LIFEFLOW_MAX_MESSAGES", &v)?)?,
            None => defaults.max_messages,
        };
        let since_hours = match get("LIFEFLOW_SINCE_HOURS") {
            Some(v) => narrow("LIFEFLOW_SINCE_HOURS", parse_number("LIFEFLOW_SINCE_HOURS", &v)?)?,
            None => defaults.since_hours,
        };

        Ok(Self {
            classifier: ClassifierConfig {
                endpoint,
                api_key,
                timeout,
                local_only,
            },
            min_confidence,
            create_package_on_ship,
            webhook_timeout,
            database_path,
            max_messages,
            since_hours,
        })
    }

    /// Batch options derived from the configured defaults.
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            max_messages: Some(self.max_messages),
            since: Some(chrono::Duration::hours(i64::from(self.since_hours))),
            persist: true,
        }
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{value}' is not a non-negative integer"),
    })
}

fn narrow<T: TryFrom<u64>>(key: &str, value: u64) -> Result<T, ConfigError> {
    T::try_from(value).map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{value} is too large"),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{other}' is not a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.classifier.endpoint.is_none());
        assert!(!config.classifier.remote_enabled());
        assert!((config.min_confidence - 0.6).abs() < f64::EPSILON);
        assert!(config.create_package_on_ship);
        assert_eq!(config.max_messages, 20);
        assert_eq!(config.since_hours, 24);
    }

    #[test]
    fn remote_requires_endpoint_and_key() {
        let only_url =
            PipelineConfig::from_lookup(lookup(&[("LIFEFLOW_INFERENCE_URL", "https://ai.test/api/")]))
                .unwrap();
        assert!(!only_url.classifier.remote_enabled());
        assert_eq!(only_url.classifier.endpoint.as_deref(), Some("https://ai.test/api"));

        let both = PipelineConfig::from_lookup(lookup(&[
            ("LIFEFLOW_INFERENCE_URL", "https://ai.test/api"),
            ("LIFEFLOW_INFERENCE_API_KEY", "secret"),
        ]))
        .unwrap();
        assert!(both.classifier.remote_enabled());
    }

    #[test]
    fn local_only_disables_remote() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("LIFEFLOW_INFERENCE_URL", "https://ai.test/api"),
            ("LIFEFLOW_INFERENCE_API_KEY", "secret"),
            ("LIFEFLOW_LOCAL_ONLY", "yes"),
        ]))
        .unwrap();
        assert!(!config.classifier.remote_enabled());
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let err = PipelineConfig::from_lookup(lookup(&[("LIFEFLOW_MIN_CONFIDENCE", "1.5")]));
        assert!(matches!(err, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn rejects_bad_boolean() {
        let err = PipelineConfig::from_lookup(lookup(&[("LIFEFLOW_LOCAL_ONLY", "maybe")]));
        assert!(matches!(err, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn rejects_hours_beyond_u32() {
        let err = PipelineConfig::from_lookup(lookup(&[("LIFEFLOW_SINCE_HOURS", "4294967297")]));
        match err {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "LIFEFLOW_SINCE_HOURS"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }

        let config = PipelineConfig::from_lookup(lookup(&[("LIFEFLOW_SINCE_HOURS", "4294967295")])).unwrap();
        assert_eq!(config.since_hours, u32::MAX);
    }

    #[test]
    fn batch_options_follow_config() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("LIFEFLOW_MAX_MESSAGES", "5"),
            ("LIFEFLOW_SINCE_HOURS", "48"),
        ]))
        .unwrap();
        let options = config.batch_options();
        assert_eq!(options.max_messages, Some(5));
        assert_eq!(options.since, Some(chrono::Duration::hours(48)));
        assert!(options.persist);
    }
}
