//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Reject metric definitions the registry would refuse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::observability::metrics::prometheus::BUILD_INFO;
use crate::observability::metrics::MetricKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server.name must not be empty")]
    EmptyServiceName,

    #[error("{field}: \"{value}\" is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("tracing.collector_url: \"{0}\" is not a valid URL")]
    InvalidCollectorUrl(String),

    #[error("metrics.descriptors: duplicate metric name \"{0}\"")]
    DuplicateMetric(String),

    #[error("metrics.descriptors: histogram \"{0}\" has no buckets")]
    MissingBuckets(String),

    #[error("metrics.descriptors: histogram \"{name}\" {reason}")]
    InvalidBuckets { name: String, reason: &'static str },
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.trim().is_empty() {
        errors.push(ValidationError::EmptyServiceName);
    }
    check_address(&mut errors, "server.bind_address", &config.server.bind_address);
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("server.request_timeout_secs"));
    }
    if config.server.rpc_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("server.rpc_timeout_ms"));
    }

    if config.metrics.enabled {
        check_address(&mut errors, "metrics.bind_address", &config.metrics.bind_address);
    }
    let mut seen = HashSet::new();
    let mut exposed = HashSet::from([BUILD_INFO.to_string()]);
    for descriptor in &config.metrics.descriptors {
        let fresh_name = seen.insert(descriptor.name.as_str());
        let fresh_series = exposed.insert(descriptor.full_name());
        if !(fresh_name && fresh_series) {
            errors.push(ValidationError::DuplicateMetric(descriptor.name.clone()));
        }
        if descriptor.kind == MetricKind::Histogram {
            if descriptor.buckets.is_empty() {
                errors.push(ValidationError::MissingBuckets(descriptor.name.clone()));
            } else if let Some(reason) = descriptor.bucket_problem() {
                errors.push(ValidationError::InvalidBuckets {
                    name: descriptor.name.clone(),
                    reason,
                });
            }
        }
    }

    if config.tracing.enabled && !is_valid_collector(&config.tracing.collector_url) {
        errors.push(ValidationError::InvalidCollectorUrl(
            config.tracing.collector_url.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn is_valid_collector(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }
    let candidate = if value.contains("://") {
        value.to_string()
    } else {
        format!("http://{value}")
    };
    url::Url::parse(&candidate)
        .map(|u| u.host().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::MetricDescriptor;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&AppConfig::default()), Ok(()));
    }

    #[test]
    fn all_errors_are_reported() {
        let mut config = AppConfig::default();
        config.server.name = " ".to_string();
        config.server.bind_address = "nowhere".to_string();
        config.server.rpc_timeout_ms = 0;
        config.tracing.enabled = true;
        config.tracing.collector_url = String::new();
        config.metrics.descriptors = vec![
            MetricDescriptor::counter("jobs", "", "", &[]),
            MetricDescriptor::counter("jobs", "", "", &[]),
            MetricDescriptor::histogram("latency", "", "", &[], &[]),
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(errors.contains(&ValidationError::EmptyServiceName));
        assert!(errors.contains(&ValidationError::ZeroTimeout("server.rpc_timeout_ms")));
        assert!(errors.contains(&ValidationError::DuplicateMetric("jobs".to_string())));
        assert!(errors.contains(&ValidationError::MissingBuckets("latency".to_string())));
    }

    #[test]
    fn descriptors_are_checked_like_the_registry() {
        let mut config = AppConfig::default();
        config.metrics.descriptors = vec![
            MetricDescriptor::counter("request_total", "http", "", &[]),
            MetricDescriptor::counter("http_request_total", "", "", &[]),
            MetricDescriptor::gauge("info", "build", "", &[]),
            MetricDescriptor::histogram("latency", "", "", &[], &[0.5, 0.1]),
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::DuplicateMetric("http_request_total".to_string()),
                ValidationError::DuplicateMetric("info".to_string()),
                ValidationError::InvalidBuckets {
                    name: "latency".to_string(),
                    reason: "boundaries must be strictly ascending",
                },
            ]
        );
    }

    #[test]
    fn collector_is_only_checked_when_tracing_enabled() {
        let mut config = AppConfig::default();
        config.tracing.collector_url = "bad host:4317".to_string();
        assert!(validate_config(&config).is_ok());
        config.tracing.enabled = true;
        assert!(validate_config(&config).is_err());
        config.tracing.collector_url = "otel-collector:4317".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
