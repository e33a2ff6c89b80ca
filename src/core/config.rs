//! Configuration structures for asset-publisher
//!
//! Every field is optional so that layers (global file, project file,
//! environment, CLI) can be merged field by field.

use crate::core::retry::RetryOptions;
use crate::orchestration::PublishingOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration object
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublisherConfig {
    /// Publishing policy (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishSection>,

    /// Retry policy for uploads and pushes (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySection>,

    /// Cloud credentials and region (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsSection>,

    /// Container engine settings (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_on_first_error: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrySection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwsSection {
    /// Named CLI profile
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Region used when a destination relies on the default region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DockerSection {
    /// Kill `docker`/`aws` invocations running longer than this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Default command timeout in seconds
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 1800;

impl PublisherConfig {
    pub fn publishing_options(&self) -> PublishingOptions {
        let defaults = PublishingOptions::default();
        let publish = self.publish.clone().unwrap_or_default();

        PublishingOptions {
            abort_on_first_error: publish
                .abort_on_first_error
                .unwrap_or(defaults.abort_on_first_error),
            max_concurrency: publish.max_concurrency.unwrap_or(defaults.max_concurrency),
        }
    }

    pub fn retry_options(&self) -> RetryOptions {
        let defaults = RetryOptions::default();
        let retry = self.retry.clone().unwrap_or_default();

        RetryOptions {
            max_attempts: retry.max_attempts.unwrap_or(defaults.max_attempts),
            initial_delay: retry
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            max_delay: retry
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            backoff_multiplier: retry
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
        }
    }

    pub fn aws_profile(&self) -> Option<String> {
        self.aws.as_ref().and_then(|a| a.profile.clone())
    }

    pub fn aws_region(&self) -> Option<String> {
        self.aws.as_ref().and_then(|a| a.region.clone())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(
            self.docker
                .as_ref()
                .and_then(|d| d.timeout_secs)
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
        )
    }
}
