//! Configuration file loader for asset-publisher
//!
//! This module provides configuration loading, merging and validation.

use super::config::*;
use crate::core::error::ConfigError;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Configuration file name
pub const CONFIG_FILENAME: &str = ".asset-publish.yaml";

pub const ENV_MAX_CONCURRENCY: &str = "ASSET_PUBLISH_MAX_CONCURRENCY";
pub const ENV_ABORT_ON_ERROR: &str = "ASSET_PUBLISH_ABORT_ON_ERROR";
pub const ENV_PROFILE: &str = "ASSET_PUBLISH_PROFILE";

lazy_static! {
    /// Environment variable reference (${VAR_NAME})
    static ref ENV_VAR_RE: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// Configuration load options
#[derive(Debug, Clone, Default)]
pub struct ConfigLoadOptions {
    /// Directory searched for a project config (the manifest directory)
    pub project_path: PathBuf,

    /// Explicit config file, used instead of the project config
    pub config_file: Option<PathBuf>,

    /// CLI arguments (highest priority)
    pub cli_args: Option<PublisherConfig>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. CLI arguments
    /// 2. Environment variables
    /// 3. Project config (`<manifest dir>/.asset-publish.yaml`) or `--config` file
    /// 4. Global config (`~/.asset-publish.yaml`)
    /// 5. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<PublisherConfig, ConfigError> {
        let mut configs: Vec<PublisherConfig> = Vec::new();

        if let Some(home) = options.env.get("HOME") {
            let global_path = PathBuf::from(home).join(CONFIG_FILENAME);
            if let Some(global) = Self::load_config_file(&global_path, false).await? {
                configs.push(global);
            }
        }

        let project = match &options.config_file {
            Some(path) => Self::load_config_file(path, true).await?,
            None => Self::load_config_file(&options.project_path.join(CONFIG_FILENAME), false).await?,
        };
        configs.extend(project);

        configs.extend(Self::load_env_config(&options.env)?);
        configs.extend(options.cli_args);

        let merged = Self::merge_configs(configs);
        let expanded = Self::expand_env_vars(merged, &options.env);
        Self::validate(&expanded)?;

        Ok(expanded)
    }

    /// Load configuration from a YAML file
    ///
    /// A missing optional file yields `None`; a missing required file is an error.
    async fn load_config_file(
        file_path: &Path,
        required: bool,
    ) -> Result<Option<PublisherConfig>, ConfigError> {
        let content = match fs::read_to_string(file_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                return Ok(None);
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: file_path.to_path_buf(),
                    source,
                });
            }
        };

        debug!(path = %file_path.display(), "loading config file");
        if content.trim().is_empty() {
            return Ok(Some(PublisherConfig::default()));
        }

        serde_yaml::from_str(&content)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: file_path.to_path_buf(),
                source,
            })
    }

    /// Load configuration from environment variables
    fn load_env_config(env: &HashMap<String, String>) -> Result<Option<PublisherConfig>, ConfigError> {
        let mut config = PublisherConfig::default();
        let mut has_changes = false;

        if let Some(value) = env.get(ENV_MAX_CONCURRENCY) {
            let max_concurrency = value.trim().parse::<usize>().map_err(|_| ConfigError::Invalid {
                field: ENV_MAX_CONCURRENCY.to_string(),
                message: format!("expected a positive integer, got '{}'", value),
            })?;
            config.publish.get_or_insert_with(Default::default).max_concurrency = Some(max_concurrency);
            has_changes = true;
        }

        if let Some(value) = env.get(ENV_ABORT_ON_ERROR) {
            let abort = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        field: ENV_ABORT_ON_ERROR.to_string(),
                        message: format!("expected true or false, got '{}'", value),
                    });
                }
            };
            config.publish.get_or_insert_with(Default::default).abort_on_first_error = Some(abort);
            has_changes = true;
        }

        if let Some(profile) = env.get(ENV_PROFILE)
            && !profile.is_empty()
        {
            config.aws.get_or_insert_with(Default::default).profile = Some(profile.clone());
            has_changes = true;
        }

        Ok(if has_changes { Some(config) } else { None })
    }

    /// Merge multiple configurations; later ones win field by field
    fn merge_configs(configs: Vec<PublisherConfig>) -> PublisherConfig {
        let mut result = PublisherConfig::default();

        for config in configs {
            Self::merge_into(&mut result, config);
        }

        result
    }

    fn merge_into(target: &mut PublisherConfig, source: PublisherConfig) {
        if let Some(source) = source.publish {
            let target = target.publish.get_or_insert_with(Default::default);
            merge_field(&mut target.abort_on_first_error, source.abort_on_first_error);
            merge_field(&mut target.max_concurrency, source.max_concurrency);
        }

        if let Some(source) = source.retry {
            let target = target.retry.get_or_insert_with(Default::default);
            merge_field(&mut target.max_attempts, source.max_attempts);
            merge_field(&mut target.initial_delay_ms, source.initial_delay_ms);
            merge_field(&mut target.max_delay_ms, source.max_delay_ms);
            merge_field(&mut target.backoff_multiplier, source.backoff_multiplier);
        }

        if let Some(source) = source.aws {
            let target = target.aws.get_or_insert_with(Default::default);
            merge_field(&mut target.profile, source.profile);
            merge_field(&mut target.region, source.region);
        }

        if let Some(source) = source.docker {
            let target = target.docker.get_or_insert_with(Default::default);
            merge_field(&mut target.timeout_secs, source.timeout_secs);
        }
    }

    /// Expand `${VAR}` references in string values
    fn expand_env_vars(mut config: PublisherConfig, env: &HashMap<String, String>) -> PublisherConfig {
        if let Some(aws) = &mut config.aws {
            for value in [&mut aws.profile, &mut aws.region].into_iter().flatten() {
                *value = Self::expand_string(value, env);
            }
        }
        config
    }

    /// Expand environment variables in a single string; unknown ones are kept verbatim
    fn expand_string(input: &str, env: &HashMap<String, String>) -> String {
        ENV_VAR_RE
            .replace_all(input, |caps: &regex::Captures| match env.get(&caps[1]) {
                Some(value) => value.clone(),
                None => {
                    warn!(variable = &caps[1], "environment variable not set, leaving reference");
                    caps[0].to_string()
                }
            })
            .into_owned()
    }

    /// Validate configuration
    pub fn validate(config: &PublisherConfig) -> Result<(), ConfigError> {
        if let Some(publish) = &config.publish
            && publish.max_concurrency == Some(0)
        {
            return Err(ConfigError::Invalid {
                field: "publish.maxConcurrency".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if let Some(retry) = &config.retry {
            if retry.max_attempts == Some(0) {
                return Err(ConfigError::Invalid {
                    field: "retry.maxAttempts".to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            if let Some(multiplier) = retry.backoff_multiplier
                && (multiplier.is_nan() || multiplier < 1.0)
            {
                return Err(ConfigError::Invalid {
                    field: "retry.backoffMultiplier".to_string(),
                    message: format!("must be at least 1.0, got {}", multiplier),
                });
            }
            if let (Some(initial), Some(max)) = (retry.initial_delay_ms, retry.max_delay_ms)
                && initial > max
            {
                return Err(ConfigError::Invalid {
                    field: "retry.initialDelayMs".to_string(),
                    message: format!("must not exceed retry.maxDelayMs ({})", max),
                });
            }
        }

        if let Some(docker) = &config.docker
            && docker.timeout_secs == Some(0)
        {
            return Err(ConfigError::Invalid {
                field: "docker.timeoutSecs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

fn merge_field<T>(target: &mut Option<T>, source: Option<T>) {
    if source.is_some() {
        *target = source;
    }
}
