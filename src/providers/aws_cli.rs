//! Cloud operations backed by the `aws` command line tool
//!
//! Credentials come from the CLI's own resolution chain (profile, env,
//! instance metadata). Assuming a role exchanges them for temporary
//! credentials that are passed to every later call through the environment.

use crate::core::traits::{
    ClientOptions, CloudOperations, ContainerRegistry, ObjectStore, RegistryCredentials,
};
use crate::security::command_executor::{ExecOptions, SafeCommandExecutor};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::OnceCell;
use tracing::debug;

const AWS: &str = "aws";

/// [`CloudOperations`] that shells out to `aws`
pub struct AwsCliOperations {
    executor: SafeCommandExecutor,
    profile: Option<String>,
    region: Option<String>,
    account: OnceCell<String>,
    default_region: OnceCell<String>,
}

impl AwsCliOperations {
    pub fn new(executor: SafeCommandExecutor) -> Self {
        Self {
            executor,
            profile: None,
            region: None,
            account: OnceCell::new(),
            default_region: OnceCell::new(),
        }
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    /// Region used when neither the destination nor the environment names one
    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    fn base_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if let Some(profile) = &self.profile {
            env.insert("AWS_PROFILE".to_string(), profile.clone());
        }
        env
    }

    /// Environment and region for a client built from `options`
    async fn client_env(&self, options: &ClientOptions) -> anyhow::Result<(HashMap<String, String>, String)> {
        let region = match &options.region {
            Some(region) => region.clone(),
            None => self.default_region().await?,
        };

        let mut env = self.base_env();
        if let Some(role_arn) = &options.assume_role_arn {
            let session_name = format!("asset-publisher-{}", uuid::Uuid::new_v4().simple());
            let mut args = vec![
                "sts",
                "assume-role",
                "--role-arn",
                role_arn.as_str(),
                "--role-session-name",
                session_name.as_str(),
                "--region",
                region.as_str(),
                "--output",
                "json",
            ];
            if let Some(external_id) = &options.assume_role_external_id {
                args.extend(["--external-id", external_id.as_str()]);
            }

            debug!(role_arn = %role_arn, "assuming role");
            let output = self
                .executor
                .run_checked(AWS, &args, &ExecOptions { env: env.clone(), stdin: None })
                .await
                .with_context(|| format!("Failed to assume role '{}'", role_arn))?;

            env.extend(parse_assumed_role(&output.stdout)?);
        }

        Ok((env, region))
    }
}

#[async_trait]
impl CloudOperations for AwsCliOperations {
    async fn current_account(&self) -> anyhow::Result<String> {
        self.account
            .get_or_try_init(|| async {
                let output = self
                    .executor
                    .run_checked(
                        AWS,
                        &["sts", "get-caller-identity", "--query", "Account", "--output", "text"],
                        &ExecOptions { env: self.base_env(), stdin: None },
                    )
                    .await
                    .context("Failed to resolve current account")?;
                Ok::<String, anyhow::Error>(output.stdout.trim().to_string())
            })
            .await
            .cloned()
    }

    async fn default_region(&self) -> anyhow::Result<String> {
        self.default_region
            .get_or_try_init(|| async {
                if let Some(region) = &self.region {
                    return Ok(region.clone());
                }
                for var in ["AWS_REGION", "AWS_DEFAULT_REGION"] {
                    if let Ok(region) = std::env::var(var)
                        && !region.is_empty()
                    {
                        return Ok(region);
                    }
                }

                let output = self
                    .executor
                    .execute_with(
                        AWS,
                        &["configure", "get", "region"],
                        &ExecOptions { env: self.base_env(), stdin: None },
                    )
                    .await?;
                let region = output.stdout.trim();
                if !output.success || region.is_empty() {
                    return Err(anyhow!(
                        "No default region configured; set AWS_REGION or aws.region in the config file"
                    ));
                }
                Ok::<String, anyhow::Error>(region.to_string())
            })
            .await
            .cloned()
    }

    async fn object_store(&self, options: &ClientOptions) -> anyhow::Result<Box<dyn ObjectStore>> {
        let (env, region) = self.client_env(options).await?;
        Ok(Box::new(AwsCliObjectStore {
            executor: self.executor.clone(),
            env,
            region,
        }))
    }

    async fn container_registry(
        &self,
        options: &ClientOptions,
    ) -> anyhow::Result<Box<dyn ContainerRegistry>> {
        let (env, region) = self.client_env(options).await?;
        Ok(Box::new(AwsCliContainerRegistry {
            executor: self.executor.clone(),
            env,
            region,
        }))
    }
}

struct AwsCliObjectStore {
    executor: SafeCommandExecutor,
    env: HashMap<String, String>,
    region: String,
}

#[async_trait]
impl ObjectStore for AwsCliObjectStore {
    async fn object_exists(&self, bucket: &str, key: &str) -> anyhow::Result<bool> {
        let output = self
            .executor
            .execute_with(
                AWS,
                &["s3api", "head-object", "--bucket", bucket, "--key", key, "--region", &self.region],
                &self.exec_options(),
            )
            .await?;

        if output.success {
            return Ok(true);
        }
        if is_not_found(&output.stderr) {
            return Ok(false);
        }
        Err(anyhow!(
            "Failed to check s3://{}/{}: {}",
            bucket,
            key,
            output.stderr.trim()
        ))
    }

    async fn upload_file(&self, bucket: &str, key: &str, file: &Path) -> anyhow::Result<()> {
        let file = file.to_string_lossy();
        let url = format!("s3://{}/{}", bucket, key);
        self.executor
            .run_checked(
                AWS,
                &["s3", "cp", &file, &url, "--region", &self.region, "--only-show-errors"],
                &self.exec_options(),
            )
            .await
            .with_context(|| format!("Failed to upload {} to {}", file, url))?;
        Ok(())
    }
}

impl AwsCliObjectStore {
    fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            env: self.env.clone(),
            stdin: None,
        }
    }
}

struct AwsCliContainerRegistry {
    executor: SafeCommandExecutor,
    env: HashMap<String, String>,
    region: String,
}

#[async_trait]
impl ContainerRegistry for AwsCliContainerRegistry {
    async fn image_exists(&self, repository: &str, tag: &str) -> anyhow::Result<bool> {
        let image_ids = format!("imageTag={}", tag);
        let output = self
            .executor
            .execute_with(
                AWS,
                &[
                    "ecr",
                    "describe-images",
                    "--repository-name",
                    repository,
                    "--image-ids",
                    &image_ids,
                    "--region",
                    &self.region,
                ],
                &ExecOptions { env: self.env.clone(), stdin: None },
            )
            .await?;

        if output.success {
            return Ok(true);
        }
        if output.stderr.contains("ImageNotFoundException") {
            return Ok(false);
        }
        Err(anyhow!(
            "Failed to check image {}:{}: {}",
            repository,
            tag,
            output.stderr.trim()
        ))
    }

    async fn login_credentials(&self) -> anyhow::Result<RegistryCredentials> {
        let output = self
            .executor
            .run_checked(
                AWS,
                &["ecr", "get-login-password", "--region", &self.region],
                &ExecOptions { env: self.env.clone(), stdin: None },
            )
            .await
            .context("Failed to obtain registry credentials")?;

        Ok(RegistryCredentials {
            username: "AWS".to_string(),
            password: output.stdout.trim().to_string().into(),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleOutput {
    credentials: AssumedCredentials,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumedCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
}

/// Environment variables carrying the temporary credentials of `sts assume-role`
fn parse_assumed_role(stdout: &str) -> anyhow::Result<HashMap<String, String>> {
    let parsed: AssumeRoleOutput =
        serde_json::from_str(stdout).context("Unexpected output from sts assume-role")?;
    let creds = parsed.credentials;

    Ok(HashMap::from([
        ("AWS_ACCESS_KEY_ID".to_string(), creds.access_key_id),
        ("AWS_SECRET_ACCESS_KEY".to_string(), creds.secret_access_key),
        ("AWS_SESSION_TOKEN".to_string(), creds.session_token),
    ]))
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("(404)") || stderr.contains("Not Found") || stderr.contains("NoSuchKey")
}
