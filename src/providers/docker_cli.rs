//! Container engine backed by the `docker` command line tool

use crate::core::traits::{BuildOptions, ContainerEngine, RegistryCredentials};
use crate::security::command_executor::{ExecOptions, SafeCommandExecutor};
use anyhow::Context;
use async_trait::async_trait;
use secrecy::ExposeSecret;

const DOCKER: &str = "docker";

/// [`ContainerEngine`] that shells out to `docker`
pub struct DockerCli {
    executor: SafeCommandExecutor,
}

impl DockerCli {
    pub fn new(executor: SafeCommandExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn login(&self, endpoint: &str, credentials: &RegistryCredentials) -> anyhow::Result<()> {
        let options = ExecOptions {
            stdin: Some(credentials.password.expose_secret().to_string()),
            ..Default::default()
        };
        self.executor
            .run_checked(
                DOCKER,
                &["login", "--username", &credentials.username, "--password-stdin", endpoint],
                &options,
            )
            .await
            .with_context(|| format!("docker login to {} failed", endpoint))?;
        Ok(())
    }

    async fn image_exists(&self, tag: &str) -> anyhow::Result<bool> {
        let output = self
            .executor
            .execute(DOCKER, &["image", "inspect", tag])
            .await?;
        Ok(output.success)
    }

    async fn build(&self, options: &BuildOptions) -> anyhow::Result<()> {
        let args = build_command_args(options);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.executor
            .run_checked(DOCKER, &args, &ExecOptions::default())
            .await
            .with_context(|| format!("docker build of {} failed", options.directory.display()))?;
        Ok(())
    }

    async fn tag(&self, source: &str, target: &str) -> anyhow::Result<()> {
        self.executor
            .run_checked(DOCKER, &["tag", source, target], &ExecOptions::default())
            .await?;
        Ok(())
    }

    async fn push(&self, tag: &str) -> anyhow::Result<()> {
        self.executor
            .run_checked(DOCKER, &["push", tag], &ExecOptions::default())
            .await
            .with_context(|| format!("docker push {} failed", tag))?;
        Ok(())
    }
}

fn build_command_args(options: &BuildOptions) -> Vec<String> {
    let mut args = vec!["build".to_string()];
    for (name, value) in &options.build_args {
        args.push("--build-arg".to_string());
        args.push(format!("{}={}", name, value));
    }
    args.push("--tag".to_string());
    args.push(options.tag.clone());
    if let Some(target) = &options.target {
        args.push("--target".to_string());
        args.push(target.clone());
    }
    if let Some(file) = &options.docker_file {
        args.push("--file".to_string());
        args.push(options.directory.join(file).to_string_lossy().into_owned());
    }
    args.push(options.directory.to_string_lossy().into_owned());
    args
}
