//! Container image handler: build locally and push to a registry

use crate::core::traits::{AssetHandler, BuildOptions, ClientOptions, EventType, PublishOutcome};
use crate::handlers::PublishContext;
use crate::manifest::{AssetIdentifier, replace_placeholders};
use crate::validation::{ContainerImageDestination, ContainerImageManifestEntry};
use anyhow::anyhow;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub struct ContainerImageAssetHandler {
    directory: PathBuf,
    entry: ContainerImageManifestEntry,
    context: Arc<PublishContext>,
}

impl ContainerImageAssetHandler {
    pub fn new(
        directory: &Path,
        entry: ContainerImageManifestEntry,
        context: Arc<PublishContext>,
    ) -> Self {
        Self {
            directory: directory.to_path_buf(),
            entry,
            context,
        }
    }

    /// Tag the image is built under before being tagged with its destination URI
    pub fn local_tag(&self) -> String {
        let id: String = self
            .entry
            .id
            .asset_id()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '-' })
            .collect();
        format!("assetpublisher-{}", id.to_ascii_lowercase())
    }

    async fn resolved_destination(&self) -> anyhow::Result<ContainerImageDestination> {
        let mut d = self.entry.destination.clone();
        let mut fields: Vec<&mut String> = vec![
            &mut d.region,
            &mut d.repository_name,
            &mut d.image_tag,
            &mut d.image_uri,
        ];
        fields.extend(d.assume_role_arn.as_mut());
        fields.extend(d.assume_role_external_id.as_mut());
        replace_placeholders(self.context.aws.as_ref(), &mut fields).await?;
        Ok(d)
    }
}

#[async_trait]
impl AssetHandler for ContainerImageAssetHandler {
    fn id(&self) -> &AssetIdentifier {
        &self.entry.id
    }

    async fn publish(&self) -> anyhow::Result<PublishOutcome> {
        let sink = &self.context.sink;
        let engine = &self.context.engine;
        let destination = self.resolved_destination().await?;
        let image_uri = destination.image_uri.as_str();

        let registry = self
            .context
            .aws
            .container_registry(&ClientOptions {
                region: Some(destination.region.clone()),
                assume_role_arn: destination.assume_role_arn.clone(),
                assume_role_external_id: destination.assume_role_external_id.clone(),
            })
            .await?;

        sink.message(EventType::Check, &format!("Check {}", image_uri));
        if registry
            .image_exists(&destination.repository_name, &destination.image_tag)
            .await?
        {
            sink.message(EventType::Found, &format!("Found {}", image_uri));
            return Ok(PublishOutcome::AlreadyPublished);
        }

        let endpoint = registry_endpoint(image_uri)?;
        let credentials = registry.login_credentials().await?;
        engine.login(endpoint, &credentials).await?;

        let local_tag = self.local_tag();
        if engine.image_exists(&local_tag).await? {
            debug!(id = %self.entry.id, %local_tag, "reusing local image");
        } else {
            let source = &self.entry.source;
            let context_dir = self.directory.join(&source.directory);
            if !tokio::fs::metadata(&context_dir)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false)
            {
                return Err(anyhow!(
                    "Build context directory not found: {}",
                    context_dir.display()
                ));
            }

            sink.message(EventType::Build, &format!("Building image {}", local_tag));
            engine
                .build(&BuildOptions {
                    directory: context_dir,
                    tag: local_tag.clone(),
                    docker_file: source.docker_file.clone(),
                    target: source.docker_build_target.clone(),
                    build_args: source.docker_build_args.clone().unwrap_or_default(),
                })
                .await?;
        }

        engine.tag(&local_tag, image_uri).await?;

        sink.message(EventType::Upload, &format!("Push {}", image_uri));
        self.context.retry.retry(|| engine.push(image_uri)).await?;

        Ok(PublishOutcome::Published)
    }
}

/// Registry host of an image URI (`host/repository:tag`)
fn registry_endpoint(image_uri: &str) -> anyhow::Result<&str> {
    match image_uri.split_once('/') {
        Some((host, _)) if !host.is_empty() => Ok(host),
        _ => Err(anyhow!("Image URI has no registry host: {}", image_uri)),
    }
}
