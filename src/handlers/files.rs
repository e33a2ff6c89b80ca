//! File asset handler: upload a file, or a zipped directory, to object storage

use crate::core::traits::{AssetHandler, ClientOptions, EventType, PublishOutcome};
use crate::handlers::PublishContext;
use crate::manifest::{AssetIdentifier, replace_placeholders};
use crate::validation::{FileDestination, FileManifestEntry, FilePackaging};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub struct FileAssetHandler {
    directory: PathBuf,
    entry: FileManifestEntry,
    context: Arc<PublishContext>,
}

impl FileAssetHandler {
    pub fn new(directory: &Path, entry: FileManifestEntry, context: Arc<PublishContext>) -> Self {
        Self {
            directory: directory.to_path_buf(),
            entry,
            context,
        }
    }

    async fn resolved_destination(&self) -> anyhow::Result<FileDestination> {
        let mut d = self.entry.destination.clone();
        let mut fields: Vec<&mut String> = vec![&mut d.region, &mut d.bucket_name, &mut d.object_key];
        fields.extend(d.assume_role_arn.as_mut());
        fields.extend(d.assume_role_external_id.as_mut());
        replace_placeholders(self.context.aws.as_ref(), &mut fields).await?;
        Ok(d)
    }
}

#[async_trait]
impl AssetHandler for FileAssetHandler {
    fn id(&self) -> &AssetIdentifier {
        &self.entry.id
    }

    async fn publish(&self) -> anyhow::Result<PublishOutcome> {
        let sink = &self.context.sink;
        let destination = self.resolved_destination().await?;
        let bucket = destination.bucket_name.as_str();
        let key = destination.object_key.as_str();
        let url = format!("s3://{}/{}", bucket, key);

        let client = self
            .context
            .aws
            .object_store(&ClientOptions {
                region: Some(destination.region.clone()),
                assume_role_arn: destination.assume_role_arn.clone(),
                assume_role_external_id: destination.assume_role_external_id.clone(),
            })
            .await?;

        sink.message(EventType::Check, &format!("Check {}", url));
        if client.object_exists(bucket, key).await? {
            sink.message(EventType::Found, &format!("Found {}", url));
            return Ok(PublishOutcome::AlreadyPublished);
        }

        let packaging = match &self.entry.source.packaging {
            None => FilePackaging::File,
            Some(p) => FilePackaging::parse(p)
                .ok_or_else(|| anyhow!("Unsupported packaging type: {}", p))?,
        };
        let full_path = self.directory.join(&self.entry.source.path);
        debug!(id = %self.entry.id, path = %full_path.display(), %packaging, "packaging file asset");

        // keeps the temporary archive alive until the upload is done
        let archive;
        let upload_path = match packaging {
            FilePackaging::File => full_path.as_path(),
            FilePackaging::ZipDirectory => {
                sink.message(
                    EventType::Build,
                    &format!("Zip {} -> {}", full_path.display(), url),
                );
                archive = zip_directory(full_path.clone()).await?;
                archive.path()
            }
        };

        sink.message(EventType::Upload, &format!("Upload {}", url));
        self.context
            .retry
            .retry(|| client.upload_file(bucket, key, upload_path))
            .await?;

        Ok(PublishOutcome::Published)
    }
}

/// Zip the contents of `directory` into a temporary file
async fn zip_directory(directory: PathBuf) -> anyhow::Result<NamedTempFile> {
    tokio::task::spawn_blocking(move || write_zip(&directory))
        .await
        .context("zip task panicked")?
}

fn write_zip(directory: &Path) -> anyhow::Result<NamedTempFile> {
    if !directory.is_dir() {
        return Err(anyhow!("Not a directory: {}", directory.display()));
    }

    let archive = tempfile::Builder::new()
        .prefix("asset-")
        .suffix(".zip")
        .tempfile()?;
    let mut writer = ZipWriter::new(archive.reopen()?);

    // symlinked files and directories are archived as their targets
    for entry in WalkDir::new(directory).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(directory)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        // zip entry names always use '/'
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            writer.add_directory(name, zip_options())?;
        } else {
            writer.start_file(name, zip_options())?;
            let mut file = File::open(entry.path())
                .with_context(|| format!("Cannot read {}", entry.path().display()))?;
            std::io::copy(&mut file, &mut writer)?;
        }
    }

    writer.finish()?;
    Ok(archive)
}

/// Fixed timestamps so identical directories produce identical archives
fn zip_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
}
