//! Handler dispatch
//!
//! Discriminators are probed in registration order: `file` first, then
//! `docker-image`. The first one that claims the entry decides its handler;
//! a claimed-but-malformed entry stops the search with a shape error.

pub mod container_images;
pub mod files;

use crate::core::error::DispatchError;
use crate::core::retry::RetryManager;
use crate::core::traits::{AssetHandler, CloudOperations, ContainerEngine, MessageSink};
use crate::manifest::ManifestEntry;
use crate::validation::{
    ContainerImageManifestEntry, FileManifestEntry, as_container_image_entry, as_file_entry,
};
use std::path::Path;
use std::sync::Arc;

pub use container_images::ContainerImageAssetHandler;
pub use files::FileAssetHandler;

/// Capabilities shared by every handler of a publishing run
pub struct PublishContext {
    pub aws: Arc<dyn CloudOperations>,
    pub engine: Arc<dyn ContainerEngine>,
    pub sink: Arc<dyn MessageSink>,
    pub retry: RetryManager,
}

/// A manifest entry narrowed to one of the supported asset kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetKind {
    File(FileManifestEntry),
    ContainerImage(ContainerImageManifestEntry),
}

impl AssetKind {
    pub fn type_tag(&self) -> &'static str {
        match self {
            AssetKind::File(_) => crate::validation::FILE_ASSET_TYPE,
            AssetKind::ContainerImage(_) => crate::validation::CONTAINER_IMAGE_ASSET_TYPE,
        }
    }
}

/// Run the discriminators over `entry` and return the first match
pub fn select_handler(entry: &ManifestEntry) -> Result<AssetKind, DispatchError> {
    if let Some(file) = as_file_entry(entry)? {
        return Ok(AssetKind::File(file));
    }
    if let Some(image) = as_container_image_entry(entry)? {
        return Ok(AssetKind::ContainerImage(image));
    }

    Err(DispatchError::UnrecognizedAssetType {
        asset_type: entry.asset_type.clone(),
        entry: entry.to_json().to_string(),
    })
}

/// Build the handler for `entry`; `directory` resolves relative source paths
pub fn make_asset_handler(
    directory: &Path,
    entry: &ManifestEntry,
    context: Arc<PublishContext>,
) -> Result<Box<dyn AssetHandler>, DispatchError> {
    Ok(match select_handler(entry)? {
        AssetKind::File(file) => Box::new(FileAssetHandler::new(directory, file, context)),
        AssetKind::ContainerImage(image) => {
            Box::new(ContainerImageAssetHandler::new(directory, image, context))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ShapeError;
    use crate::manifest::AssetIdentifier;
    use crate::testing::test_context;
    use serde_json::{Value, json};
    use std::path::PathBuf;

    fn entry(asset_type: &str, source: Value, destination: Value) -> ManifestEntry {
        ManifestEntry {
            id: AssetIdentifier::new("asset", Some("dest")),
            asset_type: asset_type.to_string(),
            source,
            destination,
        }
    }

    #[test]
    fn test_selects_file_handler() {
        let input = entry(
            "file",
            json!({ "path": "x" }),
            json!({ "region": "r", "bucketName": "b", "objectKey": "k" }),
        );

        let kind = select_handler(&input).unwrap();
        assert!(matches!(kind, AssetKind::File(_)));
        assert_eq!(kind.type_tag(), "file");
    }

    #[test]
    fn test_selects_container_image_handler() {
        let input = entry(
            "docker-image",
            json!({ "directory": "." }),
            json!({ "region": "r", "repositoryName": "repo", "imageTag": "t", "imageUri": "u/repo:t" }),
        );

        assert!(matches!(
            select_handler(&input).unwrap(),
            AssetKind::ContainerImage(_)
        ));
    }

    #[test]
    fn test_unrecognized_type_names_type_and_entry() {
        let input = entry("thing", json!({ "src": "S" }), json!({}));

        let err = select_handler(&input).unwrap_err();
        match &err {
            DispatchError::UnrecognizedAssetType { asset_type, entry } => {
                assert_eq!(asset_type, "thing");
                assert!(entry.contains(r#""src":"S""#));
                assert!(entry.contains("asset:dest"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(err.code(), "UNRECOGNIZED_ASSET_TYPE");
    }

    #[test]
    fn test_malformed_claimed_entry_is_not_swallowed() {
        let input = entry("file", json!({}), json!({}));

        let err = select_handler(&input).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Shape(ShapeError::MissingKey { ref key, .. }) if key == "path"
        ));
    }

    #[test]
    fn test_make_asset_handler_carries_identifier() {
        let (context, _aws, _engine, _sink) = test_context();
        let input = entry(
            "file",
            json!({ "path": "x" }),
            json!({ "region": "r", "bucketName": "b", "objectKey": "k" }),
        );

        let handler = make_asset_handler(&PathBuf::from("/out"), &input, context).unwrap();
        assert_eq!(handler.id().to_string(), "asset:dest");
    }
}
