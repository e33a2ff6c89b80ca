//! Container image asset entries

use crate::core::error::ShapeError;
use crate::manifest::{AssetIdentifier, ManifestEntry};
use crate::validation::schema::{optional_str, optional_string_map, required_str};
use indexmap::IndexMap;

/// Type tag of container image assets
pub const CONTAINER_IMAGE_ASSET_TYPE: &str = "docker-image";

/// How to build the image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerImageSource {
    /// Build context, relative to the manifest directory
    pub directory: String,
    pub docker_file: Option<String>,
    pub docker_build_target: Option<String>,
    pub docker_build_args: Option<IndexMap<String, String>>,
}

/// Registry coordinates to publish the image to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerImageDestination {
    pub region: String,
    pub assume_role_arn: Option<String>,
    pub assume_role_external_id: Option<String>,
    pub repository_name: String,
    pub image_tag: String,
    /// Full coordinates, e.g. `1234.dkr.ecr.REGION.amazonaws.com/REPO:TAG`
    pub image_uri: String,
}

/// A manifest entry confirmed to be a well-formed container image asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerImageManifestEntry {
    pub id: AssetIdentifier,
    pub source: ContainerImageSource,
    pub destination: ContainerImageDestination,
}

/// Narrow `entry` to a container image entry; see [`super::as_file_entry`]
pub fn as_container_image_entry(
    entry: &ManifestEntry,
) -> Result<Option<ContainerImageManifestEntry>, ShapeError> {
    if entry.asset_type != CONTAINER_IMAGE_ASSET_TYPE {
        return Ok(None);
    }

    let src = &entry.source;
    let source = ContainerImageSource {
        directory: required_str(src, "directory")?,
        docker_file: optional_str(src, "dockerFile")?,
        docker_build_target: optional_str(src, "dockerBuildTarget")?,
        docker_build_args: optional_string_map(src, "dockerBuildArgs")?,
    };

    let dest = &entry.destination;
    let destination = ContainerImageDestination {
        region: required_str(dest, "region")?,
        assume_role_arn: optional_str(dest, "assumeRoleArn")?,
        assume_role_external_id: optional_str(dest, "assumeRoleExternalId")?,
        repository_name: required_str(dest, "repositoryName")?,
        image_tag: required_str(dest, "imageTag")?,
        image_uri: required_str(dest, "imageUri")?,
    };

    Ok(Some(ContainerImageManifestEntry {
        id: entry.id.clone(),
        source,
        destination,
    }))
}

pub fn is_container_image_entry(entry: &ManifestEntry) -> Result<bool, ShapeError> {
    Ok(as_container_image_entry(entry)?.is_some())
}
