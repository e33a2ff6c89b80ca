//! File asset entries

use crate::core::error::ShapeError;
use crate::manifest::{AssetIdentifier, ManifestEntry};
use crate::validation::schema::{optional_str, required_str};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag of file assets
pub const FILE_ASSET_TYPE: &str = "file";

/// Packaging strategy for file assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilePackaging {
    /// Upload the given path as a file
    File,
    /// The given path is a directory, zip it and upload
    #[serde(rename = "zip")]
    ZipDirectory,
}

impl FilePackaging {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "file" => Some(FilePackaging::File),
            "zip" => Some(FilePackaging::ZipDirectory),
            _ => None,
        }
    }
}

impl fmt::Display for FilePackaging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FilePackaging::File => "file",
            FilePackaging::ZipDirectory => "zip",
        })
    }
}

/// Where the file asset comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    /// Relative to the manifest directory
    pub path: String,
    /// Kept as written; an unknown value is rejected when publishing
    pub packaging: Option<String>,
}

/// Where in object storage a file asset is published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDestination {
    pub region: String,
    pub assume_role_arn: Option<String>,
    pub assume_role_external_id: Option<String>,
    pub bucket_name: String,
    pub object_key: String,
}

/// A manifest entry confirmed to be a well-formed file asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileManifestEntry {
    pub id: AssetIdentifier,
    pub source: FileSource,
    pub destination: FileDestination,
}

/// Narrow `entry` to a file entry.
///
/// Returns `Ok(None)` without looking at the payload when the type tag is
/// not `file`. A `file` entry with a missing or mis-typed field is an error.
pub fn as_file_entry(entry: &ManifestEntry) -> Result<Option<FileManifestEntry>, ShapeError> {
    if entry.asset_type != FILE_ASSET_TYPE {
        return Ok(None);
    }

    let source = FileSource {
        path: required_str(&entry.source, "path")?,
        packaging: optional_str(&entry.source, "packaging")?,
    };

    let dest = &entry.destination;
    let destination = FileDestination {
        region: required_str(dest, "region")?,
        assume_role_arn: optional_str(dest, "assumeRoleArn")?,
        assume_role_external_id: optional_str(dest, "assumeRoleExternalId")?,
        bucket_name: required_str(dest, "bucketName")?,
        object_key: required_str(dest, "objectKey")?,
    };

    Ok(Some(FileManifestEntry {
        id: entry.id.clone(),
        source,
        destination,
    }))
}

/// Whether `entry` is a file asset; errors if it claims to be one but is malformed
pub fn is_file_entry(entry: &ManifestEntry) -> Result<bool, ShapeError> {
    Ok(as_file_entry(entry)?.is_some())
}
