//! Asset manifest loading, selection and listing

use crate::core::error::ManifestError;
use crate::manifest::identifier::AssetIdentifier;
use crate::validation::schema::{required_object, required_str};
use indexmap::IndexMap;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Schema version this crate understands
pub const CURRENT_VERSION: &str = "assets-1.0";

/// Manifest file name used when a directory is given
pub const DEFAULT_FILENAME: &str = "assets.json";

/// One asset: how to build it and where to publish it
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRecord {
    pub asset_type: String,
    pub source: Value,
    pub destinations: IndexMap<String, Value>,
}

/// A single (source, destination) pair from the manifest
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub id: AssetIdentifier,
    pub asset_type: String,
    /// Interpretation depends on `asset_type`
    pub source: Value,
    /// Interpretation depends on `asset_type`
    pub destination: Value,
}

impl ManifestEntry {
    /// Full JSON form, used in diagnostics
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id.to_string(),
            "type": self.asset_type,
            "source": self.source,
            "destination": self.destination,
        })
    }
}

/// A validated, immutable manifest of assets
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    directory: PathBuf,
    assets: IndexMap<String, AssetRecord>,
}

impl Manifest {
    /// Load a manifest from the given file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading asset manifest");

        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ManifestError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let document: Value =
            serde_json::from_str(&content).map_err(|source| ManifestError::Syntax {
                path: path.to_path_buf(),
                source,
            })?;

        Self::parse(path, document)
    }

    /// Load a manifest from a file, or from [`DEFAULT_FILENAME`] inside a directory
    pub async fn load_from_path_or_directory(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)
            .await
            .map_err(|source| ManifestError::Inspect {
                path: path.to_path_buf(),
                source,
            })?;

        if metadata.is_dir() {
            Self::load(path.join(DEFAULT_FILENAME)).await
        } else {
            Self::load(path).await
        }
    }

    /// Validate an already parsed manifest document read from `path`
    pub fn parse(path: &Path, document: Value) -> Result<Self, ManifestError> {
        let version = document.get("version");
        if version.and_then(Value::as_str) != Some(CURRENT_VERSION) {
            return Err(ManifestError::SchemaVersion {
                path: path.to_path_buf(),
                expected: CURRENT_VERSION.to_string(),
                actual: match version {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => "(missing)".to_string(),
                },
            });
        }

        let shape_error = |source| ManifestError::SchemaShape {
            path: path.to_path_buf(),
            source,
        };

        let mut assets = IndexMap::new();
        for (asset_id, asset) in required_object(&document, "assets").map_err(shape_error)? {
            let asset_type = required_str(asset, "type").map_err(shape_error)?;
            let source = required_object(asset, "source").map_err(shape_error)?;
            let destinations = required_object(asset, "destinations").map_err(shape_error)?;

            assets.insert(
                asset_id.clone(),
                AssetRecord {
                    asset_type,
                    source: Value::Object(source.clone()),
                    destinations: destinations
                        .iter()
                        .map(|(id, dest)| (id.clone(), dest.clone()))
                        .collect(),
                },
            );
        }

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        debug!(
            directory = %directory.display(),
            assets = assets.len(),
            "asset manifest validated"
        );

        Ok(Self { directory, assets })
    }

    /// Base directory for relative source paths
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn assets(&self) -> &IndexMap<String, AssetRecord> {
        &self.assets
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn entry_count(&self) -> usize {
        self.assets.values().map(|a| a.destinations.len()).sum()
    }

    /// Select a subset of assets and destinations.
    ///
    /// Only assets with at least one selected destination are retained.
    /// Without a selection the manifest is returned unchanged.
    pub fn select(&self, selection: Option<&[AssetIdentifier]>) -> Manifest {
        let Some(selection) = selection else {
            return self.clone();
        };

        let mut assets = IndexMap::new();
        for (asset_id, asset) in &self.assets {
            let destinations: IndexMap<String, Value> = asset
                .destinations
                .iter()
                .filter(|(dest_id, _)| {
                    let id = AssetIdentifier::new(asset_id.as_str(), Some(dest_id.as_str()));
                    selection.iter().any(|sel| sel.matches(&id))
                })
                .map(|(dest_id, dest)| (dest_id.clone(), dest.clone()))
                .collect();

            if !destinations.is_empty() {
                assets.insert(
                    asset_id.clone(),
                    AssetRecord {
                        destinations,
                        ..asset.clone()
                    },
                );
            }
        }

        Manifest {
            directory: self.directory.clone(),
            assets,
        }
    }

    /// Every (asset, destination) pair, in document order
    pub fn entries(&self) -> impl Iterator<Item = ManifestEntry> + '_ {
        self.assets.iter().flat_map(|(asset_id, asset)| {
            asset.destinations.iter().map(move |(dest_id, destination)| ManifestEntry {
                id: AssetIdentifier::new(asset_id.as_str(), Some(dest_id.as_str())),
                asset_type: asset.asset_type.clone(),
                source: asset.source.clone(),
                destination: destination.clone(),
            })
        })
    }

    /// Describe the manifest as a list of lines, destinations drawn as a tree
    pub fn describe(&self) -> Vec<String> {
        let mut ret = Vec::new();
        for (asset_id, asset) in &self.assets {
            ret.push(format!("{} {} {}", asset_id, asset.asset_type, asset.source));

            let dest_lines: Vec<String> = asset
                .destinations
                .iter()
                .map(|(dest_id, dest)| format!(" {}:{} {}", asset_id, dest_id, dest))
                .collect();
            ret.extend(prefix_tree_chars(&dest_lines, "  "));
        }
        ret
    }
}

/// Prefix box-drawing characters so lines read like a hanging tree
fn prefix_tree_chars(lines: &[String], prefix: &str) -> Vec<String> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let box_char = if i == lines.len() - 1 { '└' } else { '├' };
            format!("{}{}{}", prefix, box_char, line)
        })
        .collect()
}
