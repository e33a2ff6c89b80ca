//! Error handling for asset publishing
//!
//! Each layer has its own error type: identifier parsing, manifest loading,
//! entry shape validation, handler dispatch and the publishing run itself.
//! Handler and provider internals report failures through `anyhow`.

use crate::manifest::AssetIdentifier;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed `assetId[:destinationId]` string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Asset identifier must contain at most 2 ':'-separated parts, got '{0}'")]
    TooManyParts(String),

    #[error("Asset identifier parts must not be empty, got '{0}'")]
    EmptyPart(String),
}

impl IdentifierError {
    pub fn code(&self) -> &'static str {
        "FORMAT_ERROR"
    }
}

/// A required key is missing or has the wrong JSON kind
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Expected key '{key}' missing: {object}")]
    MissingKey { key: String, object: String },

    #[error("Expected type of key '{key}' to be '{expected}': got '{actual}' in {object}")]
    WrongType {
        key: String,
        expected: &'static str,
        actual: &'static str,
        object: String,
    },

    #[error("All elements of '{key}' should be strings, got: '{value}'")]
    NonStringValue { key: String, value: String },
}

impl ShapeError {
    /// Name of the offending key
    pub fn key(&self) -> &str {
        match self {
            Self::MissingKey { key, .. }
            | Self::WrongType { key, .. }
            | Self::NonStringValue { key, .. } => key,
        }
    }

    pub fn code(&self) -> &'static str {
        "SHAPE_ERROR"
    }
}

/// Failure to load an asset manifest. Every variant names the path.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Cannot read asset manifest at '{}': {source}", path.display())]
    Inspect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read asset manifest '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read asset manifest '{}': {source}", path.display())]
    Syntax {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "Cannot read asset manifest '{}': expected schema version '{expected}', got '{actual}'",
        path.display()
    )]
    SchemaVersion {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Cannot read asset manifest '{}': {source}", path.display())]
    SchemaShape {
        path: PathBuf,
        #[source]
        source: ShapeError,
    },
}

impl ManifestError {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Inspect { path, .. }
            | Self::Read { path, .. }
            | Self::Syntax { path, .. }
            | Self::SchemaVersion { path, .. }
            | Self::SchemaShape { path, .. } => path,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Inspect { .. } | Self::Read { .. } => "IO_ERROR",
            Self::Syntax { .. } => "SYNTAX_ERROR",
            Self::SchemaVersion { .. } => "SCHEMA_VERSION_ERROR",
            Self::SchemaShape { .. } => "SCHEMA_SHAPE_ERROR",
        }
    }
}

/// No handler could be selected for a manifest entry
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The type tag matched but the entry is malformed
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("Unrecognized asset type '{asset_type}' in {entry}")]
    UnrecognizedAssetType { asset_type: String, entry: String },
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Shape(e) => e.code(),
            Self::UnrecognizedAssetType { .. } => "UNRECOGNIZED_ASSET_TYPE",
        }
    }
}

/// Why a single (asset, destination) entry failed
#[derive(Error, Debug)]
pub enum EntryError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("{0:#}")]
    Publish(anyhow::Error),
}

impl EntryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Dispatch(e) => e.code(),
            Self::Publish(_) => "HANDLER_PUBLISH_ERROR",
        }
    }
}

/// A failed entry together with its identifier
#[derive(Debug)]
pub struct EntryFailure {
    pub id: AssetIdentifier,
    pub error: EntryError,
}

impl fmt::Display for EntryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.error)
    }
}

/// Overall failure of a publishing run
#[derive(Error, Debug)]
pub enum PublishRunError {
    /// First failure when the run aborts on error; nothing after it was attempted
    #[error("Error publishing {0}")]
    Aborted(EntryFailure),

    /// Every entry that failed during a full run
    #[error("Error publishing {} asset(s):\n{}", .0.len(), list_failures(.0))]
    Failed(Vec<EntryFailure>),

    #[error("Publishing cancelled, {not_attempted} asset(s) not attempted")]
    Cancelled { not_attempted: usize },
}

impl PublishRunError {
    /// Identifiers of every failed entry carried by this error
    pub fn failed_ids(&self) -> Vec<&AssetIdentifier> {
        match self {
            Self::Aborted(failure) => vec![&failure.id],
            Self::Failed(failures) => failures.iter().map(|f| &f.id).collect(),
            Self::Cancelled { .. } => Vec::new(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Aborted(_) => "PUBLISH_ABORTED",
            Self::Failed(_) => "PUBLISH_FAILED",
            Self::Cancelled { .. } => "PUBLISH_CANCELLED",
        }
    }
}

fn list_failures(failures: &[EntryFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  - {}", f))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Configuration file problems
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}
