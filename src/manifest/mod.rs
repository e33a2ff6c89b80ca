//! Asset manifest data model
//!
//! A manifest maps asset ids to asset records (type, source, destinations).
//! Entries are addressed with [`AssetIdentifier`]s, which also serve as
//! selection filters.

pub mod asset_manifest;
pub mod identifier;
pub mod placeholders;

pub use asset_manifest::{
    AssetRecord, CURRENT_VERSION, DEFAULT_FILENAME, Manifest, ManifestEntry,
};
pub use identifier::AssetIdentifier;
pub use placeholders::{
    CURRENT_ACCOUNT_PLACEHOLDER, CURRENT_REGION_PLACEHOLDER, replace_placeholders,
};
