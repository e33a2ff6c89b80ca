//! Publish the assets described by an asset manifest to their cloud destinations
//!
//! A manifest lists assets (files, directories, container images) and, for
//! each, one or more destinations (bucket/key pairs, registry repositories).
//! [`AssetPublishing`] walks every (asset, destination) entry, dispatches it
//! to the matching handler and uploads whatever is not yet published.

pub mod core;
pub mod handlers;
pub mod manifest;
pub mod orchestration;
pub mod providers;
pub mod security;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::core::*;
pub use handlers::{AssetKind, PublishContext, make_asset_handler, select_handler};
pub use manifest::{AssetIdentifier, Manifest, ManifestEntry};
pub use orchestration::{
    AssetPublishing, CancellationHandle, MemorySink, PublishSummary, PublishingOptions, StdoutSink,
    TracingSink,
};
pub use providers::{AwsCliOperations, DockerCli};
pub use security::{CommandError, SafeCommandExecutor};
