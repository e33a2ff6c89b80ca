//! Core traits and types for asset publishing
//!
//! This module defines the seams between the orchestrator and the outside
//! world: per-asset handlers, the progress message sink, and the cloud and
//! container-engine capabilities that handlers call into.

use crate::manifest::AssetIdentifier;
use async_trait::async_trait;
use indexmap::IndexMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Messages
// ============================================================================

/// Kind of progress event sent to a [`MessageSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Start,
    Check,
    Found,
    Build,
    Upload,
    Success,
    Fail,
    Debug,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Start => "start",
            EventType::Check => "check",
            EventType::Found => "found",
            EventType::Build => "build",
            EventType::Upload => "upload",
            EventType::Success => "success",
            EventType::Fail => "fail",
            EventType::Debug => "debug",
        }
    }
}

/// Receives one line of progress text per event
///
/// Implementations must write each line atomically; lines from different
/// entries may interleave when publishing concurrently.
pub trait MessageSink: Send + Sync {
    fn message(&self, event: EventType, text: &str);
}

// ============================================================================
// Handlers
// ============================================================================

/// Result of a successful publish call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PublishOutcome {
    Published,
    /// The destination already held the asset, nothing was done
    AlreadyPublished,
}

/// Publishes one (asset, destination) entry
#[async_trait]
pub trait AssetHandler: Send + Sync {
    fn id(&self) -> &AssetIdentifier;

    async fn publish(&self) -> anyhow::Result<PublishOutcome>;
}

// ============================================================================
// Cloud operations
// ============================================================================

/// Region and role to use for a client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assume_role_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assume_role_external_id: Option<String>,
}

/// Account/region resolution and client factories
#[async_trait]
pub trait CloudOperations: Send + Sync {
    async fn current_account(&self) -> anyhow::Result<String>;

    async fn default_region(&self) -> anyhow::Result<String>;

    async fn object_store(&self, options: &ClientOptions) -> anyhow::Result<Box<dyn ObjectStore>>;

    async fn container_registry(
        &self,
        options: &ClientOptions,
    ) -> anyhow::Result<Box<dyn ContainerRegistry>>;
}

/// Object storage client
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn object_exists(&self, bucket: &str, key: &str) -> anyhow::Result<bool>;

    async fn upload_file(&self, bucket: &str, key: &str, file: &Path) -> anyhow::Result<()>;
}

/// Registry login credentials
#[derive(Debug, Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: SecretString,
}

/// Container registry client
#[async_trait]
pub trait ContainerRegistry: Send + Sync {
    async fn image_exists(&self, repository: &str, tag: &str) -> anyhow::Result<bool>;

    async fn login_credentials(&self) -> anyhow::Result<RegistryCredentials>;
}

// ============================================================================
// Container engine
// ============================================================================

/// Inputs for building a container image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub directory: PathBuf,
    pub tag: String,
    pub docker_file: Option<String>,
    pub target: Option<String>,
    pub build_args: IndexMap<String, String>,
}

/// Local container engine (build, tag, push)
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn login(&self, endpoint: &str, credentials: &RegistryCredentials) -> anyhow::Result<()>;

    async fn image_exists(&self, tag: &str) -> anyhow::Result<bool>;

    async fn build(&self, options: &BuildOptions) -> anyhow::Result<()>;

    async fn tag(&self, source: &str, target: &str) -> anyhow::Result<()>;

    async fn push(&self, tag: &str) -> anyhow::Result<()>;
}
