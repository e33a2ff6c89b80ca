//! Orchestration layer for asset publishing
//!
//! Runs every entry of a manifest through its handler and reports progress
//! to a message sink.

pub mod asset_publishing;
pub mod sinks;

pub use asset_publishing::{AssetPublishing, CancellationHandle, PublishSummary, PublishingOptions};
pub use sinks::{MemorySink, StdoutSink, TracingSink};
