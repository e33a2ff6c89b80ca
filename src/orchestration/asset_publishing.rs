//! Asset Publishing - Publishes every entry of a manifest
//!
//! Features:
//! - Sequential or bounded-parallel publishing
//! - Per-entry failure isolation, or abort on the first failure
//! - Cooperative cancellation (in-flight entries finish)
//! - Progress messages for every entry

use crate::core::error::{EntryError, EntryFailure, PublishRunError};
use crate::core::traits::{EventType, MessageSink, PublishOutcome};
use crate::handlers::{PublishContext, make_asset_handler, select_handler};
use crate::manifest::{AssetIdentifier, Manifest, ManifestEntry};
use anyhow::anyhow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Publishing options
#[derive(Debug, Clone)]
pub struct PublishingOptions {
    /// Stop at the first failing entry (default: publish everything)
    pub abort_on_first_error: bool,

    /// Maximum concurrent entries; 1 publishes sequentially (default: 1)
    pub max_concurrency: usize,
}

impl Default for PublishingOptions {
    fn default() -> Self {
        Self {
            abort_on_first_error: false,
            max_concurrency: 1,
        }
    }
}

/// What happened to each entry of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub published: Vec<AssetIdentifier>,
    pub already_published: Vec<AssetIdentifier>,
    pub failed: Vec<AssetIdentifier>,
    pub not_attempted: Vec<AssetIdentifier>,
}

impl PublishSummary {
    pub fn total(&self) -> usize {
        self.published.len()
            + self.already_published.len()
            + self.failed.len()
            + self.not_attempted.len()
    }
}

/// Requests a running publish to stop starting new entries
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct RunState {
    summary: PublishSummary,
    failures: Vec<EntryFailure>,
}

/// AssetPublishing - Publishes the entries of one manifest
pub struct AssetPublishing {
    directory: PathBuf,
    entries: Vec<ManifestEntry>,
    context: Arc<PublishContext>,
    options: PublishingOptions,
    cancellation: CancellationHandle,
}

impl AssetPublishing {
    /// Create a publisher for every entry of `manifest`
    ///
    /// Apply a selection with [`Manifest::select`] beforehand to publish a subset.
    pub fn new(manifest: &Manifest, context: Arc<PublishContext>, options: PublishingOptions) -> Self {
        Self {
            directory: manifest.directory().to_path_buf(),
            entries: manifest.entries().collect(),
            context,
            options,
            cancellation: CancellationHandle::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationHandle) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Publish every entry
    ///
    /// # Returns
    ///
    /// The run summary when no entry failed. Otherwise every failure (or
    /// only the first, when aborting on error), or `Cancelled` when the run
    /// was stopped before all entries were attempted.
    pub async fn publish(&self) -> Result<PublishSummary, PublishRunError> {
        info!(
            entries = self.entries.len(),
            max_concurrency = self.options.max_concurrency,
            abort_on_first_error = self.options.abort_on_first_error,
            "publishing assets"
        );

        let state = if self.options.max_concurrency <= 1 {
            self.publish_sequentially().await
        } else {
            self.publish_in_parallel().await
        };

        self.print_summary(&state.summary);
        self.finish(state)
    }

    /// Dispatch every entry without publishing anything
    ///
    /// Returns the number of entries that have a handler.
    pub fn check(&self) -> Result<usize, PublishRunError> {
        let mut failures = Vec::new();
        for entry in &self.entries {
            match select_handler(entry) {
                Ok(kind) => {
                    debug!(id = %entry.id, asset_type = kind.type_tag(), "entry ok");
                }
                Err(error) => {
                    self.context
                        .sink
                        .message(EventType::Fail, &format!("{}: {}", entry.id, error));
                    failures.push(EntryFailure {
                        id: entry.id.clone(),
                        error: error.into(),
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(self.entries.len())
        } else {
            Err(PublishRunError::Failed(failures))
        }
    }

    async fn publish_sequentially(&self) -> RunState {
        let mut state = RunState::default();

        for entry in &self.entries {
            if self.should_stop(&state) {
                state.summary.not_attempted.push(entry.id.clone());
                continue;
            }

            let result = Self::publish_entry(&self.directory, entry, &self.context).await;
            Self::report(self.context.sink.as_ref(), &entry.id, &result);
            Self::record(&mut state, entry.id.clone(), result);
        }

        state
    }

    /// Results are reported as each entry finishes; the summary and failures
    /// are collected in manifest order.
    async fn publish_in_parallel(&self) -> RunState {
        let permits = self
            .options
            .max_concurrency
            .min(self.entries.len())
            .clamp(1, Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(permits));
        let aborted = Arc::new(AtomicBool::new(false));
        let mut tasks = Vec::new();

        for entry in &self.entries {
            let semaphore = Arc::clone(&semaphore);
            let aborted = Arc::clone(&aborted);
            let cancellation = self.cancellation.clone();
            let context = Arc::clone(&self.context);
            let directory = self.directory.clone();
            let entry_for_task = entry.clone();
            let abort_on_first_error = self.options.abort_on_first_error;

            let task = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return None;
                };
                if cancellation.is_cancelled() || aborted.load(Ordering::SeqCst) {
                    return None;
                }

                let result = Self::publish_entry(&directory, &entry_for_task, &context).await;
                if result.is_err() && abort_on_first_error {
                    aborted.store(true, Ordering::SeqCst);
                }
                Self::report(context.sink.as_ref(), &entry_for_task.id, &result);
                Some(result)
            });

            tasks.push((entry.id.clone(), task));
        }

        let mut state = RunState::default();
        for (id, task) in tasks {
            match task.await {
                Ok(Some(result)) => Self::record(&mut state, id, result),
                Ok(None) => state.summary.not_attempted.push(id),
                Err(e) => {
                    let result = Err(EntryError::Publish(anyhow!("Task failed: {}", e)));
                    Self::report(self.context.sink.as_ref(), &id, &result);
                    Self::record(&mut state, id, result);
                }
            }
        }

        state
    }

    /// Dispatch one entry and run its handler
    async fn publish_entry(
        directory: &Path,
        entry: &ManifestEntry,
        context: &Arc<PublishContext>,
    ) -> Result<PublishOutcome, EntryError> {
        let handler = make_asset_handler(directory, entry, Arc::clone(context))?;

        context
            .sink
            .message(EventType::Start, &format!("Publishing {}", entry.id));
        handler.publish().await.map_err(EntryError::Publish)
    }

    fn report(
        sink: &dyn MessageSink,
        id: &AssetIdentifier,
        result: &Result<PublishOutcome, EntryError>,
    ) {
        match result {
            Ok(PublishOutcome::Published) => {
                sink.message(EventType::Success, &format!("Published {}", id));
            }
            Ok(PublishOutcome::AlreadyPublished) => {
                sink.message(EventType::Success, &format!("Already published {}", id));
            }
            Err(error) => sink.message(EventType::Fail, &format!("{}: {}", id, error)),
        }
    }

    fn record(
        state: &mut RunState,
        id: AssetIdentifier,
        result: Result<PublishOutcome, EntryError>,
    ) {
        match result {
            Ok(PublishOutcome::Published) => state.summary.published.push(id),
            Ok(PublishOutcome::AlreadyPublished) => state.summary.already_published.push(id),
            Err(error) => {
                state.summary.failed.push(id.clone());
                state.failures.push(EntryFailure { id, error });
            }
        }
    }

    fn should_stop(&self, state: &RunState) -> bool {
        self.cancellation.is_cancelled()
            || (self.options.abort_on_first_error && !state.failures.is_empty())
    }

    fn finish(&self, mut state: RunState) -> Result<PublishSummary, PublishRunError> {
        if !state.failures.is_empty() {
            if self.options.abort_on_first_error {
                return Err(PublishRunError::Aborted(state.failures.remove(0)));
            }
            return Err(PublishRunError::Failed(state.failures));
        }

        if !state.summary.not_attempted.is_empty() {
            return Err(PublishRunError::Cancelled {
                not_attempted: state.summary.not_attempted.len(),
            });
        }

        Ok(state.summary)
    }

    fn print_summary(&self, summary: &PublishSummary) {
        let line = format!(
            "{} published, {} already published, {} failed, {} not attempted",
            summary.published.len(),
            summary.already_published.len(),
            summary.failed.len(),
            summary.not_attempted.len()
        );
        info!("{}", line);

        let event = if summary.failed.is_empty() && summary.not_attempted.is_empty() {
            EventType::Success
        } else {
            EventType::Fail
        };
        self.context.sink.message(event, &line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::CURRENT_VERSION;
    use crate::testing::{MockAws, MockEngine, context_for, fast_retry};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Manifest with one file asset per bucket, each with a single destination
    fn manifest_for(dir: &TempDir, buckets: &[&str]) -> Manifest {
        std::fs::write(dir.path().join("file.txt"), "contents").unwrap();

        let mut assets = serde_json::Map::new();
        for bucket in buckets {
            assets.insert(
                bucket.to_string(),
                json!({
                    "type": "file",
                    "source": { "path": "file.txt" },
                    "destinations": {
                        "dest": { "region": "us-north-50", "bucketName": bucket, "objectKey": "key" }
                    }
                }),
            );
        }
        let document = json!({ "version": CURRENT_VERSION, "assets": assets });
        Manifest::parse(&dir.path().join("assets.json"), document).unwrap()
    }

    fn options(abort_on_first_error: bool, max_concurrency: usize) -> PublishingOptions {
        PublishingOptions {
            abort_on_first_error,
            max_concurrency,
        }
    }

    #[tokio::test]
    async fn test_publishes_all_entries() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_for(&dir, &["a", "b", "c"]);
        let aws = MockAws::new().with_existing_object("b", "key");
        let (context, sink) = context_for(aws.clone(), MockEngine::new());

        let summary = AssetPublishing::new(&manifest, context, PublishingOptions::default())
            .publish()
            .await
            .unwrap();

        assert_eq!(summary.published.len(), 2);
        assert_eq!(summary.already_published, vec![AssetIdentifier::new("b", Some("dest"))]);
        assert_eq!(summary.total(), 3);
        assert_eq!(aws.uploaded_buckets(), vec!["a", "c"]);
        assert!(sink.lines().iter().any(|l| l == "Publishing a:dest"));
        assert!(sink.lines().iter().any(|l| l == "Published c:dest"));
    }

    #[tokio::test]
    async fn test_continue_on_error_attempts_everything() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_for(&dir, &["a", "bad1", "c", "bad2"]);
        let aws = MockAws::new()
            .with_failing_bucket("bad1")
            .with_failing_bucket("bad2");
        let (context, sink) = context_for(aws.clone(), MockEngine::new());

        let err = AssetPublishing::new(&manifest, context, options(false, 1))
            .publish()
            .await
            .unwrap_err();

        let failed: Vec<String> = err.failed_ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(failed, vec!["bad1:dest", "bad2:dest"]);
        assert_eq!(err.code(), "PUBLISH_FAILED");
        assert_eq!(aws.uploaded_buckets(), vec!["a", "c"]);
        assert!(sink.lines().iter().any(|l| l.starts_with("bad1:dest: AccessDenied")));
    }

    #[tokio::test]
    async fn test_abort_on_first_error_stops_run() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_for(&dir, &["a", "bad", "c"]);
        let aws = MockAws::new().with_failing_bucket("bad");
        let (context, sink) = context_for(aws.clone(), MockEngine::new());

        let err = AssetPublishing::new(&manifest, context, options(true, 1))
            .publish()
            .await
            .unwrap_err();

        match &err {
            PublishRunError::Aborted(failure) => assert_eq!(failure.id.to_string(), "bad:dest"),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(aws.uploaded_buckets(), vec!["a"]);
        assert!(!sink.lines().iter().any(|l| l == "Publishing c:dest"));
    }

    #[tokio::test]
    async fn test_dispatch_error_is_entry_failure() {
        let dir = TempDir::new().unwrap();
        let document = json!({
            "version": CURRENT_VERSION,
            "assets": {
                "weird": { "type": "thing", "source": {}, "destinations": { "d": {} } },
                "fine": {
                    "type": "file",
                    "source": { "path": "file.txt" },
                    "destinations": { "d": { "region": "r", "bucketName": "b", "objectKey": "k" } }
                }
            }
        });
        std::fs::write(dir.path().join("file.txt"), "x").unwrap();
        let manifest = Manifest::parse(&dir.path().join("assets.json"), document).unwrap();
        let aws = MockAws::new();
        let (context, _sink) = context_for(aws.clone(), MockEngine::new());

        let err = AssetPublishing::new(&manifest, context, options(false, 1))
            .publish()
            .await
            .unwrap_err();

        match err {
            PublishRunError::Failed(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].error.code(), "UNRECOGNIZED_ASSET_TYPE");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(aws.uploaded_buckets(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_parallel_respects_concurrency_limit() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_for(&dir, &["a", "b", "c", "d", "e", "f"]);
        let aws = MockAws::new().with_upload_delay(Duration::from_millis(20));
        let (context, _sink) = context_for(aws.clone(), MockEngine::new());

        let summary = AssetPublishing::new(&manifest, context, options(false, 2))
            .publish()
            .await
            .unwrap();

        assert_eq!(summary.published.len(), 6);
        assert!(aws.max_in_flight() <= 2);
    }

    #[tokio::test]
    async fn test_parallel_collects_every_failure() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_for(&dir, &["a", "bad1", "c", "bad2"]);
        let aws = MockAws::new()
            .with_failing_bucket("bad1")
            .with_failing_bucket("bad2");
        let (context, _sink) = context_for(aws.clone(), MockEngine::new());

        let err = AssetPublishing::new(&manifest, context, options(false, 3))
            .publish()
            .await
            .unwrap_err();

        let failed: Vec<String> = err.failed_ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(failed, vec!["bad1:dest", "bad2:dest"]);
        assert_eq!(aws.uploads().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_for(&dir, &["a", "b"]);
        let aws = MockAws::new();
        let (context, _sink) = context_for(aws.clone(), MockEngine::new());

        let publishing = AssetPublishing::new(&manifest, context, PublishingOptions::default());
        publishing.cancellation_handle().cancel();
        let err = publishing.publish().await.unwrap_err();

        assert!(matches!(err, PublishRunError::Cancelled { not_attempted: 2 }));
        assert!(aws.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_parallel_reports_results_as_entries_finish() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_for(&dir, &["slow", "fast"]);
        let aws = MockAws::new()
            .with_slow_bucket("slow", Duration::from_millis(500))
            .with_existing_object("fast", "key");
        let (context, sink) = context_for(aws.clone(), MockEngine::new());

        let publishing = AssetPublishing::new(&manifest, context, options(false, 2));
        let run = publishing.publish();
        tokio::pin!(run);

        tokio::select! {
            _ = &mut run => panic!("run finished before the slow upload"),
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
        let lines = sink.lines();
        assert!(lines.iter().any(|l| l == "Already published fast:dest"));
        assert!(!lines.iter().any(|l| l == "Published slow:dest"));

        let summary = run.await.unwrap();
        assert_eq!(summary.published, vec![AssetIdentifier::new("slow", Some("dest"))]);
        assert_eq!(summary.already_published, vec![AssetIdentifier::new("fast", Some("dest"))]);
    }

    #[tokio::test]
    async fn test_parallel_failures_keep_manifest_order() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_for(&dir, &["bad1", "bad2"]);
        let aws = MockAws::new()
            .with_failing_bucket("bad1")
            .with_failing_bucket("bad2")
            .with_slow_bucket("bad1", Duration::from_millis(50));
        let (context, sink) = context_for(aws.clone(), MockEngine::new());

        let err = AssetPublishing::new(&manifest, context, options(false, 2))
            .publish()
            .await
            .unwrap_err();

        let failed: Vec<String> = err.failed_ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(failed, vec!["bad1:dest", "bad2:dest"]);

        let lines = sink.lines();
        let position = |prefix: &str| lines.iter().position(|l| l.starts_with(prefix)).unwrap();
        assert!(position("bad2:dest: AccessDenied") < position("bad1:dest: AccessDenied"));
    }

    #[tokio::test]
    async fn test_parallel_concurrency_above_permit_limit() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_for(&dir, &["a", "b", "c"]);
        let aws = MockAws::new();
        let (context, _sink) = context_for(aws.clone(), MockEngine::new());

        let summary = AssetPublishing::new(&manifest, context, options(false, usize::MAX))
            .publish()
            .await
            .unwrap();

        assert_eq!(summary.published.len(), 3);
        assert_eq!(aws.uploaded_buckets().len(), 3);
    }

    #[tokio::test]
    async fn test_parallel_abort_skips_queued_entries() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_for(&dir, &["bad", "b", "c", "d"]);
        let aws = MockAws::new()
            .with_failing_bucket("bad")
            .with_slow_bucket("b", Duration::from_millis(50));
        let (context, sink) = context_for(aws.clone(), MockEngine::new());

        let err = AssetPublishing::new(&manifest, context, options(true, 2))
            .publish()
            .await
            .unwrap_err();

        match &err {
            PublishRunError::Aborted(failure) => assert_eq!(failure.id.to_string(), "bad:dest"),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(err.failed_ids().len(), 1);

        let uploaded = aws.uploaded_buckets();
        assert!(!uploaded.contains(&"c".to_string()));
        assert!(!uploaded.contains(&"d".to_string()));

        let lines = sink.lines();
        assert!(!lines.iter().any(|l| l == "Publishing c:dest" || l == "Publishing d:dest"));
        let summary = lines.last().unwrap();
        assert!(summary.contains("1 failed"));
        assert!(!summary.ends_with(" 0 not attempted"));
    }

    #[tokio::test]
    async fn test_parallel_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_for(&dir, &["a", "b", "c"]);
        let aws = MockAws::new();
        let (context, _sink) = context_for(aws.clone(), MockEngine::new());

        let publishing = AssetPublishing::new(&manifest, context, options(false, 3));
        publishing.cancellation_handle().cancel();
        let err = publishing.publish().await.unwrap_err();

        assert!(matches!(err, PublishRunError::Cancelled { not_attempted: 3 }));
        assert!(aws.uploads().is_empty());
    }

    /// Cancels the run as soon as the first entry starts
    struct CancelOnStart {
        handle: CancellationHandle,
    }

    impl MessageSink for CancelOnStart {
        fn message(&self, event: EventType, _text: &str) {
            if event == EventType::Start {
                self.handle.cancel();
            }
        }
    }

    #[tokio::test]
    async fn test_parallel_cancel_lets_in_flight_entry_finish() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_for(&dir, &["a", "b", "c", "d"]);
        let aws = MockAws::new().with_slow_bucket("a", Duration::from_millis(30));
        let handle = CancellationHandle::new();
        let context = Arc::new(PublishContext {
            aws: Arc::new(aws.clone()),
            engine: Arc::new(MockEngine::new()),
            sink: Arc::new(CancelOnStart {
                handle: handle.clone(),
            }),
            retry: fast_retry(),
        });

        let err = AssetPublishing::new(&manifest, context, options(false, 2))
            .with_cancellation(handle)
            .publish()
            .await
            .unwrap_err();

        assert!(matches!(err, PublishRunError::Cancelled { not_attempted: 3 }));
        assert_eq!(aws.uploaded_buckets(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_retries_transient_upload_failures() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest_for(&dir, &["a"]);
        let aws = MockAws::new().with_transient_failures(2);
        let (context, _sink) = context_for(aws.clone(), MockEngine::new());

        let summary = AssetPublishing::new(&manifest, context, PublishingOptions::default())
            .publish()
            .await
            .unwrap();

        assert_eq!(summary.published.len(), 1);
    }

    #[test]
    fn test_check_reports_dispatch_errors() {
        let dir = TempDir::new().unwrap();
        let document = json!({
            "version": CURRENT_VERSION,
            "assets": {
                "broken": { "type": "file", "source": {}, "destinations": { "d": {} } },
                "image": {
                    "type": "docker-image",
                    "source": { "directory": "." },
                    "destinations": {
                        "d": { "region": "r", "repositoryName": "repo", "imageTag": "t", "imageUri": "h/repo:t" }
                    }
                }
            }
        });
        let manifest = Manifest::parse(&dir.path().join("assets.json"), document).unwrap();
        let (context, sink) = context_for(MockAws::new(), MockEngine::new());

        let err = AssetPublishing::new(&manifest, context, PublishingOptions::default())
            .check()
            .unwrap_err();

        let failed: Vec<String> = err.failed_ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(failed, vec!["broken:d"]);
        assert_eq!(sink.lines().len(), 1);
    }

    #[test]
    fn test_default_options() {
        let options = PublishingOptions::default();
        assert!(!options.abort_on_first_error);
        assert_eq!(options.max_concurrency, 1);
    }
}
