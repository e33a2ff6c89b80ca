//! In-memory doubles for the cloud and container-engine capabilities

use crate::core::retry::{RetryManager, RetryOptions};
use crate::core::traits::{
    BuildOptions, ClientOptions, CloudOperations, ContainerEngine, ContainerRegistry, ObjectStore,
    RegistryCredentials,
};
use crate::handlers::PublishContext;
use crate::orchestration::MemorySink;
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Upload {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
}

#[derive(Default)]
struct AwsState {
    existing_objects: HashSet<String>,
    existing_images: HashSet<String>,
    failing_buckets: HashSet<String>,
    transient_failures: u32,
    upload_delay: Duration,
    bucket_delays: HashMap<String, Duration>,
    uploads: Vec<Upload>,
    client_options: Vec<ClientOptions>,
    account_lookups: usize,
    region_lookups: usize,
    in_flight: usize,
    max_in_flight: usize,
}

/// Cloud double that answers "current_account" / "current_region"
#[derive(Clone, Default)]
pub struct MockAws {
    state: Arc<Mutex<AwsState>>,
}

impl MockAws {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing_object(self, bucket: &str, key: &str) -> Self {
        self.lock().existing_objects.insert(format!("{}/{}", bucket, key));
        self
    }

    pub fn with_existing_image(self, repository: &str, tag: &str) -> Self {
        self.lock().existing_images.insert(format!("{}:{}", repository, tag));
        self
    }

    /// Uploads into `bucket` fail with a non-retryable error
    pub fn with_failing_bucket(self, bucket: &str) -> Self {
        self.lock().failing_buckets.insert(bucket.to_string());
        self
    }

    /// The next `count` uploads fail with a retryable timeout
    pub fn with_transient_failures(self, count: u32) -> Self {
        self.lock().transient_failures = count;
        self
    }

    pub fn with_upload_delay(self, delay: Duration) -> Self {
        self.lock().upload_delay = delay;
        self
    }

    /// Uploads into `bucket` take `delay` instead of the shared upload delay
    pub fn with_slow_bucket(self, bucket: &str, delay: Duration) -> Self {
        self.lock().bucket_delays.insert(bucket.to_string(), delay);
        self
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.lock().uploads.clone()
    }

    pub fn uploaded_buckets(&self) -> Vec<String> {
        self.lock().uploads.iter().map(|u| u.bucket.clone()).collect()
    }

    pub fn client_options(&self) -> Vec<ClientOptions> {
        self.lock().client_options.clone()
    }

    pub fn account_lookups(&self) -> usize {
        self.lock().account_lookups
    }

    pub fn region_lookups(&self) -> usize {
        self.lock().region_lookups
    }

    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AwsState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl CloudOperations for MockAws {
    async fn current_account(&self) -> anyhow::Result<String> {
        self.lock().account_lookups += 1;
        Ok("current_account".to_string())
    }

    async fn default_region(&self) -> anyhow::Result<String> {
        self.lock().region_lookups += 1;
        Ok("current_region".to_string())
    }

    async fn object_store(&self, options: &ClientOptions) -> anyhow::Result<Box<dyn ObjectStore>> {
        self.lock().client_options.push(options.clone());
        Ok(Box::new(self.clone()))
    }

    async fn container_registry(
        &self,
        options: &ClientOptions,
    ) -> anyhow::Result<Box<dyn ContainerRegistry>> {
        self.lock().client_options.push(options.clone());
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl ObjectStore for MockAws {
    async fn object_exists(&self, bucket: &str, key: &str) -> anyhow::Result<bool> {
        Ok(self.lock().existing_objects.contains(&format!("{}/{}", bucket, key)))
    }

    async fn upload_file(&self, bucket: &str, key: &str, file: &Path) -> anyhow::Result<()> {
        let delay = {
            let mut state = self.lock();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state
                .bucket_delays
                .get(bucket)
                .copied()
                .unwrap_or(state.upload_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.in_flight -= 1;
        if state.failing_buckets.contains(bucket) {
            return Err(anyhow!("AccessDenied: cannot write to {}", bucket));
        }
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(anyhow!("RequestTimeout: upload to {} timed out", bucket));
        }

        let body = std::fs::read(file)?;
        state.uploads.push(Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            body,
        });
        Ok(())
    }
}

#[async_trait]
impl ContainerRegistry for MockAws {
    async fn image_exists(&self, repository: &str, tag: &str) -> anyhow::Result<bool> {
        Ok(self.lock().existing_images.contains(&format!("{}:{}", repository, tag)))
    }

    async fn login_credentials(&self) -> anyhow::Result<RegistryCredentials> {
        Ok(RegistryCredentials {
            username: "user".to_string(),
            password: "pass".to_string().into(),
        })
    }
}

#[derive(Default)]
struct EngineState {
    calls: Vec<String>,
    builds: Vec<BuildOptions>,
    local_images: HashSet<String>,
    failing_pushes: u32,
}

/// Container engine double that records every call
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<EngineState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_image(self, tag: &str) -> Self {
        self.lock().local_images.insert(tag.to_string());
        self
    }

    /// The next `count` pushes fail with a retryable error
    pub fn with_failing_pushes(self, count: u32) -> Self {
        self.lock().failing_pushes = count;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn builds(&self) -> Vec<BuildOptions> {
        self.lock().builds.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn login(&self, endpoint: &str, credentials: &RegistryCredentials) -> anyhow::Result<()> {
        self.lock()
            .calls
            .push(format!("login {} {}", credentials.username, endpoint));
        Ok(())
    }

    async fn image_exists(&self, tag: &str) -> anyhow::Result<bool> {
        Ok(self.lock().local_images.contains(tag))
    }

    async fn build(&self, options: &BuildOptions) -> anyhow::Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("build {}", options.tag));
        state.builds.push(options.clone());
        state.local_images.insert(options.tag.clone());
        Ok(())
    }

    async fn tag(&self, source: &str, target: &str) -> anyhow::Result<()> {
        self.lock().calls.push(format!("tag {} {}", source, target));
        Ok(())
    }

    async fn push(&self, tag: &str) -> anyhow::Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("push {}", tag));
        if state.failing_pushes > 0 {
            state.failing_pushes -= 1;
            return Err(anyhow!("connection reset while pushing {}", tag));
        }
        Ok(())
    }
}

pub fn fast_retry() -> RetryManager {
    RetryManager::new(RetryOptions {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
    })
}

pub fn context_for(aws: MockAws, engine: MockEngine) -> (Arc<PublishContext>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let context = Arc::new(PublishContext {
        aws: Arc::new(aws),
        engine: Arc::new(engine),
        sink: sink.clone(),
        retry: fast_retry(),
    });
    (context, sink)
}

pub fn test_context_with(aws: MockAws) -> (Arc<PublishContext>, Arc<MemorySink>) {
    context_for(aws, MockEngine::new())
}

pub fn test_context() -> (Arc<PublishContext>, MockAws, MockEngine, Arc<MemorySink>) {
    let aws = MockAws::new();
    let engine = MockEngine::new();
    let (context, sink) = context_for(aws.clone(), engine.clone());
    (context, aws, engine, sink)
}
