//! Collaborators shared by every campaign step.
//!
//! Constructed once at startup and handed to the steps behind an `Arc`; no
//! step reaches for a global client.

use std::sync::Arc;
use std::time::Duration;

use campflow_types::config::EngineConfig;
use campflow_types::error::CallError;
use serde_json::Value;

use crate::external::analyzer::ArtifactAnalyzer;
use crate::external::blob::BlobStore;
use crate::external::box_generator::BoxGenerator;
use crate::external::generator::GenerationRequest;
use crate::external::lookup::Lookup;
use crate::external::publisher::CampaignPublisher;
use crate::repository::artifact_cache::ArtifactCacheStore;
use crate::repository::project::ProjectRepository;
use crate::workflow::cache::ArtifactCache;
use crate::workflow::concurrency::CollectionGuard;
use crate::workflow::progress::{ProgressReporter, timed_call};
use crate::workflow::retry::{RateLimitBackoff, RetryPolicy, call_with_timeout, retry_call};
use crate::workflow::step::StepError;

/// Characters of an instruction shown in progress output.
const PREVIEW_CHARS: usize = 80;

/// Everything a campaign step may call out to.
pub struct CampaignServices<P: ProjectRepository, C: ArtifactCacheStore> {
    pub projects: Arc<P>,
    pub generator: Arc<BoxGenerator>,
    pub analyzer: Arc<dyn ArtifactAnalyzer>,
    pub blobs: Arc<dyn BlobStore>,
    /// Search backend for discovery. Discovery skips its search strategy without one.
    pub lookup: Option<Arc<dyn Lookup>>,
    /// Ads platform. Campaign configs stay local without one.
    pub publisher: Option<Arc<dyn CampaignPublisher>>,
    pub cache: ArtifactCache<C>,
    pub guard: CollectionGuard<P>,
    pub reporter: Arc<dyn ProgressReporter>,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitBackoff,
    pub call_timeout: Duration,
    pub fan_out_workers: usize,
}

impl<P: ProjectRepository, C: ArtifactCacheStore> CampaignServices<P, C> {
    /// Assemble services from the required collaborators and engine config.
    ///
    /// Optional collaborators start unset; see [`with_lookup`](Self::with_lookup)
    /// and [`with_publisher`](Self::with_publisher).
    pub fn new(
        config: &EngineConfig,
        projects: Arc<P>,
        cache_store: Arc<C>,
        generator: BoxGenerator,
        analyzer: Arc<dyn ArtifactAnalyzer>,
        blobs: Arc<dyn BlobStore>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        let retry = RetryPolicy::from_settings(&config.retry);
        Self {
            guard: CollectionGuard::new(Arc::clone(&projects), retry.clone(), config.atomic_append),
            projects,
            generator: Arc::new(generator),
            analyzer,
            blobs,
            lookup: None,
            publisher: None,
            cache: ArtifactCache::new(cache_store),
            reporter,
            retry,
            rate_limit: RateLimitBackoff::default(),
            call_timeout: config.call_timeout(),
            fan_out_workers: config.fan_out_workers,
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn Lookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn CampaignPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitBackoff) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Generation call with timeout, retry and progress reporting.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Value, StepError> {
        let label = request.task.label();
        let preview = request.preview(PREVIEW_CHARS);
        let generator = &self.generator;
        let timeout = self.call_timeout;

        let value = timed_call(
            self.reporter.as_ref(),
            label,
            &preview,
            retry_call(&self.retry, label, |_attempt| {
                call_with_timeout(timeout, generator.generate(request))
            }),
        )
        .await?;
        Ok(value)
    }

    /// Download an artifact with timeout and retry.
    pub async fn download(&self, storage_path: &str) -> Result<Vec<u8>, StepError> {
        let blobs = &self.blobs;
        let timeout = self.call_timeout;
        let bytes = retry_call(&self.retry, "download", |_attempt| {
            call_with_timeout(timeout, blobs.download(storage_path))
        })
        .await?;
        Ok(bytes)
    }

    /// Publish a campaign config, backing off on rate limits.
    ///
    /// Returns `Ok(None)` when no publisher is configured.
    pub async fn publish(&self, config: &Value) -> Result<Option<Value>, CallError> {
        let Some(publisher) = &self.publisher else {
            return Ok(None);
        };
        let timeout = self.call_timeout;
        let label = format!("publish via {}", publisher.name());
        let result = timed_call(
            self.reporter.as_ref(),
            &label,
            "",
            self.rate_limit
                .run(&label, || call_with_timeout(timeout, publisher.publish(config))),
        )
        .await?;
        Ok(Some(result))
    }
}
