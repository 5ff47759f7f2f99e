//! Application state wiring all services together.
//!
//! AppState holds the concrete repositories and adapters used by the CLI
//! commands. Core services are generic over repository traits; AppState pins
//! them to the SQLite implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use campflow_core::campaign::build_campaign_graph;
use campflow_core::campaign::routes::RouteTable;
use campflow_core::campaign::services::CampaignServices;
use campflow_core::external::analyzer::ArtifactAnalyzer;
use campflow_core::external::blob::BlobStore;
use campflow_core::external::box_generator::BoxGenerator;
use campflow_core::workflow::checkpoint::CheckpointTracker;
use campflow_core::workflow::executor::Scheduler;
use campflow_core::workflow::progress::ProgressReporter;
use campflow_infra::analyzer::TabularAnalyzer;
use campflow_infra::blob::LocalBlobStore;
use campflow_infra::config::{load_engine_config, resolve_data_dir};
use campflow_infra::http::{HttpGenerator, HttpPublisher};
use campflow_infra::sqlite::artifact_cache::SqliteArtifactCache;
use campflow_infra::sqlite::pool::{DatabasePool, database_url};
use campflow_infra::sqlite::project::SqliteProjectRepository;
use campflow_infra::sqlite::session::SqliteSessionRepository;
use campflow_types::config::EngineConfig;

/// Concrete type aliases for the engine generics pinned to infra implementations.
pub type ConcreteServices = CampaignServices<SqliteProjectRepository, SqliteArtifactCache>;

pub type ConcreteScheduler = Scheduler<SqliteProjectRepository, SqliteSessionRepository>;

/// Shared application state holding all repositories and adapters.
#[derive(Clone)]
pub struct AppState {
    pub projects: Arc<SqliteProjectRepository>,
    pub sessions: Arc<SqliteSessionRepository>,
    pub cache_store: Arc<SqliteArtifactCache>,
    pub blobs: Arc<dyn BlobStore>,
    pub analyzer: Arc<dyn ArtifactAnalyzer>,
    pub config: EngineConfig,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: load config, connect to the DB, wire repositories.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let config = load_engine_config(&data_dir).await;

        let db_url = format!("{}?mode=rwc", database_url(&data_dir));
        let db_pool = DatabasePool::new(&db_url)
            .await
            .context("failed to open the campflow database")?;

        Ok(Self {
            projects: Arc::new(SqliteProjectRepository::new(db_pool.clone())),
            sessions: Arc::new(SqliteSessionRepository::new(db_pool.clone())),
            cache_store: Arc::new(SqliteArtifactCache::new(db_pool.clone())),
            blobs: Arc::new(LocalBlobStore::new(data_dir.join("blobs"))),
            analyzer: Arc::new(TabularAnalyzer::new()),
            config,
            data_dir,
            db_pool,
        })
    }

    /// Campaign services for one run, reporting through `reporter`.
    ///
    /// Requires `generator.endpoint` in `config.toml`. The publisher is
    /// attached only when `publisher.endpoint` is set.
    pub fn services(&self, reporter: Arc<dyn ProgressReporter>) -> anyhow::Result<ConcreteServices> {
        let timeout = self.config.call_timeout();
        let generator = HttpGenerator::from_settings(&self.config.generator, timeout)?;

        let mut services = CampaignServices::new(
            &self.config,
            Arc::clone(&self.projects),
            Arc::clone(&self.cache_store),
            BoxGenerator::new(generator),
            Arc::clone(&self.analyzer),
            Arc::clone(&self.blobs),
            reporter,
        );
        if let Some(publisher) = HttpPublisher::from_settings(&self.config.publisher, timeout)? {
            services = services.with_publisher(Arc::new(publisher));
        }
        Ok(services)
    }

    /// Scheduler over the campaign graph with checkpointing into SQLite.
    pub fn scheduler(&self, reporter: Arc<dyn ProgressReporter>) -> anyhow::Result<ConcreteScheduler> {
        let services = Arc::new(self.services(Arc::clone(&reporter))?);
        let routes = RouteTable::from_config(self.config.routes.as_ref())?;
        let graph = build_campaign_graph(services, routes)?;
        let tracker = CheckpointTracker::new(
            Arc::clone(&self.projects),
            Arc::clone(&self.sessions),
            reporter,
        );
        Ok(Scheduler::new(Arc::new(graph), Arc::new(tracker)).with_max_steps(self.config.max_steps))
    }
}
