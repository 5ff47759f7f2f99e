//! In-memory stores and scripted collaborators shared by the unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use campflow_types::cache::{ArtifactMetadata, CacheRecord, CacheUpdate};
use campflow_types::config::{EngineConfig, RetrySettings};
use campflow_types::error::{CallError, RepositoryError};
use campflow_types::project::{
    ConcurrencyToken, KNOWLEDGE_FACTS, NewProject, ProjectRecord, ProjectSnapshot,
    SchemaCapabilities, SessionRecord, SessionStatus, StepCycle, VersionedCollection,
};
use campflow_types::workflow::{Decision, FlowCheckpoint, Phase, UploadedArtifact, WorkflowState};
use chrono::Utc;
use futures_util::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::campaign::services::CampaignServices;
use crate::external::analyzer::{AnalyzedArtifact, ArtifactAnalyzer};
use crate::external::blob::BlobStore;
use crate::external::box_generator::BoxGenerator;
use crate::external::generator::{GenerationRequest, GenerationTask, Generator};
use crate::external::lookup::Lookup;
use crate::external::publisher::CampaignPublisher;
use crate::repository::artifact_cache::ArtifactCacheStore;
use crate::repository::project::ProjectRepository;
use crate::repository::session::SessionRepository;
use crate::workflow::progress::{LogLevel, ProgressReporter, StepSummary};
use crate::workflow::retry::RateLimitBackoff;

// ---------------------------------------------------------------------------
// MemoryProjectRepository
// ---------------------------------------------------------------------------

pub struct MemoryProjectRepository {
    projects: Mutex<HashMap<Uuid, ProjectRecord>>,
    schema: SchemaCapabilities,
    advertised: SchemaCapabilities,
    atomic_append: bool,
    yield_on_read: bool,
    always_conflict: bool,
    failing_saves: bool,
    cas_calls: AtomicU32,
    save_count: AtomicU32,
}

impl MemoryProjectRepository {
    pub fn new() -> Self {
        Self {
            projects: Mutex::new(HashMap::new()),
            schema: SchemaCapabilities::all(),
            advertised: SchemaCapabilities::all(),
            atomic_append: true,
            yield_on_read: false,
            always_conflict: false,
            failing_saves: false,
            cas_calls: AtomicU32::new(0),
            save_count: AtomicU32::new(0),
        }
    }

    pub fn without_atomic_append(mut self) -> Self {
        self.atomic_append = false;
        self
    }

    /// Yield to the runtime between reading a collection and returning it.
    pub fn yield_on_read(mut self) -> Self {
        self.yield_on_read = true;
        self
    }

    /// Every compare-and-swap reports a conflict.
    pub fn always_conflict(mut self) -> Self {
        self.always_conflict = true;
        self
    }

    pub fn failing_saves(mut self) -> Self {
        self.failing_saves = true;
        self
    }

    /// Real and advertised schema.
    pub fn with_schema(mut self, capabilities: SchemaCapabilities) -> Self {
        self.schema = capabilities.clone();
        self.advertised = capabilities;
        self
    }

    /// Advertised schema only; writes are still checked against the real one.
    pub fn advertising(mut self, capabilities: SchemaCapabilities) -> Self {
        self.advertised = capabilities;
        self
    }

    pub fn cas_calls(&self) -> u32 {
        self.cas_calls.load(Ordering::SeqCst)
    }

    /// Every save attempt, successful or not.
    pub fn save_count(&self) -> u32 {
        self.save_count.load(Ordering::SeqCst)
    }

    /// Overwrite a stored record, e.g. to simulate another process.
    pub fn put(&self, record: ProjectRecord) {
        self.projects.lock().unwrap().insert(record.id, record);
    }
}

impl Default for MemoryProjectRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectRepository for MemoryProjectRepository {
    async fn load(&self, id: &Uuid) -> Result<Option<ProjectRecord>, RepositoryError> {
        Ok(self.projects.lock().unwrap().get(id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ProjectRecord>, RepositoryError> {
        Ok(self
            .projects
            .lock()
            .unwrap()
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn create(&self, project: &NewProject) -> Result<ProjectRecord, RepositoryError> {
        let mut projects = self.projects.lock().unwrap();
        if projects.values().any(|p| p.name == project.name) {
            return Err(RepositoryError::Conflict(format!(
                "project '{}' already exists",
                project.name
            )));
        }
        let now = Utc::now();
        let record = ProjectRecord {
            id: Uuid::now_v7(),
            name: project.name.clone(),
            user_id: project.user_id.clone(),
            product_description: project.product_description.clone(),
            target_budget: project.target_budget,
            phase: Phase::Initialized,
            iteration: 0,
            session_count: 0,
            checkpoint: FlowCheckpoint::default(),
            payload: BTreeMap::new(),
            knowledge_facts: None,
            errors: Vec::new(),
            collections: BTreeMap::new(),
            collections_version: ConcurrencyToken::default(),
            created_at: now,
            updated_at: now,
        };
        projects.insert(record.id, record.clone());
        Ok(record)
    }

    async fn save(&self, snapshot: &ProjectSnapshot) -> Result<(), RepositoryError> {
        self.save_count.fetch_add(1, Ordering::SeqCst);
        if self.failing_saves {
            return Err(RepositoryError::Query("disk full".into()));
        }
        if snapshot.knowledge_facts.is_some() && !self.schema.supports(KNOWLEDGE_FACTS) {
            return Err(RepositoryError::UnknownColumn(KNOWLEDGE_FACTS.into()));
        }
        let mut projects = self.projects.lock().unwrap();
        let record = projects.get_mut(&snapshot.id).ok_or(RepositoryError::NotFound)?;
        record.phase = snapshot.phase;
        record.iteration = snapshot.iteration;
        record.session_count = snapshot.session_count;
        record.checkpoint = snapshot.checkpoint.clone();
        record.payload = snapshot.payload.clone();
        if snapshot.knowledge_facts.is_some() {
            record.knowledge_facts = snapshot.knowledge_facts.clone();
        }
        record.errors = snapshot.errors.clone();
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn schema_capabilities(&self) -> Result<SchemaCapabilities, RepositoryError> {
        Ok(self.advertised.clone())
    }

    async fn read_collection(
        &self,
        id: &Uuid,
        field: &str,
    ) -> Result<VersionedCollection, RepositoryError> {
        let snapshot = {
            let projects = self.projects.lock().unwrap();
            let record = projects.get(id).ok_or(RepositoryError::NotFound)?;
            VersionedCollection {
                items: record.collections.get(field).cloned().unwrap_or_default(),
                version: record.collections_version,
            }
        };
        if self.yield_on_read {
            tokio::task::yield_now().await;
        }
        Ok(snapshot)
    }

    async fn compare_and_swap_collection(
        &self,
        id: &Uuid,
        field: &str,
        items: &[Value],
        expected: ConcurrencyToken,
    ) -> Result<ConcurrencyToken, RepositoryError> {
        self.cas_calls.fetch_add(1, Ordering::SeqCst);
        let mut projects = self.projects.lock().unwrap();
        let record = projects.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if self.always_conflict || record.collections_version != expected {
            return Err(RepositoryError::ConcurrencyConflict {
                entity_id: *id,
                field: field.to_string(),
                expected: expected.0,
            });
        }
        record.collections.insert(field.to_string(), items.to_vec());
        record.collections_version = record.collections_version.next();
        Ok(record.collections_version)
    }

    async fn atomic_append(
        &self,
        id: &Uuid,
        field: &str,
        item: &Value,
    ) -> Result<Option<ConcurrencyToken>, RepositoryError> {
        if !self.atomic_append {
            return Ok(None);
        }
        let mut projects = self.projects.lock().unwrap();
        let record = projects.get_mut(id).ok_or(RepositoryError::NotFound)?;
        record
            .collections
            .entry(field.to_string())
            .or_default()
            .push(item.clone());
        record.collections_version = record.collections_version.next();
        Ok(Some(record.collections_version))
    }
}

// ---------------------------------------------------------------------------
// MemorySessionRepository
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: Mutex<Vec<SessionRecord>>,
    cycles: Mutex<Vec<StepCycle>>,
}

impl SessionRepository for MemorySessionRepository {
    async fn create_session(&self, session: &SessionRecord) -> Result<(), RepositoryError> {
        self.sessions.lock().unwrap().push(session.clone());
        Ok(())
    }

    async fn complete_session(
        &self,
        id: &Uuid,
        status: SessionStatus,
        decision: Option<Decision>,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .iter_mut()
            .find(|s| s.id == *id)
            .ok_or(RepositoryError::NotFound)?;
        session.status = status;
        session.decision = decision;
        session.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn get_session(&self, id: &Uuid) -> Result<Option<SessionRecord>, RepositoryError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == *id)
            .cloned())
    }

    async fn list_sessions(
        &self,
        project_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, RepositoryError> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .iter()
            .rev()
            .filter(|s| s.project_id == *project_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn log_cycle(&self, cycle: &StepCycle) -> Result<(), RepositoryError> {
        self.cycles.lock().unwrap().push(cycle.clone());
        Ok(())
    }

    async fn list_cycles(&self, session_id: &Uuid) -> Result<Vec<StepCycle>, RepositoryError> {
        Ok(self
            .cycles
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.session_id == *session_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryArtifactCache
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryArtifactCache {
    records: Mutex<HashMap<(Uuid, String), CacheRecord>>,
}

impl MemoryArtifactCache {
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl ArtifactCacheStore for MemoryArtifactCache {
    async fn get_cache_record(
        &self,
        project_id: &Uuid,
        artifact_key: &str,
    ) -> Result<Option<CacheRecord>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(*project_id, artifact_key.to_string()))
            .cloned())
    }

    async fn upsert_cache_record(
        &self,
        project_id: &Uuid,
        artifact_key: &str,
        update: &CacheUpdate,
    ) -> Result<CacheRecord, RepositoryError> {
        let now = Utc::now();
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry((*project_id, artifact_key.to_string()))
            .or_insert_with(|| CacheRecord {
                project_id: *project_id,
                artifact_key: artifact_key.to_string(),
                original_filename: String::new(),
                artifact_type: None,
                metadata: None,
                cached_result: None,
                last_computed_at: None,
                created_at: now,
                updated_at: now,
            });
        if let Some(name) = &update.original_filename {
            record.original_filename = name.clone();
        }
        if let Some(artifact_type) = &update.artifact_type {
            record.artifact_type = Some(artifact_type.clone());
        }
        if let Some(metadata) = &update.metadata {
            record.metadata = Some(metadata.clone());
        }
        if let Some(result) = &update.cached_result {
            record.cached_result = Some(result.clone());
            record.last_computed_at = Some(now);
        }
        record.updated_at = now;
        Ok(record.clone())
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Records every event as a compact string.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ProgressReporter for RecordingReporter {
    fn step_start(&self, step: &str) {
        self.push(format!("step_start:{step}"));
    }

    fn step_end(&self, step: &str, summary: &StepSummary) {
        let outcome = if summary.success { "ok" } else { "failed" };
        self.push(format!("step_end:{step}:{outcome}"));
    }

    fn call_start(&self, label: &str, _preview: &str) {
        self.push(format!("call_start:{label}"));
    }

    fn call_end(&self, label: &str, _duration: Duration, preview: &str) {
        self.push(format!("call_end:{label}:{preview}"));
    }

    fn log(&self, message: &str, level: LogLevel) {
        let level = match level {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        self.push(format!("log:{level}:{message}"));
    }
}

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Script {
    responses: HashMap<GenerationTask, Value>,
    failures: HashMap<GenerationTask, VecDeque<CallError>>,
    requests: Vec<GenerationRequest>,
}

/// Answers each task with a fixed response; queued failures come first.
///
/// Clones share the script, so a test can keep a handle after boxing one.
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<Script>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, task: GenerationTask, response: Value) -> Self {
        self.script.lock().unwrap().responses.insert(task, response);
        self
    }

    pub fn fail_next(self, task: GenerationTask, error: CallError) -> Self {
        self.script
            .lock()
            .unwrap()
            .failures
            .entry(task)
            .or_default()
            .push_back(error);
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn calls(&self, task: GenerationTask) -> usize {
        self.script
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.task == task)
            .count()
    }
}

impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Value, CallError> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(request.clone());
        if let Some(error) = script
            .failures
            .get_mut(&request.task)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        script
            .responses
            .get(&request.task)
            .cloned()
            .ok_or_else(|| CallError::Malformed(format!("no scripted response for {:?}", request.task)))
    }
}

// ---------------------------------------------------------------------------
// MemoryBlobStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    downloads: AtomicU32,
}

impl MemoryBlobStore {
    pub fn insert(&self, storage_path: &str, bytes: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(storage_path.to_string(), bytes.to_vec());
    }

    pub fn downloads(&self) -> u32 {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl BlobStore for MemoryBlobStore {
    fn upload<'a>(
        &'a self,
        project_id: &'a str,
        file_name: &'a str,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<String, CallError>> {
        Box::pin(async move {
            let path = format!("projects/{project_id}/{file_name}");
            self.blobs.lock().unwrap().insert(path.clone(), bytes.to_vec());
            Ok(path)
        })
    }

    fn download<'a>(&'a self, storage_path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, CallError>> {
        Box::pin(async move {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            self.blobs
                .lock()
                .unwrap()
                .get(storage_path)
                .cloned()
                .ok_or_else(|| CallError::Other(format!("no blob at {storage_path}")))
        })
    }
}

// ---------------------------------------------------------------------------
// KeyedAnalyzer
// ---------------------------------------------------------------------------

/// Returns a prepared analysis per file name and counts invocations.
#[derive(Default)]
pub struct KeyedAnalyzer {
    results: Mutex<HashMap<String, AnalyzedArtifact>>,
    calls: AtomicU32,
}

impl KeyedAnalyzer {
    pub fn insert(&self, file_name: &str, analyzed: AnalyzedArtifact) {
        self.results
            .lock()
            .unwrap()
            .insert(file_name.to_string(), analyzed);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ArtifactAnalyzer for KeyedAnalyzer {
    fn analyze(&self, file_name: &str, _bytes: &[u8]) -> Result<AnalyzedArtifact, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .unwrap()
            .get(file_name)
            .cloned()
            .ok_or_else(|| CallError::Malformed(format!("cannot parse {file_name}")))
    }
}

// ---------------------------------------------------------------------------
// StaticLookup
// ---------------------------------------------------------------------------

pub struct StaticLookup {
    name: String,
    results: Result<Vec<Value>, CallError>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl StaticLookup {
    pub fn ok(name: &str, results: Vec<Value>) -> Self {
        Self {
            name: name.to_string(),
            results: Ok(results),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str, error: CallError) -> Self {
        Self {
            name: name.to_string(),
            results: Err(error),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

impl Lookup for StaticLookup {
    fn name(&self) -> &str {
        &self.name
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        max_results: usize,
    ) -> BoxFuture<'a, Result<Vec<Value>, CallError>> {
        Box::pin(async move {
            self.queries
                .lock()
                .unwrap()
                .push((query.to_string(), max_results));
            self.results
                .clone()
                .map(|items| items.into_iter().take(max_results).collect())
        })
    }
}

// ---------------------------------------------------------------------------
// ThrottledPublisher
// ---------------------------------------------------------------------------

/// Reports `RateLimited` for the first `throttled` calls, then succeeds.
pub struct ThrottledPublisher {
    throttled: AtomicU32,
    published: Mutex<Vec<Value>>,
    broken: AtomicBool,
}

impl ThrottledPublisher {
    pub fn new(throttled: u32) -> Self {
        Self {
            throttled: AtomicU32::new(throttled),
            published: Mutex::new(Vec::new()),
            broken: AtomicBool::new(false),
        }
    }

    /// Every call fails with a non-retryable error.
    pub fn broken() -> Self {
        let publisher = Self::new(0);
        publisher.broken.store(true, Ordering::SeqCst);
        publisher
    }

    pub fn published(&self) -> Vec<Value> {
        self.published.lock().unwrap().clone()
    }
}

impl CampaignPublisher for ThrottledPublisher {
    fn name(&self) -> &str {
        "throttled"
    }

    fn publish<'a>(&'a self, config: &'a Value) -> BoxFuture<'a, Result<Value, CallError>> {
        Box::pin(async move {
            if self.broken.load(Ordering::SeqCst) {
                return Err(CallError::InvalidConfig("account suspended".into()));
            }
            let remaining = self.throttled.load(Ordering::SeqCst);
            if remaining > 0 {
                self.throttled.store(remaining - 1, Ordering::SeqCst);
                return Err(CallError::RateLimited { retry_after_ms: None });
            }
            self.published.lock().unwrap().push(config.clone());
            Ok(serde_json::json!({ "campaign_id": "cmp-1" }))
        })
    }
}

// ---------------------------------------------------------------------------
// CampaignFixture
// ---------------------------------------------------------------------------

pub type MemoryServices = CampaignServices<MemoryProjectRepository, MemoryArtifactCache>;

/// In-memory collaborators for campaign step tests.
pub struct CampaignFixture {
    pub projects: Arc<MemoryProjectRepository>,
    pub cache_store: Arc<MemoryArtifactCache>,
    pub generator: ScriptedGenerator,
    pub blobs: Arc<MemoryBlobStore>,
    pub analyzer: Arc<KeyedAnalyzer>,
    pub reporter: Arc<RecordingReporter>,
    pub lookup: Option<Arc<StaticLookup>>,
    pub publisher: Option<Arc<ThrottledPublisher>>,
}

impl CampaignFixture {
    pub fn new(generator: ScriptedGenerator) -> Self {
        Self::with_projects(generator, MemoryProjectRepository::new())
    }

    pub fn with_projects(generator: ScriptedGenerator, projects: MemoryProjectRepository) -> Self {
        Self {
            projects: Arc::new(projects),
            cache_store: Arc::new(MemoryArtifactCache::default()),
            generator,
            blobs: Arc::new(MemoryBlobStore::default()),
            analyzer: Arc::new(KeyedAnalyzer::default()),
            reporter: Arc::new(RecordingReporter::default()),
            lookup: None,
            publisher: None,
        }
    }

    /// Register an uploadable artifact with the analysis it produces.
    pub fn artifact(&self, file_name: &str, analyzed: AnalyzedArtifact) -> UploadedArtifact {
        let storage_path = format!("projects/test/{file_name}");
        self.blobs.insert(&storage_path, b"raw");
        self.analyzer.insert(file_name, analyzed);
        UploadedArtifact {
            storage_path,
            original_filename: file_name.to_string(),
        }
    }

    /// Fast retries, no real backoff.
    pub fn config() -> EngineConfig {
        EngineConfig {
            retry: RetrySettings {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 2,
            },
            ..Default::default()
        }
    }

    pub fn services(&self) -> Arc<MemoryServices> {
        let mut services = CampaignServices::new(
            &Self::config(),
            Arc::clone(&self.projects),
            Arc::clone(&self.cache_store),
            BoxGenerator::new(self.generator.clone()),
            self.analyzer.clone() as Arc<dyn ArtifactAnalyzer>,
            self.blobs.clone() as Arc<dyn BlobStore>,
            self.reporter.clone() as Arc<dyn ProgressReporter>,
        )
        .with_rate_limit(RateLimitBackoff {
            max_retries: 5,
            unit: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
        });
        if let Some(lookup) = &self.lookup {
            services = services.with_lookup(lookup.clone() as Arc<dyn Lookup>);
        }
        if let Some(publisher) = &self.publisher {
            services = services.with_publisher(publisher.clone() as Arc<dyn CampaignPublisher>);
        }
        Arc::new(services)
    }

    /// Create a project and a state hydrated from it.
    pub async fn state(&self, files: Vec<UploadedArtifact>) -> WorkflowState {
        let record = self
            .projects
            .create(&NewProject {
                name: format!("campaign-{}", Uuid::now_v7()),
                user_id: None,
                product_description: Some("trail running shoes".into()),
                target_budget: Some(5000.0),
            })
            .await
            .unwrap();
        let mut state = WorkflowState::new(record.id, files);
        state.hydrate(&record);
        state
    }
}

/// An analyzed artifact of `artifact_type` with `rows`.
pub fn analyzed(artifact_type: &str, rows: Vec<Value>) -> AnalyzedArtifact {
    let columns = rows
        .first()
        .and_then(Value::as_object)
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();
    AnalyzedArtifact {
        artifact_type: artifact_type.to_string(),
        metadata: ArtifactMetadata {
            row_count: rows.len() as u64,
            columns,
            metrics: serde_json::json!({}),
        },
        rows,
    }
}
