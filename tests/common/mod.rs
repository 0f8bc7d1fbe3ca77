//! Shared fakes for the engine integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use recommendation_memory::EngineError;
use recommendation_memory::config::{BatchConfig, HistoryScope, MemoryConfig};
use recommendation_memory::domain::{
    CandidateRecommendation, MemoryRecord, NewMemoryRecord, Origin, Priority, Subject, Target,
};
use recommendation_memory::embedding::Embedder;
use recommendation_memory::engine::SubjectPipeline;
use recommendation_memory::generator::{PromptContext, RecommendationGenerator};
use recommendation_memory::persistence::{InMemoryStore, MemoryStore};
use recommendation_memory::retry::RetryPolicy;

pub const DIMENSIONS: usize = 64;

/// 09:00 UTC on the given day of March 2026.
pub fn day(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, n, 9, 0, 0).unwrap()
}

pub fn target(id: &str) -> Target {
    Target {
        target_id: id.to_string(),
        name: format!("Client {id}"),
        monthly_sales: 1_000.0,
        metrics: None,
        open_claims: 0,
        pickups: None,
    }
}

pub fn subject(id: &str, targets: &[&str]) -> Subject {
    Subject {
        subject_id: id.to_string(),
        name: format!("Seller {id}"),
        email: None,
        targets: targets.iter().map(|t| target(t)).collect(),
        sales_context: serde_json::Value::Null,
    }
}

pub fn memory_settings(cooldown_days: i64) -> MemoryConfig {
    MemoryConfig {
        enabled: true,
        similarity_threshold: 0.85,
        cooldown_days,
        prefilter_days: None,
        required_count: 3,
        history_limit: 5,
        history_scope: HistoryScope::PerTarget,
    }
}

pub fn batch_settings(group_size: usize, parallel_enabled: bool) -> BatchConfig {
    BatchConfig {
        group_size,
        max_concurrent_groups: 4,
        parallel_enabled,
        group_timeout_secs: 300,
    }
}

pub fn pipeline(
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn RecommendationGenerator>,
    settings: MemoryConfig,
) -> SubjectPipeline {
    SubjectPipeline::new(store, embedder, generator, settings, RetryPolicy::none())
}

pub fn memory_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new())
}

/// Gives every distinct text its own axis, so equal texts score 1.0 and
/// different texts score 0.0.
#[derive(Debug, Default)]
pub struct AxisEmbedder {
    axes: Mutex<HashMap<String, usize>>,
}

impl AxisEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut axes = self.axes.lock().unwrap();
        let next = axes.len();
        let axis = *axes.entry(text.to_string()).or_insert(next) % DIMENSIONS;
        let mut v = vec![0.0; DIMENSIONS];
        v[axis] = 1.0;
        v
    }
}

#[async_trait]
impl Embedder for AxisEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

/// Fails every call.
#[derive(Debug, Default)]
pub struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        Err(EngineError::EmbeddingFailure("provider returned 503".into()))
    }
}

/// Refuses batches of more than one text and any text mentioning `refused`;
/// everything else is embedded like [`AxisEmbedder`].
#[derive(Debug)]
pub struct PickyEmbedder {
    inner: AxisEmbedder,
    refused: String,
}

impl PickyEmbedder {
    pub fn refusing(refused: &str) -> Self {
        Self {
            inner: AxisEmbedder::new(),
            refused: refused.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for PickyEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        if texts.len() > 1 {
            return Err(EngineError::EmbeddingFailure("batch too large".into()));
        }
        if texts.iter().any(|t| t.contains(&self.refused)) {
            return Err(EngineError::EmbeddingFailure("input rejected".into()));
        }
        self.inner.embed_batch(texts).await
    }
}

/// How [`ScriptedGenerator`] misbehaves, if at all.
#[derive(Debug, Clone, Default)]
pub enum Script {
    /// Recommend the first `expected_count` eligible targets.
    #[default]
    FirstEligible,
    /// Return one candidate fewer than asked.
    ShortByOne,
    /// Replace the last candidate with a target outside the pool.
    OutOfPool,
}

/// Deterministic generator: one candidate per eligible target, in pool order.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    pub script: Script,
    /// Subjects for which generation fails outright.
    pub failing_subjects: HashSet<String>,
    /// Subjects whose generation sleeps before answering.
    pub slow_subjects: HashMap<String, Duration>,
    /// Appended to every action, to produce different advice for the same target.
    pub variant: Mutex<String>,
    pub calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: Script) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    pub fn failing(ids: &[&str]) -> Self {
        Self {
            failing_subjects: ids.iter().map(|s| (*s).to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn slow(id: &str, delay: Duration) -> Self {
        Self {
            slow_subjects: HashMap::from([(id.to_string(), delay)]),
            ..Self::default()
        }
    }

    pub fn set_variant(&self, variant: &str) {
        *self.variant.lock().unwrap() = variant.to_string();
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn candidate(&self, subject: &Subject, target_id: &str, name: &str) -> CandidateRecommendation {
        let variant = self.variant.lock().unwrap().clone();
        CandidateRecommendation {
            subject_id: subject.subject_id.clone(),
            target_id: target_id.to_string(),
            target_name: name.to_string(),
            priority: Priority::High,
            action: format!("Visit {name}{variant}"),
            justification: "Orders fell below the usual level".into(),
            origin: Origin::RiskAnalysis,
        }
    }
}

#[async_trait]
impl RecommendationGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        subject: &Subject,
        eligible: &[Target],
        context: &PromptContext,
    ) -> Result<Vec<CandidateRecommendation>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.slow_subjects.get(&subject.subject_id) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_subjects.contains(&subject.subject_id) {
            return Err(EngineError::GeneratorFailure("connection reset".into()));
        }

        let mut out: Vec<CandidateRecommendation> = eligible
            .iter()
            .take(context.expected_count)
            .map(|t| self.candidate(subject, &t.target_id, &t.name))
            .collect();

        match self.script {
            Script::FirstEligible => {}
            Script::ShortByOne => {
                out.pop();
            }
            Script::OutOfPool => {
                out.pop();
                out.push(self.candidate(subject, "Z", "Client Z"));
            }
        }
        Ok(out)
    }
}

/// Wraps a store and injects failures into it.
#[derive(Debug)]
pub struct FlakyStore {
    inner: InMemoryStore,
    /// The first inserts that fail before any succeeds.
    insert_failures: AtomicUsize,
    /// Inserts beyond this many successful ones fail.
    healthy_inserts: Option<usize>,
    /// The insert attempt (1-based) that hangs instead of answering.
    stall_on_insert: Option<usize>,
    history_down: bool,
    pub insert_attempts: AtomicUsize,
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self {
            inner: InMemoryStore::new(),
            insert_failures: AtomicUsize::new(0),
            healthy_inserts: None,
            stall_on_insert: None,
            history_down: false,
            insert_attempts: AtomicUsize::new(0),
        }
    }
}

impl FlakyStore {
    pub fn failing_inserts(count: usize) -> Self {
        Self {
            insert_failures: AtomicUsize::new(count),
            ..Self::default()
        }
    }

    pub fn inserts_fail_after(healthy: usize) -> Self {
        Self {
            healthy_inserts: Some(healthy),
            ..Self::default()
        }
    }

    pub fn stalls_on_insert(attempt: usize) -> Self {
        Self {
            stall_on_insert: Some(attempt),
            ..Self::default()
        }
    }

    pub fn history_down() -> Self {
        Self {
            history_down: true,
            ..Self::default()
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl MemoryStore for FlakyStore {
    async fn insert(&self, record: NewMemoryRecord) -> Result<MemoryRecord, EngineError> {
        let attempt = self.insert_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.stall_on_insert == Some(attempt) {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
        }
        let remaining = self.insert_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.insert_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(EngineError::StoreUnavailable("connection refused".into()));
        }
        let current_len = self.inner.len().await;
        if self
            .healthy_inserts
            .is_some_and(|healthy| current_len >= healthy)
        {
            return Err(EngineError::StoreUnavailable("connection refused".into()));
        }
        self.inner.insert(record).await
    }

    async fn history(
        &self,
        subject_id: &str,
        target_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, EngineError> {
        if self.history_down {
            return Err(EngineError::StoreUnavailable("connection refused".into()));
        }
        self.inner.history(subject_id, target_id, limit).await
    }

    async fn count_recent_by_target(
        &self,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<HashMap<String, usize>, EngineError> {
        self.inner.count_recent_by_target(subject_id, since).await
    }

    async fn delete_oldest(&self, subject_id: &str, count: usize) -> Result<usize, EngineError> {
        self.inner.delete_oldest(subject_id, count).await
    }

    async fn delete_all(&self, subject_id: &str) -> Result<usize, EngineError> {
        self.inner.delete_all(subject_id).await
    }
}

/// Target ids accepted for a subject, in candidate order.
pub fn accepted_targets(result: &recommendation_memory::domain::SubjectResult) -> Vec<String> {
    result
        .accepted
        .iter()
        .map(|a| a.candidate.target_id.clone())
        .collect()
}
