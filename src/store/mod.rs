//! Persistence seam for the progression engine.
//!
//! [`TrackStore`] is the only trait touching persistent state; everything the
//! engine reads or writes goes through it. [`ProgressAdapter`] layers the
//! merge-safe update contract on top: structural merge of patches plus an
//! optimistic-concurrency retry loop, so two writers racing on the same
//! `(learner, module)` document both survive regardless of arrival order.

pub mod memory;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::progression::error::ProgressionError;
use crate::progression::types::{
    Learner, Lesson, Module, ModuleProgress, ProgressPatch, QuizAttempt, StarLevel, Submission,
    SubmissionKind, Tier,
};

pub use memory::MemoryStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("version conflict")]
    Conflict,
    #[error("store backend: {0}")]
    Backend(String),
}

impl From<StoreError> for ProgressionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => ProgressionError::Conflict("concurrent write".to_string()),
            StoreError::Backend(msg) => ProgressionError::Internal(msg),
        }
    }
}

/// A document together with the version the store handed out for it.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub version: u64,
    pub doc: T,
}

#[async_trait]
pub trait TrackStore: Send + Sync {
    // ----- Learners -----

    async fn learner(&self, id: Uuid) -> Result<Option<Learner>, StoreError>;
    async fn upsert_learner(&self, learner: Learner) -> Result<(), StoreError>;
    /// Compare-and-swap on the star level: advances only if the stored level
    /// still equals `from`. Returns `false` when another writer got there
    /// first, which callers treat as an already-fired transition.
    async fn promote_learner(
        &self,
        id: Uuid,
        from: StarLevel,
        to: StarLevel,
    ) -> Result<bool, StoreError>;
    async fn assign_tier(&self, id: Uuid, tier: Tier) -> Result<(), StoreError>;

    // ----- Catalog (read-only to the engine) -----

    async fn module(&self, id: Uuid) -> Result<Option<Module>, StoreError>;
    async fn modules_for_product(&self, product_id: Uuid) -> Result<Vec<Module>, StoreError>;
    async fn insert_module(&self, module: Module) -> Result<(), StoreError>;
    async fn lesson(&self, id: Uuid) -> Result<Option<Lesson>, StoreError>;
    async fn lessons_for_module(&self, module_id: Uuid) -> Result<Vec<Lesson>, StoreError>;
    async fn insert_lesson(&self, lesson: Lesson) -> Result<(), StoreError>;

    // ----- Progress documents -----

    async fn progress(
        &self,
        learner_id: Uuid,
        module_id: Uuid,
    ) -> Result<Option<Versioned<ModuleProgress>>, StoreError>;
    async fn progress_for_learner(
        &self,
        learner_id: Uuid,
    ) -> Result<Vec<ModuleProgress>, StoreError>;
    /// Compare-and-swap put keyed by `(learner, module)`. `expected` of
    /// `None` creates the document and fails with `Conflict` if one exists.
    async fn put_progress(
        &self,
        expected: Option<u64>,
        doc: ModuleProgress,
    ) -> Result<u64, StoreError>;

    // ----- Quiz attempts (append-only) -----

    /// Append an attempt, assigning its `ordinal` atomically with the
    /// append: the caller's value is ignored. Returns the stored attempt.
    async fn append_attempt(&self, attempt: QuizAttempt) -> Result<QuizAttempt, StoreError>;
    async fn attempts(
        &self,
        learner_id: Uuid,
        target_id: Uuid,
    ) -> Result<Vec<QuizAttempt>, StoreError>;
    async fn attempts_for_learner(&self, learner_id: Uuid)
        -> Result<Vec<QuizAttempt>, StoreError>;

    // ----- Project / interview submissions -----

    async fn active_submission(
        &self,
        learner_id: Uuid,
        kind: SubmissionKind,
    ) -> Result<Option<Submission>, StoreError>;
    async fn upsert_submission(&self, submission: Submission) -> Result<(), StoreError>;
}

/// Applies merge-safe updates to progress documents on behalf of the engine.
///
/// Each merge is a read-modify-write: load the versioned document (or start
/// a fresh one), union the patch into the nested collections, let the caller
/// recompute every derived field from the merged state, then CAS-put. A
/// version conflict means another event's write landed in between; the loop
/// reloads and replays the patch so both contributions survive. After the
/// bounded retries the conflict surfaces to the caller.
#[derive(Clone)]
pub struct ProgressAdapter {
    store: Arc<dyn TrackStore>,
    retry_limit: u32,
}

impl ProgressAdapter {
    pub fn new(store: Arc<dyn TrackStore>, retry_limit: u32) -> Self {
        Self { store, retry_limit }
    }

    pub async fn merge<F>(
        &self,
        learner_id: Uuid,
        module_id: Uuid,
        patch: ProgressPatch,
        recompute: F,
    ) -> Result<ModuleProgress, ProgressionError>
    where
        F: Fn(&mut ModuleProgress) + Send + Sync,
    {
        for attempt in 0..=self.retry_limit {
            let existing = self.store.progress(learner_id, module_id).await?;
            let (expected, mut doc) = match existing {
                Some(versioned) => (Some(versioned.version), versioned.doc),
                None => (None, ModuleProgress::new(learner_id, module_id)),
            };

            doc.details.apply(&patch);
            recompute(&mut doc);
            doc.updated_at = Utc::now();

            match self.store.put_progress(expected, doc.clone()).await {
                Ok(_) => return Ok(doc),
                Err(StoreError::Conflict) => {
                    debug!(
                        %learner_id, %module_id, attempt,
                        "progress merge lost the race, retrying"
                    );
                    let jitter_ms = rand::thread_rng().gen_range(5..25);
                    tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(%learner_id, %module_id, "progress merge exhausted retries");
        Err(ProgressionError::Conflict(
            "progress document contention".to_string(),
        ))
    }
}
