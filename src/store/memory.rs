//! In-process store backend: `tokio::sync::RwLock` maps keyed the same way
//! the production document store is. Each map write holds the lock across
//! the check and the mutation, which is what makes the compare-and-swap
//! operations atomic here.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{StoreError, TrackStore, Versioned};
use crate::progression::types::{
    Learner, Lesson, Module, ModuleProgress, QuizAttempt, StarLevel, Submission, SubmissionKind,
    Tier,
};

#[derive(Default)]
pub struct MemoryStore {
    learners: RwLock<HashMap<Uuid, Learner>>,
    modules: RwLock<HashMap<Uuid, Module>>,
    lessons: RwLock<HashMap<Uuid, Lesson>>,
    progress: RwLock<HashMap<(Uuid, Uuid), Versioned<ModuleProgress>>>,
    attempts: RwLock<Vec<QuizAttempt>>,
    submissions: RwLock<HashMap<(Uuid, SubmissionKind), Submission>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackStore for MemoryStore {
    async fn learner(&self, id: Uuid) -> Result<Option<Learner>, StoreError> {
        Ok(self.learners.read().await.get(&id).cloned())
    }

    async fn upsert_learner(&self, learner: Learner) -> Result<(), StoreError> {
        self.learners.write().await.insert(learner.id, learner);
        Ok(())
    }

    async fn promote_learner(
        &self,
        id: Uuid,
        from: StarLevel,
        to: StarLevel,
    ) -> Result<bool, StoreError> {
        let mut learners = self.learners.write().await;
        let learner = learners
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(format!("learner {id} not found")))?;
        if learner.star_level != from {
            return Ok(false);
        }
        learner.star_level = to;
        learner.updated_at = Utc::now();
        Ok(true)
    }

    async fn assign_tier(&self, id: Uuid, tier: Tier) -> Result<(), StoreError> {
        let mut learners = self.learners.write().await;
        let learner = learners
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(format!("learner {id} not found")))?;
        learner.tier = Some(tier);
        learner.updated_at = Utc::now();
        Ok(())
    }

    async fn module(&self, id: Uuid) -> Result<Option<Module>, StoreError> {
        Ok(self.modules.read().await.get(&id).cloned())
    }

    async fn modules_for_product(&self, product_id: Uuid) -> Result<Vec<Module>, StoreError> {
        let mut modules: Vec<Module> = self
            .modules
            .read()
            .await
            .values()
            .filter(|m| m.product_id == product_id)
            .cloned()
            .collect();
        modules.sort_by_key(|m| m.sequence);
        Ok(modules)
    }

    async fn insert_module(&self, module: Module) -> Result<(), StoreError> {
        self.modules.write().await.insert(module.id, module);
        Ok(())
    }

    async fn lesson(&self, id: Uuid) -> Result<Option<Lesson>, StoreError> {
        Ok(self.lessons.read().await.get(&id).cloned())
    }

    async fn lessons_for_module(&self, module_id: Uuid) -> Result<Vec<Lesson>, StoreError> {
        let mut lessons: Vec<Lesson> = self
            .lessons
            .read()
            .await
            .values()
            .filter(|l| l.module_id == module_id)
            .cloned()
            .collect();
        lessons.sort_by_key(|l| l.lesson_order);
        Ok(lessons)
    }

    async fn insert_lesson(&self, lesson: Lesson) -> Result<(), StoreError> {
        self.lessons.write().await.insert(lesson.id, lesson);
        Ok(())
    }

    async fn progress(
        &self,
        learner_id: Uuid,
        module_id: Uuid,
    ) -> Result<Option<Versioned<ModuleProgress>>, StoreError> {
        Ok(self
            .progress
            .read()
            .await
            .get(&(learner_id, module_id))
            .cloned())
    }

    async fn progress_for_learner(
        &self,
        learner_id: Uuid,
    ) -> Result<Vec<ModuleProgress>, StoreError> {
        Ok(self
            .progress
            .read()
            .await
            .values()
            .filter(|v| v.doc.learner_id == learner_id)
            .map(|v| v.doc.clone())
            .collect())
    }

    async fn put_progress(
        &self,
        expected: Option<u64>,
        doc: ModuleProgress,
    ) -> Result<u64, StoreError> {
        let key = (doc.learner_id, doc.module_id);
        let mut progress = self.progress.write().await;
        let current = progress.get(&key).map(|v| v.version);
        if current != expected {
            return Err(StoreError::Conflict);
        }
        let version = expected.map_or(1, |v| v + 1);
        progress.insert(key, Versioned { version, doc });
        Ok(version)
    }

    async fn append_attempt(&self, mut attempt: QuizAttempt) -> Result<QuizAttempt, StoreError> {
        let mut attempts = self.attempts.write().await;
        let prior = attempts
            .iter()
            .filter(|a| a.learner_id == attempt.learner_id && a.target_id == attempt.target_id)
            .count() as u32;
        attempt.ordinal = prior + 1;
        attempts.push(attempt.clone());
        Ok(attempt)
    }

    async fn attempts(
        &self,
        learner_id: Uuid,
        target_id: Uuid,
    ) -> Result<Vec<QuizAttempt>, StoreError> {
        Ok(self
            .attempts
            .read()
            .await
            .iter()
            .filter(|a| a.learner_id == learner_id && a.target_id == target_id)
            .cloned()
            .collect())
    }

    async fn attempts_for_learner(
        &self,
        learner_id: Uuid,
    ) -> Result<Vec<QuizAttempt>, StoreError> {
        Ok(self
            .attempts
            .read()
            .await
            .iter()
            .filter(|a| a.learner_id == learner_id)
            .cloned()
            .collect())
    }

    async fn active_submission(
        &self,
        learner_id: Uuid,
        kind: SubmissionKind,
    ) -> Result<Option<Submission>, StoreError> {
        Ok(self
            .submissions
            .read()
            .await
            .get(&(learner_id, kind))
            .cloned())
    }

    async fn upsert_submission(&self, submission: Submission) -> Result<(), StoreError> {
        self.submissions
            .write()
            .await
            .insert((submission.learner_id, submission.kind), submission);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::types::AnswerSet;

    fn attempt(learner_id: Uuid, target_id: Uuid) -> QuizAttempt {
        QuizAttempt {
            id: Uuid::new_v4(),
            learner_id,
            target_id,
            answers: AnswerSet::new(),
            score: 3,
            total: 5,
            passed: false,
            ordinal: 0,
            submitted_at: Utc::now(),
            per_question: Vec::new(),
        }
    }

    #[tokio::test]
    async fn append_attempt_assigns_ordinals_under_the_write_lock() {
        let store = MemoryStore::new();
        let learner = Uuid::new_v4();
        let target = Uuid::new_v4();

        // Two racing submissions for the same (learner, target).
        let (a, b) = tokio::join!(
            store.append_attempt(attempt(learner, target)),
            store.append_attempt(attempt(learner, target))
        );
        let mut ordinals = vec![a.unwrap().ordinal, b.unwrap().ordinal];
        ordinals.sort_unstable();
        assert_eq!(ordinals, vec![1, 2]);

        // A different target starts its own sequence.
        let other = store
            .append_attempt(attempt(learner, Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(other.ordinal, 1);
    }

    #[tokio::test]
    async fn put_progress_rejects_stale_versions() {
        let store = MemoryStore::new();
        let doc = ModuleProgress::new(Uuid::new_v4(), Uuid::new_v4());

        let v1 = store.put_progress(None, doc.clone()).await.unwrap();
        assert_eq!(v1, 1);

        // A second create must conflict.
        assert!(matches!(
            store.put_progress(None, doc.clone()).await,
            Err(StoreError::Conflict)
        ));

        let v2 = store.put_progress(Some(v1), doc.clone()).await.unwrap();
        assert_eq!(v2, 2);

        // Writing against the superseded version must conflict.
        assert!(matches!(
            store.put_progress(Some(v1), doc).await,
            Err(StoreError::Conflict)
        ));
    }

    #[tokio::test]
    async fn promote_learner_is_a_compare_and_swap() {
        let store = MemoryStore::new();
        let learner = Learner::new("Dana", "career-switcher");
        let id = learner.id;
        store.upsert_learner(learner).await.unwrap();

        assert!(store
            .promote_learner(id, StarLevel::None, StarLevel::One)
            .await
            .unwrap());
        // Re-firing the same transition is a no-op.
        assert!(!store
            .promote_learner(id, StarLevel::None, StarLevel::One)
            .await
            .unwrap());
        assert_eq!(
            store.learner(id).await.unwrap().unwrap().star_level,
            StarLevel::One
        );
    }
}
